/* Syntax validation of rendered headers. A header that fails here is never
   written out. */

use crate::error::GenError;
use sapi_types::{GeneratorOptions, ValidatorKind};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

pub trait SyntaxValidator {
    fn name(&self) -> &'static str;

    /// Checks `text` and returns it in its final form, or a `MalformedOutput`
    /// naming `filename` and the offending region.
    fn validate(&self, filename: &str, text: &str) -> Result<String, GenError>;
}

pub fn validator_for(options: &GeneratorOptions) -> Box<dyn SyntaxValidator> {
    match options.validator {
        ValidatorKind::Builtin => Box::new(BuiltinValidator),
        ValidatorKind::ClangFormat => Box::new(ClangFormatValidator {
            path: options.clang_format_path.clone(),
            style: options.clang_format_style.clone(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Diagnostic {
    line: usize,
    column: usize,
    message: String,
}

impl Diagnostic {
    fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    fn render(&self) -> String {
        format!("line {}:{}: {}", self.line, self.column, self.message)
    }
}

/* Open bracket and where it was opened; `type_body` marks a struct/class/union/enum body */
#[derive(Debug, Clone, Copy)]
struct Open {
    bracket: char,
    line: usize,
    column: usize,
    type_body: bool,
}

fn closing(bracket: char) -> char {
    match bracket {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
            if !c.is_whitespace() {
                self.at_line_start = false;
            }
        }
        Some(c)
    }

    /* Rest of the current line, honoring backslash continuations */
    fn skip_line(&mut self) -> String {
        let mut line = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                if line.ends_with('\\') {
                    line.pop();
                    self.bump();
                    continue;
                }
                break;
            }
            line.push(c);
            self.bump();
        }
        line
    }

    fn skip_block_comment(&mut self) -> Result<(), Diagnostic> {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.bump();
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.bump();
                return Ok(());
            }
        }
        Err(Diagnostic::new(line, column, "unterminated block comment"))
    }

    fn skip_literal(&mut self, quote: char) -> Result<(), Diagnostic> {
        let (line, column) = (self.line, self.column);
        let what = if quote == '"' { "string" } else { "character" };
        self.bump();
        while let Some(c) = self.peek() {
            match c {
                '\n' => break,
                '\\' => {
                    self.bump();
                    self.bump();
                }
                c if c == quote => {
                    self.bump();
                    return Ok(());
                }
                _ => {
                    self.bump();
                }
            }
        }
        Err(Diagnostic::new(line, column, format!("unterminated {} literal", what)))
    }

    fn identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }
}

/* Lexical well-formedness: balanced brackets and conditionals, terminated
   literals and comments, and `;` after every type body */
fn check(text: &str) -> Result<(), Diagnostic> {
    let mut lexer = Lexer::new(text);
    let mut brackets: Vec<Open> = Vec::new();
    let mut conditionals: Vec<(usize, usize)> = Vec::new();
    let mut type_head = false;
    let mut pending_semicolon: Option<(usize, usize)> = None;
    let mut previous: Option<char> = None;

    while let Some(c) = lexer.peek() {
        let (line, column) = (lexer.line, lexer.column);

        if c.is_whitespace() {
            lexer.bump();
            continue;
        }
        if c == '/' && lexer.peek_at(1) == Some('/') {
            lexer.skip_line();
            continue;
        }
        if c == '/' && lexer.peek_at(1) == Some('*') {
            lexer.skip_block_comment()?;
            continue;
        }
        if c == '#' && lexer.at_line_start {
            lexer.bump();
            let directive = lexer.skip_line();
            let word = directive
                .trim_start()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .next()
                .unwrap_or("");
            match word {
                "if" | "ifdef" | "ifndef" => conditionals.push((line, column)),
                "elif" | "else" if conditionals.is_empty() => {
                    return Err(Diagnostic::new(line, column, format!("'#{}' without matching '#if'", word)));
                }
                "endif" => {
                    if conditionals.pop().is_none() {
                        return Err(Diagnostic::new(line, column, "'#endif' without matching '#if'"));
                    }
                }
                _ => {}
            }
            continue;
        }

        if let Some((open_line, open_column)) = pending_semicolon {
            /* `} name;` declares a variable of the type on the same line */
            let declarator = line == open_line && (c.is_ascii_alphabetic() || c == '_' || c == '*');
            if c != ';' && !declarator {
                return Err(Diagnostic::new(
                    open_line,
                    open_column,
                    "type definition is not terminated by ';'",
                ));
            }
            pending_semicolon = None;
        }

        match c {
            '"' => {
                lexer.skip_literal('"')?;
                previous = Some('"');
                continue;
            }
            /* digit separator, as in 1'000 */
            '\'' if previous.is_some_and(|p| p.is_ascii_digit()) => {
                lexer.bump();
            }
            '\'' => {
                lexer.skip_literal('\'')?;
                previous = Some('\'');
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let ident = lexer.identifier();
                if matches!(ident.as_str(), "struct" | "class" | "union" | "enum") {
                    type_head = true;
                }
                previous = ident.chars().last();
                continue;
            }
            '(' | '[' | '{' => {
                lexer.bump();
                brackets.push(Open {
                    bracket: c,
                    line,
                    column,
                    type_body: c == '{' && type_head,
                });
                if c == '{' {
                    type_head = false;
                }
            }
            ')' | ']' | '}' => {
                lexer.bump();
                let Some(open) = brackets.pop() else {
                    return Err(Diagnostic::new(line, column, format!("unbalanced '{}'", c)));
                };
                if closing(open.bracket) != c {
                    return Err(Diagnostic::new(
                        line,
                        column,
                        format!(
                            "'{}' closes '{}' opened at line {}:{}",
                            c, open.bracket, open.line, open.column
                        ),
                    ));
                }
                if c == '}' {
                    type_head = false;
                    if open.type_body {
                        pending_semicolon = Some((line, column));
                    }
                }
            }
            ';' => {
                lexer.bump();
                type_head = false;
            }
            _ => {
                lexer.bump();
            }
        }
        previous = Some(c);
    }

    if let Some((line, column)) = pending_semicolon {
        return Err(Diagnostic::new(line, column, "type definition is not terminated by ';'"));
    }
    if let Some(open) = brackets.pop() {
        return Err(Diagnostic::new(
            open.line,
            open.column,
            format!("'{}' is never closed", open.bracket),
        ));
    }
    if let Some((line, column)) = conditionals.pop() {
        return Err(Diagnostic::new(line, column, "conditional block is never closed by '#endif'"));
    }
    Ok(())
}

/* No trailing whitespace, no runs of blank lines, exactly one final newline */
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if !out.is_empty() {
                blank_run = true;
            }
            continue;
        }
        if blank_run {
            out.push('\n');
            blank_run = false;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Lexical checks done in-process; no external tooling required.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinValidator;

impl SyntaxValidator for BuiltinValidator {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn validate(&self, filename: &str, text: &str) -> Result<String, GenError> {
        check(text).map_err(|diagnostic| GenError::malformed(filename, diagnostic.render()))?;
        let normalized = normalize(text);
        debug!(filename, bytes = normalized.len(), "header passed builtin validation");
        Ok(normalized)
    }
}

/// Runs the builtin checks, then formats through an external clang-format.
#[derive(Debug, Clone)]
pub struct ClangFormatValidator {
    pub path: String,
    pub style: String,
}

impl SyntaxValidator for ClangFormatValidator {
    fn name(&self) -> &'static str {
        "clang-format"
    }

    fn validate(&self, filename: &str, text: &str) -> Result<String, GenError> {
        let checked = BuiltinValidator.validate(filename, text)?;

        let mut child = Command::new(&self.path)
            .arg(format!("--style={}", self.style))
            .arg(format!("--assume-filename={}", filename))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GenError::malformed(filename, format!("failed to run '{}': {}", self.path, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GenError::malformed(filename, "formatter stdin is not available"))?;
        /* feed stdin from another thread so a full stdout pipe cannot deadlock us */
        let input = checked.into_bytes();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| GenError::malformed(filename, format!("failed to wait for '{}': {}", self.path, e)))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(GenError::malformed(filename, format!("failed to feed '{}': {}", self.path, e)));
            }
            Err(_) => return Err(GenError::malformed(filename, "formatter input thread panicked")),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenError::malformed(
                filename,
                format!("'{}' exited with {}: {}", self.path, output.status, stderr.trim()),
            ));
        }
        let formatted = String::from_utf8(output.stdout)
            .map_err(|e| GenError::malformed(filename, format!("formatter produced invalid UTF-8: {}", e)))?;
        debug!(filename, style = %self.style, "header formatted");
        Ok(formatted)
    }
}
