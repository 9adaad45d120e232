use std::fmt;

/* Where in a signature a lowering failure happened */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPosition {
    Param(usize),
    Return,
}

impl fmt::Display for ParamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamPosition::Param(index) => write!(f, "parameter #{}", index),
            ParamPosition::Return => write!(f, "return value"),
        }
    }
}

/// Failures of a generation run. Every variant is final: the same input
/// produces the same error again, so nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenError {
    #[error("unsupported construct '{decl}': {reason}")]
    UnsupportedConstruct { decl: String, reason: String },
    #[error("function '{name}' is already registered")]
    DuplicateFunction { name: String },
    #[error("cannot marshal {position} of '{function}': {reason}")]
    UnmappableParameter {
        function: String,
        position: ParamPosition,
        reason: String,
    },
    #[error("generated output '{filename}' is malformed: {diagnostic}")]
    MalformedOutput { filename: String, diagnostic: String },
}

impl GenError {
    pub fn unsupported(decl: impl Into<String>, reason: impl Into<String>) -> Self {
        GenError::UnsupportedConstruct {
            decl: decl.into(),
            reason: reason.into(),
        }
    }

    pub fn unmappable(
        function: impl Into<String>,
        position: ParamPosition,
        reason: impl Into<String>,
    ) -> Self {
        GenError::UnmappableParameter {
            function: function.into(),
            position,
            reason: reason.into(),
        }
    }

    pub fn malformed(filename: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        GenError::MalformedOutput {
            filename: filename.into(),
            diagnostic: diagnostic.into(),
        }
    }
}

/* Problems with the declaration graph itself, found before generation starts */
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclError {
    #[error("type '{name}' is declared more than once ({first} and {second})")]
    DuplicateType {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}
