use serde_derive::{Deserialize, Serialize};

/* Joins a namespace path and a name into a fully qualified spelling.
   Leading `::` on either side is dropped so `::woff2` and `woff2` agree. */
pub fn qualify(namespace: &str, name: &str) -> String {
    let namespace = namespace.trim_start_matches("::");
    let name = name.trim_start_matches("::");
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", namespace, name)
    }
}

/// A reference to a type as it is spelled at a use site: the base type plus
/// the qualifiers the front-end saw on it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct QualType {
    /* Base type spelling, fully qualified for declared types */
    pub name: String,
    /* Const on the innermost pointee, or on the value itself for non-pointers */
    #[serde(default, rename = "const")]
    pub is_const: bool,
    #[serde(default)]
    pub pointers: u8,
    #[serde(default)]
    pub reference: bool,
    /* Fixed array length, only meaningful on record fields */
    #[serde(default)]
    pub extent: Option<u64>,
}

impl QualType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_const: false,
            pointers: 0,
            reference: false,
            extent: None,
        }
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn pointer(mut self) -> Self {
        self.pointers += 1;
        self
    }

    pub fn reference(mut self) -> Self {
        self.reference = true;
        self
    }

    pub fn array(mut self, extent: u64) -> Self {
        self.extent = Some(extent);
        self
    }

    /* Base name without a leading global-scope qualifier */
    pub fn base_name(&self) -> &str {
        self.name.trim_start_matches("::")
    }

    pub fn is_indirect(&self) -> bool {
        self.pointers > 0 || self.reference
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: QualType,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RecordDecl {
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /* False when the front-end only saw a forward declaration */
    #[serde(default = "default_true")]
    pub complete: bool,
    #[serde(default)]
    pub has_virtual: bool,
    /* Non-empty for class templates that were never instantiated */
    #[serde(default)]
    pub template_params: Vec<String>,
}

impl Default for RecordDecl {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            complete: true,
            has_virtual: false,
            template_params: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Enumerator {
    pub name: String,
    #[serde(default)]
    pub value: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct EnumDecl {
    /* Fixed underlying type, e.g. `int` or `uint8_t` */
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub scoped: bool,
    #[serde(default)]
    pub enumerators: Vec<Enumerator>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TypedefDecl {
    pub underlying: QualType,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionProtoDecl {
    /* The prototype as written, kept for diagnostics */
    #[serde(default)]
    pub spelling: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum TypeDeclKind {
    Struct(RecordDecl),
    Class(RecordDecl),
    Union(RecordDecl),
    Enum(EnumDecl),
    Typedef(TypedefDecl),
    FunctionProto(FunctionProtoDecl),
}

impl TypeDeclKind {
    pub fn record(&self) -> Option<&RecordDecl> {
        match self {
            TypeDeclKind::Struct(record)
            | TypeDeclKind::Class(record)
            | TypeDeclKind::Union(record) => Some(record),
            _ => None,
        }
    }

    /* The class-key used when spelling the declaration */
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeDeclKind::Struct(_) => "struct",
            TypeDeclKind::Class(_) => "class",
            TypeDeclKind::Union(_) => "union",
            TypeDeclKind::Enum(_) => "enum",
            TypeDeclKind::Typedef(_) => "typedef",
            TypeDeclKind::FunctionProto(_) => "function prototype",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(with = "serde_yml::with::singleton_map_recursive")]
    pub kind: TypeDeclKind,
    #[serde(default)]
    pub comment: Option<String>,
}

impl TypeDecl {
    pub fn qualified_name(&self) -> String {
        qualify(&self.namespace, &self.name)
    }
}

/// Explicit directionality supplied by the front-end (for example from
/// parameter annotations). Without a hint, direction follows the qualifiers.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum DirectionHint {
    In,
    Out,
    InOut,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ParamDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: QualType,
    #[serde(default)]
    pub direction: Option<DirectionHint>,
}

impl ParamDecl {
    pub fn named(name: impl Into<String>, ty: QualType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
            direction: None,
        }
    }

    pub fn unnamed(ty: QualType) -> Self {
        Self {
            name: None,
            ty,
            direction: None,
        }
    }

    pub fn with_direction(mut self, direction: DirectionHint) -> Self {
        self.direction = Some(direction);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub return_type: QualType,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub template_params: Vec<String>,
    /* Linkage name inside the sandboxee, defaults to the unqualified name */
    #[serde(default)]
    pub symbol: Option<String>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, return_type: QualType, params: Vec<ParamDecl>) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            return_type,
            params,
            variadic: false,
            template_params: Vec::new(),
            symbol: None,
        }
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.namespace, &self.name)
    }

    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }
}
