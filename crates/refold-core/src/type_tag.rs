//! Type tags used by field specifications and operation specs.

use derive_more::Display;

/// A primitive tag or a reference to a named ADT.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum TypeTag {
    #[display("unit")]
    Unit,
    #[display("bool")]
    Bool,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("str")]
    Str,
    #[display("list")]
    List,
    #[display("func")]
    Func,
    #[display("codata")]
    Codata,
    /// Any ADT instance.
    #[display("instance")]
    Instance,
    /// A recursive occurrence of the declaring ADT, resolved to the most-derived
    /// generation in scope when an operation runs.
    #[display("Family")]
    Family,
    /// Instances of the ADT (or codata type) with this name, or of its extensions.
    #[display("{_0}")]
    Named(String),
}

impl TypeTag {
    pub fn named(name: impl Into<String>) -> Self {
        TypeTag::Named(name.into())
    }
}
