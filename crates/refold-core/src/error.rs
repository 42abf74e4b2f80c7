//! Error types for declaration, dispatch and construction.

use std::fmt;

use derive_more::{Display, From};

use crate::kind::{OperationKind, Parameterization, SpecComponent};
use crate::naming::{Case, NameKind};
use crate::type_tag::TypeTag;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Display, Debug, PartialEq)]
#[display("{kind}")]
pub struct Error {
    kind: Box<ErrorKind>,
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        Error {
            kind: Box::new(ErrorKind::from(error)),
        }
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn is_declaration(&self) -> bool {
        matches!(*self.kind, ErrorKind::Declaration(_))
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(*self.kind, ErrorKind::Dispatch(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(*self.kind, ErrorKind::Value(_))
    }

    pub fn as_declaration(&self) -> Option<&DeclarationError> {
        match &*self.kind {
            ErrorKind::Declaration(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_dispatch(&self) -> Option<&DispatchError> {
        match &*self.kind {
            ErrorKind::Dispatch(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueError> {
        match &*self.kind {
            ErrorKind::Value(err) => Some(err),
            _ => None,
        }
    }

    /// A mismatch between the value a caller expected and the one it got.
    pub fn expected(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        ValueError::Expected {
            expected: expected.to_string(),
            found: found.to_string(),
        }
        .into()
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Display, Debug, PartialEq, From)]
pub enum ErrorKind {
    #[display("declaration error: {_0}")]
    Declaration(DeclarationError),

    #[display("dispatch error: {_0}")]
    Dispatch(DispatchError),

    #[display("value error: {_0}")]
    Value(ValueError),
}

/// Raised while building an ADT, an operator, an extension or a merge.
#[derive(Clone, Display, Debug, PartialEq)]
pub enum DeclarationError {
    #[display("{kind} name `{name}` must be {case}")]
    InvalidName {
        kind: NameKind,
        name: String,
        case: Case,
    },

    #[display("`{adt}` declares no variants")]
    NoVariants { adt: String },

    #[display("variant `{variant}` is declared twice in `{adt}`")]
    DuplicateVariant { adt: String, variant: String },

    #[display("variant `{variant}` of `{adt}` conflicts with a variant inherited from `{ancestor}`")]
    VariantCollision {
        adt: String,
        variant: String,
        ancestor: String,
    },

    #[display("field `{field}` is declared twice in variant `{variant}`")]
    DuplicateField { variant: String, field: String },

    #[display("`{context}` refers to unknown variant `{variant}`")]
    UnknownVariant { context: String, variant: String },

    #[display("handler for `{variant}` is given twice in `{op}`")]
    DuplicateHandler { op: String, variant: String },

    #[display("operation `{op}` is already defined on `{adt}`")]
    DuplicateOperation { adt: String, op: String },

    #[display("operation `{op}` has already been extended on `{adt}`")]
    AlreadyExtended { adt: String, op: String },

    #[display("name `{name}` on `{adt}` collides with an existing {with}")]
    NameCollision {
        adt: String,
        name: String,
        with: Collision,
    },

    #[display("operation `{op}` is a {from} and cannot be redeclared as a {to}")]
    KindChanged {
        op: String,
        from: OperationKind,
        to: OperationKind,
    },

    #[display("operation `{op}` cannot change from {from} to {to} when extended")]
    ParameterizationChanged {
        op: String,
        from: Parameterization,
        to: Parameterization,
    },

    #[display("operation `{op}` cannot change its {component} type from {from} to {to}")]
    TypeTagChanged {
        op: String,
        component: SpecComponent,
        from: TagSlot,
        to: TagSlot,
    },

    #[display("unfold `{op}` cannot declare a wildcard guard")]
    WildcardNotAllowed { op: String },

    #[display("`{adt}` already has child generations; operation `{op}` must be declared before extending it")]
    Sealed { adt: String, op: String },

    #[display("merged operation `{op}` is final and cannot be redeclared")]
    FinalOperation { op: String },

    #[display("merge `{op}` needs at least 2 operations, got {count}")]
    MergeTooFew { op: String, count: usize },

    #[display("merge `{op}` refers to unknown operation `{missing}`")]
    MergeUnresolved { op: String, missing: String },

    #[display("merge `{op}` has {offenders}")]
    MergeArity { op: String, offenders: ArityOffenders },

    #[display("merge `{op}` must run generator, transforms, consumer in that order; `{constituent}` is out of place")]
    MergeOrder { op: String, constituent: String },

    #[display("merge `{op}` cannot fuse parameterized operation `{constituent}`")]
    MergeParameterized { op: String, constituent: String },

    #[display("merge `{op}` cannot fuse merged operation `{constituent}`")]
    MergeNested { op: String, constituent: String },

    #[display("`{codata}` declares no observers")]
    NoObservers { codata: String },

    #[display("observer `{observer}` is declared twice in `{codata}`")]
    DuplicateObserver { codata: String, observer: String },

    #[display("unfold `{op}` has no handler for observer `{observer}`")]
    MissingObserverHandler { op: String, observer: String },

    #[display("unfold `{op}` gives a handler for undeclared observer `{observer}`")]
    UnknownObserverHandler { op: String, observer: String },

    #[display("handler for observer `{observer}` in `{op}` must be {expected}")]
    ObserverHandlerShape {
        op: String,
        observer: String,
        expected: HandlerShape,
    },
}

/// Raised while resolving or invoking a handler.
#[derive(Clone, Display, Debug, PartialEq)]
pub enum DispatchError {
    #[display("operation `{op}` does not exist on `{adt}`")]
    UnknownOperation { adt: String, op: String },

    #[display("no handler for variant `{variant}` in operation `{op}`")]
    NoHandler { op: String, variant: String },

    #[display("no parent handler for variant `{variant}` in operation `{op}`")]
    NoParentHandler { op: String, variant: String },

    #[display("operation `{op}` is parameterless and takes no argument")]
    UnexpectedArgument { op: String },

    #[display("operation `{op}` requires an argument")]
    MissingArgument { op: String },

    #[display("operation `{op}` is not a generator; invoke it on an instance")]
    NotAGenerator { op: String },

    #[display("operation `{op}` is a generator; call it with a seed")]
    Generator { op: String },

    #[display("no guard of unfold `{op}` matched seed {seed}")]
    NoGuardMatched { op: String, seed: String },

    #[display("operation `{op}` expects an instance, found {found}")]
    NotAnInstance { op: String, found: String },

    #[display("handler `{variant}` of `{op}` read unknown field `{field}`")]
    UnknownField {
        op: String,
        variant: String,
        field: String,
    },

    #[display("handler `{variant}` of `{op}` failed: {message}")]
    Handler {
        op: String,
        variant: String,
        message: String,
    },

    #[display("`{codata}` has no observer `{observer}`")]
    UnknownObserver { codata: String, observer: String },

    #[display("`{codata}` has no unfold `{op}`")]
    UnknownUnfold { codata: String, op: String },

    #[display("cannot assign to observer `{observer}` of `{codata}`: codata is immutable")]
    ImmutableObserver { codata: String, observer: String },

    #[display("observer `{observer}` of `{codata}` takes no argument")]
    NotParametric { codata: String, observer: String },

    #[display("value of type {found} is not callable")]
    NotCallable { found: String },
}

/// Raised while constructing or inspecting values.
#[derive(Clone, Display, Debug, PartialEq)]
pub enum ValueError {
    #[display("`{adt}` has no variant `{variant}`")]
    UnknownVariant { adt: String, variant: String },

    #[display("variant `{variant}` is missing field `{field}`")]
    MissingField { variant: String, field: String },

    #[display("variant `{variant}` has no field `{field}`")]
    UnexpectedField { variant: String, field: String },

    #[display("variant `{variant}` takes {expected} fields, got {found}")]
    Arity {
        variant: String,
        expected: usize,
        found: usize,
    },

    #[display("field `{field}` of `{variant}` expects {expected}, got {found}")]
    FieldType {
        variant: String,
        field: String,
        expected: String,
        found: String,
    },

    #[display("invariant `{invariant}` of `{variant}` does not hold")]
    Invariant { variant: String, invariant: String },

    #[display("a transform may not replace recursive field `{field}` of `{variant}`")]
    RecursiveField { variant: String, field: String },

    #[display("operation `{op}` expects a {expected} argument, got {found}")]
    ArgumentType {
        op: String,
        expected: TypeTag,
        found: String,
    },

    #[display("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
}

/// What a new name ran into.
#[derive(Clone, Display, Debug, PartialEq)]
pub enum Collision {
    #[display("variant")]
    Variant,
    #[display("field of `{_0}`")]
    Field(String),
    #[display("operation")]
    Operation,
}

/// The calling convention a codata handler must follow.
#[derive(Clone, Copy, Display, Debug, PartialEq, Eq)]
pub enum HandlerShape {
    #[display("a function of the seed")]
    Seed,
    #[display("a function of the seed and an argument")]
    SeedAndArgument,
}

/// An optional type tag, rendered as `none` when absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagSlot(pub Option<TypeTag>);

impl fmt::Display for TagSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(tag) => write!(f, "{tag}"),
            None => f.write_str("none"),
        }
    }
}

/// A list of names rendered as `` `a`, `b` ``.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Names(pub Vec<String>);

impl fmt::Display for Names {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "`{name}`")?;
        }
        Ok(())
    }
}

/// Surplus generators and consumers of a merge. A side with at most one
/// stage is left empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArityOffenders {
    pub generators: Names,
    pub consumers: Names,
}

impl fmt::Display for ArityOffenders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.generators.0.is_empty() {
            write!(f, "more than one generator: {}", self.generators)?;
            if !self.consumers.0.is_empty() {
                f.write_str("; ")?;
            }
        }
        if !self.consumers.0.is_empty() {
            write!(f, "more than one consumer: {}", self.consumers)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families() {
        let err: Error = DispatchError::NoHandler {
            op: "toValue".into(),
            variant: "Succ".into(),
        }
        .into();
        assert!(err.is_dispatch());
        assert!(!err.is_declaration());
        assert!(matches!(
            err.as_dispatch(),
            Some(DispatchError::NoHandler { variant, .. }) if variant == "Succ"
        ));
    }

    #[test]
    fn test_type_tag_change_message() {
        let err: Error = DeclarationError::TypeTagChanged {
            op: "eval".into(),
            component: SpecComponent::Output,
            from: TagSlot(Some(TypeTag::Int)),
            to: TagSlot(None),
        }
        .into();
        insta::assert_snapshot!(
            err.to_string(),
            @"declaration error: operation `eval` cannot change its output type from int to none"
        );
    }

    #[test]
    fn test_merge_lists_every_offender() {
        let err: Error = DeclarationError::MergeArity {
            op: "Pipeline".into(),
            offenders: ArityOffenders {
                generators: Names(vec!["Range".into(), "Repeat".into()]),
                consumers: Names(Vec::new()),
            },
        }
        .into();
        insta::assert_snapshot!(
            err.to_string(),
            @"declaration error: merge `Pipeline` has more than one generator: `Range`, `Repeat`"
        );
        let err: Error = DeclarationError::MergeArity {
            op: "Pipeline".into(),
            offenders: ArityOffenders {
                generators: Names(vec!["Range".into(), "Repeat".into()]),
                consumers: Names(vec!["sum".into(), "length".into()]),
            },
        }
        .into();
        insta::assert_snapshot!(
            err.to_string(),
            @"declaration error: merge `Pipeline` has more than one generator: `Range`, `Repeat`; more than one consumer: `sum`, `length`"
        );
    }

    #[test]
    fn test_expected_helper() {
        let err = Error::expected("int", "str");
        assert!(err.is_value());
        assert_eq!(err.to_string(), "value error: expected int, found str");
    }
}
