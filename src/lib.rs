//! Extensible algebraic data types and codata.
//!
//! An [`Adt`] generation declares variants and operations (fold, unfold, map,
//! match and fused merges). [`Adt::extend`] derives a child generation that
//! inherits both and may override inherited handlers; recursion through
//! recursive fields always resolves against the most derived generation in
//! scope. [`Codata`] types are observed lazily from a seed.

mod adt;
mod codata;
mod dispatch;
mod extend;
mod fields;
mod handler;
mod instance;
mod merge;
mod operator;
mod pool;
mod scheme;
mod value;
mod variant;

pub use refold_core::{
    ArityOffenders, Case, Collision, Config, DeclarationError, DispatchError, Error, ErrorKind,
    HandlerShape, NameKind, Names, OperationKind, Parameterization, Result, SpecComponent,
    StageRole, TagSlot, TypeTag, ValueError,
};

pub use crate::adt::{Adt, AdtBuilder, AdtId};
pub use crate::codata::{Codata, CodataBuilder, CodataInstance, Observer, Observers};
pub use crate::fields::Fields;
pub use crate::handler::{
    CaseFn, Cases, Cx, GuardFn, Guards, Handler, Handlers, TransformFn, Transforms,
};
pub use crate::instance::Instance;
pub use crate::operator::{OpSpec, Operator};
pub use crate::value::{Func, Value};
pub use crate::variant::{Field, FieldSpec, InvariantFn, Predicate, Variant, VariantShape};
