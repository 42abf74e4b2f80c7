//! Shared vocabulary for the refold engine.
pub mod config;
pub mod error;
pub mod kind;
pub mod naming;
pub mod type_tag;

pub use config::Config;
pub use error::{
    ArityOffenders, Collision, DeclarationError, DispatchError, Error, ErrorKind, HandlerShape,
    Names, Result, TagSlot, ValueError,
};
pub use kind::{OperationKind, Parameterization, SpecComponent, StageRole};
pub use naming::{Case, NameKind};
pub use type_tag::TypeTag;
