//! Operation kinds and the roles they play in a fused pipeline.

use derive_more::Display;

/// The five kinds of operation an ADT generation can carry.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum OperationKind {
    #[display("fold")]
    Fold,
    #[display("unfold")]
    Unfold,
    #[display("map")]
    Map,
    #[display("match")]
    Match,
    #[display("merge")]
    Merge,
}

/// Position an operation may occupy in a merge pipeline.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageRole {
    #[display("generator")]
    Generator,
    #[display("transform")]
    Transform,
    #[display("consumer")]
    Consumer,
}

impl OperationKind {
    /// Pipeline role, or `None` for merged operations which cannot be fused again.
    pub fn role(self) -> Option<StageRole> {
        match self {
            OperationKind::Unfold => Some(StageRole::Generator),
            OperationKind::Map => Some(StageRole::Transform),
            OperationKind::Fold | OperationKind::Match => Some(StageRole::Consumer),
            OperationKind::Merge => None,
        }
    }
}

/// Whether an operation is a getter or a method taking one argument.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Parameterization {
    #[display("parameterless")]
    Parameterless,
    #[display("parameterized")]
    Parameterized,
}

/// The part of an operation's type spec that an extension tried to change.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum SpecComponent {
    #[display("input")]
    Input,
    #[display("output")]
    Output,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert_eq!(OperationKind::Unfold.role(), Some(StageRole::Generator));
        assert_eq!(OperationKind::Map.role(), Some(StageRole::Transform));
        assert_eq!(OperationKind::Fold.role(), Some(StageRole::Consumer));
        assert_eq!(OperationKind::Match.role(), Some(StageRole::Consumer));
        assert_eq!(OperationKind::Merge.role(), None);
    }

    #[test]
    fn test_roles_order_as_a_pipeline() {
        assert!(StageRole::Generator < StageRole::Transform);
        assert!(StageRole::Transform < StageRole::Consumer);
    }
}
