//! Operators: one named operation as seen from one ADT generation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use refold_core::{OperationKind, Parameterization, TypeTag};

use crate::adt::Adt;
use crate::handler::{CaseFn, GuardFn, HandlerTable, TransformFn};
use crate::merge::Pipeline;

/// Declared input and output tags of an operation.
///
/// An operation with an input tag is parameterized: it is called with one extra
/// argument and is never memoized. For unfolds the input describes the seed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpSpec {
    pub input: Option<TypeTag>,
    pub output: Option<TypeTag>,
}

impl OpSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, tag: TypeTag) -> Self {
        self.input = Some(tag);
        self
    }

    pub fn with_output(mut self, tag: TypeTag) -> Self {
        self.output = Some(tag);
        self
    }

    pub fn parameterization(&self) -> Parameterization {
        if self.input.is_some() {
            Parameterization::Parameterized
        } else {
            Parameterization::Parameterless
        }
    }

    pub fn is_parameterized(&self) -> bool {
        self.input.is_some()
    }
}

pub(crate) enum OperatorBody {
    Fold(HandlerTable<CaseFn>),
    Match(HandlerTable<CaseFn>),
    Map(HandlerTable<TransformFn>),
    Unfold(HandlerTable<GuardFn>),
    Merge(Pipeline),
}

/// A resolved operation. Redeclaring an operation on an extension creates a
/// new operator; the parent's stays in place for the parent generation.
pub struct Operator {
    id: u64,
    name: Arc<str>,
    spec: OpSpec,
    owner_name: Arc<str>,
    pub(crate) body: OperatorBody,
}

impl Operator {
    pub(crate) fn new(name: &str, spec: OpSpec, owner: &Adt, body: OperatorBody) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Operator {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            spec,
            owner_name: owner.name_arc().clone(),
            body,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        match &self.body {
            OperatorBody::Fold(_) => OperationKind::Fold,
            OperatorBody::Match(_) => OperationKind::Match,
            OperatorBody::Map(_) => OperationKind::Map,
            OperatorBody::Unfold(_) => OperationKind::Unfold,
            OperatorBody::Merge(_) => OperationKind::Merge,
        }
    }

    pub fn spec(&self) -> &OpSpec {
        &self.spec
    }

    /// Whether this operation is driven by a seed rather than an instance.
    pub fn is_generator(&self) -> bool {
        match &self.body {
            OperatorBody::Unfold(_) => true,
            OperatorBody::Merge(pipeline) => pipeline.generator.is_some(),
            _ => false,
        }
    }

    /// Merged operators can be neither redeclared nor fused again.
    pub fn is_final(&self) -> bool {
        matches!(self.body, OperatorBody::Merge(_))
    }

    /// Name of the generation that declared this operator.
    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    /// Variants with a specific handler, sorted.
    pub fn handled_variants(&self) -> Vec<&str> {
        let mut names: Vec<&str> = match &self.body {
            OperatorBody::Fold(table) | OperatorBody::Match(table) => {
                table.specific.keys().map(|name| &**name).collect()
            }
            OperatorBody::Map(table) => table.specific.keys().map(|name| &**name).collect(),
            OperatorBody::Unfold(table) => table.specific.keys().map(|name| &**name).collect(),
            OperatorBody::Merge(_) => Vec::new(),
        };
        names.sort_unstable();
        names
    }

    pub fn has_wildcard(&self) -> bool {
        match &self.body {
            OperatorBody::Fold(table) | OperatorBody::Match(table) => table.wildcard.is_some(),
            OperatorBody::Map(table) => table.wildcard.is_some(),
            OperatorBody::Unfold(table) => table.wildcard.is_some(),
            OperatorBody::Merge(_) => false,
        }
    }

    pub(crate) fn cases(&self) -> Option<&HandlerTable<CaseFn>> {
        match &self.body {
            OperatorBody::Fold(table) | OperatorBody::Match(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn transforms(&self) -> Option<&HandlerTable<TransformFn>> {
        match &self.body {
            OperatorBody::Map(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn guards(&self) -> Option<&HandlerTable<GuardFn>> {
        match &self.body {
            OperatorBody::Unfold(table) => Some(table),
            _ => None,
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("spec", &self.spec)
            .field("owner", &self.owner_name)
            .finish()
    }
}
