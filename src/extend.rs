//! Operation declaration and extension resolution.
//!
//! Declaring an operation whose name a parent generation already uses extends
//! it. The child's handler table is resolved once, at declaration time:
//!
//! - a child handler for a variant overrides whatever the parent would have
//!   run for that variant (its specific handler, else its wildcard) and can
//!   reach that result through [`Cx::parent`](crate::Cx::parent);
//! - parent handlers the child does not override are inherited unchanged;
//! - a child wildcard replaces the parent's wildcard, but never a specific
//!   parent handler, since lookup is always specific-then-wildcard.

use std::collections::HashSet;
use std::sync::Arc;

use refold_core::{DeclarationError, NameKind, OperationKind, Result, SpecComponent, TagSlot};

use crate::adt::Adt;
use crate::handler::{CaseFn, GuardFn, Handler, HandlerEntry, HandlerTable, Handlers, TransformFn};
use crate::operator::{OpSpec, Operator, OperatorBody};

/// Handler types that can back an operator body.
trait TableKind: Handler + Sized {
    fn wrap(kind: OperationKind, table: HandlerTable<Self>) -> OperatorBody;
    fn table(op: &Operator) -> Option<&HandlerTable<Self>>;
}

impl TableKind for CaseFn {
    fn wrap(kind: OperationKind, table: HandlerTable<Self>) -> OperatorBody {
        match kind {
            OperationKind::Match => OperatorBody::Match(table),
            _ => OperatorBody::Fold(table),
        }
    }

    fn table(op: &Operator) -> Option<&HandlerTable<Self>> {
        op.cases()
    }
}

impl TableKind for TransformFn {
    fn wrap(_: OperationKind, table: HandlerTable<Self>) -> OperatorBody {
        OperatorBody::Map(table)
    }

    fn table(op: &Operator) -> Option<&HandlerTable<Self>> {
        op.transforms()
    }
}

impl TableKind for GuardFn {
    fn wrap(_: OperationKind, table: HandlerTable<Self>) -> OperatorBody {
        OperatorBody::Unfold(table)
    }

    fn table(op: &Operator) -> Option<&HandlerTable<Self>> {
        op.guards()
    }
}

pub(crate) fn declare_cases(
    adt: &Adt,
    kind: OperationKind,
    name: &str,
    spec: OpSpec,
    cases: Handlers<CaseFn>,
) -> Result<Arc<Operator>> {
    declare(adt, kind, name, spec, cases)
}

pub(crate) fn declare_map(
    adt: &Adt,
    name: &str,
    spec: OpSpec,
    transforms: Handlers<TransformFn>,
) -> Result<Arc<Operator>> {
    declare(adt, OperationKind::Map, name, spec, transforms)
}

pub(crate) fn declare_unfold(
    adt: &Adt,
    name: &str,
    spec: OpSpec,
    guards: Handlers<GuardFn>,
) -> Result<Arc<Operator>> {
    if guards.wildcard.is_some() {
        return Err(DeclarationError::WildcardNotAllowed {
            op: name.to_string(),
        }
        .into());
    }
    declare(adt, OperationKind::Unfold, name, spec, guards)
}

fn declare<H: TableKind>(
    adt: &Adt,
    kind: OperationKind,
    name: &str,
    spec: OpSpec,
    handlers: Handlers<H>,
) -> Result<Arc<Operator>> {
    let name_kind = if kind == OperationKind::Unfold {
        NameKind::Generator
    } else {
        NameKind::Operation
    };
    adt.check_operation_name(name, name_kind)?;

    let inherited = adt.parent().and_then(|parent| parent.operation(name));
    if let Some(parent_op) = &inherited {
        check_redeclaration(parent_op, kind, &spec)?;
    }
    check_handlers(adt, name, &handlers)?;

    let parent_table = inherited.as_deref().and_then(H::table);
    let table = resolve_table(parent_table, handlers, adt.name_arc());

    if matches!(kind, OperationKind::Fold | OperationKind::Match) && table.wildcard.is_none() {
        let missing: Vec<&str> = adt
            .variants()
            .iter()
            .map(|variant| variant.name())
            .filter(|variant| !table.specific.contains_key(*variant))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                op = %name,
                adt = %adt.name(),
                missing = ?missing,
                "Operation does not handle every variant"
            );
        }
    }

    let handled = table.specific.len();
    let op = adt.install(Operator::new(name, spec, adt, H::wrap(kind, table)))?;
    tracing::debug!(
        op = %name,
        adt = %adt.name(),
        %kind,
        handled,
        extends = inherited.is_some(),
        "Declared operation"
    );
    Ok(op)
}

/// An extension keeps the inherited operation's kind, parameterization and tags.
pub(crate) fn check_redeclaration(
    parent: &Operator,
    kind: OperationKind,
    spec: &OpSpec,
) -> Result<()> {
    let op = parent.name().to_string();
    if parent.is_final() {
        return Err(DeclarationError::FinalOperation { op }.into());
    }
    if parent.kind() != kind {
        return Err(DeclarationError::KindChanged {
            op,
            from: parent.kind(),
            to: kind,
        }
        .into());
    }
    let old = parent.spec();
    if old.parameterization() != spec.parameterization() {
        return Err(DeclarationError::ParameterizationChanged {
            op,
            from: old.parameterization(),
            to: spec.parameterization(),
        }
        .into());
    }
    for (component, from, to) in [
        (SpecComponent::Input, &old.input, &spec.input),
        (SpecComponent::Output, &old.output, &spec.output),
    ] {
        if from != to {
            return Err(DeclarationError::TypeTagChanged {
                op,
                component,
                from: TagSlot(from.clone()),
                to: TagSlot(to.clone()),
            }
            .into());
        }
    }
    Ok(())
}

fn check_handlers<H>(adt: &Adt, op: &str, handlers: &Handlers<H>) -> Result<()> {
    let mut seen = HashSet::new();
    for (variant, _) in &handlers.specific {
        if adt.variant(variant).is_none() {
            return Err(DeclarationError::UnknownVariant {
                context: op.to_string(),
                variant: variant.to_string(),
            }
            .into());
        }
        if !seen.insert(variant.clone()) {
            return Err(DeclarationError::DuplicateHandler {
                op: op.to_string(),
                variant: variant.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn resolve_table<H: Handler>(
    parent: Option<&HandlerTable<H>>,
    handlers: Handlers<H>,
    generation: &Arc<str>,
) -> HandlerTable<H> {
    let mut specific = parent.map(|table| table.specific.clone()).unwrap_or_default();
    for (variant, handler) in handlers.specific {
        let overridden = parent.and_then(|table| table.lookup(&variant)).cloned();
        specific.insert(
            variant,
            Arc::new(HandlerEntry {
                handler,
                parent: overridden,
                generation: generation.clone(),
            }),
        );
    }

    let inherited_wildcard = parent.and_then(|table| table.wildcard.clone());
    let wildcard = match handlers.wildcard {
        Some(handler) => Some(Arc::new(HandlerEntry {
            handler,
            parent: inherited_wildcard,
            generation: generation.clone(),
        })),
        None => inherited_wildcard,
    };

    HandlerTable { specific, wildcard }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Cases;
    use crate::value::Value;
    use crate::variant::Field;

    fn peano() -> Adt {
        Adt::builder("Peano")
            .singleton("Zero")
            .variant("Succ", [Field::family("pred")])
            .build()
            .unwrap()
    }

    #[test]
    fn test_override_links_to_parent_specific() {
        let base = peano();
        base.declare_fold(
            "toValue",
            OpSpec::new(),
            Cases::new()
                .on("Zero", |_| Ok(Value::Int(0)))
                .on("Succ", |cx| Ok(Value::Int(cx.int("pred")? + 1))),
        )
        .unwrap();
        let child = base.extend("Child").build().unwrap();
        let op = child
            .declare_fold(
                "toValue",
                OpSpec::new(),
                Cases::new().on("Succ", |cx| Ok(Value::Int(cx.parent()?.as_int()? * 10))),
            )
            .unwrap();

        let table = op.cases().unwrap();
        let succ = table.lookup("Succ").unwrap();
        assert_eq!(&*succ.generation, "Child");
        assert_eq!(succ.parent.as_ref().map(|p| &*p.generation), Some("Peano"));
        assert_eq!(&*table.lookup("Zero").unwrap().generation, "Peano");
    }

    #[test]
    fn test_child_wildcard_keeps_parent_specific() {
        let base = peano();
        base.declare_fold(
            "label",
            OpSpec::new(),
            Cases::new()
                .on("Zero", |_| Ok(Value::str("zero")))
                .wildcard(|_| Ok(Value::str("other"))),
        )
        .unwrap();
        let child = base.extend("Child").build().unwrap();
        let op = child
            .declare_fold(
                "label",
                OpSpec::new(),
                Cases::new().wildcard(|_| Ok(Value::str("child"))),
            )
            .unwrap();

        let table = op.cases().unwrap();
        assert_eq!(&*table.lookup("Zero").unwrap().generation, "Peano");
        let succ = table.lookup("Succ").unwrap();
        assert_eq!(&*succ.generation, "Child");
        assert!(succ.parent.is_some());
    }

    #[test]
    fn test_unknown_variant_in_handler_table() {
        let err = peano()
            .declare_fold("toValue", OpSpec::new(), Cases::new().on("Sux", |_| Ok(Value::Unit)))
            .unwrap_err();
        assert!(matches!(
            err.as_declaration(),
            Some(DeclarationError::UnknownVariant { variant, .. }) if variant == "Sux"
        ));
    }

    #[test]
    fn test_duplicate_handler() {
        let err = peano()
            .declare_match(
                "isZero",
                OpSpec::new(),
                Cases::new()
                    .on("Zero", |_| Ok(Value::Bool(true)))
                    .on("Zero", |_| Ok(Value::Bool(false))),
            )
            .unwrap_err();
        assert!(matches!(
            err.as_declaration(),
            Some(DeclarationError::DuplicateHandler { .. })
        ));
    }
}
