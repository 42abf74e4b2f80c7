//! Fusing a generator, transforms and a consumer into one traversal.
//!
//! A merged operator keeps only the names of its stages. At run time every
//! layer the generator (or the input instance) produces is fed through the
//! transforms and straight into the consumer's handler for that variant, so
//! intermediate structures are never built. Stages are re-resolved per
//! generation like any other operation.

use std::sync::Arc;

use refold_core::{
    ArityOffenders, DeclarationError, DispatchError, NameKind, Names, OperationKind, Result,
    StageRole,
};

use crate::adt::Adt;
use crate::dispatch::{OperatorCache, apply_case, apply_transform, expand_instance, expand_seed};
use crate::extend::check_redeclaration;
use crate::fields::Fields;
use crate::instance::Instance;
use crate::operator::{OpSpec, Operator, OperatorBody};
use crate::scheme::{Layer, hylo};
use crate::value::Value;

/// Stage names of a merged operator, in execution order.
#[derive(Clone, Debug)]
pub(crate) struct Pipeline {
    pub(crate) generator: Option<Arc<str>>,
    pub(crate) transforms: Vec<Arc<str>>,
    pub(crate) consumer: Option<(Arc<str>, OperationKind)>,
}

pub(crate) fn declare(adt: &Adt, name: &str, operations: &[&str]) -> Result<Arc<Operator>> {
    if operations.len() < 2 {
        return Err(DeclarationError::MergeTooFew {
            op: name.to_string(),
            count: operations.len(),
        }
        .into());
    }

    let mut stages = Vec::with_capacity(operations.len());
    for &constituent in operations {
        let op = adt
            .operation(constituent)
            .ok_or_else(|| DeclarationError::MergeUnresolved {
                op: name.to_string(),
                missing: constituent.to_string(),
            })?;
        stages.push(op);
    }

    if let Some(nested) = stages.iter().find(|op| op.is_final()) {
        return Err(DeclarationError::MergeNested {
            op: name.to_string(),
            constituent: nested.name().to_string(),
        }
        .into());
    }

    let with_role = |role: StageRole| -> Vec<String> {
        stages
            .iter()
            .filter(|op| op.kind().role() == Some(role))
            .map(|op| op.name().to_string())
            .collect()
    };
    let surplus = |names: Vec<String>| Names(if names.len() > 1 { names } else { Vec::new() });
    let offenders = ArityOffenders {
        generators: surplus(with_role(StageRole::Generator)),
        consumers: surplus(with_role(StageRole::Consumer)),
    };
    if !offenders.generators.0.is_empty() || !offenders.consumers.0.is_empty() {
        return Err(DeclarationError::MergeArity {
            op: name.to_string(),
            offenders,
        }
        .into());
    }

    let mut reached = StageRole::Generator;
    for op in &stages {
        let Some(role) = op.kind().role() else {
            continue;
        };
        if role < reached {
            return Err(DeclarationError::MergeOrder {
                op: name.to_string(),
                constituent: op.name().to_string(),
            }
            .into());
        }
        reached = role;
    }

    if let Some(op) = stages
        .iter()
        .find(|op| op.kind() != OperationKind::Unfold && op.spec().is_parameterized())
    {
        return Err(DeclarationError::MergeParameterized {
            op: name.to_string(),
            constituent: op.name().to_string(),
        }
        .into());
    }

    let generators = with_role(StageRole::Generator);
    let has_generator = !generators.is_empty();
    let name_kind = if has_generator {
        NameKind::Generator
    } else {
        NameKind::Operation
    };
    adt.check_operation_name(name, name_kind)?;

    let spec = OpSpec {
        input: stages
            .iter()
            .find(|op| op.kind() == OperationKind::Unfold)
            .and_then(|op| op.spec().input.clone()),
        output: stages.last().and_then(|op| op.spec().output.clone()),
    };
    if let Some(parent_op) = adt.parent().and_then(|parent| parent.operation(name)) {
        check_redeclaration(&parent_op, OperationKind::Merge, &spec)?;
    }

    let mut pipeline = Pipeline {
        generator: None,
        transforms: Vec::new(),
        consumer: None,
    };
    for op in &stages {
        match op.kind() {
            OperationKind::Unfold => pipeline.generator = Some(op.name_arc().clone()),
            OperationKind::Map => pipeline.transforms.push(op.name_arc().clone()),
            kind => pipeline.consumer = Some((op.name_arc().clone(), kind)),
        }
    }

    let op = adt.install(Operator::new(name, spec, adt, OperatorBody::Merge(pipeline)))?;
    tracing::debug!(
        op = %name,
        adt = %adt.name(),
        stages = ?operations,
        "Declared merged operation"
    );
    Ok(op)
}

/// Run a pipeline that starts from a seed.
pub(crate) fn run_generated(
    op: &Operator,
    pipeline: &Pipeline,
    seed: Value,
    adt: &Adt,
) -> Result<Value> {
    let Some(generator) = &pipeline.generator else {
        return Err(DispatchError::NotAGenerator {
            op: op.name().to_string(),
        }
        .into());
    };
    tracing::trace!(op = %op.name(), adt = %adt.name(), "Running fused pipeline from seed");
    let mut guards = OperatorCache::new(generator);
    let mut stages = Stages::new(pipeline);
    run(&mut stages, seed, adt, &mut |seed, generation: &Adt| {
        expand_seed(&mut guards, seed, generation)
    })
}

/// Run a pipeline without a generator over an existing instance.
pub(crate) fn run_on_instance(
    op: &Operator,
    pipeline: &Pipeline,
    instance: &Instance,
    generation: &Adt,
) -> Result<Value> {
    tracing::trace!(op = %op.name(), adt = %generation.name(), "Running fused pipeline");
    let mut stages = Stages::new(pipeline);
    run(&mut stages, instance.clone(), generation, &mut expand_instance)
}

fn run<S, E>(stages: &mut Stages, seed: S, generation: &Adt, expand: &mut E) -> Result<Value>
where
    E: FnMut(S, &Adt) -> Result<Layer<S>>,
{
    if !stages.ends_in_match() {
        return hylo(seed, generation.clone(), expand, &mut |layer: Layer<Value>| {
            stages.collapse(layer)
        });
    }

    // A match handler sees raw children, so those are built; the root is not.
    let (root, seeds) = expand(seed, generation)?.split();
    let mut children = Vec::with_capacity(seeds.len());
    for child in seeds {
        children.push(hylo(
            child,
            root.generation.clone(),
            expand,
            &mut |layer: Layer<Value>| stages.materialize(layer),
        )?);
    }
    stages.collapse(root.fill(children))
}

/// Transform and consumer operators of one run, resolved per generation.
struct Stages {
    transforms: Vec<OperatorCache>,
    consumer: Option<(OperatorCache, OperationKind)>,
}

impl Stages {
    fn new(pipeline: &Pipeline) -> Self {
        Stages {
            transforms: pipeline.transforms.iter().map(OperatorCache::new).collect(),
            consumer: pipeline
                .consumer
                .as_ref()
                .map(|(name, kind)| (OperatorCache::new(name), *kind)),
        }
    }

    fn ends_in_match(&self) -> bool {
        matches!(self.consumer, Some((_, OperationKind::Match)))
    }

    /// Apply every transform in order. Only the first stage sees the raw node.
    fn transform<'a>(
        &mut self,
        layer: &'a Layer<Value>,
    ) -> Result<(Fields, Option<&'a Instance>)> {
        let mut fields = layer.fields();
        let mut receiver = layer.receiver.as_ref();
        for cache in &mut self.transforms {
            let op = cache.at(&layer.generation)?;
            fields = apply_transform(
                &op,
                &layer.variant,
                fields,
                receiver.take(),
                &layer.generation,
                None,
            )?;
        }
        Ok((fields, receiver))
    }

    fn collapse(&mut self, layer: Layer<Value>) -> Result<Value> {
        let (fields, receiver) = self.transform(&layer)?;
        match &mut self.consumer {
            Some((cache, _)) => {
                let op = cache.at(&layer.generation)?;
                apply_case(
                    &op,
                    &layer.variant,
                    &fields,
                    receiver,
                    &layer.generation,
                    None,
                )
            }
            None => Ok(Value::Instance(
                layer.generation.construct(&layer.variant, fields)?,
            )),
        }
    }

    fn materialize(&mut self, layer: Layer<Value>) -> Result<Value> {
        let (fields, _) = self.transform(&layer)?;
        Ok(Value::Instance(
            layer.generation.construct(&layer.variant, fields)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::handler::{Cases, Guards, Transforms};
    use crate::variant::Field;
    use refold_core::TypeTag;

    fn list() -> Adt {
        let adt = Adt::builder("List")
            .singleton("Nil")
            .variant("Cons", [Field::of("head", TypeTag::Int), Field::family("tail")])
            .build()
            .unwrap();
        adt.declare_unfold(
            "Range",
            OpSpec::new().with_input(TypeTag::Int),
            Guards::new()
                .on("Nil", |cx| Ok((cx.seed()?.as_int()? <= 0).then(Fields::new)))
                .on("Cons", |cx| {
                    let n = cx.seed()?.as_int()?;
                    Ok(Some(fields! { head: n, tail: n - 1 }))
                }),
        )
        .unwrap();
        adt.declare_unfold(
            "Countdown",
            OpSpec::new().with_input(TypeTag::Int),
            Guards::new().on("Nil", |_| Ok(Some(Fields::new()))),
        )
        .unwrap();
        adt.declare_map(
            "doubled",
            OpSpec::new(),
            Transforms::new().on("Cons", |cx| Ok(fields! { head: cx.int("head")? * 2 })),
        )
        .unwrap();
        adt.declare_fold(
            "sum",
            OpSpec::new().with_output(TypeTag::Int),
            Cases::new()
                .on("Nil", |_| Ok(Value::Int(0)))
                .on("Cons", |cx| Ok(Value::Int(cx.int("head")? + cx.int("tail")?))),
        )
        .unwrap();
        adt.declare_match(
            "head",
            OpSpec::new(),
            Cases::new()
                .on("Cons", |cx| Ok(cx.field("head")?.clone()))
                .wildcard(|_| Ok(Value::Unit)),
        )
        .unwrap();
        adt
    }

    fn declaration_error(adt: &Adt, name: &str, ops: &[&str]) -> DeclarationError {
        adt.declare_merge(name, ops)
            .unwrap_err()
            .as_declaration()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_generator_and_consumer() {
        let adt = list();
        let op = adt.declare_merge("SumRange", &["Range", "sum"]).unwrap();
        assert!(op.is_generator());
        assert_eq!(op.spec().input, Some(TypeTag::Int));
        assert_eq!(op.spec().output, Some(TypeTag::Int));
        assert_eq!(adt.generate("SumRange", 4).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_fused_run_leaves_pool_untouched() {
        let adt = list();
        adt.declare_merge("DoubledSum", &["Range", "doubled", "sum"]).unwrap();
        assert_eq!(adt.generate("DoubledSum", 3).unwrap(), Value::Int(12));
        assert_eq!(adt.pooled_count(), 0);
    }

    #[test]
    fn test_match_consumer_sees_built_children() {
        let adt = list();
        adt.declare_merge("FirstDoubled", &["Range", "doubled", "head"]).unwrap();
        assert_eq!(adt.generate("FirstDoubled", 3).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_instance_pipeline() {
        let adt = list();
        adt.declare_merge("doubledSum", &["doubled", "sum"]).unwrap();
        let list = adt.generate("Range", 3).unwrap();
        let result = list.as_instance().unwrap().get("doubledSum").unwrap();
        assert_eq!(result, Value::Int(12));
    }

    #[test]
    fn test_too_few() {
        let adt = list();
        let err = declaration_error(&adt, "justSum", &["sum"]);
        assert!(matches!(err, DeclarationError::MergeTooFew { count: 1, .. }));
        let err = declaration_error(&adt, "nothing", &[]);
        assert!(matches!(err, DeclarationError::MergeTooFew { count: 0, .. }));
    }

    #[test]
    fn test_unresolved() {
        let err = declaration_error(&list(), "Broken", &["Range", "product"]);
        assert!(matches!(
            err,
            DeclarationError::MergeUnresolved { missing, .. } if missing == "product"
        ));
    }

    #[test]
    fn test_every_extra_generator_is_named() {
        let err = declaration_error(&list(), "Both", &["Range", "Countdown", "sum"]);
        insta::assert_snapshot!(
            err.to_string(),
            @"merge `Both` has more than one generator: `Range`, `Countdown`"
        );
    }

    #[test]
    fn test_two_consumers() {
        let err = declaration_error(&list(), "SumHead", &["Range", "sum", "head"]);
        assert!(matches!(
            err,
            DeclarationError::MergeArity { offenders, .. }
                if offenders.generators.0.is_empty() && offenders.consumers.0.len() == 2
        ));
    }

    #[test]
    fn test_both_arity_violations_are_reported() {
        let err = declaration_error(&list(), "Bad", &["Range", "Countdown", "sum", "head"]);
        insta::assert_snapshot!(
            err.to_string(),
            @"merge `Bad` has more than one generator: `Range`, `Countdown`; more than one consumer: `sum`, `head`"
        );
    }

    #[test]
    fn test_out_of_order() {
        let err = declaration_error(&list(), "Backwards", &["doubled", "Range"]);
        assert!(matches!(
            err,
            DeclarationError::MergeOrder { constituent, .. } if constituent == "Range"
        ));
    }

    #[test]
    fn test_nested_merge() {
        let adt = list();
        adt.declare_merge("SumRange", &["Range", "sum"]).unwrap();
        let err = declaration_error(&adt, "Again", &["SumRange", "doubled"]);
        assert!(matches!(err, DeclarationError::MergeNested { .. }));
    }

    #[test]
    fn test_parameterized_transform() {
        let adt = list();
        adt.declare_map(
            "scaled",
            OpSpec::new().with_input(TypeTag::Int),
            Transforms::new().on("Cons", |cx| {
                Ok(fields! { head: cx.int("head")? * cx.arg()?.as_int()? })
            }),
        )
        .unwrap();
        let err = declaration_error(&adt, "Scaled", &["Range", "scaled"]);
        assert!(matches!(err, DeclarationError::MergeParameterized { .. }));
    }

    #[test]
    fn test_naming_follows_generator() {
        let adt = list();
        let err = declaration_error(&adt, "sumRange", &["Range", "sum"]);
        assert!(matches!(err, DeclarationError::InvalidName { .. }));
        let err = declaration_error(&adt, "DoubledSum", &["doubled", "sum"]);
        assert!(matches!(err, DeclarationError::InvalidName { .. }));
        let err = declaration_error(&adt, "tail", &["doubled", "sum"]);
        assert!(matches!(err, DeclarationError::NameCollision { .. }));
    }
}
