//! Handler resolution and open recursion.
//!
//! Every node is interpreted through the more derived of the generation the
//! traversal arrived with and the generation the node was built through. The
//! operator is re-resolved by name for that generation, so an override
//! declared on an extension also runs for the subtrees it recurses into.

use std::collections::HashMap;
use std::sync::Arc;

use refold_core::{DispatchError, Result, TypeTag, ValueError};

use crate::adt::{Adt, AdtId};
use crate::fields::Fields;
use crate::handler::{CaseFn, Cx, GuardFn, HandlerTable};
use crate::instance::Instance;
use crate::merge;
use crate::operator::{Operator, OperatorBody};
use crate::scheme::{Layer, Slot, hylo};
use crate::value::{Func, Value};
use crate::variant::{FieldSpec, Variant};

/// Resolves one operation name per generation, once.
pub(crate) struct OperatorCache {
    name: Arc<str>,
    resolved: HashMap<AdtId, Arc<Operator>>,
}

impl OperatorCache {
    pub(crate) fn new(name: &Arc<str>) -> Self {
        OperatorCache {
            name: name.clone(),
            resolved: HashMap::new(),
        }
    }

    pub(crate) fn at(&mut self, generation: &Adt) -> Result<Arc<Operator>> {
        if let Some(op) = self.resolved.get(&generation.id()) {
            return Ok(op.clone());
        }
        let op = generation.resolve(&self.name)?;
        self.resolved.insert(generation.id(), op.clone());
        Ok(op)
    }
}

pub(crate) fn invoke(adt: &Adt, op: &str, value: &Value, arg: Option<Value>) -> Result<Value> {
    let Value::Instance(instance) = value else {
        return Err(DispatchError::NotAnInstance {
            op: op.to_string(),
            found: value.type_name(),
        }
        .into());
    };
    let generation = adt.more_derived(instance.origin());
    let operator = generation.resolve(op)?;
    if operator.is_generator() {
        return Err(DispatchError::Generator { op: op.to_string() }.into());
    }
    check_argument(&operator, arg.as_ref())?;

    tracing::trace!(
        op = %op,
        adt = %generation.name(),
        variant = %instance.variant_name(),
        "Invoking operation"
    );

    let memo_key = (operator.id(), generation.id());
    let memoize = arg.is_none() && generation.config().memoize_getters;
    if memoize {
        if let Some(value) = instance.memo_get(&memo_key) {
            return Ok(value);
        }
    }

    let result = match &operator.body {
        OperatorBody::Fold(_) => match &arg {
            None => fold(&operator, instance, &generation)?,
            Some(arg) => fold_with(operator.name_arc(), instance, &generation, arg)?,
        },
        OperatorBody::Match(table) => {
            match_node(&operator, table, instance, &generation, arg.as_ref())?
        }
        OperatorBody::Map(_) => map(&operator, instance, &generation, arg.as_ref())?,
        OperatorBody::Merge(pipeline) => {
            merge::run_on_instance(&operator, pipeline, instance, &generation)?
        }
        OperatorBody::Unfold(_) => {
            return Err(DispatchError::Generator { op: op.to_string() }.into());
        }
    };

    if memoize {
        instance.memo_insert(memo_key, result.clone());
    }
    Ok(result)
}

pub(crate) fn generate(adt: &Adt, op: &str, seed: Value) -> Result<Value> {
    let operator = adt.resolve(op)?;
    check_seed(&operator, &seed)?;
    tracing::trace!(op = %op, adt = %adt.name(), seed = %seed, "Generating");
    match &operator.body {
        OperatorBody::Unfold(_) => unfold(&operator, seed, adt),
        OperatorBody::Merge(pipeline) if pipeline.generator.is_some() => {
            merge::run_generated(&operator, pipeline, seed, adt)
        }
        _ => Err(DispatchError::NotAGenerator { op: op.to_string() }.into()),
    }
}

fn check_argument(op: &Operator, arg: Option<&Value>) -> Result<()> {
    match (&op.spec().input, arg) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(DispatchError::UnexpectedArgument {
            op: op.name().to_string(),
        }
        .into()),
        (Some(_), None) => Err(DispatchError::MissingArgument {
            op: op.name().to_string(),
        }
        .into()),
        (Some(tag), Some(arg)) => check_tag(op, tag, arg),
    }
}

fn check_seed(op: &Operator, seed: &Value) -> Result<()> {
    match &op.spec().input {
        Some(tag) => check_tag(op, tag, seed),
        None => Ok(()),
    }
}

fn check_tag(op: &Operator, tag: &TypeTag, value: &Value) -> Result<()> {
    if value.matches_tag(tag) {
        Ok(())
    } else {
        Err(ValueError::ArgumentType {
            op: op.name().to_string(),
            expected: tag.clone(),
            found: value.type_name(),
        }
        .into())
    }
}

/// Expand a built node: recursive fields become seeds, the rest pass through.
pub(crate) fn expand_instance(node: Instance, threaded: &Adt) -> Result<Layer<Instance>> {
    let slots = node
        .variant()
        .fields()
        .iter()
        .zip(node.values())
        .map(|(field, value)| match value {
            Value::Instance(child) if field.spec().is_family() => Slot::Rec(child.clone()),
            other => Slot::Plain(other.clone()),
        })
        .collect();
    Ok(Layer {
        variant: node.variant().clone(),
        generation: threaded.more_derived(node.origin()),
        receiver: Some(node),
        slots,
    })
}

/// Expand a seed by asking the unfold's guards which variant to build.
pub(crate) fn expand_seed(
    guards: &mut OperatorCache,
    seed: Value,
    generation: &Adt,
) -> Result<Layer<Value>> {
    let op = guards.at(generation)?;
    let (variant, mut fields) = select(&op, generation, &seed)?;

    let mut slots = Vec::with_capacity(variant.fields().len());
    for field in variant.fields() {
        let value = fields.remove(field.name()).ok_or_else(|| ValueError::MissingField {
            variant: variant.name().to_string(),
            field: field.name().to_string(),
        })?;
        slots.push(if field.spec().is_family() {
            Slot::Rec(value)
        } else {
            Slot::Plain(value)
        });
    }
    if let Some(extra) = fields.names().next() {
        return Err(ValueError::UnexpectedField {
            variant: variant.name().to_string(),
            field: extra.to_string(),
        }
        .into());
    }

    Ok(Layer {
        variant,
        generation: generation.clone(),
        receiver: None,
        slots,
    })
}

/// Try guards in lineage variant order; the first `Some` wins.
fn select(op: &Operator, generation: &Adt, seed: &Value) -> Result<(Variant, Fields)> {
    let table = guard_table(op)?;
    let empty = Fields::new();
    for variant in generation.variants() {
        let Some(entry) = table.specific.get(variant.name()) else {
            continue;
        };
        let cx = Cx {
            op: op.name(),
            variant,
            fields: &empty,
            receiver: None,
            arg: Some(seed),
            adt: generation,
            parent: None,
        };
        if let Some(fields) = entry.run(&cx)? {
            return Ok((variant.clone(), fields));
        }
    }
    Err(DispatchError::NoGuardMatched {
        op: op.name().to_string(),
        seed: seed.to_string(),
    }
    .into())
}

fn guard_table(op: &Operator) -> Result<&HandlerTable<GuardFn>> {
    op.guards().ok_or_else(|| {
        DispatchError::NotAGenerator {
            op: op.name().to_string(),
        }
        .into()
    })
}

fn case_table(op: &Operator) -> Result<&HandlerTable<CaseFn>> {
    op.cases().ok_or_else(|| {
        DispatchError::UnknownOperation {
            adt: op.owner_name().to_string(),
            op: op.name().to_string(),
        }
        .into()
    })
}

/// Run the case handler for `variant` over already prepared fields.
pub(crate) fn apply_case(
    op: &Operator,
    variant: &Variant,
    fields: &Fields,
    receiver: Option<&Instance>,
    generation: &Adt,
    arg: Option<&Value>,
) -> Result<Value> {
    let table = case_table(op)?;
    let entry = table.lookup(variant.name()).ok_or_else(|| DispatchError::NoHandler {
        op: op.name().to_string(),
        variant: variant.name().to_string(),
    })?;
    tracing::trace!(
        op = %op.name(),
        variant = %variant.name(),
        handler = %entry.generation,
        "Dispatching"
    );
    entry.run(&Cx {
        op: op.name(),
        variant,
        fields,
        receiver,
        arg,
        adt: generation,
        parent: None,
    })
}

/// Run the map transform for `variant` and merge its result into `fields`.
///
/// Recursive fields already hold mapped children; a transform may read them
/// but not replace them.
pub(crate) fn apply_transform(
    op: &Operator,
    variant: &Variant,
    mut fields: Fields,
    receiver: Option<&Instance>,
    generation: &Adt,
    arg: Option<&Value>,
) -> Result<Fields> {
    let Some(table) = op.transforms() else {
        return Ok(fields);
    };
    let Some(entry) = table.lookup(variant.name()) else {
        return Ok(fields);
    };
    let out = entry.run(&Cx {
        op: op.name(),
        variant,
        fields: &fields,
        receiver,
        arg,
        adt: generation,
        parent: None,
    })?;

    for (name, value) in out {
        let Some(index) = variant.field_index(&name) else {
            return Err(ValueError::UnexpectedField {
                variant: variant.name().to_string(),
                field: name.to_string(),
            }
            .into());
        };
        let recursive = matches!(variant.fields()[index].spec(), FieldSpec::Family);
        if recursive && fields.get(&name) != Some(&value) {
            return Err(ValueError::RecursiveField {
                variant: variant.name().to_string(),
                field: name.to_string(),
            }
            .into());
        }
        fields.insert(name, value);
    }
    Ok(fields)
}

fn fold(op: &Operator, instance: &Instance, generation: &Adt) -> Result<Value> {
    let mut cache = OperatorCache::new(op.name_arc());
    hylo(
        instance.clone(),
        generation.clone(),
        &mut expand_instance,
        &mut |layer: Layer<Value>| {
            let op = cache.at(&layer.generation)?;
            let fields = layer.fields();
            apply_case(
                &op,
                &layer.variant,
                &fields,
                layer.receiver.as_ref(),
                &layer.generation,
                None,
            )
        },
    )
}

/// Parameterized fold: recursive fields become continuations taking the
/// argument for the child, so the fold runs on the native stack.
fn fold_with(name: &Arc<str>, instance: &Instance, threaded: &Adt, arg: &Value) -> Result<Value> {
    let generation = threaded.more_derived(instance.origin());
    let op = generation.resolve(name)?;

    let fields: Fields = instance
        .variant()
        .fields()
        .iter()
        .zip(instance.values())
        .map(|(field, value)| {
            let value = match value {
                Value::Instance(child) if field.spec().is_family() => {
                    let name = name.clone();
                    let child = child.clone();
                    let generation = generation.clone();
                    Value::Func(Func::new(move |arg| fold_with(&name, &child, &generation, &arg)))
                }
                other => other.clone(),
            };
            (field.name_arc().clone(), value)
        })
        .collect();

    apply_case(
        &op,
        instance.variant(),
        &fields,
        Some(instance),
        &generation,
        Some(arg),
    )
}

fn match_node(
    op: &Operator,
    table: &HandlerTable<CaseFn>,
    instance: &Instance,
    generation: &Adt,
    arg: Option<&Value>,
) -> Result<Value> {
    let fields = instance.fields();
    let entry = table
        .lookup(instance.variant_name())
        .ok_or_else(|| DispatchError::NoHandler {
            op: op.name().to_string(),
            variant: instance.variant_name().to_string(),
        })?;
    entry.run(&Cx {
        op: op.name(),
        variant: instance.variant(),
        fields: &fields,
        receiver: Some(instance),
        arg,
        adt: generation,
        parent: None,
    })
}

fn map(op: &Operator, instance: &Instance, generation: &Adt, arg: Option<&Value>) -> Result<Value> {
    let mut cache = OperatorCache::new(op.name_arc());
    hylo(
        instance.clone(),
        generation.clone(),
        &mut expand_instance,
        &mut |layer: Layer<Value>| {
            let op = cache.at(&layer.generation)?;
            let fields = apply_transform(
                &op,
                &layer.variant,
                layer.fields(),
                layer.receiver.as_ref(),
                &layer.generation,
                arg,
            )?;
            Ok(Value::Instance(layer.generation.construct(&layer.variant, fields)?))
        },
    )
}

fn unfold(op: &Operator, seed: Value, generation: &Adt) -> Result<Value> {
    let mut guards = OperatorCache::new(op.name_arc());
    hylo(
        seed,
        generation.clone(),
        &mut |seed, generation: &Adt| expand_seed(&mut guards, seed, generation),
        &mut |layer: Layer<Value>| {
            let fields = layer.fields();
            Ok(Value::Instance(layer.generation.construct(&layer.variant, fields)?))
        },
    )
}
