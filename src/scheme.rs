//! Worklist evaluator shared by fold, unfold, map and fused pipelines.
//!
//! `hylo` expands seeds into layers and collapses layers bottom-up without
//! native recursion, so traversal depth is bounded by the heap. A seed is
//! whatever drives expansion: an instance for folds and maps, a plain value
//! for unfolds.

use refold_core::Result;

use crate::adt::Adt;
use crate::fields::Fields;
use crate::instance::Instance;
use crate::value::Value;
use crate::variant::Variant;

pub(crate) enum Slot<S> {
    /// A non-recursive field, passed through as is.
    Plain(Value),
    /// A recursive field, still to be expanded.
    Rec(S),
}

/// One node of a traversal: a variant with its field slots.
pub(crate) struct Layer<S> {
    pub(crate) variant: Variant,
    /// Generation the node is interpreted through, threaded to its children.
    pub(crate) generation: Adt,
    /// The materialized node, when there is one.
    pub(crate) receiver: Option<Instance>,
    pub(crate) slots: Vec<Slot<S>>,
}

impl<S> Layer<S> {
    pub(crate) fn split(self) -> (Layer<()>, Vec<S>) {
        let mut seeds = Vec::new();
        let slots = self
            .slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Plain(value) => Slot::Plain(value),
                Slot::Rec(seed) => {
                    seeds.push(seed);
                    Slot::Rec(())
                }
            })
            .collect();
        let layer = Layer {
            variant: self.variant,
            generation: self.generation,
            receiver: self.receiver,
            slots,
        };
        (layer, seeds)
    }
}

impl Layer<()> {
    pub(crate) fn holes(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Rec(())))
            .count()
    }

    /// Fill recursive slots, in order, with collapsed children.
    pub(crate) fn fill(self, children: Vec<Value>) -> Layer<Value> {
        debug_assert_eq!(children.len(), self.holes(), "child count must match recursive slots");
        let mut children = children.into_iter();
        let slots = self
            .slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Plain(value) => Slot::Plain(value),
                Slot::Rec(()) => Slot::Rec(children.next().unwrap_or_default()),
            })
            .collect();
        Layer {
            variant: self.variant,
            generation: self.generation,
            receiver: self.receiver,
            slots,
        }
    }
}

impl Layer<Value> {
    /// The slots as a named record.
    pub(crate) fn fields(&self) -> Fields {
        self.variant
            .fields()
            .iter()
            .zip(&self.slots)
            .map(|(field, slot)| {
                let value = match slot {
                    Slot::Plain(value) | Slot::Rec(value) => value.clone(),
                };
                (field.name_arc().clone(), value)
            })
            .collect()
    }
}

enum Work<S> {
    Expand(S, Adt),
    Collapse(Layer<()>),
}

/// Expand `seed` through `generation` and collapse the resulting tree.
///
/// Children of a layer are expanded with the layer's generation, so a node
/// built through a more derived generation carries it down to its subtree.
pub(crate) fn hylo<S, E, C>(
    seed: S,
    generation: Adt,
    expand: &mut E,
    collapse: &mut C,
) -> Result<Value>
where
    E: FnMut(S, &Adt) -> Result<Layer<S>>,
    C: FnMut(Layer<Value>) -> Result<Value>,
{
    let mut work = vec![Work::Expand(seed, generation)];
    let mut done: Vec<Value> = Vec::new();

    while let Some(item) = work.pop() {
        match item {
            Work::Expand(seed, threaded) => {
                let (layer, seeds) = expand(seed, &threaded)?.split();
                let child_generation = layer.generation.clone();
                work.push(Work::Collapse(layer));
                for seed in seeds.into_iter().rev() {
                    work.push(Work::Expand(seed, child_generation.clone()));
                }
            }
            Work::Collapse(layer) => {
                let children = done.split_off(done.len() - layer.holes());
                done.push(collapse(layer.fill(children))?);
            }
        }
    }

    Ok(done.pop().unwrap_or_default())
}
