//! Structural recursion, extension and open recursion through `Family` fields.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{from_slice, init_tracing, list, peano, succ};
use refold::{Adt, Cases, Config, DispatchError, OpSpec, TypeTag, Value};

#[test]
fn test_list_folds() {
    let adt = list();
    let xs = from_slice(&adt, &[1, 2, 3]);
    assert_eq!(xs.get("sum").unwrap(), Value::Int(6));
    assert_eq!(xs.get("length").unwrap(), Value::Int(3));
    assert_eq!(xs.get("product").unwrap(), Value::Int(6));
}

fn extended_peano(base: &Adt) -> Adt {
    let extended = base.extend("ExtendedPeano").build().unwrap();
    extended
        .declare_fold(
            "toValue",
            OpSpec::new(),
            Cases::new().on("Succ", |cx| Ok(Value::Int(cx.parent()?.as_int()? * 10))),
        )
        .unwrap();
    extended
}

#[test]
fn test_override_reaches_parent_result() {
    init_tracing();
    let base = peano();
    let extended = extended_peano(&base);

    let one = succ(&extended, extended.singleton("Zero").unwrap());
    assert_eq!(one.get("toValue").unwrap(), Value::Int(10));
    let two = succ(&extended, one);
    assert_eq!(two.get("toValue").unwrap(), Value::Int(110));
}

#[test]
fn test_parameterized_override_threads_argument() {
    let base = list();
    base.declare_fold(
        "scaled",
        OpSpec::new().with_input(TypeTag::Int),
        Cases::new()
            .on("Nil", |_| Ok(Value::Int(0)))
            .on("Cons", |cx| {
                let factor = cx.arg()?.as_int()?;
                let rest = cx.field("tail")?.call(factor)?.as_int()?;
                Ok(Value::Int(cx.int("head")? * factor + rest))
            }),
    )
    .unwrap();
    let child = base.extend("Scaling").build().unwrap();
    child
        .declare_fold(
            "scaled",
            OpSpec::new().with_input(TypeTag::Int),
            Cases::new().on("Cons", |cx| {
                Ok(Value::Int(cx.parent()?.as_int()? + cx.arg()?.as_int()?))
            }),
        )
        .unwrap();

    // Every cell adds the argument once, including cells reached through the
    // parent handler's `tail` continuation.
    let xs = from_slice(&child, &[1, 2]);
    assert_eq!(xs.call("scaled", 10).unwrap(), Value::Int(50));

    let ys = from_slice(&base, &[1, 2]);
    assert_eq!(ys.call("scaled", 10).unwrap(), Value::Int(30));
    let value = Value::Instance(ys);
    assert_eq!(child.invoke("scaled", &value, Some(Value::Int(10))).unwrap(), Value::Int(50));
    let err = child.invoke("scaled", &value, None).unwrap_err();
    assert!(matches!(err.as_dispatch(), Some(DispatchError::MissingArgument { .. })));
}

#[test]
fn test_base_instances_keep_base_semantics() {
    let base = peano();
    let extended = extended_peano(&base);

    let two = succ(&base, succ(&base, base.singleton("Zero").unwrap()));
    assert_eq!(two.get("toValue").unwrap(), Value::Int(2));

    // Interpreting the same structure through the extension re-threads every
    // recursive call through the overriding handler.
    let value = Value::Instance(two);
    assert_eq!(extended.invoke("toValue", &value, None).unwrap(), Value::Int(110));
    assert_eq!(base.invoke("toValue", &value, None).unwrap(), Value::Int(2));
}

#[test]
fn test_wildcard_catches_unhandled_variants() {
    let adt = Adt::builder("Peano")
        .singleton("Zero")
        .variant("Succ", [refold::Field::family("pred")])
        .build()
        .unwrap();
    adt.declare_fold(
        "toValue",
        OpSpec::new(),
        Cases::new()
            .on("Zero", |_| Ok(Value::Int(0)))
            .wildcard(|_| Ok(Value::Int(-999))),
    )
    .unwrap();
    let zero = adt.singleton("Zero").unwrap();
    assert_eq!(zero.get("toValue").unwrap(), Value::Int(0));
    let nested = succ(&adt, succ(&adt, zero));
    assert_eq!(nested.get("toValue").unwrap(), Value::Int(-999));
}

#[test]
fn test_child_wildcard_only_covers_wildcard_variants() {
    let base = list();
    base.declare_fold(
        "describe",
        OpSpec::new(),
        Cases::new()
            .on("Nil", |_| Ok(Value::str("nil")))
            .wildcard(|_| Ok(Value::str("base"))),
    )
    .unwrap();
    let child = base.extend("Tagged").build().unwrap();
    child
        .declare_fold("describe", OpSpec::new(), Cases::new().wildcard(|_| Ok(Value::str("child"))))
        .unwrap();

    let nil = child.singleton("Nil").unwrap();
    assert_eq!(child.invoke("describe", &Value::Instance(nil), None).unwrap(), Value::str("nil"));
    let xs = from_slice(&child, &[1]);
    assert_eq!(xs.get("describe").unwrap(), Value::str("child"));
}

#[test]
fn test_new_variant_on_extension() {
    let base = peano();
    let extended = base
        .extend("WithTwo")
        .variant("Two", [refold::Field::family("pred")])
        .build()
        .unwrap();
    extended
        .declare_fold(
            "toValue",
            OpSpec::new(),
            Cases::new().on("Two", |cx| Ok(Value::Int(2 + cx.int("pred")?))),
        )
        .unwrap();

    let zero = extended.singleton("Zero").unwrap();
    let three = extended
        .make("Two", refold::fields! { pred: succ(&extended, zero) })
        .unwrap();
    assert_eq!(three.get("toValue").unwrap(), Value::Int(3));
}

#[test]
fn test_missing_handler_without_wildcard() {
    init_tracing();
    let adt = peano();
    adt.declare_fold(
        "onlyZero",
        OpSpec::new(),
        Cases::new().on("Zero", |_| Ok(Value::Int(0))),
    )
    .unwrap();
    let one = succ(&adt, adt.singleton("Zero").unwrap());
    let err = one.get("onlyZero").unwrap_err();
    insta::assert_snapshot!(err, @"dispatch error: no handler for variant `Succ` in operation `onlyZero`");
}

#[test]
fn test_unknown_operation() {
    let adt = peano();
    let err = adt.singleton("Zero").unwrap().get("toString").unwrap_err();
    assert!(matches!(err.as_dispatch(), Some(DispatchError::UnknownOperation { .. })));
}

#[test]
fn test_getter_results_are_memoized() {
    let adt = peano();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    adt.declare_fold(
        "count",
        OpSpec::new(),
        Cases::new()
            .on("Zero", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Int(0))
            })
            .on("Succ", |cx| Ok(Value::Int(1 + cx.int("pred")?))),
    )
    .unwrap();
    let one = succ(&adt, adt.singleton("Zero").unwrap());
    assert_eq!(one.get("count").unwrap(), Value::Int(1));
    assert_eq!(one.get("count").unwrap(), Value::Int(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_memoization_can_be_disabled() {
    let adt = Adt::builder("Peano")
        .singleton("Zero")
        .variant("Succ", [refold::Field::family("pred")])
        .config(Config::default().with_memoize_getters(false))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    adt.declare_fold(
        "count",
        OpSpec::new(),
        Cases::new().wildcard(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Unit)
        }),
    )
    .unwrap();
    let zero = adt.singleton("Zero").unwrap();
    zero.get("count").unwrap();
    zero.get("count").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_long_list_fold_is_stack_safe() {
    let adt = list();
    let items: Vec<i64> = (1..=100_000).collect();
    let xs = from_slice(&adt, &items);
    assert_eq!(xs.get("length").unwrap(), Value::Int(100_000));
    assert_eq!(xs.get("sum").unwrap(), Value::Int(5_000_050_000));
}
