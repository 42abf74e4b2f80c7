//! Shared fixtures for integration tests.

use refold::{Adt, Cases, Field, Fields, Guards, Instance, OpSpec, TypeTag, Value, fields};

/// Route engine logs to the test harness; filter with `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `List = Nil | Cons(head: int, tail: Family)` with `sum`, `length` and `product`.
#[allow(dead_code)]
pub fn list() -> Adt {
    let adt = Adt::builder("List")
        .singleton("Nil")
        .variant("Cons", [Field::of("head", TypeTag::Int), Field::family("tail")])
        .build()
        .unwrap();
    adt.declare_fold(
        "sum",
        OpSpec::new().with_output(TypeTag::Int),
        Cases::new()
            .on("Nil", |_| Ok(Value::Int(0)))
            .on("Cons", |cx| Ok(Value::Int(cx.int("head")? + cx.int("tail")?))),
    )
    .unwrap();
    adt.declare_fold(
        "length",
        OpSpec::new().with_output(TypeTag::Int),
        Cases::new()
            .on("Nil", |_| Ok(Value::Int(0)))
            .on("Cons", |cx| Ok(Value::Int(1 + cx.int("tail")?))),
    )
    .unwrap();
    adt.declare_fold(
        "product",
        OpSpec::new().with_output(TypeTag::Int),
        Cases::new()
            .on("Nil", |_| Ok(Value::Int(1)))
            .on("Cons", |cx| Ok(Value::Int(cx.int("head")? * cx.int("tail")?))),
    )
    .unwrap();
    adt
}

#[allow(dead_code)]
pub fn from_slice(adt: &Adt, items: &[i64]) -> Instance {
    let mut node = adt.singleton("Nil").unwrap();
    for &head in items.iter().rev() {
        node = adt.make("Cons", fields! { head: head, tail: node }).unwrap();
    }
    node
}

/// Declare `Range(n)`, producing `Cons(n, Cons(n - 1, ... Nil))`.
#[allow(dead_code)]
pub fn declare_range(adt: &Adt, on_cons: impl Fn() + Send + Sync + 'static) {
    adt.declare_unfold(
        "Range",
        OpSpec::new().with_input(TypeTag::Int),
        Guards::new()
            .on("Nil", |cx| Ok((cx.seed()?.as_int()? <= 0).then(Fields::new)))
            .on("Cons", move |cx| {
                on_cons();
                let n = cx.seed()?.as_int()?;
                Ok(Some(fields! { head: n, tail: n - 1 }))
            }),
    )
    .unwrap();
}

/// `Peano = Zero | Succ(pred: Family)` with `toValue`.
#[allow(dead_code)]
pub fn peano() -> Adt {
    let adt = Adt::builder("Peano")
        .singleton("Zero")
        .variant("Succ", [Field::family("pred")])
        .build()
        .unwrap();
    adt.declare_fold(
        "toValue",
        OpSpec::new(),
        Cases::new()
            .on("Zero", |_| Ok(Value::Int(0)))
            .on("Succ", |cx| Ok(Value::Int(1 + cx.int("pred")?))),
    )
    .unwrap();
    adt
}

#[allow(dead_code)]
pub fn succ(adt: &Adt, pred: Instance) -> Instance {
    adt.make("Succ", fields! { pred: pred }).unwrap()
}
