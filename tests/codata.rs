//! Lazy observation of codata.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use refold::{
    Adt, Cases, Codata, CodataInstance, Field, Observer, Observers, OpSpec, TypeTag, Value,
    fields,
};

/// `Fib` streams seeded with a pair `[a, b]`.
fn fibonacci(tail_calls: Arc<AtomicUsize>) -> Codata {
    let codata = Codata::builder("Fib")
        .observer("head", Observer::value(TypeTag::Int))
        .observer("tail", Observer::this())
        .build()
        .unwrap();
    codata
        .declare_unfold(
            "Fib",
            OpSpec::new().with_input(TypeTag::List),
            Observers::new()
                .on("head", |seed| Ok(seed.as_list()?[0].clone()))
                .on("tail", move |seed| {
                    tail_calls.fetch_add(1, Ordering::SeqCst);
                    let pair = seed.as_list()?;
                    let (a, b) = (pair[0].as_int()?, pair[1].as_int()?);
                    Ok(Value::list([Value::Int(b), Value::Int(a + b)]))
                }),
        )
        .unwrap();
    codata
}

fn take(stream: &CodataInstance, n: usize) -> Vec<i64> {
    let mut out = Vec::with_capacity(n);
    let mut current = stream.clone();
    for _ in 0..n {
        out.push(current.observe("head").unwrap().as_int().unwrap());
        let next = current.observe("tail").unwrap();
        current = next.as_codata().unwrap().clone();
    }
    out
}

#[test]
fn test_stream_prefix() {
    let fib = fibonacci(Arc::default());
    let s = fib
        .make("Fib", Value::list([Value::Int(0), Value::Int(1)]))
        .unwrap();
    assert_eq!(take(&s, 8), [0, 1, 1, 2, 3, 5, 8, 13]);
}

#[test]
fn test_continuations_are_shared() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fib = fibonacci(calls.clone());
    let s = fib
        .make("Fib", Value::list([Value::Int(0), Value::Int(1)]))
        .unwrap();

    take(&s, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    // Walking the same prefix again reuses every memoized tail.
    take(&s, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let a = s.observe("tail").unwrap();
    let b = s.observe("tail").unwrap();
    assert!(a.as_codata().unwrap().ptr_eq(b.as_codata().unwrap()));
}

#[test]
fn test_seed_type_is_checked() {
    let fib = fibonacci(Arc::default());
    let err = fib.make("Fib", 1).unwrap_err();
    assert!(err.is_value());
    let err = fib.make("Lucas", Value::list([])).unwrap_err();
    insta::assert_snapshot!(err, @"dispatch error: `Fib` has no unfold `Lucas`");
}

#[test]
fn test_value_observer_output_is_checked() {
    let codata = Codata::builder("Cell")
        .observer("value", Observer::value(TypeTag::Int))
        .build()
        .unwrap();
    codata
        .declare_unfold("Cell", OpSpec::new(), Observers::new().on("value", |seed| Ok(seed.clone())))
        .unwrap();
    assert_eq!(codata.make("Cell", 3).unwrap().observe("value").unwrap(), Value::Int(3));
    assert!(codata.make("Cell", "three").unwrap().observe("value").is_err());
}

#[test]
fn test_codata_inside_adt_fields() {
    let fib = fibonacci(Arc::default());
    let holder = Adt::builder("Holder")
        .variant("Holder", [Field::of("stream", TypeTag::Codata)])
        .build()
        .unwrap();
    holder
        .declare_fold(
            "second",
            OpSpec::new(),
            Cases::new().on("Holder", |cx| {
                let stream = cx.field("stream")?.as_codata()?;
                let tail = stream.observe("tail")?;
                tail.as_codata()?.observe("head")
            }),
        )
        .unwrap();
    let s = fib
        .make("Fib", Value::list([Value::Int(2), Value::Int(7)]))
        .unwrap();
    let h = holder.make("Holder", fields! { stream: s }).unwrap();
    assert_eq!(h.get("second").unwrap(), Value::Int(7));
}
