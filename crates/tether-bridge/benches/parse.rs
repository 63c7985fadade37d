//! Argument parsing benchmarks
//!
//! Measures the two halves of the format-driven parser:
//! - Signature compilation (registration time, amortized across calls)
//! - Argument conversion against a compiled signature (per call)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tether_bridge::{Core, FunctionRef, PointerValue, ScriptObject, Signature, Value};

fn bench_signature_compile(c: &mut Criterion) {
    c.bench_function("signature_compile_interceptor", |b| {
        b.iter(|| Signature::parse(black_box("pF*{onEnter?,onLeave?}")).unwrap());
    });

    c.bench_function("signature_compile_wide", |b| {
        b.iter(|| Signature::parse(black_box("iuntq~Q~zZp~Xs|mB~?O?")).unwrap());
    });
}

fn bench_parse_args_numeric(c: &mut Criterion) {
    let core = Core::new();
    let sig = Signature::parse("iuZp~").unwrap();
    let args = vec![
        Value::Number(-1.0),
        Value::Number(2.0),
        Value::Number(4096.0),
        Value::string("0xdeadbeef"),
    ];

    c.bench_function("parse_args_numeric", |b| {
        b.iter(|| sig.parse_args(&core, black_box(&args)).unwrap());
    });
}

fn bench_parse_args_callbacks(c: &mut Criterion) {
    let core = Core::new();
    let sig = Signature::parse("pF*{onEnter?,onLeave?}").unwrap();

    let callbacks = ScriptObject::new();
    callbacks.set("onEnter", Value::Function(FunctionRef::new("onEnter")));
    callbacks.set("onLeave", Value::Function(FunctionRef::new("onLeave")));
    let args = vec![
        Value::Pointer(PointerValue::new(0x1000)),
        Value::Object(callbacks),
    ];

    c.bench_function("parse_args_interceptor_attach", |b| {
        b.iter(|| sig.parse_args(&core, black_box(&args)).unwrap());
    });
}

fn bench_parse_args_strings(c: &mut Criterion) {
    let core = Core::new();
    let sig = Signature::parse("ss?s?").unwrap();
    let args = vec![
        Value::string("module.so"),
        Value::string("symbol_name"),
        Value::Null,
    ];

    c.bench_function("parse_args_strings", |b| {
        b.iter(|| sig.parse_args(&core, black_box(&args)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_signature_compile,
    bench_parse_args_numeric,
    bench_parse_args_callbacks,
    bench_parse_args_strings
);
criterion_main!(benches);
