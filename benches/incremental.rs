//! Incremental update benchmarks
//!
//! Measures a full program load against small edits to chains and fans of
//! dependent bindings.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use liverunner::engine::{AssociativeEngine, DependencyGraph, ScriptEngine};
use liverunner::engine::graph::{ContentHash, EntryKind};
use std::collections::HashSet;

/// `v0 = 1; v1 = v0 + 1; ...`
fn chain_program(len: usize) -> String {
    let mut code = String::from("v0 = 1;\n");
    for i in 1..len {
        code.push_str(&format!("v{} = v{} + 1;\n", i, i - 1));
    }
    code
}

/// One root read by `width` independent bindings.
fn fan_program(width: usize) -> String {
    let mut code = String::from("root = 1;\n");
    for i in 0..width {
        code.push_str(&format!("leaf{} = root * {};\n", i, i));
    }
    code
}

fn bench_full_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_load");

    for size in [10, 100, 500] {
        let code = chain_program(size);
        group.bench_with_input(BenchmarkId::new("chain", size), &code, |b, code| {
            b.iter(|| {
                let mut engine = AssociativeEngine::default();
                engine.evaluate(black_box(code)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit");

    for size in [10, 100, 500] {
        let mut engine = AssociativeEngine::default();
        engine.evaluate(&chain_program(size)).unwrap();
        let mut toggle = false;
        group.bench_function(BenchmarkId::new("chain_head", size), |b| {
            b.iter(|| {
                toggle = !toggle;
                let code = if toggle { "v0 = 2;" } else { "v0 = 1;" };
                engine.evaluate(black_box(code)).unwrap();
            });
        });

        let mut engine = AssociativeEngine::default();
        engine.evaluate(&chain_program(size)).unwrap();
        let tail = format!("v{} = v{} + 1;", size - 1, size.saturating_sub(2));
        group.bench_function(BenchmarkId::new("chain_unchanged", size), |b| {
            b.iter(|| engine.evaluate(black_box(&tail)).unwrap());
        });

        let mut engine = AssociativeEngine::default();
        engine.evaluate(&fan_program(size)).unwrap();
        let mut toggle = false;
        group.bench_function(BenchmarkId::new("fan_root", size), |b| {
            b.iter(|| {
                toggle = !toggle;
                let code = if toggle { "root = 2;" } else { "root = 1;" };
                engine.evaluate(black_box(code)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_graph_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_order");

    for size in [100, 1000] {
        let mut graph = DependencyGraph::new();
        for i in 0..size {
            let reads: Vec<String> = if i == 0 { Vec::new() } else { vec![format!("n{}", i - 1)] };
            graph.define(
                &format!("n{}", i),
                EntryKind::Binding,
                ContentHash::of(&i.to_string()),
                reads,
            );
        }

        group.bench_function(BenchmarkId::new("invalidate_and_order", size), |b| {
            b.iter(|| {
                let invalid: HashSet<String> = graph.invalidate(["n0"]);
                black_box(graph.evaluation_order(&invalid));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_load, bench_edits, bench_graph_order);
criterion_main!(benches);
