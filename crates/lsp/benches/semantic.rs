// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Parsing and semantic analysis benchmarks
//!
//! Measures:
//! - Parsing alone and parse + analysis over the shared fixtures
//! - Analysis of a large generated script
//! - Find references and rename on a prepared symbol table
//!
//! ```bash
//! cargo bench --bench semantic
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use flink_sql_grammar::Position;
use flink_sql_lsp_semantic::{ReferenceResolver, RenameEngine, analyze};
use flink_sql_lsp_test_utils::SqlFixtures;

fn fixtures() -> Vec<(&'static str, &'static str)> {
    vec![
        ("simple_alias", SqlFixtures::simple_alias()),
        ("select_with_clauses", SqlFixtures::select_with_clauses()),
        ("inner_join", SqlFixtures::inner_join()),
        ("nested_derived", SqlFixtures::nested_derived()),
        ("with_cte", SqlFixtures::with_cte()),
        ("window_tvf", SqlFixtures::window_tvf()),
        ("insert_pipeline", SqlFixtures::insert_pipeline()),
    ]
}

/// Script of `statements` source tables each followed by a join query
fn generated_script(statements: usize) -> String {
    let mut script = String::new();
    for i in 0..statements {
        script.push_str(&format!(
            "CREATE TABLE src_{i} (id BIGINT, name STRING, ts TIMESTAMP(3), \
             WATERMARK FOR ts AS ts - INTERVAL '5' SECOND) WITH ('connector' = 'datagen');\n\
             SELECT a.id, b.name FROM src_{i} AS a JOIN src_{i} AS b ON a.id = b.id \
             WHERE a.ts > b.ts;\n"
        ));
    }
    script
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    for (name, sql) in fixtures() {
        group.throughput(Throughput::Bytes(sql.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), sql, |b, sql| {
            b.iter(|| black_box(flink_sql_grammar::parse(sql)));
        });
    }
    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("semantic/analyze");
    for (name, sql) in fixtures() {
        group.throughput(Throughput::Bytes(sql.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), sql, |b, sql| {
            b.iter(|| black_box(analyze(sql)));
        });
    }
    group.finish();
}

fn bench_large_script(c: &mut Criterion) {
    let mut group = c.benchmark_group("semantic/large_script");
    for statements in [10, 100, 500] {
        let script = generated_script(statements);
        group.throughput(Throughput::Bytes(script.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(statements), &script, |b, script| {
            b.iter(|| black_box(analyze(script)));
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let script = generated_script(100);
    let analysis = analyze(&script);
    // `a` in `a.id` of the last query
    let position = Position::new(199, 7);

    c.bench_function("semantic/find_references", |b| {
        b.iter(|| {
            let resolver = ReferenceResolver::new(&analysis.table);
            black_box(resolver.find_references(position))
        });
    });

    c.bench_function("semantic/rename", |b| {
        b.iter(|| {
            let engine = RenameEngine::new(&analysis.table);
            black_box(engine.rename(position, "src"))
        });
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_analyze,
    bench_large_script,
    bench_queries
);
criterion_main!(benches);
