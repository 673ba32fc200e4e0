//! Benchmarks for stanza core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stanza::core::parser::{lex_line, source_lines, stanza_end};
use stanza::core::validate::check_structure;
use stanza::directives::builtin_registry;

/// `stanzas` top-level groups, each with `depth` levels of nesting.
fn synthetic_script(stanzas: usize, depth: usize) -> String {
    let mut out = String::from("maxjobs = 4\n");
    for s in 0..stanzas {
        out.push_str(&format!("group stanza-{}  # top\n", s));
        out.push_str("  setup = true\n");
        for d in 1..depth {
            let pad = "  ".repeat(d);
            out.push_str(&format!("{}group level-{}\n", pad, d));
            out.push_str(&format!("{}  echo message {}\n", pad, d));
        }
        out.push('\n');
    }
    out
}

fn bench_lex(c: &mut Criterion) {
    let mut group = c.benchmark_group("lex_line");
    for stanzas in [10, 100, 1000] {
        let lines = source_lines(&synthetic_script(stanzas, 4));
        group.bench_with_input(BenchmarkId::from_parameter(stanzas), &lines, |b, lines| {
            b.iter(|| {
                for line in lines {
                    black_box(lex_line("bench.stz", black_box(line)).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_check_structure(c: &mut Criterion) {
    let registry = builtin_registry();
    let mut group = c.benchmark_group("check_structure");
    for depth in [2, 8, 32] {
        let lines = source_lines(&synthetic_script(100, depth));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &lines, |b, lines| {
            b.iter(|| black_box(check_structure("bench.stz", &registry, black_box(lines)).unwrap()));
        });
    }
    group.finish();
}

fn bench_stanza_end(c: &mut Criterion) {
    let lines = source_lines(&synthetic_script(1000, 4));
    c.bench_function("stanza_end_all", |b| {
        b.iter(|| {
            let mut idx = 1;
            while idx < lines.len() {
                idx = stanza_end(black_box(&lines), idx + 1, 0);
            }
            black_box(idx)
        });
    });
}

criterion_group!(benches, bench_lex, bench_check_structure, bench_stanza_end);
criterion_main!(benches);
