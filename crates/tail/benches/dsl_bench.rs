//! 패턴 DSL 매칭 성능 벤치마크

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tailpost_tail::dsl::PatternSet;

fn game_log_set() -> PatternSet {
    let mut set = PatternSet::new();
    set.token("date", r"\d{4}-\d{2}-\d{2}").unwrap();
    set.token("time", r"\d{2}:\d{2}:\d{2}\.\d{3}").unwrap();
    set.token("level", r"DEBUG|INFO|WARN|ERROR").unwrap();
    set.group("stamp", r"%{date} %{time}").unwrap();
    set.format(r"%{stamp} \[%{level}\] (?P<message>.*)").unwrap();
    set
}

fn transform_set() -> PatternSet {
    let mut set = PatternSet::new();
    set.token("date", r"\d{4}-\d{2}-\d{2}").unwrap();
    set.token_with_transform("body", r"%(\{.*\})", "flatten(json(_))")
        .unwrap();
    set.format(r"%{date} %{body}").unwrap();
    set
}

fn bench_parse_line(c: &mut Criterion) {
    let set = game_log_set();
    let line = "2024-01-02 10:20:30.123 [INFO] player joined the lobby";

    c.bench_function("dsl_parse_line", |b| {
        b.iter(|| set.parse_line(black_box(line)))
    });
}

fn bench_parse_line_with_transform(c: &mut Criterion) {
    let set = transform_set();
    let line = r#"2024-01-02 {"player": {"id": "kim", "score": 42}, "map": "dust"}"#;

    c.bench_function("dsl_parse_line_json_transform", |b| {
        b.iter(|| set.parse_line(black_box(line)))
    });
}

fn bench_build_set(c: &mut Criterion) {
    c.bench_function("dsl_build_set", |b| b.iter(game_log_set));
}

criterion_group!(
    benches,
    bench_parse_line,
    bench_parse_line_with_transform,
    bench_build_set
);
criterion_main!(benches);
