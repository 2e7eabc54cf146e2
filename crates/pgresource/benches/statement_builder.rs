use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgresource::predicate::WhereClause;
use pgresource::statement::{self, Page};
use pgresource::{ColumnMap, ColumnType, Ident, ListQuery, Row};
use serde_json::{Value, json};

/// A table with `n` text columns named `col0..col{n-1}`.
fn column_map(n: usize) -> ColumnMap {
    (0..n)
        .map(|i| (format!("col{i}"), ColumnType::named("text")))
        .collect()
}

/// `col0=v0&col1=neq.v1&...` with `n` filters.
fn query_string(n: usize) -> String {
    (0..n)
        .map(|i| if i % 2 == 0 { format!("col{i}=v{i}") } else { format!("col{i}=neq.v{i}") })
        .collect::<Vec<_>>()
        .join("&")
}

fn rows(n_rows: usize, n_cols: usize) -> Vec<Row> {
    (0..n_rows)
        .map(|r| {
            (0..n_cols)
                .map(|c| (format!("col{c}"), json!(format!("r{r}c{c}"))))
                .collect::<serde_json::Map<String, Value>>()
        })
        .collect()
}

fn bench_parse_and_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_builder/select");
    let table = Ident::parse("t").expect("valid table");

    for n in [1, 5, 10, 50] {
        let columns = column_map(n);
        let raw = query_string(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &raw, |b, raw| {
            b.iter(|| {
                let query = ListQuery::from_query_string(raw).expect("valid query");
                let filter =
                    WhereClause::build(&columns, &query.filters, None, 0).expect("known columns");
                black_box(statement::select(&table, filter, None, Page::default()));
            });
        });
    }

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_builder/insert");
    let table = Ident::parse("t").expect("valid table");
    let columns = column_map(10);

    for n in [1, 10, 100] {
        let batch = rows(n, 10);
        group.bench_with_input(BenchmarkId::from_parameter(n), &batch, |b, batch| {
            b.iter(|| black_box(statement::insert(&table, &columns, batch, None)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_and_select, bench_insert);
criterion_main!(benches);
