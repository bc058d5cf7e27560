//! Benchmarks for the insert, update and select paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabula_core::schema::{TableBuilder, TableId};
use tabula_core::{DataType, Value};
use tabula_storage::{DataSet, RelationDef, RowStateFilter, Table};

fn create_dataset() -> (DataSet, TableId, TableId) {
    let mut ds = DataSet::new("bench");
    let sectors = TableBuilder::new("sectors")
        .unwrap()
        .add_column("name", DataType::String)
        .unwrap()
        .add_primary_key(&["name"])
        .unwrap()
        .build()
        .unwrap();
    let stocks = TableBuilder::new("stocks")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("price", DataType::Float64)
        .unwrap()
        .add_column("symbol", DataType::String)
        .unwrap()
        .add_column("sector", DataType::String)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap();
    let s = ds.add_table(Table::new(sectors).unwrap()).unwrap();
    let t = ds.add_table(Table::new(stocks).unwrap()).unwrap();
    ds.add_relation(
        RelationDef::new("SectorStocks", "sectors", &["name"], "stocks", &["sector"]),
        true,
    )
    .unwrap();
    for name in SECTORS {
        ds.add_row(s, vec![Value::from(name)]).unwrap();
    }
    (ds, s, t)
}

const SECTORS: [&str; 5] = ["Tech", "Finance", "Health", "Energy", "Consumer"];

fn populate(ds: &mut DataSet, t: TableId, count: i64) {
    for i in 1..=count {
        ds.add_row(
            t,
            vec![
                Value::Int64(i),
                Value::Float64(100.0 + (i as f64) * 0.1),
                Value::String(format!("SYM{}", i)),
                Value::from(SECTORS[(i as usize) % SECTORS.len()]),
            ],
        )
        .unwrap();
    }
}

/// Benchmark: inserting rows under a unique key and a foreign key
fn insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_insert");
    for count in [100i64, 1000] {
        group.bench_with_input(BenchmarkId::new("add_row", count), &count, |b, &count| {
            b.iter(|| {
                let (mut ds, _, t) = create_dataset();
                populate(&mut ds, t, count);
                black_box(ds.table(t).unwrap().len())
            })
        });
    }
    group.finish();
}

/// Benchmark: single cell updates, then accept
fn update_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_update");
    for count in [100i64, 1000] {
        group.bench_with_input(BenchmarkId::new("set_value", count), &count, |b, &count| {
            let (mut ds, _, t) = create_dataset();
            populate(&mut ds, t, count);
            ds.accept_changes().unwrap();
            let ids = ds.table(t).unwrap().row_ids();
            b.iter(|| {
                for (i, &id) in ids.iter().enumerate() {
                    ds.set_value(t, id, 1, Value::Float64(i as f64)).unwrap();
                }
                ds.accept_changes().unwrap();
            })
        });
    }
    group.finish();
}

/// Benchmark: filtered and sorted select, and a child aggregate
fn select_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_select");
    let (mut ds, s, t) = create_dataset();
    populate(&mut ds, t, 2000);
    group.bench_function("filter_sort", |b| {
        b.iter(|| {
            black_box(
                ds.select(
                    t,
                    Some("price > 150 AND sector IN ('Tech', 'Health')"),
                    Some("symbol DESC"),
                    RowStateFilter::CURRENT_ROWS,
                )
                .unwrap(),
            )
        })
    });
    group.bench_function("compute", |b| {
        b.iter(|| black_box(ds.compute(t, "Avg(price)", Some("sector = 'Energy'")).unwrap()))
    });
    group.bench_function("child_rows", |b| {
        let tech = ds.find_row(s, &[Value::from("Tech")]).unwrap().unwrap();
        b.iter(|| {
            black_box(
                ds.row(s, tech)
                    .unwrap()
                    .child_rows("SectorStocks")
                    .unwrap()
                    .len(),
            )
        })
    });
    group.finish();
}

criterion_group!(benches, insert_benchmark, update_benchmark, select_benchmark);
criterion_main!(benches);
