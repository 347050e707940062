//! Benchmarks for statement rendering and row decoding
//!
//! Run with: cargo bench

use std::sync::Arc;

use clickhouse_orm::expr::{col, F};
use clickhouse_orm::materialize::ModelRows;
use clickhouse_orm::query::{render_select, QuerySet, Statement};
use clickhouse_orm::transport::RowCursor;
use clickhouse_orm::{Field, FieldType, MergeTree, ModelDescriptor};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn person() -> Arc<ModelDescriptor> {
    ModelDescriptor::builder("person")
        .field(Field::new("name", FieldType::String))
        .field(Field::new("age", FieldType::UInt8))
        .field(Field::new("height", FieldType::Float32))
        .field(Field::new("created", FieldType::DateTime { timezone: None }))
        .field(Field::new("tags", FieldType::array(FieldType::String)))
        .engine(MergeTree::new(&["created"]).date_col("created"))
        .build()
        .unwrap()
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let model = person();

    group.bench_function("simple_select", |b| {
        let qs = QuerySet::new(&model, ());
        b.iter(|| render_select(black_box(&qs)))
    });

    group.bench_function("filtered_select", |b| {
        let qs = QuerySet::new(&model, ())
            .filter(col("age").gte(18) & (col("name").like("A%") | col("height").gt(1.8)))
            .unwrap()
            .exclude(F::has(col("tags"), "banned"))
            .unwrap()
            .order_by(&["-created", "name"])
            .unwrap()
            .slice(100..200)
            .unwrap();
        b.iter(|| render_select(black_box(&qs)))
    });

    group.bench_function("build_and_render", |b| {
        b.iter(|| {
            let qs = QuerySet::new(&model, ())
                .filter(col("age").between(18, 65))
                .unwrap()
                .order_by(&["-created"])
                .unwrap()
                .limit(10);
            render_select(&qs)
        })
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let model = person();
    let statement = Statement::query("SELECT name, age, height, created, tags FROM person");

    for size in [100, 1000, 10000] {
        let mut body =
            String::from("name\tage\theight\tcreated\ttags\nString\tUInt8\tFloat32\tDateTime\tArray(String)\n");
        for i in 0..size {
            body.push_str(&format!(
                "person {}\t{}\t1.75\t2024-01-15T14:35:42Z\t['a','b\\\\'c']\n",
                i,
                i % 100
            ));
        }

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("model_rows_{}", size), |b| {
            b.iter(|| {
                let cursor = RowCursor::from_body(black_box(body.as_bytes()), &statement).unwrap();
                ModelRows::for_model(cursor, &model).unwrap().count()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render, bench_decode);
criterion_main!(benches);
