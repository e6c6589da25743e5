use chrono::{NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use excelbind::{read_binary, record_fields, to_bytes, ExcelWriter, Record};
use excelbind::types::CellValue;

#[derive(Debug, Default, Clone)]
struct Order {
    id: u64,
    customer: String,
    amount: f64,
    paid: bool,
    placed: NaiveDateTime,
    note: Option<String>,
}

impl Record for Order {
    record_fields! {
        id { excel = "ID" },
        customer { excel = "Customer" },
        amount { excel = "Amount" },
        paid { excel = "Paid" },
        placed { excel = "Placed" },
        note { excel = "Note" },
    }
}

fn orders(size: u64) -> Vec<Order> {
    let placed = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap();
    (0..size)
        .map(|i| Order {
            id: i,
            customer: format!("Customer_{}", i),
            amount: i as f64 * 1.25,
            paid: i % 3 == 0,
            placed,
            note: (i % 2 == 0).then(|| format!("note {}", i)),
        })
        .collect()
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [100, 1000, 10000].iter() {
        let records = orders(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(to_bytes(records).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [100, 1000, 10000].iter() {
        let bytes = to_bytes(&orders(*size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| black_box(read_binary::<Order>(bytes, &[]).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_typed_write(c: &mut Criterion) {
    c.bench_function("typed_write_1000_rows", |b| {
        b.iter(|| {
            let mut writer = ExcelWriter::new().unwrap();
            for i in 0..1000 {
                writer
                    .write_row_typed(&[
                        CellValue::Int(i),
                        CellValue::String(format!("Name_{}", i)),
                        CellValue::Float(i as f64 * 1.5),
                        CellValue::Bool(i % 2 == 0),
                    ])
                    .unwrap();
            }
            black_box(writer.into_bytes().unwrap());
        });
    });
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_typed_write);
criterion_main!(benches);
