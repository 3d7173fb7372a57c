use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use contact_enrichment::ingestion::parse_contacts;
use contact_enrichment::models::BatchResult;
use contact_enrichment::orchestration::{summarize, BatchSplitter};

fn sample_csv(rows: usize) -> Vec<u8> {
    let mut out = String::from("name,email,company,phone\n");
    for n in 0..rows {
        out.push_str(&format!("contact-{n},contact{n}@example.com,Company {n},555-0100\n"));
    }
    out.into_bytes()
}

fn benchmark_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_split");
    for rows in [100usize, 10_000] {
        let records: Vec<u32> = (0..rows as u32).collect();
        for batch_size in [2usize, 100] {
            let splitter = BatchSplitter::new(batch_size).unwrap_or_else(|e| panic!("{e}"));
            group.bench_with_input(
                BenchmarkId::new(format!("size_{batch_size}"), rows),
                &records,
                |b, records| b.iter(|| splitter.plan(black_box(records))),
            );
        }
    }
    group.finish();
}

fn benchmark_summarize(c: &mut Criterion) {
    let results: Vec<BatchResult> = (0..5_000)
        .map(|n| BatchResult {
            batch_id: n,
            processed: 2,
            success: 2 - n % 2,
            failed: n % 2,
            error_contact_ids: Vec::new(),
        })
        .collect();

    c.bench_function("summarize_5000_batches", |b| {
        b.iter(|| summarize(black_box(&results)))
    });
}

fn benchmark_parse(c: &mut Criterion) {
    let csv = sample_csv(10_000);
    c.bench_function("parse_10000_rows", |b| {
        b.iter(|| parse_contacts(black_box(&csv)))
    });
}

criterion_group!(benches, benchmark_split, benchmark_summarize, benchmark_parse);
criterion_main!(benches);
