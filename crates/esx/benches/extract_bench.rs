//! 📊 How fast can we find every `_source` in a page without parsing any of them?

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use esx::extract::extract_page;

/// 📄 A scroll page with `docs` hits whose sources are roughly `doc_bytes` each.
fn synthetic_page(docs: usize, doc_bytes: usize) -> Vec<u8> {
    let padding = "lorem \\\"ipsum\\\" {dolor} [sit] ".repeat(doc_bytes / 32 + 1);
    let hits: Vec<String> = (0..docs)
        .map(|i| {
            format!(
                r#"{{"_index":"logs","_id":"{i}","_score":null,"_source":{{"id":{i},"msg":"{padding}","tags":["a","b"],"nested":{{"ok":true}}}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"_scroll_id":"DXF1ZXJ5QW5kRmV0Y2gBAAAAAAAAAD4WYm9laVYtZndUQlNsdDcwakFMNjU1QQ==","took":12,"timed_out":false,"_shards":{{"total":5,"successful":5,"skipped":0,"failed":0}},"hits":{{"total":{{"value":{docs},"relation":"eq"}},"max_score":null,"hits":[{}]}}}}"#,
        hits.join(",")
    )
    .into_bytes()
}

fn bench_extract_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_page");
    for (docs, doc_bytes) in [(1_000, 200), (1_000, 4_096), (100, 64 * 1024)] {
        let page = synthetic_page(docs, doc_bytes);
        group.throughput(Throughput::Bytes(page.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{docs}x{doc_bytes}B")),
            &page,
            |b, page| {
                b.iter(|| {
                    let page = extract_page(black_box(page)).unwrap();
                    let mut bytes = 0usize;
                    for hit in page.results.hits {
                        bytes += hit.unwrap().len();
                    }
                    black_box(bytes)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_extract_page);
criterion_main!(benches);
