use asker::http::{BodyEncoders, FilePart, FormField};
use asker::{RequestBody, RequestOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use http::HeaderMap;
use serde_json::json;

fn sample_object() -> serde_json::Value {
    json!({
        "user": "asker",
        "page": 2,
        "tags": ["http", "retry", "pool"],
        "filters": {"active": true, "since": "2024-01-01"}
    })
}

fn benchmark_encoders(c: &mut Criterion) {
    let encoders = BodyEncoders::default();

    for name in ["string", "json", "urlencoded"] {
        c.bench_function(&format!("encode_{name}"), |b| {
            b.iter(|| {
                let mut headers = HeaderMap::new();
                black_box(encoders.encode(name, RequestBody::from(sample_object()), &mut headers))
            })
        });
    }

    // 64 KiB upload next to a few text fields
    let upload = vec![7u8; 64 * 1024];
    c.bench_function("encode_multipart", |b| {
        b.iter(|| {
            let body = RequestBody::form([
                ("title", FormField::from("report")),
                ("page", FormField::from("2")),
                (
                    "file",
                    FormField::from(
                        FilePart::new(upload.clone())
                            .filename("report.bin")
                            .mime("application/octet-stream"),
                    ),
                ),
            ]);
            let mut headers = HeaderMap::new();
            black_box(encoders.encode("multipart", body, &mut headers))
        })
    });
}

fn benchmark_normalize(c: &mut Criterion) {
    let encoders = BodyEncoders::default();

    // Per-request overhead of turning raw options into a request
    c.bench_function("normalize_options", |b| {
        b.iter(|| {
            let options = RequestOptions::builder()
                .url("example.com:8080/search?q=rust&page=1")
                .query("page", "2")
                .method("post")
                .header("X-Request-Id", "bench")
                .header("Accept", "application/json")
                .body(sample_object())
                .body_encoding("json");
            black_box(options.normalize(&encoders))
        })
    });
}

criterion_group!(benches, benchmark_encoders, benchmark_normalize);
criterion_main!(benches);
