use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailstrip::strip::{strip_attachments, StripConfig};

fn bench_primary_pass(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("html_with_attachment.eml");
    let raw = std::fs::read(&fixture_path).unwrap();
    let config = StripConfig::default();

    c.bench_function("strip_html_fixture", |b| {
        b.iter(|| strip_attachments(&raw, &config).unwrap())
    });
}

fn bench_secondary_pass(c: &mut Criterion) {
    let blob = "QUJD".repeat(512 * 1024);
    let raw = format!(
        "Content-Type: multipart/mixed; boundary=\"A\"\r\n\r\n\
--A\r\nContent-Type: image/jpeg;\r\n\r\n{blob}\r\n\
--A\r\nContent-Type: application/pdf;\r\n\r\n{blob}\r\n\
--A\r\nContent-Type: text/html;\r\n\r\n<p>see attached</p>\r\n--A--\r\n"
    )
    .into_bytes();
    let config = StripConfig::default();

    c.bench_function("strip_reused_token_4mb", |b| {
        b.iter(|| strip_attachments(&raw, &config).unwrap())
    });
}

fn bench_index_build(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mailbox.mbox");

    c.bench_function("build_index_mailbox", |b| {
        b.iter(|| mailstrip::index::builder::build_index(&fixture_path, true, None).unwrap())
    });
}

criterion_group!(benches, bench_primary_pass, bench_secondary_pass, bench_index_build);
criterion_main!(benches);
