use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sqlgate::auth::TokenAuthority;
use sqlgate::policy::{authorize, classify};
use std::hint::black_box;

// Per-request overhead of the gateway before any database work:
// verifying a key, then classifying and authorizing the query.

const SECRET: &str = "bench-secret-0123456789abcdef0123456789";

fn key_verification_benchmark(c: &mut Criterion) {
    let authority = TokenAuthority::from_secret(Some(SECRET));
    let valid = authority.issue("bench-user", 30, false).unwrap();
    let forged = TokenAuthority::from_secret(Some("some-other-secret-0123456789abcdef"))
        .issue("bench-user", 30, false)
        .unwrap();

    let mut group = c.benchmark_group("key");
    group.throughput(Throughput::Elements(1));

    group.bench_function("verify_valid", |b| {
        b.iter(|| authority.verify(black_box(&valid)))
    });
    group.bench_function("verify_forged", |b| {
        b.iter(|| authority.verify(black_box(&forged)))
    });
    group.bench_function("issue", |b| {
        b.iter(|| authority.issue(black_box("bench-user"), 30, false).unwrap())
    });

    group.finish();
}

fn policy_benchmark(c: &mut Criterion) {
    let authority = TokenAuthority::from_secret(Some(SECRET));
    let verification = authority.verify(&authority.issue("bench-user", 30, false).unwrap());
    let query = "  select id, name from users where id = :id";

    let mut group = c.benchmark_group("policy");
    group.throughput(Throughput::Bytes(query.len() as u64));

    group.bench_function("classify", |b| b.iter(|| classify(black_box(query))));
    group.bench_function("authorize_anonymous", |b| {
        b.iter(|| authorize(black_box(query), None))
    });
    group.bench_function("authorize_authenticated_write", |b| {
        b.iter(|| authorize(black_box("INSERT INTO t VALUES (1)"), Some(&verification)))
    });

    group.finish();
}

criterion_group!(benches, key_verification_benchmark, policy_benchmark);
criterion_main!(benches);
