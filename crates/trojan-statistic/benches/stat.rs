//! Benchmarks for the hot accounting paths.

use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use trojan_statistic::{
    Authenticator, IpRecorder, MemoryAuth, MemoryUser, TrafficMeter, sha224_hex,
};

fn bench_sha224_hex(c: &mut Criterion) {
    let passwords = [
        "short",
        "medium_password_here",
        "this_is_a_much_longer_password_that_someone_might_actually_use_in_practice",
    ];

    let mut group = c.benchmark_group("sha224_hex");
    for password in passwords {
        group.bench_with_input(
            BenchmarkId::from_parameter(password.len()),
            password,
            |b, p| b.iter(|| sha224_hex(black_box(p))),
        );
    }
    group.finish();
}

fn bench_auth_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_auth_user");

    for size in [10usize, 1000, 100_000] {
        let passwords: Vec<_> = (0..size).map(|i| format!("password_{i}")).collect();
        let auth = MemoryAuth::from_passwords(&passwords);
        let hit = sha224_hex(&passwords[size / 2]);

        group.bench_with_input(BenchmarkId::new("hit", size), &hit, |b, hash| {
            b.iter(|| rt.block_on(auth.auth_user(black_box(hash))))
        });
        group.bench_function(BenchmarkId::new("miss", size), |b| {
            b.iter(|| rt.block_on(auth.auth_user(black_box("nonexistent"))))
        });
    }
    group.finish();
}

fn bench_traffic(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let user = MemoryUser::new(sha224_hex("bench"));

    c.bench_function("add_traffic", |b| {
        b.iter(|| rt.block_on(user.add_traffic(black_box(1500), black_box(64))))
    });

    c.bench_function("get_and_reset_traffic", |b| {
        b.iter(|| rt.block_on(user.get_and_reset_traffic()))
    });
}

fn bench_ip_tracking(c: &mut Criterion) {
    let user = MemoryUser::new(sha224_hex("bench")).with_ip_limit(4);
    let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

    c.bench_function("add_del_ip", |b| {
        b.iter(|| {
            user.add_ip(black_box(ip));
            user.del_ip(black_box(ip));
        })
    });
}

criterion_group!(
    benches,
    bench_sha224_hex,
    bench_auth_user,
    bench_traffic,
    bench_ip_tracking
);
criterion_main!(benches);
