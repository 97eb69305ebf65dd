use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use service_hours::directory::User;
use service_hours::identity::SessionRegistry;

fn user(i: usize) -> User {
    User { name: format!("Student {i}"), email: format!("s{i}@school.org"), grade: 2027, lateness: 0, admin: i % 50 == 0 }
}

fn populate(n: usize) -> (SessionRegistry, Vec<String>) {
    let reg = SessionRegistry::new();
    let tokens = (0..n).map(|i| reg.issue(&user(i)).unwrap()).collect();
    (reg, tokens)
}

fn bench_sessions(c: &mut Criterion) {
    let ns = [1_000usize, 10_000usize];
    let mut group = c.benchmark_group("session_registry");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        let (reg, tokens) = populate(n);
        let lookups = 10_000usize;
        group.throughput(Throughput::Elements(lookups as u64));

        // Uncontended random lookups
        group.bench_with_input(BenchmarkId::new("lookup", n), &n, |b, _| {
            let mut rng = StdRng::seed_from_u64(0xFACE_FEED);
            let idxs: Vec<usize> = (0..lookups).map(|_| rng.gen_range(0..tokens.len())).collect();
            b.iter(|| {
                let mut found = 0usize;
                for &i in &idxs {
                    if reg.lookup(&tokens[i]).is_some() { found += 1; }
                }
                criterion::black_box(found);
            });
        });

        // Lookups while other threads issue and remove sessions
        group.bench_with_input(BenchmarkId::new("lookup_under_churn", n), &n, |b, _| {
            let mut rng = StdRng::seed_from_u64(0xBEEF_CAFE);
            let idxs: Vec<usize> = (0..lookups).map(|_| rng.gen_range(0..tokens.len())).collect();
            let stop = AtomicBool::new(false);
            thread::scope(|scope| {
                for w in 0..2 {
                    let reg = reg.clone();
                    let stop = &stop;
                    scope.spawn(move || {
                        let mut i = 0usize;
                        while !stop.load(Ordering::Relaxed) {
                            let t = reg.issue(&user(n + w * 1_000_000 + i)).unwrap();
                            reg.remove(&t);
                            i += 1;
                        }
                    });
                }
                b.iter(|| {
                    let mut found = 0usize;
                    for &i in &idxs {
                        if reg.lookup(&tokens[i]).is_some() { found += 1; }
                    }
                    criterion::black_box(found);
                });
                stop.store(true, Ordering::Relaxed);
            });
        });

        // Issue + remove pairs
        group.bench_with_input(BenchmarkId::new("issue_remove", n), &n, |b, _| {
            let u = user(n + 1);
            b.iter(|| {
                for _ in 0..lookups {
                    let t = reg.issue(&u).unwrap();
                    reg.remove(&t);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sessions);
criterion_main!(benches);
