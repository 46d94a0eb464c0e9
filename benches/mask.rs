use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use masked_id::{Config, IdMask};
use uuid::Uuid;

const KEY: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

fn bench_long_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("long_ids");
    let config = Config::from_key(&KEY).unwrap().no_cache();
    let masks = [
        ("eight_byte", IdMask::for_long_ids(&config)),
        ("eight_byte_randomized", IdMask::for_long_ids(&config.clone().randomized(true))),
        ("siv", IdMask::for_long_ids_siv(&config)),
    ];
    for (name, mask) in &masks {
        let token = mask.mask(&8869840532652477687).unwrap();
        group.bench_function(BenchmarkId::new("mask", name), |b| {
            b.iter(|| mask.mask(black_box(&8869840532652477687)).unwrap())
        });
        group.bench_function(BenchmarkId::new("unmask", name), |b| {
            b.iter(|| mask.unmask(black_box(&token)).unwrap())
        });
    }
    group.finish();
}

fn bench_uuids(c: &mut Criterion) {
    let mut group = c.benchmark_group("uuids");
    let config = Config::from_key(&KEY).unwrap().no_cache();
    let uuid = Uuid::from_u128(0xa8267e87_b53a_4e4c_bf53_b0c30187ed76);
    let masks = [
        ("sixteen_byte", IdMask::for_uuids(&config)),
        ("sixteen_byte_high_security", IdMask::for_uuids(&config.clone().high_security(true))),
        ("siv", IdMask::for_uuids_siv(&config)),
    ];
    for (name, mask) in &masks {
        let token = mask.mask(&uuid).unwrap();
        group.bench_function(BenchmarkId::new("mask", name), |b| {
            b.iter(|| mask.mask(black_box(&uuid)).unwrap())
        });
        group.bench_function(BenchmarkId::new("unmask", name), |b| {
            b.iter(|| mask.unmask(black_box(&token)).unwrap())
        });
    }
    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let cached = IdMask::for_long_ids(&Config::from_key(&KEY).unwrap());
    let token = cached.mask(&42).unwrap();
    c.bench_function("cached_unmask", |b| {
        b.iter(|| cached.unmask(black_box(&token)).unwrap())
    });
}

criterion_group!(benches, bench_long_ids, bench_uuids, bench_cache);
criterion_main!(benches);
