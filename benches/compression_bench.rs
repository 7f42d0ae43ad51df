use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fqc::codec::{quality_scm, sequence_abc, sequence_plain, Backend};

fn sample_sequences(n: usize, len: usize) -> Vec<Vec<u8>> {
    let bases = [b'A', b'C', b'G', b'T'];
    (0..n)
        .map(|i| (0..len).map(|j| bases[(i + j) % bases.len()]).collect())
        .collect()
}

fn sample_qualities(n: usize, len: usize) -> Vec<Vec<u8>> {
    (0..n).map(|_| vec![30u8; len]).collect()
}

fn bench_sequence_codecs(c: &mut Criterion) {
    let short_reads = sample_sequences(2_000, 150);
    c.bench_function("sequence_abc_encode_2000x150bp", |b| {
        b.iter(|| sequence_abc::encode(black_box(&short_reads), 15, 8, Backend::Zstd, 3).unwrap())
    });

    let long_reads = sample_sequences(200, 5_000);
    c.bench_function("sequence_plain_encode_200x5000bp", |b| {
        b.iter(|| sequence_plain::encode(black_box(&long_reads), Backend::Zstd, 3).unwrap())
    });
}

fn bench_quality_codec(c: &mut Criterion) {
    let qualities = sample_qualities(2_000, 150);
    c.bench_function("quality_scm_encode_2000x150bp_order2", |b| {
        b.iter(|| quality_scm::encode(black_box(&qualities), None, quality_scm::ContextOrder::Two, 16, false).unwrap())
    });

    let encoded = quality_scm::encode(&qualities, None, quality_scm::ContextOrder::Two, 16, false).unwrap();
    c.bench_function("quality_scm_decode_2000x150bp_order2", |b| {
        b.iter(|| quality_scm::decode(black_box(&encoded.payload), None, quality_scm::ContextOrder::Two, 16, false).unwrap())
    });
}

criterion_group!(benches, bench_sequence_codecs, bench_quality_codec);
criterion_main!(benches);
