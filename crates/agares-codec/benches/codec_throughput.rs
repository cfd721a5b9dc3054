//! Encode/decode throughput for the trained codec families.
//!
//! Run with: `cargo bench -p agares-codec`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use agares_core::{Codec, Result};
use agares_codec::{BytehuffmanCodec, BytepairCodec, DigramCodec, HuffmanCodec};

/// English-like training text assembled from a small phrase pool, so the
/// codecs have realistic gram statistics to learn.
fn generate_corpus(records: usize, record_len: usize) -> Vec<Vec<u8>> {
    let phrases: &[&[u8]] = &[
        b"the quick brown fox jumps over the lazy dog ",
        b"pack my box with five dozen liquor jugs ",
        b"text classification and tagging ",
        b"compression is a model of the data ",
    ];
    let mut rng = StdRng::seed_from_u64(42);
    (0..records)
        .map(|_| {
            let mut record = Vec::with_capacity(record_len);
            while record.len() < record_len {
                record.extend_from_slice(phrases[rng.gen_range(0..phrases.len())]);
            }
            record.truncate(record_len);
            record
        })
        .collect()
}

fn corpus_callback(corpus: &[Vec<u8>], position: &mut usize) -> Result<Option<Vec<u8>>> {
    if *position >= corpus.len() {
        *position = 0;
        return Ok(None);
    }
    let record = corpus[*position].clone();
    *position += 1;
    Ok(Some(record))
}

fn build<C: Codec>(gram: &[usize], corpus: &[Vec<u8>]) -> C {
    let mut codec = C::with_gram(gram);
    let mut position = 0;
    codec
        .build(&mut || corpus_callback(corpus, &mut position))
        .unwrap();
    codec
}

fn bench_encode(c: &mut Criterion) {
    let corpus = generate_corpus(64, 512);
    let input = &corpus[0];

    let huffman: HuffmanCodec = build(&[1], &corpus);
    let bytehuffman: BytehuffmanCodec = build(&[2], &corpus);
    let bytepair: BytepairCodec = build(&[1, 1], &corpus);
    let digram: DigramCodec = build(&[1, 8], &corpus);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function(BenchmarkId::new("huffman", input.len()), |b| {
        b.iter(|| huffman.encode(black_box(input)).unwrap())
    });
    group.bench_function(BenchmarkId::new("bytehuffman", input.len()), |b| {
        b.iter(|| bytehuffman.encode(black_box(input)).unwrap())
    });
    group.bench_function(BenchmarkId::new("bytepair", input.len()), |b| {
        b.iter(|| bytepair.encode(black_box(input)).unwrap())
    });
    group.bench_function(BenchmarkId::new("digram", input.len()), |b| {
        b.iter(|| digram.encode(black_box(input)).unwrap())
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let corpus = generate_corpus(64, 512);
    let input = &corpus[0];

    let huffman: HuffmanCodec = build(&[1], &corpus);
    let bytehuffman: BytehuffmanCodec = build(&[2], &corpus);
    let bytepair: BytepairCodec = build(&[1, 1], &corpus);
    let digram: DigramCodec = build(&[1, 8], &corpus);

    let huffman_encoded = huffman.encode(input).unwrap();
    let bytehuffman_encoded = bytehuffman.encode(input).unwrap();
    let bytepair_encoded = bytepair.encode(input).unwrap();
    let digram_encoded = digram.encode(input).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function(BenchmarkId::new("huffman", input.len()), |b| {
        b.iter(|| huffman.decode(black_box(&huffman_encoded)).unwrap())
    });
    group.bench_function(BenchmarkId::new("bytehuffman", input.len()), |b| {
        b.iter(|| bytehuffman.decode(black_box(&bytehuffman_encoded)).unwrap())
    });
    group.bench_function(BenchmarkId::new("bytepair", input.len()), |b| {
        b.iter(|| bytepair.decode(black_box(&bytepair_encoded)).unwrap())
    });
    group.bench_function(BenchmarkId::new("digram", input.len()), |b| {
        b.iter(|| digram.decode(black_box(&digram_encoded)).unwrap())
    });
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let corpus = generate_corpus(64, 512);
    let total: usize = corpus.iter().map(Vec::len).sum();

    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("huffman", |b| {
        b.iter(|| build::<HuffmanCodec>(black_box(&[1]), &corpus))
    });
    group.bench_function("bytehuffman", |b| {
        b.iter(|| build::<BytehuffmanCodec>(black_box(&[2]), &corpus))
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_build);
criterion_main!(benches);
