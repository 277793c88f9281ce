use criterion::{Criterion, criterion_group, criterion_main};
use sigil_core::{Encoder, SigilIndex, SourceKind};
use sigil_store::Store;

fn make_index(n: usize) -> SigilIndex {
    let enc = Encoder::new();
    let inputs: Vec<(String, SourceKind)> = (0..n)
        .map(|i| (format!("meditation session {i}"), SourceKind::Meditation))
        .collect();
    SigilIndex::from_sigils(enc.encode_batch(&inputs)).unwrap()
}

fn bench_save_index_1k(c: &mut Criterion) {
    let index = make_index(1000);
    let store = Store::open_in_memory().unwrap();
    c.bench_function("save_index_1k", |b| b.iter(|| store.save_index(&index).unwrap()));
}

fn bench_load_index_1k(c: &mut Criterion) {
    let store = Store::open_in_memory().unwrap();
    store.save_index(&make_index(1000)).unwrap();
    c.bench_function("load_index_1k", |b| b.iter(|| store.load_index().unwrap()));
}

criterion_group!(benches, bench_save_index_1k, bench_load_index_1k);
criterion_main!(benches);
