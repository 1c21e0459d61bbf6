use criterion::{Criterion, criterion_group, criterion_main};
use ledger::{
    InMemoryLedgerStore, LedgerKey, LedgerStore, LedgerTransaction, LedgerTransactionExt,
    ProductLedgerRow,
};

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let key = LedgerKey::new("bench-cycle", "bench-product");
    rt.block_on(store.put_row(ProductLedgerRow::new(key.clone(), 1_000, 1_000, 1_000)));

    c.bench_function("ledger/reserve_release_swap", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut tx = store.begin().await.unwrap();
                tx.reserve_swap(&key).await.unwrap();
                tx.release_swap(&key).await.unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

fn bench_swap_pair(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let from = LedgerKey::new("bench-cycle", "from");
    let to = LedgerKey::new("bench-cycle", "to");

    c.bench_function("ledger/convert_and_reserve", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.put_row(ProductLedgerRow::new(from.clone(), 1, 0, 0)).await;
                store.put_row(ProductLedgerRow::new(to.clone(), 0, 0, 1)).await;
                let mut tx = store.begin().await.unwrap();
                tx.convert_to_swap(&from).await.unwrap();
                tx.reserve_swap(&to).await.unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_reserve_release, bench_swap_pair);
criterion_main!(benches);
