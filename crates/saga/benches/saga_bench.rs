use common::{SoireeId, UserId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{Aggregate, Money, OrderUser, PlaceOrder, Pro, StepName};
use event_store::InMemoryEventStore;
use saga::{
    EventSourcedOrderStore, InMemoryNotificationSink, InMemoryPaymentGateway, SagaCoordinator,
};

type BenchCoordinator = SagaCoordinator<
    EventSourcedOrderStore<InMemoryEventStore>,
    InMemoryPaymentGateway,
    InMemoryNotificationSink,
>;

fn payers(n: usize) -> Vec<OrderUser> {
    (0..n)
        .map(|_| OrderUser::new(UserId::new(), Money::from_cents(1200), "tok_visa"))
        .collect()
}

async fn coordinator() -> (BenchCoordinator, SoireeId) {
    let coordinator = SagaCoordinator::new(
        EventSourcedOrderStore::new(InMemoryEventStore::new()),
        InMemoryPaymentGateway::new(),
        InMemoryNotificationSink::new(),
    );
    let soiree = SoireeId::new();
    coordinator
        .onboard_merchant(soiree, Pro::new("bar@example.com", "FR"))
        .await
        .unwrap();
    (coordinator, soiree)
}

/// Order placement through delivery, one answer per payer.
async fn full_saga(coordinator: &BenchCoordinator, soiree: SoireeId, users: Vec<OrderUser>) {
    let order = coordinator
        .create_order(PlaceOrder::at_soiree(soiree, users.clone()))
        .await
        .unwrap();
    let order_id = order.id().unwrap();

    for user in &users {
        coordinator
            .answer_order(order_id, user.user_id, true)
            .await
            .unwrap();
    }
    coordinator
        .put_order(order_id, StepName::Ready, true)
        .await
        .unwrap();
    let order = coordinator
        .put_order(order_id, StepName::Deliverpaid, true)
        .await
        .unwrap();
    assert!(order.is_done());
}

fn bench_full_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (coordinator, soiree) = rt.block_on(coordinator());

    let mut group = c.benchmark_group("saga/full_path");
    for n in [1, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.to_async(&rt)
                .iter(|| full_saga(&coordinator, soiree, payers(n)));
        });
    }
    group.finish();
}

fn bench_refusal(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (coordinator, soiree) = rt.block_on(coordinator());

    c.bench_function("saga/refusal", |b| {
        b.to_async(&rt).iter(|| async {
            let users = payers(4);
            let order = coordinator
                .create_order(PlaceOrder::at_soiree(soiree, users.clone()))
                .await
                .unwrap();
            let order_id = order.id().unwrap();
            coordinator
                .answer_order(order_id, users[0].user_id, false)
                .await
                .unwrap_err();
        });
    });
}

criterion_group!(benches, bench_full_saga, bench_refusal);
criterion_main!(benches);
