use chrono::Utc;
use common::{OrderId, PartyId, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Money, Order, OrderFilter, OrderKind, OrderRequest, aggregate, build_predicate};

fn request_with_lines(count: u32) -> OrderRequest {
    (0..count).fold(
        OrderRequest::new(PartyId::new(), UserId::new(), "cash"),
        |req, i| req.line(ProductId::new(), i % 4, Money::from_cents(199 + i64::from(i))),
    )
}

fn bench_aggregate_10_lines(c: &mut Criterion) {
    let request = request_with_lines(10);

    c.bench_function("domain/aggregate_10_lines", |b| {
        b.iter(|| aggregate(OrderKind::Purchase, request.clone()).unwrap());
    });
}

fn bench_aggregate_100_lines(c: &mut Criterion) {
    let request = request_with_lines(100);

    c.bench_function("domain/aggregate_100_lines", |b| {
        b.iter(|| aggregate(OrderKind::Sale, request.clone()).unwrap());
    });
}

fn bench_predicate_matching(c: &mut Criterion) {
    let orders: Vec<Order> = (0..1000)
        .map(|_| {
            let draft = aggregate(OrderKind::Sale, request_with_lines(5)).unwrap();
            Order::from_draft(OrderId::new(), Utc::now(), draft)
        })
        .collect();
    let filter = OrderFilter {
        product_id: Some(orders[500].lines[0].product_id.to_string()),
        created_from: Some("2000-01-01".to_string()),
        ..Default::default()
    };

    c.bench_function("domain/filter_1000_orders", |b| {
        b.iter(|| {
            let query = build_predicate(OrderKind::Sale, &filter).unwrap();
            orders.iter().filter(|o| query.matches(o)).count()
        });
    });
}

criterion_group!(
    benches,
    bench_aggregate_10_lines,
    bench_aggregate_100_lines,
    bench_predicate_matching
);
criterion_main!(benches);
