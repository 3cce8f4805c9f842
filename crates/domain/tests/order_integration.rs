//! End-to-end checks of the order model: request validation, pricing and the
//! status table.

use chrono::Utc;
use common::{OrderId, ProductId, SagaId};
use domain::{CreateOrder, LineRequest, Money, NewOrder, OrderError, OrderItem, OrderStatus};

fn pid(id: i64) -> ProductId {
    ProductId::new(id).unwrap()
}

#[test]
fn test_request_to_priced_order() {
    let command = CreateOrder::parse(
        4,
        &[
            LineRequest::new(2, 1),
            LineRequest::new(1, 2),
            LineRequest::new(2, 3),
        ],
    )
    .unwrap();

    let demand = command.demand();
    assert_eq!(demand.len(), 2);
    assert_eq!(demand[&pid(1)], 2);
    assert_eq!(demand[&pid(2)], 4);

    let price = |product: ProductId| Money::from_cents(product.as_i64() * 150);
    let items: Vec<_> = command
        .lines
        .iter()
        .map(|line| OrderItem::new(line.product_id, line.quantity, price(line.product_id)))
        .collect();

    let order = NewOrder::pending(command.user_id, items, SagaId::new())
        .into_order(OrderId::new(1).unwrap(), Utc::now());

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.item_count(), 3);
    // 1x$3.00 + 2x$1.50 + 3x$3.00
    assert_eq!(order.total_amount(), Money::from_cents(1500));
    assert_eq!(order.created_at, order.updated_at);
}

#[test]
fn test_invalid_requests_name_the_line() {
    let err = CreateOrder::parse(1, &[LineRequest::new(1, 1), LineRequest::new(2, 0)])
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidLine { index: 1, .. }));

    let err = CreateOrder::parse(1, &[]).unwrap_err();
    assert!(matches!(err, OrderError::NoItems));

    let err = CreateOrder::parse(-1, &[LineRequest::new(1, 1)]).unwrap_err();
    assert!(matches!(err, OrderError::InvalidId(_)));
}

#[test]
fn test_status_walk() {
    let mut status = OrderStatus::default();

    let step = status.transition("completed".parse().unwrap()).unwrap();
    assert!(!step.is_cancellation());
    status = step.target();
    assert_eq!(status, OrderStatus::Completed);

    assert!(status.transition(OrderStatus::Cancelled).is_err());
    assert!(status.transition(OrderStatus::Completed).is_ok());
}

#[test]
fn test_order_wire_format() {
    let order = NewOrder::pending(
        common::UserId::new(9).unwrap(),
        vec![OrderItem::new(pid(3), 2, Money::from_cents(1050))],
        SagaId::new(),
    )
    .into_order(OrderId::new(12).unwrap(), Utc::now());

    let json = serde_json::to_value(&order).unwrap();
    assert_eq!(json["id"], 12);
    assert_eq!(json["user_id"], 9);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["items"][0]["quantity"], 2);
}
