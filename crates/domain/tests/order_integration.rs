//! Integration tests for the Order aggregate and its in-memory ports.
//!
//! These exercise order construction, invariant enforcement, and the
//! inventory/payment mocks the way the saga orchestrator composes them,
//! without pulling in the storage or saga crates.

use chrono::Utc;
use domain::{
    CustomerId, InMemoryInventoryService, InMemoryPaymentService, InventoryService, OmsError,
    Order, OrderItemInput, OrderStatus, PayOutcome, PaymentService, RefundOutcome,
};

fn item(sku: &str, qty: u32, price_minor: i64) -> OrderItemInput {
    OrderItemInput {
        sku: sku.into(),
        qty,
        price_minor,
    }
}

mod order_creation {
    use super::*;

    #[test]
    fn create_computes_total_and_starts_pending() {
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 2, 1000), item("SKU-002", 1, 500)],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount_minor, 2500);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.version, 0);
        assert!(order.check_amount_invariant());
    }

    #[test]
    fn create_rejects_empty_order() {
        let err = Order::create(CustomerId::new(), "USD", vec![], Utc::now()).unwrap_err();
        assert!(matches!(err, OmsError::InvalidArgument(_)));
    }

    #[test]
    fn create_rejects_zero_quantity_item() {
        let err = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 0, 1000)],
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, OmsError::InvalidArgument(_)));
    }

    #[test]
    fn create_rejects_negative_price() {
        let err = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 1, -1)],
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, OmsError::InvalidArgument(_)));
    }

    #[test]
    fn create_rejects_malformed_currency() {
        let err = Order::create(
            CustomerId::new(),
            "dollars",
            vec![item("SKU-001", 1, 1000)],
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, OmsError::InvalidArgument(_)));
    }

    #[test]
    fn total_calculation_with_multiple_items() {
        // 2 x $10.00 + 3 x $5.50 + 1 x $25.99 = $62.49 = 6249 minor units
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![
                item("SKU-001", 2, 1000),
                item("SKU-002", 3, 550),
                item("SKU-003", 1, 2599),
            ],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.amount_minor, 6249);
    }
}

mod inventory_and_payment_ports {
    use super::*;

    #[tokio::test]
    async fn reserve_then_release_round_trip() {
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 2, 1000)],
            Utc::now(),
        )
        .unwrap();

        let inventory = InMemoryInventoryService::new();
        inventory.reserve(order.id, &order.items).await.unwrap();
        assert!(inventory.has_reservation(order.id));

        inventory.release(order.id, &order.items).await.unwrap();
        assert!(!inventory.has_reservation(order.id));
    }

    #[tokio::test]
    async fn reserve_failure_surfaces_as_unavailable() {
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 1, 1000)],
            Utc::now(),
        )
        .unwrap();

        let inventory = InMemoryInventoryService::new();
        inventory.set_fail_on_reserve(true);

        let err = inventory
            .reserve(order.id, &order.items)
            .await
            .unwrap_err();
        assert!(matches!(err, OmsError::Unavailable(_)));
        assert_eq!(inventory.reservation_count(), 0);
    }

    #[tokio::test]
    async fn pay_then_refund_round_trip() {
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 1, 2000)],
            Utc::now(),
        )
        .unwrap();

        let payment = InMemoryPaymentService::new();
        let outcome = payment
            .pay(order.id, order.amount_minor, &order.currency)
            .await
            .unwrap();
        assert_eq!(outcome, PayOutcome::Captured);
        assert!(outcome.is_success());
        assert_eq!(payment.charged_amount(order.id), Some(2000));

        let refund = payment
            .refund(order.id, order.amount_minor, &order.currency)
            .await
            .unwrap();
        assert_eq!(refund, RefundOutcome::Refunded);
        assert_eq!(payment.charged_amount(order.id), None);
    }

    #[tokio::test]
    async fn pay_failure_is_reported_not_errored() {
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![item("SKU-001", 1, 2000)],
            Utc::now(),
        )
        .unwrap();

        let payment = InMemoryPaymentService::new();
        payment.set_fail_on_pay(true);

        let outcome = payment
            .pay(order.id, order.amount_minor, &order.currency)
            .await
            .unwrap();
        assert_eq!(outcome, PayOutcome::Failed);
        assert!(!outcome.is_success());
        assert_eq!(payment.payment_count(), 0);
    }
}
