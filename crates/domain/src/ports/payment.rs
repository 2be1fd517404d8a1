//! Payment port (§4.5).

use async_trait::async_trait;
use common::OrderId;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::OmsError;

/// Outcome of a `pay` attempt. `Indeterminate` is treated as a failure
/// requiring compensation (§4.5), same as `Failed`, but kept distinct so
/// callers can log/alert on it differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayOutcome {
    Authorized,
    Captured,
    Failed,
    Indeterminate,
}

impl PayOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PayOutcome::Authorized | PayOutcome::Captured)
    }
}

/// Outcome of a `refund` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded,
    Failed,
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn pay(
        &self,
        order_id: OrderId,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PayOutcome, OmsError>;

    async fn refund(
        &self,
        order_id: OrderId,
        amount_minor: i64,
        currency: &str,
    ) -> Result<RefundOutcome, OmsError>;
}

#[derive(Debug, Default)]
struct State {
    charges: HashMap<OrderId, i64>,
    fail_on_pay: bool,
    fail_on_refund: bool,
}

/// In-memory payment adapter, mirroring the teacher's
/// `InMemoryPaymentService` (lock-guarded map, `set_fail_on_*` toggles,
/// count/has-record inspection).
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: std::sync::Arc<RwLock<State>>,
}

impl InMemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_pay(&self, fail: bool) {
        self.state.write().unwrap().fail_on_pay = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    pub fn charged_amount(&self, order_id: OrderId) -> Option<i64> {
        self.state.read().unwrap().charges.get(&order_id).copied()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn pay(
        &self,
        order_id: OrderId,
        amount_minor: i64,
        _currency: &str,
    ) -> Result<PayOutcome, OmsError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_pay {
            return Ok(PayOutcome::Failed);
        }
        state.charges.insert(order_id, amount_minor);
        Ok(PayOutcome::Captured)
    }

    async fn refund(
        &self,
        order_id: OrderId,
        _amount_minor: i64,
        _currency: &str,
    ) -> Result<RefundOutcome, OmsError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_refund {
            return Ok(RefundOutcome::Failed);
        }
        state.charges.remove(&order_id);
        Ok(RefundOutcome::Refunded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pay_then_refund_clears_charge() {
        let svc = InMemoryPaymentService::new();
        let order_id = OrderId::new();
        let outcome = svc.pay(order_id, 600, "USD").await.unwrap();
        assert_eq!(outcome, PayOutcome::Captured);
        assert_eq!(svc.charged_amount(order_id), Some(600));

        let refund = svc.refund(order_id, 600, "USD").await.unwrap();
        assert_eq!(refund, RefundOutcome::Refunded);
        assert_eq!(svc.charged_amount(order_id), None);
    }

    #[tokio::test]
    async fn fail_on_pay_returns_failed_not_err() {
        let svc = InMemoryPaymentService::new();
        svc.set_fail_on_pay(true);
        let outcome = svc.pay(OrderId::new(), 100, "USD").await.unwrap();
        assert_eq!(outcome, PayOutcome::Failed);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn fail_on_refund_returns_failed() {
        let svc = InMemoryPaymentService::new();
        let order_id = OrderId::new();
        svc.pay(order_id, 100, "USD").await.unwrap();
        svc.set_fail_on_refund(true);
        let outcome = svc.refund(order_id, 100, "USD").await.unwrap();
        assert_eq!(outcome, RefundOutcome::Failed);
    }
}
