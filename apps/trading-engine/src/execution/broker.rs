//! Broker collaborator contract.
//!
//! The engine talks to its broker through [`Broker`] only: place an
//! order, cancel everything pending. Fills, cancellations, and
//! position snapshots come back asynchronously through the gateway's
//! callback methods, on whatever thread the broker integration runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{ExchangeOrderType, Side};

/// An order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Idempotency key for the venue, assigned by the gateway.
    pub client_order_id: Uuid,
    /// Order side.
    pub side: Side,
    /// Quantity (positive).
    pub quantity: i64,
    /// Reference price (top-of-book at submission for market orders).
    pub price: Decimal,
    /// Order type.
    pub order_type: ExchangeOrderType,
}

/// The broker's acknowledgement of a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Broker-assigned order id.
    pub broker_order_id: i64,
    /// Acknowledgement timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Broker-side failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker declined the order.
    #[error("broker rejected order: {0}")]
    Rejected(String),
    /// The broker could not be reached.
    #[error("broker transport failure: {0}")]
    Transport(String),
}

/// Order placement and cancellation, implemented per venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit an order and return the broker's acknowledgement.
    async fn place(&self, request: OrderRequest) -> Result<OrderRecord, BrokerError>;

    /// Cancel every pending order for this account.
    async fn cancel_all_pending(&self) -> Result<(), BrokerError>;
}

/// Deterministic in-process broker for replays and tests: assigns
/// sequential order ids, acknowledges at the submitted timestamp, and
/// records every request it sees. It never fills on its own; replay
/// drivers report fills back through the gateway explicitly.
#[derive(Debug)]
pub struct PaperBroker {
    next_order_id: AtomicI64,
    clock: parking_lot::Mutex<DateTime<Utc>>,
    placed: parking_lot::Mutex<Vec<OrderRequest>>,
}

impl PaperBroker {
    /// Create a paper broker whose first assigned id is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_order_id: AtomicI64::new(1),
            clock: parking_lot::Mutex::new(DateTime::<Utc>::MIN_UTC),
            placed: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Advance the logical clock acknowledgements are stamped with.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self.clock.lock() = now;
    }

    /// Every request placed so far, in order.
    #[must_use]
    pub fn placed_requests(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn place(&self, request: OrderRequest) -> Result<OrderRecord, BrokerError> {
        let broker_order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let timestamp = *self.clock.lock();
        debug!(
            broker_order_id,
            client_order_id = %request.client_order_id,
            ?request.side,
            request.quantity,
            "paper order placed"
        );
        self.placed.lock().push(request);
        Ok(OrderRecord {
            broker_order_id,
            timestamp,
        })
    }

    async fn cancel_all_pending(&self) -> Result<(), BrokerError> {
        debug!("paper cancel-all");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_paper_broker_assigns_sequential_ids() {
        let broker = PaperBroker::new();
        let request = OrderRequest {
            client_order_id: Uuid::new_v4(),
            side: Side::Bid,
            quantity: 2,
            price: dec!(101),
            order_type: ExchangeOrderType::Market,
        };
        let (first, second) = tokio_test::block_on(async {
            let first = broker.place(request.clone()).await.unwrap();
            let second = broker.place(request).await.unwrap();
            (first, second)
        });
        assert_eq!(first.broker_order_id, 1);
        assert_eq!(second.broker_order_id, 2);
        assert_eq!(broker.placed_requests().len(), 2);
    }
}
