//! Broker contract and the order execution gateway.

mod broker;
mod gateway;

pub use broker::{Broker, BrokerError, OrderRecord, OrderRequest, PaperBroker};
pub use gateway::{OrderReceiver, OrderRejected};
