//! OHLCV bar type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar delivered by the upstream data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open price.
    pub open: Decimal,
    /// Bar high price.
    pub high: Decimal,
    /// Bar low price.
    pub low: Decimal,
    /// Bar close price.
    pub close: Decimal,
    /// Bar volume.
    pub volume: Decimal,
    /// Bar end timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    /// Check if a price level was touched during this bar.
    #[must_use]
    pub fn price_touched(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}
