//! JSONL audit trail.
//!
//! [`AuditRecorder`] subscribes to the trading day and appends one
//! JSON object per sequenced event to a log file, so a replay leaves
//! a machine-readable record of every snapshot and trade it derived.
//! Write failures are logged and swallowed: the audit trail must
//! never take the engine down.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

use crate::models::{Bar, MarketEvent, OrderBook, Trade};
use crate::sequencer::MarketObserver;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
enum AuditRecord<'a> {
    OrderBook(&'a OrderBook),
    Trade {
        trade: &'a Trade,
        book: Option<&'a OrderBook>,
    },
    Bar(&'a Bar),
    Extra(&'a MarketEvent),
}

/// Append-only JSONL recorder for sequenced events.
#[derive(Debug)]
pub struct AuditRecorder {
    out: Mutex<BufWriter<File>>,
}

impl AuditRecorder {
    /// Create or truncate the audit file at `path`.
    ///
    /// # Errors
    ///
    /// I/O failures creating the file.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Flush buffered records to disk.
    ///
    /// # Errors
    ///
    /// I/O failures flushing the file.
    pub fn flush(&self) -> std::io::Result<()> {
        self.out.lock().flush()
    }

    fn write(&self, record: &AuditRecord<'_>) {
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(err) => {
                error!(%err, "audit record serialization failed");
                return;
            }
        };
        line.push(b'\n');
        if let Err(err) = self.out.lock().write_all(&line) {
            error!(%err, "audit record write failed");
        }
    }
}

impl MarketObserver for AuditRecorder {
    fn on_order_book(&self, book: &OrderBook) {
        self.write(&AuditRecord::OrderBook(book));
    }

    fn on_trade(&self, trade: &Trade, book: Option<&OrderBook>) {
        self.write(&AuditRecord::Trade { trade, book });
    }

    fn on_bar(&self, bar: &Bar) {
        self.write(&AuditRecord::Bar(bar));
    }

    fn on_extra(&self, event: &MarketEvent) {
        self.write(&AuditRecord::Extra(event));
    }
}
