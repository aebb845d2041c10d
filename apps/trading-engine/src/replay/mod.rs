//! Event log replay: line parsing, the replay driver, and the JSONL
//! audit trail.

mod parser;
mod recorder;
mod session;

pub use parser::{ParseError, parse_line};
pub use recorder::AuditRecorder;
pub use session::{ReplayError, ReplaySession, ReplaySummary};
