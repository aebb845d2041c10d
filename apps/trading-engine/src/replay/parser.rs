//! Event log line parser.
//!
//! Historical feeds are flat files of one event per line, either
//! comma- or pipe-delimited:
//!
//! ```text
//! timestamp,eventCode,orderId,price,quantity,sideCode
//! ```
//!
//! Timestamps are epoch milliseconds. Event codes follow the
//! exchange's numbering: 330 add, 331 modify, 332 delete, 335 book
//! clear, 350 trade, 364 opening-price calculation. Side codes are
//! 0 bid, 1 ask, -999 none. Trailing extra fields are ignored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{ExchangeOrderType, MarketEvent, MessageType, Side};

const EVENT_CODE_ADD: i64 = 330;
const EVENT_CODE_MODIFY: i64 = 331;
const EVENT_CODE_DELETE: i64 = 332;
const EVENT_CODE_CLEAR: i64 = 335;
const EVENT_CODE_TRADE: i64 = 350;
const EVENT_CODE_OPENING_PRICE: i64 = 364;

const SIDE_CODE_BID: i64 = 0;
const SIDE_CODE_ASK: i64 = 1;
const SIDE_CODE_NONE: i64 = -999;

/// Why a log line could not be turned into a [`MarketEvent`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than the six required fields.
    #[error("expected at least 6 fields, found {found}")]
    FieldCount {
        /// Number of fields found.
        found: usize,
    },
    /// A numeric field failed to parse.
    #[error("invalid {field} value {value:?}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// The raw text.
        value: String,
    },
    /// The timestamp is not a representable epoch-millisecond value.
    #[error("timestamp {0} out of range")]
    TimestampOutOfRange(i64),
    /// An event code outside the known set.
    #[error("unknown event code {0}")]
    UnknownEventCode(i64),
    /// A side code outside the known set.
    #[error("unknown side code {0}")]
    UnknownSideCode(i64),
}

fn field<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, ParseError> {
    let value = fields.get(index).map_or("", |raw| raw.trim());
    if value.is_empty() {
        return Err(ParseError::InvalidField {
            field: name,
            value: String::new(),
        });
    }
    Ok(value)
}

fn parse_i64(fields: &[&str], index: usize, name: &'static str) -> Result<i64, ParseError> {
    let raw = field(fields, index, name)?;
    raw.parse().map_err(|_| ParseError::InvalidField {
        field: name,
        value: raw.to_string(),
    })
}

fn parse_message_type(code: i64) -> Result<MessageType, ParseError> {
    match code {
        EVENT_CODE_ADD => Ok(MessageType::AddOrder),
        EVENT_CODE_MODIFY => Ok(MessageType::ModifyOrder),
        EVENT_CODE_DELETE => Ok(MessageType::DeleteOrder),
        EVENT_CODE_CLEAR => Ok(MessageType::OrderBookClear),
        EVENT_CODE_TRADE => Ok(MessageType::Trade),
        EVENT_CODE_OPENING_PRICE => Ok(MessageType::CalculateOpeningPrice),
        other => Err(ParseError::UnknownEventCode(other)),
    }
}

fn parse_side(code: i64) -> Result<Side, ParseError> {
    match code {
        SIDE_CODE_BID => Ok(Side::Bid),
        SIDE_CODE_ASK => Ok(Side::Ask),
        SIDE_CODE_NONE => Ok(Side::None),
        other => Err(ParseError::UnknownSideCode(other)),
    }
}

/// Parse one log line into a [`MarketEvent`].
///
/// # Errors
///
/// [`ParseError`] describing the first malformed field.
pub fn parse_line(line: &str) -> Result<MarketEvent, ParseError> {
    let delimiter = if line.contains('|') { '|' } else { ',' };
    let fields: Vec<&str> = line.split(delimiter).collect();
    if fields.len() < 6 {
        return Err(ParseError::FieldCount {
            found: fields.len(),
        });
    }

    let millis = parse_i64(&fields, 0, "timestamp")?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
        .ok_or(ParseError::TimestampOutOfRange(millis))?;
    let message_type = parse_message_type(parse_i64(&fields, 1, "eventCode")?)?;
    let order_id_raw = parse_i64(&fields, 2, "orderId")?;
    let order_id =
        u64::try_from(order_id_raw).map_err(|_| ParseError::InvalidField {
            field: "orderId",
            value: order_id_raw.to_string(),
        })?;
    let price_raw = field(&fields, 3, "price")?;
    let price: Decimal = price_raw.parse().map_err(|_| ParseError::InvalidField {
        field: "price",
        value: price_raw.to_string(),
    })?;
    let quantity = parse_i64(&fields, 4, "quantity")?;
    let side = parse_side(parse_i64(&fields, 5, "sideCode")?)?;

    Ok(MarketEvent {
        timestamp,
        message_type,
        order_id,
        price,
        quantity,
        side,
        order_type: ExchangeOrderType::Limit,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_parses_comma_delimited_add() {
        let event = parse_line("1772377200000,330,42,101.25,3,0").unwrap();
        assert_eq!(event.message_type, MessageType::AddOrder);
        assert_eq!(event.order_id, 42);
        assert_eq!(event.price, dec!(101.25));
        assert_eq!(event.quantity, 3);
        assert_eq!(event.side, Side::Bid);
        assert_eq!(event.timestamp.timestamp_millis(), 1_772_377_200_000);
    }

    #[test]
    fn test_parses_pipe_delimited_trade_with_extra_fields() {
        let event = parse_line("1772377200500|350|42|101.25|2|1|ignored|ignored").unwrap();
        assert_eq!(event.message_type, MessageType::Trade);
        assert_eq!(event.side, Side::Ask);
    }

    #[test]
    fn test_none_side_code() {
        let event = parse_line("1772377200000,335,0,0,0,-999").unwrap();
        assert_eq!(event.message_type, MessageType::OrderBookClear);
        assert_eq!(event.side, Side::None);
    }

    #[test_case(330, MessageType::AddOrder)]
    #[test_case(331, MessageType::ModifyOrder)]
    #[test_case(332, MessageType::DeleteOrder)]
    #[test_case(335, MessageType::OrderBookClear)]
    #[test_case(350, MessageType::Trade)]
    #[test_case(364, MessageType::CalculateOpeningPrice)]
    fn test_event_code_mapping(code: i64, expected: MessageType) {
        let line = format!("1772377200000,{code},1,100,1,0");
        assert_eq!(parse_line(&line).unwrap().message_type, expected);
    }

    #[test]
    fn test_rejects_malformed_lines() {
        assert_eq!(
            parse_line("1772377200000,330,42"),
            Err(ParseError::FieldCount { found: 3 })
        );
        assert_eq!(
            parse_line("1772377200000,999,42,101.25,3,0"),
            Err(ParseError::UnknownEventCode(999))
        );
        assert_eq!(
            parse_line("1772377200000,330,42,101.25,3,7"),
            Err(ParseError::UnknownSideCode(7))
        );
        assert!(matches!(
            parse_line("abc,330,42,101.25,3,0"),
            Err(ParseError::InvalidField { field: "timestamp", .. })
        ));
        assert!(matches!(
            parse_line("1772377200000,330,42,not-a-price,3,0"),
            Err(ParseError::InvalidField { field: "price", .. })
        ));
    }
}
