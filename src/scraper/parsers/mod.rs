//! HTML parsers for eBus pages.
//!
//! Both parsers rely on fixed class-name markers and fail loudly when a
//! page yields no records rather than returning an empty list.

pub mod route_list;
pub mod stop_list;

use std::fmt;

pub use route_list::RouteListParser;
pub use stop_list::StopListParser;

/// Record shapes the parsers extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    RouteList,
    StopList,
}

impl fmt::Display for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordShape::RouteList => f.write_str("route list"),
            RecordShape::StopList => f.write_str("stop list"),
        }
    }
}

/// Extraction failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("No {0} records found")]
    NoRecords(RecordShape),
    #[error("Record {index}: missing {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("Record {index}: malformed {field} {value:?}")]
    MalformedField {
        index: usize,
        field: &'static str,
        value: String,
    },
}
