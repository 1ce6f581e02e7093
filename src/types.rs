//! Domain types shared by the scraper, the store and the driver.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Refresh status of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Pending,
    Updated,
    Failed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Pending => "pending",
            RouteStatus::Updated => "updated",
            RouteStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RouteStatus::Pending),
            "updated" => Ok(RouteStatus::Updated),
            "failed" => Ok(RouteStatus::Failed),
            other => Err(format!("unknown route status: {}", other)),
        }
    }
}

impl ToSql for RouteStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RouteStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Traversal direction of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outbound (去程)
    Go,
    /// Inbound (回程)
    Come,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Go, Direction::Come];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Go => "go",
            Direction::Come => "come",
        }
    }

    /// Label used on the eBus site and in static timetable exports
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Go => "去程",
            Direction::Come => "回程",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "go" | "去程" => Ok(Direction::Go),
            "come" | "回程" => Ok(Direction::Come),
            other => Err(format!("direction must be 'go' or 'come', got '{}'", other)),
        }
    }
}

impl ToSql for Direction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Direction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A route as listed on the route-list page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub route_id: String,
    pub route_name: String,
}

/// A stored route with its refresh status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub route_name: String,
    pub status: RouteStatus,
}

/// One stop of a route in one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub route_id: String,
    pub direction: Direction,
    pub stop_number: u32,
    pub stop_name: String,
    pub stop_id: i64,
    pub arrival_info: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Arrival text sampled at scrape time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSnapshot {
    pub id: i64,
    pub route_id: String,
    pub direction: Direction,
    pub stop_number: u32,
    pub stop_name: String,
    pub arrival_info: String,
    pub captured_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!("go".parse::<Direction>().unwrap(), Direction::Go);
        assert_eq!(" COME ".parse::<Direction>().unwrap(), Direction::Come);
        assert_eq!("回程".parse::<Direction>().unwrap(), Direction::Come);
        assert!("back".parse::<Direction>().is_err());
    }

    #[test]
    fn test_status_text_form() {
        for status in [RouteStatus::Pending, RouteStatus::Updated, RouteStatus::Failed] {
            assert_eq!(status.as_str().parse::<RouteStatus>().unwrap(), status);
        }
        assert!("1".parse::<RouteStatus>().is_err());
    }
}
