//! SQLite repository for routes, stops and realtime snapshots

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use super::schema::Schema;
use crate::types::{Direction, RealtimeSnapshot, Route, RouteEntry, RouteStatus, Stop};

/// Storage failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Route not found: {0}")]
    UnknownRoute(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Repository over the eBus tables
pub struct BusRepository {
    conn: Connection,
}

impl BusRepository {
    /// Open (or create) the database file and apply the schema
    pub fn open(db_path: &Path, schema: &Schema) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        schema.create(&conn)?;
        debug!(
            "Opened {} ({})",
            db_path.display(),
            schema.table_names().collect::<Vec<_>>().join(", ")
        );

        Ok(Self { conn })
    }

    /// Create an in-memory repository
    #[cfg(test)]
    pub fn in_memory(schema: &Schema) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema.create(&conn)?;
        Ok(Self { conn })
    }

    // ==================== Write Operations ====================

    /// Upsert routes. Names are overwritten, refresh status is kept.
    pub fn upsert_routes(&self, routes: &[RouteEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO data_route_list (route_id, route_name, route_data_updated)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(route_id) DO UPDATE SET route_name = excluded.route_name
                "#,
            )?;
            for route in routes {
                stmt.execute(params![route.route_id, route.route_name, RouteStatus::Pending])?;
            }
        }
        tx.commit()?;
        Ok(routes.len())
    }

    /// Replace the stored stops of every (route, direction) present in
    /// `stops` in a single transaction
    pub fn upsert_stops(&self, stops: &[Stop]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let written = Self::upsert_stops_in(&tx, stops)?;
        tx.commit()?;
        Ok(written)
    }

    /// Upsert stops and append their arrival samples atomically
    pub fn upsert_stops_with_snapshots(&self, stops: &[Stop]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let written = Self::upsert_stops_in(&tx, stops)?;
        Self::append_snapshots_in(&tx, stops)?;
        tx.commit()?;
        Ok(written)
    }

    fn upsert_stops_in(conn: &Connection, stops: &[Stop]) -> Result<usize> {
        // Rows missing from the latest parse must not survive
        let replaced: HashSet<(&str, Direction)> = stops
            .iter()
            .map(|s| (s.route_id.as_str(), s.direction))
            .collect();
        let mut clear = conn.prepare(
            "DELETE FROM data_route_info_busstop WHERE route_id = ?1 AND direction = ?2",
        )?;
        for (route_id, direction) in &replaced {
            clear.execute(params![route_id, direction])?;
        }

        let mut stmt = conn.prepare(
            r#"
            INSERT OR REPLACE INTO data_route_info_busstop
            (route_id, direction, stop_number, stop_id, stop_name,
             arrival_info, latitude, longitude, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            "#,
        )?;
        for stop in stops {
            stmt.execute(params![
                stop.route_id,
                stop.direction,
                stop.stop_number,
                stop.stop_id,
                stop.stop_name,
                stop.arrival_info,
                stop.latitude,
                stop.longitude,
            ])?;
        }
        Ok(stops.len())
    }

    fn append_snapshots_in(conn: &Connection, stops: &[Stop]) -> Result<usize> {
        let captured_at = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO data_realtime_info
            (route_id, direction, stop_number, stop_name, arrival_info, captured_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        for stop in stops {
            stmt.execute(params![
                stop.route_id,
                stop.direction,
                stop.stop_number,
                stop.stop_name,
                stop.arrival_info,
                captured_at,
            ])?;
        }
        Ok(stops.len())
    }

    /// Set the refresh status of one route
    pub fn set_route_status(&self, route_id: &str, status: RouteStatus) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE data_route_list SET route_data_updated = ?1 WHERE route_id = ?2",
            params![status, route_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownRoute(route_id.to_string()));
        }
        Ok(())
    }

    /// Return every route to pending
    pub fn reset_statuses(&self) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE data_route_list SET route_data_updated = ?1",
            params![RouteStatus::Pending],
        )?;
        Ok(changed)
    }

    // ==================== Query Operations ====================

    /// All routes ordered by id
    pub fn routes(&self) -> Result<Vec<Route>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT route_id, route_name, route_data_updated
            FROM data_route_list
            ORDER BY route_id
            "#,
        )?;

        let routes = stmt
            .query_map([], |row| {
                Ok(Route {
                    route_id: row.get(0)?,
                    route_name: row.get(1)?,
                    status: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(routes)
    }

    /// Routes currently in the given status
    pub fn routes_with_status(&self, status: RouteStatus) -> Result<Vec<Route>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT route_id, route_name, route_data_updated
            FROM data_route_list
            WHERE route_data_updated = ?1
            ORDER BY route_id
            "#,
        )?;

        let routes = stmt
            .query_map([status], |row| {
                Ok(Route {
                    route_id: row.get(0)?,
                    route_name: row.get(1)?,
                    status: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(routes)
    }

    /// Look up a route by its display name
    pub fn route_by_name(&self, route_name: &str) -> Result<Option<Route>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT route_id, route_name, route_data_updated
            FROM data_route_list
            WHERE route_name = ?1
            ORDER BY route_id
            LIMIT 1
            "#,
        )?;

        let mut rows = stmt.query_map([route_name], |row| {
            Ok(Route {
                route_id: row.get(0)?,
                route_name: row.get(1)?,
                status: row.get(2)?,
            })
        })?;

        Ok(rows.next().transpose()?)
    }

    /// Stops of a route in one direction, in sequence order
    pub fn stops(&self, route_id: &str, direction: Direction) -> Result<Vec<Stop>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT route_id, direction, stop_number, stop_name, stop_id,
                   arrival_info, latitude, longitude
            FROM data_route_info_busstop
            WHERE route_id = ?1 AND direction = ?2
            ORDER BY stop_number
            "#,
        )?;

        let stops = stmt
            .query_map(params![route_id, direction], Self::map_stop)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stops)
    }

    /// Every stored stop ordered by key
    pub fn all_stops(&self) -> Result<Vec<Stop>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT route_id, direction, stop_number, stop_name, stop_id,
                   arrival_info, latitude, longitude
            FROM data_route_info_busstop
            ORDER BY route_id, direction, stop_number
            "#,
        )?;

        let stops = stmt
            .query_map([], Self::map_stop)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stops)
    }

    fn map_stop(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stop> {
        Ok(Stop {
            route_id: row.get(0)?,
            direction: row.get(1)?,
            stop_number: row.get(2)?,
            stop_name: row.get(3)?,
            stop_id: row.get(4)?,
            arrival_info: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            latitude: row.get(6)?,
            longitude: row.get(7)?,
        })
    }

    /// Snapshots whose stop name is one of `names`, oldest first
    pub fn snapshots_for_stop_names(&self, names: &[&str]) -> Result<Vec<RealtimeSnapshot>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            r#"
            SELECT id, route_id, direction, stop_number, stop_name,
                   arrival_info, captured_at
            FROM data_realtime_info
            WHERE stop_name IN ({})
            ORDER BY id
            "#,
            placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let snapshots = stmt
            .query_map(params_from_iter(names.iter()), |row| {
                Ok(RealtimeSnapshot {
                    id: row.get(0)?,
                    route_id: row.get(1)?,
                    direction: row.get(2)?,
                    stop_number: row.get(3)?,
                    stop_name: row.get(4)?,
                    arrival_info: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    captured_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    /// Get route count
    pub fn route_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM data_route_list",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get stop count
    pub fn stop_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM data_route_info_busstop",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get snapshot count
    pub fn snapshot_count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM data_realtime_info",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Status of one route, if it exists
    pub fn route_status(&self, route_id: &str) -> Result<Option<RouteStatus>> {
        let mut stmt = self
            .conn
            .prepare("SELECT route_data_updated FROM data_route_list WHERE route_id = ?1")?;
        let mut rows = stmt.query_map([route_id], |row| row.get(0))?;
        Ok(rows.next().transpose()?)
    }
}
