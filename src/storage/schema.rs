//! SQLite schema definitions for scraped eBus data
//!
//! Tables:
//! - data_route_list: Routes from the route-list page and their refresh status
//! - data_route_info_busstop: Latest stop list per (route, direction)
//! - data_realtime_info: Append-only arrival samples

use rusqlite::{Connection, Result};

/// A table (or index) definition applied on connection
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub ddl: &'static str,
}

/// Schema owned by a repository and created when it opens its connection
#[derive(Debug, Clone)]
pub struct Schema {
    pub tables: Vec<TableDef>,
    pub indexes: Vec<&'static str>,
}

impl Schema {
    /// Standard eBus schema: routes, stops and realtime snapshots
    pub fn ebus() -> Self {
        Self {
            tables: vec![
                // Route list
                TableDef {
                    name: "data_route_list",
                    ddl: r#"
                    CREATE TABLE IF NOT EXISTS data_route_list (
                        route_id TEXT PRIMARY KEY,
                        route_name TEXT NOT NULL,
                        route_data_updated TEXT NOT NULL DEFAULT 'pending'
                    )
                    "#,
                },
                // Stops, one row per (route, direction, stop number)
                TableDef {
                    name: "data_route_info_busstop",
                    ddl: r#"
                    CREATE TABLE IF NOT EXISTS data_route_info_busstop (
                        route_id TEXT NOT NULL,
                        direction TEXT NOT NULL,
                        stop_number INTEGER NOT NULL,
                        stop_id INTEGER NOT NULL,
                        stop_name TEXT NOT NULL,
                        arrival_info TEXT,
                        latitude REAL NOT NULL,
                        longitude REAL NOT NULL,
                        updated_at TEXT DEFAULT (datetime('now')),
                        PRIMARY KEY (route_id, direction, stop_number)
                    )
                    "#,
                },
                // Arrival samples
                TableDef {
                    name: "data_realtime_info",
                    ddl: r#"
                    CREATE TABLE IF NOT EXISTS data_realtime_info (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        route_id TEXT NOT NULL,
                        direction TEXT NOT NULL,
                        stop_number INTEGER NOT NULL,
                        stop_name TEXT NOT NULL,
                        arrival_info TEXT,
                        captured_at TEXT NOT NULL
                    )
                    "#,
                },
            ],
            indexes: vec![
                "CREATE INDEX IF NOT EXISTS idx_route_status ON data_route_list(route_data_updated)",
                "CREATE INDEX IF NOT EXISTS idx_route_name ON data_route_list(route_name)",
                "CREATE INDEX IF NOT EXISTS idx_realtime_stop_name ON data_realtime_info(stop_name)",
            ],
        }
    }

    /// Create all tables and indexes if they don't exist
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in &self.tables {
            conn.execute(table.ddl, [])?;
        }
        for index in &self.indexes {
            conn.execute(index, [])?;
        }
        Ok(())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|t| t.name)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::ebus()
    }
}
