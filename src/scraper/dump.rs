//! Raw HTML dumps for offline inspection.
//!
//! Files are written for debugging only and never read back by the pipeline.

use std::path::PathBuf;

use crate::types::Direction;

/// Kind of page being dumped
#[derive(Debug, Clone, Copy)]
pub enum DumpKind<'a> {
    RouteList,
    Stops {
        route_id: &'a str,
        direction: Direction,
    },
}

impl DumpKind<'_> {
    /// File name for this page
    pub fn file_name(&self) -> String {
        match self {
            DumpKind::RouteList => "hermes_ebus_taipei_route_list.html".to_string(),
            DumpKind::Stops {
                route_id,
                direction,
            } => format!("ebus_taipei_{}_{}.html", route_id, direction),
        }
    }
}

/// Directory-backed HTML dump
#[derive(Debug, Clone)]
pub struct HtmlDump {
    base_dir: PathBuf,
}

impl HtmlDump {
    /// Create a dump writing into the given directory
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get dump file path for a page
    pub fn path(&self, kind: DumpKind<'_>) -> PathBuf {
        self.base_dir.join(kind.file_name())
    }

    /// Write page HTML, replacing any previous dump of the same page
    pub fn write(&self, kind: DumpKind<'_>, html: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.path(kind);
        std::fs::write(&path, html)?;
        Ok(path)
    }
}
