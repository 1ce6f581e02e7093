//! Stop-to-stop route lookups.
//!
//! - `StaticRouteFinder`: searches a static stop timetable exported as CSV.
//! - `pair_arrivals`: pairs recorded arrival samples of two stops per route.
//! - `write_timetable`: exports stored stops in the timetable CSV format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::Path;

use crate::types::{RealtimeSnapshot, Route, Stop};

/// One row of the static timetable CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StopRow {
    route_name: String,
    direction_text: String,
    stop_number: u32,
    stop_name: String,
}

/// A route passing the origin before the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route_name: String,
    pub direction_text: String,
    /// Stops from origin to destination, both included
    pub stops: Vec<String>,
}

/// Route finder over static stop sequences
pub struct StaticRouteFinder {
    sequences: BTreeMap<(String, String), Vec<String>>,
}

impl StaticRouteFinder {
    /// Load a CSV with columns route_name, direction_text, stop_number, stop_name
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut grouped: BTreeMap<(String, String), Vec<(u32, String)>> = BTreeMap::new();

        for (line, row) in csv::Reader::from_reader(reader).deserialize::<StopRow>().enumerate() {
            let row = row.with_context(|| format!("Invalid timetable row {}", line + 1))?;
            grouped
                .entry((row.route_name, row.direction_text))
                .or_default()
                .push((row.stop_number, row.stop_name));
        }

        let sequences = grouped
            .into_iter()
            .map(|(key, mut stops)| {
                stops.sort_by_key(|(number, _)| *number);
                (key, stops.into_iter().map(|(_, name)| name).collect())
            })
            .collect();

        Ok(Self { sequences })
    }

    /// Routes whose stop sequence visits `origin` strictly before `destination`
    pub fn find_routes(&self, origin: &str, destination: &str) -> Vec<RouteMatch> {
        self.sequences
            .iter()
            .filter_map(|((route_name, direction_text), stops)| {
                let from = stops.iter().position(|s| s == origin)?;
                let to = stops.iter().position(|s| s == destination)?;
                (from < to).then(|| RouteMatch {
                    route_name: route_name.clone(),
                    direction_text: direction_text.clone(),
                    stops: stops[from..=to].to_vec(),
                })
            })
            .collect()
    }
}

/// Write stops as timetable rows. Stops of routes missing from `routes`
/// are skipped. Returns the number of rows written.
pub fn write_timetable<W: Write>(routes: &[Route], stops: &[Stop], writer: W) -> Result<usize> {
    let names: HashMap<&str, &str> = routes
        .iter()
        .map(|r| (r.route_id.as_str(), r.route_name.as_str()))
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    let mut written = 0;
    for stop in stops {
        let Some(route_name) = names.get(stop.route_id.as_str()) else {
            continue;
        };
        csv.serialize(StopRow {
            route_name: route_name.to_string(),
            direction_text: stop.direction.label().to_string(),
            stop_number: stop.stop_number,
            stop_name: stop.stop_name.clone(),
        })?;
        written += 1;
    }
    csv.flush()?;
    Ok(written)
}

/// Latest arrival texts at two stops of one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalPair {
    pub route_id: String,
    pub origin_arrival: Option<String>,
    pub destination_arrival: Option<String>,
}

/// Group samples by route; later samples override earlier ones
pub fn pair_arrivals(
    snapshots: &[RealtimeSnapshot],
    origin: &str,
    destination: &str,
) -> Vec<ArrivalPair> {
    let mut by_route: BTreeMap<&str, ArrivalPair> = BTreeMap::new();

    for snapshot in snapshots {
        let pair = by_route
            .entry(snapshot.route_id.as_str())
            .or_insert_with(|| ArrivalPair {
                route_id: snapshot.route_id.clone(),
                origin_arrival: None,
                destination_arrival: None,
            });
        if snapshot.stop_name == origin {
            pair.origin_arrival = Some(snapshot.arrival_info.clone());
        } else if snapshot.stop_name == destination {
            pair.destination_arrival = Some(snapshot.arrival_info.clone());
        }
    }

    by_route
        .into_values()
        .filter(|p| p.origin_arrival.is_some() || p.destination_arrival.is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use std::io::Write;

    const TIMETABLE: &str = "\
route_name,direction_text,stop_number,stop_name
承德幹線,去程,2,士林官邸
承德幹線,去程,1,捷運劍潭站
承德幹線,去程,3,福林橋
承德幹線,回程,1,福林橋
承德幹線,回程,2,士林官邸
承德幹線,回程,3,捷運劍潭站
紅30,去程,1,士林官邸
紅30,去程,2,捷運劍潭站
";

    fn finder() -> StaticRouteFinder {
        StaticRouteFinder::from_reader(TIMETABLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_find_routes_in_order() {
        let matches = finder().find_routes("捷運劍潭站", "福林橋");
        assert_eq!(
            matches,
            vec![RouteMatch {
                route_name: "承德幹線".to_string(),
                direction_text: "去程".to_string(),
                stops: vec![
                    "捷運劍潭站".to_string(),
                    "士林官邸".to_string(),
                    "福林橋".to_string(),
                ],
            }]
        );
    }

    #[test]
    fn test_find_routes_both_directions_checked() {
        let matches = finder().find_routes("士林官邸", "捷運劍潭站");
        let found: Vec<_> = matches
            .iter()
            .map(|m| (m.route_name.as_str(), m.direction_text.as_str()))
            .collect();
        assert_eq!(found, vec![("承德幹線", "回程"), ("紅30", "去程")]);
    }

    #[test]
    fn test_find_routes_same_stop_or_unknown() {
        assert!(finder().find_routes("福林橋", "福林橋").is_empty());
        assert!(finder().find_routes("不存在", "福林橋").is_empty());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TIMETABLE.as_bytes()).unwrap();
        let finder = StaticRouteFinder::from_path(file.path()).unwrap();
        assert_eq!(finder.find_routes("捷運劍潭站", "士林官邸").len(), 1);
    }

    #[test]
    fn test_invalid_row() {
        let csv = "route_name,direction_text,stop_number,stop_name\nA,去程,x,B\n";
        assert!(StaticRouteFinder::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_exported_timetable_is_searchable() {
        let routes = vec![Route {
            route_id: "0161000900".to_string(),
            route_name: "承德幹線".to_string(),
            status: crate::types::RouteStatus::Updated,
        }];
        let stop = |number: u32, name: &str| Stop {
            route_id: "0161000900".to_string(),
            direction: Direction::Come,
            stop_number: number,
            stop_name: name.to_string(),
            stop_id: number as i64,
            arrival_info: String::new(),
            latitude: 25.0,
            longitude: 121.5,
        };
        let mut orphan = stop(1, "孤站");
        orphan.route_id = "UNKNOWN".to_string();
        let stops = vec![stop(1, "福林橋"), stop(2, "士林官邸"), orphan];

        let mut buf = Vec::new();
        assert_eq!(write_timetable(&routes, &stops, &mut buf).unwrap(), 2);

        let finder = StaticRouteFinder::from_reader(buf.as_slice()).unwrap();
        let matches = finder.find_routes("福林橋", "士林官邸");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].direction_text, "回程");
    }

    fn snapshot(id: i64, route_id: &str, stop_name: &str, arrival: &str) -> RealtimeSnapshot {
        RealtimeSnapshot {
            id,
            route_id: route_id.to_string(),
            direction: Direction::Go,
            stop_number: 1,
            stop_name: stop_name.to_string(),
            arrival_info: arrival.to_string(),
            captured_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_pair_arrivals() {
        let snapshots = vec![
            snapshot(1, "R1", "A", "10分"),
            snapshot(2, "R1", "B", "15分"),
            snapshot(3, "R2", "A", "進站中"),
            snapshot(4, "R1", "A", "8分"),
        ];
        let pairs = pair_arrivals(&snapshots, "A", "B");
        assert_eq!(
            pairs,
            vec![
                ArrivalPair {
                    route_id: "R1".to_string(),
                    origin_arrival: Some("8分".to_string()),
                    destination_arrival: Some("15分".to_string()),
                },
                ArrivalPair {
                    route_id: "R2".to_string(),
                    origin_arrival: Some("進站中".to_string()),
                    destination_arrival: None,
                },
            ]
        );
    }
}
