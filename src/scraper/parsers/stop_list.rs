//! Stop list parser for ebus.gov.taipei route pages.
//!
//! URL: https://ebus.gov.taipei/Route/StopsOfRoute?routeid=ROUTEID
//!
//! Each stop is an `<li>` carrying six fields:
//! arrival text, sequence number, name, stop id, latitude, longitude.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::{ExtractError, RecordShape};
use crate::types::{Direction, Stop};

static NUMBER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.auto-list-stationlist-number").unwrap());
// The position span carries a state suffix class, e.g. "...-position-now"
static POSITION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"span[class^="auto-list-stationlist-position"]"#).unwrap());
static PLACE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.auto-list-stationlist-place").unwrap());
static STOP_ID: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="item.UniStopId"]"#).unwrap());
static LATITUDE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="item.Latitude"]"#).unwrap());
static LONGITUDE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="item.Longitude"]"#).unwrap());

/// Stop record as it appears on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEntry {
    pub arrival_info: String,
    pub stop_number: u32,
    pub stop_name: String,
    pub stop_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl StopEntry {
    /// Bind the record to its route and direction
    pub fn into_stop(self, route_id: &str, direction: Direction) -> Stop {
        Stop {
            route_id: route_id.to_string(),
            direction,
            stop_number: self.stop_number,
            stop_name: self.stop_name,
            stop_id: self.stop_id,
            arrival_info: self.arrival_info,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Parser for route stop pages
pub struct StopListParser;

impl StopListParser {
    /// Parse every stop block in document order.
    ///
    /// A single malformed or incomplete block fails the whole page.
    pub fn parse(html: &str) -> Result<Vec<StopEntry>, ExtractError> {
        let document = Html::parse_document(html);
        let mut stops = Vec::new();

        for (index, number) in document.select(&NUMBER).enumerate() {
            let block = enclosing_item(number).ok_or(ExtractError::MissingField {
                index,
                field: "list item",
            })?;
            stops.push(Self::parse_block(index, number, block)?);
        }

        if stops.is_empty() {
            return Err(ExtractError::NoRecords(RecordShape::StopList));
        }

        Ok(stops)
    }

    fn parse_block(
        index: usize,
        number: ElementRef,
        block: ElementRef,
    ) -> Result<StopEntry, ExtractError> {
        let arrival_info = text_of(block, &POSITION).ok_or(ExtractError::MissingField {
            index,
            field: "arrival status",
        })?;
        let stop_name = text_of(block, &PLACE).ok_or(ExtractError::MissingField {
            index,
            field: "stop name",
        })?;

        let number_text = number.text().collect::<String>();
        let stop_number = parse_field(index, "stop number", number_text.trim())?;

        let stop_id = parse_field(index, "stop id", &value_of(index, block, &STOP_ID, "stop id")?)?;

        let latitude: f64 =
            parse_field(index, "latitude", &value_of(index, block, &LATITUDE, "latitude")?)?;
        let longitude: f64 =
            parse_field(index, "longitude", &value_of(index, block, &LONGITUDE, "longitude")?)?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ExtractError::MalformedField {
                index,
                field: "latitude",
                value: latitude.to_string(),
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ExtractError::MalformedField {
                index,
                field: "longitude",
                value: longitude.to_string(),
            });
        }

        Ok(StopEntry {
            arrival_info,
            stop_number,
            stop_name,
            stop_id,
            latitude,
            longitude,
        })
    }
}

/// Nearest `<li>` containing the element
fn enclosing_item(elem: ElementRef) -> Option<ElementRef> {
    elem.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "li")
}

fn text_of(block: ElementRef, selector: &Selector) -> Option<String> {
    block
        .select(selector)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
}

fn value_of(
    index: usize,
    block: ElementRef,
    selector: &Selector,
    field: &'static str,
) -> Result<String, ExtractError> {
    block
        .select(selector)
        .next()
        .and_then(|e| e.value().attr("value"))
        .map(|v| v.trim().to_string())
        .ok_or(ExtractError::MissingField { index, field })
}

fn parse_field<T: std::str::FromStr>(
    index: usize,
    field: &'static str,
    text: &str,
) -> Result<T, ExtractError> {
    text.parse().map_err(|_| ExtractError::MalformedField {
        index,
        field,
        value: text.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build one stop block the way the route page renders it
    pub(crate) fn stop_block(
        arrival: &str,
        number: u32,
        name: &str,
        stop_id: i64,
        lat: &str,
        lon: &str,
    ) -> String {
        format!(
            r#"
            <li>
                <a class="auto-list-link auto-list-stationlist-link" href="javascript:void(0)">
                    <span class="auto-list-stationlist-position auto-list-stationlist-position-time">{arrival}</span>
                    <span class="auto-list-stationlist-number"> {number}</span>
                    <span class="auto-list-stationlist-place">{name}</span>
                </a>
                <input id="item_UniStopId" name="item.UniStopId" type="hidden" value="{stop_id}" />
                <input id="item_Latitude" name="item.Latitude" type="hidden" value="{lat}" />
                <input type="hidden" value="{lon}" name="item.Longitude" id="item_Longitude" />
            </li>"#
        )
    }

    /// Wrap stop blocks in a route page
    pub(crate) fn stop_page(blocks: &[String]) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<body>
<div class="stationlist-list-pool">
    <ul class="auto-list-pool">{}</ul>
</div>
</body>
</html>"#,
            blocks.join("\n")
        )
    }

    #[test]
    fn test_parse_stop_list() {
        let html = stop_page(&[
            stop_block("進站中", 1, "捷運劍潭站", 1010318, "25.08485", "121.52478"),
            stop_block("3分", 2, "士林官邸", 1010319, "25.09011", "121.52361"),
            stop_block("尚未發車", 3, "福林橋", 1010320, "25.09512", "121.52593"),
        ]);
        let stops = StopListParser::parse(&html).unwrap();

        assert_eq!(stops.len(), 3);
        assert_eq!(
            stops[0],
            StopEntry {
                arrival_info: "進站中".to_string(),
                stop_number: 1,
                stop_name: "捷運劍潭站".to_string(),
                stop_id: 1010318,
                latitude: 25.08485,
                longitude: 121.52478,
            }
        );
        let numbers: Vec<_> = stops.iter().map(|s| s.stop_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for stop in &stops {
            assert!((-90.0..=90.0).contains(&stop.latitude));
            assert!((-180.0..=180.0).contains(&stop.longitude));
        }
    }

    #[test]
    fn test_document_order_kept() {
        let html = stop_page(&[
            stop_block("1分", 5, "E", 5, "25.0", "121.0"),
            stop_block("2分", 4, "D", 4, "25.0", "121.0"),
        ]);
        let stops = StopListParser::parse(&html).unwrap();
        assert_eq!(stops[0].stop_name, "E");
        assert_eq!(stops[1].stop_name, "D");
    }

    #[test]
    fn test_malformed_latitude() {
        let html = stop_page(&[
            stop_block("3分", 1, "A", 1, "25.1", "121.5"),
            stop_block("3分", 2, "B", 2, "north", "121.5"),
        ]);
        let err = StopListParser::parse(&html).unwrap_err();
        assert_eq!(
            err,
            ExtractError::MalformedField {
                index: 1,
                field: "latitude",
                value: "north".to_string(),
            }
        );
    }

    #[test]
    fn test_latitude_out_of_range() {
        let html = stop_page(&[stop_block("3分", 1, "A", 1, "125.1", "121.5")]);
        let err = StopListParser::parse(&html).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedField { field: "latitude", .. }));
    }

    #[test]
    fn test_malformed_stop_number() {
        let html = stop_page(&[stop_block("3分", 1, "A", 1, "25.1", "121.5")
            .replace("> 1</span>", ">一</span>")]);
        let err = StopListParser::parse(&html).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedField { field: "stop number", .. }));
    }

    #[test]
    fn test_missing_stop_id() {
        let block = stop_block("3分", 1, "A", 1, "25.1", "121.5")
            .replace(r#"name="item.UniStopId""#, r#"name="item.Other""#);
        let err = StopListParser::parse(&stop_page(&[block])).unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingField {
                index: 0,
                field: "stop id",
            }
        );
    }

    #[test]
    fn test_no_stop_blocks() {
        let err = StopListParser::parse("<html><body><ul></ul></body></html>").unwrap_err();
        assert_eq!(err, ExtractError::NoRecords(RecordShape::StopList));
    }

    #[test]
    fn test_into_stop() {
        let entry = StopEntry {
            arrival_info: "5分".to_string(),
            stop_number: 7,
            stop_name: "X".to_string(),
            stop_id: 99,
            latitude: 25.0,
            longitude: 121.0,
        };
        let stop = entry.into_stop("R1", Direction::Come);
        assert_eq!(stop.route_id, "R1");
        assert_eq!(stop.direction, Direction::Come);
        assert_eq!(stop.stop_number, 7);
    }
}
