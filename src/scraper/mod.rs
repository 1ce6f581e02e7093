//! Web scraper module for ebus.gov.taipei
//!
//! Provides page rendering, HTML parsing, and diagnostic HTML dumps.

pub mod browser;
pub mod dump;
pub mod parsers;

pub use browser::{Browser, Interaction, PageRenderer, RenderError};
pub use dump::{DumpKind, HtmlDump};

/// Base URL for the Taipei eBus site
pub const BASE_URL: &str = "https://ebus.gov.taipei";

/// Tab switching a stop page to the inbound direction
pub const COME_TAB_SELECTOR: &str = "a.stationlist-come-go-gray.stationlist-come";

/// Build route list URL
pub fn route_list_url(base_url: &str) -> String {
    format!("{}/ebus?ct=all", base_url.trim_end_matches('/'))
}

/// Build route stop page URL
pub fn stops_url(base_url: &str, route_id: &str) -> String {
    format!(
        "{}/Route/StopsOfRoute?routeid={}",
        base_url.trim_end_matches('/'),
        route_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_list_url() {
        assert_eq!(route_list_url(BASE_URL), "https://ebus.gov.taipei/ebus?ct=all");
    }

    #[test]
    fn test_stops_url() {
        assert_eq!(
            stops_url("https://ebus.gov.taipei/", "0161000900"),
            "https://ebus.gov.taipei/Route/StopsOfRoute?routeid=0161000900"
        );
    }
}
