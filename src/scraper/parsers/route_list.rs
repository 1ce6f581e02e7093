//! Route list parser for ebus.gov.taipei
//!
//! Parses the all-routes page to extract route tokens and display names.
//! URL: https://ebus.gov.taipei/ebus?ct=all

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::{ExtractError, RecordShape};
use crate::types::RouteEntry;

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("li > a[href]").unwrap());

// Anchors look like <a href="javascript:go('0161000900')">
static GO_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*javascript:go\('([^']+)'\)\s*$").unwrap());

/// Parser for the route list page
pub struct RouteListParser;

impl RouteListParser {
    /// Parse route list HTML into (route id, name) pairs in document order
    pub fn parse(html: &str) -> Result<Vec<RouteEntry>, ExtractError> {
        let document = Html::parse_document(html);
        let mut routes = Vec::new();

        for elem in document.select(&LINK_SELECTOR) {
            let Some(href) = elem.value().attr("href") else {
                continue;
            };
            if let Some(caps) = GO_HREF.captures(href) {
                routes.push(RouteEntry {
                    route_id: caps[1].to_string(),
                    route_name: elem.text().collect::<String>().trim().to_string(),
                });
            }
        }

        if routes.is_empty() {
            return Err(ExtractError::NoRecords(RecordShape::RouteList));
        }

        Ok(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="auto-list-pool">
    <ul>
        <li><a href="javascript:go('0100000A00')">0東</a></li>
        <li><a href="javascript:go('0161000900')">  承德幹線
        </a></li>
        <li><a href="javascript:go('0400020700')">207</a></li>
    </ul>
    <ul>
        <li><a href="/ebus/about">About</a></li>
        <li><a href="javascript:go('15611')">藍1</a></li>
    </ul>
</div>
</body>
</html>"#;

    #[test]
    fn test_parse_route_list() {
        let routes = RouteListParser::parse(SAMPLE_HTML).unwrap();

        let pairs: Vec<_> = routes
            .iter()
            .map(|r| (r.route_id.as_str(), r.route_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("0100000A00", "0東"),
                ("0161000900", "承德幹線"),
                ("0400020700", "207"),
                ("15611", "藍1"),
            ]
        );
    }

    #[test]
    fn test_names_are_trimmed() {
        let routes = RouteListParser::parse(SAMPLE_HTML).unwrap();
        for route in &routes {
            assert_eq!(route.route_name, route.route_name.trim());
        }
    }

    #[test]
    fn test_no_matching_anchors() {
        let html = r#"<ul><li><a href="/route/1">1</a></li></ul>"#;
        let err = RouteListParser::parse(html).unwrap_err();
        assert_eq!(err, ExtractError::NoRecords(RecordShape::RouteList));
    }

    #[test]
    fn test_empty_html() {
        assert!(RouteListParser::parse("<html></html>").is_err());
    }

    #[test]
    fn test_anchor_outside_list_ignored() {
        let html = r#"
        <a href="javascript:go('AAA')">outside</a>
        <ul><li><a href="javascript:go('BBB')">inside</a></li></ul>
        "#;
        let routes = RouteListParser::parse(html).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_id, "BBB");
    }
}
