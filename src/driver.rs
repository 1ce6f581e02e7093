//! Route refresh loop.
//!
//! Fetches the route list, then sweeps routes one at a time:
//! render → parse → persist → mark status. A failing route is marked
//! `failed` and the sweep moves on.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::scraper::parsers::{ExtractError, RouteListParser, StopListParser};
use crate::scraper::{
    route_list_url, stops_url, DumpKind, HtmlDump, Interaction, PageRenderer, RenderError,
    COME_TAB_SELECTOR,
};
use crate::storage::{BusRepository, StoreError};
use crate::types::{Direction, RouteStatus, Stop};

/// Failure of one route (or of the route list)
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RouteError {
    /// Pipeline stage that failed
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::Render(_) => "render",
            RouteError::Extract(_) => "extract",
            RouteError::Store(_) => "store",
        }
    }
}

/// Outcome of a sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub updated: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Drives a renderer and a repository over the route list
pub struct Sweeper<R> {
    renderer: R,
    repo: BusRepository,
    base_url: String,
    click_timeout: Duration,
    scroll_passes: u32,
    scroll_pause: Duration,
    dump: Option<HtmlDump>,
    record_snapshots: bool,
}

impl<R: PageRenderer> Sweeper<R> {
    pub fn new(renderer: R, repo: BusRepository, config: &AppConfig) -> Self {
        let dump = config
            .diagnostics
            .dump_html
            .then(|| HtmlDump::new(PathBuf::from(&config.diagnostics.html_dir)));

        Self {
            renderer,
            repo,
            base_url: config.source.base_url.clone(),
            click_timeout: config.renderer.click_timeout(),
            scroll_passes: config.renderer.scroll_passes,
            scroll_pause: config.renderer.scroll_pause(),
            dump,
            record_snapshots: config.sweep.record_snapshots,
        }
    }

    pub fn repository(&self) -> &BusRepository {
        &self.repo
    }

    /// Release the renderer (e.g. to close the browser)
    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Scrape the route list and upsert it. Returns the number of routes.
    pub async fn refresh_route_list(&self) -> Result<usize, RouteError> {
        let url = route_list_url(&self.base_url);
        let script = [Interaction::ScrollToBottom {
            passes: self.scroll_passes,
            pause: self.scroll_pause,
        }];

        info!("Fetching route list from {}", url);
        let html = self.renderer.render(&url, &script).await?;
        self.dump_page(DumpKind::RouteList, &html);

        let routes = RouteListParser::parse(&html)?;
        info!("Matched {} routes", routes.len());

        Ok(self.repo.upsert_routes(&routes)?)
    }

    /// Ids of routes not yet refreshed
    pub fn pending_routes(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .repo
            .routes_with_status(RouteStatus::Pending)?
            .into_iter()
            .map(|r| r.route_id)
            .collect())
    }

    /// Render and parse one direction of a route without persisting it
    pub async fn fetch_stops(
        &self,
        route_id: &str,
        direction: Direction,
    ) -> Result<Vec<Stop>, RouteError> {
        let url = stops_url(&self.base_url, route_id);
        let script = match direction {
            Direction::Go => Vec::new(),
            Direction::Come => vec![Interaction::Click {
                selector: COME_TAB_SELECTOR.to_string(),
                timeout: self.click_timeout,
            }],
        };

        debug!("Fetching {} ({})", url, direction.label());
        let html = self.renderer.render(&url, &script).await?;
        self.dump_page(
            DumpKind::Stops {
                route_id,
                direction,
            },
            &html,
        );

        let entries = StopListParser::parse(&html)?;
        Ok(entries
            .into_iter()
            .map(|e| e.into_stop(route_id, direction))
            .collect())
    }

    /// Sweep routes in order. Per-route failures are recorded, not returned.
    pub async fn sweep(
        &self,
        route_ids: &[String],
        directions: &[Direction],
    ) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for (i, route_id) in route_ids.iter().enumerate() {
            info!("[{}/{}] Route {}", i + 1, route_ids.len(), route_id);

            match self.sweep_route(route_id, directions).await {
                Ok(written) => {
                    info!("Route {}: stored {} stops", route_id, written);
                    self.mark(route_id, RouteStatus::Updated)?;
                    report.updated.push(route_id.clone());
                }
                Err(e) => {
                    match &e {
                        RouteError::Store(_) => {
                            error!("Route {} failed ({}): {}", route_id, e.kind(), e)
                        }
                        _ => warn!("Route {} failed ({}): {}", route_id, e.kind(), e),
                    }
                    self.mark(route_id, RouteStatus::Failed)?;
                    report.failed.push((route_id.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Fetch every direction first so a route persists all or nothing
    async fn sweep_route(
        &self,
        route_id: &str,
        directions: &[Direction],
    ) -> Result<usize, RouteError> {
        let mut stops = Vec::new();
        for &direction in directions {
            let fetched = self.fetch_stops(route_id, direction).await?;
            debug!(
                "Route {} {}: parsed {} stops",
                route_id,
                direction,
                fetched.len()
            );
            stops.extend(fetched);
        }

        let written = if self.record_snapshots {
            self.repo.upsert_stops_with_snapshots(&stops)?
        } else {
            self.repo.upsert_stops(&stops)?
        };
        Ok(written)
    }

    fn mark(&self, route_id: &str, status: RouteStatus) -> Result<(), StoreError> {
        match self.repo.set_route_status(route_id, status) {
            Err(StoreError::UnknownRoute(_)) => {
                warn!("Route {} is not in the route list, status not recorded", route_id);
                Ok(())
            }
            other => other,
        }
    }

    fn dump_page(&self, kind: DumpKind<'_>, html: &str) {
        if let Some(dump) = &self.dump {
            match dump.write(kind, html) {
                Ok(path) => debug!("Saved HTML to {}", path.display()),
                Err(e) => warn!("Failed to save {}: {}", kind.file_name(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::parsers::stop_list::tests::{stop_block, stop_page};
    use crate::storage::Schema;
    use crate::types::RouteEntry;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned HTML keyed by (url, whether a click was scripted)
    #[derive(Default)]
    struct FixtureRenderer {
        pages: HashMap<(String, bool), String>,
        calls: RefCell<Vec<String>>,
    }

    impl FixtureRenderer {
        fn with_page(mut self, url: String, clicked: bool, html: String) -> Self {
            self.pages.insert((url, clicked), html);
            self
        }
    }

    impl PageRenderer for FixtureRenderer {
        async fn render(
            &self,
            url: &str,
            interactions: &[Interaction],
        ) -> Result<String, RenderError> {
            self.calls.borrow_mut().push(url.to_string());
            let clicked = interactions
                .iter()
                .any(|i| matches!(i, Interaction::Click { .. }));
            self.pages
                .get(&(url.to_string(), clicked))
                .cloned()
                .ok_or_else(|| RenderError::Navigation {
                    url: url.to_string(),
                    message: "no fixture".to_string(),
                })
        }
    }

    fn three_stops() -> String {
        stop_page(&[
            stop_block("進站中", 1, "捷運劍潭站", 1010318, "25.08485", "121.52478"),
            stop_block("3分", 2, "士林官邸", 1010319, "25.09011", "121.52361"),
            stop_block("8分", 3, "福林橋", 1010320, "25.09512", "121.52593"),
        ])
    }

    fn sweeper(renderer: FixtureRenderer, route_ids: &[&str]) -> Sweeper<FixtureRenderer> {
        let repo = BusRepository::in_memory(&Schema::ebus()).unwrap();
        let routes: Vec<_> = route_ids
            .iter()
            .map(|id| RouteEntry {
                route_id: id.to_string(),
                route_name: format!("Route {}", id),
            })
            .collect();
        repo.upsert_routes(&routes).unwrap();
        Sweeper::new(renderer, repo, &AppConfig::default())
    }

    #[tokio::test]
    async fn test_sweep_stores_stops_and_marks_updated() {
        let renderer = FixtureRenderer::default().with_page(
            stops_url(crate::scraper::BASE_URL, "0161000900"),
            false,
            three_stops(),
        );
        let sweeper = sweeper(renderer, &["0161000900"]);

        let report = sweeper
            .sweep(&["0161000900".to_string()], &[Direction::Go])
            .await
            .unwrap();

        assert_eq!(report.updated, vec!["0161000900".to_string()]);
        assert!(report.failed.is_empty());

        let repo = sweeper.repository();
        let stops = repo.stops("0161000900", Direction::Go).unwrap();
        let numbers: Vec<_> = stops.iter().map(|s| s.stop_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(repo.stop_count().unwrap(), 3);
        assert_eq!(
            repo.route_status("0161000900").unwrap(),
            Some(RouteStatus::Updated)
        );
    }

    #[tokio::test]
    async fn test_malformed_route_fails_in_isolation() {
        let bad = stop_page(&[
            stop_block("3分", 1, "A", 1, "25.1", "121.5"),
            stop_block("5分", 2, "B", 2, "not-a-number", "121.5"),
        ]);
        let renderer = FixtureRenderer::default()
            .with_page(stops_url(crate::scraper::BASE_URL, "BAD"), false, bad)
            .with_page(stops_url(crate::scraper::BASE_URL, "GOOD"), false, three_stops());
        let sweeper = sweeper(renderer, &["BAD", "GOOD"]);

        let report = sweeper
            .sweep(&["BAD".to_string(), "GOOD".to_string()], &[Direction::Go])
            .await
            .unwrap();

        assert_eq!(report.updated, vec!["GOOD".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "BAD");

        let repo = sweeper.repository();
        assert!(repo.stops("BAD", Direction::Go).unwrap().is_empty());
        assert_eq!(repo.stops("GOOD", Direction::Go).unwrap().len(), 3);
        assert_eq!(repo.route_status("BAD").unwrap(), Some(RouteStatus::Failed));
        assert_eq!(repo.route_status("GOOD").unwrap(), Some(RouteStatus::Updated));
    }

    #[tokio::test]
    async fn test_failed_direction_persists_nothing() {
        // Outbound parses, inbound page is missing
        let renderer = FixtureRenderer::default().with_page(
            stops_url(crate::scraper::BASE_URL, "R1"),
            false,
            three_stops(),
        );
        let sweeper = sweeper(renderer, &["R1"]);

        let report = sweeper
            .sweep(&["R1".to_string()], &Direction::ALL)
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(sweeper.repository().stop_count().unwrap(), 0);
        assert_eq!(
            sweeper.repository().route_status("R1").unwrap(),
            Some(RouteStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_come_direction_clicks_tab() {
        let url = stops_url(crate::scraper::BASE_URL, "R1");
        let renderer = FixtureRenderer::default()
            .with_page(url.clone(), false, three_stops())
            .with_page(
                url,
                true,
                stop_page(&[stop_block("2分", 1, "回程站", 77, "25.1", "121.5")]),
            );
        let sweeper = sweeper(renderer, &["R1"]);

        sweeper
            .sweep(&["R1".to_string()], &Direction::ALL)
            .await
            .unwrap();

        let repo = sweeper.repository();
        assert_eq!(repo.stops("R1", Direction::Go).unwrap().len(), 3);
        let come = repo.stops("R1", Direction::Come).unwrap();
        assert_eq!(come.len(), 1);
        assert_eq!(come[0].stop_name, "回程站");
    }

    #[tokio::test]
    async fn test_refresh_route_list() {
        let html = r#"<ul>
            <li><a href="javascript:go('0161000900')">承德幹線</a></li>
            <li><a href="javascript:go('0400020700')">207</a></li>
        </ul>"#;
        let renderer = FixtureRenderer::default().with_page(
            route_list_url(crate::scraper::BASE_URL),
            false,
            html.to_string(),
        );
        let sweeper = sweeper(renderer, &[]);

        assert_eq!(sweeper.refresh_route_list().await.unwrap(), 2);
        assert_eq!(
            sweeper.pending_routes().unwrap(),
            vec!["0161000900".to_string(), "0400020700".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_route_list_without_anchors() {
        let renderer = FixtureRenderer::default().with_page(
            route_list_url(crate::scraper::BASE_URL),
            false,
            "<html><body></body></html>".to_string(),
        );
        let sweeper = sweeper(renderer, &[]);

        let err = sweeper.refresh_route_list().await.unwrap_err();
        assert_eq!(err.kind(), "extract");
        assert_eq!(sweeper.repository().route_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unlisted_route_still_swept() {
        let renderer = FixtureRenderer::default().with_page(
            stops_url(crate::scraper::BASE_URL, "X"),
            false,
            three_stops(),
        );
        let sweeper = sweeper(renderer, &[]);

        let report = sweeper
            .sweep(&["X".to_string()], &[Direction::Go])
            .await
            .unwrap();
        assert_eq!(report.updated, vec!["X".to_string()]);
        assert_eq!(sweeper.into_renderer().calls.into_inner().len(), 1);
    }
}
