//! SVG route map export.
//!
//! Stops are projected with Web Mercator over their bounding box
//! (padded by 0.01°) and joined by a polyline. Stops a bus is arriving at
//! get a bus marker; the rider's stop gets a person marker.

use anyhow::{bail, Result};
use std::f64::consts::FRAC_PI_4;
use std::ops::Range;
use std::path::Path;
use svg::node::element::{Circle, Image, Polyline, Rectangle, Text};
use svg::Document;

use crate::types::Stop;

/// Arrival text shown while a bus is pulling in
pub const ARRIVING: &str = "進站中";

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 800.0;
const MARGIN: f64 = 60.0;
const PADDING_DEG: f64 = 0.01;
/// Web Mercator latitude limit
const MAX_LAT: f64 = 85.05;
const ICON_SIZE: f64 = 28.0;
const FONT: &str = "Microsoft JhengHei, Noto Sans CJK TC, sans-serif";

/// Route map builder
pub struct RouteMap<'a> {
    stops: &'a [Stop],
    title: String,
    person_stop: Option<u32>,
    bus_icon: Option<String>,
    person_icon: Option<String>,
}

impl<'a> RouteMap<'a> {
    pub fn new(stops: &'a [Stop], title: impl Into<String>) -> Self {
        Self {
            stops,
            title: title.into(),
            person_stop: None,
            bus_icon: None,
            person_icon: None,
        }
    }

    /// Mark the rider at this stop number
    pub fn person_at(mut self, stop_number: Option<u32>) -> Self {
        self.person_stop = stop_number;
        self
    }

    /// Use image files for the markers instead of plain shapes
    pub fn icons(mut self, bus: Option<String>, person: Option<String>) -> Self {
        self.bus_icon = bus;
        self.person_icon = person;
        self
    }

    pub fn render(&self) -> Result<Document> {
        if self.stops.is_empty() {
            bail!("No stops to plot");
        }

        let projection = Projection::fit(self.stops);
        let points: Vec<(f64, f64)> = self
            .stops
            .iter()
            .map(|s| projection.project(s.latitude, s.longitude))
            .collect();

        let mut document = Document::new()
            .set("viewBox", (0.0, 0.0, WIDTH, HEIGHT))
            .set("width", WIDTH)
            .set("height", HEIGHT)
            .add(
                Rectangle::new()
                    .set("width", WIDTH)
                    .set("height", HEIGHT)
                    .set("fill", "lightblue"),
            )
            .add(
                Rectangle::new()
                    .set("x", MARGIN)
                    .set("y", MARGIN)
                    .set("width", WIDTH - 2.0 * MARGIN)
                    .set("height", HEIGHT - 2.0 * MARGIN)
                    .set("fill", "lightgray")
                    .set("stroke", "#888"),
            )
            .add(
                Text::new(self.title.clone())
                    .set("x", WIDTH / 2.0)
                    .set("y", MARGIN / 2.0)
                    .set("font-size", 22)
                    .set("font-family", FONT)
                    .set("text-anchor", "middle")
                    .set("dominant-baseline", "central"),
            );

        let polyline = points
            .iter()
            .map(|(x, y)| format!("{:.2},{:.2}", x, y))
            .collect::<Vec<_>>()
            .join(" ");
        document = document.add(
            Polyline::new()
                .set("points", polyline)
                .set("fill", "none")
                .set("stroke", "red")
                .set("stroke-width", 2),
        );

        for (stop, &(x, y)) in self.stops.iter().zip(&points) {
            document = document.add(
                Circle::new()
                    .set("cx", x)
                    .set("cy", y)
                    .set("r", 4)
                    .set("fill", "red"),
            );

            if stop.arrival_info.contains(ARRIVING) {
                document = document.add(self.bus_marker(x, y));
            }
            if self.person_stop == Some(stop.stop_number) {
                document = document.add(self.person_marker(x, y));
            }

            document = document
                .add(
                    Text::new(stop.stop_name.clone())
                        .set("x", x + 6.0)
                        .set("y", y - 4.0)
                        .set("font-size", 9)
                        .set("font-family", FONT),
                )
                .add(
                    Text::new(stop.arrival_info.clone())
                        .set("x", x + 6.0)
                        .set("y", y + 8.0)
                        .set("font-size", 8)
                        .set("font-family", FONT)
                        .set("fill", "#333"),
                );
        }

        Ok(document)
    }

    /// Render and write the SVG file
    pub fn save(&self, path: &Path) -> Result<()> {
        let document = self.render()?;
        svg::save(path, &document)?;
        Ok(())
    }

    fn bus_marker(&self, x: f64, y: f64) -> Box<dyn svg::Node> {
        match &self.bus_icon {
            Some(href) => Box::new(icon(href, x, y)),
            None => Box::new(
                Rectangle::new()
                    .set("x", x - 8.0)
                    .set("y", y - 6.0)
                    .set("width", 16)
                    .set("height", 12)
                    .set("rx", 2)
                    .set("fill", "orange")
                    .set("stroke", "black")
                    .set("class", "bus"),
            ),
        }
    }

    fn person_marker(&self, x: f64, y: f64) -> Box<dyn svg::Node> {
        match &self.person_icon {
            Some(href) => Box::new(icon(href, x, y)),
            None => Box::new(
                Circle::new()
                    .set("cx", x)
                    .set("cy", y)
                    .set("r", 8)
                    .set("fill", "none")
                    .set("stroke", "blue")
                    .set("stroke-width", 3)
                    .set("class", "person"),
            ),
        }
    }
}

fn icon(href: &str, x: f64, y: f64) -> Image {
    Image::new()
        .set("href", href)
        .set("x", x - ICON_SIZE / 2.0)
        .set("y", y - ICON_SIZE / 2.0)
        .set("width", ICON_SIZE)
        .set("height", ICON_SIZE)
}

/// Web Mercator projection fitted into the plot area
struct Projection {
    x_range: Range<f64>,
    y_range: Range<f64>,
    scale: f64,
}

impl Projection {
    fn fit(stops: &[Stop]) -> Self {
        let (mut min_lat, mut max_lat) = (f64::MAX, f64::MIN);
        let (mut min_lon, mut max_lon) = (f64::MAX, f64::MIN);
        for stop in stops {
            min_lat = min_lat.min(stop.latitude);
            max_lat = max_lat.max(stop.latitude);
            min_lon = min_lon.min(stop.longitude);
            max_lon = max_lon.max(stop.longitude);
        }

        let x_range = mercator_x(min_lon - PADDING_DEG)..mercator_x(max_lon + PADDING_DEG);
        let y_range = mercator_y(min_lat - PADDING_DEG)..mercator_y(max_lat + PADDING_DEG);
        let scale = ((WIDTH - 2.0 * MARGIN) / (x_range.end - x_range.start))
            .min((HEIGHT - 2.0 * MARGIN) / (y_range.end - y_range.start));

        Self {
            x_range,
            y_range,
            scale,
        }
    }

    /// Canvas coordinates, north up, centered in the plot area
    fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        let used_w = (self.x_range.end - self.x_range.start) * self.scale;
        let used_h = (self.y_range.end - self.y_range.start) * self.scale;
        let offset_x = MARGIN + (WIDTH - 2.0 * MARGIN - used_w) / 2.0;
        let offset_y = MARGIN + (HEIGHT - 2.0 * MARGIN - used_h) / 2.0;

        let x = offset_x + (mercator_x(lon) - self.x_range.start) * self.scale;
        let y = offset_y + (self.y_range.end - mercator_y(lat)) * self.scale;
        (x, y)
    }
}

fn mercator_x(lon: f64) -> f64 {
    lon.to_radians()
}

fn mercator_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LAT, MAX_LAT);
    (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln()
}
