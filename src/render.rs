//! Color normalization and the raster rendering surface.
//!
//! The mapper side ([`ColorMapping`], [`Legend`]) is the pipeline's output
//! contract; [`PngRenderer`] is the bundled drawing collaborator that paints
//! it with the `image` crate.

use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use image::{Rgba, RgbaImage};
use std::path::PathBuf;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{AggregatedLayer, RegionLayer};

/// Identifier of a color scale recognized by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScale {
    Viridis,
    RdYlGn,
}

impl ColorScale {
    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            ColorScale::Viridis => &[
                [68, 1, 84],
                [59, 82, 139],
                [33, 145, 140],
                [94, 201, 98],
                [253, 231, 37],
            ],
            ColorScale::RdYlGn => &[
                [165, 0, 38],
                [244, 109, 67],
                [255, 255, 191],
                [102, 189, 99],
                [0, 104, 55],
            ],
        }
    }

    /// Samples the scale at `t` in [0, 1] by linear interpolation between
    /// the gradient stops.
    pub fn sample(&self, t: f64) -> Rgba<u8> {
        let stops = self.stops();
        let t = t.clamp(0.0, 1.0);
        let scaled = t * (stops.len() - 1) as f64;
        let i = (scaled.floor() as usize).min(stops.len() - 2);
        let frac = scaled - i as f64;
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        Rgba([
            lerp(stops[i][0], stops[i + 1][0]),
            lerp(stops[i][1], stops[i + 1][1]),
            lerp(stops[i][2], stops[i + 1][2]),
            255,
        ])
    }
}

impl std::str::FromStr for ColorScale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "viridis" => Ok(ColorScale::Viridis),
            "rdylgn" => Ok(ColorScale::RdYlGn),
            other => Err(Error::InvalidOperation(format!("color scale '{}'", other))),
        }
    }
}

/// Linear min-max normalization onto [0, 1], bound to a color scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMapping {
    min: f64,
    max: f64,
    pub scale: ColorScale,
}

impl ColorMapping {
    /// Fits the mapping to the observed finite values. An empty or
    /// all-non-finite input degenerates to min == max == 0.
    pub fn fit(values: &[f64], scale: ColorScale) -> Self {
        let mut finite = values.iter().copied().filter(|v| v.is_finite());
        let (min, max) = match finite.next() {
            Some(first) => finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))),
            None => (0.0, 0.0),
        };
        ColorMapping { min, max, scale }
    }

    /// `(v - min) / (max - min)`; every value maps to 0.5 when the range is
    /// degenerate, and non-finite values map to 0.5 as well.
    pub fn normalize(&self, v: f64) -> f64 {
        if self.max == self.min || !v.is_finite() {
            0.5
        } else {
            (v - self.min) / (self.max - self.min)
        }
    }

    pub fn color(&self, v: f64) -> Rgba<u8> {
        self.scale.sample(self.normalize(v))
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// Legend descriptor for the renderer. Only produced for a non-empty label;
/// an empty label suppresses the legend on purpose.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub label: String,
    pub min: f64,
    pub max: f64,
}

pub fn legend_for(label: &str, mapping: &ColorMapping) -> Option<Legend> {
    if label.is_empty() {
        return None;
    }
    let (min, max) = mapping.bounds();
    Some(Legend {
        label: label.to_string(),
        min,
        max,
    })
}

/// Point overlay handed to the renderer: coordinates plus, optionally, one
/// value per point for individual coloring.
#[derive(Debug, Clone, Default)]
pub struct PointLayer {
    pub points: Vec<(f64, f64)>,
    pub values: Option<Vec<f64>>,
}

/// Rendering configuration recognized by the drawing surface.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Hex color for uniformly colored point markers.
    pub point_color: String,
    /// Marker edge length in pixels.
    pub marker_size: u32,
    pub output: PathBuf,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            width: 1000,
            height: 1000,
            point_color: "#ffff00".to_string(),
            marker_size: 5,
            output: PathBuf::from("map.png"),
        }
    }
}

/// The drawing collaborator consumed by the pipeline.
pub trait Renderer {
    fn render(
        &self,
        layer: &RegionLayer,
        region_values: Option<&AggregatedLayer>,
        points: Option<&PointLayer>,
        mapping: &ColorMapping,
        legend: Option<&Legend>,
        options: &RenderOptions,
    ) -> Result<()>;
}

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BASE_REGION: Rgba<u8> = Rgba([31, 119, 180, 255]);
const LEGEND_BAR_WIDTH: u32 = 16;
const LEGEND_MARGIN: u32 = 12;

/// Rasterizes the map to a PNG file.
pub struct PngRenderer;

impl Renderer for PngRenderer {
    fn render(
        &self,
        layer: &RegionLayer,
        region_values: Option<&AggregatedLayer>,
        points: Option<&PointLayer>,
        mapping: &ColorMapping,
        legend: Option<&Legend>,
        options: &RenderOptions,
    ) -> Result<()> {
        let mut img = RgbaImage::from_pixel(options.width, options.height, BACKGROUND);
        let frame = Frame::fit(layer, options.width, options.height);

        for region in &layer.regions {
            let color = match region_values {
                Some(values) => mapping.color(values.get(region.index)),
                None => BASE_REGION,
            };
            frame.fill_region(&mut img, &region.geometry, color);
        }

        if let Some(point_layer) = points {
            let uniform = hex_to_rgba(&options.point_color);
            for (i, &(long, lat)) in point_layer.points.iter().enumerate() {
                let color = match &point_layer.values {
                    Some(values) => mapping.color(values[i]),
                    None => uniform,
                };
                frame.fill_marker(&mut img, long, lat, options.marker_size, color);
            }
        }

        if legend.is_some() {
            draw_color_bar(&mut img, mapping.scale);
        }

        img.save(&options.output).map_err(|e| Error::Render {
            path: options.output.clone(),
            source: Box::new(e),
        })?;
        info!("wrote map to {:?}", options.output);
        Ok(())
    }
}

// Affine mapping from layer coordinates to pixel space, with a small margin.
struct Frame {
    min_x: f64,
    min_y: f64,
    scale: f64,
    height: u32,
    width: u32,
    margin: f64,
}

impl Frame {
    fn fit(layer: &RegionLayer, width: u32, height: u32) -> Frame {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for region in &layer.regions {
            if let Some(rect) = region.geometry.bounding_rect() {
                bounds = Some(match bounds {
                    None => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
                    Some((x0, y0, x1, y1)) => (
                        x0.min(rect.min().x),
                        y0.min(rect.min().y),
                        x1.max(rect.max().x),
                        y1.max(rect.max().y),
                    ),
                });
            }
        }
        let (min_x, min_y, max_x, max_y) = bounds.unwrap_or((0.0, 0.0, 1.0, 1.0));
        let margin = 10.0;
        let span_x = (max_x - min_x).max(f64::EPSILON);
        let span_y = (max_y - min_y).max(f64::EPSILON);
        let scale = ((width as f64 - 2.0 * margin) / span_x)
            .min((height as f64 - 2.0 * margin) / span_y);
        Frame {
            min_x,
            min_y,
            scale,
            height,
            width,
            margin,
        }
    }

    fn to_pixel(&self, long: f64, lat: f64) -> (i64, i64) {
        let px = self.margin + (long - self.min_x) * self.scale;
        let py = self.height as f64 - self.margin - (lat - self.min_y) * self.scale;
        (px.round() as i64, py.round() as i64)
    }

    fn to_geo(&self, px: u32, py: u32) -> (f64, f64) {
        let long = self.min_x + (px as f64 - self.margin) / self.scale;
        let lat = self.min_y + (self.height as f64 - self.margin - py as f64) / self.scale;
        (long, lat)
    }

    fn fill_region(&self, img: &mut RgbaImage, geometry: &geo::MultiPolygon<f64>, color: Rgba<u8>) {
        let Some(rect) = geometry.bounding_rect() else {
            return;
        };
        let (x0, y1) = self.to_pixel(rect.min().x, rect.min().y);
        let (x1, y0) = self.to_pixel(rect.max().x, rect.max().y);
        let x0 = x0.clamp(0, self.width as i64 - 1) as u32;
        let x1 = x1.clamp(0, self.width as i64 - 1) as u32;
        let y0 = y0.clamp(0, self.height as i64 - 1) as u32;
        let y1 = y1.clamp(0, self.height as i64 - 1) as u32;

        for py in y0..=y1 {
            for px in x0..=x1 {
                let (long, lat) = self.to_geo(px, py);
                if geometry.contains(&Point::new(long, lat)) {
                    img.put_pixel(px, py, color);
                }
            }
        }
    }

    fn fill_marker(&self, img: &mut RgbaImage, long: f64, lat: f64, size: u32, color: Rgba<u8>) {
        let (cx, cy) = self.to_pixel(long, lat);
        let half = (size / 2) as i64;
        for dy in -half..=half {
            for dx in -half..=half {
                let (px, py) = (cx + dx, cy + dy);
                if px >= 0 && py >= 0 && (px as u32) < self.width && (py as u32) < self.height {
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

fn draw_color_bar(img: &mut RgbaImage, scale: ColorScale) {
    let (width, height) = img.dimensions();
    if width <= LEGEND_BAR_WIDTH + 2 * LEGEND_MARGIN || height <= 2 * LEGEND_MARGIN {
        return;
    }
    let x0 = width - LEGEND_BAR_WIDTH - LEGEND_MARGIN;
    let bar_height = height - 2 * LEGEND_MARGIN;
    for dy in 0..bar_height {
        // top of the bar is the maximum of the scale
        let t = 1.0 - dy as f64 / (bar_height - 1).max(1) as f64;
        let color = scale.sample(t);
        for dx in 0..LEGEND_BAR_WIDTH {
            img.put_pixel(x0 + dx, LEGEND_MARGIN + dy, color);
        }
    }
}

fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    if hex.len() < 6 {
        return Rgba([0, 0, 0, 255]);
    }
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
    Rgba([r, g, b, 255])
}
