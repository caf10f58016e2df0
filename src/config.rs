use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Region polygons: GeoJSON or Shapefile.
    pub map_file: PathBuf,
    /// Coverage observations exported to CSV, for offline sessions.
    pub coverage_csv: Option<PathBuf>,
    /// Service-account key file, for remote sessions.
    pub credentials: Option<PathBuf>,
    /// Fully qualified remote table name.
    pub table_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// One of: point_count, count, aggregate. Absent means a plain point map.
    pub operation: Option<String>,
    /// Column backing point_count/aggregate.
    pub column: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_point_color")]
    pub point_color: String,
    #[serde(default = "default_marker_size")]
    pub marker_size: u32,
    /// Empty label suppresses the legend.
    #[serde(default)]
    pub legend_label: String,
    #[serde(default = "default_color_scale")]
    pub color_scale: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_dimension() -> u32 {
    1000
}

fn default_point_color() -> String {
    "#ffff00".to_string()
}

fn default_marker_size() -> u32 {
    5
}

fn default_color_scale() -> String {
    "viridis".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("map.png")
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
