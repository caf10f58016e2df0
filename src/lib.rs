//! Query mobile-network coverage records, aggregate them per administrative
//! region, and render choropleth/point maps.
//!
//! The pipeline runs strictly downstream: a [`filter::Filter`] compiles to a
//! predicate, the [`query::QueryService`] collaborator returns a
//! [`types::CoverageTable`], points are joined onto the region layer
//! ([`join::join_points`]), reduced per region ([`processing`]), normalized
//! onto a color scale and handed to a [`render::Renderer`]. The
//! [`client::CoverageSession`] owns the two long-lived pieces of state (the
//! current table and the region layer) and drives the whole thing.

pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod join;
pub mod processing;
pub mod query;
pub mod render;
pub mod types;

pub use client::CoverageSession;
pub use error::{Error, Result};
pub use filter::{Filter, SignalMetric};
pub use processing::Operation;
pub use render::{ColorMapping, ColorScale, Legend, PngRenderer, RenderOptions, Renderer};
pub use types::{AggregatedLayer, CoverageRecord, CoverageTable, Crs, JoinedPoint, RegionLayer};
