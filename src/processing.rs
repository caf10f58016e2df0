//! Coordinate and metric aggregation over coverage observations.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{AggregatedLayer, CoverageTable, JoinedPoint, Value};

/// Collapses per-town observations into one representative coordinate per
/// (`town_name`, `postal_code`) group: the arithmetic mean of `long` and
/// `lat`. Rows with a null town name are excluded. Grouping is
/// order-independent, so permuting the input rows does not change the
/// result.
pub fn aggregate_coordinates(table: &CoverageTable) -> Result<CoverageTable> {
    let indices = table.require_columns(&["town_name", "postal_code", "long", "lat"])?;
    let (town_col, postal_col, long_col, lat_col) =
        (indices[0], indices[1], indices[2], indices[3]);

    // BTreeMap keeps the output deterministic regardless of input order.
    let mut groups: BTreeMap<(String, String), (f64, f64, usize)> = BTreeMap::new();
    for cells in table.rows() {
        let town = match cells[town_col].as_str() {
            Some(town) => town.to_string(),
            None => continue,
        };
        let postal = cells[postal_col].to_string();
        let (long, lat) = match (cells[long_col].as_f64(), cells[lat_col].as_f64()) {
            (Some(long), Some(lat)) => (long, lat),
            _ => continue,
        };
        let entry = groups.entry((town, postal)).or_insert((0.0, 0.0, 0));
        entry.0 += long;
        entry.1 += lat;
        entry.2 += 1;
    }

    let mut out = CoverageTable::new(
        ["town_name", "postal_code", "long", "lat"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    for ((town, postal), (long_sum, lat_sum, n)) in groups {
        let n = n as f64;
        out.push_row(vec![
            Value::Text(town),
            Value::Text(postal),
            Value::Number(long_sum / n),
            Value::Number(lat_sum / n),
        ]);
    }
    Ok(out)
}

/// Reduction mode over a joined-point set. A closed set: unknown mode names
/// are rejected once, at [`Operation::parse`], instead of falling through at
/// aggregation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// No per-region reduction; each point is colored by its own value in
    /// the named column.
    PointCount { column: String },
    /// Per-region count of joined points.
    Count,
    /// Per-region sum of the named numeric column.
    Aggregate { column: String },
}

impl Operation {
    /// Parses an operation name as accepted at the tool boundary.
    pub fn parse(name: &str, column: Option<String>) -> Result<Self> {
        match name {
            "count" => Ok(Operation::Count),
            "point_count" => column
                .map(|column| Operation::PointCount { column })
                .ok_or_else(|| Error::InvalidOperation("point_count (no column given)".into())),
            "aggregate" => column
                .map(|column| Operation::Aggregate { column })
                .ok_or_else(|| Error::InvalidOperation("aggregate (no column given)".into())),
            other => Err(Error::InvalidOperation(other.to_string())),
        }
    }
}

/// Result of a metric aggregation: one value per region, or one per point.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValues {
    PerRegion(AggregatedLayer),
    PerPoint(Vec<f64>),
}

/// Reduces the joined points according to the requested operation.
///
/// For `Count` and `Aggregate` every region index below `region_count`
/// receives an entry, zero when no point joined to it. For `PointCount` and
/// `Aggregate` the named column must exist in the source table.
pub fn aggregate_metric(
    table: &CoverageTable,
    joined: &[JoinedPoint],
    region_count: usize,
    operation: &Operation,
) -> Result<MetricValues> {
    match operation {
        Operation::Count => {
            let mut layer = AggregatedLayer::zeroed(region_count);
            for point in joined {
                layer.add(point.region, 1.0);
            }
            Ok(MetricValues::PerRegion(layer))
        }
        Operation::Aggregate { column } => {
            let col = table.require_columns(&[column])?[0];
            let mut layer = AggregatedLayer::zeroed(region_count);
            for point in joined {
                // nulls and non-numeric cells contribute nothing to the sum
                if let Some(v) = table.value(point.row, col).as_f64() {
                    layer.add(point.region, v);
                }
            }
            Ok(MetricValues::PerRegion(layer))
        }
        Operation::PointCount { column } => {
            let col = table.require_columns(&[column])?[0];
            let values = joined
                .iter()
                .map(|point| {
                    table
                        .value(point.row, col)
                        .as_f64()
                        .unwrap_or(f64::NAN)
                })
                .collect();
            Ok(MetricValues::PerPoint(values))
        }
    }
}
