use geo::MultiPolygon;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::error::{Error, Result};

/// One cell of a coverage table. Tables are dynamically typed because the
/// remote query service decides the result schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Null,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Null => write!(f, ""),
        }
    }
}

/// One measured signal observation. Immutable once retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRecord {
    pub town_name: Option<String>,
    pub postal_code: String,
    pub signal: f64,
    pub long: f64,
    pub lat: f64,
}

/// Row-oriented table with named columns. Row order is retrieval order and
/// carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct CoverageTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl CoverageTable {
    pub fn new(columns: Vec<String>) -> Self {
        CoverageTable {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table with the canonical coverage schema.
    pub fn from_records(records: Vec<CoverageRecord>) -> Self {
        let mut table = CoverageTable::new(
            ["town_name", "postal_code", "signal", "long", "lat"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for r in records {
            table.push_row(vec![
                r.town_name.map(Value::Text).unwrap_or(Value::Null),
                Value::Text(r.postal_code),
                Value::Number(r.signal),
                Value::Number(r.long),
                Value::Number(r.lat),
            ]);
        }
        table
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Resolves the given column names to indices, or reports the first
    /// missing one along with the columns that are available.
    pub fn require_columns(&self, names: &[&str]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| Error::MissingColumns {
                    column: name.to_string(),
                    available: self.columns.clone(),
                })
            })
            .collect()
    }

    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }
}

/// Coordinate reference system tag. Metadata only; this crate never
/// reprojects coordinate values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs(pub String);

impl Default for Crs {
    fn default() -> Self {
        Crs("EPSG:4326".to_string())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One administrative area used as an aggregation unit.
#[derive(Debug, Clone)]
pub struct RegionPolygon {
    pub index: usize,
    pub geometry: MultiPolygon<f64>,
    pub attributes: Map<String, JsonValue>,
}

/// The polygon layer, loaded once per session and reused across renders.
#[derive(Debug, Clone)]
pub struct RegionLayer {
    pub regions: Vec<RegionPolygon>,
    pub crs: Crs,
}

impl RegionLayer {
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// A coverage observation resolved to the region containing it. Points that
/// fall outside every region never become a `JoinedPoint`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinedPoint {
    /// Row index into the source table.
    pub row: usize,
    /// Index of the containing region in the layer.
    pub region: usize,
    pub long: f64,
    pub lat: f64,
}

/// Per-region metric values. Every region index in the layer has exactly one
/// entry; regions with no joined points hold the 0.0 default.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedLayer {
    values: Vec<f64>,
}

impl AggregatedLayer {
    pub fn zeroed(region_count: usize) -> Self {
        AggregatedLayer {
            values: vec![0.0; region_count],
        }
    }

    pub fn add(&mut self, region: usize, amount: f64) {
        self.values[region] += amount;
    }

    pub fn get(&self, region: usize) -> f64 {
        self.values[region]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_columns_reports_missing_and_available() {
        let table = CoverageTable::new(vec!["long".into(), "lat".into()]);
        let err = table.require_columns(&["long", "population"]).unwrap_err();
        match err {
            Error::MissingColumns { column, available } => {
                assert_eq!(column, "population");
                assert_eq!(available, vec!["long".to_string(), "lat".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_records_preserves_nullable_town() {
        let table = CoverageTable::from_records(vec![CoverageRecord {
            town_name: None,
            postal_code: "08001".into(),
            signal: 12.0,
            long: 2.1,
            lat: 41.4,
        }]);
        assert_eq!(table.len(), 1);
        assert!(table.value(0, 0).is_null());
        assert_eq!(table.value(0, 2).as_f64(), Some(12.0));
    }

    #[test]
    fn aggregated_layer_defaults_to_zero_for_every_region() {
        let mut layer = AggregatedLayer::zeroed(3);
        layer.add(1, 2.5);
        assert_eq!(layer.values(), &[0.0, 2.5, 0.0]);
        assert_eq!(layer.get(0), 0.0);
    }
}
