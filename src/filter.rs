//! Compiles search parameters into query predicates for the remote service.
//!
//! Only string-quoted equality is supported, combined with `AND`. Values are
//! interpolated verbatim: a value containing a single quote corrupts the
//! generated predicate. Known open issue; a parameterized query API on the
//! service side would remove it.

use std::fmt;

/// An ordered field -> value equality filter. Clauses render in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    /// Adds a `field = 'value'` clause.
    pub fn equals(mut self, field: impl Into<String>, value: impl fmt::Display) -> Self {
        self.clauses.push((field.into(), value.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Renders the predicate. An empty filter yields an empty string, which
    /// makes `select_query` emit a dangling `WHERE`; callers must guard
    /// against issuing that query.
    pub fn to_predicate(&self) -> String {
        self.clauses
            .iter()
            .map(|(field, value)| format!("{} = '{}'", field, value))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Closed set of SQL reducers accepted by the KPI query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMetric {
    Avg,
    Min,
    Max,
    Sum,
    Count,
}

impl SignalMetric {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SignalMetric::Avg => "AVG",
            SignalMetric::Min => "MIN",
            SignalMetric::Max => "MAX",
            SignalMetric::Sum => "SUM",
            SignalMetric::Count => "COUNT",
        }
    }
}

/// `SELECT *` over the coverage table, restricted by the filter.
pub fn select_query(table: &str, filter: &Filter) -> String {
    format!("SELECT * FROM `{}` WHERE {}", table, filter.to_predicate())
}

/// Per-(town, postal code) signal KPI, reduced with the given metric.
pub fn kpi_query(table: &str, metric: SignalMetric) -> String {
    format!(
        "SELECT town_name, postal_code, {metric}(signal) as signal \
         FROM `{table}` \
         GROUP BY town_name, postal_code",
        metric = metric.as_sql(),
        table = table,
    )
}

/// Distinct named-town coordinate rows, input to the coordinate aggregator.
pub fn coordinates_query(table: &str) -> String {
    format!(
        "SELECT town_name, postal_code, long, lat \
         FROM `{table}` \
         WHERE town_name IS NOT NULL \
         GROUP BY town_name, postal_code, long, lat",
        table = table,
    )
}
