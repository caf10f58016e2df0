//! The analysis session: holds the current coverage table and region layer
//! and drives retrieval, aggregation, and rendering.

use std::path::Path;
use tracing::info;

use crate::data;
use crate::error::{Error, Result};
use crate::filter::{self, Filter, SignalMetric};
use crate::join;
use crate::processing::{self, MetricValues, Operation};
use crate::query::QueryService;
use crate::render::{legend_for, ColorMapping, ColorScale, PointLayer, RenderOptions, Renderer};
use crate::types::{CoverageTable, Crs, RegionLayer};

/// One analyst session against a coverage table.
///
/// The session owns the only two long-lived pieces of state in the pipeline:
/// the current table (replaced by each retrieval) and the region layer
/// (loaded once, reused across renders). Everything else is recomputed per
/// render call. The session is an explicit value, not process-global state;
/// it is single-threaded and every call runs to completion before the next.
pub struct CoverageSession {
    service: Option<Box<dyn QueryService>>,
    table_name: String,
    table: Option<CoverageTable>,
    map: Option<RegionLayer>,
}

impl CoverageSession {
    /// A session backed by a remote query service.
    pub fn connect(service: Box<dyn QueryService>, table_name: impl Into<String>) -> Self {
        CoverageSession {
            service: Some(service),
            table_name: table_name.into(),
            table: None,
            map: None,
        }
    }

    /// A session with no remote service; tables arrive via [`set_table`]
    /// (e.g. from a CSV export).
    ///
    /// [`set_table`]: CoverageSession::set_table
    pub fn offline(table_name: impl Into<String>) -> Self {
        CoverageSession {
            service: None,
            table_name: table_name.into(),
            table: None,
            map: None,
        }
    }

    /// The identity executing remote queries, when a service is attached.
    pub fn identity(&self) -> Option<&str> {
        self.service.as_deref().map(|s| s.identity())
    }

    fn execute(&mut self, query: &str) -> Result<&CoverageTable> {
        let service = self.service.as_deref().ok_or(Error::NoQueryService)?;
        let table = service.execute(query)?;
        info!(rows = table.len(), "query returned");
        self.table = Some(table);
        Ok(self.table.as_ref().unwrap())
    }

    /// Retrieves the records matching the filter, replacing the current
    /// table. An empty filter would compile to a malformed query, so it is
    /// rejected here.
    pub fn select_records(&mut self, search: &Filter) -> Result<&CoverageTable> {
        if search.is_empty() {
            return Err(Error::QueryExecution(
                "empty filter compiles to a malformed predicate".into(),
            ));
        }
        let query = filter::select_query(&self.table_name, search);
        self.execute(&query)
    }

    /// Retrieves the per-(town, postal code) signal KPI for the given
    /// metric, replacing the current table.
    pub fn coverage_kpi(&mut self, metric: SignalMetric) -> Result<&CoverageTable> {
        let query = filter::kpi_query(&self.table_name, metric);
        self.execute(&query)
    }

    /// Retrieves town coordinate rows and collapses them to one mean
    /// coordinate per (town, postal code) group, replacing the current
    /// table.
    pub fn town_coordinates(&mut self) -> Result<&CoverageTable> {
        let query = filter::coordinates_query(&self.table_name);
        self.execute(&query)?;
        let aggregated = processing::aggregate_coordinates(self.table.as_ref().unwrap())?;
        self.table = Some(aggregated);
        Ok(self.table.as_ref().unwrap())
    }

    /// Replaces the current table directly.
    pub fn set_table(&mut self, table: CoverageTable) -> &CoverageTable {
        self.table = Some(table);
        self.table.as_ref().unwrap()
    }

    pub fn table(&self) -> Option<&CoverageTable> {
        self.table.as_ref()
    }

    /// Loads the region-polygon layer used by every subsequent render.
    pub fn load_map(&mut self, path: &Path) -> Result<&RegionLayer> {
        let layer = data::load_region_layer(path)?;
        self.map = Some(layer);
        Ok(self.map.as_ref().unwrap())
    }

    pub fn map(&self) -> Option<&RegionLayer> {
        self.map.as_ref()
    }

    /// Renders the current table over the region layer.
    ///
    /// With no operation the regions are drawn in a base color with the
    /// joined points on top. With an operation the joined points are reduced
    /// per [`Operation`] and colored through a min-max [`ColorMapping`]; a
    /// legend is attached only when `legend_label` is non-empty.
    pub fn render_map(
        &self,
        operation: Option<&Operation>,
        scale: ColorScale,
        legend_label: &str,
        options: &RenderOptions,
        renderer: &dyn Renderer,
    ) -> Result<()> {
        let table = self.table.as_ref().ok_or(Error::NoActiveTable)?;
        let map = self.map.as_ref().ok_or(Error::NoRegionLayer)?;

        // Point coordinates are assumed to already be in the layer's
        // coordinate system; join_points relabels and warns on mismatch.
        let joined = join::join_points(table, &Crs::default(), map)?;

        let (region_values, point_layer, mapping) = match operation {
            None => {
                let points = PointLayer {
                    points: joined.iter().map(|p| (p.long, p.lat)).collect(),
                    values: None,
                };
                (None, Some(points), ColorMapping::fit(&[], scale))
            }
            Some(op) => match processing::aggregate_metric(table, &joined, map.len(), op)? {
                MetricValues::PerRegion(layer) => {
                    let mapping = ColorMapping::fit(layer.values(), scale);
                    (Some(layer), None, mapping)
                }
                MetricValues::PerPoint(values) => {
                    let mapping = ColorMapping::fit(&values, scale);
                    let points = PointLayer {
                        points: joined.iter().map(|p| (p.long, p.lat)).collect(),
                        values: Some(values),
                    };
                    (None, Some(points), mapping)
                }
            },
        };

        let legend = legend_for(legend_label, &mapping);
        renderer.render(
            map,
            region_values.as_ref(),
            point_layer.as_ref(),
            &mapping,
            legend.as_ref(),
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Legend;
    use crate::types::{AggregatedLayer, CoverageRecord, RegionPolygon, Value};
    use geo::{LineString, MultiPolygon, Polygon};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FakeService {
        executed: Rc<RefCell<Vec<String>>>,
        result: Vec<CoverageRecord>,
    }

    impl FakeService {
        fn with_records(result: Vec<CoverageRecord>) -> Self {
            FakeService {
                executed: Rc::new(RefCell::new(Vec::new())),
                result,
            }
        }

        fn log(&self) -> Rc<RefCell<Vec<String>>> {
            Rc::clone(&self.executed)
        }
    }

    impl QueryService for FakeService {
        fn execute(&self, query: &str) -> Result<CoverageTable> {
            self.executed.borrow_mut().push(query.to_string());
            Ok(CoverageTable::from_records(self.result.clone()))
        }

        fn identity(&self) -> &str {
            "svc@test.iam"
        }
    }

    struct FailingService;

    impl QueryService for FailingService {
        fn execute(&self, _query: &str) -> Result<CoverageTable> {
            Err(Error::QueryExecution("quota exceeded".into()))
        }

        fn identity(&self) -> &str {
            "svc@test.iam"
        }
    }

    fn record(town: &str, postal: &str, signal: f64, long: f64, lat: f64) -> CoverageRecord {
        CoverageRecord {
            town_name: Some(town.to_string()),
            postal_code: postal.to_string(),
            signal,
            long,
            lat,
        }
    }

    #[test]
    fn select_records_compiles_and_stores_the_result() {
        let service = FakeService::with_records(vec![record("A", "1", 5.0, 0.5, 0.5)]);
        let queries = service.log();
        let mut session = CoverageSession::connect(Box::new(service), "proj.cov.records");

        let filter = Filter::new().equals("operator", "acme").equals("status", 4);
        let table = session.select_records(&filter).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(session.identity(), Some("svc@test.iam"));
        assert_eq!(
            queries.borrow().as_slice(),
            &["SELECT * FROM `proj.cov.records` WHERE operator = 'acme' AND status = '4'"]
        );
    }

    #[test]
    fn empty_filter_is_rejected_before_execution() {
        let service = FakeService::with_records(vec![]);
        let mut session = CoverageSession::connect(Box::new(service), "proj.cov.records");
        let err = session.select_records(&Filter::new()).unwrap_err();
        assert!(matches!(err, Error::QueryExecution(_)));
    }

    #[test]
    fn offline_session_refuses_remote_queries() {
        let mut session = CoverageSession::offline("proj.cov.records");
        let err = session
            .select_records(&Filter::new().equals("a", "b"))
            .unwrap_err();
        assert!(matches!(err, Error::NoQueryService));
        assert!(session.identity().is_none());
    }

    #[test]
    fn service_failures_propagate_and_leave_no_partial_table() {
        let mut session = CoverageSession::connect(Box::new(FailingService), "t");
        let err = session
            .select_records(&Filter::new().equals("a", "b"))
            .unwrap_err();
        assert!(matches!(err, Error::QueryExecution(_)));
        assert!(session.table().is_none());
    }

    #[test]
    fn town_coordinates_runs_the_coordinate_aggregator() {
        let service = FakeService::with_records(vec![
            record("A", "1", 5.0, 2.0, 41.0),
            record("A", "1", 15.0, 2.2, 41.2),
        ]);
        let mut session = CoverageSession::connect(Box::new(service), "t");
        let table = session.town_coordinates().unwrap();
        assert_eq!(table.len(), 1);
        let long_col = table.column_index("long").unwrap();
        assert!((table.value(0, long_col).as_f64().unwrap() - 2.1).abs() < 1e-12);
    }

    struct CapturingRenderer {
        calls: RefCell<Vec<(Option<Vec<f64>>, Option<usize>, Option<Legend>)>>,
    }

    impl CapturingRenderer {
        fn new() -> Self {
            CapturingRenderer {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Renderer for CapturingRenderer {
        fn render(
            &self,
            _layer: &RegionLayer,
            region_values: Option<&AggregatedLayer>,
            points: Option<&PointLayer>,
            _mapping: &ColorMapping,
            legend: Option<&Legend>,
            _options: &RenderOptions,
        ) -> Result<()> {
            self.calls.borrow_mut().push((
                region_values.map(|l| l.values().to_vec()),
                points.map(|p| p.points.len()),
                legend.cloned(),
            ));
            Ok(())
        }
    }

    fn session_with_layer(points: Vec<CoverageRecord>) -> CoverageSession {
        let square = |x0: f64, x1: f64| {
            MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![(x0, 0.0), (x1, 0.0), (x1, 1.0), (x0, 1.0), (x0, 0.0)]),
                vec![],
            )])
        };
        let mut session = CoverageSession::offline("t");
        session.map = Some(RegionLayer {
            regions: vec![
                RegionPolygon {
                    index: 0,
                    geometry: square(0.0, 1.0),
                    attributes: Default::default(),
                },
                RegionPolygon {
                    index: 1,
                    geometry: square(2.0, 3.0),
                    attributes: Default::default(),
                },
            ],
            crs: Crs::default(),
        });
        session.set_table(CoverageTable::from_records(points));
        session
    }

    #[test]
    fn count_render_zero_fills_and_suppresses_empty_legend() {
        let session = session_with_layer(vec![
            record("A", "1", 1.0, 0.2, 0.2),
            record("A", "1", 1.0, 0.4, 0.4),
            record("A", "1", 1.0, 0.6, 0.6),
        ]);
        let renderer = CapturingRenderer::new();
        session
            .render_map(
                Some(&Operation::Count),
                ColorScale::Viridis,
                "",
                &RenderOptions::default(),
                &renderer,
            )
            .unwrap();

        let calls = renderer.calls.borrow();
        let (region_values, points, legend) = &calls[0];
        assert_eq!(region_values.as_deref(), Some(&[3.0, 0.0][..]));
        assert!(points.is_none());
        assert!(legend.is_none());
    }

    #[test]
    fn plain_render_draws_joined_points_only() {
        let session = session_with_layer(vec![
            record("A", "1", 1.0, 0.5, 0.5),
            record("B", "2", 1.0, 9.0, 9.0), // outside every region
        ]);
        let renderer = CapturingRenderer::new();
        session
            .render_map(
                None,
                ColorScale::Viridis,
                "",
                &RenderOptions::default(),
                &renderer,
            )
            .unwrap();
        let calls = renderer.calls.borrow();
        assert_eq!(calls[0].1, Some(1));
        assert!(calls[0].0.is_none());
    }

    #[test]
    fn legend_carries_label_and_bounds() {
        let session = session_with_layer(vec![
            record("A", "1", 1.0, 0.5, 0.5),
            record("A", "1", 1.0, 2.5, 0.5),
        ]);
        let renderer = CapturingRenderer::new();
        session
            .render_map(
                Some(&Operation::Count),
                ColorScale::Viridis,
                "points per region",
                &RenderOptions::default(),
                &renderer,
            )
            .unwrap();
        let calls = renderer.calls.borrow();
        let legend = calls[0].2.as_ref().unwrap();
        assert_eq!(legend.label, "points per region");
        assert_eq!((legend.min, legend.max), (1.0, 1.0));
    }

    #[test]
    fn render_without_state_reports_which_piece_is_missing() {
        let empty = CoverageSession::offline("t");
        let renderer = CapturingRenderer::new();
        let err = empty
            .render_map(
                None,
                ColorScale::Viridis,
                "",
                &RenderOptions::default(),
                &renderer,
            )
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveTable));

        let mut with_table = CoverageSession::offline("t");
        with_table.set_table(CoverageTable::from_records(vec![]));
        let err = with_table
            .render_map(
                None,
                ColorScale::Viridis,
                "",
                &RenderOptions::default(),
                &renderer,
            )
            .unwrap_err();
        assert!(matches!(err, Error::NoRegionLayer));
    }

    #[test]
    fn aggregate_render_on_missing_column_fails_with_column_name() {
        let session = session_with_layer(vec![record("A", "1", 1.0, 0.5, 0.5)]);
        let renderer = CapturingRenderer::new();
        let err = session
            .render_map(
                Some(&Operation::Aggregate {
                    column: "population".into(),
                }),
                ColorScale::Viridis,
                "",
                &RenderOptions::default(),
                &renderer,
            )
            .unwrap_err();
        match err {
            Error::MissingColumns { column, .. } => assert_eq!(column, "population"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
