//! Spatial containment join of coverage points onto the region layer.

use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{CoverageTable, Crs, JoinedPoint, RegionLayer};

// R-tree entry: region bounding box keyed by layer index.
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Assigns every point in the table to the region containing it.
///
/// The table must carry `long` and `lat` columns; their absence fails before
/// any spatial work. The point set's declared CRS is relabeled to the
/// layer's CRS without touching coordinate values, which is only correct
/// when both datasets already share the underlying coordinate system; a
/// mismatch is logged, not rejected. Points outside every region, or with
/// null coordinates, are dropped from the result.
pub fn join_points(
    table: &CoverageTable,
    point_crs: &Crs,
    layer: &RegionLayer,
) -> Result<Vec<JoinedPoint>> {
    let indices = table.require_columns(&["long", "lat"])?;
    let (long_col, lat_col) = (indices[0], indices[1]);

    if point_crs != &layer.crs {
        warn!(
            points = %point_crs,
            layer = %layer.crs,
            "relabeling point CRS to match region layer without reprojection"
        );
    }

    let tree = RTree::bulk_load(
        layer
            .regions
            .iter()
            .filter_map(|region| {
                region.geometry.bounding_rect().map(|rect| RegionEnvelope {
                    index: region.index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect(),
    );

    let mut joined = Vec::new();
    for (row, cells) in table.rows().iter().enumerate() {
        let (long, lat) = match (cells[long_col].as_f64(), cells[lat_col].as_f64()) {
            (Some(long), Some(lat)) => (long, lat),
            _ => continue,
        };
        let point = Point::new(long, lat);
        let envelope = AABB::from_point([long, lat]);

        for candidate in tree.locate_in_envelope_intersecting(&envelope) {
            let region = &layer.regions[candidate.index];
            if region.geometry.contains(&point) {
                joined.push(JoinedPoint {
                    row,
                    region: candidate.index,
                    long,
                    lat,
                });
                break;
            }
        }
    }

    debug!(
        joined = joined.len(),
        dropped = table.len() - joined.len(),
        "spatial join complete"
    );
    Ok(joined)
}
