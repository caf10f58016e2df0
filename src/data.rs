//! Loaders for the region-polygon layer and on-disk coverage tables.

use geo::MultiPolygon;
use geojson::GeoJson;
use serde_json::{Map, Value as JsonValue};
use shapefile::dbase::FieldValue;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{CoverageTable, Crs, RegionLayer, RegionPolygon, Value};

/// Loads an administrative polygon layer from a GeoJSON file or a Shapefile,
/// dispatching on the extension. Region indices are assigned in file order.
pub fn load_region_layer(path: &Path) -> Result<RegionLayer> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let layer = match extension.as_str() {
        "json" | "geojson" => load_geojson_layer(path)?,
        "shp" => load_shapefile_layer(path)?,
        other => {
            return Err(Error::LayerLoad {
                path: path.to_path_buf(),
                source: format!("unsupported geometry format: '{}'", other).into(),
            })
        }
    };

    info!(
        regions = layer.len(),
        crs = %layer.crs,
        "loaded region layer from {:?}",
        path
    );
    Ok(layer)
}

fn layer_error(path: &Path, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
    Error::LayerLoad {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

fn load_geojson_layer(path: &Path) -> Result<RegionLayer> {
    let file = File::open(path).map_err(|e| layer_error(path, e))?;
    let reader = BufReader::new(file);

    // Loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).map_err(|e| layer_error(path, e))?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(layer_error(path, "GeoJSON must be a FeatureCollection")),
    };

    // Legacy GeoJSON carries a named CRS member; absent means WGS84.
    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(JsonValue::as_str)
        .map(|name| Crs(name.to_string()))
        .unwrap_or_default();

    let mut regions = Vec::new();
    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geom) => {
                let converted: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| layer_error(path, format!("bad geometry: {:?}", e)))?;
                match converted {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // points/lines are not aggregation units
                }
            }
            None => continue,
        };

        regions.push(RegionPolygon {
            index: regions.len(),
            geometry,
            attributes: feature.properties.unwrap_or_default(),
        });
    }

    Ok(RegionLayer { regions, crs })
}

fn load_shapefile_layer(path: &Path) -> Result<RegionLayer> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|e| layer_error(path, e))?;

    // The .shp itself has no CRS; a sibling .prj holds the projection text.
    let crs = std::fs::read_to_string(path.with_extension("prj"))
        .map(|wkt| Crs(wkt.trim().to_string()))
        .unwrap_or_default();

    let mut regions = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| layer_error(path, e))?;

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(p) => p
                .try_into()
                .map_err(|e| layer_error(path, format!("bad polygon: {:?}", e)))?,
            shapefile::Shape::PolygonM(p) => p
                .try_into()
                .map_err(|e| layer_error(path, format!("bad polygonM: {:?}", e)))?,
            shapefile::Shape::PolygonZ(p) => p
                .try_into()
                .map_err(|e| layer_error(path, format!("bad polygonZ: {:?}", e)))?,
            _ => continue, // skip non-polygon shapes
        };

        let mut attributes = Map::new();
        for (name, value) in record.into_iter() {
            attributes.insert(name, dbase_to_json(value));
        }

        regions.push(RegionPolygon {
            index: regions.len(),
            geometry,
            attributes,
        });
    }

    Ok(RegionLayer { regions, crs })
}

fn dbase_to_json(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(Some(s)) => JsonValue::String(s),
        FieldValue::Numeric(Some(n)) => serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        FieldValue::Float(Some(f)) => serde_json::Number::from_f64(f as f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        FieldValue::Integer(i) => JsonValue::Number(i.into()),
        FieldValue::Logical(Some(b)) => JsonValue::Bool(b),
        FieldValue::Date(Some(d)) => JsonValue::String(format!("{:?}", d)),
        _ => JsonValue::Null,
    }
}

/// Reads a coverage table from a CSV file. Every field that parses as a
/// number becomes numeric; empty fields become null; everything else stays
/// text.
pub fn load_coverage_csv(path: &Path) -> Result<CoverageTable> {
    let table_error = |source: Box<dyn std::error::Error + Send + Sync>| Error::TableLoad {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| table_error(Box::new(e)))?;
    let mut rdr = csv::ReaderBuilder::new().from_reader(file);

    let headers = rdr
        .headers()
        .map_err(|e| table_error(Box::new(e)))?
        .clone();
    let mut table = CoverageTable::new(headers.iter().map(|h| h.to_string()).collect());

    for result in rdr.records() {
        let record = result.map_err(|e| table_error(Box::new(e)))?;
        let row = record.iter().map(parse_field).collect();
        table.push_row(row);
    }

    info!(rows = table.len(), "loaded coverage table from {:?}", path);
    Ok(table)
}

fn parse_field(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else if let Ok(n) = field.parse::<f64>() {
        Value::Number(n)
    } else {
        Value::Text(field.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("coverage-map-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn loads_geojson_layer_with_crs_and_attributes() {
        let path = temp_path("regions.geojson");
        std::fs::write(
            &path,
            r#"{
              "type": "FeatureCollection",
              "crs": {"type": "name", "properties": {"name": "EPSG:25831"}},
              "features": [
                {
                  "type": "Feature",
                  "properties": {"name": "Alt Camp"},
                  "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]
                  }
                },
                {
                  "type": "Feature",
                  "properties": {"name": "Bages"},
                  "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[2,0],[3,0],[3,1],[2,1],[2,0]]]
                  }
                }
              ]
            }"#,
        )
        .unwrap();

        let layer = load_region_layer(&path).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.crs, Crs("EPSG:25831".to_string()));
        assert_eq!(layer.regions[0].index, 0);
        assert_eq!(
            layer.regions[1].attributes.get("name").and_then(|v| v.as_str()),
            Some("Bages")
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn geojson_without_crs_member_defaults_to_wgs84() {
        let path = temp_path("regions-nocrs.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": []}"#,
        )
        .unwrap();
        let layer = load_region_layer(&path).unwrap();
        assert_eq!(layer.crs, Crs::default());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unsupported_extension_is_a_layer_error() {
        let err = load_region_layer(Path::new("regions.gpkg")).unwrap_err();
        assert!(matches!(err, Error::LayerLoad { .. }));
    }

    #[test]
    fn csv_fields_parse_to_numbers_text_and_null() {
        let path = temp_path("coverage.csv");
        std::fs::write(
            &path,
            "town_name,postal_code,signal,long,lat\nGirona,17001,12.5,2.82,41.98\n,17002,3,2.9,42.0\n",
        )
        .unwrap();

        let table = load_coverage_csv(&path).unwrap();
        assert_eq!(
            table.columns(),
            &["town_name", "postal_code", "signal", "long", "lat"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, 0).as_str(), Some("Girona"));
        assert_eq!(table.value(0, 2).as_f64(), Some(12.5));
        assert!(table.value(1, 0).is_null());
        // postal codes happen to be numeric in this fixture
        assert_eq!(table.value(1, 1).as_f64(), Some(17002.0));
        std::fs::remove_file(&path).ok();
    }
}
