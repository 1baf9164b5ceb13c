//! Loading and shaping of the wine datasets.
//!
//! Two static JSON documents are fetched over HTTP: `Deutsche_Weinlagen.json`
//! (point-like records for German wine parcels) and `Weinanbaugebiete.json`
//! (polygon-like records for international wine-growing regions). Records come
//! with no schema guarantee, so both datasets are normalized leniently: records
//! that cannot yield a geometry are dropped without raising an error.

use eyre::{Context, Result};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoValue};
use log::{debug, error};
use poll_promise::Promise;
use serde_json::{Map, Value};

use crate::projection::GeoPos;
use crate::search::Region;

/// A raw dataset record: an arbitrary JSON object with no schema guarantee.
pub type RawRecord = Map<String, Value>;

/// A flat property bag attached to a feature.
pub type JsonObject = Map<String, Value>;

/// Accepted field names for latitude, in lookup order.
const LAT_FIELDS: [&str; 4] = ["geo_lat", "lat", "latitude", "LAT"];
/// Accepted field names for longitude, in lookup order.
const LNG_FIELDS: [&str; 4] = ["geo_lng", "lng", "longitude", "LNG"];

/// A point geometry with its flattened property bag.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPoint {
    /// The point position.
    pub pos: GeoPos,
    /// Flattened (scalar-only) properties.
    pub properties: JsonObject,
}

/// A polygon geometry with its flattened property bag. One record may own
/// several rings; all of them share the same properties.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPolygon {
    /// The polygon rings, each an ordered sequence of (lon, lat) pairs.
    pub rings: Vec<Vec<(f64, f64)>>,
    /// Flattened (scalar-only) properties.
    pub properties: JsonObject,
}

/// The point features of the parcel dataset.
#[derive(Clone, Debug, Default)]
pub struct PointCollection {
    /// The assembled features.
    pub collection: FeatureCollection,
}

/// The polygon features of the region dataset.
///
/// `source_items` counts the input records that contributed at least one ring.
/// It is distinct from the feature count, since every ring of a multi-ring
/// record becomes its own feature, and is used only for status reporting.
#[derive(Clone, Debug, Default)]
pub struct RegionCollection {
    /// The assembled features, one per ring.
    pub collection: FeatureCollection,
    /// Number of source records contributing at least one ring.
    pub source_items: usize,
}

/// An enclosing rectangle over a set of coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    /// South-west corner.
    pub min: GeoPos,
    /// North-east corner.
    pub max: GeoPos,
}

/// Counts shown in the status badge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatasetStatus {
    /// Number of point features.
    pub points: usize,
    /// Number of polygon source records.
    pub polygon_items: usize,
    /// Number of polygon features (rings).
    pub polygon_features: usize,
}

/// Everything the viewer needs from one dataset load.
#[derive(Debug, Default)]
pub struct WineData {
    /// German wine parcel points.
    pub points: PointCollection,
    /// International wine-growing region polygons.
    pub regions: RegionCollection,
    /// Region records for the grape-variety search.
    pub region_index: Vec<Region>,
    /// Counts for the status badge.
    pub status: DatasetStatus,
    /// Enclosing rectangle of all loaded geometry.
    pub bounds: Option<GeoBounds>,
}

fn coord_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Looks up the first present, non-empty value among the field name synonyms.
fn lookup_synonym<'a>(record: &'a RawRecord, fields: &[&str]) -> Option<&'a Value> {
    for field in fields {
        match record.get(*field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(value) => return Some(value),
        }
    }
    None
}

/// Serializes nested property values to their JSON text so the property bag
/// stays flat (scalar-only).
fn flatten_properties(record: &RawRecord) -> JsonObject {
    let mut out = Map::with_capacity(record.len());
    for (key, value) in record {
        let flat = match value {
            Value::Object(_) | Value::Array(_) => match serde_json::to_string(value) {
                Ok(text) => Value::String(text),
                Err(_) => value.clone(),
            },
            other => other.clone(),
        };
        out.insert(key.clone(), flat);
    }
    out
}

/// Normalizes a raw record into a point.
///
/// Latitude and longitude are looked up under a fixed list of field-name
/// synonyms; the first present and non-empty value wins. Returns `None` when
/// either axis is missing or does not parse as a finite number.
pub fn normalize_point(record: &RawRecord) -> Option<NormalizedPoint> {
    let lat = coord_value(lookup_synonym(record, &LAT_FIELDS)?)?;
    let lon = coord_value(lookup_synonym(record, &LNG_FIELDS)?)?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some(NormalizedPoint {
        pos: GeoPos { lon, lat },
        properties: flatten_properties(record),
    })
}

fn ring_coord(pair: &[Value], index: usize) -> f64 {
    pair.get(index).and_then(coord_value).unwrap_or(f64::NAN)
}

/// Normalizes a raw record into a polygon.
///
/// Requires a `polygons` field holding an array of rings. Ring coordinates are
/// coerced to floats with no validity filtering; malformed or degenerate rings
/// pass through as-is. Records without a `polygons` array contribute nothing.
pub fn normalize_polygon(record: &RawRecord) -> Option<NormalizedPolygon> {
    let polygons = record.get("polygons")?.as_array()?;
    let mut rings = Vec::with_capacity(polygons.len());
    for ring in polygons {
        let Some(pairs) = ring.as_array() else {
            continue;
        };
        if pairs.is_empty() {
            continue;
        }
        let ring: Vec<(f64, f64)> = pairs
            .iter()
            .map(|pair| match pair.as_array() {
                Some(pair) => (ring_coord(pair, 0), ring_coord(pair, 1)),
                None => (f64::NAN, f64::NAN),
            })
            .collect();
        rings.push(ring);
    }
    Some(NormalizedPolygon {
        rings,
        properties: flatten_properties(record),
    })
}

/// Builds the point feature collection, dropping records without a usable
/// coordinate pair.
pub fn build_point_collection(records: &[RawRecord]) -> PointCollection {
    let mut features = Vec::new();
    for record in records {
        let Some(point) = normalize_point(record) else {
            continue;
        };
        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(GeoValue::Point(vec![
                point.pos.lon,
                point.pos.lat,
            ]))),
            id: None,
            properties: Some(point.properties),
            foreign_members: None,
        });
    }
    PointCollection {
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
    }
}

/// Builds the polygon feature collection.
///
/// Each ring of a multi-ring record becomes a separate feature sharing the
/// record's property bag, while the source-item counter increments once per
/// record that contributed at least one ring. Features get sequential numeric
/// ids; the highlight filter keys on them.
pub fn build_region_collection(records: &[RawRecord]) -> RegionCollection {
    let mut features = Vec::new();
    let mut source_items = 0usize;
    let mut next_id = 0u64;
    for record in records {
        let Some(polygon) = normalize_polygon(record) else {
            continue;
        };
        if polygon.rings.is_empty() {
            continue;
        }
        source_items += 1;
        for ring in &polygon.rings {
            let coords: Vec<Vec<f64>> = ring.iter().map(|&(lon, lat)| vec![lon, lat]).collect();
            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(GeoValue::Polygon(vec![coords]))),
                id: Some(Id::Number(next_id.into())),
                properties: Some(polygon.properties.clone()),
                foreign_members: None,
            });
            next_id += 1;
        }
    }
    RegionCollection {
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        source_items,
    }
}

fn stretch(bounds: &mut Option<GeoBounds>, lon: f64, lat: f64) {
    if !lon.is_finite() || !lat.is_finite() {
        return;
    }
    match bounds {
        None => {
            *bounds = Some(GeoBounds {
                min: GeoPos { lon, lat },
                max: GeoPos { lon, lat },
            });
        }
        Some(b) => {
            b.min.lon = b.min.lon.min(lon);
            b.min.lat = b.min.lat.min(lat);
            b.max.lon = b.max.lon.max(lon);
            b.max.lat = b.max.lat.max(lat);
        }
    }
}

/// Computes the enclosing rectangle over both collections in a single scan.
///
/// Returns `None` when no finite coordinate was observed.
pub fn compute_bounds(
    points: &PointCollection,
    regions: &RegionCollection,
) -> Option<GeoBounds> {
    let mut bounds = None;
    for feature in &points.collection.features {
        if let Some(geometry) = &feature.geometry {
            if let GeoValue::Point(coords) = &geometry.value {
                if coords.len() >= 2 {
                    stretch(&mut bounds, coords[0], coords[1]);
                }
            }
        }
    }
    for feature in &regions.collection.features {
        if let Some(geometry) = &feature.geometry {
            if let GeoValue::Polygon(rings) = &geometry.value {
                for ring in rings {
                    for coords in ring {
                        if coords.len() >= 2 {
                            stretch(&mut bounds, coords[0], coords[1]);
                        }
                    }
                }
            }
        }
    }
    bounds
}

/// Opportunistically re-parses property values that look like embedded JSON
/// objects (flattened earlier for the property bag). Parse failures leave the
/// raw string untouched.
pub fn revive_properties(properties: &JsonObject) -> JsonObject {
    let mut out = properties.clone();
    for value in out.values_mut() {
        if let Value::String(s) = value {
            if s.starts_with('{') && s.ends_with('}') {
                if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                    *value = parsed;
                }
            }
        }
    }
    out
}

/// Extracts the record array from a point dataset document.
///
/// The expected shape is `{ "items": [...] }`; a bare object is tolerated by
/// taking its values (a legacy payload shape).
pub fn point_items(document: &Value) -> Vec<RawRecord> {
    if let Some(items) = document.get("items").and_then(Value::as_array) {
        return items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect();
    }
    match document.as_object() {
        Some(object) => object
            .values()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        None => Vec::new(),
    }
}

/// Extracts the record array from a region dataset document.
pub fn region_items(document: &Value) -> Vec<RawRecord> {
    document
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Assembles the full viewer dataset from the two raw documents.
pub fn assemble(points_doc: &Value, regions_doc: &Value) -> WineData {
    let point_records = point_items(points_doc);
    let region_records = region_items(regions_doc);

    let points = build_point_collection(&point_records);
    let regions = build_region_collection(&region_records);
    let region_index = region_records.iter().map(Region::from_record).collect();

    let status = DatasetStatus {
        points: points.collection.features.len(),
        polygon_items: regions.source_items,
        polygon_features: regions.collection.features.len(),
    };
    let bounds = compute_bounds(&points, &regions);

    WineData {
        points,
        regions,
        region_index,
        status,
        bounds,
    }
}

fn fetch_document(url: &str) -> Result<Value> {
    debug!("Fetching dataset from {url}");
    let response = crate::CLIENT
        .get(url)
        .send()
        .wrap_err_with(|| format!("Failed to fetch {url}"))?
        .error_for_status()
        .wrap_err_with(|| format!("Bad status fetching {url}"))?;
    response
        .json()
        .wrap_err_with(|| format!("Failed to parse {url}"))
}

/// Fetches both dataset files on a background thread.
///
/// A fetch or parse failure is logged and yields empty collections with a
/// zero-valued status, so the map still renders with no data.
pub fn fetch_wine_data(base_url: &str) -> Promise<WineData> {
    let points_url = format!("{}/Deutsche_Weinlagen.json", base_url.trim_end_matches('/'));
    let regions_url = format!("{}/Weinanbaugebiete.json", base_url.trim_end_matches('/'));
    Promise::spawn_thread("load_wine_data", move || {
        let loaded: Result<WineData> = (|| {
            let points_doc = fetch_document(&points_url)?;
            let regions_doc = fetch_document(&regions_url)?;
            Ok(assemble(&points_doc, &regions_doc))
        })();
        match loaded {
            Ok(data) => data,
            Err(e) => {
                error!("Data load error: {e:?}");
                WineData::default()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn normalize_point_uses_first_synonym() {
        let rec = record(json!({"geo_lat": "52.0", "lat": "0.0", "geo_lng": 13.0}));
        let point = normalize_point(&rec).unwrap();
        assert_eq!(point.pos, GeoPos { lon: 13.0, lat: 52.0 });
    }

    #[test]
    fn normalize_point_skips_empty_synonym() {
        let rec = record(json!({"geo_lat": "  ", "latitude": 48.5, "LNG": "11.25"}));
        let point = normalize_point(&rec).unwrap();
        assert_eq!(point.pos, GeoPos { lon: 11.25, lat: 48.5 });
    }

    #[test]
    fn normalize_point_missing_coordinates() {
        let rec = record(json!({"name": "no geometry here"}));
        assert!(normalize_point(&rec).is_none());
    }

    #[test]
    fn normalize_point_unparseable_coordinates() {
        let rec = record(json!({"lat": "fifty-two", "lng": 13.0}));
        assert!(normalize_point(&rec).is_none());
    }

    #[test]
    fn normalize_point_flattens_nested_properties() {
        let rec = record(json!({
            "lat": 52.0,
            "lng": 13.0,
            "details": {"soil": "slate"},
            "tags": [1, 2]
        }));
        let point = normalize_point(&rec).unwrap();
        assert_eq!(
            point.properties.get("details").unwrap(),
            &json!("{\"soil\":\"slate\"}")
        );
        assert_eq!(point.properties.get("tags").unwrap(), &json!("[1,2]"));
    }

    #[test]
    fn revive_properties_round_trips_flattened_objects() {
        let rec = record(json!({"lat": 52.0, "lng": 13.0, "details": {"soil": "slate"}}));
        let point = normalize_point(&rec).unwrap();
        let revived = revive_properties(&point.properties);
        assert_eq!(revived.get("details").unwrap(), &json!({"soil": "slate"}));
    }

    #[test]
    fn revive_properties_keeps_unparseable_strings() {
        let mut props = JsonObject::new();
        props.insert("broken".into(), json!("{not json}"));
        let revived = revive_properties(&props);
        assert_eq!(revived.get("broken").unwrap(), &json!("{not json}"));
    }

    #[test]
    fn normalize_polygon_without_polygons_field() {
        let rec = record(json!({"bezeichnung": "Mosel"}));
        assert!(normalize_polygon(&rec).is_none());
    }

    #[test]
    fn normalize_polygon_keeps_malformed_rings() {
        let rec = record(json!({"polygons": [[[1.0, "not-a-number"], [2.0, 3.0]]]}));
        let polygon = normalize_polygon(&rec).unwrap();
        assert_eq!(polygon.rings.len(), 1);
        assert_eq!(polygon.rings[0][1], (2.0, 3.0));
        assert!(polygon.rings[0][0].1.is_nan());
    }

    #[test]
    fn multi_ring_record_counts_once() {
        let rec = json!({
            "bezeichnung": "Bordeaux",
            "polygons": [
                [[0.0, 44.0], [1.0, 44.0], [0.5, 45.0]],
                [[2.0, 44.0], [3.0, 44.0], [2.5, 45.0]]
            ]
        });
        let records = vec![record(rec)];
        let regions = build_region_collection(&records);
        assert_eq!(regions.collection.features.len(), 2);
        assert_eq!(regions.source_items, 1);
    }

    #[test]
    fn region_features_get_sequential_ids() {
        let records = vec![
            record(json!({"polygons": [[[0.0, 0.0]]]})),
            record(json!({"polygons": [[[1.0, 1.0]], [[2.0, 2.0]]]})),
        ];
        let regions = build_region_collection(&records);
        let ids: Vec<_> = regions
            .collection
            .features
            .iter()
            .map(|f| f.id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![
                Some(Id::Number(0.into())),
                Some(Id::Number(1.into())),
                Some(Id::Number(2.into()))
            ]
        );
    }

    #[test]
    fn bounds_of_empty_collections() {
        assert_eq!(
            compute_bounds(&PointCollection::default(), &RegionCollection::default()),
            None
        );
    }

    #[test]
    fn bounds_of_single_point() {
        let records = vec![record(json!({"lng": 13.0, "lat": 52.0}))];
        let points = build_point_collection(&records);
        let bounds = compute_bounds(&points, &RegionCollection::default()).unwrap();
        assert_eq!(bounds.min, GeoPos { lon: 13.0, lat: 52.0 });
        assert_eq!(bounds.max, GeoPos { lon: 13.0, lat: 52.0 });
    }

    #[test]
    fn bounds_span_both_collections() {
        let point_records = vec![record(json!({"lng": 13.0, "lat": 52.0}))];
        let region_records = vec![record(json!({"polygons": [[[5.0, 44.0], [7.0, 46.0]]]}))];
        let points = build_point_collection(&point_records);
        let regions = build_region_collection(&region_records);
        let bounds = compute_bounds(&points, &regions).unwrap();
        assert_eq!(bounds.min, GeoPos { lon: 5.0, lat: 44.0 });
        assert_eq!(bounds.max, GeoPos { lon: 13.0, lat: 52.0 });
    }

    #[test]
    fn point_items_tolerates_bare_object() {
        let doc = json!({"a": {"lat": 52.0, "lng": 13.0}, "b": {"lat": 48.0, "lng": 11.0}});
        assert_eq!(point_items(&doc).len(), 2);
    }

    #[test]
    fn assemble_reports_status() {
        let points_doc = json!({"items": [
            {"lat": 52.0, "lng": 13.0},
            {"lat": "broken", "lng": 13.0}
        ]});
        let regions_doc = json!({"items": [
            {"polygons": [[[0.0, 44.0]], [[1.0, 45.0]]]}
        ]});
        let data = assemble(&points_doc, &regions_doc);
        assert_eq!(
            data.status,
            DatasetStatus {
                points: 1,
                polygon_items: 1,
                polygon_features: 2
            }
        );
        assert!(data.bounds.is_some());
    }
}
