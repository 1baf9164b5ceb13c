//! Vector data sources registered with the map engine.

use std::cell::RefCell;
use std::collections::BTreeSet;

use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Value as GeoValue};

use crate::data::JsonObject;
use crate::projection::{GeoPos, lat_to_y, lon_to_x};

/// Cluster radius in screen pixels.
const CLUSTER_RADIUS: f64 = 50.0;
/// Above this zoom points are no longer clustered.
pub(crate) const CLUSTER_MAX_ZOOM: u8 = 14;

/// One cluster entry at a given zoom. Entries with a single member are
/// rendered as unclustered points.
#[derive(Clone, Debug)]
pub(crate) struct Cluster {
    pub id: u64,
    pub pos: GeoPos,
    /// Indices into the source's point list (see [`GeoSource::point`]).
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Default)]
struct ClusterCache {
    zoom: Option<u8>,
    clusters: Vec<Cluster>,
}

/// A named GeoJSON source, optionally clustered.
pub(crate) struct GeoSource {
    collection: FeatureCollection,
    clustered: bool,
    /// Point positions with their feature index, extracted once.
    points: Vec<(GeoPos, usize)>,
    cache: RefCell<ClusterCache>,
}

pub(crate) fn feature_id(feature: &Feature) -> Option<u64> {
    match &feature.id {
        Some(Id::Number(n)) => n.as_u64(),
        _ => None,
    }
}

pub(crate) fn feature_properties(feature: &Feature) -> JsonObject {
    feature.properties.clone().unwrap_or_default()
}

impl GeoSource {
    pub fn new(collection: FeatureCollection, clustered: bool) -> Self {
        let points = collection
            .features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let geometry = feature.geometry.as_ref()?;
                match &geometry.value {
                    GeoValue::Point(coords) if coords.len() >= 2 => Some((
                        GeoPos {
                            lon: coords[0],
                            lat: coords[1],
                        },
                        index,
                    )),
                    _ => None,
                }
            })
            .collect();
        Self {
            collection,
            clustered,
            points,
            cache: RefCell::new(ClusterCache::default()),
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.collection.features
    }

    /// The position and feature behind a point-list index.
    pub fn point(&self, index: usize) -> Option<(GeoPos, &Feature)> {
        let &(pos, feature_index) = self.points.get(index)?;
        Some((pos, self.collection.features.get(feature_index)?))
    }

    /// Runs `f` over the cluster entries for the given zoom, recomputing the
    /// grid when the zoom changed since the last call.
    pub fn with_clusters<R>(&self, zoom: u8, f: impl FnOnce(&[Cluster]) -> R) -> R {
        let mut cache = self.cache.borrow_mut();
        if cache.zoom != Some(zoom) {
            cache.clusters = self.cluster_at(zoom);
            cache.zoom = Some(zoom);
        }
        f(&cache.clusters)
    }

    fn cell_of(pos: GeoPos, zoom: u8) -> (i64, i64) {
        let world_px_x = lon_to_x(pos.lon, zoom) * crate::TILE_SIZE as f64;
        let world_px_y = lat_to_y(pos.lat, zoom) * crate::TILE_SIZE as f64;
        (
            (world_px_x / CLUSTER_RADIUS).floor() as i64,
            (world_px_y / CLUSTER_RADIUS).floor() as i64,
        )
    }

    fn cluster_at(&self, zoom: u8) -> Vec<Cluster> {
        if !self.clustered || zoom > CLUSTER_MAX_ZOOM {
            return self
                .points
                .iter()
                .enumerate()
                .map(|(index, &(pos, _))| Cluster {
                    id: index as u64,
                    pos,
                    members: vec![index],
                })
                .collect();
        }

        // Grid clustering in world pixel space; cluster ids are stable for a
        // given zoom because cells are visited in sorted order.
        let mut cells: std::collections::BTreeMap<(i64, i64), Vec<usize>> =
            std::collections::BTreeMap::new();
        for (index, &(pos, _)) in self.points.iter().enumerate() {
            cells.entry(Self::cell_of(pos, zoom)).or_default().push(index);
        }

        cells
            .into_values()
            .enumerate()
            .map(|(id, members)| {
                let mut lon = 0.0;
                let mut lat = 0.0;
                for &index in &members {
                    lon += self.points[index].0.lon;
                    lat += self.points[index].0.lat;
                }
                let n = members.len() as f64;
                Cluster {
                    id: id as u64,
                    pos: GeoPos {
                        lon: lon / n,
                        lat: lat / n,
                    },
                    members,
                }
            })
            .collect()
    }

    /// The zoom level at which the given cluster splits apart.
    pub fn expansion_zoom(&self, cluster_id: u64, current_zoom: u8) -> Option<u8> {
        let members = self.with_clusters(current_zoom, |clusters| {
            clusters
                .iter()
                .find(|c| c.id == cluster_id)
                .map(|c| c.members.clone())
        })?;
        if members.len() < 2 {
            return Some(current_zoom);
        }
        let positions: Vec<GeoPos> = members
            .iter()
            .filter_map(|&index| self.points.get(index).map(|&(pos, _)| pos))
            .collect();
        for zoom in (current_zoom + 1)..=CLUSTER_MAX_ZOOM {
            let cells: BTreeSet<(i64, i64)> =
                positions.iter().map(|&p| Self::cell_of(p, zoom)).collect();
            if cells.len() > 1 {
                return Some(zoom);
            }
        }
        Some(CLUSTER_MAX_ZOOM + 1)
    }
}
