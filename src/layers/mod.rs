//! Layers drawn over the map view: the tile basemap and the vector overlays.

use egui::{Painter, Pos2, Response};
use std::any::Any;
use std::collections::BTreeMap;

use crate::projection::MapProjection;
use crate::source::GeoSource;

/// Tile basemap layer.
pub(crate) mod tile;

/// Vector overlays (points, clusters, polygons).
pub(crate) mod vector;

/// The registered vector sources, keyed by source id.
pub(crate) type SourceMap = BTreeMap<String, GeoSource>;

/// A drawable layer of the map view.
pub(crate) trait Layer: Any {
    /// Handles user input for the layer. Returns `true` if the input was
    /// handled and should not be processed further by the map.
    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool;

    /// Draws the layer.
    fn draw(&self, painter: &Painter, projection: &MapProjection, sources: &SourceMap);

    /// Gets the layer as a `dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Gets the layer as a mutable `dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Checks whether a screen point lies inside a polygon ring, by casting a ray
/// to the right and counting edge crossings.
pub(crate) fn point_in_ring(p: Pos2, ring: &[Pos2]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
