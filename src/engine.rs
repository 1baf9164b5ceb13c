//! The capability surface of the map engine.
//!
//! Interaction handling and view control never touch the widget internals
//! directly; they speak to this trait. The in-crate [`Map`](crate::Map) widget
//! is the concrete engine, and tests substitute a recording mock.
//!
//! Engine commands addressing a layer or source that does not (yet) exist are
//! tolerated no-ops. Such calls are expected races during basemap reloads, not
//! genuine faults, so they are logged at debug level and swallowed.

use egui::{Color32, Pos2};
use geojson::FeatureCollection;

use crate::data::{GeoBounds, JsonObject};
use crate::projection::GeoPos;

/// The id of the clustered parcel point source.
pub const SOURCE_POINTS: &str = "points";
/// The id of the wine-region polygon source.
pub const SOURCE_REGIONS: &str = "wein";
/// The id of the cluster circle layer.
pub const LAYER_CLUSTERS: &str = "clusters";
/// The id of the cluster count label layer.
pub const LAYER_CLUSTER_COUNT: &str = "cluster-count";
/// The id of the unclustered point layer.
pub const LAYER_POINTS: &str = "unclustered-point";
/// The id of the region fill layer.
pub const LAYER_REGION_FILL: &str = "wein-fill";
/// The id of the region outline layer.
pub const LAYER_REGION_LINE: &str = "wein-line";
/// The id of the region highlight layer.
pub const LAYER_REGION_HIGHLIGHT: &str = "wein-highlight";

/// Basemap imagery mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Imagery {
    /// The stylized dark basemap.
    #[default]
    Stylized,
    /// Satellite imagery.
    Satellite,
}

/// What a visual layer renders from its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    /// Circle markers for unclustered points.
    CirclePoints,
    /// Stepped circles for engine-computed clusters.
    ClusterCircles,
    /// Count labels over clusters.
    ClusterLabels,
    /// Filled polygons.
    Fill,
    /// Polygon outlines.
    Line,
}

/// Paint properties of a visual layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Paint {
    /// Main color (circle fill, polygon fill, line color).
    pub color: Color32,
    /// Outline color for circles and filled polygons.
    pub outline: Color32,
    /// Stroke width for lines and circle outlines.
    pub stroke_width: f32,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color32::WHITE,
            outline: Color32::TRANSPARENT,
            stroke_width: 1.0,
        }
    }
}

/// A property filter over feature ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdFilter {
    /// Every feature passes.
    #[default]
    All,
    /// No feature passes.
    Nothing,
    /// Only the feature with this id passes.
    Only(u64),
}

impl IdFilter {
    /// Whether a feature with the given id passes the filter.
    pub fn matches(&self, id: Option<u64>) -> bool {
        match self {
            IdFilter::All => true,
            IdFilter::Nothing => false,
            IdFilter::Only(wanted) => id == Some(*wanted),
        }
    }
}

/// A named visual layer over a named source.
#[derive(Clone, Debug)]
pub struct LayerSpec {
    /// Layer id.
    pub id: String,
    /// Id of the source the layer renders.
    pub source: String,
    /// What the layer renders.
    pub kind: LayerKind,
    /// Paint properties.
    pub paint: Paint,
    /// Feature id filter; layers default to rendering everything.
    pub id_filter: IdFilter,
}

/// A rendered feature intersecting a queried screen point.
#[derive(Clone, Debug)]
pub struct RenderedFeature {
    /// Id of the layer the hit belongs to.
    pub layer: String,
    /// Feature id, when the source assigns ids.
    pub feature_id: Option<u64>,
    /// Cluster id, for hits on cluster layers.
    pub cluster_id: Option<u64>,
    /// The feature's flattened property bag.
    pub properties: JsonObject,
    /// Representative position (point features and clusters).
    pub pos: Option<GeoPos>,
}

/// A camera animation target. Unset fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraTarget {
    /// Target center.
    pub center: Option<GeoPos>,
    /// Target zoom level.
    pub zoom: Option<u8>,
    /// Target camera tilt in degrees.
    pub pitch: Option<f32>,
    /// Target bearing in degrees.
    pub bearing: Option<f32>,
    /// Animation duration in milliseconds.
    pub duration_ms: u64,
}

/// The declarative command surface of the underlying map engine.
pub trait MapEngine {
    /// Adds a named vector data source. Replaces nothing: adding an id that
    /// already exists is a no-op (the existence guard for style reloads).
    fn add_geojson_source(&mut self, id: &str, collection: FeatureCollection, clustered: bool);

    /// Removes a named source and every layer rendering it.
    fn remove_source(&mut self, id: &str);

    /// Whether a source with this id is registered.
    fn has_source(&self, id: &str) -> bool;

    /// Adds a visual layer, optionally inserted below an existing layer.
    /// Adding an id that already exists is a no-op.
    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>);

    /// Whether a layer with this id is registered.
    fn has_layer(&self, id: &str) -> bool;

    /// Shows or hides a layer.
    fn set_layer_visible(&mut self, id: &str, visible: bool);

    /// Replaces a layer's paint properties.
    fn set_layer_paint(&mut self, id: &str, paint: Paint);

    /// Moves a layer above all others.
    fn move_layer_on_top(&mut self, id: &str);

    /// Sets the persisted (click-selected) feature id filter of a layer.
    fn set_highlight_filter(&mut self, id: &str, filter: IdFilter);

    /// Sets the transient hover filter of a layer. Draws on top of the
    /// persisted highlight without replacing it.
    fn set_hover_filter(&mut self, id: &str, filter: IdFilter);

    /// Queries which rendered features intersect a screen point, restricted to
    /// the given layer ids. Hidden layers yield no hits.
    fn query_rendered_features(&self, screen: Pos2, layers: &[&str]) -> Vec<RenderedFeature>;

    /// The zoom level needed to expand the given cluster.
    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Option<u8>;

    /// Animates the camera towards a target.
    fn ease_to(&mut self, target: CameraTarget);

    /// Moves the camera so the given bounds fit the viewport with padding.
    fn fit_bounds(&mut self, bounds: GeoBounds, padding: f32);

    /// Current zoom level.
    fn zoom(&self) -> u8;

    /// Switches the basemap style. Destructive: drops all registered sources
    /// and layers; completion is signalled through [`basemap_ready`].
    ///
    /// [`basemap_ready`]: MapEngine::basemap_ready
    fn set_basemap(&mut self, imagery: Imagery);

    /// Whether the most recently requested basemap has finished loading.
    fn basemap_ready(&self) -> bool;

    /// Fades the data layers out (true) or back in (false).
    fn set_fade(&mut self, faded: bool);

    /// Enables or disables the 3D globe overlay (terrain fog and tilt).
    fn set_globe(&mut self, enabled: bool);
}

#[cfg(test)]
pub(crate) mod mock {
    //! A recording engine for controller and interaction tests.

    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    pub struct MockEngine {
        pub sources: BTreeMap<String, bool>,
        pub source_adds: BTreeMap<String, usize>,
        pub layers: Vec<LayerSpec>,
        pub visibility: BTreeMap<String, bool>,
        pub highlight_filters: BTreeMap<String, IdFilter>,
        pub hover_filters: BTreeMap<String, IdFilter>,
        pub paints: BTreeMap<String, Paint>,
        pub hits: Vec<RenderedFeature>,
        pub expansion_zoom: Option<u8>,
        pub eased_to: Vec<CameraTarget>,
        pub fitted: Vec<(GeoBounds, f32)>,
        pub current_zoom: u8,
        pub basemap: Imagery,
        pub basemap_sets: usize,
        pub ready: bool,
        pub faded: bool,
        pub globe: bool,
    }

    impl MockEngine {
        pub fn with_hits(hits: Vec<RenderedFeature>) -> Self {
            Self {
                hits,
                current_zoom: 6,
                ready: true,
                ..Default::default()
            }
        }

        pub fn highlight(&self, layer: &str) -> IdFilter {
            self.highlight_filters
                .get(layer)
                .copied()
                .unwrap_or_default()
        }
    }

    impl MapEngine for MockEngine {
        fn add_geojson_source(&mut self, id: &str, _: FeatureCollection, clustered: bool) {
            *self.source_adds.entry(id.to_string()).or_default() += 1;
            self.sources.entry(id.to_string()).or_insert(clustered);
        }

        fn remove_source(&mut self, id: &str) {
            self.sources.remove(id);
            self.layers.retain(|l| l.source != id);
        }

        fn has_source(&self, id: &str) -> bool {
            self.sources.contains_key(id)
        }

        fn add_layer(&mut self, spec: LayerSpec, _before: Option<&str>) {
            if !self.has_layer(&spec.id) {
                self.visibility.insert(spec.id.clone(), true);
                self.layers.push(spec);
            }
        }

        fn has_layer(&self, id: &str) -> bool {
            self.layers.iter().any(|l| l.id == id)
        }

        fn set_layer_visible(&mut self, id: &str, visible: bool) {
            self.visibility.insert(id.to_string(), visible);
        }

        fn set_layer_paint(&mut self, id: &str, paint: Paint) {
            self.paints.insert(id.to_string(), paint);
        }

        fn move_layer_on_top(&mut self, _id: &str) {}

        fn set_highlight_filter(&mut self, id: &str, filter: IdFilter) {
            self.highlight_filters.insert(id.to_string(), filter);
        }

        fn set_hover_filter(&mut self, id: &str, filter: IdFilter) {
            self.hover_filters.insert(id.to_string(), filter);
        }

        fn query_rendered_features(&self, _: Pos2, layers: &[&str]) -> Vec<RenderedFeature> {
            self.hits
                .iter()
                .filter(|hit| layers.contains(&hit.layer.as_str()))
                .cloned()
                .collect()
        }

        fn cluster_expansion_zoom(&self, _: &str, _: u64) -> Option<u8> {
            self.expansion_zoom
        }

        fn ease_to(&mut self, target: CameraTarget) {
            if let Some(zoom) = target.zoom {
                self.current_zoom = zoom;
            }
            self.eased_to.push(target);
        }

        fn fit_bounds(&mut self, bounds: GeoBounds, padding: f32) {
            self.fitted.push((bounds, padding));
        }

        fn zoom(&self) -> u8 {
            self.current_zoom
        }

        fn set_basemap(&mut self, imagery: Imagery) {
            self.basemap = imagery;
            self.basemap_sets += 1;
            // Style reloads are destructive to engine-managed state.
            self.sources.clear();
            self.layers.clear();
            self.visibility.clear();
            self.ready = false;
        }

        fn basemap_ready(&self) -> bool {
            self.ready
        }

        fn set_fade(&mut self, faded: bool) {
            self.faded = faded;
        }

        fn set_globe(&mut self, enabled: bool) {
            self.globe = enabled;
        }
    }
}
