//! UI view state and the declarative commands it issues to the engine.
//!
//! The controller owns the four toggles (layer visibility, projection,
//! imagery) and translates every change into idempotent engine commands.
//! Imagery is the one toggle that reloads the whole basemap style; since that
//! reload is destructive to engine-managed sources and layers, it runs as an
//! explicit state machine rather than chained timeouts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use egui::Color32;
use log::debug;

use crate::data::{GeoBounds, WineData};
use crate::engine::{
    IdFilter, Imagery, LAYER_CLUSTER_COUNT, LAYER_CLUSTERS, LAYER_POINTS, LAYER_REGION_FILL,
    LAYER_REGION_HIGHLIGHT, LAYER_REGION_LINE, LayerKind, LayerSpec, MapEngine, Paint,
    SOURCE_POINTS, SOURCE_REGIONS,
};
use crate::engine::CameraTarget;
use crate::interaction::MapSession;
use crate::projection::GeoPos;

/// Delay before the single re-attempt of a basemap swap whose readiness
/// signal has not arrived.
const RELOAD_RETRY_DELAY: Duration = Duration::from_millis(300);
/// After this long the controller stops waiting for readiness and re-attaches
/// anyway; some tile providers never signal cleanly.
const RELOAD_GIVE_UP: Duration = Duration::from_millis(900);

/// Fallback view box over Germany used when no data bounds exist.
const GERMANY_BOUNDS: GeoBounds = GeoBounds {
    min: GeoPos { lon: 5.5, lat: 47.2 },
    max: GeoPos { lon: 15.5, lat: 55.1 },
};

/// Map projection mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Projection {
    /// Flat Web-Mercator view.
    #[default]
    Flat,
    /// 3D globe view with tilt and fog overlay.
    Globe,
}

/// The four UI toggles. Pure state, no persistence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewState {
    /// Whether the parcel point layers are shown.
    pub points_visible: bool,
    /// Whether the region polygon layers are shown.
    pub polygons_visible: bool,
    /// Projection mode.
    pub projection: Projection,
    /// Basemap imagery mode.
    pub imagery: Imagery,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            points_visible: true,
            polygons_visible: true,
            projection: Projection::default(),
            imagery: Imagery::default(),
        }
    }
}

/// Progress of a basemap style swap.
#[derive(Debug)]
enum StyleTransition {
    Idle,
    /// Waiting for the engine to signal basemap readiness.
    Reloading {
        target: Imagery,
        since: Instant,
        retried: bool,
    },
    /// Readiness arrived (or waiting was abandoned); re-attach on next tick.
    Reattaching { target: Imagery },
}

/// Owns the toggle state and drives the engine accordingly.
pub struct ViewController {
    state: ViewState,
    transition: StyleTransition,
    data: Option<Arc<WineData>>,
}

impl Default for ViewController {
    fn default() -> Self {
        Self::new()
    }
}

fn accent(imagery: Imagery) -> Color32 {
    match imagery {
        Imagery::Stylized => Color32::from_rgb(0, 230, 255),
        Imagery::Satellite => Color32::from_rgb(255, 0, 128),
    }
}

impl ViewController {
    /// Creates a controller with all layers visible, flat projection and the
    /// stylized basemap.
    pub fn new() -> Self {
        Self {
            state: ViewState::default(),
            transition: StyleTransition::Idle,
            data: None,
        }
    }

    /// Current toggle state.
    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Stores the loaded dataset and attaches it to the engine.
    pub fn set_data(
        &mut self,
        engine: &mut dyn MapEngine,
        session: &MapSession,
        data: Arc<WineData>,
    ) {
        self.data = Some(data);
        self.attach(engine, session);
    }

    /// Attaches sources and layers for the current imagery mode.
    ///
    /// Every add is guarded by an existence check, so calling this again
    /// (e.g. from a second style-reload continuation racing the first) never
    /// registers duplicate sources or layers.
    pub fn attach(&mut self, engine: &mut dyn MapEngine, session: &MapSession) {
        let Some(data) = self.data.clone() else {
            return;
        };
        let accent = accent(self.state.imagery);

        if !engine.has_source(SOURCE_POINTS) {
            engine.add_geojson_source(SOURCE_POINTS, data.points.collection.clone(), true);
        }
        if !engine.has_layer(LAYER_CLUSTERS) {
            engine.add_layer(
                LayerSpec {
                    id: LAYER_CLUSTERS.into(),
                    source: SOURCE_POINTS.into(),
                    kind: LayerKind::ClusterCircles,
                    paint: Paint {
                        color: accent,
                        outline: Color32::TRANSPARENT,
                        stroke_width: 0.0,
                    },
                    id_filter: IdFilter::All,
                },
                None,
            );
        }
        if !engine.has_layer(LAYER_CLUSTER_COUNT) {
            engine.add_layer(
                LayerSpec {
                    id: LAYER_CLUSTER_COUNT.into(),
                    source: SOURCE_POINTS.into(),
                    kind: LayerKind::ClusterLabels,
                    paint: Paint {
                        color: Color32::from_rgb(0, 27, 31),
                        outline: Color32::TRANSPARENT,
                        stroke_width: 0.0,
                    },
                    id_filter: IdFilter::All,
                },
                None,
            );
        }
        if !engine.has_layer(LAYER_POINTS) {
            engine.add_layer(
                LayerSpec {
                    id: LAYER_POINTS.into(),
                    source: SOURCE_POINTS.into(),
                    kind: LayerKind::CirclePoints,
                    paint: Paint {
                        color: accent,
                        outline: Color32::WHITE.gamma_multiply(0.9),
                        stroke_width: 1.5,
                    },
                    id_filter: IdFilter::All,
                },
                None,
            );
        }

        if !engine.has_source(SOURCE_REGIONS) {
            engine.add_geojson_source(SOURCE_REGIONS, data.regions.collection.clone(), false);
        }
        // Region layers go below the cluster layers so points stay on top.
        if !engine.has_layer(LAYER_REGION_FILL) {
            engine.add_layer(
                LayerSpec {
                    id: LAYER_REGION_FILL.into(),
                    source: SOURCE_REGIONS.into(),
                    kind: LayerKind::Fill,
                    paint: Paint {
                        color: accent.gamma_multiply(0.18),
                        outline: accent.gamma_multiply(0.36),
                        stroke_width: 1.0,
                    },
                    id_filter: IdFilter::All,
                },
                Some(LAYER_CLUSTERS),
            );
        }
        if !engine.has_layer(LAYER_REGION_LINE) {
            engine.add_layer(
                LayerSpec {
                    id: LAYER_REGION_LINE.into(),
                    source: SOURCE_REGIONS.into(),
                    kind: LayerKind::Line,
                    paint: Paint {
                        color: accent.gamma_multiply(0.5),
                        outline: Color32::TRANSPARENT,
                        stroke_width: 1.6,
                    },
                    id_filter: IdFilter::All,
                },
                Some(LAYER_CLUSTERS),
            );
        }
        if !engine.has_layer(LAYER_REGION_HIGHLIGHT) {
            engine.add_layer(
                LayerSpec {
                    id: LAYER_REGION_HIGHLIGHT.into(),
                    source: SOURCE_REGIONS.into(),
                    kind: LayerKind::Line,
                    paint: Paint {
                        color: accent,
                        outline: Color32::TRANSPARENT,
                        stroke_width: 3.0,
                    },
                    id_filter: IdFilter::Nothing,
                },
                Some(LAYER_CLUSTERS),
            );
        }

        // Restore the click selection that survived the reload.
        let filter = match session.selected_polygon {
            Some(id) => IdFilter::Only(id),
            None => IdFilter::Nothing,
        };
        engine.set_highlight_filter(LAYER_REGION_HIGHLIGHT, filter);

        self.apply_visibility(engine);
        self.ensure_layer_order(engine);
    }

    fn apply_visibility(&self, engine: &mut dyn MapEngine) {
        for id in [LAYER_CLUSTERS, LAYER_CLUSTER_COUNT, LAYER_POINTS] {
            engine.set_layer_visible(id, self.state.points_visible);
        }
        for id in [LAYER_REGION_FILL, LAYER_REGION_LINE] {
            engine.set_layer_visible(id, self.state.polygons_visible);
        }
    }

    /// Keeps the point layers above everything else.
    fn ensure_layer_order(&self, engine: &mut dyn MapEngine) {
        for id in [LAYER_CLUSTERS, LAYER_CLUSTER_COUNT, LAYER_POINTS] {
            engine.move_layer_on_top(id);
        }
    }

    /// Shows or hides the parcel point layers.
    pub fn set_points_visible(&mut self, engine: &mut dyn MapEngine, visible: bool) {
        if self.state.points_visible == visible {
            return;
        }
        self.state.points_visible = visible;
        self.apply_visibility(engine);
        self.ensure_layer_order(engine);
    }

    /// Shows or hides the region polygon layers.
    pub fn set_polygons_visible(&mut self, engine: &mut dyn MapEngine, visible: bool) {
        if self.state.polygons_visible == visible {
            return;
        }
        self.state.polygons_visible = visible;
        self.apply_visibility(engine);
        self.ensure_layer_order(engine);
    }

    /// Switches between the flat and globe projection.
    pub fn set_projection(
        &mut self,
        engine: &mut dyn MapEngine,
        session: &mut MapSession,
        projection: Projection,
    ) {
        if self.state.projection == projection {
            return;
        }
        self.state.projection = projection;
        session.globe = projection == Projection::Globe;
        match projection {
            Projection::Globe => {
                engine.set_globe(true);
                engine.ease_to(CameraTarget {
                    pitch: Some(60.0),
                    bearing: Some(-20.0),
                    duration_ms: 1000,
                    ..Default::default()
                });
            }
            Projection::Flat => {
                engine.set_globe(false);
                engine.ease_to(CameraTarget {
                    pitch: Some(40.0),
                    bearing: Some(-10.0),
                    duration_ms: 800,
                    ..Default::default()
                });
            }
        }
    }

    /// Switches the basemap imagery, starting the reload sequence: fade out,
    /// swap style, re-attach on readiness, reapply visibility, fade in.
    ///
    /// A toggle back before the swap completes only retargets the in-flight
    /// transition; the existence guards in [`attach`](Self::attach) make the
    /// final re-attach idempotent.
    pub fn set_imagery(
        &mut self,
        engine: &mut dyn MapEngine,
        imagery: Imagery,
    ) {
        let in_flight = match &self.transition {
            StyleTransition::Idle => None,
            StyleTransition::Reloading { target, .. }
            | StyleTransition::Reattaching { target } => Some(*target),
        };
        // Only act when the target state actually changes.
        match in_flight {
            Some(target) if target == imagery => return,
            None if self.state.imagery == imagery => return,
            _ => {}
        }
        self.state.imagery = imagery;
        engine.set_fade(true);
        engine.set_basemap(imagery);
        self.transition = StyleTransition::Reloading {
            target: imagery,
            since: Instant::now(),
            retried: false,
        };
    }

    /// Advances the basemap reload sequence. Call once per frame.
    pub fn tick(&mut self, engine: &mut dyn MapEngine, session: &MapSession) {
        match &mut self.transition {
            StyleTransition::Idle => {}
            StyleTransition::Reloading {
                target,
                since,
                retried,
            } => {
                let target = *target;
                if engine.basemap_ready() {
                    self.transition = StyleTransition::Reattaching { target };
                } else if !*retried && since.elapsed() >= RELOAD_RETRY_DELAY {
                    // Readiness signals can fire early or not at all; ask for
                    // the style once more, then keep waiting.
                    debug!("Basemap not ready, re-requesting {target:?}");
                    *retried = true;
                    engine.set_basemap(target);
                } else if since.elapsed() >= RELOAD_GIVE_UP {
                    self.transition = StyleTransition::Reattaching { target };
                }
            }
            StyleTransition::Reattaching { .. } => {
                self.attach(engine, session);
                engine.set_fade(false);
                self.transition = StyleTransition::Idle;
            }
        }
    }

    /// Fits the camera to the loaded data, or to Germany when nothing loaded.
    pub fn fit_to_data(&self, engine: &mut dyn MapEngine, session: &MapSession) {
        let bounds = session.bounds.unwrap_or(GERMANY_BOUNDS);
        engine.fit_bounds(bounds, 50.0);
    }

    #[cfg(test)]
    fn backdate_transition(&mut self, by: Duration) {
        if let StyleTransition::Reloading { since, .. } = &mut self.transition {
            *since -= by;
        }
    }
}
