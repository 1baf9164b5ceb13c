//! Click and hover handling over the overlapping data layers.
//!
//! A single click can visually hit a parcel point, a cluster and a region
//! polygon at once. The resolution order is fixed: points win over clusters,
//! clusters win over polygons, so points are never occluded for selection
//! purposes (matching the layer stacking order).

use egui::Pos2;

use crate::data::{GeoBounds, JsonObject, revive_properties};
use crate::engine::{
    CameraTarget, IdFilter, LAYER_CLUSTER_COUNT, LAYER_CLUSTERS, LAYER_POINTS,
    LAYER_REGION_FILL, LAYER_REGION_HIGHLIGHT, MapEngine, SOURCE_POINTS,
};

/// Zoom floor when easing to a clicked marker in globe mode.
const GLOBE_MARKER_ZOOM: u8 = 9;

/// Interaction state threaded explicitly through the handlers.
///
/// Holds everything a handler needs to read "current" state, instead of
/// relying on mutable captured globals.
#[derive(Clone, Copy, Debug, Default)]
pub struct MapSession {
    /// Feature id of the click-selected polygon, if any.
    pub selected_polygon: Option<u64>,
    /// Feature id of the transiently hovered polygon, if any.
    pub hovered_polygon: Option<u64>,
    /// Whether the globe projection is active.
    pub globe: bool,
    /// Enclosing rectangle of the loaded data.
    pub bounds: Option<GeoBounds>,
}

/// The resolved outcome of a click.
#[derive(Clone, Debug, PartialEq)]
pub enum ClickOutcome {
    /// A point or polygon was selected; carries its revived property bag.
    Selected(JsonObject),
    /// A cluster was clicked; the camera is easing to its expansion zoom.
    ClusterExpanded,
    /// The click landed on empty map.
    Empty,
}

fn clear_selection(engine: &mut dyn MapEngine, session: &mut MapSession) {
    engine.set_highlight_filter(LAYER_REGION_HIGHLIGHT, IdFilter::Nothing);
    session.selected_polygon = None;
}

/// Resolves a click to exactly one outcome, with fixed priority
/// point > cluster > polygon.
pub fn resolve_click(
    engine: &mut dyn MapEngine,
    screen: Pos2,
    session: &mut MapSession,
) -> ClickOutcome {
    let hits = engine.query_rendered_features(
        screen,
        &[
            LAYER_POINTS,
            LAYER_CLUSTERS,
            LAYER_CLUSTER_COUNT,
            LAYER_REGION_FILL,
        ],
    );

    // 1) An unclustered point takes precedence; clusters and polygons under
    //    the same click are ignored.
    if let Some(hit) = hits.iter().find(|h| h.layer == LAYER_POINTS) {
        clear_selection(engine, session);
        let properties = revive_properties(&hit.properties);
        if session.globe {
            // On the globe, gently zoom towards the clicked marker.
            if let Some(pos) = hit.pos {
                engine.ease_to(CameraTarget {
                    center: Some(pos),
                    zoom: Some(engine.zoom().max(GLOBE_MARKER_ZOOM)),
                    duration_ms: 900,
                    ..Default::default()
                });
            }
        }
        return ClickOutcome::Selected(properties);
    }

    // 2) A cluster circle or its count label expands the cluster.
    if let Some(hit) = hits
        .iter()
        .find(|h| h.layer == LAYER_CLUSTERS || h.layer == LAYER_CLUSTER_COUNT)
    {
        clear_selection(engine, session);
        if let Some(cluster_id) = hit.cluster_id {
            if let Some(zoom) = engine.cluster_expansion_zoom(SOURCE_POINTS, cluster_id) {
                engine.ease_to(CameraTarget {
                    center: hit.pos,
                    zoom: Some(zoom),
                    duration_ms: 500,
                    ..Default::default()
                });
            }
        }
        return ClickOutcome::ClusterExpanded;
    }

    // 3) A polygon toggles its highlight and is emitted as the selection.
    if let Some(hit) = hits.iter().find(|h| h.layer == LAYER_REGION_FILL) {
        if let Some(feature_id) = hit.feature_id {
            if session.selected_polygon == Some(feature_id) {
                clear_selection(engine, session);
            } else {
                engine.set_highlight_filter(LAYER_REGION_HIGHLIGHT, IdFilter::Only(feature_id));
                session.selected_polygon = Some(feature_id);
            }
        }
        return ClickOutcome::Selected(revive_properties(&hit.properties));
    }

    ClickOutcome::Empty
}

/// Updates the transient hover highlight for the polygon under the pointer.
///
/// On pointer-leave the hover filter is cleared, reverting the visual to the
/// persisted click selection; the click-selection state itself is never
/// touched here.
pub fn resolve_hover(
    engine: &mut dyn MapEngine,
    pointer: Option<Pos2>,
    session: &mut MapSession,
) {
    let hovered = pointer.and_then(|pos| {
        engine
            .query_rendered_features(pos, &[LAYER_REGION_FILL])
            .first()
            .and_then(|hit| hit.feature_id)
    });
    if hovered == session.hovered_polygon {
        return;
    }
    session.hovered_polygon = hovered;
    let filter = match hovered {
        Some(id) => IdFilter::Only(id),
        None => IdFilter::Nothing,
    };
    engine.set_hover_filter(LAYER_REGION_HIGHLIGHT, filter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::engine::RenderedFeature;
    use crate::projection::GeoPos;
    use serde_json::json;

    fn props(pairs: &[(&str, &str)]) -> JsonObject {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn point_hit(name: &str) -> RenderedFeature {
        RenderedFeature {
            layer: LAYER_POINTS.into(),
            feature_id: None,
            cluster_id: None,
            properties: props(&[("lage", name)]),
            pos: Some(GeoPos { lon: 7.0, lat: 50.0 }),
        }
    }

    fn cluster_hit(cluster_id: u64) -> RenderedFeature {
        RenderedFeature {
            layer: LAYER_CLUSTERS.into(),
            feature_id: None,
            cluster_id: Some(cluster_id),
            properties: JsonObject::new(),
            pos: Some(GeoPos { lon: 8.0, lat: 49.0 }),
        }
    }

    fn polygon_hit(feature_id: u64, name: &str) -> RenderedFeature {
        RenderedFeature {
            layer: LAYER_REGION_FILL.into(),
            feature_id: Some(feature_id),
            cluster_id: None,
            properties: props(&[("bezeichnung", name)]),
            pos: None,
        }
    }

    fn click(engine: &mut MockEngine, session: &mut MapSession) -> ClickOutcome {
        resolve_click(engine, Pos2::new(100.0, 100.0), session)
    }

    #[test]
    fn point_wins_over_polygon_and_clears_highlight() {
        let mut engine =
            MockEngine::with_hits(vec![polygon_hit(3, "Mosel"), point_hit("Bernkastel")]);
        let mut session = MapSession {
            selected_polygon: Some(3),
            ..Default::default()
        };

        let outcome = click(&mut engine, &mut session);

        match outcome {
            ClickOutcome::Selected(props) => {
                assert_eq!(props.get("lage").unwrap(), &json!("Bernkastel"));
            }
            other => panic!("expected point selection, got {other:?}"),
        }
        assert_eq!(engine.highlight(LAYER_REGION_HIGHLIGHT), IdFilter::Nothing);
        assert_eq!(session.selected_polygon, None);
    }

    #[test]
    fn point_click_in_globe_mode_eases_to_marker() {
        let mut engine = MockEngine::with_hits(vec![point_hit("Bernkastel")]);
        let mut session = MapSession {
            globe: true,
            ..Default::default()
        };

        click(&mut engine, &mut session);

        let eased = engine.eased_to.last().unwrap();
        assert_eq!(eased.zoom, Some(9));
        assert_eq!(eased.center, Some(GeoPos { lon: 7.0, lat: 50.0 }));
        assert_eq!(eased.duration_ms, 900);
    }

    #[test]
    fn point_click_in_flat_mode_does_not_move_camera() {
        let mut engine = MockEngine::with_hits(vec![point_hit("Bernkastel")]);
        let mut session = MapSession::default();

        click(&mut engine, &mut session);

        assert!(engine.eased_to.is_empty());
    }

    #[test]
    fn cluster_wins_over_polygon_and_expands() {
        let mut engine =
            MockEngine::with_hits(vec![polygon_hit(3, "Mosel"), cluster_hit(42)]);
        engine.expansion_zoom = Some(11);
        let mut session = MapSession::default();

        let outcome = click(&mut engine, &mut session);

        assert_eq!(outcome, ClickOutcome::ClusterExpanded);
        let eased = engine.eased_to.last().unwrap();
        assert_eq!(eased.zoom, Some(11));
        assert_eq!(engine.highlight(LAYER_REGION_HIGHLIGHT), IdFilter::Nothing);
    }

    #[test]
    fn cluster_count_label_counts_as_cluster() {
        let mut hit = cluster_hit(42);
        hit.layer = LAYER_CLUSTER_COUNT.into();
        let mut engine = MockEngine::with_hits(vec![hit]);
        engine.expansion_zoom = Some(10);
        let mut session = MapSession::default();

        assert_eq!(click(&mut engine, &mut session), ClickOutcome::ClusterExpanded);
    }

    #[test]
    fn polygon_click_toggles_highlight() {
        let mut engine = MockEngine::with_hits(vec![polygon_hit(5, "Mosel")]);
        let mut session = MapSession::default();

        // First click selects.
        let outcome = click(&mut engine, &mut session);
        assert!(matches!(outcome, ClickOutcome::Selected(_)));
        assert_eq!(engine.highlight(LAYER_REGION_HIGHLIGHT), IdFilter::Only(5));
        assert_eq!(session.selected_polygon, Some(5));

        // Second click on the same polygon clears.
        click(&mut engine, &mut session);
        assert_eq!(engine.highlight(LAYER_REGION_HIGHLIGHT), IdFilter::Nothing);
        assert_eq!(session.selected_polygon, None);
    }

    #[test]
    fn clicking_a_second_polygon_moves_the_highlight() {
        let mut engine = MockEngine::with_hits(vec![polygon_hit(5, "Mosel")]);
        let mut session = MapSession::default();
        click(&mut engine, &mut session);

        engine.hits = vec![polygon_hit(7, "Rheingau")];
        click(&mut engine, &mut session);

        assert_eq!(engine.highlight(LAYER_REGION_HIGHLIGHT), IdFilter::Only(7));
        assert_eq!(session.selected_polygon, Some(7));
    }

    #[test]
    fn polygon_selection_revives_embedded_json() {
        let mut hit = polygon_hit(1, "Mosel");
        hit.properties
            .insert("details".into(), json!("{\"soil\":\"slate\"}"));
        let mut engine = MockEngine::with_hits(vec![hit]);
        let mut session = MapSession::default();

        match click(&mut engine, &mut session) {
            ClickOutcome::Selected(props) => {
                assert_eq!(props.get("details").unwrap(), &json!({"soil": "slate"}));
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[test]
    fn empty_click_is_a_no_op() {
        let mut engine = MockEngine::with_hits(vec![]);
        let mut session = MapSession {
            selected_polygon: Some(2),
            ..Default::default()
        };

        assert_eq!(click(&mut engine, &mut session), ClickOutcome::Empty);
        // An empty click leaves the existing selection alone.
        assert_eq!(session.selected_polygon, Some(2));
        assert!(engine.eased_to.is_empty());
    }

    #[test]
    fn hover_sets_and_reverts_transient_highlight() {
        let mut engine = MockEngine::with_hits(vec![polygon_hit(5, "Mosel")]);
        let mut session = MapSession::default();

        // Click-select polygon 5, then hover it and leave.
        click(&mut engine, &mut session);
        resolve_hover(&mut engine, Some(Pos2::new(10.0, 10.0)), &mut session);
        assert_eq!(
            engine.hover_filters.get(LAYER_REGION_HIGHLIGHT),
            Some(&IdFilter::Only(5))
        );

        resolve_hover(&mut engine, None, &mut session);
        assert_eq!(
            engine.hover_filters.get(LAYER_REGION_HIGHLIGHT),
            Some(&IdFilter::Nothing)
        );
        // The persisted click selection survives pointer-leave.
        assert_eq!(engine.highlight(LAYER_REGION_HIGHLIGHT), IdFilter::Only(5));
        assert_eq!(session.selected_polygon, Some(5));
    }
}
