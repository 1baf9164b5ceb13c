//! Vector overlays: point circles, cluster circles and labels, polygon fills
//! and outlines.

use egui::epaint::{PathShape, Vertex};
use egui::{Align2, Color32, FontId, Mesh, Painter, Pos2, Response, Shape, Stroke};
use geojson::{Feature, Value as GeoValue};
use std::any::Any;

use crate::engine::{IdFilter, LayerKind, LayerSpec, RenderedFeature};
use crate::layers::{Layer, SourceMap, point_in_ring};
use crate::projection::{GeoPos, MapProjection};
use crate::source::{Cluster, feature_id, feature_properties};

/// Radius of unclustered point markers in pixels.
const POINT_RADIUS: f32 = 6.0;
/// Extra slop around point markers when hit-testing.
const POINT_HIT_SLOP: f32 = 2.0;

/// Cluster circle radius, stepped by member count.
fn cluster_radius(count: usize) -> f32 {
    if count >= 750 {
        24.0
    } else if count >= 100 {
        18.0
    } else {
        12.0
    }
}

/// Abbreviates a cluster count for its label ("1234" becomes "1.2k").
fn format_count(count: usize) -> String {
    if count >= 1000 {
        format!("{:.1}k", count as f64 / 1000.0)
    } else {
        count.to_string()
    }
}

/// Extracts the polygon ring sets of a feature. The outer vec holds one entry
/// per polygon, each with its exterior ring first.
fn polygon_rings(feature: &Feature) -> Vec<&Vec<Vec<Vec<f64>>>> {
    match feature.geometry.as_ref().map(|g| &g.value) {
        Some(GeoValue::Polygon(rings)) => vec![rings],
        Some(GeoValue::MultiPolygon(polygons)) => polygons.iter().collect(),
        _ => Vec::new(),
    }
}

fn project_ring(ring: &[Vec<f64>], projection: &MapProjection) -> Option<Vec<Pos2>> {
    let mut screen = Vec::with_capacity(ring.len());
    for coord in ring {
        if coord.len() < 2 || !coord[0].is_finite() || !coord[1].is_finite() {
            // Malformed rings survive normalization; they are kept in the
            // source but never drawn.
            return None;
        }
        screen.push(projection.project(GeoPos {
            lon: coord[0],
            lat: coord[1],
        }));
    }
    Some(screen)
}

/// A visual layer rendering one registered source.
pub(crate) struct VectorLayer {
    pub spec: LayerSpec,
    pub visible: bool,
    /// Transient hover filter, drawn in addition to the spec's id filter.
    /// Defaults to matching nothing so plain layers rely on the spec alone.
    pub hover_filter: IdFilter,
}

impl VectorLayer {
    pub fn new(spec: LayerSpec) -> Self {
        Self {
            spec,
            visible: true,
            hover_filter: IdFilter::Nothing,
        }
    }

    fn passes(&self, id: Option<u64>) -> bool {
        self.spec.id_filter.matches(id) || self.hover_filter.matches(id)
    }

    fn draw_points(&self, painter: &Painter, projection: &MapProjection, clusters: &[Cluster]) {
        let stroke = Stroke::new(self.spec.paint.stroke_width, self.spec.paint.outline);
        for cluster in clusters.iter().filter(|c| c.count() == 1) {
            let pos = projection.project(cluster.pos);
            painter.circle(pos, POINT_RADIUS, self.spec.paint.color, stroke);
        }
    }

    fn draw_cluster_circles(
        &self,
        painter: &Painter,
        projection: &MapProjection,
        clusters: &[Cluster],
    ) {
        let stroke = Stroke::new(self.spec.paint.stroke_width, self.spec.paint.outline);
        for cluster in clusters.iter().filter(|c| c.count() >= 2) {
            let pos = projection.project(cluster.pos);
            // Bigger clusters get a slightly darker circle so the steps read
            // at a glance.
            let color = match cluster.count() {
                0..=99 => self.spec.paint.color,
                100..=749 => self.spec.paint.color.gamma_multiply(0.85),
                _ => self.spec.paint.color.gamma_multiply(0.7),
            };
            painter.circle(pos, cluster_radius(cluster.count()), color, stroke);
        }
    }

    fn draw_cluster_labels(
        &self,
        painter: &Painter,
        projection: &MapProjection,
        clusters: &[Cluster],
    ) {
        for cluster in clusters.iter().filter(|c| c.count() >= 2) {
            let pos = projection.project(cluster.pos);
            painter.text(
                pos,
                Align2::CENTER_CENTER,
                format_count(cluster.count()),
                FontId::proportional(12.0),
                self.spec.paint.color,
            );
        }
    }

    fn draw_fills(&self, painter: &Painter, projection: &MapProjection, features: &[Feature]) {
        let stroke = Stroke::new(self.spec.paint.stroke_width, self.spec.paint.outline);
        for feature in features {
            if !self.passes(feature_id(feature)) {
                continue;
            }
            for rings in polygon_rings(feature) {
                let Some(exterior) = rings.first() else {
                    continue;
                };
                let Some(screen_points) = project_ring(exterior, projection) else {
                    continue;
                };
                if screen_points.len() < 3 {
                    continue;
                }

                let flat_points: Vec<f64> = screen_points
                    .iter()
                    .flat_map(|p| [p.x as f64, p.y as f64])
                    .collect();
                let Ok(indices) = earcutr::earcut(&flat_points, &[], 2) else {
                    continue;
                };

                let mut mesh = Mesh::default();
                mesh.vertices = screen_points
                    .iter()
                    .map(|p| Vertex {
                        pos: *p,
                        uv: Default::default(),
                        color: self.spec.paint.color,
                    })
                    .collect();
                mesh.indices = indices.into_iter().map(|i| i as u32).collect();
                painter.add(Shape::Mesh(mesh.into()));

                if self.spec.paint.outline != Color32::TRANSPARENT {
                    painter.add(Shape::Path(PathShape {
                        points: screen_points,
                        closed: true,
                        fill: Color32::TRANSPARENT,
                        stroke: stroke.into(),
                    }));
                }
            }
        }
    }

    fn draw_lines(&self, painter: &Painter, projection: &MapProjection, features: &[Feature]) {
        let stroke = Stroke::new(self.spec.paint.stroke_width, self.spec.paint.color);
        for feature in features {
            if !self.passes(feature_id(feature)) {
                continue;
            }
            for rings in polygon_rings(feature) {
                for ring in rings.iter() {
                    let Some(screen_points) = project_ring(ring, projection) else {
                        continue;
                    };
                    if screen_points.len() < 2 {
                        continue;
                    }
                    painter.add(Shape::Path(PathShape {
                        points: screen_points,
                        closed: true,
                        fill: Color32::TRANSPARENT,
                        stroke: stroke.into(),
                    }));
                }
            }
        }
    }

    /// The rendered features of this layer intersecting a screen point.
    /// Hidden layers yield no hits.
    pub fn hit_test(
        &self,
        screen: Pos2,
        projection: &MapProjection,
        sources: &SourceMap,
    ) -> Vec<RenderedFeature> {
        if !self.visible {
            return Vec::new();
        }
        let Some(source) = sources.get(&self.spec.source) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        match self.spec.kind {
            LayerKind::CirclePoints => source.with_clusters(projection.zoom(), |clusters| {
                for cluster in clusters.iter().filter(|c| c.count() == 1) {
                    let pos = projection.project(cluster.pos);
                    if pos.distance(screen) <= POINT_RADIUS + POINT_HIT_SLOP {
                        let Some((geo, feature)) = source.point(cluster.members[0]) else {
                            continue;
                        };
                        hits.push(RenderedFeature {
                            layer: self.spec.id.clone(),
                            feature_id: feature_id(feature),
                            cluster_id: None,
                            properties: feature_properties(feature),
                            pos: Some(geo),
                        });
                    }
                }
            }),
            LayerKind::ClusterCircles => source.with_clusters(projection.zoom(), |clusters| {
                for cluster in clusters.iter().filter(|c| c.count() >= 2) {
                    let pos = projection.project(cluster.pos);
                    if pos.distance(screen) <= cluster_radius(cluster.count()) {
                        let mut properties = crate::data::JsonObject::new();
                        properties.insert("point_count".into(), cluster.count().into());
                        hits.push(RenderedFeature {
                            layer: self.spec.id.clone(),
                            feature_id: None,
                            cluster_id: Some(cluster.id),
                            properties,
                            pos: Some(cluster.pos),
                        });
                    }
                }
            }),
            LayerKind::Fill => {
                for feature in source.features() {
                    if !self.passes(feature_id(feature)) {
                        continue;
                    }
                    let contained = polygon_rings(feature).iter().any(|rings| {
                        rings.first().is_some_and(|exterior| {
                            project_ring(exterior, projection)
                                .is_some_and(|ring| point_in_ring(screen, &ring))
                        })
                    });
                    if contained {
                        hits.push(RenderedFeature {
                            layer: self.spec.id.clone(),
                            feature_id: feature_id(feature),
                            cluster_id: None,
                            properties: feature_properties(feature),
                            pos: None,
                        });
                    }
                }
            }
            // Labels and outlines are decoration over their circle and fill
            // counterparts.
            LayerKind::ClusterLabels | LayerKind::Line => {}
        }
        hits
    }
}

impl Layer for VectorLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, _response: &Response, _projection: &MapProjection) -> bool {
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection, sources: &SourceMap) {
        if !self.visible {
            return;
        }
        let Some(source) = sources.get(&self.spec.source) else {
            return;
        };

        match self.spec.kind {
            LayerKind::CirclePoints => source.with_clusters(projection.zoom(), |clusters| {
                self.draw_points(painter, projection, clusters);
            }),
            LayerKind::ClusterCircles => source.with_clusters(projection.zoom(), |clusters| {
                self.draw_cluster_circles(painter, projection, clusters);
            }),
            LayerKind::ClusterLabels => source.with_clusters(projection.zoom(), |clusters| {
                self.draw_cluster_labels(painter, projection, clusters);
            }),
            LayerKind::Fill => self.draw_fills(painter, projection, source.features()),
            LayerKind::Line => self.draw_lines(painter, projection, source.features()),
        }
    }
}
