#![warn(missing_docs)]

//! An interactive wine map widget for `egui`.
//!
//! The crate renders German wine parcels as clustered points and
//! international wine regions as polygons over a slippy tile basemap. The
//! [`Map`] widget is the rendering engine; it is driven through the
//! [`MapEngine`](engine::MapEngine) command surface by the view controller
//! and the click disambiguator, which makes the interaction logic testable
//! without a window.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use weinkarte::app::WineMapApp;
//!
//! fn main() -> eframe::Result {
//!     let app = WineMapApp::new(
//!         std::env::var("MAPTILER_API_KEY").ok(),
//!         "https://example.com/data".to_string(),
//!     );
//!     eframe::run_native(
//!         "Weinkarte",
//!         eframe::NativeOptions::default(),
//!         Box::new(|_cc| Ok(Box::new(app))),
//!     )
//! }
//! ```

/// The application shell: panels, search, info card, data loading.
pub mod app;
/// Basemap tile server configuration.
pub mod config;
/// Data loading and normalization.
pub mod data;
/// The command surface of the map engine.
pub mod engine;
/// Click and hover disambiguation.
pub mod interaction;
/// Map projection between geographical and screen coordinates.
pub mod projection;
/// Grape variety search over the region index.
pub mod search;
/// Layer visibility, projection mode and imagery control.
pub mod view_state;

mod layers;
mod source;

use eframe::egui;
use egui::{Color32, Pos2, Rect, Response, Sense, Ui, Vec2, Widget, pos2};
use eyre::{Context as _, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{BasemapConfig, basemap_for};
use crate::data::GeoBounds;
use crate::engine::{
    CameraTarget, IdFilter, Imagery, LayerSpec, MapEngine, Paint, RenderedFeature,
};
use crate::layers::tile::TileLayer;
use crate::layers::vector::VectorLayer;
use crate::layers::{Layer, SourceMap};
use crate::projection::{GeoPos, MapProjection, lat_to_y, lon_to_x, x_to_lon, y_to_lat};
use crate::source::GeoSource;

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

// How fast the data layer fade animates, in alpha per second.
const FADE_SPEED: f32 = 4.0;

// Reuse the reqwest client for all downloads by making it a static variable.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

impl TileId {
    fn to_url(&self, config: &dyn BasemapConfig) -> String {
        config.tile_url(self)
    }
}

/// The state of a tile in the cache.
pub(crate) enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// Starts or finishes the download of a single tile.
pub(crate) fn load_tile(
    tiles: &mut HashMap<TileId, Tile>,
    config: &dyn BasemapConfig,
    ctx: &egui::Context,
    tile_id: TileId,
) {
    let tile_state = tiles.entry(tile_id).or_insert_with(|| {
        let url = tile_id.to_url(config);
        let promise =
            Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
                let result: Result<_, eyre::Report> = (|| {
                    debug!("Downloading tile from {}", &url);
                    let response = CLIENT.get(&url).send().map_err(MapError::from)?;

                    if !response.status().is_success() {
                        return Err(MapError::TileDownloadError(response.status().to_string()));
                    }

                    let bytes = response.bytes().map_err(MapError::from)?.to_vec();
                    let image = image::load_from_memory(&bytes)
                        .map_err(MapError::from)?
                        .to_rgba8();

                    let size = [image.width() as _, image.height() as _];
                    let pixels = image.into_raw();
                    Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
                })()
                .with_context(|| format!("Failed to download tile from {}", &url));

                result.map_err(Arc::new)
            });
        Tile::Loading(promise)
    });

    // Resolve a finished download into a texture right away, so the tile can
    // be drawn in the same frame.
    if let Tile::Loading(promise) = tile_state {
        if let Some(result) = promise.ready() {
            match result {
                Ok(color_image) => {
                    let texture = ctx.load_texture(
                        format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                        color_image.clone(),
                        Default::default(),
                    );
                    *tile_state = Tile::Loaded(texture);
                }
                Err(e) => {
                    error!("{:?}", e);
                    *tile_state = Tile::Failed(e.clone());
                }
            }
        }
    }
}

/// Draws a single map tile, or a placeholder while it loads.
pub(crate) fn draw_tile(
    tiles: &HashMap<TileId, Tile>,
    painter: &egui::Painter,
    tile_id: &TileId,
    tile_pos: Pos2,
) {
    let tile_rect = Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

    match tiles.get(tile_id) {
        None | Some(Tile::Loading(_)) => {
            painter.rect_filled(tile_rect, 0.0, Color32::from_gray(25));
            painter.rect_stroke(
                tile_rect,
                0.0,
                egui::Stroke::new(1.0, Color32::from_gray(45)),
                egui::StrokeKind::Inside,
            );

            // The tile is still loading, so we need to tell egui to repaint.
            painter.ctx().request_repaint();
        }
        Some(Tile::Loaded(texture)) => {
            painter.image(
                texture.id(),
                tile_rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        Some(Tile::Failed(_)) => {
            painter.rect_filled(tile_rect, 0.0, Color32::from_gray(25));
            painter.text(
                tile_rect.center(),
                egui::Align2::CENTER_CENTER,
                "!",
                egui::FontId::proportional(40.0),
                Color32::DARK_RED,
            );
        }
    }
}

/// Returns an iterator over the tiles visible through the given projection.
pub(crate) fn visible_tiles(
    projection: &MapProjection,
) -> impl Iterator<Item = (TileId, Pos2)> + use<> {
    let zoom = projection.zoom();
    let rect = projection.rect();
    let center = projection.center();
    let center_x = lon_to_x(center.lon, zoom);
    let center_y = lat_to_y(center.lat, zoom);

    let widget_center_x = rect.width() / 2.0;
    let widget_center_y = rect.height() / 2.0;

    let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i64;
    let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i64;
    let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i64;
    let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i64;

    let world_size = 1_i64 << zoom;
    let rect_min = rect.min;
    (x_min..=x_max).flat_map(move |x| {
        (y_min..=y_max).filter_map(move |y| {
            // Tiles outside the world are left blank.
            if x < 0 || y < 0 || x >= world_size || y >= world_size {
                return None;
            }
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
            let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
            Some((tile_id, rect_min + Vec2::new(screen_x, screen_y)))
        })
    })
}

/// An in-flight camera animation.
struct CameraAnim {
    from_center: GeoPos,
    to_center: GeoPos,
    from_zoom: f64,
    to_zoom: f64,
    from_pitch: f32,
    to_pitch: f32,
    from_bearing: f32,
    to_bearing: f32,
    start: Instant,
    duration: Duration,
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// The map widget.
///
/// Rendering state lives here; everything above it (controller, interaction)
/// drives the widget through [`MapEngine`].
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    /// Camera tilt in degrees. Purely a presentation value for the globe and
    /// flat view modes.
    pub pitch: f32,

    /// Camera bearing in degrees.
    pub bearing: f32,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    api_key: String,
    imagery: Imagery,
    basemap: TileLayer,
    sources: SourceMap,
    layers: Vec<VectorLayer>,

    fade_target: bool,
    fade_alpha: f32,
    globe: bool,
    camera_anim: Option<CameraAnim>,
    last_rect: Option<Rect>,
}

impl Map {
    /// Creates a new `Map` widget with the stylized basemap.
    pub fn new(api_key: String) -> Self {
        let config = basemap_for(Imagery::default(), &api_key);
        let center = config.default_center().into();
        let zoom = config.default_zoom();
        Self {
            center,
            zoom,
            pitch: 40.0,
            bearing: -10.0,
            mouse_pos: None,
            api_key,
            imagery: Imagery::default(),
            basemap: TileLayer::new(config),
            sources: SourceMap::new(),
            layers: Vec::new(),
            fade_target: false,
            fade_alpha: 0.0,
            globe: false,
            camera_anim: None,
            last_rect: None,
        }
    }

    /// The active imagery mode.
    pub fn imagery(&self) -> Imagery {
        self.imagery
    }

    fn projection(&self, rect: Rect) -> MapProjection {
        MapProjection::new(self.zoom, self.center, rect)
    }

    fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.spec.id == id)
    }

    /// Advances the running camera animation, if any.
    fn advance_camera(&mut self, ui: &Ui) {
        let Some(anim) = &self.camera_anim else {
            return;
        };
        let t = if anim.duration.is_zero() {
            1.0
        } else {
            (anim.start.elapsed().as_secs_f64() / anim.duration.as_secs_f64()).min(1.0)
        };
        let s = smoothstep(t);

        // Interpolate the center in Mercator space so long moves track
        // straight lines on screen.
        let from_x = lon_to_x(anim.from_center.lon, 0);
        let from_y = lat_to_y(anim.from_center.lat, 0);
        let to_x = lon_to_x(anim.to_center.lon, 0);
        let to_y = lat_to_y(anim.to_center.lat, 0);
        self.center = GeoPos {
            lon: x_to_lon(from_x + (to_x - from_x) * s, 0),
            lat: y_to_lat(from_y + (to_y - from_y) * s, 0),
        };
        let zoom = anim.from_zoom + (anim.to_zoom - anim.from_zoom) * s;
        self.zoom = (zoom.round() as i64).clamp(MIN_ZOOM as i64, MAX_ZOOM as i64) as u8;
        self.pitch = anim.from_pitch + (anim.to_pitch - anim.from_pitch) * s as f32;
        self.bearing = anim.from_bearing + (anim.to_bearing - anim.from_bearing) * s as f32;

        if t >= 1.0 {
            self.camera_anim = None;
        } else {
            ui.ctx().request_repaint();
        }
    }

    fn advance_fade(&mut self, ui: &Ui) {
        let target = if self.fade_target { 1.0 } else { 0.0 };
        if (self.fade_alpha - target).abs() < f32::EPSILON {
            return;
        }
        let dt = ui.input(|i| i.stable_dt).min(0.1);
        let step = FADE_SPEED * dt;
        if self.fade_alpha < target {
            self.fade_alpha = (self.fade_alpha + step).min(target);
        } else {
            self.fade_alpha = (self.fade_alpha - step).max(target);
        }
        ui.ctx().request_repaint();
    }

    /// Handles user input for panning and zooming.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        // Handle panning
        if response.dragged() {
            // Dragging takes the camera away from any running animation.
            self.camera_anim = None;

            let delta = response.drag_delta();
            let center_in_tiles_x = lon_to_x(self.center.lon, self.zoom);
            let center_in_tiles_y = lat_to_y(self.center.lat, self.zoom);

            let mut new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
            let mut new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

            // Clamp the new center to the map boundaries.
            let world_size_in_tiles = 2.0_f64.powi(self.zoom as i32);
            let view_size_in_tiles_x = rect.width() as f64 / TILE_SIZE as f64;
            let view_size_in_tiles_y = rect.height() as f64 / TILE_SIZE as f64;

            let min_center_x = view_size_in_tiles_x / 2.0;
            let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
            let min_center_y = view_size_in_tiles_y / 2.0;
            let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

            // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
            new_center_x = if min_center_x > max_center_x {
                world_size_in_tiles / 2.0
            } else {
                new_center_x.clamp(min_center_x, max_center_x)
            };
            new_center_y = if min_center_y > max_center_y {
                world_size_in_tiles / 2.0
            } else {
                new_center_y.clamp(min_center_y, max_center_y)
            };

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, self.zoom),
                lat: y_to_lat(new_center_y, self.zoom),
            };
        }

        // Handle double-click to zoom and center
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom = (self.zoom + 1).clamp(MIN_ZOOM, MAX_ZOOM);

                if new_zoom != self.zoom {
                    let target = self.projection(*rect).unproject(pointer_pos);
                    self.camera_anim = None;
                    self.zoom = new_zoom;
                    self.center = target;
                }
            }
        }

        // Handle zooming and mouse position
        if response.hovered() {
            if let Some(mouse_pos) = response.hover_pos() {
                let target = self.projection(*rect).unproject(mouse_pos);
                self.mouse_pos = Some(target);

                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    let old_zoom = self.zoom;
                    let mut new_zoom = (self.zoom as i32 + scroll.signum() as i32)
                        .clamp(MIN_ZOOM as i32, MAX_ZOOM as i32)
                        as u8;

                    // If we are zooming out, check if the new zoom level is valid.
                    if scroll < 0.0 {
                        let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
                        // If the world size would become smaller than the widget size, reject the zoom.
                        if world_pixel_size < rect.width() as f64
                            || world_pixel_size < rect.height() as f64
                        {
                            new_zoom = old_zoom;
                        }
                    }

                    if new_zoom != old_zoom {
                        self.camera_anim = None;

                        let mouse_rel = mouse_pos - rect.min;
                        let widget_center_x = rect.width() as f64 / 2.0;
                        let widget_center_y = rect.height() as f64 / 2.0;

                        // Adjust the map center so the geo-coordinate under
                        // the mouse remains the same.
                        let new_target_x = lon_to_x(target.lon, new_zoom);
                        let new_target_y = lat_to_y(target.lat, new_zoom);

                        let new_center_x = new_target_x
                            - (mouse_rel.x as f64 - widget_center_x) / TILE_SIZE as f64;
                        let new_center_y = new_target_y
                            - (mouse_rel.y as f64 - widget_center_y) / TILE_SIZE as f64;

                        self.zoom = new_zoom;
                        self.center = GeoPos {
                            lon: x_to_lon(new_center_x, new_zoom),
                            lat: y_to_lat(new_center_y, new_zoom),
                        };
                    }
                }
            } else {
                self.mouse_pos = None;
            }
        } else {
            self.mouse_pos = None;
        }
    }

    /// Draws the basemap, the vector layers and the attribution.
    fn draw_map(&mut self, ui: &mut Ui, rect: &Rect) {
        let painter = ui.painter_at(*rect);
        painter.rect_filled(*rect, 0.0, Color32::from_gray(15)); // Background

        let projection = self.projection(*rect);
        self.basemap.draw(&painter, &projection, &self.sources);

        let mut vector_painter = painter.clone();
        vector_painter.set_opacity(1.0 - self.fade_alpha);
        for layer in &self.layers {
            layer.draw(&vector_painter, &projection, &self.sources);
        }

        if self.globe {
            self.draw_atmosphere(&painter, rect);
        }

        self.draw_attribution(ui, rect);
    }

    /// A soft atmosphere rim around the viewport for the globe view.
    fn draw_atmosphere(&self, painter: &egui::Painter, rect: &Rect) {
        let rim = Color32::from_rgba_unmultiplied(60, 110, 200, 28);
        for i in 0..4 {
            let inset = i as f32 * 3.0;
            painter.rect_stroke(
                rect.shrink(inset),
                0.0,
                egui::Stroke::new(6.0, rim),
                egui::StrokeKind::Inside,
            );
        }
    }

    /// Draws the attribution text.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        if let Some(attribution) = self.basemap.config().attribution() {
            let bg_color = if ui.visuals().dark_mode {
                Color32::from_black_alpha(150)
            } else {
                Color32::from_white_alpha(150)
            };

            let frame = egui::Frame::NONE
                .inner_margin(egui::Margin::same(5))
                .fill(bg_color)
                .corner_radius(3.0);

            egui::Area::new(ui.id().with("attribution"))
                .fixed_pos(rect.left_bottom())
                .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
                .show(ui.ctx(), |ui| {
                    frame.show(ui, |ui| {
                        ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                        ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);

                        if let Some(url) = self.basemap.config().attribution_url() {
                            ui.hyperlink_to(attribution, url);
                        } else {
                            ui.label(attribution);
                        }
                    });
                });
        }
    }
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));
        self.last_rect = Some(rect);

        self.advance_camera(ui);
        self.advance_fade(ui);
        self.handle_input(ui, &rect, &response);

        let projection = self.projection(rect);
        self.basemap.handle_input(&response, &projection);

        self.draw_map(ui, &rect);

        response
    }
}

impl MapEngine for Map {
    fn add_geojson_source(
        &mut self,
        id: &str,
        collection: geojson::FeatureCollection,
        clustered: bool,
    ) {
        if self.sources.contains_key(id) {
            debug!("source {id} already registered, keeping the existing copy");
            return;
        }
        self.sources
            .insert(id.to_string(), GeoSource::new(collection, clustered));
    }

    fn remove_source(&mut self, id: &str) {
        self.sources.remove(id);
        self.layers.retain(|layer| layer.spec.source != id);
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) {
        if self.layer_index(&spec.id).is_some() {
            debug!("layer {} already registered", spec.id);
            return;
        }
        let layer = VectorLayer::new(spec);
        match before.and_then(|id| self.layer_index(id)) {
            Some(index) => self.layers.insert(index, layer),
            None => self.layers.push(layer),
        }
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer_index(id).is_some()
    }

    fn set_layer_visible(&mut self, id: &str, visible: bool) {
        match self.layer_index(id) {
            Some(index) => self.layers[index].visible = visible,
            None => debug!("set_layer_visible: no layer {id}"),
        }
    }

    fn set_layer_paint(&mut self, id: &str, paint: Paint) {
        match self.layer_index(id) {
            Some(index) => self.layers[index].spec.paint = paint,
            None => debug!("set_layer_paint: no layer {id}"),
        }
    }

    fn move_layer_on_top(&mut self, id: &str) {
        if let Some(index) = self.layer_index(id) {
            let layer = self.layers.remove(index);
            self.layers.push(layer);
        }
    }

    fn set_highlight_filter(&mut self, id: &str, filter: IdFilter) {
        match self.layer_index(id) {
            Some(index) => self.layers[index].spec.id_filter = filter,
            None => debug!("set_highlight_filter: no layer {id}"),
        }
    }

    fn set_hover_filter(&mut self, id: &str, filter: IdFilter) {
        match self.layer_index(id) {
            Some(index) => self.layers[index].hover_filter = filter,
            None => debug!("set_hover_filter: no layer {id}"),
        }
    }

    fn query_rendered_features(&self, screen: Pos2, layer_ids: &[&str]) -> Vec<RenderedFeature> {
        let Some(rect) = self.last_rect else {
            return Vec::new();
        };
        let projection = self.projection(rect);
        // Topmost layer first, matching the draw order.
        self.layers
            .iter()
            .rev()
            .filter(|layer| layer_ids.contains(&layer.spec.id.as_str()))
            .flat_map(|layer| layer.hit_test(screen, &projection, &self.sources))
            .collect()
    }

    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Option<u8> {
        self.sources
            .get(source)?
            .expansion_zoom(cluster_id, self.zoom)
    }

    fn ease_to(&mut self, target: CameraTarget) {
        let anim = CameraAnim {
            from_center: self.center,
            to_center: target.center.unwrap_or(self.center),
            from_zoom: self.zoom as f64,
            to_zoom: target.zoom.unwrap_or(self.zoom) as f64,
            from_pitch: self.pitch,
            to_pitch: target.pitch.unwrap_or(self.pitch),
            from_bearing: self.bearing,
            to_bearing: target.bearing.unwrap_or(self.bearing),
            start: Instant::now(),
            duration: Duration::from_millis(target.duration_ms),
        };
        if anim.duration.is_zero() {
            self.center = anim.to_center;
            self.zoom = (anim.to_zoom.round() as i64).clamp(MIN_ZOOM as i64, MAX_ZOOM as i64) as u8;
            self.pitch = anim.to_pitch;
            self.bearing = anim.to_bearing;
            self.camera_anim = None;
        } else {
            self.camera_anim = Some(anim);
        }
    }

    fn fit_bounds(&mut self, bounds: GeoBounds, padding: f32) {
        let rect = self.last_rect.unwrap_or(Rect::from_min_size(
            pos2(0.0, 0.0),
            egui::vec2(800.0, 600.0),
        ));
        let avail_w = (rect.width() - 2.0 * padding).max(1.0) as f64;
        let avail_h = (rect.height() - 2.0 * padding).max(1.0) as f64;

        let mut fit_zoom = MIN_ZOOM;
        for zoom in (MIN_ZOOM..=MAX_ZOOM).rev() {
            let width_px =
                (lon_to_x(bounds.max.lon, zoom) - lon_to_x(bounds.min.lon, zoom)) * TILE_SIZE as f64;
            // Mercator y grows southwards, so the southern edge is the larger y.
            let height_px =
                (lat_to_y(bounds.min.lat, zoom) - lat_to_y(bounds.max.lat, zoom)) * TILE_SIZE as f64;
            if width_px <= avail_w && height_px <= avail_h {
                fit_zoom = zoom;
                break;
            }
        }

        let center = GeoPos {
            lon: (bounds.min.lon + bounds.max.lon) / 2.0,
            lat: (bounds.min.lat + bounds.max.lat) / 2.0,
        };
        self.ease_to(CameraTarget {
            center: Some(center),
            zoom: Some(fit_zoom),
            duration_ms: 600,
            ..Default::default()
        });
    }

    fn zoom(&self) -> u8 {
        self.zoom
    }

    fn set_basemap(&mut self, imagery: Imagery) {
        self.imagery = imagery;
        self.basemap.set_config(basemap_for(imagery, &self.api_key));
        // Swapping the basemap drops everything registered on top of it, the
        // same way a style reload would.
        self.sources.clear();
        self.layers.clear();
    }

    fn basemap_ready(&self) -> bool {
        self.basemap.ready()
    }

    fn set_fade(&mut self, faded: bool) {
        self.fade_target = faded;
    }

    fn set_globe(&mut self, enabled: bool) {
        self.globe = enabled;
    }
}
