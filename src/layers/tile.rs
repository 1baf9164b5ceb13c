//! The basemap tile layer.

use egui::{Painter, Response};
use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;

use crate::config::BasemapConfig;
use crate::layers::{Layer, SourceMap};
use crate::projection::MapProjection;
use crate::{Tile, TileId, draw_tile, load_tile, visible_tiles};

/// A layer that manages and renders basemap tiles.
///
/// Swapping the configuration drops every cached tile, which makes the swap
/// behave like a full style reload: [`ready`](TileLayer::ready) turns false
/// until the newly visible tiles have resolved.
pub(crate) struct TileLayer {
    tiles: HashMap<TileId, Tile>,
    visible: Vec<(TileId, egui::Pos2)>,
    config: Box<dyn BasemapConfig>,
    drawn_since_swap: Cell<bool>,
}

impl TileLayer {
    /// Creates a new tile layer with the given basemap configuration.
    pub fn new(config: Box<dyn BasemapConfig>) -> Self {
        Self {
            tiles: HashMap::new(),
            visible: Vec::new(),
            config,
            drawn_since_swap: Cell::new(false),
        }
    }

    /// The active basemap configuration.
    pub fn config(&self) -> &dyn BasemapConfig {
        self.config.as_ref()
    }

    /// Replaces the basemap configuration, dropping all cached tiles.
    pub fn set_config(&mut self, config: Box<dyn BasemapConfig>) {
        self.config = config;
        self.tiles.clear();
        self.visible.clear();
        self.drawn_since_swap.set(false);
    }

    /// Whether the current basemap has finished loading: at least one frame
    /// was drawn since the last swap and no visible tile is still downloading.
    pub fn ready(&self) -> bool {
        self.drawn_since_swap.get()
            && !self.visible.is_empty()
            && !self
                .visible
                .iter()
                .any(|(id, _)| matches!(self.tiles.get(id), Some(Tile::Loading(_)) | None))
    }
}

impl Layer for TileLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        self.visible = visible_tiles(projection).collect();
        for (tile_id, _) in &self.visible {
            load_tile(&mut self.tiles, self.config.as_ref(), &response.ctx, *tile_id);
        }
        false
    }

    fn draw(&self, painter: &Painter, _projection: &MapProjection, _sources: &SourceMap) {
        for (tile_id, tile_pos) in &self.visible {
            draw_tile(&self.tiles, painter, tile_id, *tile_pos);
        }
        self.drawn_since_swap.set(true);
    }
}
