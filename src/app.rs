//! The viewer application: control panel, grape search, info card and the
//! map itself.

use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use egui::{RichText, Ui};
use poll_promise::Promise;
use serde_json::Value;

use crate::Map;
use crate::data::{DatasetStatus, JsonObject, WineData, fetch_wine_data};
use crate::engine::{CameraTarget, Imagery, MapEngine};
use crate::interaction::{ClickOutcome, MapSession, resolve_click, resolve_hover};
use crate::search::{Region, search};
use crate::view_state::{Projection, ViewController};

/// Duration of the fly-to animation when a search result is picked.
const SEARCH_FLY_DURATION_MS: u64 = 1200;

/// Property keys tried in order for the info card title.
const TITLE_FIELDS: [&str; 4] = ["bezeichnung", "label", "name", "lage"];

/// Curated property fields shown on the info card, with their labels.
const INFO_FIELDS: [(&str, &str); 10] = [
    ("land_bezeichnung", "Land"),
    ("bundesland", "Bundesland"),
    ("anbauName", "Anbaugebiet"),
    ("lage", "Lage"),
    ("gemeinde", "Gemeinde"),
    ("rebsorten", "Rebsorten"),
    ("winzer", "Winzer"),
    ("weine", "Weine"),
    ("flaeche", "Fläche"),
    ("area", "Fläche"),
];

/// Whether a property value carries something worth displaying. Upstream
/// records use several spellings of "nothing here".
fn is_displayable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s != "null" && s != "undefined" && s != "[]" && s != "{}"
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// The info card title, falling back through the known name fields.
fn info_title(properties: &JsonObject) -> String {
    TITLE_FIELDS
        .iter()
        .filter_map(|key| properties.get(*key))
        .filter_map(|value| value.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Feature".to_string())
}

/// Pulls the first `<a href="...">text</a>` out of an HTML snippet. Some
/// records embed a source link inside their info text.
fn extract_link(html: &str) -> Option<(String, String)> {
    let href_start = html.find("href=\"")? + "href=\"".len();
    let href_end = href_start + html[href_start..].find('"')?;
    let url = html[href_start..href_end].to_string();

    let text_start = href_end + html[href_end..].find('>')? + 1;
    let text_end = text_start + html[text_start..].find("</a>")?;
    let text = html[text_start..text_end].trim().to_string();

    let text = if text.is_empty() { url.clone() } else { text };
    Some((text, url))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// The wine map viewer.
pub struct WineMapApp {
    map: Option<Map>,
    controller: ViewController,
    session: MapSession,
    data_promise: Option<Promise<WineData>>,
    status: Option<DatasetStatus>,
    regions: Vec<Region>,
    selected: Option<JsonObject>,
    search_term: String,
}

impl WineMapApp {
    /// Creates the viewer and starts loading both dataset files.
    ///
    /// Without an API key no map is constructed and the viewer shows a static
    /// hint instead.
    pub fn new(api_key: Option<String>, data_base_url: String) -> Self {
        let map = api_key
            .filter(|key| !key.trim().is_empty())
            .map(Map::new);
        Self {
            map,
            controller: ViewController::new(),
            session: MapSession::default(),
            data_promise: Some(fetch_wine_data(&data_base_url)),
            status: None,
            regions: Vec::new(),
            selected: None,
            search_term: String::new(),
        }
    }

    fn poll_data(&mut self, ctx: &egui::Context) {
        let Some(promise) = self.data_promise.take() else {
            return;
        };
        match promise.try_take() {
            Ok(data) => {
                self.status = Some(data.status);
                self.regions = data.region_index.clone();
                self.session.bounds = data.bounds;
                if let Some(map) = self.map.as_mut() {
                    self.controller
                        .set_data(map, &self.session, Arc::new(data));
                    self.controller.fit_to_data(map, &self.session);
                }
                ctx.request_repaint();
            }
            Err(promise) => {
                self.data_promise = Some(promise);
                ctx.request_repaint_after(Duration::from_millis(100));
            }
        }
    }

    fn status_line(&self) -> String {
        match &self.status {
            Some(status) => format!(
                "Points: {} | Polygons: {}",
                status.points, status.polygon_items
            ),
            None => "Loading...".to_string(),
        }
    }

    fn controls_ui(&mut self, ui: &mut Ui) {
        ui.heading("Weinkarte");
        ui.label(RichText::new(self.status_line()).small());
        ui.separator();

        let Some(map) = self.map.as_mut() else {
            return;
        };
        let state = self.controller.state();

        let mut points = state.points_visible;
        if ui.checkbox(&mut points, "Weinlagen").changed() {
            self.controller.set_points_visible(map, points);
        }
        let mut polygons = state.polygons_visible;
        if ui.checkbox(&mut polygons, "Anbaugebiete").changed() {
            self.controller.set_polygons_visible(map, polygons);
        }

        ui.separator();
        ui.horizontal(|ui| {
            let mut projection = state.projection;
            ui.selectable_value(&mut projection, Projection::Flat, "Karte");
            ui.selectable_value(&mut projection, Projection::Globe, "Globus");
            if projection != state.projection {
                self.controller
                    .set_projection(map, &mut self.session, projection);
            }
        });
        ui.horizontal(|ui| {
            let mut imagery = state.imagery;
            ui.selectable_value(&mut imagery, Imagery::Stylized, "Stilisiert");
            ui.selectable_value(&mut imagery, Imagery::Satellite, "Satellit");
            if imagery != state.imagery {
                self.controller.set_imagery(map, imagery);
            }
        });

        if ui.button("Auf Daten zoomen").clicked() {
            self.controller.fit_to_data(map, &self.session);
        }

        ui.separator();
        ui.label("Rebsortensuche");
        ui.text_edit_singleline(&mut self.search_term);
        let results = search(&self.search_term, &self.regions);
        if !self.search_term.trim().is_empty() && results.is_empty() {
            ui.label(RichText::new("Keine Treffer").weak());
        }
        egui::ScrollArea::vertical()
            .max_height(200.0)
            .show(ui, |ui| {
                for region in results {
                    let label = match &region.land {
                        Some(land) => format!("{} ({})", region.bezeichnung, land),
                        None => region.bezeichnung.clone(),
                    };
                    if ui.button(label).clicked() {
                        if let Some((center, zoom)) = region.fly_target() {
                            map.ease_to(CameraTarget {
                                center: Some(center),
                                zoom: Some(zoom),
                                duration_ms: SEARCH_FLY_DURATION_MS,
                                ..Default::default()
                            });
                        }
                    }
                }
            });

        if self.selected.is_some() {
            ui.separator();
            self.info_card_ui(ui);
        }
    }

    fn info_card_ui(&mut self, ui: &mut Ui) {
        let Some(properties) = self.selected.clone() else {
            return;
        };
        let mut close = false;
        ui.horizontal(|ui| {
            ui.heading(info_title(&properties));
            if ui.small_button("x").clicked() {
                close = true;
            }
        });
        if close {
            self.selected = None;
            return;
        }

        for (key, label) in INFO_FIELDS {
            let Some(value) = properties.get(key) else {
                continue;
            };
            if !is_displayable(value) {
                continue;
            }
            ui.horizontal_wrapped(|ui| {
                ui.label(RichText::new(format!("{label}:")).strong());
                ui.label(display_value(value));
            });
        }

        // Info texts come as HTML fragments; show the contained link when
        // there is one, the raw text otherwise.
        for key in ["info", "infos"] {
            let Some(text) = properties.get(key).and_then(|v| v.as_str()) else {
                continue;
            };
            if !is_displayable(&Value::String(text.to_string())) {
                continue;
            }
            match extract_link(text) {
                Some((label, url)) => {
                    ui.hyperlink_to(label, url);
                }
                None => {
                    ui.label(text);
                }
            }
        }
    }

    fn map_ui(&mut self, ui: &mut Ui) {
        let Some(map) = self.map.as_mut() else {
            ui.centered_and_justified(|ui| {
                ui.label(
                    "Kein MapTiler-API-Schlüssel gesetzt.\n\
                     Setze MAPTILER_API_KEY und starte die Anwendung neu.",
                );
            });
            return;
        };

        let response = ui.add(&mut *map);

        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                match resolve_click(map, pos, &mut self.session) {
                    ClickOutcome::Selected(properties) => self.selected = Some(properties),
                    ClickOutcome::ClusterExpanded | ClickOutcome::Empty => {}
                }
            }
        }
        resolve_hover(map, response.hover_pos(), &mut self.session);

        self.controller.tick(map, &self.session);
    }
}

impl eframe::App for WineMapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_data(ctx);

        egui::SidePanel::left("controls")
            .default_width(260.0)
            .show(ctx, |ui| self.controls_ui(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.map_ui(ui));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_info_title_fallback_order() {
        assert_eq!(
            info_title(&props(json!({"bezeichnung": "Mosel", "name": "x"}))),
            "Mosel"
        );
        assert_eq!(info_title(&props(json!({"name": "Rheingau"}))), "Rheingau");
        assert_eq!(info_title(&props(json!({"lage": "Doctor"}))), "Doctor");
        // Blank values fall through to the next candidate.
        assert_eq!(
            info_title(&props(json!({"bezeichnung": "  ", "label": "Pfalz"}))),
            "Pfalz"
        );
        assert_eq!(info_title(&props(json!({"other": 1}))), "Feature");
    }

    #[test]
    fn test_is_displayable_rejects_empty_spellings() {
        for empty in ["", "  ", "null", "undefined", "[]", "{}"] {
            assert!(!is_displayable(&json!(empty)), "{empty:?}");
        }
        assert!(!is_displayable(&Value::Null));
        assert!(!is_displayable(&json!([])));
        assert!(is_displayable(&json!("Riesling")));
        assert!(is_displayable(&json!(42)));
        assert!(is_displayable(&json!(["a"])));
    }

    #[test]
    fn test_extract_link() {
        let html = r#"Mehr unter <a href="https://example.com/wein">Weininfo</a>."#;
        assert_eq!(
            extract_link(html),
            Some(("Weininfo".to_string(), "https://example.com/wein".to_string()))
        );
        // Empty anchor text falls back to the URL.
        let bare = r#"<a href="https://example.com"></a>"#;
        assert_eq!(
            extract_link(bare),
            Some(("https://example.com".to_string(), "https://example.com".to_string()))
        );
        assert_eq!(extract_link("kein Link"), None);
    }

    #[test]
    fn test_display_value_joins_arrays() {
        assert_eq!(display_value(&json!("  Riesling ")), "Riesling");
        assert_eq!(
            display_value(&json!(["Riesling", "Spätburgunder"])),
            "Riesling, Spätburgunder"
        );
        assert_eq!(display_value(&json!(12.5)), "12.5");
    }

    #[test]
    fn test_app_without_key_has_no_map() {
        let app = WineMapApp::new(None, "http://localhost".to_string());
        assert!(app.map.is_none());
        let app = WineMapApp::new(Some("  ".to_string()), "http://localhost".to_string());
        assert!(app.map.is_none());
    }

    #[test]
    fn test_status_line() {
        let mut app = WineMapApp::new(None, "http://localhost".to_string());
        assert_eq!(app.status_line(), "Loading...");
        app.status = Some(DatasetStatus {
            points: 170,
            polygon_items: 12,
            polygon_features: 15,
        });
        assert_eq!(app.status_line(), "Points: 170 | Polygons: 12");
    }
}
