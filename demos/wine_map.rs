#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release
#![allow(rustdoc::missing_crate_level_docs)] // it's an example

use eframe::egui;
use weinkarte::app::WineMapApp;

const DEFAULT_DATA_URL: &str = "https://raw.githubusercontent.com/weinkarte/data/main";

fn main() -> eframe::Result {
    env_logger::init();

    let api_key = std::env::var("MAPTILER_API_KEY").ok();
    let data_url =
        std::env::var("WEINKARTE_DATA_URL").unwrap_or_else(|_| DEFAULT_DATA_URL.to_string());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Weinkarte",
        options,
        Box::new(move |_cc| Ok(Box::new(WineMapApp::new(api_key, data_url)))),
    )
}
