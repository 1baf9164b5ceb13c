//! Grape-variety search over the wine-growing regions.

use serde_json::Value;

use crate::data::RawRecord;
use crate::projection::GeoPos;

/// Fly-to zoom used when a region does not carry its own.
const DEFAULT_REGION_ZOOM: u8 = 10;

/// A wine-growing region as listed in the region dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    /// Display name.
    pub bezeichnung: String,
    /// Country or larger region, if any.
    pub land: Option<String>,
    /// Area in hectares, as listed.
    pub flaeche: Option<String>,
    /// Semicolon-delimited varietal list.
    pub rebsorten: Option<String>,
    geo_lat: Option<String>,
    geo_lng: Option<String>,
    geo_zoom: Option<String>,
}

fn field_text(record: &RawRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Region {
    /// Reads a region out of a raw dataset record.
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            bezeichnung: field_text(record, "bezeichnung").unwrap_or_default(),
            land: field_text(record, "land"),
            flaeche: field_text(record, "flaeche"),
            rebsorten: field_text(record, "rebsorten"),
            geo_lat: field_text(record, "geo_lat"),
            geo_lng: field_text(record, "geo_lng"),
            geo_zoom: field_text(record, "geo_zoom"),
        }
    }

    /// Camera target for this region, when its own coordinates parse.
    ///
    /// Fractional zoom values are truncated; zero and unparseable values fall
    /// back to the default.
    pub fn fly_target(&self) -> Option<(GeoPos, u8)> {
        let lat: f64 = self.geo_lat.as_deref()?.trim().parse().ok()?;
        let lon: f64 = self.geo_lng.as_deref()?.trim().parse().ok()?;
        let zoom = self
            .geo_zoom
            .as_deref()
            .and_then(|z| z.trim().parse::<f64>().ok())
            .map(f64::trunc)
            .filter(|&z| z >= 1.0 && z <= u8::MAX as f64)
            .map(|z| z as u8)
            .unwrap_or(DEFAULT_REGION_ZOOM);
        Some((GeoPos { lon, lat }, zoom))
    }
}

/// Filters regions by grape variety.
///
/// An empty or whitespace-only term yields no results, which is distinct from
/// "no matches". Otherwise the varietal field is split on `;` and a region
/// matches when any trimmed, lowercased entry contains the lowercased term as
/// a substring. Pure and safe to re-run on every keystroke.
pub fn search<'a>(term: &str, regions: &'a [Region]) -> Vec<&'a Region> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    regions
        .iter()
        .filter(|region| {
            let Some(rebsorten) = &region.rebsorten else {
                return false;
            };
            rebsorten
                .split(';')
                .any(|grape| grape.trim().to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region(rebsorten: Option<&str>) -> Region {
        Region {
            bezeichnung: "Testgebiet".into(),
            rebsorten: rebsorten.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn matches_varietal_case_insensitively() {
        let regions = vec![region(Some("Riesling; Merlot"))];
        assert_eq!(search("riesling", &regions).len(), 1);
        assert_eq!(search("MERLOT", &regions).len(), 1);
    }

    #[test]
    fn matches_substring() {
        let regions = vec![region(Some("Riesling; Merlot"))];
        assert_eq!(search("ries", &regions).len(), 1);
    }

    #[test]
    fn empty_term_yields_no_results() {
        let regions = vec![region(Some("Riesling"))];
        assert!(search("", &regions).is_empty());
        assert!(search("   ", &regions).is_empty());
    }

    #[test]
    fn regions_without_varietals_never_match() {
        let regions = vec![region(None), region(Some(""))];
        assert!(search("riesling", &regions).is_empty());
    }

    #[test]
    fn fly_target_parses_coordinates_and_zoom() {
        let record = json!({
            "bezeichnung": "Mosel",
            "geo_lat": "49.9",
            "geo_lng": "7.1",
            "geo_zoom": "12"
        });
        let region = Region::from_record(record.as_object().unwrap());
        assert_eq!(region.fly_target(), Some((GeoPos { lon: 7.1, lat: 49.9 }, 12)));
    }

    #[test]
    fn fly_target_defaults_zoom() {
        let record = json!({"geo_lat": 49.9, "geo_lng": 7.1});
        let region = Region::from_record(record.as_object().unwrap());
        assert_eq!(region.fly_target().unwrap().1, 10);
    }

    #[test]
    fn fly_target_truncates_fractional_zoom() {
        let record = json!({"geo_lat": "49.9", "geo_lng": "7.1", "geo_zoom": "12.5"});
        let region = Region::from_record(record.as_object().unwrap());
        assert_eq!(region.fly_target().unwrap().1, 12);
    }

    #[test]
    fn fly_target_treats_zero_zoom_as_unset() {
        let record = json!({"geo_lat": "49.9", "geo_lng": "7.1", "geo_zoom": "0"});
        let region = Region::from_record(record.as_object().unwrap());
        assert_eq!(region.fly_target().unwrap().1, 10);

        let record = json!({"geo_lat": "49.9", "geo_lng": "7.1", "geo_zoom": "weit"});
        let region = Region::from_record(record.as_object().unwrap());
        assert_eq!(region.fly_target().unwrap().1, 10);
    }

    #[test]
    fn fly_target_requires_parseable_coordinates() {
        let record = json!({"geo_lat": "north-ish", "geo_lng": "7.1"});
        let region = Region::from_record(record.as_object().unwrap());
        assert!(region.fly_target().is_none());
    }
}
