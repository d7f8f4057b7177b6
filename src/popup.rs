use geojson::{Feature, JsonObject, JsonValue, Value};

use crate::{
    config::MapConfig,
    location::LngLat,
    partner::PartnerCatalog,
    tools::text::{escape_html, human_case},
};

/// A click on a station marker, as dispatched by the map engine
#[derive(Debug, Clone)]
pub struct ClickEvent {
    /// Where the pointer was, possibly on a wrapped copy of the world
    pub pointer: LngLat,
    pub feature: Feature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub coordinates: LngLat,
    pub html: String,
}

/// Rounds meters to kilometers with two decimals
pub fn kilometers(meters: f64) -> f64 {
    (meters / 10.0).round() / 100.0
}

fn text_property(properties: &JsonObject, key: &str) -> String {
    match properties.get(key) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn point_of(feature: &Feature) -> Option<LngLat> {
    match &feature.geometry.as_ref()?.value {
        Value::Point(position) if position.len() >= 2 => {
            Some(LngLat::new(position[0], position[1]))
        }
        _ => None,
    }
}

pub struct PopupBuilder<'a> {
    config: &'a MapConfig,
    catalog: PartnerCatalog,
}

impl<'a> PopupBuilder<'a> {
    pub fn new(config: &'a MapConfig) -> Self {
        PopupBuilder {
            config,
            catalog: PartnerCatalog::from_config(config),
        }
    }

    /// Builds the popup for a clicked station. Distances are measured from
    /// `reference`, or from the default map center when the user position is
    /// not known. Returns `None` for features without a point geometry.
    pub fn build(&self, event: &ClickEvent, reference: Option<LngLat>) -> Option<Popup> {
        let raw = point_of(&event.feature)?;
        let empty = JsonObject::new();
        let properties = event.feature.properties.as_ref().unwrap_or(&empty);

        let partner = text_property(properties, "partner");
        let name = text_property(properties, "name");
        let street = human_case(&text_property(properties, "street"));
        let locality = human_case(&format!(
            "{} - {}",
            text_property(properties, "zip"),
            text_property(properties, "city")
        ));

        let origin = reference.unwrap_or(self.config.default_center);
        let distance = kilometers(origin.distance(&raw));

        let html = format!(
            concat!(
                r#"<div class="station-popup">"#,
                r#"<img class="station-popup-logo" src="{logo}" alt="{partner}" width="20" height="20">"#,
                r#"<h3>{name}</h3>"#,
                r#"<p>{street}<br>{locality}</p>"#,
                r#"<p><a href="geo:{lat},{lng}">{lat}, {lng}</a></p>"#,
                r#"<p>{distance:.2} km</p>"#,
                r#"</div>"#
            ),
            logo = escape_html(&self.catalog.logo_url(&partner)),
            partner = escape_html(&partner),
            name = escape_html(&name),
            street = escape_html(&street),
            locality = escape_html(&locality),
            lat = raw.latitude,
            lng = raw.longitude,
            distance = distance,
        );

        Some(Popup {
            coordinates: raw.wrapped_towards(event.pointer.longitude),
            html,
        })
    }
}
