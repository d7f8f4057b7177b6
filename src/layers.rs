use std::fmt;

use geojson::{JsonObject, JsonValue};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::{LayerMode, MapConfig},
    marker::CompositeMarker,
    partner::icon_name,
    station::{to_feature_collection, StationFeature},
};

pub const STATIONS_SOURCE: &str = "stations";
pub const CLUSTER_LAYER: &str = "clusters";
pub const CLUSTER_COUNT_LAYER: &str = "cluster-count";
pub const STATION_LAYER: &str = "unclustered-point";

/// Count thresholds and radii for the cluster circles. Every step is 30 px.
pub const CLUSTER_RADIUS_STEPS: (f64, &[(u32, f64)]) = (30.0, &[(100, 30.0), (750, 30.0)]);
pub const CLUSTER_COLOR_STEPS: (&str, &[(u32, &str)]) =
    ("#51bbd6", &[(100, "#f1f075"), (750, "#f28cb1")]);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("an image named {0} is already registered")]
    DuplicateImage(String),
    #[error("a source with id {0} already exists")]
    DuplicateSource(String),
    #[error("a layer with id {0} already exists")]
    DuplicateLayer(String),
    #[error("layer {layer} references unknown source {source_id}")]
    UnknownSource { layer: String, source_id: String },
    #[error("layer {layer} references unregistered image {image}")]
    UnknownImage { layer: String, image: String },
    #[error("no layer with id {0}")]
    UnknownLayer(String),
    #[error("invalid layer definition: {0}")]
    InvalidLayer(String),
    #[error("could not encode image {name}: {message}")]
    Image { name: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MapEvent {
    Click,
    MouseEnter,
    MouseLeave,
}

impl fmt::Display for MapEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MapEvent::Click => f.write_str("click"),
            MapEvent::MouseEnter => f.write_str("mouseenter"),
            MapEvent::MouseLeave => f.write_str("mouseleave"),
        }
    }
}

/// The registration surface of a map rendering engine. Calls are made from a
/// single task in program order.
pub trait MapEngine {
    fn add_image(&mut self, name: &str, marker: &CompositeMarker) -> Result<(), RegistrationError>;
    fn add_source(&mut self, id: &str, source: JsonValue) -> Result<(), RegistrationError>;
    fn add_layer(&mut self, layer: JsonValue) -> Result<(), RegistrationError>;
    fn on(&mut self, event: MapEvent, layer_id: &str) -> Result<(), RegistrationError>;
}

pub fn clustered_source(features: &[StationFeature], config: &MapConfig) -> JsonValue {
    json!({
        "type": "geojson",
        "data": to_feature_collection(features),
        "cluster": true,
        "clusterMaxZoom": config.cluster_zoom,
        "clusterRadius": config.cluster_radius,
    })
}

pub fn plain_source(features: &[StationFeature]) -> JsonValue {
    json!({
        "type": "geojson",
        "data": to_feature_collection(features),
    })
}

fn step_expression<T: Serialize + Copy>(input: &str, base: T, stops: &[(u32, T)]) -> JsonValue {
    let mut expression = vec![json!("step"), json!(["get", input]), json!(base)];
    for (threshold, value) in stops {
        expression.push(json!(threshold));
        expression.push(json!(value));
    }
    JsonValue::Array(expression)
}

pub fn cluster_layer() -> JsonValue {
    let (base_radius, radius_stops) = CLUSTER_RADIUS_STEPS;
    let (base_color, color_stops) = CLUSTER_COLOR_STEPS;

    json!({
        "id": CLUSTER_LAYER,
        "type": "circle",
        "source": STATIONS_SOURCE,
        "filter": ["has", "point_count"],
        "paint": {
            "circle-color": step_expression("point_count", base_color, color_stops),
            "circle-radius": step_expression("point_count", base_radius, radius_stops),
        }
    })
}

pub fn cluster_count_layer() -> JsonValue {
    json!({
        "id": CLUSTER_COUNT_LAYER,
        "type": "symbol",
        "source": STATIONS_SOURCE,
        "filter": ["has", "point_count"],
        "layout": {
            "text-field": ["get", "point_count_abbreviated"],
            "text-size": 12,
        }
    })
}

/// Single station markers. The icon comes from each feature's own `icon`
/// property; partners without a registered image are filtered out.
pub fn station_layer<'a>(partners: impl IntoIterator<Item = &'a str>) -> JsonValue {
    let partners: Vec<&str> = partners.into_iter().collect();

    json!({
        "id": STATION_LAYER,
        "type": "symbol",
        "source": STATIONS_SOURCE,
        "filter": [
            "all",
            ["!", ["has", "point_count"]],
            ["in", ["get", "partner"], ["literal", partners]],
        ],
        "layout": {
            "icon-image": ["get", "icon"],
            "icon-anchor": "bottom",
            "icon-allow-overlap": true,
        }
    })
}

pub fn partner_source_id(partner: &str) -> String {
    format!("{partner}_source")
}

pub fn partner_layer_id(partner: &str) -> String {
    format!("{partner}_layer")
}

pub fn partner_layer(partner: &str) -> JsonValue {
    json!({
        "id": partner_layer_id(partner),
        "type": "symbol",
        "source": partner_source_id(partner),
        "layout": {
            "icon-image": icon_name(partner),
            "icon-size": 1,
            "icon-anchor": "bottom",
        }
    })
}

/// Ids one partner registered with the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartnerRegistration {
    pub image: String,
    pub source: Option<String>,
    pub layer: Option<String>,
}

/// What ended up registered with the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerSetup {
    pub images: Vec<String>,
    pub sources: Vec<String>,
    pub layers: Vec<String>,
    /// Partners whose image or layer could not be registered
    pub skipped: IndexMap<String, RegistrationError>,
}

impl LayerSetup {
    pub fn record(&mut self, registration: PartnerRegistration) {
        self.images.push(registration.image);
        self.sources.extend(registration.source);
        self.layers.extend(registration.layer);
    }
}

/// Registers partners with an engine as their markers become available, then
/// adds whatever the partners share. Every image is registered before a layer
/// can reference it.
pub struct LayerConfigurator<'a> {
    config: &'a MapConfig,
}

impl<'a> LayerConfigurator<'a> {
    pub fn new(config: &'a MapConfig) -> Self {
        LayerConfigurator { config }
    }

    /// Registers one partner's marker, plus its own source and layer when each
    /// partner gets a layer. `features` are that partner's stations.
    ///
    /// The engine has no way to remove anything, so on failure whatever was
    /// already registered for the partner stays with the engine. It is not
    /// returned and must not be referenced.
    pub fn register<E: MapEngine>(
        &self,
        engine: &mut E,
        partner: &str,
        features: &[StationFeature],
        marker: &CompositeMarker,
    ) -> Result<PartnerRegistration, RegistrationError> {
        let image = icon_name(partner);
        engine.add_image(&image, marker)?;

        if self.config.layer_mode == LayerMode::Clustered {
            return Ok(PartnerRegistration {
                image,
                ..Default::default()
            });
        }

        let source = partner_source_id(partner);
        engine.add_source(&source, plain_source(features))?;

        let layer = partner_layer(partner);
        let id = layer_id(&layer)?;
        engine.add_layer(layer)?;
        engine.on(MapEvent::Click, &id)?;

        Ok(PartnerRegistration {
            image,
            source: Some(source),
            layer: Some(id),
        })
    }

    /// Adds the shared clustered source and its layers once every partner has
    /// been registered. `registered` lists the partners whose image is
    /// available; the others are filtered out of the station layer.
    pub fn finish<'p, E: MapEngine>(
        &self,
        engine: &mut E,
        features: &[StationFeature],
        registered: impl IntoIterator<Item = &'p str>,
        setup: &mut LayerSetup,
    ) -> Result<(), RegistrationError> {
        if self.config.layer_mode != LayerMode::Clustered {
            return Ok(());
        }

        engine.add_source(STATIONS_SOURCE, clustered_source(features, self.config))?;
        setup.sources.push(STATIONS_SOURCE.to_string());

        for layer in [cluster_layer(), cluster_count_layer(), station_layer(registered)] {
            let id = layer_id(&layer)?;
            engine.add_layer(layer)?;
            setup.layers.push(id);
        }

        for event in [MapEvent::Click, MapEvent::MouseEnter, MapEvent::MouseLeave] {
            engine.on(event, STATION_LAYER)?;
        }

        debug!(
            images = %setup.images.iter().join(", "),
            "registered clustered station layers"
        );
        Ok(())
    }
}

fn layer_id(layer: &JsonValue) -> Result<String, RegistrationError> {
    layer["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RegistrationError::InvalidLayer("layer has no id".into()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "pixelRatio")]
    pub pixel_ratio: f64,
}

/// A map engine that records registrations into a style document. Rejects the
/// same mistakes a browser engine would: duplicate ids, layers on unknown
/// sources, and literal icon names that were never registered.
#[derive(Debug, Clone, Default)]
pub struct StyleDocument {
    sources: JsonObject,
    layers: Vec<JsonValue>,
    images: IndexMap<String, StyleImage>,
    subscriptions: Vec<(MapEvent, String)>,
}

impl StyleDocument {
    pub fn new() -> Self {
        StyleDocument::default()
    }

    pub fn source(&self, id: &str) -> Option<&JsonValue> {
        self.sources.get(id)
    }

    pub fn layers(&self) -> &[JsonValue] {
        &self.layers
    }

    pub fn layer(&self, id: &str) -> Option<&JsonValue> {
        self.layers.iter().find(|layer| layer["id"] == id)
    }

    pub fn images(&self) -> &IndexMap<String, StyleImage> {
        &self.images
    }

    pub fn subscriptions(&self) -> &[(MapEvent, String)] {
        &self.subscriptions
    }

    pub fn to_json(&self) -> JsonValue {
        let events: Vec<JsonValue> = self
            .subscriptions
            .iter()
            .map(|(event, layer)| json!({ "event": event, "layer": layer }))
            .collect();

        json!({
            "version": 8,
            "sources": self.sources,
            "layers": self.layers,
            "metadata": {
                "images": self.images,
                "events": events,
            }
        })
    }
}

impl MapEngine for StyleDocument {
    fn add_image(&mut self, name: &str, marker: &CompositeMarker) -> Result<(), RegistrationError> {
        if self.images.contains_key(name) {
            return Err(RegistrationError::DuplicateImage(name.to_string()));
        }

        let url = marker.to_data_url().map_err(|e| RegistrationError::Image {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let (width, height) = marker.image().dimensions();

        self.images.insert(
            name.to_string(),
            StyleImage {
                url,
                width,
                height,
                pixel_ratio: marker.pixel_ratio(),
            },
        );
        Ok(())
    }

    fn add_source(&mut self, id: &str, source: JsonValue) -> Result<(), RegistrationError> {
        if self.sources.contains_key(id) {
            return Err(RegistrationError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), source);
        Ok(())
    }

    fn add_layer(&mut self, layer: JsonValue) -> Result<(), RegistrationError> {
        let id = layer_id(&layer)?;
        if self.layer(&id).is_some() {
            return Err(RegistrationError::DuplicateLayer(id));
        }

        let source_id = layer["source"].as_str().unwrap_or_default();
        if !self.sources.contains_key(source_id) {
            return Err(RegistrationError::UnknownSource {
                layer: id,
                source_id: source_id.to_string(),
            });
        }

        // Data driven icons are resolved per feature at render time
        if let Some(image) = layer["layout"]["icon-image"].as_str() {
            if !self.images.contains_key(image) {
                return Err(RegistrationError::UnknownImage {
                    layer: id,
                    image: image.to_string(),
                });
            }
        }

        self.layers.push(layer);
        Ok(())
    }

    fn on(&mut self, event: MapEvent, layer_id: &str) -> Result<(), RegistrationError> {
        if self.layer(layer_id).is_none() {
            return Err(RegistrationError::UnknownLayer(layer_id.to_string()));
        }
        self.subscriptions.push((event, layer_id.to_string()));
        Ok(())
    }
}
