use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    location::LngLat,
    partner::icon_name,
    tools::{parse::coordinate_from_value, serde::string_from_scalar},
};

/// A station as delivered by the stations feed. Coordinates are kept as the raw
/// JSON value because the feed mixes numbers and numeric strings. The record
/// is read from, and serialized back to, the untouched feed object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonObject", into = "JsonObject")]
pub struct StationRecord {
    pub partner: String,
    pub city: String,
    pub street: String,
    pub zip: String,
    pub lat: JsonValue,
    pub lng: JsonValue,
    raw: JsonObject,
}

/// Typed view over the fields of a feed object
#[derive(Deserialize)]
struct RecordView {
    #[serde(default, deserialize_with = "string_from_scalar")]
    partner: String,

    #[serde(default, deserialize_with = "string_from_scalar")]
    city: String,

    #[serde(default, deserialize_with = "string_from_scalar")]
    street: String,

    #[serde(default, deserialize_with = "string_from_scalar")]
    zip: String,

    #[serde(default)]
    lat: JsonValue,

    #[serde(default)]
    lng: JsonValue,
}

impl TryFrom<JsonObject> for StationRecord {
    type Error = serde_json::Error;

    fn try_from(raw: JsonObject) -> Result<Self, Self::Error> {
        let view: RecordView = serde_json::from_value(JsonValue::Object(raw.clone()))?;
        Ok(StationRecord {
            partner: view.partner,
            city: view.city,
            street: view.street,
            zip: view.zip,
            lat: view.lat,
            lng: view.lng,
            raw,
        })
    }
}

impl From<StationRecord> for JsonObject {
    fn from(record: StationRecord) -> Self {
        record.fields()
    }
}

impl StationRecord {
    pub fn new(partner: &str, city: &str, lat: JsonValue, lng: JsonValue) -> Self {
        StationRecord {
            partner: partner.to_string(),
            city: city.to_string(),
            lat,
            lng,
            ..Default::default()
        }
    }

    /// Parsed `(lng, lat)`, if both components read as numbers
    pub fn coordinates(&self) -> Option<LngLat> {
        let lng = coordinate_from_value(&self.lng)?;
        let lat = coordinate_from_value(&self.lat)?;
        Some(LngLat::new(lng, lat))
    }

    /// Every field of the record as it came from the feed, including the ones
    /// this crate does not know about. Typed fields only replace the raw value
    /// once they have been changed.
    pub fn fields(&self) -> JsonObject {
        let mut fields = self.raw.clone();

        let text = [
            ("partner", &self.partner),
            ("city", &self.city),
            ("street", &self.street),
            ("zip", &self.zip),
        ];
        for (key, value) in text {
            let unchanged = match fields.get(key) {
                Some(raw) => string_from_scalar(raw).ok().as_ref() == Some(value),
                None => value.is_empty(),
            };
            if !unchanged {
                fields.insert(key.to_string(), JsonValue::from(value.as_str()));
            }
        }

        for (key, value) in [("lat", &self.lat), ("lng", &self.lng)] {
            if fields.get(key).unwrap_or(&JsonValue::Null) != value {
                fields.insert(key.to_string(), value.clone());
            }
        }

        fields
    }
}

/// Whether a parsed coordinate may be placed on the map. Zero components are
/// treated as missing data, so the null island is never a valid station.
pub fn is_valid_coordinate(lnglat: &LngLat) -> bool {
    let LngLat {
        longitude: lng,
        latitude: lat,
    } = *lnglat;

    lnglat.is_finite()
        && lng != 0.0
        && lat != 0.0
        && lng > -180.0
        && lng < 180.0
        && lat > -90.0
        && lat < 90.0
}

/// A validated station ready to be placed on the map
#[derive(Debug, Clone, PartialEq)]
pub struct StationFeature {
    pub partner: String,
    pub name: String,
    pub coordinates: LngLat,
    pub properties: JsonObject,
}

impl StationFeature {
    /// Name of the registered image this feature is drawn with
    pub fn icon(&self) -> String {
        icon_name(&self.partner)
    }

    pub fn as_feature(&self) -> Feature {
        self.clone().into()
    }
}

/// Converts a raw record into a feature, or `None` when its coordinates are
/// missing, zero, or out of range.
pub fn normalize(record: &StationRecord) -> Option<StationFeature> {
    let coordinates = record.coordinates().filter(is_valid_coordinate)?;

    let name = format!("{} {}", record.partner, record.city.to_lowercase())
        .trim_end()
        .to_string();

    Some(StationFeature {
        partner: record.partner.clone(),
        name,
        coordinates,
        properties: record.fields(),
    })
}

/// Normalizes a whole batch, dropping invalid records. Order is preserved.
pub fn normalize_all(records: &[StationRecord]) -> Vec<StationFeature> {
    records
        .iter()
        .filter_map(|record| {
            let feature = normalize(record);
            if feature.is_none() {
                debug!(
                    partner = %record.partner,
                    city = %record.city,
                    lat = %record.lat,
                    lng = %record.lng,
                    "dropping station with invalid coordinates"
                );
            }
            feature
        })
        .collect()
}

impl From<StationFeature> for Feature {
    fn from(station: StationFeature) -> Feature {
        let icon = station.icon();
        let geometry = Geometry::new(Value::Point(station.coordinates.into()));

        let mut properties = station.properties;
        properties.insert("name".to_string(), JsonValue::from(station.name));
        properties.insert("partner".to_string(), JsonValue::from(station.partner));
        properties.insert("icon".to_string(), JsonValue::from(icon));

        Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Builds a GeoJSON collection in feature order
pub fn to_feature_collection(features: &[StationFeature]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: features.iter().map(StationFeature::as_feature).collect(),
        foreign_members: None,
    }
}

/// The raw stations feed, a bare JSON array of records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stations {
    pub stations: Vec<StationRecord>,
}

impl Stations {
    pub fn from_raw_data(raw_data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw_data)
    }

    pub fn normalize(&self) -> Vec<StationFeature> {
        normalize_all(&self.stations)
    }
}

impl From<Vec<StationRecord>> for Stations {
    fn from(stations: Vec<StationRecord>) -> Self {
        Stations { stations }
    }
}
