use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::LngLat;

pub const DEFAULT_ASSET_BASE_URL: &str = "https://raw.githubusercontent.com/Booster2ooo/dump/main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSize {
    pub width: u32,
    pub height: u32,
}

impl Default for MarkerSize {
    fn default() -> Self {
        MarkerSize {
            width: 35,
            height: 48,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerMode {
    /// One clustered source with cluster, count and per feature icon layers
    #[default]
    Clustered,
    /// One plain source and symbol layer per partner
    PerPartner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    /// Zoom level above which clusters dissolve into single markers
    pub cluster_zoom: f64,
    /// Pixel radius used when grouping points into a cluster
    pub cluster_radius: u32,
    /// Logical size of the composited marker
    pub marker_size: MarkerSize,
    /// Logical edge length of the square partner logo
    pub logo_size: f64,
    /// Logical offset of the logo from the marker origin, on both axes
    pub logo_offset: f64,
    /// Physical pixels per logical pixel in the composited raster
    pub pixel_ratio: f64,
    /// Reference point for popup distances when the user position is unknown
    pub default_center: LngLat,
    pub default_zoom: f64,
    pub stations_url: String,
    pub asset_base_url: String,
    pub marker_url: String,
    pub layer_mode: LayerMode,
    /// Upper bound on a single asset request, `null` waits forever
    pub asset_timeout_ms: Option<u64>,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            cluster_zoom: 14.0,
            cluster_radius: 50,
            marker_size: MarkerSize::default(),
            logo_size: 20.0,
            logo_offset: 7.5,
            pixel_ratio: 2.0,
            default_center: LngLat::new(4.3053507, 50.8549541),
            default_zoom: 12.0,
            stations_url: format!("{DEFAULT_ASSET_BASE_URL}/stations.json"),
            asset_base_url: DEFAULT_ASSET_BASE_URL.to_string(),
            marker_url: format!("{DEFAULT_ASSET_BASE_URL}/yellow_marker2.svg"),
            layer_mode: LayerMode::Clustered,
            asset_timeout_ms: Some(10_000),
        }
    }
}

impl MapConfig {
    pub fn from_json(raw_data: &str) -> Result<Self, ConfigError> {
        let config: MapConfig = serde_json::from_str(raw_data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pixelRatio must be positive, got {}",
                self.pixel_ratio
            )));
        }
        if self.marker_size.width == 0 || self.marker_size.height == 0 {
            return Err(ConfigError::Invalid("markerSize must not be empty".into()));
        }
        if !(self.logo_size.is_finite() && self.logo_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "logoSize must be positive, got {}",
                self.logo_size
            )));
        }
        if !self.logo_offset.is_finite() {
            return Err(ConfigError::Invalid("logoOffset must be finite".into()));
        }
        if self.cluster_radius == 0 {
            return Err(ConfigError::Invalid("clusterRadius must be positive".into()));
        }
        if !self.cluster_zoom.is_finite() {
            return Err(ConfigError::Invalid("clusterZoom must be finite".into()));
        }
        Ok(())
    }

    pub fn asset_timeout(&self) -> Option<Duration> {
        self.asset_timeout_ms.map(Duration::from_millis)
    }

    /// Size of the composited raster in physical pixels
    pub fn marker_pixels(&self) -> (u32, u32) {
        (
            scale_to_pixels(self.marker_size.width as f64, self.pixel_ratio),
            scale_to_pixels(self.marker_size.height as f64, self.pixel_ratio),
        )
    }

    /// Edge length of the rasterized logo in physical pixels
    pub fn logo_pixels(&self) -> u32 {
        scale_to_pixels(self.logo_size, self.pixel_ratio)
    }

    /// Logo offset in physical pixels, rounded to the nearest whole pixel
    pub fn logo_offset_pixels(&self) -> i64 {
        (self.logo_offset * self.pixel_ratio).round() as i64
    }
}

fn scale_to_pixels(logical: f64, pixel_ratio: f64) -> u32 {
    (logical * pixel_ratio).round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_camel_case_options() {
        let config = MapConfig::from_json(
            r#"{
                "clusterZoom": 11,
                "clusterRadius": 40,
                "markerSize": { "width": 30, "height": 40 },
                "layerMode": "perPartner",
                "assetTimeoutMs": 2500,
                "someOtherKey": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.cluster_zoom, 11.0);
        assert_eq!(config.cluster_radius, 40);
        assert_eq!(config.marker_size, MarkerSize { width: 30, height: 40 });
        assert_eq!(config.layer_mode, LayerMode::PerPartner);
        assert_eq!(config.logo_size, 20.0);
        assert_eq!(config.pixel_ratio, 2.0);
        assert_eq!(config.asset_timeout(), Some(Duration::from_millis(2500)));

        let untimed = MapConfig::from_json(r#"{"assetTimeoutMs": null}"#).unwrap();
        assert_eq!(untimed.asset_timeout(), None);
        assert_eq!(MapConfig::default().asset_timeout_ms, Some(10_000));
    }

    #[test]
    fn default_raster_lands_on_whole_pixels() {
        let config = MapConfig::default();
        assert_eq!(config.marker_pixels(), (70, 96));
        assert_eq!(config.logo_pixels(), 40);
        assert_eq!(config.logo_offset_pixels(), 15);
    }

    #[test]
    fn rejects_degenerate_values() {
        assert!(MapConfig::from_json(r#"{"pixelRatio": 0}"#).is_err());
        assert!(MapConfig::from_json(r#"{"markerSize": {"width": 0, "height": 48}}"#).is_err());
        assert!(MapConfig::from_json(r#"{"clusterRadius": 0}"#).is_err());
        assert!(MapConfig::from_json(r#"{"clusterZoom": "high"}"#).is_err());
    }
}
