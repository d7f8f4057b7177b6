use std::fmt;

use geojson::FeatureCollection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::MapConfig,
    station::{to_feature_collection, StationFeature},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Svg,
    Png,
    Jpg,
}

impl AssetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AssetFormat::Svg => "svg",
            AssetFormat::Png => "png",
            AssetFormat::Jpg => "jpg",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            AssetFormat::Svg => "image/svg+xml",
            AssetFormat::Png => "image/png",
            AssetFormat::Jpg => "image/jpeg",
        }
    }

    /// Guesses the format from the extension at the end of a url, ignoring any
    /// query string. Unknown extensions are treated as svg.
    pub fn from_url(url: &str) -> AssetFormat {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("png") => AssetFormat::Png,
            Some("jpg") | Some("jpeg") => AssetFormat::Jpg,
            _ => AssetFormat::Svg,
        }
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Partners whose logo is not published as svg. Anything not listed here is svg.
pub const LOGO_FORMATS: &[(&str, AssetFormat)] = &[
    ("co-op", AssetFormat::Png),
    ("evf", AssetFormat::Png),
    ("gleaners", AssetFormat::Png),
    ("iq", AssetFormat::Png),
    ("manx_petroleums", AssetFormat::Png),
    ("mol", AssetFormat::Png),
    ("pace", AssetFormat::Png),
    ("smartdiesel", AssetFormat::Png),
    ("regent", AssetFormat::Png),
    ("power", AssetFormat::Png),
    ("scottish_fuels", AssetFormat::Png),
    ("argos", AssetFormat::Png),
    ("air_liquide", AssetFormat::Jpg),
];

pub fn logo_format(partner: &str) -> AssetFormat {
    LOGO_FORMATS
        .iter()
        .find(|(key, _)| *key == partner)
        .map(|(_, format)| *format)
        .unwrap_or(AssetFormat::Svg)
}

pub fn get_logo_file_extension(partner: &str) -> &'static str {
    logo_format(partner).extension()
}

/// Name under which a partner's composited marker is registered
pub fn icon_name(partner: &str) -> String {
    format!("{partner}_image")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoAsset {
    pub partner: String,
    pub format: AssetFormat,
    pub url: String,
}

impl LogoAsset {
    pub fn file_extension(&self) -> &'static str {
        self.format.extension()
    }
}

/// Resolves partner logos against the asset host
#[derive(Debug, Clone)]
pub struct PartnerCatalog {
    base_url: String,
}

impl PartnerCatalog {
    pub fn new(base_url: &str) -> Self {
        PartnerCatalog {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &MapConfig) -> Self {
        PartnerCatalog::new(&config.asset_base_url)
    }

    pub fn logo_url(&self, partner: &str) -> String {
        format!(
            "{}/{}.{}",
            self.base_url,
            partner,
            get_logo_file_extension(partner)
        )
    }

    pub fn logo(&self, partner: &str) -> LogoAsset {
        LogoAsset {
            partner: partner.to_string(),
            format: logo_format(partner),
            url: self.logo_url(partner),
        }
    }
}

/// Features partitioned by partner. Partners keep the order in which they first
/// appear and each group keeps input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartnerGroups {
    groups: IndexMap<String, Vec<StationFeature>>,
}

impl PartnerGroups {
    pub fn partners(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn get(&self, partner: &str) -> Option<&[StationFeature]> {
        self.groups.get(partner).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[StationFeature])> {
        self.groups
            .iter()
            .map(|(partner, features)| (partner.as_str(), features.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn feature_collection(&self, partner: &str) -> Option<FeatureCollection> {
        self.get(partner).map(to_feature_collection)
    }
}

pub fn group_by_partner(features: &[StationFeature]) -> PartnerGroups {
    let groups = features.iter().fold(
        IndexMap::<String, Vec<StationFeature>>::new(),
        |mut groups, feature| {
            groups
                .entry(feature.partner.clone())
                .or_default()
                .push(feature.clone());
            groups
        },
    );

    PartnerGroups { groups }
}
