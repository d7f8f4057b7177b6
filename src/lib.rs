pub mod config;
pub mod fetch;
pub mod layers;
pub mod location;
pub mod marker;
pub mod partner;
pub mod pipeline;
pub mod popup;
pub mod station;
pub mod tools;

pub use config::MapConfig;
pub use location::{distance_meters, LngLat};
pub use partner::{get_logo_file_extension, group_by_partner, PartnerGroups};
pub use station::{normalize, StationFeature, StationRecord};
