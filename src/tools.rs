pub mod data_url;
pub mod parse;
pub mod serde;
pub mod text;
