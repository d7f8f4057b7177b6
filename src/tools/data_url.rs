use base64::{engine::general_purpose, Engine as _};

/// Builds an inline `data:` URL for the given payload
pub fn encode(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(data))
}

/// Splits a base64 `data:` URL back into its mime type and payload
pub fn decode(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let data = general_purpose::STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), data))
}
