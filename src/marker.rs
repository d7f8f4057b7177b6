pub mod svg;

use std::{io::Cursor, sync::Arc};

use futures::{
    future::{join_all, LocalBoxFuture, Shared},
    try_join, FutureExt,
};
use image::{
    codecs::png::PngEncoder,
    imageops::{self, FilterType},
    ColorType, ImageEncoder, ImageFormat, RgbaImage,
};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::{MapConfig, MarkerSize},
    fetch::{with_timeout, AssetFetcher, FetchError},
    partner::{AssetFormat, LogoAsset, PartnerCatalog},
    tools::data_url,
};

#[derive(Debug, Clone, Error)]
pub enum MarkerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid svg: {0}")]
    Svg(String),
    #[error("could not decode {format} image: {message}")]
    Decode { format: AssetFormat, message: String },
    #[error("could not allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },
    #[error("could not encode marker: {0}")]
    Encode(String),
    #[error("base marker unavailable: {0}")]
    BaseMarker(Box<MarkerError>),
}

/// A partner's base pin with its logo drawn on top. Produced once per partner
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeMarker {
    partner: String,
    image: RgbaImage,
    size: MarkerSize,
    pixel_ratio: f64,
}

impl CompositeMarker {
    pub fn partner(&self) -> &str {
        &self.partner
    }

    /// The raster in physical pixels
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Size in logical pixels
    pub fn size(&self) -> MarkerSize {
        self.size
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn to_png(&self) -> Result<Vec<u8>, MarkerError> {
        let mut cursor = Cursor::new(Vec::new());
        let (w, h) = self.image.dimensions();
        PngEncoder::new(&mut cursor)
            .write_image(self.image.as_raw(), w, h, ColorType::Rgba8)
            .map_err(|e| MarkerError::Encode(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    pub fn to_data_url(&self) -> Result<String, MarkerError> {
        Ok(data_url::encode(AssetFormat::Png.mime(), &self.to_png()?))
    }
}

/// An offscreen raster owned by a single composition
struct Surface {
    raster: RgbaImage,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        Surface {
            raster: RgbaImage::new(width, height),
        }
    }

    fn draw(&mut self, image: &RgbaImage, x: i64, y: i64) {
        imageops::overlay(&mut self.raster, image, x, y);
    }
}

/// Decodes a png or jpeg and scales it to exactly `width` x `height`
pub fn decode_raster(
    bytes: &[u8],
    format: AssetFormat,
    width: u32,
    height: u32,
) -> Result<RgbaImage, MarkerError> {
    let image_format = match format {
        AssetFormat::Png => ImageFormat::Png,
        AssetFormat::Jpg => ImageFormat::Jpeg,
        AssetFormat::Svg => {
            return Err(MarkerError::Decode {
                format,
                message: "svg is not a raster format".into(),
            })
        }
    };

    let decoded = image::load_from_memory_with_format(bytes, image_format)
        .map_err(|e| MarkerError::Decode {
            format,
            message: e.to_string(),
        })?
        .to_rgba8();

    if decoded.dimensions() == (width, height) {
        return Ok(decoded);
    }
    Ok(imageops::resize(&decoded, width, height, FilterType::Triangle))
}

type BaseMarker = Shared<LocalBoxFuture<'static, Result<Arc<RgbaImage>, MarkerError>>>;

async fn load_base_marker<F: AssetFetcher>(
    fetcher: F,
    config: MapConfig,
) -> Result<Arc<RgbaImage>, MarkerError> {
    let url = &config.marker_url;
    let (width, height) = config.marker_pixels();
    let timeout = config.asset_timeout();

    let raster = match AssetFormat::from_url(url) {
        AssetFormat::Svg => {
            let text = with_timeout(&fetcher, url, timeout, fetcher.fetch_text(url)).await?;
            let sized = svg::force_size(
                &text,
                config.marker_size.width as f64,
                config.marker_size.height as f64,
            )?;
            svg::rasterize(&sized, width, height)?
        }
        format => {
            let bytes = with_timeout(&fetcher, url, timeout, fetcher.fetch_bytes(url)).await?;
            decode_raster(&bytes, format, width, height)?
        }
    };

    debug!(url = %url, width, height, "loaded base marker");
    Ok(Arc::new(raster))
}

/// Outcome of compositing a set of partners, in the order they were requested
#[derive(Debug, Default)]
pub struct Compositions {
    pub markers: IndexMap<String, CompositeMarker>,
    pub failures: IndexMap<String, MarkerError>,
}

/// Per session compositing state. The base marker is fetched at most once and
/// shared by every composition; each composition draws on its own surface.
pub struct MarkerSession<F> {
    fetcher: F,
    config: MapConfig,
    catalog: PartnerCatalog,
    base: BaseMarker,
}

impl<F: AssetFetcher + Clone + 'static> MarkerSession<F> {
    /// Starts loading the base marker without waiting for it
    pub fn new(fetcher: F, config: &MapConfig) -> Self {
        let base = load_base_marker(fetcher.clone(), config.clone())
            .boxed_local()
            .shared();

        MarkerSession {
            fetcher,
            config: config.clone(),
            catalog: PartnerCatalog::from_config(config),
            base,
        }
    }

    /// Creates a session and waits for the base marker to load
    pub async fn init(fetcher: F, config: &MapConfig) -> Result<Self, MarkerError> {
        let session = MarkerSession::new(fetcher, config);
        session.ready().await?;
        Ok(session)
    }

    pub async fn ready(&self) -> Result<(), MarkerError> {
        self.base.clone().await.map(|_| ())
    }

    pub fn catalog(&self) -> &PartnerCatalog {
        &self.catalog
    }

    /// Composites the partner's logo over the base marker. The logo is fetched
    /// while the base is drawn, but it is only drawn once the base is on the
    /// surface, whichever finishes loading first.
    pub async fn composite(&self, partner: &str) -> Result<CompositeMarker, MarkerError> {
        let logo = self.catalog.logo(partner);
        let (width, height) = self.config.marker_pixels();
        let surface = Surface::new(width, height);

        let base_drawn = async {
            let base = self
                .base
                .clone()
                .await
                .map_err(|e| MarkerError::BaseMarker(Box::new(e)))?;
            let mut surface = surface;
            surface.draw(&base, 0, 0);
            Ok::<_, MarkerError>(surface)
        };

        let (mut surface, logo_raster) = try_join!(base_drawn, self.load_logo(&logo))?;

        let offset = self.config.logo_offset_pixels();
        surface.draw(&logo_raster, offset, offset);

        debug!(partner, url = %logo.url, "composited marker");

        Ok(CompositeMarker {
            partner: partner.to_string(),
            image: surface.raster,
            size: self.config.marker_size,
            pixel_ratio: self.config.pixel_ratio,
        })
    }

    async fn load_logo(&self, logo: &LogoAsset) -> Result<RgbaImage, MarkerError> {
        let size = self.config.logo_pixels();
        let (fetcher, url) = (&self.fetcher, logo.url.as_str());
        let timeout = self.config.asset_timeout();

        match logo.format {
            AssetFormat::Svg => {
                let text = with_timeout(fetcher, url, timeout, fetcher.fetch_text(url)).await?;
                let sized = svg::force_size(&text, self.config.logo_size, self.config.logo_size)?;
                svg::rasterize(&sized, size, size)
            }
            format => {
                let bytes = with_timeout(fetcher, url, timeout, fetcher.fetch_bytes(url)).await?;
                decode_raster(&bytes, format, size, size)
            }
        }
    }

    /// Composites every partner concurrently. A failing partner is reported in
    /// `failures` and does not affect the others.
    pub async fn composite_all<'a, I>(&self, partners: I) -> Compositions
    where
        I: IntoIterator<Item = &'a str>,
    {
        let partners: Vec<&str> = partners.into_iter().collect();
        let results = join_all(partners.iter().map(|partner| self.composite(partner))).await;

        partners
            .into_iter()
            .zip(results)
            .fold(Compositions::default(), |mut compositions, (partner, result)| {
                match result {
                    Ok(marker) => {
                        compositions.markers.insert(partner.to_string(), marker);
                    }
                    Err(e) => {
                        warn!(partner, error = %e, "marker composition failed");
                        compositions.failures.insert(partner.to_string(), e);
                    }
                }
                compositions
            })
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let (w, h) = image.dimensions();
        PngEncoder::new(&mut cursor)
            .write_image(image.as_raw(), w, h, ColorType::Rgba8)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn decodes_and_scales_rasters() {
        let source = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 255, 255]));
        let decoded = decode_raster(&png_bytes(&source), AssetFormat::Png, 40, 40).unwrap();
        assert_eq!(decoded.dimensions(), (40, 40));
        assert_eq!(decoded.get_pixel(20, 20), &Rgba([0, 0, 255, 255]));

        assert!(decode_raster(b"garbage", AssetFormat::Png, 40, 40).is_err());
        assert!(decode_raster(b"<svg/>", AssetFormat::Svg, 40, 40).is_err());
    }

    #[test]
    fn surface_draws_later_images_on_top() {
        let mut surface = Surface::new(4, 4);
        surface.draw(&RgbaImage::from_pixel(4, 4, Rgba([255, 255, 0, 255])), 0, 0);
        surface.draw(&RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])), 1, 1);

        assert_eq!(surface.raster.get_pixel(0, 0), &Rgba([255, 255, 0, 255]));
        assert_eq!(surface.raster.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(surface.raster.get_pixel(3, 3), &Rgba([255, 255, 0, 255]));
    }

    #[test]
    fn serializes_to_png_data_url() {
        let marker = CompositeMarker {
            partner: "co-op".into(),
            image: RgbaImage::from_pixel(70, 96, Rgba([1, 2, 3, 255])),
            size: MarkerSize::default(),
            pixel_ratio: 2.0,
        };

        let url = marker.to_data_url().unwrap();
        let (mime, bytes) = data_url::decode(&url).unwrap();
        assert_eq!(mime, "image/png");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(&decoded, marker.image());
    }
}
