#![allow(dead_code)]

use std::{cell::RefCell, collections::HashMap, fs, io::Cursor, rc::Rc, time::Duration};

use image::{codecs::png::PngEncoder, ColorType, ImageEncoder, Rgba, RgbaImage};
use stationmap::fetch::{AssetFetcher, FetchError};

pub const ASSETS: &str = "https://assets.test";

pub const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);
pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

pub fn read_mock_data(name: &str) -> String {
    fs::read_to_string(format!("mock/{}", name)).unwrap()
}

pub fn asset_url(name: &str) -> String {
    format!("{ASSETS}/{name}")
}

pub fn solid_png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, color);
    let mut cursor = Cursor::new(Vec::new());
    PngEncoder::new(&mut cursor)
        .write_image(image.as_raw(), width, height, ColorType::Rgba8)
        .unwrap();
    cursor.into_inner()
}

#[derive(Clone)]
struct MockAsset {
    body: Result<Vec<u8>, u16>,
    delay: usize,
    stalled: bool,
}

/// Serves assets from memory. Each asset can be held back for a number of
/// scheduler turns to control which fetch completes first. Sleeping takes one
/// scheduler turn per millisecond.
#[derive(Clone, Default)]
pub struct MockFetcher {
    assets: HashMap<String, MockAsset>,
    requests: Rc<RefCell<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        MockFetcher::default()
    }

    pub fn with_asset(mut self, url: &str, body: Vec<u8>, delay: usize) -> Self {
        self.assets.insert(
            url.to_string(),
            MockAsset {
                body: Ok(body),
                delay,
                stalled: false,
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.assets.insert(
            url.to_string(),
            MockAsset {
                body: Err(status),
                delay: 0,
                stalled: false,
            },
        );
        self
    }

    /// The request for `url` never completes
    pub fn with_stalled(mut self, url: &str) -> Self {
        self.assets.insert(
            url.to_string(),
            MockAsset {
                body: Err(0),
                delay: 0,
                stalled: true,
            },
        );
        self
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|u| *u == url).count()
    }
}

impl AssetFetcher for MockFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.borrow_mut().push(url.to_string());

        let Some(asset) = self.assets.get(url).cloned() else {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        };

        if asset.stalled {
            std::future::pending::<()>().await;
        }

        for _ in 0..asset.delay {
            tokio::task::yield_now().await;
        }

        asset.body.map_err(|status| FetchError::Status {
            url: url.to_string(),
            status,
        })
    }

    async fn sleep(&self, duration: Duration) {
        for _ in 0..duration.as_millis() {
            tokio::task::yield_now().await;
        }
    }
}
