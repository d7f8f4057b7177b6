use image::{Rgba, RgbaImage};
use quick_xml::{
    events::{BytesStart, Event},
    Reader, Writer,
};
use resvg::{tiny_skia, usvg};

use super::MarkerError;

/// Rewrites the root `<svg>` element so it carries explicit `width` and
/// `height` attributes, replacing any it already had. The viewBox is left
/// alone, so the artwork is fitted into the forced viewport.
pub fn force_size(svg: &str, width: f64, height: f64) -> Result<String, MarkerError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::new());
    let mut sized = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| MarkerError::Svg(e.to_string()))?;

        let event = match event {
            Event::Eof => break,
            Event::Start(root) if !sized && root.local_name().as_ref() == b"svg" => {
                sized = true;
                Event::Start(with_size(&root, width, height)?)
            }
            Event::Empty(root) if !sized && root.local_name().as_ref() == b"svg" => {
                sized = true;
                Event::Empty(with_size(&root, width, height)?)
            }
            event => event,
        };

        writer
            .write_event(event)
            .map_err(|e| MarkerError::Svg(e.to_string()))?;
    }

    if !sized {
        return Err(MarkerError::Svg("document has no <svg> element".into()));
    }

    String::from_utf8(writer.into_inner()).map_err(|e| MarkerError::Svg(e.to_string()))
}

fn with_size(
    root: &BytesStart<'_>,
    width: f64,
    height: f64,
) -> Result<BytesStart<'static>, MarkerError> {
    let name = String::from_utf8_lossy(root.name().as_ref()).into_owned();
    let mut sized = BytesStart::new(name);

    for attr in root.attributes() {
        let attr = attr.map_err(|e| MarkerError::Svg(e.to_string()))?;
        match attr.key.as_ref() {
            b"width" | b"height" => continue,
            _ => sized.push_attribute(attr),
        }
    }

    sized.push_attribute(("width", width.to_string().as_str()));
    sized.push_attribute(("height", height.to_string().as_str()));

    Ok(sized)
}

/// Renders an svg document into a `width` x `height` raster, stretching the
/// document viewport to fill it
pub fn rasterize(svg: &str, width: u32, height: u32) -> Result<RgbaImage, MarkerError> {
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default())
        .map_err(|e| MarkerError::Svg(e.to_string()))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(MarkerError::Surface {
        width,
        height,
    })?;

    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha, `image` expects straight alpha
    let mut raster = RgbaImage::new(width, height);
    for (dst, src) in raster.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }

    Ok(raster)
}
