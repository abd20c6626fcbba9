//! Burns a caption into the bottom-left corner of a panel.
//!
//! The caption is laid out as SVG text with `usvg`, so glyph shaping and font
//! fallback come from `fontdb`, then rasterized with `resvg` and alpha-blended
//! over the panel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use tracing::{info, warn};
use usvg::fontdb::{Database, Family, Query};

use crate::constants::{
    CAPTION_FONT_SIZE, CAPTION_MARGIN, CAPTION_SHADOW_OFFSET, CAPTION_SHADOW_OPACITY,
};
use crate::error::ComicError;

const LINE_HEIGHT_EM: f32 = 1.2;

/// Font database plus the family captions are set in.
#[derive(Clone)]
pub struct CaptionFont {
    fontdb: Arc<Database>,
    family: Option<String>,
}

impl CaptionFont {
    /// Uses the font file at `preferred` if it loads, else the system sans-serif.
    ///
    /// System fonts are always loaded as well so missing glyphs can fall back.
    pub fn load(preferred: &Path) -> Self {
        let mut db = Database::new();
        let preferred_family = match db.load_font_file(preferred) {
            Ok(()) => first_family(&db),
            Err(err) => {
                warn!(
                    "Caption font {} not available ({}), using the default font",
                    preferred.display(),
                    err
                );
                None
            }
        };
        db.load_system_fonts();
        let family = preferred_family.or_else(|| default_family(&db));
        match family.as_deref() {
            Some(name) => info!("Captions will use font family {name}"),
            None => warn!("No fonts found, captions will be skipped"),
        }
        Self {
            fontdb: Arc::new(db),
            family,
        }
    }

    /// System fonts only.
    pub fn system_default() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        let family = default_family(&db);
        Self {
            fontdb: Arc::new(db),
            family,
        }
    }

    /// Family name used in the caption markup, if any font was found.
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }
}

fn first_family(db: &Database) -> Option<String> {
    db.faces()
        .next()
        .and_then(|face| face.families.first())
        .map(|(name, _)| name.clone())
}

fn default_family(db: &Database) -> Option<String> {
    let query = Query {
        families: &[Family::SansSerif],
        ..Query::default()
    };
    let id = db
        .query(&query)
        .or_else(|| db.faces().next().map(|face| face.id))?;
    db.face(id)
        .and_then(|face| face.families.first())
        .map(|(name, _)| name.clone())
}

/// One `<text>` element at the origin, a `<tspan>` per non-blank line.
fn text_element(caption: &str, family: &str, fill: &str, opacity: f32) -> String {
    let family = family.replace('\'', "");
    let family = html_escape::encode_double_quoted_attribute(&family);
    let mut out = format!(
        r#"<text x="0" y="0" font-family="'{family}'" font-size="{CAPTION_FONT_SIZE}" fill="{fill}" fill-opacity="{opacity:.3}">"#
    );
    let mut pending_lines = 0usize;
    let mut first = true;
    for line in caption.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            pending_lines += 1;
            continue;
        }
        let dy = if first {
            0.0
        } else {
            LINE_HEIGHT_EM * (pending_lines + 1) as f32
        };
        out.push_str(&format!(
            r#"<tspan x="0" dy="{dy}em">{}</tspan>"#,
            html_escape::encode_text(line)
        ));
        first = false;
        pending_lines = 0;
    }
    out.push_str("</text>");
    out
}

fn svg_document(width: u32, height: u32, body: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">{body}</svg>"#
    )
}

fn parse_tree(svg: &str, font: &CaptionFont) -> Result<usvg::Tree, ComicError> {
    let options = usvg::Options {
        fontdb: font.fontdb.clone(),
        ..Default::default()
    };
    usvg::Tree::from_str(svg, &options).map_err(|err| ComicError::Overlay(err.to_string()))
}

/// Translation that puts text measured at the origin (`left`, `bottom` of its
/// box) against the bottom-left margin of a panel `height` pixels tall.
fn caption_origin(left: f32, bottom: f32, height: u32) -> (f32, f32) {
    (CAPTION_MARGIN - left, height as f32 - CAPTION_MARGIN - bottom)
}

/// Builds the full caption layer for a `width` x `height` panel: shadow first,
/// white text on top, the pair anchored to the bottom-left margin.
fn caption_layer(
    width: u32,
    height: u32,
    caption: &str,
    font: &CaptionFont,
) -> Result<RgbaImage, ComicError> {
    let family = font
        .family()
        .ok_or_else(|| ComicError::Overlay("no fonts available".to_string()))?;

    let text = text_element(caption, family, "#ffffff", 1.0);
    let measured = parse_tree(&svg_document(width, height, &text), font)?;
    if !measured.root().has_children() {
        return Err(ComicError::Overlay(
            "caption produced no glyphs".to_string(),
        ));
    }
    let bbox = measured.root().abs_bounding_box();

    let (tx, ty) = caption_origin(bbox.left(), bbox.bottom(), height);
    let (sx, sy) = (tx + CAPTION_SHADOW_OFFSET.0, ty + CAPTION_SHADOW_OFFSET.1);
    let shadow = text_element(caption, family, "#000000", CAPTION_SHADOW_OPACITY);
    let body = format!(
        r#"<g transform="translate({sx} {sy})">{shadow}</g><g transform="translate({tx} {ty})">{text}</g>"#
    );
    let tree = parse_tree(&svg_document(width, height, &body), font)?;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| ComicError::Overlay("failed to allocate caption pixmap".to_string()))?;
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    let pixels = pixmap.pixels();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let color = pixels[(y * width + x) as usize].demultiply();
        Rgba([color.red(), color.green(), color.blue(), color.alpha()])
    }))
}

/// Draws `caption` onto the image at `image_path` and saves it to `output_path`.
pub fn overlay_caption(
    image_path: &Path,
    caption: &str,
    output_path: &Path,
    font: &CaptionFont,
) -> Result<PathBuf, ComicError> {
    let mut image = image::open(image_path)
        .map_err(|err| ComicError::Overlay(format!("{}: {err}", image_path.display())))?
        .to_rgba8();
    let (width, height) = image.dimensions();

    let layer = caption_layer(width, height, caption, font)?;
    image::imageops::overlay(&mut image, &layer, 0, 0);

    image
        .save(output_path)
        .map_err(|err| ComicError::Overlay(format!("{}: {err}", output_path.display())))?;
    info!("Text added to image and saved as {}", output_path.display());
    Ok(output_path.to_path_buf())
}
