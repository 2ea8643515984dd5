//! Title overlay: word wrap, bottom darkening band and outlined text.
//!
//! Text is laid out and rasterized through `usvg`/`resvg` against a font
//! database resolved once per [`Compositor`]. Given the same resolved font the
//! output is byte-identical for identical inputs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage, RgbaImage};
use resvg::tiny_skia::{IntSize, Pixmap, Transform};
use thumbgate_contracts::plan::Mode;
use tracing::debug;
use usvg::fontdb;

use crate::adapters::fit_canvas;
use crate::{CANVAS_HEIGHT, CANVAS_WIDTH};

pub const WRAP_COLUMNS: usize = 14;
pub const LARGE_FONT_SIZE: f32 = 115.0;
pub const SMALL_FONT_SIZE: f32 = 90.0;
/// Blocks with more lines than this use [`SMALL_FONT_SIZE`].
pub const LARGE_FONT_MAX_LINES: usize = 3;
pub const LINE_SPACING: f32 = 15.0;
pub const BOTTOM_MARGIN: f32 = 70.0;
pub const BAND_PADDING: u32 = 250;
pub const BAND_MAX_ALPHA: f64 = 230.0;
/// Outline width outside the glyph edge.
pub const STROKE_WIDTH: f32 = 6.0;

const GENERIC_FAMILY: &str = "sans-serif";

pub fn default_font_candidates() -> Vec<PathBuf> {
    [
        "/System/Library/Fonts/Helvetica.ttc",
        "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
        "C:\\Windows\\Fonts\\arialbd.ttf",
        "C:\\Windows\\Fonts\\Arial Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    File(PathBuf),
    System,
}

struct ResolvedFont {
    source: FontSource,
    family: Option<String>,
    db: Arc<fontdb::Database>,
}

fn resolve_font(candidates: &[PathBuf]) -> ResolvedFont {
    for path in candidates {
        if let Some((family, db)) = load_candidate(path) {
            return ResolvedFont {
                source: FontSource::File(path.clone()),
                family: Some(family),
                db: Arc::new(db),
            };
        }
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let family = preferred_family(&db);
    ResolvedFont {
        source: FontSource::System,
        family,
        db: Arc::new(db),
    }
}

fn load_candidate(path: &Path) -> Option<(String, fontdb::Database)> {
    if !path.is_file() {
        return None;
    }
    let mut db = fontdb::Database::new();
    db.load_font_file(path).ok()?;
    let family = preferred_family(&db)?;
    Some((family, db))
}

/// Family of the first bold face, else of the first face at all.
fn preferred_family(db: &fontdb::Database) -> Option<String> {
    db.faces()
        .filter(|face| face.weight == fontdb::Weight::BOLD)
        .chain(db.faces())
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()))
}

pub struct Compositor {
    font: ResolvedFont,
}

struct TextBlock {
    tree: Option<usvg::Tree>,
    top: f32,
    height: f32,
}

impl Compositor {
    pub fn new(font_candidates: &[PathBuf]) -> Self {
        let font = resolve_font(font_candidates);
        debug!(source = ?font.source, family = ?font.family, "resolved overlay font");
        Self { font }
    }

    pub fn font_source(&self) -> &FontSource {
        &self.font.source
    }

    pub fn font_family(&self) -> Option<&str> {
        self.font.family.as_deref()
    }

    /// Burns `title` onto a copy of `background`. The mode is carried for
    /// callers but does not alter the rendering.
    pub fn overlay(&self, background: &RgbImage, title: &str, _mode: Mode) -> Result<RgbImage> {
        let mut canvas = if background.dimensions() == (CANVAS_WIDTH, CANVAS_HEIGHT) {
            background.clone()
        } else {
            fit_canvas(DynamicImage::ImageRgb8(background.clone()))
        };

        let lines = wrap_words(&title.to_uppercase(), WRAP_COLUMNS);
        let font_size = font_size_for(lines.len());
        let block = self.layout(&lines, font_size)?;
        let text_height = block.height.round().max(0.0) as u32;
        paint_band(&mut canvas, text_height);

        let Some(tree) = block.tree else {
            return Ok(canvas);
        };
        let dy = (CANVAS_HEIGHT as f32 - BOTTOM_MARGIN - block.height) - block.top;
        render_onto(&mut canvas, &tree, Transform::from_translate(0.0, dy))
    }

    fn layout(&self, lines: &[String], font_size: f32) -> Result<TextBlock> {
        if lines.is_empty() {
            return Ok(TextBlock {
                tree: None,
                top: 0.0,
                height: 0.0,
            });
        }

        let svg = self.text_svg(lines, font_size);
        let options = usvg::Options {
            fontdb: Arc::clone(&self.font.db),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_str(&svg, &options).context("failed to lay out title text")?;
        let measured = {
            let root = tree.root();
            let bbox = root.abs_bounding_box();
            (root.has_children() && bbox.height() >= 1.0).then(|| (bbox.y(), bbox.height()))
        };
        let (top, height) = measured.unwrap_or_else(|| {
            debug!(lines = lines.len(), "text measurement empty, estimating block height");
            (0.0, lines.len() as f32 * font_size)
        });
        Ok(TextBlock {
            tree: Some(tree),
            top,
            height,
        })
    }

    fn text_svg(&self, lines: &[String], font_size: f32) -> String {
        let family = match self.font.family.as_deref() {
            Some(name) => format!("'{}'", name.replace('\'', "")),
            None => GENERIC_FAMILY.to_string(),
        };
        let mut svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><g font-family="{family}" font-size="{font_size}" font-weight="bold" text-anchor="middle" fill="#ffffff" stroke="#000000" stroke-width="{stroke}" stroke-linejoin="round" paint-order="stroke">"##,
            w = CANVAS_WIDTH,
            h = CANVAS_HEIGHT,
            family = escape_xml(&family),
            stroke = STROKE_WIDTH * 2.0,
        );
        for (idx, line) in lines.iter().enumerate() {
            let baseline = font_size + idx as f32 * (font_size + LINE_SPACING);
            svg.push_str(&format!(
                r#"<text x="{x}" y="{baseline}">{text}</text>"#,
                x = CANVAS_WIDTH / 2,
                text = escape_xml(line),
            ));
        }
        svg.push_str("</g></svg>");
        svg
    }
}

pub fn font_size_for(line_count: usize) -> f32 {
    if line_count > LARGE_FONT_MAX_LINES {
        SMALL_FONT_SIZE
    } else {
        LARGE_FONT_SIZE
    }
}

/// Greedy whitespace wrap; words wider than `width` are split across lines.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut rest: Vec<char> = word.chars().collect();
        while !rest.is_empty() {
            let used = current.chars().count();
            let needed = if used == 0 { rest.len() } else { used + 1 + rest.len() };
            if needed <= width {
                if used > 0 {
                    current.push(' ');
                }
                current.extend(rest.drain(..));
                break;
            }
            if rest.len() > width {
                let room = if used == 0 { width } else { width.saturating_sub(used + 1) };
                if room > 0 {
                    if used > 0 {
                        current.push(' ');
                    }
                    current.extend(rest.drain(..room));
                }
            }
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Darkens rows from `text_height + BAND_PADDING` above the bottom edge down,
/// quadratically in the distance from the band top.
fn paint_band(canvas: &mut RgbImage, text_height: u32) {
    let (width, height) = canvas.dimensions();
    let band = text_height + BAND_PADDING;
    let y_start = i64::from(height) - i64::from(band);

    for y in y_start.max(0)..i64::from(height) {
        let progress = (y - y_start) as f64 / f64::from(band);
        let alpha = (BAND_MAX_ALPHA * progress * progress) as u32;
        if alpha == 0 {
            continue;
        }
        for x in 0..width {
            let pixel = canvas.get_pixel_mut(x, y as u32);
            for channel in pixel.0.iter_mut() {
                *channel = darken(*channel, alpha);
            }
        }
    }
}

fn darken(channel: u8, alpha: u32) -> u8 {
    ((u32::from(channel) * (255 - alpha) + 127) / 255) as u8
}

fn render_onto(canvas: &mut RgbImage, tree: &usvg::Tree, transform: Transform) -> Result<RgbImage> {
    let (width, height) = canvas.dimensions();
    let size = IntSize::from_wh(width, height).context("overlay canvas has zero size")?;
    let rgba: Vec<u8> = canvas
        .pixels()
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2], u8::MAX])
        .collect();
    let mut pixmap = Pixmap::from_vec(rgba, size).context("failed to wrap canvas pixels")?;
    resvg::render(tree, transform, &mut pixmap.as_mut());

    let composite = RgbaImage::from_raw(width, height, pixmap.take())
        .context("rendered overlay has unexpected size")?;
    Ok(DynamicImage::ImageRgba8(composite).to_rgb8())
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
