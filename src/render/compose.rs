use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, GenericImageView, ImageFormat};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::geometry::Position;
use crate::segments::WordSegment;
use crate::style::BLACK;

use super::fit::DEFAULT_FONT_SIZE;
use super::font::FontSet;

const BOX_COLOR: &str = "#0000ff";
const BOX_STROKE: u32 = 3;
const NUMBER_COLOR: &str = "#ff0000";
const NUMBER_SIZE: u32 = 20;
/// Baseline offset below the vertical middle, as a share of the font size.
const BASELINE_SHIFT: f64 = 0.3;

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| "failed to encode PNG")?;
    Ok(bytes)
}

/// Draws every non-empty word left-anchored at the vertical middle of its
/// position, in its own color, size and weight.
pub fn compose_words(
    background: &DynamicImage,
    words: &[WordSegment],
    fonts: &dyn FontSet,
) -> Result<Vec<u8>> {
    let mut svg = open_svg(background)?;
    for word in words.iter().filter(|word| !word.text.trim().is_empty()) {
        let size = word.font_size.unwrap_or(DEFAULT_FONT_SIZE);
        let font_weight = word.font_weight();
        let color = word.style.map(|style| style.text_color).unwrap_or(BLACK);
        let y = f64::from(word.position.top + word.position.bottom) / 2.0 + size * BASELINE_SHIFT;
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" font-weight="{weight}" fill="{color}" xml:space="preserve">{text}</text>"#,
            x = word.position.left,
            y = y,
            size = size,
            family = escape_xml(fonts.family(font_weight)),
            weight = font_weight,
            color = color.to_hex(),
            text = escape_xml(&word.text)
        ));
    }
    svg.push_str("</svg>");
    render_svg_png(&svg, &fonts.font_data())
}

/// Blue boxes around `boxes`, each numbered from 1 in red above its corner.
pub fn draw_numbered_boxes(image: &DynamicImage, boxes: &[Position]) -> Result<Vec<u8>> {
    let mut svg = open_svg(image)?;
    for (index, area) in boxes.iter().enumerate() {
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{stroke}" stroke-width="{thickness}"/>"#,
            x = area.left,
            y = area.top,
            w = area.width(),
            h = area.height(),
            stroke = BOX_COLOR,
            thickness = BOX_STROKE
        ));
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" font-family="sans-serif" fill="{color}">{number}</text>"#,
            x = area.left,
            y = area.top - 1,
            size = NUMBER_SIZE,
            color = NUMBER_COLOR,
            number = index + 1
        ));
    }
    svg.push_str("</svg>");
    render_svg_png(&svg, &[])
}

fn open_svg(background: &DynamicImage) -> Result<String> {
    let (width, height) = background.dimensions();
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(encode_png(background)?));
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));
    Ok(svg)
}

fn render_svg_png(svg: &str, font_data: &[&[u8]]) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for data in font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    encode_png(&DynamicImage::ImageRgba8(image))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
