//! Minimal hOCR reader for tesseract output.
//!
//! Tags are scanned in document order and attached to the most recent open
//! container of the parent level, which matches how tesseract nests
//! `ocr_page > ocr_carea > ocr_par > ocr_line > ocrx_word`.

use crate::geometry::Position;

use super::{Block, Page, Paragraph, TextAnnotation, Word, rect_vertices};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HocrPage {
    pub width: u32,
    pub height: u32,
    pub blocks: Vec<HocrBlock>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HocrBlock {
    pub bbox: Option<Position>,
    pub paragraphs: Vec<HocrParagraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HocrParagraph {
    pub bbox: Option<Position>,
    pub lines: Vec<HocrLine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HocrLine {
    pub bbox: Option<Position>,
    /// Estimated pixel height of the line's font.
    pub x_size: Option<f64>,
    pub words: Vec<HocrWord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HocrWord {
    pub text: String,
    pub bbox: Position,
    pub confidence: Option<f32>,
    pub bold: bool,
}

const LINE_CLASSES: &[&str] = &["ocr_line", "ocr_caption", "ocr_header", "ocr_textfloat"];

pub fn parse_hocr(hocr: &str) -> Vec<HocrPage> {
    let bytes = hocr.as_bytes();
    let mut pages: Vec<HocrPage> = Vec::new();
    let mut i = 0usize;
    while let Some(start) = find_byte(bytes, b'<', i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        i = tag_end + 1;
        let tag = &hocr[start..tag_end];
        if tag.starts_with("</") || tag.starts_with("<!") || tag.starts_with("<?") {
            continue;
        }
        let Some(class) = extract_attr(tag, "class") else {
            continue;
        };
        let title = extract_attr(tag, "title").unwrap_or_default();
        let bbox = parse_bbox(&title);
        if has_class(&class, "ocr_page") {
            let (width, height) = bbox
                .map(|bbox| (bbox.right.max(0) as u32, bbox.bottom.max(0) as u32))
                .unwrap_or((0, 0));
            pages.push(HocrPage {
                width,
                height,
                blocks: Vec::new(),
            });
        } else if has_class(&class, "ocr_carea") {
            current_page(&mut pages).blocks.push(HocrBlock {
                bbox,
                paragraphs: Vec::new(),
            });
        } else if has_class(&class, "ocr_par") {
            current_block(&mut pages).paragraphs.push(HocrParagraph {
                bbox,
                lines: Vec::new(),
            });
        } else if LINE_CLASSES.iter().any(|name| has_class(&class, name)) {
            let x_size = title_property(&title, "x_size")
                .and_then(|values| values.first().and_then(|value| value.parse::<f64>().ok()));
            current_paragraph(&mut pages).lines.push(HocrLine {
                bbox,
                x_size,
                words: Vec::new(),
            });
        } else if has_class(&class, "ocrx_word") {
            let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
                break;
            };
            i = inner_end + "</span>".len();
            let inner = &hocr[inner_start..inner_end];
            let text = decode_entities(&strip_tags(inner)).replace('\u{00a0}', " ");
            let text = text.trim();
            let Some(bbox) = bbox else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let confidence = title_property(&title, "x_wconf")
                .and_then(|values| values.first().and_then(|value| value.parse::<f32>().ok()));
            current_line(&mut pages).words.push(HocrWord {
                text: text.to_string(),
                bbox,
                confidence,
                bold: inner.contains("<strong>") || inner.contains("<b>"),
            });
        }
    }
    pages
}

/// Page/carea/par levels become pages, blocks and paragraphs; lines are flattened
/// into their paragraph's word list.
pub(crate) fn to_annotation(pages: &[HocrPage]) -> TextAnnotation {
    let vertices = |bbox: &Option<Position>| bbox.as_ref().map(rect_vertices).unwrap_or_default();
    TextAnnotation {
        pages: pages
            .iter()
            .map(|page| Page {
                width: page.width,
                height: page.height,
                blocks: page
                    .blocks
                    .iter()
                    .map(|block| Block {
                        bounding_poly: vertices(&block.bbox),
                        paragraphs: block
                            .paragraphs
                            .iter()
                            .map(|paragraph| Paragraph {
                                bounding_poly: vertices(&paragraph.bbox),
                                words: paragraph
                                    .lines
                                    .iter()
                                    .flat_map(|line| line.words.iter())
                                    .map(|word| Word {
                                        text: word.text.clone(),
                                        bounding_poly: rect_vertices(&word.bbox),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn current_page(pages: &mut Vec<HocrPage>) -> &mut HocrPage {
    if pages.is_empty() {
        pages.push(HocrPage::default());
    }
    let last = pages.len() - 1;
    &mut pages[last]
}

fn current_block(pages: &mut Vec<HocrPage>) -> &mut HocrBlock {
    let page = current_page(pages);
    if page.blocks.is_empty() {
        page.blocks.push(HocrBlock::default());
    }
    let last = page.blocks.len() - 1;
    &mut page.blocks[last]
}

fn current_paragraph(pages: &mut Vec<HocrPage>) -> &mut HocrParagraph {
    let block = current_block(pages);
    if block.paragraphs.is_empty() {
        block.paragraphs.push(HocrParagraph::default());
    }
    let last = block.paragraphs.len() - 1;
    &mut block.paragraphs[last]
}

fn current_line(pages: &mut Vec<HocrPage>) -> &mut HocrLine {
    let paragraph = current_paragraph(pages);
    if paragraph.lines.is_empty() {
        paragraph.lines.push(HocrLine::default());
    }
    let last = paragraph.lines.len() - 1;
    &mut paragraph.lines[last]
}

fn has_class(class: &str, name: &str) -> bool {
    class.split_whitespace().any(|value| value == name)
}

/// Values of one `; `-separated property of an hOCR title attribute.
fn title_property<'a>(title: &'a str, key: &str) -> Option<Vec<&'a str>> {
    title.split(';').map(str::trim).find_map(|property| {
        let mut parts = property.split_whitespace();
        (parts.next()? == key).then(|| parts.collect())
    })
}

fn parse_bbox(title: &str) -> Option<Position> {
    let values = title_property(title, "bbox")?;
    let nums = values
        .iter()
        .filter_map(|value| value.parse::<i32>().ok())
        .collect::<Vec<_>>();
    let [x1, y1, x2, y2] = nums.as_slice() else {
        return None;
    };
    if x2 < x1 || y2 < y1 {
        return None;
    }
    Some(Position::new(*y1, *x1, *y2, *x2))
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|pos| from + pos)
}

fn find_span_inner(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut depth = 1i32;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if bytes[i..].starts_with(b"<span") {
                depth += 1;
            } else if bytes[i..].starts_with(b"</span") {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i));
                }
            }
        }
        i += 1;
    }
    None
}

fn extract_attr(tag: &str, name: &str) -> Option<String> {
    let needle = format!(" {}=", name);
    let idx = tag.find(&needle)?;
    let rest = &tag[idx + needle.len()..];
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn strip_tags(value: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
