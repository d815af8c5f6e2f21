//! Image to markdown: OCR text laid out on a character grid, turned into a
//! markdown document by a completion model, then translated.

use tracing::debug;

use crate::error::{Error, Result};
use crate::fewshot::FewShot;
use crate::languages::Language;
use crate::providers::{ImageData, Provider};
use crate::segments::{ParagraphSegment, WordSegment};
use crate::translate::{PromptKind, RetryPolicy, render_system_prompt};

pub const MARKDOWN_PREFIX: &str = "```markdown\n";
pub const MARKDOWN_SUFFIX: &str = "\n```";
const MAX_BLANK_ROWS: usize = 2;

/// Places every paragraph on a monospace grid sized from the smallest
/// character cell, so columns line up the way they do in the image.
///
/// ```text
/// Monday  Tuesday  Wednesday
/// A       B        C
/// ```
pub fn align_with_spaces(
    image_width: u32,
    image_height: u32,
    paragraphs: &[ParagraphSegment],
) -> Result<String> {
    if paragraphs.is_empty() {
        return Ok(String::new());
    }
    let mut cell_height = i32::MAX;
    let mut cell_width = i32::MAX;
    for paragraph in paragraphs {
        let words: Vec<&WordSegment> = paragraph.words().collect();
        let height = words.iter().map(|word| word.position.height()).max().unwrap_or(0);
        let width = words.iter().map(|word| word.position.width()).max().unwrap_or(0);
        if height <= 0 || width <= 0 {
            return Err(Error::invalid_input("text segment has invalid dimensions"));
        }
        let longest = paragraph
            .lines
            .iter()
            .map(|line| line.text().chars().count())
            .max()
            .unwrap_or(0);
        if longest == 0 {
            return Err(Error::invalid_input("text segment is empty"));
        }
        cell_height = cell_height.min(height / paragraph.lines.len() as i32);
        cell_width = cell_width.min(width / longest as i32);
    }
    if cell_height <= 0 || cell_width <= 0 {
        return Err(Error::invalid_input("text segment is too small for a grid cell"));
    }

    let rows = (f64::from(image_height) / f64::from(cell_height)).ceil() as usize;
    let columns = (f64::from(image_width) / f64::from(cell_width)).ceil() as usize;
    debug!("markdown grid {}x{} (cell {}x{})", columns, rows, cell_width, cell_height);
    let mut grid = vec![vec![' '; columns]; rows];

    for paragraph in paragraphs {
        let left = paragraph.words().map(|word| word.position.left).min().unwrap_or(0);
        let top = paragraph.words().map(|word| word.position.top).min().unwrap_or(0);
        let start_x = (left / cell_width).max(0) as usize;
        let start_y = (top / cell_height).max(0) as usize;
        if start_y + paragraph.lines.len() > rows {
            return Err(Error::LayoutOverflow(
                "text segment exceeds the image height".to_string(),
            ));
        }
        for (offset, line) in paragraph.lines.iter().enumerate() {
            let chars: Vec<char> = line
                .words
                .iter()
                .flat_map(|word| word.text.chars().chain(std::iter::once(' ')))
                .collect();
            if start_x + chars.len() > columns {
                return Err(Error::LayoutOverflow(
                    "text segment exceeds the image width".to_string(),
                ));
            }
            grid[start_y + offset][start_x..start_x + chars.len()].copy_from_slice(&chars);
        }
    }

    let mut output = String::new();
    let mut blank_rows = 0;
    for row in grid {
        let row: String = row.into_iter().collect();
        let trimmed = row.trim_end_matches(' ');
        if trimmed.is_empty() {
            blank_rows += 1;
            if blank_rows > MAX_BLANK_ROWS {
                continue;
            }
        } else {
            blank_rows = 0;
        }
        output.push_str(trimmed);
        output.push('\n');
    }
    Ok(output)
}

/// The text between the first ```markdown fence and the last closing fence.
pub fn extract_markdown(reply: &str) -> Result<String> {
    let start = reply
        .find(MARKDOWN_PREFIX)
        .ok_or_else(|| Error::schema("no markdown block found"))?
        + MARKDOWN_PREFIX.len();
    let end = reply
        .rfind(MARKDOWN_SUFFIX)
        .filter(|end| *end >= start)
        .ok_or_else(|| Error::schema("no closing markdown block found"))?;
    Ok(reply[start..end].to_string())
}

/// Asks `provider` to turn the aligned text and the image into markdown,
/// retrying until the reply carries a markdown fence.
pub async fn to_markdown<P: Provider>(
    provider: &P,
    examples: &FewShot,
    retry: RetryPolicy,
    aligned: &str,
    image: &ImageData,
) -> Result<String> {
    let system = render_system_prompt(PromptKind::ToMarkdown, Language::EnUs)
        .map_err(|err| Error::collaborator("prompt", err))?;
    retry
        .run("markdown", |_| {
            let request = provider
                .clone()
                .append_system_input(system.clone())
                .append_user_input(examples.markdown.input.clone())
                .append_assistant_input(examples.markdown_reply())
                .append_user_input(aligned.to_string())
                .append_user_image(image.clone());
            async move {
                let response = request
                    .complete()
                    .await
                    .map_err(|err| Error::collaborator("provider", err))?;
                extract_markdown(&response.text)
            }
        })
        .await
}

pub async fn translate_markdown<P: Provider>(
    provider: &P,
    markdown: &str,
    target: Language,
) -> Result<String> {
    let system = render_system_prompt(PromptKind::TranslateMarkdown, target)
        .map_err(|err| Error::collaborator("prompt", err))?;
    let response = provider
        .clone()
        .append_system_input(system)
        .append_user_input(markdown.to_string())
        .complete()
        .await
        .map_err(|err| Error::collaborator("provider", err))?;
    Ok(response.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::segments::LineSegment;
    use crate::test_util::{FakeProvider, quick_options};

    fn word(text: &str, top: i32, left: i32) -> WordSegment {
        let width = text.chars().count() as i32 * 10;
        WordSegment::new(text, Position::new(top, left, top + 20, left + width))
    }

    fn paragraph(lines: Vec<Vec<WordSegment>>) -> ParagraphSegment {
        ParagraphSegment::new(lines.into_iter().map(LineSegment::new).collect())
    }

    #[test]
    fn columns_line_up_on_the_grid() {
        let paragraphs = vec![
            paragraph(vec![vec![word("Mon", 0, 0)], vec![word("A", 20, 0)]]),
            paragraph(vec![vec![word("Tue", 0, 60)], vec![word("B", 20, 60)]]),
        ];
        let text = align_with_spaces(100, 100, &paragraphs).unwrap();
        assert_eq!(text, "Mon   Tue\nA     B\n\n\n");
    }

    #[test]
    fn blank_rows_are_capped_at_two() {
        let paragraphs = vec![
            paragraph(vec![vec![word("top", 0, 0)]]),
            paragraph(vec![vec![word("end", 200, 0)]]),
        ];
        let text = align_with_spaces(40, 220, &paragraphs).unwrap();
        assert_eq!(text, "top\n\n\nend\n");
    }

    #[test]
    fn degenerate_and_overflowing_text_is_rejected() {
        let flat = vec![paragraph(vec![vec![WordSegment::new(
            "x",
            Position::new(5, 5, 5, 20),
        )]])];
        assert!(matches!(
            align_with_spaces(100, 100, &flat),
            Err(Error::InvalidInput(_))
        ));

        let wide = vec![paragraph(vec![vec![word("abcd", 0, 0), word("efgh", 0, 45)]])];
        assert!(matches!(
            align_with_spaces(45, 40, &wide),
            Err(Error::LayoutOverflow(_))
        ));
    }

    #[test]
    fn extracts_between_fences() {
        let reply = "Here:\n```markdown\n# Menu\n\n- Coffee\n```\nthanks";
        assert_eq!(extract_markdown(reply).unwrap(), "# Menu\n\n- Coffee");
        assert!(extract_markdown("# Menu").is_err());
        assert!(extract_markdown("```markdown\n```").is_err());
    }

    #[tokio::test]
    async fn retries_until_fenced_markdown() {
        let provider = FakeProvider::scripted(vec!["# Menu", "```markdown\n# Menu\n```"]);
        let image = ImageData::from_bytes(vec![1, 2, 3]);
        let markdown = to_markdown(
            &provider,
            &FewShot::default(),
            quick_options().retry,
            "Menu\n",
            &image,
        )
        .await
        .unwrap();
        assert_eq!(markdown, "# Menu");
        assert_eq!(provider.calls(), 2);
        let request = &provider.requests()[1];
        assert_eq!(request.len(), 5);
        assert!(request[2].starts_with(MARKDOWN_PREFIX));
        assert_eq!(request[3], "Menu\n");
        assert_eq!(request[4], "<image>");
    }
}
