//! Sentence grouping: lines of multi-line paragraphs are re-grouped into
//! sentences so each sentence is translated as one unit.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::segments::{LineSegment, ParagraphSegment};

use super::batch::IdText;

/// Lines waiting for a grouping reply.
#[derive(Debug, Clone, Default)]
pub struct GroupingRequest {
    /// Lines of single-line paragraphs, passed through untouched.
    pub standalone: Vec<LineSegment>,
    /// Lines of multi-line paragraphs; the index is the wire id.
    pub candidates: Vec<LineSegment>,
    /// Paragraph-shaped wire payload.
    pub payload: Vec<Vec<IdText>>,
}

impl GroupingRequest {
    /// `None` when no paragraph has more than one line.
    pub fn build(paragraphs: &[ParagraphSegment]) -> Option<Self> {
        if !paragraphs.iter().any(|paragraph| paragraph.lines.len() > 1) {
            return None;
        }
        let mut request = Self::default();
        for paragraph in paragraphs {
            if paragraph.lines.len() <= 1 {
                request.standalone.extend(paragraph.lines.iter().cloned());
                continue;
            }
            let mut items = Vec::with_capacity(paragraph.lines.len());
            for line in &paragraph.lines {
                items.push(IdText {
                    id: request.candidates.len(),
                    text: line.text(),
                });
                request.candidates.push(line.clone());
            }
            request.payload.push(items);
        }
        Some(request)
    }

    pub fn prompt_value(&self) -> Result<String> {
        to_json(&self.payload)
    }

    /// Standalone lines first, then one line per returned group with the
    /// font size cleared so it gets fitted again.
    pub fn assemble(self, groups: &[Vec<Vec<usize>>]) -> Result<Vec<LineSegment>> {
        validate_ids(groups, self.candidates.len())?;
        let mut lines = self.standalone;
        for group in groups.iter().flatten() {
            let words = group
                .iter()
                .flat_map(|id| self.candidates[*id].words.iter().cloned())
                .map(|mut word| {
                    word.font_size = None;
                    word
                })
                .collect();
            lines.push(LineSegment::new(words));
        }
        Ok(lines)
    }
}

/// The body of the first ```json fence, up to the last fence marker.
pub fn extract_json(reply: &str) -> Result<&str> {
    const OPEN: &str = "```json";
    let start = reply
        .find(OPEN)
        .ok_or_else(|| Error::schema("no JSON block in the text"))?
        + OPEN.len();
    let end = reply[start..]
        .rfind("```")
        .map(|offset| start + offset)
        .ok_or_else(|| Error::schema("no JSON block in the text"))?;
    Ok(reply[start..end].trim())
}

pub fn parse_groups(reply: &str) -> Result<Vec<Vec<Vec<usize>>>> {
    let body = extract_json(reply)?;
    serde_json::from_str(body)
        .map_err(|err| Error::schema(format!("unparsable grouping reply: {}", err)))
}

/// Every id in `0..count` appears exactly once.
pub fn validate_ids(groups: &[Vec<Vec<usize>>], count: usize) -> Result<()> {
    let mut seen = vec![false; count];
    let mut total = 0;
    for id in groups.iter().flatten().flatten() {
        total += 1;
        match seen.get_mut(*id) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => return Err(Error::schema(format!("id {} grouped twice", id))),
            None => return Err(Error::schema(format!("unknown id {}", id))),
        }
    }
    if total != count {
        return Err(Error::schema(format!(
            "expected {} grouped id(s), got {}",
            count, total
        )));
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|err| Error::invalid_input(format!("failed to encode prompt: {}", err)))
}
