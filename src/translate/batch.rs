//! Wire shape and validation for one translation batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Position;
use crate::segments::{LineSegment, WordSegment};

/// One word on the wire: `{"id": n, "text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdText {
    pub id: usize,
    pub text: String,
}

/// A translated line ready for layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedLine {
    /// Translated words in model order, each carrying its source word's
    /// position, style and font size.
    pub words: Vec<WordSegment>,
    /// Word positions of the source line in reading order.
    pub slots: Vec<Position>,
}

/// Tags every word of the batch with a sequential id starting at 1.
pub fn tag_batch(lines: &[LineSegment]) -> Vec<Vec<IdText>> {
    let mut next = 0;
    lines
        .iter()
        .map(|line| {
            line.words
                .iter()
                .map(|word| {
                    next += 1;
                    IdText {
                        id: next,
                        text: word.text.clone(),
                    }
                })
                .collect()
        })
        .collect()
}

/// Parses a reply, tolerating a surrounding ```json fence.
pub fn parse_reply(reply: &str) -> Result<Vec<Vec<IdText>>> {
    let body = strip_fence(reply);
    serde_json::from_str(body)
        .map_err(|err| Error::schema(format!("unparsable translation reply: {}", err)))
}

fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|ch: char| ch.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Line count, per-line word count and per-line id multiset must all match.
pub fn validate(sent: &[Vec<IdText>], received: &[Vec<IdText>]) -> Result<()> {
    if sent.len() != received.len() {
        return Err(Error::schema(format!(
            "expected {} line(s), got {}",
            sent.len(),
            received.len()
        )));
    }
    for (index, (original, translated)) in sent.iter().zip(received).enumerate() {
        if original.len() != translated.len() {
            return Err(Error::schema(format!(
                "line {}: expected {} word(s), got {}",
                index,
                original.len(),
                translated.len()
            )));
        }
        let mut expected: Vec<usize> = original.iter().map(|word| word.id).collect();
        let mut actual: Vec<usize> = translated.iter().map(|word| word.id).collect();
        expected.sort_unstable();
        actual.sort_unstable();
        if expected != actual {
            return Err(Error::schema(format!(
                "line {}: ids {:?} do not match {:?}",
                index, actual, expected
            )));
        }
    }
    Ok(())
}

/// Joins a validated reply back onto the source words by id.
pub fn reattach(lines: &[LineSegment], received: Vec<Vec<IdText>>) -> Result<Vec<TranslatedLine>> {
    let by_id: HashMap<usize, &WordSegment> = lines
        .iter()
        .flat_map(|line| line.words.iter())
        .enumerate()
        .map(|(index, word)| (index + 1, word))
        .collect();
    lines
        .iter()
        .zip(received)
        .map(|(line, translated)| {
            let words = translated
                .into_iter()
                .map(|item| {
                    let source = by_id
                        .get(&item.id)
                        .ok_or_else(|| Error::schema(format!("unknown id {}", item.id)))?;
                    Ok(WordSegment {
                        text: item.text,
                        position: source.position,
                        font_size: source.font_size,
                        style: source.style,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(TranslatedLine {
                words,
                slots: line.words.iter().map(|word| word.position).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    fn line(words: &[(&str, i32)]) -> LineSegment {
        LineSegment::new(
            words
                .iter()
                .map(|(text, left)| WordSegment::new(*text, Position::new(0, *left, 20, left + 40)))
                .collect(),
        )
    }

    fn item(id: usize, text: &str) -> IdText {
        IdText {
            id,
            text: text.to_string(),
        }
    }

    #[test]
    fn ids_run_across_lines_of_a_batch() {
        let lines = vec![line(&[("밥", 0), ("먹으러", 50)]), line(&[("가자", 0)])];
        let tagged = tag_batch(&lines);
        assert_json_snapshot!(tagged, @r#"
        [
          [
            {
              "id": 1,
              "text": "밥"
            },
            {
              "id": 2,
              "text": "먹으러"
            }
          ],
          [
            {
              "id": 3,
              "text": "가자"
            }
          ]
        ]
        "#);
    }

    #[test]
    fn parses_fenced_and_bare_replies() {
        let bare = parse_reply(r#"[[{"id":1,"text":"eat"}]]"#).expect("bare");
        let fenced = parse_reply("```json\n[[{\"id\":1,\"text\":\"eat\"}]]\n```").expect("fenced");
        assert_eq!(bare, fenced);
        assert!(matches!(
            parse_reply("Sure! Here you go"),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn validation_rejects_changed_multisets() {
        let sent = vec![vec![item(1, "a"), item(2, "b")], vec![item(3, "c")]];
        assert!(validate(&sent, &[vec![item(2, "B"), item(1, "A")], vec![item(3, "")]]).is_ok());
        // dropped line
        assert!(validate(&sent, &[vec![item(1, "A"), item(2, "B")]]).is_err());
        // dropped id
        assert!(validate(&sent, &[vec![item(1, "A")], vec![item(3, "C")]]).is_err());
        // duplicate replaces an id
        assert!(validate(&sent, &[vec![item(1, "A"), item(1, "B")], vec![item(3, "C")]]).is_err());
        // id moved to another line
        assert!(validate(&sent, &[vec![item(1, "A"), item(3, "C")], vec![item(2, "B")]]).is_err());
    }

    #[test]
    fn reattach_takes_position_from_matching_id() {
        let lines = vec![line(&[("밥", 0), ("먹으러", 50), ("가자", 100)])];
        let reply = vec![vec![item(3, "Let's"), item(2, "go"), item(1, "eat")]];
        let translated = reattach(&lines, reply).expect("reattach");
        let words = &translated[0].words;
        assert_eq!(words[0].text, "Let's");
        assert_eq!(words[0].position.left, 100);
        assert_eq!(words[2].text, "eat");
        assert_eq!(words[2].position.left, 0);
        let slots: Vec<_> = translated[0].slots.iter().map(|slot| slot.left).collect();
        assert_eq!(slots, vec![0, 50, 100]);
    }
}
