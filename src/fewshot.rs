//! Few-shot example conversations sent ahead of the real request.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::settings::ExampleSettings;

const GROUPING_INPUT: &str = include_str!("../fewshot/grouping_input.json");
const GROUPING_OUTPUT: &str = include_str!("../fewshot/grouping_output.md");
const MARKDOWN_INPUT: &str = include_str!("../fewshot/markdown_input.txt");
const MARKDOWN_OUTPUT: &str = include_str!("../fewshot/markdown_output.md");

/// A user message and the assistant reply it should elicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FewShot {
    pub grouping: Example,
    pub markdown: Example,
}

impl Default for FewShot {
    fn default() -> Self {
        Self {
            grouping: Example {
                input: GROUPING_INPUT.trim_end().to_string(),
                output: GROUPING_OUTPUT.trim_end().to_string(),
            },
            markdown: Example {
                input: MARKDOWN_INPUT.trim_end().to_string(),
                output: MARKDOWN_OUTPUT.trim_end().to_string(),
            },
        }
    }
}

impl FewShot {
    /// Built-in examples, with any file named in settings taking precedence.
    pub fn load(settings: &ExampleSettings) -> Result<Self> {
        let mut examples = Self::default();
        override_with(&mut examples.grouping.input, settings.grouping_input.as_deref())?;
        override_with(&mut examples.grouping.output, settings.grouping_output.as_deref())?;
        override_with(&mut examples.markdown.input, settings.markdown_input.as_deref())?;
        override_with(&mut examples.markdown.output, settings.markdown_output.as_deref())?;
        Ok(examples)
    }

    /// The markdown reply as the assistant is expected to fence it.
    pub fn markdown_reply(&self) -> String {
        format!("```markdown\n{}\n```", self.markdown.output)
    }
}

fn override_with(slot: &mut String, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read example: {}", path.display()))?;
    *slot = content.trim_end().to_string();
    Ok(())
}
