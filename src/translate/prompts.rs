use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

use crate::languages::Language;

const TRANSLATE_SYSTEM: &str = include_str!("prompts/translate_system.tera");
const GROUPING_SYSTEM: &str = include_str!("prompts/grouping_system.tera");
const SENTENCES_SYSTEM: &str = include_str!("prompts/sentences_system.tera");
const MARKDOWN_SYSTEM: &str = include_str!("prompts/markdown_system.tera");
const TRANSLATE_MARKDOWN_SYSTEM: &str = include_str!("prompts/translate_markdown_system.tera");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    TranslateLines,
    GroupLines,
    TranslateSentences,
    ToMarkdown,
    TranslateMarkdown,
}

impl PromptKind {
    fn template(&self) -> (&'static str, &'static str) {
        match self {
            PromptKind::TranslateLines => ("translate_system", TRANSLATE_SYSTEM),
            PromptKind::GroupLines => ("grouping_system", GROUPING_SYSTEM),
            PromptKind::TranslateSentences => ("sentences_system", SENTENCES_SYSTEM),
            PromptKind::ToMarkdown => ("markdown_system", MARKDOWN_SYSTEM),
            PromptKind::TranslateMarkdown => ("translate_markdown_system", TRANSLATE_MARKDOWN_SYSTEM),
        }
    }
}

pub fn render_system_prompt(kind: PromptKind, target: Language) -> Result<String> {
    let (name, template) = kind.template();
    let mut context = TeraContext::new();
    context.insert("target_lang", target.prompt_name());
    Tera::one_off(template, &context, false)
        .with_context(|| format!("failed to render {} prompt", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_language_is_substituted() {
        let prompt = render_system_prompt(PromptKind::TranslateLines, Language::EnUs).unwrap();
        assert!(prompt.contains(&format!("Please translate into {}.", Language::EnUs.prompt_name())));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn every_template_renders() {
        for kind in [
            PromptKind::TranslateLines,
            PromptKind::GroupLines,
            PromptKind::TranslateSentences,
            PromptKind::ToMarkdown,
            PromptKind::TranslateMarkdown,
        ] {
            let prompt = render_system_prompt(kind, Language::JaJp).unwrap();
            assert!(!prompt.trim().is_empty(), "{:?}", kind);
        }
    }
}
