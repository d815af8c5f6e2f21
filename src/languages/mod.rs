use anyhow::{Result, anyhow};
use serde::Serialize;
use std::fmt;

/// Target languages with bundled fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "ko-KR")]
    KoKr,
    #[serde(rename = "ja-JP")]
    JaJp,
}

impl Language {
    pub fn parse(code: &str) -> Result<Self> {
        match normalize_code(code).as_str() {
            "en" | "en-us" | "eng" | "english" => Ok(Language::EnUs),
            "ko" | "ko-kr" | "kor" | "korean" => Ok(Language::KoKr),
            "ja" | "ja-jp" | "jpn" | "japanese" => Ok(Language::JaJp),
            other => Err(anyhow!(
                "unsupported target language '{}' (supported: en-US, ko-KR, ja-JP)",
                other
            )),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::EnUs => "en-US",
            Language::KoKr => "ko-KR",
            Language::JaJp => "ja-JP",
        }
    }

    /// Name used inside completion prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::EnUs => "American English (United States) (en-US)",
            Language::KoKr => "Korean (South Korea) (ko-KR)",
            Language::JaJp => "Japanese (Japan) (ja-JP)",
        }
    }

    /// Directory holding this language's font family.
    pub fn font_dir_name(&self) -> &'static str {
        match self {
            Language::EnUs => "English",
            Language::KoKr => "Korean",
            Language::JaJp => "Japanese",
        }
    }

    pub fn system_font_families(&self) -> &'static [&'static str] {
        match self {
            Language::EnUs => &["Noto Sans", "DejaVu Sans", "Arial", "sans-serif"],
            Language::KoKr => &[
                "Pretendard",
                "Noto Sans CJK KR",
                "Apple SD Gothic Neo",
                "sans-serif",
            ],
            Language::JaJp => &[
                "LINE Seed JP",
                "Noto Sans CJK JP",
                "Hiragino Sans",
                "sans-serif",
            ],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Hangul,
    Kana,
    Latin,
    /// A letter from a script without a target language.
    OtherLetter,
}

impl Script {
    pub fn language(&self) -> Option<Language> {
        match self {
            Script::Hangul => Some(Language::KoKr),
            Script::Kana => Some(Language::JaJp),
            Script::Latin => Some(Language::EnUs),
            Script::OtherLetter => None,
        }
    }
}

/// Script of a letter; `None` for digits, punctuation, whitespace and symbols.
pub fn detect_script(ch: char) -> Option<Script> {
    let code = ch as u32;
    if matches!(
        code,
        0x1100..=0x11FF
            | 0x302E..=0x302F
            | 0x3131..=0x318E
            | 0x3200..=0x321E
            | 0x3260..=0x327E
            | 0xA960..=0xA97C
            | 0xAC00..=0xD7A3
            | 0xD7B0..=0xD7FB
            | 0xFFA0..=0xFFDC
    ) {
        return Some(Script::Hangul);
    }
    if matches!(
        code,
        0x3041..=0x3096
            | 0x309D..=0x309F
            | 0x30A1..=0x30FA
            | 0x30FD..=0x30FF
            | 0x31F0..=0x31FF
            | 0x32D0..=0x32FE
            | 0xFF66..=0xFF6F
            | 0xFF71..=0xFF9D
    ) {
        return Some(Script::Kana);
    }
    if !ch.is_alphabetic() {
        return None;
    }
    if matches!(
        code,
        0x0041..=0x005A
            | 0x0061..=0x007A
            | 0x00AA
            | 0x00BA
            | 0x00C0..=0x00D6
            | 0x00D8..=0x00F6
            | 0x00F8..=0x024F
            | 0x1D00..=0x1D25
            | 0x1E00..=0x1EFF
            | 0x2C60..=0x2C7F
            | 0xA720..=0xA7FF
            | 0xFF21..=0xFF3A
            | 0xFF41..=0xFF5A
    ) {
        return Some(Script::Latin);
    }
    Some(Script::OtherLetter)
}

pub fn is_letter(ch: char) -> bool {
    detect_script(ch).is_some()
}

/// True when `text` contains no letter of any script.
pub fn is_only_symbol(text: &str) -> bool {
    !text.chars().any(is_letter)
}

/// True when `text` has a letter whose script does not belong to `target`.
pub fn has_foreign_letter(text: &str, target: Language) -> bool {
    text.chars()
        .filter_map(detect_script)
        .any(|script| script.language() != Some(target))
}

fn normalize_code(code: &str) -> String {
    code.trim().replace('_', "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_codes() {
        assert_eq!(Language::parse("en").unwrap(), Language::EnUs);
        assert_eq!(Language::parse("ko_KR").unwrap(), Language::KoKr);
        assert_eq!(Language::parse(" JA-jp ").unwrap(), Language::JaJp);
        assert!(Language::parse("fr").is_err());
    }

    #[test]
    fn detects_scripts() {
        assert_eq!(detect_script('밥'), Some(Script::Hangul));
        assert_eq!(detect_script('か'), Some(Script::Kana));
        assert_eq!(detect_script('カ'), Some(Script::Kana));
        assert_eq!(detect_script('é'), Some(Script::Latin));
        assert_eq!(detect_script('漢'), Some(Script::OtherLetter));
        assert_eq!(detect_script('7'), None);
        assert_eq!(detect_script('※'), None);
    }

    #[test]
    fn symbol_runs_have_no_letters() {
        assert!(is_only_symbol("(), 123"));
        assert!(is_only_symbol(""));
        assert!(!is_only_symbol("a,"));
    }

    #[test]
    fn foreign_letters_relative_to_target() {
        assert!(has_foreign_letter("Hello 밥", Language::EnUs));
        assert!(!has_foreign_letter("Hello, 2024!", Language::EnUs));
        assert!(has_foreign_letter("漢字", Language::JaJp));
    }
}
