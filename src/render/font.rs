use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ttf_parser::{Face, name_id};
use usvg::fontdb;

use crate::languages::Language;
use crate::style::{BOLD_WEIGHT, SEMIBOLD_WEIGHT};

/// Measures rendered text in pixels.
pub trait TextMeasurer: Send + Sync {
    /// `(width, height)` of `text` at `size` px in the face chosen for `font_weight`.
    fn measure(&self, text: &str, size: f64, font_weight: u32) -> (f64, f64);
}

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
    space_advance: u16,
    line_units: i32,
    family: String,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data, 0)
            .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
    }

    pub fn from_data(data: Vec<u8>, face_index: u32) -> Result<Self> {
        let face = Face::parse(&data, face_index).map_err(|err| anyhow!("{}", err))?;
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let line_units = i32::from(face.ascender()) - i32::from(face.descender());
        let family = family_name(&face).unwrap_or_else(|| "sans-serif".to_string());
        Ok(Self {
            data: Arc::new(data),
            face_index,
            units_per_em,
            space_advance,
            line_units: line_units.max(1),
            family,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn measure(&self, text: &str, size: f64) -> (f64, f64) {
        let scale = size / f64::from(self.units_per_em);
        let height = f64::from(self.line_units) * scale;
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return (text.chars().count() as f64 * size * 0.6, height);
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(u32::from(glyph_advance));
        }
        (f64::from(advance) * scale, height)
    }
}

/// The three weights of one language's sans-serif family.
#[derive(Debug, Clone)]
pub struct LanguageFonts {
    pub regular: FontMetrics,
    pub semi_bold: FontMetrics,
    pub bold: FontMetrics,
}

impl LanguageFonts {
    pub fn for_weight(&self, font_weight: u32) -> &FontMetrics {
        if font_weight >= BOLD_WEIGHT {
            &self.bold
        } else if font_weight >= SEMIBOLD_WEIGHT {
            &self.semi_bold
        } else {
            &self.regular
        }
    }

    pub fn faces(&self) -> [&FontMetrics; 3] {
        [&self.regular, &self.semi_bold, &self.bold]
    }
}

impl TextMeasurer for LanguageFonts {
    fn measure(&self, text: &str, size: f64, font_weight: u32) -> (f64, f64) {
        self.for_weight(font_weight).measure(text, size)
    }
}

/// Faces of one language as the layout and the compositor see them.
pub trait FontSet: TextMeasurer {
    /// Family name the compositor asks for at `font_weight`.
    fn family(&self, font_weight: u32) -> &str;

    /// Raw font files to load next to the system fonts; may be empty.
    fn font_data(&self) -> Vec<&[u8]>;
}

impl FontSet for LanguageFonts {
    fn family(&self, font_weight: u32) -> &str {
        self.for_weight(font_weight).family()
    }

    fn font_data(&self) -> Vec<&[u8]> {
        self.faces().iter().map(|face| face.data()).collect()
    }
}

pub trait FontProvider: Send + Sync {
    fn fonts_for_language(&self, language: Language) -> Result<Arc<dyn FontSet>>;
}

/// Reads `<root>/<English|Korean|Japanese>/SansSerif-{Regular,SemiBold,Bold}.ttf`.
#[derive(Debug, Clone)]
pub struct DirectoryFontProvider {
    root: PathBuf,
}

impl DirectoryFontProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, language: Language, face: &str) -> PathBuf {
        self.root
            .join(language.font_dir_name())
            .join(format!("SansSerif-{}.ttf", face))
    }
}

impl FontProvider for DirectoryFontProvider {
    fn fonts_for_language(&self, language: Language) -> Result<Arc<dyn FontSet>> {
        Ok(Arc::new(LanguageFonts {
            regular: FontMetrics::from_file(&self.path(language, "Regular"))?,
            semi_bold: FontMetrics::from_file(&self.path(language, "SemiBold"))?,
            bold: FontMetrics::from_file(&self.path(language, "Bold"))?,
        }))
    }
}

/// Installed fonts, queried by the language's preferred families.
pub struct SystemFontProvider {
    db: fontdb::Database,
}

impl SystemFontProvider {
    pub fn new() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Self { db }
    }

    fn load(&self, language: Language, weight: u32) -> Result<FontMetrics> {
        let families = language
            .system_font_families()
            .iter()
            .map(|name| match *name {
                "sans-serif" => fontdb::Family::SansSerif,
                other => fontdb::Family::Name(other),
            })
            .collect::<Vec<_>>();
        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight(weight as u16),
            ..Default::default()
        };
        let id = self
            .db
            .query(&query)
            .ok_or_else(|| anyhow!("no system font for {} (weight {})", language, weight))?;
        let (data, index) = self
            .db
            .with_face_data(id, |data, index| (data.to_vec(), index))
            .ok_or_else(|| anyhow!("failed to load system font data for {}", language))?;
        FontMetrics::from_data(data, index)
    }
}

impl FontProvider for SystemFontProvider {
    fn fonts_for_language(&self, language: Language) -> Result<Arc<dyn FontSet>> {
        Ok(Arc::new(LanguageFonts {
            regular: self.load(language, crate::style::REGULAR_WEIGHT)?,
            semi_bold: self.load(language, SEMIBOLD_WEIGHT)?,
            bold: self.load(language, BOLD_WEIGHT)?,
        }))
    }
}

fn family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
