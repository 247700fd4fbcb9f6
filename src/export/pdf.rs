use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};
use unicode_width::UnicodeWidthStr;

use super::{Align, Block, Document, Renderer};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const WRAP_WIDTH_MM: f32 = 170.0;
const LINE_PITCH_MM: f32 = 5.0;
const FONT_SIZE: f32 = 12.0;
const PT_PER_MM: f32 = 72.0 / 25.4;
/// Mean advance of a serif glyph in em; drives wrapping and right alignment.
const MEAN_ADVANCE_EM: f32 = 0.5;
const LAYER: &str = "letter";

/// Points at a TrueType file to embed instead of the discovered system font.
pub const FONT_ENV: &str = "LETTERCRAFT_PDF_FONT";

const SYSTEM_FONTS: &[(&str, &str)] = &[
    (
        "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSerif-Bold.ttf",
    ),
    (
        "/usr/share/fonts/TTF/DejaVuSerif.ttf",
        "/usr/share/fonts/TTF/DejaVuSerif-Bold.ttf",
    ),
    (
        "/usr/share/fonts/dejavu/DejaVuSerif.ttf",
        "/usr/share/fonts/dejavu/DejaVuSerif-Bold.ttf",
    ),
    (
        "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSerif-Bold.ttf",
    ),
    (
        "/Library/Fonts/Times New Roman.ttf",
        "/Library/Fonts/Times New Roman Bold.ttf",
    ),
    (r"C:\Windows\Fonts\times.ttf", r"C:\Windows\Fonts\timesbd.ttf"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfFonts {
    /// Base-14 Times; glyphs outside Windows-1252 are dropped by the viewer.
    Builtin,
    /// TrueType faces embedded in the file, so every script they cover survives.
    Embedded { regular: PathBuf, bold: PathBuf },
}

impl PdfFonts {
    /// `LETTERCRAFT_PDF_FONT` first, then well-known serif faces, then base-14 Times.
    pub fn discover() -> Self {
        let configured = env::var_os(FONT_ENV).map(PathBuf::from);
        let fonts = Self::discover_from(configured, SYSTEM_FONTS);
        if fonts == PdfFonts::Builtin {
            tracing::warn!("no TrueType font found; PDF text is limited to Latin-1");
        }
        fonts
    }

    fn discover_from(configured: Option<PathBuf>, candidates: &[(&str, &str)]) -> Self {
        if let Some(path) = configured {
            if path.is_file() {
                return PdfFonts::Embedded {
                    regular: path.clone(),
                    bold: path,
                };
            }
            tracing::warn!(path = %path.display(), "configured PDF font does not exist");
        }
        candidates
            .iter()
            .map(|(regular, bold)| (Path::new(regular), Path::new(bold)))
            .find(|(regular, _)| regular.is_file())
            .map(|(regular, bold)| PdfFonts::Embedded {
                regular: regular.to_path_buf(),
                bold: (if bold.is_file() { bold } else { regular }).to_path_buf(),
            })
            .unwrap_or(PdfFonts::Builtin)
    }

    fn load(&self, doc: &PdfDocumentReference) -> Result<FontPair> {
        match self {
            PdfFonts::Builtin => Ok(FontPair {
                regular: doc
                    .add_builtin_font(BuiltinFont::TimesRoman)
                    .context("adding Times-Roman")?,
                bold: doc
                    .add_builtin_font(BuiltinFont::TimesBold)
                    .context("adding Times-Bold")?,
            }),
            PdfFonts::Embedded { regular, bold } => Ok(FontPair {
                regular: embed(doc, regular)?,
                bold: embed(doc, bold)?,
            }),
        }
    }
}

fn embed(doc: &PdfDocumentReference, path: &Path) -> Result<IndirectFontRef> {
    let bytes = fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    doc.add_external_font(bytes.as_slice())
        .with_context(|| format!("embedding font {}", path.display()))
}

struct FontPair {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// A4 pages with 20 mm margins, laid out top to bottom one line per block row.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    pub producer: String,
    pub fonts: PdfFonts,
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self {
            producer: concat!("lettercraft ", env!("CARGO_PKG_VERSION")).to_string(),
            fonts: PdfFonts::discover(),
        }
    }
}

impl Renderer for PdfRenderer {
    fn render(&self, document: &Document) -> Result<Vec<u8>> {
        let (doc, page, layer) = PdfDocument::new(
            document.title.as_str(),
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            LAYER,
        );
        let doc = doc.with_producer(self.producer.as_str());
        let fonts = self.fonts.load(&doc)?;

        let mut pen = Pen {
            layer: doc.get_page(page).get_layer(layer),
            doc: &doc,
            fonts,
            y_mm: MARGIN_MM,
        };
        for block in &document.blocks {
            pen.block(block);
        }
        drop(pen);

        doc.save_to_bytes().context("serialising PDF")
    }
}

struct Pen<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: FontPair,
    y_mm: f32,
}

impl Pen<'_> {
    fn block(&mut self, block: &Block) {
        match block {
            Block::Spacer => self.advance(),
            Block::Columns { left, right } => {
                self.start_line();
                self.write(left, MARGIN_MM, false);
                let right_x = PAGE_WIDTH_MM - MARGIN_MM - text_width_mm(right);
                self.write(right, right_x.max(MARGIN_MM), false);
                self.advance();
            }
            Block::Text {
                text,
                align,
                bold,
                underline,
            } => {
                for line in wrap(text, line_columns()) {
                    self.start_line();
                    let width = text_width_mm(&line);
                    let x = match align {
                        Align::Left => MARGIN_MM,
                        Align::Center => (PAGE_WIDTH_MM - width) / 2.0,
                        Align::Right => PAGE_WIDTH_MM - MARGIN_MM - width,
                    }
                    .max(MARGIN_MM);
                    self.write(&line, x, *bold);
                    if *underline && !line.trim().is_empty() {
                        self.underline(x, width);
                    }
                    self.advance();
                }
            }
        }
    }

    fn start_line(&mut self) {
        if self.y_mm > PAGE_HEIGHT_MM - MARGIN_MM {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER);
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y_mm = MARGIN_MM;
        }
    }

    fn baseline_mm(&self) -> f32 {
        PAGE_HEIGHT_MM - self.y_mm
    }

    fn write(&self, text: &str, x_mm: f32, bold: bool) {
        if text.trim().is_empty() {
            return;
        }
        let font = if bold {
            &self.fonts.bold
        } else {
            &self.fonts.regular
        };
        self.layer
            .use_text(text, FONT_SIZE, Mm(x_mm), Mm(self.baseline_mm()), font);
    }

    fn underline(&self, x_mm: f32, width_mm: f32) {
        let y = Mm(self.baseline_mm() - 1.0);
        self.layer.set_outline_thickness(0.6);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x_mm), y), false),
                (Point::new(Mm(x_mm + width_mm), y), false),
            ],
            is_closed: false,
        });
    }

    fn advance(&mut self) {
        self.y_mm += LINE_PITCH_MM;
    }
}

fn column_width_mm() -> f32 {
    FONT_SIZE * MEAN_ADVANCE_EM / PT_PER_MM
}

fn line_columns() -> usize {
    (WRAP_WIDTH_MM / column_width_mm()) as usize
}

fn text_width_mm(text: &str) -> f32 {
    text.width() as f32 * column_width_mm()
}

/// Greedy word wrap on display columns; hard breaks and leading indentation are kept.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let indent = &paragraph[..paragraph.len() - paragraph.trim_start().len()];
        let mut line = indent.to_string();
        let mut has_words = false;
        for word in paragraph.split_whitespace() {
            if has_words && line.width() + 1 + word.width() > columns {
                lines.push(std::mem::take(&mut line));
                has_words = false;
            }
            if has_words {
                line.push(' ');
            }
            line.push_str(word);
            has_words = true;
        }
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::letter_document;
    use crate::export::tests::sample_letter;
    use printpdf::lopdf;
    use tempfile::TempDir;

    fn builtin() -> PdfRenderer {
        PdfRenderer {
            producer: "test".into(),
            fonts: PdfFonts::Builtin,
        }
    }

    fn page_count(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes)
            .expect("parse rendered pdf")
            .get_pages()
            .len()
    }

    #[test]
    fn renders_a_one_page_letter_with_times() {
        let bytes = builtin()
            .render(&letter_document(&sample_letter()))
            .expect("render pdf");
        assert!(bytes.starts_with(b"%PDF-"));
        assert_eq!(page_count(&bytes), 1);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Times-Roman"));
        assert!(text.contains("Times-Bold"));
    }

    #[test]
    fn long_bodies_flow_onto_more_pages() {
        let mut letter = sample_letter();
        letter.main_body = (0..150)
            .map(|n| format!("Paragraph {n} of a very long letter."))
            .collect::<Vec<_>>()
            .join("\n");
        let bytes = builtin()
            .render(&letter_document(&letter))
            .expect("render pdf");
        assert!(page_count(&bytes) >= 3);
    }

    #[test]
    fn wrap_respects_columns_hard_breaks_and_indentation() {
        assert_eq!(wrap("alpha beta\ngamma", 80), vec!["alpha beta", "gamma"]);
        assert_eq!(
            wrap("    indented\n\nnext\n", 80),
            vec!["    indented", "", "next", ""]
        );

        let long = "word ".repeat(80);
        let wrapped = wrap(&long, 40);
        assert!(wrapped.len() > 1);
        assert!(wrapped.iter().all(|line| line.width() <= 40));
        assert_eq!(wrapped.join(" ").split_whitespace().count(), 80);
    }

    #[test]
    fn discovery_prefers_configured_then_candidates() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let regular = temp.path().join("Serif.ttf");
        let bold = temp.path().join("Serif-Bold.ttf");
        let custom = temp.path().join("Custom.ttf");
        for path in [&regular, &bold, &custom] {
            fs::write(path, b"font")?;
        }
        let regular_str = regular.to_string_lossy().into_owned();
        let bold_str = bold.to_string_lossy().into_owned();
        let missing_bold = temp.path().join("missing.ttf");
        let missing_bold_str = missing_bold.to_string_lossy().into_owned();

        assert_eq!(
            PdfFonts::discover_from(Some(custom.clone()), &[]),
            PdfFonts::Embedded {
                regular: custom.clone(),
                bold: custom,
            }
        );
        assert_eq!(
            PdfFonts::discover_from(
                Some(temp.path().join("nope.ttf")),
                &[
                    ("/no/such/font.ttf", "/no/such/bold.ttf"),
                    (regular_str.as_str(), bold_str.as_str()),
                ],
            ),
            PdfFonts::Embedded {
                regular: regular.clone(),
                bold,
            }
        );
        assert_eq!(
            PdfFonts::discover_from(None, &[(regular_str.as_str(), missing_bold_str.as_str())]),
            PdfFonts::Embedded {
                regular: regular.clone(),
                bold: regular,
            }
        );
        assert_eq!(
            PdfFonts::discover_from(None, &[("/no/such/font.ttf", "/no/such/bold.ttf")]),
            PdfFonts::Builtin
        );
        Ok(())
    }

    #[test]
    fn unreadable_font_is_an_error_not_a_silent_fallback() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let garbage = temp.path().join("broken.ttf");
        fs::write(&garbage, b"not a font")?;
        let renderer = PdfRenderer {
            producer: "test".into(),
            fonts: PdfFonts::Embedded {
                regular: garbage.clone(),
                bold: garbage,
            },
        };
        assert!(renderer.render(&Document::new("t")).is_err());
        Ok(())
    }

    #[test]
    fn embedded_font_carries_non_latin_text() {
        let PdfFonts::Embedded { regular, bold } = PdfFonts::discover_from(None, SYSTEM_FONTS)
        else {
            return;
        };
        let renderer = PdfRenderer {
            producer: "test".into(),
            fonts: PdfFonts::Embedded { regular, bold },
        };
        let mut doc = Document::new("Greek and Cyrillic");
        doc.push(Block::plain("Σας ευχαριστούμε – Привет"));
        let bytes = renderer.render(&doc).expect("render with embedded font");
        assert!(String::from_utf8_lossy(&bytes).contains("FontFile2"));
        assert_eq!(page_count(&bytes), 1);
    }
}
