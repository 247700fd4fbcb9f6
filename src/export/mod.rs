use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::letter::Letter;

pub mod docx;
pub mod pdf;

pub use docx::DocxRenderer;
pub use pdf::{PdfFonts, PdfRenderer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// One line with text pinned to both margins.
    Columns { left: String, right: String },
    Text {
        text: String,
        align: Align,
        bold: bool,
        underline: bool,
    },
    /// A blank line.
    Spacer,
}

impl Block {
    pub fn plain(text: impl Into<String>) -> Self {
        Block::Text {
            text: text.into(),
            align: Align::Left,
            bold: false,
            underline: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Block::Text {
            text: text.into(),
            align: Align::Left,
            bold: true,
            underline: false,
        }
    }

    pub fn aligned(text: impl Into<String>, align: Align) -> Self {
        Block::Text {
            text: text.into(),
            align,
            bold: false,
            underline: false,
        }
    }
}

/// Fixed-layout document handed to the renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: Block) -> &mut Self {
        self.blocks.push(block);
        self
    }

    pub fn gap(&mut self, lines: usize) -> &mut Self {
        self.blocks
            .extend(std::iter::repeat(Block::Spacer).take(lines));
        self
    }
}

pub trait Renderer {
    fn render(&self, document: &Document) -> Result<Vec<u8>>;
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
        }
    }

    /// DOCX is editable, so only admins may produce it.
    pub fn requires_admin(self) -> bool {
        matches!(self, ExportFormat::Docx)
    }

    pub fn renderer(self) -> Box<dyn Renderer> {
        match self {
            ExportFormat::Pdf => Box::new(PdfRenderer::default()),
            ExportFormat::Docx => Box::new(DocxRenderer::default()),
        }
    }
}

/// The header, salutation, subject, body, remarks and closing of one letter.
pub fn letter_document(letter: &Letter) -> Document {
    let mut doc = Document::new(format!("Letter {}", letter.letter_number));
    doc.push(Block::Columns {
        left: format!("Letter No: {}", letter.letter_number),
        right: format!("Date: {}", letter.formatted_date()),
    })
    .gap(3);

    if let Some(recipient) = &letter.recipient_name {
        doc.push(Block::plain(format!("To: {recipient}"))).gap(1);
    }
    doc.push(Block::plain(letter.salutation.clone())).gap(3);
    doc.push(Block::Text {
        text: format!("Subject: {}", letter.subject),
        align: Align::Center,
        bold: true,
        underline: true,
    })
    .gap(3);
    doc.push(Block::plain(letter.main_body.clone()));

    if let Some(remarks) = &letter.special_remarks {
        doc.gap(2)
            .push(Block::bold("Special Remarks:"))
            .push(Block::plain(remarks.clone()));
    }

    doc.gap(4)
        .push(Block::aligned(letter.closing.clone(), Align::Right));
    if let Some(sender) = &letter.sender_name {
        doc.push(Block::aligned(sender.clone(), Align::Right));
    }
    doc
}

/// `Letter_{number}.{ext}`, with path separators and other unsafe characters replaced.
pub fn export_file_name(letter_number: &str, format: ExportFormat) -> String {
    let safe: String = letter_number
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("Letter_{safe}.{}", format.extension())
}

pub fn write_document(
    document: &Document,
    format: ExportFormat,
    dir: &Path,
    file_name: &str,
) -> Result<PathBuf> {
    let bytes = format
        .renderer()
        .render(document)
        .with_context(|| format!("rendering {format} for {}", document.title))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("creating export directory {}", dir.display()))?;
    let path = dir.join(file_name);
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), %format, "exported document");
    Ok(path)
}

pub fn export_letter(letter: &Letter, format: ExportFormat, dir: &Path) -> Result<PathBuf> {
    let file_name = export_file_name(&letter.letter_number, format);
    write_document(&letter_document(letter), format, dir, &file_name)
}
