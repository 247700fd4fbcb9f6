use std::io::Cursor;

use anyhow::{Context, Result};
use docx_rs::{
    AlignmentType, BreakType, Docx, PageMargin, Paragraph, Run, RunFonts, Tab, TabValueType,
};

use super::{Align, Block, Document, Renderer};

// A4 in twentieths of a point, with 20 mm margins.
const PAGE_WIDTH_TWIPS: u32 = 11906;
const PAGE_HEIGHT_TWIPS: u32 = 16838;
const MARGIN_TWIPS: i32 = 1134;
const FONT_HALF_POINTS: usize = 24;
const FONT: &str = "Times New Roman";

/// Word document assembled with `docx-rs`, one paragraph per block.
#[derive(Debug, Clone, Default)]
pub struct DocxRenderer;

impl Renderer for DocxRenderer {
    fn render(&self, document: &Document) -> Result<Vec<u8>> {
        let docx = document.blocks.iter().fold(
            Docx::new()
                .page_size(PAGE_WIDTH_TWIPS, PAGE_HEIGHT_TWIPS)
                .page_margin(
                    PageMargin::new()
                        .top(MARGIN_TWIPS)
                        .bottom(MARGIN_TWIPS)
                        .left(MARGIN_TWIPS)
                        .right(MARGIN_TWIPS),
                ),
            |docx, block| docx.add_paragraph(paragraph(block)),
        );

        let mut bytes = Vec::new();
        docx.build()
            .pack(Cursor::new(&mut bytes))
            .with_context(|| format!("packing docx for {}", document.title))?;
        Ok(bytes)
    }
}

fn paragraph(block: &Block) -> Paragraph {
    match block {
        Block::Spacer => Paragraph::new(),
        Block::Columns { left, right } => {
            let text_width = (PAGE_WIDTH_TWIPS as i32 - 2 * MARGIN_TWIPS) as usize;
            Paragraph::new()
                .add_tab(Tab::new().val(TabValueType::Right).pos(text_width))
                .add_run(run(left, false, false).add_tab().add_text(right.as_str()))
        }
        Block::Text {
            text,
            align,
            bold,
            underline,
        } => {
            let paragraph = Paragraph::new().add_run(run(text, *bold, *underline));
            match align {
                Align::Left => paragraph,
                Align::Center => paragraph.align(AlignmentType::Center),
                Align::Right => paragraph.align(AlignmentType::Right),
            }
        }
    }
}

/// One run; embedded newlines become line breaks.
fn run(text: &str, bold: bool, underline: bool) -> Run {
    let mut run = Run::new()
        .fonts(RunFonts::new().ascii(FONT).hi_ansi(FONT))
        .size(FONT_HALF_POINTS);
    if bold {
        run = run.bold();
    }
    if underline {
        run = run.underline("single");
    }
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line.trim_end_matches('\r'));
    }
    run
}
