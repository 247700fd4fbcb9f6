use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, FocusPane, FormField, LetterForm, LoginOverlay, OverlayState};
use crate::config::ThemeName;
use crate::controller::PageSlot;
use crate::export::{self, Align};
use crate::highlight::query_highlighter;
use crate::letter::{is_preset, Closing, Letter, Salutation};

#[derive(Debug, Clone, Copy)]
struct Palette {
    base: Style,
    muted: Style,
    accent: Color,
    highlight: Style,
    selection: Style,
    danger: Color,
}

impl Palette {
    fn for_theme(theme: ThemeName) -> Self {
        match theme {
            ThemeName::Light => Self {
                base: Style::default()
                    .fg(Color::Rgb(28, 28, 30))
                    .bg(Color::Rgb(250, 249, 245)),
                muted: Style::default().fg(Color::Rgb(110, 110, 118)),
                accent: Color::Rgb(30, 90, 170),
                highlight: Style::default()
                    .bg(Color::Rgb(255, 230, 140))
                    .add_modifier(Modifier::BOLD),
                selection: Style::default()
                    .bg(Color::Rgb(210, 225, 245))
                    .add_modifier(Modifier::BOLD),
                danger: Color::Rgb(180, 30, 30),
            },
            ThemeName::Dark => Self {
                base: Style::default()
                    .fg(Color::Rgb(228, 228, 231))
                    .bg(Color::Rgb(24, 24, 27)),
                muted: Style::default().fg(Color::Rgb(140, 140, 150)),
                accent: Color::Cyan,
                highlight: Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
                selection: Style::default()
                    .bg(Color::Rgb(50, 60, 90))
                    .add_modifier(Modifier::BOLD),
                danger: Color::LightRed,
            },
        }
    }

    fn border(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.accent)
        } else {
            self.muted
        }
    }
}

pub fn draw_app(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let palette = Palette::for_theme(state.theme);
    frame.render_widget(Block::default().style(palette.base), frame.size());

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(vertical[0]);

    let highlight_regex = query_highlighter(state.controller.query());
    let page = state.page();
    let row_width = columns[0].width.saturating_sub(4) as usize;

    let mut items = Vec::with_capacity(page.items.len());
    for letter in &page.items {
        let mut header = vec![Span::styled(
            letter.letter_number.clone(),
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )];
        header.push(Span::styled(
            format!("  {}", letter.formatted_date()),
            palette.muted,
        ));
        let subject = fit_width(&letter.subject, row_width);
        let preview = fit_width(
            &letter.preview(state.preview_chars).replace('\n', " "),
            row_width,
        );
        items.push(ListItem::new(vec![
            Line::from(header),
            Line::from(highlight_line(
                &subject,
                highlight_regex.as_ref(),
                palette.highlight,
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(highlight_line(
                &preview,
                highlight_regex.as_ref(),
                palette.highlight,
                palette.muted,
            )),
        ]));
    }
    if items.is_empty() {
        let hint = if state.user.is_none() {
            "Sign in with L to see letters."
        } else if !state.controller.query().is_empty() {
            "No letters match the search."
        } else {
            "No letters yet. Press `a` to write one."
        };
        items.push(ListItem::new(Span::styled(hint, palette.muted)));
    }

    let list_title = format!("Letters ({})", state.controller.filtered_len());
    let list = List::new(items)
        .block(
            Block::default()
                .title(list_title)
                .borders(Borders::ALL)
                .border_style(palette.border(state.focus == FocusPane::List)),
        )
        .highlight_style(palette.selection)
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, columns[0], list_state);

    let preview_width = columns[1].width.saturating_sub(2) as usize;
    let preview_text: Text = state
        .selected_letter()
        .map(|letter| {
            Text::from(letter_lines(
                letter,
                preview_width,
                highlight_regex.as_ref(),
                palette.highlight,
            ))
        })
        .unwrap_or_else(|| Text::from(Span::styled("Select a letter to read it.", palette.muted)));

    let detail = Paragraph::new(preview_text)
        .block(
            Block::default()
                .title("Letter")
                .borders(Borders::ALL)
                .border_style(palette.border(state.focus == FocusPane::Preview)),
        )
        .wrap(Wrap { trim: false })
        .scroll((state.preview_scroll, 0));
    frame.render_widget(Clear, columns[1]);
    frame.render_widget(detail.style(palette.base), columns[1]);

    let status = build_status_line(state, &palette);
    frame.render_widget(Paragraph::new(status).style(palette.base), vertical[1]);

    render_overlay(frame, state, &palette);
}

fn build_status_line(state: &AppState, palette: &Palette) -> Text<'static> {
    let page = state.page();
    let bold = Style::default().add_modifier(Modifier::BOLD);

    let mut spans = vec![Span::raw(format!(
        "Page {}/{} ",
        page.page_number,
        page.total_pages.max(1)
    ))];
    if page.has_previous() {
        spans.push(Span::styled("‹ ", palette.muted));
    }
    for slot in page.slots() {
        match slot {
            PageSlot::Page(number) if number == page.page_number => {
                spans.push(Span::styled(
                    format!("[{number}] "),
                    bold.fg(palette.accent),
                ));
            }
            other => spans.push(Span::raw(format!("{other} "))),
        }
    }
    if page.has_next() {
        spans.push(Span::styled("› ", palette.muted));
    }

    spans.push(Span::raw("| "));
    match &state.user {
        Some(user) => {
            spans.push(Span::styled(user.email.clone(), bold));
            spans.push(Span::styled(format!(" ({})", user.role), palette.muted));
        }
        None => spans.push(Span::styled("signed out", palette.muted)),
    }

    if state.is_search_active() || !state.search_input().is_empty() {
        let label_style = if state.is_search_active() {
            bold.fg(palette.accent)
        } else {
            palette.muted
        };
        spans.push(Span::raw(" | Search "));
        spans.push(Span::styled("/", label_style));
        if state.search_input().is_empty() {
            spans.push(Span::styled("(type to search)", palette.muted));
        } else {
            spans.push(Span::styled(state.search_input().to_string(), bold));
        }
        if state.is_search_active() {
            spans.push(Span::styled(" ▌", Style::default().fg(palette.accent)));
        }
    }
    if state.controller.is_editing() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled("EDIT", bold.fg(Color::Magenta)));
    }
    if let Some(message) = state.status_message() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(palette.accent),
        ));
    }

    Text::from(vec![
        Line::from(spans),
        Line::from(vec![
            Span::styled("Keys: ", palette.muted.add_modifier(Modifier::BOLD)),
            Span::styled(
                "j/k move • ←/→ page • / search • Enter preview • a new • e edit • d delete",
                palette.muted,
            ),
        ]),
        Line::from(Span::styled(
            "      x PDF • X DOCX • t theme • L sign in/out • Ctrl-r reload • ? help • q quit",
            palette.muted,
        )),
    ])
}

/// The letter laid out as it will print, one `Line` per line of the export.
fn letter_lines(
    letter: &Letter,
    width: usize,
    regex: Option<&Regex>,
    highlight_style: Style,
) -> Vec<Line<'static>> {
    let document = export::letter_document(letter);
    let mut lines = Vec::new();
    for block in &document.blocks {
        match block {
            export::Block::Spacer => lines.push(Line::from("")),
            export::Block::Columns { left, right } => {
                lines.push(Line::from(pad_columns(left, right, width)));
            }
            export::Block::Text {
                text,
                align,
                bold,
                underline,
            } => {
                let mut base = Style::default();
                if *bold {
                    base = base.add_modifier(Modifier::BOLD);
                }
                if *underline {
                    base = base.add_modifier(Modifier::UNDERLINED);
                }
                let alignment = match align {
                    Align::Left => Alignment::Left,
                    Align::Center => Alignment::Center,
                    Align::Right => Alignment::Right,
                };
                for raw in text.split('\n') {
                    lines.push(
                        Line::from(highlight_line(raw, regex, highlight_style, base))
                            .alignment(alignment),
                    );
                }
            }
        }
    }
    lines
}

fn pad_columns(left: &str, right: &str, width: usize) -> String {
    let used = left.width() + right.width();
    let gap = width.saturating_sub(used).max(2);
    format!("{left}{}{right}", " ".repeat(gap))
}

/// Truncates to `max` display columns, marking the cut with an ellipsis.
fn fit_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let w = grapheme.width();
        if used + w + 1 > max {
            break;
        }
        out.push_str(grapheme);
        used += w;
    }
    out.push('…');
    out
}

fn highlight_line(
    text: &str,
    regex: Option<&Regex>,
    highlight_style: Style,
    base_style: Style,
) -> Vec<Span<'static>> {
    let Some(re) = regex else {
        return vec![Span::styled(text.to_string(), base_style)];
    };
    let mut spans = Vec::new();
    let mut last = 0;
    for mat in re.find_iter(text) {
        if mat.start() > last {
            spans.push(Span::styled(text[last..mat.start()].to_string(), base_style));
        }
        spans.push(Span::styled(
            mat.as_str().to_string(),
            base_style.patch(highlight_style),
        ));
        last = mat.end();
    }
    if last < text.len() {
        spans.push(Span::styled(text[last..].to_string(), base_style));
    }
    if spans.is_empty() {
        spans.push(Span::styled(text.to_string(), base_style));
    }
    spans
}

fn render_overlay(frame: &mut Frame, state: &AppState, palette: &Palette) {
    match state.overlay() {
        Some(OverlayState::Login(login)) => {
            let area = centered_rect(50, 35, frame.size());
            frame.render_widget(Clear, area);
            frame.render_widget(login_paragraph(login, palette), area);
        }
        Some(OverlayState::LetterForm(form)) => {
            let area = centered_rect(80, 85, frame.size());
            frame.render_widget(Clear, area);
            frame.render_widget(form_paragraph(form, palette), area);
        }
        Some(OverlayState::DeleteLetter(overlay)) => {
            let area = centered_rect(60, 30, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Delete Letter",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!(
                    "Permanently delete letter {}, \"{}\"?",
                    overlay.letter_number, overlay.subject
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter or y to confirm • Esc to cancel",
                    palette.muted,
                )),
            ])
            .style(palette.base)
            .block(
                Block::default()
                    .title("Confirm Delete")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.danger)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::Help) => {
            let area = centered_rect(60, 60, frame.size());
            frame.render_widget(Clear, area);
            let rows = [
                ("j / k", "move selection or scroll the letter"),
                ("← → [ ]", "previous / next page"),
                ("/", "search number, subject, body, salutation, remarks"),
                ("Enter, Tab", "switch between list and letter"),
                ("a / e / d", "new, edit, delete (administrators)"),
                ("x / X", "export PDF / DOCX (DOCX for administrators)"),
                ("t", "toggle light and dark theme"),
                ("L", "sign in or out"),
                ("Ctrl-r", "reload letters"),
                ("q", "quit"),
            ];
            let mut lines: Vec<Line> = rows
                .iter()
                .map(|(keys, what)| {
                    Line::from(vec![
                        Span::styled(
                            format!("{keys:>12}  "),
                            Style::default()
                                .fg(palette.accent)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(*what),
                    ])
                })
                .collect();
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Esc to close", palette.muted)));
            let paragraph = Paragraph::new(lines).style(palette.base).block(
                Block::default()
                    .title("Help")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent)),
            );
            frame.render_widget(paragraph, area);
        }
        None => {}
    }
}

fn login_paragraph(login: &LoginOverlay, palette: &Palette) -> Paragraph<'static> {
    let field = |label: &str, value: String, focused: bool| {
        let mut value = value;
        if focused {
            value.push('▌');
        }
        let label_style = if focused {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            palette.muted
        };
        Line::from(vec![
            Span::styled(format!("{label:>9}: "), label_style),
            Span::raw(value),
        ])
    };
    let masked = "•".repeat(login.password.graphemes(true).count());
    let mut lines = vec![
        Line::from(Span::styled(
            "Sign in to Lettercraft",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        field("Email", login.email.clone(), !login.password_focused),
        field("Password", masked, login.password_focused),
        Line::from(""),
    ];
    if let Some(error) = &login.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(palette.danger),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Tab switch field • Enter sign in • Esc browse signed out",
        palette.muted,
    )));
    Paragraph::new(lines)
        .style(palette.base)
        .block(
            Block::default()
                .title("Sign In")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        )
        .wrap(Wrap { trim: false })
}

fn form_paragraph(form: &LetterForm, palette: &Palette) -> Paragraph<'static> {
    use strum::IntoEnumIterator;

    let title = match &form.editing {
        Some(_) => format!("Edit Letter {}", form.draft.letter_number),
        None => "New Letter".to_string(),
    };
    let mut lines = Vec::new();
    for field in FormField::iter() {
        let focused = field == form.field;
        let marker = if field.is_required() { "*" } else { " " };
        let label_style = if focused {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            palette.muted
        };
        let label = Span::styled(format!("{marker}{:<18} ", field.label()), label_style);
        let mut value = form.value(field).to_string();
        if focused {
            value.push('▌');
        }
        let custom = match field {
            FormField::Salutation => !is_preset::<Salutation>(form.value(field)),
            FormField::Closing => !is_preset::<Closing>(form.value(field)),
            _ => false,
        };
        if custom {
            value.push_str("  (custom)");
        }
        if field.is_multiline() {
            lines.push(Line::from(label));
            for raw in value.split('\n') {
                lines.push(Line::from(format!("    {raw}")));
            }
        } else {
            lines.push(Line::from(vec![label, Span::raw(value)]));
        }
    }
    lines.push(Line::from(""));
    if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(palette.danger),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Tab/Shift-Tab field • Ctrl-n preset • Ctrl-s save • Esc cancel",
        palette.muted,
    )));
    Paragraph::new(lines)
        .style(palette.base)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        )
        .wrap(Wrap { trim: false })
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
