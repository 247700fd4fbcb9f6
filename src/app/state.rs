use strum::{EnumIter, IntoEnumIterator};
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ThemeName;
use crate::controller::{LetterListController, Page, RefreshOutcome};
use crate::letter::{next_preset, Closing, Letter, LetterDraft, LetterId, Salutation};
use crate::session::User;

const MAX_LINE_INPUT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    List,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum FormField {
    Number,
    Date,
    Recipient,
    Salutation,
    Subject,
    Body,
    Remarks,
    Closing,
    Sender,
}

impl FormField {
    pub fn label(self) -> &'static str {
        match self {
            FormField::Number => "Letter No",
            FormField::Date => "Date (YYYY-MM-DD)",
            FormField::Recipient => "Recipient",
            FormField::Salutation => "Salutation",
            FormField::Subject => "Subject",
            FormField::Body => "Body",
            FormField::Remarks => "Special Remarks",
            FormField::Closing => "Closing",
            FormField::Sender => "Sender",
        }
    }

    pub fn is_multiline(self) -> bool {
        matches!(self, FormField::Body | FormField::Remarks)
    }

    pub fn is_required(self) -> bool {
        !matches!(
            self,
            FormField::Recipient | FormField::Remarks | FormField::Sender
        )
    }

    fn step(self, delta: isize) -> Self {
        let all: Vec<FormField> = FormField::iter().collect();
        let idx = all.iter().position(|field| *field == self).unwrap_or(0) as isize;
        let len = all.len() as isize;
        all[(idx + delta).rem_euclid(len) as usize]
    }
}

#[derive(Debug, Clone)]
pub struct LetterForm {
    pub draft: LetterDraft,
    pub field: FormField,
    /// Set while the form edits an existing letter.
    pub editing: Option<LetterId>,
    pub error: Option<String>,
}

impl LetterForm {
    pub fn blank(prefix: &str, now: OffsetDateTime) -> Self {
        Self {
            draft: LetterDraft::blank(prefix, now),
            field: FormField::Subject,
            editing: None,
            error: None,
        }
    }

    pub fn for_letter(letter: &Letter) -> Self {
        Self {
            draft: letter.to_draft(),
            field: FormField::Subject,
            editing: Some(letter.id.clone()),
            error: None,
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        let draft = &self.draft;
        match field {
            FormField::Number => &draft.letter_number,
            FormField::Date => &draft.letter_date,
            FormField::Recipient => &draft.recipient_name,
            FormField::Salutation => &draft.salutation,
            FormField::Subject => &draft.subject,
            FormField::Body => &draft.main_body,
            FormField::Remarks => &draft.special_remarks,
            FormField::Closing => &draft.closing,
            FormField::Sender => &draft.sender_name,
        }
    }

    fn value_mut(&mut self) -> &mut String {
        let draft = &mut self.draft;
        match self.field {
            FormField::Number => &mut draft.letter_number,
            FormField::Date => &mut draft.letter_date,
            FormField::Recipient => &mut draft.recipient_name,
            FormField::Salutation => &mut draft.salutation,
            FormField::Subject => &mut draft.subject,
            FormField::Body => &mut draft.main_body,
            FormField::Remarks => &mut draft.special_remarks,
            FormField::Closing => &mut draft.closing,
            FormField::Sender => &mut draft.sender_name,
        }
    }

    pub fn next_field(&mut self) {
        self.field = self.field.step(1);
    }

    pub fn previous_field(&mut self) {
        self.field = self.field.step(-1);
    }

    pub fn push_char(&mut self, ch: char) {
        let multiline = self.field.is_multiline();
        let value = self.value_mut();
        if multiline || value.chars().count() < MAX_LINE_INPUT {
            value.push(ch);
        }
        self.error = None;
    }

    /// Enter inserts a line break in the body and remarks; elsewhere it moves on.
    pub fn newline(&mut self) {
        if self.field.is_multiline() {
            self.value_mut().push('\n');
        } else {
            self.next_field();
        }
    }

    pub fn backspace(&mut self) {
        pop_grapheme(self.value_mut());
        self.error = None;
    }

    /// Cycles preset phrases for the salutation and closing fields.
    pub fn cycle_preset(&mut self) -> bool {
        let next = match self.field {
            FormField::Salutation => next_preset::<Salutation>(&self.draft.salutation),
            FormField::Closing => next_preset::<Closing>(&self.draft.closing),
            _ => return false,
        };
        *self.value_mut() = next;
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginOverlay {
    pub email: String,
    pub password: String,
    pub password_focused: bool,
    pub error: Option<String>,
}

impl LoginOverlay {
    pub fn push_char(&mut self, ch: char) {
        let target = if self.password_focused {
            &mut self.password
        } else {
            &mut self.email
        };
        if target.chars().count() < MAX_LINE_INPUT {
            target.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        if self.password_focused {
            pop_grapheme(&mut self.password);
        } else {
            pop_grapheme(&mut self.email);
        }
    }

    pub fn toggle_field(&mut self) {
        self.password_focused = !self.password_focused;
    }
}

#[derive(Debug, Clone)]
pub struct DeleteLetterOverlay {
    pub letter_id: LetterId,
    pub letter_number: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    Login(LoginOverlay),
    LetterForm(LetterForm),
    DeleteLetter(DeleteLetterOverlay),
    Help,
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub active: bool,
    pub input: String,
}

pub struct AppState {
    pub controller: LetterListController,
    pub user: Option<User>,
    pub theme: ThemeName,
    pub page_size: usize,
    pub preview_chars: usize,
    pub focus: FocusPane,
    pub preview_scroll: u16,
    selected: usize,
    search: SearchState,
    overlay: Option<OverlayState>,
    status_message: Option<String>,
}

impl AppState {
    pub fn new(page_size: usize, preview_chars: usize, theme: ThemeName) -> Self {
        Self {
            controller: LetterListController::new(),
            user: None,
            theme,
            page_size: page_size.max(1),
            preview_chars,
            focus: FocusPane::List,
            preview_scroll: 0,
            selected: 0,
            search: SearchState::default(),
            overlay: None,
            status_message: None,
        }
    }

    pub fn page(&self) -> Page<'_> {
        self.controller.get_page(self.page_size)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_letter(&self) -> Option<&Letter> {
        self.page().items.get(self.selected).copied()
    }

    pub fn selected_letter_id(&self) -> Option<LetterId> {
        self.selected_letter().map(|letter| letter.id.clone())
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.page().items.len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = (self.selected as isize + delta).clamp(0, len as isize - 1);
        self.selected = next as usize;
        self.preview_scroll = 0;
    }

    /// Moves by `delta` pages; out-of-range targets leave the view unchanged.
    pub fn change_page(&mut self, delta: isize) -> bool {
        let target = self.controller.page() as isize + delta;
        if target < 1 {
            return false;
        }
        let changed = self.controller.set_page(target as usize, self.page_size);
        if changed {
            self.selected = 0;
            self.preview_scroll = 0;
        }
        changed
    }

    pub fn on_letters_loaded(&mut self, outcome: &RefreshOutcome) {
        self.normalize_selection();
        if let Some(id) = &outcome.cancelled_edit {
            let editing_this = matches!(
                &self.overlay,
                Some(OverlayState::LetterForm(form)) if form.editing.as_ref() == Some(id)
            );
            if editing_this {
                self.overlay = None;
            }
            self.set_status_message(Some("The letter being edited was removed; edit cancelled"));
        }
    }

    pub fn select_letter(&mut self, id: &LetterId) {
        if let Some(idx) = self.page().items.iter().position(|letter| &letter.id == id) {
            self.selected = idx;
        } else {
            self.normalize_selection();
        }
    }

    pub fn clear_letters(&mut self) {
        self.controller.end_edit();
        self.controller.set_letters(Vec::new());
        self.selected = 0;
        self.preview_scroll = 0;
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::List => FocusPane::Preview,
            FocusPane::Preview => FocusPane::List,
        };
    }

    pub fn scroll_preview(&mut self, delta: i16) {
        self.preview_scroll = self.preview_scroll.saturating_add_signed(delta);
    }

    pub fn toggle_theme(&mut self) -> ThemeName {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn begin_search(&mut self) {
        self.search.active = true;
        self.focus = FocusPane::List;
    }

    pub fn finish_search(&mut self) {
        self.search.active = false;
    }

    pub fn cancel_search(&mut self) {
        self.search.active = false;
        self.search.input.clear();
        self.apply_search();
    }

    pub fn push_search_char(&mut self, ch: char) {
        self.search.input.push(ch);
        self.apply_search();
    }

    pub fn pop_search_char(&mut self) {
        if pop_grapheme(&mut self.search.input) {
            self.apply_search();
        }
    }

    pub fn search_input(&self) -> &str {
        &self.search.input
    }

    pub fn is_search_active(&self) -> bool {
        self.search.active
    }

    pub fn highlight_terms(&self) -> Vec<String> {
        self.controller.query().highlight_terms()
    }

    fn apply_search(&mut self) {
        self.controller.set_query(&self.search.input);
        self.selected = 0;
        self.preview_scroll = 0;
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn close_overlay(&mut self) -> Option<OverlayState> {
        self.overlay.take()
    }

    pub fn open_login(&mut self, email: Option<&str>) {
        self.overlay = Some(OverlayState::Login(LoginOverlay {
            password_focused: email.is_some(),
            email: email.unwrap_or_default().to_string(),
            ..LoginOverlay::default()
        }));
    }

    pub fn open_help(&mut self) {
        self.overlay = Some(OverlayState::Help);
    }

    pub fn open_letter_form(&mut self, form: LetterForm) {
        self.overlay = Some(OverlayState::LetterForm(form));
    }

    pub fn open_delete_letter(&mut self) -> bool {
        let Some(letter) = self.selected_letter() else {
            return false;
        };
        let overlay = DeleteLetterOverlay {
            letter_id: letter.id.clone(),
            letter_number: letter.letter_number.clone(),
            subject: letter.subject.clone(),
        };
        self.overlay = Some(OverlayState::DeleteLetter(overlay));
        true
    }

    pub fn login_overlay_mut(&mut self) -> Option<&mut LoginOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Login(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn letter_form_mut(&mut self) -> Option<&mut LetterForm> {
        match self.overlay.as_mut() {
            Some(OverlayState::LetterForm(form)) => Some(form),
            _ => None,
        }
    }

    fn normalize_selection(&mut self) {
        let len = self.page().items.len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

fn pop_grapheme(text: &mut String) -> bool {
    match text.grapheme_indices(true).next_back() {
        Some((idx, _)) => {
            text.truncate(idx);
            true
        }
        None => false,
    }
}
