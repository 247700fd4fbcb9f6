use crate::error::LetterError;
use crate::letter::{Letter, LetterId};
use crate::search::LetterQuery;

pub mod pagination;

pub use pagination::{layout_page_numbers, render_slots, total_pages, PageSlot};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormMode {
    #[default]
    Create,
    Editing(LetterId),
}

impl FormMode {
    pub fn editing_id(&self) -> Option<&LetterId> {
        match self {
            FormMode::Create => None,
            FormMode::Editing(id) => Some(id),
        }
    }
}

/// Client-local view over the authoritative letter list.
#[derive(Debug, Clone)]
pub struct ViewState {
    all_letters: Vec<Letter>,
    query: LetterQuery,
    filtered: Vec<usize>,
    page: usize,
    mode: FormMode,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            all_letters: Vec::new(),
            query: LetterQuery::default(),
            filtered: Vec::new(),
            page: 1,
            mode: FormMode::Create,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a> {
    pub items: Vec<&'a Letter>,
    pub page_number: usize,
    pub total_pages: usize,
}

impl Page<'_> {
    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }

    pub fn slots(&self) -> Vec<PageSlot> {
        layout_page_numbers(self.page_number, self.total_pages)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Set when the letter under edit disappeared and edit mode was ended.
    pub cancelled_edit: Option<LetterId>,
}

#[derive(Debug, Clone, Default)]
pub struct LetterListController {
    state: ViewState,
}

impl LetterListController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_letters(&mut self, letters: Vec<Letter>) -> RefreshOutcome {
        self.state.all_letters = letters;
        self.apply_filter();
        self.state.page = 1;

        let mut outcome = RefreshOutcome::default();
        if let FormMode::Editing(id) = &self.state.mode {
            if self.find(id).is_none() {
                tracing::warn!(letter_id = %id, "letter under edit vanished after refresh");
                outcome.cancelled_edit = Some(id.clone());
                self.end_edit();
            }
        }
        outcome
    }

    pub fn set_query(&mut self, text: &str) {
        self.state.query = LetterQuery::parse(text);
        self.apply_filter();
        self.state.page = 1;
    }

    pub fn get_page(&self, page_size: usize) -> Page<'_> {
        let page_size = page_size.max(1);
        let start = (self.state.page - 1).saturating_mul(page_size);
        let items = self
            .state
            .filtered
            .iter()
            .skip(start)
            .take(page_size)
            .map(|&idx| &self.state.all_letters[idx])
            .collect();
        Page {
            items,
            page_number: self.state.page,
            total_pages: self.total_pages(page_size),
        }
    }

    pub fn set_page(&mut self, page: usize, page_size: usize) -> bool {
        let total = self.total_pages(page_size);
        if page < 1 || page > total {
            return false;
        }
        self.state.page = page;
        true
    }

    pub fn begin_edit(&mut self, id: &LetterId) -> Result<&Letter, LetterError> {
        let idx = self
            .state
            .all_letters
            .iter()
            .position(|letter| &letter.id == id)
            .ok_or_else(|| LetterError::NotFound(id.clone()))?;
        self.state.mode = FormMode::Editing(id.clone());
        Ok(&self.state.all_letters[idx])
    }

    pub fn end_edit(&mut self) {
        self.state.mode = FormMode::Create;
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state.mode, FormMode::Editing(_))
    }

    pub fn mode(&self) -> &FormMode {
        &self.state.mode
    }

    pub fn page(&self) -> usize {
        self.state.page
    }

    pub fn query(&self) -> &LetterQuery {
        &self.state.query
    }

    pub fn letters(&self) -> &[Letter] {
        &self.state.all_letters
    }

    pub fn filtered(&self) -> impl Iterator<Item = &Letter> + '_ {
        self.state
            .filtered
            .iter()
            .map(|&idx| &self.state.all_letters[idx])
    }

    pub fn filtered_len(&self) -> usize {
        self.state.filtered.len()
    }

    pub fn total_pages(&self, page_size: usize) -> usize {
        total_pages(self.state.filtered.len(), page_size)
    }

    pub fn find(&self, id: &LetterId) -> Option<&Letter> {
        self.state.all_letters.iter().find(|letter| &letter.id == id)
    }

    fn apply_filter(&mut self) {
        let query = &self.state.query;
        self.state.filtered = self
            .state
            .all_letters
            .iter()
            .enumerate()
            .filter(|(_, letter)| query.matches(letter))
            .map(|(idx, _)| idx)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::LetterFields;
    use assert_matches::assert_matches;
    use time::{Date, Duration, OffsetDateTime};

    fn sample_letter(n: usize, subject: &str) -> Letter {
        let base = Date::from_calendar_date(2024, time::Month::January, 1).expect("valid date");
        Letter::from_fields(
            LetterId::from(format!("letter-{n}")),
            LetterFields {
                letter_number: format!("LC{n:04}"),
                letter_date: base + Duration::days(n as i64),
                salutation: "Dear Sir/Madam".into(),
                subject: subject.into(),
                main_body: format!("Body of letter {n}"),
                special_remarks: None,
                closing: "Yours faithfully".into(),
                sender_name: None,
                recipient_name: None,
            },
            "admin@example.com",
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn letters(count: usize) -> Vec<Letter> {
        (1..=count)
            .map(|n| sample_letter(n, &format!("Subject {n}")))
            .collect()
    }

    fn numbers(page: &Page<'_>) -> Vec<String> {
        page.items
            .iter()
            .map(|letter| letter.letter_number.clone())
            .collect()
    }

    #[test]
    fn paginates_twenty_five_letters_into_three_pages() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(25));

        let first = controller.get_page(10);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.page_number, 1);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].letter_number, "LC0001");
        assert_eq!(first.items[9].letter_number, "LC0010");
        assert!(!first.has_previous());

        assert!(controller.set_page(3, 10));
        let last = controller.get_page(10);
        assert_eq!(
            numbers(&last),
            vec!["LC0021", "LC0022", "LC0023", "LC0024", "LC0025"]
        );
        assert!(!last.has_next());
    }

    #[test]
    fn out_of_range_pages_are_ignored() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(25));
        assert!(controller.set_page(2, 10));

        assert!(!controller.set_page(0, 10));
        assert!(!controller.set_page(4, 10));
        assert_eq!(controller.page(), 2);
    }

    #[test]
    fn empty_list_has_no_valid_pages() {
        let mut controller = LetterListController::new();
        controller.set_letters(Vec::new());
        let page = controller.get_page(10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
        assert!(page.slots().is_empty());
        assert!(!controller.set_page(1, 10));
    }

    #[test]
    fn query_filters_and_resets_page() {
        let mut all = letters(12);
        all[3].subject = "Invoice for March".into();
        all[8].subject = "Overdue INVOICE".into();
        let mut controller = LetterListController::new();
        controller.set_letters(all);
        assert!(controller.set_page(2, 10));

        controller.set_query("invoice");
        assert_eq!(controller.page(), 1);
        let page = controller.get_page(10);
        assert_eq!(numbers(&page), vec!["LC0004", "LC0009"]);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn query_result_is_exactly_the_matching_letters() {
        let mut all = letters(30);
        all[0].special_remarks = Some("Handle with CARE".into());
        all[17].main_body = "please take care".into();
        let mut controller = LetterListController::new();
        controller.set_letters(all.clone());

        controller.set_query("  Care ");
        let matched: Vec<&Letter> = controller.filtered().collect();
        let expected: Vec<&Letter> = all
            .iter()
            .filter(|letter| LetterQuery::parse("care").matches(letter))
            .collect();
        assert_eq!(matched, expected);
        assert_eq!(matched.len(), 2);

        controller.set_query("");
        assert_eq!(controller.filtered().cloned().collect::<Vec<_>>(), all);
    }

    #[test]
    fn zero_matches_is_an_empty_page() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(5));
        controller.set_query("no such text");
        let page = controller.get_page(10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn set_letters_always_returns_to_first_page() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(25));
        assert!(controller.set_page(3, 10));
        assert_eq!(controller.page(), 3);

        controller.set_letters(letters(25));
        assert_eq!(controller.page(), 1);

        assert!(controller.set_page(2, 10));
        controller.set_letters(letters(40));
        assert_eq!(controller.page(), 1);
    }

    #[test]
    fn set_letters_reapplies_query() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(25));
        controller.set_query("subject 2");

        controller.set_letters(letters(25));
        assert_eq!(controller.query().as_str(), "subject 2");
        // "Subject 2" and "Subject 20".."Subject 25"
        assert_eq!(controller.filtered_len(), 7);
    }

    #[test]
    fn begin_edit_with_unknown_id_leaves_mode_untouched() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(3));
        let known = LetterId::from("letter-2");
        controller.begin_edit(&known).expect("known id");

        let missing = LetterId::from("letter-99");
        assert_matches!(
            controller.begin_edit(&missing),
            Err(LetterError::NotFound(id)) if id == missing
        );
        assert_eq!(controller.mode(), &FormMode::Editing(known));
    }

    #[test]
    fn end_edit_is_idempotent() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(3));
        let letter = controller
            .begin_edit(&LetterId::from("letter-1"))
            .expect("known id");
        assert_eq!(letter.letter_number, "LC0001");
        assert!(controller.is_editing());

        controller.end_edit();
        let once = controller.mode().clone();
        controller.end_edit();
        assert_eq!(controller.mode(), &once);
        assert!(!controller.is_editing());
    }

    #[test]
    fn refresh_keeps_edit_when_letter_survives() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(3));
        controller
            .begin_edit(&LetterId::from("letter-2"))
            .expect("known id");

        let outcome = controller.set_letters(letters(4));
        assert_eq!(outcome, RefreshOutcome::default());
        assert_eq!(
            controller.mode().editing_id(),
            Some(&LetterId::from("letter-2"))
        );
    }

    #[test]
    fn refresh_ends_edit_when_letter_vanishes() {
        let mut controller = LetterListController::new();
        controller.set_letters(letters(3));
        controller
            .begin_edit(&LetterId::from("letter-3"))
            .expect("known id");

        let outcome = controller.set_letters(letters(2));
        assert_eq!(outcome.cancelled_edit, Some(LetterId::from("letter-3")));
        assert_eq!(controller.mode(), &FormMode::Create);
    }
}
