use std::path::{Path, PathBuf};

use time::Date;

use crate::agenda::{build_agenda, Agenda, AgendaRequest};
use crate::controller::{FormMode, LetterListController, RefreshOutcome};
use crate::error::LetterError;
use crate::export::{self, ExportFormat};
use crate::letter::{format_iso_date, LetterDraft, LetterId};
use crate::session::{require_admin, require_user, User};
use crate::storage::LetterStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(LetterId),
    Updated(LetterId),
}

impl SubmitOutcome {
    pub fn id(&self) -> &LetterId {
        match self {
            SubmitOutcome::Created(id) | SubmitOutcome::Updated(id) => id,
        }
    }
}

/// Runs store mutations and exports on behalf of the signed-in user, then
/// reloads the controller wholesale. Nothing is applied optimistically.
pub struct ActionDispatcher<'a> {
    store: &'a dyn LetterStore,
    user: Option<&'a User>,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(store: &'a dyn LetterStore, user: Option<&'a User>) -> Self {
        Self { store, user }
    }

    pub fn load_letters(
        &self,
        controller: &mut LetterListController,
    ) -> Result<RefreshOutcome, LetterError> {
        require_user(self.user, "view letters")?;
        let letters = self
            .store
            .list_letters()
            .map_err(|err| external("letter store", err))?;
        tracing::debug!(count = letters.len(), "letters loaded");
        Ok(controller.set_letters(letters))
    }

    pub fn submit_form(
        &self,
        controller: &mut LetterListController,
        draft: &LetterDraft,
    ) -> Result<SubmitOutcome, LetterError> {
        let user = require_admin(self.user, "save letters")?;
        let fields = draft.validate()?;
        let outcome = match controller.mode().clone() {
            FormMode::Create => {
                let id = self
                    .store
                    .create_letter(&fields, &user.email)
                    .map_err(|err| external("letter store", err))?;
                SubmitOutcome::Created(id)
            }
            FormMode::Editing(id) => {
                self.store
                    .update_letter(&id, &fields)
                    .map_err(|err| external("letter store", err))?;
                SubmitOutcome::Updated(id)
            }
        };
        tracing::info!(letter_id = %outcome.id(), number = %fields.letter_number, "letter saved");
        controller.end_edit();
        self.load_letters(controller)?;
        Ok(outcome)
    }

    pub fn cancel_form(&self, controller: &mut LetterListController) {
        controller.end_edit();
    }

    pub fn delete_letter(
        &self,
        controller: &mut LetterListController,
        id: &LetterId,
    ) -> Result<(), LetterError> {
        require_admin(self.user, "delete letters")?;
        if controller.find(id).is_none() {
            return Err(LetterError::NotFound(id.clone()));
        }
        self.store
            .delete_letter(id)
            .map_err(|err| external("letter store", err))?;
        tracing::info!(letter_id = %id, "letter deleted");
        if controller.mode().editing_id() == Some(id) {
            controller.end_edit();
        }
        self.load_letters(controller)?;
        Ok(())
    }

    pub fn export_letter(
        &self,
        controller: &LetterListController,
        id: &LetterId,
        format: ExportFormat,
        dir: &Path,
    ) -> Result<PathBuf, LetterError> {
        if format.requires_admin() {
            require_admin(self.user, "export DOCX")?;
        } else {
            require_user(self.user, "export PDF")?;
        }
        let letter = controller
            .find(id)
            .ok_or_else(|| LetterError::NotFound(id.clone()))?;
        export::export_letter(letter, format, dir).map_err(|err| external("exporter", err))
    }

    pub fn compose_agenda(
        &self,
        controller: &LetterListController,
        request: &AgendaRequest,
        today: Date,
    ) -> Result<Agenda, LetterError> {
        require_admin(self.user, "build agendas")?;
        build_agenda(controller.letters(), request, today)
    }

    pub fn export_agenda(
        &self,
        controller: &LetterListController,
        request: &AgendaRequest,
        format: ExportFormat,
        dir: &Path,
        today: Date,
    ) -> Result<PathBuf, LetterError> {
        let agenda = self.compose_agenda(controller, request, today)?;
        let file_name = format!(
            "Agenda_{}.{}",
            format_iso_date(agenda.generated_on),
            format.extension()
        );
        export::write_document(&agenda.to_document(), format, dir, &file_name)
            .map_err(|err| external("exporter", err))
    }
}

fn external(service: &'static str, err: anyhow::Error) -> LetterError {
    let err = LetterError::from_service(service, err);
    tracing::error!(error = %err, service, "collaborator call failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::AgendaField;
    use crate::letter::{Letter, LetterFields};
    use crate::session::Role;
    use anyhow::bail;
    use assert_matches::assert_matches;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;
    use time::macros::date;
    use time::OffsetDateTime;

    #[derive(Default)]
    struct MemoryStore {
        letters: RefCell<Vec<Letter>>,
        next_id: Cell<u32>,
        offline: Cell<bool>,
    }

    impl MemoryStore {
        fn check(&self) -> anyhow::Result<()> {
            if self.offline.get() {
                bail!("store offline");
            }
            Ok(())
        }
    }

    impl LetterStore for MemoryStore {
        fn list_letters(&self) -> anyhow::Result<Vec<Letter>> {
            self.check()?;
            let mut letters = self.letters.borrow().clone();
            letters.sort_by(|a, b| b.letter_date.cmp(&a.letter_date));
            Ok(letters)
        }

        fn fetch_letter(&self, id: &LetterId) -> anyhow::Result<Option<Letter>> {
            self.check()?;
            Ok(self.letters.borrow().iter().find(|l| &l.id == id).cloned())
        }

        fn create_letter(
            &self,
            fields: &LetterFields,
            created_by: &str,
        ) -> anyhow::Result<LetterId> {
            self.check()?;
            self.next_id.set(self.next_id.get() + 1);
            let id = LetterId::from(format!("mem-{}", self.next_id.get()));
            self.letters.borrow_mut().push(Letter::from_fields(
                id.clone(),
                fields.clone(),
                created_by,
                OffsetDateTime::UNIX_EPOCH,
            ));
            Ok(id)
        }

        fn update_letter(&self, id: &LetterId, fields: &LetterFields) -> anyhow::Result<()> {
            self.check()?;
            let mut letters = self.letters.borrow_mut();
            let Some(slot) = letters.iter_mut().find(|l| &l.id == id) else {
                return Err(LetterError::NotFound(id.clone()).into());
            };
            let created_by = slot.created_by.clone();
            *slot = Letter::from_fields(
                id.clone(),
                fields.clone(),
                created_by,
                OffsetDateTime::UNIX_EPOCH,
            );
            slot.updated_at = Some(OffsetDateTime::UNIX_EPOCH);
            Ok(())
        }

        fn delete_letter(&self, id: &LetterId) -> anyhow::Result<()> {
            self.check()?;
            let mut letters = self.letters.borrow_mut();
            let before = letters.len();
            letters.retain(|l| &l.id != id);
            if letters.len() == before {
                return Err(LetterError::NotFound(id.clone()).into());
            }
            Ok(())
        }
    }

    fn admin() -> User {
        User {
            email: "admin@example.com".into(),
            role: Role::Admin,
        }
    }

    fn reader() -> User {
        User {
            email: "clerk@example.com".into(),
            role: Role::Reader,
        }
    }

    fn draft(subject: &str, day: &str) -> LetterDraft {
        LetterDraft {
            letter_number: format!("LC-{subject}"),
            letter_date: format!("2024-05-{day}"),
            salutation: "Dear Sir".into(),
            subject: subject.into(),
            main_body: "Body".into(),
            closing: "Yours faithfully".into(),
            ..LetterDraft::default()
        }
    }

    fn seeded(store: &MemoryStore, user: &User) -> LetterListController {
        let dispatcher = ActionDispatcher::new(store, Some(user));
        let mut controller = LetterListController::new();
        dispatcher
            .submit_form(&mut controller, &draft("first", "01"))
            .expect("create first");
        dispatcher
            .submit_form(&mut controller, &draft("second", "02"))
            .expect("create second");
        controller
    }

    #[test]
    fn create_reloads_and_records_creator() {
        let store = MemoryStore::default();
        let user = admin();
        let controller = seeded(&store, &user);

        let subjects: Vec<&str> = controller
            .letters()
            .iter()
            .map(|l| l.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["second", "first"]);
        assert!(controller
            .letters()
            .iter()
            .all(|l| l.created_by == "admin@example.com"));
        assert!(!controller.is_editing());
    }

    #[test]
    fn submit_in_edit_mode_updates_and_ends_edit() {
        let store = MemoryStore::default();
        let user = admin();
        let mut controller = seeded(&store, &user);
        let dispatcher = ActionDispatcher::new(&store, Some(&user));

        let id = LetterId::from("mem-1");
        let mut edit = controller.begin_edit(&id).expect("known").to_draft();
        edit.subject = "first, revised".into();
        let outcome = dispatcher
            .submit_form(&mut controller, &edit)
            .expect("update");

        assert_eq!(outcome, SubmitOutcome::Updated(id.clone()));
        assert!(!controller.is_editing());
        assert_eq!(
            controller.find(&id).map(|l| l.subject.as_str()),
            Some("first, revised")
        );
    }

    #[test]
    fn invalid_draft_is_rejected_before_the_store() {
        let store = MemoryStore::default();
        let user = admin();
        let dispatcher = ActionDispatcher::new(&store, Some(&user));
        let mut controller = LetterListController::new();
        let mut bad = draft("x", "01");
        bad.subject = "  ".into();

        assert_matches!(
            dispatcher.submit_form(&mut controller, &bad),
            Err(LetterError::Validation { field: "subject", .. })
        );
        assert!(store.letters.borrow().is_empty());
    }

    #[test]
    fn store_failure_leaves_view_state_untouched() {
        let store = MemoryStore::default();
        let user = admin();
        let mut controller = seeded(&store, &user);
        let dispatcher = ActionDispatcher::new(&store, Some(&user));
        let id = LetterId::from("mem-2");
        controller.begin_edit(&id).expect("known");
        store.offline.set(true);

        let result = dispatcher.submit_form(&mut controller, &draft("third", "03"));
        assert_matches!(
            result,
            Err(LetterError::ExternalService { service: "letter store", .. })
        );
        assert_eq!(controller.letters().len(), 2);
        assert_eq!(controller.mode(), &FormMode::Editing(id));
    }

    #[test]
    fn readers_cannot_mutate_or_export_docx() {
        let store = MemoryStore::default();
        let mut controller = seeded(&store, &admin());
        let clerk = reader();
        let dispatcher = ActionDispatcher::new(&store, Some(&clerk));
        let id = LetterId::from("mem-1");
        let temp = TempDir::new().expect("tempdir");

        assert_matches!(
            dispatcher.submit_form(&mut controller, &draft("x", "09")),
            Err(LetterError::PermissionDenied(_))
        );
        assert_matches!(
            dispatcher.delete_letter(&mut controller, &id),
            Err(LetterError::PermissionDenied(_))
        );
        assert_matches!(
            dispatcher.export_letter(&controller, &id, ExportFormat::Docx, temp.path()),
            Err(LetterError::PermissionDenied(_))
        );
        let request = AgendaRequest {
            fields: vec![AgendaField::Number],
            letter_ids: vec![id.clone()],
        };
        assert_matches!(
            dispatcher.compose_agenda(&controller, &request, date!(2024 - 06 - 01)),
            Err(LetterError::PermissionDenied(_))
        );

        let pdf = dispatcher
            .export_letter(&controller, &id, ExportFormat::Pdf, temp.path())
            .expect("readers export pdf");
        assert!(pdf.ends_with("Letter_LC-first.pdf"));
        assert_eq!(store.letters.borrow().len(), 2);
    }

    #[test]
    fn signed_out_users_cannot_load() {
        let store = MemoryStore::default();
        let dispatcher = ActionDispatcher::new(&store, None);
        let mut controller = LetterListController::new();
        assert_matches!(
            dispatcher.load_letters(&mut controller),
            Err(LetterError::PermissionDenied(_))
        );
    }

    #[test]
    fn deleting_the_edited_letter_ends_edit() {
        let store = MemoryStore::default();
        let user = admin();
        let mut controller = seeded(&store, &user);
        let dispatcher = ActionDispatcher::new(&store, Some(&user));
        let id = LetterId::from("mem-2");
        controller.begin_edit(&id).expect("known");

        dispatcher
            .delete_letter(&mut controller, &id)
            .expect("delete");
        assert!(!controller.is_editing());
        assert!(controller.find(&id).is_none());

        assert_matches!(
            dispatcher.delete_letter(&mut controller, &id),
            Err(LetterError::NotFound(_))
        );
    }

    #[test]
    fn agenda_export_writes_dated_file() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let user = admin();
        let controller = seeded(&store, &user);
        let dispatcher = ActionDispatcher::new(&store, Some(&user));
        let temp = TempDir::new()?;
        let request = AgendaRequest {
            fields: vec![AgendaField::Number, AgendaField::Subject],
            letter_ids: vec![LetterId::from("mem-1"), LetterId::from("mem-2")],
        };

        let path = dispatcher.export_agenda(
            &controller,
            &request,
            ExportFormat::Docx,
            temp.path(),
            date!(2024 - 06 - 01),
        )?;
        assert!(path.ends_with("Agenda_2024-06-01.docx"));
        assert!(path.exists());
        Ok(())
    }
}
