use std::io::Stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;
use time::OffsetDateTime;

use crate::config::{AppConfig, ConfigPaths, ThemePreference};
use crate::error::LetterError;
use crate::export::ExportFormat;
use crate::session::{AuthError, IdentityProvider, LocalIdentityProvider, User};
use crate::storage::StorageHandle;
use crate::ui;

pub mod actions;
pub mod state;

pub use actions::{ActionDispatcher, SubmitOutcome};
pub use state::{AppState, FocusPane, FormField, LetterForm, OverlayState};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    NextPage,
    PreviousPage,
    ToggleFocus,
    Reload,
    StartSearch,
    NewLetter,
    EditLetter,
    DeleteLetter,
    Export(ExportFormat),
    ToggleTheme,
    Login,
    Help,
}

pub struct App {
    pub config: Arc<AppConfig>,
    pub storage: StorageHandle,
    identity: LocalIdentityProvider,
    auth_events: Receiver<Option<User>>,
    theme_pref: ThemePreference,
    export_dir: PathBuf,
    default_email: Option<String>,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(
        config: Arc<AppConfig>,
        storage: StorageHandle,
        paths: &ConfigPaths,
        default_email: Option<String>,
    ) -> Result<Self> {
        let theme_pref = ThemePreference::in_state_dir(&paths.state_dir);
        let theme = theme_pref.load().unwrap_or(config.theme);
        let mut state = AppState::new(config.page_size, config.preview_chars, theme);

        let identity = LocalIdentityProvider::new(config.accounts.clone());
        let (tx, auth_events) = unbounded();
        identity.on_auth_state_change(Box::new(move |user: Option<&User>| {
            // the receiver lives as long as the app; a closed channel only happens on shutdown
            let _ = tx.send(user.cloned());
        }));

        if config.accounts.is_empty() {
            state.set_status_message(Some(
                "No accounts configured; add [[accounts]] to the config file",
            ));
        }
        state.open_login(default_email.as_deref());

        let export_dir = config.export.dir();
        Ok(Self {
            config,
            storage,
            identity,
            auth_events,
            theme_pref,
            export_dir,
            default_email,
            state,
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.drain_auth_events();
            terminal
                .draw(|frame| {
                    if self.state.page().items.is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.state.selected_index()));
                    }
                    ui::draw_app(frame, &self.state, &mut self.list_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            // auth events arrive between key presses, so poll on a timeout
            if event::poll(self.tick_rate).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }
        }
        Ok(())
    }

    fn drain_auth_events(&mut self) {
        while let Ok(user) = self.auth_events.try_recv() {
            self.state.user = user;
            match self.state.user.as_ref() {
                Some(user) => {
                    let greeting = format!("Signed in as {} ({})", user.email, user.role);
                    self.reload();
                    self.state.set_status_message(Some(greeting));
                }
                None => {
                    self.state.clear_letters();
                    // registration replays the signed-out state; keep the start-up prompt open
                    if !matches!(self.state.overlay(), Some(OverlayState::Login(_))) {
                        self.state.open_login(self.default_email.as_deref());
                    }
                }
            }
        }
    }

    fn dispatcher(&self) -> ActionDispatcher<'_> {
        ActionDispatcher::new(&self.storage, self.state.user.as_ref())
    }

    fn reload(&mut self) {
        let result = ActionDispatcher::new(&self.storage, self.state.user.as_ref())
            .load_letters(&mut self.state.controller);
        match result {
            Ok(outcome) => {
                self.state.on_letters_loaded(&outcome);
                if outcome.cancelled_edit.is_none() {
                    let count = self.state.controller.letters().len();
                    self.state
                        .set_status_message(Some(format!("Loaded {count} letter(s)")));
                }
            }
            Err(err) => self.report(err, "failed to load letters"),
        }
    }

    fn report(&mut self, err: LetterError, context: &'static str) {
        match &err {
            LetterError::PermissionDenied(_) | LetterError::Validation { .. } => {
                tracing::debug!(error = %err, "{context}");
            }
            _ => tracing::error!(error = %err, "{context}"),
        }
        self.state.set_status_message(Some(err.to_string()));
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.is_search_active() {
            match key.code {
                KeyCode::Esc => {
                    self.state.cancel_search();
                    return;
                }
                KeyCode::Enter => {
                    self.state.finish_search();
                    return;
                }
                KeyCode::Backspace => {
                    self.state.pop_search_char();
                    return;
                }
                KeyCode::Char(ch) if plain(key) => {
                    self.state.push_search_char(ch);
                    return;
                }
                _ => {}
            }
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Reload)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Right | KeyCode::Char(']') => Some(Action::NextPage),
            KeyCode::Left | KeyCode::Char('[') => Some(Action::PreviousPage),
            KeyCode::Enter | KeyCode::Tab => Some(Action::ToggleFocus),
            KeyCode::Char('/') if plain(key) => Some(Action::StartSearch),
            KeyCode::Char('a') if plain(key) => Some(Action::NewLetter),
            KeyCode::Char('e') if plain(key) => Some(Action::EditLetter),
            KeyCode::Char('d') if plain(key) => Some(Action::DeleteLetter),
            KeyCode::Char('x') if plain(key) => Some(Action::Export(ExportFormat::Pdf)),
            KeyCode::Char('X') => Some(Action::Export(ExportFormat::Docx)),
            KeyCode::Char('t') if plain(key) => Some(Action::ToggleTheme),
            KeyCode::Char('L') => Some(Action::Login),
            KeyCode::Char('?') => Some(Action::Help),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => match self.state.focus {
                FocusPane::List => self.state.move_selection(1),
                FocusPane::Preview => self.state.scroll_preview(1),
            },
            Action::SelectPrevious => match self.state.focus {
                FocusPane::List => self.state.move_selection(-1),
                FocusPane::Preview => self.state.scroll_preview(-1),
            },
            Action::NextPage => {
                if !self.state.change_page(1) {
                    self.state.set_status_message(Some("Already on the last page"));
                }
            }
            Action::PreviousPage => {
                if !self.state.change_page(-1) {
                    self.state.set_status_message(Some("Already on the first page"));
                }
            }
            Action::ToggleFocus => self.state.toggle_focus(),
            Action::Reload => self.reload(),
            Action::StartSearch => self.state.begin_search(),
            Action::NewLetter => self.handle_new_letter(),
            Action::EditLetter => self.handle_edit_letter(),
            Action::DeleteLetter => self.handle_delete_letter(),
            Action::Export(format) => self.handle_export(format),
            Action::ToggleTheme => {
                let theme = self.state.toggle_theme();
                if let Err(err) = self.theme_pref.store(theme) {
                    tracing::error!(?err, "failed to persist theme preference");
                }
                self.state
                    .set_status_message(Some(format!("Theme: {theme}")));
            }
            Action::Login => self.handle_login_toggle(),
            Action::Help => self.state.open_help(),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::Login(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        if self.state.user.is_none() {
                            self.state
                                .set_status_message(Some("Not signed in; press L to sign in"));
                        }
                    }
                    KeyCode::Enter => self.submit_login(),
                    KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                        if let Some(login) = self.state.login_overlay_mut() {
                            login.toggle_field();
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(login) = self.state.login_overlay_mut() {
                            login.backspace();
                        }
                    }
                    KeyCode::Char(ch) if plain(key) => {
                        if let Some(login) = self.state.login_overlay_mut() {
                            login.push_char(ch);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::LetterForm(_)) => {
                let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                match key.code {
                    KeyCode::Esc => {
                        ActionDispatcher::new(&self.storage, self.state.user.as_ref())
                            .cancel_form(&mut self.state.controller);
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Edit cancelled"));
                    }
                    KeyCode::Char('s') if ctrl => self.submit_letter_form(),
                    KeyCode::Char('n') if ctrl => {
                        if let Some(form) = self.state.letter_form_mut() {
                            if !form.cycle_preset() {
                                form.error =
                                    Some("Presets apply to the salutation and closing".into());
                            }
                        }
                    }
                    KeyCode::Tab => {
                        if let Some(form) = self.state.letter_form_mut() {
                            form.next_field();
                        }
                    }
                    KeyCode::BackTab => {
                        if let Some(form) = self.state.letter_form_mut() {
                            form.previous_field();
                        }
                    }
                    KeyCode::Enter => {
                        if let Some(form) = self.state.letter_form_mut() {
                            form.newline();
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(form) = self.state.letter_form_mut() {
                            form.backspace();
                        }
                    }
                    KeyCode::Char(ch) if plain(key) => {
                        if let Some(form) = self.state.letter_form_mut() {
                            form.push_char(ch);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::DeleteLetter(_)) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Char('n') => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Delete cancelled"));
                    }
                    KeyCode::Enter | KeyCode::Char('y') => self.submit_delete_letter(),
                    _ => {}
                }
                true
            }
            Some(OverlayState::Help) => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?')) {
                    self.state.close_overlay();
                }
                true
            }
            None => false,
        }
    }

    fn handle_login_toggle(&mut self) {
        if self.state.user.is_some() {
            if let Err(err) = self.identity.sign_out() {
                tracing::error!(?err, "sign-out failed");
                self.state.set_status_message(Some(err.to_string()));
                return;
            }
            self.state.set_status_message(Some("Signed out"));
        } else {
            self.state.open_login(self.default_email.as_deref());
        }
    }

    fn submit_login(&mut self) {
        let Some(OverlayState::Login(login)) = self.state.overlay() else {
            return;
        };
        let (email, password) = (login.email.clone(), login.password.clone());
        match self.identity.sign_in(&email, &password) {
            Ok(_) => {
                // the auth listener delivers the user; the next loop pass reloads
                self.state.close_overlay();
            }
            Err(err) => {
                if let AuthError::Unavailable(source) = &err {
                    tracing::error!(?source, "identity provider unavailable");
                }
                if let Some(login) = self.state.login_overlay_mut() {
                    login.password.clear();
                    login.password_focused = true;
                    login.error = Some(err.to_string());
                }
            }
        }
    }

    fn require_admin_key(&mut self, what: &str) -> bool {
        if self.state.is_admin() {
            return true;
        }
        let message = if self.state.user.is_some() {
            format!("Only administrators can {what}")
        } else {
            format!("Sign in (L) to {what}")
        };
        self.state.set_status_message(Some(message));
        false
    }

    fn handle_new_letter(&mut self) {
        if !self.require_admin_key("create letters") {
            return;
        }
        self.state.controller.end_edit();
        let form = LetterForm::blank(
            &self.config.letter_number_prefix,
            OffsetDateTime::now_utc(),
        );
        self.state.open_letter_form(form);
        self.state
            .set_status_message(Some("Tab moves between fields, Ctrl-s saves"));
    }

    fn handle_edit_letter(&mut self) {
        if !self.require_admin_key("edit letters") {
            return;
        }
        let Some(id) = self.state.selected_letter_id() else {
            self.state.set_status_message(Some("No letter selected"));
            return;
        };
        match self.state.controller.begin_edit(&id) {
            Ok(letter) => {
                let form = LetterForm::for_letter(letter);
                self.state.open_letter_form(form);
                self.state
                    .set_status_message(Some("Editing letter; Ctrl-s saves, Esc cancels"));
            }
            Err(err) => self.report(err, "failed to begin edit"),
        }
    }

    fn submit_letter_form(&mut self) {
        let Some(OverlayState::LetterForm(form)) = self.state.overlay() else {
            return;
        };
        let draft = form.draft.clone();
        let result = ActionDispatcher::new(&self.storage, self.state.user.as_ref())
            .submit_form(&mut self.state.controller, &draft);
        match result {
            Ok(outcome) => {
                self.state.close_overlay();
                self.state.select_letter(outcome.id());
                let message = match outcome {
                    SubmitOutcome::Created(_) => "Letter created",
                    SubmitOutcome::Updated(_) => "Letter updated",
                };
                self.state.set_status_message(Some(message));
            }
            Err(err) => {
                if let LetterError::ExternalService { .. } = &err {
                    tracing::error!(error = %err, "failed to save letter");
                }
                if let Some(form) = self.state.letter_form_mut() {
                    form.error = Some(err.to_string());
                }
            }
        }
    }

    fn handle_delete_letter(&mut self) {
        if !self.require_admin_key("delete letters") {
            return;
        }
        if !self.state.open_delete_letter() {
            self.state.set_status_message(Some("No letter selected"));
        }
    }

    fn submit_delete_letter(&mut self) {
        let Some(OverlayState::DeleteLetter(overlay)) = self.state.close_overlay() else {
            return;
        };
        let result = ActionDispatcher::new(&self.storage, self.state.user.as_ref())
            .delete_letter(&mut self.state.controller, &overlay.letter_id);
        match result {
            Ok(()) => {
                self.state.on_letters_loaded(&Default::default());
                self.state.set_status_message(Some(format!(
                    "Deleted letter {}",
                    overlay.letter_number
                )));
            }
            Err(err) => {
                let stale = err.is_not_found();
                self.report(err, "failed to delete letter");
                if stale {
                    self.reload();
                }
            }
        }
    }

    fn handle_export(&mut self, format: ExportFormat) {
        if format.requires_admin() && !self.require_admin_key("export DOCX") {
            return;
        }
        let Some(id) = self.state.selected_letter_id() else {
            self.state.set_status_message(Some("No letter selected"));
            return;
        };
        let result =
            self.dispatcher()
                .export_letter(&self.state.controller, &id, format, &self.export_dir);
        match result {
            Ok(path) => {
                tracing::info!(letter_id = %id, path = %path.display(), "letter exported");
                self.state
                    .set_status_message(Some(format!("Exported {}", path.display())));
            }
            Err(err) => self.report(err, "failed to export letter"),
        }
    }
}

fn plain(key: KeyEvent) -> bool {
    !key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}
