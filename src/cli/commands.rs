use std::env;
use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use time::OffsetDateTime;

use crate::agenda::{AgendaField, AgendaRequest};
use crate::app::{ActionDispatcher, SubmitOutcome};
use crate::config::AppConfig;
use crate::controller::{render_slots, LetterListController};
use crate::export::{self, Align, Block, ExportFormat};
use crate::letter::{Letter, LetterDraft, LetterId};
use crate::session::{self, IdentityProvider, LocalIdentityProvider, PasswordHash, User};
use crate::storage::StorageHandle;

const PASSWORD_ENV: &str = "LETTERCRAFT_PASSWORD";
const TEXT_WIDTH: usize = 78;

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only letters whose number, subject, body, salutation or remarks contain this text
    #[arg(long)]
    pub query: Option<String>,
    /// Page to print (1-based)
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Print the page as JSON
    #[arg(long)]
    pub json: bool,
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            query: None,
            page: 1,
            json: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Letter identifier
    pub id: String,
}

/// Field values shared by `new` and `edit`; omitted flags keep their defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct LetterFieldArgs {
    #[arg(long)]
    pub number: Option<String>,
    /// Letter date as YYYY-MM-DD
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub salutation: Option<String>,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub remarks: Option<String>,
    #[arg(long)]
    pub closing: Option<String>,
    #[arg(long)]
    pub sender: Option<String>,
    #[arg(long)]
    pub recipient: Option<String>,
}

impl LetterFieldArgs {
    fn apply(self, draft: &mut LetterDraft) {
        let overrides = [
            (self.number, &mut draft.letter_number),
            (self.date, &mut draft.letter_date),
            (self.salutation, &mut draft.salutation),
            (self.subject, &mut draft.subject),
            (self.body, &mut draft.main_body),
            (self.remarks, &mut draft.special_remarks),
            (self.closing, &mut draft.closing),
            (self.sender, &mut draft.sender_name),
            (self.recipient, &mut draft.recipient_name),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct NewArgs {
    #[command(flatten)]
    pub fields: LetterFieldArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Letter identifier
    pub id: String,
    #[command(flatten)]
    pub fields: LetterFieldArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Letter identifier
    pub id: String,
    /// pdf or docx
    #[arg(long, default_value = "pdf")]
    pub format: ExportFormat,
    /// Output directory (defaults to [export] output_dir)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgendaOutput {
    Text,
    Pdf,
    Docx,
}

#[derive(Args, Debug, Clone)]
pub struct AgendaArgs {
    /// Field to include, repeatable (number, date, subject, recipient, ...)
    #[arg(long = "field", required = true)]
    pub fields: Vec<AgendaField>,
    /// Letter identifier, repeatable
    #[arg(long = "letter", required = true)]
    pub letters: Vec<String>,
    #[arg(long, value_enum, default_value_t = AgendaOutput::Text)]
    pub format: AgendaOutput,
    /// Output directory for pdf/docx (defaults to [export] output_dir)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct HashPasswordArgs {
    #[arg(long)]
    pub email: String,
    /// PBKDF2 rounds; higher is slower to brute-force
    #[arg(long, default_value_t = session::DEFAULT_PBKDF2_ITERATIONS)]
    pub iterations: u32,
}

pub struct CliContext {
    pub config: Arc<AppConfig>,
    pub storage: StorageHandle,
    pub user: User,
}

impl CliContext {
    fn dispatcher(&self) -> ActionDispatcher<'_> {
        ActionDispatcher::new(&self.storage, Some(&self.user))
    }

    fn loaded(&self) -> Result<LetterListController> {
        let mut controller = LetterListController::new();
        self.dispatcher().load_letters(&mut controller)?;
        Ok(controller)
    }

    fn export_dir(&self, out: Option<&PathBuf>) -> PathBuf {
        out.cloned().unwrap_or_else(|| self.config.export.dir())
    }
}

pub fn authenticate(config: &AppConfig, email: Option<&str>) -> Result<User> {
    let email = match email {
        Some(email) => email.to_string(),
        None if atty::is(atty::Stream::Stdin) => prompt("Email")?,
        None => bail!("--email is required when stdin is not a terminal"),
    };
    let password = read_password()?;
    let provider = LocalIdentityProvider::new(config.accounts.clone());
    provider
        .sign_in(&email, &password)
        .with_context(|| format!("signing in as {email}"))
}

pub fn hash_password(args: &HashPasswordArgs) -> Result<String> {
    let password = read_password()?;
    if password.is_empty() {
        bail!("refusing to hash an empty password");
    }
    let hash = PasswordHash::generate(&password, args.iterations);
    Ok(account_entry(&args.email, &hash))
}

/// An `[[accounts]]` table ready to paste into the config file.
fn account_entry(email: &str, hash: &PasswordHash) -> String {
    format!(
        "[[accounts]]\nemail = \"{}\"\npassword_hash = \"{hash}\"\n",
        email.trim()
    )
}

pub fn list_letters(ctx: &CliContext, args: &ListArgs) -> Result<String> {
    let mut controller = ctx.loaded()?;
    if let Some(query) = &args.query {
        controller.set_query(query);
    }
    let page_size = ctx.config.page_size;
    if args.page != 1 && !controller.set_page(args.page, page_size) {
        bail!(
            "page {} is out of range (1-{})",
            args.page,
            controller.total_pages(page_size).max(1)
        );
    }
    let page = controller.get_page(page_size);

    if args.json {
        let mut out = serde_json::to_string_pretty(&serde_json::json!({
            "page": page.page_number,
            "totalPages": page.total_pages,
            "letters": page.items,
        }))
        .context("serialising letters")?;
        out.push('\n');
        return Ok(out);
    }

    if page.items.is_empty() {
        return Ok("No letters found.\n".to_string());
    }
    let mut out = String::new();
    for letter in &page.items {
        let _ = writeln!(
            &mut out,
            "{}  {}  {}",
            letter.letter_number,
            letter.formatted_date(),
            letter.subject
        );
        let _ = writeln!(&mut out, "    id {}", letter.id);
        let _ = writeln!(
            &mut out,
            "    {}",
            letter.preview(ctx.config.preview_chars).replace('\n', " ")
        );
        out.push('\n');
    }
    let _ = write!(&mut out, "Page {} of {}", page.page_number, page.total_pages);
    if page.total_pages > 1 {
        let _ = write!(&mut out, "  {}", render_slots(&page.slots(), page.page_number));
    }
    out.push('\n');
    Ok(out)
}

pub fn show_letter(ctx: &CliContext, args: &IdArgs) -> Result<String> {
    let controller = ctx.loaded()?;
    let id = LetterId::from(args.id.as_str());
    let letter = controller
        .find(&id)
        .with_context(|| format!("letter {id} not found"))?;
    Ok(render_letter_text(letter, TEXT_WIDTH))
}

pub fn new_letter(ctx: &CliContext, args: NewArgs) -> Result<String> {
    let mut draft = LetterDraft::blank(
        &ctx.config.letter_number_prefix,
        OffsetDateTime::now_utc(),
    );
    let mut fields = args.fields;
    if fields.body.is_none() {
        fields.body = read_stdin()?;
    }
    fields.apply(&mut draft);

    let mut controller = LetterListController::new();
    let outcome = ctx.dispatcher().submit_form(&mut controller, &draft)?;
    Ok(describe_outcome(&outcome, &draft))
}

pub fn edit_letter(ctx: &CliContext, args: EditArgs) -> Result<String> {
    let mut controller = ctx.loaded()?;
    let id = LetterId::from(args.id);
    let mut draft = controller.begin_edit(&id)?.to_draft();
    args.fields.apply(&mut draft);
    let outcome = ctx.dispatcher().submit_form(&mut controller, &draft)?;
    Ok(describe_outcome(&outcome, &draft))
}

pub fn delete_letter(ctx: &CliContext, args: &IdArgs) -> Result<String> {
    let mut controller = ctx.loaded()?;
    let id = LetterId::from(args.id.as_str());
    ctx.dispatcher().delete_letter(&mut controller, &id)?;
    Ok(format!("Deleted letter {id}\n"))
}

pub fn export_letter(ctx: &CliContext, args: &ExportArgs) -> Result<String> {
    let controller = ctx.loaded()?;
    let id = LetterId::from(args.id.as_str());
    let dir = ctx.export_dir(args.out.as_ref());
    let path = ctx
        .dispatcher()
        .export_letter(&controller, &id, args.format, &dir)?;
    Ok(format!("{}\n", path.display()))
}

pub fn agenda(ctx: &CliContext, args: &AgendaArgs) -> Result<String> {
    let controller = ctx.loaded()?;
    let request = AgendaRequest {
        fields: args.fields.clone(),
        letter_ids: args.letters.iter().map(|id| LetterId::from(id.as_str())).collect(),
    };
    let today = OffsetDateTime::now_utc().date();
    let format = match args.format {
        AgendaOutput::Text => {
            let agenda = ctx.dispatcher().compose_agenda(&controller, &request, today)?;
            return Ok(agenda.render_text());
        }
        AgendaOutput::Pdf => ExportFormat::Pdf,
        AgendaOutput::Docx => ExportFormat::Docx,
    };
    let dir = ctx.export_dir(args.out.as_ref());
    let path = ctx
        .dispatcher()
        .export_agenda(&controller, &request, format, &dir, today)?;
    Ok(format!("{}\n", path.display()))
}

fn describe_outcome(outcome: &SubmitOutcome, draft: &LetterDraft) -> String {
    let verb = match outcome {
        SubmitOutcome::Created(_) => "Created",
        SubmitOutcome::Updated(_) => "Updated",
    };
    format!(
        "{verb} letter {} ({})\n",
        outcome.id(),
        draft.letter_number.trim()
    )
}

/// Plain-text rendering of the export layout, for terminals and pipes.
fn render_letter_text(letter: &Letter, width: usize) -> String {
    let mut out = String::new();
    for block in export::letter_document(letter).blocks {
        match block {
            Block::Spacer => out.push('\n'),
            Block::Columns { left, right } => {
                let used = left.chars().count() + right.chars().count();
                let gap = width.saturating_sub(used).max(2);
                let _ = writeln!(&mut out, "{left}{}{right}", " ".repeat(gap));
            }
            Block::Text { text, align, .. } => {
                for line in text.lines() {
                    let pad = width.saturating_sub(line.chars().count());
                    let indent = match align {
                        Align::Left => 0,
                        Align::Center => pad / 2,
                        Align::Right => pad,
                    };
                    let _ = writeln!(&mut out, "{}{line}", " ".repeat(indent));
                }
            }
        }
    }
    out
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{label}: ")?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_password() -> Result<String> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    if !atty::is(atty::Stream::Stdin) {
        bail!("set {PASSWORD_ENV} when stdin is not a terminal");
    }
    prompt_hidden("Password")
}

/// Reads a line in raw mode so the password is not echoed.
fn prompt_hidden(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{label}: ")?;
    stdout.flush()?;
    enable_raw_mode().context("enabling raw mode for password prompt")?;
    let result = read_hidden_line();
    disable_raw_mode().context("disabling raw mode")?;
    writeln!(stdout)?;
    result
}

fn read_hidden_line() -> Result<String> {
    let mut input = String::new();
    loop {
        let Event::Key(key) = event::read().context("reading password input")? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(input),
            KeyCode::Esc => bail!("password entry cancelled"),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                bail!("password entry cancelled")
            }
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(ch) => input.push(ch),
            _ => {}
        }
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountConfig, ConfigPaths, StorageOptions};
    use crate::error::LetterError;
    use crate::session::Role;
    use crate::storage;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn setup(role: Role) -> TestResult<(TempDir, CliContext)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let root = temp.path();
        let paths = ConfigPaths::rooted(
            root.join("config"),
            root.join("config/config.toml"),
            root.join("data"),
            root.join("state"),
        );
        paths.ensure_directories()?;
        let storage_opts = StorageOptions {
            database_path: paths.database_path.clone(),
            ..StorageOptions::default()
        };
        let storage = storage::init(&paths, &storage_opts)?;
        let config = AppConfig {
            page_size: 2,
            accounts: vec![AccountConfig {
                email: "clerk@example.com".into(),
                password_hash: PasswordHash::generate("pw", 10).to_string(),
                role,
            }],
            ..AppConfig::default()
        };
        let user = User {
            email: "clerk@example.com".into(),
            role,
        };
        let ctx = CliContext {
            config: Arc::new(config),
            storage,
            user,
        };
        Ok((temp, ctx))
    }

    fn new_args(subject: &str, date: &str) -> NewArgs {
        NewArgs {
            fields: LetterFieldArgs {
                date: Some(date.into()),
                subject: Some(subject.into()),
                body: Some(format!("Body of {subject}")),
                number: Some(format!("LC-{date}")),
                ..LetterFieldArgs::default()
            },
        }
    }

    fn first_id(ctx: &CliContext) -> TestResult<LetterId> {
        let controller = ctx.loaded()?;
        let letter = controller.letters().first().context("no letters")?;
        Ok(letter.id.clone())
    }

    #[test]
    fn cli_new_then_list_pages_newest_first() -> TestResult {
        let (_temp, ctx) = setup(Role::Admin)?;
        for (subject, date) in [
            ("Rent", "2024-01-10"),
            ("Repairs", "2024-03-02"),
            ("Parking", "2024-02-14"),
        ] {
            let created = new_letter(&ctx, new_args(subject, date))?;
            assert!(created.starts_with("Created letter "));
        }

        let first = list_letters(&ctx, &ListArgs::default())?;
        let repairs = first.find("Repairs").context("repairs listed")?;
        let parking = first.find("Parking").context("parking listed")?;
        assert!(repairs < parking);
        assert!(!first.contains("Rent"));
        assert!(first.contains("Page 1 of 2"));

        let second = list_letters(
            &ctx,
            &ListArgs {
                page: 2,
                ..ListArgs::default()
            },
        )?;
        assert!(second.contains("Rent"));

        let out_of_range = list_letters(
            &ctx,
            &ListArgs {
                page: 9,
                ..ListArgs::default()
            },
        );
        assert!(out_of_range.is_err());
        Ok(())
    }

    #[test]
    fn cli_list_filters_and_prints_json() -> TestResult {
        let (_temp, ctx) = setup(Role::Admin)?;
        new_letter(&ctx, new_args("Invoice overdue", "2024-01-10"))?;
        new_letter(&ctx, new_args("Welcome", "2024-01-11"))?;

        let out = list_letters(
            &ctx,
            &ListArgs {
                query: Some("INVOICE".into()),
                json: true,
                ..ListArgs::default()
            },
        )?;
        let value: serde_json::Value = serde_json::from_str(&out)?;
        assert_eq!(value["totalPages"], 1);
        let letters = value["letters"].as_array().context("letters array")?;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0]["subject"], "Invoice overdue");
        assert_eq!(letters[0]["createdBy"], "clerk@example.com");
        Ok(())
    }

    #[test]
    fn cli_edit_overrides_only_given_fields() -> TestResult {
        let (_temp, ctx) = setup(Role::Admin)?;
        new_letter(&ctx, new_args("Draft subject", "2024-05-01"))?;
        let id = first_id(&ctx)?;

        let out = edit_letter(
            &ctx,
            EditArgs {
                id: id.to_string(),
                fields: LetterFieldArgs {
                    subject: Some("Final subject".into()),
                    ..LetterFieldArgs::default()
                },
            },
        )?;
        assert!(out.starts_with("Updated letter "));

        let shown = show_letter(&ctx, &IdArgs { id: id.to_string() })?;
        assert!(shown.contains("Subject: Final subject"));
        assert!(shown.contains("Body of Draft subject"));
        assert!(shown.contains("Date: May 1, 2024"));
        Ok(())
    }

    #[test]
    fn cli_rejects_reader_mutations() -> TestResult {
        let (_temp, ctx) = setup(Role::Reader)?;
        let err = new_letter(&ctx, new_args("Nope", "2024-05-01")).unwrap_err();
        assert_matches!(
            err.downcast_ref::<LetterError>(),
            Some(LetterError::PermissionDenied(_))
        );
        Ok(())
    }

    #[test]
    fn cli_agenda_prints_text() -> TestResult {
        let (_temp, ctx) = setup(Role::Admin)?;
        new_letter(&ctx, new_args("Budget", "2024-04-01"))?;
        let id = first_id(&ctx)?;

        let out = agenda(
            &ctx,
            &AgendaArgs {
                fields: vec![AgendaField::Number, AgendaField::Subject],
                letters: vec![id.to_string()],
                format: AgendaOutput::Text,
                out: None,
            },
        )?;
        assert!(out.starts_with("Agenda, "));
        assert!(out.contains("  1. Letter No: LC-2024-04-01"));
        assert!(out.contains("     Subject: Budget"));
        Ok(())
    }

    #[test]
    fn cli_export_and_delete() -> TestResult {
        let (temp, ctx) = setup(Role::Admin)?;
        new_letter(&ctx, new_args("Notice", "2024-06-01"))?;
        let id = first_id(&ctx)?;

        let out_dir = temp.path().join("out");
        let printed = export_letter(
            &ctx,
            &ExportArgs {
                id: id.to_string(),
                format: ExportFormat::Docx,
                out: Some(out_dir.clone()),
            },
        )?;
        assert!(out_dir.join("Letter_LC-2024-06-01.docx").exists());
        assert!(printed.trim_end().ends_with("Letter_LC-2024-06-01.docx"));

        delete_letter(&ctx, &IdArgs { id: id.to_string() })?;
        assert!(show_letter(&ctx, &IdArgs { id: id.to_string() }).is_err());
        Ok(())
    }

    #[test]
    fn account_entry_is_valid_config_with_a_verifiable_hash() -> TestResult {
        let hash = PasswordHash::generate("s3cret", 10);
        let entry = account_entry(" admin@example.com ", &hash);

        #[derive(serde::Deserialize)]
        struct Entries {
            accounts: Vec<AccountConfig>,
        }
        let parsed: Entries = toml::from_str(&entry)?;
        assert_eq!(parsed.accounts[0].email, "admin@example.com");
        let stored: PasswordHash = parsed.accounts[0].password_hash.parse()?;
        assert!(stored.verify("s3cret"));
        assert!(!stored.verify("secret"));
        Ok(())
    }

    #[test]
    fn text_rendering_aligns_closing_right() {
        let letter = Letter::from_fields(
            LetterId::from("t"),
            crate::letter::LetterFields {
                letter_number: "LC-7".into(),
                letter_date: time::macros::date!(2024 - 07 - 01),
                salutation: "Dear Madam".into(),
                subject: "Meeting".into(),
                main_body: "See you there.".into(),
                special_remarks: None,
                closing: "Yours faithfully".into(),
                sender_name: None,
                recipient_name: None,
            },
            "clerk@example.com",
            OffsetDateTime::UNIX_EPOCH,
        );
        let text = render_letter_text(&letter, 40);
        let closing = text
            .lines()
            .find(|line| line.trim() == "Yours faithfully")
            .expect("closing line");
        assert_eq!(closing.len(), 40);
        let subject = text
            .lines()
            .find(|line| line.contains("Subject: Meeting"))
            .expect("subject line");
        assert!(subject.starts_with("           "));
    }
}
