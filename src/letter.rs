use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::LetterError;

pub const DEFAULT_NUMBER_PREFIX: &str = "LC";
pub const DEFAULT_PREVIEW_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LetterId(String);

impl LetterId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LetterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LetterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LetterId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Salutation {
    #[strum(serialize = "Dear Sir/Madam")]
    DearSirMadam,
    #[strum(serialize = "Dear Sir")]
    DearSir,
    #[strum(serialize = "Dear Madam")]
    DearMadam,
    #[strum(serialize = "To Whom It May Concern")]
    ToWhomItMayConcern,
    #[strum(serialize = "Respected Sir/Madam")]
    RespectedSirMadam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Closing {
    #[strum(serialize = "Yours faithfully")]
    YoursFaithfully,
    #[strum(serialize = "Yours sincerely")]
    YoursSincerely,
    #[strum(serialize = "Best regards")]
    BestRegards,
    #[strum(serialize = "Kind regards")]
    KindRegards,
    #[strum(serialize = "Thank you")]
    ThankYou,
}

/// Returns the preset following `current`; custom text restarts at the first preset.
pub fn next_preset<P>(current: &str) -> String
where
    P: IntoEnumIterator + fmt::Display,
{
    let presets: Vec<String> = P::iter().map(|phrase| phrase.to_string()).collect();
    let trimmed = current.trim();
    match presets.iter().position(|phrase| phrase == trimmed) {
        Some(idx) => presets[(idx + 1) % presets.len()].clone(),
        None => presets.first().cloned().unwrap_or_default(),
    }
}

pub fn is_preset<P>(phrase: &str) -> bool
where
    P: IntoEnumIterator + fmt::Display,
{
    P::iter().any(|preset| preset.to_string() == phrase.trim())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Letter {
    pub id: LetterId,
    pub letter_number: String,
    pub letter_date: Date,
    pub salutation: String,
    pub subject: String,
    pub main_body: String,
    pub special_remarks: Option<String>,
    pub closing: String,
    pub sender_name: Option<String>,
    pub recipient_name: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
    pub created_by: String,
}

impl Letter {
    pub fn from_fields(
        id: LetterId,
        fields: LetterFields,
        created_by: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        let LetterFields {
            letter_number,
            letter_date,
            salutation,
            subject,
            main_body,
            special_remarks,
            closing,
            sender_name,
            recipient_name,
        } = fields;
        Self {
            id,
            letter_number,
            letter_date,
            salutation,
            subject,
            main_body,
            special_remarks,
            closing,
            sender_name,
            recipient_name,
            created_at,
            updated_at: None,
            created_by: created_by.into(),
        }
    }

    pub fn formatted_date(&self) -> String {
        format_letter_date(self.letter_date)
    }

    pub fn preview(&self, max_chars: usize) -> String {
        preview_text(&self.main_body, max_chars)
    }

    pub fn to_draft(&self) -> LetterDraft {
        LetterDraft {
            letter_number: self.letter_number.clone(),
            letter_date: format_iso_date(self.letter_date),
            salutation: self.salutation.clone(),
            subject: self.subject.clone(),
            main_body: self.main_body.clone(),
            special_remarks: self.special_remarks.clone().unwrap_or_default(),
            closing: self.closing.clone(),
            sender_name: self.sender_name.clone().unwrap_or_default(),
            recipient_name: self.recipient_name.clone().unwrap_or_default(),
        }
    }
}

/// Validated letter contents, as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterFields {
    pub letter_number: String,
    pub letter_date: Date,
    pub salutation: String,
    pub subject: String,
    pub main_body: String,
    pub special_remarks: Option<String>,
    pub closing: String,
    pub sender_name: Option<String>,
    pub recipient_name: Option<String>,
}

/// Raw form contents; every field is free text until validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterDraft {
    pub letter_number: String,
    pub letter_date: String,
    pub salutation: String,
    pub subject: String,
    pub main_body: String,
    pub special_remarks: String,
    pub closing: String,
    pub sender_name: String,
    pub recipient_name: String,
}

impl LetterDraft {
    pub fn blank(number_prefix: &str, now: OffsetDateTime) -> Self {
        Self {
            letter_number: generate_letter_number(number_prefix, now),
            letter_date: format_iso_date(now.date()),
            salutation: Salutation::DearSirMadam.to_string(),
            closing: Closing::YoursFaithfully.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<LetterFields, LetterError> {
        let letter_number = required("letterNumber", &self.letter_number, "letter number")?;
        let raw_date = required("letterDate", &self.letter_date, "letter date")?;
        let letter_date = parse_iso_date(&raw_date).ok_or_else(|| {
            LetterError::validation("letterDate", format!("'{raw_date}' is not a YYYY-MM-DD date"))
        })?;
        let salutation = required("salutation", &self.salutation, "salutation")?;
        let subject = required("subject", &self.subject, "subject")?;
        if self.main_body.trim().is_empty() {
            return Err(LetterError::validation("mainBody", "letter body is required"));
        }
        let main_body = self.main_body.clone();
        let closing = required("closing", &self.closing, "closing")?;

        Ok(LetterFields {
            letter_number,
            letter_date,
            salutation,
            subject,
            main_body,
            special_remarks: optional(&self.special_remarks),
            closing,
            sender_name: optional(&self.sender_name),
            recipient_name: optional(&self.recipient_name),
        })
    }
}

fn required(field: &'static str, value: &str, label: &str) -> Result<String, LetterError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LetterError::validation(field, format!("{label} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn format_letter_date(date: Date) -> String {
    date.format(format_description!(
        "[month repr:long] [day padding:none], [year]"
    ))
    .unwrap_or_else(|_| date.to_string())
}

pub fn format_iso_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_iso_date(input: &str) -> Option<Date> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]")).ok()
}

pub fn generate_letter_number(prefix: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!("[year][month][day][hour][minute]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{prefix}{stamp}")
}

pub fn preview_text(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
