use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};
use time::Date;

use crate::error::LetterError;
use crate::export::{Align, Block, Document};
use crate::letter::{format_letter_date, Letter, LetterId};

/// A column an agenda can show for each selected letter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AgendaField {
    Number,
    Date,
    Salutation,
    Subject,
    Body,
    Remarks,
    Closing,
    Sender,
    Recipient,
    CreatedBy,
}

impl AgendaField {
    pub fn label(self) -> &'static str {
        match self {
            AgendaField::Number => "Letter No",
            AgendaField::Date => "Date",
            AgendaField::Salutation => "Salutation",
            AgendaField::Subject => "Subject",
            AgendaField::Body => "Body",
            AgendaField::Remarks => "Special Remarks",
            AgendaField::Closing => "Closing",
            AgendaField::Sender => "Sender",
            AgendaField::Recipient => "Recipient",
            AgendaField::CreatedBy => "Created By",
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    fn value(self, letter: &Letter) -> String {
        match self {
            AgendaField::Number => letter.letter_number.clone(),
            AgendaField::Date => letter.formatted_date(),
            AgendaField::Salutation => letter.salutation.clone(),
            AgendaField::Subject => letter.subject.clone(),
            AgendaField::Body => letter.main_body.clone(),
            AgendaField::Remarks => letter.special_remarks.clone().unwrap_or_default(),
            AgendaField::Closing => letter.closing.clone(),
            AgendaField::Sender => letter.sender_name.clone().unwrap_or_default(),
            AgendaField::Recipient => letter.recipient_name.clone().unwrap_or_default(),
            AgendaField::CreatedBy => letter.created_by.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaRequest {
    pub fields: Vec<AgendaField>,
    pub letter_ids: Vec<LetterId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaRow {
    pub letter_id: LetterId,
    pub values: IndexMap<AgendaField, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agenda {
    pub generated_on: Date,
    pub fields: Vec<AgendaField>,
    pub rows: Vec<AgendaRow>,
}

/// Builds an agenda over `letters`, which must already be in display order.
pub fn build_agenda(
    letters: &[Letter],
    request: &AgendaRequest,
    generated_on: Date,
) -> Result<Agenda, LetterError> {
    let fields: IndexSet<AgendaField> = request.fields.iter().copied().collect();
    if fields.is_empty() {
        return Err(LetterError::validation(
            "fields",
            "select at least one agenda field",
        ));
    }
    let ids: IndexSet<&LetterId> = request.letter_ids.iter().collect();
    if ids.is_empty() {
        return Err(LetterError::validation(
            "letters",
            "select at least one letter",
        ));
    }
    if let Some(missing) = ids
        .iter()
        .find(|id| !letters.iter().any(|letter| &&letter.id == *id))
    {
        return Err(LetterError::NotFound((*missing).clone()));
    }

    let rows = letters
        .iter()
        .filter(|letter| ids.contains(&letter.id))
        .map(|letter| AgendaRow {
            letter_id: letter.id.clone(),
            values: fields
                .iter()
                .map(|field| (*field, field.value(letter)))
                .collect(),
        })
        .collect();

    Ok(Agenda {
        generated_on,
        fields: fields.into_iter().collect(),
        rows,
    })
}

impl Agenda {
    fn heading(&self) -> String {
        format!("Agenda, {}", format_letter_date(self.generated_on))
    }

    pub fn render_text(&self) -> String {
        let mut out = format!("{}\n", self.heading());
        for (idx, row) in self.rows.iter().enumerate() {
            out.push('\n');
            for (pos, (field, value)) in row.values.iter().enumerate() {
                let marker = if pos == 0 {
                    format!("{:>3}. ", idx + 1)
                } else {
                    "     ".to_string()
                };
                out.push_str(&format!("{marker}{}: {value}\n", field.label()));
            }
        }
        out
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new(self.heading());
        doc.push(Block::Columns {
            left: "Agenda".into(),
            right: format!("Date: {}", format_letter_date(self.generated_on)),
        })
        .gap(2);
        for (idx, row) in self.rows.iter().enumerate() {
            doc.push(Block::bold(format!("Item {}", idx + 1)));
            for (field, value) in &row.values {
                doc.push(Block::aligned(
                    format!("{}: {value}", field.label()),
                    Align::Left,
                ));
            }
            doc.gap(1);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::LetterFields;
    use assert_matches::assert_matches;
    use time::macros::{date, datetime};

    fn letter(id: &str, number: &str, letter_date: Date) -> Letter {
        Letter::from_fields(
            LetterId::from(id),
            LetterFields {
                letter_number: number.into(),
                letter_date,
                salutation: "Dear Sir/Madam".into(),
                subject: format!("About {number}"),
                main_body: "Body".into(),
                special_remarks: None,
                closing: "Yours faithfully".into(),
                sender_name: None,
                recipient_name: Some("Board".into()),
            },
            "admin@example.com",
            datetime!(2024-01-01 00:00 UTC),
        )
    }

    fn cache() -> Vec<Letter> {
        vec![
            letter("c", "LC-3", date!(2024 - 03 - 01)),
            letter("b", "LC-2", date!(2024 - 02 - 01)),
            letter("a", "LC-1", date!(2024 - 01 - 01)),
        ]
    }

    #[test]
    fn keeps_display_order_and_field_order() {
        let request = AgendaRequest {
            fields: vec![AgendaField::Subject, AgendaField::Number, AgendaField::Subject],
            letter_ids: vec![LetterId::from("a"), LetterId::from("c"), LetterId::from("a")],
        };
        let agenda = build_agenda(&cache(), &request, date!(2024 - 04 - 01)).expect("agenda");

        assert_eq!(agenda.fields, vec![AgendaField::Subject, AgendaField::Number]);
        let ids: Vec<&str> = agenda.rows.iter().map(|row| row.letter_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        let first: Vec<&String> = agenda.rows[0].values.values().collect();
        assert_eq!(first, vec!["About LC-3", "LC-3"]);
    }

    #[test]
    fn empty_selections_are_rejected() {
        let no_fields = AgendaRequest {
            fields: Vec::new(),
            letter_ids: vec![LetterId::from("a")],
        };
        assert_matches!(
            build_agenda(&cache(), &no_fields, date!(2024 - 04 - 01)),
            Err(LetterError::Validation { field: "fields", .. })
        );

        let no_letters = AgendaRequest {
            fields: vec![AgendaField::Number],
            letter_ids: Vec::new(),
        };
        assert_matches!(
            build_agenda(&cache(), &no_letters, date!(2024 - 04 - 01)),
            Err(LetterError::Validation { field: "letters", .. })
        );
    }

    #[test]
    fn unknown_letter_is_not_found() {
        let request = AgendaRequest {
            fields: vec![AgendaField::Number],
            letter_ids: vec![LetterId::from("a"), LetterId::from("zzz")],
        };
        assert_matches!(
            build_agenda(&cache(), &request, date!(2024 - 04 - 01)),
            Err(LetterError::NotFound(id)) if id.as_str() == "zzz"
        );
    }

    #[test]
    fn renders_text_and_document() {
        let request = AgendaRequest {
            fields: vec![AgendaField::Number, AgendaField::Recipient],
            letter_ids: vec![LetterId::from("b")],
        };
        let agenda = build_agenda(&cache(), &request, date!(2024 - 04 - 01)).expect("agenda");

        assert_eq!(
            agenda.render_text(),
            "Agenda, April 1, 2024\n\n  1. Letter No: LC-2\n     Recipient: Board\n"
        );
        let doc = agenda.to_document();
        assert!(doc.blocks.contains(&Block::bold("Item 1")));
        assert!(doc.blocks.contains(&Block::plain("Recipient: Board")));
    }

    #[test]
    fn field_names_parse_from_kebab_case() {
        assert_eq!("created-by".parse::<AgendaField>().ok(), Some(AgendaField::CreatedBy));
        assert_eq!(AgendaField::Remarks.name(), "remarks");
        assert!("title".parse::<AgendaField>().is_err());
    }
}
