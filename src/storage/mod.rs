use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};
use crate::error::LetterError;
use crate::letter::{format_iso_date, parse_iso_date, Letter, LetterFields, LetterId};

mod schema;

const LETTER_COLUMNS: &str = "id,
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
    updated_at,
    created_by";

/// Authoritative letter collection.
///
/// Writes are not echoed back; callers re-read with [`LetterStore::list_letters`]
/// to observe them.
pub trait LetterStore {
    /// All letters, newest letter date first (ties broken by creation time).
    fn list_letters(&self) -> Result<Vec<Letter>>;
    fn fetch_letter(&self, id: &LetterId) -> Result<Option<Letter>>;
    fn create_letter(&self, fields: &LetterFields, created_by: &str) -> Result<LetterId>;
    fn update_letter(&self, id: &LetterId, fields: &LetterFields) -> Result<()>;
    fn delete_letter(&self, id: &LetterId) -> Result<()>;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn count_letters(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM letters", [], |row| row.get(0))
                .context("counting letters")?;
            Ok(count as usize)
        })
    }
}

impl LetterStore for StorageHandle {
    fn list_letters(&self) -> Result<Vec<Letter>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {LETTER_COLUMNS}
                 FROM letters
                 ORDER BY letter_date DESC, created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let letters = stmt
                .query_map([], letter_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("querying letters")?;
            Ok(letters)
        })
    }

    fn fetch_letter(&self, id: &LetterId) -> Result<Option<Letter>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {LETTER_COLUMNS} FROM letters WHERE id = ?1");
            let letter = conn
                .query_row(&sql, params![id.as_str()], letter_from_row)
                .optional()
                .with_context(|| format!("fetching letter {id}"))?;
            Ok(letter)
        })
    }

    fn create_letter(&self, fields: &LetterFields, created_by: &str) -> Result<LetterId> {
        let id = LetterId::generate();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO letters (
                    id, letter_number, letter_date, salutation, subject, main_body,
                    special_remarks, closing, sender_name, recipient_name,
                    created_at, updated_at, created_by
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, ?12)",
                params![
                    id.as_str(),
                    fields.letter_number,
                    format_iso_date(fields.letter_date),
                    fields.salutation,
                    fields.subject,
                    fields.main_body,
                    fields.special_remarks,
                    fields.closing,
                    fields.sender_name,
                    fields.recipient_name,
                    now,
                    created_by,
                ],
            )
            .context("inserting letter")?;
            Ok(())
        })?;
        tracing::debug!(letter_id = %id, number = %fields.letter_number, "letter created");
        Ok(id)
    }

    fn update_letter(&self, id: &LetterId, fields: &LetterFields) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE letters
                     SET letter_number = ?1,
                         letter_date = ?2,
                         salutation = ?3,
                         subject = ?4,
                         main_body = ?5,
                         special_remarks = ?6,
                         closing = ?7,
                         sender_name = ?8,
                         recipient_name = ?9,
                         updated_at = ?10
                     WHERE id = ?11",
                    params![
                        fields.letter_number,
                        format_iso_date(fields.letter_date),
                        fields.salutation,
                        fields.subject,
                        fields.main_body,
                        fields.special_remarks,
                        fields.closing,
                        fields.sender_name,
                        fields.recipient_name,
                        now,
                        id.as_str(),
                    ],
                )
                .context("updating letter")?;
            if updated == 0 {
                return Err(LetterError::NotFound(id.clone()).into());
            }
            Ok(())
        })
    }

    fn delete_letter(&self, id: &LetterId) -> Result<()> {
        self.with_connection(|conn| {
            let deleted = conn
                .execute("DELETE FROM letters WHERE id = ?1", params![id.as_str()])
                .context("deleting letter")?;
            if deleted == 0 {
                return Err(LetterError::NotFound(id.clone()).into());
            }
            Ok(())
        })
    }
}

fn letter_from_row(row: &Row<'_>) -> rusqlite::Result<Letter> {
    let raw_date: String = row.get(2)?;
    let letter_date = parse_iso_date(&raw_date).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("invalid letter_date '{raw_date}'").into(),
        )
    })?;
    Ok(Letter {
        id: LetterId::from(row.get::<_, String>(0)?),
        letter_number: row.get(1)?,
        letter_date,
        salutation: row.get(3)?,
        subject: row.get(4)?,
        main_body: row.get(5)?,
        special_remarks: row.get(6)?,
        closing: row.get(7)?,
        sender_name: row.get(8)?,
        recipient_name: row.get(9)?,
        created_at: timestamp(10, row.get(10)?)?,
        updated_at: row
            .get::<_, Option<i64>>(11)?
            .map(|secs| timestamp(11, secs))
            .transpose()?,
        created_by: row.get(12)?,
    })
}

fn timestamp(idx: usize, secs: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err)))
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        paths.database_path.clone()
    } else {
        storage.database_path.clone()
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "letter store ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
