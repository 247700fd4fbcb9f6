use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS letters (
            id TEXT PRIMARY KEY,
            letter_number TEXT NOT NULL,
            letter_date TEXT NOT NULL,
            salutation TEXT NOT NULL,
            subject TEXT NOT NULL,
            main_body TEXT NOT NULL,
            special_remarks TEXT,
            closing TEXT NOT NULL,
            sender_name TEXT,
            recipient_name TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER,
            created_by TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS letters_by_date
            ON letters (letter_date DESC, created_at DESC);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
