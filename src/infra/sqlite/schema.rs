use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open journal: {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign key enforcement")?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = open_connection(db_path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS upload_session (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            profile         TEXT NOT NULL,
            file_name       TEXT NOT NULL,
            endpoint        TEXT NOT NULL,
            payload_key     TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            finished_at     TEXT,
            status          TEXT,
            succeeded_rows  INTEGER NOT NULL DEFAULT 0,
            failed_rows     INTEGER NOT NULL DEFAULT 0,
            skipped_rows    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS failed_batch (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id   INTEGER NOT NULL,
            batch_index  INTEGER NOT NULL,
            range_start  INTEGER NOT NULL,
            range_end    INTEGER NOT NULL,
            source_rows  TEXT NOT NULL,
            error        TEXT NOT NULL,
            failed_at    TEXT NOT NULL,
            resolved_at  TEXT,
            FOREIGN KEY (session_id) REFERENCES upload_session(id)
        );

        CREATE TABLE IF NOT EXISTS column_name (
            batch_id    INTEGER NOT NULL,
            col_idx     INTEGER NOT NULL,
            name        TEXT NOT NULL,
            PRIMARY KEY (batch_id, col_idx),
            FOREIGN KEY (batch_id) REFERENCES failed_batch(id)
        );

        CREATE TABLE IF NOT EXISTS cell (
            batch_id    INTEGER NOT NULL,
            row_idx     INTEGER NOT NULL,
            col_idx     INTEGER NOT NULL,
            value       TEXT NOT NULL,
            PRIMARY KEY (batch_id, row_idx, col_idx),
            FOREIGN KEY (batch_id) REFERENCES failed_batch(id)
        );

        CREATE INDEX IF NOT EXISTS idx_failed_batch_session
            ON failed_batch(session_id);

        CREATE INDEX IF NOT EXISTS idx_cell_batch_row
            ON cell(batch_id, row_idx);
        ",
    )
    .context("failed to initialize journal schema")?;

    Ok(())
}
