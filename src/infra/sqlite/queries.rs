use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{params, OptionalExtension, Transaction};

use crate::domain::entities::batch::UploadOutcome;
use crate::infra::sqlite::schema::{init_db, open_connection};
use crate::usecase::ports::repo::{
    FailedBatchData, FailedBatchMeta, FailedBatchRecord, NewSessionMeta, TabularData,
};

fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn insert_session(db_path: &Path, meta: &NewSessionMeta) -> Result<i64> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    conn.execute(
        "INSERT INTO upload_session(profile, file_name, endpoint, payload_key, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            meta.profile,
            meta.file_name,
            meta.endpoint,
            meta.payload_key,
            now()
        ],
    )
    .context("failed to insert upload session")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_session(db_path: &Path, session_id: i64, outcome: &UploadOutcome) -> Result<()> {
    let conn = open_connection(db_path)?;
    conn.execute(
        "UPDATE upload_session
         SET finished_at = ?1, status = ?2, succeeded_rows = ?3, failed_rows = ?4, skipped_rows = ?5
         WHERE id = ?6",
        params![
            now(),
            outcome.status().label(),
            outcome.succeeded_rows as i64,
            outcome.failed_rows as i64,
            outcome.skipped_rows as i64,
            session_id
        ],
    )
    .with_context(|| format!("failed to finish upload session #{session_id}"))?;
    Ok(())
}

fn insert_header_names(tx: &Transaction<'_>, batch_id: i64, headers: &[String]) -> Result<()> {
    let mut insert_header = tx
        .prepare("INSERT INTO column_name(batch_id, col_idx, name) VALUES (?1, ?2, ?3)")
        .context("failed to prepare header insert")?;

    for (col_idx, name) in headers.iter().enumerate() {
        insert_header
            .execute(params![batch_id, col_idx as i64, name])
            .context("failed to insert header")?;
    }

    Ok(())
}

pub fn insert_failed_batch(
    db_path: &Path,
    session_id: i64,
    failure: &FailedBatchRecord,
) -> Result<i64> {
    let source_rows =
        serde_json::to_string(&failure.source_rows).context("failed to encode source rows")?;

    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start failed batch transaction")?;

    tx.execute(
        "INSERT INTO failed_batch(session_id, batch_index, range_start, range_end,
                                  source_rows, error, failed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session_id,
            failure.batch_index as i64,
            failure.range.start as i64,
            failure.range.end as i64,
            source_rows,
            failure.error,
            now()
        ],
    )
    .context("failed to insert failed batch")?;
    let batch_id = tx.last_insert_rowid();

    insert_header_names(&tx, batch_id, &failure.data.columns)?;

    let mut insert_cell = tx
        .prepare("INSERT INTO cell(batch_id, row_idx, col_idx, value) VALUES (?1, ?2, ?3, ?4)")
        .context("failed to prepare cell insert")?;
    for (row_idx, row) in failure.data.rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            insert_cell
                .execute(params![batch_id, row_idx as i64, col_idx as i64, value])
                .context("failed to insert batch cell")?;
        }
    }
    drop(insert_cell);

    tx.commit().context("failed to commit failed batch")?;
    Ok(batch_id)
}

const META_COLUMNS: &str = "b.id, b.session_id, s.profile, s.file_name, s.endpoint, s.payload_key,
     b.batch_index, b.range_start, b.range_end, b.error, b.failed_at, b.resolved_at";

fn read_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<FailedBatchMeta> {
    let range_start: i64 = row.get(7)?;
    let range_end: i64 = row.get(8)?;
    Ok(FailedBatchMeta {
        id: row.get(0)?,
        session_id: row.get::<_, i64>(1)?.into(),
        profile: row.get(2)?,
        file_name: row.get(3)?,
        endpoint: row.get(4)?,
        payload_key: row.get(5)?,
        batch_index: row.get::<_, i64>(6)? as usize,
        range: range_start as usize..range_end as usize,
        error: row.get(9)?,
        failed_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}

pub fn list_failed_batches(db_path: &Path, include_resolved: bool) -> Result<Vec<FailedBatchMeta>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let filter = if include_resolved {
        ""
    } else {
        "WHERE b.resolved_at IS NULL"
    };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {META_COLUMNS}
             FROM failed_batch b
             JOIN upload_session s ON s.id = b.session_id
             {filter}
             ORDER BY b.id DESC"
        ))
        .context("failed to prepare failed batch query")?;

    let batches = stmt
        .query_map([], read_meta)
        .context("failed to query failed batches")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect failed batches")?;

    Ok(batches)
}

pub fn load_failed_batch(db_path: &Path, batch_id: i64) -> Result<FailedBatchData> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;

    let meta = conn
        .query_row(
            &format!(
                "SELECT {META_COLUMNS}
                 FROM failed_batch b
                 JOIN upload_session s ON s.id = b.session_id
                 WHERE b.id = ?1"
            ),
            [batch_id],
            read_meta,
        )
        .optional()
        .context("failed to query failed batch")?
        .with_context(|| format!("no failed batch #{batch_id} in the journal"))?;

    let mut columns_stmt = conn
        .prepare(
            "SELECT name
             FROM column_name
             WHERE batch_id = ?1
             ORDER BY col_idx ASC",
        )
        .context("failed to prepare columns query")?;
    let columns = columns_stmt
        .query_map([batch_id], |row| row.get::<_, String>(0))
        .context("failed to query columns")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect columns")?;
    drop(columns_stmt);

    let mut cells_stmt = conn
        .prepare(
            "SELECT row_idx, col_idx, value
             FROM cell
             WHERE batch_id = ?1
             ORDER BY row_idx ASC, col_idx ASC",
        )
        .context("failed to prepare cells query")?;
    let cells = cells_stmt
        .query_map([batch_id], |row| {
            Ok((
                row.get::<_, i64>(0)? as usize,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, String>(2)?,
            ))
        })
        .context("failed to query cells")?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for cell in cells {
        let (row_idx, col_idx, value) = cell.context("failed to read cell")?;
        if rows.len() <= row_idx {
            rows.resize_with(row_idx + 1, || vec![String::new(); columns.len()]);
        }
        if let Some(slot) = rows[row_idx].get_mut(col_idx) {
            *slot = value;
        }
    }

    let source_rows = load_source_rows(&conn, batch_id)?;

    Ok(FailedBatchData {
        meta,
        source_rows,
        data: TabularData { columns, rows },
    })
}

fn load_source_rows(conn: &rusqlite::Connection, batch_id: i64) -> Result<Vec<usize>> {
    let text: String = conn
        .query_row(
            "SELECT source_rows FROM failed_batch WHERE id = ?1",
            [batch_id],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to read source rows of batch #{batch_id}"))?;
    serde_json::from_str(&text).context("failed to decode source rows")
}

pub fn mark_resolved(db_path: &Path, batch_id: i64) -> Result<()> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let updated = conn
        .execute(
            "UPDATE failed_batch SET resolved_at = ?1 WHERE id = ?2 AND resolved_at IS NULL",
            params![now(), batch_id],
        )
        .with_context(|| format!("failed to resolve batch #{batch_id}"))?;
    if updated == 0 {
        anyhow::bail!("no open failed batch #{batch_id} in the journal");
    }
    Ok(())
}
