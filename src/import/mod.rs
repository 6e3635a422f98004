//! Bulk question import.
//!
//! An uploaded sheet is validated and stored as an [`ImportBatch`] that the
//! administrator reviews (and may correct) before committing it. Batches
//! expire after [`BATCH_TTL_MINUTES`].

use chrono::{NaiveDateTime, TimeDelta};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use uuid::Uuid;

use crate::{
    import::validate::{ValidatedRow, preview, validate_row},
    schema::import_batches,
    sheet::Row,
    util_resp::FailureResponse,
};

pub mod manage;
pub mod validate;

pub const BATCH_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    pub id: String,
    pub headers: Vec<String>,
    pub rows: Vec<ValidatedRow>,
    pub has_valid_rows: bool,
    pub expires_at: NaiveDateTime,
}

#[derive(Queryable)]
struct StoredBatch {
    id: String,
    headers: String,
    row_data: String,
    has_valid_rows: bool,
    expires_at: NaiveDateTime,
}

fn decode_error(e: serde_json::Error) -> FailureResponse {
    tracing::error!("stored import batch is corrupt: {e}");
    FailureResponse::ServerError(())
}

fn encode_error(e: serde_json::Error) -> FailureResponse {
    tracing::error!("could not encode import batch: {e}");
    FailureResponse::ServerError(())
}

impl ImportBatch {
    /// Validates `rows` and stores them for review.
    pub fn create(
        headers: Vec<String>,
        rows: Vec<Row>,
        now: NaiveDateTime,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<ImportBatch, FailureResponse> {
        Self::purge_expired(now, &mut *conn)?;

        let rows = preview(rows);
        let batch = ImportBatch {
            id: Uuid::now_v7().to_string(),
            has_valid_rows: rows.iter().any(ValidatedRow::is_valid),
            headers,
            rows,
            expires_at: now + TimeDelta::minutes(BATCH_TTL_MINUTES),
        };

        diesel::insert_into(import_batches::table)
            .values((
                import_batches::id.eq(&batch.id),
                import_batches::headers
                    .eq(serde_json::to_string(&batch.headers).map_err(encode_error)?),
                import_batches::row_data
                    .eq(serde_json::to_string(&batch.rows).map_err(encode_error)?),
                import_batches::has_valid_rows.eq(batch.has_valid_rows),
                import_batches::created_at.eq(now),
                import_batches::expires_at.eq(batch.expires_at),
            ))
            .execute(conn)?;

        Ok(batch)
    }

    /// Loads a batch that has not expired yet.
    pub fn fetch(
        id: &str,
        now: NaiveDateTime,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<ImportBatch, FailureResponse> {
        let stored = import_batches::table
            .filter(import_batches::id.eq(id))
            .filter(import_batches::expires_at.gt(now))
            .select((
                import_batches::id,
                import_batches::headers,
                import_batches::row_data,
                import_batches::has_valid_rows,
                import_batches::expires_at,
            ))
            .first::<StoredBatch>(conn)
            .optional()?
            .ok_or(FailureResponse::NotFound(()))?;

        Ok(ImportBatch {
            id: stored.id,
            headers: serde_json::from_str(&stored.headers).map_err(decode_error)?,
            rows: serde_json::from_str(&stored.row_data).map_err(decode_error)?,
            has_valid_rows: stored.has_valid_rows,
            expires_at: stored.expires_at,
        })
    }

    pub fn delete(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<usize, diesel::result::Error> {
        diesel::delete(import_batches::table.filter(import_batches::id.eq(id)))
            .execute(conn)
    }

    pub fn purge_expired(
        now: NaiveDateTime,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<usize, diesel::result::Error> {
        let purged = diesel::delete(
            import_batches::table.filter(import_batches::expires_at.le(now)),
        )
        .execute(conn)?;
        if purged > 0 {
            tracing::debug!(purged, "removed expired import batches");
        }
        Ok(purged)
    }

    /// The stored rows with the administrator's corrections applied.
    pub fn edited_rows(&self, edits: &[(String, String)]) -> Vec<Row> {
        merge_edits(
            self.rows.iter().map(|row| row.data.clone()).collect(),
            edits,
        )
    }
}

/// Applies form fields named `row-{index}-{column}` over `rows`. Fields
/// naming a row that does not exist are ignored.
pub fn merge_edits(mut rows: Vec<Row>, edits: &[(String, String)]) -> Vec<Row> {
    for (key, value) in edits {
        let Some(rest) = key.strip_prefix("row-") else {
            continue;
        };
        let Some((index, column)) = rest.split_once('-') else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        if column.is_empty() {
            continue;
        }
        if let Some(row) = rows.get_mut(index) {
            row.insert(column.to_string(), value.trim().to_string());
        }
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    pub success_count: usize,
    pub error_count: usize,
}

/// Re-validates and stores each row in its own savepoint. A row that is
/// invalid or fails to insert counts as an error and does not affect the
/// others.
pub fn commit_rows(
    rows: Vec<Row>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> CommitOutcome {
    let mut outcome = CommitOutcome::default();

    for (index, row) in rows.into_iter().enumerate() {
        let question = match validate_row(&row) {
            Ok(question) => question,
            Err(errors) => {
                tracing::warn!(row = index, ?errors, "import row still invalid");
                outcome.error_count += 1;
                continue;
            }
        };

        match conn.transaction(|conn| question.insert(conn)) {
            Ok(id) => {
                tracing::debug!(row = index, %id, "imported question");
                outcome.success_count += 1;
            }
            Err(e) => {
                tracing::error!(row = index, "could not import row: {e}");
                outcome.error_count += 1;
            }
        }
    }

    outcome
}
