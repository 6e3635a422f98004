use axum::{
    Form,
    extract::{Multipart, Path},
    response::Redirect,
};
use chrono::Utc;
use hypertext::prelude::*;

use crate::{
    auth::admin::Admin,
    departments::manage::admin_error,
    import::{
        ImportBatch, commit_rows,
        validate::{COLUMNS, RELEASE},
    },
    sheet::read_sheet,
    state::Conn,
    storage::{extension, upload::MultipartForm},
    template::Page,
    util_resp::{StandardResponse, see_other_ok, success},
    widgets::alert::{ErrorAlert, SuccessAlert},
};

#[tracing::instrument(skip_all)]
pub async fn do_upload_sheet(
    _admin: Admin,
    mut conn: Conn<true>,
    multipart: Multipart,
) -> StandardResponse {
    let form = MultipartForm::read(multipart).await?;

    let Some(file) = form.file("sheet") else {
        return admin_error("Please choose a spreadsheet to upload.");
    };
    if extension(&file.filename).as_deref() != Some("csv") {
        return admin_error("Invalid file. Please upload a .csv spreadsheet.");
    }

    let sheet = match read_sheet(&file.bytes, &[RELEASE]) {
        Ok(sheet) => sheet,
        Err(e) => {
            tracing::warn!(filename = %file.filename, "unreadable spreadsheet: {e}");
            return admin_error(format!("Could not read the spreadsheet: {e}."));
        }
    };

    let batch = ImportBatch::create(
        sheet.headers,
        sheet.rows,
        Utc::now().naive_utc(),
        &mut *conn,
    )?;
    tracing::info!(
        batch = %batch.id,
        rows = batch.rows.len(),
        valid = batch.has_valid_rows,
        "spreadsheet staged for import"
    );

    see_other_ok(Redirect::to(&format!("/admin/import/{}", batch.id)))
}

/// The uploaded columns, followed by any known column the sheet lacked so
/// that it can still be filled in.
fn preview_columns(headers: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = headers
        .iter()
        .filter(|h| !h.is_empty())
        .cloned()
        .collect();
    for known in COLUMNS {
        if !columns.iter().any(|c| c == known) {
            columns.push(known.to_string());
        }
    }
    columns
}

pub async fn import_preview_page(
    _admin: Admin,
    Path(batch_id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let batch = ImportBatch::fetch(&batch_id, Utc::now().naive_utc(), &mut *conn)?;
    let columns = preview_columns(&batch.headers);
    let invalid = batch.rows.iter().filter(|r| !r.is_valid()).count();

    success(
        Page::new()
            .admin()
            .title("Import preview")
            .body(maud! {
                h1 class="h3 mb-3" { "Import preview" }
                p class="text-muted" {
                    (batch.rows.len()) " row(s), " (invalid) " with errors. "
                    "Correct the highlighted cells before importing; rows that are still invalid will be skipped."
                }
                @if !batch.has_valid_rows {
                    ErrorAlert msg=("No row is valid yet.");
                }
                form method="post" action=(format!("/admin/import/{}", batch.id)) {
                    div class="table-responsive" {
                        table class="table table-sm align-top" {
                            thead {
                                tr {
                                    th { "#" }
                                    @for column in &columns {
                                        th { (column) }
                                    }
                                }
                            }
                            tbody {
                                @for (i, row) in batch.rows.iter().enumerate() {
                                    tr class=(if row.is_valid() { "" } else { "table-warning" }) {
                                        td { (i + 1) }
                                        @for column in &columns {
                                            td {
                                                input
                                                    class=(if row.errors.contains_key(column) { "form-control form-control-sm is-invalid" } else { "form-control form-control-sm" })
                                                    name=(format!("row-{i}-{column}"))
                                                    value=(row.data.get(column).map(String::as_str).unwrap_or_default());
                                                @if let Some(error) = row.errors.get(column) {
                                                    div class="invalid-feedback" { (error) }
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                    button type="submit" class="btn btn-primary" { "Import" }
                    a class="btn btn-link" href="/admin" { "Cancel" }
                }
            })
            .render(),
    )
}

#[tracing::instrument(skip(_admin, conn, edits))]
pub async fn do_commit_import(
    _admin: Admin,
    Path(batch_id): Path<String>,
    mut conn: Conn<true>,
    Form(edits): Form<Vec<(String, String)>>,
) -> StandardResponse {
    let batch = ImportBatch::fetch(&batch_id, Utc::now().naive_utc(), &mut *conn)?;
    let rows = batch.edited_rows(&edits);

    let outcome = commit_rows(rows, &mut *conn);
    ImportBatch::delete(&batch.id, &mut *conn)?;
    tracing::info!(
        batch = %batch.id,
        success_count = outcome.success_count,
        error_count = outcome.error_count,
        "import committed"
    );

    let message = if outcome.error_count > 0 {
        format!(
            "Partial import: {} question(s) saved, {} row(s) had errors and were skipped.",
            outcome.success_count, outcome.error_count
        )
    } else {
        format!(
            "Import complete: {} question(s) imported.",
            outcome.success_count
        )
    };

    success(
        Page::new()
            .admin()
            .title("Import")
            .body(maud! {
                @if outcome.error_count > 0 {
                    ErrorAlert msg=(&message);
                } @else {
                    SuccessAlert msg=(&message);
                }
                a class="btn btn-secondary" href="/admin" { "Back to the dashboard" }
            })
            .render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_known_columns_are_appended() {
        let columns = preview_columns(&["tipo".to_string(), "extra".to_string()]);
        assert_eq!(columns[0], "tipo");
        assert_eq!(columns[1], "extra");
        assert_eq!(columns.len(), 2 + COLUMNS.len() - 1);
        assert!(columns.iter().any(|c| c == "texto"));
    }
}
