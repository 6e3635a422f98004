use axum::{Form, extract::Path, response::Redirect};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::admin::Admin,
    departments::{CreateDepartmentError, DeleteOutcome, Department},
    state::Conn,
    template::Page,
    util_resp::{StandardResponse, bad_request, see_other_ok},
    widgets::alert::ErrorAlert,
};

#[derive(Deserialize)]
pub struct CreateDepartmentForm {
    name: String,
}

/// An error page for administrator forms, with a way back to the dashboard.
pub fn admin_error(msg: impl ToString) -> StandardResponse {
    let msg = msg.to_string();
    bad_request(
        Page::new()
            .admin()
            .body(maud! {
                ErrorAlert msg=(&msg);
                a class="btn btn-secondary" href="/admin" { "Back to the dashboard" }
            })
            .render(),
    )
}

#[tracing::instrument(skip(_admin, conn, form))]
pub async fn do_create_department(
    _admin: Admin,
    mut conn: Conn<true>,
    Form(form): Form<CreateDepartmentForm>,
) -> StandardResponse {
    match Department::create(&form.name, &mut *conn)? {
        Ok(department) => {
            tracing::info!(id = %department.id, "department created");
            see_other_ok(Redirect::to("/admin"))
        }
        Err(CreateDepartmentError::EmptyName) => {
            admin_error("The department name cannot be empty.")
        }
        Err(CreateDepartmentError::Duplicate) => {
            admin_error("A department with this name already exists.")
        }
    }
}

#[tracing::instrument(skip(_admin, conn))]
pub async fn do_delete_department(
    _admin: Admin,
    Path(id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    match Department::delete(&id, &mut *conn)? {
        DeleteOutcome::Deleted(_) => see_other_ok(Redirect::to("/admin")),
        DeleteOutcome::HasMembers {
            department,
            members,
        } => admin_error(format!(
            "The department \"{}\" still has {members} member(s) and cannot be deleted.",
            department.name
        )),
    }
}
