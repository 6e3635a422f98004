use axum::{Form, extract::Path, response::Redirect};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::admin::Admin,
    departments::{Department, manage::admin_error},
    schema::{answers, departments, users},
    state::Conn,
    template::Page,
    users::User,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    validation::{is_valid_access_code, is_valid_email, non_empty},
    widgets::alert::ErrorList,
};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserForm {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub access_code: String,
    pub department_id: String,
}

/// A [`UserForm`] that passed validation.
#[derive(Debug)]
pub struct ValidUser {
    pub name: String,
    pub email: Option<String>,
    pub access_code: String,
    pub department_id: String,
}

impl UserForm {
    /// Checks the form. `existing_id` is the user being edited, who is
    /// allowed to keep their own access code and email.
    pub fn validate(
        &self,
        existing_id: Option<&str>,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Result<ValidUser, Vec<String>>, diesel::result::Error> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push("The name cannot be empty.".to_string());
        }

        let access_code = self.access_code.trim().to_string();
        if let Err(e) = is_valid_access_code(&access_code) {
            errors.push(format!("Invalid access code: {e}."));
        }

        let email = non_empty(&self.email);
        if let Some(email) = &email {
            if let Err(e) = is_valid_email(email) {
                errors.push(format!("Invalid email address: {e}."));
            }
        }

        let department_exists = diesel::select(diesel::dsl::exists(
            departments::table.filter(departments::id.eq(&self.department_id)),
        ))
        .get_result::<bool>(&mut *conn)?;
        if !department_exists {
            errors.push("Please pick an existing department.".to_string());
        }

        let other = existing_id.unwrap_or_default();

        let code_taken = diesel::select(diesel::dsl::exists(
            users::table
                .filter(users::access_code.eq(&access_code))
                .filter(users::id.ne(other)),
        ))
        .get_result::<bool>(&mut *conn)?;
        if code_taken {
            errors.push("This access code is already in use.".to_string());
        }

        if let Some(email) = &email {
            let email_taken = diesel::select(diesel::dsl::exists(
                users::table
                    .filter(users::email.eq(email))
                    .filter(users::id.ne(other)),
            ))
            .get_result::<bool>(&mut *conn)?;
            if email_taken {
                errors.push("This email address is already in use.".to_string());
            }
        }

        if !errors.is_empty() {
            return Ok(Err(errors));
        }

        Ok(Ok(ValidUser {
            name,
            email,
            access_code,
            department_id: self.department_id.clone(),
        }))
    }
}

pub fn create_user(
    user: &ValidUser,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<String, diesel::result::Error> {
    let id = Uuid::now_v7().to_string();
    diesel::insert_into(users::table)
        .values((
            users::id.eq(&id),
            users::name.eq(&user.name),
            users::email.eq(&user.email),
            users::access_code.eq(&user.access_code),
            users::department_id.eq(&user.department_id),
        ))
        .execute(conn)?;
    Ok(id)
}

/// Deletes the user along with every answer they submitted.
pub fn delete_user(
    id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<usize, diesel::result::Error> {
    let removed_answers =
        diesel::delete(answers::table.filter(answers::user_id.eq(id)))
            .execute(&mut *conn)?;
    diesel::delete(users::table.filter(users::id.eq(id))).execute(conn)?;
    Ok(removed_answers)
}

/// The create/edit form used on the dashboard and the edit page.
pub struct UserFields<'r> {
    pub action: &'r str,
    pub user: Option<&'r User>,
    pub departments: &'r [Department],
    pub submit: &'r str,
}

impl<'r> Renderable for UserFields<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let name = self.user.map(|u| u.name.as_str()).unwrap_or_default();
        let email = self
            .user
            .and_then(|u| u.email.as_deref())
            .unwrap_or_default();
        let code = self.user.map(|u| u.access_code.as_str()).unwrap_or_default();
        let department =
            self.user.map(|u| u.department_id.as_str()).unwrap_or_default();

        maud! {
            form method="post" action=(self.action) class="row g-3 align-items-end" {
                div class="col-md-3" {
                    label class="form-label" for="name" { "Name" }
                    input class="form-control" id="name" name="name" value=(name) required;
                }
                div class="col-md-3" {
                    label class="form-label" for="email" { "Email (optional)" }
                    input class="form-control" type="email" id="email" name="email" value=(email);
                }
                div class="col-md-2" {
                    label class="form-label" for="access_code" { "Access code" }
                    input class="form-control" id="access_code" name="access_code" value=(code) maxlength="4" required;
                }
                div class="col-md-2" {
                    label class="form-label" for="department_id" { "Department" }
                    select class="form-select" id="department_id" name="department_id" required {
                        @for d in self.departments {
                            option value=(d.id) selected[d.id == department] { (d.name) }
                        }
                    }
                }
                div class="col-md-2" {
                    button type="submit" class="btn btn-primary w-100" { (self.submit) }
                }
            }
        }
        .render_to(buffer);
    }
}

#[tracing::instrument(skip(_admin, conn, form))]
pub async fn do_create_user(
    _admin: Admin,
    mut conn: Conn<true>,
    Form(form): Form<UserForm>,
) -> StandardResponse {
    match form.validate(None, &mut *conn)? {
        Ok(user) => {
            let id = create_user(&user, &mut *conn)?;
            tracing::info!(%id, "user created");
            see_other_ok(Redirect::to("/admin"))
        }
        Err(errors) => admin_error(errors.join(" ")),
    }
}

fn edit_page(
    user: &User,
    departments: &[Department],
    errors: &[String],
) -> hypertext::Rendered<String> {
    let action = format!("/admin/users/{}/edit", user.id);
    Page::new()
        .admin()
        .title("Edit user")
        .body(maud! {
            h1 class="h3 mb-3" { "Edit " (user.name) }
            ErrorList errors=(errors);
            UserFields action=(&action) user=(Some(user)) departments=(departments) submit=("Save");
            a class="btn btn-link mt-3" href="/admin" { "Back" }
        })
        .render()
}

pub async fn edit_user_page(
    _admin: Admin,
    Path(id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let user = User::fetch(&id, &mut *conn)?;
    let departments = Department::all(&mut *conn)?;
    success(edit_page(&user, &departments, &[]))
}

#[tracing::instrument(skip(_admin, conn, form))]
pub async fn do_edit_user(
    _admin: Admin,
    Path(id): Path<String>,
    mut conn: Conn<true>,
    Form(form): Form<UserForm>,
) -> StandardResponse {
    let existing = User::fetch(&id, &mut *conn)?;

    match form.validate(Some(&existing.id), &mut *conn)? {
        Ok(valid) => {
            diesel::update(users::table.filter(users::id.eq(&existing.id)))
                .set((
                    users::name.eq(&valid.name),
                    users::email.eq(&valid.email),
                    users::access_code.eq(&valid.access_code),
                    users::department_id.eq(&valid.department_id),
                ))
                .execute(&mut *conn)?;
            see_other_ok(Redirect::to("/admin"))
        }
        Err(errors) => {
            let departments = Department::all(&mut *conn)?;
            let attempted = User {
                id: existing.id,
                name: form.name,
                email: non_empty(&form.email),
                access_code: form.access_code,
                department_id: form.department_id,
            };
            bad_request(edit_page(&attempted, &departments, &errors))
        }
    }
}

#[tracing::instrument(skip(_admin, conn))]
pub async fn do_delete_user(
    _admin: Admin,
    Path(id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let user = User::fetch(&id, &mut *conn)?;
    let removed = delete_user(&user.id, &mut *conn)?;
    tracing::info!(%id, removed, "user deleted");
    see_other_ok(Redirect::to("/admin"))
}
