//! The landing pages for employees and administrators.

use std::collections::HashMap;

use axum::extract::Query;
use chrono::{Months, NaiveDate};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use itertools::Itertools;
use serde::Deserialize;

use crate::{
    answers::CorrectionStatus,
    auth::admin::{Admin, AdminLoginForm},
    departments::Department,
    questions::{
        Question, QuestionKind,
        eligibility::{PendingKind, count_pending, today},
        manage::QuestionFields,
    },
    schema::{answers, departments, question_departments, questions, users},
    state::Conn,
    template::Page,
    users::{User, manage::UserFields},
    util_resp::{StandardResponse, success},
    widgets::{
        actions::Actions,
        filters::{Select, options},
    },
};

/// Graded free-text answers whose feedback the user has not opened yet.
pub fn unseen_feedback(
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<i64, diesel::result::Error> {
    answers::table
        .inner_join(questions::table)
        .filter(answers::user_id.eq(user_id))
        .filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        .filter(answers::feedback_seen.eq(false))
        .filter(answers::status.eq_any([
            CorrectionStatus::Correct.as_str(),
            CorrectionStatus::Incorrect.as_str(),
        ]))
        .count()
        .get_result(conn)
}

pub async fn employee_dashboard(
    user: User,
    mut conn: Conn<true>,
) -> StandardResponse {
    let today = today();
    let quizzes = count_pending(&user, today, PendingKind::Objective, &mut *conn)?;
    let activities =
        count_pending(&user, today, PendingKind::FreeText, &mut *conn)?;
    let feedback = unseen_feedback(&user.id, &mut *conn)?;

    success(
        Page::new()
            .user(user.clone())
            .title("Dashboard")
            .body(maud! {
                h1 class="h3" { "Hello, " (user.name) }
                p class="text-muted" {
                    @if quizzes + activities == 0 {
                        "You are all caught up."
                    } @else {
                        "You have " (quizzes + activities) " question(s) waiting."
                    }
                }
                Actions options=(&[
                    ("/quiz", "Quiz", Some(quizzes)),
                    ("/activities", "Activities", Some(activities)),
                    ("/answers", "My answers", Some(feedback)),
                    ("/ranking", "Ranking", None),
                ]);
            })
            .render(),
    )
}

#[derive(Deserialize, Default, Debug)]
pub struct QuestionFilter {
    /// `YYYY-MM`; anything else is ignored.
    #[serde(default)]
    month: String,
    #[serde(default)]
    department_id: String,
    #[serde(default)]
    kind: String,
}

/// The first day of `YYYY-MM` and the first day of the following month.
fn month_bounds(month: &str) -> Option<(NaiveDate, NaiveDate)> {
    if month.len() != 7 {
        return None;
    }
    let start = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()?;
    let end = start.checked_add_months(Months::new(1))?;
    Some((start, end))
}

/// Questions for the administrator list, newest release first.
pub fn filtered_questions(
    filter: &QuestionFilter,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<Question>, diesel::result::Error> {
    let mut query = questions::table.into_boxed();

    if let Some((start, end)) = month_bounds(filter.month.trim()) {
        query = query
            .filter(questions::release_date.ge(start))
            .filter(questions::release_date.lt(end));
    }

    if !filter.department_id.is_empty() {
        let linked = question_departments::table
            .filter(question_departments::department_id.eq(&filter.department_id))
            .select(question_departments::question_id)
            .load::<String>(&mut *conn)?;
        query = query.filter(
            questions::visible_to_all
                .eq(true)
                .or(questions::id.eq_any(linked)),
        );
    }

    if let Ok(kind) = filter.kind.parse::<QuestionKind>() {
        query = query.filter(questions::kind.eq(kind.as_str()));
    }

    query
        .order_by((questions::release_date.desc(), questions::id.desc()))
        .load::<Question>(conn)
}

/// Users with their department name, by department then name.
fn users_by_department(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<(User, String)>, diesel::result::Error> {
    users::table
        .inner_join(departments::table)
        .order_by((departments::name.asc(), users::name.asc()))
        .select((users::all_columns, departments::name))
        .load::<(User, String)>(conn)
}

fn pending_corrections(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<i64, diesel::result::Error> {
    answers::table
        .inner_join(questions::table)
        .filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        .filter(answers::status.eq(CorrectionStatus::Pending.as_str()))
        .count()
        .get_result(conn)
}

/// "Everyone", or the names of the departments each question is
/// restricted to, keyed by question id.
fn audiences(
    listed: &[Question],
    departments: &[Department],
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<HashMap<String, String>, diesel::result::Error> {
    let restricted: Vec<&str> = listed
        .iter()
        .filter(|q| !q.visible_to_all)
        .map(|q| q.id.as_str())
        .collect();
    let links = question_departments::table
        .filter(question_departments::question_id.eq_any(restricted))
        .select((
            question_departments::question_id,
            question_departments::department_id,
        ))
        .load::<(String, String)>(conn)?;
    let names: HashMap<&str, &str> = departments
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str()))
        .collect();

    Ok(listed
        .iter()
        .map(|q| {
            let audience = if q.visible_to_all {
                "Everyone".to_string()
            } else {
                links
                    .iter()
                    .filter(|(question, _)| *question == q.id)
                    .filter_map(|(_, department)| names.get(department.as_str()))
                    .sorted()
                    .join(", ")
            };
            (q.id.clone(), audience)
        })
        .collect())
}

#[tracing::instrument(skip(admin, conn))]
pub async fn admin_dashboard(
    admin: Option<Admin>,
    Query(filter): Query<QuestionFilter>,
    mut conn: Conn<true>,
) -> StandardResponse {
    if admin.is_none() {
        return success(
            Page::new()
                .title("Administration")
                .body(AdminLoginForm { error: None })
                .render(),
        );
    }

    let departments = Department::all(&mut *conn)?;
    let members = users_by_department(&mut *conn)?;
    let listed = filtered_questions(&filter, &mut *conn)?;
    let audience = audiences(&listed, &departments, &mut *conn)?;
    let pending = pending_corrections(&mut *conn)?;

    let mut department_options = options([("", "All departments")]);
    department_options
        .extend(departments.iter().map(|d| (d.id.clone(), d.name.clone())));
    let mut kind_options = options([("", "All kinds")]);
    kind_options.extend(
        QuestionKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), k.label().to_string())),
    );

    success(
        Page::new()
            .admin()
            .title("Administration")
            .body(maud! {
                h1 class="h3" { "Administration" }
                Actions options=(&[
                    ("/admin/corrections", "Corrections", Some(pending)),
                    ("/admin/reports", "Reports", None),
                    ("/admin/analytics", "Analytics", None),
                ]);

                h2 class="h4 mt-4" { "Departments" }
                form method="post" action="/admin/departments" class="row g-2 mb-3" {
                    div class="col-md-4" {
                        input class="form-control" name="name" placeholder="New department" required;
                    }
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-primary" { "Add" }
                    }
                }
                ul class="list-group mb-4" {
                    @for d in &departments {
                        li class="list-group-item d-flex justify-content-between align-items-center" {
                            a href=(format!("/ranking/{}", d.id)) { (d.name) }
                            form method="post" action=(format!("/admin/departments/{}/delete", d.id)) {
                                button type="submit" class="btn btn-sm btn-outline-danger" { "Delete" }
                            }
                        }
                    }
                }

                h2 class="h4 mt-4" { "Users" }
                UserFields action=("/admin/users") user=(None) departments=(&departments) submit=("Add");
                table class="table table-sm mt-3" {
                    thead { tr { th { "Name" } th { "Email" } th { "Department" } th {} } }
                    tbody {
                        @for (user, department) in &members {
                            tr {
                                td { (user.name) }
                                td { (user.email.as_deref().unwrap_or("-")) }
                                td { (department) }
                                td class="text-end" {
                                    a class="btn btn-sm btn-outline-secondary me-2" href=(format!("/admin/users/{}/edit", user.id)) { "Edit" }
                                    form class="d-inline" method="post" action=(format!("/admin/users/{}/delete", user.id)) {
                                        button type="submit" class="btn btn-sm btn-outline-danger" { "Delete" }
                                    }
                                }
                            }
                        }
                    }
                }

                h2 class="h4 mt-4" { "Import questions" }
                form method="post" action="/admin/import" enctype="multipart/form-data" class="row g-2 mb-4" {
                    div class="col-md-6" {
                        input class="form-control" type="file" name="sheet" accept=".csv" required;
                        div class="form-text" {
                            "Columns: texto, tipo, opcao_a, opcao_b, opcao_c, opcao_d, resposta_correta, data_liberacao, tempo_limite."
                        }
                    }
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-primary" { "Preview" }
                    }
                }

                h2 class="h4 mt-4" { "Questions" }
                QuestionFields
                    action=("/admin/questions")
                    question=(None)
                    visibility=(None)
                    departments=(&departments)
                    submit=("Create question");
                form method="get" action="/admin" class="row g-2 align-items-end mt-4 mb-3" {
                    div class="col-md-auto" {
                        label class="form-label" for="month" { "Release month" }
                        input class="form-control" type="month" id="month" name="month" value=(filter.month);
                    }
                    Select name=("department_id") label=("Department") options=(&department_options) selected=(&filter.department_id);
                    Select name=("kind") label=("Kind") options=(&kind_options) selected=(&filter.kind);
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-secondary" { "Filter" }
                    }
                }
                table class="table table-sm" {
                    thead { tr { th { "Release" } th { "Kind" } th { "Question" } th { "Audience" } th {} } }
                    tbody {
                        @for q in &listed {
                            tr {
                                td { (q.release_date.format("%d/%m/%Y").to_string()) }
                                td { (q.kind.label()) }
                                td { (q.prompt) }
                                td { (audience.get(&q.id).map(String::as_str).unwrap_or_default()) }
                                td class="text-end" {
                                    a class="btn btn-sm btn-outline-secondary me-2" href=(format!("/admin/questions/{}/edit", q.id)) { "Edit" }
                                    form class="d-inline" method="post" action=(format!("/admin/questions/{}/delete", q.id)) {
                                        button type="submit" class="btn btn-sm btn-outline-danger" { "Delete" }
                                    }
                                }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_filter_parsing() {
        let (start, end) = month_bounds("2025-12").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());

        assert!(month_bounds("2025-13").is_none());
        assert!(month_bounds("december").is_none());
        assert!(month_bounds("").is_none());
    }
}
