use axum::{
    Form,
    extract::{Path, Query},
    response::Redirect,
};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    answers::{Answer, CorrectionStatus, display_time, scoring::Grade},
    auth::admin::Admin,
    departments::manage::admin_error,
    questions::{Question, QuestionKind},
    schema::{answers, questions, users},
    state::Conn,
    template::Page,
    users::User,
    util_resp::{FailureResponse, StandardResponse, see_other_ok, success},
    widgets::filters::{Select, options},
};

/// Records an administrator's verdict on a free-text answer. Grading again
/// overwrites the previous verdict; whether the user has seen the feedback
/// is left alone.
///
/// Returns `None` when the answer belongs to an objective question, which
/// is scored on submission and cannot be graded by hand.
pub fn apply_grade(
    answer_id: &str,
    grade: Grade,
    feedback: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Option<Answer>, FailureResponse> {
    let answer = Answer::fetch(answer_id, &mut *conn)?;
    let question = Question::fetch(&answer.question_id, &mut *conn)?;
    if question.kind != QuestionKind::FreeText {
        return Ok(None);
    }

    diesel::update(answers::table.filter(answers::id.eq(&answer.id)))
        .set((
            answers::status.eq(grade.status().as_str()),
            answers::points.eq(Some(grade.points())),
            answers::feedback.eq(feedback),
        ))
        .execute(&mut *conn)?;

    Answer::fetch(answer_id, conn).map(Some)
}

#[derive(Deserialize, Default)]
pub struct CorrectionsQuery {
    /// `pending` when absent; `all` shows every status.
    status: Option<String>,
    #[serde(default)]
    user_id: String,
}

pub fn free_text_answers(
    status: Option<CorrectionStatus>,
    user_id: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<(Answer, Question, User)>, diesel::result::Error> {
    let mut query = answers::table
        .inner_join(questions::table)
        .inner_join(users::table)
        .filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        .select((
            answers::all_columns,
            questions::all_columns,
            users::all_columns,
        ))
        .into_boxed();

    if let Some(status) = status {
        query = query.filter(answers::status.eq(status.as_str()));
    }
    if let Some(user_id) = user_id {
        query = query.filter(answers::user_id.eq(user_id.to_string()));
    }

    query
        .order_by((answers::submitted_at.desc(), answers::id.desc()))
        .load::<(Answer, Question, User)>(conn)
}

pub async fn corrections_page(
    _admin: Admin,
    mut conn: Conn<true>,
    Query(query): Query<CorrectionsQuery>,
) -> StandardResponse {
    let status_value = query.status.unwrap_or_else(|| "pending".to_string());
    let status = match status_value.as_str() {
        "all" | "todos" => None,
        other => match other.parse::<CorrectionStatus>() {
            Ok(status) => Some(status),
            Err(_) => return admin_error(format!("Unknown status filter `{other}`.")),
        },
    };
    let user_filter = (!query.user_id.is_empty()).then_some(query.user_id.as_str());

    let rows = free_text_answers(status, user_filter, &mut *conn)?;
    let users = users::table
        .order_by(users::name.asc())
        .load::<User>(&mut *conn)?;

    let status_options = options([
        ("pending", "Awaiting correction"),
        ("correct", "Correct"),
        ("partially_correct", "Partially correct"),
        ("incorrect", "Incorrect"),
        ("all", "All"),
    ]);
    let mut user_options = options([("", "All employees")]);
    user_options.extend(users.iter().map(|u| (u.id.clone(), u.name.clone())));

    success(
        Page::new()
            .admin()
            .title("Corrections")
            .body(maud! {
                h1 class="h3 mb-3" { "Corrections" }
                form method="get" class="row g-2 align-items-end mb-4" {
                    Select name=("status") label=("Status") options=(&status_options) selected=(&status_value);
                    Select name=("user_id") label=("Employee") options=(&user_options) selected=(&query.user_id);
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-secondary" { "Filter" }
                    }
                }
                @if rows.is_empty() {
                    p class="text-muted" { "Nothing to show." }
                }
                @for (answer, question, user) in &rows {
                    div class="card mb-3" {
                        div class="card-header d-flex justify-content-between" {
                            span { strong { (user.name) } " on " (display_time(answer.submitted_at)) }
                            span class=(answer.status.badge_class()) { (answer.status.label()) }
                        }
                        div class="card-body" {
                            p class="fw-semibold" { (question.prompt) }
                            p style="white-space: pre-wrap;" { (answer.body.as_deref().unwrap_or("(no text)")) }
                            @if let Some(url) = &answer.attachment_url {
                                p { a href=(url) target="_blank" { "Attachment" } }
                            }
                            form method="post" action=(format!("/admin/corrections/{}", answer.id)) class="row g-2 align-items-end" {
                                div class="col-md-3" {
                                    select class="form-select" name="status" {
                                        option value="correct" selected[answer.status == CorrectionStatus::Correct] { "Correct" }
                                        option value="partially_correct" selected[answer.status == CorrectionStatus::PartiallyCorrect] { "Partially correct" }
                                        option value="incorrect" selected[answer.status == CorrectionStatus::Incorrect] { "Incorrect" }
                                    }
                                }
                                div class="col-md-7" {
                                    input class="form-control" name="feedback" placeholder="Feedback"
                                        value=(answer.feedback.as_deref().unwrap_or_default());
                                }
                                div class="col-md-2" {
                                    button type="submit" class="btn btn-primary w-100" { "Save" }
                                }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct GradeForm {
    status: String,
    #[serde(default)]
    feedback: String,
}

#[tracing::instrument(skip(_admin, conn, form))]
pub async fn do_grade(
    _admin: Admin,
    Path(answer_id): Path<String>,
    mut conn: Conn<true>,
    Form(form): Form<GradeForm>,
) -> StandardResponse {
    let grade = match form.status.parse::<Grade>() {
        Ok(grade) => grade,
        Err(e) => return admin_error(format!("Invalid correction action: {e}.")),
    };

    let feedback = crate::validation::non_empty(&form.feedback);
    let Some(answer) =
        apply_grade(&answer_id, grade, feedback.as_deref(), &mut *conn)?
    else {
        return admin_error("Only free-text answers can be corrected.");
    };
    tracing::info!(answer = %answer.id, status = %answer.status, "answer graded");

    see_other_ok(Redirect::to("/admin/corrections"))
}
