use axum::extract::Query;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    answers::{Answer, CorrectionStatus, display_time},
    questions::{Question, QuestionKind},
    schema::{answers, questions},
    state::Conn,
    template::Page,
    users::User,
    util_resp::{StandardResponse, success},
    widgets::filters::{Select, options},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFilter {
    Correct,
    Incorrect,
    Pending,
}

impl ResultFilter {
    pub fn parse(value: &str) -> Option<ResultFilter> {
        match value {
            "correct" => Some(ResultFilter::Correct),
            "incorrect" => Some(ResultFilter::Incorrect),
            "pending" => Some(ResultFilter::Pending),
            _ => None,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct HistoryQuery {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    result: String,
}

/// Marks feedback on graded free-text answers as seen. Returns how many
/// answers changed.
pub fn mark_feedback_seen(
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<usize, diesel::result::Error> {
    let free_text = questions::table
        .filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        .select(questions::id);

    diesel::update(
        answers::table
            .filter(answers::user_id.eq(user_id))
            .filter(answers::feedback_seen.eq(false))
            .filter(answers::status.eq_any([
                CorrectionStatus::Correct.as_str(),
                CorrectionStatus::Incorrect.as_str(),
            ]))
            .filter(answers::question_id.eq_any(free_text)),
    )
    .set(answers::feedback_seen.eq(true))
    .execute(conn)
}

/// The user's answers, newest first.
pub fn answer_history(
    user_id: &str,
    kind: Option<QuestionKind>,
    result: Option<ResultFilter>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<(Answer, Question)>, diesel::result::Error> {
    let mut query = answers::table
        .inner_join(questions::table)
        .filter(answers::user_id.eq(user_id))
        .select((answers::all_columns, questions::all_columns))
        .into_boxed();

    if let Some(kind) = kind {
        query = query.filter(questions::kind.eq(kind.as_str()));
    }

    query = match result {
        Some(ResultFilter::Correct) => query.filter(
            answers::points
                .gt(0_i64)
                .or(answers::status.eq(CorrectionStatus::Correct.as_str())),
        ),
        Some(ResultFilter::Incorrect) => query.filter(
            answers::points
                .eq(0_i64)
                .or(answers::status.eq(CorrectionStatus::Incorrect.as_str())),
        ),
        Some(ResultFilter::Pending) => {
            query.filter(answers::status.eq(CorrectionStatus::Pending.as_str()))
        }
        None => query,
    };

    query
        .order_by((answers::submitted_at.desc(), answers::id.desc()))
        .load::<(Answer, Question)>(conn)
}

pub async fn my_answers_page(
    user: User,
    mut conn: Conn<true>,
    Query(query): Query<HistoryQuery>,
) -> StandardResponse {
    let seen = mark_feedback_seen(&user.id, &mut *conn)?;
    if seen > 0 {
        tracing::debug!(user = %user.id, seen, "feedback marked as seen");
    }

    let kind = query.kind.parse::<QuestionKind>().ok();
    let result = ResultFilter::parse(&query.result);
    let history = answer_history(&user.id, kind, result, &mut *conn)?;

    let kind_options = options([
        ("", "All kinds"),
        ("multiple_choice", "Multiple choice"),
        ("true_false", "True/false"),
        ("free_text", "Free text"),
    ]);
    let result_options = options([
        ("", "All results"),
        ("correct", "Correct"),
        ("incorrect", "Incorrect"),
        ("pending", "Awaiting correction"),
    ]);

    success(
        Page::new()
            .title("My answers")
            .user(user)
            .body(maud! {
                h1 class="h3 mb-3" { "My answers" }
                form method="get" class="row g-2 align-items-end mb-3" {
                    Select name=("kind") label=("Kind") options=(&kind_options) selected=(&query.kind);
                    Select name=("result") label=("Result") options=(&result_options) selected=(&query.result);
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-secondary" { "Filter" }
                    }
                }
                table class="table" {
                    thead {
                        tr {
                            th { "Answered" }
                            th { "Question" }
                            th { "Your answer" }
                            th { "Result" }
                            th { "Points" }
                            th { "Feedback" }
                        }
                    }
                    tbody {
                        @for (answer, question) in &history {
                            tr {
                                td class="text-nowrap" { (display_time(answer.submitted_at)) }
                                td { (question.prompt) }
                                td {
                                    @if let Some(letter) = &answer.chosen_option {
                                        (question.option_text(letter).unwrap_or_else(|| letter.clone()))
                                    } @else if let Some(body) = &answer.body {
                                        (body)
                                    }
                                    @if let Some(url) = &answer.attachment_url {
                                        " " a href=(url) { "(attachment)" }
                                    }
                                }
                                td { span class=(answer.status.badge_class()) { (answer.status.label()) } }
                                td { (answer.points.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())) }
                                td { (answer.feedback.as_deref().unwrap_or_default()) }
                            }
                        }
                        @if history.is_empty() {
                            tr { td colspan="6" class="text-center text-muted" { "No answers yet." } }
                        }
                    }
                }
            })
            .render(),
    )
}
