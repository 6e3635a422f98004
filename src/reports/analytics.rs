use std::collections::HashMap;

use axum::extract::Query;
use chrono::NaiveDate;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    auth::admin::Admin,
    questions::{Question, QuestionKind},
    schema::{answers, departments, questions, users},
    state::Conn,
    template::Page,
    users::User,
    util_resp::{StandardResponse, success},
    widgets::filters::{Select, options},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRate {
    pub question_id: String,
    pub prompt: String,
    pub total: i64,
    pub errors: i64,
}

impl ErrorRate {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64 * 100.0
        }
    }
}

/// Per-question error rates from `(question_id, prompt, points)` rows,
/// highest rate first (ties by prompt).
pub fn error_rates(rows: &[(String, String, Option<i64>)]) -> Vec<ErrorRate> {
    let mut by_question: IndexMap<&str, ErrorRate> = IndexMap::new();
    for (question_id, prompt, points) in rows {
        let rate = by_question
            .entry(question_id.as_str())
            .or_insert_with(|| ErrorRate {
                question_id: question_id.clone(),
                prompt: prompt.clone(),
                total: 0,
                errors: 0,
            });
        rate.total += 1;
        if points.unwrap_or_default() == 0 {
            rate.errors += 1;
        }
    }

    let mut rates: Vec<ErrorRate> = by_question.into_values().collect();
    rates.sort_by(|a, b| {
        b.percentage()
            .total_cmp(&a.percentage())
            .then_with(|| a.prompt.cmp(&b.prompt))
    });
    rates
}

fn objective_answers(
    user_id: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<(String, String, Option<i64>)>, diesel::result::Error> {
    let mut query = answers::table
        .inner_join(questions::table)
        .filter(questions::kind.ne(QuestionKind::FreeText.as_str()))
        .select((questions::id, questions::prompt, answers::points))
        .into_boxed();
    if let Some(user_id) = user_id {
        query = query.filter(answers::user_id.eq(user_id.to_string()));
    }
    query.load(conn)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrongAnswer {
    pub prompt: String,
    pub release_date: NaiveDate,
    pub chosen: Option<String>,
    pub chosen_text: Option<String>,
    pub correct: Option<String>,
    pub correct_text: Option<String>,
}

/// Department name, then employee name, to their wrong objective answers.
pub type WrongAnswers = IndexMap<String, IndexMap<String, Vec<WrongAnswer>>>;

pub fn wrong_answers(
    user_id: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<WrongAnswers, diesel::result::Error> {
    let mut query = answers::table
        .inner_join(questions::table)
        .inner_join(users::table.inner_join(departments::table))
        .filter(questions::kind.ne(QuestionKind::FreeText.as_str()))
        .filter(answers::points.eq(0_i64))
        .select((
            departments::name,
            users::name,
            answers::chosen_option,
            questions::all_columns,
        ))
        .order_by((
            departments::name.asc(),
            users::name.asc(),
            answers::submitted_at.asc(),
        ))
        .into_boxed();
    if let Some(user_id) = user_id {
        query = query.filter(answers::user_id.eq(user_id.to_string()));
    }

    let rows = query.load::<(String, String, Option<String>, Question)>(conn)?;

    let mut grouped = WrongAnswers::new();
    for (department, employee, chosen, question) in rows {
        grouped
            .entry(department)
            .or_default()
            .entry(employee)
            .or_default()
            .push(WrongAnswer {
                chosen_text: chosen.as_deref().and_then(|c| question.option_text(c)),
                correct_text: question
                    .correct_option
                    .as_deref()
                    .and_then(|c| question.option_text(c)),
                correct: question.correct_option.clone(),
                chosen,
                prompt: question.prompt,
                release_date: question.release_date,
            });
    }
    Ok(grouped)
}

#[derive(Deserialize, Default)]
pub struct AnalyticsQuery {
    #[serde(default)]
    user_id: String,
}

fn describe(letter: Option<&str>, text: Option<&str>) -> String {
    match (letter, text) {
        (Some(letter), Some(text)) => format!("{}) {text}", letter.to_uppercase()),
        (Some(letter), None) => letter.to_uppercase(),
        (None, _) => "(no answer)".to_string(),
    }
}

pub async fn analytics_page(
    _admin: Admin,
    Query(query): Query<AnalyticsQuery>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let user_filter = Some(query.user_id.trim()).filter(|id| !id.is_empty());

    let rates = error_rates(&objective_answers(user_filter, &mut *conn)?);
    let wrong = wrong_answers(user_filter, &mut *conn)?;
    let employees = users::table
        .order_by(users::name.asc())
        .load::<User>(&mut *conn)?;

    let mut user_options = options([("", "All employees")]);
    user_options.extend(employees.iter().map(|u| (u.id.clone(), u.name.clone())));
    let wrong_counts: HashMap<String, usize> = wrong
        .iter()
        .map(|(d, people)| (d.clone(), people.values().map(Vec::len).sum()))
        .collect();

    success(
        Page::new()
            .admin()
            .title("Analytics")
            .body(maud! {
                h1 class="h3 mb-3" { "Analytics" }
                form method="get" class="row g-2 align-items-end mb-4" {
                    Select name=("user_id") label=("Employee") options=(&user_options) selected=(&query.user_id);
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-secondary" { "Filter" }
                    }
                }

                h2 class="h4" { "Error rate per question" }
                table class="table table-sm" {
                    thead { tr { th { "Question" } th { "Answers" } th { "Wrong" } th { "Error rate" } } }
                    tbody {
                        @for r in &rates {
                            tr {
                                td { (r.prompt) }
                                td { (r.total) }
                                td { (r.errors) }
                                td { (format!("{:.1}%", r.percentage())) }
                            }
                        }
                        @if rates.is_empty() {
                            tr { td colspan="4" class="text-muted text-center" { "No objective answers yet." } }
                        }
                    }
                }

                h2 class="h4 mt-4" { "Wrong answers" }
                @for (department, people) in &wrong {
                    h3 class="h5 mt-3" {
                        (department) " "
                        span class="badge text-bg-danger" { (wrong_counts.get(department).copied().unwrap_or_default()) }
                    }
                    @for (employee, answers) in people {
                        h4 class="h6 mt-2" { (employee) }
                        ul class="list-group mb-2" {
                            @for a in answers {
                                li class="list-group-item" {
                                    div { (a.prompt) " " span class="text-muted" { "(" (a.release_date.format("%d/%m/%Y").to_string()) ")" } }
                                    small {
                                        "Answered " (describe(a.chosen.as_deref(), a.chosen_text.as_deref()))
                                        "; correct: " (describe(a.correct.as_deref(), a.correct_text.as_deref()))
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
