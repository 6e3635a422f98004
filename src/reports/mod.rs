//! Aggregated results for administrators and the employee ranking.
//!
//! Aggregation happens in Rust over plain rows so that the rules (what
//! counts as correct, how ties are ordered) live in one testable place.

use std::collections::HashMap;

use axum::extract::Query;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    answers::CorrectionStatus,
    auth::admin::Admin,
    departments::Department,
    questions::QuestionKind,
    schema::{answers, departments, questions, users},
    state::Conn,
    template::Page,
    util_resp::{StandardResponse, success},
    widgets::filters::{Select, options},
};

pub mod analytics;
pub mod export;
pub mod ranking;

/// The parts of an answer that reports look at.
#[derive(Debug, Clone, Queryable)]
pub struct ScoredAnswer {
    pub user_id: String,
    pub points: Option<i64>,
    #[diesel(deserialize_as = String)]
    pub status: CorrectionStatus,
    #[diesel(deserialize_as = String)]
    pub kind: QuestionKind,
}

/// An employee listed in a report, with their department's name.
#[derive(Debug, Clone, Queryable)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub department_id: String,
    pub department: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: String,
    pub name: String,
    pub department_id: String,
    pub department: String,
    pub total_answers: i64,
    pub correct_answers: i64,
    /// Answers that earned any points.
    pub hits: i64,
    pub total_points: i64,
}

impl UserSummary {
    pub fn percentage(&self) -> f64 {
        if self.total_answers == 0 {
            0.0
        } else {
            self.correct_answers as f64 / self.total_answers as f64 * 100.0
        }
    }
}

/// Objective answers count when they scored; free-text answers when an
/// administrator judged them (partially) correct.
pub fn counts_as_correct(answer: &ScoredAnswer) -> bool {
    if answer.kind.is_objective() {
        answer.points.unwrap_or_default() > 0
    } else {
        matches!(
            answer.status,
            CorrectionStatus::Correct | CorrectionStatus::PartiallyCorrect
        )
    }
}

/// One summary per member, in the order the members were given.
pub fn summarize(members: Vec<Member>, answers: &[ScoredAnswer]) -> Vec<UserSummary> {
    let mut by_user: HashMap<&str, Vec<&ScoredAnswer>> = HashMap::new();
    for answer in answers {
        by_user.entry(answer.user_id.as_str()).or_default().push(answer);
    }

    members
        .into_iter()
        .map(|member| {
            let theirs = by_user
                .get(member.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            UserSummary {
                total_answers: theirs.len() as i64,
                correct_answers: theirs
                    .iter()
                    .filter(|a| counts_as_correct(a))
                    .count() as i64,
                hits: theirs
                    .iter()
                    .filter(|a| a.points.unwrap_or_default() > 0)
                    .count() as i64,
                total_points: theirs
                    .iter()
                    .map(|a| a.points.unwrap_or_default())
                    .fold(0_i64, i64::saturating_add),
                user_id: member.id,
                name: member.name,
                department_id: member.department_id,
                department: member.department,
            }
        })
        .collect()
}

/// Members ordered by name (then id), optionally from one department.
pub fn members(
    department_id: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<Member>, diesel::result::Error> {
    let mut query = users::table
        .inner_join(departments::table)
        .select((users::id, users::name, users::department_id, departments::name))
        .order_by((users::name.asc(), users::id.asc()))
        .into_boxed();
    if let Some(department_id) = department_id {
        query = query.filter(users::department_id.eq(department_id.to_string()));
    }
    query.load::<Member>(conn)
}

pub fn scored_answers(
    department_id: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<ScoredAnswer>, diesel::result::Error> {
    let mut query = answers::table
        .inner_join(questions::table)
        .inner_join(users::table)
        .select((answers::user_id, answers::points, answers::status, questions::kind))
        .into_boxed();
    if let Some(department_id) = department_id {
        query = query.filter(users::department_id.eq(department_id.to_string()));
    }
    query.load::<ScoredAnswer>(conn)
}

pub fn user_summaries(
    department_id: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<UserSummary>, diesel::result::Error> {
    let members = members(department_id, &mut *conn)?;
    let answers = scored_answers(department_id, conn)?;
    Ok(summarize(members, &answers))
}

#[derive(Deserialize, Default)]
pub struct DepartmentQuery {
    #[serde(default)]
    pub department_id: String,
}

impl DepartmentQuery {
    pub fn department(&self) -> Option<&str> {
        Some(self.department_id.trim()).filter(|id| !id.is_empty())
    }
}

pub async fn reports_page(
    _admin: Admin,
    Query(query): Query<DepartmentQuery>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let summaries = user_summaries(query.department(), &mut *conn)?;
    let departments = Department::all(&mut *conn)?;

    let mut department_options = options([("", "All departments")]);
    department_options
        .extend(departments.iter().map(|d| (d.id.clone(), d.name.clone())));
    let selected = query.department().unwrap_or_default().to_string();

    success(
        Page::new()
            .admin()
            .title("Reports")
            .body(maud! {
                h1 class="h3 mb-3" { "Reports" }
                form method="get" class="row g-2 align-items-end mb-3" {
                    Select name=("department_id") label=("Department") options=(&department_options) selected=(&selected);
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-secondary" { "Filter" }
                    }
                    div class="col-md-auto" {
                        a class="btn btn-outline-primary" href=(format!("/admin/reports/export?department_id={selected}")) { "Export summary" }
                    }
                }
                form method="get" action="/admin/reports/export_detailed" class="row g-2 align-items-end mb-4" {
                    input type="hidden" name="department_id" value=(&selected);
                    div class="col-md-auto" {
                        label class="form-label" for="type" { "Detailed export" }
                        select class="form-select" id="type" name="type" {
                            option value="all" { "All answers" }
                            option value="quiz" { "Quiz answers" }
                            option value="free_text" { "Free-text answers" }
                        }
                    }
                    div class="col-md-auto" {
                        button type="submit" class="btn btn-outline-primary" { "Download" }
                    }
                }
                table class="table" {
                    thead {
                        tr {
                            th { "Employee" }
                            th { "Department" }
                            th { "Answers" }
                            th { "Correct" }
                            th { "Success rate" }
                            th { "Points" }
                        }
                    }
                    tbody {
                        @for s in &summaries {
                            tr {
                                td { (s.name) }
                                td { (s.department) }
                                td { (s.total_answers) }
                                td { (s.correct_answers) }
                                td { (format!("{:.1}%", s.percentage())) }
                                td { (s.total_points) }
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

    fn member(id: &str, name: &str) -> Member {
        Member {
            id: id.to_string(),
            name: name.to_string(),
            department_id: "d".to_string(),
            department: "Support".to_string(),
        }
    }

    fn answer(
        user: &str,
        kind: QuestionKind,
        points: Option<i64>,
        status: CorrectionStatus,
    ) -> ScoredAnswer {
        ScoredAnswer {
            user_id: user.to_string(),
            points,
            status,
            kind,
        }
    }

    #[test]
    fn summaries_count_by_kind() {
        let answers = vec![
            answer("ana", QuestionKind::MultipleChoice, Some(104), CorrectionStatus::Correct),
            answer("ana", QuestionKind::TrueFalse, Some(0), CorrectionStatus::Incorrect),
            answer("ana", QuestionKind::FreeText, Some(50), CorrectionStatus::PartiallyCorrect),
            answer("ana", QuestionKind::FreeText, None, CorrectionStatus::Pending),
        ];
        let summaries = summarize(vec![member("ana", "Ana"), member("bruno", "Bruno")], &answers);

        let ana = &summaries[0];
        assert_eq!(ana.total_answers, 4);
        assert_eq!(ana.correct_answers, 2);
        assert_eq!(ana.hits, 2);
        assert_eq!(ana.total_points, 154);
        assert_eq!(ana.percentage(), 50.0);

        let bruno = &summaries[1];
        assert_eq!(bruno.total_answers, 0);
        assert_eq!(bruno.percentage(), 0.0);
        assert_eq!(bruno.total_points, 0);
    }

    #[test]
    fn totals_saturate() {
        let answers = vec![
            answer("ana", QuestionKind::TrueFalse, Some(i64::MAX - 1), CorrectionStatus::Correct),
            answer("ana", QuestionKind::TrueFalse, Some(5_000_000_000_000_000_100), CorrectionStatus::Correct),
        ];
        let summaries = summarize(vec![member("ana", "Ana")], &answers);
        assert_eq!(summaries[0].total_points, i64::MAX);
    }

    #[test]
    fn graded_free_text_without_points_can_still_count() {
        let a = answer("x", QuestionKind::FreeText, Some(0), CorrectionStatus::Correct);
        assert!(counts_as_correct(&a));
        let b = answer("x", QuestionKind::MultipleChoice, Some(0), CorrectionStatus::Correct);
        assert!(!counts_as_correct(&b));
    }
}
