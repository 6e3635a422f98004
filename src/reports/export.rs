//! CSV downloads of the reports.

use axum::extract::Query;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Deserialize;

use crate::{
    answers::{Answer, display_time},
    auth::admin::Admin,
    departments::manage::admin_error,
    questions::{Question, QuestionKind},
    reports::{DepartmentQuery, UserSummary, user_summaries},
    schema::{answers, departments, questions, users},
    sheet::{SheetError, write_sheet},
    state::Conn,
    util_resp::{FailureResponse, StandardResponse, csv_download},
};

const SUMMARY_HEADERS: [&str; 6] = [
    "Employee",
    "Department",
    "Total answers",
    "Correct answers",
    "Success rate (%)",
    "Total points",
];

pub fn summary_rows(summaries: &[UserSummary]) -> Vec<Vec<String>> {
    summaries
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.department.clone(),
                s.total_answers.to_string(),
                s.correct_answers.to_string(),
                format!("{:.1}%", s.percentage()),
                s.total_points.to_string(),
            ]
        })
        .collect()
}

fn sheet_failure(e: SheetError) -> FailureResponse {
    tracing::error!("could not build export: {e}");
    FailureResponse::ServerError(())
}

pub async fn export_summary(
    _admin: Admin,
    Query(query): Query<DepartmentQuery>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let summaries = user_summaries(query.department(), &mut *conn)?;
    if summaries.is_empty() {
        return admin_error("There is no data to export for the selected filters.");
    }

    let bytes = write_sheet(&SUMMARY_HEADERS, &summary_rows(&summaries))
        .map_err(sheet_failure)?;
    csv_download("performance_report.csv".to_string(), bytes)
}

/// Which answers a detailed export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Quiz,
    FreeText,
    All,
}

impl ExportKind {
    /// Also accepts the Portuguese names used by older links.
    pub fn parse(value: &str) -> Option<ExportKind> {
        match value.trim() {
            "quiz" => Some(ExportKind::Quiz),
            "free_text" | "discursivas" => Some(ExportKind::FreeText),
            "" | "all" | "todos" => Some(ExportKind::All),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ExportKind::Quiz => "quiz",
            ExportKind::FreeText => "free_text",
            ExportKind::All => "all",
        }
    }

    fn headers(self) -> &'static [&'static str] {
        match self {
            ExportKind::Quiz => &[
                "Employee",
                "Department",
                "Answered at",
                "Question",
                "Kind",
                "Given answer",
                "Correct answer",
                "Points",
            ],
            ExportKind::FreeText => &[
                "Employee",
                "Department",
                "Answered at",
                "Question",
                "Answer text",
                "Status",
                "Feedback",
                "Points",
            ],
            ExportKind::All => &[
                "Employee",
                "Department",
                "Answered at",
                "Question",
                "Kind",
                "Given answer",
                "Correct answer",
                "Answer text",
                "Status",
                "Feedback",
                "Points",
            ],
        }
    }
}

/// One answer with everything a detailed export shows.
#[derive(Debug, Clone)]
pub struct DetailedAnswer {
    pub employee: String,
    pub department: String,
    pub answer: Answer,
    pub question: Question,
}

impl DetailedAnswer {
    fn row(&self, kind: ExportKind) -> Vec<String> {
        let a = &self.answer;
        let q = &self.question;
        let option = |letter: Option<&str>| {
            letter
                .and_then(|l| q.option_text(l))
                .unwrap_or_default()
        };

        let mut row = vec![
            self.employee.clone(),
            self.department.clone(),
            display_time(a.submitted_at),
            q.prompt.clone(),
        ];
        if kind != ExportKind::FreeText {
            row.extend([
                q.kind.as_str().to_string(),
                option(a.chosen_option.as_deref()),
                option(q.correct_option.as_deref()),
            ]);
        }
        if kind != ExportKind::Quiz {
            row.extend([
                a.body.clone().unwrap_or_default(),
                a.status.as_str().to_string(),
                a.feedback.clone().unwrap_or_default(),
            ]);
        }
        row.push(a.points.unwrap_or_default().to_string());
        row
    }
}

/// Answers ordered by department, employee and time of answer.
pub fn detailed_answers(
    department_id: Option<&str>,
    kind: ExportKind,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<DetailedAnswer>, diesel::result::Error> {
    let mut query = answers::table
        .inner_join(questions::table)
        .inner_join(users::table.inner_join(departments::table))
        .select((
            users::name,
            departments::name,
            answers::all_columns,
            questions::all_columns,
        ))
        .order_by((
            departments::name.asc(),
            users::name.asc(),
            answers::submitted_at.asc(),
            answers::id.asc(),
        ))
        .into_boxed();

    if let Some(department_id) = department_id {
        query = query.filter(users::department_id.eq(department_id.to_string()));
    }
    query = match kind {
        ExportKind::Quiz => {
            query.filter(questions::kind.ne(QuestionKind::FreeText.as_str()))
        }
        ExportKind::FreeText => {
            query.filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        }
        ExportKind::All => query,
    };

    Ok(query
        .load::<(String, String, Answer, Question)>(conn)?
        .into_iter()
        .map(|(employee, department, answer, question)| DetailedAnswer {
            employee,
            department,
            answer,
            question,
        })
        .collect())
}

#[derive(Deserialize, Default)]
pub struct DetailedQuery {
    #[serde(default)]
    department_id: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[tracing::instrument(skip(_admin, query, conn))]
pub async fn export_detailed(
    _admin: Admin,
    Query(query): Query<DetailedQuery>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let Some(kind) = ExportKind::parse(&query.kind) else {
        return admin_error(format!("Unknown export type `{}`.", query.kind));
    };
    let department = Some(query.department_id.trim()).filter(|id| !id.is_empty());

    let answers = detailed_answers(department, kind, &mut *conn)?;
    if answers.is_empty() {
        return admin_error("No answers match the selected filters.");
    }

    let rows: Vec<Vec<String>> = answers.iter().map(|a| a.row(kind)).collect();
    let bytes = write_sheet(kind.headers(), &rows).map_err(sheet_failure)?;
    tracing::info!(rows = rows.len(), kind = kind.as_str(), "detailed export");

    csv_download(format!("detailed_report_{}.csv", kind.as_str()), bytes)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::answers::CorrectionStatus;

    fn detailed(kind: QuestionKind) -> DetailedAnswer {
        DetailedAnswer {
            employee: "Ana".to_string(),
            department: "Support".to_string(),
            answer: Answer {
                id: "a".to_string(),
                user_id: "u".to_string(),
                question_id: "q".to_string(),
                points: Some(103),
                chosen_option: Some("b".to_string()),
                body: None,
                attachment_url: None,
                status: CorrectionStatus::Correct,
                feedback: None,
                feedback_seen: false,
                submitted_at: NaiveDate::from_ymd_opt(2025, 5, 2)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap(),
            },
            question: Question {
                id: "q".to_string(),
                kind,
                prompt: "Pick".to_string(),
                option_a: Some("One".to_string()),
                option_b: Some("Two".to_string()),
                option_c: None,
                option_d: None,
                correct_option: Some("b".to_string()),
                release_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                time_limit: Some(30),
                image_url: None,
                visible_to_all: true,
            },
        }
    }

    #[test]
    fn export_kinds() {
        assert_eq!(ExportKind::parse("quiz"), Some(ExportKind::Quiz));
        assert_eq!(ExportKind::parse("discursivas"), Some(ExportKind::FreeText));
        assert_eq!(ExportKind::parse("todos"), Some(ExportKind::All));
        assert_eq!(ExportKind::parse(""), Some(ExportKind::All));
        assert_eq!(ExportKind::parse("everything"), None);
    }

    #[test]
    fn rows_match_headers() {
        let answer = detailed(QuestionKind::MultipleChoice);
        for kind in [ExportKind::Quiz, ExportKind::FreeText, ExportKind::All] {
            assert_eq!(answer.row(kind).len(), kind.headers().len());
        }

        let quiz = answer.row(ExportKind::Quiz);
        assert_eq!(quiz[2], "02/05/2025 09:00");
        assert_eq!(quiz[5], "Two");
        assert_eq!(quiz[6], "Two");
        assert_eq!(quiz[7], "103");
    }

    #[test]
    fn summary_percentage_is_formatted() {
        let rows = summary_rows(&[UserSummary {
            user_id: "u".to_string(),
            name: "Ana".to_string(),
            department_id: "d".to_string(),
            department: "Support".to_string(),
            total_answers: 3,
            correct_answers: 1,
            hits: 1,
            total_points: 104,
        }]);
        assert_eq!(rows[0][4], "33.3%");
        assert_eq!(rows[0].len(), SUMMARY_HEADERS.len());
    }
}
