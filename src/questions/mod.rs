use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::NaiveDate;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{schema::{question_departments, questions}, util_resp::FailureResponse};

pub mod eligibility;
pub mod manage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    FreeText,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown question kind `{0}`")]
pub struct UnknownKind(pub String);

impl QuestionKind {
    pub const ALL: [QuestionKind; 3] = [
        QuestionKind::MultipleChoice,
        QuestionKind::TrueFalse,
        QuestionKind::FreeText,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::FreeText => "free_text",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "Multiple choice",
            QuestionKind::TrueFalse => "True/false",
            QuestionKind::FreeText => "Free text",
        }
    }

    /// Objective questions are scored automatically on submission.
    pub fn is_objective(self) -> bool {
        !matches!(self, QuestionKind::FreeText)
    }

    /// Letters a correct answer may take for this kind.
    pub fn answer_letters(self) -> &'static [&'static str] {
        match self {
            QuestionKind::MultipleChoice => &["a", "b", "c", "d"],
            QuestionKind::TrueFalse => &["v", "f"],
            QuestionKind::FreeText => &[],
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = UnknownKind;

    /// Accepts the stored names and the spreadsheet names
    /// (`multipla_escolha`, `verdadeiro_falso`, `discursiva`), ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multiple_choice" | "multipla_escolha" => {
                Ok(QuestionKind::MultipleChoice)
            }
            "true_false" | "verdadeiro_falso" => Ok(QuestionKind::TrueFalse),
            "free_text" | "discursiva" => Ok(QuestionKind::FreeText),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for QuestionKind {
    type Error = UnknownKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Queryable, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    #[diesel(deserialize_as = String)]
    pub kind: QuestionKind,
    pub prompt: String,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_option: Option<String>,
    pub release_date: NaiveDate,
    pub time_limit: Option<i64>,
    pub image_url: Option<String>,
    pub visible_to_all: bool,
}

impl Question {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Question, FailureResponse> {
        questions::table
            .filter(questions::id.eq(id))
            .first::<Question>(conn)
            .optional()?
            .ok_or(FailureResponse::NotFound(()))
    }

    /// The `(letter, text)` pairs a user can pick from.
    pub fn choices(&self) -> Vec<(&'static str, String)> {
        match self.kind {
            QuestionKind::MultipleChoice => ["a", "b", "c", "d"]
                .into_iter()
                .filter_map(|letter| {
                    self.option_text(letter).map(|text| (letter, text))
                })
                .collect(),
            QuestionKind::TrueFalse => {
                vec![("v", "True".to_string()), ("f", "False".to_string())]
            }
            QuestionKind::FreeText => vec![],
        }
    }

    /// Maps an answer letter to the text shown to users.
    pub fn option_text(&self, letter: &str) -> Option<String> {
        let text = match letter.to_ascii_lowercase().as_str() {
            "a" => self.option_a.clone(),
            "b" => self.option_b.clone(),
            "c" => self.option_c.clone(),
            "d" => self.option_d.clone(),
            "v" => Some("True".to_string()),
            "f" => Some("False".to_string()),
            _ => None,
        };
        text.filter(|t| !t.trim().is_empty())
    }

    pub fn visibility(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Visibility, diesel::result::Error> {
        if self.visible_to_all {
            return Ok(Visibility::All);
        }
        let departments = question_departments::table
            .filter(question_departments::question_id.eq(&self.id))
            .select(question_departments::department_id)
            .load::<String>(conn)?;
        Ok(Visibility::RestrictedTo(departments.into_iter().collect()))
    }
}

/// Who may see a question once it is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    All,
    RestrictedTo(BTreeSet<String>),
}

impl Visibility {
    pub fn includes(&self, department_id: &str) -> bool {
        match self {
            Visibility::All => true,
            Visibility::RestrictedTo(departments) => {
                departments.contains(department_id)
            }
        }
    }

    /// Replaces the stored visibility of `question_id` with `self`.
    pub fn store(
        &self,
        question_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<(), diesel::result::Error> {
        diesel::update(questions::table.filter(questions::id.eq(question_id)))
            .set(questions::visible_to_all.eq(matches!(self, Visibility::All)))
            .execute(&mut *conn)?;

        diesel::delete(
            question_departments::table
                .filter(question_departments::question_id.eq(question_id)),
        )
        .execute(&mut *conn)?;

        if let Visibility::RestrictedTo(departments) = self {
            for department_id in departments {
                diesel::insert_into(question_departments::table)
                    .values((
                        question_departments::id.eq(Uuid::now_v7().to_string()),
                        question_departments::question_id.eq(question_id),
                        question_departments::department_id.eq(department_id),
                    ))
                    .execute(&mut *conn)?;
            }
        }

        Ok(())
    }
}
