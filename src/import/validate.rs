//! Row-level validation for question spreadsheets.
//!
//! Each row is checked on its own; a valid row converts into a
//! [`NewQuestion`], which can only describe a well-formed question.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use diesel::{connection::LoadConnection, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    questions::{
        QuestionKind, Visibility,
        manage::{QuestionDraft, insert_question},
    },
    sheet::Row,
};

pub const TEXT: &str = "texto";
pub const KIND: &str = "tipo";
pub const OPTIONS: [&str; 4] = ["opcao_a", "opcao_b", "opcao_c", "opcao_d"];
pub const CORRECT: &str = "resposta_correta";
pub const RELEASE: &str = "data_liberacao";
pub const TIME_LIMIT: &str = "tempo_limite";

/// The columns an import understands, in display order.
pub const COLUMNS: [&str; 9] = [
    TEXT, KIND, OPTIONS[0], OPTIONS[1], OPTIONS[2], OPTIONS[3], CORRECT,
    RELEASE, TIME_LIMIT,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRow {
    pub data: Row,
    /// Column name to message.
    pub errors: BTreeMap<String, String>,
}

impl ValidatedRow {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A question ready to be stored, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NewQuestion {
    MultipleChoice {
        prompt: String,
        options: [Option<String>; 4],
        /// One of `a`..`d`.
        correct: String,
        release_date: NaiveDate,
        time_limit: i64,
    },
    TrueFalse {
        prompt: String,
        /// `v` or `f`.
        correct: String,
        release_date: NaiveDate,
        time_limit: i64,
    },
    FreeText {
        prompt: String,
        release_date: NaiveDate,
    },
}

impl NewQuestion {
    pub fn kind(&self) -> QuestionKind {
        match self {
            NewQuestion::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            NewQuestion::TrueFalse { .. } => QuestionKind::TrueFalse,
            NewQuestion::FreeText { .. } => QuestionKind::FreeText,
        }
    }

    fn into_draft(self) -> QuestionDraft {
        let kind = self.kind();
        let (prompt, options, correct_option, release_date, time_limit) =
            match self {
                NewQuestion::MultipleChoice {
                    prompt,
                    options,
                    correct,
                    release_date,
                    time_limit,
                } => (prompt, options, Some(correct), release_date, Some(time_limit)),
                NewQuestion::TrueFalse {
                    prompt,
                    correct,
                    release_date,
                    time_limit,
                } => (prompt, Default::default(), Some(correct), release_date, Some(time_limit)),
                NewQuestion::FreeText {
                    prompt,
                    release_date,
                } => (prompt, Default::default(), None, release_date, None),
            };

        QuestionDraft {
            kind,
            prompt,
            options,
            correct_option,
            release_date,
            time_limit,
            visibility: Visibility::All,
        }
    }

    /// Stores the question, visible to every department.
    pub fn insert(
        self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<String, diesel::result::Error> {
        insert_question(&self.into_draft(), None, conn)
    }
}

fn cell<'r>(row: &'r Row, column: &str) -> &'r str {
    row.get(column).map(|v| v.trim()).unwrap_or_default()
}

fn parse_release(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%d/%m/%Y").ok()
}

/// Whole seconds; fractional values are truncated.
fn parse_time_limit(value: &str) -> Option<i64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

/// Checks a row, returning either the question it describes or the
/// messages for each offending column.
pub fn validate_row(row: &Row) -> Result<NewQuestion, BTreeMap<String, String>> {
    let mut errors = BTreeMap::new();

    let prompt = cell(row, TEXT);
    if prompt.is_empty() {
        errors.insert(TEXT.to_string(), "The text cannot be empty.".to_string());
    }

    let kind = match cell(row, KIND).to_ascii_lowercase().as_str() {
        "multipla_escolha" => Some(QuestionKind::MultipleChoice),
        "verdadeiro_falso" => Some(QuestionKind::TrueFalse),
        "discursiva" => Some(QuestionKind::FreeText),
        _ => {
            errors.insert(
                KIND.to_string(),
                "Must be multipla_escolha, verdadeiro_falso or discursiva."
                    .to_string(),
            );
            None
        }
    };

    let correct = cell(row, CORRECT).to_ascii_lowercase();
    match kind {
        Some(QuestionKind::MultipleChoice)
            if !["a", "b", "c", "d"].contains(&correct.as_str()) =>
        {
            errors.insert(CORRECT.to_string(), "Must be a, b, c or d.".to_string());
        }
        Some(QuestionKind::TrueFalse) if !["v", "f"].contains(&correct.as_str()) => {
            errors.insert(CORRECT.to_string(), "Must be v or f.".to_string());
        }
        _ => {}
    }

    let release_date = parse_release(cell(row, RELEASE));
    if release_date.is_none() {
        errors.insert(
            RELEASE.to_string(),
            "Invalid date. Use DD/MM/YYYY.".to_string(),
        );
    }

    let time_limit = parse_time_limit(cell(row, TIME_LIMIT));
    if kind != Some(QuestionKind::FreeText) && time_limit.is_none() {
        errors.insert(TIME_LIMIT.to_string(), "Must be a number.".to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let prompt = prompt.to_string();
    // Every field checked above is present once `errors` is empty.
    match (kind, release_date, time_limit) {
        (Some(QuestionKind::MultipleChoice), Some(release_date), Some(time_limit)) => {
            Ok(NewQuestion::MultipleChoice {
                prompt,
                options: OPTIONS
                    .map(|column| crate::validation::non_empty(cell(row, column))),
                correct,
                release_date,
                time_limit,
            })
        }
        (Some(QuestionKind::TrueFalse), Some(release_date), Some(time_limit)) => {
            Ok(NewQuestion::TrueFalse {
                prompt,
                correct,
                release_date,
                time_limit,
            })
        }
        (Some(QuestionKind::FreeText), Some(release_date), _) => {
            Ok(NewQuestion::FreeText {
                prompt,
                release_date,
            })
        }
        _ => Err(errors),
    }
}

/// Validates every row for the preview.
pub fn preview(rows: Vec<Row>) -> Vec<ValidatedRow> {
    rows.into_iter()
        .map(|data| {
            let errors = validate_row(&data).err().unwrap_or_default();
            ValidatedRow { data, errors }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_multiple_choice() {
        let question = validate_row(&row(&[
            (TEXT, "Capital of France?"),
            (KIND, "Multipla_Escolha"),
            ("opcao_a", "Paris"),
            ("opcao_b", "Rome"),
            (CORRECT, "A"),
            (RELEASE, "15/01/2025"),
            (TIME_LIMIT, "30.7"),
        ]))
        .unwrap();

        assert_eq!(
            question,
            NewQuestion::MultipleChoice {
                prompt: "Capital of France?".to_string(),
                options: [
                    Some("Paris".to_string()),
                    Some("Rome".to_string()),
                    None,
                    None
                ],
                correct: "a".to_string(),
                release_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                time_limit: 30,
            }
        );
    }

    #[test]
    fn free_text_needs_no_answer_or_time_limit() {
        let question = validate_row(&row(&[
            (TEXT, "Describe our refund policy"),
            (KIND, "discursiva"),
            (RELEASE, "01/02/2025"),
        ]))
        .unwrap();
        assert_eq!(question.kind(), QuestionKind::FreeText);
    }

    #[test]
    fn errors_are_reported_per_column() {
        let errors = validate_row(&row(&[
            (TEXT, ""),
            (KIND, "verdadeiro_falso"),
            (CORRECT, "x"),
            (RELEASE, "2025/01/15"),
            (TIME_LIMIT, "soon"),
        ]))
        .unwrap_err();

        assert_eq!(errors.len(), 4);
        for column in [TEXT, CORRECT, RELEASE, TIME_LIMIT] {
            assert!(errors.contains_key(column), "missing error for {column}");
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let errors = validate_row(&row(&[
            (TEXT, "Anything"),
            (KIND, "essay"),
            (RELEASE, "01/02/2025"),
            (TIME_LIMIT, "10"),
        ]))
        .unwrap_err();
        assert!(errors.contains_key(KIND));
    }

    #[test]
    fn preview_keeps_row_order() {
        let rows = vec![
            row(&[(TEXT, "One"), (KIND, "discursiva"), (RELEASE, "01/01/2025")]),
            row(&[(TEXT, "Two"), (KIND, "discursiva"), (RELEASE, "bad")]),
        ];
        let validated = preview(rows);
        assert!(validated[0].is_valid());
        assert!(!validated[1].is_valid());
        assert_eq!(validated[1].data[TEXT], "Two");
    }
}
