use std::{fmt, str::FromStr};

use chrono::{NaiveDateTime, TimeDelta};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{schema::answers, util_resp::FailureResponse};

pub mod activities;
pub mod grading;
pub mod history;
pub mod quiz;
pub mod scoring;

/// Where an answer stands. `NotAnswered` describes a question without an
/// answer and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    NotAnswered,
    Pending,
    Correct,
    Incorrect,
    PartiallyCorrect,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown correction status `{0}`")]
pub struct UnknownStatus(pub String);

impl CorrectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectionStatus::NotAnswered => "not_answered",
            CorrectionStatus::Pending => "pending",
            CorrectionStatus::Correct => "correct",
            CorrectionStatus::Incorrect => "incorrect",
            CorrectionStatus::PartiallyCorrect => "partially_correct",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CorrectionStatus::NotAnswered => "Not answered",
            CorrectionStatus::Pending => "Awaiting correction",
            CorrectionStatus::Correct => "Correct",
            CorrectionStatus::Incorrect => "Incorrect",
            CorrectionStatus::PartiallyCorrect => "Partially correct",
        }
    }

    pub fn badge_class(self) -> &'static str {
        match self {
            CorrectionStatus::Correct => "badge text-bg-success",
            CorrectionStatus::Incorrect => "badge text-bg-danger",
            CorrectionStatus::PartiallyCorrect => "badge text-bg-warning",
            CorrectionStatus::Pending | CorrectionStatus::NotAnswered => {
                "badge text-bg-secondary"
            }
        }
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrectionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "not_answered" => CorrectionStatus::NotAnswered,
            "pending" => CorrectionStatus::Pending,
            "correct" => CorrectionStatus::Correct,
            "incorrect" => CorrectionStatus::Incorrect,
            "partially_correct" => CorrectionStatus::PartiallyCorrect,
            other => return Err(UnknownStatus(other.to_string())),
        })
    }
}

impl TryFrom<String> for CorrectionStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Queryable, Clone, PartialEq)]
pub struct Answer {
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub points: Option<i64>,
    pub chosen_option: Option<String>,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    #[diesel(deserialize_as = String)]
    pub status: CorrectionStatus,
    pub feedback: Option<String>,
    pub feedback_seen: bool,
    pub submitted_at: NaiveDateTime,
}

/// Offset applied to stored UTC timestamps when showing them (UTC-3).
pub const DISPLAY_UTC_OFFSET_HOURS: i64 = -3;

/// Formats a stored UTC timestamp as `DD/MM/YYYY HH:MM` in display time.
pub fn display_time(utc: NaiveDateTime) -> String {
    (utc + TimeDelta::hours(DISPLAY_UTC_OFFSET_HOURS))
        .format("%d/%m/%Y %H:%M")
        .to_string()
}

impl Answer {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Answer, FailureResponse> {
        answers::table
            .filter(answers::id.eq(id))
            .first::<Answer>(conn)
            .optional()?
            .ok_or(FailureResponse::NotFound(()))
    }

    pub fn for_user_and_question(
        user_id: &str,
        question_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Option<Answer>, diesel::result::Error> {
        answers::table
            .filter(answers::user_id.eq(user_id))
            .filter(answers::question_id.eq(question_id))
            .order_by(answers::submitted_at.asc())
            .first::<Answer>(conn)
            .optional()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn display_time_is_three_hours_behind() {
        let utc = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        assert_eq!(display_time(utc), "28/02/2025 22:30");
    }

    #[test]
    fn statuses_round_trip_through_text() {
        for status in [
            CorrectionStatus::Pending,
            CorrectionStatus::Correct,
            CorrectionStatus::Incorrect,
            CorrectionStatus::PartiallyCorrect,
        ] {
            assert_eq!(status.as_str().parse::<CorrectionStatus>().unwrap(), status);
        }
        assert!("graded".parse::<CorrectionStatus>().is_err());
    }
}
