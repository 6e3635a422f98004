//! Points for answers.
//!
//! Objective answers are scored when they are submitted: a right answer is
//! worth 100 points plus a bonus of up to 5 for speed, where `remaining` is
//! the fraction of the time limit left on the client's clock. The client
//! value is not checked against the server.
//!
//! Free-text answers get their points when an administrator grades them.

use std::str::FromStr;

use crate::answers::CorrectionStatus;

pub const BASE_POINTS: i64 = 100;
pub const SPEED_BONUS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scored {
    pub points: i64,
    pub status: CorrectionStatus,
}

pub fn score_objective(
    correct_option: Option<&str>,
    chosen: &str,
    remaining: f64,
) -> Scored {
    let right = !chosen.is_empty()
        && correct_option.is_some_and(|c| c.eq_ignore_ascii_case(chosen));

    let points = if right {
        let bonus = (remaining * SPEED_BONUS).floor();
        // NaN and infinities from a misbehaving client count as no bonus;
        // huge finite values saturate.
        let bonus = if bonus.is_finite() { bonus as i64 } else { 0 };
        BASE_POINTS.saturating_add(bonus)
    } else {
        0
    };

    Scored {
        points,
        status: if points > 0 {
            CorrectionStatus::Correct
        } else {
            CorrectionStatus::Incorrect
        },
    }
}

/// An administrator's verdict on a free-text answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Correct,
    Incorrect,
    PartiallyCorrect,
}

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid correction")]
pub struct InvalidGrade(pub String);

impl Grade {
    pub fn points(self) -> i64 {
        match self {
            Grade::Correct => 100,
            Grade::Incorrect => 0,
            Grade::PartiallyCorrect => 50,
        }
    }

    pub fn status(self) -> CorrectionStatus {
        match self {
            Grade::Correct => CorrectionStatus::Correct,
            Grade::Incorrect => CorrectionStatus::Incorrect,
            Grade::PartiallyCorrect => CorrectionStatus::PartiallyCorrect,
        }
    }
}

impl FromStr for Grade {
    type Err = InvalidGrade;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Grade::Correct),
            "incorrect" => Ok(Grade::Incorrect),
            "partially_correct" => Ok(Grade::PartiallyCorrect),
            other => Err(InvalidGrade(other.to_string())),
        }
    }
}
