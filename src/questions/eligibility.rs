//! Which questions a user can answer on a given day.
//!
//! A question is *visible* to a user when it has been released and is either
//! visible to everyone or linked to the user's department. It is *pending*
//! when it is visible and the user has not answered it yet.

use chrono::{Local, NaiveDate};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};

use crate::{
    questions::{Question, QuestionKind, Visibility},
    schema::{answers, question_departments, questions},
    users::User,
};

/// The current date in the server's time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The rule on its own, for a question whose visibility is already loaded.
pub fn is_visible(
    question: &Question,
    visibility: &Visibility,
    department_id: &str,
    today: NaiveDate,
) -> bool {
    question.release_date <= today && visibility.includes(department_id)
}

pub fn is_pending(
    question: &Question,
    visibility: &Visibility,
    department_id: &str,
    today: NaiveDate,
    already_answered: bool,
) -> bool {
    !already_answered && is_visible(question, visibility, department_id, today)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Objective,
    FreeText,
}

#[derive(Debug, PartialEq)]
pub enum NextQuestion {
    Ready(Question),
    Exhausted,
}

fn linked_to_department(
    department_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<String>, diesel::result::Error> {
    question_departments::table
        .filter(question_departments::department_id.eq(department_id))
        .select(question_departments::question_id)
        .load::<String>(conn)
}

fn answered_by(
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<String>, diesel::result::Error> {
    answers::table
        .filter(answers::user_id.eq(user_id))
        .select(answers::question_id)
        .distinct()
        .load::<String>(conn)
}

/// Released questions visible to `user`, answered or not.
pub fn visible_questions(
    user: &User,
    today: NaiveDate,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<questions::BoxedQuery<'static, Sqlite>, diesel::result::Error> {
    let linked = linked_to_department(&user.department_id, &mut *conn)?;

    Ok(questions::table
        .filter(questions::release_date.le(today))
        .filter(
            questions::visible_to_all
                .eq(true)
                .or(questions::id.eq_any(linked)),
        )
        .into_boxed())
}

/// Pending questions of one kind group, earliest release first (ties by id).
pub fn pending_questions(
    user: &User,
    today: NaiveDate,
    kind: PendingKind,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<Question>, diesel::result::Error> {
    let answered = answered_by(&user.id, &mut *conn)?;
    let query = visible_questions(user, today, &mut *conn)?
        .filter(questions::id.ne_all(answered));

    let query = match kind {
        PendingKind::Objective => {
            query.filter(questions::kind.ne(QuestionKind::FreeText.as_str()))
        }
        PendingKind::FreeText => {
            query.filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        }
    };

    query
        .order_by((questions::release_date.asc(), questions::id.asc()))
        .load::<Question>(conn)
}

pub fn count_pending(
    user: &User,
    today: NaiveDate,
    kind: PendingKind,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<i64, diesel::result::Error> {
    pending_questions(user, today, kind, conn).map(|q| q.len() as i64)
}

/// The question the quiz should show next.
pub fn next_objective(
    user: &User,
    today: NaiveDate,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<NextQuestion, diesel::result::Error> {
    Ok(
        match pending_questions(user, today, PendingKind::Objective, conn)?
            .into_iter()
            .next()
        {
            Some(question) => NextQuestion::Ready(question),
            None => NextQuestion::Exhausted,
        },
    )
}

/// Whether `user` may submit an answer to `question` right now.
pub fn can_answer(
    user: &User,
    question: &Question,
    today: NaiveDate,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<bool, diesel::result::Error> {
    let already_answered = diesel::select(diesel::dsl::exists(
        answers::table
            .filter(answers::user_id.eq(&user.id))
            .filter(answers::question_id.eq(&question.id)),
    ))
    .get_result::<bool>(&mut *conn)?;

    let visibility = question.visibility(conn)?;

    Ok(is_pending(
        question,
        &visibility,
        &user.department_id,
        today,
        already_answered,
    ))
}
