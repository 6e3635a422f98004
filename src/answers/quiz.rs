use axum::{
    Form,
    extract::Query,
    response::Redirect,
};
use chrono::Utc;
use diesel::prelude::*;
use hypertext::{Raw, prelude::*};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    answers::{Answer, CorrectionStatus, scoring::score_objective},
    questions::{
        Question,
        eligibility::{NextQuestion, can_answer, next_objective, today},
    },
    schema::answers,
    state::Conn,
    template::Page,
    users::User,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    widgets::alert::{ErrorAlert, SuccessAlert},
};

const TIMER_SCRIPT: &str = r#"
(function() {
    var form = document.getElementById('quiz-form');
    if (!form) { return; }
    var limit = parseFloat(form.dataset.timeLimit) || 0;
    var remainingInput = document.getElementById('remaining');
    var display = document.getElementById('countdown');
    var started = Date.now();
    var submitted = false;
    function tick() {
        var elapsed = (Date.now() - started) / 1000;
        var left = Math.max(0, limit - elapsed);
        remainingInput.value = limit > 0 ? (left / limit).toFixed(4) : '0';
        display.textContent = Math.ceil(left) + 's';
        if (left <= 0 && !submitted) {
            submitted = true;
            form.submit();
        }
    }
    form.addEventListener('submit', function() { submitted = true; tick(); });
    tick();
    setInterval(tick, 250);
})();
"#;

#[derive(Deserialize)]
pub struct QuizQuery {
    /// The answer just submitted, whose outcome is shown above the next
    /// question.
    last: Option<String>,
}

pub async fn quiz_page(
    user: User,
    mut conn: Conn<true>,
    Query(query): Query<QuizQuery>,
) -> StandardResponse {
    let last = match &query.last {
        Some(id) => answers::table
            .filter(answers::id.eq(id))
            .filter(answers::user_id.eq(&user.id))
            .first::<Answer>(&mut *conn)
            .optional()?,
        None => None,
    };

    let next = next_objective(&user, today(), &mut *conn)?;

    success(
        Page::new()
            .title("Quiz")
            .user(user)
            .body(maud! {
                @if let Some(last) = &last {
                    @if last.status == CorrectionStatus::Correct {
                        SuccessAlert msg=(format!("Correct! You earned {} points.", last.points.unwrap_or_default()));
                    } @else {
                        ErrorAlert msg=("Wrong answer. No points this time.");
                    }
                }
                @match &next {
                    NextQuestion::Ready(question) => {
                        QuestionCard question=(question);
                        script { (Raw::dangerously_create(TIMER_SCRIPT)) }
                    }
                    NextQuestion::Exhausted => {
                        div class="card" {
                            div class="card-body" {
                                h2 class="h4" { "All done" }
                                p { "There are no questions left for you right now. Come back after the next release." }
                                a class="btn btn-primary" href="/dashboard" { "Back to the dashboard" }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

struct QuestionCard<'r> {
    question: &'r Question,
}

impl<'r> Renderable for QuestionCard<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let q = self.question;
        let limit = q.time_limit.unwrap_or_default();
        maud! {
            div class="card" {
                div class="card-header d-flex justify-content-between" {
                    span { (q.kind.label()) }
                    span class="badge text-bg-warning" id="countdown" { (limit) "s" }
                }
                div class="card-body" {
                    @if let Some(url) = &q.image_url {
                        img src=(url) class="img-fluid mb-3" alt="";
                    }
                    p class="lead" { (q.prompt) }
                    form id="quiz-form" method="post" action="/quiz/answer" data-time-limit=(limit) {
                        input type="hidden" name="question_id" value=(q.id);
                        input type="hidden" id="remaining" name="remaining" value="0";
                        @for (letter, text) in q.choices() {
                            div class="form-check" {
                                input class="form-check-input" type="radio" name="chosen_option"
                                    id=(format!("option-{letter}")) value=(letter);
                                label class="form-check-label" for=(format!("option-{letter}")) { (text) }
                            }
                        }
                        button type="submit" class="btn btn-primary mt-3" { "Answer" }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

#[derive(Deserialize)]
pub struct AnswerForm {
    question_id: String,
    #[serde(default)]
    chosen_option: String,
    #[serde(default)]
    remaining: f64,
}

#[tracing::instrument(skip(user, conn, form), fields(user = %user.id))]
pub async fn do_answer(
    user: User,
    mut conn: Conn<true>,
    Form(form): Form<AnswerForm>,
) -> StandardResponse {
    let question = Question::fetch(&form.question_id, &mut *conn)?;

    if !question.kind.is_objective() {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg=("Written activities are answered from the activities page.");
                })
                .render(),
        );
    }

    if !can_answer(&user, &question, today(), &mut *conn)? {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg=("This question is not available to you, or you have already answered it.");
                    a class="btn btn-primary" href="/quiz" { "Continue" }
                })
                .render(),
        );
    }

    let chosen = form.chosen_option.trim().to_ascii_lowercase();
    let scored =
        score_objective(question.correct_option.as_deref(), &chosen, form.remaining);

    let id = Uuid::now_v7().to_string();
    diesel::insert_into(answers::table)
        .values((
            answers::id.eq(&id),
            answers::user_id.eq(&user.id),
            answers::question_id.eq(&question.id),
            answers::points.eq(Some(scored.points)),
            answers::chosen_option.eq((!chosen.is_empty()).then(|| chosen.clone())),
            answers::status.eq(scored.status.as_str()),
            answers::feedback_seen.eq(false),
            answers::submitted_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)?;

    tracing::info!(question = %question.id, points = scored.points, "quiz answer recorded");

    see_other_ok(Redirect::to(&format!("/quiz?last={id}")))
}
