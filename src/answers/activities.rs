use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path, State},
    response::Redirect,
};
use chrono::Utc;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use uuid::Uuid;

use crate::{
    answers::{Answer, CorrectionStatus},
    questions::{
        Question, QuestionKind,
        eligibility::{can_answer, today, visible_questions},
    },
    schema::{answers, questions},
    state::Conn,
    storage::{BlobStore, ResourceType, allowed_file, upload::MultipartForm},
    template::Page,
    users::User,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    validation::non_empty,
    widgets::alert::ErrorAlert,
};

/// Released free-text questions visible to the user, newest first, each
/// with the user's answer if there is one.
pub fn activities_for(
    user: &User,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<(Question, Option<Answer>)>, diesel::result::Error> {
    let activities = visible_questions(user, today(), &mut *conn)?
        .filter(questions::kind.eq(QuestionKind::FreeText.as_str()))
        .order_by((questions::release_date.desc(), questions::id.desc()))
        .load::<Question>(&mut *conn)?;

    let ids: Vec<String> = activities.iter().map(|q| q.id.clone()).collect();
    let mut answered: HashMap<String, Answer> = answers::table
        .filter(answers::user_id.eq(&user.id))
        .filter(answers::question_id.eq_any(ids))
        .order_by(answers::submitted_at.desc())
        .load::<Answer>(conn)?
        .into_iter()
        .map(|a| (a.question_id.clone(), a))
        .collect();

    Ok(activities
        .into_iter()
        .map(|q| {
            let answer = answered.remove(&q.id);
            (q, answer)
        })
        .collect())
}

pub async fn activities_page(user: User, mut conn: Conn<true>) -> StandardResponse {
    let activities = activities_for(&user, &mut *conn)?;

    success(
        Page::new()
            .title("Activities")
            .user(user)
            .body(maud! {
                h1 class="h3 mb-3" { "Activities" }
                @if activities.is_empty() {
                    p class="text-muted" { "No activities have been released for you yet." }
                }
                div class="list-group" {
                    @for (question, answer) in &activities {
                        div class="list-group-item" {
                            div class="d-flex justify-content-between align-items-start" {
                                div {
                                    p class="mb-1" { (question.prompt) }
                                    small class="text-muted" { "Released " (question.release_date.format("%d/%m/%Y").to_string()) }
                                }
                                @match answer {
                                    Some(answer) => {
                                        span class=(answer.status.badge_class()) { (answer.status.label()) }
                                    }
                                    None => {
                                        a class="btn btn-sm btn-primary" href=(format!("/activities/{}", question.id)) { "Answer" }
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

pub async fn activity_page(
    user: User,
    Path(question_id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let question = Question::fetch(&question_id, &mut *conn)?;
    if question.kind != QuestionKind::FreeText {
        return see_other_ok(Redirect::to("/quiz"));
    }

    let existing =
        Answer::for_user_and_question(&user.id, &question.id, &mut *conn)?;
    if existing.is_none() && !can_answer(&user, &question, today(), &mut *conn)? {
        return Err(crate::util_resp::FailureResponse::NotFound(()));
    }

    success(
        Page::new()
            .title("Activity")
            .user(user)
            .body(maud! {
                div class="card" {
                    div class="card-body" {
                        @if let Some(url) = &question.image_url {
                            img src=(url) class="img-fluid mb-3" alt="";
                        }
                        p class="lead" { (question.prompt) }
                        @match &existing {
                            Some(answer) => {
                                SubmittedAnswer answer=(answer);
                            }
                            None => {
                                form method="post" enctype="multipart/form-data" {
                                    div class="mb-3" {
                                        label class="form-label" for="body" { "Your answer" }
                                        textarea class="form-control" id="body" name="body" rows="6" {}
                                    }
                                    div class="mb-3" {
                                        label class="form-label" for="attachment" { "Attachment (optional)" }
                                        input class="form-control" type="file" id="attachment" name="attachment";
                                    }
                                    button type="submit" class="btn btn-primary" { "Submit" }
                                }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

struct SubmittedAnswer<'r> {
    answer: &'r Answer,
}

impl<'r> Renderable for SubmittedAnswer<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let a = self.answer;
        maud! {
            div class="border rounded p-3 bg-light" {
                p { span class=(a.status.badge_class()) { (a.status.label()) } }
                @if let Some(body) = &a.body {
                    p style="white-space: pre-wrap;" { (body) }
                }
                @if let Some(url) = &a.attachment_url {
                    p { a href=(url) { "Attachment" } }
                }
                @if let Some(feedback) = &a.feedback {
                    p class="mb-0" { strong { "Feedback: " } (feedback) }
                }
            }
        }
        .render_to(buffer);
    }
}

#[tracing::instrument(skip(user, blobs, conn, multipart), fields(user = %user.id))]
pub async fn do_submit_activity(
    user: User,
    Path(question_id): Path<String>,
    State(blobs): State<Arc<dyn BlobStore>>,
    mut conn: Conn<true>,
    multipart: Multipart,
) -> StandardResponse {
    let question = Question::fetch(&question_id, &mut *conn)?;

    if question.kind != QuestionKind::FreeText
        || !can_answer(&user, &question, today(), &mut *conn)?
    {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg=("This activity is not available to you, or you have already answered it.");
                    a class="btn btn-primary" href="/activities" { "Back to activities" }
                })
                .render(),
        );
    }

    let form = MultipartForm::read(multipart).await?;
    let body = non_empty(form.text_or_empty("body"));

    let attachment_url = match form.file("attachment") {
        Some(file) if allowed_file(&file.filename) => {
            match blobs.upload(&file.bytes, &file.filename, ResourceType::Raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::error!(filename = %file.filename, "attachment upload failed: {e}");
                    None
                }
            }
        }
        Some(file) => {
            tracing::warn!(filename = %file.filename, "attachment type not accepted");
            None
        }
        None => None,
    };

    let id = Uuid::now_v7().to_string();
    diesel::insert_into(answers::table)
        .values((
            answers::id.eq(&id),
            answers::user_id.eq(&user.id),
            answers::question_id.eq(&question.id),
            answers::body.eq(&body),
            answers::attachment_url.eq(&attachment_url),
            answers::status.eq(CorrectionStatus::Pending.as_str()),
            answers::feedback_seen.eq(false),
            answers::submitted_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)?;

    tracing::info!(question = %question.id, "activity answer recorded");

    see_other_ok(Redirect::to("/activities"))
}
