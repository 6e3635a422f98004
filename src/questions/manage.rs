use std::{collections::BTreeSet, sync::Arc};

use axum::{
    extract::{Multipart, Path, State},
    response::Redirect,
};
use chrono::NaiveDate;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use uuid::Uuid;

use crate::{
    auth::admin::Admin,
    departments::{Department, manage::admin_error},
    questions::{Question, QuestionKind, Visibility},
    schema::{answers, question_departments, questions},
    state::Conn,
    storage::{
        BlobStore, ResourceType, destroy_quietly, upload::MultipartForm,
    },
    template::Page,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    widgets::alert::ErrorList,
};

/// A question as submitted through the administrator form, normalised for
/// its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: [Option<String>; 4],
    pub correct_option: Option<String>,
    pub release_date: NaiveDate,
    pub time_limit: Option<i64>,
    pub visibility: Visibility,
}

/// Accepts the `YYYY-MM-DD` of a date input and `DD/MM/YYYY`.
pub fn parse_form_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .ok()
}

impl QuestionDraft {
    pub fn from_form(form: &MultipartForm) -> Result<QuestionDraft, Vec<String>> {
        let mut errors = Vec::new();

        let prompt = form.text_or_empty("prompt").trim().to_string();
        if prompt.is_empty() {
            errors.push("The question text cannot be empty.".to_string());
        }

        let kind = match form.text_or_empty("kind").parse::<QuestionKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                errors.push(format!("{e}."));
                None
            }
        };

        let release_date = parse_form_date(form.text_or_empty("release_date"));
        if release_date.is_none() {
            errors.push("Please give a valid release date.".to_string());
        }

        let options = ["option_a", "option_b", "option_c", "option_d"]
            .map(|name| crate::validation::non_empty(form.text_or_empty(name)));

        let mut correct_option = None;
        let mut time_limit = None;
        if let Some(kind) = kind.filter(|k| k.is_objective()) {
            let letter = form.text_or_empty("correct_option").trim().to_ascii_lowercase();
            if !kind.answer_letters().contains(&letter.as_str()) {
                errors.push(format!(
                    "The correct answer must be one of: {}.",
                    kind.answer_letters().join(", ")
                ));
            } else if kind == QuestionKind::MultipleChoice
                && options[(letter.as_bytes()[0] - b'a') as usize].is_none()
            {
                errors.push("The correct option has no text.".to_string());
            }
            correct_option = Some(letter);

            match form.text_or_empty("time_limit").trim().parse::<i64>() {
                Ok(seconds) if seconds > 0 => time_limit = Some(seconds),
                _ => errors.push(
                    "The time limit must be a positive number of seconds."
                        .to_string(),
                ),
            }
        }

        let visibility = if form.text("visible_to_all").is_some() {
            Visibility::All
        } else {
            let departments: BTreeSet<String> = form
                .all("department_ids")
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if departments.is_empty() {
                errors.push(
                    "Choose at least one department, or make the question visible to everyone."
                        .to_string(),
                );
            }
            Visibility::RestrictedTo(departments)
        };

        match (kind, release_date) {
            (Some(kind), Some(release_date)) if errors.is_empty() => {
                Ok(QuestionDraft {
                    kind,
                    prompt,
                    options: if kind == QuestionKind::MultipleChoice {
                        options
                    } else {
                        Default::default()
                    },
                    correct_option,
                    release_date,
                    time_limit,
                    visibility,
                })
            }
            _ => Err(errors),
        }
    }
}

pub fn insert_question(
    draft: &QuestionDraft,
    image_url: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<String, diesel::result::Error> {
    let id = Uuid::now_v7().to_string();
    let [a, b, c, d] = &draft.options;

    diesel::insert_into(questions::table)
        .values((
            questions::id.eq(&id),
            questions::kind.eq(draft.kind.as_str()),
            questions::prompt.eq(&draft.prompt),
            questions::option_a.eq(a),
            questions::option_b.eq(b),
            questions::option_c.eq(c),
            questions::option_d.eq(d),
            questions::correct_option.eq(&draft.correct_option),
            questions::release_date.eq(draft.release_date),
            questions::time_limit.eq(draft.time_limit),
            questions::image_url.eq(image_url),
            questions::visible_to_all.eq(false),
        ))
        .execute(&mut *conn)?;

    draft.visibility.store(&id, conn)?;

    Ok(id)
}

pub fn update_question(
    id: &str,
    draft: &QuestionDraft,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(), diesel::result::Error> {
    let [a, b, c, d] = &draft.options;

    diesel::update(questions::table.filter(questions::id.eq(id)))
        .set((
            questions::kind.eq(draft.kind.as_str()),
            questions::prompt.eq(&draft.prompt),
            questions::option_a.eq(a),
            questions::option_b.eq(b),
            questions::option_c.eq(c),
            questions::option_d.eq(d),
            questions::correct_option.eq(&draft.correct_option),
            questions::release_date.eq(draft.release_date),
            questions::time_limit.eq(draft.time_limit),
        ))
        .execute(&mut *conn)?;

    draft.visibility.store(id, conn)
}

/// Files left behind by a deleted question, to be destroyed once the rows
/// are gone.
#[derive(Debug, Default)]
pub struct OrphanedFiles {
    pub image: Option<String>,
    pub attachments: Vec<String>,
}

impl OrphanedFiles {
    pub fn destroy(self, blobs: &dyn BlobStore) {
        if let Some(image) = &self.image {
            destroy_quietly(blobs, image, ResourceType::Image);
        }
        for attachment in &self.attachments {
            destroy_quietly(blobs, attachment, ResourceType::Raw);
        }
    }
}

/// Deletes a question with its answers and department links.
pub fn delete_question(
    question: &Question,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<OrphanedFiles, diesel::result::Error> {
    let attachments = answers::table
        .filter(answers::question_id.eq(&question.id))
        .filter(answers::attachment_url.is_not_null())
        .select(answers::attachment_url.assume_not_null())
        .load::<String>(&mut *conn)?;

    diesel::delete(answers::table.filter(answers::question_id.eq(&question.id)))
        .execute(&mut *conn)?;
    diesel::delete(
        question_departments::table
            .filter(question_departments::question_id.eq(&question.id)),
    )
    .execute(&mut *conn)?;
    diesel::delete(questions::table.filter(questions::id.eq(&question.id)))
        .execute(conn)?;

    Ok(OrphanedFiles {
        image: question.image_url.clone(),
        attachments,
    })
}

/// Uploads the `image` part of `form`, if any. Failures are logged and the
/// question is saved without an image.
fn upload_image(form: &MultipartForm, blobs: &dyn BlobStore) -> Option<String> {
    let file = form.file("image")?;
    if !ResourceType::Image.accepts(&file.filename) {
        tracing::warn!(filename = %file.filename, "image type not accepted");
        return None;
    }
    match blobs.upload(&file.bytes, &file.filename, ResourceType::Image) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::error!(filename = %file.filename, "image upload failed: {e}");
            None
        }
    }
}

/// Form fields for creating or editing a question.
pub struct QuestionFields<'r> {
    pub action: &'r str,
    pub question: Option<&'r Question>,
    pub visibility: Option<&'r Visibility>,
    pub departments: &'r [Department],
    pub submit: &'r str,
}

impl<'r> Renderable for QuestionFields<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let q = self.question;
        let kind = q.map(|q| q.kind).unwrap_or(QuestionKind::MultipleChoice);
        let prompt = q.map(|q| q.prompt.as_str()).unwrap_or_default();
        let option = |i: usize| -> String {
            q.and_then(|q| {
                [&q.option_a, &q.option_b, &q.option_c, &q.option_d][i].clone()
            })
            .unwrap_or_default()
        };
        let correct = q
            .and_then(|q| q.correct_option.clone())
            .unwrap_or_default();
        let release = q
            .map(|q| q.release_date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let time_limit = q
            .and_then(|q| q.time_limit)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "30".to_string());
        let all = matches!(self.visibility, None | Some(Visibility::All));
        let chosen = |id: &str| match self.visibility {
            Some(Visibility::RestrictedTo(ids)) => ids.contains(id),
            _ => false,
        };

        maud! {
            form method="post" action=(self.action) enctype="multipart/form-data" class="row g-3" {
                div class="col-md-3" {
                    label class="form-label" for="kind" { "Kind" }
                    select class="form-select" id="kind" name="kind" {
                        @for k in QuestionKind::ALL {
                            option value=(k.as_str()) selected[k == kind] { (k.label()) }
                        }
                    }
                }
                div class="col-md-3" {
                    label class="form-label" for="release_date" { "Release date" }
                    input class="form-control" type="date" id="release_date" name="release_date" value=(release) required;
                }
                div class="col-md-3" {
                    label class="form-label" for="time_limit" { "Time limit (seconds)" }
                    input class="form-control" type="number" min="1" id="time_limit" name="time_limit" value=(time_limit);
                }
                div class="col-md-3" {
                    label class="form-label" for="correct_option" { "Correct answer (a-d, v/f)" }
                    input class="form-control" id="correct_option" name="correct_option" value=(correct) maxlength="1";
                }
                div class="col-12" {
                    label class="form-label" for="prompt" { "Question" }
                    textarea class="form-control" id="prompt" name="prompt" rows="3" required { (prompt) }
                }
                @for (i, letter) in ["a", "b", "c", "d"].iter().enumerate() {
                    div class="col-md-3" {
                        label class="form-label" for=(format!("option_{letter}")) { "Option " (letter.to_uppercase()) }
                        input class="form-control" id=(format!("option_{letter}")) name=(format!("option_{letter}")) value=(option(i));
                    }
                }
                div class="col-md-6" {
                    label class="form-label" for="image" { "Image (optional)" }
                    input class="form-control" type="file" accept="image/*" id="image" name="image";
                }
                div class="col-md-6" {
                    div class="form-check" {
                        input class="form-check-input" type="checkbox" id="visible_to_all" name="visible_to_all" checked[all];
                        label class="form-check-label" for="visible_to_all" { "Visible to every department" }
                    }
                    select class="form-select mt-2" name="department_ids" multiple {
                        @for d in self.departments {
                            option value=(d.id) selected[chosen(&d.id)] { (d.name) }
                        }
                    }
                }
                div class="col-12" {
                    button type="submit" class="btn btn-primary" { (self.submit) }
                }
            }
        }
        .render_to(buffer);
    }
}

#[tracing::instrument(skip_all)]
pub async fn do_create_question(
    _admin: Admin,
    State(blobs): State<Arc<dyn BlobStore>>,
    mut conn: Conn<true>,
    multipart: Multipart,
) -> StandardResponse {
    let form = MultipartForm::read(multipart).await?;

    let draft = match QuestionDraft::from_form(&form) {
        Ok(draft) => draft,
        Err(errors) => return admin_error(errors.join(" ")),
    };

    let image_url = upload_image(&form, blobs.as_ref());
    let id = insert_question(&draft, image_url.as_deref(), &mut *conn)?;
    tracing::info!(%id, kind = %draft.kind, "question created");

    see_other_ok(Redirect::to("/admin"))
}

fn edit_page(
    question: &Question,
    visibility: &Visibility,
    departments: &[Department],
    errors: &[String],
) -> hypertext::Rendered<String> {
    let action = format!("/admin/questions/{}/edit", question.id);
    Page::new()
        .admin()
        .title("Edit question")
        .body(maud! {
            h1 class="h3 mb-3" { "Edit question" }
            ErrorList errors=(errors);
            @if let Some(url) = &question.image_url {
                img src=(url) class="img-thumbnail mb-3" style="max-height: 200px;" alt="Current image";
            }
            QuestionFields
                action=(&action)
                question=(Some(question))
                visibility=(Some(visibility))
                departments=(departments)
                submit=("Save");
            a class="btn btn-link mt-3" href="/admin" { "Back" }
        })
        .render()
}

pub async fn edit_question_page(
    _admin: Admin,
    Path(id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let question = Question::fetch(&id, &mut *conn)?;
    let visibility = question.visibility(&mut *conn)?;
    let departments = Department::all(&mut *conn)?;
    success(edit_page(&question, &visibility, &departments, &[]))
}

#[tracing::instrument(skip(_admin, blobs, conn, multipart))]
pub async fn do_edit_question(
    _admin: Admin,
    Path(id): Path<String>,
    State(blobs): State<Arc<dyn BlobStore>>,
    mut conn: Conn<false>,
    multipart: Multipart,
) -> StandardResponse {
    let question = Question::fetch(&id, &mut *conn)?;
    let form = MultipartForm::read(multipart).await?;

    let draft = match QuestionDraft::from_form(&form) {
        Ok(draft) => draft,
        Err(errors) => {
            let visibility = question.visibility(&mut *conn)?;
            let departments = Department::all(&mut *conn)?;
            return bad_request(edit_page(
                &question,
                &visibility,
                &departments,
                &errors,
            ));
        }
    };

    let new_url = upload_image(&form, blobs.as_ref());
    let saved = conn.transaction(|conn| {
        update_question(&question.id, &draft, &mut *conn)?;
        if let Some(new_url) = &new_url {
            diesel::update(questions::table.filter(questions::id.eq(&question.id)))
                .set(questions::image_url.eq(new_url))
                .execute(conn)?;
        }
        Ok::<_, diesel::result::Error>(())
    });
    if let Err(e) = saved {
        if let Some(new_url) = &new_url {
            destroy_quietly(blobs.as_ref(), new_url, ResourceType::Image);
        }
        return Err(e.into());
    }

    if let (Some(_), Some(old_url)) = (&new_url, &question.image_url) {
        destroy_quietly(blobs.as_ref(), old_url, ResourceType::Image);
    }
    tracing::info!(id = %question.id, replaced_image = new_url.is_some(), "question updated");

    see_other_ok(Redirect::to("/admin"))
}

#[tracing::instrument(skip(_admin, blobs, conn))]
pub async fn do_delete_question(
    _admin: Admin,
    Path(id): Path<String>,
    State(blobs): State<Arc<dyn BlobStore>>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let question = Question::fetch(&id, &mut *conn)?;
    // Committed here so that files are only removed once the rows are gone.
    let orphans = conn.transaction(|conn| delete_question(&question, conn))?;
    orphans.destroy(blobs.as_ref());
    tracing::info!(%id, "question deleted");
    see_other_ok(Redirect::to("/admin"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_dates() {
        assert_eq!(
            parse_form_date("2025-04-30"),
            NaiveDate::from_ymd_opt(2025, 4, 30)
        );
        assert_eq!(
            parse_form_date("30/04/2025"),
            NaiveDate::from_ymd_opt(2025, 4, 30)
        );
        assert_eq!(parse_form_date("31/04/2025"), None);
    }

    fn form(fields: &[(&str, &str)]) -> MultipartForm {
        let mut all = vec![
            ("prompt", "  Is the sky blue?  "),
            ("release_date", "2025-04-30"),
            ("visible_to_all", "on"),
            ("option_a", "Yes"),
            ("option_b", "No"),
        ];
        all.extend_from_slice(fields);
        MultipartForm::from_fields(&all)
    }

    #[test]
    fn true_false_drops_options() {
        let draft = QuestionDraft::from_form(&form(&[
            ("kind", "true_false"),
            ("correct_option", "V"),
            ("time_limit", "20"),
        ]))
        .unwrap();

        assert_eq!(draft.prompt, "Is the sky blue?");
        assert_eq!(draft.options, [None, None, None, None]);
        assert_eq!(draft.correct_option.as_deref(), Some("v"));
        assert_eq!(draft.time_limit, Some(20));
        assert_eq!(draft.visibility, Visibility::All);
    }

    #[test]
    fn free_text_has_no_key_or_timer() {
        let draft = QuestionDraft::from_form(&form(&[
            ("kind", "free_text"),
            ("correct_option", "a"),
            ("time_limit", "0"),
        ]))
        .unwrap();

        assert_eq!(draft.options, [None, None, None, None]);
        assert_eq!(draft.correct_option, None);
        assert_eq!(draft.time_limit, None);
    }

    #[test]
    fn multiple_choice_keeps_options() {
        let draft = QuestionDraft::from_form(&form(&[
            ("kind", "multiple_choice"),
            ("correct_option", "B"),
            ("time_limit", "30"),
        ]))
        .unwrap();
        assert_eq!(draft.options[0].as_deref(), Some("Yes"));
        assert_eq!(draft.options[2], None);
        assert_eq!(draft.correct_option.as_deref(), Some("b"));
    }

    #[test]
    fn objective_questions_need_a_usable_key_and_timer() {
        let errors = QuestionDraft::from_form(&form(&[
            ("kind", "multiple_choice"),
            ("correct_option", "c"),
            ("time_limit", "-5"),
        ]))
        .unwrap_err();
        assert_eq!(errors.len(), 2);

        let errors = QuestionDraft::from_form(&form(&[
            ("kind", "true_false"),
            ("correct_option", "a"),
            ("time_limit", "10"),
        ]))
        .unwrap_err();
        assert_eq!(errors, vec!["The correct answer must be one of: v, f."]);
    }

    #[test]
    fn restricted_questions_need_a_department() {
        let fields = [
            ("kind", "free_text"),
            ("prompt", "Describe"),
            ("release_date", "30/04/2025"),
        ];
        assert!(QuestionDraft::from_form(&MultipartForm::from_fields(&fields)).is_err());

        let mut fields = fields.to_vec();
        fields.extend([("department_ids", "d1"), ("department_ids", "d2")]);
        let draft = QuestionDraft::from_form(&MultipartForm::from_fields(&fields)).unwrap();
        assert_eq!(
            draft.visibility,
            Visibility::RestrictedTo(BTreeSet::from(["d1".to_string(), "d2".to_string()]))
        );
    }
}
