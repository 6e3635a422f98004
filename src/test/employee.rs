use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use chrono::Days;
use diesel::{SqliteConnection, prelude::*};

use crate::{
    answers::{Answer, CorrectionStatus},
    dashboard::unseen_feedback,
    questions::eligibility::{PendingKind, count_pending, today},
    schema::answers,
    test::{
        OfflineBlobStore, TestApp, days_ago, free_text, multiple_choice,
        restricted_to,
    },
    users::User,
};

fn answers_to(question_id: &str, conn: &mut SqliteConnection) -> Vec<Answer> {
    answers::table
        .filter(answers::question_id.eq(question_id))
        .load::<Answer>(conn)
        .unwrap()
}

fn pending(app: &TestApp, access_code: &str, kind: PendingKind) -> i64 {
    let mut conn = app.conn();
    let user = User::by_access_code(access_code, &mut conn).unwrap().unwrap();
    count_pending(&user, today(), kind, &mut conn).unwrap()
}

async fn answer_quiz(app: &TestApp, question_id: &str, chosen: &str, remaining: &str) -> StatusCode {
    app.server
        .post("/quiz/answer")
        .form(&[
            ("question_id", question_id),
            ("chosen_option", chosen),
            ("remaining", remaining),
        ])
        .await
        .status_code()
}

async fn submit_activity(app: &TestApp, question_id: &str, attachment: Option<&str>) -> StatusCode {
    let mut form = MultipartForm::new().add_text("body", "See attached");
    if let Some(filename) = attachment {
        form = form.add_part(
            "attachment",
            Part::bytes(b"quarterly numbers".to_vec())
                .file_name(filename)
                .mime_type("application/octet-stream"),
        );
    }
    app.server
        .post(&format!("/activities/{question_id}"))
        .multipart(form)
        .await
        .status_code()
}

#[tokio::test]
async fn visitors_without_a_session_are_sent_to_log_in() {
    let app = TestApp::new();

    let res = app.server.get("/dashboard").await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/");

    let res = app.server.get("/admin/corrections").await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/admin");

    let res = app.server.get("/admin").await;
    res.assert_status_ok();
    assert!(res.text().contains("Administrator login"));
}

#[tokio::test]
async fn unknown_access_code_is_rejected() {
    let app = TestApp::new();
    let department = app.department("Support");
    app.employee("Ana", "1234", &department);

    app.server
        .post("/login")
        .form(&[("access_code", "9999")])
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let res = app.server.post("/login").form(&[("access_code", " 1234 ")]).await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/dashboard");
    app.server.get("/dashboard").await.assert_status_ok();
}

#[tokio::test]
async fn pending_questions_respect_release_date_and_department() {
    let mut app = TestApp::new();
    let support = app.department("Support");
    let sales = app.department("Sales");
    app.employee("Ana", "1234", &support);

    let mut tomorrow = multiple_choice("Released tomorrow");
    tomorrow.release_date = today().checked_add_days(Days::new(1)).unwrap();
    app.question(&tomorrow);

    let mut sales_only = multiple_choice("Only for sales");
    sales_only.visibility = restricted_to(&sales);
    app.question(&sales_only);

    let mut support_only = multiple_choice("Only for support");
    support_only.visibility = restricted_to(&support);
    support_only.release_date = days_ago(3);
    let support_only = app.question(&support_only);

    app.question(&multiple_choice("For everyone"));
    app.question(&free_text("Describe your week"));

    assert_eq!(pending(&app, "1234", PendingKind::Objective), 2);
    assert_eq!(pending(&app, "1234", PendingKind::FreeText), 1);

    app.login("1234").await;
    let quiz = app.server.get("/quiz").await.text();
    assert!(quiz.contains("Only for support"));
    assert!(!quiz.contains("Released tomorrow"));

    assert_eq!(
        answer_quiz(&app, &support_only, "b", "0.5").await,
        StatusCode::SEE_OTHER
    );
    assert_eq!(pending(&app, "1234", PendingKind::Objective), 1);
    assert!(app.server.get("/quiz").await.text().contains("For everyone"));
}

#[tokio::test]
async fn quiz_answers_are_scored_on_submission() {
    let mut app = TestApp::new();
    let department = app.department("Support");
    app.employee("Ana", "1234", &department);
    let fast = app.question(&multiple_choice("Fast"));
    let slow = app.question(&multiple_choice("Slow"));
    let wrong = app.question(&multiple_choice("Wrong"));
    app.login("1234").await;

    for (id, chosen, remaining) in
        [(&fast, "B", "1.0"), (&slow, "b", "0"), (&wrong, "a", "1.0")]
    {
        let res = app
            .server
            .post("/quiz/answer")
            .form(&[
                ("question_id", id.as_str()),
                ("chosen_option", chosen),
                ("remaining", remaining),
            ])
            .await;
        res.assert_status(StatusCode::SEE_OTHER);
        let location = res.header("location");
        assert!(location.to_str().unwrap().starts_with("/quiz?last="));
        app.server
            .get(location.to_str().unwrap())
            .await
            .assert_status_ok();
    }

    // A second answer to the same question is refused.
    assert_eq!(
        answer_quiz(&app, &fast, "b", "1.0").await,
        StatusCode::BAD_REQUEST
    );

    let mut conn = app.conn();
    let points = |answers: Vec<Answer>| -> Vec<Option<i64>> {
        answers.into_iter().map(|a| a.points).collect()
    };
    assert_eq!(points(answers_to(&fast, &mut conn)), vec![Some(105)]);
    assert_eq!(points(answers_to(&slow, &mut conn)), vec![Some(100)]);
    assert_eq!(points(answers_to(&wrong, &mut conn)), vec![Some(0)]);
    assert_eq!(
        answers_to(&wrong, &mut conn)[0].status,
        CorrectionStatus::Incorrect
    );
}

#[tokio::test]
async fn oversized_time_bonus_saturates_instead_of_breaking_reports() {
    let mut app = TestApp::new();
    let department = app.department("Support");
    app.employee("Ana", "1234", &department);
    let first = app.question(&multiple_choice("First"));
    let second = app.question(&multiple_choice("Second"));
    let third = app.question(&multiple_choice("Third"));

    app.login("1234").await;
    for (id, remaining) in [(&first, "1e300"), (&second, "1e18"), (&third, "1e18")] {
        assert_eq!(answer_quiz(&app, id, "b", remaining).await, StatusCode::SEE_OTHER);
    }

    {
        let mut conn = app.conn();
        let stored = answers_to(&first, &mut conn).remove(0);
        assert_eq!(stored.points, Some(i64::MAX));
        assert_eq!(stored.status, CorrectionStatus::Correct);
        assert_eq!(
            answers_to(&second, &mut conn)[0].points,
            Some(5_000_000_000_000_000_100)
        );
    }

    app.server.get("/ranking").await.assert_status_ok();
    app.server
        .get(&format!("/ranking/{department}"))
        .await
        .assert_status_ok();

    app.login_admin().await;
    app.server.get("/admin/reports").await.assert_status_ok();
    app.server.get("/admin/reports/export").await.assert_status_ok();
}

#[tokio::test]
async fn grading_a_free_text_answer_twice_changes_nothing() {
    let mut app = TestApp::new();
    let department = app.department("Support");
    app.employee("Ana", "1234", &department);
    let essay = app.question(&free_text("Describe the refund policy"));
    let quiz = app.question(&multiple_choice("Colour"));

    app.login("1234").await;
    app.server
        .post(&format!("/activities/{essay}"))
        .multipart(MultipartForm::new().add_text("body", "Refunds within 30 days"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    app.server
        .post(&format!("/activities/{essay}"))
        .multipart(MultipartForm::new().add_text("body", "Once more"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(answer_quiz(&app, &quiz, "b", "0").await, StatusCode::SEE_OTHER);

    let (essay_answer, quiz_answer) = {
        let mut conn = app.conn();
        let essay_answer = answers_to(&essay, &mut conn).remove(0);
        assert_eq!(essay_answer.status, CorrectionStatus::Pending);
        assert_eq!(essay_answer.points, None);
        (essay_answer.id, answers_to(&quiz, &mut conn).remove(0).id)
    };

    app.login_admin().await;
    assert!(
        app.server
            .get("/admin/corrections")
            .await
            .text()
            .contains("Refunds within 30 days")
    );
    for _ in 0..2 {
        app.server
            .post(&format!("/admin/corrections/{essay_answer}"))
            .form(&[("status", "correct"), ("feedback", "Well explained")])
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }
    app.server
        .post(&format!("/admin/corrections/{quiz_answer}"))
        .form(&[("status", "incorrect")])
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.server
        .post(&format!("/admin/corrections/{essay_answer}"))
        .form(&[("status", "excellent")])
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    {
        let mut conn = app.conn();
        let graded = answers_to(&essay, &mut conn);
        assert_eq!(graded.len(), 1);
        assert_eq!(graded[0].status, CorrectionStatus::Correct);
        assert_eq!(graded[0].points, Some(100));
        assert_eq!(graded[0].feedback.as_deref(), Some("Well explained"));
        assert!(!graded[0].feedback_seen);
        assert_eq!(answers_to(&quiz, &mut conn)[0].points, Some(100));
    }

    app.login("1234").await;
    let history = app.server.get("/answers").await;
    history.assert_status_ok();
    assert!(history.text().contains("Well explained"));
    assert!(answers_to(&essay, &mut app.conn())[0].feedback_seen);
}

#[tokio::test]
async fn attachments_outside_the_allow_list_are_dropped() {
    let mut app = TestApp::new();
    let department = app.department("Support");
    app.employee("Ana", "1234", &department);
    let report = app.question(&free_text("Send your report"));
    let script = app.question(&free_text("Send your script"));

    app.login("1234").await;
    assert_eq!(
        submit_activity(&app, &report, Some("report.PDF")).await,
        StatusCode::SEE_OTHER
    );
    assert_eq!(
        submit_activity(&app, &script, Some("run.exe")).await,
        StatusCode::SEE_OTHER
    );

    let mut conn = app.conn();
    let stored = answers_to(&report, &mut conn).remove(0);
    let url = stored.attachment_url.unwrap();
    assert!(url.starts_with("/uploads/attachments/"));
    assert!(url.ends_with(".pdf"));

    let dropped = answers_to(&script, &mut conn).remove(0);
    assert_eq!(dropped.attachment_url, None);
    assert_eq!(dropped.body.as_deref(), Some("See attached"));
    drop(conn);

    assert_eq!(app.stored_files("attachments").len(), 1);
}

#[tokio::test]
async fn failed_upload_still_saves_the_answer() {
    let mut app = TestApp::with_blobs(Arc::new(OfflineBlobStore));
    let department = app.department("Support");
    app.employee("Ana", "1234", &department);
    let essay = app.question(&free_text("Send your report"));

    app.login("1234").await;
    assert_eq!(
        submit_activity(&app, &essay, Some("report.pdf")).await,
        StatusCode::SEE_OTHER
    );

    let stored = answers_to(&essay, &mut app.conn()).remove(0);
    assert_eq!(stored.status, CorrectionStatus::Pending);
    assert_eq!(stored.body.as_deref(), Some("See attached"));
    assert_eq!(stored.attachment_url, None);
}

#[tokio::test]
async fn dashboard_counts_unseen_feedback() {
    let mut app = TestApp::new();
    let department = app.department("Support");
    let ana = app.employee("Ana", "1234", &department);
    let essays = [
        app.question(&free_text("First essay")),
        app.question(&free_text("Second essay")),
        app.question(&free_text("Third essay")),
        app.question(&free_text("Fourth essay")),
    ];

    app.login("1234").await;
    for essay in &essays {
        assert_eq!(submit_activity(&app, essay, None).await, StatusCode::SEE_OTHER);
    }

    let answer_ids: Vec<String> = {
        let mut conn = app.conn();
        essays
            .iter()
            .map(|essay| answers_to(essay, &mut conn).remove(0).id)
            .collect()
    };

    app.login_admin().await;
    for (answer_id, status) in answer_ids
        .iter()
        .zip(["correct", "incorrect", "partially_correct"])
    {
        app.server
            .post(&format!("/admin/corrections/{answer_id}"))
            .form(&[("status", status), ("feedback", "Thanks")])
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    // Partially correct and ungraded answers are not counted.
    assert_eq!(unseen_feedback(&ana, &mut app.conn()).unwrap(), 2);

    app.login("1234").await;
    let dashboard = app.server.get("/dashboard").await.text();
    assert!(dashboard.contains(r#"My answers<span class="badge text-bg-light ms-2">2</span>"#));

    app.server.get("/answers").await.assert_status_ok();
    assert_eq!(unseen_feedback(&ana, &mut app.conn()).unwrap(), 0);
    let dashboard = app.server.get("/dashboard").await.text();
    assert!(dashboard.contains(r#"My answers<span class="badge text-bg-light ms-2">0</span>"#));
}
