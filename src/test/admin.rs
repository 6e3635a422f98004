use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use axum_test::multipart::{MultipartForm, Part};
use chrono::Utc;
use diesel::prelude::*;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    config::create_app,
    departments::Department,
    questions::Question,
    schema::{answers, departments, question_departments, questions, users},
    test::{INIT_SECRET, TestApp, multiple_choice, restricted_to, test_state},
    users::User,
};

fn record_answer(app: &TestApp, user_id: &str, question_id: &str, points: i64) {
    diesel::insert_into(answers::table)
        .values((
            answers::id.eq(Uuid::now_v7().to_string()),
            answers::user_id.eq(user_id),
            answers::question_id.eq(question_id),
            answers::points.eq(Some(points)),
            answers::chosen_option.eq(Some("b")),
            answers::status.eq(if points > 0 { "correct" } else { "incorrect" }),
            answers::feedback_seen.eq(false),
            answers::submitted_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut app.conn())
        .unwrap();
}

#[tokio::test]
async fn wrong_admin_password_is_rejected() {
    let app = TestApp::new();
    app.server
        .post("/admin/login")
        .form(&[("password", "guess")])
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.server
        .get("/admin/reports")
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn departments_with_members_cannot_be_deleted() {
    let mut app = TestApp::new();
    app.login_admin().await;

    app.server
        .post("/admin/departments")
        .form(&[("name", "  Support ")])
        .await
        .assert_status(StatusCode::SEE_OTHER);
    app.server
        .post("/admin/departments")
        .form(&[("name", "Support")])
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let department = departments::table
        .filter(departments::name.eq("Support"))
        .first::<Department>(&mut app.conn())
        .unwrap();
    let ana = app.employee("Ana", "1234", &department.id);

    app.server
        .post(&format!("/admin/departments/{}/delete", department.id))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert!(Department::fetch(&department.id, &mut app.conn()).is_ok());

    app.server
        .post(&format!("/admin/users/{ana}/delete"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    app.server
        .post(&format!("/admin/departments/{}/delete", department.id))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert!(Department::fetch(&department.id, &mut app.conn()).is_err());
}

#[tokio::test]
async fn deletes_leave_no_orphans() {
    let mut app = TestApp::new();
    let support = app.department("Support");
    let ana = app.employee("Ana", "1234", &support);
    let bruno = app.employee("Bruno", "5678", &support);

    let mut draft = multiple_choice("Linked");
    draft.visibility = restricted_to(&support);
    let linked = app.question(&draft);
    let other = app.question(&multiple_choice("Other"));

    record_answer(&app, &ana, &linked, 100);
    record_answer(&app, &bruno, &linked, 0);
    record_answer(&app, &bruno, &other, 104);

    app.login_admin().await;
    app.server
        .post(&format!("/admin/questions/{linked}/delete"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    app.server
        .post(&format!("/admin/users/{bruno}/delete"))
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let mut conn = app.conn();
    let count = |n: Result<i64, diesel::result::Error>| n.unwrap();
    assert_eq!(
        count(
            answers::table
                .filter(answers::question_id.eq(&linked))
                .count()
                .get_result(&mut conn)
        ),
        0
    );
    assert_eq!(
        count(
            question_departments::table
                .filter(question_departments::question_id.eq(&linked))
                .count()
                .get_result(&mut conn)
        ),
        0
    );
    assert_eq!(
        count(
            answers::table
                .filter(answers::user_id.eq(&bruno))
                .count()
                .get_result(&mut conn)
        ),
        0
    );
    assert_eq!(count(questions::table.count().get_result(&mut conn)), 1);
    assert_eq!(count(users::table.count().get_result(&mut conn)), 1);
}

#[tokio::test]
async fn ranking_orders_ties_the_same_way_every_time() {
    let mut app = TestApp::new();
    // Created out of name order on purpose.
    let beta = app.department("Beta");
    let gamma = app.department("Gamma");
    let alpha = app.department("Alpha");
    app.department("Empty");

    let q1 = app.question(&multiple_choice("One"));
    let q2 = app.question(&multiple_choice("Two"));

    let ana = app.employee("Ana", "1234", &alpha);
    let bruno = app.employee("Bruno", "5678", &alpha);
    let carla = app.employee("Carla", "9012", &beta);
    let davi = app.employee("Davi", "3456", &gamma);

    record_answer(&app, &ana, &q1, 105);
    record_answer(&app, &ana, &q2, 100);
    record_answer(&app, &bruno, &q1, 0);
    record_answer(&app, &carla, &q1, 102);
    record_answer(&app, &davi, &q1, 0);

    app.login("1234").await;
    let first = app.server.get("/ranking").await.text();
    for _ in 0..3 {
        assert_eq!(app.server.get("/ranking").await.text(), first);
    }

    let position = |name: &str| first.find(name).unwrap();
    // Alpha averages 102.5 and Beta 102.
    assert!(position("Alpha") < position("Beta"));
    assert!(position("Beta") < position("Gamma"));
    assert!(!first.contains("Empty"));

    let members = app.server.get(&format!("/ranking/{alpha}")).await;
    members.assert_status_ok();
    let members = members.text();
    assert!(members.find("Ana").unwrap() < members.find("Bruno").unwrap());
    assert!(members.contains("100.0%"));
}

#[tokio::test]
async fn reports_export_csv() {
    let mut app = TestApp::new();
    app.login_admin().await;
    app.server
        .get("/admin/reports/export")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let support = app.department("Support");
    let ana = app.employee("Ana Oliveira", "1234", &support);
    let question = app.question(&multiple_choice("Which colour is the logo?"));
    record_answer(&app, &ana, &question, 103);

    let summary = app.server.get("/admin/reports/export").await;
    summary.assert_status_ok();
    assert!(
        summary
            .header("content-type")
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let text = summary.text();
    assert!(text.starts_with("Employee,Department,Total answers"));
    assert!(text.contains("Ana Oliveira,Support,1,1,100.0%,103"));

    let detailed = app
        .server
        .get("/admin/reports/export_detailed")
        .add_query_param("type", "quiz")
        .await;
    detailed.assert_status_ok();
    assert!(detailed.text().contains("Which colour is the logo?"));

    app.server
        .get("/admin/reports/export_detailed")
        .add_query_param("type", "free_text")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.server
        .get("/admin/reports/export_detailed")
        .add_query_param("type", "everything")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let analytics = app.server.get("/admin/analytics").await;
    analytics.assert_status_ok();
    assert!(analytics.text().contains("Which colour is the logo?"));
}

#[tokio::test]
async fn database_reset_needs_the_secret() {
    let mut app = TestApp::new();
    app.department("Temporary");

    app.server
        .get("/_init_db/wrong")
        .await
        .assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        departments::table
            .count()
            .get_result::<i64>(&mut app.conn())
            .unwrap(),
        1
    );

    app.server
        .get(&format!("/_init_db/{INIT_SECRET}"))
        .await
        .assert_status_ok();
    {
        let mut conn = app.conn();
        let names = departments::table
            .order_by(departments::name.asc())
            .select(departments::name)
            .load::<String>(&mut conn)
            .unwrap();
        assert_eq!(names, vec!["CSM", "ISM", "Suporte", "Vendas"]);
        assert_eq!(users::table.count().get_result::<i64>(&mut conn).unwrap(), 7);
    }

    app.login("1234").await;
    assert!(app.server.get("/dashboard").await.text().contains("Ana Oliveira"));
}

#[tokio::test]
async fn database_reset_is_off_without_a_secret() {
    let (state, _uploads) = test_state(None);

    let res = create_app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/_init_db/{INIT_SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

async fn save_user(app: &TestApp, url: &str, fields: [(&str, &str); 4]) -> StatusCode {
    app.server.post(url).form(&fields).await.status_code()
}

#[tokio::test]
async fn access_codes_and_emails_are_unique() {
    let mut app = TestApp::new();
    let support = app.department("Support");
    app.employee("Ana", "1234", &support);
    app.login_admin().await;

    let user = |name: &'static str, email: &'static str, code: &'static str| {
        [
            ("name", name),
            ("email", email),
            ("access_code", code),
            ("department_id", support.as_str()),
        ]
    };

    assert_eq!(
        save_user(&app, "/admin/users", user("Bruno", "bruno@empresa.com", "5678")).await,
        StatusCode::SEE_OTHER
    );
    assert_eq!(
        save_user(&app, "/admin/users", user("Carlos", "", "1234")).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        save_user(&app, "/admin/users", user("Carlos", "bruno@empresa.com", "9012")).await,
        StatusCode::BAD_REQUEST
    );

    let bruno = users::table
        .filter(users::name.eq("Bruno"))
        .first::<User>(&mut app.conn())
        .unwrap();
    let edit_url = format!("/admin/users/{}/edit", bruno.id);

    // Keeping one's own code and email is not a conflict.
    assert_eq!(
        save_user(&app, &edit_url, user("Bruno Costa", "bruno@empresa.com", "5678")).await,
        StatusCode::SEE_OTHER
    );
    assert_eq!(
        save_user(&app, &edit_url, user("Bruno Costa", "bruno@empresa.com", "1234")).await,
        StatusCode::BAD_REQUEST
    );

    let bruno = User::fetch(&bruno.id, &mut app.conn()).unwrap();
    assert_eq!(bruno.name, "Bruno Costa");
    assert_eq!(bruno.access_code, "5678");
    assert_eq!(
        users::table.count().get_result::<i64>(&mut app.conn()).unwrap(),
        2
    );
}

fn question_form(image: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("kind", "multiple_choice")
        .add_text("prompt", "Which logo is ours?")
        .add_text("release_date", "2025-04-30")
        .add_text("option_a", "Left")
        .add_text("option_b", "Right")
        .add_text("correct_option", "a")
        .add_text("time_limit", "30")
        .add_text("visible_to_all", "on")
        .add_part(
            "image",
            Part::bytes(b"image bytes".to_vec())
                .file_name(image)
                .mime_type("application/octet-stream"),
        )
}

fn logo_question(app: &TestApp) -> Question {
    questions::table
        .filter(questions::prompt.eq("Which logo is ours?"))
        .first::<Question>(&mut app.conn())
        .unwrap()
}

#[tokio::test]
async fn question_images_are_replaced_and_removed() {
    let mut app = TestApp::new();
    app.login_admin().await;

    app.server
        .post("/admin/questions")
        .multipart(question_form("page.svg"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let question = logo_question(&app);
    assert_eq!(question.image_url, None);
    assert!(app.stored_files("images").is_empty());

    let edit_url = format!("/admin/questions/{}/edit", question.id);
    app.server
        .post(&edit_url)
        .multipart(question_form("first.png"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let first = logo_question(&app).image_url.unwrap();
    assert!(first.starts_with("/uploads/images/"));

    app.server
        .post(&edit_url)
        .multipart(question_form("second.jpg"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let second = logo_question(&app).image_url.unwrap();
    assert_ne!(first, second);
    assert!(second.ends_with(".jpg"));
    let files = app.stored_files("images");
    assert_eq!(files.len(), 1);
    assert!(second.ends_with(&files[0]));

    // A disallowed replacement leaves the current image alone.
    app.server
        .post(&edit_url)
        .multipart(question_form("page.html"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert_eq!(logo_question(&app).image_url.as_deref(), Some(second.as_str()));
    assert_eq!(app.stored_files("images").len(), 1);

    app.server
        .post(&format!("/admin/questions/{}/delete", question.id))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert!(Question::fetch(&question.id, &mut app.conn()).is_err());
    assert!(app.stored_files("images").is_empty());
}
