//! End-to-end tests that drive the router over HTTP against an in-memory
//! database.

use std::{collections::BTreeSet, sync::Arc};

use axum::http::StatusCode;
use axum_extra::extract::cookie::Key;
use axum_test::{TestServer, TestServerConfig};
use chrono::{Days, NaiveDate};
use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool, PooledConnection},
};
use diesel_migrations::MigrationHarness;
use tempfile::TempDir;

use crate::{
    MIGRATIONS,
    config::{Settings, UPLOADS_PREFIX, create_app},
    departments::Department,
    questions::{
        QuestionKind, Visibility,
        eligibility::today,
        manage::{QuestionDraft, insert_question},
    },
    state::{AppState, DbPool},
    storage::{BlobError, BlobStore, LocalBlobStore, ResourceType},
    users::manage::{ValidUser, create_user},
};

mod admin;
mod employee;

pub const ADMIN_PASSWORD: &str = "correct horse";
pub const INIT_SECRET: &str = "let-me-reset";

pub struct TestApp {
    pub server: TestServer,
    pub pool: DbPool,
    pub uploads: TempDir,
}

/// State over a fresh in-memory database. The returned directory holds
/// uploads and must outlive the state.
pub fn test_state(init_db_secret: Option<&str>) -> (AppState, TempDir) {
    let pool = Pool::builder()
        .max_size(1)
        .build(ConnectionManager::<SqliteConnection>::new(":memory:"))
        .unwrap();
    pool.get().unwrap().run_pending_migrations(MIGRATIONS).unwrap();

    let uploads = tempfile::tempdir().unwrap();
    let state = AppState {
        pool,
        key: Key::generate(),
        settings: Arc::new(Settings {
            admin_password: ADMIN_PASSWORD.to_string(),
            init_db_secret: init_db_secret.map(str::to_string),
            upload_dir: uploads.path().to_path_buf(),
        }),
        blobs: Arc::new(
            LocalBlobStore::new(uploads.path(), UPLOADS_PREFIX).unwrap(),
        ),
    };
    (state, uploads)
}

/// A store whose backend is unreachable.
pub struct OfflineBlobStore;

impl BlobStore for OfflineBlobStore {
    fn upload(&self, _: &[u8], _: &str, _: ResourceType) -> Result<String, BlobError> {
        Err(BlobError::Io(std::io::Error::other("storage is offline")))
    }

    fn destroy(&self, _: &str, _: ResourceType) -> Result<(), BlobError> {
        Err(BlobError::Io(std::io::Error::other("storage is offline")))
    }
}

impl TestApp {
    pub fn new() -> TestApp {
        let (state, uploads) = test_state(Some(INIT_SECRET));
        TestApp::from_state(state, uploads)
    }

    pub fn with_blobs(blobs: Arc<dyn BlobStore>) -> TestApp {
        let (mut state, uploads) = test_state(Some(INIT_SECRET));
        state.blobs = blobs;
        TestApp::from_state(state, uploads)
    }

    fn from_state(state: AppState, uploads: TempDir) -> TestApp {
        let pool = state.pool.clone();

        let server = TestServer::new_with_config(
            create_app(state),
            TestServerConfig {
                save_cookies: true,
                ..Default::default()
            },
        )
        .unwrap();

        TestApp {
            server,
            pool,
            uploads,
        }
    }

    /// The pool holds a single connection; drop this before the next request.
    pub fn conn(
        &self,
    ) -> PooledConnection<ConnectionManager<SqliteConnection>> {
        self.pool.get().unwrap()
    }

    pub fn department(&self, name: &str) -> String {
        Department::create(name, &mut self.conn()).unwrap().unwrap().id
    }

    pub fn employee(&self, name: &str, code: &str, department_id: &str) -> String {
        create_user(
            &ValidUser {
                name: name.to_string(),
                email: None,
                access_code: code.to_string(),
                department_id: department_id.to_string(),
            },
            &mut self.conn(),
        )
        .unwrap()
    }

    pub fn question(&self, draft: &QuestionDraft) -> String {
        insert_question(draft, None, &mut self.conn()).unwrap()
    }

    /// Names of the files stored under `folder` of the uploads directory.
    pub fn stored_files(&self, folder: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads.path().join(folder))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn login(&mut self, access_code: &str) {
        self.server.clear_cookies();
        self.server
            .post("/login")
            .form(&[("access_code", access_code)])
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    pub async fn login_admin(&mut self) {
        self.server.clear_cookies();
        self.server
            .post("/admin/login")
            .form(&[("password", ADMIN_PASSWORD)])
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }
}

pub fn days_ago(days: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(days)).unwrap()
}

/// A released multiple-choice question whose answer is `b`.
pub fn multiple_choice(prompt: &str) -> QuestionDraft {
    QuestionDraft {
        kind: QuestionKind::MultipleChoice,
        prompt: prompt.to_string(),
        options: [
            Some("Red".to_string()),
            Some("Green".to_string()),
            Some("Blue".to_string()),
            None,
        ],
        correct_option: Some("b".to_string()),
        release_date: days_ago(1),
        time_limit: Some(30),
        visibility: Visibility::All,
    }
}

pub fn free_text(prompt: &str) -> QuestionDraft {
    QuestionDraft {
        kind: QuestionKind::FreeText,
        prompt: prompt.to_string(),
        options: [None, None, None, None],
        correct_option: None,
        release_date: days_ago(1),
        time_limit: None,
        visibility: Visibility::All,
    }
}

pub fn restricted_to(department_id: &str) -> Visibility {
    Visibility::RestrictedTo(BTreeSet::from([department_id.to_string()]))
}
