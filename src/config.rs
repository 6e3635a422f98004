use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use clap::Parser;
use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool, PoolError},
};
use diesel_migrations::MigrationHarness;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, filter::ParseError};

use crate::{
    MIGRATIONS,
    answers::{
        activities::{activities_page, activity_page, do_submit_activity},
        grading::{corrections_page, do_grade},
        history::my_answers_page,
        quiz::{do_answer, quiz_page},
    },
    auth::{
        admin::{admin_logout, do_admin_login},
        login::{do_login, login_page, logout},
    },
    dashboard::{admin_dashboard, employee_dashboard},
    departments::manage::{do_create_department, do_delete_department},
    import::manage::{do_commit_import, do_upload_sheet, import_preview_page},
    initdb::init_db_route,
    questions::manage::{
        do_create_question, do_delete_question, do_edit_question,
        edit_question_page,
    },
    reports::{
        analytics::analytics_page,
        export::{export_detailed, export_summary},
        ranking::{department_ranking_page, ranking_page},
        reports_page,
    },
    state::{AppState, DbPool, commit_transactions},
    storage::LocalBlobStore,
    users::manage::{do_create_user, do_delete_user, do_edit_user, edit_user_page},
};

/// Public URL prefix that uploaded files are served under.
pub const UPLOADS_PREFIX: &str = "/uploads";

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Corporate quiz and training server")]
pub struct Args {
    /// SQLite database to use (`:memory:` for a throwaway database).
    #[arg(long, env = "DATABASE_URL", default_value = "quizboard.db")]
    pub database_url: String,
    /// Address to listen on.
    #[arg(long, env = "BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,
    /// Key used to encrypt session cookies (at least 64 bytes). A random
    /// key is generated when absent, which logs everybody out on restart.
    #[arg(long, env = "SECRET_KEY")]
    pub secret_key: Option<String>,
    /// Shared password for the administrator area.
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: String,
    /// Secret path segment for `/_init_db/{secret}`. The route is disabled
    /// when unset.
    #[arg(long, env = "INIT_DB_SECRET")]
    pub init_db_secret: Option<String>,
    /// Directory that uploaded images and attachments are written to.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,
    /// Fallback log filter when `RUST_LOG` is not set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info,quizboard=debug")]
    pub log_level: String,
}

/// Runtime settings shared with the request handlers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub admin_password: String,
    pub init_db_secret: Option<String>,
    pub upload_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid log filter `{value}`: {source}")]
    LogFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("could not install the log subscriber: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
    #[error("could not open the database: {0}")]
    Pool(#[from] PoolError),
    #[error("could not run migrations: {0}")]
    Migrations(Box<dyn std::error::Error + Send + Sync>),
    #[error("SECRET_KEY must be at least 64 bytes long")]
    SecretKey,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn init_tracing(log_level: &str) -> Result<(), StartupError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).map_err(|source| {
            StartupError::LogFilter {
                value: log_level.to_string(),
                source,
            }
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .map_err(StartupError::Subscriber)
}

pub fn build_pool(db_url: &str) -> Result<DbPool, StartupError> {
    tracing::info!(location = db_url, "opening database");

    Ok(Pool::builder()
        .max_size(if db_url == ":memory:" { 1 } else { 10 })
        .build(ConnectionManager::<SqliteConnection>::new(db_url))?)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), StartupError> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(StartupError::Migrations)?;
    Ok(())
}

impl AppState {
    pub fn from_args(pool: DbPool, args: &Args) -> Result<Self, StartupError> {
        let key = match &args.secret_key {
            Some(secret) => Key::try_from(secret.as_bytes())
                .map_err(|_| StartupError::SecretKey)?,
            None => {
                tracing::warn!(
                    "SECRET_KEY is not set; sessions will not survive a restart"
                );
                Key::generate()
            }
        };

        let blobs = LocalBlobStore::new(&args.upload_dir, UPLOADS_PREFIX)?;

        Ok(AppState {
            pool,
            key,
            settings: Arc::new(Settings {
                admin_password: args.admin_password.clone(),
                init_db_secret: args.init_db_secret.clone(),
                upload_dir: args.upload_dir.clone(),
            }),
            blobs: Arc::new(blobs),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let employee = Router::new()
        .route("/", get(login_page))
        .route("/login", post(do_login))
        .route("/logout", get(logout))
        .route("/dashboard", get(employee_dashboard))
        .route("/quiz", get(quiz_page))
        .route("/quiz/answer", post(do_answer))
        .route("/activities", get(activities_page))
        .route(
            "/activities/:question_id",
            get(activity_page).post(do_submit_activity),
        )
        .route("/answers", get(my_answers_page))
        .route("/ranking", get(ranking_page))
        .route("/ranking/:department_id", get(department_ranking_page));

    let admin = Router::new()
        .route("/admin", get(admin_dashboard))
        .route("/admin/login", post(do_admin_login))
        .route("/admin/logout", get(admin_logout))
        .route("/admin/departments", post(do_create_department))
        .route("/admin/departments/:id/delete", post(do_delete_department))
        .route("/admin/users", post(do_create_user))
        .route("/admin/users/:id/edit", get(edit_user_page).post(do_edit_user))
        .route("/admin/users/:id/delete", post(do_delete_user))
        .route("/admin/questions", post(do_create_question))
        .route(
            "/admin/questions/:id/edit",
            get(edit_question_page).post(do_edit_question),
        )
        .route("/admin/questions/:id/delete", post(do_delete_question))
        .route("/admin/corrections", get(corrections_page))
        .route("/admin/corrections/:answer_id", post(do_grade))
        .route("/admin/reports", get(reports_page))
        .route("/admin/reports/export", get(export_summary))
        .route("/admin/reports/export_detailed", get(export_detailed))
        .route("/admin/analytics", get(analytics_page))
        .route("/admin/import", post(do_upload_sheet))
        .route(
            "/admin/import/:batch_id",
            get(import_preview_page).post(do_commit_import),
        );

    let uploads = ServeDir::new(&state.settings.upload_dir);

    Router::new()
        .merge(employee)
        .merge(admin)
        .route("/_init_db/:secret", get(init_db_route))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(commit_transactions))
        .nest_service(UPLOADS_PREFIX, uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
