//! Wiping the database and loading the starting departments and employees.

use std::sync::Arc;

use axum::extract::{Path, State};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use diesel_migrations::MigrationHarness;
use hypertext::prelude::*;
use uuid::Uuid;

use crate::{
    MIGRATIONS,
    config::Settings,
    schema::{departments, users},
    state::Conn,
    template::Page,
    util_resp::{FailureResponse, StandardResponse, success, unauthorized},
    widgets::alert::SuccessAlert,
};

/// Departments with their employees as `(name, access code, email)`.
pub const SEED: &[(&str, &[(&str, &str, &str)])] = &[
    (
        "Suporte",
        &[
            ("Ana Oliveira", "1234", "ana.oliveira@empresa.com"),
            ("Bruno Costa", "5678", "bruno.costa@empresa.com"),
        ],
    ),
    (
        "Vendas",
        &[
            ("Carlos Dias", "9012", "carlos.dias@empresa.com"),
            ("Daniela Lima", "3456", "daniela.lima@empresa.com"),
        ],
    ),
    (
        "CSM",
        &[
            ("Eduardo Martins", "1111", "eduardo.martins@empresa.com"),
            ("Fernanda Souza", "2222", "fernanda.souza@empresa.com"),
        ],
    ),
    (
        "ISM",
        &[("Gustavo Pereira", "3333", "gustavo.pereira@empresa.com")],
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("migration failed: {0}")]
    Migrations(Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

pub fn seed(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<(), diesel::result::Error> {
    for &(department, members) in SEED {
        let department_id = Uuid::now_v7().to_string();
        diesel::insert_into(departments::table)
            .values((
                departments::id.eq(&department_id),
                departments::name.eq(department),
            ))
            .execute(&mut *conn)?;

        for &(name, access_code, email) in members {
            diesel::insert_into(users::table)
                .values((
                    users::id.eq(Uuid::now_v7().to_string()),
                    users::name.eq(name),
                    users::email.eq(Some(email)),
                    users::access_code.eq(access_code),
                    users::department_id.eq(&department_id),
                ))
                .execute(&mut *conn)?;
        }
    }
    Ok(())
}

/// Drops every table, recreates the schema and seeds it.
pub fn reset_database<C>(conn: &mut C) -> Result<(), ResetError>
where
    C: MigrationHarness<Sqlite> + LoadConnection<Backend = Sqlite>,
{
    conn.revert_all_migrations(MIGRATIONS)
        .map_err(ResetError::Migrations)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(ResetError::Migrations)?;
    conn.transaction(|conn| seed(conn))?;

    tracing::info!(
        departments = SEED.len(),
        users = SEED.iter().map(|(_, m)| m.len()).sum::<usize>(),
        "database reset"
    );
    Ok(())
}

/// Disabled unless an init secret is configured.
#[tracing::instrument(skip_all)]
pub async fn init_db_route(
    Path(secret): Path<String>,
    State(settings): State<Arc<Settings>>,
    mut conn: Conn<false>,
) -> StandardResponse {
    match &settings.init_db_secret {
        Some(expected) if *expected == secret => {}
        _ => {
            tracing::warn!("rejected database reset");
            return unauthorized();
        }
    }

    reset_database(&mut *conn).map_err(|e| {
        tracing::error!("database reset failed: {e}");
        FailureResponse::ServerError(())
    })?;

    success(
        Page::new()
            .title("Database reset")
            .body(maud! {
                SuccessAlert msg=("The database was reset and seeded.");
                a class="btn btn-primary" href="/" { "Go to the login page" }
            })
            .render(),
    )
}
