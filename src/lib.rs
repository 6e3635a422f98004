//! Quizboard: a corporate training service where employees answer timed
//! quizzes and free-text activities, and administrators manage the question
//! bank, grade written answers and export reports.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod answers;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod departments;
pub mod import;
pub mod initdb;
pub mod questions;
pub mod reports;
pub mod schema;
pub mod sheet;
pub mod state;
pub mod storage;
pub mod template;
pub mod users;
pub mod util_resp;
pub mod validation;
pub mod widgets;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
