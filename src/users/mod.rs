use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{schema::users, util_resp::FailureResponse};

pub mod manage;

#[derive(Debug, Queryable, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub access_code: String,
    pub department_id: String,
}

impl User {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<User, FailureResponse> {
        users::table
            .filter(users::id.eq(id))
            .first::<User>(conn)
            .optional()?
            .ok_or(FailureResponse::NotFound(()))
    }

    pub fn by_access_code(
        code: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Option<User>, diesel::result::Error> {
        users::table
            .filter(users::access_code.eq(code))
            .first::<User>(conn)
            .optional()
    }
}
