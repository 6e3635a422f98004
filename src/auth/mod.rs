use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use chrono::{Days, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    schema::users,
    state::{DbPool, ThreadSafeConn},
    users::User,
};

pub mod admin;
pub mod login;

pub const LOGIN_COOKIE: &str = "quizboard_session";
pub const ADMIN_COOKIE: &str = "quizboard_admin";

const SESSION_DAYS: u64 = 7;

#[derive(Debug)]
pub enum AuthError {
    /// Not signed in (or the session expired). Carries the login page to
    /// send the visitor to.
    Unauthenticated { login: &'static str },
    NoDatabase,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthenticated { login } => {
                Redirect::to(login).into_response()
            }
            AuthError::NoDatabase => {
                crate::util_resp::FailureResponse::ServerError(()).into_response()
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct LoginSession {
    id: String,
    expiry: NaiveDateTime,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
    DbPool: FromRef<S>,
    Key: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let unauthenticated = AuthError::Unauthenticated { login: "/" };

        let jar: PrivateCookieJar<Key> =
            PrivateCookieJar::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::NoDatabase)?;

        let login = jar
            .get(LOGIN_COOKIE)
            .and_then(|cookie| {
                serde_json::from_str::<LoginSession>(cookie.value()).ok()
            })
            .filter(|session| Utc::now().naive_utc() < session.expiry)
            .ok_or(AuthError::Unauthenticated { login: "/" })?;

        let conn_wrapper =
            ThreadSafeConn::<true>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::NoDatabase)?;

        let mut conn = conn_wrapper
            .inner
            .try_lock()
            .map_err(|_| AuthError::NoDatabase)?;

        let user = users::table
            .filter(users::id.eq(login.id))
            .first::<User>(&mut *conn)
            .optional()
            .map_err(|_| AuthError::NoDatabase)?;

        user.ok_or(unauthenticated)
    }
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn session_expiry() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.checked_add_days(Days::new(SESSION_DAYS)).unwrap_or(now)
}

pub fn set_login_cookie(id: String, jar: PrivateCookieJar) -> PrivateCookieJar {
    let session = LoginSession {
        id,
        expiry: session_expiry(),
    };
    match serde_json::to_string(&session) {
        Ok(value) => jar.add(session_cookie(LOGIN_COOKIE, value)),
        Err(e) => {
            tracing::error!("could not encode login session: {e}");
            jar
        }
    }
}

/// Removes both the employee and the administrator session.
pub fn clear_sessions(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(LOGIN_COOKIE).path("/"))
        .remove(Cookie::build(ADMIN_COOKIE).path("/"))
}
