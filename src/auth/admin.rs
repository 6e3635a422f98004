//! The administrator role. There is a single shared administrator password;
//! signing in stores an expiring role token in a private cookie.

use std::sync::Arc;

use axum::{
    Form, async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::request::Parts,
    response::Redirect,
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use chrono::{NaiveDateTime, Utc};
use hypertext::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{ADMIN_COOKIE, AuthError, clear_sessions, session_cookie, session_expiry},
    config::Settings,
    template::Page,
    util_resp::FailureResponse,
    widgets::alert::ErrorAlert,
};

/// Proof that the request comes from a signed-in administrator.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

#[derive(Serialize, Deserialize)]
struct AdminSession {
    expiry: NaiveDateTime,
}

#[async_trait]
impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> =
            PrivateCookieJar::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::NoDatabase)?;

        jar.get(ADMIN_COOKIE)
            .and_then(|cookie| {
                serde_json::from_str::<AdminSession>(cookie.value()).ok()
            })
            .filter(|session| Utc::now().naive_utc() < session.expiry)
            .map(|_| Admin)
            .ok_or(AuthError::Unauthenticated { login: "/admin" })
    }
}

pub struct AdminLoginForm<'r> {
    pub error: Option<&'r str>,
}

impl<'r> Renderable for AdminLoginForm<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="row justify-content-center" {
                div class="col-md-4" {
                    h1 class="h3 mb-3" { "Administrator login" }
                    @if let Some(error) = self.error {
                        ErrorAlert msg=(error);
                    }
                    form method="post" action="/admin/login" {
                        div class="mb-3" {
                            label for="password" class="form-label" { "Password" }
                            input type="password" class="form-control" id="password" name="password" required;
                        }
                        button type="submit" class="btn btn-primary" { "Sign in" }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

#[derive(Deserialize)]
pub struct AdminLoginData {
    password: String,
}

#[tracing::instrument(skip_all)]
pub async fn do_admin_login(
    jar: PrivateCookieJar,
    State(settings): State<Arc<Settings>>,
    Form(form): Form<AdminLoginData>,
) -> Result<(PrivateCookieJar, Redirect), FailureResponse> {
    if form.password != settings.admin_password {
        tracing::warn!("rejected administrator login");
        return Err(FailureResponse::BadRequest(
            Page::new()
                .title("Administration")
                .body(AdminLoginForm {
                    error: Some("Incorrect password."),
                })
                .render(),
        ));
    }

    let token = serde_json::to_string(&AdminSession {
        expiry: session_expiry(),
    })
    .map_err(|e| {
        tracing::error!("could not encode admin session: {e}");
        FailureResponse::ServerError(())
    })?;

    tracing::info!("administrator signed in");
    Ok((jar.add(session_cookie(ADMIN_COOKIE, token)), Redirect::to("/admin")))
}

pub async fn admin_logout(jar: PrivateCookieJar) -> (PrivateCookieJar, Redirect) {
    (clear_sessions(jar), Redirect::to("/admin"))
}
