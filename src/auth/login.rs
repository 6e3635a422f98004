use axum::{Form, response::Redirect};
use axum_extra::extract::PrivateCookieJar;
use hypertext::prelude::*;
use serde::Deserialize;

use crate::{
    auth::{clear_sessions, set_login_cookie},
    state::Conn,
    template::Page,
    users::User,
    util_resp::{FailureResponse, StandardResponse, see_other_ok, success},
    widgets::alert::ErrorAlert,
};

struct LoginForm<'r> {
    error: Option<&'r str>,
}

impl<'r> Renderable for LoginForm<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="row justify-content-center" {
                div class="col-md-4" {
                    h1 class="h3 mb-3" { "Employee login" }
                    @if let Some(error) = self.error {
                        ErrorAlert msg=(error);
                    }
                    form method="post" action="/login" {
                        div class="mb-3" {
                            label for="access_code" class="form-label" { "Access code" }
                            input type="password" class="form-control" id="access_code"
                                name="access_code" maxlength="4" autofocus required;
                        }
                        button type="submit" class="btn btn-primary" { "Enter" }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

pub async fn login_page(user: Option<User>) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to("/dashboard"));
    }

    success(
        Page::new()
            .title("Login")
            .body(LoginForm { error: None })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct LoginData {
    access_code: String,
}

#[tracing::instrument(skip_all)]
pub async fn do_login(
    jar: PrivateCookieJar,
    mut conn: Conn<true>,
    Form(form): Form<LoginData>,
) -> Result<(PrivateCookieJar, Redirect), FailureResponse> {
    let code = form.access_code.trim();

    match User::by_access_code(code, &mut *conn)? {
        Some(user) => {
            tracing::info!(user = %user.id, "employee signed in");
            let jar = set_login_cookie(user.id, jar);
            Ok((jar, Redirect::to("/dashboard")))
        }
        None => Err(FailureResponse::BadRequest(
            Page::new()
                .title("Login")
                .body(LoginForm {
                    error: Some("Invalid access code."),
                })
                .render(),
        )),
    }
}

pub async fn logout(jar: PrivateCookieJar) -> (PrivateCookieJar, Redirect) {
    (clear_sessions(jar), Redirect::to("/"))
}
