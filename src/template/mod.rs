//! Templating code.
//!
//! This defines the [`Page`] item, which wraps every HTML response with the
//! document head and the navigation bar for whoever is signed in.

use hypertext::prelude::*;

use crate::users::User;

pub struct Page<R: Renderable> {
    body: Option<R>,
    user: Option<User>,
    admin: bool,
    title: Option<String>,
}

impl<R: Renderable> Page<R> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn body(mut self, body: R) -> Self {
        self.body = Some(body);
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn user_opt(mut self, user: Option<User>) -> Self {
        self.user = user;
        self
    }

    /// Shows the administrator navigation.
    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl<R: Renderable> Renderable for Page<R> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            html {
                head {
                    meta charset="utf-8";
                    title {
                        @if let Some(title) = &self.title {
                            (title) " | "
                        }
                        "Quizboard"
                    }
                    link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet";
                    meta
                        name="viewport"
                        content="width=device-width, initial-scale=1";
                }
                body class="d-flex flex-column vh-100" {
                    nav class="navbar navbar-expand"
                        style="background-color: #1f4e79;"
                        data-bs-theme="dark" {
                        div class="container-fluid" {
                            @if self.admin {
                                a class="navbar-brand text-white" href="/admin" { "Quizboard admin" }
                                ul class="navbar-nav" style="display: flex; gap: 1rem;" {
                                    li class="nav-item" { a class="nav-link text-white" href="/admin" { "Dashboard" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/admin/corrections" { "Corrections" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/admin/reports" { "Reports" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/admin/analytics" { "Analytics" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/admin/logout" { "Log out" } }
                                }
                            } @else if let Some(user) = &self.user {
                                a class="navbar-brand text-white" href="/dashboard" { "Quizboard" }
                                ul class="navbar-nav" style="display: flex; gap: 1rem;" {
                                    li class="nav-item" { a class="nav-link text-white" href="/quiz" { "Quiz" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/activities" { "Activities" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/answers" { "My answers" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/ranking" { "Ranking" } }
                                    li class="nav-item" { span class="nav-link text-white-50" { (user.name) } }
                                    li class="nav-item" { a class="nav-link text-white" href="/logout" { "Log out" } }
                                }
                            } @else {
                                a class="navbar-brand text-white" href="/" { "Quizboard" }
                                ul class="navbar-nav" style="display: flex; gap: 1rem;" {
                                    li class="nav-item" { a class="nav-link text-white" href="/" { "Employee login" } }
                                    li class="nav-item" { a class="nav-link text-white" href="/admin" { "Administration" } }
                                }
                            }
                        }
                    }
                    div class="container flex-grow-1 py-4" {
                        @if let Some(body) = &self.body {
                            (body)
                        }
                    }
                }
            }
        }.render_to(buffer)
    }
}

impl<R: Renderable> Default for Page<R> {
    fn default() -> Self {
        Self {
            body: Default::default(),
            user: Default::default(),
            admin: false,
            title: Default::default(),
        }
    }
}
