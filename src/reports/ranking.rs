use std::{cmp::Ordering, collections::HashMap};

use axum::{extract::Path, response::Redirect};
use diesel::{connection::LoadConnection, sqlite::Sqlite};
use hypertext::prelude::*;

use crate::{
    auth::admin::Admin,
    departments::Department,
    reports::{UserSummary, user_summaries},
    state::Conn,
    template::Page,
    users::User,
    util_resp::{StandardResponse, see_other_ok, success},
};

#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentStanding {
    pub id: String,
    pub name: String,
    pub members: i64,
    pub total_points: i64,
}

impl DepartmentStanding {
    /// Points per member.
    pub fn score(&self) -> f64 {
        if self.members == 0 {
            0.0
        } else {
            self.total_points as f64 / self.members as f64
        }
    }

    pub fn display_score(&self) -> i64 {
        self.score().round() as i64
    }
}

/// Sorts by score, highest first. The sort is stable, so departments with
/// equal scores keep the order they were given in.
pub fn rank_departments(mut standings: Vec<DepartmentStanding>) -> Vec<DepartmentStanding> {
    standings.sort_by(|a, b| {
        b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal)
    });
    standings
}

/// Standings of every department that has members, built from per-user
/// summaries.
pub fn standings(
    departments: &[Department],
    summaries: &[UserSummary],
) -> Vec<DepartmentStanding> {
    let mut totals: HashMap<&str, (i64, i64)> = HashMap::new();
    for s in summaries {
        let entry = totals.entry(s.department_id.as_str()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(s.total_points);
    }

    departments
        .iter()
        .filter_map(|d| {
            let (members, total_points) = totals.get(d.id.as_str()).copied()?;
            Some(DepartmentStanding {
                id: d.id.clone(),
                name: d.name.clone(),
                members,
                total_points,
            })
        })
        .collect()
}

pub fn department_ranking(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<DepartmentStanding>, diesel::result::Error> {
    let departments = Department::all(&mut *conn)?;
    let summaries = user_summaries(None, conn)?;
    Ok(rank_departments(standings(&departments, &summaries)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberStanding {
    pub name: String,
    pub total_points: i64,
    pub total_answers: i64,
    pub hits: i64,
}

impl MemberStanding {
    /// Share of answers that earned points, to one decimal place.
    pub fn hit_percentage(&self) -> f64 {
        if self.total_answers == 0 {
            return 0.0;
        }
        let pct = self.hits as f64 / self.total_answers as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }
}

/// Members of one department by name.
pub fn member_ranking(
    department_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Vec<MemberStanding>, diesel::result::Error> {
    Ok(user_summaries(Some(department_id), conn)?
        .into_iter()
        .map(|s| MemberStanding {
            name: s.name,
            total_points: s.total_points,
            total_answers: s.total_answers,
            hits: s.hits,
        })
        .collect())
}

pub async fn ranking_page(user: User, mut conn: Conn<true>) -> StandardResponse {
    let ranking = department_ranking(&mut *conn)?;

    success(
        Page::new()
            .user(user)
            .title("Ranking")
            .body(maud! {
                h1 class="h3 mb-3" { "Department ranking" }
                p class="text-muted" { "Points per member. Select a department to see its members." }
                table class="table" {
                    thead {
                        tr {
                            th { "#" }
                            th { "Department" }
                            th { "Members" }
                            th { "Total points" }
                            th { "Points per member" }
                        }
                    }
                    tbody {
                        @for (i, d) in ranking.iter().enumerate() {
                            tr {
                                td { (i + 1) }
                                td { a href=(format!("/ranking/{}", d.id)) { (d.name) } }
                                td { (d.members) }
                                td { (d.total_points) }
                                td { strong { (d.display_score()) } }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

/// Open to employees and to administrators.
pub async fn department_ranking_page(
    user: Option<User>,
    admin: Option<Admin>,
    Path(department_id): Path<String>,
    mut conn: Conn<true>,
) -> StandardResponse {
    if user.is_none() && admin.is_none() {
        return see_other_ok(Redirect::to("/"));
    }

    let department = Department::fetch(&department_id, &mut *conn)?;
    let members = member_ranking(&department.id, &mut *conn)?;

    let page = Page::new().user_opt(user);
    let page = if admin.is_some() { page.admin() } else { page };

    success(
        page.title(department.name.clone())
            .body(maud! {
                h1 class="h3 mb-3" { (department.name) }
                table class="table" {
                    thead {
                        tr {
                            th { "Employee" }
                            th { "Points" }
                            th { "Answers" }
                            th { "Scored answers" }
                            th { "Hit rate" }
                        }
                    }
                    tbody {
                        @for m in &members {
                            tr {
                                td { (m.name) }
                                td { (m.total_points) }
                                td { (m.total_answers) }
                                td { (m.hits) }
                                td { (format!("{:.1}%", m.hit_percentage())) }
                            }
                        }
                    }
                }
                a class="btn btn-link" href="/ranking" { "Back to the ranking" }
            })
            .render(),
    )
}
