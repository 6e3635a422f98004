use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    schema::{departments, question_departments, users},
    util_resp::FailureResponse,
};

pub mod manage;

#[derive(Debug, Queryable, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CreateDepartmentError {
    EmptyName,
    Duplicate,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Department),
    /// Departments with members are kept.
    HasMembers { department: Department, members: i64 },
}

impl Department {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Department, FailureResponse> {
        departments::table
            .filter(departments::id.eq(id))
            .first::<Department>(conn)
            .optional()?
            .ok_or(FailureResponse::NotFound(()))
    }

    /// All departments, by name.
    pub fn all(
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Vec<Department>, diesel::result::Error> {
        departments::table
            .order_by((departments::name.asc(), departments::id.asc()))
            .load::<Department>(conn)
    }

    pub fn create(
        name: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Result<Department, CreateDepartmentError>, diesel::result::Error>
    {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Err(CreateDepartmentError::EmptyName));
        }

        let taken = diesel::select(diesel::dsl::exists(
            departments::table.filter(departments::name.eq(name)),
        ))
        .get_result::<bool>(&mut *conn)?;
        if taken {
            return Ok(Err(CreateDepartmentError::Duplicate));
        }

        let department = Department {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
        };
        diesel::insert_into(departments::table)
            .values((
                departments::id.eq(&department.id),
                departments::name.eq(&department.name),
            ))
            .execute(conn)?;

        Ok(Ok(department))
    }

    pub fn member_count(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<i64, diesel::result::Error> {
        users::table
            .filter(users::department_id.eq(&self.id))
            .count()
            .get_result(conn)
    }

    /// Deletes the department unless somebody still belongs to it.
    pub fn delete(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<DeleteOutcome, FailureResponse> {
        let department = Department::fetch(id, &mut *conn)?;

        let members = department.member_count(&mut *conn)?;
        if members > 0 {
            return Ok(DeleteOutcome::HasMembers {
                department,
                members,
            });
        }

        diesel::delete(
            question_departments::table
                .filter(question_departments::department_id.eq(id)),
        )
        .execute(&mut *conn)?;
        diesel::delete(departments::table.filter(departments::id.eq(id)))
            .execute(conn)?;

        Ok(DeleteOutcome::Deleted(department))
    }
}
