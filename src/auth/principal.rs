use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::models::{Staff, Student};
use crate::schema::{roles, staff, students};

use super::password;

/// An authenticated actor. Staff and students live in disjoint tables but
/// share one identity shape once loaded.
pub enum Principal {
    Staff { record: Staff, role: String },
    Student { record: Student, role: String },
}

impl Principal {
    pub fn id(&self) -> &str {
        match self {
            Principal::Staff { record, .. } => &record.id,
            Principal::Student { record, .. } => &record.id,
        }
    }

    pub fn role(&self) -> &str {
        match self {
            Principal::Staff { role, .. } => role,
            Principal::Student { role, .. } => role,
        }
    }

    pub fn firstname(&self) -> &str {
        match self {
            Principal::Staff { record, .. } => &record.firstname,
            Principal::Student { record, .. } => &record.firstname,
        }
    }

    pub fn lastname(&self) -> &str {
        match self {
            Principal::Staff { record, .. } => &record.lastname,
            Principal::Student { record, .. } => &record.lastname,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname(), self.lastname())
    }

    fn password_hash(&self) -> &str {
        match self {
            Principal::Staff { record, .. } => &record.password_hash,
            Principal::Student { record, .. } => &record.password_hash,
        }
    }
}

/// Credential check across both principal tables, staff first. A username
/// hit with a wrong password falls through to the next table, and every
/// failure path yields `None` so callers cannot tell which part was wrong.
pub fn authenticate(
    conn: &mut PgConnection,
    username: &str,
    password: &str,
) -> QueryResult<Option<Principal>> {
    let staff_match = staff::table
        .inner_join(roles::table)
        .filter(staff::id.eq(username))
        .select((staff::all_columns, roles::name))
        .first::<(Staff, String)>(conn)
        .optional()?;

    if let Some((record, role)) = staff_match {
        let principal = Principal::Staff { record, role };
        if password::verify_password(password, principal.password_hash()).unwrap_or(false) {
            return Ok(Some(principal));
        }
    }

    let student_match = students::table
        .inner_join(roles::table)
        .filter(students::id.eq(username))
        .select((students::all_columns, roles::name))
        .first::<(Student, String)>(conn)
        .optional()?;

    if let Some((record, role)) = student_match {
        let principal = Principal::Student { record, role };
        if password::verify_password(password, principal.password_hash()).unwrap_or(false) {
            return Ok(Some(principal));
        }
    }

    Ok(None)
}
