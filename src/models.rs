use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = staff)]
pub struct Staff {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = staff)]
pub struct NewStaff {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = students)]
pub struct Student {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub password_hash: String,
    pub role_id: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub password_hash: String,
    pub role_id: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_types)]
pub struct DocumentType {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = requirement_types)]
pub struct RequirementType {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = statuses)]
pub struct Status {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = requests)]
#[diesel(belongs_to(Student))]
#[diesel(belongs_to(DocumentType))]
pub struct Request {
    pub id: i32,
    pub student_id: String,
    pub document_type_id: i32,
    pub purpose: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = requests)]
pub struct NewRequest {
    pub student_id: String,
    pub document_type_id: i32,
    pub purpose: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = request_status_history)]
#[diesel(belongs_to(Request))]
#[diesel(belongs_to(Status))]
pub struct StatusHistoryEntry {
    pub id: i32,
    pub request_id: i32,
    pub status_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = request_status_history)]
pub struct NewStatusHistoryEntry {
    pub request_id: i32,
    pub status_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = attachments)]
#[diesel(belongs_to(Request))]
pub struct Attachment {
    pub id: i32,
    pub request_id: i32,
    pub requirement_type_id: Option<i32>,
    pub filepath: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub request_id: i32,
    pub requirement_type_id: Option<i32>,
    pub filepath: String,
    pub created_at: NaiveDateTime,
}
