use std::collections::BTreeMap;
use std::path::Path as FsPath;

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::NaiveDateTime;
use diesel::dsl::max;
use diesel::{prelude::*, PgConnection};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedPrincipal;
use crate::error::{AppError, AppResult};
use crate::models::{DocumentType, RequirementType};
use crate::schema::{
    attachments, document_types, request_status_history, requests, requirement_types, statuses,
    students,
};
use crate::state::AppState;
use crate::workflow::{self, NewRequestSpec};

const PAGE_SIZE: i64 = 20;
const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;
const ALLOWED_ATTACHMENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "application/pdf",
];

diesel::alias!(request_status_history as latest_entry: LatestEntry);

#[derive(Serialize)]
pub struct RequestView {
    pub id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<String>,
    pub document: String,
    pub purpose: String,
    pub date_requested: String,
    pub status: String,
    pub status_id: i32,
}

#[derive(Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
    pub today_count: i64,
}

#[derive(Serialize)]
pub struct CreateRequestResponse {
    pub success: bool,
    pub id: i32,
}

#[derive(Serialize)]
pub struct AdvanceResponse {
    pub success: bool,
    pub message: String,
    pub new_status_id: i32,
}

#[derive(Serialize)]
pub struct AttachmentView {
    pub filepath: String,
    pub requirement_type: Option<String>,
    pub created_at: NaiveDateTime,
}

struct UploadedFile {
    bytes: Vec<u8>,
    original_name: String,
    content_type: Option<String>,
}

/// Requests of the authenticated student, annotated with the current
/// (highest-id history row) status, newest first.
pub async fn list_my_requests(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<Vec<RequestView>>> {
    let mut conn = state.db()?;

    let latest_id = latest_entry
        .filter(
            latest_entry
                .field(request_status_history::request_id)
                .eq(requests::id),
        )
        .select(max(latest_entry.field(request_status_history::id)))
        .single_value();

    let rows: Vec<(i32, String, NaiveDateTime, String, String, i32)> = requests::table
        .inner_join(document_types::table)
        .inner_join(request_status_history::table.inner_join(statuses::table))
        .filter(request_status_history::id.nullable().eq(latest_id))
        .filter(requests::student_id.eq(&principal.principal_id))
        .order((requests::created_at.desc(), requests::id.desc()))
        .select((
            requests::id,
            requests::purpose,
            requests::created_at,
            document_types::name,
            statuses::name,
            statuses::id,
        ))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(id, purpose, created_at, document, status, status_id)| RequestView {
                id,
                student: None,
                document,
                purpose,
                date_requested: created_at.date().to_string(),
                status,
                status_id,
            })
            .collect(),
    ))
}

/// All requests across students for the registrar dashboard, newest
/// first, capped at one page.
pub async fn list_all_requests(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<Vec<RequestView>>> {
    principal.require_staff()?;
    let mut conn = state.db()?;

    let latest_id = latest_entry
        .filter(
            latest_entry
                .field(request_status_history::request_id)
                .eq(requests::id),
        )
        .select(max(latest_entry.field(request_status_history::id)))
        .single_value();

    let rows: Vec<(
        i32,
        String,
        String,
        String,
        NaiveDateTime,
        String,
        String,
        i32,
    )> = requests::table
        .inner_join(document_types::table)
        .inner_join(students::table)
        .inner_join(request_status_history::table.inner_join(statuses::table))
        .filter(request_status_history::id.nullable().eq(latest_id))
        .order((requests::created_at.desc(), requests::id.desc()))
        .limit(PAGE_SIZE)
        .select((
            requests::id,
            students::firstname,
            students::lastname,
            requests::purpose,
            requests::created_at,
            document_types::name,
            statuses::name,
            statuses::id,
        ))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(
                |(id, firstname, lastname, purpose, created_at, document, status, status_id)| {
                    RequestView {
                        id,
                        student: Some(format!("{firstname} {lastname}")),
                        document,
                        purpose,
                        date_requested: created_at.date().to_string(),
                        status,
                        status_id,
                    }
                },
            )
            .collect(),
    ))
}

/// Per-status counts over the *current* status of every request. Statuses
/// with no current request are omitted rather than zero-filled.
pub async fn request_stats(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<Vec<StatusCount>>> {
    principal.require_staff()?;
    let mut conn = state.db()?;

    let latest_id = latest_entry
        .filter(
            latest_entry
                .field(request_status_history::request_id)
                .eq(requests::id),
        )
        .select(max(latest_entry.field(request_status_history::id)))
        .single_value();

    let rows: Vec<(NaiveDateTime, i32, String)> = requests::table
        .inner_join(request_status_history::table.inner_join(statuses::table))
        .filter(request_status_history::id.nullable().eq(latest_id))
        .select((requests::created_at, statuses::id, statuses::name))
        .load(&mut conn)?;

    let today = state.clock.now_utc().date_naive();
    let mut by_status: BTreeMap<i32, (String, i64, i64)> = BTreeMap::new();
    for (created_at, status_id, status_name) in rows {
        let entry = by_status
            .entry(status_id)
            .or_insert_with(|| (status_name, 0, 0));
        entry.1 += 1;
        if created_at.date() == today {
            entry.2 += 1;
        }
    }

    Ok(Json(
        by_status
            .into_values()
            .map(|(status, count, today_count)| StatusCount {
                status,
                count,
                today_count,
            })
            .collect(),
    ))
}

/// Submits a document request: multipart form with `document_type_id`,
/// `purpose`, and zero or more `attachment` files, each paired in order
/// with a `requirement_type_id` field.
pub async fn create_request(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<CreateRequestResponse>)> {
    let mut document_type_id: Option<i32> = None;
    let mut purpose: Option<String> = None;
    let mut files: Vec<UploadedFile> = Vec::new();
    let mut requirement_ids: Vec<i32> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("document_type_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid document type: {err}")))?;
                let parsed = value
                    .trim()
                    .parse()
                    .map_err(|_| AppError::bad_request("document_type_id must be an integer"))?;
                document_type_id = Some(parsed);
            }
            Some("purpose") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid purpose: {err}")))?;
                purpose = Some(value);
            }
            Some("attachment") => {
                let original_name = field
                    .file_name()
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                let content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read attachment bytes");
                    AppError::bad_request(format!("failed to read attachment: {err}"))
                })?;
                files.push(UploadedFile {
                    bytes: data.to_vec(),
                    original_name,
                    content_type,
                });
            }
            Some("requirement_type_id") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid requirement type: {err}"))
                })?;
                let parsed = value.trim().parse().map_err(|_| {
                    AppError::bad_request("requirement_type_id must be an integer")
                })?;
                requirement_ids.push(parsed);
            }
            _ => {}
        }
    }

    let document_type_id =
        document_type_id.ok_or_else(|| AppError::bad_request("document_type_id is required"))?;
    let purpose = purpose
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("purpose is required"))?;

    if files.len() != requirement_ids.len() {
        return Err(AppError::bad_request(
            "every attachment must be paired with a requirement_type_id",
        ));
    }

    for file in &files {
        if file.bytes.is_empty() {
            return Err(AppError::bad_request("attachments must not be empty"));
        }
        if file.bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(AppError::bad_request(
                "attachment exceeds the 5MB size limit",
            ));
        }
        let allowed = file
            .content_type
            .as_deref()
            .map(|ct| ALLOWED_ATTACHMENT_TYPES.contains(&ct))
            .unwrap_or(false);
        if !allowed {
            return Err(AppError::bad_request(
                "invalid attachment type; only JPG, PNG, GIF, and PDF files are allowed",
            ));
        }
    }

    let mut conn = state.db()?;

    let document_type: DocumentType = document_types::table
        .find(document_type_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("unknown document type"))?;

    let tagged_names = resolve_requirement_names(&mut conn, &requirement_ids)?;
    check_required_attachments(&document_type.name, &tagged_names)?;

    // Files land in storage before the transaction; rows reference them.
    let mut stored: Vec<(String, Option<i32>)> = Vec::with_capacity(files.len());
    for (file, requirement_id) in files.into_iter().zip(requirement_ids) {
        let key = storage_key(&file.original_name, file.content_type.as_deref());
        if let Err(err) = state.storage.put_object(&key, file.bytes).await {
            cleanup_stored(&state, &stored).await;
            return Err(AppError::internal(format!(
                "failed to store attachment: {err}"
            )));
        }
        stored.push((key, Some(requirement_id)));
    }

    let now = state.clock.now_utc().naive_utc();
    let spec = NewRequestSpec {
        student_id: principal.principal_id.clone(),
        document_type_id,
        purpose,
        attachments: stored.clone(),
    };

    let request_id = match workflow::create_request(&mut conn, &state.transitions, now, spec) {
        Ok(request_id) => request_id,
        Err(err) => {
            error!(error = %err, student_id = %principal.principal_id, "request creation failed");
            cleanup_stored(&state, &stored).await;
            return Err(AppError::from(err));
        }
    };

    info!(
        request_id,
        student_id = %principal.principal_id,
        document = %document_type.name,
        attachments = stored.len(),
        "document request created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateRequestResponse {
            success: true,
            id: request_id,
        }),
    ))
}

/// Moves a request one step along Pending -> Processed -> Signatory ->
/// Release -> Released. Released is terminal.
pub async fn advance_request(
    State(state): State<AppState>,
    Path(request_id): Path<i32>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<AdvanceResponse>> {
    principal.require_staff()?;
    let mut conn = state.db()?;

    let now = state.clock.now_utc().naive_utc();
    let advanced = workflow::advance(&mut conn, &state.transitions, now, request_id)?;

    info!(
        request_id,
        new_status_id = advanced.new_status_id,
        "request advanced"
    );

    Ok(Json(AdvanceResponse {
        success: true,
        message: advanced.message.to_string(),
        new_status_id: advanced.new_status_id,
    }))
}

/// Attachments of one request in upload order. The requirement type is
/// null when its catalog row has since been deleted.
pub async fn list_attachments(
    State(state): State<AppState>,
    Path(request_id): Path<i32>,
    principal: AuthenticatedPrincipal,
) -> AppResult<Json<Vec<AttachmentView>>> {
    principal.require_staff()?;
    let mut conn = state.db()?;

    requests::table
        .find(request_id)
        .select(requests::id)
        .first::<i32>(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    let rows: Vec<(String, Option<String>, NaiveDateTime)> = attachments::table
        .left_join(requirement_types::table)
        .filter(attachments::request_id.eq(request_id))
        .order((attachments::created_at.asc(), attachments::id.asc()))
        .select((
            attachments::filepath,
            requirement_types::name.nullable(),
            attachments::created_at,
        ))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(filepath, requirement_type, created_at)| AttachmentView {
                filepath,
                requirement_type,
                created_at,
            })
            .collect(),
    ))
}

fn resolve_requirement_names(
    conn: &mut PgConnection,
    requirement_ids: &[i32],
) -> AppResult<Vec<String>> {
    if requirement_ids.is_empty() {
        return Ok(Vec::new());
    }

    let known: Vec<RequirementType> = requirement_types::table
        .filter(requirement_types::id.eq_any(requirement_ids))
        .load(conn)?;

    requirement_ids
        .iter()
        .map(|id| {
            known
                .iter()
                .find(|requirement| requirement.id == *id)
                .map(|requirement| requirement.name.clone())
                .ok_or_else(|| AppError::bad_request("unknown requirement type"))
        })
        .collect()
}

/// Server-side copy of the attachment gating the original client enforced:
/// Diploma requests need an Affidavit of Loss, CAV requests need a Diploma.
fn check_required_attachments(document_name: &str, tagged_names: &[String]) -> AppResult<()> {
    let document = document_name.to_lowercase();

    let required = if document.contains("diploma") {
        Some(("affidavit", "Diploma requests require an Affidavit of Loss attachment"))
    } else if document.contains("cav") {
        Some(("diploma", "CAV requests require a Diploma attachment"))
    } else {
        None
    };

    if let Some((needle, message)) = required {
        let satisfied = tagged_names
            .iter()
            .any(|name| name.to_lowercase().contains(needle));
        if !satisfied {
            return Err(AppError::bad_request(message));
        }
    }

    Ok(())
}

fn storage_key(original_name: &str, content_type: Option<&str>) -> String {
    let extension = FsPath::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .or_else(|| {
            content_type.and_then(|ct| {
                mime_guess::get_mime_extensions_str(ct)
                    .and_then(|exts| exts.first())
                    .map(|ext| ext.to_string())
            })
        });

    match extension {
        Some(extension) => format!("attachments/{}.{}", Uuid::new_v4(), extension),
        None => format!("attachments/{}", Uuid::new_v4()),
    }
}

async fn cleanup_stored(state: &AppState, stored: &[(String, Option<i32>)]) {
    for (key, _) in stored {
        if let Err(err) = state.storage.delete_object(key).await {
            warn!(key = %key, error = %err, "failed to clean up stored attachment");
        }
    }
}
