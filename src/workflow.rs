use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;

use crate::models::{NewAttachment, NewRequest, NewStatusHistoryEntry, Status};
use crate::schema::{attachments, request_status_history, requests, statuses};

/// Lifecycle order of the status catalog. Requests only ever move forward
/// through this sequence; the last entry is terminal.
pub const STATUS_ORDER: [&str; 5] = ["Pending", "Processed", "Signatory", "Release", "Released"];

const TRANSITION_MESSAGES: [&str; 4] = [
    "Request processed successfully",
    "Request sent to signatory successfully",
    "Request release successfully",
    "Document released successfully",
];

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("request not found")]
    NotFound,
    #[error("invalid status transition")]
    InvalidTransition,
    #[error("status catalog misconfigured: {0}")]
    Configuration(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Status ids for the advancement sequence, resolved by name from the
/// catalog once at startup. Advancement never depends on literal ids, so
/// reseeding or reordering the catalog cannot silently change the order.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    ordered: Vec<Status>,
}

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub next_status_id: i32,
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Advanced {
    pub new_status_id: i32,
    pub message: &'static str,
}

impl TransitionTable {
    pub fn load(conn: &mut PgConnection) -> WorkflowResult<Self> {
        let catalog: Vec<Status> = statuses::table.load(conn)?;
        Self::from_catalog(&catalog)
    }

    pub fn from_catalog(catalog: &[Status]) -> WorkflowResult<Self> {
        let mut ordered = Vec::with_capacity(STATUS_ORDER.len());
        for name in STATUS_ORDER {
            let status = catalog
                .iter()
                .find(|status| status.name == name)
                .ok_or_else(|| {
                    WorkflowError::Configuration(format!("status '{name}' missing from catalog"))
                })?;
            ordered.push(status.clone());
        }
        Ok(Self { ordered })
    }

    /// Initial status for newly created requests.
    pub fn pending_id(&self) -> i32 {
        self.ordered[0].id
    }

    pub fn terminal_id(&self) -> i32 {
        self.ordered[self.ordered.len() - 1].id
    }

    /// Next legal step from `status_id`, or `None` when the status is
    /// terminal or not part of the sequence.
    pub fn next_after(&self, status_id: i32) -> Option<Transition> {
        let position = self
            .ordered
            .iter()
            .position(|status| status.id == status_id)?;
        let next = self.ordered.get(position + 1)?;
        Some(Transition {
            next_status_id: next.id,
            message: TRANSITION_MESSAGES[position],
        })
    }

    pub fn status_name(&self, status_id: i32) -> Option<&str> {
        self.ordered
            .iter()
            .find(|status| status.id == status_id)
            .map(|status| status.name.as_str())
    }
}

/// Current status of a request, defined as the history row with the
/// highest id. Rows are append-only, so id order is the canonical order
/// even when a backdated timestamp makes time order diverge.
pub fn current_status_id(conn: &mut PgConnection, request_id: i32) -> WorkflowResult<Option<i32>> {
    let latest = request_status_history::table
        .filter(request_status_history::request_id.eq(request_id))
        .order(request_status_history::id.desc())
        .select(request_status_history::status_id)
        .first::<i32>(conn)
        .optional()?;
    Ok(latest)
}

pub struct NewRequestSpec {
    pub student_id: String,
    pub document_type_id: i32,
    pub purpose: String,
    /// Stored filepath plus requirement-type tag, one per uploaded file.
    pub attachments: Vec<(String, Option<i32>)>,
}

/// Inserts the request, its initial Pending history row, and any
/// attachment rows in a single transaction. A request can never exist
/// without at least one history entry.
pub fn create_request(
    conn: &mut PgConnection,
    table: &TransitionTable,
    now: NaiveDateTime,
    spec: NewRequestSpec,
) -> WorkflowResult<i32> {
    conn.transaction(|conn| {
        let request_id: i32 = diesel::insert_into(requests::table)
            .values(&NewRequest {
                student_id: spec.student_id,
                document_type_id: spec.document_type_id,
                purpose: spec.purpose,
                created_at: now,
            })
            .returning(requests::id)
            .get_result(conn)?;

        diesel::insert_into(request_status_history::table)
            .values(&NewStatusHistoryEntry {
                request_id,
                status_id: table.pending_id(),
                created_at: now,
            })
            .execute(conn)?;

        for (filepath, requirement_type_id) in spec.attachments {
            diesel::insert_into(attachments::table)
                .values(&NewAttachment {
                    request_id,
                    requirement_type_id,
                    filepath,
                    created_at: now,
                })
                .execute(conn)?;
        }

        Ok(request_id)
    })
}

/// Advances a request one step along the lifecycle. The request row is
/// locked for the duration of the transaction so two concurrent advances
/// cannot both read the same current status and append duplicate steps.
pub fn advance(
    conn: &mut PgConnection,
    table: &TransitionTable,
    now: NaiveDateTime,
    request_id: i32,
) -> WorkflowResult<Advanced> {
    conn.transaction(|conn| {
        let locked = requests::table
            .find(request_id)
            .select(requests::id)
            .for_update()
            .first::<i32>(conn)
            .optional()?;
        if locked.is_none() {
            return Err(WorkflowError::NotFound);
        }

        let current = current_status_id(conn, request_id)?.ok_or(WorkflowError::NotFound)?;

        let transition = table
            .next_after(current)
            .ok_or(WorkflowError::InvalidTransition)?;

        diesel::insert_into(request_status_history::table)
            .values(&NewStatusHistoryEntry {
                request_id,
                status_id: transition.next_status_id,
                created_at: now,
            })
            .execute(conn)?;

        Ok(Advanced {
            new_status_id: transition.next_status_id,
            message: transition.message,
        })
    })
}
