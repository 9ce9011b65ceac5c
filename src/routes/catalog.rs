use axum::extract::{Json, State};
use diesel::prelude::*;
use serde::Serialize;

use crate::error::AppResult;
use crate::models::{DocumentType, RequirementType};
use crate::schema::{document_types, requirement_types};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CatalogEntry {
    pub id: i32,
    pub name: String,
}

pub async fn list_document_types(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    let mut conn = state.db()?;

    let entries: Vec<DocumentType> = document_types::table
        .order(document_types::id.asc())
        .load(&mut conn)?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| CatalogEntry {
                id: entry.id,
                name: entry.name,
            })
            .collect(),
    ))
}

pub async fn list_requirement_types(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    let mut conn = state.db()?;

    let entries: Vec<RequirementType> = requirement_types::table
        .order(requirement_types::id.asc())
        .load(&mut conn)?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| CatalogEntry {
                id: entry.id,
                name: entry.name,
            })
            .collect(),
    ))
}
