//! Dynamic record API
//!
//! The `/api/v1` endpoints speak the dynamic-record text format end to end:
//! listings are payloads, edits are payloads, and status lines come back as
//! `; 200: …` comments. POST applies a payload (disabled lines delete),
//! DELETE applies it with every disabled flag inverted.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::{method_not_allowed, text_response, ApiError};
use crate::dns::dynamic::DynamicRecordSet;
use crate::dns::record::Domain;
use crate::dns::sqlite::SqliteResolver;

#[derive(Clone)]
pub struct RecordsState {
    pub store: Arc<SqliteResolver>,
}

fn status_line(added: usize, deleted: usize) -> String {
    format!("; 200: add:{} delete:{}\n", added, deleted)
}

/// GET /api/v1: all live records as a text payload.
async fn list_records(State(state): State<RecordsState>) -> Result<Response, ApiError> {
    let records = state.store.records().await?;
    Ok(text_response(records.to_string()))
}

async fn apply(state: &RecordsState, set: &DynamicRecordSet) -> Result<Response, ApiError> {
    state.store.set_records(set).await?;

    let deleted = set.iter().filter(|r| r.disabled).count();
    let added = set.len() - deleted;
    Ok(text_response(status_line(added, deleted)))
}

/// POST /api/v1: insert non-disabled entries, delete disabled ones.
async fn post_records(
    State(state): State<RecordsState>,
    body: String,
) -> Result<Response, ApiError> {
    let set: DynamicRecordSet = body.parse()?;
    apply(&state, &set).await
}

/// DELETE /api/v1: the same payload with every disabled flag inverted.
async fn delete_records(
    State(state): State<RecordsState>,
    body: String,
) -> Result<Response, ApiError> {
    let mut set: DynamicRecordSet = body.parse()?;
    set.invert_disabled();
    apply(&state, &set).await
}

/// GET /api/v1/suffix/<reverse-labels>: records under a zone, labels given
/// root-first separated by `/`, or as a plain FQDN.
async fn search_records(
    State(state): State<RecordsState>,
    Path(suffix): Path<String>,
) -> Result<Response, ApiError> {
    let name = if suffix.contains('/') {
        let mut labels: Vec<&str> = suffix.split('/').filter(|s| !s.is_empty()).collect();
        labels.reverse();
        labels.join(".")
    } else {
        suffix
    };
    let domain: Domain = name.parse()?;

    let records = state.store.search_records(&domain).await?;
    Ok(text_response(records.to_string()))
}

/// GET /api/v1/glob/<pattern>
async fn glob_records(
    State(state): State<RecordsState>,
    Path(pattern): Path<String>,
) -> Result<Response, ApiError> {
    let records = state.store.glob_records(&pattern).await?;
    Ok(text_response(records.to_string()))
}

/// GET /api/v1/id/<n>
async fn get_record(
    State(state): State<RecordsState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    match state.store.get_record(id).await? {
        Some(record) => Ok(text_response(format!("{}\n", record))),
        None => Err(crate::error::Error::NoSuchRecord(id).into()),
    }
}

/// DELETE /api/v1/id/<n>
async fn delete_record(
    State(state): State<RecordsState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    state.store.remove_record(id).await?;
    Ok(text_response("; 200: ok\n".to_string()))
}

pub fn records_router(state: RecordsState) -> Router {
    Router::new()
        .route(
            "/",
            get(list_records)
                .post(post_records)
                .delete(delete_records)
                .fallback(method_not_allowed),
        )
        .route(
            "/suffix/*suffix",
            get(search_records).fallback(method_not_allowed),
        )
        .route(
            "/glob/:pattern",
            get(glob_records).fallback(method_not_allowed),
        )
        .route(
            "/id/:id",
            get(get_record)
                .delete(delete_record)
                .fallback(method_not_allowed),
        )
        .with_state(state)
}
