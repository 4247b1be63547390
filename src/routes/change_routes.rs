use crate::models::{
    ChangeType, DiffFormat, HistoryQuery, Resolution, RollbackOptions, TrackerError, Version,
};
use crate::services::{ChangeTracker, ContentSource};
use actix_web::{delete, get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use log::info;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RecordChangeRequest {
    pub change_type: ChangeType,
    #[serde(default)]
    pub content_before: String,
    #[serde(default)]
    pub content_after: String,
    pub description: Option<String>,
    pub author: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DiffQuery {
    pub from: Version,
    pub to: Version,
    pub format: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AuditQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DetectConflictRequest {
    pub base_version: Version,
    pub incoming_content: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub strategy: String,
    pub merged_content: Option<String>,
    pub resolved_by: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AuthorQuery {
    pub author: Option<String>,
}

// Record a change
#[post("/files/{file_id}/changes")]
async fn record_change(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    data: web::Json<RecordChangeRequest>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    info!("📝 Record change: file_id={}, type={}", file_id, data.change_type);

    let record = tracker
        .record_change(
            &file_id,
            data.change_type,
            &data.content_before,
            &data.content_after,
            data.description.as_deref(),
            data.author.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Created().json(record))
}

// Get change history
#[get("/files/{file_id}/history")]
async fn get_history(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    info!("📋 Get change history: file_id={}", file_id);

    let page = tracker.get_change_history(&file_id, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

// Compare two versions
#[get("/files/{file_id}/diff")]
async fn get_diff(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    query: web::Query<DiffQuery>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    let format = match query.format.as_deref() {
        Some(raw) => raw.parse::<DiffFormat>()?,
        None => DiffFormat::default(),
    };

    info!("📊 Diff: file_id={}, from={}, to={}, format={:?}", file_id, query.from, query.to, format);

    let rendered = tracker.generate_diff(&file_id, query.from, query.to, format).await?;
    let content_type = match format {
        DiffFormat::Html => "text/html; charset=utf-8",
        DiffFormat::Unified | DiffFormat::SideBySide => "text/plain; charset=utf-8",
    };

    Ok(HttpResponse::Ok().content_type(content_type).body(rendered))
}

// Roll back to an earlier version
#[post("/files/{file_id}/rollback")]
async fn rollback(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    data: web::Json<RollbackOptions>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    info!("⏪ Rollback: file_id={}, target={}", file_id, data.target_version);

    let result = tracker.rollback_to_version(&file_id, &data).await?;
    Ok(HttpResponse::Ok().json(result))
}

// Check an incoming edit against the latest version
#[post("/files/{file_id}/conflicts")]
async fn detect_conflicts(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    data: web::Json<DetectConflictRequest>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    info!("🔍 Detect conflicts: file_id={}, base={}", file_id, data.base_version);

    let conflict = tracker
        .detect_conflicts(&file_id, data.base_version, &data.incoming_content)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "hasConflict": conflict.is_some(),
        "conflict": conflict,
    })))
}

// Resolve a pending conflict
#[post("/conflicts/{conflict_id}/resolve")]
async fn resolve_conflict(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    data: web::Json<ResolveConflictRequest>,
) -> Result<HttpResponse, TrackerError> {
    let conflict_id = path.into_inner();
    let data = data.into_inner();
    info!("🔧 Resolve conflict: conflict_id={}, strategy={}", conflict_id, data.strategy);

    let resolution = Resolution::from_parts(&data.strategy, data.merged_content)?;
    let content = tracker
        .resolve_conflict(&conflict_id, resolution, data.resolved_by.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "conflictId": conflict_id,
        "resolvedBy": data.resolved_by,
        "content": content,
    })))
}

// Audit trail
#[get("/files/{file_id}/audit")]
async fn get_audit_trail(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    query: web::Query<AuditQuery>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    info!("🧾 Audit trail: file_id={}", file_id);

    let trail = tracker.get_audit_trail(&file_id, query.from, query.to).await?;
    Ok(HttpResponse::Ok().json(trail))
}

// Current content
#[get("/files/{file_id}/content")]
async fn get_current_content(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    let content = tracker.current_content(&file_id).await?;
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(content))
}

// Content at a specific version
#[get("/files/{file_id}/versions/{version}")]
async fn get_version_content(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<(String, Version)>,
) -> Result<HttpResponse, TrackerError> {
    let (file_id, version) = path.into_inner();
    info!("📥 Get version content: file_id={}, version={}", file_id, version);

    let content = tracker.content_at_version(&file_id, version).await?;
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(content))
}

// Record a delete
#[delete("/files/{file_id}")]
async fn delete_document(
    tracker: web::Data<ChangeTracker>,
    path: web::Path<String>,
    query: web::Query<AuthorQuery>,
) -> Result<HttpResponse, TrackerError> {
    let file_id = path.into_inner();
    info!("🗑️ Delete document: file_id={}", file_id);

    let record = tracker.delete_document(&file_id, query.author.as_deref()).await?;
    Ok(HttpResponse::Ok().json(record))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(record_change)
        .service(get_history)
        .service(get_diff)
        .service(rollback)
        .service(detect_conflicts)
        .service(resolve_conflict)
        .service(get_audit_trail)
        .service(get_current_content)
        .service(get_version_content)
        .service(delete_document);
}
