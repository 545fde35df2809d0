use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use mailroom_auth::Permission;
use mailroom_core::{DocumentId, JobId};
use mailroom_dispatch::{JobMode, SourceSelector};
use mailroom_infra::CreateJobRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/process", post(process_chunk))
}

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::CreateDispatchJobRequest>,
) -> axum::response::Response {
    let principal = match crate::authz::require(&principal, &Permission::dispatch_create()) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
    };

    let mode = match JobMode::parse(&body.mode) {
        Ok(m) => m,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_mode", e.to_string()),
    };

    let source = match (body.document_ids, body.collection) {
        (Some(ids), None) => {
            let mut parsed = Vec::with_capacity(ids.len());
            for id in &ids {
                match id.parse::<DocumentId>() {
                    Ok(v) => parsed.push(v),
                    Err(_) => {
                        return errors::json_error(
                            StatusCode::BAD_REQUEST,
                            "invalid_id",
                            format!("invalid document id '{id}'"),
                        )
                    }
                }
            }
            SourceSelector::Documents(parsed)
        }
        (None, Some(name)) => SourceSelector::Collection(name),
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_source",
                "exactly one of document_ids or collection is required",
            )
        }
    };

    let request = CreateJobRequest {
        mode,
        source,
        idempotency_key: body.idempotency_key,
    };

    match services
        .engine
        .create_job(principal.principal_id, request)
        .await
    {
        Ok(result) => {
            let status = if result.idempotent {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(result)).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn process_chunk(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = match crate::authz::require(&principal, &Permission::dispatch_process()) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
    };

    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"),
    };

    // Visibility check first: callers may only drive jobs they could read.
    if let Err(e) = services.engine.job_detail(&principal, job_id).await {
        return errors::dispatch_error_to_response(e);
    }

    match services.engine.process_chunk(job_id).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let principal = match crate::authz::require(&principal, &Permission::dispatch_read()) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
    };

    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    match services.engine.list_jobs(&principal, limit, offset).await {
        Ok(page) => {
            let jobs: Vec<_> = page.jobs.iter().map(dto::job_summary_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "jobs": jobs, "total": page.total })),
            )
                .into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let principal = match crate::authz::require(&principal, &Permission::dispatch_read()) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
    };

    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"),
    };

    match services.engine.job_detail(&principal, job_id).await {
        Ok(detail) => (StatusCode::OK, Json(dto::job_detail_json(&detail))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
