use serde::Deserialize;
use serde_json::json;

use mailroom_dispatch::{Email, Item, Job};
use mailroom_infra::JobDetail;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateDispatchJobRequest {
    /// `"single"` or `"batch"`.
    pub mode: String,
    /// Explicit document ids; mutually exclusive with `collection`.
    pub document_ids: Option<Vec<String>>,
    /// Named source collection; mutually exclusive with `document_ids`.
    pub collection: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn job_summary_json(job: &Job) -> serde_json::Value {
    json!({
        "id": job.id.to_string(),
        "status": job.status.as_str(),
        "mode": job.mode.as_str(),
        "total_items": job.total_items,
        "processed_items": job.processed_items,
        "sent_items": job.sent_items,
        "failed_items": job.failed_items,
        "remaining_items": job.remaining_items(),
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339(),
        "completed_at": job.completed_at.map(|t| t.to_rfc3339()),
    })
}

pub fn job_detail_json(detail: &JobDetail) -> serde_json::Value {
    let mut body = job_summary_json(&detail.job);
    body["requester"] = json!(detail.job.requester.to_string());
    body["target_address"] = json!(detail.job.target_address);
    body["items"] = json!(detail.items.iter().map(item_json).collect::<Vec<_>>());
    body["emails"] = json!(detail.emails.iter().map(email_json).collect::<Vec<_>>());
    // The settings snapshot names the sending account; only elevated callers
    // get to see it.
    if !detail.settings_redacted {
        body["settings"] = json!(detail.job.settings);
    }
    body
}

fn item_json(item: &Item) -> serde_json::Value {
    json!({
        "id": item.id.to_string(),
        "document_id": item.document_id.to_string(),
        "filename": item.filename,
        "size_bytes": item.size_bytes,
        "status": item.status.as_str(),
        "email_id": item.email_id.map(|id| id.to_string()),
        "content_hash": item.content_hash,
        "archived": item.archived,
        "recolored": item.recolored,
        "error": item.error,
    })
}

fn email_json(email: &Email) -> serde_json::Value {
    json!({
        "id": email.id.to_string(),
        "recipient": email.recipient,
        "subject": email.subject,
        "attachment_count": email.attachment_count,
        "total_size": email.total_size,
        "status": email.status.as_str(),
        "provider_message_id": email.provider_message_id,
        "error": email.error,
        "created_at": email.created_at.to_rfc3339(),
    })
}
