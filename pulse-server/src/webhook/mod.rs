//! Webhook ingestion endpoint.
//!
//! The synchronous phase runs inside one transaction: idempotency insert,
//! workspace resolution, push classification, file-activity upsert, member
//! touch, duration stamp. The ACK goes out only after commit, and the
//! engines run afterwards on the dispatcher; nothing they do can alter the
//! response.

pub mod payload;
pub mod signature;

use std::time::Instant;

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde_json::{Value, json};
use tracing::{info, warn};

use pulse_core::ingest;

use crate::dispatch::EngineJob;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

use payload::{PushKind, PushPayload};

pub const DELIVERY_ID_HEADER: &str = "x-github-delivery";
pub const EVENT_TYPE_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// `POST /webhook/github`
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let started = Instant::now();

    // Step 1: header gate.
    let mut missing = Vec::new();
    let delivery_id = header_str(&headers, DELIVERY_ID_HEADER);
    if delivery_id.is_none() {
        missing.push(DELIVERY_ID_HEADER.to_string());
    }
    let event_type = header_str(&headers, EVENT_TYPE_HEADER);
    if event_type.is_none() {
        missing.push(EVENT_TYPE_HEADER.to_string());
    }
    if !missing.is_empty() {
        return Err(AppError::validation("missing required headers", missing));
    }
    let delivery_id = delivery_id.unwrap();

    // Step 2: only push events feed the pipeline.
    if event_type != Some("push") {
        return Ok(Json(json!({ "status": "ignored" })));
    }

    // Step 3: signature verification, skipped when no secret is configured.
    let verified = match &state.config.webhook_secret {
        Some(secret) => {
            let valid = header_str(&headers, SIGNATURE_HEADER)
                .is_some_and(|sig| signature::verify_signature(secret, &body, sig));
            if !valid {
                warn!(delivery_id, "webhook signature rejected");
                return Err(AppError::unauthorized("invalid webhook signature"));
            }
            true
        }
        None => false,
    };

    // Unsigned requests are throttled per source address.
    if !verified {
        let source = source_address(&headers);
        if !state.webhook_limiter.allow(&source) {
            return Err(AppError::rate_limited("webhook rate limit exceeded"));
        }
    }

    // Step 4: payload validation.
    let push: PushPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("invalid JSON payload: {e}")))?;
    let push = push
        .validate()
        .map_err(|fields| AppError::validation("invalid push payload", fields))?;

    // Steps 5-10 share one transaction; the ACK only covers durable state.
    let mut tx = state.db.pool().begin().await?;

    if !ingest::insert_delivery(&mut tx, delivery_id, push.repo_id, &push.branch, &push.after)
        .await?
    {
        tx.commit().await?;
        return Ok(Json(json!({ "status": "duplicate", "deliveryId": delivery_id })));
    }

    let Some(workspace) = ingest::workspace_by_repo(&mut tx, push.repo_id).await? else {
        tx.commit().await?;
        info!(
            delivery_id,
            repo = push.repo_id,
            repo_name = %push.repo_full_name,
            "push for un-onboarded repository dropped"
        );
        return Ok(Json(json!({ "status": "workspace_not_found" })));
    };

    if push.kind() == PushKind::BranchDelete {
        let wiped = ingest::wipe_branch_activity(&mut tx, workspace.id, &push.branch).await?;
        ingest::finish_delivery(&mut tx, delivery_id, elapsed_ms(started)).await?;
        tx.commit().await?;
        info!(
            delivery_id,
            workspace = %workspace.id,
            branch = %push.branch,
            wiped,
            "branch deleted, activity wiped"
        );
        return Ok(Json(json!({ "status": "branch_deleted", "deliveryId": delivery_id })));
    }

    let modified_files = push.modified_files();
    ingest::upsert_file_activity(
        &mut tx,
        workspace.id,
        &push.branch,
        &push.after,
        &modified_files,
    )
    .await?;
    ingest::touch_members(&mut tx, workspace.id, &push.author_usernames()).await?;
    ingest::finish_delivery(&mut tx, delivery_id, elapsed_ms(started)).await?;

    // Step 11: commit, then ACK.
    tx.commit().await?;

    info!(
        delivery_id,
        workspace = %workspace.id,
        branch = %push.branch,
        files = modified_files.len(),
        "push ingested"
    );

    // Step 12: engines run after the response on the workspace queue.
    state.dispatcher.dispatch(
        workspace.id,
        EngineJob {
            branch: push.branch.clone(),
            commit_hash: push.after.clone(),
            modified_files,
        },
    );

    Ok(Json(json!({ "status": "processing", "deliveryId": delivery_id })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Source address for rate limiting, taken from the proxy headers the
/// deployment sits behind.
fn source_address(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        return real_ip.to_string();
    }
    "unknown".to_string()
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}
