//! Shared fixtures for the integration tests: credential builders, JSON
//! records, and a session wired to a wiremock server.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use ticketdesk_core::auth::token::{encode_unsigned, Claims, DEFAULT_REFRESH_BUFFER_SECS};
use ticketdesk_core::auth::{CredentialPolicy, CredentialStore};
use ticketdesk_core::models::Role;
use ticketdesk_core::{ApiClient, Desk, QueryCache, SessionController};
use wiremock::MockServer;

pub const TENANT: &str = "acme";

/// Unsigned credential for `sub` expiring `exp_offset` seconds from now
pub fn credential(sub: &str, exp_offset: i64) -> String {
    let now = Utc::now().timestamp();
    encode_unsigned(&Claims {
        sub: sub.to_string(),
        company_id: TENANT.to_string(),
        role: Role::Engineer,
        email: "a@b.com".to_string(),
        iat: now - 60,
        exp: now + exp_offset,
    })
}

pub fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "email": "a@b.com",
        "name": "Ada",
        "role": "engineer",
        "company_id": TENANT
    })
}

pub fn ticket_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "company_id": TENANT,
        "title": title,
        "description": "",
        "status": "open",
        "priority": "medium",
        "requester_id": "u2",
        "assignee_id": null,
        "created_at": "2026-03-01T10:00:00Z",
        "updated_at": "2026-03-01T10:00:00Z"
    })
}

pub fn envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

pub fn store() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::in_memory(CredentialPolicy::default()))
}

pub fn session(server: &MockServer, store: Arc<CredentialStore>) -> SessionController {
    let api = ApiClient::new(server.uri(), Duration::from_secs(5)).expect("client builds");
    SessionController::new(api, store, DEFAULT_REFRESH_BUFFER_SECS)
}

/// Resource layer with a signed-in store: a valid access credential and a refresh credential
pub fn signed_in_desk(server: &MockServer, access: &str) -> (Desk, Arc<CredentialStore>) {
    let store = store();
    store.set_access(access);
    store.set_refresh("refresh-1");
    let desk = Desk::new(session(server, store.clone()), Arc::new(QueryCache::default()));
    (desk, store)
}
