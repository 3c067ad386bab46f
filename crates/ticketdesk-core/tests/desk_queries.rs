//! Resource layer against a mock backend: caching, invalidation after
//! writes, failure messages, and the refresh-and-replay path.

mod common;

use std::time::Duration;

use serde_json::json;
use ticketdesk_core::api::Upload;
use ticketdesk_core::cache::{CacheKey, ResourceKind};
use ticketdesk_core::models::{Priority, TicketStatus, TicketUpdate};
use ticketdesk_core::{DeskError, SessionState};
use wiremock::matchers::{any, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{credential, envelope, signed_in_desk, ticket_json, TENANT};

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_reads_are_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Printer on fire"))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));

    let first = desk.ticket(TENANT, "t1").await.unwrap();
    let second = desk.ticket(TENANT, "t1").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.title, "Printer on fire");
}

#[tokio::test]
async fn test_status_filter_is_sent_and_cached_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets"))
        .and(query_param("status", "in_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));

    let tickets = desk.tickets(TENANT, Some(TicketStatus::InProgress)).await.unwrap();
    assert!(tickets.is_empty());
    assert!(desk
        .cache()
        .is_fresh(&CacheKey::with_id(ResourceKind::Tickets, TENANT, "status=in_progress")));
    assert!(!desk.cache().is_fresh(&CacheKey::new(ResourceKind::Tickets, TENANT)));
}

#[tokio::test]
async fn test_update_invalidates_detail_and_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Old"))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([ticket_json("t1", "Old")]))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/acme/tickets/t1"))
        .and(body_json(json!({ "title": "New" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "New"))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    desk.ticket(TENANT, "t1").await.unwrap();
    desk.tickets(TENANT, None).await.unwrap();

    let update = TicketUpdate {
        title: Some("New".to_string()),
        ..Default::default()
    };
    let updated = desk.update_ticket(TENANT, "t1", &update).await.unwrap();
    assert_eq!(updated.title, "New");

    // Both reads go back to the server
    desk.ticket(TENANT, "t1").await.unwrap();
    desk.tickets(TENANT, None).await.unwrap();
}

#[tokio::test]
async fn test_update_marks_list_stale_even_if_only_detail_was_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Old"))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/tickets/t1/assign"))
        .and(body_json(json!({ "assignee_id": "u7" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Old"))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    desk.ticket(TENANT, "t1").await.unwrap();

    desk.assign_ticket(TENANT, "t1", Some("u7")).await.unwrap();

    let cache = desk.cache();
    assert!(!cache.is_fresh(&CacheKey::with_id(ResourceKind::Ticket, TENANT, "t1")));
    assert!(!cache.is_fresh(&CacheKey::new(ResourceKind::Tickets, TENANT)));
}

#[tokio::test]
async fn test_shape_mismatch_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "id": "t1" }))))
        .expect(2)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));

    let err = desk.ticket(TENANT, "t1").await.unwrap_err();
    assert!(err.is_shape_error());
    assert!(desk.cache().is_empty());

    // Nothing cached, so the next read fetches again
    assert!(desk.ticket(TENANT, "t1").await.unwrap_err().is_shape_error());
}

#[tokio::test]
async fn test_failed_write_reports_server_message_and_keeps_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/tickets"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "success": false, "message": "Title is required" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    desk.tickets(TENANT, None).await.unwrap();

    let new_ticket = ticketdesk_core::models::NewTicket {
        title: String::new(),
        description: "It broke".to_string(),
        priority: Priority::High,
    };
    let err = desk.create_ticket(TENANT, &new_ticket).await.unwrap_err();

    assert!(matches!(err, DeskError::Mutation { ref message, .. } if message == "Title is required"));
    assert_eq!(err.to_string(), "Title is required");
    assert!(desk.cache().is_fresh(&CacheKey::new(ResourceKind::Tickets, TENANT)));
}

#[tokio::test]
async fn test_failed_write_without_message_uses_default() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>Bad gateway</html>"))
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    let err = desk.delete_ticket(TENANT, "t1").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to delete ticket");
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/acme/incidents/i1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": false, "error": "Incident is closed" })),
        )
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    let err = desk
        .update_incident(TENANT, "i1", &Default::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Incident is closed");
}

#[tokio::test]
async fn test_upload_invalidates_attachment_list() {
    let server = MockServer::start().await;
    let attachment = json!({
        "id": "a1",
        "ticket_id": "t1",
        "filename": "trace.log",
        "content_type": "text/plain",
        "size_bytes": 5,
        "url": "https://files.example.com/a1",
        "uploaded_at": "2026-03-01T10:00:00Z"
    });
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1/attachments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/tickets/t1/attachments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(envelope(attachment)))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    assert!(desk.attachments(TENANT, "t1").await.unwrap().is_empty());

    let upload = Upload {
        filename: "trace.log".to_string(),
        content_type: "text/plain".to_string(),
        bytes: b"hello".to_vec(),
    };
    let uploaded = desk.upload_attachment(TENANT, "t1", &upload).await.unwrap();
    assert_eq!(uploaded.id, "a1");

    desk.attachments(TENANT, "t1").await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_read_refreshes_and_replays_once() {
    let server = MockServer::start().await;
    let stale = credential("u1", 3600);
    let fresh = credential("u1", 7200);

    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .and(header("authorization", bearer(&stale).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refresh_token": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "access_token": fresh }))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .and(header("authorization", bearer(&fresh).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Replayed"))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, store) = signed_in_desk(&server, &stale);

    let ticket = desk.ticket(TENANT, "t1").await.unwrap();
    assert_eq!(ticket.title, "Replayed");
    assert_eq!(store.access().as_deref(), Some(fresh.as_str()));
}

#[tokio::test]
async fn test_second_unauthorized_signs_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/incidents"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "access_token": credential("u1", 7200) }))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, store) = signed_in_desk(&server, &credential("u1", 3600));

    let err = desk.incidents(TENANT).await.unwrap_err();
    assert!(err.is_signed_out());
    assert_eq!(desk.session().state(), SessionState::Unauthenticated);
    assert!(store.access().is_none());
    assert!(store.refresh().is_none());
}

#[tokio::test]
async fn test_sign_out_clears_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/engineers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .mount(&server)
        .await;

    let (desk, store) = signed_in_desk(&server, &credential("u1", 3600));
    desk.engineers(TENANT).await.unwrap();
    assert_eq!(desk.cache().len(), 1);

    desk.sign_out();
    assert!(desk.cache().is_empty());
    assert!(store.access().is_none());

    let err = desk.engineers(TENANT).await.unwrap_err();
    assert!(err.is_signed_out());
}

#[tokio::test]
async fn test_read_overtaken_by_update_is_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(ticket_json("t1", "Old")))
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "New"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "New"))))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));

    let reader = {
        let desk = desk.clone();
        tokio::spawn(async move { desk.ticket(TENANT, "t1").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let update = TicketUpdate {
        title: Some("New".to_string()),
        ..Default::default()
    };
    desk.update_ticket(TENANT, "t1", &update).await.unwrap();

    // The slow read started before the write and answers with what it saw
    assert_eq!(reader.await.unwrap().unwrap().title, "Old");
    assert!(!desk.cache().is_fresh(&CacheKey::with_id(ResourceKind::Ticket, TENANT, "t1")));

    assert_eq!(desk.ticket(TENANT, "t1").await.unwrap().title, "New");
}

#[tokio::test]
async fn test_long_validation_body_keeps_server_message() {
    let server = MockServer::start().await;
    let errors: Vec<String> = (0..40).map(|i| format!("field_{} failed validation", i)).collect();
    Mock::given(method("POST"))
        .and(path("/acme/tickets"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "success": false,
            "message": "Title is required",
            "errors": errors
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    let new_ticket = ticketdesk_core::models::NewTicket {
        title: String::new(),
        description: "It broke".to_string(),
        priority: Priority::Low,
    };

    let err = desk.create_ticket(TENANT, &new_ticket).await.unwrap_err();
    assert_eq!(err.to_string(), "Title is required");
}

#[tokio::test]
async fn test_forced_sign_out_clears_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Printer on fire"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/incidents"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (desk, _) = signed_in_desk(&server, &credential("u1", 3600));
    desk.ticket(TENANT, "t1").await.unwrap();
    assert_eq!(desk.cache().len(), 1);

    let err = desk.incidents(TENANT).await.unwrap_err();

    assert!(err.is_signed_out());
    assert_eq!(desk.session().state(), SessionState::Unauthenticated);
    assert!(desk.cache().is_empty());
}

#[tokio::test]
async fn test_unauthorized_replays_with_credential_refreshed_elsewhere() {
    let server = MockServer::start().await;
    let used = credential("u1", 3600);
    let newer = credential("u1", 7200);

    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .and(header("authorization", bearer(&used).as_str()))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/tickets/t1"))
        .and(header("authorization", bearer(&newer).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(ticket_json("t1", "Replayed"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (desk, store) = signed_in_desk(&server, &used);

    let reader = {
        let desk = desk.clone();
        tokio::spawn(async move { desk.ticket(TENANT, "t1").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Another request refreshed while this one was waiting
    store.set_access(&newer);

    let ticket = reader.await.unwrap().unwrap();
    assert_eq!(ticket.title, "Replayed");
    assert_eq!(store.access().as_deref(), Some(newer.as_str()));
}
