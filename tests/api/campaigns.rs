use crate::helpers::{delivered_addresses, spawn_app};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn admin_routes_reject_requests_without_credentials() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .api_client
        .post(&format!("{}/admin/campaigns", app.addr))
        .json(&json!({ "name": "Spring issue" }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(
        r#"Basic realm="admin""#,
        response.headers()["WWW-Authenticate"]
    );
}

#[tokio::test]
async fn admin_routes_reject_a_wrong_password() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .api_client
        .get(&format!("{}/admin/campaigns/{}", app.addr, Uuid::new_v4()))
        .basic_auth(&app.test_user.username, Some("definitely-not-it"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn create_campaign_stores_a_draft_owned_by_the_admin() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let id = app.create_draft(json!({ "news": true })).await;

    // Assert
    let body: Value = app.get_campaign(&id).await.json().await.unwrap();
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["stats"]["total_sent"], 0);
    assert_eq!(
        body["data"]["created_by"],
        app.test_user.user_id.to_string()
    );
}

#[tokio::test]
async fn create_campaign_rejects_invalid_forms() {
    // Arrange
    let app = spawn_app().await;
    let test_cases = vec![
        (
            json!({ "subject": "S", "content": "C", "target_groups": { "news": true } }),
            "missing name",
        ),
        (
            json!({ "name": "N", "subject": "", "content": "C", "target_groups": { "news": true } }),
            "empty subject",
        ),
        (
            json!({ "name": "N", "subject": "S", "content": "C", "target_groups": {} }),
            "no target groups",
        ),
        (
            json!({ "name": "N", "subject": "S", "content": "C", "target_groups": { "gossip": true } }),
            "unknown target group",
        ),
    ];

    for (body, description) in test_cases {
        // Act
        let response = app.post_campaign(&body).await;

        // Assert
        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not reject a campaign with {}",
            description
        );
    }
}

#[tokio::test]
async fn sending_delivers_to_verified_subscribers_in_targeted_groups() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    app.create_verified_subscriber("b@example.com", json!({ "product": true }))
        .await;
    app.create_verified_subscriber("c@example.com", json!({ "news": true, "product": true }))
        .await;
    app.create_verified_subscriber("d@example.com", json!({ "events": true }))
        .await;
    app.create_unverified_subscriber("e@example.com", json!({ "news": true }))
        .await;
    let id = app
        .create_draft(json!({ "news": true, "product": true, "events": false }))
        .await;
    Mock::given(path("/email/batch"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // Act
    let response = app.send_campaign(&id).await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(
        delivered_addresses(&app.email_server).await,
        vec!["a@example.com", "b@example.com", "c@example.com"]
    );
    let stats: Value = app.get_campaign_stats(&id).await.json().await.unwrap();
    assert_eq!(stats["data"]["total_sent"], 3);
    let credited = app.find_subscriber("a@example.com").await;
    assert_eq!(credited.campaigns.len(), 1);
    assert!(credited.last_email_sent.is_some());
    let skipped = app.find_subscriber("d@example.com").await;
    assert!(skipped.campaigns.is_empty());
}

#[tokio::test]
async fn large_audiences_are_sent_in_batches() {
    // Arrange
    let app = spawn_app().await;
    for i in 0..60 {
        let email = format!("reader{}@example.com", i);
        let links = app
            .create_unverified_subscriber(&email, json!({ "news": true }))
            .await;
        reqwest::get(links.html).await.unwrap();
    }
    let id = app.create_draft(json!({ "news": true })).await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.email_server)
        .await;

    // Act
    let response = app.send_campaign(&id).await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(delivered_addresses(&app.email_server).await.len(), 60);
}

#[tokio::test]
async fn failed_delivery_reverts_the_campaign_to_draft() {
    // Arrange
    let app = spawn_app().await;
    let subscriber = app
        .create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    let id = app.create_draft(json!({ "news": true })).await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // Act
    let response = app.send_campaign(&id).await;

    // Assert
    assert_eq!(response.status().as_u16(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Sending failed, campaign reverted to draft"));
    assert_eq!(app.campaign_status(&id).await, "draft");
    let subscriber = app.find_subscriber(subscriber.email.as_ref()).await;
    assert!(subscriber.campaigns.is_empty());
}

#[tokio::test]
async fn a_campaign_without_matching_subscribers_is_not_sent() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "events": true }))
        .await;
    let id = app.create_draft(json!({ "news": true })).await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    // Act
    let response = app.send_campaign(&id).await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.campaign_status(&id).await, "draft");
}

#[tokio::test]
async fn a_sent_campaign_is_immutable() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    let id = app.create_draft(json!({ "news": true })).await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;
    app.send_campaign(&id).await.error_for_status().unwrap();

    // Act
    let resend = app.send_campaign(&id).await;
    let edit = app.put_campaign(&id, &json!({ "subject": "Changed" })).await;
    let delete = app.delete_campaign(&id).await;

    // Assert
    assert_eq!(resend.status().as_u16(), 400);
    assert_eq!(edit.status().as_u16(), 400);
    assert_eq!(delete.status().as_u16(), 400);
    assert_eq!(app.campaign_status(&id).await, "sent");
}

#[tokio::test]
async fn concurrent_send_requests_deliver_once() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    let id = app.create_draft(json!({ "news": true })).await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(100)))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // Act
    let (first, second) = futures::join!(app.send_campaign(&id), app.send_campaign(&id));

    // Assert
    let mut statuses = vec![first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 400]);
    let stats: Value = app.get_campaign_stats(&id).await.json().await.unwrap();
    assert_eq!(stats["data"]["total_sent"], 1);
}

#[tokio::test]
async fn drafts_can_be_edited_and_deleted() {
    // Arrange
    let app = spawn_app().await;
    let id = app.create_draft(json!({ "news": true })).await;

    // Act
    let edit = app
        .put_campaign(&id, &json!({ "name": "Renamed", "target_groups": { "events": true } }))
        .await;

    // Assert
    assert_eq!(edit.status().as_u16(), 200);
    let body: Value = edit.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Renamed");
    assert_eq!(body["data"]["subject"], "What's new this spring");
    assert_eq!(body["data"]["target_groups"]["events"], true);

    assert_eq!(app.delete_campaign(&id).await.status().as_u16(), 200);
    assert_eq!(app.get_campaign(&id).await.status().as_u16(), 404);
}

#[tokio::test]
async fn edits_with_unknown_groups_are_rejected() {
    // Arrange
    let app = spawn_app().await;
    let id = app.create_draft(json!({ "news": true })).await;

    // Act
    let response = app
        .put_campaign(&id, &json!({ "target_groups": { "gossip": true } }))
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn scheduling_requires_a_future_time() {
    // Arrange
    let app = spawn_app().await;
    let id = app.create_draft(json!({ "news": true })).await;

    // Act
    let past = app
        .schedule_campaign(
            &id,
            &json!({ "scheduled_for": Utc::now() - Duration::minutes(5) }),
        )
        .await;
    let future = app
        .schedule_campaign(&id, &json!({ "scheduled_for": Utc::now() + Duration::days(1) }))
        .await;

    // Assert
    assert_eq!(past.status().as_u16(), 400);
    assert_eq!(future.status().as_u16(), 200);
    assert_eq!(app.campaign_status(&id).await, "scheduled");
}

#[tokio::test]
async fn unknown_campaigns_return_404() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;
    let id = Uuid::new_v4().to_string();

    // Act
    let responses = vec![
        app.get_campaign(&id).await,
        app.send_campaign(&id).await,
        app.get_campaign_stats(&id).await,
        app.delete_campaign(&id).await,
    ];

    // Assert
    for response in responses {
        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
    }
}
