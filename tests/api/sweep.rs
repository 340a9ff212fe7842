use crate::helpers::{batch_recipients, spawn_app};
use chrono::{Duration, Utc};
use newsletter_campaigns::domain::{CampaignRepository, CampaignStatus};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Schedule `id` in the past, which the API refuses, by editing the store.
async fn make_due(app: &crate::helpers::TestApp, id: &str, minutes_ago: i64) {
    let id = Uuid::parse_str(id).unwrap();
    let scheduled_for = Utc::now() - Duration::minutes(minutes_ago);
    assert!(app.campaigns.schedule(id, scheduled_for).await.unwrap());
}

#[tokio::test]
async fn sweep_sends_due_campaigns_and_reports_each_result() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    let first = app.create_draft(json!({ "news": true })).await;
    let second = app.create_draft(json!({ "news": true })).await;
    let later = app.create_draft(json!({ "news": true })).await;
    make_due(&app, &first, 30).await;
    make_due(&app, &second, 10).await;
    app.schedule_campaign(&later, &json!({ "scheduled_for": Utc::now() + Duration::days(1) }))
        .await
        .error_for_status()
        .unwrap();
    Mock::given(path("/email/batch"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.email_server)
        .await;

    // Act
    let response = app.post_sweep().await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let results = body["data"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["campaign_id"], first.as_str());
    assert_eq!(results[1]["campaign_id"], second.as_str());
    for result in results {
        assert_eq!(result["status"], "sent");
        assert_eq!(result["recipient_count"], 1);
    }
    assert_eq!(app.campaign_status(&later).await, "scheduled");
}

#[tokio::test]
async fn sweep_keeps_going_after_a_failed_campaign() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    let ids = vec![
        app.create_draft(json!({ "news": true })).await,
        app.create_draft(json!({ "news": true })).await,
        app.create_draft(json!({ "news": true })).await,
    ];
    for (i, id) in ids.iter().enumerate() {
        make_due(&app, id, 30 - i as i64 * 10).await;
    }
    // Only the second batch request fails
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // Act
    let response = app.post_sweep().await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let statuses: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|result| result["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["sent", "error", "sent"]);
    assert!(body["data"][1]["error"]
        .as_str()
        .unwrap()
        .contains("reverted to draft"));

    let statuses = futures::future::join_all(ids.iter().map(|id| {
        let id = Uuid::parse_str(id).unwrap();
        let campaigns = app.campaigns.clone();
        async move { campaigns.get(id).await.unwrap().unwrap().status }
    }))
    .await;
    assert_eq!(
        statuses,
        vec![
            CampaignStatus::Sent,
            CampaignStatus::Draft,
            CampaignStatus::Sent
        ]
    );
}

#[tokio::test]
async fn sweep_with_nothing_due_returns_an_empty_list() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.post_sweep().await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn batches_carry_one_recipient_per_message() {
    // Arrange
    let app = spawn_app().await;
    app.create_verified_subscriber("a@example.com", json!({ "news": true }))
        .await;
    app.create_verified_subscriber("b@example.com", json!({ "news": true }))
        .await;
    let id = app.create_draft(json!({ "news": true })).await;
    make_due(&app, &id, 1).await;
    Mock::given(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // Act
    app.post_sweep().await.error_for_status().unwrap();

    // Assert
    let requests = app.email_server.received_requests().await.unwrap();
    let batch = requests
        .iter()
        .find(|request| request.url.path() == "/email/batch")
        .unwrap();
    let mut recipients = batch_recipients(batch);
    recipients.sort();
    assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
}
