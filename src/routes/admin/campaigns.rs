use crate::authentication::UserId;
use crate::campaigns::{CampaignError, CampaignService};
use crate::domain::{CampaignPatch, GroupFlags, NewCampaign};
use crate::routes::{e400, error_response, success_response};
use crate::sweeper::CampaignSweeper;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl ResponseError for CampaignError {
    fn status_code(&self) -> StatusCode {
        match self {
            CampaignError::NotFound(_) => StatusCode::NOT_FOUND,
            CampaignError::InvalidState(_) => StatusCode::BAD_REQUEST,
            CampaignError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            CampaignError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            CampaignError::Unexpected(_) => {
                error_response(self.status_code(), "Internal server error")
            }
            e => error_response(self.status_code(), &e.to_string()),
        }
    }
}

#[derive(serde::Deserialize)]
pub struct CampaignForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    target_groups: GroupFlags,
}

#[tracing::instrument(
    name = "Create a campaign",
    skip_all,
    fields(user_id = tracing::field::Empty, campaign_name = %form.name)
)]
pub async fn create_campaign(
    web::Json(form): web::Json<CampaignForm>,
    campaigns: web::Data<CampaignService>,
    user_id: web::ReqData<UserId>,
) -> Result<HttpResponse, actix_web::Error> {
    let new_campaign = NewCampaign::parse(
        form.name,
        form.subject,
        form.content,
        form.target_groups,
        campaigns.interest_groups(),
    )
    .map_err(e400)?;
    let user_id = user_id.into_inner();
    tracing::Span::current().record("user_id", &tracing::field::display(&user_id));
    let campaign = campaigns.create(new_campaign, *user_id).await?;
    Ok(success_response(StatusCode::CREATED, campaign))
}

#[tracing::instrument(name = "Fetch a campaign", skip(campaigns))]
pub async fn get_campaign(
    campaign_id: web::Path<Uuid>,
    campaigns: web::Data<CampaignService>,
) -> Result<HttpResponse, CampaignError> {
    let campaign = campaigns.get(campaign_id.into_inner()).await?;
    Ok(success_response(StatusCode::OK, campaign))
}

#[tracing::instrument(name = "Edit a campaign", skip(patch, campaigns))]
pub async fn update_campaign(
    campaign_id: web::Path<Uuid>,
    web::Json(patch): web::Json<CampaignPatch>,
    campaigns: web::Data<CampaignService>,
) -> Result<HttpResponse, actix_web::Error> {
    let patch = patch.validate(campaigns.interest_groups()).map_err(e400)?;
    let campaign = campaigns.update(campaign_id.into_inner(), patch).await?;
    Ok(success_response(StatusCode::OK, campaign))
}

#[tracing::instrument(name = "Remove a campaign", skip(campaigns))]
pub async fn delete_campaign(
    campaign_id: web::Path<Uuid>,
    campaigns: web::Data<CampaignService>,
) -> Result<HttpResponse, CampaignError> {
    let campaign_id = campaign_id.into_inner();
    campaigns.delete(campaign_id).await?;
    Ok(success_response(
        StatusCode::OK,
        serde_json::json!({ "id": campaign_id }),
    ))
}

#[derive(serde::Deserialize)]
pub struct ScheduleRequest {
    scheduled_for: DateTime<Utc>,
}

#[tracing::instrument(name = "Schedule a campaign for later", skip(request, campaigns))]
pub async fn schedule_campaign(
    campaign_id: web::Path<Uuid>,
    web::Json(request): web::Json<ScheduleRequest>,
    campaigns: web::Data<CampaignService>,
) -> Result<HttpResponse, CampaignError> {
    let campaign = campaigns
        .schedule(campaign_id.into_inner(), request.scheduled_for)
        .await?;
    Ok(success_response(StatusCode::OK, campaign))
}

#[tracing::instrument(name = "Send a campaign now", skip(campaigns))]
pub async fn send_campaign(
    campaign_id: web::Path<Uuid>,
    campaigns: web::Data<CampaignService>,
) -> Result<HttpResponse, CampaignError> {
    let campaign = campaigns.send(campaign_id.into_inner()).await?;
    Ok(success_response(StatusCode::OK, campaign))
}

#[tracing::instrument(name = "Fetch campaign stats", skip(campaigns))]
pub async fn campaign_stats(
    campaign_id: web::Path<Uuid>,
    campaigns: web::Data<CampaignService>,
) -> Result<HttpResponse, CampaignError> {
    let stats = campaigns.get_stats(campaign_id.into_inner()).await?;
    Ok(success_response(StatusCode::OK, stats))
}

#[tracing::instrument(name = "Sweep scheduled campaigns on demand", skip_all)]
pub async fn sweep_campaigns(
    sweeper: web::Data<CampaignSweeper>,
) -> Result<HttpResponse, CampaignError> {
    let results = sweeper.run().await?;
    Ok(success_response(StatusCode::OK, results))
}
