use actix_web::{get, post, web, HttpResponse};
use validator::Validate;

use crate::{app_state::AppState, errors::AppError, models::dto::InboundMessageRequest};

/// Webhook invoked by the message-transport adapter for every inbound user
/// message.
#[post("/api/messages")]
async fn post_message(
    state: web::Data<AppState>,
    request: web::Json<InboundMessageRequest>,
) -> Result<HttpResponse, AppError> {
    request.validate()?;

    let reply = state
        .orchestrator
        .handle_message(&request.user_id, &request.channel_address, &request.text)
        .await;

    Ok(HttpResponse::Ok().json(reply))
}

#[get("/health")]
async fn health(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.db.health_check().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}
