use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::service::Command;
use crate::state::AppState;

use super::{track, ApiError};

#[derive(Debug, Deserialize, Serialize)]
pub struct WebhookRequest {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChannelResponse {
    pub channel: String,
    pub registered: bool,
}

pub async fn register_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<WebhookRequest>,
) -> Result<HttpResponse, ApiError> {
    let channel = path.into_inner();
    track(
        Command::Register,
        state.service().register(&channel, &payload.url).await,
    )?;
    Ok(HttpResponse::Ok().json(ChannelResponse {
        channel,
        registered: true,
    }))
}

pub async fn unregister_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let channel = path.into_inner();
    track(Command::Unregister, state.service().unregister(&channel).await)?;
    Ok(HttpResponse::Ok().json(ChannelResponse {
        channel,
        registered: false,
    }))
}
