use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::format;
use crate::service::Command;
use crate::state::AppState;

use super::{track, ApiError};

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AddressEntry {
    pub address: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UnsubscribeResponse {
    pub address: String,
    pub removed: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListResponse {
    pub addresses: Vec<AddressEntry>,
    /// The same listing as posted to chat.
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BalanceResponse {
    pub pending: usize,
}

pub async fn subscribe_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    let channel = path.into_inner();
    let SubscribeRequest { address, name } = payload.into_inner();
    let name = name.unwrap_or_default();
    let address = track(
        Command::Subscribe,
        state.service().subscribe(&channel, &address, &name).await,
    )?;
    Ok(HttpResponse::Created().json(AddressEntry {
        address: address.into_inner(),
        name,
    }))
}

pub async fn unsubscribe_handler(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (channel, address) = path.into_inner();
    let (address, removed) = track(
        Command::Unsubscribe,
        state.service().unsubscribe(&channel, &address).await,
    )?;
    Ok(HttpResponse::Ok().json(UnsubscribeResponse {
        address: address.into_inner(),
        removed,
    }))
}

pub async fn list_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let channel = path.into_inner();
    let entries = track(Command::List, state.service().list(&channel).await)?;
    let text = format::address_list(&entries);
    let addresses = entries
        .into_iter()
        .map(|(address, name)| AddressEntry {
            address: address.into_inner(),
            name,
        })
        .collect();
    Ok(HttpResponse::Ok().json(ListResponse { addresses, text }))
}

pub async fn balance_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let channel = path.into_inner();
    let pending = track(Command::Balance, state.service().balance(&channel).await)?;
    Ok(HttpResponse::Accepted().json(BalanceResponse { pending }))
}
