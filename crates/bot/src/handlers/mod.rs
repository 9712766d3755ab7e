pub mod channels;
pub mod metrics;
pub mod subscriptions;

pub use channels::{register_handler, unregister_handler};
pub use metrics::metrics_handler;
pub use subscriptions::{balance_handler, list_handler, subscribe_handler, unsubscribe_handler};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use ::metrics::counter;
use serde::{Deserialize, Serialize};

use crate::service::{Command, ServiceError};

/// Handler-facing alias; the service error carries its own HTTP mapping.
pub type ApiError = ServiceError;

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidAddress(_) | ServiceError::InvalidWebhook(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::NothingSubscribed(_) => StatusCode::NOT_FOUND,
            ServiceError::ChannelNotRegistered(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::Storage(_) | ServiceError::Watcher(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Counts the command outcome and passes the result through.
pub(crate) fn track<T>(command: Command, result: Result<T, ApiError>) -> Result<T, ApiError> {
    let status = match &result {
        Ok(_) => "ok",
        Err(ServiceError::InvalidAddress(_)) | Err(ServiceError::InvalidWebhook(_)) => "invalid",
        Err(ServiceError::NothingSubscribed(_)) => "empty",
        Err(ServiceError::ChannelNotRegistered(_)) => "unregistered",
        Err(ServiceError::Storage(_)) | Err(ServiceError::Watcher(_)) => "error",
    };
    counter!("bot_commands_total", "command" => command.as_ref().to_owned(), "status" => status)
        .increment(1);
    result
}
