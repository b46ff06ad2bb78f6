use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use neubot_agent::QueryRouter;
use neubot_core::domain::query::Query;
use neubot_core::domain::quota::{Identity, QuotaStatus};
use neubot_core::errors::{ApplicationError, InterfaceError};

/// Header set by the authentication layer in front of the service.
pub const USER_HEADER: &str = "x-neubot-user";

#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<QueryRouter>,
    pub default_timezone: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/query", post(post_query))
        .route("/api/limits", get(get_limits))
        .with_state(state)
}

/// Who the request is billed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.headers.get(USER_HEADER).and_then(|value| value.to_str().ok());
        let address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(peer)| peer.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(Identity::resolve(user, &address)))
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ThoughtPayload {
    pub description: String,
    pub result: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub response: String,
    pub thoughts: Vec<ThoughtPayload>,
    pub highlighted_query: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

pub enum ApiError {
    MissingQuery,
    Interface(InterfaceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingQuery => (
                StatusCode::BAD_REQUEST,
                Json(ErrorPayload { error: "No query provided".to_string(), correlation_id: None }),
            )
                .into_response(),
            Self::Interface(interface) => {
                let status = match interface {
                    InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                    InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ErrorPayload {
                    error: interface.user_message().to_string(),
                    correlation_id: Some(interface.correlation_id().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn fail(error: ApplicationError, correlation_id: &str, identity: &Identity) -> ApiError {
    error!(
        event_name = "api.request_failed",
        correlation_id,
        identity = %identity,
        error = %error,
        "request failed"
    );
    ApiError::Interface(error.into_interface(correlation_id))
}

pub async fn post_query(
    State(state): State<ApiState>,
    Caller(identity): Caller,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryPayload>, ApiError> {
    let request = body.map(|Json(request)| request).map_err(|_| ApiError::MissingQuery)?;
    let text = request
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or(ApiError::MissingQuery)?;
    let timezone = request.timezone.unwrap_or_else(|| state.default_timezone.clone());

    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "api.query.received",
        correlation_id = %correlation_id,
        identity = %identity,
        "query received"
    );

    let reply = state
        .router
        .handle(&Query::new(text, timezone), &identity)
        .await
        .map_err(|error| fail(error, &correlation_id, &identity))?;

    Ok(Json(QueryPayload {
        thoughts: reply
            .thoughts
            .iter()
            .map(|step| ThoughtPayload {
                description: step.description.clone(),
                result: step.result_text(),
            })
            .collect(),
        response: reply.response,
        highlighted_query: reply.highlighted_query,
    }))
}

pub async fn get_limits(
    State(state): State<ApiState>,
    Caller(identity): Caller,
) -> Result<Json<QuotaStatus>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    state
        .router
        .quota()
        .status(&identity)
        .await
        .map(Json)
        .map_err(|error| fail(error, &correlation_id, &identity))
}
