//! HTTP/JSON surface of a node

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use super::response::{LocationStatus, NodeResponse};
use super::service::{MoveArmyRequest, NodeService, ResetRequest};
use crate::core::error::{ErrorKind, Result, WarError};
use crate::transfer::{ArmyEnvelope, ResourceEnvelope, ShutdownSignal};

/// Handler failure, rendered as `{success: false, message}`
#[derive(Debug)]
pub enum ApiError {
    Node(WarError),
    BadBody(JsonRejection),
}

impl From<WarError> for ApiError {
    fn from(e: WarError) -> Self {
        Self::Node(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadBody(e)
    }
}

pub fn status_code(error: &WarError) -> StatusCode {
    match error.kind() {
        ErrorKind::PolicyViolation if error.is_forbidden() => StatusCode::FORBIDDEN,
        ErrorKind::PolicyViolation | ErrorKind::Unreachable => StatusCode::BAD_REQUEST,
        ErrorKind::TransitFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Node(e) => {
                let status = status_code(&e);
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", e);
                }
                (status, e.to_string())
            }
            Self::BadBody(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
        };
        (status, Json(NodeResponse::failure(message))).into_response()
    }
}

type Reply<T> = std::result::Result<Json<T>, ApiError>;

pub fn router(node: Arc<NodeService>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/collect_resources", post(collect_resources))
        .route("/create_army", post(create_army))
        .route("/move_army", post(move_army))
        .route("/all_out_attack", post(all_out_attack))
        .route("/send_resources_to_capital", post(send_resources_to_capital))
        .route("/receive_army", post(receive_army))
        .route("/receive_resources", post(receive_resources))
        .route("/reset", post(reset))
        .with_state(node)
}

/// Serve `node` on `listener` until `shutdown` fires
pub async fn serve(
    node: Arc<NodeService>,
    listener: TcpListener,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("{} listening on {}", node.location().name, addr);

    axum::serve(listener, router(node))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn status(State(node): State<Arc<NodeService>>) -> Reply<LocationStatus> {
    Ok(Json(node.status().await?))
}

async fn collect_resources(State(node): State<Arc<NodeService>>) -> Reply<NodeResponse> {
    Ok(Json(node.collect_resources().await?))
}

async fn create_army(State(node): State<Arc<NodeService>>) -> Reply<NodeResponse> {
    Ok(Json(node.create_army().await?))
}

async fn move_army(
    State(node): State<Arc<NodeService>>,
    body: std::result::Result<Json<MoveArmyRequest>, JsonRejection>,
) -> Reply<NodeResponse> {
    let Json(request) = body?;
    Ok(Json(node.move_army(request).await?))
}

async fn all_out_attack(State(node): State<Arc<NodeService>>) -> Reply<NodeResponse> {
    Ok(Json(node.all_out_attack().await?))
}

async fn send_resources_to_capital(State(node): State<Arc<NodeService>>) -> Reply<NodeResponse> {
    Ok(Json(node.send_resources_to_capital().await?))
}

async fn receive_army(
    State(node): State<Arc<NodeService>>,
    body: std::result::Result<Json<ArmyEnvelope>, JsonRejection>,
) -> Reply<NodeResponse> {
    let Json(envelope) = body?;
    Ok(Json(node.receive_army(envelope).await?))
}

async fn receive_resources(
    State(node): State<Arc<NodeService>>,
    body: std::result::Result<Json<ResourceEnvelope>, JsonRejection>,
) -> Reply<NodeResponse> {
    let Json(envelope) = body?;
    Ok(Json(node.receive_resources(envelope).await?))
}

/// An empty or unreadable body resets the whole world
async fn reset(
    State(node): State<Arc<NodeService>>,
    body: Option<Json<ResetRequest>>,
) -> Reply<NodeResponse> {
    let propagate = body.map_or(true, |Json(request)| request.propagate);
    Ok(Json(node.reset(propagate).await?))
}
