// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! HTTP control plane.
//!
//! Every request is answered as soon as the name and mode are validated; the
//! process action itself runs in the background on the service's controller.

use crate::controller::Ticket;
use crate::dispatch::Dispatcher;
use crate::error::{Result, SupervisorError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const HOME_TEXT: &str = "This is diploy home";
pub const STARTED_MESSAGE: &str = "started in background";
pub const STOPPING_MESSAGE: &str = "started stopping processes";
pub const FAILED_MESSAGE: &str = "failed";

pub type AppState = Arc<Dispatcher>;

/// Body of every control response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub message: String,
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn accepted(message: &str) -> Self {
        Self {
            message: message.to_string(),
            error: None,
        }
    }

    pub fn failed(error: &SupervisorError) -> Self {
        Self {
            message: FAILED_MESSAGE.to_string(),
            error: Some(error.to_string()),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/start/:mode/:name", post(start_handler))
        .route("/stop/:name", post(stop_handler))
        .route("/restart/:name", post(restart_handler))
        .with_state(state)
}

/// Serve the control plane on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn home_handler() -> &'static str {
    HOME_TEXT
}

async fn start_handler(
    State(dispatcher): State<AppState>,
    Path((mode, name)): Path<(String, String)>,
) -> ApiReply {
    reply(dispatcher.start(&name, &mode), STARTED_MESSAGE)
}

async fn stop_handler(State(dispatcher): State<AppState>, Path(name): Path<String>) -> ApiReply {
    reply(dispatcher.stop(&name), STOPPING_MESSAGE)
}

async fn restart_handler(
    State(dispatcher): State<AppState>,
    Path(name): Path<String>,
) -> ApiReply {
    reply(dispatcher.restart(&name), STARTED_MESSAGE)
}

/// The ticket is dropped: the operation proceeds without anyone waiting on it.
fn reply(dispatched: Result<Ticket>, message: &str) -> ApiReply {
    match dispatched {
        Ok(ticket) => {
            info!(service = ticket.service(), operation = %ticket.operation(), "request accepted");
            (StatusCode::OK, Json(ApiResponse::accepted(message)))
        }
        Err(e) => {
            warn!("request rejected: {e}");
            (StatusCode::BAD_REQUEST, Json(ApiResponse::failed(&e)))
        }
    }
}
