//! Campaign HTTP server

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::Method,
    routing::{MethodRouter, get, post},
};
use broadside_common::{Signal, internal, tracing};
use broadside_dispatch::{Campaign, CampaignOutcome, CampaignTemplate};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::cors::CorsLayer;

use crate::{
    ApiConfig, ApiError, HandlerError,
    audience::{AudienceFilter, AudienceKind, AudienceSource, Selection},
};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    campaign: Arc<Campaign>,
    audience: Arc<dyn AudienceSource>,
}

impl AppState {
    pub fn new(campaign: Campaign, audience: Arc<dyn AudienceSource>) -> Self {
        Self {
            campaign: Arc::new(campaign),
            audience,
        }
    }
}

/// Build the campaign routes.
///
/// Unknown paths, and known paths with the other supported method, answer
/// 404. Any other method answers 405.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/campaigns", only(get(list)))
        .route("/api/campaigns/list", only(get(list)))
        .route("/api/campaigns/audience", only(get(audience)))
        .route("/api/campaigns/send", only(post(send)))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

fn only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(unsupported_method)
}

/// Campaign HTTP server
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Bind the listener and build the router.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the configured address fails.
    pub async fn new(config: &ApiConfig, state: AppState) -> Result<Self, ApiError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ApiError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(address = %config.listen_address, "API server bound successfully");

        Ok(Self {
            listener,
            router: router(state),
        })
    }

    /// Run until a shutdown signal is received. In-flight requests, including
    /// campaign sends, are allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ApiError> {
        tracing::info!("API server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                internal!(level = INFO, "API server received shutdown signal");
            })
            .await
            .map_err(|e| ApiError::ServerError(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    data: Vec<serde_json::Value>,
}

/// Campaigns are not stored, so the list is always empty.
async fn list() -> Json<ListResponse> {
    Json(ListResponse {
        success: true,
        data: Vec::new(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct AudienceQuery {
    #[serde(rename = "type", default)]
    kind: AudienceKind,
    #[serde(flatten)]
    filter: AudienceFilter,
}

#[derive(Serialize)]
struct AudienceEntry {
    id: i64,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct AudienceResponse {
    success: bool,
    count: usize,
    recipients: Vec<AudienceEntry>,
}

async fn audience(
    State(state): State<AppState>,
    query: Result<Query<AudienceQuery>, QueryRejection>,
) -> Result<Json<AudienceResponse>, HandlerError> {
    let Query(query) = query?;
    let recipients = state
        .audience
        .select(query.kind, Selection::Preview, &query.filter)
        .await?;

    tracing::debug!(kind = ?query.kind, count = recipients.len(), "Audience selected");

    Ok(Json(AudienceResponse {
        success: true,
        count: recipients.len(),
        recipients: recipients
            .into_iter()
            .map(|r| AudienceEntry {
                id: r.id,
                name: r.name,
                email: r.email,
            })
            .collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SendRequest {
    subject: Option<String>,
    html_content: Option<String>,
    text_content: Option<String>,
    audience_filters: AudienceFilter,
    audience_type: AudienceKind,
}

impl SendRequest {
    fn template(&self) -> CampaignTemplate {
        CampaignTemplate {
            subject: self.subject.clone().unwrap_or_default(),
            html: self.html_content.clone().unwrap_or_default(),
            text: self.text_content.clone().filter(|text| !text.is_empty()),
        }
    }
}

#[derive(Serialize)]
struct SendResponse {
    success: bool,
    #[serde(flatten)]
    outcome: CampaignOutcome,
}

async fn send(
    State(state): State<AppState>,
    request: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, HandlerError> {
    let Json(request) = request?;

    let template = request.template();
    template.validate()?;

    let recipients = state
        .audience
        .select(request.audience_type, Selection::Send, &request.audience_filters)
        .await?;

    let outcome = state.campaign.send(&template, &recipients).await?;

    internal!(
        level = INFO,
        sent = outcome.sent,
        failed = outcome.failed,
        total = outcome.total,
        "Campaign sent"
    );

    Ok(Json(SendResponse {
        success: true,
        outcome,
    }))
}

async fn not_found() -> HandlerError {
    HandlerError::not_found()
}

async fn unsupported_method(method: Method) -> HandlerError {
    if method == Method::GET || method == Method::POST {
        HandlerError::not_found()
    } else {
        HandlerError::method_not_allowed()
    }
}
