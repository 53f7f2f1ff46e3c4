//! Thin axum JSON API over onboarding, autocomplete and the finance read side.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use divscan_core::{Company, CompanyDividends};
use divscan_sync::{DividendError, Services};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "divscan-web";

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[derive(Debug, Deserialize)]
struct KeywordQuery {
    keyword: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    ticker: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(DividendError);

impl From<DividendError> for ApiError {
    fn from(err: DividendError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DividendError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            DividendError::AlreadyExists(_) => StatusCode::CONFLICT,
            DividendError::NotFound(_) => StatusCode::NOT_FOUND,
            DividendError::TransientSource(_) => StatusCode::SERVICE_UNAVAILABLE,
            DividendError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/company", get(list_companies_handler).post(register_company_handler))
        .route("/company/autocomplete", get(autocomplete_handler))
        .route("/company/search", get(keyword_search_handler))
        .route("/company/{ticker}", axum::routing::delete(delete_company_handler))
        .route("/finance/dividend/{company_name}", get(dividends_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(
    services: Services,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "http api listening");
    axum::serve(listener, app(AppState::new(services)))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn port_from_env() -> u16 {
    std::env::var("DIVSCAN_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn list_companies_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Company>>, ApiError> {
    Ok(Json(state.services.onboarding.list_companies().await?))
}

async fn register_company_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Company>, ApiError> {
    Ok(Json(state.services.onboarding.register_company(&request.ticker).await?))
}

async fn delete_company_handler(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<Company>, ApiError> {
    Ok(Json(state.services.onboarding.delete_company(&ticker).await?))
}

async fn autocomplete_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeywordQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let limit = query.limit.unwrap_or(state.services.config.autocomplete_limit);
    Ok(Json(state.services.onboarding.autocomplete(&query.keyword, limit)?))
}

async fn keyword_search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeywordQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let limit = query.limit.unwrap_or(state.services.config.autocomplete_limit);
    Ok(Json(
        state
            .services
            .onboarding
            .search_by_keyword(&query.keyword, limit)
            .await?,
    ))
}

async fn dividends_handler(
    State(state): State<Arc<AppState>>,
    Path(company_name): Path<String>,
) -> Result<Json<CompanyDividends>, ApiError> {
    Ok(Json(
        state
            .services
            .finance
            .dividends_by_company_name(&company_name)
            .await?,
    ))
}
