use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use server_api::{bulk_update_businesses, fetch_business_page, ApiContext};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{BulkUpdateRequest, BulkUpdateResponse, BusinessPage, PageQuery},
};
use storage::Storage;
use tracing::{error, info};

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext { storage };

    let state = AppState { api };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "directory server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/businesses", get(http_list_businesses))
        .route("/api/businesses/bulk_update", post(http_bulk_update))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_businesses(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> Result<Json<BusinessPage>, (StatusCode, Json<ApiError>)> {
    let page = fetch_business_page(&state.api, q.cursor, q.limit)
        .await
        .map_err(reject)?;
    Ok(Json(page))
}

async fn http_bulk_update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkUpdateRequest>,
) -> Result<Json<BulkUpdateResponse>, (StatusCode, Json<ApiError>)> {
    let items = bulk_update_businesses(&state.api, req.field, &req.value, &req.ids)
        .await
        .map_err(reject)?;
    Ok(Json(BulkUpdateResponse { items }))
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}
