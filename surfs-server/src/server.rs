use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use surfs_core::SurfsError;
use surfs_core::rpc::protocol::*;
use surfs_core::rpc::{BlockStoreApi, MetadataStoreApi};
use tower_http::trace::TraceLayer;

/// Upper bound on a single uploaded block
pub const MAX_BLOCK_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Upper bound on a metadata request. A hash list costs about 47 bytes per
/// block, so this admits files of several million blocks.
pub const MAX_METADATA_BODY_BYTES: usize = 256 * 1024 * 1024;

type BlockState = Arc<dyn BlockStoreApi>;
type MetadataState = Arc<dyn MetadataStoreApi>;

pub fn error_status(error: &SurfsError) -> StatusCode {
    match error {
        SurfsError::InvalidRequest(_) | SurfsError::HashMismatch { .. } => StatusCode::BAD_REQUEST,
        SurfsError::NotFound(_) => StatusCode::NOT_FOUND,
        SurfsError::VersionConflict { .. } => StatusCode::CONFLICT,
        SurfsError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: SurfsError) -> Response {
    let status = error_status(&error);
    if status.is_server_error() {
        tracing::error!("request failed: {}", error);
    } else {
        tracing::debug!("request rejected: {}", error);
    }

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

pub fn block_store_router(store: BlockState) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(health_handler))
        .route(ENDPOINT_BLOCKS, get(get_block).put(store_block))
        .route(ENDPOINT_HAS_BLOCK, get(has_block))
        .layer(DefaultBodyLimit::max(MAX_BLOCK_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn store_block(
    State(store): State<BlockState>,
    Query(query): Query<HashQuery>,
    body: Bytes,
) -> Response {
    match store.store_block(&query.hash, body).await {
        Ok(()) => (StatusCode::OK, Json(StoreBlockResponse { success: true })).into_response(),
        Err(error) => error_response(error),
    }
}

async fn has_block(State(store): State<BlockState>, Query(query): Query<HashQuery>) -> Response {
    match store.has_block(&query.hash).await {
        Ok(present) => (StatusCode::OK, Json(HasBlockResponse { success: present })).into_response(),
        Err(error) => error_response(error),
    }
}

async fn get_block(State(store): State<BlockState>, Query(query): Query<HashQuery>) -> Response {
    match store.get_block(&query.hash).await {
        Ok(Some(data)) => (StatusCode::OK, data).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(GetBlockMissResponse { success: false }),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub fn metadata_store_router(store: MetadataState) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(health_handler))
        .route(ENDPOINT_READ_FILE, post(read_file))
        .route(ENDPOINT_MODIFY_FILE, post(modify_file))
        .route(ENDPOINT_DELETE_FILE, post(delete_file))
        .route(ENDPOINT_GET_VERSION, post(get_version))
        .layer(DefaultBodyLimit::max(MAX_METADATA_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn read_file(
    State(store): State<MetadataState>,
    Json(request): Json<ReadFileRequest>,
) -> Response {
    match store.read_file(&request.filename).await {
        Ok(record) => (StatusCode::OK, Json(ReadFileResponse::from(record))).into_response(),
        Err(error) => error_response(error),
    }
}

async fn modify_file(
    State(store): State<MetadataState>,
    Json(request): Json<ModifyFileRequest>,
) -> Response {
    let ModifyFileRequest {
        filename,
        version,
        hash_list,
    } = request;

    match store.modify_file(&filename, version, hash_list).await {
        Ok(outcome) => (StatusCode::OK, Json(ModifyFileResponse::from(outcome))).into_response(),
        Err(error) => error_response(error),
    }
}

async fn delete_file(
    State(store): State<MetadataState>,
    Json(request): Json<DeleteFileRequest>,
) -> Response {
    match store.delete_file(&request.filename, request.version).await {
        Ok(success) => (StatusCode::OK, Json(DeleteFileResponse { success })).into_response(),
        Err(error) => error_response(error),
    }
}

async fn get_version(
    State(store): State<MetadataState>,
    Json(request): Json<GetVersionRequest>,
) -> Response {
    match store.get_version(&request.filename).await {
        Ok(version) => (StatusCode::OK, Json(GetVersionResponse { version })).into_response(),
        Err(error) => error_response(error),
    }
}

/// Serve `app` on all interfaces until ctrl-c
pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }
}
