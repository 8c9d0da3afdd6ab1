//! # API Endpoint Handlers
//!
//! Every handler receives the `RequestContext` resolved by the auth
//! middleware and hands it to the engine unchanged. Reads share the session
//! lock; writes take it exclusively, so at most one move or insert runs at a
//! time.

use super::{
    AppState,
    types::{
        CheckResponse, ExportResponse, HealthResponse, InsertRequest, MoveRequest, PageResponse,
        QueryRequest, QueryResponse, StatusResponse, TrashRequest, status_for,
    },
};
use crate::cli::save_session;
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use pagetree_core::{Node, NodeId, RequestContext, Session, TreeError, snapshot_to_bytes};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get tree status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    match session.metrics() {
        Ok(metrics) => Ok((
            StatusCode::OK,
            Json(StatusResponse::from_metrics(
                &metrics,
                session.is_persistent(),
            )),
        )),
        Err(e) => {
            tracing::error!("Status failed: {}", e);
            Err((status_for(&e), e.to_string()))
        }
    }
}

// =============================================================================
// QUERY HANDLER
// =============================================================================

/// Run a page query as the caller.
pub async fn query_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let options = match request.to_options() {
        Ok(options) => options,
        Err(e) => {
            return (
                status_for(&e),
                Json(QueryResponse::error(format!("Query failed: {}", e))),
            );
        }
    };

    let session = state.session.read().await;
    let cursor = session.find(&ctx).with_options(options);
    let result = if request.single {
        cursor.to_object().map(|view| view.into_iter().collect::<Vec<_>>())
    } else {
        cursor.to_vec()
    };

    match result {
        Ok(views) => (StatusCode::OK, Json(QueryResponse::with_pages(&views))),
        Err(e) => (
            status_for(&e),
            Json(QueryResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

// =============================================================================
// WRITE HANDLERS
// =============================================================================

/// Insert a page.
pub async fn insert_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<InsertRequest>,
) -> impl IntoResponse {
    let mut session = state.session.write().await;
    let result = write_through(&state, &mut session, |session| {
        session.insert(&ctx, NodeId(request.parent), request.to_draft())
    });
    page_result(result, "Insert failed")
}

/// Move a page relative to another page.
pub async fn move_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<MoveRequest>,
) -> impl IntoResponse {
    let mut session = state.session.write().await;
    let result = write_through(&state, &mut session, |session| {
        session.move_node(
            &ctx,
            NodeId(request.node),
            NodeId(request.target),
            request.position,
        )
    });
    page_result(result, "Move failed")
}

/// Move a page into the trash container.
pub async fn trash_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<TrashRequest>,
) -> impl IntoResponse {
    let mut session = state.session.write().await;
    let result = write_through(&state, &mut session, |session| {
        session.trash(&ctx, NodeId(request.node))
    });
    page_result(result, "Trash failed")
}

fn page_result(
    result: Result<Node, TreeError>,
    action: &str,
) -> (StatusCode, Json<PageResponse>) {
    match result {
        Ok(node) => (StatusCode::OK, Json(PageResponse::success(&node))),
        Err(e) => {
            if matches!(e, TreeError::PartialFailure { .. } | TreeError::Store(_)) {
                tracing::error!("{}: {}", action, e);
            }
            (
                status_for(&e),
                Json(PageResponse::error(format!("{}: {}", action, e))),
            )
        }
    }
}

/// Run a write, then rewrite the snapshot file on the file backend.
///
/// When the save fails the session is rolled back to its state before the
/// write, so the served tree never drifts from the file.
fn write_through<F>(state: &AppState, session: &mut Session, write: F) -> Result<Node, TreeError>
where
    F: FnOnce(&mut Session) -> Result<Node, TreeError>,
{
    let Some(path) = &state.snapshot_file else {
        return write(session);
    };
    let before = session.snapshot()?;
    let node = write(session)?;
    if let Err(e) = save_session(session, path) {
        tracing::error!(error = %e, file = ?path, "snapshot save failed, rolling back write");
        session.restore(before)?;
        return Err(e);
    }
    Ok(node)
}

// =============================================================================
// CHECK HANDLER
// =============================================================================

/// Verify tree invariants. Admin only.
pub async fn check_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    if !ctx.admin {
        return (
            StatusCode::FORBIDDEN,
            Json(CheckResponse::error("Check requires administrative rights")),
        );
    }

    let session = state.session.read().await;
    match session.verify() {
        Ok(violations) => (StatusCode::OK, Json(CheckResponse::success(violations))),
        Err(e) => (
            status_for(&e),
            Json(CheckResponse::error(format!("Check failed: {}", e))),
        ),
    }
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export the whole tree as a snapshot. Admin only.
pub async fn export_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    if !ctx.admin {
        return (
            StatusCode::FORBIDDEN,
            Json(ExportResponse::error("Export requires administrative rights")),
        );
    }

    let session = state.session.read().await;
    let exported = session
        .snapshot()
        .and_then(|snapshot| Ok((snapshot_to_bytes(&snapshot)?, snapshot.nodes.len())));

    match exported {
        Ok((data, node_count)) => (
            StatusCode::OK,
            Json(ExportResponse::success(&data, node_count)),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}
