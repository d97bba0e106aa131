//! HTTP endpoint serving the session description.

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::protocol::{SDP_CONTENT_TYPE, SDP_PATH, SdpHandle};

/// Router with the single SDP route. `get` also answers `HEAD`; other
/// methods on the path get `405`, other paths `404`.
pub fn router(sdp: SdpHandle) -> Router {
    Router::new()
        .route(SDP_PATH, get(sdp_handler))
        .with_state(sdp)
}

async fn sdp_handler(State(sdp): State<SdpHandle>) -> impl IntoResponse {
    tracing::debug!("SDP requested");
    ([(header::CONTENT_TYPE, SDP_CONTENT_TYPE)], sdp.render())
}

/// Serve until `shutdown` fires or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    sdp: SdpHandle,
    shutdown: oneshot::Receiver<()>,
) -> std::io::Result<()> {
    axum::serve(listener, router(sdp))
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await
}
