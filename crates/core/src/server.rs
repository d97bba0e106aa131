use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use crate::error::{LiveRtpError, Result};
use crate::protocol::SdpHandle;
use crate::transport::http;

/// HTTP endpoint publishing the stream's session description.
///
/// Runs a single-threaded tokio runtime on its own thread, leaving the
/// pipeline thread fully synchronous. The description itself is shared
/// through an [`SdpHandle`] so the pipeline can update it while the
/// server runs.
pub struct SdpServer {
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    sdp: SdpHandle,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SdpServer {
    pub fn new(bind_addr: &str, sdp: SdpHandle) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            sdp,
            shutdown: None,
            worker: None,
        }
    }

    /// Bind and start serving. Bind errors are reported here, not on the
    /// server thread.
    pub fn start(&mut self) -> Result<()> {
        if self.shutdown.is_some() {
            return Err(LiveRtpError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sdp = self.sdp.clone();

        let worker = thread::Builder::new()
            .name("sdp-http".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            tracing::error!(error = %e, "SDP listener setup failed");
                            return;
                        }
                    };
                    if let Err(e) = http::serve(listener, sdp, shutdown_rx).await {
                        tracing::error!(error = %e, "SDP server failed");
                    }
                });
                tracing::debug!("SDP server thread exited");
            })?;

        tracing::info!(addr = %local_addr, "SDP server listening");
        self.local_addr = Some(local_addr);
        self.shutdown = Some(shutdown_tx);
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop accepting, finish in-flight requests and join the server thread.
    pub fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        tracing::info!("SDP server stopping");
        let _ = shutdown.send(());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("SDP server thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Address actually bound, once started (resolves port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for SdpServer {
    fn drop(&mut self) {
        self.stop();
    }
}
