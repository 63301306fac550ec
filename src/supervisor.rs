// SPDX-License-Identifier: GPL-3.0-only

//! Process lifecycle
//!
//! Startup: singleton lock, logging, tokio runtime, camera service, background
//! tasks (parent watchdog, temp-file janitor), signal handler, HTTP server.
//!
//! Shutdown is driven by one [`CancellationToken`]. SIGINT/SIGTERM, `POST
//! /shutdown` and a lost parent all cancel it; the device is then forced
//! closed, background tasks get a bounded grace period, and the lock file is
//! removed.

use crate::backends::camera::CaptureBackend;
use crate::config::{AppPaths, ServerConfig};
use crate::constants::LOCK_TAKEOVER_TIMEOUT;
use crate::errors::SupervisorError;
use crate::janitor;
use crate::logging;
use crate::server::{self, AppState};
use crate::service::CameraService;
use crate::singleton::{ParentWatchdog, ProcessTable, SingletonLock, SystemProcesses};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Run the server until it is told to stop
///
/// Returns `Err(SupervisorError::ParentLost)` when the launching process went
/// away; resources are already released at that point.
pub fn run(config: ServerConfig, backend: Box<dyn CaptureBackend>) -> Result<(), SupervisorError> {
    let paths = config.paths();
    paths.ensure_dirs()?;

    let processes: Arc<dyn ProcessTable> = Arc::new(SystemProcesses);
    let (mut lock, _log_guard) =
        acquire_instance(&paths, processes.as_ref(), LOCK_TAKEOVER_TIMEOUT)?;
    info!(
        version = env!("GIT_VERSION"),
        base = %paths.base.display(),
        pid = lock.owner(),
        "Camera server starting"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Termination signal received");
        signal_token.cancel();
    }) {
        warn!(error = %e, "Failed to install signal handler");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("camera-server")
        .build()?;

    let result = runtime.block_on(serve_until_stopped(
        &config,
        &paths,
        backend,
        Arc::clone(&processes),
        shutdown,
    ));

    // A frame read stuck in the driver must not keep the process alive
    runtime.shutdown_timeout(config.shutdown_grace());

    // A successor truncates the log once it owns the lock
    match &result {
        Ok(()) => info!("Camera server stopped"),
        Err(SupervisorError::ParentLost { pid }) => info!(pid, "Exiting after parent loss"),
        Err(e) => error!(error = %e, "Camera server failed"),
    }
    lock.release();
    result
}

/// Take the singleton lock, then open the per-run log file
///
/// Lock takeover is logged to the console only; the log file is not touched
/// unless the lock was won.
pub fn acquire_instance(
    paths: &AppPaths,
    processes: &dyn ProcessTable,
    timeout: Duration,
) -> Result<(SingletonLock, Option<WorkerGuard>), SupervisorError> {
    let lock = tracing::subscriber::with_default(logging::console_subscriber(), || {
        SingletonLock::acquire_with_timeout(&paths.lock_file(), processes, timeout)
    })?;
    let log_guard = logging::init(Some(&paths.logs_dir()))?;
    Ok((lock, log_guard))
}

/// Serve HTTP until `shutdown` is cancelled, then clean up
///
/// Everything after the singleton lock lives here so it can run on any tokio
/// runtime.
pub async fn serve_until_stopped(
    config: &ServerConfig,
    paths: &AppPaths,
    backend: Box<dyn CaptureBackend>,
    processes: Arc<dyn ProcessTable>,
    shutdown: CancellationToken,
) -> Result<(), SupervisorError> {
    let tasks = TaskTracker::new();
    let service = Arc::new(CameraService::new(
        backend,
        config,
        paths.images_dir(),
        Handle::current(),
        tasks.clone(),
        shutdown.clone(),
    ));

    let host = resolve_host(config)?;
    let listener = TcpListener::bind(SocketAddr::new(host, config.port)).await?;
    let bound = listener.local_addr()?;
    let public_host = if bound.ip().is_unspecified() {
        server::default_host()
    } else {
        bound.ip()
    };
    let public_url = format!("http://{}", SocketAddr::new(public_host, bound.port()));

    let (lost_tx, mut lost_rx) = oneshot::channel();
    if config.watchdog.enabled {
        let watchdog = match config.watchdog.parent_pid {
            Some(pid) => ParentWatchdog::new(pid, config.watchdog.poll_interval(), processes),
            None => ParentWatchdog::for_parent(config.watchdog.poll_interval(), processes),
        };
        let cancel = shutdown.clone();
        tasks.spawn(async move {
            if let Err(SupervisorError::ParentLost { pid }) = watchdog.run(cancel.clone()).await {
                let _ = lost_tx.send(pid);
                cancel.cancel();
            }
        });
    }

    if config.janitor.enabled {
        tasks.spawn(janitor::run(
            paths.images_dir(),
            config.janitor.clone(),
            shutdown.clone(),
        ));
    }

    let state = AppState {
        service: Arc::clone(&service),
        shutdown: shutdown.clone(),
        public_url,
    };
    let mut server = tokio::spawn(server::serve(listener, state));

    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = &mut server => {
            match result {
                Ok(Ok(())) => warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
            shutdown.cancel();
        }
    }

    info!("Shutting down");
    if let Err(e) = service.shutdown_device().await {
        warn!(error = %e, "Failed to close camera");
    }
    tasks.close();

    let grace = config.shutdown_grace();
    let drained = async {
        if !server.is_finished() {
            let _ = (&mut server).await;
        }
        tasks.wait().await;
    };
    if tokio::time::timeout(grace, drained).await.is_err() {
        warn!(grace_ms = grace.as_millis() as u64, "Background tasks did not stop in time");
        server.abort();
    } else {
        debug!("All background tasks stopped");
    }

    match lost_rx.try_recv() {
        Ok(pid) => Err(SupervisorError::ParentLost { pid }),
        Err(_) => Ok(()),
    }
}

fn resolve_host(config: &ServerConfig) -> Result<IpAddr, SupervisorError> {
    match &config.host {
        Some(host) => host
            .parse()
            .map_err(|e| SupervisorError::Config(format!("invalid host {:?}: {}", host, e))),
        None => Ok(server::default_host()),
    }
}
