//! Termination signals.
//!
//! SIGINT and SIGTERM are awaited on a dedicated thread running a
//! current-thread tokio runtime.  The first signal becomes a shutdown
//! request; the loop notices it within a second and runs the safe-shutdown
//! sequence.

use std::io;
use std::thread::JoinHandle;

use log::{error, info};

use crate::app::handle::ControlHandle;

/// Spawn the signal watcher.
pub fn spawn_signal_watcher(handle: ControlHandle) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            let reason = runtime.block_on(wait_for_signal());
            match reason {
                Ok(name) => {
                    info!("received {name}");
                    handle.request_shutdown(&format!("received {name}"));
                }
                Err(e) => error!("signal handling unavailable: {e}"),
            }
        })
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "interrupt")
}
