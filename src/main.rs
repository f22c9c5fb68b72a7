//! aesdsocket: an append-and-replay socket server
//!
//! Every byte a client sends is appended to a shared file. Each time a
//! newline completes a frame, the whole file is streamed back to that
//! client.
//!
//! Features:
//! - Fixed port 9000, one connection serviced at a time
//! - Store shared by all connections and deleted on SIGINT/SIGTERM
//! - Optional background mode (`-d`)

mod config;
mod daemon;
mod error;
mod framing;
mod listener;
mod logging;
mod server;
mod session;
mod shutdown;
mod store;

use config::Config;
use error::StartupError;
use shutdown::{BlockedSignals, Shutdown};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    // Load configuration
    let config = Config::load();

    // Initialize logging
    let syslog = logging::init(&config.log_level);

    info!(
        address = %config.listen_addr(),
        daemon = config.daemon,
        data_file = %config.data_file.display(),
        "Starting aesdsocket server"
    );

    let code = match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, class = %e.class(), "Startup failed");
            ExitCode::FAILURE
        }
    };
    syslog.close();
    code
}

/// Bring the server up in order and serve until shutdown.
fn run(config: Config) -> Result<(), StartupError> {
    // Held until handlers exist; the runtime can only be built after the fork.
    let blocked = BlockedSignals::block().map_err(StartupError::Signals)?;

    let bound = listener::bind(config.listen_addr())?;

    if config.daemon {
        match daemon::detach()? {
            daemon::Role::Parent => return Ok(()),
            daemon::Role::Child => {}
        }
    }

    let std_listener = bound.listen(config.backlog)?;

    // Built after any fork so the runtime's threads belong to the child.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    runtime.block_on(async move {
        let shutdown = Shutdown::new();
        shutdown::install(shutdown.clone())?;
        drop(blocked);

        let listener = listener::Listener::from_std(std_listener, shutdown)
            .map_err(StartupError::Listen)?;
        server::Server::new(listener, &config).run().await;

        info!("Server stopped");
        Ok(())
    })
}
