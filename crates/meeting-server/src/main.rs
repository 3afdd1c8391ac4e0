//! Meeting server binary.
//!
//! Loads configuration (path overridable via `MEETING_SERVER_CONFIG`),
//! installs the log sinks, wires the component graph, and registers this
//! instance with the discovery layer. The transport listener plugs into
//! the [`meeting_server::server`] facade; embedders drive the lifecycle
//! through [`meeting_server::app::App`] directly.

use std::io::Read;
use std::time::Duration;

use common::config::AppConfig;
use common::logging::init_logging;
use meeting_server::app::App;
use tracing::{error, info};

fn main() {
    let config = match AppConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.logging);
    log_panics();

    info!(
        target: "meeting.main",
        host = %config.server.host,
        port = config.server.port,
        storage_enabled = config.storage.mysql.enabled,
        cache_enabled = config.cache.redis.enabled,
        discovery = !config.zookeeper.hosts.is_empty(),
        "starting meeting server"
    );

    let app = App::build(&config);
    app.register_self();

    // Serve until stdin closes (process supervisors send EOF or a signal
    // on stop), then withdraw the endpoint and drain the executor.
    let mut sink = [0u8; 64];
    while matches!(std::io::stdin().read(&mut sink), Ok(n) if n > 0) {}

    info!(target: "meeting.main", "shutdown requested");
    app.shutdown(Duration::from_secs(30));
}

fn log_panics() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(target: "meeting.main", %panic_info, "panic");
        default_hook(panic_info);
    }));
}
