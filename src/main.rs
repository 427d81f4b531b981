mod agents;
mod config;
mod crypto;
mod error;
mod handlers;
mod metrics;
mod pipeline;
mod router;
mod utils;
mod validation;
mod web;

use crate::config::{ConfigBuilder, ConfigError};
use crate::utils::logger;
use crate::web::Service;
use docopt::Docopt;
use futures_util::future;
use hyper::{server::conn::AddrStream, service::make_service_fn, Server};
use listenfd::ListenFd;
use log::{error, info};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::process::exit;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Defines the program's version, as set by Cargo at compile time.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Defines the program's usage string.
///
/// [Docopt](http://docopt.org) parses this and generates a custom argv parser.
const USAGE: &str = r#"
LTI bridge

Usage:
  lti-bridge [options] [CONFIGFILE]
  lti-bridge --version
  lti-bridge --help

Options:
  --version  Print version information and exit
  --help     Print this help message and exit
"#;

/// Holds parsed command line parameters.
#[derive(Deserialize)]
#[allow(non_snake_case)]
struct Args {
    arg_CONFIGFILE: Option<String>,
}

/// Log a configuration error and exit.
fn config_error(err: ConfigError) -> ! {
    error!("{}", err);
    exit(1);
}

/// The `main()` method. Will loop forever to serve HTTP requests.
#[tokio::main]
async fn main() {
    logger::init();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.version(Some(VERSION.to_owned())).deserialize())
        .unwrap_or_else(|e| e.exit());

    let mut builder = ConfigBuilder::new();
    if let Some(ref path) = args.arg_CONFIGFILE {
        if let Err(err) = builder.update_from_file(Path::new(path)) {
            config_error(err);
        }
    }
    builder.update_from_common_env();
    if let Err(err) = builder.update_from_bridge_env() {
        config_error(err);
    }
    let app = Arc::new(builder.done().await.unwrap_or_else(|err| config_error(err)));

    let service_app = Arc::clone(&app);
    let make_service = make_service_fn(move |stream: &AddrStream| {
        metrics::HTTP_CONNECTIONS.inc();
        future::ok::<_, hyper::Error>(Service::new(Arc::clone(&service_app), stream))
    });

    // Prefer a socket handed to us by a service manager.
    let mut listenfd = ListenFd::from_env();
    let server = match listenfd.take_tcp_listener(0) {
        Ok(Some(listener)) => Server::from_tcp(listener),
        Ok(None) => {
            let ip_addr: IpAddr = app.listen_ip.parse().unwrap_or_else(|err| {
                error!("invalid listen_ip {:?}: {}", app.listen_ip, err);
                exit(1);
            });
            Server::try_bind(&SocketAddr::new(ip_addr, app.listen_port))
        }
        Err(err) => {
            error!("could not use the inherited socket: {}", err);
            exit(1);
        }
    }
    .unwrap_or_else(|err| {
        error!("could not bind the server socket: {}", err);
        exit(1);
    })
    .serve(make_service);

    info!("Listening on http://{}", server.local_addr());

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut shutdown_tx = Some(shutdown_tx);
    if let Err(err) = ctrlc::set_handler(move || {
        if let Some(tx) = shutdown_tx.take() {
            let _ = tx.send(());
        }
    }) {
        error!("could not install the signal handler: {}", err);
        exit(1);
    }
    let server = server.with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
        info!("Shutting down");
    });

    #[cfg(unix)]
    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        error!("could not signal ready to the service manager: {}", err);
    }

    if let Err(err) = server.await {
        error!("server error: {}", err);
    }

    #[cfg(unix)]
    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]) {
        error!("could not signal stopping to the service manager: {}", err);
    }
}
