use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use hyper::{Request, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use russh::{keys::decode_secret_key, server::Config};
use tokio::{
    fs,
    net::{TcpListener, TcpStream},
    pin,
};

use crate::{
    TunnelServer, config::ApplicationConfig, droppable_handle::DroppableHandle,
    http::proxy_handler,
};

// Main entrypoint of the application.
pub async fn entrypoint(config: ApplicationConfig) -> anyhow::Result<()> {
    let key = fs::read_to_string(config.private_key_file.as_path())
        .await
        .with_context(|| "Error reading host key")?;
    let key = decode_secret_key(&key, None).with_context(|| "Error decoding host key")?;
    let ssh_config = Arc::new(Config {
        auth_rejection_time: Duration::from_secs(2),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        inactivity_timeout: Some(Duration::from_secs(3_600)),
        keepalive_interval: Some(Duration::from_secs(15)),
        keepalive_max: 4,
        keys: vec![key],
        ..Default::default()
    });
    let server = Arc::new(TunnelServer::new());

    let http_listener = TcpListener::bind((config.listen_address, config.http_port.get()))
        .await
        .with_context(|| "Error listening to HTTP port")?;
    info!("Listening for HTTP connections on port {}.", config.http_port);
    let registry = Arc::clone(&server.registry);
    let mut join_handle_http = DroppableHandle(tokio::spawn(async move {
        loop {
            let (stream, address) = match http_listener.accept().await {
                Ok(conn) => conn,
                Err(error) => {
                    error!("Unable to accept HTTP connection: {}", error);
                    continue;
                }
            };
            if let Err(error) = stream.set_nodelay(true) {
                warn!("Error setting nodelay for {}: {}", address, error);
            }
            let registry = Arc::clone(&registry);
            let service = service_fn(move |request: Request<Incoming>| {
                proxy_handler(request, address, Arc::clone(&registry))
            });
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let conn = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades();
                if let Err(error) = conn.await {
                    debug!("HTTP connection with {} closed: {}", address, error);
                }
            });
        }
    }));

    let ssh_listener = TcpListener::bind((config.listen_address, config.ssh_port.get()))
        .await
        .with_context(|| "Error listening to SSH port")?;
    info!("Listening for SSH connections on port {}.", config.ssh_port);
    let signal_handler = wait_for_signal();
    pin!(signal_handler);
    loop {
        tokio::select! {
            conn = ssh_listener.accept() => {
                let (stream, address) = match conn {
                    Ok(conn) => conn,
                    Err(error) => {
                        error!("Unable to accept SSH connection: {}", error);
                        continue;
                    }
                };
                if let Err(error) = stream.set_nodelay(true) {
                    warn!("Error setting nodelay for {}: {}", address, error);
                }
                handle_ssh_connection(stream, address, Arc::clone(&ssh_config), &server);
            }
            _ = &mut signal_handler => {
                break;
            }
            _ = &mut join_handle_http.0 => {
                anyhow::bail!("HTTP listener task ended unexpectedly");
            }
        }
    }
    info!("Shutting down.");
    Ok(())
}

fn handle_ssh_connection(
    stream: TcpStream,
    address: SocketAddr,
    config: Arc<Config>,
    server: &Arc<TunnelServer>,
) {
    let handler = server.new_client(address);
    tokio::spawn(async move {
        let session = match russh::server::run_stream(config, stream, handler).await {
            Ok(session) => session,
            Err(error) => {
                warn!("SSH connection setup failed for {}: {}", address, error);
                return;
            }
        };
        if let Err(error) = session.await {
            debug!("SSH connection with {} closed: {}", address, error);
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signal_terminate = signal(SignalKind::terminate()).unwrap();
    let mut signal_interrupt = signal(SignalKind::interrupt()).unwrap();

    tokio::select! {
        _ = signal_terminate.recv() => debug!("Received SIGTERM."),
        _ = signal_interrupt.recv() => debug!("Received SIGINT."),
    };
}

#[cfg(windows)]
async fn wait_for_signal() {
    use tokio::signal::windows;

    let mut signal_c = windows::ctrl_c().unwrap();
    let mut signal_break = windows::ctrl_break().unwrap();
    let mut signal_close = windows::ctrl_close().unwrap();
    let mut signal_shutdown = windows::ctrl_shutdown().unwrap();

    tokio::select! {
        _ = signal_c.recv() => debug!("Received CTRL_C."),
        _ = signal_break.recv() => debug!("Received CTRL_BREAK."),
        _ = signal_close.recv() => debug!("Received CTRL_CLOSE."),
        _ = signal_shutdown.recv() => debug!("Received CTRL_SHUTDOWN."),
    };
}
