use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{body::Body as AxumBody, response::IntoResponse};
use hyper::{
    Request, Response, StatusCode,
    body::Body,
    header::{CONTENT_TYPE, HOST, HeaderValue, UPGRADE, USER_AGENT},
};
use hyper_util::rt::TokioIo;
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite, copy_bidirectional};

use crate::{error::ServerError, registry::HostRegistry, tunnel::TunnelHandler};

const X_FORWARDED_FOR: &str = "X-Forwarded-For";
const X_FORWARDED_HOST: &str = "X-Forwarded-Host";

// Error page for hostnames without a live forwarding session.
pub(crate) const NOT_FOUND_PAGE: &str = r#"<html>
<head><title>404 Not Found</title></head>
<body>
<center><h1>404 Not Found</h1></center>
<hr><center>tunnel</center>
</body>
</html>"#;

fn http_log(status: u16, method: &str, uri: &str, elapsed: Duration) {
    info!("[{:3}] {:^7} {} {:?}", status, method, uri, elapsed);
}

// Routes one HTTP request through the SSH session that claimed its Host
// header, opening a fresh tunneling channel for the upstream leg.
pub(crate) async fn proxy_handler<B, H, T>(
    mut request: Request<B>,
    tcp_address: std::net::SocketAddr,
    registry: Arc<HostRegistry<Arc<H>>>,
) -> anyhow::Result<Response<AxumBody>>
where
    H: TunnelHandler<T>,
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    B: Body + Send + 'static,
    <B as Body>::Data: Send + Sync + 'static,
    <B as Body>::Error: Error + Send + Sync + 'static,
{
    let timer = Instant::now();
    let host = request
        .headers()
        .get(HOST)
        .ok_or(ServerError::MissingHostHeader)?
        .to_str()?
        .split(':')
        .next()
        .ok_or(ServerError::InvalidHostHeader)?
        .to_ascii_lowercase();
    let Some(handler) = registry.get(&host) else {
        return Ok((
            StatusCode::NOT_FOUND,
            [(CONTENT_TYPE, "text/html")],
            NOT_FOUND_PAGE,
        )
            .into_response());
    };

    // The upstream request always names the claimed hostname, however the
    // client spelled it. An absent User-Agent is pinned to an explicit
    // empty one so the HTTP client cannot substitute its own.
    request.headers_mut().insert(HOST, host.parse()?);
    if !request.headers().contains_key(USER_AGENT) {
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(""));
    }
    request
        .headers_mut()
        .insert(X_FORWARDED_FOR, tcp_address.ip().to_string().parse()?);
    request.headers_mut().insert(X_FORWARDED_HOST, host.parse()?);

    let io = match handler.tunneling_channel().await {
        Ok(channel) => TokioIo::new(channel),
        Err(error) => {
            warn!("Failed to open tunneling channel for {}: {}", host, error);
            return Ok((StatusCode::BAD_GATEWAY, "").into_response());
        }
    };
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    let method = request.method().to_string();
    let uri = request.uri().to_string();
    match request.headers().get(UPGRADE) {
        None => {
            tokio::spawn(async move {
                if let Err(error) = conn.await {
                    warn!("Tunnel connection failed: {}", error);
                }
            });
            let response = sender.send_request(request).await?;
            http_log(response.status().as_u16(), &method, &uri, timer.elapsed());
            Ok(response.into_response())
        }

        Some(request_upgrade) => {
            tokio::spawn(async move {
                if let Err(error) = conn.with_upgrades().await {
                    warn!("Tunnel connection failed: {}", error);
                }
            });
            let request_type = request_upgrade.to_str()?.to_string();
            let upgraded_request = hyper::upgrade::on(&mut request);
            let mut response = sender.send_request(request).await?;
            http_log(response.status().as_u16(), &method, &uri, timer.elapsed());
            match response.status() {
                StatusCode::SWITCHING_PROTOCOLS => {
                    if request_type
                        == response
                            .headers()
                            .get(UPGRADE)
                            .ok_or(ServerError::MissingUpgradeHeader)?
                            .to_str()?
                    {
                        let upgraded_response = hyper::upgrade::on(&mut response).await?;
                        tokio::spawn(async move {
                            let Ok(upgraded_request) = upgraded_request.await else {
                                return;
                            };
                            let mut upgraded_request = TokioIo::new(upgraded_request);
                            let mut upgraded_response = TokioIo::new(upgraded_response);
                            let _ =
                                copy_bidirectional(&mut upgraded_response, &mut upgraded_request)
                                    .await;
                        });
                    }
                    Ok(response.into_response())
                }
                _ => Ok(response.into_response()),
            }
        }
    }
}
