use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use log::{debug, info};
use russh::{
    Channel, MethodKind, MethodSet,
    keys::PublicKey,
    server::{Auth, Handler, Msg, Session},
};

use crate::{TunnelServer, registry::is_valid_hostname, tunnel::SshTunnelHandler};

// Handler for a single SSH connection. Sessions register hostnames with
// `tcpip-forward` and serve HTTP requests through channels this server
// opens; they never open channels of their own.
pub(crate) struct ServerHandler {
    // The unique ID of this connection.
    pub(crate) id: usize,
    // The IP and port of this connection.
    pub(crate) peer: SocketAddr,
    // Hostnames this session currently owns in the registry.
    pub(crate) claimed: HashSet<String>,
    // Reference to the shared state, for accessing the registry.
    pub(crate) server: Arc<TunnelServer>,
}

impl Handler for ServerHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::from([MethodKind::PublicKey].as_slice())),
            partial_success: false,
        })
    }

    // Any public key is accepted. Authorization is a deployment policy,
    // not a property of this server.
    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        info!("{} ({}) authenticated with public key", user, self.peer);
        Ok(Auth::Accept)
    }

    // This server initiates channels but never accepts them.
    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("Rejecting session channel from {}", self.peer);
        Ok(false)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Rejecting direct-tcpip channel to {}:{} from {}",
            host_to_connect, port_to_connect, self.peer
        );
        Ok(false)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("Rejecting x11 channel from {}", self.peer);
        Ok(false)
    }

    async fn channel_open_forwarded_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("Rejecting forwarded-tcpip channel from {}", self.peer);
        Ok(false)
    }

    // Handle a remote forwarding request: claim the hostname for this
    // session so the HTTP frontend routes requests for it through here.
    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let host = address.to_ascii_lowercase();
        if !is_valid_hostname(&host) {
            info!(
                "Rejecting tcpip-forward for {} ({}): invalid hostname",
                address, self.peer
            );
            return Ok(false);
        }
        // Only port 80 is exposed externally; 0 lets this server choose.
        if *port != 0 && *port != 80 {
            info!(
                "Rejecting tcpip-forward for {} ({}): unsupported port {}",
                host, self.peer, port
            );
            return Ok(false);
        }
        let handler = Arc::new(SshTunnelHandler::new(session.handle(), host.clone()));
        match self.server.registry.claim(host.clone(), self.id, handler) {
            Ok(()) => {
                info!("Serving HTTP for {} ({})", host, self.peer);
                self.claimed.insert(host);
                *port = 80;
                Ok(true)
            }
            Err(error) => {
                info!(
                    "Rejecting tcpip-forward for {} ({}): {}",
                    host, self.peer, error
                );
                Ok(false)
            }
        }
    }

    // A cancel only succeeds for a hostname this session itself claimed,
    // and must name the advertised port.
    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let host = address.to_ascii_lowercase();
        if port != 80 {
            info!(
                "Rejecting cancel-tcpip-forward for {} ({}): unsupported port {}",
                host, self.peer, port
            );
            return Ok(false);
        }
        if self.claimed.remove(&host) {
            info!("Stopped HTTP forwarding for {} ({})", host, self.peer);
            self.server.registry.release(&host, self.id);
            Ok(true)
        } else {
            info!(
                "Rejecting cancel-tcpip-forward for {} ({}): not claimed by this session",
                host, self.peer
            );
            Ok(false)
        }
    }
}

// Clean up session claims on drop (i.e. disconnected from server).
impl Drop for ServerHandler {
    fn drop(&mut self) {
        info!("{} disconnected", self.peer);
        for host in self.claimed.drain() {
            self.server.registry.release(&host, self.id);
        }
    }
}
