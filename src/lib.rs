use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::info;

pub use crate::{config::ApplicationConfig, entrypoint::entrypoint};
use crate::{registry::HostRegistry, ssh::ServerHandler, tunnel::SshTunnelHandler};

mod config;
mod droppable_handle;
mod entrypoint;
mod error;
mod http;
mod registry;
mod ssh;
mod tunnel;

// State shared by every SSH session and HTTP request.
pub(crate) struct TunnelServer {
    // Mapping of hostnames to the sessions serving them.
    pub(crate) registry: Arc<HostRegistry<Arc<SshTunnelHandler>>>,
    // Counter for unique session IDs.
    session_id: AtomicUsize,
}

impl TunnelServer {
    pub(crate) fn new() -> Self {
        TunnelServer {
            registry: Arc::new(HostRegistry::new()),
            session_id: AtomicUsize::new(0),
        }
    }

    // Create a new handler for an SSH connection.
    pub(crate) fn new_client(self: &Arc<Self>, peer: SocketAddr) -> ServerHandler {
        let id = self.session_id.fetch_add(1, Ordering::AcqRel);
        info!("{} connected", peer);
        ServerHandler {
            id,
            peer,
            claimed: HashSet::new(),
            server: Arc::clone(self),
        }
    }
}
