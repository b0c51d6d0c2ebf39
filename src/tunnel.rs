use log::debug;
use russh::{
    ChannelStream,
    server::{Handle, Msg},
};

// Trait for creating tunneling channels to the service behind an SSH
// session. This is the only surface the HTTP dispatcher consumes.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait TunnelHandler<T: Sync> {
    // Return a fresh byte stream to the forwarded service.
    async fn tunneling_channel(&self) -> anyhow::Result<T>;
}

// Opens `forwarded-tcpip` channels on the SSH session that claimed a
// hostname, via remote forwarding. One channel is opened per HTTP request.
pub(crate) struct SshTunnelHandler {
    // Handle to the SSH connection, in order to create remote forwarding channels.
    handle: Handle,
    // The hostname this session claimed, as stored in the registry. The
    // client needs it to route the channel to the right local service.
    address: String,
}

impl SshTunnelHandler {
    pub(crate) fn new(handle: Handle, address: String) -> Self {
        SshTunnelHandler { handle, address }
    }
}

impl TunnelHandler<ChannelStream<Msg>> for SshTunnelHandler {
    async fn tunneling_channel(&self) -> anyhow::Result<ChannelStream<Msg>> {
        debug!("Opening forwarded-tcpip channel for {}", self.address);
        // The originator fields are synthetic; the tunnel endpoint has no
        // network address of its own.
        let channel = self
            .handle
            .channel_open_forwarded_tcpip(self.address.clone(), 80, "0.0.0.0", 0)
            .await?
            .into_stream();
        Ok(channel)
    }
}
