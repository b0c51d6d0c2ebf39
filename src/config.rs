use std::{
    net::{IpAddr, Ipv6Addr},
    num::NonZero,
    path::PathBuf,
};

use clap::Parser;

// CLI configuration for burrow.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct ApplicationConfig {
    /// Address to listen for SSH and HTTP connections.
    #[arg(
        long,
        default_value_t = IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        value_name = "ADDRESS"
    )]
    pub listen_address: IpAddr,

    /// Port to listen for SSH connections.
    #[arg(long, default_value_t = NonZero::new(2222).unwrap(), value_name = "PORT")]
    pub ssh_port: NonZero<u16>,

    /// Port to listen for HTTP connections.
    #[arg(long, default_value_t = NonZero::new(8080).unwrap(), value_name = "PORT")]
    pub http_port: NonZero<u16>,

    /// File path to the server's host key.
    /// Startup fails if the file is missing or not a valid OpenSSH private key.
    #[arg(long, default_value_os = "./ssh_host_key", value_name = "FILE")]
    pub private_key_file: PathBuf,
}
