use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::portpicker::pick_unused_port;

/// A localhost address with a port nobody listens on right now.
pub fn next_addr() -> SocketAddr {
    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    SocketAddr::new(ip, pick_unused_port(ip))
}
