//! The shared UDP endpoint.
//!
//! One socket serves the whole process: the listener blocks in `recv_from`,
//! workers and the sweeper reply through `send_to`. UDP keeps datagrams
//! intact, so concurrent senders need no coordination.

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Outgoing-datagram seam. The dispatcher and sweeper write through this
/// so tests can capture traffic without a socket.
pub trait Outbound: Send + Sync {
    fn send_to(&self, addr: SocketAddrV4, payload: &[u8]) -> io::Result<()>;
}

/// UDP socket bound to the server port.
pub struct ChatSocket {
    socket: Socket,
    port: u16,
}

impl ChatSocket {
    /// Bind to `0.0.0.0:port`.
    pub fn bind(port: u16) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&bind_addr.into())
            .with_context(|| format!("failed to bind UDP port {port}"))?;
        socket.set_recv_buffer_size(4 * 1024 * 1024).ok();
        let port = socket
            .local_addr()?
            .as_socket_ipv4()
            .map(|a| a.port())
            .unwrap_or(port);
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until one datagram arrives; returns the byte count and the
    /// source address.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)> {
        let uninit: &mut [MaybeUninit<u8>] = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), buf.len())
        };
        let (n, from) = self.socket.recv_from(uninit)?;
        let from = from
            .as_socket_ipv4()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IPv4 peer"))?;
        Ok((n, from))
    }
}

impl Outbound for ChatSocket {
    fn send_to(&self, addr: SocketAddrV4, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, &addr.into()).map(|_| ())
    }
}
