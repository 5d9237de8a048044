//! The server loop: a single blocking TCP listener that
//! accepts exactly one connection, serves it to completion, then returns.
//! No worker pool, no async runtime — GDB drives one connection at a time
//! and there is never a reason to serve two.

use crate::rsp::{dispatch, PacketIo, RecvOutcome, RspState};
use std::net::{SocketAddr, TcpListener};
use tracing::{debug, info, warn};

pub fn run(addr: SocketAddr, mut state: RspState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!(%addr, "listening for a gdb connection");

    let (stream, peer) = listener.accept()?;
    info!(%peer, "accepted connection");
    stream.set_nodelay(true)?;

    if let Err(err) = serve_connection(stream, &mut state) {
        warn!(%peer, error = %err, "connection ended with an io error");
    } else {
        info!(%peer, "connection closed");
    }

    Ok(())
}

fn serve_connection(
    stream: std::net::TcpStream,
    state: &mut RspState,
) -> std::io::Result<()> {
    let mut io = PacketIo::new(stream);

    while state.running {
        match io.recv_packet(state.noack_mode)? {
            RecvOutcome::ConnectionLost => return Ok(()),
            RecvOutcome::ChecksumMismatch => continue,
            RecvOutcome::Packet(payload) => {
                debug!(%payload, "received packet");
                let reply = dispatch(state, &payload);
                debug!(%reply, "sending reply");
                io.send_reply(&reply)?;
            }
        }
    }

    Ok(())
}
