use crate::foundation::error::{MiiError, MiiResult};
use crate::protocol::response::{RAW_HEADER_LEN, RawFrameHeader};
use crate::protocol::settings::ResponseFormat;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::time::Duration;

/// How the end of a reply is recognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Fixed header, then exactly the body length it declares.
    RawFrame,
    /// Everything until the engine closes the connection.
    UntilClose,
}

impl From<ResponseFormat> for Framing {
    fn from(format: ResponseFormat) -> Self {
        if format.is_container() {
            Self::UntilClose
        } else {
            Self::RawFrame
        }
    }
}

/// Deadlines applied to a transaction. `None` blocks indefinitely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelTimeouts {
    /// Bound on establishing the TCP connection.
    pub connect: Option<Duration>,
    /// Bound on each individual read or write.
    pub io: Option<Duration>,
}

/// Client side of the one-request-per-connection engine protocol.
#[derive(Clone, Debug)]
pub struct RenderChannel {
    addr: SocketAddr,
    timeouts: ChannelTimeouts,
    span: tracing::Span,
}

impl RenderChannel {
    /// Channel to the engine on `127.0.0.1:<port>`.
    pub fn new(port: u16, timeouts: ChannelTimeouts, span: tracing::Span) -> Self {
        Self {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)),
            timeouts,
            span,
        }
    }

    /// Engine address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one request and read one complete reply.
    ///
    /// The socket is owned by this call and closed on return, on success and on every error.
    pub fn transact(&self, request: &[u8], framing: Framing) -> MiiResult<Vec<u8>> {
        let _enter = self.span.enter();

        let mut stream = self.connect()?;
        stream
            .write_all(request)
            .and_then(|()| stream.flush())
            .map_err(|e| io_failure("send request", e))?;
        tracing::debug!(bytes = request.len(), ?framing, "request sent");

        let reply = match framing {
            Framing::RawFrame => read_raw_frame(&mut stream)?,
            Framing::UntilClose => read_until_close(&mut stream)?,
        };
        tracing::debug!(bytes = reply.len(), "reply received");
        Ok(reply)
    }

    fn connect(&self) -> MiiResult<TcpStream> {
        let connected = match self.timeouts.connect {
            Some(t) => TcpStream::connect_timeout(&self.addr, t),
            None => TcpStream::connect(self.addr),
        };
        let stream = connected.map_err(|e| {
            MiiError::connection(format!("engine not listening on {}: {e}", self.addr))
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "TCP_NODELAY not applied");
        }
        stream
            .set_read_timeout(self.timeouts.io)
            .and_then(|()| stream.set_write_timeout(self.timeouts.io))
            .map_err(|e| io_failure("configure socket", e))?;
        Ok(stream)
    }
}

fn read_raw_frame(stream: &mut TcpStream) -> MiiResult<Vec<u8>> {
    let mut reply = vec![0u8; RAW_HEADER_LEN];
    read_exact_counted(stream, &mut reply, "frame header")?;

    // The header is untrusted: the buffer grows with the bytes that actually arrive.
    let body_len = RawFrameHeader::parse(&reply)?.body_len();
    reply.reserve(body_len.min(MAX_BODY_PREALLOC));
    (&mut *stream)
        .take(body_len as u64)
        .read_to_end(&mut reply)
        .map_err(|e| io_failure("frame body", e))?;

    let got = reply.len() - RAW_HEADER_LEN;
    if got < body_len {
        return Err(MiiError::render(format!(
            "connection closed mid-frame body: got {got} of {body_len} bytes"
        )));
    }
    Ok(reply)
}

const MAX_BODY_PREALLOC: usize = 4 << 20;

// Like `read_exact`, but a premature EOF reports how many bytes arrived.
fn read_exact_counted(stream: &mut TcpStream, buf: &mut [u8], what: &str) -> MiiResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(MiiError::render(format!(
                    "connection closed mid-{what}: got {filled} of {} bytes",
                    buf.len()
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(io_failure(what, e)),
        }
    }
    Ok(())
}

fn read_until_close(stream: &mut TcpStream) -> MiiResult<Vec<u8>> {
    let mut reply = Vec::new();
    stream
        .read_to_end(&mut reply)
        .map_err(|e| io_failure("container reply", e))?;
    if reply.is_empty() {
        return Err(MiiError::render(
            "engine closed the connection without sending a reply",
        ));
    }
    Ok(reply)
}

fn io_failure(what: &str, e: io::Error) -> MiiError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            MiiError::render(format!("{what}: deadline elapsed"))
        }
        _ => MiiError::render(format!("{what}: {e}")),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transport/channel.rs"]
mod tests;
