use std::net::TcpListener;
use std::thread;

use super::*;

fn frame_reply(width: u16, height: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; RAW_HEADER_LEN];
    out[12..14].copy_from_slice(&width.to_le_bytes());
    out[14..16].copy_from_slice(&height.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Accept one connection, read `expect` request bytes, run `reply`, then close.
fn serve_once(
    expect: usize,
    reply: impl FnOnce(&mut TcpStream) + Send + 'static,
) -> (u16, thread::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let mut request = vec![0u8; expect];
        conn.read_exact(&mut request).unwrap();
        reply(&mut conn);
        request
    });
    (port, handle)
}

fn channel(port: u16) -> RenderChannel {
    RenderChannel::new(port, ChannelTimeouts::default(), tracing::Span::none())
}

#[test]
fn raw_frame_is_reassembled_from_short_writes() {
    let body: Vec<u8> = (0..64).collect();
    let reply = frame_reply(4, 4, &body);
    let expected = reply.clone();
    let (port, server) = serve_once(5, move |conn| {
        for chunk in reply.chunks(7) {
            conn.write_all(chunk).unwrap();
            conn.flush().unwrap();
            thread::sleep(Duration::from_millis(2));
        }
        // Keep the socket open: the client must stop at the declared size, not at EOF.
        thread::sleep(Duration::from_millis(200));
    });

    let got = channel(port).transact(b"hello", Framing::RawFrame).unwrap();
    assert_eq!(got, expected);
    assert_eq!(server.join().unwrap(), b"hello");
}

#[test]
fn truncated_raw_frame_is_a_render_error() {
    let (port, server) = serve_once(1, |conn| {
        conn.write_all(&frame_reply(2, 2, &[0u8; 10])).unwrap();
    });

    let err = channel(port).transact(&[9], Framing::RawFrame).unwrap_err();
    assert!(matches!(err, MiiError::Render(_)), "{err}");
    assert!(err.to_string().contains("got 10 of 16"), "{err}");
    server.join().unwrap();
}

#[test]
fn truncated_header_is_a_render_error() {
    let (port, server) = serve_once(1, |conn| {
        conn.write_all(&[0u8; 5]).unwrap();
    });

    let err = channel(port).transact(&[9], Framing::RawFrame).unwrap_err();
    assert!(matches!(err, MiiError::Render(_)), "{err}");
    server.join().unwrap();
}

#[test]
fn container_reply_is_read_until_close() {
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let sent = payload.clone();
    let (port, server) = serve_once(3, move |conn| {
        for chunk in sent.chunks(1000) {
            conn.write_all(chunk).unwrap();
        }
    });

    let got = channel(port).transact(b"abc", Framing::UntilClose).unwrap();
    assert_eq!(got, payload);
    server.join().unwrap();
}

#[test]
fn empty_container_reply_is_a_render_error() {
    let (port, server) = serve_once(3, |_conn| {});

    let err = channel(port).transact(b"abc", Framing::UntilClose).unwrap_err();
    assert!(matches!(err, MiiError::Render(_)), "{err}");
    server.join().unwrap();
}

#[test]
fn refused_connect_is_a_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = channel(port).transact(b"x", Framing::RawFrame).unwrap_err();
    assert!(matches!(err, MiiError::Connection(_)), "{err}");
}

#[test]
fn stalled_engine_hits_the_io_deadline() {
    let (port, server) = serve_once(1, |_conn| {
        thread::sleep(Duration::from_millis(500));
    });

    let timeouts = ChannelTimeouts {
        connect: Some(Duration::from_millis(500)),
        io: Some(Duration::from_millis(50)),
    };
    let chan = RenderChannel::new(port, timeouts, tracing::Span::none());
    let err = chan.transact(&[1], Framing::RawFrame).unwrap_err();
    assert!(matches!(err, MiiError::Render(_)), "{err}");
    assert!(err.to_string().contains("deadline"), "{err}");
    server.join().unwrap();
}

#[test]
fn framing_follows_response_format() {
    assert_eq!(Framing::from(ResponseFormat::RawFrame), Framing::RawFrame);
    assert_eq!(Framing::from(ResponseFormat::Image), Framing::UntilClose);
    assert_eq!(Framing::from(ResponseFormat::Gltf), Framing::UntilClose);
}

#[test]
fn oversized_header_fails_without_reserving_the_declared_body() {
    // 65535 x 65535 BGRA would be ~17 GB.
    let (port, server) = serve_once(1, |conn| {
        conn.write_all(&frame_reply(u16::MAX, u16::MAX, &[7u8; 32]))
            .unwrap();
    });

    let err = channel(port).transact(&[9], Framing::RawFrame).unwrap_err();
    assert!(matches!(err, MiiError::Render(_)), "{err}");
    let declared = u16::MAX as usize * u16::MAX as usize * 4;
    assert!(
        err.to_string().contains(&format!("got 32 of {declared} bytes")),
        "{err}"
    );
    server.join().unwrap();
}
