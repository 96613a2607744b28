//! Stand-in engine speaking the render protocol, for exercising the client without real assets.
//!
//! Every reply is a solid square in the request's background color, `resolution` pixels wide.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use mii_render::{DEFAULT_PORT, RAW_HEADER_LEN, REQUEST_LEN, RenderRequest, ResponseFormat};

const MAX_SIDE: u32 = 2048;

#[derive(Parser, Debug)]
#[command(name = "mii-stub-engine", version)]
struct Cli {
    /// Run as a server (accepted for compatibility with the real engine).
    #[arg(long, default_value_t = false)]
    server: bool,

    /// Port to listen on, on 127.0.0.1.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Exit immediately with this code instead of serving.
    #[arg(long)]
    exit_code: Option<i32>,

    /// Stay alive without ever binding the port.
    #[arg(long, default_value_t = false)]
    never_listen: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(code) = cli.exit_code {
        eprintln!("exiting with code {code}");
        std::process::exit(code);
    }
    if cli.never_listen {
        loop {
            std::thread::sleep(Duration::from_secs(3600));
        }
    }

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, cli.port))
        .with_context(|| format!("bind 127.0.0.1:{}", cli.port))?;
    eprintln!("listening on 127.0.0.1:{}", cli.port);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("accept failed: {e}");
                continue;
            }
        };
        if let Err(e) = serve(stream) {
            eprintln!("request failed: {e:#}");
        }
    }
    Ok(())
}

fn serve(mut stream: TcpStream) -> anyhow::Result<()> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .context("set read timeout")?;

    let mut packet = [0u8; REQUEST_LEN];
    let got = read_full(&mut stream, &mut packet).context("read request")?;
    if got == 0 {
        // Liveness probe: connect, then close.
        return Ok(());
    }
    anyhow::ensure!(
        got == REQUEST_LEN,
        "short request: got {got} of {REQUEST_LEN} bytes"
    );

    let request = RenderRequest::decode(&packet)?;
    let reply = build_reply(&request)?;
    stream.write_all(&reply).context("write reply")?;
    stream.flush().context("flush reply")?;
    Ok(())
}

fn read_full(stream: &mut TcpStream, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match stream.read(&mut buf[got..])? {
            0 => break,
            n => got += n,
        }
    }
    Ok(got)
}

fn build_reply(request: &RenderRequest) -> anyhow::Result<Vec<u8>> {
    let s = &request.settings;
    let side = s.resolution.clamp(1, MAX_SIDE);
    let [r, g, b, a] = s.background_color.map(|c| c.clamp(0, 255) as u8);
    let bgra: Vec<u8> = [b, g, r, a].repeat((side * side) as usize);

    match s.response_format {
        // The engine's image container is an uncompressed TGA whose header doubles as the raw
        // frame header, so both formats get the same bytes.
        ResponseFormat::RawFrame | ResponseFormat::Image => {
            let mut out = vec![0u8; RAW_HEADER_LEN];
            out[2] = 2;
            out[12..14].copy_from_slice(&(side as u16).to_le_bytes());
            out[14..16].copy_from_slice(&(side as u16).to_le_bytes());
            out[16] = 32;
            out[17] = 8;
            out.extend_from_slice(&bgra);
            Ok(out)
        }
        ResponseFormat::Gltf => Ok(serde_json::to_vec(&serde_json::json!({
            "asset": { "version": "2.0", "generator": "mii-stub-engine" }
        }))?),
    }
}
