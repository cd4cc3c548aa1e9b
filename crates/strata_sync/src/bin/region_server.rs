//! # Region Server
//!
//! The authoritative world server: generates terrain, then serves region
//! pushes and edits over UDP.
//!
//! ## Usage
//!
//! ```bash
//! region_server --config strata.toml --bind 0.0.0.0:7878
//! RUST_LOG=strata_sync=debug region_server
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use strata_sync::protocol::decode;
use strata_sync::{
    ConnectionRegistry, Packet, PacketHeader, RegionServer, RegionSink, SyncConfig, SyncResult,
    UdpTransport,
};

/// How often idle sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep when the socket is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

struct CliArgs {
    config: Option<PathBuf>,
    bind: Option<SocketAddr>,
}

fn print_usage() {
    println!("Usage: region_server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>    TOML configuration (default: built-in defaults)");
    println!("  -b, --bind <ADDR>      UDP listen address, overrides [server].bind");
    println!("  -h, --help             Show this help");
}

/// Parses the command line. `Ok(None)` means help was printed.
fn parse_args() -> Result<Option<CliArgs>, String> {
    let mut args = std::env::args().skip(1);
    let mut cli = CliArgs {
        config: None,
        bind: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a file")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--bind" | "-b" => {
                let addr = args.next().ok_or("--bind needs an address")?;
                cli.bind = Some(
                    addr.parse()
                        .map_err(|e| format!("invalid --bind address {addr:?}: {e}"))?,
                );
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            other => return Err(format!("unknown argument {other:?}")),
        }
    }
    Ok(Some(cli))
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    let cli = match parse_args() {
        Ok(Some(cli)) => cli,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "region server stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliArgs) -> SyncResult<()> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let started = Instant::now();
    let level = Arc::new(config.world.generate()?);
    tracing::info!(
        blocks_x = level.blocks_x(),
        blocks_y = level.blocks_y(),
        block_size = level.block_size(),
        seed = config.world.seed,
        elapsed_ms = started.elapsed().as_millis(),
        "world generated"
    );

    let registry = Arc::new(ConnectionRegistry::new(config.server.max_sessions));
    let mut transport = UdpTransport::bind(config.server.bind)?;
    let sink: Arc<dyn RegionSink> = Arc::new(transport.sink(Arc::clone(&registry))?);
    let server = RegionServer::new(level, sink, config.interest);
    tracing::info!(addr = %transport.local_addr(), "listening");

    let idle_timeout = config.server.idle_timeout();
    let mut last_sweep = Instant::now();

    loop {
        let mut handled = 0usize;
        while let Some((datagram, from)) = transport.recv() {
            handled += 1;
            match decode(datagram) {
                Ok(packet) => dispatch(&server, &registry, &mut transport, packet, from),
                Err(error) => tracing::debug!(%from, %error, "dropping malformed datagram"),
            }
        }

        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            for id in registry.expire_idle(idle_timeout) {
                tracing::info!(connection = %id, "session timed out");
                server.disconnect(id);
            }
            last_sweep = Instant::now();
        }

        if handled == 0 {
            std::thread::sleep(IDLE_SLEEP);
        }
    }
}

fn dispatch(
    server: &RegionServer,
    registry: &ConnectionRegistry,
    transport: &mut UdpTransport,
    packet: Packet,
    from: SocketAddr,
) {
    if let Packet::Connect(_) = packet {
        let reply = match registry.register(from) {
            Some(id) => {
                tracing::info!(connection = %id, %from, "client connected");
                let header = PacketHeader::new(registry.next_sequence(id).unwrap_or(0));
                Packet::ConnectAck(header, id.0)
            }
            None => {
                tracing::warn!(%from, "session limit reached, refusing client");
                Packet::Disconnect(PacketHeader::new(0))
            }
        };
        if let Err(error) = transport.send_packet(&reply, from) {
            tracing::debug!(%from, %error, "connect reply failed");
        }
        return;
    }

    let Some(id) = registry.lookup(from) else {
        tracing::debug!(%from, packet_type = ?packet.packet_type(), "packet from unknown address");
        return;
    };
    registry.touch(id);
    server.handle_packet(id, &packet);

    if let Packet::Disconnect(_) = packet {
        registry.remove(id);
    }
}
