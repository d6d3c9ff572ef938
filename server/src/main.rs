use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::{Server, ShutdownHandle};
use shared::{DEFAULT_PORT, DEFAULT_TICK_RATE};
use std::net::{IpAddr, SocketAddr};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Snapshot broadcasts per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG still wins when set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::new(SocketAddr::new(args.host, args.port), args.tick_rate);

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Err(e.into());
        }
    };

    let shutdown = server.shutdown_handle();
    spawn_stdin_watcher(shutdown.clone());
    tokio::spawn(wait_for_ctrl_c(shutdown));

    info!("Press ENTER or Ctrl+C to stop the server");
    server.run().await?;

    Ok(())
}

/// Stops the server when a line arrives on stdin
///
/// Runs on a plain thread so a pending read never holds up runtime shutdown.
/// A closed stdin (daemonized runs) leaves Ctrl+C as the only trigger.
fn spawn_stdin_watcher(shutdown: ShutdownHandle) {
    std::thread::spawn(move || {
        let mut line = String::new();
        if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
            info!("Received stop request on stdin");
            shutdown.stop();
        }
    });
}

async fn wait_for_ctrl_c(shutdown: ShutdownHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            error!("Unable to listen for Ctrl+C: {}", e);
            return;
        }
    }
    shutdown.stop();
}
