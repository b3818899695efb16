//! Entry point for `gbn-chat`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing) and the
//! line-oriented terminal front end.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use gbn_chat::config::DEFAULT_PORT;
use gbn_chat::error::Error;
use gbn_chat::fault::{FaultCommand, FaultCommandError, FaultInjection};
use gbn_chat::{Client, ClientEvent, ProtocolConfig, Server};

/// Two-peer chat over a Go-Back-N reliable transport on UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the relay server.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
        bind: SocketAddr,

        #[command(flatten)]
        tuning: Tuning,
    },
    /// Join a chat through a relay server.
    Client {
        /// Relay server address (e.g. 127.0.0.1:12000).
        #[arg(short, long)]
        server: SocketAddr,

        /// Display name, sent as the first message.
        #[arg(short, long)]
        name: String,

        #[command(flatten)]
        tuning: Tuning,
    },
}

#[derive(Args)]
struct Tuning {
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 4000)]
    timeout_ms: u64,

    /// Receive poll interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    poll_ms: u64,

    /// Local send window limit (frames).
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..))]
    window: u16,

    /// Corrupt the first transmission of every outgoing DATA frame.
    #[arg(long)]
    corrupt: bool,

    /// Discard every incoming DATA frame.
    #[arg(long)]
    drop_data: bool,

    /// Ignore every incoming ACK.
    #[arg(long)]
    drop_acks: bool,
}

impl Tuning {
    fn config(&self) -> ProtocolConfig {
        ProtocolConfig::default()
            .with_retransmit_timeout(Duration::from_millis(self.timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_ms.max(1)))
            .with_window_limit(self.window)
    }

    fn faults(&self) -> FaultInjection {
        FaultInjection {
            corrupt_outgoing: self.corrupt,
            drop_incoming_data: self.drop_data,
            drop_incoming_acks: self.drop_acks,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { bind, tuning } => run_server(bind, tuning).await,
        Mode::Client {
            server,
            name,
            tuning,
        } => run_client(server, name, tuning).await,
    }
}

async fn run_server(bind: SocketAddr, tuning: Tuning) -> anyhow::Result<()> {
    let server = Server::bind(bind, tuning.config())
        .await
        .with_context(|| format!("binding {bind}"))?;
    server.router().set_faults(tuning.faults());
    let handle = server.spawn();
    println!("relay listening on {}", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    log::info!("interrupt received, shutting down");
    for peer in handle.router().peers() {
        log::info!(
            "peer {} name={:?} expected={} in_flight={}",
            peer.addr,
            peer.name,
            peer.expected,
            peer.in_flight
        );
    }
    handle.shutdown().await?;
    Ok(())
}

async fn run_client(server: SocketAddr, name: String, tuning: Tuning) -> anyhow::Result<()> {
    let mut client = Client::connect(server, tuning.config())
        .await
        .with_context(|| format!("connecting to {server}"))?;
    client.set_faults(tuning.faults());
    client.send(name.clone()).await.context("sending display name")?;
    println!("joined as {name}; type /quit to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                handle_line(&client, line).await?;
            }
            event = client.recv() => match event {
                Some(ClientEvent::Message(text)) => println!("{text}"),
                Some(ClientEvent::Notice(text)) => println!("[server] {text}"),
                None => anyhow::bail!("connection to {server} lost"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.quit().await?;
    Ok(())
}

async fn handle_line(client: &Client, line: String) -> anyhow::Result<()> {
    match line.parse::<FaultCommand>() {
        Ok(command) => {
            client.apply_fault(command);
            println!("[local] {:?}", client.faults());
            return Ok(());
        }
        Err(FaultCommandError::Unknown(cmd)) => {
            println!("[local] unknown command {cmd}");
            return Ok(());
        }
        Err(FaultCommandError::NotACommand) => {}
    }

    match client.send(line).await {
        Ok(_) => Ok(()),
        Err(Error::Send(e)) => {
            println!("[local] not sent: {e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
