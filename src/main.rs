//! Command-line front end: run the relay, or join a call as either side.
//!
//! ```bash
//! ssc relay --listen 127.0.0.1:9091
//! ssc answer --signal ws://127.0.0.1:9091
//! ssc call --signal ws://127.0.0.1:9091
//! ```

use clap::{Args, Parser, Subcommand};
use ssc_negotiator::config::{NegotiatorConfig, ServerConfig};
use ssc_negotiator::peer::{Negotiator, Role, WebRtcEngineFactory};
use ssc_negotiator::relay::RelayServer;
use ssc_negotiator::signaling::{pump_inbound, WsChannel};
use ssc_negotiator::{logger, NegotiationState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the two-party signaling relay
    Relay {
        #[arg(long, default_value = "127.0.0.1:9091", env = "SSC_RELAY_LISTEN")]
        listen: String,
    },
    /// Start a call (initiator)
    Call(PeerArgs),
    /// Wait for a call and answer it (responder)
    Answer(PeerArgs),
}

#[derive(Args, Debug)]
struct PeerArgs {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:9091/ws", env = "SSC_SIGNAL_URL")]
    signal: String,

    /// ICE server URL; repeat for several. Defaults to public STUN servers.
    #[arg(long = "ice-server", env = "SSC_ICE_SERVERS", value_delimiter = ',')]
    ice_servers: Vec<String>,

    /// Username for turn: servers
    #[arg(long, env = "SSC_TURN_USERNAME")]
    turn_username: Option<String>,

    /// Credential for turn: servers
    #[arg(long, env = "SSC_TURN_CREDENTIAL")]
    turn_credential: Option<String>,
}

impl PeerArgs {
    fn config(&self) -> ssc_negotiator::Result<NegotiatorConfig> {
        if self.ice_servers.is_empty() {
            return Ok(NegotiatorConfig::default());
        }
        let servers = self
            .ice_servers
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
                ServerConfig {
                    id: format!("cli-{i}"),
                    r#type: if is_turn { "turn" } else { "stun" }.into(),
                    url: url.clone(),
                    username: if is_turn { self.turn_username.clone() } else { None },
                    credential: if is_turn { self.turn_credential.clone() } else { None },
                }
            })
            .collect();
        NegotiatorConfig::default().with_ice_servers(servers)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Relay { listen } => {
            let listener = TcpListener::bind(&listen).await?;
            Arc::new(RelayServer::new()).serve(listener).await?;
        }
        Command::Call(args) => {
            let state = join(Role::Initiator, &args).await?;
            info!("Call finished: {}", state);
        }
        Command::Answer(args) => {
            let state = join(Role::Responder, &args).await?;
            info!("Call finished: {}", state);
        }
    }

    Ok(())
}

async fn join(role: Role, args: &PeerArgs) -> ssc_negotiator::Result<NegotiationState> {
    let factory = Arc::new(WebRtcEngineFactory::new(args.config()?)?);
    let (channel, inbound) = WsChannel::connect(&args.signal).await?;
    info!("Joined relay at {} as {}", channel.url(), role);

    let (mut negotiator, handle) = Negotiator::new(role, factory, Arc::new(channel));
    negotiator.on_remote_track(Box::new(|track| {
        println!("remote {} track on mid {}", track.kind, track.mid);
    }));

    tokio::spawn(pump_inbound(inbound, handle.clone()));

    let mut state = handle.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow();
            println!("state: {current}");
        }
    });

    if role == Role::Initiator {
        handle.prepare()?;
        handle.start_call()?;
    }

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c.hang_up();
        }
    });

    let final_state = negotiator.run().await;
    if final_state == NegotiationState::Failed {
        error!("Negotiation failed");
    }
    Ok(final_state)
}
