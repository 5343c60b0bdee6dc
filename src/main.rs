//! LanJack demo driver
//!
//! Thin argv-driven collaborator around the library: host a session, join
//! one by address, search for peers, or print network diagnostics. The
//! interactive menu UI lives outside this crate; this binary only wires
//! stdin decisions into the core.

use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lanjack::{
    connect_to, diagnose, host_session, play_round, search_peers, vote_replay, Decision, Hand,
    PlayerInput, RoundOutcome, Session, TransportConfig, VERSION,
};

/// Blocking hit/stand/quit prompts on the controlling terminal.
struct StdinInput;

impl PlayerInput for StdinInput {
    fn decide(&mut self, hand: &Hand) -> Decision {
        loop {
            println!("Your hand: {hand}");
            print!("HIT (h), STAND (s) or QUIT (q)? ");
            let _ = std::io::stdout().flush();

            let mut answer = String::new();
            if std::io::stdin().read_line(&mut answer).is_err() {
                return Decision::Quit;
            }
            let answer = answer.trim().to_lowercase();
            if answer == "q" {
                return Decision::Quit;
            } else if answer.starts_with('h') {
                return Decision::Hit;
            } else if answer.starts_with('s') {
                return Decision::Stand;
            }
            println!("Please answer 'h', 's' or 'q'.");
        }
    }
}

fn ask_replay() -> bool {
    print!("Play again? (y/n): ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().to_lowercase().starts_with('y')
}

/// Play rounds until either side ends the session.
async fn run_session(mut session: Session) -> Result<()> {
    let mut input = StdinInput;
    loop {
        match play_round(&mut session, &mut input).await {
            RoundOutcome::Won {
                own_total,
                peer_total,
            } => info!("You win! {own_total} vs {peer_total}"),
            RoundOutcome::Lost {
                own_total,
                peer_total,
            } => info!("You lose. {own_total} vs {peer_total}"),
            RoundOutcome::Tied {
                own_total,
                peer_total,
            } => info!("A tie. {own_total} vs {peer_total}"),
            RoundOutcome::Ended(end) => {
                info!("Session over: {end}");
                return Ok(());
            }
        }

        if !vote_replay(&mut session, ask_replay()).await {
            info!("Session closed.");
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("LanJack v{VERSION}");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = TransportConfig::default();

    match args.first().map(String::as_str) {
        Some("host") => {
            let session = host_session(&config).await?;
            run_session(session).await
        }
        Some("join") => {
            let addr: Ipv4Addr = args
                .get(1)
                .context("usage: lanjack join <ipv4>")?
                .parse()
                .context("invalid IPv4 address")?;
            let session = connect_to(addr, &config).await?;
            run_session(session).await
        }
        Some("search") => {
            let secs = args
                .get(1)
                .map(|s| s.parse::<u64>())
                .transpose()
                .context("invalid search timeout")?
                .unwrap_or(6);
            let peers = search_peers(Duration::from_secs(secs)).await;
            if peers.is_empty() {
                info!("No peers found.");
            } else {
                for peer in peers {
                    info!("Peer hosting at {peer}");
                }
            }
            Ok(())
        }
        Some("diag") => {
            let report = diagnose(&config).await;
            let availability = |ok: bool| if ok { "available" } else { "occupied or blocked" };
            info!("Local address:        {}", report.local_ip);
            info!(
                "Game port (TCP):      {}",
                availability(report.game_port_available)
            );
            info!(
                "Discovery port (UDP): {}",
                availability(report.discovery_port_available)
            );
            info!("Subnet broadcast:     {}", report.subnet_broadcast);
            Ok(())
        }
        _ => bail!("usage: lanjack <host | join <ipv4> | search [secs] | diag>"),
    }
}
