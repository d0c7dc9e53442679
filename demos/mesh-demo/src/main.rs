use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crawlnet::prelude::*;
use crawlnet::{MAX_PLRS, PacketError};
use serde::{Deserialize, Serialize};
use tracing::info;

const TICK: Duration = Duration::from_millis(2);

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Dice race over a crawlnet mesh: every player rolls once per round and
/// the highest total wins.
#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Rounds to play.
    #[arg(long, default_value_t = 5)]
    rounds: u32,

    /// Players to wait for before the first round.
    #[arg(long, default_value_t = 3)]
    players: usize,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run host and joiners in this process over the loopback transport
    /// (the default).
    Local,
    /// Host a game over WebSocket.
    Host {
        #[arg(long, default_value = "127.0.0.1:6112")]
        listen: SocketAddr,
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Join a game over WebSocket.
    Join {
        #[arg(long, default_value = "127.0.0.1:0")]
        listen: SocketAddr,
        /// A node already in the game; discovery requests go here.
        #[arg(long)]
        seed: SocketAddr,
        #[arg(long)]
        game: String,
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Net(#[from] CrawlnetError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("not in a game")]
    NotInGame,
    #[error("gave up waiting for {0} players")]
    NotEnoughPlayers(usize),
    #[error("player thread panicked")]
    Panicked,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Roll {
    round: u32,
    value: u8,
}

type Totals = [u32; MAX_PLRS];

/// Deterministic per seed, round and slot, so every run is reproducible.
fn roll(seed: u32, round: u32, slot: PlayerSlot) -> u8 {
    let mixed = seed.wrapping_mul(2_654_435_761)
        ^ round.wrapping_mul(40_503)
        ^ u32::from(slot.get()).wrapping_mul(97);
    (mixed % 6) as u8 + 1
}

fn play<T: Transport>(
    engine: &mut ProtocolEngine<T>,
    players: usize,
    rounds: u32,
) -> Result<Totals, DemoError> {
    let me = engine.self_slot().ok_or(DemoError::NotInGame)?;

    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.active_slots() < players {
        if Instant::now() > deadline {
            return Err(DemoError::NotEnoughPlayers(players));
        }
        engine.poll();
        thread::sleep(TICK);
    }
    let seed = GameData::from_bytes(engine.session().game_init_info())?.seed;
    info!(%me, seed, "all players present");

    let mut totals = Totals::default();
    for round in 1..=rounds {
        let value = roll(seed, round, me);
        engine.send_turn(&serde_json::to_vec(&Roll { round, value })?)?;
        let turns = loop {
            let turns = engine.receive_turns();
            if turns.is_complete() {
                break turns;
            }
            thread::sleep(TICK);
        };
        for (slot, turn) in turns.turns.iter().enumerate() {
            if let Some(turn) = turn {
                let roll: Roll = serde_json::from_slice(&turn.data)?;
                totals[slot] += u32::from(roll.value);
            }
        }
        info!(%me, round, ?totals, "round complete");
    }

    // Let the last round reach everyone before the farewell.
    for _ in 0..100 {
        engine.poll();
        thread::sleep(TICK);
    }
    engine.leave_game(LeaveReason::Ending)?;
    Ok(totals)
}

fn report(totals: &Totals) {
    if let Some((winner, best)) = totals.iter().enumerate().max_by_key(|(_, total)| **total) {
        info!(winner, best, ?totals, "game over");
    }
}

fn setup(seed: u32) -> Vec<u8> {
    GameData {
        seed,
        ..GameData::default()
    }
    .to_bytes()
    .to_vec()
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn run_local(players: usize, rounds: u32) -> Result<(), DemoError> {
    let hub = LoopbackHub::new();
    let mut host = ProtocolEngine::new(hub.transport());
    host.setup_gameinfo(setup(7));
    host.set_player_name(PlayerSlot::HOST, "host");
    let game = host.make_default_gamename();
    host.create(&game)?;
    info!(%game, "hosting local game");

    let joiners: Vec<_> = (1..players)
        .map(|_| {
            let hub = hub.clone();
            let game = game.clone();
            thread::spawn(move || -> Result<Totals, DemoError> {
                let mut engine = ProtocolEngine::new(hub.transport());
                engine.join(&game)?;
                play(&mut engine, players, rounds)
            })
        })
        .collect();

    let totals = play(&mut host, players, rounds)?;
    for joiner in joiners {
        let theirs = joiner.join().map_err(|_| DemoError::Panicked)??;
        debug_assert_eq!(theirs, totals, "every node sees the same game");
    }
    report(&totals);
    Ok(())
}

fn bind(listen: SocketAddr, seeds: Vec<SocketAddr>) -> Result<WebSocketTransport, CrawlnetError> {
    let transport = WebSocketTransport::bind(WebSocketConfig {
        listen,
        seeds,
        ..WebSocketConfig::default()
    })
    .map_err(CrawlnetError::from)?;
    Ok(transport)
}

fn run_host(
    listen: SocketAddr,
    game: Option<String>,
    password: Option<String>,
    players: usize,
    rounds: u32,
) -> Result<(), DemoError> {
    let mut engine = ProtocolEngine::new(bind(listen, Vec::new())?);
    engine.setup_gameinfo(setup(42));
    if let Some(password) = password {
        engine.setup_password(&password);
    }
    let game = game.unwrap_or_else(|| engine.make_default_gamename());
    engine.create(&game)?;
    info!(%game, addr = %engine.transport().local_addr(), "hosting; waiting for players");
    report(&play(&mut engine, players, rounds)?);
    Ok(())
}

fn run_join(
    listen: SocketAddr,
    seed: SocketAddr,
    game: String,
    password: Option<String>,
    players: usize,
    rounds: u32,
) -> Result<(), DemoError> {
    let mut engine = ProtocolEngine::new(bind(listen, vec![seed])?);
    if let Some(password) = password {
        engine.setup_password(&password);
    }
    let slot = engine.join(&game)?;
    info!(%game, %slot, "joined");
    report(&play(&mut engine, players, rounds)?);
    Ok(())
}

fn main() -> Result<(), DemoError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let players = args.players.clamp(1, MAX_PLRS);
    match args.mode.unwrap_or(Mode::Local) {
        Mode::Local => run_local(players, args.rounds),
        Mode::Host {
            listen,
            game,
            password,
        } => run_host(listen, game, password, players, args.rounds),
        Mode::Join {
            listen,
            seed,
            game,
            password,
        } => run_join(listen, seed, game, password, players, args.rounds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_stays_on_the_die() {
        for round in 1..50 {
            for slot in PlayerSlot::all() {
                assert!((1..=6).contains(&roll(1234, round, slot)));
            }
        }
    }

    #[test]
    fn test_local_game_runs_to_completion() {
        run_local(3, 3).unwrap();
    }
}
