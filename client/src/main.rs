use clap::Parser;
use client::decision::GreedyDecisionModule;
use client::network::Agent;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::Team;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Team to join: 0 for red, 1 for blue
    #[arg(short = 't', long, default_value = "0")]
    team: u8,

    /// Ask to become the team leader
    #[arg(short = 'l', long)]
    leader: bool,

    /// Milliseconds between checks whether the next action may be sent
    #[arg(long, default_value = "20")]
    action_interval: u64,

    /// Milliseconds to wait for a response before giving up on a request
    #[arg(long, default_value = "2000")]
    response_timeout: u64,

    /// Actions between two board exchanges started by this agent, 0 disables them
    #[arg(long, default_value = "15")]
    share_interval: u32,

    /// Seed for the decision module, random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let team = Team::from_id(args.team).ok_or_else(|| format!("Unknown team {}", args.team))?;
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!("Starting agent...");
    info!("Connecting to: {}", args.server);

    let mut agent = Agent::new(
        &args.server,
        team,
        args.leader,
        GreedyDecisionModule::new(rng, args.share_interval),
        Duration::from_millis(args.action_interval),
        Duration::from_millis(args.response_timeout),
    )
    .await?;

    match agent.run().await? {
        Some(winner) if winner == team => info!("Our team won"),
        Some(winner) => info!("Team {:?} won", winner),
        None => info!("Left the game before it ended"),
    }

    Ok(())
}
