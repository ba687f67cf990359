use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::GameRules;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Board width in fields
    #[arg(long, default_value = "8")]
    board_width: usize,

    /// Board height in fields, goal areas included
    #[arg(long, default_value = "12")]
    board_height: usize,

    /// Rows of each team's goal area
    #[arg(long, default_value = "2")]
    goal_area_height: usize,

    /// Goals hidden in each goal area
    #[arg(short, long, default_value = "3")]
    goals: u32,

    /// Agents per team
    #[arg(short, long, default_value = "3")]
    team_size: usize,

    /// Maximum pieces in play
    #[arg(long, default_value = "6")]
    max_pieces: usize,

    /// Pieces placed when the game starts
    #[arg(long, default_value = "4")]
    initial_pieces: usize,

    /// Probability that a spawned piece is fake
    #[arg(long, default_value = "0.3")]
    bad_piece_probability: f64,

    /// Milliseconds between piece spawns
    #[arg(long, default_value = "2000")]
    spawn_interval: u64,

    /// Base time penalty in milliseconds
    #[arg(short, long, default_value = "100")]
    base_penalty: u64,
}

impl Args {
    fn rules(&self) -> GameRules {
        GameRules {
            board_width: self.board_width,
            board_height: self.board_height,
            goal_area_height: self.goal_area_height,
            goal_count: self.goals,
            team_size: self.team_size,
            max_pieces_on_board: self.max_pieces,
            initial_pieces: self.initial_pieces,
            bad_piece_probability: self.bad_piece_probability,
            piece_spawn_interval_ms: self.spawn_interval,
            base_time_penalty: self.base_penalty,
            ..GameRules::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let rules = args.rules();

    info!(
        "Starting game master: {}x{} board, {} goals, {} agents per team",
        rules.board_width, rules.board_height, rules.goal_count, rules.team_size
    );

    let mut server = Server::new(&address, rules).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Game master stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
