use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use travel_companion::{
    App, ChatTurn, CompanionConfig, Coordinates, TravelMode, TurnResult, UserContext, telemetry,
    web,
};

#[derive(Parser)]
#[command(name = "travel-companion")]
#[command(version, about = "Conversational travel companion with verified recommendations")]
struct Cli {
    /// Configuration file (default: <config dir>/travel-companion/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Start without connectivity: chat is queued, routes come from cache or estimates
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the companion something
    Chat {
        message: String,
        /// Your position as lat,lon
        #[arg(long)]
        at: Option<Coordinates>,
        #[arg(short, long, default_value = "walk")]
        mode: TravelMode,
    },
    /// Route between two points
    Route {
        #[arg(long)]
        from: Coordinates,
        #[arg(long)]
        to: Coordinates,
        #[arg(short, long, default_value = "walk")]
        mode: TravelMode,
    },
    /// Order several stops into one route
    Optimize {
        /// A stop as lat,lon; repeat for every stop
        #[arg(long = "stop", required = true)]
        stops: Vec<Coordinates>,
        #[arg(long)]
        origin: Option<Coordinates>,
        #[arg(long)]
        destination: Option<Coordinates>,
        #[arg(long)]
        round_trip: bool,
        #[arg(short, long, default_value = "walk")]
        mode: TravelMode,
    },
    /// Serve the JSON API
    Serve {
        /// Overrides the port of `server.bind`
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn print_turn(result: &TurnResult) {
    println!("{}", result.content);
    if let Some(card) = &result.card {
        println!();
        println!("📍 {}", card.name);
        if !card.address.is_empty() {
            println!("   {}", card.address);
        }
        if let Some(label) = &card.distance_label {
            println!("   {label}");
        }
        if let Some(rating) = card.rating {
            let reviews = card
                .review_count
                .map(|n| format!(" ({n} reviews)"))
                .unwrap_or_default();
            println!("   ★ {rating:.1}{reviews}");
        }
    }
    for action in &result.actions {
        println!("→ {}", action.label);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        CompanionConfig::load_from_path(cli.config.clone()).context("Failed to load configuration")?;
    let _telemetry = telemetry::init(&config.logging, cli.verbose)?;

    let app = App::from_config(&config).context("Failed to start the companion")?;
    if cli.offline {
        app.gate.set_online(false);
    }

    match cli.command {
        Commands::Chat { message, at, mode } => {
            let turn = ChatTurn {
                message,
                context: UserContext {
                    location: at,
                    travel_mode: mode,
                },
                ..ChatTurn::default()
            };
            let result = app.companion.chat(&turn, &CancellationToken::new()).await;
            print_turn(&result);
        }
        Commands::Route { from, to, mode } => {
            let estimate = app.routing.route(from, to, mode).await;
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
        Commands::Optimize {
            stops,
            origin,
            destination,
            round_trip,
            mode,
        } => {
            let route = app
                .sequencer
                .optimize(&stops, origin, destination, round_trip, mode)
                .await?;
            println!("{}", serde_json::to_string_pretty(&route)?);
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                let host = config
                    .server
                    .bind
                    .rsplit_once(':')
                    .map_or("127.0.0.1", |(host, _)| host)
                    .to_string();
                config.server.bind = format!("{host}:{port}");
            }
            web::run(Arc::new(app), &config.server).await?;
        }
    }

    Ok(())
}
