use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multimodal_search_service::{
    configuration::get_configuration,
    domain::entities::{listing_post::try_parsing_posts_or_listing, post::Post},
    startup::Application,
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
};
use std::path::{Path, PathBuf};

/// Ingests posts into the multimodal index and searches it.
#[derive(Parser, Debug)]
#[command(name = "multimodal_search_service", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embeds and stores every post of a JSON file.
    Ingest {
        /// A JSON array of posts, or a saved subreddit listing response.
        file: PathBuf,
    },
    /// Prints the posts most similar to a free-text query.
    Search {
        query: String,
        /// Number of results, capped by `search.max_limit`.
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Records go to stderr so that stdout only carries the command output
    let tracing_subscriber = get_tracing_subscriber(
        "multimodal_search_service".into(),
        "info".into(),
        std::io::stderr,
    );
    init_tracing_subscriber(tracing_subscriber).context("Failed to set up tracing")?;

    let configuration = get_configuration().context("Failed to read configuration")?;
    let application = Application::build(configuration)
        .await
        .map_err(|error| anyhow::anyhow!("Failed to build application: {:?}", error))?;

    match cli.command {
        Commands::Ingest { file } => {
            let posts = read_posts(&file)?;
            let summary = application.ingest(&posts).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Search { query, limit } => {
            let results = application.search(&query, limit).await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}

/// Reads posts from a JSON array of posts, or from a saved listing
fn read_posts(file: &Path) -> Result<Vec<Post>> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    try_parsing_posts_or_listing(&data)
        .map_err(|error| anyhow::anyhow!("Invalid posts in {}: {}", file.display(), error))
}
