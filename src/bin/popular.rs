//! Prints the popularity ranking as a JSON envelope on stdout.

use clap::Parser;
use tastebud::{init_tracing, ApiResponse, AppState, Config, ItemId};

#[derive(Parser, Debug)]
#[command(author, version, about = "List popular items", long_about = None)]
struct Args {
    /// Number of items to return; invalid values use the configured default.
    #[arg(allow_hyphen_values = true)]
    top_n: Option<String>,

    #[arg(short, long, default_value = "config/default.toml")]
    config: String,
}

async fn run(args: Args) -> ApiResponse<Vec<ItemId>> {
    let state = match Config::load(Some(&args.config)) {
        Ok(config) => AppState::new(config).await,
        Err(e) => Err(e),
    };

    match state {
        Ok(state) => {
            state
                .recommendation_service
                .popular_response(args.top_n.as_deref())
                .await
        }
        Err(e) => ApiResponse::from_result(Err(e)),
    }
}

#[tokio::main]
async fn main() {
    init_tracing("error");

    let response = run(Args::parse()).await;
    match serde_json::to_string(&response) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to encode response: {}", e),
    }
    if response.code != 200 {
        std::process::exit(1);
    }
}
