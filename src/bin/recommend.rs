//! Prints personalised recommendations for one user as a JSON envelope on
//! stdout: `{"code": 200, "data": [...], "message": "success"}`.

use clap::Parser;
use tastebud::utils::validation::validate_recommendation_args;
use tastebud::{init_tracing, ApiResponse, AppState, Config, ItemId};

const USAGE: &str = "Usage: tastebud-recommend <user_id> [method] [top_n]";

#[derive(Parser, Debug)]
#[command(author, version, about = "Recommend items for a user", long_about = None)]
struct Args {
    /// Positive user id.
    #[arg(allow_hyphen_values = true)]
    user_id: Option<String>,

    /// collaborative|cf, content|cb, hybrid or popular. Anything else is hybrid.
    method: Option<String>,

    /// Number of items to return.
    #[arg(allow_hyphen_values = true)]
    top_n: Option<String>,

    #[arg(short, long, default_value = "config/default.toml")]
    config: String,
}

async fn run(args: Args) -> ApiResponse<Vec<ItemId>> {
    let config = match Config::load(Some(&args.config)) {
        Ok(config) => config,
        Err(e) => return ApiResponse::from_result(Err(e)),
    };

    // Bad arguments are reported before any connection is attempted.
    if let Err(e) = validate_recommendation_args(
        args.user_id.as_deref(),
        args.method.as_deref(),
        args.top_n.as_deref(),
        config.recommendation.count,
    ) {
        let mut response = ApiResponse::from_result(Err(e));
        response.message = format!("{}. {}", response.message, USAGE);
        return response;
    }

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => return ApiResponse::from_result(Err(e)),
    };

    state
        .recommendation_service
        .recommendation_response(
            args.user_id.as_deref(),
            args.method.as_deref(),
            args.top_n.as_deref(),
        )
        .await
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
