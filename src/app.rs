use dotenvy::dotenv;
use salvo::affix_state;
use salvo::cors::{AllowHeaders, AllowMethods, AllowOrigin, Cors};
use salvo::prelude::*;
use tracing::{error, info};

use crate::auth;
use crate::config::Config;
use crate::github::GitHubClient;
use crate::handlers;
use crate::state::AppState;
use crate::upstream::CopilotClient;
use crate::utils::init_tracing;

pub async fn run() {
    let _ = dotenv();
    let config = load_config_or_exit();
    init_tracing(&config.log_level);

    let copilot = or_exit(CopilotClient::new(&config));
    let github = or_exit(GitHubClient::new(&config.vscode_version));
    let host = config.host.clone();
    let port = config.port;
    let state = AppState::new(config, copilot, github);

    if let Err(message) = auth::bootstrap(&state).await {
        error!(phase = "startup", error = %message, "Failed to initialize Copilot credentials");
        std::process::exit(1);
    }

    info!(
        phase = "startup",
        account_type = state.config.account_type.as_str(),
        copilot_base_url = %state.config.copilot_base_url(),
        "Copilot gateway starting on {}:{}",
        host,
        port
    );

    let acceptor = TcpListener::new((host.as_str(), port)).bind().await;
    Server::new(acceptor).serve(build_service(state)).await;
}

pub(crate) fn build_service(state: AppState) -> Service {
    let cors = Cors::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
        .into_handler();

    let show_token = state.config.show_token;
    let router = Router::new()
        .hoop(affix_state::inject(state))
        .push(handlers::router(show_token));
    Service::new(router).hoop(cors)
}

fn load_config_or_exit() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration Error: {error}");
            std::process::exit(1);
        }
    }
}

fn or_exit<T>(result: Result<T, String>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            eprintln!("Initialization Error: {error}");
            std::process::exit(1);
        }
    }
}
