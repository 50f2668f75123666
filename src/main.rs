mod app;
mod auth;
mod catalog;
mod config;
mod constants;
mod conversion;
mod errors;
mod github;
mod handlers;
mod models;
mod sse_queue;
mod state;
mod token_accounting;
mod tokenizer;
mod upstream;
mod upstream_parse;
mod utils;
mod validation;

#[tokio::main]
async fn main() {
    app::run().await;
}
