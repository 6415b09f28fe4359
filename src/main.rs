mod cli;

use clap::Parser;
use cli::{run, Cli};

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .expect("default log filter is valid");
    tracing_subscriber::fmt().with_env_filter(env_filter).json().init();

    let cli = Cli::parse();
    run(cli).await;
}
