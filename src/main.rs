use clap::Parser;
use pushsync_lib::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    pushsync_lib::logging::init();

    if let Err(e) = pushsync_lib::run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
