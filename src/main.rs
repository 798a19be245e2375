use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = turnstile::cli::Cli::parse();
    if let Err(e) = turnstile::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
