use clap::Parser as ClapParser;

use abl_ls::lsp::run_server;

#[derive(ClapParser)]
#[command(name = "abl-lsp")]
#[command(about = "Language server for OpenEdge ABL")]
#[command(version)]
struct Cli {
    /// Communicate over stdio (the default and only transport; accepted for
    /// compatibility with editors that pass it explicitly)
    #[arg(long = "stdio")]
    stdio: bool,
}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();
    run_server().await;
}
