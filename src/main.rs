//! Stanza CLI — indentation-structured batch directives.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "stanza",
    version,
    about = "Run indentation-structured directive scripts, fanning top-level stanzas out to worker processes"
)]
struct Cli {
    #[command(subcommand)]
    command: stanza::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    match stanza::cli::dispatch(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(stanza::core::types::EXIT_FAILURE);
        }
    }
}
