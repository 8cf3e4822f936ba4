#![forbid(unsafe_code)]

//! slv: Sensor Live View CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("slv: {e}");
        std::process::exit(e.exit_code());
    }
}
