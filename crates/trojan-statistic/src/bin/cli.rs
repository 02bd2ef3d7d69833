//! Trojan statistic standalone binary.

use std::process::ExitCode;

use clap::Parser;
use trojan_statistic::cli::{self, StatArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args = StatArgs::parse();

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
