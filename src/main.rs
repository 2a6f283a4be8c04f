use clap::Parser;
use tidyd::cli::{Args, run_cli};
use tidyd::output::OutputFormatter;

fn main() {
    let args = Args::parse();

    if let Err(e) = run_cli(args) {
        OutputFormatter::error(&format!("Error: {e:#}"));
        std::process::exit(1);
    }
}
