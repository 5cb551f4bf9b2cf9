use clap::Parser;

mod cli;
mod runtime;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::parse();
    runtime::run(args)
}
