use clap::Parser;
use log::{debug, error};

mod args;
mod openpoll;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("command: {:?}", args.command);

    if let Err(e) = openpoll::run(&args) {
        error!("{}", e);
        match serde_json::to_string_pretty(&openpoll::error_json(&e)) {
            Ok(js) => eprintln!("{}", js),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(openpoll::exit_code(&e));
    }
}
