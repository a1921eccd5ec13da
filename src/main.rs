#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate serde_derive;

#[macro_use]
mod log;

mod args;
mod cli;
mod client;
mod cluster;
mod config;
mod errors;
mod peer;
mod ring;
mod util;
mod vclock;

#[cfg(test)]
mod tests;

use std::process;

fn main() {
    let args = args::args();

    let cfg = match config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if args.debug {
        log::log_init(log::LogLevel::Trace);
    } else {
        log::log_init(cfg.log_level());
    }

    info!(
        "Initializing dendrite: {} peers, {} tokens, N={} R={} W={}",
        cfg.num_nodes, cfg.num_tokens, cfg.n, cfg.r, cfg.w
    );
    config::validate(&cfg);

    if let Err(e) = cli::run(cfg) {
        error!("{}", e);
        for cause in e.iter().skip(1) {
            error!("caused by: {}", cause);
        }
        process::exit(1);
    }
    info!("Shutdown complete");
}
