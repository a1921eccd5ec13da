use std::env;
use std::process;

use getopts::Options;

pub struct Args {
    pub config: Option<String>,
    pub debug: bool,
}

pub fn args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::new();
    opts.optflag("h", "help", "Show help message.");
    opts.optflag("d", "debug", "Enable trace logging.");
    opts.optopt("c", "config", "Use config file.", "FILE");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("Failed to parse options: {}", f);
            usage(1, opts);
        }
    };

    if matches.opt_present("h") {
        usage(0, opts);
    }

    Args {
        config: matches.opt_str("c"),
        debug: matches.opt_present("d"),
    }
}

fn usage(code: i32, opts: Options) -> ! {
    let brief = "Usage: dendrite [options]".to_owned();
    print!("{}", opts.usage(&brief));
    process::exit(code);
}
