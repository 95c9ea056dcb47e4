mod console;
mod startup;

use std::env;

fn main() {
    let result = startup::Args::parse(env::args().skip(1)).and_then(startup::run);

    if let Err(e) = result {
        eprintln!("probewire: {:#}", e);
        std::process::exit(1);
    }
}
