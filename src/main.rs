use std::env;
use std::io;

use anyhow::Result;

use lit_sphere::{run_headless, run_windowed, DemoConfig, WindowInitError};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = DemoConfig::from_args(env::args().skip(1))?;
    let mut stdout = io::stdout().lock();

    if config.headless {
        return run_headless(&config, &mut stdout);
    }

    match run_windowed(&config) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or install a windowing backend to enable rendering)."
                );
                run_headless(&config, &mut stdout)
            } else {
                Err(err)
            }
        }
    }
}
