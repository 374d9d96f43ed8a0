use log::{error, info};
use rtl_daq_rs::config::Config;
use rtl_daq_rs::{daq, INI_FNAME};
use std::process;

fn main() {
    // The logger's verbosity comes from the config, so config errors can
    // only go to stderr directly
    let config = match Config::load(INI_FNAME) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration could not be loaded, exiting .. ({})", e);
            process::exit(-1);
        }
    };
    stderrlog::new()
        .verbosity(config.verbosity())
        .init()
        .unwrap();
    info!("Config succesfully loaded from {}", INI_FNAME);

    if let Err(e) = daq::run(&config) {
        error!("{}", e);
        process::exit(-1);
    }
}
