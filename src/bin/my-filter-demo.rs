use std::process;

use gstmyfilter::harness::{Harness, HarnessConfig, HarnessError, FAILURE_EXIT_CODE};

fn run(config: &HarnessConfig) -> Result<(), HarnessError> {
    let harness = Harness::build(config)?;
    harness.probe_accept_caps();
    let report = harness.run()?;
    println!("{}", report.outcome);
    Ok(())
}

fn main() {
    if let Err(err) = gstreamer::init() {
        eprintln!("Could not initialize GStreamer: {}", err);
        process::exit(FAILURE_EXIT_CODE);
    }
    // a missing filter is reported by the harness when it builds the pipeline
    if let Err(err) = gstmyfilter::plugin_register_static() {
        eprintln!("Could not register the filter plugin: {}", err);
    }

    let config = match HarnessConfig::from_args(std::env::args()) {
        Ok(config) => config,
        Err(err) => {
            err.report();
            process::exit(err.exit_code());
        }
    };

    if let Err(err) = run(&config) {
        err.report();
        process::exit(err.exit_code());
    }
}
