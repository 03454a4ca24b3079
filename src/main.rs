use std::process::ExitCode;

use clap::Parser;
use photofe::cli::{self, CliArgs};
use photofe::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Session log (overwrites the previous session's log).
    logger::init(args.log_level_filter(), args.verbose);
    log::info!("PhotoFE {} starting", env!("CARGO_PKG_VERSION"));

    let code = cli::run(args);
    log::logger().flush();
    code
}
