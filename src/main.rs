use std::{io, path::PathBuf};

use clap::{Arg, ArgAction, Command};
use retail::{Config, Tail};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn command() -> Command {
    Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .about("print lines appended to a log file since the previous run")
        .arg(
            Arg::new("OFFSET")
                .long("offset")
                .short('o')
                .value_parser(clap::value_parser!(PathBuf))
                .help("file to keep the position in, or a directory to put `offset.<log name>` into"),
        )
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("report rotation handling on stderr, repeat for more detail"),
        )
        .arg(
            Arg::new("LOG_FILE")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("log file to read"),
        )
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "retail=warn",
        1 => "retail=info",
        2 => "retail=debug",
        _ => "retail=trace",
    };
    // stdout carries the log contents
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<(), anyhow::Error> {
    let args = command().get_matches();
    init_tracing(args.get_count("VERBOSE"));

    let log_path = args
        .get_one::<PathBuf>("LOG_FILE")
        .ok_or_else(|| anyhow::anyhow!("log file is required"))?;
    let config = Config::resolve(log_path, args.get_one::<PathBuf>("OFFSET").map(PathBuf::as_path))?;

    let report = Tail::new(config).run(&mut io::stdout().lock())?;
    tracing::info!(
        verdict = ?report.verdict,
        predecessor = ?report.predecessor,
        predecessor_bytes = report.predecessor_bytes,
        current_bytes = report.current_bytes,
        "done"
    );

    Ok(())
}
