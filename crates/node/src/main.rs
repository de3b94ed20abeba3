use resync_log as logging;

macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if crate::logging::enabled($level) {
            crate::logging::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

macro_rules! log_error {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Error, $($arg)*);
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Warn, $($arg)*);
    }};
}

macro_rules! log_info {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Info, $($arg)*);
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Debug, $($arg)*);
    }};
}

macro_rules! log_trace {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Trace, $($arg)*);
    }};
}

pub mod cache;
pub mod fetch;
pub mod resolver;
pub mod sync;

use std::path::PathBuf;

use resync_chainstate::CheckpointManager;
use resync_script::StandardEngine;

use crate::cache::FetchCache;
use crate::fetch::{FetchClient, ShellSource};
use crate::resolver::BlockResolver;
use crate::sync::Syncer;

const DEFAULT_DATA_DIR: &str = ".";

#[derive(Clone, Debug, PartialEq, Eq)]
struct Config {
    data_dir: PathBuf,
    command_template: String,
    log_level: logging::Level,
    log_format: logging::Format,
    log_timestamps: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

pub fn run_entry() -> Result<(), String> {
    match parse_args()? {
        CliAction::PrintHelp => {
            println!("{}", usage());
            Ok(())
        }
        CliAction::PrintVersion => {
            println!("resync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(config) => run_with_config(config),
    }
}

fn run_with_config(config: Config) -> Result<(), String> {
    logging::init(logging::LogConfig {
        level: config.log_level,
        format: config.log_format,
        timestamps: config.log_timestamps,
    });
    log_info!(
        "rpc call: {} (data_dir={})",
        config.command_template,
        config.data_dir.display()
    );

    let source = ShellSource::new(config.command_template).map_err(|err| err.to_string())?;
    let resolver = BlockResolver::new(&config.data_dir, FetchClient::new(source), FetchCache::new())
        .map_err(|err| err.to_string())?;
    let checkpoints = CheckpointManager::new(&config.data_dir);
    let mut syncer =
        Syncer::bootstrap(resolver, StandardEngine, checkpoints).map_err(|err| err.to_string())?;

    match syncer.run() {
        Ok(()) => Ok(()),
        Err(err) => {
            log_error!("{err}");
            Err(format!(
                "resync stopped; last verified height {}",
                syncer.height()
            ))
        }
    }
}

fn parse_args() -> Result<CliAction, String> {
    parse_args_from(std::env::args().skip(1))
}

fn parse_args_from<I>(raw_args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut data_dir: Option<PathBuf> = None;
    let mut command_template: Option<String> = None;
    let mut log_level = logging::Level::Info;
    let mut log_format = logging::Format::Text;
    let mut log_timestamps = true;
    let mut args = raw_args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliAction::PrintHelp),
            "--version" | "-V" => return Ok(CliAction::PrintVersion),
            "--data-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --data-dir\n{}", usage()))?;
                data_dir = Some(PathBuf::from(value));
            }
            "--log-level" | "--loglevel" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --log-level\n{}", usage()))?;
                log_level = value
                    .parse()
                    .map_err(|err| format!("{err}\n{}", usage()))?;
            }
            "--log-format" | "--logformat" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --log-format\n{}", usage()))?;
                log_format = value
                    .parse()
                    .map_err(|err| format!("{err}\n{}", usage()))?;
            }
            "--log-timestamps" | "--logtimestamps" => {
                log_timestamps = true;
            }
            "--no-log-timestamps" | "--no-logtimestamps" => {
                log_timestamps = false;
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option '{other}'\n{}", usage()));
            }
            _ => {
                if command_template.is_some() {
                    return Err(format!(
                        "unexpected argument '{arg}' (quote the command template)\n{}",
                        usage()
                    ));
                }
                command_template = Some(arg);
            }
        }
    }

    let command_template = command_template
        .filter(|template| !template.trim().is_empty())
        .ok_or_else(|| format!("missing RPC command template\n{}", usage()))?;

    Ok(CliAction::Run(Config {
        data_dir: data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        command_template,
        log_level,
        log_format,
        log_timestamps,
    }))
}

fn usage() -> String {
    [
        "Usage:",
        "  resync [options] \"<rpc command template>\"",
        "",
        "Replays the chain from genesis (or the last saved state), re-verifying",
        "every input script. Each request runs `<template> <verb> <args> > <file>`",
        "through sh, e.g. \"bitcoin-cli -datadir=/srv/btc\".",
        "",
        "Options:",
        "  --help, -h  Print this help and exit",
        "  --version, -V  Print version and exit",
        "  --data-dir  Directory holding blockdata/ and the sync state (default: .)",
        "  --log-level  Log verbosity (error|warn|info|debug|trace) (default: info)",
        "  --log-format  Log output format (text|json) (default: text)",
        "  --log-timestamps  Enable timestamps in text logs (default: on)",
        "  --no-log-timestamps  Disable timestamps in text logs",
    ]
    .join("\n")
}
