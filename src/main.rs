/*
 * This file is part of Thermoreg.
 *
 * Copyright (C) 2025 Thermoreg contributors
 *
 * Thermoreg is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Thermoreg is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Thermoreg. If not, see <https://www.gnu.org/licenses/>.
 */

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use tracing::{error, info};

use thermoreg::constants::{env, paths};
use thermoreg::shutdown::{install_signal_handler, ShutdownSignal};
use thermoreg::{service, CliOverrides, Settings};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration or usage problem
const EXIT_USAGE: u8 = 2;

#[derive(Debug, PartialEq)]
enum Invocation {
    Run(CliOverrides),
    Help,
    Version,
}

fn print_help() {
    eprintln!("thermoreg {} - hysteresis heater regulator", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    thermoreg [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH       Config file (default {})", paths::CONFIG_FILE);
    eprintln!("        --lower CELSIUS     Switch heater on below this temperature");
    eprintln!("        --upper CELSIUS     Switch heater off above this temperature");
    eprintln!("        --duty PERCENT      Heater duty cycle while on (1-100)");
    eprintln!("        --interval-ms MS    Delay between samples");
    eprintln!("        --logging           Write per-cycle JSON events");
    eprintln!("    -v, --version           Print version");
    eprintln!("    -h, --help              Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}           Log filter (trace, debug, info, warn, error)", env::LOG_LEVEL);
    eprintln!("    {}         Lower threshold", env::LOWER);
    eprintln!("    {}         Upper threshold", env::UPPER);
    eprintln!("    {}          Duty cycle", env::DUTY);
    eprintln!("    {}   Sample interval", env::INTERVAL_MS);
    eprintln!();
    eprintln!("Command line values override the environment, which overrides the config file.");
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = value.ok_or_else(|| anyhow!("{} requires a value", flag))?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid value '{}' for {}: {}", raw, flag, e))
}

fn parse_args(args: &[String]) -> anyhow::Result<Invocation> {
    let mut cli = CliOverrides::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-v" | "--version" => return Ok(Invocation::Version),
            "-c" | "--config" => {
                let path: String = parse_value(arg, iter.next())?;
                cli.config_path = Some(PathBuf::from(path));
            }
            "--lower" => cli.lower_c = Some(parse_value(arg, iter.next())?),
            "--upper" => cli.upper_c = Some(parse_value(arg, iter.next())?),
            "--duty" => cli.duty_cycle_pct = Some(parse_value(arg, iter.next())?),
            "--interval-ms" => cli.sample_interval_ms = Some(parse_value(arg, iter.next())?),
            "--logging" => cli.event_log = true,
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(Invocation::Run(cli))
}

/// Journald when running under systemd, stdout otherwise
fn init_tracing() {
    let filter = std::env::var(env::LOG_LEVEL).unwrap_or_else(|_| "info".to_string());
    let mut use_journald = Path::new(paths::JOURNALD_SOCKET).exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                use_journald = false;
            }
        }
    }
    if !use_journald {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(&filter))
            .with_target(false)
            .init();
    }
    info!("Logging to {}", if use_journald { "systemd journal" } else { "stdout" });
}

fn load_settings(cli: &CliOverrides) -> anyhow::Result<Settings> {
    let settings = Settings::load(cli).context("failed to load configuration")?;
    settings.threshold_config().context("invalid configuration")?;
    Ok(settings)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(Invocation::Run(cli)) => cli,
        Ok(Invocation::Help) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Ok(Invocation::Version) => {
            println!("thermoreg {}", VERSION);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_tracing();
    info!("thermoreg {} starting", VERSION);

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let mut shutdown = ShutdownSignal::new();
    install_signal_handler(shutdown.handle());

    match service::run_service(&settings, &mut shutdown).await {
        Ok(()) => {
            info!("Shutdown complete, heater off");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}
