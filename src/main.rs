use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};
use serde::Serialize;

use load_it_now::config::AppConfig;
use load_it_now::placement_id::{decode_placement_id, encode_placement_id};
use load_it_now::request::{CalculationResponse, read_request};

#[derive(Parser, Debug)]
#[command(name = "load-it-now", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        short,
        long,
        global = true,
        value_name = "[off, error, warn, info, debug, trace]",
        default_value = "info"
    )]
    log_level: LevelFilter,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate a load plan from a JSON request
    Calculate {
        /// Request file (container, items, options)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Encode a placement identifier
    Encode {
        #[arg(long)]
        plan: String,
        #[arg(long)]
        step: u32,
        #[arg(long)]
        item: String,
    },

    /// Decode a scanned placement identifier
    Decode { code: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    load_dotenv();
    init_logger(cli.log_level);

    let config = AppConfig::from_env();

    match cli.command {
        Command::Calculate { input, output } => {
            let request = read_request(&input)?;
            let mut validated = request
                .into_validated(&config.optimizer)
                .with_context(|| format!("invalid request in {}", input.display()))?;

            let status = validated
                .plan
                .calculate(validated.packing, validated.weights)
                .context("calculation could not be applied to the plan")?;
            info!("plan {} resolved as {}", validated.plan.id(), status);

            let response = CalculationResponse::from_plan(&validated.plan);
            let json = to_json(&response, config.output.pretty())?;
            write_output(output.as_deref(), &json)?;
        }
        Command::Encode { plan, step, item } => {
            let code = encode_placement_id(&plan, step, &item)?;
            println!("{code}");
        }
        Command::Decode { code } => match decode_placement_id(&code) {
            Some(id) => println!("{}", to_json(&id, config.output.pretty())?),
            None => bail!("'{}' is not a valid placement identifier", code.trim()),
        },
    }

    Ok(())
}

fn init_logger(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::NotFound)
        {
            eprintln!("Could not load .env: {}", err);
        }
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.context("could not serialize output")
}

fn write_output(path: Option<&Path>, json: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("could not write {}", path.display()))?;
            info!("result written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}").context("could not write to stdout")?;
        }
    }
    Ok(())
}
