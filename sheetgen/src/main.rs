//! Command-line host for the formula pipeline.
//!
//! Runs one formula per invocation and prints the resulting grid, one row per
//! line. Settings come from optional per-tier TOML files; the API key may also
//! come from `OPENAI_API_KEY`.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use sheetgen::core::args::parse_args;
use sheetgen::core::resolve::{
    ResolvedConfig, Tier, keys, mask_credential, resolve_config,
    resolve_credential, resolve_endpoint,
};
use sheetgen::core::types::Shape;
use sheetgen::io::client::ModelClient;
use sheetgen::io::settings::{MemoryStore, SettingsPaths, load_settings};
use sheetgen::io::transport::{DEFAULT_TIMEOUT, HttpTransport};
use sheetgen::{Pipeline, exit_codes, logging};

const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Parser)]
#[command(
    name = "sheetgen",
    version,
    about = "Generate spreadsheet cells with a hosted language model"
)]
struct Cli {
    /// Document-tier settings file (TOML).
    #[arg(long, global = true)]
    document: Option<PathBuf>,

    /// Installation-tier settings file (TOML).
    #[arg(long, global = true)]
    installation: Option<PathBuf>,

    /// User-tier settings file holding `api_key` (TOML).
    #[arg(long, global = true)]
    user: Option<PathBuf>,

    /// Print merged diagnostics to stderr as JSON.
    #[arg(long, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Single text cell: TEXT [SYSTEM] [MODEL] [MAX_TOKENS] [TEMPERATURE] [TOOL]
    Text(FormulaArgs),
    /// One item per row: TEXT [SYSTEM] [MODEL] [MAX_TOKENS] [TEMPERATURE] [TOOL]
    List(FormulaArgs),
    /// One `key: value` row per field: TEXT SCHEMA [SYSTEM] [MODEL] ...
    Record(FormulaArgs),
    /// One JSON object per row: TEXT SCHEMA [SYSTEM] [MODEL] ...
    RecordList(FormulaArgs),
    /// Print the resolved configuration for TEXT without calling the model.
    Config {
        text: String,
    },
}

#[derive(clap::Args)]
struct FormulaArgs {
    /// Positional formula arguments; pass "" to skip a slot.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    #[serde(flatten)]
    config: &'a ResolvedConfig,
    target_count: u32,
    endpoint: String,
    credential: Option<String>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let store = load_store(&cli)?;

    let (shape, args) = match cli.command {
        Command::Text(formula) => (Shape::Text, formula.args),
        Command::List(formula) => (Shape::List, formula.args),
        Command::Record(formula) => (Shape::Record, formula.args),
        Command::RecordList(formula) => (Shape::RecordList, formula.args),
        Command::Config { text } => return cmd_config(&store, text),
    };
    let values: Vec<Value> = args.into_iter().map(Value::String).collect();

    let transport = HttpTransport::new(DEFAULT_TIMEOUT).context("build http client")?;
    let client = ModelClient::new(transport, resolve_endpoint(&store));
    let pipeline = Pipeline::new(&store, client);

    match pipeline.generate(shape, &values) {
        Ok(generation) => {
            for row in generation.grid.rows() {
                println!("{}", row.join("\t"));
            }
            if cli.diagnostics {
                let rendered = serde_json::to_string_pretty(&generation.diagnostics)
                    .context("serialize diagnostics")?;
                eprintln!("{rendered}");
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            println!("{}", err.render());
            Ok(exit_codes::for_error(&err))
        }
    }
}

fn load_store(cli: &Cli) -> Result<MemoryStore> {
    let mut store = load_settings(&SettingsPaths {
        user: cli.user.clone(),
        document: cli.document.clone(),
        installation: cli.installation.clone(),
    })?;
    if let Some(key) = env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()) {
        store.set(Tier::User, keys::API_KEY, Value::String(key));
    }
    Ok(store)
}

fn cmd_config(store: &MemoryStore, text: String) -> Result<i32> {
    let resolved = parse_args(Shape::List, &[Value::String(text)])
        .and_then(|parsed| resolve_config(&parsed, store));
    let config = match resolved {
        Ok(config) => config,
        Err(err) => {
            println!("{}", err.render());
            return Ok(exit_codes::for_error(&err));
        }
    };

    let report = ConfigReport {
        config: &config,
        target_count: config.target_count(),
        endpoint: resolve_endpoint(store),
        credential: resolve_credential(store)
            .ok()
            .map(|key| mask_credential(&key)),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize config")?
    );
    Ok(exit_codes::OK)
}
