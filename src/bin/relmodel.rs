//! relmodel CLI - reverse engineer a relational schema and check model configurations
//!
//! Database URL precedence: CLI flag > config file > DATABASE_URL (read from `.env` too).

use clap::{Parser, Subcommand, ValueEnum};
use relmodel::config::ModelConfig;
use relmodel::db::Database;
use relmodel::filters::Mappings;
use relmodel::model::ReverseMode;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "relmodel")]
#[command(version, about = "Relational schema reverse engineering with configurable identifier and value filters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Reverse engineer a live database and print the resulting schema
    Inspect {
        /// Path to a model configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Database URL, overrides the configuration file and DATABASE_URL
        #[arg(short, long)]
        database_url: Option<String>,

        /// Schema to inspect (defaults to the connection's current schema)
        #[arg(short, long)]
        schema: Option<String>,

        /// Reverse engineering mode (none, columns, tables, joins, full, extended)
        #[arg(short, long)]
        reverse: Option<ReverseMode>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: Format,
    },

    /// Load a model configuration and build its filters without connecting
    Validate {
        /// Path to the model configuration file
        #[arg(short, long, default_value = "relmodel.yaml")]
        config: PathBuf,
    },

    /// Translate SQL names through identifier mappings
    Translate {
        /// Path to a model configuration file providing identifiers.mapping
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Identifier mapping, e.g. "*=lowercase, *.*=snake_to_camel"
        #[arg(short, long)]
        mapping: Option<String>,

        /// Names to translate: `table` or `table.column`
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { config, database_url, schema, reverse, format } => {
            inspect(config, database_url, schema, reverse, format)
        }
        Commands::Validate { config } => validate(config),
        Commands::Translate { config, mapping, names } => translate(config, mapping, names),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ModelConfig, String> {
    match path {
        Some(path) => ModelConfig::load_from_file(&path).map_err(|e| e.to_string()),
        None => Ok(ModelConfig::new("default")),
    }
}

/// Reverse engineer a live database
fn inspect(
    config: Option<PathBuf>,
    database_url: Option<String>,
    schema: Option<String>,
    reverse: Option<ReverseMode>,
    format: Format,
) -> Result<(), String> {
    let mut config = load_config(config)?;
    let url = database_url
        .or_else(|| config.database_url.clone())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| "no database URL: use --database-url, the config file or DATABASE_URL".to_string())?;
    config.database_url = Some(url.clone());
    config.reverse = reverse.unwrap_or(if config.reverse == ReverseMode::None {
        ReverseMode::Extended
    } else {
        config.reverse
    });

    let model = config.build_model().map_err(|e| e.to_string())?;
    let db = Database::connect(&url, &config.pool).map_err(|e| e.to_string())?;
    db.ping().map_err(|e| e.to_string())?;

    let mut metadata = db
        .metadata(schema.or(config.schema.clone()))
        .map_err(|e| e.to_string())?;
    let schema = model.initialize(&mut metadata).map_err(|e| e.to_string())?;

    let summary = schema.summary();
    let output = match format {
        Format::Yaml => serde_yaml::to_string(&summary).map_err(|e| e.to_string())?,
        Format::Json => serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?,
    };
    println!("{}", output);
    Ok(())
}

/// Validate a model configuration
fn validate(config: PathBuf) -> Result<(), String> {
    println!("🔍 Validating {}...", config.display());
    let loaded = ModelConfig::load_from_file(&config).map_err(|e| e.to_string())?;
    let model = loaded.build_model().map_err(|e| e.to_string())?;

    println!("  ✓ Model {}", model.model_id());
    println!("  ✓ Reverse mode: {}", model.reverse_mode());
    println!("  ✓ Driver: {}", model.driver().tag);
    println!("  ✓ {} declared entities", model.declarations().count());
    if model.filters().needs_cryptograph() {
        println!("  ℹ Value filters need a cryptograph");
    }
    println!("✅ Configuration is valid");
    Ok(())
}

/// Translate table and column names
fn translate(config: Option<PathBuf>, mapping: Option<String>, names: Vec<String>) -> Result<(), String> {
    let mut config = load_config(config)?;
    if let Some(mapping) = mapping {
        config.identifiers.mapping = Some(Mappings::Flat(mapping));
    }
    let model = config.build_model().map_err(|e| e.to_string())?;
    let identifiers = model.identifiers();

    for name in names {
        let translated = match name.split_once('.') {
            Some((table, column)) => format!(
                "{}.{}",
                identifiers.transform_table_name(table).map_err(|e| e.to_string())?,
                identifiers
                    .transform_column_name(table, column)
                    .map_err(|e| e.to_string())?
            ),
            None => identifiers.transform_table_name(&name).map_err(|e| e.to_string())?,
        };
        println!("{} -> {}", name, translated);
    }
    Ok(())
}
