//! rulegraph CLI: compile boolean rules into a shared path graph.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use rulegraph::engine::{Engine, EngineConfig, RuleDefinition};

#[derive(Parser)]
#[command(name = "rulegraph", version, about = "Boolean rule graph compiler")]
struct Cli {
    /// TOML config file. Flags given on the command line take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent storage. In-memory when omitted.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Largest number of distinct attributes a formula may reference.
    #[arg(long, global = true)]
    max_attributes: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file.
    Init {
        /// Where to write the config.
        #[arg(long, default_value = "rulegraph.toml")]
        path: PathBuf,
    },

    /// Compile a single rule.
    Create {
        /// Rule id.
        #[arg(long)]
        id: String,

        /// Boolean formula over numbered attributes, e.g. "(0&1)|(2&!3)".
        #[arg(long)]
        formula: String,
    },

    /// Compile every rule of a JSON file: [{"id": "...", "formula": "..."}, ...].
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the minimal path expressions of a formula without storing it.
    Minimize {
        #[arg(long)]
        formula: String,
    },

    /// Show a rule and its paths.
    Show {
        /// Rule id.
        id: String,
    },

    /// Show graph statistics.
    Info,

    /// Export the graph as JSON.
    Export,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match cli.config {
        Some(ref path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(max) = cli.max_attributes {
        config.max_attributes = max;
    }
    Ok(config)
}

fn init(config: &EngineConfig, path: &Path) -> Result<()> {
    if path.exists() {
        miette::bail!("{} already exists", path.display());
    }
    config.validate()?;
    config.save(path)?;
    println!("Wrote config to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init { ref path } => init(&config, path)?,

        Commands::Create { ref id, ref formula } => {
            let engine = Engine::new(config)?;
            let ack = engine.create_rule(id, formula)?;
            println!("{}", ack.message);
        }

        Commands::Ingest { ref file } => {
            let engine = Engine::new(config)?;
            let content = std::fs::read_to_string(file).into_diagnostic()?;
            let rules: Vec<RuleDefinition> = serde_json::from_str(&content).into_diagnostic()?;
            let report = engine.ingest(&rules);
            println!("Ingested {} rules from {}", rules.len(), file.display());
            print!("{report}");
        }

        Commands::Minimize { ref formula } => {
            let engine = Engine::new(config)?;
            for path in engine.minimize(formula)? {
                println!("{path}");
            }
        }

        Commands::Show { ref id } => {
            let engine = Engine::new(config)?;
            print!("{}", engine.rule(id)?);
        }

        Commands::Info => {
            let engine = Engine::new(config)?;
            print!("{}", engine.info()?);
        }

        Commands::Export => {
            let engine = Engine::new(config)?;
            let json = serde_json::to_string_pretty(&engine.export()?).into_diagnostic()?;
            println!("{json}");
        }
    }

    Ok(())
}
