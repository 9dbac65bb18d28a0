//! Coalesce CLI - Merge candidate columns of a CSV into output columns
//!
//! # Main Commands
//!
//! ```bash
//! coalesce run input.csv -c step.json      # Coalesce a CSV file
//! coalesce run input.csv                   # ... with the best stored configuration
//! coalesce check -c step.xml -i input.csv  # Check a configuration against a CSV header
//! coalesce schema -c step.json -i input.csv
//! coalesce serve                           # Start HTTP server (port 3000)
//! coalesce template list                   # Manage stored configurations
//! ```
//!
//! # Configuration Commands
//!
//! ```bash
//! coalesce config example [--xml]          # Print an example configuration
//! coalesce config convert in.json out.xml  # Convert between JSON and XML
//! coalesce config validate step.json       # Validate a configuration file
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use coalesce::{
    coalesce_csv, coalesce_with_registry, coalesce_with_stored, example_config,
    parse_csv_file_auto, set_verbosity, to_xml, CoalesceConfig, ConfigRegistry, LogLevel,
    ParseOptions, PipelineResult, RowCoalescer, RunOptions,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "coalesce")]
#[command(about = "Coalesce candidate fields of CSV rows into output fields", long_about = None)]
struct Cli {
    /// Log verbosity: error, warning, success, info, debug, rowlevel
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the step over a CSV file
    Run {
        /// Input CSV file
        input: PathBuf,

        /// Configuration file (JSON or XML); the registry is searched if omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// The second CSV line lists the column types
        #[arg(long)]
        typed_header: bool,

        /// Override the configuration's empty-string handling
        #[arg(long)]
        empty_is_null: Option<bool>,

        /// Step name recorded as origin of the output fields
        #[arg(long)]
        step_name: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a configuration against the header of a CSV file
    Check {
        /// Configuration file (JSON or XML)
        #[arg(short, long)]
        config: PathBuf,

        /// CSV file providing the upstream schema
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// The second CSV line lists the column types
        #[arg(long)]
        typed_header: bool,
    },

    /// Print the output schema for a CSV file
    Schema {
        /// Configuration file (JSON or XML)
        #[arg(short, long)]
        config: PathBuf,

        /// CSV file providing the input schema
        #[arg(short, long)]
        input: PathBuf,

        /// The second CSV line lists the column types
        #[arg(long)]
        typed_header: bool,
    },

    /// Configuration file tools
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage stored configurations
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print an example configuration
    Example {
        /// Print the XML form instead of JSON
        #[arg(long)]
        xml: bool,
    },

    /// Convert a configuration file, format picked from the extensions
    Convert {
        input: PathBuf,
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List all stored configurations
    List,

    /// Import a configuration file (JSON or XML)
    Import {
        /// Configuration file to import
        file: PathBuf,
        /// Name for the stored configuration
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a stored configuration
    Show {
        /// Configuration ID
        id: String,
    },

    /// Delete a stored configuration
    Delete {
        /// Configuration ID
        id: String,
    },

    /// Use a stored configuration to coalesce a CSV
    Use {
        /// Configuration ID
        id: String,
        /// Input CSV file
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Some(level) = cli.log_level {
        set_verbosity(level);
    }

    let result = match cli.command {
        Commands::Run {
            input,
            config,
            delimiter,
            typed_header,
            empty_is_null,
            step_name,
            format,
            output,
        } => {
            let mut options = RunOptions {
                parse: ParseOptions {
                    delimiter,
                    typed_header,
                },
                empty_is_null,
                ..RunOptions::default()
            };
            if let Some(name) = step_name {
                options.step_name = name;
            }
            cmd_run(&input, config.as_deref(), &options, format, output.as_deref())
        }

        Commands::Check {
            config,
            input,
            typed_header,
        } => cmd_check(&config, input.as_deref(), typed_header),

        Commands::Schema {
            config,
            input,
            typed_header,
        } => cmd_schema(&config, &input, typed_header),

        Commands::Config { action } => cmd_config(action),

        Commands::Serve { port } => cmd_serve(port).await,

        Commands::Template { action } => cmd_template(action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    input: &Path,
    config_path: Option<&Path>,
    options: &RunOptions,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let result = match config_path {
        Some(path) => coalesce_csv(input, CoalesceConfig::load(path)?, options)?,
        None => {
            let mut registry = ConfigRegistry::new();
            coalesce_with_registry(input, &mut registry, options)?
        }
    };

    eprintln!("   Encoding: {}", result.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.csv_info.delimiter));
    eprintln!("   Rows: {} read, {} written", result.stats.lines_read, result.stats.lines_written);
    if let Some(ref id) = result.config_id {
        eprintln!("   Configuration: {}", id);
    }

    write_result(&result, format, options.parse.typed_header, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_check(
    config_path: &Path,
    input: Option<&Path>,
    typed_header: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let coalescer = RowCoalescer::configure(CoalesceConfig::load(config_path)?)?;

    let (prev, input_steps) = match input {
        Some(path) => {
            let parsed = parse_csv_file_auto(path, &ParseOptions { delimiter: None, typed_header })?;
            (Some(parsed.meta), vec![path.display().to_string()])
        }
        None => (None, Vec::new()),
    };

    let remarks = coalescer.check(prev.as_ref(), &input_steps);
    let mut errors = 0;
    for remark in &remarks {
        if remark.is_error() {
            errors += 1;
            eprintln!("❌ {}", remark.message);
        } else {
            eprintln!("✅ {}", remark.message);
        }
    }

    if errors > 0 {
        return Err(format!("{} check(s) failed", errors).into());
    }
    Ok(())
}

fn cmd_schema(config_path: &Path, input: &Path, typed_header: bool) -> Result<(), Box<dyn std::error::Error>> {
    let coalescer = RowCoalescer::configure(CoalesceConfig::load(config_path)?)?;
    let parsed = parse_csv_file_auto(input, &ParseOptions { delimiter: None, typed_header })?;
    let schema = coalescer.derive_schema(&parsed.meta)?;

    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Example { xml } => {
            let config = example_config();
            if xml {
                println!("{}", to_xml(&config)?);
            } else {
                println!("{}", config.to_json()?);
            }
        }

        ConfigAction::Convert { input, output } => {
            let config = CoalesceConfig::load(&input)?;
            config.save(&output)?;
            eprintln!("💾 Converted {} → {}", input.display(), output.display());
        }

        ConfigAction::Validate { input } => {
            let config = CoalesceConfig::load(&input)?;
            eprintln!("✅ Valid configuration with {} output field(s):", config.fields.len());
            for spec in &config.fields {
                let candidates: Vec<&str> = spec.configured_candidates().collect();
                eprintln!(
                    "   {} ← [{}] ({}{})",
                    spec.output_name,
                    candidates.join(", "),
                    spec.value_type,
                    if spec.remove { ", remove inputs" } else { "" }
                );
            }
        }
    }
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    coalesce::server::start_server(port).await
}

fn cmd_template(action: TemplateAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = ConfigRegistry::new();

    match action {
        TemplateAction::List => {
            let stored = registry.list();
            if stored.is_empty() {
                eprintln!("📋 No configurations stored yet.");
                eprintln!("   Use 'coalesce template import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored configurations ({}):\n", stored.len());
            for t in stored {
                println!("  📄 {} ({})", t.name, t.id);
                println!("     Columns: {}", t.input_columns.join(", "));
                println!("     Success rate: {:.0}%", t.success_rate * 100.0);
                println!("     Uses: {}", t.use_count);
                if let Some(ref last) = t.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        TemplateAction::Import { file, name } => {
            eprintln!("📥 Importing configuration from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Configuration saved with ID: {}", id);
        }

        TemplateAction::Show { id } => {
            let t = registry.get(&id)?;
            println!("📄 Configuration: {} ({})\n", t.name, t.id);
            println!("Input columns: {}", t.input_columns.join(", "));
            println!("Created: {}", t.created_at);
            println!("Success rate: {:.0}%", t.success_rate * 100.0);
            println!("Uses: {}", t.use_count);
            println!("\nConfiguration:");
            println!("{}", t.config.to_json()?);
        }

        TemplateAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Configuration deleted: {}", id);
        }

        TemplateAction::Use { id, input, output } => {
            let stored = registry.get(&id)?;
            eprintln!("📄 Using configuration: {} ({})", stored.name, stored.id);

            let result = coalesce_with_stored(&input, &mut registry, &id, &RunOptions::default())?;
            eprintln!("   ✅ {} rows written", result.stats.lines_written);
            write_result(&result, OutputFormat::Csv, false, output.as_deref())?;
        }
    }

    Ok(())
}

fn write_result(
    result: &PipelineResult,
    format: OutputFormat,
    typed_header: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&result.to_json())?,
        OutputFormat::Csv => {
            let bytes = result.write_csv(Vec::new(), result.csv_info.delimiter, typed_header)?;
            String::from_utf8(bytes)?
        }
    };
    write_output(&content, output)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}
