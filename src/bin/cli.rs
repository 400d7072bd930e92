use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hostcheck::config::Config;
use hostcheck::error::CheckError;
use hostcheck::facts::SchemaRegistry;
use hostcheck::output::OutputFormat;
use hostcheck::rules::{Catalog, Severity};
use hostcheck::RunOptions;

#[derive(Parser)]
#[command(
    name = "hostcheck",
    about = "Host compliance checker",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the check catalog against host snapshots
    Check {
        /// Host snapshot files (JSON)
        #[arg(required = true)]
        snapshots: Vec<PathBuf>,

        /// Additional check catalog file or directory (repeatable)
        #[arg(long)]
        catalog: Vec<PathBuf>,

        /// Do not load the built-in checks
        #[arg(long)]
        no_builtin: bool,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Minimum anomaly severity to fail (info, low, medium, high, critical)
        #[arg(long)]
        fail_on: Option<String>,

        /// Worker threads (0 = one per CPU)
        #[arg(long, env = "HOSTCHECK_WORKERS")]
        workers: Option<usize>,

        /// Stop scheduling checks after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List all loaded checks
    ListChecks {
        /// Additional check catalog file or directory (repeatable)
        #[arg(long)]
        catalog: Vec<PathBuf>,

        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Validate check catalog files without evaluating anything
    Validate {
        /// Catalog files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Generate a starter .hostcheck.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HOSTCHECK_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            snapshots,
            catalog,
            no_builtin,
            config,
            format,
            fail_on,
            workers,
            timeout_ms,
            output,
        } => cmd_check(CheckArgs {
            snapshots,
            catalog,
            no_builtin,
            config,
            format,
            fail_on,
            workers,
            timeout_ms,
            output,
        }),
        Commands::ListChecks { catalog, format } => cmd_list_checks(catalog, format),
        Commands::Validate { paths } => cmd_validate(paths),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

struct CheckArgs {
    snapshots: Vec<PathBuf>,
    catalog: Vec<PathBuf>,
    no_builtin: bool,
    config: Option<PathBuf>,
    format: String,
    fail_on: Option<String>,
    workers: Option<usize>,
    timeout_ms: Option<u64>,
    output: Option<PathBuf>,
}

fn cmd_check(args: CheckArgs) -> Result<i32, CheckError> {
    let format = OutputFormat::from_str_lenient(&args.format).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", args.format);
        OutputFormat::Console
    });

    let fail_on = args.fail_on.and_then(|s| {
        let sev = Severity::from_str_lenient(&s);
        if sev.is_none() {
            eprintln!("Warning: unknown severity '{}', using config default", s);
        }
        sev
    });

    let options = RunOptions {
        config_path: args.config,
        catalog_paths: args.catalog,
        no_builtin: args.no_builtin,
        workers: args.workers,
        timeout: args.timeout_ms.map(Duration::from_millis),
        fail_on_override: fail_on,
        format,
        ..Default::default()
    };

    let report = hostcheck::run(&args.snapshots, &options)?;
    let rendered = hostcheck::render_report(&report, format)?;

    match args.output {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = pass, 1 = anomalies or errors above threshold
    Ok(if report.verdict.pass { 0 } else { 1 })
}

fn cmd_list_checks(catalog_paths: Vec<PathBuf>, format_str: String) -> Result<i32, CheckError> {
    let registry = SchemaRegistry::builtin();
    let mut catalog = Catalog::builtin(&registry)?;
    for path in &catalog_paths {
        catalog.merge(Catalog::load_path(path, &registry)?)?;
    }
    let checks = catalog.list_checks();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&checks)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<34} {:<22} {:<10} PROBLEM",
                "ID", "ARTIFACT", "SEVERITY"
            );
            println!("{}", "-".repeat(100));
            for check in &checks {
                println!(
                    "{:<34} {:<22} {:<10} {}",
                    check.id,
                    check.artifact,
                    check.severity.to_string(),
                    check.problem,
                );
            }
        }
    }

    Ok(0)
}

fn cmd_validate(paths: Vec<PathBuf>) -> Result<i32, CheckError> {
    let registry = SchemaRegistry::builtin();
    let mut catalog = Catalog::default();
    for path in &paths {
        catalog.merge(Catalog::load_path(path, &registry)?)?;
    }
    for source in catalog.sources() {
        println!("{}  {} check(s)  sha256:{}", source.name, source.checks, source.sha256);
    }
    println!("OK: {} check(s) valid", catalog.len());
    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, CheckError> {
    let path = PathBuf::from(".hostcheck.toml");

    if path.exists() && !force {
        eprintln!(".hostcheck.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .hostcheck.toml");

    Ok(0)
}
