use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use sqlsight_core::{Config, Diagnostic, DiagnosticCode, Report, Severity};
use sqlsight_engine::{Compilation, Compiler, Source};
use sqlsight_sql::Tag;

/// sqlsight - Static analysis for SQLite sources
#[derive(Parser)]
#[command(name = "sqlsight")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlsight.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every source and write a diagnostics report
    Check {
        /// Files or directories to check (default: the project root)
        paths: Vec<PathBuf>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },

    /// Print compiled queries (arguments, result shape, rewritten SQL) as JSON
    Describe {
        /// Files or directories to compile (default: the project root)
        paths: Vec<PathBuf>,

        /// Only describe the query with this label
        #[arg(short, long)]
        query: Option<String>,

        /// Write the JSON to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the queries a change to one source file affects
    Impact {
        /// Source file to analyze
        file: PathBuf,
    },

    /// Write a default sqlsight.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;
    tracing::debug!(root = %config.project_root.display(), extensions = ?config.extensions, "loaded config");

    match cli.command {
        Commands::Check { paths, output, markdown } => {
            check_command(&config, &paths, &output, markdown.as_deref(), cli.verbose)
        }
        Commands::Describe { paths, query, output } => {
            describe_command(&config, &paths, query.as_deref(), output.as_deref())
        }
        Commands::Impact { file } => impact_command(&config, &file, cli.verbose),
        Commands::Init { force } => init_command(cli.config.as_deref(), force),
    }
}

/// Log to stderr, filtered by RUST_LOG (debug when verbose)
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(config_path) = path {
        return Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    let default_path = Path::new("sqlsight.toml");
    if default_path.exists() {
        return Config::from_file(default_path).context("Failed to load sqlsight.toml");
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

/// Read every source under `paths`, tagged by its project-relative path
fn collect_sources(config: &Config, paths: &[PathBuf]) -> Result<Vec<Source>> {
    let roots: Vec<PathBuf> = if paths.is_empty() {
        vec![config.project_root.clone()]
    } else {
        paths.to_vec()
    };

    let mut sources = Vec::new();
    for root in &roots {
        if !root.exists() {
            anyhow::bail!("Path not found: {}", root.display());
        }

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !config.is_source_file(path) {
                continue;
            }

            let tag = source_tag(config, path);
            if config.is_skipped(&tag) {
                tracing::debug!(tag = %tag, "skipping source");
                continue;
            }

            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read SQL file {}", path.display()))?;
            sources.push(Source::new(tag, text).with_path(path));
        }
    }

    sources.sort_by(|a, b| a.tag.cmp(&b.tag));
    sources.dedup_by(|a, b| a.tag == b.tag);
    tracing::info!(sources = sources.len(), "collected sources");
    Ok(sources)
}

/// Project-relative path with forward slashes
fn source_tag(config: &Config, path: &Path) -> String {
    let relative = path.strip_prefix(&config.project_root).unwrap_or(path);
    let relative = relative.strip_prefix(".").unwrap_or(relative);
    relative.to_string_lossy().replace('\\', "/")
}

fn compile(config: &Config, paths: &[PathBuf], verbose: bool) -> Result<Compilation> {
    let sources = collect_sources(config, paths)?;
    if verbose {
        eprintln!("{} {} source files", "Compiling".cyan(), sources.len());
    }
    Ok(Compiler::new(config.clone()).compile(sources))
}

/// Check command - validate every source
fn check_command(
    config: &Config,
    paths: &[PathBuf],
    output: &Path,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let compilation = compile(config, paths, verbose)?;
    let report = compilation.to_report();

    report
        .save_to_file(output)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_report(&report))
            .with_context(|| format!("Failed to write markdown report to {}", md_path.display()))?;
        if verbose {
            eprintln!("{} {}", "Markdown report saved to:".green(), md_path.display());
        }
    }

    print_report_summary(&report);

    if report.has_errors() || (config.fail_on_warnings && report.has_warnings()) {
        std::process::exit(1);
    }

    Ok(())
}

/// Describe command - compiled queries as JSON
fn describe_command(config: &Config, paths: &[PathBuf], query: Option<&str>, output: Option<&Path>) -> Result<()> {
    let compilation = compile(config, paths, false)?;

    let json = match query {
        Some(name) => {
            let compiled = compilation
                .query(name)
                .ok_or_else(|| anyhow::anyhow!("No query labelled '{}'", name))?;
            serde_json::to_string_pretty(compiled)?
        }
        None => compilation.describe_json()?,
    };

    match output {
        Some(path) => std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    for diagnostic in compilation.diagnostics.iter().filter(|d| d.severity == Severity::Error) {
        eprintln!("{} {}", "error:".red().bold(), describe_diagnostic(diagnostic));
    }
    Ok(())
}

/// Impact command - queries a change to `file` may affect
fn impact_command(config: &Config, file: &Path, verbose: bool) -> Result<()> {
    let compilation = compile(config, &[], verbose)?;
    let tag = Tag::new(source_tag(config, file));

    if !compilation.files.iter().any(|compiled| compiled.tag == tag) {
        anyhow::bail!("{} is not a source of this project", file.display());
    }
    let affected = compilation.affected_by(&tag);

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Change Impact Analysis".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Source:".bold(), tag.as_str().green());
    println!("{} {}", "Affected queries:".bold(), affected.len());
    println!();

    if affected.is_empty() {
        println!("{}", "✓ No compiled queries depend on this source".green());
    } else {
        for query in &affected {
            println!("  {} ({}:{})", query.name.yellow(), query.tag, query.line);
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Init command - write the default config
fn init_command(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path.unwrap_or(Path::new("sqlsight.toml"));
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Config::default()
        .save_to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "Wrote".green(), path.display());
    Ok(())
}

/// Name a not-found diagnostic is about: the last word of its message,
/// without any table qualifier
fn missing_name(diagnostic: &Diagnostic) -> Option<&str> {
    match diagnostic.code {
        DiagnosticCode::ColumnNotFound | DiagnosticCode::ColumnOrTableNotFound | DiagnosticCode::TableNotFound => {
            let word = diagnostic.message.rsplit(' ').next()?;
            word.rsplit('.').next()
        }
        _ => None,
    }
}

fn describe_diagnostic(diagnostic: &Diagnostic) -> String {
    let mut line = format!("{}: {}", diagnostic.code, diagnostic.message);
    if let Some(location) = &diagnostic.location {
        line.push_str(&format!(" ({})", location));
    }
    line
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "SQL Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Files checked:    {}", report.summary.files_checked);
    println!("  Queries compiled: {}", report.summary.queries_compiled);
    println!("  Total diagnostics: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }

            if let Some(suggestion) = missing_name(diag).and_then(|name| diag.suggestion(name)) {
                println!("    {} {}", "did you mean".cyan(), suggestion.bold());
            }

            if let (Some(exp), Some(act)) = (&diag.expected, &diag.actual) {
                println!("    Expected: {}", exp);
                println!("    Actual:   {}", act);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Generate markdown report
fn generate_markdown_report(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# SQL Check Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Files checked: {}\n", report.summary.files_checked));
    md.push_str(&format!("- Queries compiled: {}\n", report.summary.queries_compiled));
    md.push_str(&format!("- Total diagnostics: {}\n", report.summary.total));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push_str(&format!("- Info: {}\n", report.summary.info));
    md.push('\n');

    if report.diagnostics.is_empty() {
        md.push_str("✅ **No issues found!**\n");
        return md;
    }

    md.push_str("## Files\n\n| File | Diagnostics |\n|------|-------------|\n");
    for (file, count) in report.per_file() {
        md.push_str(&format!("| {} | {} |\n", file, count));
    }
    md.push('\n');

    md.push_str("## Diagnostics\n\n");
    for diag in &report.diagnostics {
        let severity_emoji = match diag.severity {
            Severity::Error => "❌",
            Severity::Warn => "⚠️",
            Severity::Info => "ℹ️",
        };

        md.push_str(&format!("### {} {} - {}\n\n", severity_emoji, diag.severity, diag.code));
        md.push_str(&format!("{}\n\n", diag.message));

        if let Some(loc) = &diag.location {
            md.push_str(&format!("**Location:** `{}`\n\n", loc));
        }

        if !diag.candidates.is_empty() {
            md.push_str(&format!("**Available:** {}\n\n", diag.candidates.join(", ")));
        }
    }

    md
}
