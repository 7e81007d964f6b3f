use clap::{Parser, Subcommand};
use codewarden::{
    analyzer::{Analyzer, RunOptions},
    cloud::CloudProvider,
    config::Config,
    reporter::{self, SavedReport},
};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codewarden")]
#[command(about = "Security, migration and cloud readiness audits for legacy codebases")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path (defaults to ~/.codewarden.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log LLM requests and responses
    #[arg(long, global = true)]
    debug_llm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project for security vulnerabilities
    Scan {
        /// Project directory to scan
        path: PathBuf,

        /// Output directory for reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the dependency vulnerability scan
        #[arg(long)]
        skip_deps: bool,

        /// Heuristics only, no LLM calls
        #[arg(long)]
        skip_llm: bool,
    },
    /// Plan a migration away from legacy frameworks
    Migrate {
        /// Project directory to analyze
        path: PathBuf,

        /// Framework to migrate to
        #[arg(short, long, default_value = "Spring Boot")]
        target: String,

        /// Output directory for reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Heuristics only, no LLM calls
        #[arg(long)]
        skip_llm: bool,
    },
    /// Assess how ready a project is to run in the cloud
    Cloud {
        /// Project directory to assess
        path: PathBuf,

        /// Target cloud provider
        #[arg(short, long, value_enum, default_value = "aws")]
        provider: CloudProvider,

        /// Output directory for reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Heuristics only, no LLM calls
        #[arg(long)]
        skip_llm: bool,
    },
    /// Generate a documented configuration file
    Config {
        /// Output path for the config file (defaults to ~/.codewarden.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Scan { path, output, skip_deps, skip_llm } => {
            let started = Instant::now();
            let config = Config::load(cli.config.as_deref())?;
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
            banner("Security Scan", &path, &output_dir);

            let analyzer = Analyzer::prepare(config, &path, options(skip_llm, cli.debug_llm))?;
            let report = analyzer.scan_vulnerabilities(skip_deps).await;

            let summary = &report.summary;
            println!("\n{}", "Summary".bold());
            println!(
                "  Files scanned: {} ({} skipped)",
                summary.files_scanned, summary.files_skipped
            );
            println!("  Findings: {}", summary.total_findings);
            for severity in codewarden::findings::Severity::ALL {
                let count = summary.severity_counts.get(severity);
                if count > 0 {
                    println!("    {}: {}", severity, count);
                }
            }
            println!("  Overall risk: {:.1}/10", summary.overall_risk_score);

            let markdown = reporter::render_security_markdown(&report);
            let saved =
                reporter::save_results(&output_dir, reporter::SECURITY_PREFIX, &report, &markdown)?;
            finish(&saved, started);
        }
        Commands::Migrate { path, target, output, skip_llm } => {
            let started = Instant::now();
            let config = Config::load(cli.config.as_deref())?;
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
            banner("Migration Planning", &path, &output_dir);

            let analyzer = Analyzer::prepare(config, &path, options(skip_llm, cli.debug_llm))?;
            let plan = analyzer.plan_migration(&target).await?;

            println!("\n{}", "Summary".bold());
            println!("  Target: {}", plan.target_framework);
            println!("  Legacy frameworks: {}", plan.detected_frameworks.len());
            println!("  Steps: {}", plan.steps.len());
            println!("  Estimated effort: {:.1} weeks", plan.estimated_weeks);

            let markdown = reporter::render_migration_markdown(&plan);
            let saved =
                reporter::save_results(&output_dir, reporter::MIGRATION_PREFIX, &plan, &markdown)?;
            finish(&saved, started);
        }
        Commands::Cloud { path, provider, output, skip_llm } => {
            let started = Instant::now();
            let config = Config::load(cli.config.as_deref())?;
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
            banner("Cloud Readiness", &path, &output_dir);

            let analyzer = Analyzer::prepare(config, &path, options(skip_llm, cli.debug_llm))?;
            let report = analyzer.assess_cloud_readiness(provider).await;

            println!("\n{}", "Summary".bold());
            println!("  Provider: {}", report.provider);
            println!(
                "  Readiness: {:.1}/10 ({})",
                report.readiness_score,
                report.rating.bold()
            );
            println!("  Issues: {}", report.issues.len());

            let markdown = reporter::render_cloud_markdown(&report);
            let saved =
                reporter::save_results(&output_dir, reporter::CLOUD_PREFIX, &report, &markdown)?;
            finish(&saved, started);
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn options(skip_llm: bool, debug_llm: bool) -> RunOptions {
    RunOptions { skip_llm, debug_llm }
}

fn banner(title: &str, target: &Path, output: &Path) {
    println!("{}", format!("🚀 Codewarden {}", title).bold());
    println!("====================================");
    println!("🎯 Target directory: {}", target.display());
    println!("📤 Output directory: {}", output.display());
}

fn finish(saved: &SavedReport, started: Instant) {
    println!("\n{} Completed in {:.2}s", "✅".green(), started.elapsed().as_secs_f64());
    println!("📁 Reports written to:");
    println!("   - {}", saved.json_path.display());
    println!("   - {}", saved.markdown_path.display());
}

fn generate_config(output_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = match output_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    println!("📝 Generating configuration file: {}", config_path.display());
    std::fs::write(&config_path, Config::create_documented_config())?;

    println!("✅ Configuration file created successfully!");
    println!("💡 Edit the file to set the LLM endpoint, scanner strategy and file filters.");
    println!("   API keys can also come from CODEWARDEN_API_KEY or OPENAI_API_KEY.");

    Ok(())
}
