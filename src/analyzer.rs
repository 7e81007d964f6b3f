use crate::{
    cloud::{CloudAssessor, CloudProvider, CloudReadinessReport},
    config::Config,
    dependency_scan::DependencyScanner,
    error::AuditError,
    file_discovery::{FileDiscovery, FileInfo},
    llm::{CompletionClient, OpenAiClient},
    migration::{MigrationAnalyzer, MigrationPlan},
    packager::{PackagedCodebase, Packager},
    reporter::ReportMetadata,
    security::{summarize, SecurityReport, SecurityScanner},
};
use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub skip_llm: bool,
    pub debug_llm: bool,
}

/// Shared setup for every command: validated target, discovered files and
/// an optional LLM client.
pub struct Analyzer {
    config: Config,
    root: PathBuf,
    files: Vec<FileInfo>,
    client: Option<Arc<dyn CompletionClient>>,
}

impl Analyzer {
    pub fn prepare(config: Config, path: &Path, options: RunOptions) -> Result<Self> {
        validate_target(path)?;

        let client: Option<Arc<dyn CompletionClient>> = if options.skip_llm {
            println!("⚡ Skipping LLM analysis (heuristics only)");
            None
        } else {
            if config.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(AuditError::MissingApiKey.into());
            }
            Some(Arc::new(OpenAiClient::new(&config.llm, options.debug_llm)?))
        };

        Self::with_client(config, path, client)
    }

    pub fn with_client(
        config: Config,
        path: &Path,
        client: Option<Arc<dyn CompletionClient>>,
    ) -> Result<Self> {
        validate_target(path)?;

        println!("🔍 Discovering files...");
        let discovery = FileDiscovery::new(path, &config);
        let files = discovery.discover_files()?;
        discovery.get_stats(&files).print_summary();

        if let Some(client) = &client {
            info!("using {}", client.describe());
        }

        Ok(Self {
            config,
            root: path.to_path_buf(),
            files,
            client,
        })
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    pub fn llm_enabled(&self) -> bool {
        self.client.is_some()
    }

    fn metadata(&self, command: &str) -> ReportMetadata {
        ReportMetadata::new(command, &self.root, self.client.as_ref().map(|c| c.describe()))
    }

    async fn package(&self) -> Option<PackagedCodebase> {
        self.client.as_ref()?;
        println!("\n📦 Packaging codebase for the model...");
        let packaged = Packager::new(self.config.packager.clone())
            .package(&self.root, &self.files)
            .await;
        if packaged.truncated {
            println!("  {} codebase truncated to fit the context budget", "!".yellow());
        }
        Some(packaged)
    }

    pub async fn scan_vulnerabilities(&self, skip_deps: bool) -> SecurityReport {
        let metadata = self.metadata("scan");

        println!("\n🛡️  Scanning {} files...", self.files.len());
        let scanner = SecurityScanner::new(self.client.clone(), self.config.llm.max_file_chars);
        let (files, skipped) = scanner.scan(&self.files).await;

        let dependency_scan = if skip_deps || !self.config.scanner.enabled {
            println!("\n⚡ Skipping dependency scan");
            None
        } else {
            println!("\n📚 Scanning dependencies...");
            let outcome = DependencyScanner::new(self.config.scanner.clone())
                .scan(&self.root)
                .await;
            match &outcome.tool {
                Some(tool) => println!(
                    "  {} {} reported {} vulnerable dependencies",
                    "▸".cyan(),
                    tool,
                    outcome.vulnerabilities.len()
                ),
                None => println!("  {} no dependency scanner could run", "!".yellow()),
            }
            Some(outcome)
        };

        let summary = summarize(&files, skipped, dependency_scan.as_ref());
        SecurityReport {
            metadata,
            summary,
            files,
            dependency_scan,
        }
    }

    pub async fn plan_migration(&self, target: &str) -> Result<MigrationPlan> {
        let metadata = self.metadata("migrate");
        let packaged = self.package().await;

        println!("\n🧭 Planning migration to {}...", target);
        let analyzer = MigrationAnalyzer::new(self.client.clone())?;
        Ok(analyzer
            .analyze(metadata, &self.files, target, packaged.as_ref())
            .await)
    }

    pub async fn assess_cloud_readiness(&self, provider: CloudProvider) -> CloudReadinessReport {
        let metadata = self.metadata("cloud");
        let packaged = self.package().await;

        println!("\n☁️  Assessing readiness for {}...", provider);
        CloudAssessor::new(self.client.clone())
            .assess(metadata, &self.files, provider, packaged.as_ref())
            .await
    }
}

fn validate_target(path: &Path) -> Result<(), AuditError> {
    if !path.exists() {
        return Err(AuditError::PathNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(AuditError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}
