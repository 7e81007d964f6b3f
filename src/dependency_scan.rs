use crate::config::{ScannerConfig, ScannerStrategy};
use crate::findings::{FindingSource, Severity, Vulnerability};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tracing::{debug, info, warn};

const REPORT_FILE: &str = "dependency-check-report.json";
const DOCKER_IMAGE: &str = "owasp/dependency-check:latest";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyScanOutcome {
    /// Strategy that produced the report, if any did.
    pub tool: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    /// One message per strategy that failed.
    pub errors: Vec<String>,
}

/// Runs OWASP Dependency-Check through whichever launcher is available.
pub struct DependencyScanner {
    config: ScannerConfig,
}

impl DependencyScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn strategies_for(&self, root: &Path) -> Vec<ScannerStrategy> {
        match self.config.strategy {
            ScannerStrategy::Auto => {
                let mut strategies = Vec::new();
                if root.join("pom.xml").is_file() {
                    strategies.push(ScannerStrategy::Maven);
                }
                strategies.push(ScannerStrategy::Cli);
                strategies.push(ScannerStrategy::Docker);
                strategies
            }
            explicit => vec![explicit],
        }
    }

    /// Never fails: every launcher error is recorded in the outcome instead.
    pub async fn scan(&self, root: &Path) -> DependencyScanOutcome {
        let mut outcome = DependencyScanOutcome::default();

        for strategy in self.strategies_for(root) {
            let label = strategy_label(strategy);
            info!("running dependency scan via {}", label);
            match self.run_strategy(strategy, root).await {
                Ok(vulnerabilities) => {
                    outcome.tool = Some(label.to_string());
                    outcome.vulnerabilities = vulnerabilities;
                    return outcome;
                }
                Err(e) => {
                    warn!("dependency scan via {} failed: {:#}", label, e);
                    outcome.errors.push(format!("{}: {:#}", label, e));
                }
            }
        }

        outcome
    }

    async fn run_strategy(
        &self,
        strategy: ScannerStrategy,
        root: &Path,
    ) -> Result<Vec<Vulnerability>> {
        let out_dir = std::env::temp_dir()
            .join(format!("codewarden-depcheck-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&out_dir)
            .await
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let result = self.run_in(strategy, root, &out_dir).await;
        if let Err(e) = tokio::fs::remove_dir_all(&out_dir).await {
            debug!("could not remove {}: {}", out_dir.display(), e);
        }
        result
    }

    async fn run_in(
        &self,
        strategy: ScannerStrategy,
        root: &Path,
        out_dir: &Path,
    ) -> Result<Vec<Vulnerability>> {
        let mut command = self.build_command(strategy, root, out_dir)?;
        command
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let launched = SystemTime::now();
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .with_context(|| format!("timed out after {:?}", timeout))?
            .context("failed to start scanner")?;

        let report_path = find_report(strategy, root, out_dir, launched);
        if !output.status.success() && !report_path.is_file() {
            bail!(
                "exited with {}: {}",
                output.status,
                last_lines(&String::from_utf8_lossy(&output.stderr), 5)
            );
        }

        let report = tokio::fs::read_to_string(&report_path)
            .await
            .with_context(|| format!("no report at {}", report_path.display()))?;
        parse_report(&report)
    }

    fn build_command(
        &self,
        strategy: ScannerStrategy,
        root: &Path,
        out_dir: &Path,
    ) -> Result<Command> {
        let project = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "project".to_string());

        let command = match strategy {
            ScannerStrategy::Maven => {
                let mut cmd = Command::new("mvn");
                cmd.current_dir(root)
                    .arg("-q")
                    .arg("-B")
                    .arg("org.owasp:dependency-check-maven:check")
                    .arg("-Dformat=JSON")
                    .arg(format!("-DoutputDirectory={}", out_dir.display()));
                if let Some(key) = &self.config.nvd_api_key {
                    cmd.arg(format!("-DnvdApiKey={}", key));
                }
                cmd
            }
            ScannerStrategy::Cli => {
                let mut cmd = Command::new("dependency-check");
                cmd.arg("--project")
                    .arg(&project)
                    .arg("--scan")
                    .arg(root)
                    .arg("--format")
                    .arg("JSON")
                    .arg("--out")
                    .arg(out_dir);
                if let Some(key) = &self.config.nvd_api_key {
                    cmd.arg("--nvdApiKey").arg(key);
                }
                cmd
            }
            ScannerStrategy::Docker => {
                let src = root
                    .canonicalize()
                    .with_context(|| format!("cannot resolve {}", root.display()))?;
                let mut cmd = Command::new("docker");
                cmd.arg("run")
                    .arg("--rm")
                    .arg("-v")
                    .arg(format!("{}:/src:ro", src.display()))
                    .arg("-v")
                    .arg(format!("{}:/report", out_dir.display()))
                    .arg(DOCKER_IMAGE)
                    .arg("--project")
                    .arg(&project)
                    .arg("--scan")
                    .arg("/src")
                    .arg("--format")
                    .arg("JSON")
                    .arg("--out")
                    .arg("/report");
                if let Some(key) = &self.config.nvd_api_key {
                    cmd.arg("--nvdApiKey").arg(key);
                }
                cmd
            }
            ScannerStrategy::Auto => bail!("auto is resolved before launching"),
        };
        Ok(command)
    }
}

fn strategy_label(strategy: ScannerStrategy) -> &'static str {
    match strategy {
        ScannerStrategy::Auto => "auto",
        ScannerStrategy::Maven => "maven-plugin",
        ScannerStrategy::Cli => "dependency-check-cli",
        ScannerStrategy::Docker => "docker",
    }
}

/// The Maven plugin ignores `outputDirectory` on some versions and writes to `target/`.
/// A `target/` report older than `launched` belongs to an earlier run and is ignored.
fn find_report(
    strategy: ScannerStrategy,
    root: &Path,
    out_dir: &Path,
    launched: SystemTime,
) -> PathBuf {
    let primary = out_dir.join(REPORT_FILE);
    if strategy == ScannerStrategy::Maven && !primary.is_file() {
        let fallback = root.join("target").join(REPORT_FILE);
        let fresh = std::fs::metadata(&fallback)
            .and_then(|m| m.modified())
            .map(|modified| modified >= launched)
            .unwrap_or(false);
        if fresh {
            return fallback;
        }
    }
    primary
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(count)..].join(" | ")
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    dependencies: Vec<ReportDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDependency {
    file_name: String,
    #[serde(default)]
    vulnerabilities: Vec<ReportVulnerability>,
}

#[derive(Debug, Deserialize)]
struct ReportVulnerability {
    name: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    cvssv2: Option<CvssV2>,
    #[serde(default)]
    cvssv3: Option<CvssV3>,
}

#[derive(Debug, Deserialize)]
struct CvssV2 {
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssV3 {
    base_score: f64,
}

/// Convert a Dependency-Check JSON report into findings.
pub fn parse_report(json: &str) -> Result<Vec<Vulnerability>> {
    let report: Report = serde_json::from_str(json).context("invalid dependency-check report")?;
    let mut findings = Vec::new();

    for dependency in report.dependencies {
        for vuln in dependency.vulnerabilities {
            let score = vuln
                .cvssv3
                .as_ref()
                .map(|v| v.base_score)
                .or_else(|| vuln.cvssv2.as_ref().map(|v| v.score));
            let severity = match (score, vuln.severity.as_deref()) {
                (Some(score), _) => Severity::from_score(score),
                (None, Some(label)) => Severity::parse_lenient(label),
                (None, None) => Severity::Medium,
            };
            let cve = vuln.name.starts_with("CVE-").then(|| vuln.name.clone());

            findings.push(Vulnerability {
                vuln_type: "Vulnerable Dependency".to_string(),
                severity,
                line_number: None,
                description: vuln
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| format!("{} affects {}", vuln.name, dependency.file_name)),
                recommendation: Some(format!(
                    "Upgrade {} to a release that fixes {}",
                    dependency.file_name, vuln.name
                )),
                file: dependency.file_name.clone(),
                source: FindingSource::DependencyScanner,
                cve,
                score,
            });
        }
    }

    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "reportSchema": "1.1",
        "dependencies": [
            {
                "fileName": "commons-lang3-3.12.0.jar",
                "filePath": "/src/lib/commons-lang3-3.12.0.jar"
            },
            {
                "fileName": "log4j-core-2.14.1.jar",
                "vulnerabilities": [
                    {
                        "source": "NVD",
                        "name": "CVE-2021-44228",
                        "severity": "CRITICAL",
                        "cvssv2": {"score": 9.3},
                        "cvssv3": {"baseScore": 10.0, "baseSeverity": "CRITICAL"},
                        "description": "JNDI lookup allows remote code execution."
                    },
                    {
                        "source": "OSSINDEX",
                        "name": "sonatype-2021-0001",
                        "severity": "moderate"
                    },
                    {
                        "name": "CVE-2021-45105",
                        "cvssv2": {"score": 5.0},
                        "description": "  "
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_dependency_check_report() {
        let findings = parse_report(REPORT).unwrap();
        assert_eq!(findings.len(), 3);

        let log4shell = &findings[0];
        assert_eq!(log4shell.severity, Severity::Critical);
        assert_eq!(log4shell.cve.as_deref(), Some("CVE-2021-44228"));
        assert_eq!(log4shell.score, Some(10.0));
        assert_eq!(log4shell.file, "log4j-core-2.14.1.jar");
        assert_eq!(log4shell.source, FindingSource::DependencyScanner);
        assert!(log4shell.line_number.is_none());

        let v2_only = findings.iter().find(|f| f.cve.as_deref() == Some("CVE-2021-45105")).unwrap();
        assert_eq!(v2_only.severity, Severity::Medium);
        assert!(v2_only.description.contains("CVE-2021-45105"));

        let textual = findings.iter().find(|f| f.cve.is_none()).unwrap();
        assert_eq!(textual.severity, Severity::Medium);
        assert!(textual.score.is_none());
    }

    #[test]
    fn rejects_garbage_reports() {
        assert!(parse_report("not json").is_err());
        assert!(parse_report("{}").unwrap().is_empty());
    }

    #[test]
    fn auto_prefers_maven_only_with_pom() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = DependencyScanner::new(ScannerConfig::default());
        assert_eq!(
            scanner.strategies_for(dir.path()),
            vec![ScannerStrategy::Cli, ScannerStrategy::Docker]
        );

        std::fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        assert_eq!(
            scanner.strategies_for(dir.path()),
            vec![ScannerStrategy::Maven, ScannerStrategy::Cli, ScannerStrategy::Docker]
        );

        let pinned = DependencyScanner::new(ScannerConfig {
            strategy: ScannerStrategy::Docker,
            ..ScannerConfig::default()
        });
        assert_eq!(pinned.strategies_for(dir.path()), vec![ScannerStrategy::Docker]);
    }

    #[test]
    fn maven_fallback_ignores_reports_from_earlier_runs() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("target")).unwrap();
        let stale = root.path().join("target").join(REPORT_FILE);
        std::fs::write(&stale, "{}").unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        assert_eq!(
            find_report(ScannerStrategy::Maven, root.path(), out.path(), later),
            out.path().join(REPORT_FILE)
        );
        assert_eq!(
            find_report(ScannerStrategy::Maven, root.path(), out.path(), SystemTime::UNIX_EPOCH),
            stale
        );
        assert_eq!(
            find_report(ScannerStrategy::Cli, root.path(), out.path(), SystemTime::UNIX_EPOCH),
            out.path().join(REPORT_FILE)
        );
    }

    #[tokio::test]
    async fn failed_launcher_yields_empty_outcome_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = DependencyScanner::new(ScannerConfig {
            strategy: ScannerStrategy::Cli,
            timeout_seconds: 30,
            ..ScannerConfig::default()
        });

        let outcome = scanner.scan(dir.path()).await;

        assert!(outcome.tool.is_none());
        assert!(outcome.vulnerabilities.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("dependency-check-cli:"));
    }
}
