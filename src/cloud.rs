use crate::file_discovery::FileInfo;
use crate::findings::{CloudIssue, Severity, SeverityCounts};
use crate::llm::{parse_or_default, CompletionClient};
use crate::packager::{PackagedCodebase, PackagingMethod};
use crate::reporter::ReportMetadata;
use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on how much one category can pull the heuristic score down.
const CATEGORY_PENALTY_CAP: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudProvider::Aws => "AWS",
            CloudProvider::Azure => "Azure",
            CloudProvider::Gcp => "Google Cloud",
        };
        f.write_str(name)
    }
}

impl CloudProvider {
    /// Managed service that addresses issues of the given category.
    pub fn service_for(self, category: &str) -> Option<&'static str> {
        use CloudProvider::*;
        let service = match (category, self) {
            ("Storage", Aws) => "Amazon S3",
            ("Storage", Azure) => "Azure Blob Storage",
            ("Storage", Gcp) => "Cloud Storage",
            ("State", Aws) => "Amazon ElastiCache for Redis",
            ("State", Azure) => "Azure Cache for Redis",
            ("State", Gcp) => "Memorystore",
            ("Logging", Aws) => "CloudWatch Logs",
            ("Logging", Azure) => "Azure Monitor Logs",
            ("Logging", Gcp) => "Cloud Logging",
            ("Secrets", Aws) => "AWS Secrets Manager",
            ("Secrets", Azure) => "Azure Key Vault",
            ("Secrets", Gcp) => "Secret Manager",
            ("Configuration", Aws) => "AWS Systems Manager Parameter Store",
            ("Configuration", Azure) => "Azure App Configuration",
            ("Configuration", Gcp) => "Cloud Run environment configuration",
            ("Containerization", Aws) => "Amazon ECS or EKS",
            ("Containerization", Azure) => "Azure Container Apps or AKS",
            ("Containerization", Gcp) => "Cloud Run or GKE",
            ("Observability", Aws) => "Elastic Load Balancing health checks",
            ("Observability", Azure) => "Application Gateway health probes",
            ("Observability", Gcp) => "Cloud Load Balancing health checks",
            ("Scheduling", Aws) => "Amazon EventBridge Scheduler",
            ("Scheduling", Azure) => "Azure Functions timer triggers",
            ("Scheduling", Gcp) => "Cloud Scheduler",
            _ => return None,
        };
        Some(service)
    }
}

struct CloudRule {
    category: &'static str,
    severity: Severity,
    pattern: Regex,
    description: &'static str,
    recommendation: &'static str,
}

static LINE_RULES: Lazy<Vec<CloudRule>> = Lazy::new(|| {
    let rule = |category: &'static str,
                severity: Severity,
                pattern: &str,
                description: &'static str,
                recommendation: &'static str| CloudRule {
        category,
        severity,
        pattern: Regex::new(pattern).expect("cloud rule pattern is valid"),
        description,
        recommendation,
    };
    vec![
        rule(
            "Configuration",
            Severity::Medium,
            r#"(?i)((https?|jdbc:\w+|mongodb|redis|amqp)://(localhost|127\.0\.0\.1|\d{1,3}(\.\d{1,3}){3})|["']\d{1,3}(\.\d{1,3}){3}(:\d+)?["']|\blocalhost:\d{2,5}\b)"#,
            "Hardcoded host or IP address",
            "Read endpoints from environment variables or a configuration service.",
        ),
        rule(
            "Secrets",
            Severity::High,
            r#"(?i)(password|passwd|secret|api[_-]?key|access[_-]?key)\w*["']?\s*[:=]\s*["'][^"'\s]{4,}["']"#,
            "Credential stored in code or configuration",
            "Move credentials to a managed secret store and inject them at runtime.",
        ),
        rule(
            "Storage",
            Severity::Medium,
            r#"(new\s+FileOutputStream\s*\(|new\s+FileWriter\s*\(|open\s*\([^)]*,\s*['"][wa]b?['"]|fs\.writeFileSync\s*\(|File\.WriteAllText\s*\(|ioutil\.WriteFile\s*\(|os\.WriteFile\s*\()"#,
            "Writes to the local filesystem, which is ephemeral on most cloud runtimes",
            "Persist files in object storage instead of local disk.",
        ),
        rule(
            "State",
            Severity::Medium,
            r#"(\bHttpSession\b|request\.getSession\s*\(|\bsession\[['"]|express-session|static\s+(final\s+)?(Map|HashMap|ConcurrentHashMap|List)<)"#,
            "In-process session or cache state prevents horizontal scaling",
            "Keep instances stateless and move shared state to a managed cache.",
        ),
        rule(
            "Logging",
            Severity::Low,
            r#"(?i)(FileHandler\s*\(|RollingFileAppender|\bFileAppender\b|logging\.FileHandler|filename\s*=\s*['"][^'"]+\.log['"])"#,
            "Logs written to local files",
            "Log to stdout/stderr and ship logs to the platform's log service.",
        ),
        rule(
            "Scheduling",
            Severity::Low,
            r"(@Scheduled\b|new\s+Timer\s*\(|ScheduledExecutorService|setInterval\s*\()",
            "In-process scheduled job runs once per replica",
            "Trigger scheduled work from a managed scheduler.",
        ),
    ]
});

static HEALTH_ENDPOINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(/healthz?\b|/actuator/health|/readyz?\b|/livez?\b|liveness|readiness)")
        .expect("static regex is valid")
});

static ENV_CONFIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(System\.getenv|os\.environ|os\.getenv|process\.env|Environment\.GetEnvironmentVariable|os\.Getenv|std::env::var|\$\{[A-Z_]+\})")
        .expect("static regex is valid")
});

static COMMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(//|#|\*|/\*|<!--)").expect("static regex is valid"));

/// Per-line cloud anti-pattern checks for one file.
pub fn check_file(path: &str, content: &str) -> Vec<CloudIssue> {
    let mut issues = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if COMMENT_LINE.is_match(line) {
            continue;
        }
        for rule in LINE_RULES.iter() {
            if rule.pattern.is_match(line) {
                issues.push(CloudIssue {
                    category: rule.category.to_string(),
                    severity: rule.severity,
                    description: rule.description.to_string(),
                    recommendation: rule.recommendation.to_string(),
                    file: Some(path.to_string()),
                    line_number: Some(idx + 1),
                });
            }
        }
    }
    issues
}

/// Checks that need the whole project: container build, health endpoint,
/// environment-driven configuration.
pub fn check_project(sources: &[(String, String)]) -> Vec<CloudIssue> {
    let mut issues = Vec::new();

    let has_container = sources.iter().any(|(path, _)| {
        let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
        name == "dockerfile" || name == "containerfile" || name.starts_with("dockerfile.")
    });
    if !has_container {
        issues.push(CloudIssue {
            category: "Containerization".to_string(),
            severity: Severity::High,
            description: "No Dockerfile or Containerfile found".to_string(),
            recommendation: "Add a container build so the application can run on managed container platforms.".to_string(),
            file: None,
            line_number: None,
        });
    }

    if !sources.iter().any(|(_, content)| HEALTH_ENDPOINT.is_match(content)) {
        issues.push(CloudIssue {
            category: "Observability".to_string(),
            severity: Severity::Medium,
            description: "No health or readiness endpoint detected".to_string(),
            recommendation: "Expose a lightweight health endpoint for load balancer and orchestrator probes.".to_string(),
            file: None,
            line_number: None,
        });
    }

    if !sources.iter().any(|(_, content)| ENV_CONFIG.is_match(content)) {
        issues.push(CloudIssue {
            category: "Configuration".to_string(),
            severity: Severity::Medium,
            description: "Configuration is never read from the environment".to_string(),
            recommendation: "Follow twelve-factor configuration: read settings from environment variables.".to_string(),
            file: None,
            line_number: None,
        });
    }

    issues
}

fn penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 2.0,
        Severity::High => 1.0,
        Severity::Medium => 0.5,
        Severity::Low => 0.2,
    }
}

/// 10 minus severity penalties, each category capped, clamped to 0..=10.
pub fn heuristic_score(issues: &[CloudIssue]) -> f64 {
    let mut per_category: BTreeMap<&str, f64> = BTreeMap::new();
    for issue in issues {
        *per_category.entry(issue.category.as_str()).or_insert(0.0) += penalty(issue.severity);
    }
    let total: f64 = per_category
        .values()
        .map(|p| p.min(CATEGORY_PENALTY_CAP))
        .sum();
    round1((10.0 - total).clamp(0.0, 10.0))
}

pub fn rating(score: f64) -> &'static str {
    if score >= 8.0 {
        "Cloud Ready"
    } else if score >= 6.0 {
        "Mostly Ready"
    } else if score >= 4.0 {
        "Needs Work"
    } else {
        "Not Ready"
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmCloudAssessment {
    #[serde(default)]
    pub readiness_score: Option<f64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<LlmCloudIssue>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmCloudIssue {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: String,
}

impl From<LlmCloudIssue> for CloudIssue {
    fn from(issue: LlmCloudIssue) -> Self {
        CloudIssue {
            category: if issue.category.trim().is_empty() {
                "General".to_string()
            } else {
                issue.category
            },
            severity: Severity::parse_lenient(&issue.severity),
            description: issue.description,
            recommendation: issue.recommendation,
            file: None,
            line_number: None,
        }
    }
}

pub fn default_llm_assessment() -> LlmCloudAssessment {
    LlmCloudAssessment {
        readiness_score: None,
        summary: "Readiness assessed from static checks only; no model assessment was available.".to_string(),
        issues: Vec::new(),
        recommendations: Vec::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudReadinessReport {
    pub metadata: ReportMetadata,
    pub provider: CloudProvider,
    pub readiness_score: f64,
    pub heuristic_score: f64,
    pub llm_score: Option<f64>,
    pub rating: String,
    pub summary: String,
    pub issues: Vec<CloudIssue>,
    pub severity_counts: SeverityCounts,
    pub category_breakdown: BTreeMap<String, usize>,
    pub recommendations: Vec<String>,
    pub llm_used: bool,
    pub packaging: Option<PackagingMethod>,
}

const SYSTEM_PROMPT: &str = "You are a cloud architect assessing whether an application can be deployed to a public cloud. Respond with strict JSON only: {\"readiness_score\": 0-10, \"summary\": \"...\", \"issues\": [{\"category\": \"...\", \"severity\": \"Critical|High|Medium|Low\", \"description\": \"...\", \"recommendation\": \"...\"}], \"recommendations\": [\"...\"]}";

pub struct CloudAssessor {
    client: Option<Arc<dyn CompletionClient>>,
}

impl CloudAssessor {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    pub async fn assess(
        &self,
        metadata: ReportMetadata,
        files: &[FileInfo],
        provider: CloudProvider,
        packaged: Option<&PackagedCodebase>,
    ) -> CloudReadinessReport {
        let mut sources = Vec::new();
        let mut issues = Vec::new();
        for file in files {
            match std::fs::read_to_string(&file.path) {
                Ok(content) => {
                    issues.extend(check_file(&file.relative_path, &content));
                    sources.push((file.relative_path.clone(), content));
                }
                Err(e) => warn!("skipping {}: {}", file.relative_path, e),
            }
        }
        issues.extend(check_project(&sources));

        let heuristic = heuristic_score(&issues);
        println!(
            "  {} {} heuristic issues, static score {:.1}/10",
            "▸".cyan(),
            issues.len(),
            heuristic
        );

        let answer = match (&self.client, packaged) {
            (Some(client), Some(packaged)) => {
                let prompt = build_prompt(provider, &issues, heuristic, packaged);
                match client.complete(SYSTEM_PROMPT, &prompt).await {
                    Ok(answer) => Some(answer),
                    Err(e) => {
                        warn!("LLM cloud assessment failed: {:#}", e);
                        None
                    }
                }
            }
            _ => None,
        };
        let (assessment, llm_used): (LlmCloudAssessment, bool) =
            parse_or_default(answer.as_deref().unwrap_or_default(), default_llm_assessment);
        if answer.is_some() && !llm_used {
            debug!("LLM cloud assessment was not usable JSON");
        }

        let llm_score = assessment
            .readiness_score
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 10.0));
        let readiness_score = match llm_score {
            Some(llm) => round1((heuristic + llm) / 2.0),
            None => heuristic,
        };

        issues.extend(assessment.issues.into_iter().map(CloudIssue::from));

        let mut category_breakdown = BTreeMap::new();
        for issue in &issues {
            *category_breakdown.entry(issue.category.clone()).or_insert(0) += 1;
        }

        let mut recommendations: Vec<String> = Vec::new();
        for category in category_breakdown.keys() {
            if let Some(service) = provider.service_for(category) {
                recommendations.push(format!("{}: use {} on {}", category, service, provider));
            }
        }
        recommendations.extend(assessment.recommendations);

        let summary = if assessment.summary.trim().is_empty() {
            default_llm_assessment().summary
        } else {
            assessment.summary
        };

        CloudReadinessReport {
            metadata,
            provider,
            readiness_score,
            heuristic_score: heuristic,
            llm_score,
            rating: rating(readiness_score).to_string(),
            summary,
            severity_counts: SeverityCounts::tally(issues.iter().map(|i| i.severity)),
            issues,
            category_breakdown,
            recommendations,
            llm_used,
            packaging: packaged.map(|p| p.method),
        }
    }
}

fn build_prompt(
    provider: CloudProvider,
    issues: &[CloudIssue],
    heuristic: f64,
    packaged: &PackagedCodebase,
) -> String {
    let mut prompt = format!(
        "Target provider: {}\nStatic readiness score: {:.1}/10\n\nStatic findings:\n",
        provider, heuristic
    );
    if issues.is_empty() {
        prompt.push_str("- none\n");
    }
    for issue in issues.iter().take(50) {
        let location = match (&issue.file, issue.line_number) {
            (Some(file), Some(line)) => format!(" ({}:{})", file, line),
            (Some(file), None) => format!(" ({})", file),
            _ => String::new(),
        };
        prompt.push_str(&format!(
            "- [{}] {}: {}{}\n",
            issue.severity, issue.category, issue.description, location
        ));
    }
    prompt.push_str("\nCodebase:\n");
    prompt.push_str(&packaged.content);
    if packaged.truncated {
        prompt.push_str("\n[... codebase truncated ...]\n");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;

    fn sources(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn line_rules_find_cloud_antipatterns() {
        let src = r#"String url = "jdbc:mysql://localhost:3306/shop";
String dbPassword = "s3cr3t!!";
FileOutputStream out = new FileOutputStream("/var/data/report.csv");
HttpSession session = request.getSession(true);
// new FileWriter("ignored")
@Scheduled(fixedRate = 5000)
"#;
        let issues = check_file("App.java", src);
        let categories: Vec<(&str, Option<usize>)> = issues
            .iter()
            .map(|i| (i.category.as_str(), i.line_number))
            .collect();
        assert_eq!(
            categories,
            vec![
                ("Configuration", Some(1)),
                ("Secrets", Some(2)),
                ("Storage", Some(3)),
                ("State", Some(4)),
                ("Scheduling", Some(6)),
            ]
        );
    }

    #[test]
    fn bare_hosts_and_ips_are_flagged() {
        let src = "host = \"10.0.0.5\"\nserver: localhost:8080\nbind = \"0.0.0.0:9000\"\nname = \"billing\"\n";
        let lines: Vec<Option<usize>> = check_file("application.yml", src)
            .iter()
            .filter(|i| i.category == "Configuration")
            .map(|i| i.line_number)
            .collect();
        assert_eq!(lines, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn project_checks_flag_missing_container_health_and_env() {
        let bare = check_project(&sources(&[("src/App.java", "class App {}")]));
        let categories: Vec<&str> = bare.iter().map(|i| i.category.as_str()).collect();
        assert_eq!(categories, vec!["Containerization", "Observability", "Configuration"]);

        let ready = check_project(&sources(&[
            ("Dockerfile", "FROM eclipse-temurin:17"),
            ("src/Health.java", "@GetMapping(\"/healthz\")\nString url = System.getenv(\"DB_URL\");"),
        ]));
        assert!(ready.is_empty());
    }

    #[test]
    fn score_penalties_are_capped_per_category() {
        let issue = |category: &str, severity| CloudIssue {
            category: category.to_string(),
            severity,
            description: String::new(),
            recommendation: String::new(),
            file: None,
            line_number: None,
        };
        assert_eq!(heuristic_score(&[]), 10.0);
        let two = [issue("Secrets", Severity::High), issue("Logging", Severity::Low)];
        assert_eq!(heuristic_score(&two), 8.8);

        let many: Vec<CloudIssue> = (0..20).map(|_| issue("Storage", Severity::Medium)).collect();
        assert_eq!(heuristic_score(&many), 7.5);

        let categories = ["A", "B", "C", "D", "E"];
        let worst: Vec<CloudIssue> = categories
            .iter()
            .chain(categories.iter())
            .map(|c| issue(*c, Severity::Critical))
            .collect();
        assert_eq!(heuristic_score(&worst), 0.0);
    }

    #[test]
    fn rating_thresholds() {
        assert_eq!(rating(9.0), "Cloud Ready");
        assert_eq!(rating(6.0), "Mostly Ready");
        assert_eq!(rating(5.9), "Needs Work");
        assert_eq!(rating(0.0), "Not Ready");
    }

    #[test]
    fn provider_services_differ() {
        assert_eq!(CloudProvider::Aws.service_for("Storage"), Some("Amazon S3"));
        assert_eq!(CloudProvider::Gcp.service_for("Secrets"), Some("Secret Manager"));
        assert_eq!(CloudProvider::Azure.service_for("Unknown"), None);
    }

    fn write(dir: &std::path::Path, rel: &str, content: &str) -> FileInfo {
        let path = dir.join(rel);
        std::fs::write(&path, content).unwrap();
        FileInfo {
            path,
            relative_path: rel.to_string(),
            size: content.len() as u64,
            extension: None,
            language: None,
        }
    }

    fn packaged() -> PackagedCodebase {
        PackagedCodebase {
            content: "File: app.py".into(),
            method: PackagingMethod::External,
            truncated: false,
        }
    }

    #[tokio::test]
    async fn averages_llm_score_with_heuristics() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "Dockerfile", "FROM python:3.12"),
            write(dir.path(), "app.py", "import os\nDB = os.environ['DB']\n@app.route('/health')\n"),
        ];
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            "{\"readiness_score\": 7.0, \"summary\": \"Mostly fine\", \"issues\": [{\"category\": \"Networking\", \"severity\": \"low\", \"description\": \"no TLS\", \"recommendation\": \"terminate TLS at the edge\"}], \"recommendations\": [\"Use managed Postgres\"]}",
        )]));

        let report = CloudAssessor::new(Some(client))
            .assess(
                ReportMetadata::fixed("cloud", "/tmp/app"),
                &files,
                CloudProvider::Aws,
                Some(&packaged()),
            )
            .await;

        assert!(report.llm_used);
        assert_eq!(report.heuristic_score, 10.0);
        assert_eq!(report.llm_score, Some(7.0));
        assert_eq!(report.readiness_score, 8.5);
        assert_eq!(report.rating, "Cloud Ready");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.category_breakdown.get("Networking"), Some(&1));
        assert_eq!(report.recommendations, vec!["Use managed Postgres"]);
    }

    #[tokio::test]
    async fn llm_failure_keeps_heuristic_score() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write(dir.path(), "app.js", "fs.writeFileSync('/tmp/x', data);\n")];
        let client = Arc::new(ScriptedClient::new(vec![Err("connection refused")]));

        let report = CloudAssessor::new(Some(client))
            .assess(
                ReportMetadata::fixed("cloud", "/tmp/app"),
                &files,
                CloudProvider::Gcp,
                Some(&packaged()),
            )
            .await;

        assert!(!report.llm_used);
        assert_eq!(report.llm_score, None);
        // storage 0.5, containerization 1.0, observability 0.5, configuration 0.5
        assert_eq!(report.heuristic_score, 7.5);
        assert_eq!(report.readiness_score, 7.5);
        assert_eq!(report.summary, default_llm_assessment().summary);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r == "Storage: use Cloud Storage on Google Cloud"));
    }
}
