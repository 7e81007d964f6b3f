use crate::dependency_scan::DependencyScanOutcome;
use crate::file_discovery::FileInfo;
use crate::findings::{FindingSource, Severity, SeverityCounts, Vulnerability};
use crate::llm::{parse_json_response, truncate_chars, CompletionClient};
use crate::reporter::ReportMetadata;
use anyhow::{Context, Result};
use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Languages worth a per-file LLM review. Heuristics run on every file.
const REVIEWED_LANGUAGES: &[&str] = &[
    "java", "kotlin", "scala", "groovy", "python", "javascript", "typescript", "go", "rust",
    "csharp", "php", "ruby", "c", "cpp", "jsp", "bash", "sql",
];

struct HeuristicRule {
    vuln_type: &'static str,
    pattern: Regex,
    score: f64,
    description: &'static str,
    recommendation: &'static str,
}

impl HeuristicRule {
    fn new(
        vuln_type: &'static str,
        pattern: &str,
        score: f64,
        description: &'static str,
        recommendation: &'static str,
    ) -> Self {
        Self {
            vuln_type,
            pattern: Regex::new(pattern).expect("heuristic pattern is valid"),
            score,
            description,
            recommendation,
        }
    }
}

static RULES: Lazy<Vec<HeuristicRule>> = Lazy::new(|| {
    vec![
        HeuristicRule::new(
            "SQL Injection",
            r#"(?i)(["']\s*(select\s.+\sfrom|insert\s+into|update\s+\w+\s+set|delete\s+from)\b[^"']*["']\s*(\+|%|\.format\()|(execute|query|raw)\s*\(\s*f["'].*(select|insert|update|delete)\b)"#,
            8.0,
            "SQL statement assembled from string concatenation or formatting",
            "Use parameterized queries or prepared statements",
        ),
        HeuristicRule::new(
            "Command Injection",
            r"(Runtime\.getRuntime\(\)\.exec\s*\(|os\.system\s*\(|subprocess\.\w+\(.*shell\s*=\s*True|child_process\.exec\s*\(|\bexecSync\s*\(|shell_exec\s*\()",
            9.0,
            "Operating system command executed through a shell",
            "Avoid shell invocation; pass arguments as a list and validate all input",
        ),
        HeuristicRule::new(
            "Code Injection",
            r"(^|[^\w.])eval\s*\(",
            8.5,
            "Dynamic code evaluation",
            "Remove eval and parse the input explicitly",
        ),
        HeuristicRule::new(
            "Hardcoded Secret",
            r#"(?i)(password|passwd|pwd|secret|api[_-]?key|access[_-]?token|private[_-]?key)\w*["']?\s*[:=]\s*["'][^"'\s]{4,}["']"#,
            7.5,
            "Credential embedded in source code",
            "Load secrets from environment variables or a secret manager",
        ),
        HeuristicRule::new(
            "Weak Cryptography",
            r#"(?i)(MessageDigest\.getInstance\(\s*"(MD5|SHA-?1)"|hashlib\.(md5|sha1)\s*\(|Cipher\.getInstance\(\s*"(DES|RC4|AES/ECB)|createHash\(\s*['"](md5|sha1)['"])"#,
            5.0,
            "Broken or weak cryptographic algorithm",
            "Use SHA-256 or stronger hashes and authenticated encryption such as AES-GCM",
        ),
        HeuristicRule::new(
            "Insecure Deserialization",
            r"(new\s+ObjectInputStream\s*\(|pickle\.loads?\s*\(|\bXMLDecoder\b|\bBinaryFormatter\b|\bunserialize\s*\(|yaml\.load\s*\([^)]*\)\s*$)",
            8.0,
            "Deserialization of potentially untrusted data",
            "Deserialize only trusted data or use a safe format with schema validation",
        ),
        HeuristicRule::new(
            "Cross-Site Scripting",
            r"(\.innerHTML\s*=|document\.write\s*\(|dangerouslySetInnerHTML|<%=\s*request\.getParameter)",
            6.0,
            "Unescaped data written into HTML",
            "Encode output for its HTML context or use a templating engine with auto-escaping",
        ),
        HeuristicRule::new(
            "Path Traversal",
            r"(new\s+File(InputStream|Reader)?\s*\([^)]*request\.getParameter|open\s*\([^)]*request\.(args|form|GET|POST)|sendFile\s*\([^)]*req\.(params|query|body))",
            6.5,
            "File path built from request input",
            "Canonicalize the path and check it stays inside an allowed base directory",
        ),
        HeuristicRule::new(
            "TLS Verification Disabled",
            r"(?i)(verify\s*=\s*False|rejectUnauthorized\s*:\s*false|InsecureSkipVerify\s*:\s*true|TrustAllCerts|NoopHostnameVerifier|ALLOW_ALL_HOSTNAME_VERIFIER)",
            7.0,
            "Certificate or hostname verification is turned off",
            "Keep TLS verification enabled and trust a proper CA bundle",
        ),
        HeuristicRule::new(
            "Insecure Randomness",
            r"(new\s+Random\s*\(|Math\.random\s*\(|random\.random\s*\()",
            3.0,
            "Non-cryptographic random number generator",
            "Use SecureRandom, the secrets module or crypto.getRandomValues for security tokens",
        ),
    ]
});

static COMMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(//|#|\*|/\*|<!--|--)").expect("static regex is valid"));

/// Run the regex rules over one file.
pub fn check_file_heuristics(path: &str, content: &str) -> Vec<Vulnerability> {
    let mut findings = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if COMMENT_LINE.is_match(line) {
            continue;
        }
        for rule in RULES.iter() {
            if rule.pattern.is_match(line) {
                findings.push(Vulnerability {
                    vuln_type: rule.vuln_type.to_string(),
                    severity: Severity::from_score(rule.score),
                    line_number: Some(idx + 1),
                    description: rule.description.to_string(),
                    recommendation: Some(rule.recommendation.to_string()),
                    file: path.to_string(),
                    source: FindingSource::Heuristic,
                    cve: None,
                    score: Some(rule.score),
                });
            }
        }
    }

    findings
}

/// Highest finding score plus half a point per additional finding, capped at 10.
/// Findings without a score count at their severity's weight.
pub fn heuristic_score(findings: &[Vulnerability]) -> f64 {
    let max = findings
        .iter()
        .map(|f| f.score.unwrap_or_else(|| f.severity.weight()))
        .fold(0.0_f64, f64::max);
    if findings.is_empty() {
        return 0.0;
    }
    (max + 0.5 * (findings.len() - 1) as f64).min(10.0)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSecurityReview {
    #[serde(default)]
    pub vulnerabilities: Vec<LlmVulnerability>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmVulnerability {
    #[serde(rename = "type", alias = "vuln_type", default)]
    pub vuln_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(alias = "line", default)]
    pub line_number: Option<usize>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl LlmVulnerability {
    fn into_finding(self, path: &str) -> Vulnerability {
        let severity = match self.score {
            Some(score) => Severity::from_score(score),
            None => Severity::parse_lenient(&self.severity),
        };
        Vulnerability {
            vuln_type: if self.vuln_type.trim().is_empty() {
                "Unspecified".to_string()
            } else {
                self.vuln_type
            },
            severity,
            line_number: self.line_number,
            description: self.description,
            recommendation: self.recommendation,
            file: path.to_string(),
            source: FindingSource::Llm,
            cve: None,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSecurityReport {
    pub file: String,
    pub language: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub heuristic_score: f64,
    pub llm_score: Option<f64>,
    pub risk_score: f64,
    pub severity: Severity,
    pub llm_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub total_findings: usize,
    pub severity_counts: SeverityCounts,
    pub overall_risk_score: f64,
    pub highest_severity: Option<Severity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReport {
    pub metadata: ReportMetadata,
    pub summary: SecuritySummary,
    pub files: Vec<FileSecurityReport>,
    pub dependency_scan: Option<DependencyScanOutcome>,
}

const SYSTEM_PROMPT: &str = "You are an application security reviewer. Examine the given source file for security vulnerabilities. Respond with strict JSON only: {\"vulnerabilities\": [{\"type\": \"...\", \"severity\": \"Critical|High|Medium|Low\", \"line\": 12, \"description\": \"...\", \"recommendation\": \"...\", \"score\": 7.5}], \"risk_score\": 0-10, \"summary\": \"one sentence\"}. Use an empty list when the file looks safe.";

pub struct SecurityScanner {
    client: Option<Arc<dyn CompletionClient>>,
    max_file_chars: usize,
}

impl SecurityScanner {
    pub fn new(client: Option<Arc<dyn CompletionClient>>, max_file_chars: usize) -> Self {
        Self {
            client,
            max_file_chars,
        }
    }

    /// Scan files one by one. Unreadable files are logged and counted as skipped.
    pub async fn scan(&self, files: &[FileInfo]) -> (Vec<FileSecurityReport>, usize) {
        let mut reports = Vec::new();
        let mut skipped = 0;
        let total = files.len();

        for (i, file) in files.iter().enumerate() {
            match self.scan_file(file).await {
                Ok(report) => {
                    let count = report.vulnerabilities.len();
                    if count == 0 {
                        println!(
                            "  {} [{}/{}] {}",
                            "✓".green(),
                            i + 1,
                            total,
                            file.relative_path
                        );
                    } else {
                        println!(
                            "  {} [{}/{}] {} ({} findings, risk {:.1})",
                            "!".yellow().bold(),
                            i + 1,
                            total,
                            file.relative_path,
                            count,
                            report.risk_score
                        );
                    }
                    reports.push(report);
                }
                Err(e) => {
                    warn!("skipping {}: {:#}", file.relative_path, e);
                    println!(
                        "  {} [{}/{}] {}: {}",
                        "✗".red(),
                        i + 1,
                        total,
                        file.relative_path,
                        e
                    );
                    skipped += 1;
                }
            }
        }

        (reports, skipped)
    }

    pub async fn scan_file(&self, file: &FileInfo) -> Result<FileSecurityReport> {
        let content = std::fs::read_to_string(&file.path)
            .with_context(|| format!("failed to read {}", file.path.display()))?;

        let mut vulnerabilities = check_file_heuristics(&file.relative_path, &content);
        let heuristic = heuristic_score(&vulnerabilities);

        let review = match file.language.as_deref() {
            Some(lang) if REVIEWED_LANGUAGES.contains(&lang) => {
                self.review_with_llm(file, &content, &vulnerabilities).await
            }
            _ => None,
        };

        let (llm_score, llm_summary) = match review {
            Some(review) => {
                let score = review.risk_score.map(|s| s.clamp(0.0, 10.0));
                vulnerabilities.extend(
                    review
                        .vulnerabilities
                        .into_iter()
                        .map(|v| v.into_finding(&file.relative_path)),
                );
                (score, review.summary)
            }
            None => (None, None),
        };

        let risk_score = match llm_score {
            Some(llm) => (heuristic + llm) / 2.0,
            None => heuristic,
        };

        Ok(FileSecurityReport {
            file: file.relative_path.clone(),
            language: file.language.clone(),
            vulnerabilities,
            heuristic_score: heuristic,
            llm_score,
            risk_score,
            severity: Severity::from_score(risk_score),
            llm_summary,
        })
    }

    async fn review_with_llm(
        &self,
        file: &FileInfo,
        content: &str,
        heuristics: &[Vulnerability],
    ) -> Option<LlmSecurityReview> {
        let client = self.client.as_ref()?;
        let prompt = build_review_prompt(file, content, heuristics, self.max_file_chars);

        match client.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(answer) => {
                let review = parse_json_response::<LlmSecurityReview>(&answer);
                if review.is_none() {
                    debug!("LLM review for {} was not usable JSON", file.relative_path);
                }
                review
            }
            Err(e) => {
                warn!("LLM review failed for {}: {:#}", file.relative_path, e);
                None
            }
        }
    }
}

fn build_review_prompt(
    file: &FileInfo,
    content: &str,
    heuristics: &[Vulnerability],
    max_chars: usize,
) -> String {
    let mut prompt = format!(
        "File: {}\nLanguage: {}\n",
        file.relative_path,
        file.language.as_deref().unwrap_or("unknown")
    );

    if !heuristics.is_empty() {
        prompt.push_str("\nPattern matches already flagged (confirm or add to them):\n");
        for finding in heuristics {
            prompt.push_str(&format!(
                "- line {}: {}\n",
                finding.line_number.unwrap_or(0),
                finding.vuln_type
            ));
        }
    }

    let code = truncate_chars(content, max_chars);
    prompt.push_str("\nSource:\n");
    for (idx, line) in code.lines().enumerate() {
        prompt.push_str(&format!("{:>5} | {}\n", idx + 1, line));
    }
    if code.len() < content.len() {
        prompt.push_str("[... file truncated ...]\n");
    }
    prompt
}

/// Combine per-file results and the dependency scan into headline numbers.
pub fn summarize(
    files: &[FileSecurityReport],
    skipped: usize,
    dependency_scan: Option<&DependencyScanOutcome>,
) -> SecuritySummary {
    let dependency_findings = dependency_scan
        .map(|d| d.vulnerabilities.as_slice())
        .unwrap_or(&[]);
    let all_findings = files
        .iter()
        .flat_map(|f| f.vulnerabilities.iter())
        .chain(dependency_findings.iter());

    let severity_counts = SeverityCounts::tally(all_findings.clone().map(|v| v.severity));
    let highest_severity = all_findings.map(|v| v.severity).max();

    let overall_risk_score = if files.is_empty() {
        0.0
    } else {
        files.iter().map(|f| f.risk_score).sum::<f64>() / files.len() as f64
    };

    SecuritySummary {
        files_scanned: files.len(),
        files_skipped: skipped,
        total_findings: severity_counts.total(),
        severity_counts,
        overall_risk_score,
        highest_severity,
    }
}
