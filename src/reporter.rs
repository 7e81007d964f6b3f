use crate::cloud::CloudReadinessReport;
use crate::findings::{Severity, SeverityCounts, Vulnerability};
use crate::migration::MigrationPlan;
use crate::packager::PackagingMethod;
use crate::security::{FileSecurityReport, SecurityReport};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use uuid::Uuid;

pub const SECURITY_PREFIX: &str = "security_scan";
pub const MIGRATION_PREFIX: &str = "migration_plan";
pub const CLOUD_PREFIX: &str = "cloud_readiness";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub command: String,
    pub target: String,
    pub generated_at: String,
    pub tool_version: String,
    /// Model description, or `None` when the run used heuristics only.
    pub llm: Option<String>,
}

impl ReportMetadata {
    pub fn new(command: &str, target: &Path, llm: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.to_string(),
            target: target.display().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            llm,
        }
    }

    #[cfg(test)]
    pub(crate) fn fixed(command: &str, target: &str) -> Self {
        Self {
            run_id: Uuid::nil(),
            command: command.to_string(),
            target: target.to_string(),
            generated_at: "2026-01-01T00:00:00+00:00".to_string(),
            tool_version: "0.0.0".to_string(),
            llm: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedReport {
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// Writes `<prefix>_<YYYYMMDD_HHMMSS>.json` and `.md` side by side.
pub fn save_results<T: Serialize>(
    output_dir: &Path,
    prefix: &str,
    data: &T,
    markdown: &str,
) -> Result<SavedReport> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let stem = format!("{}_{}", prefix, chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let json_path = output_dir.join(format!("{}.json", stem));
    let markdown_path = output_dir.join(format!("{}.md", stem));

    let json = serde_json::to_string_pretty(data)?;
    fs::write(&json_path, json)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    fs::write(&markdown_path, markdown)
        .with_context(|| format!("failed to write {}", markdown_path.display()))?;

    Ok(SavedReport {
        json_path,
        markdown_path,
    })
}

fn header(title: &str, metadata: &ReportMetadata) -> String {
    let mut md = format!(
        "# {}\n\n**Target:** `{}`\n**Generated:** {}\n**Run ID:** {}\n",
        title, metadata.target, metadata.generated_at, metadata.run_id
    );
    match &metadata.llm {
        Some(llm) => md.push_str(&format!("**LLM:** {}\n\n", llm)),
        None => md.push_str("**LLM:** disabled (heuristics only)\n\n"),
    }
    md
}

fn severity_table(counts: &SeverityCounts) -> String {
    let mut md = String::from("| Severity | Count |\n|----------|-------|\n");
    for severity in Severity::ALL {
        md.push_str(&format!("| {} | {} |\n", severity, counts.get(severity)));
    }
    md.push('\n');
    md
}

fn packaging_label(method: Option<PackagingMethod>) -> &'static str {
    match method {
        Some(PackagingMethod::External) => "external packager",
        Some(PackagingMethod::Manual) => "built-in packager",
        None => "not packaged",
    }
}

fn vulnerability_line(v: &Vulnerability) -> String {
    let mut line = format!("- **[{}] {}**", v.severity, v.vuln_type);
    if let Some(n) = v.line_number {
        line.push_str(&format!(" (line {})", n));
    }
    if let Some(cve) = &v.cve {
        line.push_str(&format!(" `{}`", cve));
    }
    line.push_str(&format!(": {} _({})_\n", v.description, v.source));
    if let Some(rec) = &v.recommendation {
        line.push_str(&format!("  - Recommendation: {}\n", rec));
    }
    line
}

pub fn render_security_markdown(report: &SecurityReport) -> String {
    let mut md = header("Security Scan Report", &report.metadata);
    let summary = &report.summary;

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- **Files scanned:** {}\n", summary.files_scanned));
    md.push_str(&format!("- **Files skipped:** {}\n", summary.files_skipped));
    md.push_str(&format!("- **Total findings:** {}\n", summary.total_findings));
    md.push_str(&format!("- **Overall risk score:** {:.1}/10\n", summary.overall_risk_score));
    match summary.highest_severity {
        Some(severity) => md.push_str(&format!("- **Highest severity:** {}\n\n", severity)),
        None => md.push_str("- **Highest severity:** none\n\n"),
    }

    md.push_str("## Findings by Severity\n\n");
    md.push_str(&severity_table(&summary.severity_counts));

    if let Some(deps) = &report.dependency_scan {
        md.push_str("## Dependency Scan\n\n");
        match &deps.tool {
            Some(tool) => md.push_str(&format!("Scanned with {}.\n\n", tool)),
            None => md.push_str("No dependency scanner could be run.\n\n"),
        }
        for error in &deps.errors {
            md.push_str(&format!("- ⚠️ {}\n", error));
        }
        if !deps.errors.is_empty() {
            md.push('\n');
        }
        if deps.vulnerabilities.is_empty() {
            md.push_str("No vulnerable dependencies reported.\n\n");
        } else {
            md.push_str("| Severity | Dependency | CVE | Score |\n|----------|------------|-----|-------|\n");
            for v in &deps.vulnerabilities {
                let score = v.score.map(|s| format!("{:.1}", s)).unwrap_or_else(|| "-".to_string());
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    v.severity,
                    v.file,
                    v.cve.as_deref().unwrap_or("-"),
                    score
                ));
            }
            md.push('\n');
        }
    }

    let mut flagged: Vec<&FileSecurityReport> = report
        .files
        .iter()
        .filter(|f| !f.vulnerabilities.is_empty())
        .collect();
    flagged.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.file.cmp(&b.file))
    });

    md.push_str("## Files\n\n");
    if flagged.is_empty() {
        md.push_str("No source-level findings.\n");
        return md;
    }
    for file in &flagged {
        md.push_str(&format!(
            "### `{}` ({} · {:.1}/10)\n\n",
            file.file, file.severity, file.risk_score
        ));
        if let Some(summary) = &file.llm_summary {
            md.push_str(&format!("{}\n\n", summary));
        }
        for v in &file.vulnerabilities {
            md.push_str(&vulnerability_line(v));
        }
        md.push('\n');
    }
    let clean = report.files.len() - flagged.len();
    if clean > 0 {
        md.push_str(&format!("{} other file(s) had no findings.\n", clean));
    }
    md
}

pub fn render_migration_markdown(plan: &MigrationPlan) -> String {
    let mut md = header("Migration Plan", &plan.metadata);

    md.push_str("## Overview\n\n");
    md.push_str(&format!("- **Target framework:** {}\n", plan.target_framework));
    md.push_str(&format!("- **Estimated effort:** {:.1} weeks\n", plan.estimated_weeks));
    md.push_str(&format!("- **Complexity score:** {:.1}/10\n", plan.complexity.complexity_score));
    md.push_str(&format!("- **Codebase context:** {}\n\n", packaging_label(plan.packaging)));
    md.push_str(&format!("{}\n\n", plan.summary));

    md.push_str("## Detected Legacy Frameworks\n\n");
    if plan.detected_frameworks.is_empty() {
        md.push_str("None detected.\n\n");
    } else {
        md.push_str("| Framework | Occurrences | Files |\n|-----------|-------------|-------|\n");
        for detection in &plan.detected_frameworks {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                detection.name,
                detection.occurrences,
                detection.files.len()
            ));
        }
        md.push('\n');
    }

    let complexity = &plan.complexity;
    md.push_str("## Codebase Complexity\n\n");
    md.push_str(&format!(
        "- {} files parsed, {} lines\n- {} functions, {} classes, {} imports, {} branches\n\n",
        complexity.files_parsed,
        complexity.total_lines,
        complexity.total_functions,
        complexity.total_classes,
        complexity.total_imports,
        complexity.total_branches
    ));
    if !complexity.most_complex.is_empty() {
        md.push_str("Most complex files:\n\n");
        for file in &complexity.most_complex {
            md.push_str(&format!(
                "- `{}` ({}, complexity {})\n",
                file.path,
                file.language,
                file.complexity()
            ));
        }
        md.push('\n');
    }

    md.push_str("## Steps\n\n");
    for (i, step) in plan.steps.iter().enumerate() {
        md.push_str(&format!(
            "{}. **{}** [{} · {}]\n   {}\n",
            i + 1,
            step.title,
            step.priority,
            step.category,
            step.description
        ));
        if !step.effort.is_empty() {
            md.push_str(&format!("   _Effort:_ {}\n", step.effort));
        }
        md.push('\n');
    }

    if !plan.risks.is_empty() {
        md.push_str("## Risks\n\n");
        for risk in &plan.risks {
            md.push_str(&format!("- {}\n", risk));
        }
    }
    md
}

pub fn render_cloud_markdown(report: &CloudReadinessReport) -> String {
    let mut md = header("Cloud Readiness Report", &report.metadata);

    md.push_str("## Overview\n\n");
    md.push_str(&format!("- **Provider:** {}\n", report.provider));
    md.push_str(&format!(
        "- **Readiness score:** {:.1}/10 ({})\n",
        report.readiness_score, report.rating
    ));
    md.push_str(&format!("- **Static score:** {:.1}/10\n", report.heuristic_score));
    if let Some(llm) = report.llm_score {
        md.push_str(&format!("- **Model score:** {:.1}/10\n", llm));
    }
    md.push_str(&format!("- **Codebase context:** {}\n\n", packaging_label(report.packaging)));
    md.push_str(&format!("{}\n\n", report.summary));

    md.push_str("## Issues by Severity\n\n");
    md.push_str(&severity_table(&report.severity_counts));

    if !report.category_breakdown.is_empty() {
        md.push_str("## Issues by Category\n\n| Category | Count |\n|----------|-------|\n");
        for (category, count) in &report.category_breakdown {
            md.push_str(&format!("| {} | {} |\n", category, count));
        }
        md.push('\n');
    }

    md.push_str("## Issues\n\n");
    if report.issues.is_empty() {
        md.push_str("No issues found.\n\n");
    }
    for severity in Severity::ALL {
        for issue in report.issues.iter().filter(|i| i.severity == severity) {
            let location = match (&issue.file, issue.line_number) {
                (Some(file), Some(line)) => format!(" (`{}`:{})", file, line),
                (Some(file), None) => format!(" (`{}`)", file),
                _ => String::new(),
            };
            md.push_str(&format!(
                "- **[{}] {}**{}: {}\n",
                issue.severity, issue.category, location, issue.description
            ));
            if !issue.recommendation.is_empty() {
                md.push_str(&format!("  - Recommendation: {}\n", issue.recommendation));
            }
        }
    }

    if !report.recommendations.is_empty() {
        md.push_str("\n## Recommendations\n\n");
        for rec in &report.recommendations {
            md.push_str(&format!("- {}\n", rec));
        }
    }
    md
}
