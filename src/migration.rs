use crate::file_discovery::FileInfo;
use crate::findings::{MigrationStep, Priority};
use crate::llm::{parse_or_default, CompletionClient};
use crate::packager::{PackagedCodebase, PackagingMethod};
use crate::reporter::ReportMetadata;
use crate::simple_parser::{FileStructure, SimpleParser};
use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyFramework {
    Struts,
    Ejb,
    ServletJsp,
    SpringXml,
    SoapRpc,
    AngularJs,
    JQuery,
}

impl fmt::Display for LegacyFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegacyFramework::Struts => "Apache Struts",
            LegacyFramework::Ejb => "Enterprise JavaBeans",
            LegacyFramework::ServletJsp => "Servlets/JSP",
            LegacyFramework::SpringXml => "Spring XML configuration",
            LegacyFramework::SoapRpc => "JAX-RPC/Axis SOAP",
            LegacyFramework::AngularJs => "AngularJS",
            LegacyFramework::JQuery => "jQuery",
        };
        f.write_str(name)
    }
}

struct Detector {
    framework: LegacyFramework,
    content: Regex,
    file_names: &'static [&'static str],
    extensions: &'static [&'static str],
}

static DETECTORS: Lazy<Vec<Detector>> = Lazy::new(|| {
    let re = |p: &str| Regex::new(p).expect("detector pattern is valid");
    vec![
        Detector {
            framework: LegacyFramework::Struts,
            content: re(r"(org\.apache\.struts|extends\s+(Action|ActionForm|DispatchAction|ActionSupport)\b)"),
            file_names: &["struts.xml", "struts-config.xml"],
            extensions: &[],
        },
        Detector {
            framework: LegacyFramework::Ejb,
            content: re(r"(javax\.ejb\.|@(Stateless|Stateful|MessageDriven)\b|\b(EJBHome|EJBObject|SessionBean|EntityBean)\b)"),
            file_names: &["ejb-jar.xml"],
            extensions: &[],
        },
        Detector {
            framework: LegacyFramework::ServletJsp,
            content: re(r"(extends\s+HttpServlet\b|import\s+javax\.servlet\.)"),
            file_names: &["web.xml"],
            extensions: &["jsp", "jspx"],
        },
        Detector {
            framework: LegacyFramework::SpringXml,
            content: re(r"(springframework\.org/schema/beans|ClassPathXmlApplicationContext|XmlBeanFactory)"),
            file_names: &["applicationcontext.xml", "dispatcher-servlet.xml"],
            extensions: &[],
        },
        Detector {
            framework: LegacyFramework::SoapRpc,
            content: re(r"(org\.apache\.axis\.|javax\.xml\.rpc\.)"),
            file_names: &["server-config.wsdd"],
            extensions: &["wsdl"],
        },
        Detector {
            framework: LegacyFramework::AngularJs,
            content: re(r#"(angular\.module\s*\(|\$scope\b|ng-app\s*=|ng-controller\s*=)"#),
            file_names: &[],
            extensions: &[],
        },
        Detector {
            framework: LegacyFramework::JQuery,
            content: re(r"(\$\(\s*document\s*\)\.ready|\bjQuery\s*\(|\$\.ajax\s*\()"),
            file_names: &[],
            extensions: &[],
        },
    ]
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDetection {
    pub framework: LegacyFramework,
    pub name: String,
    pub occurrences: usize,
    pub files: Vec<String>,
}

/// Scan file names and contents for legacy framework markers.
pub fn detect_frameworks(files: &[(String, String)]) -> Vec<FrameworkDetection> {
    let mut hits: BTreeMap<LegacyFramework, (usize, Vec<String>)> = BTreeMap::new();

    for (path, content) in files {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        for detector in DETECTORS.iter() {
            let mut count = content
                .lines()
                .filter(|line| detector.content.is_match(line))
                .count();
            if detector.file_names.contains(&file_name.as_str())
                || detector.extensions.contains(&extension)
            {
                count += 1;
            }
            if count > 0 {
                let entry = hits.entry(detector.framework).or_default();
                entry.0 += count;
                entry.1.push(path.clone());
            }
        }
    }

    let mut detections: Vec<FrameworkDetection> = hits
        .into_iter()
        .map(|(framework, (occurrences, files))| FrameworkDetection {
            framework,
            name: framework.to_string(),
            occurrences,
            files,
        })
        .collect();
    detections.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    detections
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplexitySummary {
    pub files_parsed: usize,
    pub total_lines: usize,
    pub total_functions: usize,
    pub total_classes: usize,
    pub total_imports: usize,
    pub total_branches: usize,
    /// 0-10, higher means harder to migrate.
    pub complexity_score: f64,
    pub most_complex: Vec<FileStructure>,
}

pub fn summarize_complexity(structures: &[FileStructure]) -> ComplexitySummary {
    if structures.is_empty() {
        return ComplexitySummary::default();
    }

    let total_complexity: usize = structures.iter().map(|s| s.complexity()).sum();
    let average = total_complexity as f64 / structures.len() as f64;

    let mut ranked: Vec<FileStructure> = structures.to_vec();
    ranked.sort_by(|a, b| b.complexity().cmp(&a.complexity()).then_with(|| a.path.cmp(&b.path)));
    ranked.truncate(10);

    ComplexitySummary {
        files_parsed: structures.len(),
        total_lines: structures.iter().map(|s| s.lines).sum(),
        total_functions: structures.iter().map(|s| s.functions).sum(),
        total_classes: structures.iter().map(|s| s.classes).sum(),
        total_imports: structures.iter().map(|s| s.imports).sum(),
        total_branches: structures.iter().map(|s| s.branches).sum(),
        complexity_score: (average / 2.0).min(10.0),
        most_complex: ranked,
    }
}

fn effort_for_files(file_count: usize) -> &'static str {
    match file_count {
        0..=3 => "1-2 days",
        4..=10 => "3-5 days",
        11..=30 => "1-2 weeks",
        _ => "3+ weeks",
    }
}

/// Static plan steps derived from what was detected.
pub fn heuristic_steps(detections: &[FrameworkDetection], target: &str) -> Vec<MigrationStep> {
    let mut steps = vec![
        MigrationStep {
            title: format!("Set up the {} project skeleton", target),
            description: format!(
                "Create the {} build, dependency management and CI pipeline alongside the existing application so modules can move over incrementally.",
                target
            ),
            priority: Priority::Critical,
            category: "Foundation".to_string(),
            effort: "2-3 days".to_string(),
        },
        MigrationStep {
            title: "Add regression tests around current behaviour".to_string(),
            description: "Cover the entry points that will be rewritten with integration tests before changing them.".to_string(),
            priority: Priority::High,
            category: "Testing".to_string(),
            effort: "1 week".to_string(),
        },
    ];

    for detection in detections {
        let effort = effort_for_files(detection.files.len()).to_string();
        let (title, description, priority, category) = match detection.framework {
            LegacyFramework::Struts => (
                format!("Replace Struts actions with {} controllers", target),
                "Map each Action and ActionForm to a controller and request model; move struts-config routing into annotations.",
                Priority::High,
                "Web Layer",
            ),
            LegacyFramework::Ejb => (
                format!("Convert EJB session beans to {} services", target),
                "Turn stateless beans into plain injectable services, replace JNDI lookups with dependency injection and container transactions with declarative ones.",
                Priority::High,
                "Business Layer",
            ),
            LegacyFramework::ServletJsp => (
                "Migrate servlets and JSP views".to_string(),
                "Rewrite servlets as controllers and move JSP rendering to a modern template engine or a separate frontend.",
                Priority::Medium,
                "Presentation",
            ),
            LegacyFramework::SpringXml => (
                "Convert XML bean definitions to annotated configuration".to_string(),
                "Replace applicationContext XML with component scanning and configuration classes.",
                Priority::Medium,
                "Configuration",
            ),
            LegacyFramework::SoapRpc => (
                "Replace JAX-RPC/Axis endpoints".to_string(),
                "Expose the same operations through REST or JAX-WS and keep a compatibility facade for existing consumers.",
                Priority::High,
                "Integration",
            ),
            LegacyFramework::AngularJs => (
                format!("Rewrite AngularJS controllers as {} components", target),
                "Move $scope state into component state and services; migrate routes module by module.",
                Priority::High,
                "Frontend",
            ),
            LegacyFramework::JQuery => (
                "Retire jQuery DOM manipulation".to_string(),
                "Replace $.ajax with fetch and direct DOM mutation with component rendering.",
                Priority::Low,
                "Frontend",
            ),
        };
        steps.push(MigrationStep {
            title,
            description: format!("{} ({} files affected)", description, detection.files.len()),
            priority,
            category: category.to_string(),
            effort,
        });
    }

    steps
}

/// Rough calendar estimate from structure and detection spread.
pub fn heuristic_weeks(complexity: &ComplexitySummary, detections: &[FrameworkDetection]) -> f64 {
    let affected: usize = detections.iter().map(|d| d.files.len()).sum();
    let raw = complexity.total_functions as f64 / 40.0
        + complexity.total_classes as f64 / 15.0
        + affected as f64 / 10.0;
    (raw.max(1.0) * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmMigrationPlan {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub steps: Vec<LlmMigrationStep>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub estimated_weeks: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmMigrationStep {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "effort_estimate")]
    pub effort: String,
}

impl From<LlmMigrationStep> for MigrationStep {
    fn from(step: LlmMigrationStep) -> Self {
        MigrationStep {
            title: step.title,
            description: step.description,
            priority: Priority::parse_lenient(&step.priority),
            category: if step.category.trim().is_empty() {
                "General".to_string()
            } else {
                step.category
            },
            effort: if step.effort.trim().is_empty() {
                "Unknown".to_string()
            } else {
                step.effort
            },
        }
    }
}

/// Used whenever the LLM is unavailable or answers with something unusable.
pub fn default_llm_plan() -> LlmMigrationPlan {
    LlmMigrationPlan {
        summary: "Migration plan derived from static analysis only; no model assessment was available.".to_string(),
        steps: Vec::new(),
        risks: vec![
            "Framework-specific behaviour (transactions, session handling, security filters) may not map one-to-one.".to_string(),
            "Effort estimates are heuristic and should be validated by the team.".to_string(),
        ],
        estimated_weeks: None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub metadata: ReportMetadata,
    pub target_framework: String,
    pub detected_frameworks: Vec<FrameworkDetection>,
    pub complexity: ComplexitySummary,
    pub summary: String,
    pub steps: Vec<MigrationStep>,
    pub risks: Vec<String>,
    pub estimated_weeks: f64,
    pub llm_used: bool,
    pub packaging: Option<PackagingMethod>,
}

const SYSTEM_PROMPT: &str = "You are a software modernization architect. Given a legacy codebase and the detected frameworks, produce a migration plan to the requested target framework. Respond with strict JSON only: {\"summary\": \"...\", \"steps\": [{\"title\": \"...\", \"description\": \"...\", \"priority\": \"Critical|High|Medium|Low\", \"category\": \"...\", \"effort\": \"e.g. 3-5 days\"}], \"risks\": [\"...\"], \"estimated_weeks\": 8}";

pub struct MigrationAnalyzer {
    client: Option<Arc<dyn CompletionClient>>,
    parser: SimpleParser,
}

impl MigrationAnalyzer {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            parser: SimpleParser::new()?,
        })
    }

    /// Read every file once; unreadable ones are logged and left out.
    pub fn load_sources(&self, files: &[FileInfo]) -> (Vec<(String, String)>, Vec<FileStructure>) {
        let mut sources = Vec::new();
        let mut structures = Vec::new();

        for file in files {
            let content = match std::fs::read_to_string(&file.path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("skipping {}: {}", file.relative_path, e);
                    continue;
                }
            };
            if let Some(language) = file.language.as_deref().filter(|l| self.parser.supports(l)) {
                structures.push(self.parser.parse_content(&file.relative_path, language, &content));
            }
            sources.push((file.relative_path.clone(), content));
        }

        (sources, structures)
    }

    pub async fn analyze(
        &self,
        metadata: ReportMetadata,
        files: &[FileInfo],
        target: &str,
        packaged: Option<&PackagedCodebase>,
    ) -> MigrationPlan {
        let (sources, structures) = self.load_sources(files);
        let detected = detect_frameworks(&sources);
        let complexity = summarize_complexity(&structures);

        if detected.is_empty() {
            println!("  {} No legacy framework markers found", "•".cyan());
        }
        for detection in &detected {
            println!(
                "  {} {} ({} markers in {} files)",
                "▸".cyan(),
                detection.name.bold(),
                detection.occurrences,
                detection.files.len()
            );
        }
        println!(
            "  {} {} files parsed, complexity {:.1}/10",
            "▸".cyan(),
            complexity.files_parsed,
            complexity.complexity_score
        );

        let answer = match (&self.client, packaged) {
            (Some(client), Some(packaged)) => {
                let prompt = build_prompt(target, &detected, &complexity, packaged);
                match client.complete(SYSTEM_PROMPT, &prompt).await {
                    Ok(answer) => Some(answer),
                    Err(e) => {
                        warn!("LLM migration planning failed: {:#}", e);
                        None
                    }
                }
            }
            _ => None,
        };
        let (llm_plan, llm_used): (LlmMigrationPlan, bool) =
            parse_or_default(answer.as_deref().unwrap_or_default(), default_llm_plan);
        if answer.is_some() && !llm_used {
            debug!("LLM migration plan was not usable JSON");
        }

        let mut steps = heuristic_steps(&detected, target);
        steps.extend(llm_plan.steps.into_iter().map(MigrationStep::from));
        steps.sort_by_key(|s| s.priority.rank());

        let heuristic = heuristic_weeks(&complexity, &detected);
        let estimated_weeks = match llm_plan.estimated_weeks.filter(|w| w.is_finite() && *w > 0.0) {
            Some(llm) => ((heuristic + llm) / 2.0 * 10.0).round() / 10.0,
            None => heuristic,
        };

        let summary = if llm_plan.summary.trim().is_empty() {
            default_llm_plan().summary
        } else {
            llm_plan.summary
        };

        MigrationPlan {
            metadata,
            target_framework: target.to_string(),
            detected_frameworks: detected,
            complexity,
            summary,
            steps,
            risks: llm_plan.risks,
            estimated_weeks,
            llm_used,
            packaging: packaged.map(|p| p.method),
        }
    }
}

fn build_prompt(
    target: &str,
    detected: &[FrameworkDetection],
    complexity: &ComplexitySummary,
    packaged: &PackagedCodebase,
) -> String {
    let mut prompt = format!("Target framework: {}\n\nDetected legacy frameworks:\n", target);
    if detected.is_empty() {
        prompt.push_str("- none detected by static markers\n");
    }
    for detection in detected {
        prompt.push_str(&format!(
            "- {}: {} markers in {} files\n",
            detection.name,
            detection.occurrences,
            detection.files.len()
        ));
    }
    prompt.push_str(&format!(
        "\nStructure: {} files, {} classes, {} functions, complexity {:.1}/10\n",
        complexity.files_parsed,
        complexity.total_classes,
        complexity.total_functions,
        complexity.complexity_score
    ));
    prompt.push_str("\nCodebase:\n");
    prompt.push_str(&packaged.content);
    if packaged.truncated {
        prompt.push_str("\n[... codebase truncated ...]\n");
    }
    prompt
}
