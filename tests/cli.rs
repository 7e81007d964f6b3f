use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;

const KEY_VARS: &[&str] = &[
    "CODEWARDEN_API_KEY",
    "OPENAI_API_KEY",
    "CODEWARDEN_BASE_URL",
    "CODEWARDEN_MODEL",
    "NVD_API_KEY",
    "RUST_LOG",
];

/// Command with a clean environment and HOME pointing at `home`, so no
/// user config or key leaks into the run.
fn codewarden(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("codewarden").unwrap();
    for var in KEY_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home);
    cmd
}

fn legacy_project(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src/LoginAction.java"),
        r#"import org.apache.struts.action.Action;

public class LoginAction extends Action {
    private static final String DB_PASSWORD = "hunter22";

    public void run(String user) throws Exception {
        Runtime.getRuntime().exec("sh -c " + user);
    }
}
"#,
    )
    .unwrap();
    fs::write(root.join("src/app.properties"), "db.url=jdbc:mysql://localhost:3306/app\n").unwrap();
}

fn reports_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(prefix))
        .collect();
    names.sort();
    names
}

#[test]
fn missing_target_fails() {
    let home = tempfile::tempdir().unwrap();
    codewarden(home.path())
        .args(["scan", "/definitely/not/here", "--skip-llm", "--skip-deps"])
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}

#[test]
fn llm_run_without_key_fails() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    legacy_project(project.path());

    codewarden(home.path())
        .args(["scan", project.path().to_str().unwrap(), "--skip-deps"])
        .assert()
        .failure()
        .stderr(contains("no LLM API key configured"));
}

#[test]
fn heuristic_scan_writes_json_and_markdown() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    legacy_project(project.path());

    codewarden(home.path())
        .args([
            "scan",
            project.path().to_str().unwrap(),
            "--skip-llm",
            "--skip-deps",
            "--output",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("Reports written to"));

    let names = reports_with_prefix(out.path(), "security_scan_");
    assert_eq!(names.len(), 2, "{:?}", names);
    assert!(names[0].ends_with(".json"));
    assert!(names[1].ends_with(".md"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(&names[0])).unwrap()).unwrap();
    assert_eq!(json["metadata"]["command"], "scan");
    assert!(json["metadata"]["llm"].is_null());
    let types: Vec<&str> = json["files"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|f| f["vulnerabilities"].as_array().unwrap())
        .map(|v| v["vuln_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"Command Injection"));
    assert!(types.contains(&"Hardcoded Secret"));

    let md = fs::read_to_string(out.path().join(&names[1])).unwrap();
    assert!(md.starts_with("# Security Scan Report"));
}

#[test]
fn heuristic_migration_and_cloud_reports() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    legacy_project(project.path());
    let project_arg = project.path().to_str().unwrap();
    let out_arg = out.path().to_str().unwrap();

    codewarden(home.path())
        .args(["migrate", project_arg, "--skip-llm", "--output", out_arg])
        .assert()
        .success()
        .stdout(contains("Apache Struts"));

    codewarden(home.path())
        .args(["cloud", project_arg, "--provider", "azure", "--skip-llm", "--output", out_arg])
        .assert()
        .success()
        .stdout(contains("Readiness:"));

    assert_eq!(reports_with_prefix(out.path(), "migration_plan_").len(), 2);
    let cloud = reports_with_prefix(out.path(), "cloud_readiness_");
    assert_eq!(cloud.len(), 2);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(&cloud[0])).unwrap()).unwrap();
    assert_eq!(json["provider"], "azure");
    assert_eq!(json["llm_used"], false);
}

#[test]
fn unknown_provider_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    codewarden(home.path())
        .args(["cloud", project.path().to_str().unwrap(), "--provider", "oracle", "--skip-llm"])
        .assert()
        .failure();
}

#[test]
fn config_command_writes_documented_file() {
    let home = tempfile::tempdir().unwrap();
    let target = home.path().join("custom.toml");

    codewarden(home.path())
        .args(["config", "--output", target.to_str().unwrap()])
        .assert()
        .success();

    let written = fs::read_to_string(&target).unwrap();
    assert!(written.contains("[llm]"));
    assert!(written.contains("[scanner]"));

    // the generated file is accepted back as --config
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    codewarden(home.path())
        .args([
            "--config",
            target.to_str().unwrap(),
            "scan",
            project.path().to_str().unwrap(),
            "--skip-llm",
            "--skip-deps",
            "--output",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success();
}
