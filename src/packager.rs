use crate::config::PackagerConfig;
use crate::file_discovery::FileInfo;
use crate::llm::truncate_chars;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingMethod {
    External,
    Manual,
}

#[derive(Debug, Clone)]
pub struct PackagedCodebase {
    pub content: String,
    pub method: PackagingMethod,
    pub truncated: bool,
}

/// Bundles a codebase into one text blob for project-level LLM prompts.
pub struct Packager {
    config: PackagerConfig,
}

impl Packager {
    pub fn new(config: PackagerConfig) -> Self {
        Self { config }
    }

    pub async fn package(&self, root: &Path, files: &[FileInfo]) -> PackagedCodebase {
        match self.run_external(root).await {
            Ok(content) if !content.trim().is_empty() => {
                let (content, truncated) = self.fit_budget(content);
                PackagedCodebase {
                    content,
                    method: PackagingMethod::External,
                    truncated,
                }
            }
            Ok(_) => {
                warn!("{} produced no output, packaging manually", self.config.command);
                self.package_manually(files)
            }
            Err(e) => {
                debug!("external packager unavailable: {:#}", e);
                self.package_manually(files)
            }
        }
    }

    async fn run_external(&self, root: &Path) -> Result<String> {
        let output_path = scratch_file("codewarden-pack", "txt");
        let mut command = Command::new(&self.config.command);
        command
            .arg(root)
            .arg("--output")
            .arg(&output_path)
            .arg("--style")
            .arg("plain")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .with_context(|| format!("{} timed out after {:?}", self.config.command, timeout))?
            .with_context(|| format!("failed to start {}", self.config.command))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            bail!(
                "{} exited with {}: {}",
                self.config.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let content = tokio::fs::read_to_string(&output_path)
            .await
            .with_context(|| format!("failed to read {}", output_path.display()))?;
        let _ = tokio::fs::remove_file(&output_path).await;
        Ok(content)
    }

    /// Concatenates files with path headers until the character budget runs out.
    pub fn package_manually(&self, files: &[FileInfo]) -> PackagedCodebase {
        let budget = self.config.max_context_chars;
        let mut content = String::new();
        let mut used = 0usize;
        let mut truncated = false;

        content.push_str("Directory structure:\n");
        for file in files {
            content.push_str("  ");
            content.push_str(&file.relative_path);
            content.push('\n');
        }
        used += content.chars().count();

        for file in files {
            let body = match std::fs::read_to_string(&file.path) {
                Ok(body) => body,
                Err(e) => {
                    debug!("packager skipping {}: {}", file.path.display(), e);
                    continue;
                }
            };
            let header = format!(
                "\n================\nFile: {}\n================\n",
                file.relative_path
            );
            let needed = header.chars().count() + body.chars().count();
            if used + needed > budget {
                truncated = true;
                let room = budget.saturating_sub(used + header.chars().count());
                if room > 0 {
                    content.push_str(&header);
                    content.push_str(truncate_chars(&body, room));
                }
                break;
            }
            content.push_str(&header);
            content.push_str(&body);
            used += needed;
        }

        if used > budget {
            let (fitted, _) = self.fit_budget(content);
            content = fitted;
            truncated = true;
        }

        PackagedCodebase {
            content,
            method: PackagingMethod::Manual,
            truncated,
        }
    }

    fn fit_budget(&self, content: String) -> (String, bool) {
        let budget = self.config.max_context_chars;
        if content.chars().count() <= budget {
            (content, false)
        } else {
            (truncate_chars(&content, budget).to_string(), true)
        }
    }
}

/// Unique path under the system temp directory.
pub(crate) fn scratch_file(prefix: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}.{}", prefix, uuid::Uuid::new_v4(), extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::file_discovery::FileDiscovery;

    fn discover(root: &Path) -> Vec<FileInfo> {
        FileDiscovery::new(root, &Config::default()).discover_files().unwrap()
    }

    fn packager(command: &str, budget: usize) -> Packager {
        Packager::new(PackagerConfig {
            command: command.to_string(),
            timeout_seconds: 5,
            max_context_chars: budget,
        })
    }

    #[tokio::test]
    async fn falls_back_when_command_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("App.java"), "class App {}").unwrap();
        std::fs::write(dir.path().join("app.py"), "print('hi')").unwrap();

        let files = discover(dir.path());
        let packed = packager("codewarden-no-such-packager", 10_000)
            .package(dir.path(), &files)
            .await;

        assert_eq!(packed.method, PackagingMethod::Manual);
        assert!(!packed.truncated);
        assert!(packed.content.contains("File: App.java"));
        assert!(packed.content.contains("class App {}"));
        assert!(packed.content.contains("File: app.py"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_output_is_used_and_fitted_to_budget() {
        use std::os::unix::fs::PermissionsExt;

        let tools = tempfile::tempdir().unwrap();
        let script = tools.path().join("fake-repomix");
        let body = "x".repeat(500);
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--output\" ]; then shift; printf '%s' '{}' > \"$1\"; fi\n  shift\ndone\n",
                body
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "print('hi')").unwrap();
        let files = discover(dir.path());

        let packed = packager(script.to_str().unwrap(), 100)
            .package(dir.path(), &files)
            .await;

        assert_eq!(packed.method, PackagingMethod::External);
        assert!(packed.truncated);
        assert_eq!(packed.content, "x".repeat(100));
    }

    #[test]
    fn manual_packaging_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n".repeat(200)).unwrap();
        std::fs::write(dir.path().join("b.py"), "y = 2\n".repeat(200)).unwrap();

        let files = discover(dir.path());
        let packed = packager("unused", 300).package_manually(&files);

        assert!(packed.truncated);
        assert!(packed.content.chars().count() <= 300);
        assert!(packed.content.contains("File: a.py"));
        assert!(!packed.content.contains("File: b.py"));
    }
}
