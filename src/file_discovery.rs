use crate::config::Config;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory names that are never descended into, whatever the extension filter.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "build",
    "dist",
    "__pycache__",
    ".venv",
    "venv",
    ".gradle",
    ".idea",
    "vendor",
    ".mvn",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    /// Path relative to the scan root, with `/` separators.
    pub relative_path: String,
    pub size: u64,
    pub extension: Option<String>,
    pub language: Option<String>,
}

pub struct FileDiscovery {
    root: PathBuf,
    file_extensions: Vec<String>,
    extra_excluded_dirs: Vec<String>,
    max_file_size: u64,
}

impl FileDiscovery {
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            root: root.into(),
            file_extensions: config
                .file_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            extra_excluded_dirs: config.extra_excluded_dirs.clone(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn discover_files(&self) -> crate::Result<Vec<FileInfo>> {
        let mut files = Vec::new();

        let extra = self.extra_excluded_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(true) // .gitignore support
            .hidden(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                !(is_dir && entry.depth() > 0 && is_excluded_dir(entry.file_name(), &extra))
            })
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map_or(false, |ft| ft.is_file()) {
                continue;
            }

            match self.process_file(entry.path()) {
                Ok(Some(file_info)) => files.push(file_info),
                Ok(None) => {}
                Err(e) => warn!("skipping {}: {}", entry.path().display(), e),
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    fn process_file(&self, path: &Path) -> crate::Result<Option<FileInfo>> {
        let size = fs::metadata(path)?.len();
        if size > self.max_file_size {
            return Ok(None);
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_lowercase());

        if !self.file_extensions.is_empty() {
            match extension {
                Some(ref ext) if self.file_extensions.contains(ext) => {}
                _ if is_well_known_filename(path) => {}
                _ => return Ok(None),
            }
        }

        let relative_path = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let language = detect_language(path, extension.as_deref());

        Ok(Some(FileInfo {
            path: path.to_path_buf(),
            relative_path,
            size,
            extension,
            language,
        }))
    }

    pub fn get_stats(&self, files: &[FileInfo]) -> FileStats {
        let mut stats = FileStats::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            if let Some(ref lang) = file.language {
                *stats.languages.entry(lang.clone()).or_insert(0) += 1;
            }
        }

        stats
    }
}

fn is_excluded_dir(name: &std::ffi::OsStr, extra: &[String]) -> bool {
    let name = name.to_string_lossy();
    EXCLUDED_DIRS.contains(&name.as_ref()) || extra.iter().any(|d| d == name.as_ref())
}

/// Build and deployment descriptors that matter regardless of extension.
fn is_well_known_filename(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            matches!(
                name.to_string_lossy().to_lowercase().as_str(),
                "dockerfile" | "containerfile" | "procfile" | "makefile" | "jenkinsfile"
            )
        })
        .unwrap_or(false)
}

pub fn detect_language(path: &Path, extension: Option<&str>) -> Option<String> {
    if extension.is_none() {
        if let Some(filename) = path.file_name() {
            match filename.to_string_lossy().to_lowercase().as_str() {
                "dockerfile" | "containerfile" => return Some("dockerfile".to_string()),
                "makefile" => return Some("makefile".to_string()),
                "procfile" | "jenkinsfile" => return Some("text".to_string()),
                _ => {}
            }
        }
    }

    let language = match extension? {
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "groovy" | "gradle" => "groovy",
        "rs" => "rust",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "go" => "go",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",
        "php" => "php",
        "rb" => "ruby",
        "cs" => "csharp",
        "jsp" | "jspx" => "jsp",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        "html" | "htm" => "html",
        "xml" => "xml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "properties" => "properties",
        "md" => "markdown",
        _ => return None,
    };
    Some(language.to_string())
}

#[derive(Debug, Default)]
pub struct FileStats {
    pub total_files: usize,
    pub total_size: u64,
    pub languages: BTreeMap<String, usize>,
}

impl FileStats {
    pub fn print_summary(&self) {
        println!("  Total files: {}", self.total_files);
        println!("  Total size: {:.2} MB", self.total_size as f64 / (1024.0 * 1024.0));

        let mut langs: Vec<_> = self.languages.iter().collect();
        langs.sort_by(|a, b| b.1.cmp(a.1));
        for (lang, count) in langs.into_iter().take(8) {
            println!("    {}: {} files", lang, count);
        }
    }
}
