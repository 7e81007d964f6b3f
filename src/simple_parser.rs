use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Superficial structural counts for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStructure {
    pub path: String,
    pub language: String,
    pub lines: usize,
    pub functions: usize,
    pub classes: usize,
    pub imports: usize,
    pub branches: usize,
}

impl FileStructure {
    pub fn complexity(&self) -> usize {
        self.functions + self.classes * 2 + self.branches / 4
    }
}

#[derive(Clone)]
struct LanguagePatterns {
    import_patterns: Vec<Regex>,
    function_patterns: Vec<Regex>,
    class_patterns: Vec<Regex>,
}

pub struct SimpleParser {
    language_patterns: HashMap<&'static str, LanguagePatterns>,
    branch_pattern: Regex,
    comment_pattern: Regex,
}

impl SimpleParser {
    pub fn new() -> Result<Self> {
        let mut language_patterns = HashMap::new();

        language_patterns.insert("java", LanguagePatterns {
            import_patterns: vec![Regex::new(r"^\s*import\s+(static\s+)?[\w.*]+\s*;")?],
            function_patterns: vec![Regex::new(
                r"^\s*(public|protected|private|static|final|synchronized|abstract|\s)*[\w<>\[\],\s]+\s+(\w+)\s*\([^;]*$",
            )?],
            class_patterns: vec![Regex::new(
                r"^\s*(public\s+|abstract\s+|final\s+|static\s+)*(class|interface|enum|record)\s+(\w+)",
            )?],
        });

        let js = LanguagePatterns {
            import_patterns: vec![
                Regex::new(r#"^\s*import\s+.*?from\s+['"]([^'"]+)['"]"#)?,
                Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#)?,
                Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#)?,
            ],
            function_patterns: vec![
                Regex::new(r"(async\s+)?function\s*\*?\s*(\w+)?\s*\(")?,
                Regex::new(r"(\w+)\s*=\s*(async\s+)?\([^)]*\)\s*=>")?,
            ],
            class_patterns: vec![Regex::new(r"^\s*(export\s+)?(default\s+)?class\s+(\w+)")?],
        };
        language_patterns.insert("javascript", js.clone());
        language_patterns.insert("typescript", js);

        language_patterns.insert("python", LanguagePatterns {
            import_patterns: vec![
                Regex::new(r"^\s*from\s+([^\s]+)\s+import")?,
                Regex::new(r"^\s*import\s+([^\s,]+)")?,
            ],
            function_patterns: vec![Regex::new(r"^\s*(async\s+)?def\s+(\w+)\s*\(")?],
            class_patterns: vec![Regex::new(r"^\s*class\s+(\w+)")?],
        });

        language_patterns.insert("csharp", LanguagePatterns {
            import_patterns: vec![Regex::new(r"^\s*using\s+[\w.]+\s*;")?],
            function_patterns: vec![Regex::new(
                r"^\s*(public|private|protected|internal|static|virtual|override|async|\s)+[\w<>\[\],]+\s+(\w+)\s*\(",
            )?],
            class_patterns: vec![Regex::new(r"^\s*(\w+\s+)*(class|interface|struct|enum)\s+(\w+)")?],
        });

        language_patterns.insert("go", LanguagePatterns {
            import_patterns: vec![Regex::new(r#"^\s*(import\s+)?"[\w./-]+"\s*$"#)?],
            function_patterns: vec![Regex::new(r"^\s*func\s+(\([^)]*\)\s*)?(\w+)\s*\(")?],
            class_patterns: vec![Regex::new(r"^\s*type\s+(\w+)\s+(struct|interface)")?],
        });

        language_patterns.insert("rust", LanguagePatterns {
            import_patterns: vec![Regex::new(r"^\s*(pub\s+)?use\s+[^;]+;")?],
            function_patterns: vec![Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?fn\s+(\w+)")?],
            class_patterns: vec![Regex::new(r"^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait)\s+(\w+)")?],
        });

        Ok(Self {
            language_patterns,
            branch_pattern: Regex::new(r"\b(if|else if|elif|for|foreach|while|case|catch|except)\b")?,
            comment_pattern: Regex::new(r"^\s*(//|#|\*|/\*)")?,
        })
    }

    pub fn parse_content(&self, path: &str, language: &str, content: &str) -> FileStructure {
        let mut structure = FileStructure {
            path: path.to_string(),
            language: language.to_string(),
            ..FileStructure::default()
        };

        let patterns = self.language_patterns.get(language);

        for line in content.lines() {
            structure.lines += 1;
            if line.trim().is_empty() || self.comment_pattern.is_match(line) {
                continue;
            }

            structure.branches += self.branch_pattern.find_iter(line).count();

            let Some(patterns) = patterns else {
                continue;
            };
            if patterns.import_patterns.iter().any(|p| p.is_match(line)) {
                structure.imports += 1;
            } else if patterns.class_patterns.iter().any(|p| p.is_match(line)) {
                structure.classes += 1;
            } else if patterns.function_patterns.iter().any(|p| p.is_match(line))
                && !is_control_statement(line)
            {
                structure.functions += 1;
            }
        }

        structure
    }

    pub fn supports(&self, language: &str) -> bool {
        self.language_patterns.contains_key(language)
    }
}

/// `if (x) {` and friends look like method headers to the Java/C# patterns.
fn is_control_statement(line: &str) -> bool {
    let trimmed = line.trim_start();
    ["if", "for", "while", "switch", "catch", "return", "new", "else"]
        .iter()
        .any(|kw| {
            trimmed.starts_with(kw)
                && trimmed[kw.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric() && c != '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAVA: &str = r#"
package com.example;

import java.util.List;
import javax.ejb.Stateless;

// a comment with if (x) inside
@Stateless
public class OrderService {
    public List<Order> findAll(String filter) {
        if (filter == null) {
            return List.of();
        }
        for (Order o : orders) {
            process(o);
        }
        return orders;
    }

    private void process(Order o) {
        try {
            o.save();
        } catch (Exception e) {
        }
    }
}
"#;

    #[test]
    fn counts_java_structure() {
        let parser = SimpleParser::new().unwrap();
        let s = parser.parse_content("OrderService.java", "java", JAVA);
        assert_eq!(s.imports, 2);
        assert_eq!(s.classes, 1);
        assert_eq!(s.functions, 2);
        assert_eq!(s.branches, 3);
        assert_eq!(s.complexity(), 2 + 2);
    }

    #[test]
    fn counts_python_structure() {
        let parser = SimpleParser::new().unwrap();
        let src = "import os\nfrom flask import Flask\n\nclass App:\n    def run(self):\n        if True:\n            pass\n\nasync def main():\n    pass\n";
        let s = parser.parse_content("app.py", "python", src);
        assert_eq!(s.imports, 2);
        assert_eq!(s.classes, 1);
        assert_eq!(s.functions, 2);
        assert_eq!(s.branches, 1);
        assert_eq!(s.lines, 10);
    }

    #[test]
    fn unknown_language_only_counts_lines_and_branches() {
        let parser = SimpleParser::new().unwrap();
        let s = parser.parse_content("x.sql", "sql", "SELECT 1;\nCASE WHEN x THEN y END\n");
        assert_eq!(s.functions, 0);
        assert_eq!(s.classes, 0);
        assert_eq!(s.lines, 2);
        assert!(!parser.supports("sql"));
    }
}
