//! Documentation steps behind the help-generation boundary.
//!
//! The website/templating subsystem is external; the pipeline only extracts
//! help topics from staged sources, writes per-topic markdown, and
//! optionally emits an external help bundle next to the staged module.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::utils::{io, paths};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpTopic {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsReport {
    pub topics: usize,
    pub files_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_help_path: Option<String>,
}

/// Help-generation boundary.
pub trait HelpGenerator: Send + Sync {
    fn extract(&self, staging: &Path, script_extensions: &[String]) -> Result<Vec<HelpTopic>>;
    fn write_markdown(&self, topics: &[HelpTopic], out_dir: &Path) -> Result<usize>;
    fn generate_external(&self, topics: &[HelpTopic], staging: &Path) -> Result<PathBuf>;
}

/// Extracts `##`-prefixed comment blocks directly above function
/// definitions: first line is the synopsis, the rest the description.
pub struct CommentHelpGenerator;

impl CommentHelpGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommentHelpGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl HelpGenerator for CommentHelpGenerator {
    fn extract(&self, staging: &Path, script_extensions: &[String]) -> Result<Vec<HelpTopic>> {
        let mut topics = Vec::new();

        for file in io::collect_files(staging, "scan for help topics")? {
            let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !script_extensions.iter().any(|s| s == ext) {
                continue;
            }

            let content = io::read_file(&file, "read script for help")?;
            let lines: Vec<&str> = content.lines().collect();
            for (index, line) in lines.iter().enumerate() {
                let trimmed = line.trim_start();
                let Some(name) = trimmed
                    .strip_prefix("function ")
                    .map(|rest| rest.split_whitespace().next().unwrap_or("").trim_end_matches('{'))
                    .filter(|n| !n.is_empty())
                else {
                    continue;
                };

                // Collect the contiguous `##` block directly above.
                let mut block = Vec::new();
                let mut cursor = index;
                while cursor > 0 {
                    cursor -= 1;
                    let candidate = lines[cursor].trim_start();
                    if let Some(text) = candidate.strip_prefix("##") {
                        block.push(text.trim().to_string());
                    } else {
                        break;
                    }
                }
                block.reverse();

                let synopsis = block.first().filter(|s| !s.is_empty()).cloned();
                let description = block.into_iter().skip(1).filter(|s| !s.is_empty()).collect();
                topics.push(HelpTopic {
                    name: name.to_string(),
                    synopsis,
                    description,
                });
            }
        }

        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics.dedup_by(|a, b| a.name == b.name);
        Ok(topics)
    }

    fn write_markdown(&self, topics: &[HelpTopic], out_dir: &Path) -> Result<usize> {
        io::ensure_dir(out_dir, "create docs directory")?;

        let mut written = 0;
        for topic in topics {
            let mut content = format!("# {}\n", topic.name);
            if let Some(synopsis) = &topic.synopsis {
                content.push_str(&format!("\n{}\n", synopsis));
            }
            if !topic.description.is_empty() {
                content.push_str("\n## Description\n\n");
                for line in &topic.description {
                    content.push_str(line);
                    content.push('\n');
                }
            }
            let path = out_dir.join(format!("{}.md", topic.name));
            io::write_file(&path, &content, "write help markdown")?;
            written += 1;
        }
        Ok(written)
    }

    fn generate_external(&self, topics: &[HelpTopic], staging: &Path) -> Result<PathBuf> {
        let path = staging.join("help.json");
        let payload = serde_json::to_string_pretty(&topics)
            .map_err(|e| crate::error::Error::internal_json(e.to_string(), Some("external help".to_string())))?;
        io::write_file(&path, &payload, "write external help")?;
        Ok(path)
    }
}

/// Run the extract/write/external sequence for a staged module.
pub fn generate_docs(
    staging: &Path,
    docs_path: &Path,
    external: bool,
    script_extensions: &[String],
    generator: &dyn HelpGenerator,
) -> Result<(Vec<HelpTopic>, DocsReport)> {
    let topics = generator.extract(staging, script_extensions)?;
    let files_written = generator.write_markdown(&topics, docs_path)?;
    let external_help_path = if external {
        Some(paths::file_name(&generator.generate_external(&topics, staging)?))
    } else {
        None
    };

    log_status!("docs", "Wrote {} help topics", files_written);
    Ok((
        topics.clone(),
        DocsReport {
            topics: topics.len(),
            files_written,
            external_help_path,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        vec!["ps1".to_string()]
    }

    #[test]
    fn extracts_comment_blocks_above_functions() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("Get-Sample.ps1"),
            "## Gets a sample.\n## Reads the sample store.\nfunction Get-Sample {\n}\n\nfunction Undocumented {\n}\n",
        )
        .unwrap();

        let topics = CommentHelpGenerator::new()
            .extract(dir.path(), &extensions())
            .unwrap();

        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].name, "Get-Sample");
        assert_eq!(topics[0].synopsis.as_deref(), Some("Gets a sample."));
        assert_eq!(topics[0].description, vec!["Reads the sample store."]);
        assert_eq!(topics[1].name, "Undocumented");
        assert!(topics[1].synopsis.is_none());
    }

    #[test]
    fn writes_one_markdown_file_per_topic() {
        let staging = tempdir().unwrap();
        std::fs::write(
            staging.path().join("fns.ps1"),
            "## One.\nfunction One {}\n## Two.\nfunction Two {}\n",
        )
        .unwrap();
        let docs = tempdir().unwrap();

        let (topics, report) = generate_docs(
            staging.path(),
            docs.path(),
            true,
            &extensions(),
            &CommentHelpGenerator::new(),
        )
        .unwrap();

        assert_eq!(topics.len(), 2);
        assert_eq!(report.files_written, 2);
        assert!(docs.path().join("One.md").exists());
        assert_eq!(report.external_help_path.as_deref(), Some("help.json"));
        assert!(staging.path().join("help.json").exists());
    }
}
