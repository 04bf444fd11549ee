//! Prompt datasets.
//!
//! Two file formats are understood:
//! - JSONL: one `{"prompt": "...", "max_tokens": 128}` object per line
//!   (`max_tokens` optional).
//! - ShareGPT: a JSON array of `{"conversations": [{"from": "human", "value": "..."}]}`;
//!   the first non-empty `human` turn of each conversation is used.

use std::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::config::{PromptFormat, WorkloadConfig};

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("IO error reading prompts: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid prompt file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workload contains no prompts")]
    Empty,
}

/// One prompt and its optional output budget.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Prompt {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Prompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
        }
    }
}

/// Parse JSONL text. Blank lines are ignored; unparseable lines are logged
/// and skipped.
pub fn parse_jsonl(content: &str) -> Vec<Prompt> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Prompt>(line) {
            Ok(p) if !p.prompt.trim().is_empty() => Some(p),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "Skipping unparseable prompt line");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Conversation {
    #[serde(default)]
    conversations: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct Turn {
    #[serde(default)]
    from: String,
    #[serde(default)]
    value: String,
}

/// Parse a ShareGPT dataset.
pub fn parse_sharegpt(content: &str) -> Result<Vec<Prompt>, WorkloadError> {
    let data: Vec<Conversation> = serde_json::from_str(content)?;
    Ok(data
        .into_iter()
        .filter_map(|c| {
            c.conversations
                .into_iter()
                .filter(|t| t.from == "human")
                .map(|t| t.value.trim().to_string())
                .find(|v| !v.is_empty())
                .map(Prompt::new)
        })
        .collect())
}

/// Inline prompts first, then the file, truncated to `limit`.
pub fn load_prompts(config: &WorkloadConfig) -> Result<Vec<Prompt>, WorkloadError> {
    let mut prompts: Vec<Prompt> = config.prompts.iter().map(Prompt::new).collect();

    if let Some(path) = &config.prompts_file {
        let content = fs::read_to_string(path)?;
        let loaded = match config.format {
            PromptFormat::Jsonl => parse_jsonl(&content),
            PromptFormat::Sharegpt => parse_sharegpt(&content)?,
        };
        tracing::info!(path = %path.display(), count = loaded.len(), "Loaded prompts");
        prompts.extend(loaded);
    }

    if let Some(limit) = config.limit {
        prompts.truncate(limit);
    }
    if prompts.is_empty() {
        return Err(WorkloadError::Empty);
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_jsonl_skips_bad_lines() {
        let text = "{\"prompt\": \"a\", \"max_tokens\": 12}\n\nnot json\n{\"prompt\": \"b\"}\n{\"prompt\": \"  \"}\n";
        let prompts = parse_jsonl(text);
        assert_eq!(
            prompts,
            vec![
                Prompt { prompt: "a".into(), max_tokens: Some(12) },
                Prompt::new("b"),
            ]
        );
    }

    #[test]
    fn test_sharegpt_first_human_turn() {
        let text = r#"[
            {"id": "1", "conversations": [
                {"from": "gpt", "value": "ignored"},
                {"from": "human", "value": " first "},
                {"from": "human", "value": "second"}
            ]},
            {"id": "2", "conversations": [{"from": "gpt", "value": "only bot"}]},
            {"id": "3", "conversations": [{"from": "human", "value": ""}]},
            {"id": "4", "conversations": [{"from": "human", "value": "fourth"}]},
            {"id": "5", "conversations": [
                {"from": "human", "value": "   "},
                {"from": "gpt", "value": "?"},
                {"from": "human", "value": "fifth"}
            ]}
        ]"#;
        let prompts = parse_sharegpt(text).unwrap();
        assert_eq!(
            prompts,
            vec![Prompt::new("first"), Prompt::new("fourth"), Prompt::new("fifth")]
        );
    }

    #[test]
    fn test_load_combines_and_limits() {
        let path = std::env::temp_dir().join(format!("prompts-{}.jsonl", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "{{\"prompt\": \"from file\"}}").unwrap();
        writeln!(file, "{{\"prompt\": \"dropped\"}}").unwrap();

        let config = WorkloadConfig {
            prompts: vec!["inline".into()],
            prompts_file: Some(path.clone()),
            format: PromptFormat::Jsonl,
            limit: Some(2),
        };
        let prompts = load_prompts(&config).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(prompts, vec![Prompt::new("inline"), Prompt::new("from file")]);
    }

    #[test]
    fn test_empty_workload_is_error() {
        let config = WorkloadConfig::default();
        assert!(matches!(load_prompts(&config), Err(WorkloadError::Empty)));
    }
}
