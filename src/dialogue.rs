use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::canonical::Canonicalizer;
use crate::identity::Identity;

/// One spoken line as handed over by the extraction step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogueLine {
    #[serde(alias = "rawText")]
    pub text: String,
    #[serde(alias = "character", alias = "speakerId")]
    pub speaker: String,
}

impl DialogueLine {
    pub fn new(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.into(),
        }
    }
}

/// A dialogue line with its speakable text and identity attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalLine {
    pub id: Identity,
    pub raw_text: String,
    pub speaker_id: String,
    pub canonical_text: String,
}

impl CanonicalLine {
    pub fn from_line(line: &DialogueLine, canonicalizer: &Canonicalizer) -> Self {
        Self {
            id: Identity::of(&line.text, &line.speaker),
            raw_text: line.text.clone(),
            speaker_id: line.speaker.clone(),
            canonical_text: canonicalizer.canonicalize(&line.text),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("read dialogue input {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse dialogue input {source_name} (line {line}): {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },
}

#[derive(Deserialize)]
struct ExtractDocument {
    dialogue: Vec<DialogueLine>,
}

/// Reads extraction output from a file, or from stdin when `path` is `-`.
pub fn read_lines(path: &Path) -> Result<Vec<DialogueLine>, ExtractionError> {
    let source_name = path.display().to_string();
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| ExtractionError::Io {
                source_name: "stdin".to_string(),
                source,
            })?;
        buf
    } else {
        fs::read_to_string(path).map_err(|source| ExtractionError::Io {
            source_name: source_name.clone(),
            source,
        })?
    };

    parse_lines(&raw, &source_name)
}

/// Accepts a JSON array of lines, an extractor document with a `dialogue`
/// array, or JSON Lines.
pub fn parse_lines(raw: &str, source_name: &str) -> Result<Vec<DialogueLine>, ExtractionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let parse_err = |err: serde_json::Error| ExtractionError::Parse {
        source_name: source_name.to_string(),
        line: err.line(),
        message: err.to_string(),
    };

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<DialogueLine>>(trimmed).map_err(parse_err);
    }

    // A single object carrying `dialogue` is an extractor document; anything
    // else starting with `{` is JSON Lines, even when it holds just one row.
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if map.contains_key("dialogue") {
            return serde_json::from_str::<ExtractDocument>(trimmed)
                .map(|doc| doc.dialogue)
                .map_err(parse_err);
        }
    }

    parse_json_lines(trimmed, source_name)
}

fn parse_json_lines(raw: &str, source_name: &str) -> Result<Vec<DialogueLine>, ExtractionError> {
    let mut lines = Vec::new();
    for (idx, row) in raw.lines().enumerate() {
        let row = row.trim();
        if row.is_empty() {
            continue;
        }
        let line: DialogueLine =
            serde_json::from_str(row).map_err(|err| ExtractionError::Parse {
                source_name: source_name.to_string(),
                line: idx + 1,
                message: err.to_string(),
            })?;
        lines.push(line);
    }
    Ok(lines)
}
