use regex::Regex;
use std::collections::BTreeSet;

/// Decorative glyphs the application sprinkles into dialogue. Multi-code-point
/// emoji are removed code point by code point, joiners and variation
/// selectors included.
pub const DEFAULT_GLYPHS: &str = "🚀👨‍🚀👩‍🚀🐕‍🦺🧊😢💖👨‍🍳👩‍🍳🥕🥬🌽🍅🥒🥔🌙🏠🚪😋🎉🎆✨🎈❤️🌉🏙️🗽🏢🏬🏘️🏡🚋🤵👰🌅";

/// Speaker names that legacy lines carry as a "Name:" prefix.
pub const DEFAULT_SPEAKER_LABELS: &[&str] = &["George", "Matilda", "Moon Dog", "Narrator"];

/// Turns raw dialogue into the text that is actually spoken.
///
/// `canonicalize` is total, deterministic and idempotent.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    glyphs: BTreeSet<char>,
    label: Option<Regex>,
}

impl Canonicalizer {
    /// Bump whenever a rule changes so logs show which ruleset produced a manifest.
    pub const RULES_VERSION: u32 = 3;

    pub fn new<S: AsRef<str>>(speaker_labels: &[S], extra_glyphs: &str) -> Result<Self, regex::Error> {
        let glyphs = DEFAULT_GLYPHS
            .chars()
            .chain(extra_glyphs.chars())
            .filter(|c| !c.is_whitespace())
            .collect();

        let alternatives: Vec<String> = speaker_labels
            .iter()
            .map(|label| label_pattern(label.as_ref()))
            .filter(|pattern| !pattern.is_empty())
            .collect();

        let label = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(
                r"(?i)^(?:{})\s*:",
                alternatives.join("|")
            ))?)
        };

        Ok(Self { glyphs, label })
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        let stripped: String = raw.chars().filter(|c| !self.glyphs.contains(c)).collect();
        let mut text = stripped.trim();

        if let Some(label) = &self.label {
            // Lines such as "George: Moon Dog: hi" carry stacked labels.
            while let Some(found) = label.find(text) {
                text = text[found.end()..].trim_start();
            }
        }

        text.trim().to_string()
    }
}

/// "Moon Dog" becomes `Moon\s*Dog` so spacing variants still match.
fn label_pattern(label: &str) -> String {
    label
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*")
}
