//! Display helpers shared by the page templates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::api::types::{ModelInfo, Timestamp};
use crate::constants::PROVIDER_ORDER;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render a timestamp; numbers below 10^10 are seconds, larger ones milliseconds
pub fn format_timestamp(timestamp: Option<&Timestamp>) -> String {
    let parsed = match timestamp {
        Some(Timestamp::Number(n)) if *n != 0.0 && n.is_finite() => {
            if *n < 1e10 {
                DateTime::from_timestamp_millis((*n * 1000.0) as i64)
            } else {
                DateTime::from_timestamp_millis(*n as i64)
            }
        }
        Some(Timestamp::Text(s)) if !s.trim().is_empty() => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    };

    parsed
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// `0 B`, otherwise 1024-based units rounded to two decimals
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Thousands separators: `1234567` → `1,234,567`
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Shorten long API keys for tables
pub fn truncate_key(key: &str) -> String {
    if key.chars().count() > 20 {
        let head: String = key.chars().take(17).collect();
        format!("{head}...")
    } else {
        key.to_string()
    }
}

// --- Versions ---

fn version_segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Compare dotted versions segment by segment; missing segments count as 0
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (version_segments(a), version_segments(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let ordering = a.get(i).unwrap_or(&0).cmp(b.get(i).unwrap_or(&0));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStatus {
    DevBuild,
    UpToDate,
    UpdateAvailable,
    NewerThanRelease,
}

impl VersionStatus {
    pub fn of(current: &str, latest: &str) -> Self {
        let current = current.trim().trim_start_matches('v');
        let latest = latest.trim().trim_start_matches('v');

        if current == "dev" || current == "unknown" || current.is_empty() {
            VersionStatus::DevBuild
        } else if current == latest {
            VersionStatus::UpToDate
        } else if compare_versions(current, latest) == Ordering::Less {
            VersionStatus::UpdateAvailable
        } else {
            VersionStatus::NewerThanRelease
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VersionStatus::DevBuild => "dev build",
            VersionStatus::UpToDate => "up to date",
            VersionStatus::UpdateAvailable => "update available",
            VersionStatus::NewerThanRelease => "newer than release",
        }
    }

    /// CSS class of the status text
    pub fn class(self) -> &'static str {
        match self {
            VersionStatus::DevBuild => "text-muted",
            VersionStatus::UpToDate => "text-success",
            VersionStatus::UpdateAvailable => "text-warning",
            VersionStatus::NewerThanRelease => "text-info",
        }
    }
}

// --- Providers ---

pub fn provider_label(provider: &str) -> String {
    let known = match provider.to_ascii_lowercase().as_str() {
        "gemini" => "Gemini",
        "claude" => "Claude (Anthropic)",
        "codex" => "Codex (OpenAI)",
        "vertex" => "Vertex AI",
        "copilot" => "GitHub Copilot",
        "qwen" => "Qwen",
        "aistudio" => "AI Studio",
        "antigravity" => "Antigravity",
        "iflow" => "iFlow",
        "other" => "Other",
        _ => "",
    };
    if !known.is_empty() {
        return known.to_string();
    }

    let mut chars = provider.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Other".to_string(),
    }
}

/// Provider bucket of a catalog model, from its `type` or `owned_by`
pub fn model_provider(model: &ModelInfo) -> String {
    let raw = model
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .or(model.owned_by.as_deref().filter(|o| !o.is_empty()))
        .unwrap_or("other");

    let lower = raw.to_ascii_lowercase();
    let buckets: [(&[&str], &str); 9] = [
        (&["gemini", "google"], "gemini"),
        (&["claude", "anthropic"], "claude"),
        (&["codex", "openai"], "codex"),
        (&["vertex"], "vertex"),
        (&["qwen"], "qwen"),
        (&["copilot", "github"], "copilot"),
        (&["aistudio"], "aistudio"),
        (&["antigravity"], "antigravity"),
        (&["iflow"], "iflow"),
    ];
    buckets
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, bucket)| bucket.to_string())
        .unwrap_or_else(|| raw.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelGroup {
    pub provider: String,
    pub label: String,
    pub models: Vec<ModelEntry>,
}

/// Group catalog models by provider in the fixed display order; unknown
/// providers follow alphabetically
pub fn group_models(models: &[ModelInfo]) -> Vec<ModelGroup> {
    let mut groups: BTreeMap<String, Vec<ModelEntry>> = BTreeMap::new();
    for model in models {
        groups
            .entry(model_provider(model))
            .or_default()
            .push(ModelEntry {
                id: model.model_id().to_string(),
                display: model.display().to_string(),
            });
    }

    let rank: HashMap<&str, usize> = PROVIDER_ORDER
        .iter()
        .enumerate()
        .map(|(i, p)| (*p, i))
        .collect();

    let mut ordered: Vec<ModelGroup> = groups
        .into_iter()
        .map(|(provider, models)| ModelGroup {
            label: provider_label(&provider),
            provider,
            models,
        })
        .collect();
    ordered.sort_by_key(|g| rank.get(g.provider.as_str()).copied().unwrap_or(usize::MAX));
    ordered
}

// --- Form parsing ---

/// Non-empty trimmed lines
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `pattern=count` lines; non-positive counts are dropped
pub fn parse_quota_lines(text: &str) -> Result<BTreeMap<String, u64>, String> {
    let mut quotas = BTreeMap::new();
    for line in parse_lines(text) {
        let Some((pattern, count)) = line.rsplit_once('=') else {
            return Err(format!("Invalid quota line \"{line}\": expected model=count"));
        };
        let pattern = pattern.trim();
        let count: i64 = count
            .trim()
            .parse()
            .map_err(|_| format!("Invalid quota line \"{line}\": count must be a whole number"))?;
        if pattern.is_empty() {
            return Err(format!("Invalid quota line \"{line}\": missing model"));
        }
        if count > 0 {
            quotas.insert(pattern.to_string(), count as u64);
        }
    }
    Ok(quotas)
}

/// Inverse of [`parse_quota_lines`] for pre-filling the editor
pub fn quota_lines(quotas: &BTreeMap<String, u64>) -> String {
    quotas
        .iter()
        .map(|(pattern, count)| format!("{pattern}={count}"))
        .collect::<Vec<_>>()
        .join("\n")
}
