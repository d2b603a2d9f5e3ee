use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Translation {
    #[default]
    Sub,
    Dub,
}

impl Translation {
    pub fn as_str(self) -> &'static str {
        match self {
            Translation::Sub => "sub",
            Translation::Dub => "dub",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Translation::Sub => "Sub",
            Translation::Dub => "Dub",
        }
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browse ordering, sent to AllAnime as `search.sortBy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    #[default]
    Recent,
    Top,
    NameAsc,
    NameDesc,
}

impl SortKey {
    pub fn as_api_str(self) -> &'static str {
        match self {
            SortKey::Recent => "Recent",
            SortKey::Top => "Top",
            SortKey::NameAsc => "Name_ASC",
            SortKey::NameDesc => "Name_DESC",
        }
    }
}

pub const QUALITY_PRESETS: &[&str] = &["best", "1080p", "720p", "480p", "360p", "worst"];

/// One row of a search or browse page. Also the shape persisted in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// 1-based rank within the page it came from. Not stable across calls.
    pub index: usize,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub episodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
}

impl ResultRecord {
    pub fn label(&self) -> String {
        format!("{} ({} eps)", self.title, self.episodes)
    }
}

pub type LibraryEntry = ResultRecord;

/// Numeric labels ascend by value; anything else goes after them, lexicographically.
pub fn compare_episode_labels(left: &str, right: &str) -> Ordering {
    match (parse_episode_key(left), parse_episode_key(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

fn parse_episode_key(label: &str) -> Option<f64> {
    label.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn sorted_episode_labels(episodes: Vec<String>) -> Vec<String> {
    let mut sorted = episodes;
    sorted.sort_by(|a, b| compare_episode_labels(a, b));
    sorted.dedup();
    sorted
}

/// Label after `current` in an already sorted list.
pub fn next_episode_label(current: &str, sorted: &[String]) -> Option<String> {
    let pos = sorted.iter().position(|ep| ep == current)?;
    sorted.get(pos + 1).cloned()
}
