use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::model::DreamEntry;

/// Aggregate figures for the insights view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamStats {
    pub total: usize,
    pub lucid: usize,
    pub nightmares: usize,
    pub total_images: usize,
    /// Mean of the moods that are set; `None` when no entry has one.
    pub average_mood: Option<f64>,
}

impl DreamStats {
    pub fn from_entries(entries: &[DreamEntry]) -> Self {
        let moods: Vec<i64> = entries.iter().filter_map(DreamEntry::mood).collect();
        let average_mood = if moods.is_empty() {
            None
        } else {
            Some(moods.iter().sum::<i64>() as f64 / moods.len() as f64)
        };

        Self {
            total: entries.len(),
            lucid: entries.iter().filter(|e| e.is_lucid).count(),
            nightmares: entries.iter().filter(|e| e.is_nightmare).count(),
            total_images: entries.iter().map(DreamEntry::image_count).sum(),
            average_mood,
        }
    }
}

/// The filter chips on the journal list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DreamFilter {
    #[default]
    All,
    Lucid,
    Nightmare,
    Images,
}

impl DreamFilter {
    fn matches(self, entry: &DreamEntry) -> bool {
        match self {
            DreamFilter::All => true,
            DreamFilter::Lucid => entry.is_lucid,
            DreamFilter::Nightmare => entry.is_nightmare,
            DreamFilter::Images => entry.has_images(),
        }
    }
}

impl FromStr for DreamFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DreamFilter::All),
            "lucid" => Ok(DreamFilter::Lucid),
            "nightmare" | "nightmares" => Ok(DreamFilter::Nightmare),
            "images" => Ok(DreamFilter::Images),
            other => Err(format!("unknown filter: {other}")),
        }
    }
}

impl fmt::Display for DreamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DreamFilter::All => "all",
            DreamFilter::Lucid => "lucid",
            DreamFilter::Nightmare => "nightmare",
            DreamFilter::Images => "images",
        };
        f.write_str(name)
    }
}

/// Entries whose title or body contains `query` (case-insensitive) and that
/// pass `filter`, in mirror order.
pub fn search<'a>(entries: &'a [DreamEntry], query: &str, filter: DreamFilter) -> Vec<&'a DreamEntry> {
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|e| {
            needle.is_empty()
                || e.title.to_lowercase().contains(&needle)
                || e.body.to_lowercase().contains(&needle)
        })
        .filter(|e| filter.matches(e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DreamDraft;

    fn entry(id: i64, title: &str, mood: i64, lucid: bool, images: usize) -> DreamEntry {
        DreamDraft {
            title: title.into(),
            body: format!("body of {title}"),
            mood,
            is_lucid: lucid,
            is_nightmare: !lucid,
            images: (0..images).map(|i| format!("/img/{id}-{i}.png")).collect(),
            ..DreamDraft::default()
        }
        .into_entry(id)
    }

    #[test]
    fn unset_moods_are_excluded_from_average() {
        let entries = vec![
            entry(1, "a", 4, true, 0),
            entry(2, "b", 0, false, 2),
            entry(3, "c", 2, true, 1),
        ];
        let stats = DreamStats::from_entries(&entries);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.lucid, 2);
        assert_eq!(stats.nightmares, 1);
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.average_mood, Some(3.0));
    }

    #[test]
    fn average_is_none_without_moods() {
        let stats = DreamStats::from_entries(&[entry(1, "a", 0, false, 0)]);
        assert_eq!(stats.average_mood, None);
        assert_eq!(DreamStats::from_entries(&[]).total, 0);
    }

    #[test]
    fn search_matches_title_or_body_case_insensitively() {
        let entries = vec![
            entry(1, "Flying high", 0, true, 0),
            entry(2, "Falling", 0, false, 1),
        ];
        let hits = search(&entries, "FLY", DreamFilter::All);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        let by_body = search(&entries, "body of falling", DreamFilter::All);
        assert_eq!(by_body[0].id, 2);
    }

    #[test]
    fn filter_chips_combine_with_query() {
        let entries = vec![
            entry(1, "Flying high", 0, true, 0),
            entry(2, "Falling", 0, false, 1),
        ];
        assert_eq!(search(&entries, "", DreamFilter::Lucid).len(), 1);
        assert_eq!(search(&entries, "", DreamFilter::Images)[0].id, 2);
        assert!(search(&entries, "flying", DreamFilter::Nightmare).is_empty());
    }

    #[test]
    fn filter_parses_from_cli_names() {
        assert_eq!("Lucid".parse::<DreamFilter>(), Ok(DreamFilter::Lucid));
        assert!("sleepy".parse::<DreamFilter>().is_err());
    }
}
