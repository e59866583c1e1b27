use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

/// Mood is a 1..=5 ordinal; 0 means the user never set it.
pub const MOOD_UNSET: i64 = 0;
pub const MOOD_MIN: i64 = 1;
pub const MOOD_MAX: i64 = 5;

/// A dream as the store hands it out: decoded lists, boolean flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DreamEntry {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub date: String,
    pub mood: i64,
    pub is_lucid: bool,
    pub is_nightmare: bool,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub interpretation: String,
}

/// Field values for an entry that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DreamDraft {
    pub title: String,
    pub body: String,
    pub date: String,
    pub mood: i64,
    pub is_lucid: bool,
    pub is_nightmare: bool,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub interpretation: String,
}

impl DreamDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_entry(self, id: i64) -> DreamEntry {
        DreamEntry {
            id,
            title: self.title,
            body: self.body,
            date: self.date,
            mood: self.mood,
            is_lucid: self.is_lucid,
            is_nightmare: self.is_nightmare,
            tags: self.tags,
            images: self.images,
            interpretation: self.interpretation,
        }
    }
}

impl DreamEntry {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// The mood when it is on the 1..=5 scale.
    pub fn mood(&self) -> Option<i64> {
        (MOOD_MIN..=MOOD_MAX).contains(&self.mood).then_some(self.mood)
    }

    pub fn to_draft(&self) -> DreamDraft {
        DreamDraft {
            title: self.title.clone(),
            body: self.body.clone(),
            date: self.date.clone(),
            mood: self.mood,
            is_lucid: self.is_lucid,
            is_nightmare: self.is_nightmare,
            tags: self.tags.clone(),
            images: self.images.clone(),
            interpretation: self.interpretation.clone(),
        }
    }
}

/// Display form written to exports: stored fields plus view conveniences.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DisplayEntry<'a> {
    id: i64,
    title: &'a str,
    body: &'a str,
    date: &'a str,
    mood: i64,
    is_lucid: bool,
    is_nightmare: bool,
    tags: &'a [String],
    images: &'a [String],
    interpretation: &'a str,
    has_images: bool,
    image_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<&'a str>,
}

impl Serialize for DreamEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DisplayEntry {
            id: self.id,
            title: &self.title,
            body: &self.body,
            date: &self.date,
            mood: self.mood,
            is_lucid: self.is_lucid,
            is_nightmare: self.is_nightmare,
            tags: &self.tags,
            images: &self.images,
            interpretation: &self.interpretation,
            has_images: self.has_images(),
            image_count: self.image_count(),
            thumbnail: self.thumbnail(),
        }
        .serialize(serializer)
    }
}

/// Encode a string list for a TEXT column.
pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| String::from("[]"))
}

/// Decode a TEXT column into a string list. Anything unreadable becomes empty.
pub fn decode_list(raw: Option<&str>, column: &'static str, id: i64) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(items) => items,
        Err(err) => {
            warn!(
                target: "dream_journal",
                event = "list_decode_failed",
                column,
                id,
                error = %err
            );
            Vec::new()
        }
    }
}

pub fn bool_to_flag(value: bool) -> i64 {
    i64::from(value)
}
