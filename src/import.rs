//! Validation of loosely-typed import records (plain JSON exports and
//! restored backups) into [`DreamDraft`]s.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{decode_list, DreamDraft, MOOD_MAX, MOOD_MIN, MOOD_UNSET};
use crate::AppError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import payload is not valid JSON: {0}")]
    Unparseable(#[from] serde_json::Error),
    #[error("import payload must be a list of dreams, found {0}")]
    NotAList(&'static str),
}

impl From<ImportError> for AppError {
    fn from(error: ImportError) -> Self {
        match error {
            ImportError::Unparseable(err) => {
                AppError::new("IMPORT/UNPARSEABLE", "Invalid backup file.").with_cause(err)
            }
            ImportError::NotAList(kind) => {
                AppError::new("IMPORT/NOT_A_LIST", "Invalid backup file.")
                    .with_context("found", kind)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("record is not an object")]
    NotAnObject,
    #[error("record has no usable title")]
    MissingTitle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: RejectReason,
}

/// Outcome of validating a whole batch.
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub accepted: Vec<DreamDraft>,
    pub skipped: Vec<SkippedRecord>,
}

pub fn parse_text(text: &str) -> Result<ImportPlan, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    plan(&value)
}

/// Validate every record of a batch. Only a non-list payload fails as a whole.
pub fn plan(raw: &Value) -> Result<ImportPlan, ImportError> {
    let records = raw.as_array().ok_or(ImportError::NotAList(kind_of(raw)))?;
    let mut plan = ImportPlan::default();
    for (index, record) in records.iter().enumerate() {
        match parse_record(record) {
            Ok(draft) => plan.accepted.push(draft),
            Err(reason) => plan.skipped.push(SkippedRecord { index, reason }),
        }
    }
    Ok(plan)
}

/// Validate a single candidate. Ids in the record are ignored.
pub fn parse_record(record: &Value) -> Result<DreamDraft, RejectReason> {
    let obj = record.as_object().ok_or(RejectReason::NotAnObject)?;
    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or(RejectReason::MissingTitle)?;

    Ok(DreamDraft {
        title: title.to_string(),
        body: string_field(obj, "body"),
        date: string_field(obj, "date"),
        mood: mood_field(obj),
        is_lucid: flag_field(obj, "isLucid"),
        is_nightmare: flag_field(obj, "isNightmare"),
        tags: list_field(obj, "tags"),
        images: list_field(obj, "images"),
        interpretation: string_field(obj, "interpretation"),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn mood_field(obj: &Map<String, Value>) -> i64 {
    let mood = match obj.get("mood") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(MOOD_UNSET),
        _ => MOOD_UNSET,
    };
    if (MOOD_MIN..=MOOD_MAX).contains(&mood) {
        mood
    } else {
        MOOD_UNSET
    }
}

fn flag_field(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn list_field(obj: &Map<String, Value>, key: &'static str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        // Raw database rows carry the encoded list text.
        Some(Value::String(encoded)) => decode_list(Some(encoded), key, 0),
        _ => Vec::new(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
