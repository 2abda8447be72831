//! Partially-optional schema for analysis operation bodies.
//!
//! Every field is optional and tolerant: a field that is absent *or* has an unexpected shape
//! deserializes to `None` instead of failing the whole document. Lists degrade per element, so
//! one malformed page or line becomes an empty default without hiding its neighbours. Callers
//! then apply a single "not present means default" rule per field.

use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer};
use serde_json::Value;

/// Top-level body returned by the status endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOperation {
    /// Job status string (`notStarted`, `running`, `succeeded`, `failed`).
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    /// Service-side error details for failed jobs.
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<OperationError>,
    /// Analysis output, present once the job succeeded.
    #[serde(default, deserialize_with = "lenient")]
    pub analyze_result: Option<AnalyzeResult>,
}

/// Error object attached to failed jobs.
#[derive(Debug, Default, Deserialize)]
pub struct OperationError {
    /// Machine-readable code.
    #[serde(default, deserialize_with = "lenient")]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
}

impl OperationError {
    /// Best available description of the failure.
    pub fn reason(&self) -> Option<String> {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message.clone()),
            (Some(code), None) => Some(code.clone()),
            (None, None) => None,
        }
    }
}

/// Layout analysis output.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// Pages in document order.
    #[serde(default, deserialize_with = "lenient_list")]
    pub pages: Option<Vec<Page>>,
    /// Document type detected by the model.
    #[serde(default, deserialize_with = "lenient_text")]
    pub doc_type: Option<String>,
    /// Creation timestamp reported by the service.
    #[serde(default, deserialize_with = "lenient_text")]
    pub created_date_time: Option<String>,
}

/// One analyzed page.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    /// Text lines in reading order.
    #[serde(default, deserialize_with = "lenient_list")]
    pub lines: Option<Vec<Line>>,
}

/// One text line.
#[derive(Debug, Default, Deserialize)]
pub struct Line {
    /// Line text.
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: Option<String>,
}

/// Accept any JSON value and keep it only when it matches `T`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Keep an array, replacing each element that does not match `T` with `T::default()`.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    })
}

/// Like [`lenient`] but renders numbers and booleans as text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}
