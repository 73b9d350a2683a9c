//! Task DTOs for starting and polling backend jobs

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::job::{JobKind, JobStatus, JobStatusSnapshot, Progress};

/// Response fields that carry an asynchronous job handle, in lookup order
pub const HANDLE_FIELDS: [&str; 2] = ["task_id", "upload_log_id"];

/// Request to start an operation on a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOperation {
    /// Resource path segment (e.g. "cierres", "libros-remuneraciones")
    pub resource: String,
    pub entity_id: i64,
    /// Operation fragment, sent as `start-{operation}`
    pub operation: String,
    pub kind: JobKind,
    /// Operation-specific options sent as the JSON body
    #[serde(default)]
    pub options: Option<JsonValue>,
}

/// Classified response of an initiating call
#[derive(Debug, Clone, PartialEq)]
pub enum StartResponse {
    /// Backend answered synchronously; nothing to poll
    Completed(JsonValue),
    /// Backend started an asynchronous job
    Accepted { task_id: String },
}

impl StartResponse {
    /// Classifies an initiating response body
    ///
    /// A `task_id` or `upload_log_id` (string or number) marks an asynchronous
    /// job. Any other JSON object is a synchronous result. Anything else is an
    /// unexpected shape.
    pub fn classify(body: JsonValue) -> Result<Self, String> {
        let object = match body.as_object() {
            Some(object) => object,
            None => return Err(format!("expected a JSON object, got {}", type_name(&body))),
        };

        for field in HANDLE_FIELDS {
            match object.get(field) {
                None | Some(JsonValue::Null) => continue,
                Some(JsonValue::String(id)) if !id.trim().is_empty() => {
                    return Ok(StartResponse::Accepted {
                        task_id: id.trim().to_string(),
                    });
                }
                Some(JsonValue::Number(id)) => {
                    return Ok(StartResponse::Accepted {
                        task_id: id.to_string(),
                    });
                }
                Some(other) => {
                    return Err(format!("field `{}` has unexpected value {}", field, other));
                }
            }
        }

        Ok(StartResponse::Completed(body))
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Body of `GET /{resource}/{id}/task-status/{task_id}/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<TaskStatusResponse> for JobStatusSnapshot {
    fn from(response: TaskStatusResponse) -> Self {
        JobStatusSnapshot {
            status: response.status,
            progress: response.progress,
            result: response.result,
            error: response.error,
        }
        .normalized()
    }
}
