//! Task-related API endpoints

use std::path::Path;

use cierre_core::domain::job::{JobHandle, JobStatusSnapshot};
use cierre_core::dto::task::{StartOperation, StartResponse, TaskStatusResponse};
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::CierreClient;
use crate::error::{ClientError, Result};

/// File extensions the backend accepts for uploads
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

/// Multipart field carrying the uploaded file
const UPLOAD_FIELD: &str = "archivo";

impl CierreClient {
    // =============================================================================
    // Job Initiation
    // =============================================================================

    /// Start an operation on a resource
    ///
    /// Sends `POST /{resource}/{id}/start-{operation}/` with the operation
    /// options as JSON body and classifies the answer.
    ///
    /// # Example
    /// ```no_run
    /// # use cierre_client::CierreClient;
    /// # use cierre_core::domain::job::JobKind;
    /// # use cierre_core::dto::task::StartOperation;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = CierreClient::new("http://localhost:8000/api");
    /// let response = client.start_operation(&StartOperation {
    ///     resource: "cierres".to_string(),
    ///     entity_id: 12,
    ///     operation: "verificacion".to_string(),
    ///     kind: JobKind::Verification,
    ///     options: None,
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start_operation(&self, req: &StartOperation) -> Result<StartResponse> {
        let url = self.url(&format!(
            "{}/{}/start-{}",
            req.resource,
            req.entity_id,
            req.operation.trim_start_matches("start-")
        ));
        debug!("POST {}", url);

        let body = req
            .options
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        let body: serde_json::Value = self.handle_response(response).await?;
        StartResponse::classify(body).map_err(ClientError::ParseError)
    }

    /// Upload a spreadsheet to a resource
    ///
    /// Sends `POST /{resource}/{id}/upload/` as multipart form data. Files with
    /// an extension outside [`ACCEPTED_EXTENSIONS`] are rejected before any
    /// request is made.
    pub async fn upload_file(
        &self,
        resource: &str,
        entity_id: i64,
        path: &Path,
    ) -> Result<StartResponse> {
        let file_name = validate_upload_path(path)?;
        let bytes = tokio::fs::read(path).await?;

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime_for(&file_name))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let url = self.url(&format!("{}/{}/upload", resource, entity_id));
        debug!("POST {} ({})", url, file_name);

        let response = self
            .authorized(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;

        let body: serde_json::Value = self.handle_response(response).await?;
        StartResponse::classify(body).map_err(ClientError::ParseError)
    }

    // =============================================================================
    // Job Status
    // =============================================================================

    /// Fetch one status snapshot of a job
    ///
    /// Sends `GET /{resource}/{id}/task-status/{task_id}/`.
    pub async fn task_status(&self, handle: &JobHandle) -> Result<JobStatusSnapshot> {
        let url = self.url(&format!(
            "{}/{}/task-status/{}",
            handle.resource, handle.owner_entity_id, handle.task_id
        ));
        let response = self.authorized(self.client.get(&url)).send().await?;

        let body: TaskStatusResponse = self.handle_response(response).await?;
        Ok(body.into())
    }
}

/// Returns the file name if the path has an accepted spreadsheet extension
fn validate_upload_path(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::InvalidRequest(format!("{} is not a file", path.display())))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ClientError::InvalidRequest(format!(
            "{} must be one of: {}",
            file_name,
            ACCEPTED_EXTENSIONS.join(", ")
        )));
    }

    Ok(file_name.to_string())
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".xls") {
        "application/vnd.ms-excel"
    } else {
        "text/csv"
    }
}
