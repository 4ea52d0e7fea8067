//! `file_write`: self-contained, real local filesystem
//! access via `tokio::fs`, mirroring [`super::file_read`].

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, _scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let path = require_str(&params, "path")?;
    let content = require_str(&params, "content")?;

    tokio::fs::write(path, content)
        .await
        .map_err(|e| CoreError::new(ErrorKind::ActionCrashed(e.to_string())).with_context(path.to_string()))?;

    let mut metadata = HashMap::new();
    metadata.insert("bytes_written".to_string(), serde_json::json!(content.len()));
    Ok(ok_with_metadata(format!("wrote {} bytes to {path}", content.len()), metadata))
}
