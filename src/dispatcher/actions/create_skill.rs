//! `create_skill`: self-contained. Writes a learned skill to
//! `name.skill` under [`crate::config::RuntimeConfig::skills_dir`],
//! mirroring [`super::file_write`]. Skill-file *loading* is out of scope —
//! this executor only ever produces the file; nothing in this crate
//! reads it back.

use std::collections::HashMap;

use crate::action::Params;
use crate::agent::stimulus::ActionOutcome;
use crate::dispatcher::actions::require_str;
use crate::dispatcher::{ok_with_metadata, DispatchScope};
use crate::error::{CoreError, ErrorKind};

pub async fn run(params: Params, scope: &DispatchScope) -> Result<ActionOutcome, CoreError> {
    let name = require_str(&params, "name")?;
    let content = require_str(&params, "content")?;

    let dir = &scope.env.config.skills_dir;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::new(ErrorKind::ActionCrashed(e.to_string())))?;

    let path = dir.join(format!("{name}.skill"));
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| {
            CoreError::new(ErrorKind::ActionCrashed(e.to_string()))
                .with_context(path.to_string_lossy().to_string())
        })?;

    let mut metadata = HashMap::new();
    metadata.insert("path".to_string(), serde_json::json!(path.to_string_lossy()));
    Ok(ok_with_metadata(format!("created skill '{name}'"), metadata))
}
