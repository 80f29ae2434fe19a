//! JSON output formatter

use anyhow::Result;
use drugrag_core::{FinalAnswer, SnapshotInfo};
use serde_json::json;
use std::path::Path;

pub fn format_answer(query: &str, answer: &FinalAnswer) -> Result<String> {
    let value = json!({
        "query": query,
        "query_id": answer.query_id,
        "final_answer": answer.text,
        "sub_answers": answer.sub_answers,
    });
    Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
}

pub fn format_status(path: &Path, info: &SnapshotInfo) -> Result<String> {
    let mut value = serde_json::to_value(info)?;
    value["snapshot"] = json!(path.display().to_string());
    Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
}
