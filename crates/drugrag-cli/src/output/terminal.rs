//! Terminal output formatter

use drugrag_core::{Config, FinalAnswer, SnapshotInfo, SubAnswerStatus};
use std::path::Path;

pub fn format_answer(answer: &FinalAnswer) -> String {
    let mut output = format!("{}\n", answer.text);

    if answer.sub_answers.len() > 1 {
        output.push_str("\nSub-questions:\n");
        for sub in &answer.sub_answers {
            let marker = match sub.status {
                SubAnswerStatus::Grounded => "ok",
                SubAnswerStatus::Ungrounded => "no evidence",
                SubAnswerStatus::Failed { .. } => "failed",
            };
            output.push_str(&format!("  {}. [{}] {}\n", sub.ordinal + 1, marker, sub.question));
        }
    }

    let evidence = answer.evidence();
    if !evidence.is_empty() {
        let ids: Vec<&str> = evidence.iter().map(|id| id.as_str()).collect();
        output.push_str(&format!("\nSources: {}\n", ids.join(", ")));
    }

    output
}

pub fn format_status(path: &Path, info: &SnapshotInfo, config: &Config) -> String {
    let mut output = String::new();
    output.push_str(&format!("Snapshot:        {}\n", path.display()));
    output.push_str(&format!("Chunks:          {}\n", info.chunk_count));
    output.push_str(&format!("Documents:       {}\n", info.document_count));
    output.push_str(&format!("Dimensions:      {}\n", info.dimensions));
    output.push_str(&format!(
        "Embedding model: {}\n",
        info.embedding_model.as_deref().unwrap_or("unknown")
    ));
    if let Some(ref model) = info.embedding_model {
        if *model != config.llm_service.embedding_model {
            output.push_str(&format!(
                "\nWarning: configured embedding model is {}\n",
                config.llm_service.embedding_model
            ));
        }
    }
    output
}
