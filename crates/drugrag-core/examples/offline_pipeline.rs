// Offline pipeline example: a tiny drug corpus answered by the mock client

use drugrag_core::index::{build_index, ChunkDraft};
use drugrag_core::{
    ChunkId, HttpEmbedder, LLMServiceConfig, MockLLMClient, Pipeline, PipelineConfig, SourceRef,
};
use std::sync::Arc;

const DIMS: usize = 128;

const PASSAGES: &[(&str, &str, &str)] = &[
    (
        "DB01050",
        "Ibuprofen",
        "Ibuprofen is an NSAID. It may reduce the cardioprotective effect of low-dose aspirin.",
    ),
    (
        "DB00682",
        "Warfarin",
        "Warfarin is an anticoagulant. NSAIDs such as ibuprofen increase its bleeding risk.",
    ),
    (
        "DB00331",
        "Metformin",
        "Metformin is a first-line treatment for type 2 diabetes.",
    ),
];

#[tokio::main]
async fn main() -> drugrag_core::Result<()> {
    println!("DrugRAG Offline Pipeline Example\n");

    let client = Arc::new(MockLLMClient::new(DIMS).with_chat(|model, messages| {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        if model == "decompose" {
            return Ok("What does ibuprofen interact with?\nWhat does warfarin interact with?".into());
        }
        if prompt.contains("Combine these") {
            return Ok("Ibuprofen raises the bleeding risk of warfarin; avoid combining them.".into());
        }
        Ok(format!(
            "Based on {} retrieved passage(s), see the cited chunks.",
            prompt.matches("DB0").count()
        ))
    }));
    let embedder = Arc::new(HttpEmbedder::new(client.clone(), "mock", DIMS, 8191));

    println!("Indexing {} passages...", PASSAGES.len());
    let drafts = PASSAGES
        .iter()
        .map(|(id, name, text)| ChunkDraft {
            id: ChunkId::new(format!("{}#0", id)),
            text: text.to_string(),
            source: SourceRef {
                document_id: id.to_string(),
                title: Some(name.to_string()),
            },
            range: 0..text.len(),
        })
        .collect();
    let index = Arc::new(build_index(drafts, embedder.as_ref(), 8).await?);

    let service = LLMServiceConfig {
        decompose_model: "decompose".to_string(),
        answer_model: "answer".to_string(),
        ..LLMServiceConfig::default()
    };
    let pipeline = Pipeline::new(client, embedder, index, &service, PipelineConfig::default())?;

    let question = "What are the interactions between ibuprofen and warfarin?";
    println!("Question: {}\n", question);
    let answer = pipeline.answer(question).await?;

    for sub in &answer.sub_answers {
        println!("  [{}] {}", sub.ordinal, sub.question);
        println!("      {}", sub.text);
        let cited: Vec<&str> = sub.evidence.iter().map(|id| id.as_str()).collect();
        println!("      evidence: {}", cited.join(", "));
    }
    println!("\nFinal answer:\n{}", answer.text);

    Ok(())
}
