//! Query command

use crate::app::{OutputFormat, QueryArgs};
use crate::output;
use anyhow::Result;
use drugrag_core::{Config, Pipeline, QueryOptions};
use tokio_util::sync::CancellationToken;

pub async fn run(args: QueryArgs, config: Config, format: OutputFormat) -> Result<()> {
    let index = super::load_index(&args.snapshot, &config)?;
    let pipeline = Pipeline::from_config(&config, index)?;
    let query = pipeline.query(args.query.join(" "))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let options = QueryOptions {
        top_k: args.top_k,
        max_sub_questions: args.max_subqueries,
    };
    let outcome = pipeline.execute(&query, options, &cancel).await;
    let answer = outcome.result?;

    print!("{}", output::format_answer(query.text(), &answer, format)?);
    Ok(())
}
