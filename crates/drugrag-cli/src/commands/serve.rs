//! Serve command

use crate::app::ServeArgs;
use anyhow::Result;
use drugrag_core::{Config, Pipeline};
use drugrag_http::AppState;
use std::sync::Arc;

pub async fn run(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let index = super::load_index(&args.snapshot, &config)?;
    let pipeline = Pipeline::from_config(&config, index)?;
    let state = AppState::new(Arc::new(pipeline));

    drugrag_http::start_server(state, &config.server).await
}
