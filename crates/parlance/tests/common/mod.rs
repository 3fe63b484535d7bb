//! Shared test setup.

use std::sync::Arc;

use axum::Router;

use parlance::agent::{AgentRunner, ScriptedAgent};
use parlance::api::{create_router, AppState};
use parlance::db::Database;
use parlance::prompt::PromptComposer;

/// Router backed by an in-memory database and a short scripted run.
pub async fn test_app() -> Router {
    test_app_with(ScriptedAgent::text_run(&["Hello ", "world"])).await
}

/// Router with a custom agent runner.
pub async fn test_app_with(runner: impl AgentRunner + 'static) -> Router {
    let db = Database::in_memory().await.expect("in-memory database");
    let state = AppState::new(
        db,
        Arc::new(runner),
        Arc::new(PromptComposer::with_defaults()),
    );
    create_router(state)
}
