//! System prompt composition.
//!
//! The prompt fed to the agent is recomputed at the start of every run so
//! resumed conversations pick up current instructions, the user's profile,
//! and whatever the memory source retrieved since the last turn.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// Default base instructions for the assistant.
const DEFAULT_BASE_PROMPT: &str = "You are a helpful assistant. Answer concisely, \
use markdown for structure, and call tools when they would improve the answer.";

/// Retrieves remembered context for a user.
#[async_trait]
pub trait MemorySource: Send + Sync {
    async fn recall(&self, user_id: &str) -> Result<String>;
}

/// Memory source that remembers nothing.
#[derive(Debug, Default, Clone)]
pub struct NoMemory;

#[async_trait]
impl MemorySource for NoMemory {
    async fn recall(&self, _user_id: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Computes the current system prompt text for a user.
#[async_trait]
pub trait SystemPromptSource: Send + Sync {
    async fn system_prompt(&self, user_id: &str) -> Result<String>;
}

/// Composes the base instructions, the user profile line, and retrieved
/// memory into one prompt.
pub struct PromptComposer {
    base: String,
    memory: Arc<dyn MemorySource>,
}

impl PromptComposer {
    pub fn new(base: impl Into<String>, memory: Arc<dyn MemorySource>) -> Self {
        Self {
            base: base.into(),
            memory,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BASE_PROMPT, Arc::new(NoMemory))
    }
}

#[async_trait]
impl SystemPromptSource for PromptComposer {
    async fn system_prompt(&self, user_id: &str) -> Result<String> {
        let mut prompt = self.base.clone();
        prompt.push_str(&format!("\n\nYou are assisting user \"{user_id}\"."));

        let memory = self.memory.recall(user_id).await?;
        if !memory.is_empty() {
            prompt.push_str("\n\nRemembered context:\n");
            prompt.push_str(&memory);
        }

        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMemory(String);

    #[async_trait]
    impl MemorySource for FixedMemory {
        async fn recall(&self, _user_id: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_prompt_includes_user_and_memory() {
        let composer = PromptComposer::new(
            "Base.",
            Arc::new(FixedMemory("Likes trains.".to_string())),
        );
        let prompt = composer.system_prompt("alice").await.unwrap();
        assert!(prompt.starts_with("Base."));
        assert!(prompt.contains("alice"));
        assert!(prompt.contains("Likes trains."));
    }

    #[tokio::test]
    async fn test_empty_memory_is_omitted() {
        let composer = PromptComposer::with_defaults();
        let prompt = composer.system_prompt("bob").await.unwrap();
        assert!(!prompt.contains("Remembered context"));
    }
}
