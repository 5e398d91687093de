//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod memory;
pub mod onboard;
pub mod status;

use memoria_config::AppConfig;
use memoria_core::memory::{MemoryStore, UserId};
use memoria_memory::{InMemoryStore, MemoryRoom, SqliteStore};
use std::sync::Arc;
use tracing::debug;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Providers reachable without an API key.
const KEYLESS_PROVIDERS: [&str; 4] = ["ollama", "vllm", "llamacpp", "llama.cpp"];

/// Whether the default provider can be called at all.
pub fn has_credentials(config: &AppConfig) -> bool {
    let has_provider_key = config
        .providers
        .get(&config.default_provider)
        .is_some_and(|p| p.api_key.is_some());
    config.has_api_key() || has_provider_key || KEYLESS_PROVIDERS.contains(&config.default_provider.as_str())
}

/// Open the configured store backend.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn MemoryStore>, Box<dyn std::error::Error>> {
    match config.memory.backend.as_str() {
        "in_memory" => {
            debug!("Using in-memory store; nothing will persist");
            Ok(Arc::new(InMemoryStore::new()))
        }
        _ => {
            let path = config.memory.resolved_database_path();
            let store = SqliteStore::open(&path)
                .await
                .map_err(|e| format!("Failed to open memory database {}: {e}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

pub async fn open_room(config: &AppConfig) -> Result<Arc<MemoryRoom>, Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    Ok(Arc::new(MemoryRoom::new(store, config.memory.max_short_term_rounds)))
}

pub fn parse_user(raw: &str) -> Result<UserId, String> {
    let user = UserId::from(raw.trim());
    if user.is_empty() {
        return Err("User id must not be empty (use --user or MEMORIA_USER)".into());
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_is_rejected() {
        assert!(parse_user("   ").is_err());
        assert_eq!(parse_user(" ming ").unwrap().as_str(), "ming");
    }

    #[test]
    fn local_providers_need_no_key() {
        let mut config = AppConfig::default();
        config.api_key = None;
        config.default_provider = "ollama".into();
        assert!(has_credentials(&config));
    }

    #[tokio::test]
    async fn in_memory_backend_opens_without_disk() {
        let mut config = AppConfig::default();
        config.memory.backend = "in_memory".into();
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "in_memory");
        assert_eq!(store.location(), None);
    }

    #[tokio::test]
    async fn sqlite_backend_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.sqlite");
        let mut config = AppConfig::default();
        config.memory.database_path = Some(path.display().to_string());
        config.memory.max_short_term_rounds = 4;

        let room = open_room(&config).await.unwrap();
        assert_eq!(room.backend_name(), "sqlite");
        assert_eq!(room.max_rounds(), 4);
        assert_eq!(room.location(), Some(path.display().to_string().as_str()));
        assert!(path.exists());
    }
}
