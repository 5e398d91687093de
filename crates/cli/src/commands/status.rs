//! `memoria status`: show configuration and storage status.

use super::{CmdResult, has_credentials};
use memoria_config::AppConfig;
use memoria_core::provider::Provider;

/// How many model ids the provider probe prints.
const MODELS_SHOWN: usize = 5;

pub async fn run(config: &AppConfig, check: bool) -> CmdResult {
    println!("🌹 Memoria Status");
    println!("=================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Companion:    {}", config.agent.name);
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!("  API key:      {}", if config.has_api_key() { "configured" } else { "missing" });
    println!("  Memory:       {}", config.memory.backend);
    if config.memory.backend == "sqlite" {
        let db_path = config.memory.resolved_database_path();
        let state = if db_path.exists() { "" } else { " (not created yet)" };
        println!("  Database:     {}{state}", db_path.display());
    }
    println!("  Window:       {} rounds", config.memory.max_short_term_rounds);
    println!("  Consolidate:  every {} rounds", config.memory.update_interval);
    println!("  Log level:    {}{}", config.logging.level, if config.logging.json { " (json)" } else { "" });

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file, run `memoria onboard` first");
    }

    if check {
        println!();
        if !has_credentials(config) {
            println!("  ⏭️  Provider check skipped: no API key for {}", config.default_provider);
            return Ok(());
        }
        let router = memoria_providers::build_from_config(config);
        let provider = router.default().ok_or("No default provider configured")?;
        println!("  {}", probe(provider.as_ref()).await);
    }

    Ok(())
}

/// One status line describing whether the provider answers.
async fn probe(provider: &dyn Provider) -> String {
    match provider.health_check().await {
        Ok(true) => {
            let models = provider.list_models().await.unwrap_or_default();
            if models.is_empty() {
                format!("✅ {} reachable", provider.name())
            } else {
                let shown: Vec<&str> = models.iter().take(MODELS_SHOWN).map(String::as_str).collect();
                format!("✅ {} reachable, {} models ({})", provider.name(), models.len(), shown.join(", "))
            }
        }
        Ok(false) => format!("❌ {} rejected the request (check the API key)", provider.name()),
        Err(e) => format!("❌ {} unreachable: {e}", provider.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::error::ProviderError;
    use memoria_core::provider::{ProviderRequest, ProviderResponse};

    struct Probe {
        healthy: Result<bool, ProviderError>,
        models: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Provider for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::EmptyResponse)
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(self.models.clone())
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            self.healthy.clone()
        }
    }

    #[tokio::test]
    async fn probe_lists_a_few_models() {
        let models = (1..=7).map(|i| format!("m{i}")).collect();
        let line = probe(&Probe { healthy: Ok(true), models }).await;
        assert!(line.contains("7 models"));
        assert!(line.contains("m5"));
        assert!(!line.contains("m6"));
    }

    #[tokio::test]
    async fn probe_reports_unreachable_provider() {
        let line = probe(&Probe {
            healthy: Err(ProviderError::Network("connection refused".into())),
            models: Vec::new(),
        })
        .await;
        assert!(line.contains("unreachable"));
        assert!(line.contains("connection refused"));
    }
}
