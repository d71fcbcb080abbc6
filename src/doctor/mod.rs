//! Doctor command for system diagnostics
//!
//! Checks each configured backend independently so one failure does not
//! hide the state of the others.

use colored::Colorize;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::llm::{LanguageModel, LanguageModelBackend};
use crate::vector_store::{VectorStore, VectorStoreBackend};

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    config: Config,
}

impl Doctor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = vec![self.check_config()];
        checks.push(self.check_embedding().await);
        checks.push(self.check_vector_store().await);
        checks.extend(self.check_language_models().await);
        checks
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.network.request_timeout_secs)
    }

    fn check_config(&self) -> HealthCheck {
        match self.config.validate() {
            Ok(()) => HealthCheck::new("Configuration", HealthStatus::Pass),
            Err(e) => HealthCheck::new("Configuration", HealthStatus::Fail(e.to_string())),
        }
    }

    async fn check_embedding(&self) -> HealthCheck {
        let name = "Embedding provider";
        let embedder = match Embedder::from_config(&self.config.embedding, self.timeout()) {
            Ok(embedder) => embedder,
            Err(e) => return HealthCheck::new(name, HealthStatus::Fail(e.to_string())),
        };

        match embedder.embed_query("health check").await {
            Ok(vector) if vector.len() == embedder.dimensions() => {
                HealthCheck::new(name, HealthStatus::Pass)
            }
            Ok(vector) => HealthCheck::new(
                name,
                HealthStatus::Fail(format!(
                    "{} returned {} dimensions, expected {}",
                    embedder.model_name(),
                    vector.len(),
                    embedder.dimensions()
                )),
            ),
            Err(e) => HealthCheck::new(name, HealthStatus::Fail(e.to_string())),
        }
    }

    async fn check_vector_store(&self) -> HealthCheck {
        let name = "Vector store";
        let store = match VectorStoreBackend::from_config(&self.config.vector_store) {
            Ok(store) => store,
            Err(e) => return HealthCheck::new(name, HealthStatus::Fail(e.to_string())),
        };

        if matches!(store, VectorStoreBackend::Memory(_)) {
            return HealthCheck::new(
                name,
                HealthStatus::Warn("in-memory store; nothing is persisted".to_string()),
            );
        }

        match store.initialize().await {
            Ok(()) => HealthCheck::new(name, HealthStatus::Pass),
            Err(e) => HealthCheck::new(name, HealthStatus::Fail(e.to_string())),
        }
    }

    async fn check_language_models(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::new();
        for backend in &self.config.llm.backends {
            let llm = match LanguageModelBackend::from_config(backend, self.timeout()) {
                Ok(llm) => llm,
                Err(e) => {
                    checks.push(HealthCheck::new(
                        "Language model",
                        HealthStatus::Fail(e.to_string()),
                    ));
                    continue;
                }
            };

            let name = format!("LLM {}", llm.model());
            if !llm.is_available().await {
                checks.push(HealthCheck::new(
                    name,
                    HealthStatus::Fail(format!("{} not reachable", llm.name())),
                ));
                continue;
            }

            let LanguageModelBackend::Ollama(ollama) = &llm;
            let status = match ollama.list_models().await {
                Ok(models) if models.iter().any(|m| m == llm.model()) => HealthStatus::Pass,
                Ok(_) => HealthStatus::Warn(format!(
                    "model not installed; run: ollama pull {}",
                    llm.model()
                )),
                Err(e) => HealthStatus::Warn(format!("cannot list models: {}", e)),
            };
            checks.push(HealthCheck::new(name, status));
        }
        checks
    }

    /// Print a results table
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}", "ragline diagnostics".bold());
        println!("{:<24} {}", "Check", "Status");
        println!("{}", "=".repeat(60));

        for check in checks {
            let line = match &check.status {
                HealthStatus::Pass => "✓ ok".green().to_string(),
                HealthStatus::Warn(msg) => format!("⚠ {}", msg).yellow().to_string(),
                HealthStatus::Fail(msg) => format!("✗ {}", msg).red().to_string(),
            };
            println!("{:<24} {}", check.name, line);
        }
        println!();
    }

    /// True when no check failed
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks
            .iter()
            .any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}
