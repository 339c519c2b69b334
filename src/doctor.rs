use anyhow::Result;

use crate::config::{Credentials, GOOGLE_API_KEY_ENV, RuntimeConfig, SERPER_API_KEY_ENV};
use crate::provider::{LanguageModel, env_present, resolve_model};
use crate::retry::FailureKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Responsive,
    /// Busy right now; analysis will retry on its own.
    Overloaded(String),
    Failed(FailureKind, String),
}

/// Send a one-word prompt. Only a hard failure here is worth surfacing.
pub async fn probe_model(model: &dyn LanguageModel) -> ProbeStatus {
    match model.generate("", "test").await {
        Ok(_) => ProbeStatus::Responsive,
        Err(err) if err.kind.is_retryable() => ProbeStatus::Overloaded(err.message),
        Err(err) => ProbeStatus::Failed(err.kind, err.message),
    }
}

pub fn render_probe_status(model: &str, status: &ProbeStatus) -> String {
    match status {
        ProbeStatus::Responsive => format!("Gemini probe ({model}): ok (service is responsive)"),
        ProbeStatus::Overloaded(message) => format!(
            "Gemini probe ({model}): warning, service is busy but analysis will retry automatically ({})",
            message.chars().take(100).collect::<String>()
        ),
        ProbeStatus::Failed(kind, message) => format!(
            "Gemini probe ({model}): failed [{kind}] {}",
            message.chars().take(100).collect::<String>()
        ),
    }
}

pub async fn run_doctor(cfg: &RuntimeConfig, probe: bool) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    println!("API key check:");
    for key in [GOOGLE_API_KEY_ENV, SERPER_API_KEY_ENV] {
        let status = if env_present(key) { "set" } else { "missing" };
        println!("- {key}: {status}");
    }

    println!(
        "Model: {} (temperature={}, request_timeout={}s)",
        cfg.model,
        cfg.temperature,
        cfg.request_timeout.as_secs()
    );
    println!(
        "Retry: max_retries={} base_delay={}s max_delay={}s overload_floor={}s",
        cfg.retry.max_retries,
        cfg.retry.base_delay.as_secs(),
        cfg.retry.max_delay.as_secs(),
        cfg.retry.overload_floor.as_secs()
    );
    println!(
        "Strategies: {}",
        cfg.strategies
            .iter()
            .map(|s| format!("{} ({}s)", s.name, s.timeout.as_secs()))
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    if !probe {
        return Ok(());
    }

    let credentials = Credentials::from_env()?;
    let model = resolve_model(cfg, &credentials.google_api_key)?;
    let status = probe_model(model.as_ref()).await;
    println!("{}", render_probe_status(model.model_name(), &status));
    if let ProbeStatus::Failed(kind, message) = status {
        tracing::warn!(model = %model.model_name(), kind = %kind, error = %message, "model probe failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::WorkError;
    use async_trait::async_trait;

    struct FixedModel(Result<String, WorkError>);

    #[async_trait]
    impl LanguageModel for FixedModel {
        fn model_name(&self) -> &str {
            "gemini-test"
        }

        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, WorkError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn overloaded_probe_is_only_a_warning() {
        let status = probe_model(&FixedModel(Err(WorkError::overloaded("503 UNAVAILABLE")))).await;
        assert!(matches!(status, ProbeStatus::Overloaded(_)));
        let line = render_probe_status("gemini-test", &status);
        assert!(line.starts_with("Gemini probe (gemini-test): warning"));
    }

    #[tokio::test]
    async fn fatal_probe_is_reported() {
        let status = probe_model(&FixedModel(Err(WorkError::fatal("API key not valid")))).await;
        assert_eq!(
            status,
            ProbeStatus::Failed(FailureKind::Fatal, "API key not valid".to_string())
        );
        let model = FixedModel(Ok("hi".to_string()));
        let ok = probe_model(&model).await;
        assert_eq!(ok, ProbeStatus::Responsive);
        assert_eq!(
            render_probe_status(model.model_name(), &ok),
            "Gemini probe (gemini-test): ok (service is responsive)"
        );
    }
}
