use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of kicking off an external import run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerOutcome {
    pub processing_response: String,
}

/// Starts the external pipeline that publishes the merged listings.
/// The pipeline reports its pass/fail counts back separately.
#[async_trait]
pub trait ImportTrigger: Send + Sync {
    async fn trigger(&self) -> Result<TriggerOutcome>;

    /// Name of the import pipeline
    fn pipeline_name(&self) -> &'static str;
}

/// Triggers an import over HTTP: one call to the trigger URL, then one to the
/// processing URL. The caller repeats the processing call until the run ends.
pub struct HttpImportTrigger {
    client: Client,
    trigger_url: String,
    processing_url: String,
}

impl HttpImportTrigger {
    pub fn new(
        trigger_url: impl Into<String>,
        processing_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("listing-importer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            trigger_url: trigger_url.into(),
            processing_url: processing_url.into(),
        })
    }

    /// `None` when either URL is not configured
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match (&config.trigger_url, &config.processing_url) {
            (Some(trigger), Some(processing)) => {
                Self::new(trigger, processing, config.http_timeout).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn call(&self, url: &str, what: &str) -> Result<String> {
        debug!("Calling {} URL: {}", what, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to call {what} URL"))?;

        if !response.status().is_success() {
            warn!("{} URL returned status: {}", what, response.status());
            anyhow::bail!("{} URL returned status: {}", what, response.status());
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {what} response body"))
    }
}

#[async_trait]
impl ImportTrigger for HttpImportTrigger {
    async fn trigger(&self) -> Result<TriggerOutcome> {
        info!("Triggering external import");
        self.call(&self.trigger_url, "trigger").await?;
        let processing_response = self.call(&self.processing_url, "processing").await?;
        info!("Import triggered and processing started");

        Ok(TriggerOutcome {
            processing_response,
        })
    }

    fn pipeline_name(&self) -> &'static str {
        "HTTP import pipeline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(trigger: Option<&str>, processing: Option<&str>) -> Config {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.trigger_url = trigger.map(str::to_string);
        config.processing_url = processing.map(str::to_string);
        config
    }

    #[test]
    fn needs_both_urls() {
        assert!(HttpImportTrigger::from_config(&config(Some("http://t"), None))
            .unwrap()
            .is_none());
        assert!(HttpImportTrigger::from_config(&config(None, Some("http://p")))
            .unwrap()
            .is_none());
        assert!(
            HttpImportTrigger::from_config(&config(Some("http://t"), Some("http://p")))
                .unwrap()
                .is_some()
        );
    }
}
