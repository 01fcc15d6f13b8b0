//! 🔧 App Configuration — one TOML file and/or a handful of `ESX_*` env vars, merged by Figment.
//!
//! ```toml
//! [elasticsearch]
//! url = "http://localhost:9200"
//! api_key = "..."
//!
//! [export]
//! index = "logs-2024.*"
//! query = { term = { level = "error" } }
//!
//! [output]
//! file_name = "errors.ndjson.gz"
//! gzip = true
//! ```
//!
//! Nested keys from the environment use a double underscore:
//! `ESX_ELASTICSEARCH__URL`, `ESX_EXPORT__INDEX`, `ESX_OUTPUT__GZIP`. 🦆

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::config::ExportConfig;
use crate::sink::OutputConfig;
use crate::transport::ElasticsearchConfig;

/// 📦 Everything one `esx` run needs to know.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub elasticsearch: ElasticsearchConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// 🚀 Load the config: env vars first, then the TOML file on top if one was given.
///
/// - `None` → env vars only.
/// - `Some(path)` → env vars + TOML, TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {}",
        config_file_name.map_or_else(|| "<env only>".into(), |path| path.display().to_string())
    );
    figment(config_file_name)
        .extract()
        .context(context_message(config_file_name))
}

fn figment(config_file_name: Option<&Path>) -> Figment {
    let config = Figment::new().merge(Env::prefixed("ESX_").split("__"));
    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

fn context_message(config_file_name: Option<&Path>) -> String {
    match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESX_*). \
             Check that [elasticsearch] has a url and [export] has an index.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESX_*). \
                 No file was given, so ESX_ELASTICSEARCH__URL and ESX_EXPORT__INDEX have to be set."
            .to_string(),
    }
}
