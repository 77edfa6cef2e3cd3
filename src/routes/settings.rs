use axum::{
    Extension, Form,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{Flash, Notice, failed, finish, render_page, safe_back, tolerate};
use crate::AppState;
use crate::api::Toggle;
use crate::api::types::{AmpcodeSettings, ServerConfig};
use crate::constants::ROUTING_STRATEGIES;
use crate::error::DashboardError;
use crate::session::Session;

const GENERAL_TOGGLES: [Toggle; 6] = [
    Toggle::Debug,
    Toggle::LoggingToFile,
    Toggle::RequestLog,
    Toggle::UsageStatistics,
    Toggle::WsAuth,
    Toggle::ForceModelPrefix,
];

const AMP_TOGGLES: [Toggle; 2] = [Toggle::AmpForceModelMappings, Toggle::AmpRestrictToLocalhost];

/// Template rows for a set of toggles
pub(super) fn toggle_rows(
    toggles: &[Toggle],
    config: &ServerConfig,
    amp: &AmpcodeSettings,
) -> Vec<minijinja::Value> {
    toggles
        .iter()
        .map(|t| {
            context! {
                slug => t.slug(),
                label => t.label(),
                enabled => t.current(config, amp),
            }
        })
        .collect()
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (config, amp) = tokio::join!(client.config(), client.ampcode());
    let config = config?;
    let amp = tolerate("Amp code settings", amp)?;
    let amp_for_flags = amp.clone().unwrap_or_default();

    render_page(
        &state,
        &session,
        "settings.html",
        "settings",
        &flash,
        context! {
            toggles => toggle_rows(&GENERAL_TOGGLES, &config, &amp_for_flags),
            proxy_url => config.proxy_url,
            request_retry => config.request_retry.unwrap_or(0),
            max_retry_interval => config.max_retry_interval.unwrap_or(0),
            logs_max_total_size_mb => config.logs_max_total_size_mb.unwrap_or(0),
            routing_strategy => config.routing_strategy(),
            strategies => ROUTING_STRATEGIES,
            amp => amp.map(|amp| context! {
                toggles => toggle_rows(&AMP_TOGGLES, &config, &amp),
                upstream_url => amp.upstream_url,
                upstream_api_key => amp.upstream_api_key,
                model_mappings => if amp.model_mappings.is_empty() {
                    String::new()
                } else {
                    serde_json::to_string_pretty(&amp.model_mappings).unwrap_or_default()
                },
            }),
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct ToggleForm {
    setting: String,
    enabled: String,
    back: Option<String>,
}

/// Flip one boolean setting from any screen
pub async fn toggle(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<ToggleForm>,
) -> Result<Response, DashboardError> {
    let back = safe_back(form.back.as_deref(), "/settings");
    finish(&back, async {
        let toggle = Toggle::from_slug(&form.setting)
            .ok_or_else(|| DashboardError::validation(format!("Unknown setting: {}", form.setting)))?;
        let enabled = form.enabled == "true";
        session
            .client
            .set_toggle(toggle, enabled)
            .await
            .map_err(failed("update"))?;
        Ok(Notice::success(format!(
            "{} {}",
            toggle.label(),
            if enabled { "enabled" } else { "disabled" }
        )))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    proxy_url: String,
    request_retry: String,
    max_retry_interval: String,
    logs_max_total_size_mb: String,
    routing_strategy: String,
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, DashboardError> {
    value
        .trim()
        .parse()
        .map_err(|_| DashboardError::validation(format!("{field} must be a non-negative whole number")))
}

/// Save the network and retry settings together
pub async fn save(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<SettingsForm>,
) -> Result<Response, DashboardError> {
    finish("/settings", async {
        let retry: u32 = parse_number("Request retry", &form.request_retry)?;
        let interval: u32 = parse_number("Max retry interval", &form.max_retry_interval)?;
        let logs_size: u64 = parse_number("Logs max total size", &form.logs_max_total_size_mb)?;
        let strategy = form.routing_strategy.trim();
        if !ROUTING_STRATEGIES.iter().any(|(value, _)| *value == strategy) {
            return Err(DashboardError::validation(format!(
                "Unknown routing strategy: {strategy}"
            )));
        }

        let client = &session.client;
        tokio::try_join!(
            client.set_proxy_url(form.proxy_url.trim()),
            client.set_request_retry(retry),
            client.set_max_retry_interval(interval),
            client.set_logs_max_total_size(logs_size),
            client.set_routing_strategy(strategy),
        )
        .map_err(failed("save settings"))?;
        Ok(Notice::success("Settings saved successfully!"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct AmpcodeForm {
    #[serde(default)]
    upstream_url: String,
    #[serde(default)]
    upstream_api_key: String,
    #[serde(default)]
    model_mappings: String,
}

pub async fn save_ampcode(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<AmpcodeForm>,
) -> Result<Response, DashboardError> {
    finish("/settings", async {
        let text = form.model_mappings.trim();
        let mappings = if text.is_empty() {
            Value::Array(Vec::new())
        } else {
            match serde_json::from_str::<Value>(text) {
                Ok(value @ Value::Array(_)) => value,
                Ok(_) => return Err(DashboardError::validation("Model mappings must be a JSON array")),
                Err(e) => {
                    return Err(DashboardError::validation(format!(
                        "Invalid model mappings JSON: {e}"
                    )));
                }
            }
        };

        let client = &session.client;
        tokio::try_join!(
            client.set_amp_upstream_url(form.upstream_url.trim()),
            client.set_amp_upstream_api_key(form.upstream_api_key.trim()),
            client.set_amp_model_mappings(mappings),
        )
        .map_err(failed("save Amp settings"))?;
        Ok(Notice::success("Amp settings saved successfully!"))
    }
    .await)
}
