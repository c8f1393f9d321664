use std::{collections::HashMap, fs, path::Path, time::Duration};

pub const DEFAULT_CONFIG_FILE: &str = "reflect.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend_url: String,
    pub api_prefix: String,
    pub request_timeout_secs: u64,
    pub save_output: bool,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".into(),
            api_prefix: "/api".into(),
            request_timeout_secs: 120,
            save_output: true,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    /// `None` when the timeout is configured as 0.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Settings plus the problems met while loading them. Loading happens before
/// the tracing subscriber exists, so the caller logs `warnings` afterwards.
#[derive(Debug, Default)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub warnings: Vec<String>,
}

/// Defaults, then the TOML file (`path` or `reflect.toml`), then the process
/// environment.
pub fn load_settings(path: Option<&Path>) -> LoadedSettings {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut warnings = Vec::new();
    let file = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warnings.push(format!(
                    "config file {} unreadable, using defaults: {err}",
                    path.display()
                ));
            }
            None
        }
    };
    let mut loaded = settings_from(file.as_deref(), |key| std::env::var(key).ok());
    warnings.append(&mut loaded.warnings);
    loaded.warnings = warnings;
    loaded
}

pub(crate) fn settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> LoadedSettings {
    let mut settings = Settings::default();
    let mut warnings = Vec::new();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, toml::Value>>(raw) {
            Ok(file_cfg) => {
                let file_cfg: HashMap<String, String> = file_cfg
                    .into_iter()
                    .filter_map(|(key, value)| scalar(value).map(|v| (key, v)))
                    .collect();
                apply(&mut settings, &mut warnings, |key| file_cfg.get(key).cloned());
            }
            Err(err) => warnings.push(format!("config file is not valid TOML, ignoring it: {err}")),
        }
    }

    if let Some(v) = env("REFLECT_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("REFLECT_API_PREFIX") {
        settings.api_prefix = v;
    }
    if let Some(v) = env("REFLECT_REQUEST_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(_) => warnings.push(ignored("REFLECT_REQUEST_TIMEOUT_SECS", &v)),
        }
    }
    if let Some(v) = env("REFLECT_SAVE_OUTPUT") {
        match parse_bool(&v) {
            Some(parsed) => settings.save_output = parsed,
            None => warnings.push(ignored("REFLECT_SAVE_OUTPUT", &v)),
        }
    }
    if let Some(v) = env("REFLECT_LOG") {
        settings.log_filter = v;
    }

    LoadedSettings { settings, warnings }
}

fn apply(
    settings: &mut Settings,
    warnings: &mut Vec<String>,
    get: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = get("backend_url") {
        settings.backend_url = v;
    }
    if let Some(v) = get("api_prefix") {
        settings.api_prefix = v;
    }
    if let Some(v) = get("request_timeout_secs") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(_) => warnings.push(ignored("request_timeout_secs", &v)),
        }
    }
    if let Some(v) = get("save_output") {
        match parse_bool(&v) {
            Some(parsed) => settings.save_output = parsed,
            None => warnings.push(ignored("save_output", &v)),
        }
    }
    if let Some(v) = get("log_filter") {
        settings.log_filter = v;
    }
}

fn ignored(key: &str, value: &str) -> String {
    format!("ignoring invalid {key} value `{value}`")
}

fn scalar(value: toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
