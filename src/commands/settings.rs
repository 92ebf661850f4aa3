use crate::error::PipelineError;
use crate::models::config::{
    default_category_weights, default_severity_weights, default_supported_extensions, LinterConfig,
    LinterKind, PipelineConfig,
};
use crate::models::issue::{Category, Severity};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 1;

pub const DEFAULT_DATA_DIR: &str = ".reviewlens";
pub const DATA_DIR_ENV: &str = "REVIEWLENS_DATA_DIR";

/// Explicit path, then `REVIEWLENS_DATA_DIR`, then `.reviewlens/`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn load_pipeline_config(data_dir: &Path) -> Result<PipelineConfig, PipelineError> {
    let settings = load_settings_from_disk(data_dir)?;
    Ok(config_from_settings(&settings))
}

pub fn load_settings_from_disk(data_dir: &Path) -> Result<Value, PipelineError> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| PipelineError::Settings(format!("Failed to read settings.json: {e}")))?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
            log::warn!("settings.json is not valid JSON ({e}), falling back to defaults");
            json!({})
        })
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

/// Deep-merge a partial update into the stored settings.
pub fn save_settings_to_disk(data_dir: &Path, settings: Value) -> Result<Value, PipelineError> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let mut merged = load_settings_from_disk(data_dir).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    Ok(migrated)
}

fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

fn ensure_data_dir(data_dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(data_dir).map_err(|e| {
        PipelineError::Settings(format!("Failed to create {}: {e}", data_dir.display()))
    })
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<(), PipelineError> {
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| PipelineError::Settings(format!("Failed to serialize settings: {e}")))?;
    fs::write(path, raw).map_err(|e| PipelineError::Settings(format!("Failed to write settings.json: {e}")))
}

fn migrate_settings(input: Value) -> Value {
    let defaults = default_settings();
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let version = out.get("schema_version").and_then(Value::as_i64).unwrap_or(0);

    if version < 1 {
        migrate_snake_case_keys(&mut out);
    }

    deep_merge_defaults(&mut out, &defaults);
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    let defaults = PipelineConfig::default();
    let linters: Map<String, Value> = defaults
        .linters
        .iter()
        .map(|l| (l.kind.name().to_string(), json!({ "enabled": l.enabled, "program": l.program })))
        .collect();

    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "severityWeights": default_severity_weights(),
        "categoryWeights": default_category_weights(),
        "llmEnabled": defaults.llm_enabled,
        "llmModel": defaults.llm_model,
        "llmBaseUrl": defaults.llm_base_url,
        "llmTimeoutSeconds": defaults.llm_timeout_seconds,
        "llmRetryCount": defaults.llm_retry_count,
        "llmRetryBackoffMs": defaults.llm_retry_backoff_ms,
        "llmTemperature": defaults.llm_temperature,
        "llmMaxTokens": defaults.llm_max_tokens,
        "llmMaxInputChars": defaults.llm_max_input_chars,
        "linters": linters,
        "linterTimeoutSeconds": defaults.linter_timeout_seconds,
        "builtinRules": defaults.builtin_rules,
        "maxLineLength": defaults.max_line_length,
        "maxConcurrentFiles": defaults.max_concurrent_files,
        "githubApiUrl": defaults.github_api_url,
        "maxFileChanges": defaults.max_file_changes,
        "supportedExtensions": defaults.supported_extensions,
        "exclude": defaults.exclude,
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

/// Unversioned files used snake_case keys.
fn migrate_snake_case_keys(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    let snake_keys: Vec<String> = obj.keys().filter(|k| k.contains('_') && *k != "schema_version").cloned().collect();
    for key in snake_keys {
        let camel = to_camel_case(&key);
        if let Some(value) = obj.remove(&key) {
            obj.entry(camel).or_insert(value);
        }
    }

    if let Some(weights) = obj.get_mut("categoryWeights").and_then(Value::as_object_mut) {
        let legacy: Vec<String> = weights.keys().filter(|k| k.contains('_')).cloned().collect();
        for key in legacy {
            if let Some(value) = weights.remove(&key) {
                weights.entry(key.replace('_', "-")).or_insert(value);
            }
        }
    }
}

fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_u64(obj, "llmTimeoutSeconds", 1, 600, 30);
    clamp_u64(obj, "llmRetryCount", 0, 10, 1);
    clamp_u64(obj, "llmRetryBackoffMs", 0, 60_000, 1000);
    clamp_u64(obj, "llmMaxTokens", 64, 16_000, 1500);
    clamp_u64(obj, "llmMaxInputChars", 500, 200_000, 10_000);
    clamp_u64(obj, "linterTimeoutSeconds", 1, 600, 60);
    clamp_u64(obj, "maxLineLength", 40, 400, 100);
    clamp_u64(obj, "maxConcurrentFiles", 1, 32, 4);
    clamp_u64(obj, "maxFileChanges", 1, 100_000, 1000);
    clamp_f64(obj, "llmTemperature", 0.0, 2.0, 0.1);

    ensure_bool(obj, "llmEnabled", true);
    ensure_bool(obj, "builtinRules", true);

    ensure_string(obj, "llmModel", "gpt-4o-mini");
    ensure_string(obj, "llmBaseUrl", "https://api.openai.com/v1");
    ensure_string(obj, "githubApiUrl", "https://api.github.com");

    let severity_weights = sanitize_weights(
        obj.get("severityWeights"),
        Severity::ALL.iter().map(|s| (s.as_str(), default_severity_weights()[s])),
        |key| Severity::parse(key).map(|s| s.as_str()),
    );
    obj.insert("severityWeights".to_string(), severity_weights);

    let category_weights = sanitize_weights(
        obj.get("categoryWeights"),
        Category::ALL.iter().map(|c| (c.as_str(), default_category_weights()[c])),
        |key| Category::parse(key).map(|c| c.as_str()),
    );
    obj.insert("categoryWeights".to_string(), category_weights);

    let linters = sanitize_linters(obj.get("linters"));
    obj.insert("linters".to_string(), linters);

    let extensions = sanitize_string_list(obj.get("supportedExtensions"), |ext| {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        (!ext.is_empty()).then_some(ext)
    })
    .unwrap_or_else(default_supported_extensions);
    obj.insert("supportedExtensions".to_string(), json!(extensions));

    let exclude = sanitize_string_list(obj.get("exclude"), |pattern| {
        glob::Pattern::new(pattern).ok().map(|_| pattern.to_string())
    })
    .unwrap_or_default();
    obj.insert("exclude".to_string(), json!(exclude));
}

/// Keeps only known keys (canonical names) with finite non-negative values.
fn sanitize_weights<'a>(
    current: Option<&Value>,
    defaults: impl Iterator<Item = (&'a str, f64)>,
    canonical: impl Fn(&str) -> Option<&'static str>,
) -> Value {
    let mut given: Map<String, Value> = Map::new();
    if let Some(current) = current.and_then(Value::as_object) {
        for (key, value) in current {
            if let (Some(name), Some(weight)) = (canonical(key), value.as_f64()) {
                if weight.is_finite() && weight >= 0.0 {
                    given.insert(name.to_string(), json!(weight));
                }
            }
        }
    }

    let mut out = Map::new();
    for (name, default) in defaults {
        let value = given.remove(name).unwrap_or_else(|| json!(default));
        out.insert(name.to_string(), value);
    }
    Value::Object(out)
}

fn sanitize_linters(current: Option<&Value>) -> Value {
    let current = current.and_then(Value::as_object);
    let mut out = Map::new();
    for kind in LinterKind::ALL {
        let defaults = LinterConfig::default_for(kind);
        let entry = current.and_then(|c| c.get(kind.name()));
        let enabled = entry
            .and_then(|e| e.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(defaults.enabled);
        let program = entry
            .and_then(|e| e.get("program"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&defaults.program);
        out.insert(kind.name().to_string(), json!({ "enabled": enabled, "program": program }));
    }
    Value::Object(out)
}

/// `None` when the value is not an array.
fn sanitize_string_list(current: Option<&Value>, keep: impl Fn(&str) -> Option<String>) -> Option<Vec<String>> {
    let items = current?.as_array()?;
    let mut out: Vec<String> = Vec::new();
    for item in items.iter().filter_map(Value::as_str) {
        if let Some(clean) = keep(item) {
            if !out.contains(&clean) {
                out.push(clean);
            }
        }
    }
    Some(out)
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn clamp_f64(map: &mut Map<String, Value>, key: &str, min: f64, max: f64, default: f64) {
    let raw = map
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn ensure_bool(map: &mut Map<String, Value>, key: &str, default: bool) {
    let value = map.get(key).and_then(Value::as_bool).unwrap_or(default);
    map.insert(key.to_string(), json!(value));
}

fn ensure_string(map: &mut Map<String, Value>, key: &str, default: &str) {
    let value = map
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string();
    map.insert(key.to_string(), json!(value));
}

/// Typed view of a sanitized settings document.
pub fn config_from_settings(settings: &Value) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    let u64_of = |key: &str, default: u64| settings.get(key).and_then(Value::as_u64).unwrap_or(default);
    let bool_of = |key: &str, default: bool| settings.get(key).and_then(Value::as_bool).unwrap_or(default);
    let string_of = |key: &str, default: &str| {
        settings
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };
    let strings_of = |key: &str| -> Option<Vec<String>> {
        settings
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
    };

    let mut severity_weights = defaults.severity_weights.clone();
    if let Some(obj) = settings.get("severityWeights").and_then(Value::as_object) {
        for (key, value) in obj {
            if let (Some(severity), Some(weight)) = (Severity::parse(key), value.as_f64()) {
                severity_weights.insert(severity, weight);
            }
        }
    }

    let mut category_weights = defaults.category_weights.clone();
    if let Some(obj) = settings.get("categoryWeights").and_then(Value::as_object) {
        for (key, value) in obj {
            if let (Some(category), Some(weight)) = (Category::parse(key), value.as_f64()) {
                category_weights.insert(category, weight);
            }
        }
    }

    let linters = LinterKind::ALL
        .into_iter()
        .map(|kind| {
            let defaults = LinterConfig::default_for(kind);
            let entry = settings.get("linters").and_then(|l| l.get(kind.name()));
            LinterConfig {
                kind,
                enabled: entry
                    .and_then(|e| e.get("enabled"))
                    .and_then(Value::as_bool)
                    .unwrap_or(defaults.enabled),
                program: entry
                    .and_then(|e| e.get("program"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(defaults.program),
            }
        })
        .collect();

    PipelineConfig {
        severity_weights,
        category_weights,
        llm_enabled: bool_of("llmEnabled", defaults.llm_enabled),
        llm_model: string_of("llmModel", &defaults.llm_model),
        llm_base_url: string_of("llmBaseUrl", &defaults.llm_base_url),
        llm_timeout_seconds: u64_of("llmTimeoutSeconds", defaults.llm_timeout_seconds),
        llm_retry_count: u64_of("llmRetryCount", defaults.llm_retry_count as u64) as u32,
        llm_retry_backoff_ms: u64_of("llmRetryBackoffMs", defaults.llm_retry_backoff_ms),
        llm_temperature: settings
            .get("llmTemperature")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.llm_temperature),
        llm_max_tokens: u64_of("llmMaxTokens", defaults.llm_max_tokens as u64) as u32,
        llm_max_input_chars: u64_of("llmMaxInputChars", defaults.llm_max_input_chars as u64) as usize,
        linters,
        linter_timeout_seconds: u64_of("linterTimeoutSeconds", defaults.linter_timeout_seconds),
        builtin_rules: bool_of("builtinRules", defaults.builtin_rules),
        max_line_length: u64_of("maxLineLength", defaults.max_line_length as u64) as usize,
        max_concurrent_files: u64_of("maxConcurrentFiles", defaults.max_concurrent_files as u64) as usize,
        github_api_url: string_of("githubApiUrl", &defaults.github_api_url),
        max_file_changes: u64_of("maxFileChanges", defaults.max_file_changes),
        supported_extensions: strings_of("supportedExtensions").unwrap_or(defaults.supported_extensions),
        exclude: strings_of("exclude").unwrap_or(defaults.exclude),
    }
}
