//! Layered YAML configuration for the tg-* binaries.
//!
//! Documents are merged in order (earlier = base, later = override), converted
//! to canonical JSON and hashed so every process can log exactly which
//! configuration it booted with. Config files hold env var NAMES for secrets,
//! never values; see [`secrets`].

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use secrets::{resolve_secrets, resolve_secrets_with, ResolvedSecrets};

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",           // OpenAI style
    "sk_live",       // Stripe live
    "sk_test",       // Stripe test
    "eyJ",           // JWT / Supabase service keys
    "sbp_",          // Supabase personal access token
    "AKIA",          // AWS access key ID
    "-----BEGIN",    // PEM private keys
    "ghp_",          // GitHub PAT
    "postgres://",   // connection strings carry passwords
    "postgresql://",
];

// ---------------------------------------------------------------------------
// Raw layering + hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document parses as null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json's default Map is ordered by key, so this is canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Bearer HS256 access tokens; identity = `sub`.
    Jwt,
    /// Every request resolves to `static_user_id`. Development only.
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8787".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// NAME of the env var holding the Postgres URL.
    pub database_url_env: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            database_url_env: "TG_DATABASE_URL".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// NAME of the env var holding the HS256 signing secret.
    pub jwt_secret_env: String,
    /// Expected `aud` claim; `None` disables audience validation.
    pub audience: Option<String>,
    pub static_user_id: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Jwt,
            jwt_secret_env: "TG_JWT_SECRET".to_string(),
            audience: Some("authenticated".to_string()),
            static_user_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

impl ServiceConfig {
    /// Decode the merged JSON and check cross-field rules.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: ServiceConfig = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match the service schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_bytes == 0 {
            bail!("CONFIG_INVALID: server.max_upload_bytes must be > 0");
        }
        if self.store.backend == StoreBackend::Postgres && self.store.max_connections == 0 {
            bail!("CONFIG_INVALID: store.max_connections must be > 0");
        }
        if self.auth.mode == AuthMode::Static {
            let blank = self
                .auth
                .static_user_id
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true);
            if blank {
                bail!("CONFIG_INVALID: auth.mode=static requires auth.static_user_id");
            }
        }
        Ok(())
    }
}

/// Load + merge + decode in one step.
pub fn load_service_config(paths: &[&str]) -> Result<(LoadedConfig, ServiceConfig)> {
    let loaded = if paths.is_empty() {
        load_layered_yaml_from_strings(&[])?
    } else {
        load_layered_yaml(paths)?
    };
    let cfg = ServiceConfig::from_loaded(&loaded)?;
    Ok((loaded, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layers_yield_defaults() {
        let loaded = load_layered_yaml_from_strings(&[]).unwrap();
        let cfg = ServiceConfig::from_loaded(&loaded).unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.store.backend, StoreBackend::Postgres);
        assert_eq!(cfg.auth.mode, AuthMode::Jwt);
    }

    #[test]
    fn overlay_overrides_nested_keys_only() {
        let base = "store:\n  backend: postgres\n  max_connections: 4\n";
        let overlay = "store:\n  backend: memory\n";
        let loaded = load_layered_yaml_from_strings(&[base, overlay]).unwrap();
        let cfg = ServiceConfig::from_loaded(&loaded).unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.store.max_connections, 4);
    }

    #[test]
    fn static_auth_requires_user_id() {
        let loaded = load_layered_yaml_from_strings(&["auth:\n  mode: static\n"]).unwrap();
        let err = ServiceConfig::from_loaded(&loaded).unwrap_err();
        assert!(err.to_string().contains("static_user_id"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let loaded = load_layered_yaml_from_strings(&["store:\n  backend: supabase\n"]).unwrap();
        assert!(ServiceConfig::from_loaded(&loaded).is_err());
    }

    #[test]
    fn jwt_literal_is_rejected() {
        let doc = "auth:\n  jwt_secret_env: \"eyJhbGciOiJIUzI1NiJ9.payload\"\n";
        let err = load_layered_yaml_from_strings(&[doc]).unwrap_err();
        assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"));
        assert!(!err.to_string().contains("eyJ"));
    }

    #[test]
    fn connection_string_literal_is_rejected() {
        let doc = "store:\n  database_url_env: \"postgres://u:p@localhost/db\"\n";
        assert!(load_layered_yaml_from_strings(&[doc]).is_err());
    }
}
