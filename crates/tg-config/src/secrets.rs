//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (e.g. `"TG_JWT_SECRET"`).
//! - Binaries call [`resolve_secrets`] once at startup and pass the result
//!   into constructors; nothing else reads these env vars.
//! - `Debug` redacts values. Error messages name the variable, never the value.
//!
//! # Enforcement
//! | Setting                | Required                       |
//! |------------------------|--------------------------------|
//! | `store.backend=postgres` | database URL                 |
//! | `auth.mode=jwt`          | JWT signing secret           |

use anyhow::{bail, Result};

use crate::{AuthMode, ServiceConfig, StoreBackend};

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve from the process environment.
pub fn resolve_secrets(cfg: &ServiceConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, resolve_env)
}

/// Resolve through an arbitrary lookup (tests pass a map instead of mutating
/// the process environment).
pub fn resolve_secrets_with<F>(cfg: &ServiceConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let database_url = non_blank(&cfg.store.database_url_env);
    let jwt_secret = non_blank(&cfg.auth.jwt_secret_env);

    if cfg.store.backend == StoreBackend::Postgres && database_url.is_none() {
        bail!(
            "SECRETS_MISSING backend=postgres: required env var '{}' is not set or empty",
            cfg.store.database_url_env
        );
    }
    if cfg.auth.mode == AuthMode::Jwt && jwt_secret.is_none() {
        bail!(
            "SECRETS_MISSING auth=jwt: required env var '{}' is not set or empty",
            cfg.auth.jwt_secret_env
        );
    }

    Ok(ResolvedSecrets {
        database_url,
        jwt_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_require_db_url_and_jwt_secret() {
        let cfg = ServiceConfig::default();
        let err = resolve_secrets_with(&cfg, lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("TG_DATABASE_URL"));

        let err = resolve_secrets_with(&cfg, lookup(&[("TG_DATABASE_URL", "postgres://x")]))
            .unwrap_err();
        assert!(err.to_string().contains("TG_JWT_SECRET"));
    }

    #[test]
    fn memory_static_needs_nothing() {
        let mut cfg = ServiceConfig::default();
        cfg.store.backend = StoreBackend::Memory;
        cfg.auth.mode = AuthMode::Static;
        cfg.auth.static_user_id = Some("dev-user".to_string());
        let s = resolve_secrets_with(&cfg, lookup(&[])).unwrap();
        assert!(s.database_url.is_none());
        assert!(s.jwt_secret.is_none());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut cfg = ServiceConfig::default();
        cfg.store.backend = StoreBackend::Memory;
        let err = resolve_secrets_with(&cfg, lookup(&[("TG_JWT_SECRET", "   ")])).unwrap_err();
        assert!(err.to_string().contains("TG_JWT_SECRET"));
    }

    #[test]
    fn debug_redacts_values() {
        let s = ResolvedSecrets {
            database_url: Some("postgres://user:hunter2@db/app".to_string()),
            jwt_secret: Some("super-secret".to_string()),
        };
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<REDACTED>"));
    }
}
