//! Process settings read from environment variables at start-up.

use crate::error::ControllerError;
use std::collections::BTreeSet;
use std::env;
use std::net::SocketAddr;
use tracing::warn;

/// Default retention bound for revisions
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Operator process settings.
#[derive(Debug, Clone)]
pub struct OperatorSettings {
    /// Operator environment id (`dev`, `test`, `auto`, `prod`, ...)
    pub env: String,
    /// Name of the ConfigMap holding `config.yaml`
    pub configmap_name: String,
    /// Namespace of that ConfigMap
    pub operator_namespace: String,
    /// Start-up config file
    pub config_file: String,
    /// Run the defaulting engine in the mutating webhook
    pub mutation_defaulter: bool,
    /// Revision retention bound
    pub max_history: usize,
    /// Env names stripped from revision snapshots
    pub biz_envs: BTreeSet<String>,
    /// Namespace to watch; `None` watches every namespace
    pub watch_namespace: Option<String>,
    pub webhook_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
}

impl OperatorSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through `lookup` (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mutation_defaulter = var("MUTATION_DEFAULTER", "false")
            .parse::<bool>()
            .unwrap_or_else(|_| {
                warn!("MUTATION_DEFAULTER is not a bool, using false");
                false
            });

        let max_history = var("MAX_HISTORY", "10")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                warn!("MAX_HISTORY is not a positive integer, using {}", DEFAULT_MAX_HISTORY);
                DEFAULT_MAX_HISTORY
            });

        let biz_envs = var("BIZ_ENVS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        Ok(Self {
            env: var("LOGAN_ENV", "test"),
            configmap_name: var("CONFIGMAP_NAME", "logan-app-operator-config"),
            operator_namespace: var("OPERATOR_NAMESPACE", "logan"),
            config_file: var("LOGAN_CONFIG", "configs/config.yaml"),
            mutation_defaulter,
            max_history,
            biz_envs,
            watch_namespace,
            webhook_addr: parse_addr("WEBHOOK_ADDR", &var("WEBHOOK_ADDR", "0.0.0.0:8443"))?,
            metrics_addr: parse_addr("METRICS_ADDR", &var("METRICS_ADDR", "0.0.0.0:8383"))?,
        })
    }
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, ControllerError> {
    value.parse().map_err(|e| {
        ControllerError::InvalidConfig(format!("{} '{}' is not a socket address: {}", key, value, e))
    })
}

/// Namespace gate: whether an operator running in `env` leaves `namespace` alone.
///
/// A `dev` operator only handles `-dev` namespaces and an `auto` operator only
/// `-auto` ones; every other operator skips both.
#[must_use]
pub fn ignores_namespace(env: &str, namespace: &str) -> bool {
    let is_dev = namespace.ends_with("-dev");
    let is_auto = namespace.ends_with("-auto");
    match env {
        "dev" => !is_dev,
        "auto" => !is_auto,
        _ => is_dev || is_auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<OperatorSettings, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        OperatorSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.env, "test");
        assert_eq!(s.configmap_name, "logan-app-operator-config");
        assert_eq!(s.operator_namespace, "logan");
        assert!(!s.mutation_defaulter);
        assert_eq!(s.max_history, 10);
        assert!(s.biz_envs.is_empty());
        assert!(s.watch_namespace.is_none());
        assert_eq!(s.webhook_addr.port(), 8443);
        assert_eq!(s.metrics_addr.port(), 8383);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let s = settings(&[("MAX_HISTORY", "lots"), ("MUTATION_DEFAULTER", "yes")]).unwrap();
        assert_eq!(s.max_history, DEFAULT_MAX_HISTORY);
        assert!(!s.mutation_defaulter);
    }

    #[test]
    fn test_biz_envs_are_comma_split() {
        let s = settings(&[("BIZ_ENVS", "JAVA_OPTS, TRACE_ID,,")]).unwrap();
        assert_eq!(
            s.biz_envs.into_iter().collect::<Vec<_>>(),
            vec!["JAVA_OPTS".to_string(), "TRACE_ID".to_string()]
        );
    }

    #[test]
    fn test_bad_listen_address_is_rejected() {
        let result = settings(&[("WEBHOOK_ADDR", "not an address")]);
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }

    #[test]
    fn test_namespace_gate() {
        assert!(!ignores_namespace("dev", "shop-dev"));
        assert!(ignores_namespace("dev", "shop"));
        assert!(!ignores_namespace("auto", "shop-auto"));
        assert!(ignores_namespace("auto", "shop-dev"));
        assert!(!ignores_namespace("prod", "shop"));
        assert!(ignores_namespace("prod", "shop-dev"));
        assert!(ignores_namespace("test", "shop-auto"));
    }
}
