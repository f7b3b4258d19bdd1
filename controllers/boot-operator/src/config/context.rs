//! Resolved configuration snapshot and its hot-swap handle.

use super::ConfigError;
use super::resolver::{BootConfig, parse_document, resolve_entry};
use crate::keys::ANNOTATION_PROFILE;
use crate::settings::ignores_namespace;
use crds::{Boot, BootKind};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

/// Immutable result of resolving one configuration document.
///
/// Every reconcile tick and admission request works on one snapshot; reloads
/// replace the whole snapshot.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    env: String,
    kinds: BTreeMap<BootKind, Arc<BootConfig>>,
    profiles: BTreeMap<String, Arc<BootConfig>>,
}

impl ResolvedContext {
    /// Resolves `content` for operator environment `env`.
    pub fn from_document(content: &str, env: &str) -> Result<Self, ConfigError> {
        let mut document = parse_document(content)?;

        let kinds = BootKind::ALL
            .iter()
            .map(|kind| {
                let operator = document.remove(kind.key()).unwrap_or_default();
                (*kind, Arc::new(resolve_entry(kind.key(), operator, env)))
            })
            .collect();

        let profiles = document
            .into_iter()
            .map(|(key, operator)| {
                let resolved = resolve_entry(&key, operator, env);
                (key, Arc::new(resolved))
            })
            .collect();

        Ok(Self {
            env: env.to_string(),
            kinds,
            profiles,
        })
    }

    /// Built-in defaults only.
    #[must_use]
    pub fn empty(env: &str) -> Self {
        let kinds = BootKind::ALL
            .iter()
            .map(|kind| (*kind, Arc::new(resolve_entry(kind.key(), Default::default(), env))))
            .collect();
        Self {
            env: env.to_string(),
            kinds,
            profiles: BTreeMap::new(),
        }
    }

    /// Operator environment id.
    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    #[must_use]
    pub fn ignores_namespace(&self, namespace: &str) -> bool {
        ignores_namespace(&self.env, namespace)
    }

    /// Resolved config of a kind.
    #[must_use]
    pub fn kind_config(&self, kind: BootKind) -> Arc<BootConfig> {
        self.kinds.get(&kind).map_or_else(
            || Arc::new(resolve_entry(kind.key(), Default::default(), &self.env)),
            Arc::clone,
        )
    }

    /// Profile names.
    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// The profile config selected by the Boot's `logan/profile` annotation.
    ///
    /// `Ok(None)` when the Boot selects no profile.
    pub fn profile_config(&self, boot: &Boot) -> Result<Option<Arc<BootConfig>>, ConfigError> {
        let Some(profile) = boot.annotation(ANNOTATION_PROFILE).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        if BootKind::from_key(profile).is_some() {
            return Err(ConfigError::ProfileNotAllowed(profile.to_string()));
        }
        self.profiles
            .get(profile)
            .cloned()
            .map(Some)
            .ok_or_else(|| ConfigError::ProfileMissing(profile.to_string()))
    }

    /// Config for a Boot: its profile when valid, its kind's config otherwise.
    #[must_use]
    pub fn boot_config(&self, boot: &Boot) -> Arc<BootConfig> {
        match self.profile_config(boot) {
            Ok(Some(cfg)) => cfg,
            Ok(None) => self.kind_config(boot.kind),
            Err(e) => {
                error!("{}: {}, using {} config", boot.key(), e, boot.kind);
                self.kind_config(boot.kind)
            }
        }
    }
}

/// Shared handle to the current [`ResolvedContext`].
///
/// Readers clone the inner `Arc`; a reload swaps it whole.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<ResolvedContext>>>,
}

impl ConfigHandle {
    #[must_use]
    pub fn new(context: ResolvedContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(context))),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<ResolvedContext> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the snapshot.
    pub fn swap(&self, context: ResolvedContext) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(context);
    }

    /// Resolves `content` and swaps it in. On error the previous snapshot stays.
    pub fn reload(&self, content: &str) -> Result<(), ConfigError> {
        let env = self.current().env().to_string();
        let context = ResolvedContext::from_document(content, &env)?;
        info!(
            "Configuration reloaded ({} profiles)",
            context.profiles().count()
        );
        self.swap(context);
        Ok(())
    }
}
