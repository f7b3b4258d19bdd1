//! `${APP}` / `${ENV}` / `${PORT}` macro substitution.

use crds::{Boot, EnvVar};
use k8s_openapi::api::core::v1::{EnvVar as ContainerEnvVar, Volume, VolumeMount};

const APP_MACRO: &str = "${APP}";
const ENV_MACRO: &str = "${ENV}";
const PORT_MACRO: &str = "${PORT}";
const REGISTRY_MACRO: &str = "${REGISTRY}";

/// Values substituted into config-provided strings for one Boot.
#[derive(Debug, Clone, Copy)]
pub struct Macros<'a> {
    pub app: &'a str,
    pub env: &'a str,
    pub port: i32,
}

impl<'a> Macros<'a> {
    /// Macros for `boot` under operator environment `env`.
    #[must_use]
    pub fn for_boot(boot: &'a Boot, env: &'a str) -> Self {
        Self {
            app: boot.name(),
            env,
            port: boot.spec.port,
        }
    }

    /// Replaces every macro in `origin`; the flag reports whether any matched.
    #[must_use]
    pub fn decode(&self, origin: &str) -> (String, bool) {
        if !origin.contains("${") {
            return (origin.to_string(), false);
        }
        let mut out = origin.to_string();
        let mut replaced = false;
        for (pattern, value) in [
            (APP_MACRO, self.app.to_string()),
            (ENV_MACRO, self.env.to_string()),
            (PORT_MACRO, self.port.to_string()),
        ] {
            if out.contains(pattern) {
                out = out.replace(pattern, &value);
                replaced = true;
            }
        }
        (out, replaced)
    }

    /// Decodes env values in place.
    pub fn decode_envs(&self, envs: &mut [EnvVar]) -> bool {
        let mut updated = false;
        for env in envs {
            let (value, replaced) = self.decode(&env.value);
            if replaced {
                env.value = value;
                updated = true;
            }
        }
        updated
    }

    /// Decodes container env values in place.
    pub fn decode_container_envs(&self, envs: &mut [ContainerEnvVar]) -> bool {
        let mut updated = false;
        for env in envs {
            if let Some(current) = env.value.as_deref() {
                let (value, replaced) = self.decode(current);
                if replaced {
                    env.value = Some(value);
                    updated = true;
                }
            }
        }
        updated
    }

    /// Decodes volume mount names in place.
    pub fn decode_volume_mounts(&self, mounts: &mut [VolumeMount]) {
        for mount in mounts {
            mount.name = self.decode(&mount.name).0;
        }
    }

    /// Decodes volume names and their claim names in place.
    pub fn decode_volumes(&self, volumes: &mut [Volume]) {
        for volume in volumes {
            volume.name = self.decode(&volume.name).0;
            if let Some(claim) = volume.persistent_volume_claim.as_mut() {
                claim.claim_name = self.decode(&claim.claim_name).0;
            }
        }
    }
}

/// Replaces `${REGISTRY}` in an image reference; no-op for an empty registry.
#[must_use]
pub fn decode_image(image: &str, registry: &str) -> String {
    if registry.is_empty() {
        image.to_string()
    } else {
        image.replace(REGISTRY_MACRO, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{BootKind, BootSpec};

    fn boot() -> Boot {
        Boot::new(
            BootKind::Java,
            "orders",
            "shop",
            BootSpec {
                port: 8081,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_decode_replaces_all_macros() {
        let boot = boot();
        let macros = Macros::for_boot(&boot, "test");

        let (value, replaced) = macros.decode("http://${APP}.${ENV}:${PORT}/${APP}");

        assert!(replaced);
        assert_eq!(value, "http://orders.test:8081/orders");
    }

    #[test]
    fn test_decode_without_macros_reports_nothing() {
        let boot = boot();
        let macros = Macros::for_boot(&boot, "test");

        assert_eq!(macros.decode("plain"), ("plain".to_string(), false));
        assert_eq!(macros.decode("${UNKNOWN}"), ("${UNKNOWN}".to_string(), false));
    }

    #[test]
    fn test_decode_envs_reports_changes() {
        let boot = boot();
        let macros = Macros::for_boot(&boot, "prod");
        let mut envs = vec![EnvVar::new("A", "${APP}"), EnvVar::new("B", "fixed")];

        assert!(macros.decode_envs(&mut envs));
        assert_eq!(envs[0].value, "orders");
        assert!(!macros.decode_envs(&mut envs));
    }

    #[test]
    fn test_decode_image_registry() {
        assert_eq!(decode_image("${REGISTRY}/agent:1", "hub.local"), "hub.local/agent:1");
        assert_eq!(decode_image("${REGISTRY}/agent:1", ""), "${REGISTRY}/agent:1");
    }
}
