//! Desired Deployment and Services for a Boot.

use crate::config::{AppSpec, BootConfig};
use crate::keys::{
    ANNOTATION_RESTARTED_AT, LABEL_APP, LABEL_APP_VALUE, LABEL_BOOT_NAME, LABEL_BOOT_TYPE,
    LABEL_DEPLOY_TYPE, LABEL_ENV, PROMETHEUS_PATH, PROMETHEUS_PORT, PROMETHEUS_SCHEME,
    PROMETHEUS_SCRAPE,
};
use crate::merge::merge_override;
use crate::template::Macros;
use crds::{Boot, BootKind, PvcMount};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvVar as ContainerEnvVar, HTTPGetAction,
    PersistentVolumeClaimVolumeSource, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Name of the app container
pub const APP_CONTAINER: &str = "app";
/// Name of the app container port and of every service port
pub const HTTP_PORT_NAME: &str = "http";

const IMAGE_PULL_POLICY: &str = "Always";
const REVISION_HISTORY_LIMIT: i32 = 5;
const ANTI_AFFINITY_WEIGHT: i32 = 100;
const HOSTNAME_TOPOLOGY: &str = "kubernetes.io/hostname";
const PROMETHEUS_PATH_VALUE: &str = "/prometheus";
pub const SESSION_AFFINITY_NONE: &str = "None";
pub const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";
pub const SERVICE_TYPE_NODE_PORT: &str = "NodePort";

/// Labels of the Deployment object itself.
#[must_use]
pub fn deploy_labels(boot: &Boot) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), LABEL_APP_VALUE.to_string()),
        (LABEL_DEPLOY_TYPE.to_string(), boot.name().to_string()),
    ])
}

/// Pod labels: Deployment selector, primary Service selector and revision labels.
#[must_use]
pub fn pod_labels(boot: &Boot) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), LABEL_APP_VALUE.to_string()),
        (LABEL_BOOT_NAME.to_string(), boot.name().to_string()),
        (LABEL_BOOT_TYPE.to_string(), boot.kind.key().to_string()),
    ])
}

/// Labels of every Service of a Boot; also the selector of the sidecar set.
#[must_use]
pub fn service_labels(boot: &Boot, env: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), boot.name().to_string()),
        (LABEL_ENV.to_string(), env.to_string()),
    ])
}

#[must_use]
pub fn nodeport_service_name(boot: &Boot) -> String {
    format!("{}-nodeport", boot.name())
}

#[must_use]
pub fn sidecar_service_name(boot: &Boot, service: &str) -> String {
    format!("{}-{}", boot.name(), service)
}

/// `registry/image:version` of the app container.
#[must_use]
pub fn app_image(boot: &Boot, app: &AppSpec) -> String {
    let registry = app.settings().registry;
    if registry.is_empty() {
        format!("{}:{}", boot.spec.image, boot.spec.version)
    } else {
        format!("{}/{}:{}", registry, boot.spec.image, boot.spec.version)
    }
}

/// Probe port: `settings.appHealthPort` when set, the Boot port otherwise.
#[must_use]
pub fn health_port(boot: &Boot, app: &AppSpec) -> i32 {
    let port = app.settings().app_health_port;
    if port > 0 { port } else { boot.spec.port }
}

/// Whether Services of this Boot carry Prometheus scrape annotations.
#[must_use]
pub fn allows_prometheus_scrape(boot: &Boot, app: &AppSpec) -> bool {
    match boot.spec.prometheus.as_str() {
        "true" => true,
        "false" => false,
        _ => app.settings().prometheus_scrape.unwrap_or(true),
    }
}

/// Prometheus scrape annotations for a service port.
#[must_use]
pub fn service_annotations(port: i32) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PROMETHEUS_PATH.to_string(), PROMETHEUS_PATH_VALUE.to_string()),
        (PROMETHEUS_PORT.to_string(), port.to_string()),
        (PROMETHEUS_SCHEME.to_string(), "http".to_string()),
        (PROMETHEUS_SCRAPE.to_string(), "true".to_string()),
    ])
}

/// Container ports of the app container.
#[must_use]
pub fn app_container_ports(boot: &Boot) -> Vec<ContainerPort> {
    vec![ContainerPort {
        name: Some(HTTP_PORT_NAME.to_string()),
        container_port: boot.spec.port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]
}

/// Boot env in container form.
#[must_use]
pub fn app_container_env(boot: &Boot) -> Vec<ContainerEnvVar> {
    boot.spec
        .env
        .iter()
        .map(|e| ContainerEnvVar {
            name: e.name.clone(),
            value: (!e.value.is_empty()).then(|| e.value.clone()),
            value_from: None,
        })
        .collect()
}

/// Boot resources in container form; `None` when the Boot sets none.
#[must_use]
pub fn app_container_resources(boot: &Boot) -> Option<ResourceRequirements> {
    let to_quantities = |list: &BTreeMap<String, String>| {
        (!list.is_empty()).then(|| {
            list.iter()
                .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                .collect::<BTreeMap<_, _>>()
        })
    };
    let resources = &boot.spec.resources;
    if resources.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        limits: to_quantities(&resources.limits),
        requests: to_quantities(&resources.requests),
        ..Default::default()
    })
}

/// Mounts for the Boot's claims.
#[must_use]
pub fn pvc_volume_mounts(pvcs: &[PvcMount]) -> Vec<VolumeMount> {
    pvcs.iter()
        .map(|p| VolumeMount {
            name: p.name.clone(),
            mount_path: p.mount_path.clone(),
            read_only: Some(p.read_only),
            ..Default::default()
        })
        .collect()
}

/// Volumes for the Boot's claims.
#[must_use]
pub fn pvc_volumes(pvcs: &[PvcMount]) -> Vec<Volume> {
    pvcs.iter()
        .map(|p| Volume {
            name: p.name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: p.name.clone(),
                read_only: Some(p.read_only),
            }),
            ..Default::default()
        })
        .collect()
}

/// Path of the readiness probe (the health path unless `readiness` is set).
#[must_use]
pub fn readiness_path(boot: &Boot) -> Option<&str> {
    let health = boot.spec.health.as_deref().filter(|h| !h.is_empty())?;
    Some(
        boot.spec
            .readiness
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(health),
    )
}

/// Builds the objects one Boot owns.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadBuilder<'a> {
    boot: &'a Boot,
    cfg: &'a BootConfig,
    env: &'a str,
}

impl<'a> WorkloadBuilder<'a> {
    #[must_use]
    pub fn new(boot: &'a Boot, cfg: &'a BootConfig, env: &'a str) -> Self {
        Self { boot, cfg, env }
    }

    fn macros(&self) -> Macros<'a> {
        Macros::for_boot(self.boot, self.env)
    }

    /// Liveness and readiness probes; `None` when health checks are disabled.
    #[must_use]
    pub fn health_probes(&self) -> Option<(Probe, Probe)> {
        let health = self.boot.spec.health.as_deref().filter(|h| !h.is_empty())?;
        let port = health_port(self.boot, &self.cfg.app);
        let failure_threshold = if self.boot.kind == BootKind::Python { 15 } else { 10 };

        let probe = |path: &str, initial_delay: i32| Probe {
            failure_threshold: Some(failure_threshold),
            http_get: Some(HTTPGetAction {
                path: Some(path.to_string()),
                port: IntOrString::Int(port),
                scheme: Some("HTTP".to_string()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(initial_delay),
            period_seconds: Some(10),
            success_threshold: Some(1),
            timeout_seconds: Some(5),
            ..Default::default()
        };

        let readiness = readiness_path(self.boot).unwrap_or(health);
        Some((probe(health, 120), probe(readiness, 60)))
    }

    /// The app container.
    #[must_use]
    pub fn app_container(&self) -> Container {
        let boot = self.boot;
        let mut container = Container {
            name: APP_CONTAINER.to_string(),
            image: Some(app_image(boot, &self.cfg.app)),
            image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
            ports: Some(app_container_ports(boot)),
            env: Some(app_container_env(boot)).filter(|e| !e.is_empty()),
            resources: app_container_resources(boot),
            command: Some(boot.spec.command.clone()).filter(|c| !c.is_empty()),
            ..Default::default()
        };

        if let Some((liveness, readiness)) = self.health_probes() {
            container.liveness_probe = Some(liveness);
            container.readiness_probe = Some(readiness);
        }

        if let Some(overrides) = &self.cfg.app.container {
            let _ = merge_override(&mut container, overrides).log_failure("container", &boot.key());
        }

        if !boot.spec.pvc.is_empty() {
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            mounts.extend(pvc_volume_mounts(&boot.spec.pvc));
            self.macros().decode_volume_mounts(mounts);
        }

        container
    }

    /// The Deployment (name = Boot name), owned by the Boot.
    #[must_use]
    pub fn deployment(&self) -> Deployment {
        let boot = self.boot;
        let pod_labels = pod_labels(boot);
        let macros = self.macros();

        let mut containers = vec![self.app_container()];
        for sidecar in &self.cfg.sidecar_containers {
            let mut sidecar = sidecar.clone();
            if let Some(env) = sidecar.env.as_mut() {
                macros.decode_container_envs(env);
            }
            containers.push(sidecar);
        }

        let template_annotations: BTreeMap<String, String> = boot
            .annotation(ANNOTATION_RESTARTED_AT)
            .map(|v| BTreeMap::from([(ANNOTATION_RESTARTED_AT.to_string(), v.to_string())]))
            .unwrap_or_default();

        let mut pod_spec = PodSpec {
            affinity: Some(Affinity {
                pod_anti_affinity: Some(PodAntiAffinity {
                    preferred_during_scheduling_ignored_during_execution: Some(vec![
                        WeightedPodAffinityTerm {
                            weight: ANTI_AFFINITY_WEIGHT,
                            pod_affinity_term: PodAffinityTerm {
                                label_selector: Some(LabelSelector {
                                    match_expressions: Some(vec![LabelSelectorRequirement {
                                        key: LABEL_BOOT_NAME.to_string(),
                                        operator: "In".to_string(),
                                        values: Some(vec![boot.name().to_string()]),
                                    }]),
                                    ..Default::default()
                                }),
                                topology_key: HOSTNAME_TOPOLOGY.to_string(),
                                ..Default::default()
                            },
                        },
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            containers,
            node_selector: Some(boot.spec.node_selector.clone()).filter(|s| !s.is_empty()),
            ..Default::default()
        };

        if let Some(overrides) = &self.cfg.app.pod_spec {
            let _ = merge_override(&mut pod_spec, overrides).log_failure("podSpec", &boot.key());
            if let Some(init_containers) = pod_spec.init_containers.as_mut() {
                for init in init_containers {
                    if let Some(env) = init.env.as_mut() {
                        macros.decode_container_envs(env);
                    }
                }
            }
        }

        if !boot.spec.pvc.is_empty() {
            pod_spec
                .volumes
                .get_or_insert_with(Vec::new)
                .extend(pvc_volumes(&boot.spec.pvc));
        }
        if let Some(volumes) = pod_spec.volumes.as_mut() {
            macros.decode_volumes(volumes);
        }

        let strategy = (boot.kind == BootKind::Java).then(|| DeploymentStrategy {
            type_: Some("RollingUpdate".to_string()),
            rolling_update: Some(RollingUpdateDeployment {
                max_unavailable: Some(IntOrString::String("1%".to_string())),
                ..Default::default()
            }),
        });

        Deployment {
            metadata: ObjectMeta {
                name: Some(boot.name().to_string()),
                namespace: Some(boot.namespace().to_string()),
                labels: Some(deploy_labels(boot)),
                owner_references: Some(vec![boot.owner_reference()]),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: boot.spec.replicas,
                revision_history_limit: Some(REVISION_HISTORY_LIMIT),
                selector: LabelSelector {
                    match_labels: Some(pod_labels.clone()),
                    ..Default::default()
                },
                strategy,
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        annotations: Some(template_annotations).filter(|a| !a.is_empty()),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    /// One Service of this Boot.
    #[must_use]
    pub fn service(&self, name: &str, port: i32, prometheus: bool, service_type: &str) -> Service {
        let boot = self.boot;
        let affinity = if boot.spec.session_affinity.is_empty() {
            SESSION_AFFINITY_NONE.to_string()
        } else {
            boot.spec.session_affinity.clone()
        };

        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(boot.namespace().to_string()),
                labels: Some(service_labels(boot, self.env)),
                annotations: prometheus.then(|| service_annotations(port)),
                owner_references: Some(vec![boot.owner_reference()]),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(HTTP_PORT_NAME.to_string()),
                    port,
                    target_port: Some(IntOrString::Int(port)),
                    ..Default::default()
                }]),
                selector: Some(pod_labels(boot)),
                type_: Some(service_type.to_string()),
                session_affinity: Some(affinity),
                ..Default::default()
            }),
            status: None,
        }
    }

    /// The primary Service (name = Boot name).
    #[must_use]
    pub fn primary_service(&self) -> Service {
        let scrape = allows_prometheus_scrape(self.boot, &self.cfg.app);
        self.service(self.boot.name(), self.boot.spec.port, scrape, SERVICE_TYPE_CLUSTER_IP)
    }

    /// Every Service except the primary one: the dev NodePort Service and one
    /// Service per configured sidecar service.
    #[must_use]
    pub fn secondary_services(&self) -> Vec<Service> {
        let boot = self.boot;
        let mut services = Vec::new();
        if self.env == "dev" && boot.spec.node_port == "true" {
            services.push(self.service(
                &nodeport_service_name(boot),
                boot.spec.port,
                false,
                SERVICE_TYPE_NODE_PORT,
            ));
        }
        for sidecar in &self.cfg.sidecar_services {
            services.push(self.service(
                &sidecar_service_name(boot, &sidecar.name),
                sidecar.port,
                true,
                SERVICE_TYPE_CLUSTER_IP,
            ));
        }
        services
    }
}
