//! Revision snapshots of Boot specs.
//!
//! A revision is created only when the content hash of the snapshot differs
//! from the latest revision's hash. Ids start at 1 and grow by one; retention
//! deletes the oldest revisions beyond the configured bound.

use crate::keys::{
    ANNOTATION_PROFILE, ANNOTATION_REVISION, ANNOTATION_REVISION_DIFF, ANNOTATION_REVISION_HASH,
    ANNOTATION_REVISION_PHASE, ANNOTATION_REVISION_RETRY,
};
use crate::line_diff::line_diff;
use crate::workload::pod_labels;
use crds::{Boot, BootRevision, BootRevisionSpec, BootSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Orphaned revisions are deleted after this many owner lookups.
pub const MAX_ORPHAN_RETRIES: u32 = 20;

/// Lifecycle phase stored in the phase annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionPhase {
    /// Latest revision, rollout not finished
    Running,
    /// Latest revision, all replicas available
    Active,
    /// Superseded after being Active
    Complete,
    /// Superseded before reaching Active
    Cancelled,
}

impl RevisionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RevisionPhase::Running => "Running",
            RevisionPhase::Active => "Active",
            RevisionPhase::Complete => "Complete",
            RevisionPhase::Cancelled => "Cancelled",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(RevisionPhase::Running),
            "Active" => Some(RevisionPhase::Active),
            "Complete" => Some(RevisionPhase::Complete),
            "Cancelled" => Some(RevisionPhase::Cancelled),
            _ => None,
        }
    }

    /// Phase of a latest revision once a newer one exists.
    #[must_use]
    pub fn superseded(self) -> Self {
        match self {
            RevisionPhase::Running => RevisionPhase::Cancelled,
            RevisionPhase::Active => RevisionPhase::Complete,
            other => other,
        }
    }
}

impl fmt::Display for RevisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn annotation<'a>(rev: &'a BootRevision, key: &str) -> Option<&'a str> {
    rev.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Numeric id of a revision, if its id annotation is valid.
#[must_use]
pub fn revision_id(rev: &BootRevision) -> Option<u64> {
    annotation(rev, ANNOTATION_REVISION).and_then(|id| id.parse().ok())
}

#[must_use]
pub fn revision_hash(rev: &BootRevision) -> Option<&str> {
    annotation(rev, ANNOTATION_REVISION_HASH)
}

#[must_use]
pub fn revision_phase(rev: &BootRevision) -> Option<RevisionPhase> {
    annotation(rev, ANNOTATION_REVISION_PHASE).and_then(RevisionPhase::parse)
}

/// Owner lookups attempted so far for an orphaned revision.
#[must_use]
pub fn retry_count(rev: &BootRevision) -> u32 {
    annotation(rev, ANNOTATION_REVISION_RETRY)
        .and_then(|r| r.parse().ok())
        .unwrap_or(0)
}

/// Sets the phase annotation; returns whether it changed.
pub fn set_phase(rev: &mut BootRevision, phase: RevisionPhase) -> bool {
    let annotations = rev.metadata.annotations.get_or_insert_with(BTreeMap::new);
    if annotations.get(ANNOTATION_REVISION_PHASE).map(String::as_str) == Some(phase.as_str()) {
        return false;
    }
    annotations.insert(ANNOTATION_REVISION_PHASE.to_string(), phase.to_string());
    true
}

/// Latest revision: highest id.
#[must_use]
pub fn latest(revisions: &[BootRevision]) -> Option<&BootRevision> {
    revisions
        .iter()
        .filter_map(|r| revision_id(r).map(|id| (id, r)))
        .max_by_key(|(id, _)| *id)
        .map(|(_, r)| r)
}

/// Spec stored in a revision: replicas 0, business env names removed.
#[must_use]
pub fn snapshot_spec(spec: &BootSpec, biz_envs: &BTreeSet<String>) -> BootSpec {
    let mut snapshot = spec.clone();
    snapshot.replicas = Some(0);
    snapshot.env.retain(|e| !biz_envs.contains(&e.name));
    snapshot
}

/// Writes `value` as JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex sha256 of the snapshot spec and the profile, independent of key order.
///
/// # Errors
///
/// Fails only if the spec cannot be represented as JSON.
pub fn content_hash(spec: &BootSpec, profile: &str) -> Result<String, serde_json::Error> {
    let value = serde_json::json!({
        "spec": serde_json::to_value(spec)?,
        "profile": profile,
    });
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Line diff between two specs in YAML form.
#[must_use]
pub fn spec_diff(old: &BootSpec, new: &BootSpec) -> String {
    let render = |spec: &BootSpec| serde_yaml::to_string(spec).unwrap_or_default();
    line_diff(&render(old), &render(new))
}

/// What recording a revision for a Boot requires.
#[derive(Debug, Clone)]
pub struct RevisionPlan {
    /// New latest revision
    pub create: BootRevision,
    /// Previous latest revision with its superseded phase, when it changed
    pub supersede: Option<BootRevision>,
    /// Names of the oldest revisions beyond the retention bound
    pub prune: Vec<String>,
}

/// Plans the revision for `boot` given its existing revisions. `None` when the
/// latest revision already holds the same content.
///
/// # Errors
///
/// Fails only if the spec cannot be represented as JSON.
pub fn plan(
    boot: &Boot,
    existing: &[BootRevision],
    biz_envs: &BTreeSet<String>,
    max_history: usize,
) -> Result<Option<RevisionPlan>, serde_json::Error> {
    let profile = boot.annotation(ANNOTATION_PROFILE).unwrap_or_default();
    let snapshot = snapshot_spec(&boot.spec, biz_envs);
    let hash = content_hash(&snapshot, profile)?;

    let previous = latest(existing);
    if previous.and_then(revision_hash) == Some(hash.as_str()) {
        return Ok(None);
    }

    let id = previous.and_then(revision_id).map_or(1, |id| id + 1);
    let diff = previous.map_or_else(
        || spec_diff(&BootSpec::default(), &snapshot),
        |p| spec_diff(&p.spec.boot, &snapshot),
    );

    let create = new_revision(boot, snapshot, id, &hash, &diff, profile);

    let supersede = previous.and_then(|p| {
        let phase = revision_phase(p)?;
        let mut p = p.clone();
        set_phase(&mut p, phase.superseded()).then_some(p)
    });

    let keep = max_history.max(1);
    let mut ordered: Vec<(u64, String)> = existing
        .iter()
        .map(|r| (revision_id(r).unwrap_or(0), r.metadata.name.clone().unwrap_or_default()))
        .collect();
    ordered.sort();
    let excess = (ordered.len() + 1).saturating_sub(keep);
    let prune = ordered.into_iter().take(excess).map(|(_, name)| name).collect();

    Ok(Some(RevisionPlan {
        create,
        supersede,
        prune,
    }))
}

fn new_revision(
    boot: &Boot,
    snapshot: BootSpec,
    id: u64,
    hash: &str,
    diff: &str,
    profile: &str,
) -> BootRevision {
    let mut annotations = BTreeMap::from([
        (ANNOTATION_REVISION.to_string(), id.to_string()),
        (ANNOTATION_REVISION_HASH.to_string(), hash.to_string()),
        (
            ANNOTATION_REVISION_PHASE.to_string(),
            RevisionPhase::Running.to_string(),
        ),
        (ANNOTATION_REVISION_DIFF.to_string(), diff.to_string()),
        (ANNOTATION_REVISION_RETRY.to_string(), "0".to_string()),
    ]);
    if !profile.is_empty() {
        annotations.insert(ANNOTATION_PROFILE.to_string(), profile.to_string());
    }

    BootRevision {
        metadata: ObjectMeta {
            name: Some(format!("{}-{}", boot.name(), id)),
            namespace: Some(boot.namespace().to_string()),
            labels: Some(pod_labels(boot)),
            annotations: Some(annotations),
            owner_references: Some(vec![boot.owner_reference()]),
            ..Default::default()
        },
        spec: BootRevisionSpec {
            boot: snapshot,
            boot_type: boot.kind.key().to_string(),
            app_key: boot.kind.app_key().to_string(),
        },
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{BootKind, EnvVar};

    fn boot(version: &str) -> Boot {
        let mut boot = Boot::new(
            BootKind::Java,
            "orders",
            "shop",
            BootSpec {
                image: "orders".to_string(),
                version: version.to_string(),
                replicas: Some(3),
                env: vec![EnvVar::new("A", "1"), EnvVar::new("BUILD_ID", "42")],
                ..Default::default()
            },
        );
        boot.metadata.uid = Some("uid-1".to_string());
        boot
    }

    fn apply(existing: &mut Vec<BootRevision>, plan: RevisionPlan) {
        existing.retain(|r| !plan.prune.contains(r.metadata.name.as_ref().unwrap()));
        if let Some(prev) = plan.supersede {
            for r in existing.iter_mut() {
                if r.metadata.name == prev.metadata.name {
                    *r = prev.clone();
                }
            }
        }
        existing.push(plan.create);
    }

    #[test]
    fn test_first_revision() {
        let biz = BTreeSet::from(["BUILD_ID".to_string()]);
        let plan = plan(&boot("1.0"), &[], &biz, 10).unwrap().unwrap();
        let rev = &plan.create;
        assert_eq!(rev.metadata.name.as_deref(), Some("orders-1"));
        assert_eq!(revision_id(rev), Some(1));
        assert_eq!(revision_phase(rev), Some(RevisionPhase::Running));
        assert_eq!(retry_count(rev), 0);
        assert_eq!(rev.spec.boot.replicas, Some(0));
        assert_eq!(rev.spec.boot.env, vec![EnvVar::new("A", "1")]);
        assert_eq!(rev.spec.boot_type, "java");
        assert_eq!(rev.spec.app_key, "javaBoot");
        assert!(plan.supersede.is_none());
        assert!(plan.prune.is_empty());
    }

    #[test]
    fn test_same_content_creates_nothing() {
        let biz = BTreeSet::from(["BUILD_ID".to_string()]);
        let first = plan(&boot("1.0"), &[], &biz, 10).unwrap().unwrap();
        let existing = vec![first.create];

        // replicas and business env do not count
        let mut scaled = boot("1.0");
        scaled.spec.replicas = Some(7);
        scaled.spec.env[1].value = "43".to_string();
        assert!(plan(&scaled, &existing, &biz, 10).unwrap().is_none());
    }

    #[test]
    fn test_new_content_supersedes_previous() {
        let biz = BTreeSet::new();
        let mut existing = Vec::new();
        let first = plan(&boot("1.0"), &existing, &biz, 10).unwrap().unwrap();
        apply(&mut existing, first);
        set_phase(&mut existing[0], RevisionPhase::Active);

        let next = plan(&boot("1.1"), &existing, &biz, 10).unwrap().unwrap();
        assert_eq!(revision_id(&next.create), Some(2));
        let diff = annotation(&next.create, ANNOTATION_REVISION_DIFF).unwrap();
        assert!(diff.contains("+version: '1.1'") || diff.contains("+version: \"1.1\""));
        let prev = next.supersede.unwrap();
        assert_eq!(revision_phase(&prev), Some(RevisionPhase::Complete));
    }

    #[test]
    fn test_ids_increase_and_retention_is_bounded() {
        let biz = BTreeSet::new();
        let mut existing = Vec::new();
        for i in 0..6 {
            let next = plan(&boot(&format!("1.{i}")), &existing, &biz, 3).unwrap().unwrap();
            apply(&mut existing, next);
            assert!(existing.len() <= 3);
        }
        let mut ids: Vec<u64> = existing.iter().filter_map(revision_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(latest(&existing).and_then(revision_id), Some(6));
    }

    #[test]
    fn test_hash_ignores_key_order_and_tracks_profile() {
        let spec = snapshot_spec(&boot("1.0").spec, &BTreeSet::new());
        let mut reordered = spec.clone();
        reordered.node_selector.insert("b".to_string(), "2".to_string());
        reordered.node_selector.insert("a".to_string(), "1".to_string());
        let mut ordered = spec.clone();
        ordered.node_selector.insert("a".to_string(), "1".to_string());
        ordered.node_selector.insert("b".to_string(), "2".to_string());

        assert_eq!(
            content_hash(&reordered, "").unwrap(),
            content_hash(&ordered, "").unwrap()
        );
        assert_ne!(
            content_hash(&spec, "").unwrap(),
            content_hash(&spec, "big-memory").unwrap()
        );
    }

    #[test]
    fn test_superseded_phases() {
        assert_eq!(RevisionPhase::Running.superseded(), RevisionPhase::Cancelled);
        assert_eq!(RevisionPhase::Active.superseded(), RevisionPhase::Complete);
        assert_eq!(RevisionPhase::Complete.superseded(), RevisionPhase::Complete);
    }
}
