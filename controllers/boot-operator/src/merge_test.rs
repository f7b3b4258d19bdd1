//! Unit tests for the merge engine

#[cfg(test)]
mod tests {
    use crate::merge::*;
    use crds::{BootSpec, EnvVar};
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> Vec<EnvVar> {
        pairs.iter().map(|(n, v)| EnvVar::new(*n, *v)).collect()
    }

    fn names(list: &[EnvVar]) -> Vec<&str> {
        list.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_env_override_replaces_in_place_and_appends_in_order() {
        let mut dst = env(&[("A", "1"), ("B", "2")]);
        let src = env(&[("C", "3"), ("B", "20"), ("D", "4")]);

        let outcome = merge_named(&mut dst, &src, MergeMode::Override);

        assert_eq!(outcome, MergeOutcome::Merged);
        assert_eq!(names(&dst), vec!["A", "B", "C", "D"]);
        assert_eq!(dst[1].value, "20");
    }

    #[test]
    fn test_env_keep_existing_preserves_collisions() {
        let mut dst = env(&[("A", "1"), ("B", "2")]);
        let src = env(&[("B", "20"), ("C", "3")]);

        let outcome = merge_named(&mut dst, &src, MergeMode::KeepExisting);

        assert_eq!(outcome, MergeOutcome::Merged);
        assert_eq!(dst, env(&[("A", "1"), ("B", "2"), ("C", "3")]));
    }

    #[test]
    fn test_env_merge_law() {
        let cases = [
            (env(&[]), env(&[("X", "1")])),
            (env(&[("X", "0"), ("Y", "y")]), env(&[("X", "1")])),
            (env(&[("A", "a"), ("B", "b")]), env(&[("B", "B"), ("C", "c"), ("A", "A")])),
            (env(&[("A", "a")]), env(&[])),
        ];

        for (dst, src) in cases {
            let mut once = dst.clone();
            let _ = merge_named(&mut once, &src, MergeMode::Override);
            let mut twice = once.clone();
            let second = merge_named(&mut twice, &src, MergeMode::Override);

            // idempotent
            assert_eq!(once, twice);
            assert_eq!(second, MergeOutcome::Unchanged);

            // union of names, src values win
            for entry in dst.iter().chain(src.iter()) {
                assert!(once.iter().any(|e| e.name == entry.name), "missing {}", entry.name);
            }
            for entry in &src {
                let merged = once.iter().find(|e| e.name == entry.name);
                assert_eq!(merged.map(|e| e.value.as_str()), Some(entry.value.as_str()));
            }
        }
    }

    #[test]
    fn test_record_override_skips_zero_fields() {
        let mut dst = BootSpec {
            image: "app".to_string(),
            port: 8080,
            health: Some("/health".to_string()),
            ..Default::default()
        };
        let src = BootSpec {
            port: 9090,
            ..Default::default()
        };

        let outcome = merge_override(&mut dst, &src);

        assert_eq!(outcome, MergeOutcome::Merged);
        assert_eq!(dst.port, 9090);
        assert_eq!(dst.image, "app");
        assert_eq!(dst.health.as_deref(), Some("/health"));
    }

    #[test]
    fn test_record_merge_uses_keyed_env_merge() {
        let mut dst = BootSpec {
            env: env(&[("A", "1"), ("B", "2")]),
            ..Default::default()
        };
        let src = BootSpec {
            env: env(&[("B", "3"), ("C", "4")]),
            ..Default::default()
        };

        let _ = merge_override(&mut dst, &src);

        assert_eq!(dst.env, env(&[("A", "1"), ("B", "3"), ("C", "4")]));
    }

    #[test]
    fn test_other_lists_are_replaced_whole() {
        let mut dst = BootSpec {
            command: vec!["java".to_string(), "-jar".to_string(), "app.jar".to_string()],
            ..Default::default()
        };
        let src = BootSpec {
            command: vec!["sh".to_string()],
            ..Default::default()
        };

        let _ = merge_override(&mut dst, &src);
        assert_eq!(dst.command, vec!["sh".to_string()]);

        let mut kept = BootSpec {
            command: vec!["java".to_string()],
            ..Default::default()
        };
        let outcome = merge_keep_existing(&mut kept, &src);
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(kept.command, vec!["java".to_string()]);
    }

    #[test]
    fn test_nested_maps_merge_key_by_key() {
        let mut dst = json!({"nodeSelector": {"zone": "a", "disk": "ssd"}, "dnsPolicy": "ClusterFirst"});
        let src = json!({"nodeSelector": {"zone": "b", "gpu": "yes"}});

        let changed = merge_values(&mut dst, &src, MergeMode::Override);

        assert_eq!(changed, Ok(true));
        assert_eq!(
            dst,
            json!({"nodeSelector": {"zone": "b", "disk": "ssd", "gpu": "yes"}, "dnsPolicy": "ClusterFirst"})
        );
    }

    #[test]
    fn test_shape_mismatch_fails_and_leaves_dst_untouched() {
        let mut dst = json!({"containers": [{"name": "app"}], "dnsPolicy": "ClusterFirst"});
        let before = dst.clone();
        let src = json!({"dnsPolicy": "Default", "containers": {"name": "app"}});

        let result = merge_values(&mut dst, &src, MergeMode::Override);

        assert!(result.is_err());
        assert_eq!(dst, before);
    }

    #[test]
    fn test_failed_typed_merge_reports_outcome() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Target {
            port: i32,
        }
        let mut dst = Target { port: 1 };

        let outcome = merge_override(&mut dst, &json!({"port": "not-a-number"}));

        assert!(matches!(outcome, MergeOutcome::Failed(_)));
        assert_eq!(dst, Target { port: 1 });
    }
}
