// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for tenant-cluster-operator.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation.

mod crd_tests {
    use tenant_cluster_operator::crd::{ClusterPhase, Condition};

    #[test]
    fn test_phase_display() {
        assert_eq!(ClusterPhase::Pending.to_string(), "Pending");
        assert_eq!(ClusterPhase::Reconciling.to_string(), "Reconciling");
        assert_eq!(ClusterPhase::Ready.to_string(), "Ready");
        assert_eq!(
            ClusterPhase::WaitingForDependency.to_string(),
            "WaitingForDependency"
        );
        assert_eq!(ClusterPhase::Failed.to_string(), "Failed");
        assert_eq!(ClusterPhase::Deleting.to_string(), "Deleting");
    }

    #[test]
    fn test_phase_default() {
        assert_eq!(ClusterPhase::default(), ClusterPhase::Pending);
    }

    #[test]
    fn test_condition_ready() {
        let condition = Condition::ready(true, "InSync", "Nothing to change", Some(1));
        assert_eq!(condition.r#type, "Ready");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason, "InSync");
        assert_eq!(condition.message, "Nothing to change");
        assert_eq!(condition.observed_generation, Some(1));
    }

    #[test]
    fn test_condition_not_ready() {
        let condition = Condition::ready(false, "WaitingForDependency", "tenant API down", None);
        assert_eq!(condition.status, "False");
    }

    #[test]
    fn test_condition_degraded() {
        let condition = Condition::degraded(true, "InvalidConfig", "bad base domain", Some(3));
        assert_eq!(condition.r#type, "Degraded");
        assert_eq!(condition.status, "True");
    }
}

mod context_tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use tenant_cluster_operator::controller::context::{DEFAULT_API_IP, ReconciliationContext};
    use tenant_cluster_operator::controller::error::Error;
    use tenant_cluster_operator::crd::{TenantCluster, TenantClusterSpec, VersionBundleRef};

    fn object(spec: TenantClusterSpec) -> TenantCluster {
        let mut obj = TenantCluster::new("al9qy", spec);
        obj.metadata.namespace = Some("org-acme".to_string());
        obj
    }

    fn spec(version: &str) -> TenantClusterSpec {
        TenantClusterSpec {
            cluster_id: None,
            base_domain: "gauss.eu-central-1.aws.example.com".to_string(),
            organization: "acme".to_string(),
            version_bundle: VersionBundleRef {
                version: version.to_string(),
            },
            api_ip: None,
        }
    }

    #[test]
    fn test_context_from_object_defaults() {
        let rc = ReconciliationContext::from_cluster(&object(spec("3.2.0"))).unwrap();
        assert_eq!(rc.cluster_id, "al9qy");
        assert_eq!(rc.namespace, "org-acme");
        assert_eq!(rc.api_domain, "api.al9qy.k8s.gauss.eu-central-1.aws.example.com");
        assert_eq!(rc.version_bundle_version, "3.2.0");
        assert_eq!(rc.api_ip, DEFAULT_API_IP);
        assert!(!rc.deletion_requested);
    }

    #[test]
    fn test_context_prefers_explicit_cluster_id() {
        let mut spec = spec("3.2.0");
        spec.cluster_id = Some("xyz12".to_string());
        spec.api_ip = Some("10.96.0.1".to_string());
        let rc = ReconciliationContext::from_cluster(&object(spec)).unwrap();
        assert_eq!(rc.cluster_id, "xyz12");
        assert_eq!(rc.api_ip, "10.96.0.1");
    }

    #[test]
    fn test_context_requires_version() {
        let err = ReconciliationContext::from_cluster(&object(spec(""))).unwrap_err();
        assert!(matches!(err, Error::MissingField(ref f) if f == "spec.versionBundle.version"));
    }

    #[test]
    fn test_context_requires_base_domain() {
        let mut spec = spec("3.2.0");
        spec.base_domain = String::new();
        let err = ReconciliationContext::from_cluster(&object(spec)).unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
    }

    #[test]
    fn test_context_marks_deletion() {
        let mut obj = object(spec("3.2.0"));
        obj.metadata.deletion_timestamp = Some(
            serde_json::from_value::<Time>(serde_json::json!("2024-01-01T00:00:00Z")).unwrap(),
        );
        let rc = ReconciliationContext::from_cluster(&obj).unwrap();
        assert!(rc.deletion_requested);
    }
}

mod validation_tests {
    use tenant_cluster_operator::controller::context::ReconciliationContext;
    use tenant_cluster_operator::controller::validation::{
        validate_base_domain, validate_cluster_id, validate_context, validate_organization,
        validate_version,
    };

    #[test]
    fn test_valid_context() {
        let rc = ReconciliationContext::new("al9qy", "example.com", "acme", "3.2.0");
        assert!(validate_context(&rc).is_ok());
    }

    #[test]
    fn test_cluster_id_rules() {
        assert!(validate_cluster_id("al9qy").is_ok());
        assert!(validate_cluster_id("a-1").is_ok());
        assert!(validate_cluster_id("").is_err());
        assert!(validate_cluster_id("-abc").is_err());
        assert!(validate_cluster_id("ABC").is_err());
        assert!(validate_cluster_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_base_domain_rules() {
        assert!(validate_base_domain("gauss.eu-central-1.aws.example.com").is_ok());
        assert!(validate_base_domain("localhost").is_err());
        assert!(validate_base_domain("Example.com").is_err());
        assert!(validate_base_domain("bad_domain.com").is_err());
    }

    #[test]
    fn test_organization_rules() {
        assert!(validate_organization("giantswarm").is_ok());
        assert!(validate_organization("Acme_Corp.eu").is_ok());
        assert!(validate_organization("").is_err());
        assert!(validate_organization("acme corp").is_err());
        assert!(validate_organization("_acme").is_err());
        assert!(validate_organization(&"o".repeat(64)).is_err());
    }

    #[test]
    fn test_version_rules() {
        assert_eq!(validate_version("4.0.0").unwrap().major, 4);
        assert!(validate_version("4.0").is_err());
    }

    #[test]
    fn test_invalid_api_ip() {
        let mut rc = ReconciliationContext::new("al9qy", "example.com", "acme", "3.2.0");
        rc.api_ip = "not-an-ip".to_string();
        assert!(validate_context(&rc).is_err());
    }
}

mod versions_tests {
    use tenant_cluster_operator::versions::{Provider, UnitKind, ValuesChart, bundle, bundles};

    #[test]
    fn test_supported_versions() {
        let versions: Vec<&str> = bundles(Provider::Aws).iter().map(|b| b.version).collect();
        assert_eq!(versions, vec!["3.2.0", "3.3.0", "4.0.0"]);
    }

    #[test]
    fn test_unit_order() {
        let b = bundle(Provider::Kvm, "3.2.0").unwrap();
        assert_eq!(
            b.units,
            vec![
                UnitKind::EncryptionKey,
                UnitKind::CertConfigs,
                UnitKind::Namespace,
                UnitKind::ChartValues,
                UnitKind::ChartOperator,
            ]
        );
    }

    #[test]
    fn test_latest_bundle_uses_stable_channel() {
        let b = bundle(Provider::Azure, "4.0.0").unwrap();
        assert_eq!(b.params.chart_channel, "stable");
        assert!(b.params.values_charts.contains(&ValuesChart::KubeStateMetrics));
    }

    #[test]
    fn test_unknown_version() {
        assert!(bundle(Provider::Aws, "9.9.9").is_none());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("AWS".parse::<Provider>().unwrap(), Provider::Aws);
        assert_eq!(Provider::Kvm.to_string(), "kvm");
        assert!("gcp".parse::<Provider>().is_err());
    }
}

mod config_tests {
    use std::time::Duration;

    use tenant_cluster_operator::OperatorConfig;
    use tenant_cluster_operator::versions::Provider;

    #[test]
    fn test_config_defaults() {
        let config = OperatorConfig::from_lookup(|_| None);
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.retry_max_attempts, 3);
    }

    #[test]
    fn test_config_overrides() {
        let config = OperatorConfig::from_lookup(|key| match key {
            "OPERATOR_PROVIDER" => Some("kvm".to_string()),
            "RESYNC_PERIOD_SECS" => Some("15".to_string()),
            "RETRY_MAX_ATTEMPTS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.provider, Provider::Kvm);
        assert_eq!(config.resync_period, Duration::from_secs(15));
        assert_eq!(config.retry_max_attempts, 1);
    }
}

mod error_tests {
    use tenant_cluster_operator::controller::error::Error;

    #[test]
    fn test_error_is_retryable() {
        let kube_err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "timeout".to_string(),
            reason: "Timeout".to_string(),
            code: 504,
        }));
        assert!(kube_err.is_retryable());

        let invalid = Error::InvalidConfig("invalid domain".to_string());
        assert!(!invalid.is_retryable());
        assert!(invalid.is_fatal());

        let transient_err = Error::Transient("temporary failure".to_string());
        assert!(transient_err.is_retryable());
    }

    #[test]
    fn test_cancellation_is_not_retried() {
        let unavailable = Error::DependencyUnavailable("tenant API".to_string());
        assert!(unavailable.is_cancellation());
        assert!(!unavailable.is_retryable());
        assert!(!unavailable.is_fatal());
    }
}

mod unit_state_machine_tests {
    use tenant_cluster_operator::controller::unit_state_machine::{
        UnitEvent, UnitPhase, UnitStateMachine,
    };

    #[test]
    fn test_happy_path() {
        let sm = UnitStateMachine::new();
        assert!(sm.can_transition(&UnitPhase::Idle, &UnitEvent::PassStarted));
        assert!(sm.can_transition(&UnitPhase::FetchingCurrent, &UnitEvent::CurrentFetched));
        assert!(sm.can_transition(&UnitPhase::FetchingDesired, &UnitEvent::DesiredFetched));
        assert!(sm.can_transition(&UnitPhase::Diffing, &UnitEvent::PatchComputed));
        assert!(sm.can_transition(&UnitPhase::Applying, &UnitEvent::ChangesApplied));
    }

    #[test]
    fn test_diffing_cannot_be_canceled() {
        let sm = UnitStateMachine::new();
        assert!(!sm.can_transition(&UnitPhase::Diffing, &UnitEvent::DependencyUnavailable));
    }

    #[test]
    fn test_terminal_phases_have_no_events() {
        let sm = UnitStateMachine::new();
        for phase in [UnitPhase::Done, UnitPhase::Canceled, UnitPhase::Failed] {
            assert!(phase.is_terminal());
            assert!(
                sm.valid_events(&phase).is_empty(),
                "{} should have no valid events",
                phase
            );
        }
    }
}

mod status_tests {
    use tenant_cluster_operator::controller::status::{
        ConditionBuilder, get_condition_reason, is_condition_true,
    };
    use tenant_cluster_operator::crd::Condition;

    #[test]
    fn test_condition_builder() {
        let mut builder = ConditionBuilder::new();
        builder.ready(true, "InSync", "Nothing to change", Some(1));
        builder.progressing(false, "PassComplete", "Done", Some(1));
        let conditions = builder.build();

        assert_eq!(conditions.len(), 2);
        assert!(is_condition_true(&conditions, "Ready"));
        assert!(!is_condition_true(&conditions, "Progressing"));
        assert_eq!(get_condition_reason(&conditions, "Ready"), Some("InSync"));
    }

    #[test]
    fn test_condition_builder_updates_existing() {
        let mut builder = ConditionBuilder::new();
        builder.ready(false, "WaitingForDependency", "tenant API down", Some(1));
        builder.ready(true, "InSync", "All ready now", Some(1));
        let conditions = builder.build();

        // Should only have one Ready condition (updated)
        assert_eq!(conditions.len(), 1);
        assert!(is_condition_true(&conditions, "Ready"));
    }

    #[test]
    fn test_is_condition_true_missing() {
        let conditions: Vec<Condition> = vec![];
        assert!(!is_condition_true(&conditions, "Ready"));
    }
}
