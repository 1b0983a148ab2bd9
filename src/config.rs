//! Operator configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::versions::Provider;

/// Runtime settings of one operator process.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Pod name, used as leader election identity
    pub pod_name: Option<String>,
    /// Pod namespace, where the leader lease lives
    pub pod_namespace: Option<String>,
    pub provider: Provider,
    /// Requeue interval after every pass, including canceled ones
    pub resync_period: Duration,
    /// Upper bound for a single pass
    pub pass_deadline: Duration,
    /// In-pass attempts per unit step
    pub retry_max_attempts: u32,
    /// Directory packages are pulled from
    pub chart_registry_dir: PathBuf,
    /// helm executable used for chart releases
    pub helm_binary: String,
}

/// Upper bound for `PASS_DEADLINE_SECS`
pub const MAX_PASS_DEADLINE: Duration = Duration::from_secs(60 * 60);

/// Upper bound for `RESYNC_PERIOD_SECS`
pub const MAX_RESYNC_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            pod_name: None,
            pod_namespace: None,
            provider: Provider::default(),
            resync_period: Duration::from_secs(60),
            pass_deadline: Duration::from_secs(300),
            retry_max_attempts: 3,
            chart_registry_dir: PathBuf::from("/var/lib/tenant-cluster-operator/charts"),
            helm_binary: "helm".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Invalid values fall back to
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            pod_name: lookup("POD_NAME"),
            pod_namespace: lookup("POD_NAMESPACE"),
            provider: parse_or(&lookup, "OPERATOR_PROVIDER", defaults.provider),
            resync_period: parse_secs(
                &lookup,
                "RESYNC_PERIOD_SECS",
                defaults.resync_period,
                MAX_RESYNC_PERIOD,
            ),
            pass_deadline: parse_secs(
                &lookup,
                "PASS_DEADLINE_SECS",
                defaults.pass_deadline,
                MAX_PASS_DEADLINE,
            ),
            retry_max_attempts: parse_or(
                &lookup,
                "RETRY_MAX_ATTEMPTS",
                defaults.retry_max_attempts,
            )
            .max(1),
            chart_registry_dir: lookup("CHART_REGISTRY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.chart_registry_dir),
            helm_binary: lookup("HELM_BINARY")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.helm_binary),
        }
    }
}

/// Duration in whole seconds within `1..=max`. Zero and out-of-range values
/// fall back to `default`.
fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
    max: Duration,
) -> Duration {
    let secs = parse_or(lookup, key, default.as_secs());
    if secs == 0 || secs > max.as_secs() {
        warn!(
            key = %key,
            value = secs,
            max = max.as_secs(),
            default = default.as_secs(),
            "Setting out of range, using default"
        );
        return default;
    }
    Duration::from_secs(secs)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, default = %default, "Invalid setting, using default");
            default
        }),
        None => default,
    }
}
