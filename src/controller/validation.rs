//! Validation of reconciliation context values.
//!
//! Templates call these before rendering so that an unusable input fails the
//! desired-state fetch with `InvalidConfig` instead of producing broken
//! records.

use std::sync::LazyLock;

use crate::controller::context::ReconciliationContext;
use crate::controller::error::{Error, Result};

/// Maximum length of a cluster ID, bounded by DNS label length
pub const MAX_CLUSTER_ID_LEN: usize = 63;

/// Maximum length of a Kubernetes label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Validate every field templates render from
pub fn validate_context(rc: &ReconciliationContext) -> Result<()> {
    validate_cluster_id(&rc.cluster_id)?;
    validate_base_domain(&rc.base_domain)?;
    validate_organization(&rc.organization)?;
    validate_version(&rc.version_bundle_version)?;
    validate_api_ip(&rc.api_ip)?;
    Ok(())
}

/// Validate a cluster ID: 1-63 lowercase alphanumerics or dashes, starting
/// and ending with an alphanumeric
pub fn validate_cluster_id(cluster_id: &str) -> Result<()> {
    // Pattern: ^[a-z0-9]([a-z0-9-]*[a-z0-9])?$
    static CLUSTER_ID_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").ok());

    if cluster_id.is_empty() || cluster_id.len() > MAX_CLUSTER_ID_LEN {
        return Err(Error::InvalidConfig(format!(
            "cluster ID '{}' must be 1-{} characters",
            cluster_id, MAX_CLUSTER_ID_LEN
        )));
    }
    if !CLUSTER_ID_RE.as_ref().is_some_and(|re| re.is_match(cluster_id)) {
        return Err(Error::InvalidConfig(format!(
            "cluster ID '{}' must consist of lowercase alphanumerics and dashes",
            cluster_id
        )));
    }
    Ok(())
}

/// Validate a base domain as a lowercase DNS name
pub fn validate_base_domain(domain: &str) -> Result<()> {
    // Pattern: dot-separated DNS labels, at least two
    static DOMAIN_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$")
            .ok()
    });

    if domain.len() > 253 || !DOMAIN_RE.as_ref().is_some_and(|re| re.is_match(domain)) {
        return Err(Error::InvalidConfig(format!(
            "base domain '{}' is not a lowercase DNS name",
            domain
        )));
    }
    Ok(())
}

/// Validate an organization, which every record carries as a label value
pub fn validate_organization(organization: &str) -> Result<()> {
    // Pattern: ^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$
    static LABEL_VALUE_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").ok()
    });

    if organization.is_empty() || organization.len() > MAX_LABEL_VALUE_LEN {
        return Err(Error::InvalidConfig(format!(
            "organization '{}' must be 1-{} characters",
            organization, MAX_LABEL_VALUE_LEN
        )));
    }
    if !LABEL_VALUE_RE.as_ref().is_some_and(|re| re.is_match(organization)) {
        return Err(Error::InvalidConfig(format!(
            "organization '{}' is not a valid label value",
            organization
        )));
    }
    Ok(())
}

/// Validate a version bundle version as semver
pub fn validate_version(version: &str) -> Result<semver::Version> {
    semver::Version::parse(version).map_err(|e| {
        Error::InvalidConfig(format!("version '{}' is not a semantic version: {}", version, e))
    })
}

fn validate_api_ip(ip: &str) -> Result<()> {
    ip.parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| Error::InvalidConfig(format!("API IP '{}' is not an IP address", ip)))
}
