//! Version bundle registry.
//!
//! One table maps each supported version bundle to the resource units it
//! enables and the parameters its templates render with. Parameters differ by
//! provider; everything else about a unit is shared across versions.

use std::fmt;
use std::str::FromStr;

use crate::controller::error::{Error, Result};

/// Infrastructure provider the operator instance manages clusters on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Provider {
    #[default]
    Aws,
    Azure,
    Kvm,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Aws => write!(f, "aws"),
            Provider::Azure => write!(f, "azure"),
            Provider::Kvm => write!(f, "kvm"),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "kvm" => Ok(Provider::Kvm),
            other => Err(Error::InvalidConfig(format!("unknown provider '{}'", other))),
        }
    }
}

/// Resource units a version bundle can enable, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitKind {
    EncryptionKey,
    CertConfigs,
    Namespace,
    ChartValues,
    ChartOperator,
}

impl UnitKind {
    /// Unit name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::EncryptionKey => "encryptionkey",
            UnitKind::CertConfigs => "certconfigs",
            UnitKind::Namespace => "namespace",
            UnitKind::ChartValues => "chartvalues",
            UnitKind::ChartOperator => "chartoperator",
        }
    }
}

/// Charts whose values config maps a bundle renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValuesChart {
    ChartOperator,
    CertExporter,
    KubeStateMetrics,
}

impl ValuesChart {
    /// Config map name in the tenant cluster.
    pub fn config_map_name(&self) -> &'static str {
        match self {
            ValuesChart::ChartOperator => "chart-operator-values",
            ValuesChart::CertExporter => "cert-exporter-values",
            ValuesChart::KubeStateMetrics => "kube-state-metrics-values",
        }
    }
}

/// Parameters every template of one bundle renders with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateParams {
    pub provider: Provider,
    /// Lifetime of issued certificates, e.g. `4320h`.
    pub cert_ttl: &'static str,
    /// Registry channel the chart operator package is pulled from.
    pub chart_channel: &'static str,
    pub values_charts: Vec<ValuesChart>,
}

/// One supported version bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionBundle {
    pub version: &'static str,
    pub units: Vec<UnitKind>,
    pub params: TemplateParams,
}

const BASE_UNITS: [UnitKind; 5] = [
    UnitKind::EncryptionKey,
    UnitKind::CertConfigs,
    UnitKind::Namespace,
    UnitKind::ChartValues,
    UnitKind::ChartOperator,
];

fn cert_ttl(provider: Provider) -> &'static str {
    match provider {
        Provider::Aws => "4320h",
        Provider::Azure => "4320h",
        Provider::Kvm => "2160h",
    }
}

fn beta_channel(provider: Provider) -> &'static str {
    match provider {
        Provider::Aws => "0-7-beta",
        Provider::Azure => "0-6-beta",
        Provider::Kvm => "0-5-beta",
    }
}

/// Every bundle supported for `provider`, oldest first.
pub fn bundles(provider: Provider) -> Vec<VersionBundle> {
    let bundle = |version, chart_channel, values_charts| VersionBundle {
        version,
        units: BASE_UNITS.to_vec(),
        params: TemplateParams {
            provider,
            cert_ttl: cert_ttl(provider),
            chart_channel,
            values_charts,
        },
    };
    vec![
        bundle(
            "3.2.0",
            beta_channel(provider),
            vec![ValuesChart::ChartOperator],
        ),
        bundle(
            "3.3.0",
            beta_channel(provider),
            vec![ValuesChart::ChartOperator, ValuesChart::CertExporter],
        ),
        bundle(
            "4.0.0",
            "stable",
            vec![
                ValuesChart::ChartOperator,
                ValuesChart::CertExporter,
                ValuesChart::KubeStateMetrics,
            ],
        ),
    ]
}

/// Bundle for an exact version, if supported.
pub fn bundle(provider: Provider, version: &str) -> Option<VersionBundle> {
    bundles(provider).into_iter().find(|b| b.version == version)
}
