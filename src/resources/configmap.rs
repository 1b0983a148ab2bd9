//! Chart values config maps inside the tenant cluster.
//!
//! Each chart enabled by the version bundle gets a `<chart>-values` config map
//! in the `giantswarm` namespace holding its values as JSON under `values`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ApiResource, DynamicObject};
use serde_json::{Value, json};

use crate::controller::context::ReconciliationContext;
use crate::controller::error::{Error, Result};
use crate::controller::unit::Template;
use crate::controller::validation::validate_context;
use crate::state::kube_store::{KubeRecord, object_for, object_name};
use crate::state::record::{Record, RecordCollection};
use crate::state::store::Scope;
use crate::versions::{TemplateParams, ValuesChart};

use super::common::{TENANT_NAMESPACE, object_labels, selector, standard_labels, wrong_type};

/// Key the rendered values are stored under.
pub const VALUES_KEY: &str = "values";

/// Plain string data of a config map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigMapSpec {
    pub data: BTreeMap<String, String>,
}

/// Cluster DNS service IP: the API service IP with its last octet set to 10.
pub fn cluster_dns_ip(api_ip: &str) -> Result<String> {
    let ip: Ipv4Addr = api_ip
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("API IP '{}' is not an IPv4 address", api_ip)))?;
    let [a, b, c, _] = ip.octets();
    Ok(Ipv4Addr::new(a, b, c, 10).to_string())
}

/// Values of one chart.
pub fn chart_values(
    rc: &ReconciliationContext,
    params: &TemplateParams,
    chart: ValuesChart,
) -> Result<Value> {
    Ok(match chart {
        ValuesChart::ChartOperator => json!({
            "clusterDNSIP": cluster_dns_ip(&rc.api_ip)?,
            "tiller": { "namespace": TENANT_NAMESPACE },
        }),
        ValuesChart::CertExporter => json!({
            "namespace": TENANT_NAMESPACE,
            "provider": params.provider.to_string(),
        }),
        ValuesChart::KubeStateMetrics => json!({
            "namespace": TENANT_NAMESPACE,
            "clusterID": rc.cluster_id,
        }),
    })
}

/// Desired values config maps for one bundle.
pub struct ChartValuesTemplate {
    pub params: TemplateParams,
}

impl Template<ConfigMapSpec> for ChartValuesTemplate {
    fn scope(&self, rc: &ReconciliationContext) -> Scope {
        Scope::new(Some(TENANT_NAMESPACE), selector(rc))
    }

    fn render(&self, rc: &ReconciliationContext) -> Result<RecordCollection<ConfigMapSpec>> {
        validate_context(rc)?;
        let labels = standard_labels(rc);
        let mut records = Vec::with_capacity(self.params.values_charts.len());
        for chart in &self.params.values_charts {
            let values = chart_values(rc, &self.params, *chart)?;
            let data = [(VALUES_KEY.to_string(), serde_json::to_string(&values)?)]
                .into_iter()
                .collect();
            records.push(
                Record::new(
                    chart.config_map_name(),
                    Some(TENANT_NAMESPACE),
                    ConfigMapSpec { data },
                )
                .with_labels(labels.clone()),
            );
        }
        RecordCollection::new(records)
    }
}

impl KubeRecord for ConfigMapSpec {
    fn api_resource() -> ApiResource {
        ApiResource::erase::<ConfigMap>(&())
    }

    fn to_object(record: &Record<Self>) -> Result<DynamicObject> {
        let mut obj = object_for(record, &Self::api_resource());
        obj.data = json!({ "data": record.spec.data });
        Ok(obj)
    }

    fn from_object(obj: DynamicObject) -> Result<Record<Self>> {
        let name = object_name(&obj, "config-map")?;
        let data = match obj.data.get("data") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(fields)) => {
                let mut data = BTreeMap::new();
                for (key, value) in fields {
                    let value = value
                        .as_str()
                        .ok_or_else(|| wrong_type("config-map", &obj, "has non-string data"))?;
                    data.insert(key.clone(), value.to_string());
                }
                data
            }
            Some(_) => return Err(wrong_type("config-map", &obj, "has malformed data")),
        };
        Ok(
            Record::new(name, obj.metadata.namespace.as_deref(), ConfigMapSpec { data })
                .with_labels(object_labels(&obj)),
        )
    }
}
