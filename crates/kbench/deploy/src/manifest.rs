//! Typed benchmark manifests
//!
//! Each function ships a multi-document YAML template holding a
//! `Deployment`, a `Service` and optionally a `HorizontalPodAutoscaler`.
//! Only the fields kbench rewrites are typed; everything else is carried
//! through `extra` maps untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DeployError, DeployResult};
use crate::rename::ChainAddress;

/// Fields kbench does not interpret
pub type Extra = BTreeMap<String, serde_yaml::Value>;

pub const WORKLOAD_KIND: &str = "Deployment";
pub const SERVICE_KIND: &str = "Service";
pub const AUTOSCALER_KIND: &str = "HorizontalPodAutoscaler";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    pub selector: LabelSelector,
    pub template: PodTemplate,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplate {
    pub metadata: TemplateMeta,
    pub spec: PodSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMeta {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    pub containers: Vec<Container>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Sidecar container that keeps its own name across renames
pub const RELAY_CONTAINER: &str = "relay";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    pub port: u16,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: AutoscalerSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerSpec {
    pub scale_target_ref: ScaleTargetRef,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleTargetRef {
    pub name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// The manifests of one function, kept consistent by [`ManifestSet::rename`].
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSet {
    pub workload: WorkloadManifest,
    pub service: ServiceManifest,
    pub autoscaler: Option<AutoscalerManifest>,
    /// Downstream address of a chained function, as it was in the template
    pub(crate) chain: Option<ChainAddress>,
}

impl ManifestSet {
    /// Read and validate a template file.
    pub fn load(path: &Path) -> DeployResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DeployError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&text).map_err(|e| match e {
            DeployError::Yaml(e) => DeployError::Manifest {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
            other => other,
        })
    }

    /// Parse a multi-document template. Documents are told apart by `kind`.
    pub fn from_yaml(text: &str) -> DeployResult<Self> {
        let mut workload: Option<WorkloadManifest> = None;
        let mut service: Option<ServiceManifest> = None;
        let mut autoscaler: Option<AutoscalerManifest> = None;

        for document in serde_yaml::Deserializer::from_str(text) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let kind = value
                .get("kind")
                .and_then(|k| k.as_str())
                .ok_or_else(|| DeployError::Invalid("document without a kind".into()))?
                .to_string();

            match kind.as_str() {
                WORKLOAD_KIND => {
                    set_once(&mut workload, serde_yaml::from_value(value)?, &kind)?
                }
                SERVICE_KIND => set_once(&mut service, serde_yaml::from_value(value)?, &kind)?,
                AUTOSCALER_KIND => {
                    set_once(&mut autoscaler, serde_yaml::from_value(value)?, &kind)?
                }
                other => {
                    return Err(DeployError::Invalid(format!(
                        "unsupported kind '{}'",
                        other
                    )))
                }
            }
        }

        let workload = workload
            .ok_or_else(|| DeployError::Invalid(format!("missing {} document", WORKLOAD_KIND)))?;
        let service = service
            .ok_or_else(|| DeployError::Invalid(format!("missing {} document", SERVICE_KIND)))?;

        if workload.spec.template.spec.containers.is_empty() {
            return Err(DeployError::Invalid(format!(
                "{} '{}' has no containers",
                WORKLOAD_KIND, workload.metadata.name
            )));
        }
        if service.spec.ports.is_empty() {
            return Err(DeployError::Invalid(format!(
                "{} '{}' exposes no ports",
                SERVICE_KIND, service.metadata.name
            )));
        }

        let chain = ChainAddress::find(&workload)?;

        Ok(Self {
            workload,
            service,
            autoscaler,
            chain,
        })
    }

    /// Current deployment name.
    pub fn name(&self) -> &str {
        &self.workload.metadata.name
    }

    /// First port the service exposes.
    pub fn port(&self) -> u16 {
        self.service.spec.ports.first().map(|p| p.port).unwrap_or_default()
    }

    pub fn workload_yaml(&self) -> DeployResult<String> {
        Ok(serde_yaml::to_string(&self.workload)?)
    }

    pub fn service_yaml(&self) -> DeployResult<String> {
        Ok(serde_yaml::to_string(&self.service)?)
    }

    pub fn autoscaler_yaml(&self) -> DeployResult<Option<String>> {
        self.autoscaler
            .as_ref()
            .map(|a| serde_yaml::to_string(a).map_err(DeployError::from))
            .transpose()
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: &str) -> DeployResult<()> {
    if slot.is_some() {
        return Err(DeployError::Invalid(format!("duplicate {} document", kind)));
    }
    *slot = Some(value);
    Ok(())
}

/// Sample templates: a chained gRPC function with a relay sidecar and an
/// autoscaler, and a standalone HTTP function.
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures {
    pub const GEO: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: hotel-app-geo
  labels:
    app: hotel-app-geo
spec:
  replicas: 1
  selector:
    matchLabels:
      app: hotel-app-geo
  template:
    metadata:
      labels:
        app: hotel-app-geo
    spec:
      containers:
        - name: hotel-app-geo
          image: docker.io/vhiveease/hotel-app-geo:latest
          args: ["-addr", "hotel-app-geo-db.default.svc.cluster.local:27017"]
          ports:
            - containerPort: 50051
        - name: relay
          image: docker.io/vhiveease/relay:latest
          args: ["--addr=0.0.0.0:50000"]
---
apiVersion: v1
kind: Service
metadata:
  name: hotel-app-geo
spec:
  type: ClusterIP
  selector:
    app: hotel-app-geo
  ports:
    - port: 50000
      targetPort: 50000
---
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: hotel-app-geo-hpa
spec:
  scaleTargetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: hotel-app-geo
  minReplicas: 1
  maxReplicas: 10
"#;

    pub const FIBONACCI: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: fibonacci-python
  labels:
    app: fibonacci-python
spec:
  selector:
    matchLabels:
      app: fibonacci-python
  template:
    metadata:
      labels:
        app: fibonacci-python
    spec:
      containers:
        - name: fibonacci-python
          image: docker.io/vhiveease/fibonacci-python:latest
---
apiVersion: v1
kind: Service
metadata:
  name: fibonacci-python
spec:
  selector:
    app: fibonacci-python
  ports:
    - port: 80
"#;
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_parse_triple() {
        let set = ManifestSet::from_yaml(GEO).unwrap();
        assert_eq!(set.name(), "hotel-app-geo");
        assert_eq!(set.port(), 50000);
        assert_eq!(set.workload.spec.template.spec.containers.len(), 2);
        assert!(set.autoscaler.is_some());
        assert!(set.chain.is_some());
    }

    #[test]
    fn test_autoscaler_is_optional() {
        let set = ManifestSet::from_yaml(FIBONACCI).unwrap();
        assert!(set.autoscaler.is_none());
        assert!(set.chain.is_none());
        assert_eq!(set.autoscaler_yaml().unwrap(), None);
    }

    #[test]
    fn test_unknown_fields_survive() {
        let set = ManifestSet::from_yaml(GEO).unwrap();
        let yaml = set.workload_yaml().unwrap();
        assert!(yaml.contains("docker.io/vhiveease/hotel-app-geo:latest"));
        assert!(yaml.contains("containerPort: 50051"));
        assert!(set.service_yaml().unwrap().contains("type: ClusterIP"));
    }

    #[test]
    fn test_rejects_bad_templates() {
        let no_service = GEO.split("---").next().unwrap();
        assert!(matches!(
            ManifestSet::from_yaml(no_service),
            Err(DeployError::Invalid(_))
        ));

        let no_ports = FIBONACCI.replace("  ports:\n    - port: 80\n", "");
        assert!(matches!(
            ManifestSet::from_yaml(&no_ports),
            Err(DeployError::Invalid(_))
        ));

        let no_containers = FIBONACCI.replace(
            "      containers:\n        - name: fibonacci-python\n          image: docker.io/vhiveease/fibonacci-python:latest\n",
            "      containers: []\n",
        );
        assert!(matches!(
            ManifestSet::from_yaml(&no_containers),
            Err(DeployError::Invalid(_))
        ));

        let odd_kind = format!("{}---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n", FIBONACCI);
        assert!(matches!(
            ManifestSet::from_yaml(&odd_kind),
            Err(DeployError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "kind: Deployment\nmetadata: [").unwrap();
        match ManifestSet::load(&path) {
            Err(DeployError::Manifest { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
