//! [`Orchestrator`] over the `kubectl` CLI
//!
//! Structured reads use `-o json` (or `jsonpath` for single fields) and are
//! deserialized into the handful of fields kbench looks at.

use async_trait::async_trait;
use kbench_remote::{CommandOutput, CommandRunner};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{DeployError, DeployResult};
use crate::orchestrator::{
    DeploymentStatus, NodeStatus, Orchestrator, PodStatus, PodUsage, ResourceKind,
};

const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    namespace: Option<String>,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "kubectl".to_string(),
            namespace: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    async fn run(&self, args: &[&str]) -> DeployResult<CommandOutput> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(ns) = &self.namespace {
            full.push("-n".to_string());
            full.push(ns.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));

        let output = self.runner.run(&self.binary, &full).await?;
        if !output.success() {
            let command = format!("{} {}", self.binary, full.join(" "));
            debug!(command = %command, stderr = %output.stderr.trim(), "kubectl failed");
            return Err(DeployError::Command {
                command,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn get_json<T: DeserializeOwned>(&self, args: &[&str]) -> DeployResult<T> {
        let output = self.run(args).await?;
        serde_json::from_str(&output.stdout)
            .map_err(|e| DeployError::Parse(format!("kubectl {}: {}", args.join(" "), e)))
    }
}

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PodJson {
    metadata: Meta,
    #[serde(default)]
    status: PodStatusJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatusJson {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    container_statuses: Vec<ContainerStatusJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerStatusJson {
    #[serde(default)]
    restart_count: u32,
    #[serde(default)]
    state: ContainerStateJson,
    #[serde(default)]
    last_state: ContainerStateJson,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerStateJson {
    #[serde(default)]
    terminated: Option<serde_json::Value>,
}

impl From<PodJson> for PodStatus {
    fn from(pod: PodJson) -> Self {
        let statuses = &pod.status.container_statuses;
        PodStatus {
            crashed: statuses
                .iter()
                .any(|c| c.state.terminated.is_some() || c.last_state.terminated.is_some()),
            restarts: statuses.iter().map(|c| c.restart_count).sum(),
            name: pod.metadata.name,
            phase: pod.status.phase,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeploymentJson {
    #[serde(default)]
    status: DeploymentStatusJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatusJson {
    #[serde(default)]
    replicas: u32,
    #[serde(default)]
    ready_replicas: u32,
}

#[derive(Debug, Deserialize)]
struct NodeJson {
    metadata: Meta,
    #[serde(default)]
    status: NodeStatusJson,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatusJson {
    #[serde(default)]
    conditions: Vec<ConditionJson>,
}

#[derive(Debug, Deserialize)]
struct ConditionJson {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl From<NodeJson> for NodeStatus {
    fn from(node: NodeJson) -> Self {
        NodeStatus {
            ready: node
                .status
                .conditions
                .iter()
                .any(|c| c.kind == "Ready" && c.status == "True"),
            control_plane: CONTROL_PLANE_LABELS
                .iter()
                .any(|l| node.metadata.labels.contains_key(*l)),
            name: node.metadata.name,
        }
    }
}

/// CPU quantity as millicores: `250m`, `1`, `1.5`, `1500000n`, `300u`.
pub fn parse_cpu_millicores(quantity: &str) -> Option<u64> {
    if let Some(n) = quantity.strip_suffix('n') {
        return n.parse::<u64>().ok().map(|v| v / 1_000_000);
    }
    if let Some(u) = quantity.strip_suffix('u') {
        return u.parse::<u64>().ok().map(|v| v / 1_000);
    }
    if let Some(m) = quantity.strip_suffix('m') {
        return m.parse().ok();
    }
    quantity
        .parse::<f64>()
        .ok()
        .filter(|c| *c >= 0.0)
        .map(|c| (c * 1000.0).round() as u64)
}

/// Memory quantity as bytes: `128Mi`, `2Gi`, `512Ki`, `1M`, `1000`.
pub fn parse_memory_bytes(quantity: &str) -> Option<u64> {
    const UNITS: [(&str, u64); 9] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("k", 1_000),
        ("K", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    for (suffix, multiplier) in UNITS {
        if let Some(n) = quantity.strip_suffix(suffix) {
            return n.parse::<u64>().ok()?.checked_mul(multiplier);
        }
    }
    quantity.parse().ok()
}

fn parse_top_line(line: &str) -> DeployResult<PodUsage> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [name, cpu, memory, ..] = fields.as_slice() else {
        return Err(DeployError::Parse(format!("short `top` line: {}", line)));
    };
    let bad = |what: &str, value: &str| DeployError::Parse(format!("bad {} quantity '{}'", what, value));

    Ok(PodUsage {
        name: name.to_string(),
        cpu_millicores: parse_cpu_millicores(cpu).ok_or_else(|| bad("cpu", cpu))?,
        memory_bytes: parse_memory_bytes(memory).ok_or_else(|| bad("memory", memory))?,
    })
}

#[async_trait]
impl Orchestrator for Kubectl {
    async fn apply(&self, path: &Path) -> DeployResult<()> {
        let path = path.to_string_lossy();
        self.run(&["apply", "-f", &*path]).await?;
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> DeployResult<()> {
        self.run(&["delete", kind.as_str(), name, "--ignore-not-found"])
            .await?;
        Ok(())
    }

    async fn delete_all(&self, kind: ResourceKind) -> DeployResult<()> {
        self.run(&["delete", kind.as_str(), "--all"]).await?;
        Ok(())
    }

    async fn force_delete_all_pods(&self) -> DeployResult<()> {
        self.run(&["delete", "pods", "--all", "--grace-period=0", "--force"])
            .await?;
        Ok(())
    }

    async fn scale(&self, deployment: &str, replicas: u32) -> DeployResult<()> {
        let target = format!("deployment/{}", deployment);
        let replicas = format!("--replicas={}", replicas);
        self.run(&["scale", target.as_str(), replicas.as_str()]).await?;
        Ok(())
    }

    async fn rollout_ready(&self, deployment: &str) -> DeployResult<bool> {
        let target = format!("deployment/{}", deployment);
        let output = self
            .run(&["rollout", "status", target.as_str(), "--watch=false"])
            .await?;
        Ok(output.stdout.contains("successfully rolled out"))
    }

    async fn deployment_status(&self, deployment: &str) -> DeployResult<DeploymentStatus> {
        let json: DeploymentJson = self
            .get_json(&["get", "deployment", deployment, "-o", "json"])
            .await?;
        Ok(DeploymentStatus {
            replicas: json.status.replicas,
            ready_replicas: json.status.ready_replicas,
        })
    }

    async fn list_pods(&self, app: &str) -> DeployResult<Vec<PodStatus>> {
        let selector = format!("app={}", app);
        let list: List<PodJson> = self
            .get_json(&["get", "pods", "-l", selector.as_str(), "-o", "json"])
            .await?;
        Ok(list.items.into_iter().map(PodStatus::from).collect())
    }

    async fn delete_pod(&self, name: &str) -> DeployResult<()> {
        self.run(&["delete", "pod", name, "--ignore-not-found", "--wait=false"])
            .await?;
        Ok(())
    }

    async fn service_ip(&self, name: &str) -> DeployResult<String> {
        let target = format!("service/{}", name);
        let output = self
            .run(&["get", target.as_str(), "-o", "jsonpath={.spec.clusterIP}"])
            .await?;
        let ip = output.stdout.trim().trim_matches('\'');
        if ip.is_empty() {
            return Err(DeployError::Parse(format!("service {} has no cluster IP", name)));
        }
        Ok(ip.to_string())
    }

    async fn pod_usage(&self, app: &str) -> DeployResult<Vec<PodUsage>> {
        let selector = format!("app={}", app);
        let output = self
            .run(&["top", "pods", "-l", selector.as_str(), "--no-headers"])
            .await?;
        output
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(parse_top_line)
            .collect()
    }

    async fn nodes(&self) -> DeployResult<Vec<NodeStatus>> {
        let list: List<NodeJson> = self.get_json(&["get", "nodes", "-o", "json"]).await?;
        Ok(list.items.into_iter().map(NodeStatus::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_remote::testing::ScriptedRunner;

    const PODS: &str = r#"{
      "items": [
        {
          "metadata": { "name": "fib-abc-7d9f-x1", "labels": { "app": "fib-abc" } },
          "status": {
            "phase": "Running",
            "containerStatuses": [
              { "restartCount": 0, "state": { "running": {} }, "lastState": {} }
            ]
          }
        },
        {
          "metadata": { "name": "fib-abc-7d9f-x2" },
          "status": {
            "phase": "Running",
            "containerStatuses": [
              {
                "restartCount": 3,
                "state": { "waiting": { "reason": "CrashLoopBackOff" } },
                "lastState": { "terminated": { "exitCode": 137, "reason": "OOMKilled" } }
              }
            ]
          }
        },
        { "metadata": { "name": "fib-abc-7d9f-x3" }, "status": { "phase": "Pending" } }
      ]
    }"#;

    const NODES: &str = r#"{
      "items": [
        {
          "metadata": { "name": "node0", "labels": { "node-role.kubernetes.io/control-plane": "" } },
          "status": { "conditions": [ { "type": "Ready", "status": "True" } ] }
        },
        {
          "metadata": { "name": "node1", "labels": {} },
          "status": { "conditions": [
            { "type": "MemoryPressure", "status": "False" },
            { "type": "Ready", "status": "Unknown" }
          ] }
        }
      ]
    }"#;

    fn kubectl(runner: &ScriptedRunner) -> Kubectl {
        Kubectl::new(Arc::new(runner.clone()))
    }

    #[tokio::test]
    async fn test_list_pods_detects_crashes() {
        let runner = ScriptedRunner::new();
        runner.on("get pods -l app=fib-abc", CommandOutput::ok(PODS));

        let pods = kubectl(&runner).list_pods("fib-abc").await.unwrap();
        assert_eq!(pods.len(), 3);
        assert!(!pods[0].crashed);
        assert!(pods[1].crashed);
        assert_eq!(pods[1].restarts, 3);
        assert_eq!(pods[2].phase, "Pending");
        assert!(!pods[2].crashed);
        assert_eq!(
            runner.calls(),
            vec!["kubectl get pods -l app=fib-abc -o json"]
        );
    }

    #[tokio::test]
    async fn test_nodes() {
        let runner = ScriptedRunner::new();
        runner.on("get nodes", CommandOutput::ok(NODES));

        let nodes = kubectl(&runner).nodes().await.unwrap();
        assert_eq!(
            nodes,
            vec![
                NodeStatus {
                    name: "node0".into(),
                    ready: true,
                    control_plane: true
                },
                NodeStatus {
                    name: "node1".into(),
                    ready: false,
                    control_plane: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_deployment_status_defaults_missing_counts() {
        let runner = ScriptedRunner::new();
        runner.on(
            "get deployment fib-abc",
            CommandOutput::ok(r#"{"status": {"replicas": 3}}"#),
        );
        let status = kubectl(&runner).deployment_status("fib-abc").await.unwrap();
        assert_eq!(
            status,
            DeploymentStatus {
                replicas: 3,
                ready_replicas: 0
            }
        );
    }

    #[tokio::test]
    async fn test_rollout_ready() {
        let runner = ScriptedRunner::new();
        runner.sequence(
            "rollout status deployment/fib-abc",
            vec![
                CommandOutput::ok("Waiting for deployment \"fib-abc\" rollout to finish: 0 of 1 updated replicas are available...\n"),
                CommandOutput::ok("deployment \"fib-abc\" successfully rolled out\n"),
            ],
        );
        let kubectl = kubectl(&runner);
        assert!(!kubectl.rollout_ready("fib-abc").await.unwrap());
        assert!(kubectl.rollout_ready("fib-abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let runner = ScriptedRunner::new();
        runner.on(
            "scale",
            CommandOutput::failed(1, "Error from server (NotFound): deployments.apps \"x\" not found\n"),
        );
        let err = kubectl(&runner).scale("x", 2).await.unwrap_err();
        match err {
            DeployError::Command {
                command, stderr, ..
            } => {
                assert_eq!(command, "kubectl scale deployment/x --replicas=2");
                assert!(stderr.contains("NotFound"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_service_ip_and_namespace() {
        let runner = ScriptedRunner::new();
        runner.on("service/fib-abc", CommandOutput::ok("'10.96.12.7'"));
        let kubectl = kubectl(&runner).with_namespace("bench");
        assert_eq!(kubectl.service_ip("fib-abc").await.unwrap(), "10.96.12.7");
        assert_eq!(
            runner.calls(),
            vec!["kubectl -n bench get service/fib-abc -o jsonpath={.spec.clusterIP}"]
        );

        runner.on("service/missing", CommandOutput::ok(""));
        assert!(matches!(
            kubectl.service_ip("missing").await,
            Err(DeployError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_pod_usage() {
        let runner = ScriptedRunner::new();
        runner.on(
            "top pods -l app=fib-abc",
            CommandOutput::ok("fib-abc-1   250m   64Mi\nfib-abc-2   1      512Ki\n\n"),
        );
        let usage = kubectl(&runner).pod_usage("fib-abc").await.unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].cpu_millicores, 250);
        assert_eq!(usage[0].memory_bytes, 64 << 20);
        assert_eq!(usage[1].cpu_millicores, 1000);
        assert_eq!(usage[1].memory_bytes, 512 << 10);
    }

    #[test]
    fn test_quantities() {
        assert_eq!(parse_cpu_millicores("1500000n"), Some(1));
        assert_eq!(parse_cpu_millicores("0.5"), Some(500));
        assert_eq!(parse_cpu_millicores("2500u"), Some(2));
        assert_eq!(parse_cpu_millicores("abc"), None);
        assert_eq!(parse_memory_bytes("2Gi"), Some(2 << 30));
        assert_eq!(parse_memory_bytes("3M"), Some(3_000_000));
        assert_eq!(parse_memory_bytes("4096"), Some(4096));
        assert_eq!(parse_memory_bytes("12Qi"), None);
        assert_eq!(parse_memory_bytes("99999999999Ti"), None);
        assert!(parse_top_line("only-name 5m").is_err());
        assert!(parse_top_line("fib-abc-1 5m 99999999999Ti").is_err());
    }
}
