//! Typed records produced from docker output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::inspect::{short_id, InspectRecord};
use super::size::parse_usage_pair;
use super::table::{field, parse_float, parse_ratio};

/// Docker prints `null` for some empty lists and maps
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One row of `docker service ls`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    /// Running tasks
    pub instances: i64,
    /// Desired tasks
    pub replicas: i64,
    pub image: String,
}

impl ServiceSummary {
    pub const FORMAT: &'static str = "table {{.ID}}|{{.Name}}|{{.Replicas}}|{{.Image}}";
    pub const MIN_FIELDS: usize = 4;

    pub fn from_fields(fields: &[&str]) -> Self {
        let (instances, replicas) = parse_ratio(field(fields, 2));
        Self {
            id: field(fields, 0).to_string(),
            name: field(fields, 1).to_string(),
            instances,
            replicas,
            image: field(fields, 3).to_string(),
        }
    }
}

/// One task of `docker service ps`, with the earlier tasks of the same slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceTask {
    pub id: String,
    pub name: String,
    pub image: String,
    pub node: String,
    pub desired_state: String,
    pub current_state: String,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ServiceTask>,
}

impl ServiceTask {
    pub const FORMAT: &'static str =
        "table {{.ID}}|{{.Name}}|{{.Image}}|{{.Node}}|{{.DesiredState}}|{{.CurrentState}}|{{.Error}}";
    pub const MIN_FIELDS: usize = 7;
    pub const NAME_COLUMN: usize = 1;

    pub fn from_fields(fields: &[&str]) -> Self {
        Self {
            id: field(fields, 0).to_string(),
            name: field(fields, 1).to_string(),
            image: field(fields, 2).to_string(),
            node: field(fields, 3).to_string(),
            desired_state: field(fields, 4).to_string(),
            current_state: field(fields, 5).to_string(),
            error: field(fields, 6).to_string(),
            history: Vec::new(),
        }
    }
}

/// One row of `docker node ls`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeSummary {
    pub hostname: String,
    pub status: String,
    pub availability: String,
    pub manager_status: String,
    pub is_master: bool,
    pub engine_version: String,
}

impl NodeSummary {
    pub const FORMAT: &'static str =
        "table {{.Hostname}}|{{.Status}}|{{.Availability}}|{{.ManagerStatus}}|{{.EngineVersion}}";
    pub const MIN_FIELDS: usize = 5;

    pub fn from_fields(fields: &[&str]) -> Self {
        let manager_status = field(fields, 3).to_string();
        Self {
            hostname: field(fields, 0).to_string(),
            status: field(fields, 1).to_string(),
            availability: field(fields, 2).to_string(),
            is_master: manager_status == "Leader",
            manager_status,
            engine_version: field(fields, 4).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeLabel {
    pub name: String,
    pub value: String,
}

/// Host details from `docker node inspect --pretty`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeDetail {
    pub hostname: String,
    pub ip: String,
    pub os: String,
    pub architecture: String,
    pub cpus: String,
    pub memory: String,
    pub labels: Vec<NodeLabel>,
}

/// Resource usage of one container from `docker stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerStats {
    pub container_id: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
}

impl ContainerStats {
    pub const FORMAT: &'static str = "table {{.Container}}|{{.CPUPerc}}|{{.MemPerc}}|{{.MemUsage}}";
    pub const MIN_FIELDS: usize = 4;

    pub fn from_fields(fields: &[&str]) -> Self {
        let (memory_usage_mb, memory_limit_mb) = parse_usage_pair(field(fields, 3));
        Self {
            container_id: field(fields, 0).to_string(),
            cpu_usage_percent: parse_float(field(fields, 1)),
            memory_usage_percent: parse_float(field(fields, 2)),
            memory_usage_mb,
            memory_limit_mb,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Mount {
    #[serde(rename = "Type")]
    pub mount_type: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Platform {
    pub architecture: String,
    #[serde(rename = "OS")]
    pub os: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Placement {
    pub constraints: Vec<String>,
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkTarget {
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObjectVersion {
    pub index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(deserialize_with = "null_as_default")]
    pub env: Vec<String>,
    pub init: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub mounts: Vec<Mount>,
    pub isolation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RestartPolicy {
    pub condition: String,
    pub delay: i64,
    pub max_attempts: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskTemplate {
    pub container_spec: ContainerSpec,
    pub restart_policy: RestartPolicy,
    pub placement: Placement,
    pub networks: Vec<NetworkTarget>,
    pub force_update: i64,
    pub runtime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReplicatedMode {
    pub replicas: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceMode {
    pub replicated: Option<ReplicatedMode>,
    pub global: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateConfig {
    pub parallelism: i64,
    pub delay: i64,
    pub failure_action: String,
    pub monitor: i64,
    pub max_failure_ratio: f64,
    pub order: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    pub task_template: TaskTemplate,
    pub mode: ServiceMode,
    pub update_config: Option<UpdateConfig>,
    pub rollback_config: Option<UpdateConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VirtualIp {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    pub addr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Endpoint {
    #[serde(rename = "VirtualIPs")]
    pub virtual_ips: Vec<VirtualIp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateStatus {
    pub state: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: String,
}

/// `docker service inspect`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceInspect {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: ObjectVersion,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub spec: ServiceSpec,
    pub previous_spec: Option<ServiceSpec>,
    pub endpoint: Endpoint,
    pub update_status: Option<UpdateStatus>,
}

impl InspectRecord for ServiceInspect {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskContainerStatus {
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    #[serde(rename = "PID")]
    pub pid: i64,
    pub exit_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskStatus {
    pub timestamp: Option<DateTime<Utc>>,
    pub state: String,
    pub message: String,
    pub err: String,
    pub container_status: TaskContainerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskSpec {
    pub container_spec: ContainerSpec,
    pub placement: Placement,
    pub networks: Vec<NetworkTarget>,
    pub force_update: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkAttachment {
    pub addresses: Vec<String>,
}

/// `docker inspect <task id>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskInspect {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: ObjectVersion,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    pub spec: TaskSpec,
    #[serde(rename = "ServiceID")]
    pub service_id: String,
    pub slot: i64,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    pub status: TaskStatus,
    pub desired_state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub networks_attachments: Vec<NetworkAttachment>,
}

impl InspectRecord for TaskInspect {
    fn normalize(&mut self) {
        let container_id = &mut self.status.container_status.container_id;
        *container_id = short_id(container_id).to_string();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    #[serde(rename = "OOMKilled")]
    pub oom_killed: bool,
    pub dead: bool,
    pub pid: i64,
    pub exit_code: i64,
    pub error: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerMount {
    #[serde(rename = "Type")]
    pub mount_type: String,
    pub source: String,
    pub destination: String,
    pub mode: String,
    #[serde(rename = "RW")]
    pub rw: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    pub hostname: String,
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub env: Vec<String>,
    pub image: String,
    pub working_dir: String,
    pub entrypoint: Option<Vec<String>>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfig {
    pub network_mode: String,
    pub auto_remove: bool,
    pub privileged: bool,
    pub memory: i64,
    pub nano_cpus: i64,
    pub init: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointSettings {
    pub aliases: Option<Vec<String>>,
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    pub gateway: String,
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    pub gateway: String,
    #[serde(deserialize_with = "null_as_default")]
    pub networks: BTreeMap<String, EndpointSettings>,
}

/// `docker inspect <container id>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerInspect {
    pub id: String,
    pub created: Option<DateTime<Utc>>,
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    pub state: ContainerState,
    pub image: String,
    pub name: String,
    pub restart_count: i64,
    pub platform: String,
    pub host_config: HostConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub mounts: Vec<ContainerMount>,
    pub config: ContainerConfig,
    pub network_settings: NetworkSettings,
}

impl InspectRecord for ContainerInspect {}

/// Parameters of `docker service create`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceCreateSpec {
    pub name: String,
    /// `global` runs one task per node; anything else is a node role constraint
    pub node_role: String,
    pub network: String,
    pub replicas: u32,
    pub image: String,
    pub limit_cpus: Option<f64>,
    pub limit_memory: Option<String>,
    /// Extra arguments placed before the image
    pub args: Vec<String>,
}

/// Parameters of `docker run`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerRunSpec {
    pub name: Option<String>,
    pub network: Option<String>,
    pub image: String,
    pub args: Vec<String>,
    pub remove_on_exit: bool,
    pub env: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::inspect::{first_record, NOT_FOUND_SENTINELS};

    #[test]
    fn test_service_summary_from_fields() {
        let summary = ServiceSummary::from_fields(&["vwceboa7gtmu", "redis", "1/3", "redis:latest"]);
        assert_eq!(summary.instances, 1);
        assert_eq!(summary.replicas, 3);
        assert_eq!(summary.image, "redis:latest");

        let drifted = ServiceSummary::from_fields(&["id", "redis", "1", "redis:latest"]);
        assert_eq!((drifted.instances, drifted.replicas), (1, 0));
    }

    #[test]
    fn test_node_summary_leader() {
        let leader = NodeSummary::from_fields(&["test", "Ready", "Active", "Leader", "20.10.17"]);
        assert!(leader.is_master);
        let worker = NodeSummary::from_fields(&["w1", "Ready", "Active", "", "20.10.17"]);
        assert!(!worker.is_master);
        let reachable = NodeSummary::from_fields(&["m2", "Ready", "Active", "Reachable", "24.0"]);
        assert!(!reachable.is_master);
    }

    #[test]
    fn test_container_stats_from_fields() {
        let stats = ContainerStats::from_fields(&["web", "0.07%", "0.43%", "33.36MiB / 7.586GiB"]);
        assert_eq!(stats.cpu_usage_percent, 0.07);
        assert_eq!(stats.memory_usage_percent, 0.43);
        assert!((stats.memory_usage_mb - 33.36).abs() < 1e-9);
        assert!((stats.memory_limit_mb - 7768.064).abs() < 1e-9);
    }

    #[test]
    fn test_task_inspect_shortens_container_id() {
        let raw = r#"[{
            "ID": "rqcinkiry0jr",
            "ServiceID": "vwceboa7gtmu",
            "Slot": 1,
            "NodeID": "n1",
            "Status": {
                "Timestamp": "2024-03-01T10:00:00.123456789Z",
                "State": "running",
                "ContainerStatus": {
                    "ContainerID": "f3c1e2d4b5a69788aaaabbbbccccdddd",
                    "PID": 42,
                    "ExitCode": 0
                }
            },
            "DesiredState": "running"
        }]"#;

        let task: TaskInspect = first_record(raw, NOT_FOUND_SENTINELS).unwrap().unwrap();
        assert_eq!(task.status.container_status.container_id, "f3c1e2d4b5a6");
        assert_eq!(task.status.container_status.pid, 42);
        assert_eq!(task.slot, 1);
        assert!(task.status.timestamp.is_some());
    }

    #[test]
    fn test_service_inspect_decodes_nested_spec() {
        let raw = r#"[{
            "ID": "vwceboa7gtmu",
            "Version": {"Index": 1201},
            "CreatedAt": "2024-03-01T10:00:00Z",
            "Spec": {
                "Name": "redis",
                "Labels": {"team": "core"},
                "TaskTemplate": {
                    "ContainerSpec": {"Image": "redis:7", "Init": false},
                    "Placement": {"Constraints": ["node.role==worker"]}
                },
                "Mode": {"Replicated": {"Replicas": 3}}
            },
            "Endpoint": {"VirtualIPs": [{"NetworkID": "net1", "Addr": "10.0.0.5/24"}]}
        }]"#;

        let service: ServiceInspect = first_record(raw, NOT_FOUND_SENTINELS).unwrap().unwrap();
        assert_eq!(service.spec.name, "redis");
        assert_eq!(service.version.index, 1201);
        assert_eq!(service.spec.task_template.container_spec.image, "redis:7");
        assert_eq!(
            service.spec.mode.replicated.map(|m| m.replicas),
            Some(3)
        );
        assert_eq!(service.endpoint.virtual_ips[0].addr, "10.0.0.5/24");
        assert!(service.previous_spec.is_none());
    }

    #[test]
    fn test_container_inspect_keeps_full_id() {
        let raw = r#"[{
            "Id": "f3c1e2d4b5a69788aaaabbbbccccdddd",
            "Name": "/web",
            "State": {"Status": "running", "Running": true, "Pid": 7},
            "Config": {"Env": ["A=1"], "Image": "nginx"},
            "NetworkSettings": {"Networks": {"net": {"IPAddress": "10.0.1.2"}}}
        }]"#;

        let container: ContainerInspect = first_record(raw, NOT_FOUND_SENTINELS).unwrap().unwrap();
        assert_eq!(container.id.len(), 32);
        assert_eq!(container.name, "/web");
        assert!(container.state.running);
        assert_eq!(container.network_settings.networks["net"].ip_address, "10.0.1.2");
    }
}
