//! Workload runtime: a thin wrapper over the container engine.
//!
//! [`DockerRuntime`] speaks the Docker Engine HTTP API; [`MemoryRuntime`] keeps
//! containers in a map for tests and dry environments.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::model::{PortProtocol, WorkloadRecord, WorkloadSpec};
use crate::settings::DEFAULT_DOCKER_URL;

const DOCKER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("container runtime rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("container '{0}' not found")]
    NotFound(String),
}

pub trait WorkloadRuntime: Send + Sync {
    /// Create and start the workload.
    fn create(&self, spec: &WorkloadSpec) -> Result<WorkloadRecord, RuntimeError>;
    /// Stop and remove the workload. `false` when it did not exist.
    fn delete(&self, name: &str) -> Result<bool, RuntimeError>;
    fn start(&self, name: &str) -> Result<(), RuntimeError>;
    fn stop(&self, name: &str) -> Result<(), RuntimeError>;
    fn restart(&self, name: &str) -> Result<(), RuntimeError>;
}

pub struct DockerRuntime {
    http: Client,
    base: Url,
}

impl DockerRuntime {
    pub fn new(api_url: Option<&str>) -> Result<Self, RuntimeError> {
        let raw = api_url.unwrap_or(DEFAULT_DOCKER_URL);
        let mut base = Url::parse(raw.trim())
            .map_err(|e| RuntimeError::Unavailable(format!("invalid Docker API URL '{raw}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(DOCKER_TIMEOUT_SECS))
            .build()
            .map_err(|e| RuntimeError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<Url, RuntimeError> {
        self.base
            .join(path)
            .map_err(|e| RuntimeError::Unavailable(format!("bad Docker API path '{path}': {e}")))
    }

    fn post(&self, path: &str, body: Option<&Value>) -> Result<Response, RuntimeError> {
        let url = self.url(path)?;
        debug!("POST {url}");
        let request = self.http.post(url);
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };
        request.send().map_err(transport)
    }

    fn delete_request(&self, path: &str) -> Result<Response, RuntimeError> {
        let url = self.url(path)?;
        debug!("DELETE {url}");
        self.http.delete(url).send().map_err(transport)
    }

    /// POST a lifecycle action; 304 (already in that state) counts as success.
    fn lifecycle(&self, name: &str, action: &str) -> Result<(), RuntimeError> {
        let resp = self.post(&format!("containers/{name}/{action}"), None)?;
        match resp.status() {
            StatusCode::NOT_MODIFIED => Ok(()),
            StatusCode::NOT_FOUND => Err(RuntimeError::NotFound(name.to_string())),
            _ => check(resp).map(|_| ()),
        }
    }
}

fn transport(err: reqwest::Error) -> RuntimeError {
    RuntimeError::Unavailable(err.to_string())
}

fn check(resp: Response) -> Result<Value, RuntimeError> {
    let status = resp.status();
    let body = resp.text().map_err(transport)?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        return Err(RuntimeError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| RuntimeError::Rejected {
        status: status.as_u16(),
        message: format!("unreadable response ({e}): {body}"),
    })
}

/// Engine create body for a workload spec.
fn create_body(spec: &WorkloadSpec) -> Value {
    let mut exposed = Map::new();
    let mut bindings = Map::new();
    for mapping in &spec.ports {
        let protocols: &[&str] = match mapping.protocol {
            PortProtocol::Tcp => &["tcp"],
            PortProtocol::Udp => &["udp"],
            PortProtocol::Both => &["tcp", "udp"],
        };
        for proto in protocols {
            let key = format!("{}/{proto}", mapping.container_port);
            exposed.insert(key.clone(), json!({}));
            bindings.insert(key, json!([{ "HostPort": mapping.host_port.to_string() }]));
        }
    }

    let network = format!("vlan{}", spec.network.vlan_id);
    let mut endpoints = Map::new();
    endpoints.insert(
        network.clone(),
        json!({ "IPAMConfig": { "IPv4Address": spec.network.ip_address } }),
    );

    json!({
        "Image": spec.image,
        "Hostname": spec.name,
        "MacAddress": spec.network.mac_address,
        "ExposedPorts": exposed,
        "Env": spec
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>(),
        "HostConfig": {
            "RestartPolicy": { "Name": spec.restart_policy },
            "PortBindings": bindings,
            "Binds": spec
                .volumes
                .iter()
                .map(|(host, container)| format!("{host}:{container}"))
                .collect::<Vec<_>>(),
            "NetworkMode": network,
        },
        "NetworkingConfig": { "EndpointsConfig": endpoints },
    })
}

impl WorkloadRuntime for DockerRuntime {
    fn create(&self, spec: &WorkloadSpec) -> Result<WorkloadRecord, RuntimeError> {
        let mut path = String::from("containers/create?name=");
        path.push_str(&spec.name);
        let created = check(self.post(&path, Some(&create_body(spec)))?)?;
        let Some(id) = created.get("Id").and_then(Value::as_str) else {
            return Err(RuntimeError::Rejected {
                status: 201,
                message: format!("create response carried no Id: {created}"),
            });
        };
        self.lifecycle(id, "start")?;
        info!(name = %spec.name, id, "started container");
        Ok(WorkloadRecord {
            id: id.to_string(),
            status: "running".to_string(),
            spec: spec.clone(),
            created_at: Utc::now(),
        })
    }

    fn delete(&self, name: &str) -> Result<bool, RuntimeError> {
        match self.lifecycle(name, "stop") {
            Ok(()) => {}
            Err(RuntimeError::NotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        }
        let resp = self.delete_request(&format!("containers/{name}?force=true"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp)?;
        info!(name, "removed container");
        Ok(true)
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.lifecycle(name, "start")
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.lifecycle(name, "stop")
    }

    fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.lifecycle(name, "restart")
    }
}

/// In-process runtime. Can be told to fail creation for exercising rollback.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    containers: Mutex<BTreeMap<String, WorkloadRecord>>,
    fail_create: Option<String>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create` fails with `Unavailable(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            containers: Mutex::default(),
            fail_create: Some(message.into()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        containers.keys().cloned().collect()
    }

    fn set_status(&self, name: &str, status: &str) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        let record = containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        record.status = status.to_string();
        Ok(())
    }
}

impl WorkloadRuntime for MemoryRuntime {
    fn create(&self, spec: &WorkloadSpec) -> Result<WorkloadRecord, RuntimeError> {
        if let Some(message) = &self.fail_create {
            return Err(RuntimeError::Unavailable(message.clone()));
        }
        let mut containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        if containers.contains_key(&spec.name) {
            return Err(RuntimeError::Rejected {
                status: 409,
                message: format!("container name '{}' is already in use", spec.name),
            });
        }
        let record = WorkloadRecord {
            id: uuid::Uuid::new_v4().simple().to_string(),
            status: "running".to_string(),
            spec: spec.clone(),
            created_at: Utc::now(),
        };
        containers.insert(spec.name.clone(), record.clone());
        Ok(record)
    }

    fn delete(&self, name: &str) -> Result<bool, RuntimeError> {
        let mut containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(containers.remove(name).is_some())
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.set_status(name, "running")
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.set_status(name, "exited")
    }

    fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.set_status(name, "running")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{create_body, MemoryRuntime, RuntimeError, WorkloadRuntime};
    use crate::model::{NetworkDescriptor, PortMapping, PortProtocol, WorkloadSpec};

    fn spec() -> WorkloadSpec {
        let mut spec = WorkloadSpec::new(
            "web1",
            "nginx:latest",
            NetworkDescriptor {
                vlan_id: 150,
                ip_address: "10.0.150.10".into(),
                mac_address: "aa:bb:cc:dd:ee:ff".into(),
                parent_interface: "igc2".into(),
                allow_internet: true,
            },
        );
        spec.ports.push(PortMapping {
            host_port: 5353,
            container_port: 53,
            protocol: PortProtocol::Both,
        });
        spec.environment = BTreeMap::from([("MODE".to_string(), "prod".to_string())]);
        spec.volumes = BTreeMap::from([("/srv/web".to_string(), "/usr/share/nginx".to_string())]);
        spec
    }

    #[test]
    fn create_body_targets_vlan_network() {
        let body = create_body(&spec());
        assert_eq!(body["HostConfig"]["NetworkMode"], "vlan150");
        assert_eq!(body["HostConfig"]["RestartPolicy"]["Name"], "unless-stopped");
        assert_eq!(body["HostConfig"]["Binds"][0], "/srv/web:/usr/share/nginx");
        assert_eq!(body["Env"][0], "MODE=prod");
        assert_eq!(body["HostConfig"]["PortBindings"]["53/udp"][0]["HostPort"], "5353");
        assert!(body["ExposedPorts"].get("53/tcp").is_some());
    }

    #[test]
    fn memory_runtime_lifecycle() {
        let runtime = MemoryRuntime::new();
        let record = runtime.create(&spec()).expect("create");
        assert_eq!(record.status, "running");
        assert!(runtime.create(&spec()).is_err());
        runtime.stop("web1").expect("stop");
        assert!(matches!(runtime.start("ghost"), Err(RuntimeError::NotFound(_))));
        assert!(runtime.delete("web1").expect("delete"));
        assert!(!runtime.delete("web1").expect("delete again"));
    }
}
