use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, PoisonError};

use tracing::debug;

use crate::model::{PortProtocol, WorkloadSpec};
use crate::validate;

/// Advisory lock registry over resource keys.
///
/// A caller blocks until none of its keys is held, then takes all of them at
/// once. Keys are released when the returned guard drops.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<BTreeSet<String>>,
    released: Condvar,
}

#[must_use = "keys are released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    keys: BTreeSet<String>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, keys: BTreeSet<String>) -> KeyGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while keys.iter().any(|k| held.contains(k)) {
            debug!(?keys, "waiting for resource keys");
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.extend(keys.iter().cloned());
        KeyGuard { locks: self, keys }
    }

    pub fn is_held(&self, key: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.contains(key)
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            held.remove(key);
        }
        self.locks.released.notify_all();
    }
}

fn ip_key(ip: &str) -> String {
    validate::recorded_ipv4(ip).map_or_else(|| ip.to_string(), |addr| addr.to_string())
}

/// Every key a deployment of `spec` touches.
pub fn deployment_keys(spec: &WorkloadSpec) -> BTreeSet<String> {
    let net = &spec.network;
    let mut keys = BTreeSet::from([
        format!("workload:{}", spec.name),
        format!("vlan:{}", net.vlan_id),
        format!("ip:{}", ip_key(&net.ip_address)),
        format!("mac:{}", net.mac_address.to_ascii_lowercase()),
    ]);
    for mapping in &spec.ports {
        let protocols: &[&str] = match mapping.protocol {
            PortProtocol::Tcp => &["tcp"],
            PortProtocol::Udp => &["udp"],
            PortProtocol::Both => &["tcp", "udp"],
        };
        for proto in protocols {
            keys.insert(format!("port:{}/{proto}", mapping.host_port));
        }
    }
    keys
}
