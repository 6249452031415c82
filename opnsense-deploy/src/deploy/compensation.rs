use tracing::{info, warn};

use crate::error::{ErrorKind, Result};
use crate::runtime::WorkloadRuntime;
use crate::service::ConfigService;
use crate::store::WorkloadStore;

/// Something a deployment created and must delete if a later step fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Created {
    Vlan { uuid: String },
    StaticMapping { interface: String, uuid: String },
    FirewallRule { uuid: String },
    PortForward { uuid: String },
    Workload { name: String },
}

impl Created {
    fn undo(
        &self,
        service: &ConfigService,
        runtime: &dyn WorkloadRuntime,
        store: &dyn WorkloadStore,
    ) -> Result<()> {
        match self {
            Self::Vlan { uuid } => service.delete_vlan(uuid),
            Self::StaticMapping { interface, uuid } => service.delete_static_mapping(interface, uuid),
            Self::FirewallRule { uuid } => service.delete_firewall_rule(uuid),
            Self::PortForward { uuid } => service.delete_port_forward(uuid),
            Self::Workload { name } => {
                runtime.delete(name)?;
                store.remove_workload(name)?;
                Ok(())
            }
        }
    }
}

/// Ordered record of creations, undone newest first.
#[derive(Debug, Default)]
pub(crate) struct Compensation {
    created: Vec<Created>,
}

impl Compensation {
    pub(crate) fn push(&mut self, created: Created) {
        self.created.push(created);
    }

    pub(crate) fn len(&self) -> usize {
        self.created.len()
    }

    /// Undo everything recorded. Returns the failures, which are logged and skipped.
    pub(crate) fn unwind(
        self,
        service: &ConfigService,
        runtime: &dyn WorkloadRuntime,
        store: &dyn WorkloadStore,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        for created in self.created.into_iter().rev() {
            match created.undo(service, runtime, store) {
                Ok(()) => info!(?created, "rolled back"),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    info!(?created, "already gone during rollback");
                }
                Err(err) => {
                    warn!(?created, "rollback step failed: {err}");
                    failures.push(format!("{created:?}: {err}"));
                }
            }
        }
        failures
    }
}
