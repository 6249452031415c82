//! Declarative network deployments against OPNsense.
//!
//! This library manages interfaces, VLANs, firewall rules, port forwards and
//! DHCP reservations on an OPNsense appliance, either by editing its
//! `config.xml` directly or through the remote management API, and sequences
//! them into single-call workload deployments with conflict detection and
//! rollback.
//!
//! # Architecture
//!
//! - [`validate`]: Address, MAC, port, VLAN tag and prefix checks
//! - [`model`]: Typed records, creation inputs and partial-update patches
//! - [`backend`]: The [`backend::ConfigBackend`] contract and its two implementations
//!   - [`backend::document`]: Reads and rewrites the configuration document
//!   - [`backend::remote`]: Authenticated JSON calls to the management API
//! - [`service`]: Validating facade over the single active backend
//! - [`conflict`]: VLAN, IP, MAC and port collision detection
//! - [`deploy`]: Orchestrator: validate, VLAN, reservation, rules, forwards,
//!   workload, apply; compensates on failure
//! - [`runtime`]: Container engine wrapper (Docker API or in-memory)
//! - [`store`]: Workload records and the deployment audit log
//! - [`settings`]: TOML settings with flag and environment overrides
//! - [`report`]: Terminal rendering
//!
//! # Examples
//!
//! ```ignore
//! use opnsense_deploy::deploy::Orchestrator;
//! use opnsense_deploy::runtime::MemoryRuntime;
//! use opnsense_deploy::service::ConfigService;
//! use opnsense_deploy::settings::BackendChoice;
//! use opnsense_deploy::store::MemoryStore;
//!
//! let service = ConfigService::from_choice(&BackendChoice::Document {
//!     path: "config.xml".into(),
//!     backup: true,
//! })?;
//! let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
//! let orchestrator = Orchestrator::new(&service, &runtime, &store);
//! let outcome = orchestrator.validate(serde_json::from_str(request)?)?;
//! println!("valid: {}", outcome.valid);
//! ```
//!
//! # Built on xml-tree-core
//!
//! Document parsing, mutation and atomic writes come from `xml-tree-core`. All
//! OPNsense-specific layout knowledge lives in [`backend::document`].

pub mod backend;
pub mod conflict;
pub mod deploy;
pub mod error;
pub mod model;
pub mod report;
pub mod runtime;
pub mod service;
pub mod settings;
pub mod store;
pub mod validate;
