use serde::{Deserialize, Serialize};

use super::RawFields;
use crate::error::Result;
use crate::validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub uuid: String,
    /// Logical name such as `lan` or `opt3`.
    pub name: String,
    /// Physical device name (`if`).
    pub physical: String,
    #[serde(default)]
    pub description: String,
    /// `dhcp` or a static IPv4 address.
    #[serde(default)]
    pub ipaddr: String,
    #[serde(default)]
    pub subnet: Option<u8>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub spoofmac: String,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub media: String,
    #[serde(default)]
    pub mediaopt: String,
    #[serde(default, skip_serializing_if = "RawFields::is_empty")]
    pub extra: RawFields,
}

impl Interface {
    pub fn from_new(uuid: impl Into<String>, new: &NewInterface) -> Self {
        Self {
            uuid: uuid.into(),
            name: new.name.clone(),
            physical: new.physical.clone(),
            description: new.description.clone(),
            ipaddr: new.ipaddr.clone(),
            subnet: new.subnet,
            enabled: new.enabled,
            gateway: new.gateway.clone(),
            spoofmac: new.spoofmac.clone(),
            mtu: new.mtu,
            media: new.media.clone(),
            mediaopt: new.mediaopt.clone(),
            extra: RawFields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInterface {
    pub name: String,
    pub physical: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_ipaddr")]
    pub ipaddr: String,
    #[serde(default)]
    pub subnet: Option<u8>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub spoofmac: String,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub media: String,
    #[serde(default)]
    pub mediaopt: String,
}

fn default_ipaddr() -> String {
    "dhcp".to_string()
}

fn default_true() -> bool {
    true
}

impl NewInterface {
    pub fn new(name: impl Into<String>, physical: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            physical: physical.into(),
            description: String::new(),
            ipaddr: default_ipaddr(),
            subnet: None,
            enabled: true,
            gateway: String::new(),
            spoofmac: String::new(),
            mtu: None,
            media: String::new(),
            mediaopt: String::new(),
        }
    }

    pub fn validated(mut self) -> Result<Self> {
        validate::element_name("name", &self.name)?;
        validate::non_empty("physical", &self.physical)?;
        validate::interface_address("ipaddr", &self.ipaddr)?;
        if let Some(subnet) = self.subnet {
            validate::prefix("subnet", subnet)?;
        }
        if !self.gateway.is_empty() {
            validate::ipv4("gateway", &self.gateway)?;
        }
        if !self.spoofmac.is_empty() {
            self.spoofmac = validate::normalize_mac("spoofmac", &self.spoofmac)?;
        }
        Ok(self)
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipaddr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoofmac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediaopt: Option<String>,
}

impl InterfacePatch {
    pub fn validated(mut self) -> Result<Self> {
        if let Some(physical) = &self.physical {
            validate::non_empty("physical", physical)?;
        }
        if let Some(ipaddr) = &self.ipaddr {
            validate::interface_address("ipaddr", ipaddr)?;
        }
        if let Some(subnet) = self.subnet {
            validate::prefix("subnet", subnet)?;
        }
        if let Some(gateway) = self.gateway.as_deref().filter(|g| !g.is_empty()) {
            validate::ipv4("gateway", gateway)?;
        }
        if let Some(mac) = self.spoofmac.as_deref().filter(|m| !m.is_empty()) {
            self.spoofmac = Some(validate::normalize_mac("spoofmac", mac)?);
        }
        Ok(self)
    }
}

impl From<&NewInterface> for InterfacePatch {
    fn from(new: &NewInterface) -> Self {
        Self {
            physical: Some(new.physical.clone()),
            description: Some(new.description.clone()),
            ipaddr: Some(new.ipaddr.clone()),
            subnet: new.subnet,
            enabled: Some(new.enabled),
            gateway: Some(new.gateway.clone()),
            spoofmac: Some(new.spoofmac.clone()),
            mtu: new.mtu,
            media: Some(new.media.clone()),
            mediaopt: Some(new.mediaopt.clone()),
        }
    }
}

impl From<&Interface> for InterfacePatch {
    fn from(record: &Interface) -> Self {
        Self {
            physical: Some(record.physical.clone()),
            description: Some(record.description.clone()),
            ipaddr: Some(record.ipaddr.clone()),
            subnet: record.subnet,
            enabled: Some(record.enabled),
            gateway: Some(record.gateway.clone()),
            spoofmac: Some(record.spoofmac.clone()),
            mtu: record.mtu,
            media: Some(record.media.clone()),
            mediaopt: Some(record.mediaopt.clone()),
        }
    }
}
