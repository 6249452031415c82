use serde::{Deserialize, Serialize};

use super::RawFields;
use crate::error::{ConfigError, Result};
use crate::validate;

/// Per-interface DHCP server settings with their static mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpConfig {
    pub uuid: String,
    pub interface: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub range_from: String,
    #[serde(default)]
    pub range_to: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns_server: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub static_mappings: Vec<StaticMapping>,
    #[serde(default, skip_serializing_if = "RawFields::is_empty")]
    pub extra: RawFields,
}

impl DhcpConfig {
    /// A fresh config owns no static mappings yet.
    pub fn from_new(uuid: impl Into<String>, new: &NewDhcpConfig) -> Self {
        Self {
            uuid: uuid.into(),
            interface: new.interface.clone(),
            enabled: new.enabled,
            range_from: new.range_from.clone(),
            range_to: new.range_to.clone(),
            gateway: new.gateway.clone(),
            dns_server: new.dns_server.clone(),
            domain: new.domain.clone(),
            static_mappings: Vec::new(),
            extra: RawFields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDhcpConfig {
    pub interface: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub range_from: String,
    #[serde(default)]
    pub range_to: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns_server: String,
    #[serde(default)]
    pub domain: String,
}

fn default_true() -> bool {
    true
}

fn optional_ipv4(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    validate::ipv4(field, value).map(|_| ())
}

impl NewDhcpConfig {
    pub fn validated(self) -> Result<Self> {
        validate::element_name("interface", &self.interface)?;
        optional_ipv4("range_from", &self.range_from)?;
        optional_ipv4("range_to", &self.range_to)?;
        if self.range_from.is_empty() != self.range_to.is_empty() {
            return Err(ConfigError::validation(
                "range",
                "range_from and range_to must be given together",
            ));
        }
        if !self.range_from.is_empty() {
            let from = validate::ipv4("range_from", &self.range_from)?;
            let to = validate::ipv4("range_to", &self.range_to)?;
            if from > to {
                return Err(ConfigError::validation(
                    "range",
                    format!("{from} is above {to}"),
                ));
            }
        }
        optional_ipv4("gateway", &self.gateway)?;
        optional_ipv4("dns_server", &self.dns_server)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl DhcpConfigPatch {
    pub fn validated(self) -> Result<Self> {
        for (field, value) in [
            ("range_from", &self.range_from),
            ("range_to", &self.range_to),
            ("gateway", &self.gateway),
            ("dns_server", &self.dns_server),
        ] {
            if let Some(value) = value {
                optional_ipv4(field, value)?;
            }
        }
        Ok(self)
    }
}

impl From<&NewDhcpConfig> for DhcpConfigPatch {
    fn from(new: &NewDhcpConfig) -> Self {
        Self {
            enabled: Some(new.enabled),
            range_from: Some(new.range_from.clone()),
            range_to: Some(new.range_to.clone()),
            gateway: Some(new.gateway.clone()),
            dns_server: Some(new.dns_server.clone()),
            domain: Some(new.domain.clone()),
        }
    }
}

impl From<&DhcpConfig> for DhcpConfigPatch {
    fn from(config: &DhcpConfig) -> Self {
        Self {
            enabled: Some(config.enabled),
            range_from: Some(config.range_from.clone()),
            range_to: Some(config.range_to.clone()),
            gateway: Some(config.gateway.clone()),
            dns_server: Some(config.dns_server.clone()),
            domain: Some(config.domain.clone()),
        }
    }
}

/// MAC to IP reservation owned by one interface's DHCP config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMapping {
    pub uuid: String,
    pub interface: String,
    pub mac: String,
    pub ipaddr: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub winsserver: String,
    #[serde(default)]
    pub dnsserver: String,
    #[serde(default)]
    pub ntpserver: String,
    #[serde(default, skip_serializing_if = "RawFields::is_empty")]
    pub extra: RawFields,
}

impl StaticMapping {
    pub fn from_new(uuid: impl Into<String>, interface: &str, new: &NewStaticMapping) -> Self {
        Self {
            uuid: uuid.into(),
            interface: interface.to_string(),
            mac: new.mac.clone(),
            ipaddr: new.ipaddr.clone(),
            hostname: new.hostname.clone(),
            description: new.description.clone(),
            winsserver: new.winsserver.clone(),
            dnsserver: new.dnsserver.clone(),
            ntpserver: new.ntpserver.clone(),
            extra: RawFields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStaticMapping {
    pub mac: String,
    pub ipaddr: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub winsserver: String,
    #[serde(default)]
    pub dnsserver: String,
    #[serde(default)]
    pub ntpserver: String,
}

impl NewStaticMapping {
    pub fn new(mac: impl Into<String>, ipaddr: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            ipaddr: ipaddr.into(),
            hostname: String::new(),
            description: String::new(),
            winsserver: String::new(),
            dnsserver: String::new(),
            ntpserver: String::new(),
        }
    }

    pub fn validated(mut self) -> Result<Self> {
        self.mac = validate::normalize_mac("mac", &self.mac)?;
        validate::ipv4("ipaddr", &self.ipaddr)?;
        optional_ipv4("winsserver", &self.winsserver)?;
        optional_ipv4("dnsserver", &self.dnsserver)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMappingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipaddr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winsserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnsserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntpserver: Option<String>,
}

impl StaticMappingPatch {
    pub fn validated(mut self) -> Result<Self> {
        if let Some(mac) = &self.mac {
            self.mac = Some(validate::normalize_mac("mac", mac)?);
        }
        if let Some(ip) = &self.ipaddr {
            validate::ipv4("ipaddr", ip)?;
        }
        Ok(self)
    }
}

impl From<&NewStaticMapping> for StaticMappingPatch {
    fn from(new: &NewStaticMapping) -> Self {
        Self {
            mac: Some(new.mac.clone()),
            ipaddr: Some(new.ipaddr.clone()),
            hostname: Some(new.hostname.clone()),
            description: Some(new.description.clone()),
            winsserver: Some(new.winsserver.clone()),
            dnsserver: Some(new.dnsserver.clone()),
            ntpserver: Some(new.ntpserver.clone()),
        }
    }
}

impl From<&StaticMapping> for StaticMappingPatch {
    fn from(mapping: &StaticMapping) -> Self {
        Self {
            mac: Some(mapping.mac.clone()),
            ipaddr: Some(mapping.ipaddr.clone()),
            hostname: Some(mapping.hostname.clone()),
            description: Some(mapping.description.clone()),
            winsserver: Some(mapping.winsserver.clone()),
            dnsserver: Some(mapping.dnsserver.clone()),
            ntpserver: Some(mapping.ntpserver.clone()),
        }
    }
}

/// Runtime lease reported by the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLease {
    pub address: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{NewDhcpConfig, NewStaticMapping};

    #[test]
    fn static_mapping_mac_is_normalized() {
        let mapping = NewStaticMapping::new("AA-BB-CC-DD-EE-FF", "10.0.150.10")
            .validated()
            .expect("valid");
        assert_eq!(mapping.mac, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn dhcp_range_must_be_ordered_and_complete() {
        let mut config = NewDhcpConfig {
            interface: "opt150".into(),
            enabled: true,
            range_from: "10.0.150.100".into(),
            range_to: String::new(),
            gateway: String::new(),
            dns_server: String::new(),
            domain: String::new(),
        };
        assert!(config.clone().validated().is_err());

        config.range_to = "10.0.150.50".into();
        assert!(config.clone().validated().is_err());

        config.range_to = "10.0.150.200".into();
        assert!(config.validated().is_ok());
    }
}
