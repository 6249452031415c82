use serde::{Deserialize, Serialize};

use super::RawFields;
use crate::error::Result;
use crate::validate;

/// Device name OPNsense gives a tagged interface.
pub fn derived_vlan_interface(parent: &str, tag: u16) -> String {
    format!("{parent}_vlan{tag}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub uuid: String,
    /// Parent physical interface (`if`).
    pub parent: String,
    pub tag: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pcp: u8,
    /// Always `{parent}_vlan{tag}`; recomputed rather than read back.
    pub vlanif: String,
    #[serde(default, skip_serializing_if = "RawFields::is_empty")]
    pub extra: RawFields,
}

impl Vlan {
    pub fn from_new(uuid: impl Into<String>, new: &NewVlan) -> Self {
        Self {
            uuid: uuid.into(),
            parent: new.parent.clone(),
            tag: new.tag,
            description: new.description.clone(),
            pcp: new.pcp,
            vlanif: derived_vlan_interface(&new.parent, new.tag),
            extra: RawFields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVlan {
    pub parent: String,
    pub tag: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pcp: u8,
}

impl NewVlan {
    pub fn new(parent: impl Into<String>, tag: u16, description: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            tag,
            description: description.into(),
            pcp: 0,
        }
    }

    pub fn validated(self) -> Result<Self> {
        validate::non_empty("parent", &self.parent)?;
        validate::vlan_tag("tag", self.tag)?;
        validate::pcp("pcp", self.pcp)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcp: Option<u8>,
}

impl VlanPatch {
    pub fn validated(self) -> Result<Self> {
        if let Some(parent) = &self.parent {
            validate::non_empty("parent", parent)?;
        }
        if let Some(tag) = self.tag {
            validate::vlan_tag("tag", tag)?;
        }
        if let Some(pcp) = self.pcp {
            validate::pcp("pcp", pcp)?;
        }
        Ok(self)
    }
}
