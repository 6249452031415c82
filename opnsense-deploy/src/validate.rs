//! Input validators for addresses, ports and 802.1Q fields.
//!
//! Validators never coerce: a value either passes unchanged (or in canonical form
//! for MAC addresses) or yields [`ConfigError::ValidationFailed`].

use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;

use crate::error::{ConfigError, Result};

pub const VLAN_TAG_MIN: u16 = 1;
pub const VLAN_TAG_MAX: u16 = 4094;
pub const PCP_MAX: u8 = 7;
pub const PREFIX_MAX: u8 = 32;

fn octets(value: &str, allow_padding: bool) -> std::result::Result<[u8; 4], String> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() != 4 {
        return Err(format!("'{value}' is not a dotted-quad IPv4 address"));
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{value}' has a malformed octet '{part}'"));
        }
        if !allow_padding && part.len() > 1 && part.starts_with('0') {
            return Err(format!("'{value}' has a zero-padded octet '{part}'"));
        }
        *slot = part
            .parse::<u8>()
            .map_err(|_| format!("octet '{part}' in '{value}' exceeds 255"))?;
    }
    Ok(octets)
}

/// Parse a dotted-quad IPv4 address. Each octet is 1-3 decimal digits, at most
/// 255, with no leading zeros, so every address has exactly one spelling.
pub fn ipv4(field: &str, value: &str) -> Result<Ipv4Addr> {
    octets(value, false)
        .map(Ipv4Addr::from)
        .map_err(|reason| ConfigError::validation(field, reason))
}

/// Read an address already on record. Zero-padded octets written by other tools
/// are accepted so stored values compare by address, not by spelling.
pub fn recorded_ipv4(value: &str) -> Option<Ipv4Addr> {
    octets(value.trim(), true).ok().map(Ipv4Addr::from)
}

/// Same address, whatever the spelling. Unreadable values compare as text.
pub fn same_ipv4(a: &str, b: &str) -> bool {
    match (recorded_ipv4(a), recorded_ipv4(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

pub fn is_ipv4(value: &str) -> bool {
    ipv4("address", value).is_ok()
}

/// Interface address mode: `dhcp` or a static IPv4 address.
pub fn interface_address(field: &str, value: &str) -> Result<()> {
    if value == "dhcp" {
        return Ok(());
    }
    ipv4(field, value).map(|_| ())
}

/// Return the six hex pairs of a MAC written with `:` or `-` separators, one
/// style per address.
fn mac_pairs(value: &str) -> Option<Vec<&str>> {
    if value.len() != 17 {
        return None;
    }
    let separator = if value.contains(':') { ':' } else { '-' };
    let pairs: Vec<&str> = value.split(separator).collect();
    let well_formed = pairs.len() == 6
        && pairs
            .iter()
            .all(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()));
    well_formed.then_some(pairs)
}

pub fn is_mac(value: &str) -> bool {
    mac_pairs(value).is_some()
}

/// Canonical lowercase colon-separated form of a MAC address.
pub fn normalize_mac(field: &str, value: &str) -> Result<String> {
    let pairs = mac_pairs(value).ok_or_else(|| {
        ConfigError::validation(
            field,
            format!("'{value}' is not six hex pairs separated by ':' or by '-'"),
        )
    })?;
    Ok(pairs.join(":").to_ascii_lowercase())
}

/// A single port or an inclusive `start:end` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

fn port_number(field: &str, raw: &str, whole: &str) -> Result<u16> {
    let parsed = raw
        .parse::<u32>()
        .map_err(|_| ConfigError::validation(field, format!("'{whole}' is not a port number")))?;
    if !(1..=65535).contains(&parsed) {
        return Err(ConfigError::validation(
            field,
            format!("port {parsed} is outside 1-65535"),
        ));
    }
    Ok(parsed as u16)
}

/// Parse `N` or `start:end`.
pub fn port_range(field: &str, value: &str) -> Result<PortRange> {
    match value.split_once(':') {
        None => Ok(PortRange::single(port_number(field, value, value)?)),
        Some((start, end)) => {
            let start = port_number(field, start, value)?;
            let end = port_number(field, end, value)?;
            if start > end {
                return Err(ConfigError::validation(
                    field,
                    format!("range start {start} is greater than end {end}"),
                ));
            }
            Ok(PortRange { start, end })
        }
    }
}

pub fn port(field: &str, value: u16) -> Result<u16> {
    if value == 0 {
        return Err(ConfigError::validation(field, "port 0 is outside 1-65535"));
    }
    Ok(value)
}

pub fn vlan_tag(field: &str, tag: u16) -> Result<u16> {
    if !(VLAN_TAG_MIN..=VLAN_TAG_MAX).contains(&tag) {
        return Err(ConfigError::validation(
            field,
            format!("VLAN tag {tag} is outside {VLAN_TAG_MIN}-{VLAN_TAG_MAX}"),
        ));
    }
    Ok(tag)
}

pub fn pcp(field: &str, value: u8) -> Result<u8> {
    if value > PCP_MAX {
        return Err(ConfigError::validation(
            field,
            format!("priority {value} is outside 0-{PCP_MAX}"),
        ));
    }
    Ok(value)
}

pub fn prefix(field: &str, value: u8) -> Result<u8> {
    if value > PREFIX_MAX {
        return Err(ConfigError::validation(
            field,
            format!("prefix length {value} is outside 0-{PREFIX_MAX}"),
        ));
    }
    Ok(value)
}

/// Names that become element names in the configuration document: an ASCII
/// letter or `_`, then letters, digits, `_`, `.` or `-`.
pub fn element_name(field: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(ConfigError::validation(
            field,
            format!("'{value}' must start with a letter or '_' and contain only letters, digits, '_', '.' or '-'"),
        ));
    }
    Ok(())
}

pub fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn ipv4_rejects_octets_above_255() {
        assert!(is_ipv4("10.0.150.10"));
        assert!(is_ipv4("255.255.255.255"));
        assert!(!is_ipv4("999.1.1.1"));
        assert!(!is_ipv4("10.0.0"));
        assert!(!is_ipv4("10.0.0.1.2"));
        assert!(!is_ipv4("10.0.0.a"));
        assert!(!is_ipv4("10..0.1"));
        assert!(!is_ipv4("1000.0.0.1"));
    }

    #[test]
    fn ipv4_has_one_spelling_per_address() {
        assert!(is_ipv4("10.0.0.0"));
        assert!(!is_ipv4("010.0.150.10"));
        assert!(!is_ipv4("10.0.150.010"));
        assert!(!is_ipv4("10.00.150.10"));
        let err = ipv4("network.ip_address", "010.0.150.010").expect_err("padded");
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn recorded_addresses_compare_by_value() {
        assert_eq!(recorded_ipv4("010.0.150.010"), Some(Ipv4Addr::new(10, 0, 150, 10)));
        assert!(same_ipv4("010.0.150.010", "10.0.150.10"));
        assert!(!same_ipv4("10.0.150.11", "10.0.150.10"));
        assert!(same_ipv4("dhcp", "dhcp"));
        assert!(!same_ipv4("dhcp", "10.0.150.10"));
    }

    #[test]
    fn ipv4_failure_names_the_field() {
        let err = ipv4("dst_ip", "300.1.1.1").expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.to_string().starts_with("invalid dst_ip"));
    }

    #[test]
    fn interface_address_accepts_dhcp() {
        assert!(interface_address("ipaddr", "dhcp").is_ok());
        assert!(interface_address("ipaddr", "192.168.1.1").is_ok());
        assert!(interface_address("ipaddr", "DHCP").is_err());
    }

    #[test]
    fn normalize_mac_is_canonical_and_idempotent() {
        let inputs = [
            "AA:BB:CC:DD:EE:FF",
            "aa-bb-cc-dd-ee-ff",
            "Aa:bB:cc:DD:ee:Ff",
        ];
        for input in inputs {
            let once = normalize_mac("mac", input).expect("valid mac");
            assert_eq!(once, "aa:bb:cc:dd:ee:ff");
            assert_eq!(normalize_mac("mac", &once).expect("still valid"), once);
        }
    }

    #[test]
    fn mac_shape_is_enforced() {
        assert!(!is_mac("aa:bb:cc:dd:ee"));
        assert!(!is_mac("aabb.ccdd.eeff"));
        assert!(!is_mac("gg:bb:cc:dd:ee:ff"));
        assert!(!is_mac("aaa:b:cc:dd:ee:ff"));
        assert!(!is_mac("aa:bb-cc:dd-ee:ff"));
        assert!(!is_mac("aa-bb-cc-dd-ee:ff"));
        assert!(normalize_mac("mac", "").is_err());
    }

    #[test]
    fn port_ranges_parse_and_check_order() {
        assert_eq!(port_range("port", "443").expect("single"), PortRange::single(443));
        let range = port_range("port", "8000:8080").expect("range");
        assert!(range.contains(8080));
        assert!(!range.contains(8081));
        assert_eq!(range.to_string(), "8000:8080");

        assert!(port_range("port", "0").is_err());
        assert!(port_range("port", "65536").is_err());
        assert!(port_range("port", "9000:8000").is_err());
        assert!(port_range("port", "http").is_err());
        assert!(port_range("port", "80:").is_err());
    }

    #[test]
    fn element_names_are_xml_safe() {
        for name in ["lan", "opt150", "_guest", "wan-2", "igc0.100"] {
            assert!(element_name("name", name).is_ok(), "{name}");
        }
        for name in ["", "my lan", "lan<", "1opt", "-lan", "a/b", "lan&"] {
            let err = element_name("name", name).expect_err(name);
            assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        }
    }

    #[test]
    fn vlan_and_priority_bounds() {
        assert!(vlan_tag("tag", 1).is_ok());
        assert!(vlan_tag("tag", 4094).is_ok());
        assert!(vlan_tag("tag", 0).is_err());
        assert!(vlan_tag("tag", 4095).is_err());
        assert!(pcp("pcp", 7).is_ok());
        assert!(pcp("pcp", 8).is_err());
        assert!(prefix("subnet", 32).is_ok());
        assert!(prefix("subnet", 33).is_err());
    }
}
