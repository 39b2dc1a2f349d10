//! Records exchanged with LXD.
//!
//! Profiles and requests are validated when they are built, so the session
//! never sends a payload LXD would reject for shape reasons.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ModelError;

/// The part of a compute instance the session reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Unique instance name; also the container and profile name on LXD.
    pub name: String,
    pub uuid: String,
    /// Image reference the instance was booted from.
    pub image_ref: String,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        uuid: impl Into<String>,
        image_ref: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::Empty("instance name"));
        }
        Ok(Self {
            name,
            uuid: uuid.into(),
            image_ref: image_ref.into(),
        })
    }
}

/// LXD `nictype` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NicType {
    Bridged,
    Macvlan,
    Physical,
    P2p,
}

impl NicType {
    /// `p2p` creates its own veth pair; every other type hangs off a host interface.
    fn requires_parent(self) -> bool {
        !matches!(self, NicType::P2p)
    }
}

impl fmt::Display for NicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NicType::Bridged => "bridged",
            NicType::Macvlan => "macvlan",
            NicType::Physical => "physical",
            NicType::P2p => "p2p",
        };
        f.write_str(s)
    }
}

/// A validated `02:00:00:aa:bb:cc` style hardware address, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAddress(String);

impl MacAddress {
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ModelError::InvalidMac(s.to_string()));
        }
        for part in &parts {
            if part.len() != 2 || u8::from_str_radix(part, 16).is_err() {
                return Err(ModelError::InvalidMac(s.to_string()));
            }
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A NIC attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDevice {
    pub name: String,
    pub nic_type: NicType,
    pub hwaddr: MacAddress,
    pub parent: Option<String>,
}

impl NetworkDevice {
    pub fn new(
        name: impl Into<String>,
        nic_type: NicType,
        hwaddr: &str,
        parent: Option<String>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::Empty("device name"));
        }
        let hwaddr = MacAddress::parse(hwaddr)?;
        let parent = parent.filter(|p| !p.is_empty());
        if nic_type.requires_parent() && parent.is_none() {
            return Err(ModelError::MissingParent(nic_type.to_string()));
        }
        Ok(Self {
            name,
            nic_type,
            hwaddr,
            parent,
        })
    }

    fn to_lxd(&self) -> Value {
        let mut device = json!({
            "type": "nic",
            "nictype": self.nic_type,
            "hwaddr": self.hwaddr.as_str(),
        });
        if let Some(parent) = &self.parent {
            device["parent"] = json!(parent);
        }
        device
    }
}

/// CPU and memory limits applied through a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub vcpus: u32,
    pub memory_mb: u64,
}

impl ResourceLimits {
    pub fn new(vcpus: u32, memory_mb: u64) -> Result<Self, ModelError> {
        if vcpus == 0 {
            return Err(ModelError::Zero("vcpus"));
        }
        if memory_mb == 0 {
            return Err(ModelError::Zero("memory_mb"));
        }
        Ok(Self { vcpus, memory_mb })
    }
}

/// A profile owned by exactly one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    pub limits: ResourceLimits,
    pub devices: Vec<NetworkDevice>,
}

impl ProfileConfig {
    pub fn new(
        name: impl Into<String>,
        limits: ResourceLimits,
        devices: Vec<NetworkDevice>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::Empty("profile name"));
        }
        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(device.name.as_str()) {
                return Err(ModelError::DuplicateDevice(device.name.clone()));
            }
        }
        Ok(Self {
            name,
            limits,
            devices,
        })
    }

    /// Profile for an instance, named after it.
    pub fn for_instance(
        instance: &Instance,
        limits: ResourceLimits,
        devices: Vec<NetworkDevice>,
    ) -> Result<Self, ModelError> {
        Self::new(instance.name.clone(), limits, devices)
    }

    /// Body for `POST /1.0/profiles`.
    pub fn to_lxd(&self) -> Value {
        let devices: BTreeMap<&str, Value> = self
            .devices
            .iter()
            .map(|d| (d.name.as_str(), d.to_lxd()))
            .collect();
        json!({
            "name": self.name,
            "config": {
                "limits.cpu": self.limits.vcpus.to_string(),
                "limits.memory": format!("{}MB", self.limits.memory_mb),
            },
            "devices": devices,
        })
    }
}

/// Body for `POST /1.0/containers/<name>/snapshots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRequest {
    pub name: String,
    pub stateful: bool,
}

impl SnapshotRequest {
    pub fn new(name: impl Into<String>, stateful: bool) -> Result<Self, ModelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::Empty("snapshot name"));
        }
        Ok(Self { name, stateful })
    }
}

/// Publish a container (or one of its snapshots) as an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Container name, or `container/snapshot` to publish a snapshot.
    pub source: String,
    /// Alias the resulting image is registered under.
    pub alias: String,
    pub public: bool,
}

impl PublishRequest {
    pub fn new(
        source: impl Into<String>,
        alias: impl Into<String>,
        public: bool,
    ) -> Result<Self, ModelError> {
        let source = source.into();
        let alias = alias.into();
        if source.is_empty() {
            return Err(ModelError::Empty("publish source"));
        }
        if alias.is_empty() {
            return Err(ModelError::Empty("image alias"));
        }
        Ok(Self {
            source,
            alias,
            public,
        })
    }

    /// Body for `POST /1.0/images`.
    pub fn to_lxd(&self) -> Value {
        let source_type = if self.source.contains('/') {
            "snapshot"
        } else {
            "container"
        };
        json!({
            "public": self.public,
            "source": {
                "type": source_type,
                "name": self.source,
            },
            "aliases": [{ "name": self.alias }],
        })
    }
}

/// Body for `POST /1.0/images/aliases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasRequest {
    pub name: String,
    #[serde(rename = "target")]
    pub fingerprint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl AliasRequest {
    pub fn new(name: impl Into<String>, fingerprint: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        let fingerprint = fingerprint.into();
        if name.is_empty() {
            return Err(ModelError::Empty("alias name"));
        }
        if fingerprint.is_empty() {
            return Err(ModelError::Empty("image fingerprint"));
        }
        Ok(Self {
            name,
            fingerprint,
            description: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridged(name: &str, mac: &str) -> NetworkDevice {
        NetworkDevice::new(name, NicType::Bridged, mac, Some("br0".into())).unwrap()
    }

    #[test]
    fn test_parse_mac() {
        let mac = MacAddress::parse("02:00:00:AA:bb:01").unwrap();
        assert_eq!(mac.as_str(), "02:00:00:aa:bb:01");

        assert!(MacAddress::parse("invalid").is_err());
        assert!(MacAddress::parse("02:00:00:00:00").is_err());
        assert!(MacAddress::parse("02:00:00:00:00:xx").is_err());
        assert!(MacAddress::parse("002:00:00:00:00:01").is_err());
    }

    #[test]
    fn test_device_requires_parent() {
        let err = NetworkDevice::new("eth0", NicType::Bridged, "02:00:00:00:00:01", None);
        assert_eq!(err, Err(ModelError::MissingParent("bridged".into())));

        let err = NetworkDevice::new(
            "eth0",
            NicType::Macvlan,
            "02:00:00:00:00:01",
            Some(String::new()),
        );
        assert_eq!(err, Err(ModelError::MissingParent("macvlan".into())));

        let p2p = NetworkDevice::new("eth0", NicType::P2p, "02:00:00:00:00:01", None).unwrap();
        assert_eq!(p2p.parent, None);
    }

    #[test]
    fn test_limits_reject_zero() {
        assert_eq!(ResourceLimits::new(0, 512), Err(ModelError::Zero("vcpus")));
        assert_eq!(ResourceLimits::new(1, 0), Err(ModelError::Zero("memory_mb")));
    }

    #[test]
    fn test_profile_rejects_duplicate_devices() {
        let limits = ResourceLimits::new(1, 512).unwrap();
        let err = ProfileConfig::new(
            "i-1",
            limits,
            vec![
                bridged("eth0", "02:00:00:00:00:01"),
                bridged("eth0", "02:00:00:00:00:02"),
            ],
        );
        assert_eq!(err, Err(ModelError::DuplicateDevice("eth0".into())));
    }

    #[test]
    fn test_profile_payload() {
        let instance = Instance::new("instance-00000001", "uuid-1", "ubuntu").unwrap();
        let limits = ResourceLimits::new(2, 2048).unwrap();
        let profile = ProfileConfig::for_instance(
            &instance,
            limits,
            vec![bridged("eth0", "02:00:00:00:00:01")],
        )
        .unwrap();

        assert_eq!(
            profile.to_lxd(),
            json!({
                "name": "instance-00000001",
                "config": {"limits.cpu": "2", "limits.memory": "2048MB"},
                "devices": {
                    "eth0": {
                        "type": "nic",
                        "nictype": "bridged",
                        "hwaddr": "02:00:00:00:00:01",
                        "parent": "br0",
                    }
                }
            })
        );
    }

    #[test]
    fn test_publish_payload_source_type() {
        let container = PublishRequest::new("i-1", "snap-image", false).unwrap();
        assert_eq!(container.to_lxd()["source"]["type"], "container");

        let snapshot = PublishRequest::new("i-1/snap0", "snap-image", true).unwrap();
        assert_eq!(snapshot.to_lxd()["source"]["type"], "snapshot");
        assert_eq!(snapshot.to_lxd()["aliases"][0]["name"], "snap-image");
    }

    #[test]
    fn test_alias_serializes_target() {
        let alias = AliasRequest::new("ubuntu", "abc123").unwrap();
        assert_eq!(
            serde_json::to_value(&alias).unwrap(),
            json!({"name": "ubuntu", "target": "abc123"})
        );
    }
}
