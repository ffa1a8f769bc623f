use std::collections::HashMap;

use crate::error::StorageError;

/// Static metadata about one datacenter: its S3-compatible endpoint and the
/// region string the AWS SDK needs to sign requests against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterInfo {
    pub id: &'static str,
    pub endpoint: &'static str,
    pub region: &'static str,
}

const DATACENTERS: &[DatacenterInfo] = &[
    DatacenterInfo { id: "EUR-IS-1", endpoint: "https://s3api-eur-is-1.runvolume.io", region: "eur-is-1" },
    DatacenterInfo { id: "EU-RO-1", endpoint: "https://s3api-eu-ro-1.runvolume.io", region: "eu-ro-1" },
    DatacenterInfo { id: "EU-CZ-1", endpoint: "https://s3api-eu-cz-1.runvolume.io", region: "eu-cz-1" },
    DatacenterInfo { id: "US-KS-2", endpoint: "https://s3api-us-ks-2.runvolume.io", region: "us-ks-2" },
];

/// A datacenter identifier that used to exist under a different name. Lookups
/// are rewritten transparently so callers holding onto an older volume record
/// don't have to special-case the rename themselves.
const LEGACY_ALIASES: &[(&str, &str)] = &[("US-KS-1", "US-KS-2")];

/// Read-only lookup table mapping datacenter identifiers to their S3
/// endpoint and region. Identifiers are matched case-insensitively and legacy
/// aliases are resolved before lookup.
pub struct EndpointRegistry {
    by_id: HashMap<&'static str, &'static DatacenterInfo>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        let by_id = DATACENTERS.iter().map(|dc| (dc.id, dc)).collect();
        Self { by_id }
    }

    fn normalize(raw: &str) -> String {
        let upper = raw.trim().to_uppercase();
        for (alias, canonical) in LEGACY_ALIASES {
            if upper == *alias {
                return canonical.to_string();
            }
        }
        upper
    }

    /// Looks up endpoint/region metadata for a datacenter id, case-insensitive
    /// and alias-aware.
    pub fn lookup(&self, datacenter_id: &str) -> Result<&'static DatacenterInfo, StorageError> {
        let normalized = Self::normalize(datacenter_id);
        self.by_id
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| StorageError::UnknownDatacenter(datacenter_id.to_string()))
    }

    pub fn all(&self) -> &'static [DatacenterInfo] {
        DATACENTERS
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
