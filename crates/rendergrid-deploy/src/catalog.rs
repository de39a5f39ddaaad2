//! Region catalog and platform limits, checked before any provisioning call.

use std::collections::BTreeMap;

use rendergrid_core::{WorkerSpec, naming};

use crate::error::{DeployError, DeployResult};

const MIN_MEMORY_MIB: u64 = 128;
const MAX_MEMORY_MIB: u64 = 32 * 1024;
const MIN_CPU_MILLIS: u32 = 80;
const MAX_CPU_MILLIS: u32 = 8000;
/// More than this many millicores needs at least `HIGH_CPU_MIN_MEMORY_MIB`.
const HIGH_CPU_MILLIS: u32 = 4000;
const HIGH_CPU_MIN_MEMORY_MIB: u64 = 2048;
const MIN_DISK_MB: u32 = 512;
const MAX_DISK_MB: u32 = 10_240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionFeatures {
    pub enhanced_monitoring: bool,
    pub private_networking: bool,
}

impl RegionFeatures {
    const FULL: Self = Self {
        enhanced_monitoring: true,
        private_networking: true,
    };
    const NO_MONITORING: Self = Self {
        enhanced_monitoring: false,
        private_networking: true,
    };
}

/// Regions workers can be deployed to and what each supports.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    regions: BTreeMap<String, RegionFeatures>,
}

impl Default for RegionCatalog {
    fn default() -> Self {
        let full = [
            "us-east1", "us-east4", "us-central1", "us-west1", "europe-west1", "europe-west2",
            "europe-west4", "asia-east1", "asia-northeast1", "us-east-1", "us-east-2",
            "us-west-2", "eu-central-1", "eu-west-1", "eu-west-2", "ap-northeast-1",
            "ap-southeast-1", "ap-southeast-2", "ap-south-1",
        ];
        let no_monitoring = ["ap-east-1", "me-south-1", "af-south-1", "eu-south-1", "me-west1"];
        let mut regions = BTreeMap::new();
        for region in full {
            regions.insert(region.to_string(), RegionFeatures::FULL);
        }
        for region in no_monitoring {
            regions.insert(region.to_string(), RegionFeatures::NO_MONITORING);
        }
        Self { regions }
    }
}

impl RegionCatalog {
    pub fn empty() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: &str, features: RegionFeatures) -> Self {
        self.regions.insert(region.to_string(), features);
        self
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn features(&self, region: &str) -> Option<RegionFeatures> {
        self.regions.get(region).copied()
    }

    /// Reject combinations the platform would refuse.
    pub fn check(&self, spec: &WorkerSpec) -> DeployResult<()> {
        let region = &spec.identity.region;
        let features = self
            .features(region)
            .ok_or_else(|| DeployError::Unsupported(format!("unknown region {region}")))?;

        if spec.enhanced_monitoring && !features.enhanced_monitoring {
            return Err(DeployError::Unsupported(format!(
                "enhanced monitoring is not available in {region}"
            )));
        }
        let wants_network = spec
            .network
            .as_ref()
            .is_some_and(|n| n.vpc_connector.is_some());
        if wants_network && !features.private_networking {
            return Err(DeployError::Unsupported(format!(
                "private networking is not available in {region}"
            )));
        }

        let memory = naming::memory_mib(&spec.identity.memory)?;
        let cpu = naming::cpu_millis(&spec.identity.cpu)?;
        if !(MIN_MEMORY_MIB..=MAX_MEMORY_MIB).contains(&memory) {
            return Err(DeployError::Unsupported(format!(
                "memory {memory}Mi outside {MIN_MEMORY_MIB}..={MAX_MEMORY_MIB}Mi"
            )));
        }
        if !(MIN_CPU_MILLIS..=MAX_CPU_MILLIS).contains(&cpu) {
            return Err(DeployError::Unsupported(format!(
                "cpu {} outside 0.08..=8",
                spec.identity.cpu
            )));
        }
        if cpu > HIGH_CPU_MILLIS && memory < HIGH_CPU_MIN_MEMORY_MIB {
            return Err(DeployError::Unsupported(format!(
                "cpu {} requires at least {HIGH_CPU_MIN_MEMORY_MIB}Mi of memory",
                spec.identity.cpu
            )));
        }
        if !(MIN_DISK_MB..=MAX_DISK_MB).contains(&spec.disk_mb) {
            return Err(DeployError::Unsupported(format!(
                "disk {}MB outside {MIN_DISK_MB}..={MAX_DISK_MB}MB",
                spec.disk_mb
            )));
        }
        Ok(())
    }
}
