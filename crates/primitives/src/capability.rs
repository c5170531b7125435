use serde::{Deserialize, Serialize};

/// A structured description of compute a miner can supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Model name the miner can serve, e.g. `"m1"`.
    pub model: String,
    /// Memory available to a single job, in bytes.
    pub mem_bytes: u64,
    /// Region the miner runs in, if advertised.
    pub region: Option<String>,
    /// Extra feature flags the miner supports (e.g. `"fp8"`, `"batching"`).
    pub features: Vec<String>,
}

/// A structured description of compute a job requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequirement {
    /// Required model name.
    pub model: String,
    /// Minimum memory the job needs, in bytes.
    pub min_mem_bytes: u64,
    /// Required region, if the job is region-pinned.
    pub region: Option<String>,
    /// Feature flags the job requires; all must be present on the miner.
    pub required_features: Vec<String>,
}

impl CapabilityRequirement {
    /// Whether `capability` meets or exceeds every constraint of `self`.
    #[must_use]
    pub fn is_satisfied_by(&self, capability: &Capability) -> bool {
        if self.model != capability.model {
            return false;
        }
        if capability.mem_bytes < self.min_mem_bytes {
            return false;
        }
        if let Some(region) = &self.region {
            if capability.region.as_ref() != Some(region) {
                return false;
            }
        }
        self.required_features.iter().all(|f| capability.features.contains(f))
    }
}
