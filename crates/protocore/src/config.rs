//! Space-level configuration: the GC's tuning knobs plus the two safety
//! valves spec.md leaves as open numeric choices (attribute-cache depth,
//! MRO-walker bound). See `DESIGN.md` for the reasoning behind the chosen
//! defaults.

use protocore_gc::GcConfig;

/// Configuration for a [`crate::space::Space`].
#[derive(Debug, Clone)]
pub struct SpaceConfig {
    /// Allocator/collector tuning, unchanged from `protocore-gc`.
    pub gc: GcConfig,

    /// Depth of each thread's direct-mapped attribute cache, in entries.
    /// Must be a power of two: the cache indexes by
    /// `(handle(o) ^ hash(name)) mod depth`, and a power-of-two depth turns
    /// that modulo into a mask.
    pub attribute_cache_depth: usize,

    /// Maximum number of parent-link hops `get_attribute`'s chain walker
    /// will take before giving up and reporting "not found" (spec.md
    /// §4.8's "implementation-defined maximum"). Exists purely as a
    /// safety valve against pathological fan-out; well-formed programs
    /// never come close to it.
    pub mro_walk_limit: usize,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        SpaceConfig {
            gc: GcConfig::default(),
            attribute_cache_depth: 256,
            mro_walk_limit: 10_000,
        }
    }
}

impl SpaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gc
            .validate()
            .map_err(|e| ConfigError::Gc(e.to_string()))?;
        if self.attribute_cache_depth == 0 || !self.attribute_cache_depth.is_power_of_two() {
            return Err(ConfigError::InvalidCacheDepth(self.attribute_cache_depth));
        }
        if self.mro_walk_limit == 0 {
            return Err(ConfigError::InvalidWalkLimit);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid gc config: {0}")]
    Gc(String),

    #[error("attribute_cache_depth must be a nonzero power of two, got {0}")]
    InvalidCacheDepth(usize),

    #[error("mro_walk_limit must be > 0")]
    InvalidWalkLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SpaceConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_cache_depth() {
        let config = SpaceConfig {
            attribute_cache_depth: 100,
            ..SpaceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
