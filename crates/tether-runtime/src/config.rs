//! Runtime configuration

use tether_sdk::RegistryConfig;

/// Default maximum number of stack slots per runtime
pub const DEFAULT_STACK_LIMIT: usize = 65500;

/// Default maximum depth of nested native calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Limits of one runtime instance
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of values on the evaluation stack
    pub stack_limit: usize,
    /// Maximum nesting of `call`
    pub max_call_depth: usize,
    /// Limits of a registry created through [`RuntimeConfig::build_registry`]
    pub registry: RegistryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_limit: DEFAULT_STACK_LIMIT,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            registry: RegistryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // TETHER_STACK_LIMIT: evaluation stack slots
        if let Some(n) = env_usize("TETHER_STACK_LIMIT") {
            config.stack_limit = n;
        }

        // TETHER_MAX_CALL_DEPTH: nested call limit
        if let Some(n) = env_usize("TETHER_MAX_CALL_DEPTH") {
            config.max_call_depth = n;
        }

        // TETHER_MAX_TYPES: TypeId capacity of the registry
        if let Some(n) = env_usize("TETHER_MAX_TYPES") {
            config.registry.max_types = n;
        }

        config
    }

    /// Create a shared registry with this config's limits
    pub fn build_registry(&self) -> std::sync::Arc<tether_sdk::TypeRegistry> {
        tether_sdk::TypeRegistry::shared(self.registry.clone())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.stack_limit, DEFAULT_STACK_LIMIT);
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.registry.max_types, tether_sdk::DEFAULT_MAX_TYPES);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("TETHER_MAX_CALL_DEPTH", "17");
        std::env::set_var("TETHER_STACK_LIMIT", "lots");
        let config = RuntimeConfig::from_env();
        std::env::remove_var("TETHER_MAX_CALL_DEPTH");
        std::env::remove_var("TETHER_STACK_LIMIT");

        assert_eq!(config.max_call_depth, 17);
        assert_eq!(config.stack_limit, DEFAULT_STACK_LIMIT);
    }
}
