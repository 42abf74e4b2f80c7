//! Per-generation engine settings.

/// Settings carried by an ADT generation and inherited by its extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Structurally intern structured instances in the generation's pool.
    ///
    /// Singletons are always canonical regardless of this flag.
    pub interning: bool,
    /// Cache parameterless operation results on the receiving instance.
    pub memoize_getters: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interning: true,
            memoize_getters: true,
        }
    }
}

impl Config {
    pub fn with_interning(mut self, interning: bool) -> Self {
        self.interning = interning;
        self
    }

    pub fn with_memoize_getters(mut self, memoize: bool) -> Self {
        self.memoize_getters = memoize;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enables_everything() {
        let config = Config::default();
        assert!(config.interning);
        assert!(config.memoize_getters);
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::default()
            .with_interning(false)
            .with_memoize_getters(false);
        assert_eq!(
            config,
            Config {
                interning: false,
                memoize_getters: false
            }
        );
    }
}
