//! Cache key namespace.
//!
//! Every key the server writes is built here so that bulk invalidation by
//! prefix stays in sync with the keys actually in use.

use std::fmt;
use std::time::Duration;

use super::TtlClass;

/// Prefix shared by every composition-related key.
///
/// Matches `composition:<id>` as well as `compositions:all` and
/// `compositions:category:<c>`.
pub const COMPOSITION_NAMESPACE: &str = "composition";

const HEALTH_NAMESPACE: &str = "health";

/// The fixed set of key shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    AllCompositions,
    Composition(String),
    CompositionsByCategory(String),
    Health,
}

impl CacheKey {
    pub fn composition(id: impl Into<String>) -> Self {
        Self::Composition(id.into())
    }

    /// Category keys are case-insensitive.
    pub fn by_category(category: &str) -> Self {
        Self::CompositionsByCategory(category.trim().to_lowercase())
    }

    pub fn ttl_class(&self) -> TtlClass {
        match self {
            Self::AllCompositions => TtlClass::Medium,
            Self::Composition(_) => TtlClass::Long,
            Self::CompositionsByCategory(_) => TtlClass::Extended,
            Self::Health => TtlClass::Short,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl_class().duration()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllCompositions => write!(f, "compositions:all"),
            Self::Composition(id) => write!(f, "composition:{}", id),
            Self::CompositionsByCategory(category) => {
                write!(f, "compositions:category:{}", category)
            }
            Self::Health => write!(f, "{}:status", HEALTH_NAMESPACE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_text() {
        assert_eq!(CacheKey::AllCompositions.to_string(), "compositions:all");
        assert_eq!(CacheKey::composition("abc").to_string(), "composition:abc");
        assert_eq!(
            CacheKey::by_category("  Chamber ").to_string(),
            "compositions:category:chamber"
        );
        assert_eq!(CacheKey::Health.to_string(), "health:status");
    }

    #[test]
    fn test_key_ttls() {
        assert_eq!(CacheKey::AllCompositions.ttl(), Duration::from_secs(300));
        assert_eq!(CacheKey::composition("1").ttl(), Duration::from_secs(1800));
        assert_eq!(CacheKey::by_category("solo").ttl(), Duration::from_secs(600));
        assert_eq!(CacheKey::Health.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_composition_namespace_covers_all_composition_keys() {
        for key in [
            CacheKey::AllCompositions,
            CacheKey::composition("42"),
            CacheKey::by_category("orchestral"),
        ] {
            assert!(key.to_string().starts_with(COMPOSITION_NAMESPACE));
        }
        assert!(!CacheKey::Health.to_string().starts_with(COMPOSITION_NAMESPACE));
    }
}
