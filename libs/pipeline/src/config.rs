use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;
use crate::transform::{DEFAULT_PREFIX, PrefixTransformer};

// ═══════════════════════════════════════════════════════════════
//  Transform Config
// ═══════════════════════════════════════════════════════════════

/// Секция `[transform]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransformConfig {
    /// Префикс, добавляемый к value source записи.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.into()
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl TransformConfig {
    pub fn transformer(&self) -> PrefixTransformer {
        PrefixTransformer::new(self.prefix.as_bytes())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Follow Config
// ═══════════════════════════════════════════════════════════════

/// Секция `[follow]`: поведение цикла `forward --follow`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FollowConfig {
    /// Пауза после прогона, не дождавшегося записи.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// Остановиться после N неудачных прогонов подряд (0 = никогда).
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Backoff между неудачными прогонами.
    #[serde(default)]
    pub backoff: RetryPolicy,
    /// Ограничение числа прогонов (None = до отмены).
    #[serde(default)]
    pub max_runs: Option<u64>,
}

fn default_idle_ms() -> u64 {
    250
}
fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            idle_ms: default_idle_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            backoff: RetryPolicy::default(),
            max_runs: None,
        }
    }
}

impl FollowConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sections {
        #[serde(default)]
        transform: TransformConfig,
        #[serde(default)]
        follow: FollowConfig,
    }

    #[test]
    fn test_empty_sections_take_defaults() {
        let cfg: Sections = toml::from_str("").unwrap();
        assert_eq!(cfg.transform.prefix, "forwarded: ");
        assert_eq!(cfg.follow, FollowConfig::default());
    }

    #[test]
    fn test_partial_sections_override_fields() {
        let cfg: Sections = toml::from_str(
            r#"
            [transform]
            prefix = "relayed: "

            [follow]
            max_consecutive_failures = 0
            [follow.backoff]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transform.prefix, "relayed: ");
        assert_eq!(cfg.follow.max_consecutive_failures, 0);
        assert_eq!(cfg.follow.idle(), Duration::from_millis(250));
        assert_eq!(cfg.follow.backoff.max_attempts, 2);
        assert_eq!(cfg.follow.backoff.initial_backoff_ms, 200);
    }
}
