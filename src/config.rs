//! Pipeline configuration.
//!
//! Product decisions that used to live as literals inside validation code
//! (retry counts, physics clamp ranges, the two-level starter cap) are
//! collected here and injected at construction so they can be tuned without
//! touching the validators.

use serde::{Deserialize, Serialize};

/// Attempt counts and temperature schedule for model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt 1 runs near-deterministic.
    pub first_attempt_temperature: f32,
    /// Later attempts explore a little more.
    pub retry_temperature: f32,
    /// Code emission wants determinism above all.
    pub code_temperature: f32,
    pub max_tokens: u32,
    pub code_max_tokens: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            first_attempt_temperature: 0.3,
            retry_temperature: 0.6,
            code_temperature: 0.05,
            max_tokens: 4000,
            code_max_tokens: 8000,
        }
    }
}

/// Safe ranges and defaults for gameplay physics numbers.
///
/// Jump force is negative-up per the engine convention: a stronger jump is a
/// more negative number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MechanicsLimits {
    pub speed_min: f32,
    pub speed_max: f32,
    pub speed_default: f32,
    /// Strongest allowed jump (most negative).
    pub jump_force_min: f32,
    /// Weakest allowed jump (least negative).
    pub jump_force_max: f32,
    pub jump_force_default: f32,
    pub gravity_default: f32,
    pub gravity_max: f32,
    /// Anything above this is treated as nonsense and clamped to `gravity_max`.
    pub gravity_hard_max: f32,
    pub acceleration_default: f32,
    pub friction_default: f32,
    pub max_fall_speed_default: f32,
}

impl Default for MechanicsLimits {
    fn default() -> Self {
        Self {
            speed_min: 100.0,
            speed_max: 600.0,
            speed_default: 300.0,
            jump_force_min: -600.0,
            jump_force_max: -200.0,
            jump_force_default: -400.0,
            gravity_default: 0.8,
            gravity_max: 2.0,
            gravity_hard_max: 5.0,
            acceleration_default: 1500.0,
            friction_default: 1200.0,
            max_fall_speed_default: 600.0,
        }
    }
}

/// Layout constraints applied to generated levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelRules {
    /// Discrete-level games ship with exactly this many levels (starter scope).
    pub level_count: usize,
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub lane_count: u32,
}

impl Default for LevelRules {
    fn default() -> Self {
        Self {
            level_count: 2,
            canvas_width: 1200.0,
            canvas_height: 800.0,
            lane_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub limits: MechanicsLimits,
    pub levels: LevelRules,
    /// When false the pipeline skips AI code generation entirely and goes
    /// straight to templates.
    pub use_ai_codegen: bool,
    /// TTL for cached generation status entries, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            limits: MechanicsLimits::default(),
            levels: LevelRules::default(),
            use_ai_codegen: true,
            cache_ttl_secs: 3600,
        }
    }
}

impl PipelineConfig {
    /// Builds a config from defaults plus environment overrides.
    ///
    /// Unparseable values fall back to the default silently; a host that
    /// wants strict config should construct the struct directly.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<u32>("GAMESMITH_MAX_ATTEMPTS") {
            config.retry.max_attempts = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("GAMESMITH_MAX_TOKENS") {
            config.retry.max_tokens = n;
        }
        if let Some(n) = env_parse::<u32>("GAMESMITH_CODE_MAX_TOKENS") {
            config.retry.code_max_tokens = n;
        }
        if let Some(n) = env_parse::<usize>("GAMESMITH_LEVEL_COUNT") {
            config.levels.level_count = n.max(1);
        }
        if let Some(v) = std::env::var("GAMESMITH_USE_AI_CODEGEN").ok() {
            config.use_ai_codegen = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(n) = env_parse::<u64>("GAMESMITH_CACHE_TTL_SECS") {
            config.cache_ttl_secs = n;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
