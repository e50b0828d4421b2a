//! Centralized configuration for the page layer.
//!
//! Goals:
//! - One place for tunables instead of scattered env lookups.
//! - `FlashConfig::from_env()` reads the FLASHPAGE_* variables.
//! - `ConfigBuilder` starts from env (or from defaults) and overrides fields.
//!
//! Env:
//! - FLASHPAGE_PAGE_SIZE        (default 4096, power of two >= 512)
//! - FLASHPAGE_PAGE_LIMIT       (default unbounded; models host memory pressure)
//! - FLASHPAGE_POOL_PAGES       (default 64; recycled frames kept by the heap host)
//! - FLASHPAGE_WAIT_WARN_MS     (default 1000)
//! - FLASHPAGE_STRICT_LIFECYCLE (1|true|on|yes => escalate, 0|false|off|no => log only;
//!   unset => escalate in debug builds)

use std::fmt;
use std::time::Duration;

use crate::consts::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_PAGES, MIN_PAGE_SIZE, WAITED_TOO_LONG_MSECS};
use crate::error::{PageError, Result};
use crate::page::ViolationPolicy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashConfig {
    /// Size of one memory page in bytes.
    pub page_size: usize,

    /// Maximum number of outstanding pages the heap host hands out (None = unbounded).
    pub page_limit: Option<usize>,

    /// Freed frames kept for reuse (0 disables recycling).
    pub pool_pages: usize,

    /// Blocking waits longer than this are logged.
    pub wait_warn_ms: u64,

    pub violation_policy: ViolationPolicy,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_limit: None,
            pool_pages: DEFAULT_POOL_PAGES,
            wait_warn_ms: WAITED_TOO_LONG_MSECS,
            violation_policy: ViolationPolicy::build_default(),
        }
    }
}

fn env_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl FlashConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FLASHPAGE_PAGE_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.page_size = n;
            }
        }

        if let Ok(v) = std::env::var("FLASHPAGE_PAGE_LIMIT") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.page_limit = Some(n);
            }
        }

        if let Ok(v) = std::env::var("FLASHPAGE_POOL_PAGES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.pool_pages = n;
            }
        }

        if let Ok(v) = std::env::var("FLASHPAGE_WAIT_WARN_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.wait_warn_ms = n;
            }
        }

        if let Ok(v) = std::env::var("FLASHPAGE_STRICT_LIFECYCLE") {
            match env_flag(&v) {
                Some(true) => cfg.violation_policy = ViolationPolicy::Escalate,
                Some(false) => cfg.violation_policy = ViolationPolicy::LogAndContinue,
                None => {}
            }
        }

        cfg
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn with_page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    pub fn with_page_limit(mut self, limit: Option<usize>) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_pool_pages(mut self, pages: usize) -> Self {
        self.pool_pages = pages;
        self
    }

    pub fn with_wait_warn_ms(mut self, ms: u64) -> Self {
        self.wait_warn_ms = ms;
        self
    }

    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    pub fn wait_warn(&self) -> Duration {
        Duration::from_millis(self.wait_warn_ms)
    }

    /// Page size must be a power of two and at least 512 bytes.
    pub fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE || !self.page_size.is_power_of_two() {
            return Err(PageError::invalid(format!(
                "page_size {} must be a power of two >= {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FlashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlashConfig {{ page_size: {}, page_limit: {}, pool_pages: {}, wait_warn_ms: {}, violation_policy: {} }}",
            self.page_size,
            self.page_limit
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unbounded".to_string()),
            self.pool_pages,
            self.wait_warn_ms,
            self.violation_policy,
        )
    }
}

/// Builder that produces a [`FlashConfig`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    cfg: FlashConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            cfg: FlashConfig::from_env(),
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: FlashConfig::default(),
        }
    }

    pub fn page_size(mut self, bytes: usize) -> Self {
        self.cfg.page_size = bytes;
        self
    }

    pub fn page_limit(mut self, limit: Option<usize>) -> Self {
        self.cfg.page_limit = limit;
        self
    }

    pub fn pool_pages(mut self, pages: usize) -> Self {
        self.cfg.pool_pages = pages;
        self
    }

    pub fn wait_warn_ms(mut self, ms: u64) -> Self {
        self.cfg.wait_warn_ms = ms;
        self
    }

    pub fn violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.cfg.violation_policy = policy;
        self
    }

    /// Finish and validate.
    pub fn build(self) -> Result<FlashConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
