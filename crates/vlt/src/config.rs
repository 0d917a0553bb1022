// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration - single source of truth for tunables.
//!
//! Two levels, as everywhere in this codebase:
//!
//! - **Static**: compile-time constants (buffer geometry defaults, paths,
//!   timeouts). **Never hardcode these elsewhere!**
//! - **Dynamic**: [`UserConfig`], filled from defaults and the `DLT_*`
//!   environment variables the daemon ecosystem defines. Malformed values
//!   fall back to the default with a warning; configuration never aborts
//!   startup.

use crate::protocol::constants::USER_BUF_MAX_SIZE;
use crate::protocol::{DltId, LogLevel};
use std::env;
use std::time::Duration;

/// Headroom for storage/standard/extra/extended headers when resending.
pub const RESEND_BUF_MAX_SIZE: usize = USER_BUF_MAX_SIZE + 100;

/// Startup ring buffer defaults (bytes).
pub const BUFFER_MIN_SIZE_DEFAULT: usize = 50_000;
pub const BUFFER_MAX_SIZE_DEFAULT: usize = 500_000;
pub const BUFFER_STEP_SIZE_DEFAULT: usize = 50_000;

/// Receive buffer for daemon-originated control traffic.
pub const RECEIVE_BUFFER_SIZE: usize = 10_000;

/// Default daemon FIFO path.
pub const DAEMON_FIFO_PATH: &str = "/tmp/dlt";

/// Default drain timeout at process exit.
pub const ATEXIT_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// Queue depth of the segmented-send worker.
pub const SEGMENTED_QUEUE_DEPTH: usize = 32;

/// An initial log level for an app/context pair from
/// `DLT_INITIAL_LOG_LEVEL`; empty ids act as wildcards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitialLogLevel {
    pub app: DltId,
    pub ctx: DltId,
    pub level: LogLevel,
}

impl InitialLogLevel {
    /// Whether this entry applies to the given pair (empty id = wildcard).
    pub fn matches(&self, app: DltId, ctx: DltId) -> bool {
        (self.app.is_empty() || self.app == app) && (self.ctx.is_empty() || self.ctx == ctx)
    }
}

/// Local print routing while disconnected (from `DLT_LOCAL_PRINT_MODE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LocalPrintMode {
    #[default]
    Unset,
    Automatic,
    ForceOn,
    ForceOff,
}

/// Runtime configuration of a [`crate::user::UserState`].
#[derive(Clone, Debug)]
pub struct UserConfig {
    /// Startup ring buffer geometry.
    pub buffer_min: usize,
    pub buffer_max: usize,
    pub buffer_step: usize,
    /// Per-message scratch length, capped at [`USER_BUF_MAX_SIZE`].
    pub log_buf_len: usize,
    /// Open the daemon FIFO blocking instead of dropping on backpressure.
    pub force_blocking: bool,
    pub local_print_mode: LocalPrintMode,
    /// Refuse daemon injection messages.
    pub disable_injection: bool,
    /// Initial per-context log levels, first match wins.
    pub initial_levels: Vec<InitialLogLevel>,
    pub atexit_timeout: Duration,
    /// Verbose argument encoding (default) vs non-verbose.
    pub verbose: bool,
    /// Which optional header-extra sections outgoing messages carry.
    pub with_ecu_id: bool,
    pub with_session_id: bool,
    pub with_timestamp: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            buffer_min: BUFFER_MIN_SIZE_DEFAULT,
            buffer_max: BUFFER_MAX_SIZE_DEFAULT,
            buffer_step: BUFFER_STEP_SIZE_DEFAULT,
            log_buf_len: USER_BUF_MAX_SIZE,
            force_blocking: false,
            local_print_mode: LocalPrintMode::Unset,
            disable_injection: false,
            initial_levels: Vec::new(),
            atexit_timeout: ATEXIT_TIMEOUT_DEFAULT,
            verbose: true,
            with_ecu_id: true,
            with_session_id: true,
            with_timestamp: true,
        }
    }
}

impl UserConfig {
    /// Build a configuration from defaults overridden by the `DLT_*`
    /// environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_usize("DLT_USER_BUFFER_MIN") {
            cfg.buffer_min = v;
        }
        if let Some(v) = env_usize("DLT_USER_BUFFER_MAX") {
            cfg.buffer_max = v;
        }
        if let Some(v) = env_usize("DLT_USER_BUFFER_STEP") {
            cfg.buffer_step = v;
        }
        if let Some(v) = env_usize("DLT_LOG_MSG_BUF_LEN") {
            if v > USER_BUF_MAX_SIZE {
                log::warn!(
                    "[CFG] DLT_LOG_MSG_BUF_LEN={} exceeds maximum, capping at {}",
                    v,
                    USER_BUF_MAX_SIZE
                );
            }
            cfg.log_buf_len = v.min(USER_BUF_MAX_SIZE);
        }
        if let Ok(v) = env::var("DLT_FORCE_BLOCKING") {
            cfg.force_blocking = v == "1";
        }
        if let Ok(v) = env::var("DLT_LOCAL_PRINT_MODE") {
            cfg.local_print_mode = match v.as_str() {
                "AUTOMATIC" => LocalPrintMode::Automatic,
                "FORCE_ON" => LocalPrintMode::ForceOn,
                "FORCE_OFF" => LocalPrintMode::ForceOff,
                other => {
                    log::warn!("[CFG] ignoring unknown DLT_LOCAL_PRINT_MODE={other}");
                    LocalPrintMode::Unset
                }
            };
        }
        if let Ok(v) = env::var("DLT_DISABLE_INJECTION_MSG_AT_USER") {
            cfg.disable_injection = v == "1";
        }
        if let Ok(v) = env::var("DLT_INITIAL_LOG_LEVEL") {
            cfg.initial_levels = parse_initial_log_levels(&v);
        }
        cfg
    }

    /// The initial level configured for an app/context pair, if any.
    pub fn initial_level_for(&self, app: DltId, ctx: DltId) -> Option<LogLevel> {
        self.initial_levels
            .iter()
            .find(|e| e.matches(app, ctx))
            .map(|e| e.level)
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[CFG] ignoring malformed {name}={raw}");
            None
        }
    }
}

/// Parse `DLT_INITIAL_LOG_LEVEL`: semicolon-separated `appid:ctxid:level`
/// entries, empty ids meaning "any". Malformed entries are skipped.
fn parse_initial_log_levels(raw: &str) -> Vec<InitialLogLevel> {
    let mut out = Vec::new();
    for entry in raw.split(';').filter(|e| !e.is_empty()) {
        let mut parts = entry.split(':');
        let (app, ctx, level) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(c), Some(l)) => (a, c, l),
            _ => {
                log::warn!("[CFG] ignoring malformed DLT_INITIAL_LOG_LEVEL entry '{entry}'");
                continue;
            }
        };
        let level = match level.parse::<i8>().ok().and_then(|l| LogLevel::from_raw(l).ok()) {
            Some(l) => l,
            None => {
                log::warn!("[CFG] ignoring bad log level in DLT_INITIAL_LOG_LEVEL entry '{entry}'");
                continue;
            }
        };
        out.push(InitialLogLevel {
            app: DltId::new(app),
            ctx: DltId::new(ctx),
            level,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = UserConfig::default();
        assert!(cfg.buffer_min <= cfg.buffer_max);
        assert!(cfg.buffer_step > 0);
        assert_eq!(cfg.log_buf_len, USER_BUF_MAX_SIZE);
        assert!(cfg.verbose);
    }

    #[test]
    fn initial_level_list_parses_and_matches() {
        let levels = parse_initial_log_levels("APP1:CTX1:6;APP2::4;::2;garbage;A:B:99");
        assert_eq!(levels.len(), 3);

        let cfg = UserConfig {
            initial_levels: levels,
            ..UserConfig::default()
        };
        assert_eq!(
            cfg.initial_level_for(DltId::new("APP1"), DltId::new("CTX1")),
            Some(LogLevel::Verbose)
        );
        // App wildcard on context.
        assert_eq!(
            cfg.initial_level_for(DltId::new("APP2"), DltId::new("ANY")),
            Some(LogLevel::Info)
        );
        // Full wildcard catches the rest.
        assert_eq!(
            cfg.initial_level_for(DltId::new("ELSE"), DltId::new("ELSE")),
            Some(LogLevel::Error)
        );
    }

    #[test]
    fn first_match_wins() {
        let levels = parse_initial_log_levels("::3;APP1:CTX1:6");
        let cfg = UserConfig {
            initial_levels: levels,
            ..UserConfig::default()
        };
        assert_eq!(
            cfg.initial_level_for(DltId::new("APP1"), DltId::new("CTX1")),
            Some(LogLevel::Warn)
        );
    }
}
