//! Process-wide configuration.
//!
//! [`Settings`] is a plain value. [`SharedSettings`] puts it behind an
//! `RwLock` so one admin action can change it while many request handlers
//! read it. Handlers receive a `SharedSettings` (or read
//! [`global::settings`](crate::global::settings)) instead of reaching for
//! module-level mutable state.
use crate::tc_warn;
use std::env;
use std::sync::{Arc, RwLock};

/// Environment variable enabling strict scope checking.
pub const STRICT_SCOPE_ENV: &str = "TRACECONTEXT_STRICT_SCOPE";
/// Environment variable controlling `tracestate` forwarding.
pub const FORWARD_TRACESTATE_ENV: &str = "TRACECONTEXT_FORWARD_TRACESTATE";
/// Environment variable enabling demo mode.
pub const DEMO_MODE_ENV: &str = "TRACECONTEXT_DEMO_MODE";

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Settings {
    /// Panic instead of warning when a context scope is detached out of
    /// order or left attached at the end of a request.
    pub strict_scope: bool,

    /// Forward an inbound `tracestate` on outbound calls.
    pub forward_tracestate: bool,

    /// Log every extraction and injection at info level, with header values.
    pub demo_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            strict_scope: cfg!(feature = "strict-scope"),
            forward_tracestate: true,
            demo_mode: false,
        }
    }
}

impl Settings {
    /// Default settings overridden by any `TRACECONTEXT_*` environment
    /// variables that hold a valid boolean. Invalid values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(strict_scope) = parse_bool(STRICT_SCOPE_ENV, lookup(STRICT_SCOPE_ENV)) {
            settings.strict_scope = strict_scope;
        }

        if let Some(forward_tracestate) =
            parse_bool(FORWARD_TRACESTATE_ENV, lookup(FORWARD_TRACESTATE_ENV))
        {
            settings.forward_tracestate = forward_tracestate;
        }

        if let Some(demo_mode) = parse_bool(DEMO_MODE_ENV, lookup(DEMO_MODE_ENV)) {
            settings.demo_mode = demo_mode;
        }

        settings
    }

    /// Sets strict scope checking.
    pub fn with_strict_scope(mut self, strict_scope: bool) -> Self {
        self.strict_scope = strict_scope;
        self
    }

    /// Sets `tracestate` forwarding.
    pub fn with_forward_tracestate(mut self, forward_tracestate: bool) -> Self {
        self.forward_tracestate = forward_tracestate;
        self
    }

    /// Sets demo mode.
    pub fn with_demo_mode(mut self, demo_mode: bool) -> Self {
        self.demo_mode = demo_mode;
        self
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Option<bool> {
    let value = value?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => {
            tc_warn!(
                name: "Settings.InvalidEnvValue",
                key = key,
                value = value.as_str(),
                message = "expected a boolean, ignoring"
            );
            None
        }
    }
}

/// [`Settings`] shared between one writer and many readers.
///
/// Cloning is cheap and every clone sees the same settings.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings(Arc<RwLock<Settings>>);

impl SharedSettings {
    /// Shares the given settings.
    pub fn new(settings: Settings) -> Self {
        SharedSettings(Arc::new(RwLock::new(settings)))
    }

    /// A copy of the current settings.
    ///
    /// A poisoned lock still yields the last written value.
    pub fn snapshot(&self) -> Settings {
        match self.0.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the settings wholesale.
    pub fn replace(&self, settings: Settings) {
        self.update(|current| *current = settings);
    }

    /// Applies `f` to the settings under the write lock.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        match self.0.write() {
            Ok(mut settings) => f(&mut *settings),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}
