//! Process-wide state shared by every request handler.
//!
//! ## Settings
//!
//! [`settings`] returns the process-wide [`SharedSettings`]. It is loaded from
//! the environment the first time it is read, and may be replaced at runtime
//! (for example from an admin endpoint) with [`set_settings`]. Request
//! handlers read it on every request; writers are rare.
//!
//! ```
//! use tracecontext::global;
//! use tracecontext::Settings;
//!
//! global::set_settings(Settings::default().with_demo_mode(true));
//! assert!(global::settings().snapshot().demo_mode);
//! # global::set_settings(Settings::default());
//! ```
//!
//! ## Statistics
//!
//! [`stats`] returns the counters that extractors, propagators and scope
//! guards report into unless they were built with their own.
mod internal_logging;

use crate::settings::{Settings, SharedSettings};
use crate::stats::PropagationStats;
use std::sync::{Arc, OnceLock};

static GLOBAL_SETTINGS: OnceLock<SharedSettings> = OnceLock::new();

static GLOBAL_STATS: OnceLock<Arc<PropagationStats>> = OnceLock::new();

/// The process-wide settings, loaded from the environment on first use.
pub fn settings() -> &'static SharedSettings {
    GLOBAL_SETTINGS.get_or_init(|| SharedSettings::new(Settings::from_env()))
}

/// Replaces the process-wide settings.
pub fn set_settings(new: Settings) {
    settings().replace(new);
}

/// The process-wide propagation counters.
pub fn stats() -> &'static Arc<PropagationStats> {
    GLOBAL_STATS.get_or_init(|| Arc::new(PropagationStats::new()))
}

/// Returns `true` if scope imbalance should panic rather than warn.
#[inline]
pub(crate) fn strict_scope() -> bool {
    cfg!(feature = "strict-scope") || settings().snapshot().strict_scope
}
