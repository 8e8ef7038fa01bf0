//! The browser boundary.
//!
//! The instrumented browser runs on its own thread; the core sees it only
//! through this strictly serialized call surface. Each call that runs page
//! code returns the ordered slice of events recorded during it, which is the
//! cooperative suspension point of the scheduling model.

use std::collections::BTreeMap;

use crate::events::BrowserEvent;
use crate::forms::{FormFieldDescriptor, InjectionMap};

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser crashed: {0}")]
    Crashed(String),
    #[error("browser timed out")]
    Timeout,
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// A timer the page registered and the driver deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    pub id: u32,
    pub timeout_ms: u32,
    pub single_shot: bool,
}

pub trait Browser {
    /// Navigate to `url` with the given cookies and wait for load
    /// completion. Returns the events recorded during the load; they are
    /// page setup, not part of the iteration's trace.
    fn load_page(
        &mut self,
        url: &str,
        cookies: &BTreeMap<String, String>,
    ) -> Result<Vec<BrowserEvent>, BrowserError>;

    /// Write the injections into the form and run the page's top-level
    /// event to completion. AJAX callbacks fire synchronously inside the
    /// event; timers are deferred and surface via `registered_timers`.
    fn run_event(&mut self, injections: &InjectionMap) -> Result<Vec<BrowserEvent>, BrowserError>;

    /// Timers currently registered and not yet fired.
    fn registered_timers(&mut self) -> Vec<TimerInfo>;

    /// Fire one deferred timer and return the events its callback recorded.
    fn fire_timer(&mut self, id: u32) -> Result<Vec<BrowserEvent>, BrowserError>;

    fn cancel_timer(&mut self, id: u32);

    /// The form fields discovered on the loaded page, in DOM order.
    fn form_fields(&mut self) -> Vec<FormFieldDescriptor>;

    /// Clear all cookies, restoring the pre-session state.
    fn reset_cookies(&mut self);
}
