//! Desktop notification boundary.
//!
//! The store only *requests* permission and *requests* a display; actually
//! rendering the toast is the operating system's job. The default
//! implementation logs the request, which is also what headless test runs
//! want.

use std::time::Duration;

/// Display permission as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// Not decided yet; the platform will prompt on request.
    Default,
}

/// A display request.
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// When false the notification is dismissed automatically.
    pub persistent: bool,
}

impl DesktopNotification {
    /// How long a non-persistent notification stays up.
    pub const AUTO_DISMISS: Duration = Duration::from_secs(5);

    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            persistent: false,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Per-session notification toggles.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Master switch; if false, no display requests at all.
    pub enabled: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Issues permission and display requests to the platform.
pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> Permission;
    /// Ask the platform for permission. Returns the resulting state.
    fn request_permission(&self) -> Permission;
    /// Request a toast. Implementations honor
    /// [`DesktopNotification::AUTO_DISMISS`] for non-persistent requests.
    fn show(&self, notification: &DesktopNotification);
}

/// Notifier that only logs. Used headless and as the safe default.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl DesktopNotifier for LogNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, notification: &DesktopNotification) {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            "notification display requested"
        );
    }
}
