//! Keeps the process alive while a download runs in the background.
//!
//! Mobile targets need a user-visible notification and a foreground guard
//! or the OS reclaims the process; desktop targets only log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// The narrow set of OS services the download path needs.
pub trait PlatformServices: Send + Sync {
    /// Asks for media/storage access. May block until the user answers, so
    /// callers run it on a blocking thread.
    fn request_permissions(&self) -> PermissionStatus;
    fn show_persistent_notification(&self, title: &str, text: &str);
    fn clear_notification(&self);
    fn start_background_guard(&self);
    fn stop_background_guard(&self);
}

/// Desktop processes are not reclaimed while a child process runs.
#[derive(Debug, Default)]
pub struct DesktopPlatform;

impl PlatformServices for DesktopPlatform {
    fn request_permissions(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn show_persistent_notification(&self, title: &str, text: &str) {
        log::debug!("notification: {title}: {text}");
    }

    fn clear_notification(&self) {
        log::debug!("notification cleared");
    }

    fn start_background_guard(&self) {
        log::debug!("background guard started");
    }

    fn stop_background_guard(&self) {
        log::debug!("background guard stopped");
    }
}

/// Pairs `begin`/`end` around one download attempt.
pub struct LifecycleShim {
    platform: Arc<dyn PlatformServices>,
    active: AtomicBool,
}

impl LifecycleShim {
    pub fn new(platform: Arc<dyn PlatformServices>) -> Self {
        Self {
            platform,
            active: AtomicBool::new(false),
        }
    }

    /// Requests permissions and, when granted, posts the notification and
    /// starts the guard. A denial is logged and the download goes ahead
    /// unguarded.
    pub fn begin(&self, title: &str) -> PermissionStatus {
        let status = self.platform.request_permissions();
        match status {
            PermissionStatus::Granted => {
                self.platform.show_persistent_notification("Downloading", title);
                self.platform.start_background_guard();
                self.active.store(true, Ordering::SeqCst);
            }
            PermissionStatus::Denied => {
                log::warn!("permissions denied, downloading without a foreground guard");
            }
        }
        status
    }

    /// Tears down whatever `begin` set up. Safe to call more than once.
    pub fn end(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.platform.clear_notification();
            self.platform.stop_background_guard();
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPlatform;
    use super::*;

    #[test]
    fn granted_sets_up_and_tears_down_once() {
        let platform = Arc::new(RecordingPlatform::new(PermissionStatus::Granted));
        let shim = LifecycleShim::new(platform.clone());

        assert_eq!(shim.begin("https://example.com/v"), PermissionStatus::Granted);
        assert!(shim.is_active());
        shim.end();
        shim.end();

        assert_eq!(
            platform.calls(),
            vec![
                "request_permissions",
                "show_persistent_notification",
                "start_background_guard",
                "clear_notification",
                "stop_background_guard",
            ]
        );
    }

    #[test]
    fn denied_skips_the_guard() {
        let platform = Arc::new(RecordingPlatform::new(PermissionStatus::Denied));
        let shim = LifecycleShim::new(platform.clone());

        assert_eq!(shim.begin("x"), PermissionStatus::Denied);
        assert!(!shim.is_active());
        shim.end();

        assert_eq!(platform.calls(), vec!["request_permissions"]);
    }
}
