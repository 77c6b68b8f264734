//! Per-rule call statistics handed back to test code at registration.

use crate::client::Form;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records how often a rule was hit and what the last caller sent.
///
/// `used()` is derived from the counter, so it is true exactly when
/// `use_count() > 0`.
#[derive(Debug, Default)]
pub struct CallSpy {
    use_count: AtomicU64,
    captured: Mutex<Captured>,
}

#[derive(Debug, Default, Clone)]
struct Captured {
    body: Option<String>,
    form: Option<Form>,
}

impl CallSpy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn used(&self) -> bool {
        self.use_count() > 0
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    /// Raw body of the most recent POST or streamed request.
    pub fn captured_body(&self) -> Option<String> {
        self.captured().body.clone()
    }

    /// Form fields of the most recent high-level POST.
    pub fn captured_form(&self) -> Option<Form> {
        self.captured().form.clone()
    }

    pub(crate) fn record_use(&self) {
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Store a high-level POST payload. Both fields are overwritten.
    pub(crate) fn capture_post(&self, body: Option<String>, form: Option<Form>) {
        let mut captured = self.captured();
        captured.body = body;
        captured.form = form;
    }

    /// Store the concatenated body of a streamed request.
    pub(crate) fn capture_body(&self, body: String) {
        self.captured().body = Some(body);
    }

    fn captured(&self) -> MutexGuard<'_, Captured> {
        self.captured.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_spy_is_unused() {
        let spy = CallSpy::new();
        assert!(!spy.used());
        assert_eq!(spy.use_count(), 0);
        assert_eq!(spy.captured_body(), None);
        assert_eq!(spy.captured_form(), None);
    }

    #[test]
    fn test_used_tracks_count() {
        let spy = CallSpy::new();
        for k in 1..=3 {
            spy.record_use();
            assert!(spy.used());
            assert_eq!(spy.use_count(), k);
        }
    }

    #[test]
    fn test_capture_keeps_latest() {
        let spy = CallSpy::new();
        spy.capture_post(Some("first".to_string()), None);
        let form: Form = [("a".to_string(), "b".to_string())].into();
        spy.capture_post(None, Some(form.clone()));
        assert_eq!(spy.captured_body(), None);
        assert_eq!(spy.captured_form(), Some(form));

        spy.capture_body("streamed".to_string());
        assert_eq!(spy.captured_body().as_deref(), Some("streamed"));
    }
}
