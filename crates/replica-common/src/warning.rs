//! Snapshot warnings routed through `tracing`.
//!
//! Provides deduplication to avoid spamming the same warning multiple times.
//! Used by the serializer, the materializer and the CSS engine to report
//! nodes and resources they had to skip.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Global set of warnings we've already emitted (to deduplicate)
static WARNED: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Warn about a skipped node or resource (emits once per unique message)
///
/// The event is logged at `WARN` level with a `component` field, so a
/// subscriber can filter e.g. only `component="css"`.
///
/// # Example
/// ```ignore
/// warn_once("css", "unterminated block in captured stylesheet");
/// ```
pub fn warn_once(component: &str, message: &str) {
    let key = format!("[{component}] {message}");
    let should_emit = WARNED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get_or_insert_with(HashSet::new)
        .insert(key);

    if should_emit {
        tracing::warn!(component, "{message}");
    }
}

/// Clear all recorded warnings (call when a capture session navigates)
pub fn clear_warnings() {
    let mut guard = WARNED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(set) = guard.as_mut() {
        set.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_records_message() {
        warn_once("test", "recorded once");
        let guard = WARNED.lock().unwrap_or_else(PoisonError::into_inner);
        let set = guard.as_ref().expect("set initialized");
        assert!(set.contains("[test] recorded once"));
    }
}
