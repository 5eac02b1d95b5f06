//! Text selection tracking and the "Explain" popup.
//!
//! A [`SelectionSurface`] is the one place selection changes are announced
//! (the terminal's mouse stream in the TUI). A [`SelectionTracker`] mounts a
//! single listener on it and turns each change into popup state. The
//! listener lives exactly as long as the tracker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::panel::DefinitionRequest;
use crate::state::SelectionCoords;

pub const MIN_SELECTION_CHARS: usize = 2;
pub const MAX_SELECTION_CHARS: usize = 50;

/// Context sent with a definition request that came from a free selection
pub const SELECTION_CONTEXT: &str = "User selected text context.";

/// Screen region a selection lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Transcript,
    DefinitionPanel,
    Input,
    Outside,
}

/// Bounding box of a selection, in screen cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub width: i32,
}

/// Snapshot of the user's current selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSelection {
    pub text: String,
    pub bounds: Bounds,
    /// Region containing the selection. One spanning regions reports the
    /// region under its moving end.
    pub region: Region,
    pub collapsed: bool,
}

type Listener = Box<dyn FnMut(Option<&ActiveSelection>) + Send>;

#[derive(Default)]
struct SurfaceInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where selection changes are published. Cloning shares the same surface.
#[derive(Clone, Default)]
pub struct SelectionSurface {
    inner: Arc<Mutex<SurfaceInner>>,
}

impl SelectionSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays installed until the returned
    /// [`Subscription`] is dropped. Listeners must not call back into the surface.
    pub fn subscribe(
        &self,
        listener: impl FnMut(Option<&ActiveSelection>) + Send + 'static,
    ) -> Subscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Box::new(listener)));
        tracing::debug!(id, "selection listener installed");

        Subscription {
            id,
            surface: Arc::downgrade(&self.inner),
        }
    }

    pub fn notify(&self, selection: Option<&ActiveSelection>) {
        let mut inner = lock(&self.inner);
        for (_, listener) in inner.listeners.iter_mut() {
            listener(selection);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

/// Keeps a listener installed; dropping it removes the listener.
pub struct Subscription {
    id: u64,
    surface: Weak<Mutex<SurfaceInner>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.upgrade() {
            lock(&surface).listeners.retain(|(id, _)| *id != self.id);
            tracing::debug!(id = self.id, "selection listener removed");
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Update {
    Clear,
    Publish(SelectionCoords),
}

fn evaluate(container: Region, selection: Option<&ActiveSelection>) -> Update {
    let Some(selection) = selection.filter(|s| !s.collapsed) else {
        return Update::Clear;
    };

    let text = selection.text.trim();
    let len = text.chars().count();
    if !(MIN_SELECTION_CHARS..=MAX_SELECTION_CHARS).contains(&len) {
        return Update::Clear;
    }

    if selection.region != container {
        return Update::Clear;
    }

    let bounds = selection.bounds;
    Update::Publish(SelectionCoords {
        x: bounds.left + bounds.width / 2,
        y: bounds.top - 1,
        text: text.to_string(),
    })
}

/// Popup state derived from selection changes inside one container.
pub struct SelectionTracker {
    store: Arc<Mutex<Option<SelectionCoords>>>,
    _subscription: Subscription,
}

impl SelectionTracker {
    pub fn mount(surface: &SelectionSurface, container: Region) -> Self {
        let store = Arc::new(Mutex::new(None));
        let listener_store = Arc::clone(&store);

        let subscription = surface.subscribe(move |selection| {
            let mut popup = lock(&listener_store);
            match evaluate(container, selection) {
                Update::Clear => *popup = None,
                Update::Publish(coords) => *popup = Some(coords),
            }
        });

        Self {
            store,
            _subscription: subscription,
        }
    }

    pub fn current(&self) -> Option<SelectionCoords> {
        lock(&self.store).clone()
    }

    pub fn clear(&self) {
        *lock(&self.store) = None;
    }

    /// Confirm the popup: hide it and ask for a definition of the selected text.
    pub fn confirm(&self) -> Option<DefinitionRequest> {
        let coords = lock(&self.store).take()?;
        Some(DefinitionRequest {
            term: coords.text,
            context: SELECTION_CONTEXT.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(text: &str, region: Region) -> ActiveSelection {
        ActiveSelection {
            text: text.to_string(),
            bounds: Bounds { left: 10, top: 5, width: 8 },
            region,
            collapsed: false,
        }
    }

    #[test]
    fn test_publishes_centered_above() {
        let surface = SelectionSurface::new();
        let tracker = SelectionTracker::mount(&surface, Region::Transcript);

        surface.notify(Some(&selection("  qubit  ", Region::Transcript)));
        assert_eq!(
            tracker.current(),
            Some(SelectionCoords { x: 14, y: 4, text: "qubit".to_string() })
        );
    }

    #[test]
    fn test_length_bounds_are_inclusive() {
        let surface = SelectionSurface::new();
        let tracker = SelectionTracker::mount(&surface, Region::Transcript);

        surface.notify(Some(&selection("ab", Region::Transcript)));
        assert!(tracker.current().is_some());

        surface.notify(Some(&selection(&"x".repeat(50), Region::Transcript)));
        assert!(tracker.current().is_some());
    }

    #[test]
    fn test_out_of_range_selection_clears_popup() {
        let surface = SelectionSurface::new();
        let tracker = SelectionTracker::mount(&surface, Region::Transcript);

        surface.notify(Some(&selection("qubit", Region::Transcript)));
        assert!(tracker.current().is_some());

        surface.notify(Some(&selection("q", Region::Transcript)));
        assert_eq!(tracker.current(), None);

        surface.notify(Some(&selection("qubit", Region::Transcript)));
        surface.notify(Some(&selection(&"x".repeat(51), Region::Transcript)));
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_outside_container_clears() {
        let surface = SelectionSurface::new();
        let tracker = SelectionTracker::mount(&surface, Region::Transcript);

        surface.notify(Some(&selection("qubit", Region::Transcript)));
        surface.notify(Some(&selection("qubit", Region::DefinitionPanel)));
        assert_eq!(tracker.current(), None);

        surface.notify(Some(&selection("qubit", Region::Transcript)));
        surface.notify(Some(&selection("qubit", Region::Input)));
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_collapsed_or_missing_selection_clears() {
        let surface = SelectionSurface::new();
        let tracker = SelectionTracker::mount(&surface, Region::Transcript);

        surface.notify(Some(&selection("qubit", Region::Transcript)));
        let mut collapsed = selection("qubit", Region::Transcript);
        collapsed.collapsed = true;
        surface.notify(Some(&collapsed));
        assert_eq!(tracker.current(), None);

        surface.notify(Some(&selection("qubit", Region::Transcript)));
        surface.notify(None);
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_confirm_takes_popup() {
        let surface = SelectionSurface::new();
        let tracker = SelectionTracker::mount(&surface, Region::Transcript);
        surface.notify(Some(&selection("Bloch sphere", Region::Transcript)));

        let request = tracker.confirm().unwrap();
        assert_eq!(request.term, "Bloch sphere");
        assert_eq!(request.context, SELECTION_CONTEXT);
        assert_eq!(tracker.current(), None);
        assert!(tracker.confirm().is_none());
    }

    #[test]
    fn test_listener_removed_on_drop() {
        let surface = SelectionSurface::new();
        assert_eq!(surface.listener_count(), 0);

        let tracker = SelectionTracker::mount(&surface, Region::Transcript);
        assert_eq!(surface.listener_count(), 1);

        drop(tracker);
        assert_eq!(surface.listener_count(), 0);
        surface.notify(Some(&selection("qubit", Region::Transcript)));
    }

    #[test]
    fn test_subscription_outliving_surface() {
        let surface = SelectionSurface::new();
        let subscription = surface.subscribe(|_| {});
        drop(surface);
        drop(subscription);
    }
}
