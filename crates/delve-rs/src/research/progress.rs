//! Progress reporting for research runs.
//!
//! A run owns one [`ResearchProgress`] record behind a mutex. Branches update
//! it in place and every update is handed, as a snapshot, to a
//! [`ProgressObserver`]. Sibling branches overwrite each other's `current*`
//! fields (last write wins); `completed_queries` only ever grows.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Snapshot of a research run's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProgress {
    pub current_depth: usize,
    pub total_depth: usize,
    pub current_breadth: usize,
    pub total_breadth: usize,
    pub current_query: Option<String>,
    pub total_queries: usize,
    pub completed_queries: usize,
}

/// Receives progress snapshots.
///
/// Called synchronously from research branches, possibly many times and
/// from several branches at once. Implementations must return quickly.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &ResearchProgress);
}

/// Ignores all progress.
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _progress: &ResearchProgress) {}
}

/// Logs progress through `tracing` at INFO.
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn on_progress(&self, p: &ResearchProgress) {
        info!(
            "[progress] depth {}/{} breadth {}/{} queries {}/{}{}",
            p.current_depth,
            p.total_depth,
            p.current_breadth,
            p.total_breadth,
            p.completed_queries,
            p.total_queries,
            p.current_query
                .as_deref()
                .map(|q| format!(" current: {q}"))
                .unwrap_or_default(),
        );
    }
}

/// An observer backed by a closure.
///
/// # Example
///
/// ```
/// use delve_rs::research::progress::{FnObserver, ProgressObserver, ResearchProgress};
///
/// let observer = FnObserver::new(|p: &ResearchProgress| {
///     eprintln!("{}/{}", p.completed_queries, p.total_queries);
/// });
/// observer.on_progress(&ResearchProgress::default());
/// ```
pub struct FnObserver<F>(F)
where
    F: Fn(&ResearchProgress) + Send + Sync;

impl<F> FnObserver<F>
where
    F: Fn(&ResearchProgress) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ProgressObserver for FnObserver<F>
where
    F: Fn(&ResearchProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &ResearchProgress) {
        (self.0)(progress)
    }
}

/// Keeps the most recent snapshot for later polling.
#[derive(Clone, Default)]
pub struct LatestProgress {
    latest: Arc<Mutex<Option<ResearchProgress>>>,
}

impl LatestProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<ResearchProgress> {
        self.latest.lock().ok().and_then(|g| g.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.latest.lock() {
            *g = None;
        }
    }
}

impl ProgressObserver for LatestProgress {
    fn on_progress(&self, progress: &ResearchProgress) {
        if let Ok(mut g) = self.latest.lock() {
            *g = Some(progress.clone());
        }
    }
}

/// The shared progress record of one run.
pub(crate) struct ProgressTracker {
    state: Mutex<ResearchProgress>,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressTracker {
    pub(crate) fn new(depth: usize, breadth: usize, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            state: Mutex::new(ResearchProgress {
                current_depth: depth,
                total_depth: depth,
                current_breadth: breadth,
                total_breadth: breadth,
                ..Default::default()
            }),
            observer,
        }
    }

    /// Apply `f` and notify the observer with the resulting snapshot. The
    /// lock is released before the observer runs.
    pub(crate) fn update(&self, f: impl FnOnce(&mut ResearchProgress)) {
        let snapshot = {
            let mut state = match self.state.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut state);
            state.clone()
        };
        self.observer.on_progress(&snapshot);
    }

    pub(crate) fn snapshot(&self) -> ResearchProgress {
        match self.state.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let p = ResearchProgress {
            current_query: Some("q".into()),
            completed_queries: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["currentQuery"], "q");
        assert_eq!(json["completedQueries"], 2);
        assert!(json.get("totalDepth").is_some());
    }

    #[test]
    fn tracker_notifies_with_snapshot() {
        let latest = LatestProgress::new();
        let tracker = ProgressTracker::new(2, 4, Arc::new(latest.clone()));
        assert!(latest.get().is_none());

        tracker.update(|p| {
            p.total_queries = 3;
            p.current_query = Some("first".into());
        });
        let seen = latest.get().unwrap();
        assert_eq!(seen.total_depth, 2);
        assert_eq!(seen.total_breadth, 4);
        assert_eq!(seen.total_queries, 3);
        assert_eq!(seen, tracker.snapshot());

        latest.clear();
        assert!(latest.get().is_none());
    }

    #[test]
    fn fn_observer_sees_each_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let observer = FnObserver::new(move |p: &ResearchProgress| {
            log.lock().unwrap().push(p.completed_queries);
        });
        let tracker = ProgressTracker::new(1, 1, Arc::new(observer));
        tracker.update(|p| p.completed_queries += 1);
        tracker.update(|p| p.completed_queries += 1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
