/*!
 * Shared test fixtures
 */

#![allow(dead_code)]

use devfleet::process::ProcessEvent;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Events captured by a test handler
#[derive(Clone)]
pub struct Recorder<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handler(&self) -> impl Fn(E) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event| events.lock().push(event)
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }
}

impl Recorder<ProcessEvent> {
    pub fn count(&self, kind: devfleet::process::ProcessEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

/// Write an executable-by-sh script into `dir`
pub fn script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), format!("#!/bin/sh\n{}\n", body)).unwrap();
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
