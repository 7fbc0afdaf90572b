// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tag-change notification sink (spec §6: "watchers observe tag changes
//! via a subscription channel"). `RunReader::WatchRun` subscribes here in
//! addition to backend events (spec §4.2).

use tokio::sync::broadcast;
use tyger_core::Event;

/// A broadcast sender for Run change events. Cloning shares the same
/// underlying channel; each `subscribe()` call gets an independent
/// receiver so concurrent watchers don't steal each other's events
/// (spec §4.2: "Watch is single-consumer per call; multiple concurrent
/// watchers are supported via independent subscriptions").
#[derive(Clone)]
pub struct TagChangeSink {
    sender: broadcast::Sender<Event>,
}

impl TagChangeSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        // No receivers is not an error: nobody is watching this Run right now.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for TagChangeSink {
    fn default() -> Self {
        Self::new(1024)
    }
}
