//! Trigger subscription (C6, §4.6).
//!
//! Database events arrive on the [`Dispatcher`]'s event channel multiplexed
//! alongside normal request/response traffic. A single dedicated thread,
//! started lazily on first subscription, drains that channel and fans each
//! `Database` event out to every callback registered under the matching
//! trigger name.

use crate::dispatch::{Dispatcher, Event};
use crate::error::HdbResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One delivered trigger firing, parsed from `"<name> <source> <fireCount>"`
/// (§4.6, "Event payload").
#[derive(Clone, Debug)]
pub struct TriggerEvent {
    pub name: String,
    pub source: String,
    pub fire_count: u64,
}

/// A callback invoked once per matching [`TriggerEvent`]. Panics and errors
/// raised by the callback are caught and logged, never propagated (§4.6,
/// "Callback isolation").
pub type TriggerCallback = Box<dyn Fn(&TriggerEvent) + Send + 'static>;

struct Subscriptions {
    by_name: HashMap<String, Vec<TriggerCallback>>,
}

/// Owns the registered trigger callbacks and the dispatch thread that feeds
/// them, for one connection (§4.6).
pub struct TriggerDispatch {
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for TriggerDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerDispatch").finish_non_exhaustive()
    }
}

impl TriggerDispatch {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            subscriptions: Arc::new(Mutex::new(Subscriptions {
                by_name: HashMap::new(),
            })),
            worker: Mutex::new(None),
        }
    }

    /// Registers `callback` under `trigger_name`, starting the dedicated
    /// dispatch thread on first use (§4.6, "Subscription").
    pub fn subscribe(&self, trigger_name: impl Into<String>, callback: TriggerCallback) -> HdbResult<()> {
        {
            let mut subs = self.subscriptions.lock()?;
            subs.by_name
                .entry(trigger_name.into())
                .or_default()
                .push(callback);
        }
        self.ensure_started();
        Ok(())
    }

    /// Removes every callback registered under `trigger_name` (§4.6).
    pub fn unsubscribe(&self, trigger_name: &str) -> HdbResult<()> {
        self.subscriptions.lock()?.by_name.remove(trigger_name);
        Ok(())
    }

    fn ensure_started(&self) {
        let mut worker = self.worker.lock().expect("trigger worker lock");
        if worker.is_some() {
            return;
        }
        let events = self.dispatcher.events();
        let subscriptions = Arc::clone(&self.subscriptions);
        let handle = std::thread::Builder::new()
            .name("ponydb-trigger".into())
            .spawn(move || dispatch_loop(events, subscriptions))
            .expect("spawning the trigger dispatch thread");
        *worker = Some(handle);
        debug!("trigger dispatch thread started");
    }
}

fn dispatch_loop(events: crossbeam_channel::Receiver<Event>, subscriptions: Arc<Mutex<Subscriptions>>) {
    for event in events {
        match event {
            Event::Ping => continue,
            Event::Database { message, .. } => {
                let Some(parsed) = parse_trigger_event(&message) else {
                    debug!("unparseable trigger event payload: {message:?}");
                    continue;
                };
                let Ok(subs) = subscriptions.lock() else {
                    return;
                };
                if let Some(callbacks) = subs.by_name.get(&parsed.name) {
                    for callback in callbacks {
                        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            callback(&parsed);
                        })) {
                            let msg = panic
                                .downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| panic.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "non-string panic payload".to_string());
                            debug!("trigger callback for {:?} panicked: {msg}", parsed.name);
                        }
                    }
                }
            }
        }
    }
    debug!("trigger dispatch thread exiting: event channel closed");
}

/// Parses the `"<name> <source> <fireCount>"` event payload (§4.6). The name
/// and source are whitespace-delimited tokens; `fireCount` is the trailing
/// decimal integer.
fn parse_trigger_event(message: &str) -> Option<TriggerEvent> {
    let mut parts = message.splitn(3, ' ');
    let name = parts.next()?.to_string();
    let source = parts.next()?.to_string();
    let fire_count = parts.next()?.trim().parse().ok()?;
    Some(TriggerEvent {
        name,
        source,
        fire_count,
    })
}
