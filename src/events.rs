use serde::Serialize;

use crate::cell::Cell;
use crate::engine::GameState;

/// Notification emitted by the engine, exactly once per externally visible
/// change. Timers, stores, and rendering live outside the engine and consume
/// these through a registered observer.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum EngineEvent {
    StateChanged(GameState),
    FlagsRemaining(usize),
    CellsRemaining(usize),
    CellChanged { index: usize, cell: Cell },
}

/// Handle returned by [`crate::GridEngine::subscribe`].
pub type ObserverId = usize;

type Callback = Box<dyn Fn(&EngineEvent) + Send>;

#[derive(Default)]
pub(crate) struct Observers {
    next_id: ObserverId,
    entries: Vec<(ObserverId, Callback)>,
}

impl Observers {
    pub(crate) fn subscribe(
        &mut self,
        observer: impl Fn(&EngineEvent) + Send + 'static,
    ) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, Box::new(observer)));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        for (_, observer) in &self.entries {
            observer(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn unsubscribed_observers_stop_receiving_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();

        let sink = Arc::clone(&seen);
        let id = observers.subscribe(move |event| sink.lock().unwrap().push(*event));

        observers.emit(EngineEvent::FlagsRemaining(3));
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.emit(EngineEvent::FlagsRemaining(2));

        assert_eq!(&*seen.lock().unwrap(), &[EngineEvent::FlagsRemaining(3)]);
    }
}
