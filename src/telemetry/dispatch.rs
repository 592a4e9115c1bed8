//! Flight event callback registry.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

use super::event::FlightEvent;
use super::reading::Reading;

/// Callback run when a confirmed frame carries its event
pub type Handler<'a> = Box<dyn FnMut(&Reading) + 'a>;

/// Maps flight events to callbacks.
///
/// Any number of handlers may be registered per event; they run in
/// registration order. Events with no handlers are ignored.
pub struct EventDispatcher<'a> {
    handlers: [Vec<Handler<'a>>; FlightEvent::COUNT],
}

impl<'a> EventDispatcher<'a> {
    pub fn new() -> Self {
        Self {
            handlers: core::array::from_fn(|_| Vec::new()),
        }
    }

    /// Register a callback for `event`
    pub fn register<F>(&mut self, event: FlightEvent, handler: F) -> &mut Self
    where
        F: FnMut(&Reading) + 'a,
    {
        self.handlers[event.index()].push(Box::new(handler));
        self
    }

    /// Remove every callback registered for `event`
    pub fn clear(&mut self, event: FlightEvent) {
        self.handlers[event.index()].clear();
    }

    pub fn handler_count(&self, event: FlightEvent) -> usize {
        self.handlers[event.index()].len()
    }

    /// Run the callbacks for `reading.event`. Returns how many ran.
    pub fn dispatch(&mut self, reading: &Reading) -> usize {
        let handlers = &mut self.handlers[reading.event.index()];
        for handler in handlers.iter_mut() {
            handler(reading);
        }
        handlers.len()
    }
}

impl Default for EventDispatcher<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::cell::{Cell, RefCell};

    fn reading_for(event: FlightEvent) -> Reading {
        Reading {
            event,
            ..Reading::default()
        }
    }

    #[test]
    fn test_dispatches_only_matching_event() {
        let apogees = Cell::new(0);
        let liftoffs = Cell::new(0);
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register(FlightEvent::Apogee, |_| apogees.set(apogees.get() + 1))
            .register(FlightEvent::Liftoff, |_| liftoffs.set(liftoffs.get() + 1));

        assert_eq!(dispatcher.dispatch(&reading_for(FlightEvent::Apogee)), 1);
        assert_eq!(apogees.get(), 1);
        assert_eq!(liftoffs.get(), 0);
    }

    #[test]
    fn test_unmapped_event_is_noop() {
        let mut dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.dispatch(&reading_for(FlightEvent::Touchdown)), 0);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let order = RefCell::new(vec![]);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(FlightEvent::MainChutes, |_| order.borrow_mut().push(1));
        dispatcher.register(FlightEvent::MainChutes, |r| {
            order.borrow_mut().push(if r.landing_imminent { 3 } else { 2 })
        });

        dispatcher.dispatch(&reading_for(FlightEvent::MainChutes));
        assert_eq!(dispatcher.handler_count(FlightEvent::MainChutes), 2);
        drop(dispatcher);
        assert_eq!(order.into_inner(), vec![1, 2]);
    }

    #[test]
    fn test_clear_removes_handlers() {
        let hits = Cell::new(0);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(FlightEvent::Safing, |_| hits.set(hits.get() + 1));
        dispatcher.clear(FlightEvent::Safing);

        dispatcher.dispatch(&reading_for(FlightEvent::Safing));
        assert_eq!(hits.get(), 0);
        assert_eq!(dispatcher.handler_count(FlightEvent::Safing), 0);
    }
}
