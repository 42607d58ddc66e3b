use std::sync::{Arc, Mutex};

use crate::aggregate::SecondAggregate;

/// Receives every emitted second, in strictly increasing timestamp order.
pub trait AggregateListener: Send {
    fn on_second(&mut self, second: &SecondAggregate);
}

/// Adapts a closure into a listener.
pub struct FnListener<F>(F);

pub fn listener_fn<F>(f: F) -> FnListener<F>
where
    F: FnMut(&SecondAggregate) + Send,
{
    FnListener(f)
}

impl<F> AggregateListener for FnListener<F>
where
    F: FnMut(&SecondAggregate) + Send,
{
    fn on_second(&mut self, second: &SecondAggregate) {
        (self.0)(second)
    }
}

/// Lets a listener stay readable by its owner (e.g. a widget that also renders).
impl<T> AggregateListener for Arc<Mutex<T>>
where
    T: AggregateListener,
{
    fn on_second(&mut self, second: &SecondAggregate) {
        let mut inner = self.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.on_second(second);
    }
}

/// Ordered set of subscribers for the aggregate stream.
#[derive(Default)]
pub struct AggregatePublisher {
    listeners: Vec<Box<dyn AggregateListener>>,
}

impl AggregatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn AggregateListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn publish(&mut self, second: &SecondAggregate) {
        for l in &mut self.listeners {
            l.on_second(second);
        }
    }
}

impl std::fmt::Debug for AggregatePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatePublisher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
