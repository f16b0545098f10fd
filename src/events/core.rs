use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::Result;

use super::DEFAULT_PRIORITY;

struct Slot<F: ?Sized> {
    id: u64,
    priority: i32,
    handler: Rc<F>,
}

/// Priority ordered handler storage shared by both hub flavours.
struct Handlers<F: ?Sized> {
    next_id: Cell<u64>,
    slots: RefCell<Vec<Slot<F>>>,
}

impl<F: ?Sized> Handlers<F> {
    fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            slots: RefCell::new(Vec::new()),
        }
    }

    fn insert(&self, priority: i32, handler: Rc<F>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut slots = self.slots.borrow_mut();
        // Insert after every slot with priority <= ours to keep ties in
        // subscription order.
        let at = slots
            .iter()
            .position(|slot| slot.priority > priority)
            .unwrap_or(slots.len());
        slots.insert(
            at,
            Slot {
                id,
                priority,
                handler,
            },
        );
        id
    }

    fn snapshot(&self) -> Vec<Rc<F>> {
        self.slots
            .borrow()
            .iter()
            .map(|slot| Rc::clone(&slot.handler))
            .collect()
    }

    fn len(&self) -> usize {
        self.slots.borrow().len()
    }
}

fn subscription_for<F: ?Sized + 'static>(handlers: &Rc<Handlers<F>>, id: u64) -> Subscription {
    let weak: Weak<Handlers<F>> = Rc::downgrade(handlers);
    Subscription::new(move || {
        if let Some(handlers) = weak.upgrade() {
            handlers.slots.borrow_mut().retain(|slot| slot.id != id);
        }
    })
}

/// Broadcasts events to every subscribed handler, lowest priority first.
pub struct EventHub<E> {
    handlers: Rc<Handlers<dyn Fn(&E)>>,
}

impl<E: 'static> EventHub<E> {
    pub fn new() -> Self {
        Self {
            handlers: Rc::new(Handlers::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + 'static,
    {
        self.subscribe_with_priority(DEFAULT_PRIORITY, handler)
    }

    pub fn subscribe_with_priority<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&E) + 'static,
    {
        let id = self.handlers.insert(priority, Rc::new(handler));
        subscription_for(&self.handlers, id)
    }

    /// Runs every handler registered at the time of the call.
    pub fn emit(&self, event: &E) {
        for handler in self.handlers.snapshot() {
            handler(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<E: 'static> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs validation handlers that may reject a pending mutation.
pub struct GuardHub<E> {
    handlers: Rc<Handlers<dyn Fn(&E) -> Result<()>>>,
}

impl<E: 'static> GuardHub<E> {
    pub fn new() -> Self {
        Self {
            handlers: Rc::new(Handlers::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) -> Result<()> + 'static,
    {
        self.subscribe_with_priority(DEFAULT_PRIORITY, handler)
    }

    pub fn subscribe_with_priority<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&E) -> Result<()> + 'static,
    {
        let id = self.handlers.insert(priority, Rc::new(handler));
        subscription_for(&self.handlers, id)
    }

    /// Returns the first rejection. Later guards do not run once one rejects.
    pub fn check(&self, event: &E) -> Result<()> {
        for handler in self.handlers.snapshot() {
            handler(event)?;
        }
        Ok(())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<E: 'static> Default for GuardHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle. Dropping it unsubscribes the handler.
#[must_use = "dropping a Subscription immediately unsubscribes its handler"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Removes the handler now.
    pub fn cancel(mut self) {
        self.run();
    }

    /// Leaves the handler registered for as long as its hub lives.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;

    #[test]
    fn handlers_run_in_priority_order() {
        let hub = EventHub::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        let _late = hub.subscribe_with_priority(10, move |v| log.borrow_mut().push(("late", *v)));
        let log = Rc::clone(&seen);
        let _early = hub.subscribe_with_priority(-10, move |v| log.borrow_mut().push(("early", *v)));
        let log = Rc::clone(&seen);
        let _tie = hub.subscribe_with_priority(10, move |v| log.borrow_mut().push(("tie", *v)));

        hub.emit(&7);
        assert_eq!(
            *seen.borrow(),
            vec![("early", 7), ("late", 7), ("tie", 7)]
        );
    }

    #[test]
    fn dropping_subscription_removes_handler() {
        let hub = EventHub::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let sub = hub.subscribe(move |_| counter.set(counter.get() + 1));

        hub.emit(&());
        drop(sub);
        hub.emit(&());

        assert_eq!(hits.get(), 1);
        assert_eq!(hub.handler_count(), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let hub = EventHub::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        hub.subscribe(move |_| counter.set(counter.get() + 1)).detach();

        hub.emit(&());
        hub.emit(&());
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn handler_may_cancel_itself_while_running() {
        let hub = Rc::new(EventHub::<()>::new());
        let holder: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let slot = Rc::clone(&holder);
        let counter = Rc::clone(&hits);
        let sub = hub.subscribe(move |_| {
            counter.set(counter.get() + 1);
            slot.borrow_mut().take();
        });
        *holder.borrow_mut() = Some(sub);

        hub.emit(&());
        hub.emit(&());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn cancel_after_hub_dropped_is_noop() {
        let hub = EventHub::<()>::new();
        let sub = hub.subscribe(|_| {});
        drop(hub);
        sub.cancel();
    }

    #[test]
    fn guard_returns_first_rejection() {
        let guards = GuardHub::<u32>::new();
        let later_ran = Rc::new(Cell::new(false));
        let _reject = guards.subscribe(|v| {
            if *v > 3 {
                Err(PoolError::NotFound(v.to_string()))
            } else {
                Ok(())
            }
        });
        let flag = Rc::clone(&later_ran);
        let _after = guards.subscribe_with_priority(5, move |_| {
            flag.set(true);
            Ok(())
        });

        assert!(guards.check(&1).is_ok());
        assert!(later_ran.get());

        later_ran.set(false);
        let err = guards.check(&9).unwrap_err();
        assert_eq!(err, PoolError::NotFound("9".to_string()));
        assert!(!later_ran.get());
    }
}
