//! Single-consumer handler registration.
//!
//! A [`HandlerSlot`] holds at most one callback. Registering a new callback
//! replaces (and drops) the previous one; there is no multiplexing. Embedders
//! that want several consumers fan out inside their own handler.

/// Boxed callback receiving a borrowed event payload
pub type Handler<A> = Box<dyn FnMut(&A)>;

/// Slot holding the sole consumer of one event stream
pub struct HandlerSlot<A: ?Sized> {
    handler: Option<Handler<A>>,
}

impl<A: ?Sized> Default for HandlerSlot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> HandlerSlot<A> {
    pub fn new() -> Self {
        Self { handler: None }
    }

    /// Install `handler`, dropping any previous one.
    ///
    /// Returns `true` when a previous handler was displaced.
    pub fn replace<F>(&mut self, handler: F) -> bool
    where
        F: FnMut(&A) + 'static,
    {
        self.handler.replace(Box::new(handler)).is_some()
    }

    /// Remove the handler. Returns `true` if one was installed.
    pub fn clear(&mut self) -> bool {
        self.handler.take().is_some()
    }

    pub fn is_set(&self) -> bool {
        self.handler.is_some()
    }

    /// Deliver `event` to the handler. Returns `false` when the slot is empty.
    pub fn emit(&mut self, event: &A) -> bool {
        match self.handler.as_mut() {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

impl<A: ?Sized> std::fmt::Debug for HandlerSlot<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_empty_slot_drops_events() {
        let mut slot: HandlerSlot<str> = HandlerSlot::new();
        assert!(!slot.emit("lost"));
        assert!(!slot.clear());
    }

    #[test]
    fn test_replace_displaces_previous_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut slot: HandlerSlot<str> = HandlerSlot::new();

        let first = seen.clone();
        assert!(!slot.replace(move |s: &str| first.borrow_mut().push(format!("1:{}", s))));
        let second = seen.clone();
        assert!(slot.replace(move |s: &str| second.borrow_mut().push(format!("2:{}", s))));

        assert!(slot.emit("x"));
        assert_eq!(*seen.borrow(), vec!["2:x".to_string()]);
        // The first closure and its captured clone are gone
        assert_eq!(Rc::strong_count(&seen), 2);
    }

    #[test]
    fn test_clear_releases_captures() {
        let token = Rc::new(());
        let mut slot: HandlerSlot<str> = HandlerSlot::new();
        let captured = token.clone();
        slot.replace(move |_: &str| {
            let _ = Rc::strong_count(&captured);
        });

        assert_eq!(Rc::strong_count(&token), 2);
        assert!(slot.clear());
        assert_eq!(Rc::strong_count(&token), 1);
        assert!(!slot.is_set());
    }
}
