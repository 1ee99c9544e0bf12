use std::collections::{HashMap, hash_map};

use super::{Handler, SessionError, SessionResult};

/// Routes method names to handlers, with an optional fallback.
///
/// A method name can be registered once. Registering it again fails with
/// [`SessionError::DuplicateMethod`] and keeps the first handler.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn Handler>>,
    default: Option<Box<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> SessionResult<()> {
        match self.handlers.entry(method.into()) {
            hash_map::Entry::Occupied(e) => Err(SessionError::DuplicateMethod(e.key().clone())),
            hash_map::Entry::Vacant(e) => {
                e.insert(Box::new(handler));
                Ok(())
            }
        }
    }

    /// Sets the handler used for methods with no binding of their own, replacing any previous one.
    pub fn set_default(&mut self, handler: impl Handler + 'static) {
        self.default = Some(Box::new(handler));
    }
    pub fn clear_default(&mut self) {
        self.default = None;
    }
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Returns the handler bound to `method`, else the default, else `None` (method not found).
    pub fn lookup(&mut self, method: &str) -> Option<&mut (dyn Handler + 'static)> {
        match self.handlers.get_mut(method) {
            Some(h) => Some(&mut **h),
            None => self.default.as_deref_mut(),
        }
    }
}
