//! Ordered hooks that mutate response headers before they are transmitted.

use std::fmt;

use axum::http::HeaderMap;

type Hook = Box<dyn FnOnce(&mut HeaderMap) + Send>;

/// Ordered list of header mutations run right before the response head is
/// flushed to the transport.
///
/// Running the hooks consumes the list, so each hook executes at most once.
/// Whoever owns the list is responsible for running it strictly before the
/// first header byte is written.
#[derive(Default)]
pub struct PreFlushHooks {
    hooks: Vec<Hook>,
}

impl PreFlushHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook. Hooks run in registration order.
    pub fn register<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut HeaderMap) + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook against `headers`.
    pub fn run(self, headers: &mut HeaderMap) {
        for hook in self.hooks {
            hook(headers);
        }
    }
}

impl fmt::Debug for PreFlushHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreFlushHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}
