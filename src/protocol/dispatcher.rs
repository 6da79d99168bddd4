use crate::error::{ProtocolError, Result};
use crate::protocol::message::{Message, Variant};
use crate::protocol::response::Response;
use std::sync::Arc;
use tracing::trace;

type HandlerFn = dyn Fn(&Message) -> Result<Response> + Send + Sync + 'static;

/// Routes messages to handlers by variant.
///
/// Entries keep their registration order. Lookup tries an exact variant match
/// first, then the first registered abstract variant that covers the message.
/// Cloning shares the registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Vec<(Variant, Arc<HandlerFn>)>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("variants", &self.variants())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register `handler` for `variant`, replacing any earlier handler for the
    /// same variant in place.
    pub fn register<F>(&mut self, variant: Variant, handler: F)
    where
        F: Fn(&Message) -> Result<Response> + Send + Sync + 'static,
    {
        match self.handlers.iter_mut().find(|(v, _)| *v == variant) {
            Some(entry) => entry.1 = Arc::new(handler),
            None => self.handlers.push((variant, Arc::new(handler))),
        }
    }

    /// Registered variants, in registration order.
    pub fn variants(&self) -> Vec<Variant> {
        self.handlers.iter().map(|(v, _)| *v).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The variant whose handler would answer `msg`, if any.
    pub fn route(&self, msg: &Message) -> Option<Variant> {
        self.lookup(msg).map(|(variant, _)| variant)
    }

    pub fn dispatch(&self, msg: &Message) -> Result<Response> {
        let (variant, handler) = self
            .lookup(msg)
            .ok_or(ProtocolError::NoHandler(msg.kind()))?;

        trace!(kind = %msg.kind(), ?variant, "Dispatching message");
        handler(msg).map_err(|e| ProtocolError::Handler(Box::new(e)))
    }

    fn lookup(&self, msg: &Message) -> Option<(Variant, &HandlerFn)> {
        let kind = msg.kind();
        let exact = Variant::from(kind);

        self.handlers
            .iter()
            .find(|(v, _)| *v == exact)
            .or_else(|| self.handlers.iter().find(|(v, _)| v.covers(kind)))
            .map(|(v, h)| (*v, h.as_ref()))
    }
}
