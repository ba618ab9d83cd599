use std::collections::HashMap;
use std::marker::PhantomData;

use msgwire_frame::{ConnectionId, Frame, Message, MessageError};
use tracing::{debug, warn};

use crate::error::DispatchError;

/// Type-erased view of a registered handler.
trait ErasedHandler: Send {
    fn type_name(&self) -> &'static str;

    fn handle(&mut self, conn: ConnectionId, body: &[u8]) -> Result<(), MessageError>;
}

/// Decodes a body into a fresh `T` before calling the typed handler.
struct TypedHandler<T, F> {
    factory: fn() -> T,
    handler: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> ErasedHandler for TypedHandler<T, F>
where
    T: Message,
    F: FnMut(ConnectionId, T) + Send + 'static,
{
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn handle(&mut self, conn: ConnectionId, body: &[u8]) -> Result<(), MessageError> {
        let mut value = (self.factory)();
        value.parse_from(body)?;
        (self.handler)(conn, value);
        Ok(())
    }
}

/// Registry of typed handlers keyed by wire type discriminant.
///
/// At most one handler exists per discriminant. Dispatch runs the handler on
/// the calling thread.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u32, Box<dyn ErasedHandler>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for message type `T`.
    ///
    /// Fails if a handler for `T`'s discriminant already exists; the existing
    /// registration stays active.
    pub fn register<T, F>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        T: Message,
        F: FnMut(ConnectionId, T) + Send + 'static,
    {
        let type_id = T::wire_type_id();
        if let Some(existing) = self.handlers.get(&type_id) {
            return Err(DispatchError::AlreadyRegistered {
                type_name: T::TYPE_NAME,
                type_id,
                existing: existing.type_name(),
            });
        }

        self.handlers.insert(
            type_id,
            Box::new(TypedHandler {
                factory: T::default,
                handler,
                _marker: PhantomData,
            }),
        );
        debug!(type_name = T::TYPE_NAME, type_id, "registered handler");
        Ok(())
    }

    /// Decode `frame` and run the handler registered for its type.
    pub fn dispatch(&mut self, conn: ConnectionId, frame: &Frame) -> Result<(), DispatchError> {
        if !frame.is_complete() {
            return Err(DispatchError::Incomplete);
        }
        let type_id = frame.type_id().ok_or(DispatchError::Incomplete)?;

        let handler = self
            .handlers
            .get_mut(&type_id)
            .ok_or(DispatchError::UnknownType(type_id))?;

        handler
            .handle(conn, frame.body())
            .map_err(|source| DispatchError::Decode {
                type_name: handler.type_name(),
                source,
            })
    }

    /// Dispatch every frame in order, logging and skipping the ones that fail.
    ///
    /// Returns the number of frames whose handler ran.
    pub fn dispatch_all<I>(&mut self, frames: I) -> usize
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut handled = 0usize;
        for frame in frames {
            match self.dispatch(frame.origin(), &frame) {
                Ok(()) => handled += 1,
                Err(err) => {
                    warn!(origin = %frame.origin(), error = %err, "dropping frame");
                }
            }
        }
        handled
    }

    /// Whether a handler exists for `type_id`.
    pub fn is_registered(&self, type_id: u32) -> bool {
        self.handlers.contains_key(&type_id)
    }

    /// Name of the type registered for `type_id`.
    pub fn type_name(&self, type_id: u32) -> Option<&'static str> {
        self.handlers.get(&type_id).map(|handler| handler.type_name())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every registered handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&'static str> = self
            .handlers
            .values()
            .map(|handler| handler.type_name())
            .collect();
        types.sort_unstable();
        f.debug_struct("Dispatcher").field("types", &types).finish()
    }
}
