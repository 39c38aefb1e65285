//! Service-type dispatch
//!
//! Routes every inbound buffer to at most one handler. The routing table is
//! a tagged union: either a single catch-all handler owns all traffic, or a
//! map of per-type handlers does. Mixing the two is a setup mistake and
//! fails loudly at registration time; the forced "highlander" registration
//! evicts whatever is installed and takes over.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use knxnet_core::ServiceType;
use knxnet_transport::{request::hex, Request, Response};

use crate::error::{DeviceError, Result};

/// Boxed async handler invoked with the request and its reply handle
pub type Handler = Arc<dyn Fn(Request, Response) -> BoxFuture<'static, ()> + Send + Sync>;

/// Routing table state
#[derive(Clone, Default)]
enum Routing {
    #[default]
    NoHandler,
    CatchAll(Handler),
    Typed(HashMap<ServiceType, Handler>),
}

/// Demultiplexes inbound buffers by identified service type
#[derive(Clone, Default)]
pub struct Dispatcher {
    routing: Arc<Mutex<Routing>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one service type. Fails if the type already
    /// has a handler or a catch-all is active.
    pub fn add_typed_callback(&self, service_type: ServiceType, handler: Handler) -> Result<()> {
        let mut routing = self.routing.lock();
        match &mut *routing {
            Routing::NoHandler => {
                let mut map = HashMap::new();
                map.insert(service_type, handler);
                *routing = Routing::Typed(map);
                Ok(())
            }
            Routing::Typed(map) => {
                if map.contains_key(&service_type) {
                    return Err(DeviceError::DuplicateHandler(service_type.to_string()));
                }
                map.insert(service_type, handler);
                Ok(())
            }
            Routing::CatchAll(_) => Err(DeviceError::ConflictingHandler(
                service_type.to_string(),
            )),
        }
    }

    /// Register a catch-all handler. Fails while typed handlers exist.
    pub fn add_all_callback(&self, handler: Handler) -> Result<()> {
        let mut routing = self.routing.lock();
        match &*routing {
            Routing::NoHandler => {
                *routing = Routing::CatchAll(handler);
                Ok(())
            }
            Routing::Typed(_) => Err(DeviceError::ConflictingHandler("catch-all".to_string())),
            Routing::CatchAll(_) => Err(DeviceError::DuplicateHandler("catch-all".to_string())),
        }
    }

    /// Forced catch-all registration: evicts every existing handler and
    /// installs itself. Used by pass-through devices that must own all
    /// traffic unconditionally.
    pub fn add_highlander_callback(&self, handler: Handler) {
        let mut routing = self.routing.lock();
        match &*routing {
            Routing::NoHandler => {}
            Routing::CatchAll(_) => {
                warn!("highlander registration evicting catch-all handler");
            }
            Routing::Typed(map) => {
                for service_type in map.keys() {
                    warn!("highlander registration evicting handler for {}", service_type);
                }
            }
        }
        *routing = Routing::CatchAll(handler);
    }

    /// Drop every registration.
    pub fn clear(&self) {
        *self.routing.lock() = Routing::NoHandler;
    }

    /// Identify the buffer and route it. Precedence: catch-all, then the
    /// typed match, then drop with a warning. Never propagates an error out
    /// of the receive path.
    pub async fn dispatch(&self, mut request: Request, response: Response) {
        let service_type = request.identify();

        let handler = {
            let routing = self.routing.lock();
            match &*routing {
                Routing::CatchAll(handler) => Some(handler.clone()),
                Routing::Typed(map) => map.get(&service_type).cloned(),
                Routing::NoHandler => None,
            }
        };

        match handler {
            Some(handler) => {
                debug!(
                    message_id = %request.id(),
                    service_type = %service_type,
                    "dispatching message"
                );
                handler(request, response).await;
            }
            None => {
                warn!(
                    message_id = %request.id(),
                    buffer = %hex(request.data()),
                    "no handler for service type {}, dropping message",
                    service_type
                );
            }
        }
    }
}
