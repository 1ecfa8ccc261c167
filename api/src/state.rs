use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serper_relay_mcp_runtime::ProtocolHandler;

use crate::routes::table::{RouteTable, RouteTarget};

/// Internal handlers, keyed by the route target they serve.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<RouteTarget, Arc<dyn ProtocolHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, target: RouteTarget, handler: Arc<dyn ProtocolHandler>) -> Self {
        Arc::make_mut(&mut self.handlers).insert(target, handler);
        self
    }

    pub fn get(&self, target: RouteTarget) -> Option<Arc<dyn ProtocolHandler>> {
        self.handlers.get(&target).cloned()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub handlers: HandlerRegistry,
    pub default_api_key: Option<Arc<str>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(routes: RouteTable, handlers: HandlerRegistry, default_api_key: Option<String>) -> Self {
        Self {
            routes: Arc::new(routes),
            handlers,
            default_api_key: default_api_key.map(Arc::from),
            started_at: Utc::now(),
        }
    }
}
