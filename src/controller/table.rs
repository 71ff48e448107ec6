//! Controllers as explicit method tables.
//!
//! A controller is a name plus a table from method name to async handler,
//! built once before registration. Dispatch looks a method up by the
//! capitalized path segment; nothing is discovered at runtime, so every
//! reachable method is listed by [`Controller::method_names`].

use axum::response::Response;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::controller::context::CallContext;

/// A controller method: takes the call context, produces the response.
pub type MethodHandler = Arc<dyn Fn(CallContext) -> BoxFuture<'static, Response> + Send + Sync>;

/// Named dispatch table.
#[derive(Clone)]
pub struct Controller {
    name: String,
    methods: HashMap<String, MethodHandler>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add `name` to the table. Names are matched exactly, so register them
    /// the way dispatch produces them (`List`, not `list`). A repeated name
    /// replaces the earlier method.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |ctx| Box::pin(f(ctx)));
        self.methods.insert(name.into(), handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, method: &str) -> Option<&MethodHandler> {
        self.methods.get(method)
    }

    /// Sorted method names.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}
