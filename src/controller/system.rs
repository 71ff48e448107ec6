//! Built-in `system` controller.
//!
//! ```text
//! .../system/version            → {"name": ..., "version": ...}
//! .../system/connections        → [{"name","host","database","open"}, ...]
//! .../system/ping/<connection>  → round trip through the executor
//! ```

use serde::Serialize;

use crate::controller::context::CallContext;
use crate::controller::table::Controller;
use crate::db::QueryExecutor;

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ConnectionInfo {
    name: String,
    host: String,
    database: String,
    open: bool,
}

pub fn system_controller(executor: QueryExecutor) -> Controller {
    let connections = executor.clone();

    Controller::new("system")
        .method("Version", |ctx: CallContext| async move {
            ctx.json(VersionInfo {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
            })
        })
        .method("Connections", move |ctx: CallContext| {
            let registry = connections.registry().clone();
            async move {
                let list: Vec<ConnectionInfo> = registry
                    .names()
                    .into_iter()
                    .filter_map(|name| {
                        let config = registry.config(&name)?;
                        Some(ConnectionInfo {
                            open: registry.is_open(&name),
                            host: config.host,
                            database: config.database,
                            name,
                        })
                    })
                    .collect();
                ctx.json(list)
            }
        })
        .method("Ping", move |ctx: CallContext| {
            let executor = executor.clone();
            async move {
                let Some(name) = ctx.arg(0) else {
                    return ctx.json_error("missing connection name");
                };
                let rows = match executor.query(name, "SELECT 1", &[]).await {
                    Ok(rows) => rows,
                    Err(e) => return ctx.json_error(e),
                };
                let value = rows
                    .first()
                    .and_then(|row| row.first())
                    .map(|cell| cell.to_i64());
                match value {
                    Some(Ok(decoded)) => ctx.json(decoded.value),
                    Some(Err(e)) => ctx.json_error(e),
                    None => ctx.json_error("empty result"),
                }
            }
        })
}
