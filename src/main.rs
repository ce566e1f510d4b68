//! modhttp demo server.
//!
//! Serves a greeter controller under `/api` and a health endpoint, and runs
//! until Ctrl+C.
//!
//! ```text
//! GET /health            → "ok"
//! GET /api/hi/{name}     → "Hello, {name}"
//! GET /api/visits        → per-session visit counter
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use modhttp::config::{load_config, validate_config, ConfigError, ServerConfig};
use modhttp::lifecycle::{shutdown_on_ctrl_c, CancellationSignal};
use modhttp::modules::RoutingModule;
use modhttp::net::HttpListener;
use modhttp::observability::{init_logging, init_metrics};
use modhttp::webapi::{AsyncAction, Controller, ControllerScope, Param, SyncAction, WebApiModule};
use modhttp::{HandlerError, WebServer};

#[derive(Parser, Debug)]
#[command(name = "modhttp", version, about = "Embeddable HTTP server core demo")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[derive(Default)]
struct Greeter {
    scope: Option<ControllerScope>,
}

impl Controller for Greeter {
    fn attach(&mut self, scope: ControllerScope) {
        self.scope = Some(scope);
    }
}

impl Greeter {
    fn say_hi(&mut self, name: String) -> Result<String, HandlerError> {
        Ok(format!("Hello, {name}"))
    }

    fn visits<'c>(&'c mut self) -> BoxFuture<'c, Result<Value, HandlerError>> {
        Box::pin(async move {
            let scope = self
                .scope
                .as_ref()
                .ok_or_else(|| HandlerError::Unhandled(anyhow::anyhow!("controller not attached")))?;
            let session = scope.context.session();
            let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
            session.set("visits", json!(visits));
            Ok(json!({ "session": session.id(), "visits": visits }))
        })
    }
}

fn build_server(config: &ServerConfig) -> anyhow::Result<WebServer> {
    let mut api = WebApiModule::new("api");
    api.controller(Greeter::default)?
        .get("/hi/{name}", "say_hi", (Param::<String>::named("name"),), SyncAction(Greeter::say_hi))?
        .get("/visits", "visits", (), AsyncAction(Greeter::visits))?;

    let mut health = RoutingModule::new("health");
    health.get("/health", |ctx, _| {
        ctx.response().write_text("ok", "text/plain; charset=utf-8");
        Ok(true)
    })?;

    let mut server = WebServer::from_config(config);
    server.register("/", health)?.register("/api", api)?;
    Ok(server)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "modhttp starting");

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .context("parsing observability.metrics_address")?;
        init_metrics(addr);
    }

    let mut server = build_server(&config)?;
    let listener = HttpListener::bind(&config).await?;

    let root = CancellationSignal::new();
    tokio::spawn(shutdown_on_ctrl_c(root.clone()));
    server.run(listener, root).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
