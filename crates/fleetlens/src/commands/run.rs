//! The `run` command: wire config → engine → transports and stream
//! updates to stdout as JSON lines until interrupted.

use tokio_util::sync::CancellationToken;

use fleetlens_config::{UpstreamRuntime, resolve_upstream};
use fleetlens_core::{Engine, EngineConfig};
use fleetlens_ingest::{HttpPoller, WsBridge};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = fleetlens_config::load_config(global.config.as_ref())?;

    if config.upstreams.is_empty() {
        let path = global
            .config
            .clone()
            .unwrap_or_else(fleetlens_config::config_path);
        return Err(CliError::NoUpstreams {
            path: path.display().to_string(),
        });
    }

    // Resolve every upstream before anything starts, so a bad entry
    // fails the whole run instead of half-starting.
    let mut routes = Vec::new();
    let mut runtimes = Vec::new();
    for (name, upstream) in &config.upstreams {
        let (route, runtime) = resolve_upstream(name, upstream)?;
        routes.push(route);
        runtimes.push((name.clone(), runtime));
    }

    let engine = Engine::new(EngineConfig {
        intake_capacity: config.engine.intake_capacity,
        subscriber_buffer: config.engine.subscriber_buffer,
        routes,
    });
    engine.start().await;

    let cancel = CancellationToken::new();
    let mut bridges = Vec::new();
    let mut pollers = Vec::new();

    for (name, runtime) in runtimes {
        match runtime {
            UpstreamRuntime::Websocket(bridge_config) => {
                tracing::info!(upstream = %name, url = %bridge_config.url, "starting websocket bridge");
                bridges.push(WsBridge::spawn(
                    bridge_config,
                    engine.intake(),
                    cancel.child_token(),
                ));
            }
            UpstreamRuntime::Poll(poller_config) => {
                tracing::info!(upstream = %name, url = %poller_config.url, "starting poller");
                pollers.push(HttpPoller::spawn(
                    poller_config,
                    engine.intake(),
                    cancel.child_token(),
                )?);
            }
        }
    }

    // Local subscriber: every published update becomes one JSON line.
    let emitter = if args.quiet {
        None
    } else {
        let (id, mut updates) = engine.subscribe();
        let handle = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                match serde_json::to_string(update.as_ref()) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "update not serializable"),
                }
            }
        });
        Some((id, handle))
    };

    tracing::info!(
        upstreams = config.upstreams.len(),
        "fleetlens running, press ctrl-c to stop"
    );
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    cancel.cancel();
    if let Some((id, handle)) = emitter {
        engine.disconnect(id);
        handle.abort();
    }
    engine.shutdown().await;

    Ok(())
}
