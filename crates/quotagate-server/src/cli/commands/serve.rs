use crate::cli::args::ServeArgs;
use crate::http::{router, AppState};
use anyhow::Context;
use quotagate_core::{AuthMode, AuthorizationGateway, GatewayConfig, StoreHandle};

pub async fn run(mut config: GatewayConfig, args: ServeArgs) -> anyhow::Result<i32> {
    if args.auth_disabled {
        config.mode = AuthMode::Disabled;
    }
    if let Some(ms) = args.backend_timeout_ms {
        config.backend_timeout_ms = ms;
    }

    // Misconfiguration stops startup before any socket is bound.
    config.validate().context("invalid gateway configuration")?;

    let store = config.open_store().context("opening credential store")?;
    if let StoreHandle::Sqlite(sqlite) = &store {
        if !sqlite.is_provisioned()? {
            tracing::warn!(
                event = "store_not_provisioned",
                fallback_enabled = config.fallback.enabled,
                "credential tables missing; run `quotagate migrate`"
            );
        }
    }

    let gateway = AuthorizationGateway::from_config(&config, store.backend())?;
    tracing::info!(
        event = "gateway_starting",
        listen = %args.listen,
        mode = ?config.mode,
        store = store.kind(),
        fallback_enabled = gateway.fallback_enabled(),
        backend_timeout_ms = config.backend_timeout_ms
    );

    let app = router(AppState::new(gateway));
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!(event = "gateway_stopped");
    Ok(0)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(event = "signal_handler_failed", error = %e);
    }
}
