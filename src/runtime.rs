use crate::{
    app::{AppState, build_router},
    authenticator::Authenticator,
    authorizer::Authorizer,
    config::Config,
    error::AuthError,
    front_door::FrontDoor,
    observability,
    stash::StashClient,
};
use axum::serve::ListenerExt;
use std::sync::Arc;

/// Builds the request-scoped gateways. Fails fast on an invalid Stash host,
/// a missing encryption key, or an unknown read-authorization policy.
pub fn build_state(config: &Config) -> Result<AppState, AuthError> {
    let client = Arc::new(StashClient::new(&config.stash)?);
    let front_door = FrontDoor::new(&config.front_door)?;

    Ok(AppState {
        authenticator: Arc::new(Authenticator::new(client.clone())),
        authorizer: Arc::new(Authorizer::new(client, front_door)),
    })
}

pub async fn run(config: Config) -> Result<(), AuthError> {
    let bind = config.bind;
    let state = build_state(&config)?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await?
        .tap_io(|tcp_stream| {
            let _ = tcp_stream.set_nodelay(true);
        });

    tracing::info!(bind = %bind, "stash-auth listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|_| AuthError::Internal)
}

pub async fn run_standalone(config: Config) -> Result<(), AuthError> {
    let default_level = startup_log_level(&config).to_string();
    let tracing_settings = observability::init_from_env(&default_level);
    tracing::debug!(
        log_filter = tracing_settings.filter,
        log_format = tracing_settings.log_format.as_str(),
        "initialized tracing subscriber"
    );
    run(config).await
}

pub async fn run_from_env() -> Result<(), AuthError> {
    let config = Config::from_env().map_err(|err| {
        AuthError::Validation(format!("invalid runtime configuration: {err}"))
    })?;
    run_standalone(config).await
}

fn startup_log_level(config: &Config) -> &str {
    config.log_level.as_str()
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                let _ = sigterm.recv().await;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
