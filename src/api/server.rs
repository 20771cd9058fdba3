//! HTTP server assembly and lifecycle

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::engine::{Dispatcher, DomainMemory, Engine, HttpEngine};
use crate::scraper::{BrowserEngine, Scraper};

use super::auth::AuthState;
use super::handlers::AppState;
use super::routes::create_router;

/// Launch the browser and wire the fetch stack: HTTP engine, browser
/// engines, domain memory, and (unless disabled) the racing dispatcher.
/// Shared by the server and the one-shot CLI path.
pub async fn build_scraper(config: &Config) -> Result<(Arc<Scraper>, Arc<DomainMemory>)> {
    let scraper = Scraper::new(
        &config.browser,
        config.scraper.clone(),
        config.pool.clone(),
    )
    .await
    .context("failed to start browser")?;

    let http_engine = Arc::new(
        HttpEngine::new(
            Duration::from_secs(config.engine.http_timeout_secs),
            config.browser.default_proxy.as_deref(),
        )
        .context("failed to build http engine")?,
    );
    scraper.set_http_engine(Arc::clone(&http_engine));

    let memory = DomainMemory::new(Duration::from_secs(config.cache.domain_memory_ttl_secs));

    if config.engine.enable_multi_engine {
        let engines: Vec<Arc<dyn Engine>> = vec![
            http_engine,
            Arc::new(BrowserEngine::new(Arc::clone(&scraper), false)),
            Arc::new(BrowserEngine::new(Arc::clone(&scraper), true)),
        ];
        let dispatcher = Arc::new(Dispatcher::new(
            engines,
            &config.engine.escalation_delays_ms,
            Arc::clone(&memory),
        ));
        scraper.set_dispatcher(dispatcher);
        info!(
            delays_ms = ?config.engine.escalation_delays_ms,
            "multi-engine dispatcher enabled"
        );
    }

    Ok((scraper, memory))
}

/// Run the HTTP API until a shutdown signal arrives, then drain the pool
/// and terminate the browser.
pub async fn serve(config: Config) -> Result<()> {
    let (scraper, memory) = build_scraper(&config).await?;
    let cache = ResponseCache::new(config.cache.max_entries);

    let app_state = AppState {
        scraper: Arc::clone(&scraper),
        cache: Arc::clone(&cache),
        memory: Arc::clone(&memory),
        scraper_cfg: config.scraper.clone(),
    };
    let auth_state = AuthState::new(config.auth.api_keys.clone());
    if !auth_state.auth_required() {
        info!("no API keys configured, authentication disabled");
    }

    let router = create_router(app_state, auth_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down");
    cache.stop();
    memory.stop();
    scraper.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
