//! Server Implementation
//!
//! HTTP 服务器和消息总线的启动与生命周期管理

use crate::api;
use crate::core::{Config, Result, ServerState};

/// HTTP + 消息总线服务器
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create a server with existing state (for tests and embedding)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<()> {
        // Create application state if not provided
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config)
                .await
                .map_err(crate::core::ServerError::Internal)?,
        };

        // Start background tasks
        state.start_background_tasks();

        // Start the message bus TCP server
        let message_bus = state.message_bus().clone();
        tokio::spawn(async move {
            if let Err(e) = message_bus.start_tcp_server().await {
                tracing::error!("Message bus TCP server failed: {}", e);
            }
        });

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        tracing::info!("Comanda server starting on {}", addr);
        tracing::info!(
            "  HTTP API    : http://localhost:{}",
            self.config.http_port
        );
        tracing::info!(
            "  Message Bus : tcp://localhost:{}",
            self.config.stream_tcp_port
        );

        let app = api::build_app().with_state(state.clone());
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let bus_for_shutdown = state.message_bus().clone();
        let shutdown = async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
            bus_for_shutdown.shutdown();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
