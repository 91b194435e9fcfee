use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::fetcher::SheetFetcher;
use crate::services::DashboardService;

/// Running application: the HTTP server task.
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
}

impl Application {
    /// Fetch the sheet, build the dashboard service and spawn the HTTP server.
    ///
    /// The initial fetch is fatal: without a base table there is nothing to
    /// serve.
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        // Create fetcher
        let fetcher = SheetFetcher::with_timeout(config.sheet_url.clone(), config.fetch_timeout())?
            .with_max_retries(config.fetch_max_retries);

        info!("Loading base table from {}", config.sheet_url);
        let dashboard = DashboardService::load(fetcher)
            .await?
            .with_idle_timeout(config.session_idle_timeout());
        let table = dashboard.table();
        info!(
            "Base table loaded: {} records across {} units ({} rows rejected)",
            table.records().len(),
            table.units().len(),
            table.rejected_rows()
        );

        // Create API router
        let app_state = AppState { dashboard };
        let app = create_router(app_state).layer(TraceLayer::new_for_http());

        // Spawn server
        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self { server_handle })
    }

    /// Run until the server stops
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
