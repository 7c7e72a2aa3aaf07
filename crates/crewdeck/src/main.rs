mod api;
mod config;
mod crew;

use std::sync::Arc;
use std::time::Duration;

use crewdeck_run::Supervisor;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().init();

	let config = Arc::new(config::load());
	let supervisor = Supervisor::new();

	let http = match reqwest::Client::builder().timeout(Duration::from_secs(3)).build() {
		Ok(c) => c,
		Err(e) => {
			tracing::error!("failed to build HTTP client: {}", e);
			std::process::exit(1);
		}
	};

	let addr = format!("{}:{}", config.server.bind, config.server.port);
	let app = api::router(supervisor, Arc::clone(&config), http);

	let listener = match tokio::net::TcpListener::bind(&addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!("failed to bind {}: {}", addr, e);
			std::process::exit(1);
		}
	};
	tracing::info!("crewdeck listening on {}", addr);
	tracing::info!("crew dir: {}", config.crew.dir.display());

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!("server error: {}", e);
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("shutting down");
		}
	}
}
