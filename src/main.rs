use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Extension;
use http::Method;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing::{error, info};

use dispatchline::controllers::{self, AxumRouter};
use dispatchline::dispatch::{AppState, providers::ProviderSet};
use dispatchline::global::{ConfigError, RuntimeConfig};
use dispatchline::log;

// Exit codes: 0 clean shutdown, 1 unexpected fatal, 2 bad configuration,
// 3 required credential missing
#[tokio::main]
async fn main() -> ExitCode {
	// Load our environment variables
	dotenvy::dotenv().ok();
	log::init_panic_handler();
	log::init_logger();

	let config = match RuntimeConfig::from_env() {
		Ok(config) => config,
		Err(err @ ConfigError::BadValue { .. }) => {
			error!("STARTUP ->> {err}");
			eprintln!("{err}");
			return ExitCode::from(2);
		}
		Err(err @ ConfigError::MissingCredential { .. }) => {
			error!("STARTUP ->> {err}");
			eprintln!("{err}");
			return ExitCode::from(3);
		}
	};

	let providers = match ProviderSet::from_config(&config) {
		Ok(providers) => providers,
		Err(err) => {
			error!("STARTUP ->> provider init failed: {err}");
			eprintln!("provider init failed: {err}");
			return ExitCode::from(2);
		}
	};

	let port = config.port;
	let state = Arc::new(AppState::new(config, providers));

	// Permissive CORS so an operations console can poll /health from a
	// browser; the dispatch endpoint is server-to-server anyway
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT]);

	let api_routes = AxumRouter::new()
		.merge(controllers::health::health_routes())
		.nest("/dispatch", controllers::dispatch::dispatch_routes());

	#[cfg(all(not(test), debug_assertions))]
	let api_routes = dispatchline::swagger::merge_swagger(api_routes);

	let app = axum::Router::new()
		.merge(api_routes)
		.layer(Extension(state))
		.layer(TraceLayer::new_for_http())
		.layer(cors);

	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	info!("STARTUP ->> listening on {addr}");

	let listener = match tokio::net::TcpListener::bind(addr).await {
		Ok(listener) => listener,
		Err(err) => {
			error!("STARTUP ->> could not bind {addr}: {err}");
			eprintln!("could not bind {addr}: {err}");
			return ExitCode::from(1);
		}
	};

	let served = axum::serve(listener, app.into_make_service())
		.with_graceful_shutdown(async {
			_ = tokio::signal::ctrl_c().await;
			info!("SHUTDOWN ->> signal received, draining");
		})
		.await;

	match served {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("FATAL ->> server error: {err}");
			ExitCode::from(1)
		}
	}
}
