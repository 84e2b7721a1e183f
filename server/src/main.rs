mod config;
mod stubs;
mod ws_transport;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{OriginalUri, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use noted_crdt::{admit, Collaborators, HubRegistry};
use noted_types::{Note, NoteId, User};
use tracing::{error, info};

use config::Config;
use stubs::{InMemoryNotes, InMemorySessions, InMemoryStorage, InMemoryUsers, OpenPermissions};
use ws_transport::{AxumSink, AxumStream};

#[derive(Clone)]
struct AppState {
	collaborators: Arc<Collaborators>,
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.init();

	let config = Config::from_env();

	let demo_user = User { id: "u1".to_string(), username: "demo".to_string() };
	let demo_note = Note { id: NoteId::from("demo"), alias: Some("demo-note".to_string()), owner_id: demo_user.id.clone() };

	let collaborators = Arc::new(Collaborators {
		sessions: Arc::new(InMemorySessions::new([("demo-session".to_string(), demo_user.username.clone())])),
		users: Arc::new(InMemoryUsers::new([demo_user.clone()])),
		notes: Arc::new(InMemoryNotes::new([demo_note.clone()])),
		permissions: Arc::new(OpenPermissions),
		storage: Arc::new(InMemoryStorage::new([(demo_note.id.clone(), String::new())])),
		registry: HubRegistry::new(),
		session_secret: config.session_secret.clone().into_bytes(),
		keepalive_period: Duration::from_secs(config.keepalive_secs),
	});

	let app = Router::new()
		.route("/realtime/", get(upgrade))
		.route("/realtime", get(upgrade))
		.with_state(AppState { collaborators });

	info!(addr = %config.listen_addr, "listening");
	let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
		Ok(listener) => listener,
		Err(err) => {
			error!(error = %err, "failed to bind listen address");
			return;
		}
	};
	if let Err(err) = axum::serve(listener, app).await {
		error!(error = %err, "server exited with error");
	}
}

async fn upgrade(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	headers: HeaderMap,
	ws: WebSocketUpgrade,
) -> impl IntoResponse {
	let request_path = uri.path_and_query().map_or_else(|| uri.path().to_string(), ToString::to_string);
	let cookie_header = headers.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()).map(ToString::to_string);

	ws.on_upgrade(move |socket| async move {
		let (sink, stream) = socket.split();
		let sink: Arc<dyn noted_crdt::TransportSink> = Arc::new(AxumSink::new(sink));
		let stream: Box<dyn noted_crdt::TransportStream> = Box::new(AxumStream::new(stream));

		if let Err(err) = admit(&state.collaborators, &request_path, cookie_header.as_deref(), sink, stream).await {
			error!(error = %err, "connection admission failed");
		}
	})
}

// vim: ts=4
