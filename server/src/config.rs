//! Process configuration, read from the environment at startup.

pub struct Config {
	pub listen_addr: String,
	pub keepalive_secs: u64,
	pub session_secret: String,
}

impl Config {
	pub fn from_env() -> Self {
		Self {
			listen_addr: std::env::var("REALTIME_LISTEN").unwrap_or_else(|_| "0.0.0.0:4000".to_string()),
			keepalive_secs: std::env::var("REALTIME_KEEPALIVE_SECS")
				.ok()
				.and_then(|v| v.parse().ok())
				.unwrap_or(noted_crdt::DEFAULT_INTERVAL.as_secs()),
			session_secret: std::env::var("REALTIME_SESSION_SECRET")
				.unwrap_or_else(|_| "dev-only-insecure-secret".to_string()),
		}
	}
}

// vim: ts=4
