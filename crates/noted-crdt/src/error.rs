//! Error handling subsystem. Implements a custom Error type covering the
//! handful of ways admission, framing, and transport can fail.

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Cookie missing/unsigned/unresolvable to a user, or the user lacks
	/// read access to the note.
	AdmissionDenied(String),
	/// A frame's tag or sub-frame could not be parsed.
	MalformedFrame(String),
	/// A handler raised while processing an otherwise well-formed frame.
	HandlerFault(String),
	/// I/O failure on the underlying transport.
	TransportFault(String),
	/// No pong received within the keep-alive window.
	KeepAliveTimeout,
	/// The initial-content loader failed while creating a hub.
	LoaderFault(String),
	/// An internal invariant was violated (mutex poisoning and the like).
	Internal(String),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::AdmissionDenied(msg) => write!(f, "admission denied: {msg}"),
			Error::MalformedFrame(msg) => write!(f, "malformed frame: {msg}"),
			Error::HandlerFault(msg) => write!(f, "handler fault: {msg}"),
			Error::TransportFault(msg) => write!(f, "transport fault: {msg}"),
			Error::KeepAliveTimeout => write!(f, "keep-alive timeout"),
			Error::LoaderFault(msg) => write!(f, "loader fault: {msg}"),
			Error::Internal(msg) => write!(f, "internal error: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

impl Clone for Error {
	fn clone(&self) -> Self {
		match self {
			Error::AdmissionDenied(m) => Error::AdmissionDenied(m.clone()),
			Error::MalformedFrame(m) => Error::MalformedFrame(m.clone()),
			Error::HandlerFault(m) => Error::HandlerFault(m.clone()),
			Error::TransportFault(m) => Error::TransportFault(m.clone()),
			Error::KeepAliveTimeout => Error::KeepAliveTimeout,
			Error::LoaderFault(m) => Error::LoaderFault(m.clone()),
			Error::Internal(m) => Error::Internal(m.clone()),
		}
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		tracing::warn!("tokio join error: {}", err);
		Error::Internal("task execution failed".into())
	}
}

/// Locks a mutex, converting poisoning into `Error::Internal` with context.
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $context:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("mutex poisoned: {}", $context)))
	};
}

// vim: ts=4
