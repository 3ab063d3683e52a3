use std::time::Duration;

#[derive(Debug, Error)]
#[error("Bad service type {0:?} (expected `_name._proto`)")]
/// A service type string that cannot be browsed.
pub struct BadServiceTypeError(pub String);

#[derive(Debug, Error)]
/// A transport could not open, or lost, a browse or resolve session.
pub enum TransportError {
	#[error("I/O error: {0}")]
	/// An I/O error occurred on the transport's sockets
	IoError(#[from] std::io::Error),

	#[error("The transport session was closed")]
	/// The transport closed the session before producing a result
	Closed,

	#[error("{0}")]
	/// The transport cannot serve this request
	Unsupported(String),
}

#[derive(Debug, Error)]
/// Why a service instance could not be resolved.
pub enum ResolveError {
	#[error("Resolution timed out after {0:?}")]
	/// No answer arrived in time
	Timeout(Duration),

	#[error("{0}")]
	/// The transport reported an error
	Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
/// An error occurred while shutting down a [`Discovery`](crate::discovery::Discovery)
pub enum ShutdownError {
	#[error("I/O error: {0}")]
	/// The processing thread exited with an I/O error
	IoError(#[from] std::io::Error),

	#[error("Failed to join the processing thread")]
	/// The processing thread panicked
	ThreadJoinError(Box<dyn std::any::Any + Send + 'static>),
}
