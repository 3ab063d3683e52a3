use super::{Command, Message};
use crate::{
	errors::{BadServiceTypeError, ShutdownError},
	service::validate_service_type,
	tree::DiscoveryTree,
};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot};

pub(super) struct DiscoveryHandleInner {
	pub(super) mailbox: mpsc::UnboundedSender<Message>,
	pub(super) tree: Arc<RwLock<DiscoveryTree>>,
	pub(super) thread: std::thread::JoinHandle<Result<(), std::io::Error>>,
	pub(super) shutdown_tx: oneshot::Sender<()>,
}

pub(super) struct DiscoveryHandleDrop(pub(super) Option<DiscoveryHandleInner>);
impl DiscoveryHandleDrop {
	fn shutdown(&mut self) -> Result<(), ShutdownError> {
		let DiscoveryHandleInner { thread, shutdown_tx, .. } = match self.0.take() {
			Some(inner) => inner,
			None => return Ok(()),
		};

		if !thread.is_finished() {
			shutdown_tx.send(()).ok();
		}

		match thread.join() {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(err)) => Err(ShutdownError::IoError(err)),
			Err(err) => Err(ShutdownError::ThreadJoinError(err)),
		}
	}
}
impl Drop for DiscoveryHandleDrop {
	fn drop(&mut self) {
		match self.shutdown() {
			Err(ShutdownError::ThreadJoinError(err)) if !std::thread::panicking() => std::panic::resume_unwind(err),
			Err(err) => error!("Discovery did not shut down cleanly: {err}"),
			Ok(()) => {}
		}
	}
}

/// Controls a [`Discovery`](super::Discovery) running in the background. Dropping the handle shuts it down.
///
/// Commands are queued to the processing thread and take effect in order; they return immediately.
///
/// Cancellation happens when the processing thread reaches the command, not when the call returns. Events
/// already queued ahead of a `stop*` command are still applied and may still call the handler; nothing
/// from a cancelled session is applied after it.
pub struct DiscoveryHandle(pub(super) DiscoveryHandleDrop);
impl DiscoveryHandle {
	#[inline(always)]
	fn inner(&self) -> Option<&DiscoveryHandleInner> {
		self.0 .0.as_ref()
	}

	fn send(&self, command: Command) {
		let Some(inner) = self.inner() else {
			return;
		};

		if inner.mailbox.send(Message::Command(command)).is_err() {
			debug!("Discovery is no longer running");
		}
	}

	/// Starts (or restarts) service type enumeration.
	pub fn start(&self) {
		self.send(Command::Start)
	}

	/// Stops type enumeration and every browse session, and clears the tree. Safe to call when not started.
	///
	/// Takes effect once the processing thread reaches it; see [`DiscoveryHandle`].
	pub fn stop(&self) {
		self.send(Command::Stop)
	}

	/// Browses one fully-qualified service type, such as `_http._tcp`, replacing any session already open for it.
	pub fn start_browsing(&self, service_type: &str) -> Result<(), BadServiceTypeError> {
		let service_type = validate_service_type(service_type)?;
		self.send(Command::StartBrowsing(service_type));
		Ok(())
	}

	/// Stops browsing one service type and removes its node from the tree, once the processing thread
	/// reaches the command.
	pub fn stop_browsing(&self, service_type: &str) -> Result<(), BadServiceTypeError> {
		let service_type = validate_service_type(service_type)?;
		self.send(Command::StopBrowsing(service_type));
		Ok(())
	}

	/// Stops every browse session, once the processing thread reaches the command. Type enumeration keeps
	/// running.
	pub fn stop_all(&self) {
		self.send(Command::StopAll)
	}

	/// A copy of the current tree.
	pub fn snapshot(&self) -> DiscoveryTree {
		self.inner()
			.map(|inner| inner.tree.read().unwrap_or_else(PoisonError::into_inner).clone())
			.unwrap_or_default()
	}

	/// Stops discovery and joins the processing thread.
	pub fn shutdown(mut self) -> Result<(), ShutdownError> {
		self.0.shutdown()
	}
}
