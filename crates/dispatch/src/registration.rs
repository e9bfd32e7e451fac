//! Registration identities and retraction tokens.
//!
//! # Invariants
//!
//! - Every registration gets a process-unique [`RegistrationId`]; retraction
//!   only clears a slot that still holds that id.
//! - Releasing a token twice is a no-op.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::dispatcher::Inner;
use crate::entry::OperatorEntry;
use crate::kernel::Kernel;
use crate::key::DispatchKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(pub(crate) u64);

impl fmt::Display for RegistrationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// A kernel together with the registration that installed it.
#[derive(Clone)]
pub(crate) struct RegisteredKernel {
	pub id: RegistrationId,
	pub kernel: Kernel,
	/// Where the registration came from, e.g. `registered at lib.rs:12`.
	pub debug: Arc<str>,
}

impl RegisteredKernel {
	pub fn describe(&self) -> String {
		format!("{} [{}, {}]", self.kernel.label(), self.kernel.calling_convention(), self.debug)
	}
}

/// What a token retracts when released.
pub(crate) enum RegistrationTarget {
	Schema {
		entry: Arc<OperatorEntry>,
		id: RegistrationId,
	},
	Kernel {
		entry: Arc<OperatorEntry>,
		key: Option<DispatchKey>,
		id: RegistrationId,
	},
	Fallback {
		key: Option<DispatchKey>,
		id: RegistrationId,
	},
	Namespace {
		namespace: String,
		id: RegistrationId,
	},
}

impl RegistrationTarget {
	fn id(&self) -> RegistrationId {
		match self {
			Self::Schema { id, .. } | Self::Kernel { id, .. } | Self::Fallback { id, .. } | Self::Namespace { id, .. } => *id,
		}
	}
}

/// Owns one registration. Dropping or releasing the token retracts it.
#[must_use = "dropping a registration token retracts the registration"]
pub struct RegistrationToken {
	inner: Weak<Inner>,
	target: Option<RegistrationTarget>,
	id: RegistrationId,
}

impl RegistrationToken {
	pub(crate) fn new(inner: &Arc<Inner>, target: RegistrationTarget) -> Self {
		Self {
			inner: Arc::downgrade(inner),
			id: target.id(),
			target: Some(target),
		}
	}

	pub fn id(&self) -> RegistrationId {
		self.id
	}

	pub fn is_released(&self) -> bool {
		self.target.is_none()
	}

	/// Retracts the registration. Idempotent; a token whose dispatcher is
	/// gone releases trivially.
	pub fn release(&mut self) {
		let Some(target) = self.target.take() else {
			return;
		};
		match self.inner.upgrade() {
			Some(inner) => {
				let _epoch = inner.epoch.read();
				inner.retract(target);
			}
			None => tracing::trace!(id = %self.id, "registration outlived its dispatcher"),
		}
	}

	/// Retracts while the caller already holds the epoch lock exclusively.
	pub(crate) fn release_locked(&mut self, inner: &Inner) {
		if let Some(target) = self.target.take() {
			inner.retract(target);
		}
	}

	/// Gives up ownership without retracting.
	pub fn forget(mut self) {
		self.target = None;
	}
}

impl Drop for RegistrationToken {
	fn drop(&mut self) {
		self.release();
	}
}

impl fmt::Debug for RegistrationToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistrationToken")
			.field("id", &self.id)
			.field("released", &self.is_released())
			.finish()
	}
}
