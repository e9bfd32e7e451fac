//! The fixed dispatch key enumeration.
//!
//! # Role
//!
//! Keys are declared in ascending dispatch priority: a key declared later is
//! tried before every key declared earlier. Runtime keys occupy one bit each
//! in a [`KeySet`]; alias keys never appear in a set and instead expand to
//! the runtime keys they stand for.
//!
//! # Invariants
//!
//! - Declaration order is the priority order and never changes at runtime.
//! - Alias precedence is NOT derived from declaration order; it lives in
//!   [`crate::DispatcherConfig::alias_precedence`].

use serde::{Deserialize, Serialize};

use crate::KeySet;

/// Number of runtime (non-alias, non-`Undefined`) keys.
pub const NUM_RUNTIME_KEYS: usize = 15;

/// A named dispatch capability with a fixed priority position.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	strum_macros::Display,
	strum_macros::EnumString,
	strum_macros::EnumIter,
	strum_macros::IntoStaticStr,
)]
#[repr(u8)]
pub enum DispatchKey {
	/// Sentinel for "no key". Never a member of a set.
	Undefined = 0,

	// Backends, lowest priority.
	CPU = 1,
	CUDA = 2,
	XLA = 3,
	Meta = 4,

	BackendSelect = 5,
	Python = 6,
	ADInplaceOrView = 7,

	AutogradOther = 8,
	AutogradCPU = 9,
	AutogradCUDA = 10,
	AutogradXLA = 11,
	AutogradMeta = 12,

	AutocastCPU = 13,
	AutocastCUDA = 14,

	PythonTLSSnapshot = 15,

	// Aliases.
	/// Every dense-storage backend.
	Dense = 16,
	/// Every backend; the kernel does its own autograd handling.
	CompositeExplicitAutograd = 17,
	/// Every backend and every autograd key.
	CompositeImplicitAutograd = 18,
	/// Every autograd key.
	Autograd = 19,
}

impl DispatchKey {
	/// Runtime keys in ascending priority order.
	pub const RUNTIME: [DispatchKey; NUM_RUNTIME_KEYS] = [
		Self::CPU,
		Self::CUDA,
		Self::XLA,
		Self::Meta,
		Self::BackendSelect,
		Self::Python,
		Self::ADInplaceOrView,
		Self::AutogradOther,
		Self::AutogradCPU,
		Self::AutogradCUDA,
		Self::AutogradXLA,
		Self::AutogradMeta,
		Self::AutocastCPU,
		Self::AutocastCUDA,
		Self::PythonTLSSnapshot,
	];

	pub const ALIASES: [DispatchKey; 4] = [
		Self::Dense,
		Self::CompositeExplicitAutograd,
		Self::CompositeImplicitAutograd,
		Self::Autograd,
	];

	pub const BACKENDS: [DispatchKey; 4] = [Self::CPU, Self::CUDA, Self::XLA, Self::Meta];

	pub const fn is_alias(self) -> bool {
		matches!(
			self,
			Self::Dense | Self::CompositeExplicitAutograd | Self::CompositeImplicitAutograd | Self::Autograd
		)
	}

	pub const fn is_runtime(self) -> bool {
		!self.is_alias() && !matches!(self, Self::Undefined)
	}

	pub const fn is_backend(self) -> bool {
		matches!(self, Self::CPU | Self::CUDA | Self::XLA | Self::Meta)
	}

	pub const fn is_autograd(self) -> bool {
		matches!(
			self,
			Self::AutogradOther | Self::AutogradCPU | Self::AutogradCUDA | Self::AutogradXLA | Self::AutogradMeta
		)
	}

	/// Bit position of a runtime key inside a [`KeySet`], which is also its
	/// priority rank (higher runs first).
	pub const fn index(self) -> Option<usize> {
		if self.is_runtime() { Some(self as usize - 1) } else { None }
	}

	/// Inverse of [`Self::index`].
	pub const fn from_index(index: usize) -> Option<Self> {
		if index < NUM_RUNTIME_KEYS { Some(Self::RUNTIME[index]) } else { None }
	}

	/// Runtime keys this key stands for: itself for a runtime key, its
	/// expansion for an alias, nothing for `Undefined`.
	pub const fn runtime_set(self) -> KeySet {
		match self {
			Self::Undefined => KeySet::empty(),
			Self::CPU => KeySet::CPU,
			Self::CUDA => KeySet::CUDA,
			Self::XLA => KeySet::XLA,
			Self::Meta => KeySet::META,
			Self::BackendSelect => KeySet::BACKEND_SELECT,
			Self::Python => KeySet::PYTHON,
			Self::ADInplaceOrView => KeySet::AD_INPLACE_OR_VIEW,
			Self::AutogradOther => KeySet::AUTOGRAD_OTHER,
			Self::AutogradCPU => KeySet::AUTOGRAD_CPU,
			Self::AutogradCUDA => KeySet::AUTOGRAD_CUDA,
			Self::AutogradXLA => KeySet::AUTOGRAD_XLA,
			Self::AutogradMeta => KeySet::AUTOGRAD_META,
			Self::AutocastCPU => KeySet::AUTOCAST_CPU,
			Self::AutocastCUDA => KeySet::AUTOCAST_CUDA,
			Self::PythonTLSSnapshot => KeySet::PYTHON_TLS_SNAPSHOT,
			Self::Dense => KeySet::CPU.union(KeySet::CUDA).union(KeySet::XLA),
			Self::CompositeExplicitAutograd => KeySet::backends(),
			Self::CompositeImplicitAutograd => KeySet::backends().union(KeySet::autograd()),
			Self::Autograd => KeySet::autograd(),
		}
	}

	/// Autograd key layered over `backend`, or `AutogradOther` for keys that
	/// have no dedicated autograd key.
	pub const fn autograd_key_for(backend: DispatchKey) -> DispatchKey {
		match backend {
			Self::CPU => Self::AutogradCPU,
			Self::CUDA => Self::AutogradCUDA,
			Self::XLA => Self::AutogradXLA,
			Self::Meta => Self::AutogradMeta,
			_ => Self::AutogradOther,
		}
	}

	pub fn name(self) -> &'static str {
		self.into()
	}
}

/// Number of backend keys.
pub const fn num_backends() -> usize {
	DispatchKey::BACKENDS.len()
}

/// Parses a key by its stable name.
pub fn parse_dispatch_key(name: &str) -> Result<DispatchKey, crate::DispatchError> {
	name.parse().map_err(|_| crate::DispatchError::UnknownDispatchKey(name.to_string()))
}

/// Iterates every key, runtime and alias, in declaration order.
pub fn all_keys() -> impl Iterator<Item = DispatchKey> {
	<DispatchKey as strum::IntoEnumIterator>::iter()
}
