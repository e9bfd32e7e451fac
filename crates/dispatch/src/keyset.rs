//! Immutable bitset over runtime dispatch keys.

use std::fmt;

use crate::key::{DispatchKey, NUM_RUNTIME_KEYS};

/// Returned when asking an empty set for its highest-priority member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("highest priority member requested from an empty key set")]
pub struct EmptyKeySet;

bitflags::bitflags! {
	/// A set of runtime dispatch keys. Bit `i` is the key with priority rank
	/// `i`, so the most significant set bit is the member that runs first.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct KeySet: u32 {
		const CPU = 1 << 0;
		const CUDA = 1 << 1;
		const XLA = 1 << 2;
		const META = 1 << 3;
		const BACKEND_SELECT = 1 << 4;
		const PYTHON = 1 << 5;
		const AD_INPLACE_OR_VIEW = 1 << 6;
		const AUTOGRAD_OTHER = 1 << 7;
		const AUTOGRAD_CPU = 1 << 8;
		const AUTOGRAD_CUDA = 1 << 9;
		const AUTOGRAD_XLA = 1 << 10;
		const AUTOGRAD_META = 1 << 11;
		const AUTOCAST_CPU = 1 << 12;
		const AUTOCAST_CUDA = 1 << 13;
		const PYTHON_TLS_SNAPSHOT = 1 << 14;
	}
}

impl KeySet {
	/// Every runtime key.
	pub const fn full() -> Self {
		Self::all()
	}

	/// Every runtime key at or below `key`'s priority. Non-runtime keys
	/// yield the empty set.
	pub const fn full_after(key: DispatchKey) -> Self {
		match key.index() {
			Some(idx) => Self::from_bits_truncate((1u32 << (idx + 1)) - 1),
			None => Self::empty(),
		}
	}

	pub const fn backends() -> Self {
		Self::CPU.union(Self::CUDA).union(Self::XLA).union(Self::META)
	}

	pub const fn autograd() -> Self {
		Self::AUTOGRAD_OTHER
			.union(Self::AUTOGRAD_CPU)
			.union(Self::AUTOGRAD_CUDA)
			.union(Self::AUTOGRAD_XLA)
			.union(Self::AUTOGRAD_META)
	}

	pub const fn autocast() -> Self {
		Self::AUTOCAST_CPU.union(Self::AUTOCAST_CUDA)
	}

	/// Whether every runtime key `key` stands for is a member. Always false
	/// for `Undefined`.
	pub const fn has(self, key: DispatchKey) -> bool {
		let keys = key.runtime_set();
		!keys.is_empty() && self.contains(keys)
	}

	/// Returns a copy with `key`'s runtime keys added.
	pub const fn add(self, key: DispatchKey) -> Self {
		self.union(key.runtime_set())
	}

	/// Returns a copy with `key`'s runtime keys removed.
	pub const fn remove_key(self, key: DispatchKey) -> Self {
		self.difference(key.runtime_set())
	}

	/// The member that runs first.
	pub const fn highest_priority_member(self) -> Result<DispatchKey, EmptyKeySet> {
		if self.is_empty() {
			return Err(EmptyKeySet);
		}
		let idx = (u32::BITS - 1 - self.bits().leading_zeros()) as usize;
		match DispatchKey::from_index(idx) {
			Some(key) => Ok(key),
			None => Err(EmptyKeySet),
		}
	}

	/// Members from highest to lowest priority.
	pub fn keys(self) -> impl Iterator<Item = DispatchKey> {
		(0..NUM_RUNTIME_KEYS)
			.rev()
			.filter(move |&idx| self.bits() & (1 << idx) != 0)
			.filter_map(DispatchKey::from_index)
	}
}

impl From<DispatchKey> for KeySet {
	fn from(key: DispatchKey) -> Self {
		key.runtime_set()
	}
}

impl FromIterator<DispatchKey> for KeySet {
	fn from_iter<I: IntoIterator<Item = DispatchKey>>(iter: I) -> Self {
		let mut set = KeySet::empty();
		for key in iter {
			set |= key.runtime_set();
		}
		set
	}
}

impl fmt::Display for KeySet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("DispatchKeySet(")?;
		for (i, key) in self.keys().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			write!(f, "{key}")?;
		}
		f.write_str(")")
	}
}

#[cfg(test)]
mod tests;
