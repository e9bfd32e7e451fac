//! Per-thread include/exclude key sets.
//!
//! # Role
//!
//! Every lookup intersects the active key set with the thread's `included`
//! set and removes its `excluded` set. Threads start with everything
//! included and nothing excluded. Scoped guards change the state and put
//! back the exact prior value when dropped, including during unwinding.
//!
//! # Invariants
//!
//! - Guards are `!Send`: a guard restores the thread it was created on.
//! - Nested guards restore in reverse order of creation.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::key::DispatchKey;
use crate::keyset::KeySet;

/// The calling thread's key state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDispatchKeySet {
	pub included: KeySet,
	pub excluded: KeySet,
}

impl Default for LocalDispatchKeySet {
	fn default() -> Self {
		Self {
			included: KeySet::full(),
			excluded: KeySet::empty(),
		}
	}
}

thread_local! {
	static LOCAL: Cell<LocalDispatchKeySet> = Cell::new(LocalDispatchKeySet::default());
}

pub fn tls_local_key_set() -> LocalDispatchKeySet {
	LOCAL.with(Cell::get)
}

fn replace_local(f: impl FnOnce(LocalDispatchKeySet) -> LocalDispatchKeySet) -> LocalDispatchKeySet {
	LOCAL.with(|cell| {
		let prev = cell.get();
		cell.set(f(prev));
		prev
	})
}

/// Adds or removes one key from the excluded set, unscoped.
pub fn tls_set_dispatch_key_excluded(key: DispatchKey, excluded: bool) {
	replace_local(|mut local| {
		local.excluded = if excluded {
			local.excluded | key.runtime_set()
		} else {
			local.excluded - key.runtime_set()
		};
		local
	});
}

pub fn tls_is_dispatch_key_excluded(key: DispatchKey) -> bool {
	tls_local_key_set().excluded.has(key)
}

type NotSend = PhantomData<*const ()>;

/// Excludes a key set for the guard's scope.
#[must_use = "the keys are re-included as soon as the guard is dropped"]
pub struct ExcludeKeysGuard {
	prev: KeySet,
	_not_send: NotSend,
}

impl ExcludeKeysGuard {
	pub fn new(keys: KeySet) -> Self {
		let prev = replace_local(|mut local| {
			local.excluded |= keys;
			local
		});
		Self {
			prev: prev.excluded,
			_not_send: PhantomData,
		}
	}
}

impl Drop for ExcludeKeysGuard {
	fn drop(&mut self) {
		let prev = self.prev;
		replace_local(|local| LocalDispatchKeySet { excluded: prev, ..local });
	}
}

/// Restricts the included set to `keys` for the guard's scope.
#[must_use = "the restriction ends as soon as the guard is dropped"]
pub struct RestrictKeysGuard {
	prev: KeySet,
	_not_send: NotSend,
}

impl RestrictKeysGuard {
	pub fn new(keys: KeySet) -> Self {
		let prev = replace_local(|mut local| {
			local.included &= keys;
			local
		});
		Self {
			prev: prev.included,
			_not_send: PhantomData,
		}
	}
}

impl Drop for RestrictKeysGuard {
	fn drop(&mut self) {
		let prev = self.prev;
		replace_local(|local| LocalDispatchKeySet { included: prev, ..local });
	}
}

/// Skips every autograd key for the guard's scope.
#[must_use = "autograd keys are re-enabled as soon as the guard is dropped"]
pub struct BelowAutogradGuard {
	_exclude: ExcludeKeysGuard,
}

impl BelowAutogradGuard {
	pub fn new() -> Self {
		Self {
			_exclude: ExcludeKeysGuard::new(KeySet::autograd()),
		}
	}
}

impl Default for BelowAutogradGuard {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests;
