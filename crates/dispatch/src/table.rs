//! Computed dispatch tables.
//!
//! # Role
//!
//! A [`ComputedTable`] is the resolved view of one operator: for every
//! runtime key, the kernel that runs there after alias expansion and
//! fallback. Tables are immutable once built and are published by swapping
//! an `Arc`, so readers never observe a partially updated table.
//!
//! # Invariants
//!
//! - A table is only served while its [`Stamp`] equals the current
//!   generation of its operator and of the process fallbacks.
//! - Resolution order per key: direct, alias (configured precedence),
//!   operator catch-all, backend fallback, global fallback, missing.

use std::fmt;

use crate::key::{DispatchKey, NUM_RUNTIME_KEYS};
use crate::keyset::KeySet;
use crate::registration::{RegisteredKernel, RegistrationId};

/// Generations a table was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Stamp {
	pub entry: u64,
	pub fallbacks: u64,
}

/// Where a computed slot's kernel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotSource {
	Direct,
	Alias(DispatchKey),
	CatchAll,
	BackendFallback,
	GlobalFallback,
}

impl fmt::Display for SlotSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Direct => f.write_str("kernel"),
			Self::Alias(alias) => write!(f, "{alias} kernel"),
			Self::CatchAll => f.write_str("catch-all kernel"),
			Self::BackendFallback => f.write_str("backend fallback"),
			Self::GlobalFallback => f.write_str("global fallback"),
		}
	}
}

#[derive(Clone)]
pub(crate) struct ComputedSlot {
	pub kernel: RegisteredKernel,
	pub source: SlotSource,
}

/// Process-wide fallbacks, one per runtime key plus a global catch-all.
#[derive(Clone, Default)]
pub(crate) struct FallbackSlots {
	pub per_key: [Option<RegisteredKernel>; NUM_RUNTIME_KEYS],
	pub catch_all: Option<RegisteredKernel>,
}

impl FallbackSlots {
	pub fn slot(&self, key: Option<DispatchKey>) -> Option<&RegisteredKernel> {
		match key {
			Some(key) => key.index().and_then(|idx| self.per_key[idx].as_ref()),
			None => self.catch_all.as_ref(),
		}
	}

	pub fn slot_mut(&mut self, key: Option<DispatchKey>) -> Option<&mut Option<RegisteredKernel>> {
		match key {
			Some(key) => key.index().map(|idx| &mut self.per_key[idx]),
			None => Some(&mut self.catch_all),
		}
	}

	pub fn is_live(&self, id: RegistrationId) -> bool {
		self.per_key.iter().chain(std::iter::once(&self.catch_all)).flatten().any(|k| k.id == id)
	}
}

/// Direct registrations of one operator, as seen by the resolver.
pub(crate) struct Registrations<'a> {
	pub direct: &'a rustc_hash::FxHashMap<DispatchKey, RegisteredKernel>,
	pub catch_all: Option<&'a RegisteredKernel>,
}

pub(crate) struct ComputedTable {
	pub slots: [Option<ComputedSlot>; NUM_RUNTIME_KEYS],
	/// Keys whose resolved kernel is a fallthrough marker.
	pub fallthrough: KeySet,
	pub stamp: Stamp,
}

impl ComputedTable {
	/// A table that resolves nothing and never matches a live stamp.
	pub fn unresolved() -> Self {
		Self {
			slots: Default::default(),
			fallthrough: KeySet::empty(),
			stamp: Stamp {
				entry: u64::MAX,
				fallbacks: u64::MAX,
			},
		}
	}

	pub fn compute(regs: &Registrations<'_>, fallbacks: &FallbackSlots, precedence: &[DispatchKey], stamp: Stamp) -> Self {
		let mut slots: [Option<ComputedSlot>; NUM_RUNTIME_KEYS] = Default::default();
		let mut fallthrough = KeySet::empty();

		for (idx, key) in DispatchKey::RUNTIME.into_iter().enumerate() {
			let slot = resolve(key, regs, fallbacks, precedence);
			if let Some(slot) = &slot {
				if slot.kernel.kernel.is_fallthrough() {
					fallthrough = fallthrough.add(key);
				}
			}
			slots[idx] = slot;
		}

		Self { slots, fallthrough, stamp }
	}

	pub fn slot(&self, key: DispatchKey) -> Option<&ComputedSlot> {
		key.index().and_then(|idx| self.slots[idx].as_ref())
	}

	/// Value view for comparisons and diagnostics.
	pub fn view(&self) -> ComputedTableView {
		ComputedTableView {
			entries: DispatchKey::RUNTIME
				.into_iter()
				.filter_map(|key| {
					self.slot(key).map(|slot| ComputedEntry {
						key,
						id: slot.kernel.id,
						label: slot.kernel.kernel.label().to_string(),
						source: slot.source,
						fallthrough: slot.kernel.kernel.is_fallthrough(),
					})
				})
				.collect(),
		}
	}
}

fn resolve(key: DispatchKey, regs: &Registrations<'_>, fallbacks: &FallbackSlots, precedence: &[DispatchKey]) -> Option<ComputedSlot> {
	if let Some(kernel) = regs.direct.get(&key) {
		return Some(ComputedSlot {
			kernel: kernel.clone(),
			source: SlotSource::Direct,
		});
	}

	for &alias in precedence {
		if !alias.runtime_set().has(key) {
			continue;
		}
		if let Some(kernel) = regs.direct.get(&alias) {
			return Some(ComputedSlot {
				kernel: kernel.clone(),
				source: SlotSource::Alias(alias),
			});
		}
	}

	if let Some(kernel) = regs.catch_all {
		return Some(ComputedSlot {
			kernel: kernel.clone(),
			source: SlotSource::CatchAll,
		});
	}

	if let Some(kernel) = fallbacks.slot(Some(key)) {
		return Some(ComputedSlot {
			kernel: kernel.clone(),
			source: SlotSource::BackendFallback,
		});
	}

	fallbacks.catch_all.as_ref().map(|kernel| ComputedSlot {
		kernel: kernel.clone(),
		source: SlotSource::GlobalFallback,
	})
}

/// One resolved slot of a [`ComputedTableView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedEntry {
	pub key: DispatchKey,
	pub id: RegistrationId,
	pub label: String,
	pub source: SlotSource,
	pub fallthrough: bool,
}

/// Owned, comparable snapshot of an operator's computed table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComputedTableView {
	pub entries: Vec<ComputedEntry>,
}

impl ComputedTableView {
	pub fn get(&self, key: DispatchKey) -> Option<&ComputedEntry> {
		self.entries.iter().find(|e| e.key == key)
	}
}

impl fmt::Display for ComputedTableView {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for entry in &self.entries {
			write!(f, "{}: {} [{}]", entry.key, entry.label, entry.source)?;
			if entry.fallthrough {
				f.write_str(" (fallthrough)")?;
			}
			writeln!(f)?;
		}
		Ok(())
	}
}
