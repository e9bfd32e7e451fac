//! Per-operator state.
//!
//! # Role
//!
//! An [`OperatorEntry`] owns the schema (if any), the direct kernel
//! registrations keyed by dispatch key, the operator's catch-all kernel, and
//! a lazily recomputed [`ComputedTable`].
//!
//! # Concurrency
//!
//! - Mutations and recomputation hold `state`; unrelated operators never
//!   contend on it.
//! - Lookups load `computed` without locking and only take `state` when the
//!   loaded table is stale.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use switchyard_schema::{FunctionSchema, OperatorName};

use crate::check::{Violation, ViolationKind};
use crate::dispatcher::Inner;
use crate::error::DispatchError;
use crate::kernel::Kernel;
use crate::key::DispatchKey;
use crate::keyset::KeySet;
use crate::registration::{RegisteredKernel, RegistrationId};
use crate::table::{ComputedTable, ComputedTableView, Registrations, Stamp};
use crate::tls;

struct SchemaRecord {
	schema: FunctionSchema,
	debug: Arc<str>,
	/// Definitions sharing this schema; it is removed when the last one goes.
	owners: Vec<RegistrationId>,
}

#[derive(Default)]
struct EntryState {
	schema: Option<SchemaRecord>,
	kernels: FxHashMap<DispatchKey, RegisteredKernel>,
	catch_all: Option<RegisteredKernel>,
}

impl EntryState {
	fn registrations(&self) -> Registrations<'_> {
		Registrations {
			direct: &self.kernels,
			catch_all: self.catch_all.as_ref(),
		}
	}

	fn has_kernels(&self) -> bool {
		!self.kernels.is_empty() || self.catch_all.is_some()
	}

	fn is_live_kernel(&self, id: RegistrationId) -> bool {
		self.kernels.values().chain(self.catch_all.as_ref()).any(|k| k.id == id)
	}

	/// Kernels in a stable order: keyed ones by key, then the catch-all.
	fn sorted_kernels(&self) -> Vec<(Option<DispatchKey>, &RegisteredKernel)> {
		let mut out: Vec<_> = self.kernels.iter().map(|(k, v)| (Some(*k), v)).collect();
		out.sort_by_key(|(k, _)| *k);
		out.extend(self.catch_all.as_ref().map(|k| (None, k)));
		out
	}
}

pub(crate) struct OperatorEntry {
	name: OperatorName,
	state: Mutex<EntryState>,
	generation: AtomicU64,
	computed: ArcSwap<ComputedTable>,
}

impl OperatorEntry {
	pub fn new(name: OperatorName) -> Self {
		Self {
			name,
			state: Mutex::new(EntryState::default()),
			generation: AtomicU64::new(0),
			computed: ArcSwap::from_pointee(ComputedTable::unresolved()),
		}
	}

	pub fn name(&self) -> &OperatorName {
		&self.name
	}

	fn invalidate(&self) {
		self.generation.fetch_add(1, Ordering::AcqRel);
	}

	fn stamp(&self, inner: &Inner) -> Stamp {
		Stamp {
			entry: self.generation.load(Ordering::Acquire),
			fallbacks: inner.fallback_generation(),
		}
	}

	pub fn schema(&self) -> Option<FunctionSchema> {
		self.state.lock().schema.as_ref().map(|r| r.schema.clone())
	}

	pub fn has_schema(&self) -> bool {
		self.state.lock().schema.is_some()
	}

	/// An entry is visible to name lookups while it has a schema or kernels.
	pub fn is_live(&self) -> bool {
		let state = self.state.lock();
		state.schema.is_some() || state.has_kernels()
	}

	pub fn is_dangling(&self) -> bool {
		let state = self.state.lock();
		state.schema.is_none() && state.has_kernels()
	}

	pub fn define_schema(&self, schema: FunctionSchema, id: RegistrationId, debug: Arc<str>) -> Result<(), DispatchError> {
		let mut state = self.state.lock();
		if let Some(existing) = &state.schema {
			if existing.schema != schema {
				return Err(DispatchError::SchemaConflict {
					name: self.name.clone(),
					existing: existing.schema.to_string(),
					incoming: schema.to_string(),
				});
			}
		}
		if let Some(existing) = state.schema.as_mut() {
			existing.owners.push(id);
		} else {
			if let Some((key, kernel)) = find_arity_mismatch(&state, &schema) {
				tracing::warn!(
					op = %self.name,
					key = ?key,
					kernel = kernel.kernel.label(),
					"schema arrived with a kernel of different arity already registered"
				);
			}
			state.schema = Some(SchemaRecord {
				schema,
				debug,
				owners: vec![id],
			});
		}
		self.invalidate();
		Ok(())
	}

	pub fn remove_schema(&self, id: RegistrationId) -> bool {
		let mut state = self.state.lock();
		let Some(record) = &mut state.schema else {
			return false;
		};
		let Some(pos) = record.owners.iter().position(|o| *o == id) else {
			return false;
		};
		record.owners.swap_remove(pos);
		if record.owners.is_empty() {
			state.schema = None;
		}
		self.invalidate();
		true
	}

	pub fn register_kernel(&self, key: Option<DispatchKey>, kernel: RegisteredKernel) -> Result<(), DispatchError> {
		if key == Some(DispatchKey::Undefined) {
			return Err(DispatchError::NotAConcreteKey {
				key: DispatchKey::Undefined,
			});
		}

		let mut state = self.state.lock();
		if let (Some(record), Some((args, rets))) = (&state.schema, kernel.kernel.arity()) {
			let schema = &record.schema;
			if args != schema.num_arguments() || rets != schema.num_returns() {
				return Err(DispatchError::SignatureMismatch {
					name: self.name.clone(),
					detail: format!(
						"kernel `{}` takes {args} and returns {rets} values, schema `{schema}` declares {} and {}",
						kernel.kernel.label(),
						schema.num_arguments(),
						schema.num_returns()
					),
				});
			}
		}

		let slot = match key {
			Some(key) => state.kernels.get(&key),
			None => state.catch_all.as_ref(),
		};
		if let Some(existing) = slot {
			return Err(DispatchError::DuplicateRegistration {
				target: self.name.to_string(),
				key,
				existing: existing.describe(),
			});
		}

		match key {
			Some(key) => {
				state.kernels.insert(key, kernel);
			}
			None => state.catch_all = Some(kernel),
		}
		self.invalidate();
		Ok(())
	}

	pub fn remove_kernel(&self, key: Option<DispatchKey>, id: RegistrationId) -> bool {
		let mut state = self.state.lock();
		let removed = match key {
			Some(key) => state.kernels.get(&key).is_some_and(|k| k.id == id) && state.kernels.remove(&key).is_some(),
			None => state.catch_all.as_ref().is_some_and(|k| k.id == id) && state.catch_all.take().is_some(),
		};
		if removed {
			self.invalidate();
		}
		removed
	}

	/// Returns a computed table that is current for this operator and the
	/// process fallbacks, recomputing it if needed.
	pub fn computed(&self, inner: &Inner) -> Arc<ComputedTable> {
		let table = self.computed.load_full();
		if table.stamp == self.stamp(inner) {
			return table;
		}

		let state = self.state.lock();
		let stamp = self.stamp(inner);
		let table = self.computed.load_full();
		if table.stamp == stamp {
			return table;
		}
		let fresh = Arc::new(self.compute_locked(&state, inner, stamp));
		tracing::trace!(
			registry = %inner.config.label,
			op = %self.name,
			entry_generation = stamp.entry,
			fallback_generation = stamp.fallbacks,
			"recomputed dispatch table"
		);
		self.computed.store(Arc::clone(&fresh));
		fresh
	}

	fn compute_locked(&self, state: &EntryState, inner: &Inner, stamp: Stamp) -> ComputedTable {
		let fallbacks = inner.fallbacks_snapshot();
		ComputedTable::compute(&state.registrations(), &fallbacks, &inner.config.alias_precedence, stamp)
	}

	/// Hot path: resolves the kernel for `active` under the calling thread's
	/// include/exclude sets.
	pub fn lookup(&self, inner: &Inner, active: KeySet) -> Result<Kernel, DispatchError> {
		let local = tls::tls_local_key_set();
		let target = active.intersection(local.included).difference(local.excluded);
		if target.is_empty() {
			return Err(DispatchError::NoApplicableKey {
				name: self.name.clone(),
				active,
			});
		}

		let table = self.computed(inner);
		let eligible = target.difference(table.fallthrough);
		let key = match eligible.highest_priority_member() {
			Ok(key) => key,
			Err(_) => {
				return Err(DispatchError::MissingKernel {
					name: self.name.clone(),
					key: target.keys().last().unwrap_or(DispatchKey::Undefined),
				});
			}
		};

		match table.slot(key) {
			Some(slot) => Ok(slot.kernel.kernel.clone()),
			None => Err(DispatchError::MissingKernel {
				name: self.name.clone(),
				key,
			}),
		}
	}

	pub fn has_kernel_for_key(&self, key: DispatchKey) -> bool {
		self.state.lock().kernels.contains_key(&key)
	}

	pub fn has_computed_kernel_for_key(&self, inner: &Inner, key: DispatchKey) -> bool {
		let table = self.computed(inner);
		key.runtime_set().keys().any(|k| table.slot(k).is_some())
	}

	/// Keys with a direct registration, alias keys included.
	pub fn registered_keys(&self) -> Vec<DispatchKey> {
		let mut keys: Vec<_> = self.state.lock().kernels.keys().copied().collect();
		keys.sort();
		keys
	}

	pub fn computed_view(&self, inner: &Inner) -> ComputedTableView {
		self.computed(inner).view()
	}

	pub fn dump_state(&self) -> String {
		let state = self.state.lock();
		let mut out = String::new();
		let _ = writeln!(out, "name: {}", self.name);
		match &state.schema {
			Some(record) => {
				let _ = writeln!(out, "schema: {}", record.schema);
				let _ = writeln!(out, "debug: {}", record.debug);
				let _ = writeln!(out, "alias analysis kind: {}", record.schema.alias_analysis);
			}
			None => {
				let _ = writeln!(out, "schema: (none)");
			}
		}
		for (key, kernel) in state.sorted_kernels() {
			match key {
				Some(key) if key.is_alias() => {
					let _ = write!(out, "{key}[alias]: ");
				}
				Some(key) => {
					let _ = write!(out, "{key}: ");
				}
				None => out.push_str("catchall: "),
			}
			let _ = writeln!(out, "{}", kernel.describe());
		}
		out
	}

	pub fn dump_computed_table(&self, inner: &Inner) -> String {
		self.computed_view(inner).to_string()
	}

	/// Verifies the cached table against the live registrations. A stale
	/// cache is not a violation; it is never served.
	pub fn check_invariants(&self, inner: &Inner) -> Vec<Violation> {
		let state = self.state.lock();
		let stamp = self.stamp(inner);
		let fallbacks = inner.fallbacks_snapshot();
		let fresh = ComputedTable::compute(&state.registrations(), &fallbacks, &inner.config.alias_precedence, stamp);
		let mut violations = Vec::new();
		let mut push = |kind| {
			violations.push(Violation {
				operator: Some(self.name.clone()),
				kind,
			})
		};

		let cached = self.computed.load_full();
		if cached.stamp == stamp {
			for key in DispatchKey::RUNTIME {
				let cached_slot = cached.slot(key);
				if let Some(slot) = cached_slot {
					let id = slot.kernel.id;
					if !state.is_live_kernel(id) && !fallbacks.is_live(id) {
						push(ViolationKind::RetractedKernel {
							key,
							id,
							label: slot.kernel.kernel.label().to_string(),
						});
					}
				}
				let expected = fresh.slot(key).map(|s| s.kernel.id);
				let found = cached_slot.map(|s| s.kernel.id);
				if expected != found {
					push(ViolationKind::SlotMismatch { key, expected, found });
				}
			}
		}

		for (&alias, _) in state.kernels.iter().filter(|(k, _)| k.is_alias()) {
			if inner.config.precedence_rank(alias).is_none() {
				push(ViolationKind::UnrankedAlias { alias });
			}
			for key in alias.runtime_set().keys() {
				if fresh.slot(key).is_none() {
					push(ViolationKind::UnresolvedAlias { alias, key });
				}
			}
		}

		for key in DispatchKey::RUNTIME {
			let claimants: Vec<DispatchKey> = state
				.kernels
				.keys()
				.copied()
				.filter(|k| k.is_alias() && k.runtime_set().has(key))
				.collect();
			if claimants.len() > 1 && claimants.iter().any(|a| inner.config.precedence_rank(*a).is_none()) {
				push(ViolationKind::AmbiguousAlias { key, aliases: claimants });
			}
		}

		if let Some(record) = &state.schema {
			if let Some((key, kernel)) = find_arity_mismatch(&state, &record.schema) {
				let (args, rets) = kernel.kernel.arity().unwrap_or_default();
				push(ViolationKind::ArityMismatch {
					key,
					label: kernel.kernel.label().to_string(),
					kernel: (args, rets),
					schema: (record.schema.num_arguments(), record.schema.num_returns()),
				});
			}
		}

		violations
	}
}

fn find_arity_mismatch<'a>(state: &'a EntryState, schema: &FunctionSchema) -> Option<(Option<DispatchKey>, &'a RegisteredKernel)> {
	state.sorted_kernels().into_iter().find(|(_, k)| {
		k.kernel
			.arity()
			.is_some_and(|(args, rets)| args != schema.num_arguments() || rets != schema.num_returns())
	})
}
