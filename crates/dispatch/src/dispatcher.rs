//! The operator registry.
//!
//! # Role
//!
//! A [`Dispatcher`] maps operator identities to their entries, owns the
//! process fallbacks, and hands out [`RegistrationToken`]s for everything it
//! records. Handles ([`OperatorHandle`]) are cheap clones that pin an entry.
//!
//! # Concurrency
//!
//! - The operator map is an immutable snapshot behind [`ArcSwap`]; inserting
//!   an operator publishes a new map with a compare-and-swap loop. Entries
//!   are never removed, so handles stay valid for the dispatcher's lifetime.
//! - Fallbacks are edited under a mutex, then published as a snapshot; the
//!   fallback generation is bumped after publication.
//! - `epoch` orders whole-registry operations: single mutations hold it
//!   shared, session close and invariant checks hold it exclusively so they
//!   never observe a half-retracted session.
//!
//! # Invariants
//!
//! - Lookups take no lock unless the operator's cached table is stale.
//! - Mutations of different operators never contend on the same lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use switchyard_schema::{FunctionSchema, OperatorName};

use crate::check::InvariantReport;
use crate::config::{ConfigError, DispatcherConfig};
use crate::entry::OperatorEntry;
use crate::error::DispatchError;
use crate::handle::OperatorHandle;
use crate::kernel::Kernel;
use crate::key::DispatchKey;
use crate::keyset::KeySet;
use crate::library::SourceLocation;
use crate::registration::{RegisteredKernel, RegistrationId, RegistrationTarget, RegistrationToken};
use crate::table::FallbackSlots;

type OperatorMap = FxHashMap<OperatorName, Arc<OperatorEntry>>;

struct NamespaceClaim {
	id: RegistrationId,
	location: SourceLocation,
}

pub(crate) struct Inner {
	pub config: DispatcherConfig,
	operators: ArcSwap<OperatorMap>,
	fallbacks: Mutex<FallbackSlots>,
	published_fallbacks: ArcSwap<FallbackSlots>,
	fallback_generation: AtomicU64,
	pub epoch: RwLock<()>,
	next_id: AtomicU64,
	namespaces: Mutex<FxHashMap<String, NamespaceClaim>>,
}

impl Inner {
	pub fn new(config: DispatcherConfig) -> Self {
		Self {
			config,
			operators: ArcSwap::from_pointee(OperatorMap::default()),
			fallbacks: Mutex::new(FallbackSlots::default()),
			published_fallbacks: ArcSwap::from_pointee(FallbackSlots::default()),
			fallback_generation: AtomicU64::new(0),
			epoch: RwLock::new(()),
			next_id: AtomicU64::new(1),
			namespaces: Mutex::new(FxHashMap::default()),
		}
	}

	fn next_id(&self) -> RegistrationId {
		RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed))
	}

	pub fn fallback_generation(&self) -> u64 {
		self.fallback_generation.load(Ordering::Acquire)
	}

	pub fn fallbacks_snapshot(&self) -> Arc<FallbackSlots> {
		self.published_fallbacks.load_full()
	}

	pub fn find_entry(&self, name: &OperatorName) -> Option<Arc<OperatorEntry>> {
		self.operators.load().get(name).cloned()
	}

	fn entry_or_insert(&self, name: &OperatorName) -> Arc<OperatorEntry> {
		loop {
			let old = self.operators.load_full();
			if let Some(entry) = old.get(name) {
				return Arc::clone(entry);
			}

			let entry = Arc::new(OperatorEntry::new(name.clone()));
			let mut map = OperatorMap::clone(&old);
			map.insert(name.clone(), Arc::clone(&entry));

			let prev = self.operators.compare_and_swap(&old, Arc::new(map));
			if Arc::ptr_eq(&prev, &old) {
				return entry;
			}
		}
	}

	/// Entries that currently have a schema or kernels, sorted by name.
	fn live_entries(&self) -> Vec<Arc<OperatorEntry>> {
		let mut entries: Vec<_> = self.operators.load().values().filter(|e| e.is_live()).cloned().collect();
		entries.sort_by(|a, b| a.name().cmp(b.name()));
		entries
	}

	pub fn define_schema(self: &Arc<Self>, schema: FunctionSchema, site: Arc<str>) -> Result<(Arc<OperatorEntry>, RegistrationToken), DispatchError> {
		let _epoch = self.epoch.read();
		let entry = self.entry_or_insert(&schema.name);
		let id = self.next_id();
		entry.define_schema(schema, id, Arc::clone(&site))?;
		tracing::debug!(registry = %self.config.label, op = %entry.name(), id = %id, %site, "defined schema");
		let token = RegistrationToken::new(
			self,
			RegistrationTarget::Schema {
				entry: Arc::clone(&entry),
				id,
			},
		);
		Ok((entry, token))
	}

	pub fn register_kernel(
		self: &Arc<Self>,
		name: &OperatorName,
		key: Option<DispatchKey>,
		kernel: Kernel,
		debug: Arc<str>,
	) -> Result<RegistrationToken, DispatchError> {
		let _epoch = self.epoch.read();
		let entry = self.entry_or_insert(name);
		let id = self.next_id();
		let label = kernel.label().to_string();
		entry.register_kernel(key, RegisteredKernel { id, kernel, debug })?;
		tracing::debug!(registry = %self.config.label, op = %name, key = ?key, id = %id, kernel = %label, "registered kernel");
		Ok(RegistrationToken::new(self, RegistrationTarget::Kernel { entry, key, id }))
	}

	pub fn register_fallback(self: &Arc<Self>, key: Option<DispatchKey>, kernel: Kernel, debug: Arc<str>) -> Result<RegistrationToken, DispatchError> {
		if let Some(key) = key {
			if !key.is_runtime() {
				return Err(DispatchError::NotAConcreteKey { key });
			}
		}

		let _epoch = self.epoch.read();
		let id = self.next_id();
		let label = kernel.label().to_string();
		{
			let mut slots = self.fallbacks.lock();
			let Some(slot) = slots.slot_mut(key) else {
				return Err(DispatchError::NotAConcreteKey {
					key: key.unwrap_or(DispatchKey::Undefined),
				});
			};
			if let Some(existing) = slot {
				return Err(DispatchError::DuplicateRegistration {
					target: "process fallback".to_string(),
					key,
					existing: existing.describe(),
				});
			}
			*slot = Some(RegisteredKernel { id, kernel, debug });
			self.publish_fallbacks(&slots);
		}
		tracing::debug!(registry = %self.config.label, key = ?key, id = %id, kernel = %label, "registered fallback");
		Ok(RegistrationToken::new(self, RegistrationTarget::Fallback { key, id }))
	}

	fn publish_fallbacks(&self, slots: &FallbackSlots) {
		self.published_fallbacks.store(Arc::new(slots.clone()));
		self.fallback_generation.fetch_add(1, Ordering::AcqRel);
	}

	pub fn claim_namespace(self: &Arc<Self>, namespace: &str, location: SourceLocation) -> Result<RegistrationToken, DispatchError> {
		let _epoch = self.epoch.read();
		let id = self.next_id();
		{
			let mut claims = self.namespaces.lock();
			if let Some(existing) = claims.get(namespace) {
				return Err(DispatchError::NamespaceConflict {
					namespace: namespace.to_string(),
					existing: existing.location,
				});
			}
			claims.insert(namespace.to_string(), NamespaceClaim { id, location });
		}
		tracing::debug!(registry = %self.config.label, namespace, %location, "claimed namespace");
		Ok(RegistrationToken::new(
			self,
			RegistrationTarget::Namespace {
				namespace: namespace.to_string(),
				id,
			},
		))
	}

	pub fn is_namespace_claimed(&self, namespace: &str) -> bool {
		self.namespaces.lock().contains_key(namespace)
	}

	/// Undoes one registration. Callers hold `epoch` in either mode.
	pub fn retract(&self, target: RegistrationTarget) {
		match target {
			RegistrationTarget::Schema { entry, id } => {
				if entry.remove_schema(id) {
					tracing::debug!(registry = %self.config.label, op = %entry.name(), id = %id, "retracted schema");
				}
			}
			RegistrationTarget::Kernel { entry, key, id } => {
				if entry.remove_kernel(key, id) {
					tracing::debug!(registry = %self.config.label, op = %entry.name(), key = ?key, id = %id, "retracted kernel");
				}
			}
			RegistrationTarget::Fallback { key, id } => {
				let mut slots = self.fallbacks.lock();
				let Some(slot) = slots.slot_mut(key) else {
					return;
				};
				if slot.as_ref().is_some_and(|k| k.id == id) {
					*slot = None;
					self.publish_fallbacks(&slots);
					tracing::debug!(registry = %self.config.label, key = ?key, id = %id, "retracted fallback");
				}
			}
			RegistrationTarget::Namespace { namespace, id } => {
				let mut claims = self.namespaces.lock();
				if claims.get(&namespace).is_some_and(|c| c.id == id) {
					claims.remove(&namespace);
					tracing::debug!(registry = %self.config.label, %namespace, "released namespace");
				}
			}
		}
	}
}

/// Result of [`Dispatcher::define_schema`]: a handle to the operator and the
/// token that owns the definition.
#[derive(Debug)]
pub struct Definition {
	pub handle: OperatorHandle,
	pub token: RegistrationToken,
}

/// Process registry of operators, kernels and fallbacks.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct Dispatcher {
	pub(crate) inner: Arc<Inner>,
}

static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();

impl Default for Dispatcher {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("label", &self.inner.config.label)
			.field("operators", &self.inner.operators.load().len())
			.finish()
	}
}

impl Dispatcher {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner::new(DispatcherConfig::default())),
		}
	}

	pub fn with_config(config: DispatcherConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		Ok(Self {
			inner: Arc::new(Inner::new(config)),
		})
	}

	/// The process-wide dispatcher, created on first use.
	pub fn global() -> &'static Dispatcher {
		GLOBAL.get_or_init(Dispatcher::new)
	}

	pub fn config(&self) -> &DispatcherConfig {
		&self.inner.config
	}

	pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
		Self { inner }
	}

	/// Defines `schema`, or adds another owner to an identical existing
	/// definition.
	#[track_caller]
	pub fn define_schema(&self, schema: FunctionSchema) -> Result<Definition, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.define_schema_with_debug(schema, debug)
	}

	pub(crate) fn define_schema_with_debug(&self, schema: FunctionSchema, debug: Arc<str>) -> Result<Definition, DispatchError> {
		let (entry, token) = self.inner.define_schema(schema, debug)?;
		Ok(Definition {
			handle: OperatorHandle::new(entry, Arc::clone(&self.inner)),
			token,
		})
	}

	/// Registers `kernel` for `name` at `key`, or as the operator's
	/// catch-all when `key` is `None`. The operator need not have a schema
	/// yet.
	#[track_caller]
	pub fn register_kernel(&self, name: &OperatorName, key: Option<DispatchKey>, kernel: Kernel) -> Result<RegistrationToken, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.inner.register_kernel(name, key, kernel, debug)
	}

	pub(crate) fn register_kernel_with_debug(
		&self,
		name: &OperatorName,
		key: Option<DispatchKey>,
		kernel: Kernel,
		debug: Arc<str>,
	) -> Result<RegistrationToken, DispatchError> {
		self.inner.register_kernel(name, key, kernel, debug)
	}

	/// Registers a process fallback for `key`, or the global catch-all
	/// fallback when `key` is `None`. Fallbacks apply to every operator.
	#[track_caller]
	pub fn register_fallback(&self, key: Option<DispatchKey>, kernel: Kernel) -> Result<RegistrationToken, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.inner.register_fallback(key, kernel, debug)
	}

	pub(crate) fn register_fallback_with_debug(&self, key: Option<DispatchKey>, kernel: Kernel, debug: Arc<str>) -> Result<RegistrationToken, DispatchError> {
		self.inner.register_fallback(key, kernel, debug)
	}

	/// Retracts the registration `token` owns. Same as dropping it.
	pub fn deregister(&self, mut token: RegistrationToken) {
		token.release();
	}

	/// Finds a live operator. Never fails; absence is `None`.
	pub fn find_op(&self, name: &OperatorName) -> Option<OperatorHandle> {
		let entry = self.inner.find_entry(name)?;
		entry.is_live().then(|| OperatorHandle::new(entry, Arc::clone(&self.inner)))
	}

	/// [`Self::find_op`] by name and overload strings.
	pub fn find_op_named(&self, name: &str, overload: &str) -> Option<OperatorHandle> {
		self.find_op(&OperatorName::new(name, overload))
	}

	/// Finds an operator that has a schema.
	pub fn find_schema(&self, name: &OperatorName) -> Option<OperatorHandle> {
		self.find_op(name).filter(OperatorHandle::has_schema)
	}

	/// Resolves the kernel for `active` under the calling thread's local
	/// key state.
	pub fn lookup_kernel(&self, handle: &OperatorHandle, active: KeySet) -> Result<Kernel, DispatchError> {
		handle.lookup(active)
	}

	/// Direct registrations of `name` as text; empty for unknown operators.
	pub fn dump_state(&self, name: &OperatorName) -> String {
		self.inner.find_entry(name).map(|e| e.dump_state()).unwrap_or_default()
	}

	/// Computed table of `name` as text; empty for unknown operators.
	pub fn dump_computed_table(&self, name: &OperatorName) -> String {
		self.inner.find_entry(name).map(|e| e.dump_computed_table(&self.inner)).unwrap_or_default()
	}

	/// Checks every operator and aggregates all violations.
	pub fn check_invariants(&self) -> InvariantReport {
		let _epoch = self.inner.epoch.write();
		let mut report = InvariantReport::default();
		let entries: Vec<_> = {
			let mut all: Vec<_> = self.inner.operators.load().values().cloned().collect();
			all.sort_by(|a, b| a.name().cmp(b.name()));
			all
		};
		for entry in entries {
			report.violations.extend(entry.check_invariants(&self.inner));
		}
		report
	}

	pub fn check_operator_invariants(&self, name: &OperatorName) -> Result<InvariantReport, DispatchError> {
		let entry = self.inner.find_entry(name).ok_or_else(|| DispatchError::UnknownOperator(name.clone()))?;
		let _epoch = self.inner.epoch.write();
		Ok(InvariantReport {
			violations: entry.check_invariants(&self.inner),
		})
	}

	/// One state dump per operator that has kernels but no schema.
	pub fn find_dangling_impls(&self) -> Vec<String> {
		let dangling: Vec<String> = self.inner.live_entries().into_iter().filter(|e| e.is_dangling()).map(|e| e.dump_state()).collect();
		if !dangling.is_empty() {
			tracing::warn!(registry = %self.inner.config.label, count = dangling.len(), "kernels registered for operators without a schema");
		}
		dangling
	}

	/// Operators with a direct registration at `key`, or every live
	/// operator when `key` is `None`.
	pub fn get_registrations_for_dispatch_key(&self, key: Option<DispatchKey>) -> Vec<OperatorName> {
		self.inner
			.live_entries()
			.into_iter()
			.filter(|e| key.is_none_or(|k| e.has_kernel_for_key(k)))
			.map(|e| e.name().clone())
			.collect()
	}

	/// Whether a live operator named `name` exists.
	pub fn has_kernel(&self, name: &OperatorName) -> bool {
		self.find_op(name).is_some()
	}

	pub fn has_kernel_for_key(&self, name: &OperatorName, key: DispatchKey) -> bool {
		self.inner.find_entry(name).is_some_and(|e| e.has_kernel_for_key(key))
	}

	pub fn has_computed_kernel_for_key(&self, name: &OperatorName, key: DispatchKey) -> bool {
		self.inner.find_entry(name).is_some_and(|e| e.has_computed_kernel_for_key(&self.inner, key))
	}

	pub fn all_operators(&self) -> Vec<OperatorName> {
		self.inner.live_entries().into_iter().map(|e| e.name().clone()).collect()
	}

	pub fn is_namespace_claimed(&self, namespace: &str) -> bool {
		self.inner.is_namespace_claimed(namespace)
	}
}
