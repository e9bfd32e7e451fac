#![cfg_attr(doc, allow(rustdoc::private_intra_doc_links))]
//! Runtime operator dispatch.
//!
//! # Purpose
//!
//! Routes a call of a named operator to one of many kernels, chosen by the
//! dispatch keys carried by its arguments and by the calling thread's
//! include/exclude state. Kernels, schemas and fallbacks can be added and
//! retracted while other threads dispatch.
//!
//! # Mental Model
//!
//! 1. **Definition:** [`Dispatcher::define_schema`] (or a [`Library`]
//!    session) records an operator's [`FunctionSchema`].
//! 2. **Registration:** kernels are registered per [`DispatchKey`], per
//!    alias key, as an operator catch-all, or as a process fallback. Each
//!    registration returns a [`RegistrationToken`]; dropping it retracts.
//! 3. **Resolution:** each operator lazily builds a computed table mapping
//!    every runtime key to the kernel that runs there: direct, then alias
//!    by [`DispatcherConfig::alias_precedence`], then operator catch-all,
//!    then backend fallback, then global fallback.
//! 4. **Dispatch:** [`OperatorHandle::lookup`] intersects the active
//!    [`KeySet`] with the thread's included set, removes the excluded set and
//!    fallthrough keys, and reads the slot of the highest-priority key left.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Dispatcher`] | Registry of operators, kernels and fallbacks. |
//! | [`OperatorHandle`] | Stable handle to one operator; the call path. |
//! | [`KeySet`] | Bitset over runtime keys with priority queries. |
//! | [`Kernel`] | Native, boxed, or fallthrough callable. |
//! | [`Library`] | Registration session that retracts everything on close. |
//! | [`ExcludeKeysGuard`] | Scoped change to the thread's excluded keys. |
//!
//! # Concurrency
//!
//! - **Lookup:** lock-free while the operator's computed table is current.
//! - **Mutation:** per-operator mutex; the operator map and fallbacks are
//!   published as snapshots.
//!
//! # Invariants
//!
//! - Releasing a registration restores the computed table to its value
//!   before the registration.
//!   - Enforced in: [`crate::entry::OperatorEntry::remove_kernel`] (id-checked removal plus generation bump).
//!   - Tested by: [`crate::invariants::test_registration_round_trip`]
//!   - Failure symptom: retracted kernels keep running.
//!
//! - At most one live direct registration per (operator, key).
//!   - Enforced in: [`crate::entry::OperatorEntry::register_kernel`].
//!   - Tested by: [`crate::invariants::test_single_registration_per_slot`]
//!   - Failure symptom: registrations silently overwrite each other.
//!
//! - Guards restore the exact prior thread-local state, in reverse order.
//!   - Enforced in: [`crate::tls::ExcludeKeysGuard`].
//!   - Tested by: [`crate::invariants::test_guard_restoration`]
//!   - Failure symptom: keys stay excluded after a scope ends.
//!
//! - Direct registrations beat alias registrations without touching the alias.
//!   - Enforced in: [`crate::table::ComputedTable::compute`].
//!   - Tested by: [`crate::invariants::test_direct_beats_alias`]
//!   - Failure symptom: backend-specific kernels are shadowed by composites.
//!
//! - Kernels without a schema are reported as dangling.
//!   - Enforced in: [`Dispatcher::find_dangling_impls`].
//!   - Tested by: [`crate::invariants::test_dangling_detection`]
//!   - Failure symptom: typos in operator names go unnoticed.
//!
//! - A stale computed table is never served.
//!   - Enforced in: [`crate::entry::OperatorEntry::computed`] (generation stamp).
//!   - Tested by: [`crate::invariants::test_no_stale_table_after_fallback_change`]
//!   - Failure symptom: fallbacks registered later are ignored.

mod check;
mod config;
mod dispatcher;
mod entry;
mod error;
mod handle;
mod kernel;
mod key;
mod keyset;
mod library;
mod registration;
mod table;
mod tls;
mod value;

pub use check::{InvariantReport, Violation, ViolationKind};
pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::{Definition, Dispatcher};
pub use error::{DispatchError, KernelError};
pub use handle::OperatorHandle;
pub use kernel::{BoxedFn, CallingConvention, Kernel};
pub use key::{DispatchKey, NUM_RUNTIME_KEYS, all_keys, num_backends, parse_dispatch_key};
pub use keyset::{EmptyKeySet, KeySet};
pub use library::{Library, LibraryKind, SourceLocation, WILDCARD_NAMESPACE};
pub use registration::{RegistrationId, RegistrationToken};
pub use switchyard_schema::{
	AliasAnalysisKind, Argument, FunctionSchema, OperatorName, SchemaParseError, parse_name,
	parse_schema,
};
pub use table::{ComputedEntry, ComputedTableView, SlotSource};
pub use tls::{
	BelowAutogradGuard, ExcludeKeysGuard, LocalDispatchKeySet, RestrictKeysGuard,
	tls_is_dispatch_key_excluded, tls_local_key_set, tls_set_dispatch_key_excluded,
};
pub use value::{IValue, Object, Stack, Value, Values};

#[cfg(any(test, doc))]
pub(crate) mod invariants;
