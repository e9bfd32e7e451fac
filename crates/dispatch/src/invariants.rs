#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
	DispatchError, DispatchKey, Dispatcher, ExcludeKeysGuard, Kernel, KeySet, OperatorName, SlotSource, Value, all_keys, parse_schema, tls_local_key_set,
};

fn op(name: &str) -> OperatorName {
	OperatorName::new(name, "")
}

fn constant(label: &'static str) -> Kernel {
	Kernel::boxed(label, move |_, _, _| Ok(vec![Value::Str(label.into())]))
}

/// Invariant: registering a kernel and releasing its token leaves the
/// computed table equal to its prior value, for every key.
pub(crate) fn inv_registration_round_trip() {
	let d = Dispatcher::new();
	let foo = op("test::foo");
	let _def = d.define_schema(parse_schema("test::foo(Tensor a) -> Tensor").unwrap()).unwrap();
	let _cpu = d.register_kernel(&foo, Some(DispatchKey::CPU), constant("cpu")).unwrap();
	let _dense = d.register_kernel(&foo, Some(DispatchKey::Dense), constant("dense")).unwrap();
	let _fallback = d.register_fallback(Some(DispatchKey::Python), constant("python")).unwrap();
	let handle = d.find_op(&foo).unwrap();

	let slots = all_keys().filter(|k| *k != DispatchKey::Undefined).map(Some).chain([None]);
	for slot in slots {
		let before = handle.computed_table();
		let token = match d.register_kernel(&foo, slot, constant("probe")) {
			Ok(token) => token,
			Err(DispatchError::DuplicateRegistration { .. }) => continue,
			Err(err) => panic!("unexpected failure at {slot:?}: {err}"),
		};
		assert_ne!(handle.computed_table(), before, "registration at {slot:?} must be visible");
		drop(token);
		assert_eq!(handle.computed_table(), before, "release at {slot:?} must restore the table");
	}
	assert!(d.check_invariants().is_ok());
}

#[cfg_attr(test, test)]
pub(crate) fn test_registration_round_trip() {
	inv_registration_round_trip()
}

/// Invariant: at most one live direct registration per (operator, key).
pub(crate) fn inv_single_registration_per_slot() {
	let d = Dispatcher::new();
	let foo = op("test::foo");
	let first = d.register_kernel(&foo, Some(DispatchKey::CPU), constant("first")).unwrap();
	let err = d.register_kernel(&foo, Some(DispatchKey::CPU), constant("second")).unwrap_err();
	assert!(matches!(err, DispatchError::DuplicateRegistration { key: Some(DispatchKey::CPU), .. }), "{err}");

	let _catch_all = d.register_kernel(&foo, None, constant("any")).unwrap();
	assert!(d.register_kernel(&foo, None, constant("other")).is_err());

	d.deregister(first);
	assert!(d.register_kernel(&foo, Some(DispatchKey::CPU), constant("second")).is_ok());
}

#[cfg_attr(test, test)]
pub(crate) fn test_single_registration_per_slot() {
	inv_single_registration_per_slot()
}

/// Invariant: guards restore the exact prior thread-local state, innermost
/// first, on normal and early exit.
pub(crate) fn inv_guard_restoration() {
	let before = tls_local_key_set();

	fn early_exit(fail: bool) -> Result<(), ()> {
		let _guard = ExcludeKeysGuard::new(KeySet::autograd());
		if fail {
			return Err(());
		}
		Ok(())
	}
	assert!(early_exit(true).is_err());
	assert_eq!(tls_local_key_set(), before);

	let outer = ExcludeKeysGuard::new(KeySet::CPU);
	let after_outer = tls_local_key_set();
	let inner = ExcludeKeysGuard::new(KeySet::CUDA);
	assert_eq!(tls_local_key_set().excluded, KeySet::CPU | KeySet::CUDA);
	drop(inner);
	assert_eq!(tls_local_key_set(), after_outer);
	drop(outer);
	assert_eq!(tls_local_key_set(), before);
}

#[cfg_attr(test, test)]
pub(crate) fn test_guard_restoration() {
	inv_guard_restoration()
}

/// Invariant: a direct registration beats an alias registration covering
/// the same key, without the alias registration being touched.
pub(crate) fn inv_direct_beats_alias() {
	let d = Dispatcher::new();
	let foo = op("test::foo");
	let _alias = d.register_kernel(&foo, Some(DispatchKey::CompositeExplicitAutograd), constant("composite")).unwrap();
	let handle = d.find_op(&foo).unwrap();

	assert_eq!(handle.lookup(KeySet::CUDA).unwrap().label(), "composite");
	assert_eq!(
		handle.computed_table().get(DispatchKey::CUDA).map(|e| e.source),
		Some(SlotSource::Alias(DispatchKey::CompositeExplicitAutograd))
	);

	let _direct = d.register_kernel(&foo, Some(DispatchKey::CUDA), constant("cuda")).unwrap();
	assert_eq!(handle.lookup(KeySet::CUDA).unwrap().label(), "cuda");
	assert_eq!(handle.lookup(KeySet::CPU).unwrap().label(), "composite");
}

#[cfg_attr(test, test)]
pub(crate) fn test_direct_beats_alias() {
	inv_direct_beats_alias()
}

/// Invariant: kernels for an operator without a schema are dangling until a
/// schema arrives.
pub(crate) fn inv_dangling_detection() {
	let d = Dispatcher::new();
	let _impl = d.register_kernel(&op("test::typo"), Some(DispatchKey::CPU), constant("cpu")).unwrap();
	let _ok = d.register_kernel(&op("test::real"), Some(DispatchKey::CPU), constant("cpu")).unwrap();
	let _def = d.define_schema(parse_schema("test::real(Tensor a) -> Tensor").unwrap()).unwrap();

	let dangling = d.find_dangling_impls();
	assert_eq!(dangling.len(), 1);
	assert!(dangling[0].starts_with("name: test::typo\nschema: (none)\n"), "{}", dangling[0]);

	let typo_def = d.define_schema(parse_schema("test::typo(Tensor a) -> Tensor").unwrap()).unwrap();
	assert!(d.find_dangling_impls().is_empty());
	drop(typo_def);
	assert_eq!(d.find_dangling_impls().len(), 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_dangling_detection() {
	inv_dangling_detection()
}

/// Invariant: a table cached before a fallback change is never served after it.
pub(crate) fn inv_no_stale_table_after_fallback_change() {
	let d = Dispatcher::new();
	let foo = op("test::foo");
	let _cpu = d.register_kernel(&foo, Some(DispatchKey::CPU), constant("cpu")).unwrap();
	let handle = d.find_op(&foo).unwrap();
	assert!(handle.lookup(KeySet::CUDA).is_err());

	let fallback = d.register_fallback(None, constant("fallback")).unwrap();
	assert_eq!(handle.lookup(KeySet::CUDA).unwrap().label(), "fallback");
	assert!(d.check_invariants().is_ok());

	drop(fallback);
	assert!(matches!(handle.lookup(KeySet::CUDA), Err(DispatchError::MissingKernel { key: DispatchKey::CUDA, .. })));
	assert!(d.check_invariants().is_ok());
}

#[cfg_attr(test, test)]
pub(crate) fn test_no_stale_table_after_fallback_change() {
	inv_no_stale_table_after_fallback_change()
}

/// Invariant: lookups of one operator keep succeeding while other threads
/// register and retract kernels on other operators.
pub(crate) fn inv_lookup_during_unrelated_mutation() {
	let d = Dispatcher::new();
	let hot = op("test::hot");
	let _cpu = d.register_kernel(&hot, Some(DispatchKey::CPU), constant("cpu")).unwrap();
	let handle = d.find_op(&hot).unwrap();
	let stop = Arc::new(AtomicBool::new(false));

	let writers: Vec<_> = (0..4)
		.map(|t| {
			let d = d.clone();
			let stop = Arc::clone(&stop);
			std::thread::spawn(move || {
				let name = op(&format!("test::cold{t}"));
				while !stop.load(Ordering::Relaxed) {
					let token = d.register_kernel(&name, Some(DispatchKey::CUDA), constant("cold")).unwrap();
					drop(token);
				}
			})
		})
		.collect();

	for _ in 0..10_000 {
		assert_eq!(handle.lookup(KeySet::CPU).unwrap().label(), "cpu");
	}
	stop.store(true, Ordering::Relaxed);
	for writer in writers {
		writer.join().unwrap();
	}
	assert!(d.check_invariants().is_ok());
}

#[cfg_attr(test, test)]
pub(crate) fn test_lookup_during_unrelated_mutation() {
	inv_lookup_during_unrelated_mutation()
}

/// Invariant: `check_invariants` reports every violation, not the first.
pub(crate) fn inv_violations_are_aggregated() {
	let d = Dispatcher::new();
	let two_args = || Kernel::native("add", |(a, b): (i64, i64)| Ok((a + b,)));
	let _a = d.register_kernel(&op("test::a"), Some(DispatchKey::CPU), two_args()).unwrap();
	let _b = d.register_kernel(&op("test::b"), Some(DispatchKey::CPU), two_args()).unwrap();
	let _da = d.define_schema(parse_schema("test::a(int x) -> int").unwrap()).unwrap();
	let _db = d.define_schema(parse_schema("test::b(int x) -> int").unwrap()).unwrap();

	let report = d.check_invariants();
	let operators: Vec<_> = report.violations.iter().filter_map(|v| v.operator.clone()).collect();
	assert_eq!(operators, vec![op("test::a"), op("test::b")]);
}

#[cfg_attr(test, test)]
pub(crate) fn test_violations_are_aggregated() {
	inv_violations_are_aggregated()
}
