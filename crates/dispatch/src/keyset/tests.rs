use proptest::prelude::*;

use super::*;

fn arb_keyset() -> impl Strategy<Value = KeySet> {
	any::<u32>().prop_map(KeySet::from_bits_truncate)
}

proptest! {
	#[test]
	fn prop_union_and_intersection_commute(a in arb_keyset(), b in arb_keyset()) {
		prop_assert_eq!(a.union(b), b.union(a));
		prop_assert_eq!(a.intersection(b), b.intersection(a));
	}

	#[test]
	fn prop_union_and_intersection_associate(a in arb_keyset(), b in arb_keyset(), c in arb_keyset()) {
		prop_assert_eq!(a.union(b).union(c), a.union(b.union(c)));
		prop_assert_eq!(a.intersection(b).intersection(c), a.intersection(b.intersection(c)));
	}

	#[test]
	fn prop_identities(a in arb_keyset()) {
		prop_assert_eq!(a.intersection(a), a);
		prop_assert_eq!(a.union(KeySet::empty()), a);
		prop_assert_eq!(a.difference(a), KeySet::empty());
	}

	#[test]
	fn prop_highest_member_dominates(a in arb_keyset()) {
		match a.highest_priority_member() {
			Err(EmptyKeySet) => prop_assert!(a.is_empty()),
			Ok(top) => {
				prop_assert!(a.has(top));
				let rest = a.remove_key(top);
				prop_assert!(KeySet::full_after(top).contains(rest));
			}
		}
	}
}

#[test]
fn difference_is_not_commutative() {
	let a = KeySet::CPU | KeySet::CUDA;
	let b = KeySet::CUDA;
	assert_eq!(a - b, KeySet::CPU);
	assert_eq!(b - a, KeySet::empty());
	assert_ne!(a.difference(b), b.difference(a));
}

#[test]
fn highest_priority_follows_declaration_order() {
	let set: KeySet = [DispatchKey::CPU, DispatchKey::AutogradCPU, DispatchKey::BackendSelect].into_iter().collect();
	assert_eq!(set.highest_priority_member(), Ok(DispatchKey::AutogradCPU));
	assert_eq!(KeySet::empty().highest_priority_member(), Err(EmptyKeySet));
	assert_eq!(
		KeySet::from(DispatchKey::PythonTLSSnapshot).highest_priority_member(),
		Ok(DispatchKey::PythonTLSSnapshot)
	);
}

#[test]
fn full_after_includes_the_key_itself() {
	let below = KeySet::full_after(DispatchKey::ADInplaceOrView);
	assert!(below.has(DispatchKey::ADInplaceOrView));
	assert!(below.has(DispatchKey::CPU));
	assert!(below.has(DispatchKey::Python));
	assert!(!below.has(DispatchKey::AutogradCPU));
	assert_eq!(KeySet::full_after(DispatchKey::PythonTLSSnapshot), KeySet::full());
	assert_eq!(KeySet::full_after(DispatchKey::Autograd), KeySet::empty());
	assert_eq!(KeySet::full_after(DispatchKey::Undefined), KeySet::empty());
}

#[test]
fn alias_keys_expand_into_runtime_members() {
	let set = KeySet::from(DispatchKey::Autograd);
	assert_eq!(set, KeySet::autograd());
	assert!(set.has(DispatchKey::Autograd));
	assert!(!set.has(DispatchKey::CompositeImplicitAutograd));
	assert!(!KeySet::full().has(DispatchKey::Undefined));
	assert_eq!(KeySet::from(DispatchKey::Dense), KeySet::CPU | KeySet::CUDA | KeySet::XLA);
}

#[test]
fn keys_iterate_from_highest_priority() {
	let set = KeySet::CPU | KeySet::AUTOCAST_CUDA | KeySet::PYTHON;
	let keys: Vec<_> = set.keys().collect();
	assert_eq!(keys, vec![DispatchKey::AutocastCUDA, DispatchKey::Python, DispatchKey::CPU]);
	assert_eq!(set.to_string(), "DispatchKeySet(AutocastCUDA, Python, CPU)");
	assert_eq!(KeySet::empty().to_string(), "DispatchKeySet()");
}

#[test]
fn runtime_keys_round_trip_through_index() {
	for (idx, key) in DispatchKey::RUNTIME.iter().enumerate() {
		assert_eq!(key.index(), Some(idx));
		assert_eq!(DispatchKey::from_index(idx), Some(*key));
		assert_eq!(KeySet::from(*key).bits(), 1 << idx);
	}
	for alias in DispatchKey::ALIASES {
		assert_eq!(alias.index(), None);
	}
}
