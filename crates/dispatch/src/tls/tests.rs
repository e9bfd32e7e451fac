use super::*;

#[test]
fn threads_start_with_everything_included() {
	assert_eq!(tls_local_key_set(), LocalDispatchKeySet::default());
	assert_eq!(tls_local_key_set().included, KeySet::full());
	assert!(tls_local_key_set().excluded.is_empty());
}

#[test]
fn nested_exclude_guards_restore_in_reverse() {
	let before = tls_local_key_set();
	{
		let _outer = ExcludeKeysGuard::new(KeySet::AUTOGRAD_CPU);
		assert_eq!(tls_local_key_set().excluded, KeySet::AUTOGRAD_CPU);
		{
			let _inner = ExcludeKeysGuard::new(KeySet::AUTOGRAD_CPU | KeySet::PYTHON);
			assert_eq!(tls_local_key_set().excluded, KeySet::AUTOGRAD_CPU | KeySet::PYTHON);
		}
		assert_eq!(tls_local_key_set().excluded, KeySet::AUTOGRAD_CPU);
	}
	assert_eq!(tls_local_key_set(), before);
}

#[test]
fn guards_restore_during_unwinding() {
	let before = tls_local_key_set();
	let result = std::panic::catch_unwind(|| {
		let _guard = ExcludeKeysGuard::new(KeySet::CPU);
		let _restrict = RestrictKeysGuard::new(KeySet::CUDA);
		panic!("kernel failed");
	});
	assert!(result.is_err());
	assert_eq!(tls_local_key_set(), before);
}

#[test]
fn restrict_guard_intersects_included() {
	{
		let _guard = RestrictKeysGuard::new(KeySet::CPU | KeySet::CUDA);
		let _narrower = RestrictKeysGuard::new(KeySet::CUDA | KeySet::XLA);
		assert_eq!(tls_local_key_set().included, KeySet::CUDA);
	}
	assert_eq!(tls_local_key_set().included, KeySet::full());
}

#[test]
fn below_autograd_excludes_autograd_keys() {
	{
		let _guard = BelowAutogradGuard::new();
		assert!(tls_is_dispatch_key_excluded(DispatchKey::AutogradCPU));
		assert!(tls_is_dispatch_key_excluded(DispatchKey::Autograd));
		assert!(!tls_is_dispatch_key_excluded(DispatchKey::CPU));
	}
	assert!(!tls_is_dispatch_key_excluded(DispatchKey::AutogradCPU));
}

#[test]
fn unscoped_exclusion_toggles() {
	tls_set_dispatch_key_excluded(DispatchKey::Python, true);
	assert!(tls_is_dispatch_key_excluded(DispatchKey::Python));
	tls_set_dispatch_key_excluded(DispatchKey::Python, false);
	assert!(!tls_is_dispatch_key_excluded(DispatchKey::Python));
	assert!(!tls_is_dispatch_key_excluded(DispatchKey::Undefined));
}

#[test]
fn state_is_per_thread() {
	let _guard = ExcludeKeysGuard::new(KeySet::CPU);
	let other = std::thread::spawn(tls_local_key_set).join().unwrap();
	assert_eq!(other, LocalDispatchKeySet::default());
	assert_eq!(tls_local_key_set().excluded, KeySet::CPU);
}
