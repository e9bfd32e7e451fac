use pretty_assertions::assert_eq;

use super::*;
use crate::{KeySet, Value};

fn constant(label: &'static str) -> Kernel {
	Kernel::boxed(label, move |_, _, _| Ok(vec![Value::Str(label.into())]))
}

fn name(s: &str) -> OperatorName {
	parse_name(s).unwrap()
}

#[test]
fn kinds_parse_from_strings() {
	assert_eq!("DEF".parse::<LibraryKind>(), Ok(LibraryKind::Def));
	assert_eq!("IMPL".parse::<LibraryKind>(), Ok(LibraryKind::Impl));
	assert_eq!("FRAGMENT".parse::<LibraryKind>(), Ok(LibraryKind::Fragment));
	assert!("def".parse::<LibraryKind>().is_err());
	assert_eq!(LibraryKind::Fragment.to_string(), "FRAGMENT");
}

#[test]
fn define_qualifies_unqualified_names() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	let handle = lib.define("foo(Tensor a) -> Tensor").unwrap();

	assert_eq!(handle.operator_name(), &name("myns::foo"));
	assert!(d.find_op(&name("myns::foo")).is_some());
}

#[test]
fn foreign_namespace_is_rejected() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	let err = lib.define("other::foo(Tensor a) -> Tensor").unwrap_err();

	assert_eq!(
		err,
		DispatchError::NamespaceMismatch {
			name: name("other::foo"),
			namespace: "myns".to_string(),
		}
	);
}

#[test]
fn one_def_session_per_namespace() {
	let d = Dispatcher::new();
	let first = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	let err = Library::new(&d, LibraryKind::Def, "myns", None).unwrap_err();
	assert!(matches!(err, DispatchError::NamespaceConflict { ref namespace, existing } if namespace == "myns" && existing == first.location()));

	drop(first);
	assert!(Library::new(&d, LibraryKind::Def, "myns", None).is_ok());
}

#[test]
fn fragment_needs_a_live_definition() {
	let d = Dispatcher::new();
	let err = Library::new(&d, LibraryKind::Fragment, "myns", None).unwrap_err();
	assert_eq!(err, DispatchError::UnknownNamespace { namespace: "myns".to_string() });

	let _def = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	let mut fragment = Library::new(&d, LibraryKind::Fragment, "myns", None).unwrap();
	fragment.define("extra(Tensor a) -> Tensor").unwrap();
	drop(fragment);
	assert!(d.find_op(&name("myns::extra")).is_none(), "fragments own what they add");
}

#[test]
fn impl_sessions_cannot_define() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Impl, "myns", Some(DispatchKey::CPU)).unwrap();
	let err = lib.define("foo(Tensor a) -> Tensor").unwrap_err();
	assert!(matches!(err, DispatchError::InvalidSessionCall { operation: "define", kind: LibraryKind::Impl, .. }));
}

#[test]
fn fixed_key_rejects_other_keys() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Impl, "myns", Some(DispatchKey::CPU)).unwrap();
	lib.implement("foo", None, constant("cpu")).unwrap();
	assert!(d.has_kernel_for_key(&name("myns::foo"), DispatchKey::CPU));

	let err = lib.implement("bar", Some(DispatchKey::CUDA), constant("cuda")).unwrap_err();
	assert_eq!(
		err,
		DispatchError::KeyMismatch {
			session: DispatchKey::CPU,
			requested: DispatchKey::CUDA,
		}
	);
}

#[test]
fn fallbacks_require_wildcard_impl() {
	let d = Dispatcher::new();
	let mut def = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	assert!(matches!(def.fallback(constant("f")), Err(DispatchError::InvalidSessionCall { operation: "fallback", .. })));

	let mut scoped = Library::new(&d, LibraryKind::Impl, "myns", Some(DispatchKey::CPU)).unwrap();
	assert!(matches!(scoped.fallback(constant("f")), Err(DispatchError::InvalidSessionCall { .. })));

	let mut wildcard = Library::new(&d, LibraryKind::Impl, WILDCARD_NAMESPACE, Some(DispatchKey::Python)).unwrap();
	wildcard.fallback(constant("python")).unwrap();

	def.define("foo(Tensor a) -> Tensor").unwrap();
	let handle = d.find_op(&name("myns::foo")).unwrap();
	assert_eq!(handle.lookup(KeySet::PYTHON).map(|k| k.label().to_string()), Ok("python".to_string()));

	wildcard.close();
	assert!(handle.lookup(KeySet::PYTHON).is_err());
}

#[test]
fn define_with_kernel_registers_composite_by_default() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	let handle = lib.define_with_kernel("twice(int a) -> int", Kernel::native("twice", |(a,): (i64,)| Ok((a * 2,)))).unwrap();

	assert_eq!(handle.registered_keys(), vec![DispatchKey::CompositeImplicitAutograd]);
	let (out,): (i64,) = handle.call(KeySet::AUTOGRAD_CPU | KeySet::CPU, (21i64,)).unwrap();
	assert_eq!(out, 42);
}

#[test]
fn define_with_kernel_rolls_back_on_failure() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	let wrong_arity = Kernel::native("bad", |(a, b): (i64, i64)| Ok((a + b,)));

	let err = lib.define_with_kernel("one(int a) -> int", wrong_arity).unwrap_err();
	assert!(matches!(err, DispatchError::SignatureMismatch { .. }));
	assert!(d.find_op(&name("myns::one")).is_none());
	assert_eq!(lib.num_registrations(), 1, "only the namespace claim remains");
}

#[test]
fn closed_sessions_reject_everything() {
	let d = Dispatcher::new();
	let mut lib = Library::new(&d, LibraryKind::Def, "myns", None).unwrap();
	lib.define("foo(Tensor a) -> Tensor").unwrap();
	lib.close();
	lib.close();

	assert!(lib.is_closed());
	assert!(d.find_op(&name("myns::foo")).is_none());
	assert!(!d.is_namespace_claimed("myns"));
	let closed = DispatchError::SessionClosed { namespace: "myns".to_string() };
	assert_eq!(lib.define("bar(Tensor a) -> Tensor").unwrap_err(), closed);
	assert_eq!(lib.implement("foo", Some(DispatchKey::CPU), constant("cpu")).unwrap_err(), closed);
	assert_eq!(lib.fallback(constant("f")).unwrap_err(), closed);
}

#[test]
fn source_location_points_at_caller() {
	let d = Dispatcher::new();
	let line = line!() + 1;
	let lib = Library::new(&d, LibraryKind::Impl, "myns", None).unwrap();
	assert_eq!(lib.location().line, line);
	assert!(lib.location().file.ends_with("tests.rs"));
}
