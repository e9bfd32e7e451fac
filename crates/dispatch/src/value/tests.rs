use super::*;

#[test]
fn key_set_merges_objects_and_lists() {
	let cpu = Value::Object(Object::new(KeySet::CPU, 1u8));
	let cuda = Value::Object(Object::new(KeySet::CUDA | KeySet::AUTOGRAD_CUDA, 2u8));
	let list = Value::List(vec![cuda, Value::Int(3)]);

	assert_eq!(cpu.key_set(), KeySet::CPU);
	assert_eq!(list.key_set(), KeySet::CUDA | KeySet::AUTOGRAD_CUDA);
	assert_eq!(Value::Str("x".into()).key_set(), KeySet::empty());
}

#[test]
fn scalar_conversions() {
	assert_eq!(7i64.into_value(), Value::Int(7));
	assert_eq!(i64::from_value(Value::Int(7)), Ok(7));
	assert_eq!(String::from_value(Value::Str("abc".into())), Ok("abc".to_string()));
	assert_eq!(Option::<i64>::from_value(Value::None), Ok(None));
	assert_eq!(Option::<i64>::from_value(Value::Int(1)), Ok(Some(1)));
	assert_eq!(Vec::<bool>::from_value(Value::List(vec![Value::Bool(true), Value::Bool(false)])), Ok(vec![true, false]));
}

#[test]
fn type_mismatch_names_both_types() {
	let err = i64::from_value(Value::Double(1.5)).unwrap_err();
	assert_eq!(err.message, "expected int, got float");
}

#[test]
fn tuples_require_exact_length() {
	let ok = <(i64, bool)>::from_values(vec![Value::Int(1), Value::Bool(true)]);
	assert_eq!(ok, Ok((1, true)));

	let err = <(i64, bool)>::from_values(vec![Value::Int(1)]).unwrap_err();
	assert_eq!(err.message, "expected 2 values, got 1");
	assert_eq!(<()>::LEN, 0);
	assert!(<()>::from_values(Vec::new()).is_ok());
}

#[test]
fn objects_compare_by_identity() {
	let a = Object::new(KeySet::CPU, String::from("payload"));
	let b = Object::new(KeySet::CPU, String::from("payload"));

	assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
	assert_ne!(Value::Object(a.clone()), Value::Object(b));
	assert_eq!(a.downcast_ref::<String>().map(String::as_str), Some("payload"));
	assert!(a.downcast_ref::<u32>().is_none());
}
