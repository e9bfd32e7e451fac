use std::cell::Cell;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use switchyard_schema::parse_schema;

use super::*;
use crate::{Definition, DispatchKey, Dispatcher, OperatorName, Stack};

fn define(dispatcher: &Dispatcher, schema: &str) -> Definition {
	dispatcher.define_schema(parse_schema(schema).unwrap()).unwrap()
}

fn add_kernel() -> Kernel {
	Kernel::native("add_cpu", |(a, b): (i64, i64)| Ok((a + b,)))
}

#[test]
fn native_kernel_records_arity() {
	let kernel = add_kernel();
	assert_eq!(kernel.calling_convention(), CallingConvention::Native);
	assert_eq!(kernel.arity(), Some((2, 1)));
	assert_eq!(kernel.label(), "add_cpu");
	assert_eq!(Kernel::boxed("b", |_, _, args| Ok(args)).arity(), None);
}

#[test]
fn native_kernel_is_callable_boxed_and_typed() {
	let dispatcher = Dispatcher::new();
	let def = define(&dispatcher, "test::add(int a, int b) -> int");
	let kernel = add_kernel();

	let boxed = kernel.call_boxed(&def.handle, KeySet::CPU, vec![Value::Int(2), Value::Int(3)]).unwrap();
	assert_eq!(boxed, vec![Value::Int(5)]);

	let (typed,): (i64,) = kernel.call_typed(&def.handle, KeySet::CPU, (4i64, 5i64)).unwrap();
	assert_eq!(typed, 9);
}

#[test]
fn native_boxed_adapter_rejects_wrong_types() {
	let dispatcher = Dispatcher::new();
	let def = define(&dispatcher, "test::add(int a, int b) -> int");

	let err = add_kernel().call_boxed(&def.handle, KeySet::CPU, vec![Value::Int(2), Value::Bool(true)]).unwrap_err();
	assert_eq!(err.message, "expected int, got bool");
}

#[test]
fn boxed_kernel_is_callable_typed() {
	let dispatcher = Dispatcher::new();
	let def = define(&dispatcher, "test::neg(int a) -> int");
	let kernel = Kernel::boxed("neg", |_, _, args| match args.as_slice() {
		[Value::Int(a)] => Ok(vec![Value::Int(-a)]),
		_ => Err(KernelError::new("bad args")),
	});

	let (out,): (i64,) = kernel.call_typed(&def.handle, KeySet::CPU, (8i64,)).unwrap();
	assert_eq!(out, -8);
}

struct Interpreter {
	calls: Cell<usize>,
}

fn interpreter() -> Arc<ReentrantMutex<Interpreter>> {
	Arc::new(ReentrantMutex::new(Interpreter { calls: Cell::new(0) }))
}

#[test]
fn foreign_kernel_releases_lock_and_translates_errors() {
	let dispatcher = Dispatcher::new();
	let def = define(&dispatcher, "test::id(int a) -> int");
	let runtime = interpreter();

	let kernel = Kernel::foreign("py_id", Arc::clone(&runtime), |rt: &Interpreter, _op, args| {
		rt.calls.set(rt.calls.get() + 1);
		if rt.calls.get() > 1 {
			return Err("interpreter raised ValueError");
		}
		Ok(args)
	});
	assert_eq!(kernel.calling_convention(), CallingConvention::Boxed);

	let out = kernel.call_boxed(&def.handle, KeySet::CPU, vec![Value::Int(1)]).unwrap();
	assert_eq!(out, vec![Value::Int(1)]);
	assert!(!runtime.is_locked());

	let err = kernel.call_boxed(&def.handle, KeySet::CPU, vec![Value::Int(1)]).unwrap_err();
	assert_eq!(err.message, "py_id: interpreter raised ValueError");
	assert!(!runtime.is_locked());
	assert_eq!(runtime.lock().calls.get(), 2);
}

#[test]
fn foreign_kernel_can_redispatch_into_the_same_runtime() {
	let dispatcher = Dispatcher::new();
	let def = define(&dispatcher, "test::id(int a) -> int");
	let runtime = interpreter();
	let name = OperatorName::new("test::id", "");

	let cpu = Kernel::foreign("py_cpu", Arc::clone(&runtime), |rt: &Interpreter, _op, args| {
		rt.calls.set(rt.calls.get() + 1);
		Ok::<_, String>(args)
	});
	let python = Kernel::foreign("py_python", Arc::clone(&runtime), |rt: &Interpreter, op, args| {
		rt.calls.set(rt.calls.get() + 1);
		let mut stack: Stack = args;
		op.call_boxed_with_keys(KeySet::CPU, &mut stack).map_err(|err| err.to_string())?;
		Ok::<_, String>(stack)
	});
	let _cpu = dispatcher.register_kernel(&name, Some(DispatchKey::CPU), cpu).unwrap();
	let _python = dispatcher.register_kernel(&name, Some(DispatchKey::Python), python).unwrap();

	let (tx, rx) = mpsc::channel();
	let handle = def.handle.clone();
	thread::spawn(move || {
		let mut stack: Stack = vec![Value::Int(7)];
		let result = handle.call_boxed_with_keys(KeySet::PYTHON | KeySet::CPU, &mut stack);
		let _ = tx.send((result.map_err(|err| err.to_string()), stack));
	});

	let (result, stack) = rx.recv_timeout(Duration::from_secs(5)).expect("nested foreign call did not return");
	result.unwrap();
	assert_eq!(stack, vec![Value::Int(7)]);
	assert!(!runtime.is_locked());
	assert_eq!(runtime.lock().calls.get(), 2);
}

#[test]
fn fallthrough_is_a_marker() {
	let dispatcher = Dispatcher::new();
	let def = define(&dispatcher, "test::id(int a) -> int");
	let kernel = Kernel::fallthrough();

	assert!(kernel.is_fallthrough());
	assert_eq!(kernel.calling_convention(), CallingConvention::Fallthrough);
	assert!(kernel.call_boxed(&def.handle, KeySet::CPU, Vec::new()).is_err());
}
