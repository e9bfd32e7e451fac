//! Kernel callables and their calling conventions.
//!
//! # Role
//!
//! A [`Kernel`] is an opaque callable plus a debug label. It is a tagged
//! variant rather than a trait object hierarchy: native kernels keep their
//! statically-typed function for direct calls and carry a boxed adapter for
//! stack-based calls, boxed kernels only speak the stack convention, and a
//! fallthrough kernel is a marker that makes lookup skip its key.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::KernelError;
use crate::handle::OperatorHandle;
use crate::keyset::KeySet;
use crate::value::{Value, Values};

/// Stack-convention callable. Receives exactly the schema's arguments in
/// order and must return exactly the schema's returns.
pub type BoxedFn = dyn Fn(&OperatorHandle, KeySet, Vec<Value>) -> Result<Vec<Value>, KernelError> + Send + Sync;

type NativeFn<A, R> = dyn Fn(A) -> Result<R, KernelError> + Send + Sync;

struct TypedFn<A, R>(Arc<NativeFn<A, R>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
	Native,
	Boxed,
	Fallthrough,
}

impl fmt::Display for CallingConvention {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Native => "native",
			Self::Boxed => "boxed",
			Self::Fallthrough => "fallthrough",
		})
	}
}

#[derive(Clone)]
enum Repr {
	Native {
		typed: Arc<dyn Any + Send + Sync>,
		boxed: Arc<BoxedFn>,
		num_arguments: usize,
		num_returns: usize,
	},
	Boxed(Arc<BoxedFn>),
	Fallthrough,
}

/// A registered callable.
#[derive(Clone)]
pub struct Kernel {
	label: Arc<str>,
	repr: Repr,
}

impl Kernel {
	/// Wraps a statically-typed function. `A` and `R` are tuples of
	/// [`crate::IValue`] types matching the schema's arguments and returns.
	pub fn native<A, R, F>(label: impl Into<Arc<str>>, f: F) -> Self
	where
		A: Values,
		R: Values,
		F: Fn(A) -> Result<R, KernelError> + Send + Sync + 'static,
	{
		let f: Arc<NativeFn<A, R>> = Arc::new(f);
		let typed = TypedFn(Arc::clone(&f));
		let boxed: Arc<BoxedFn> = Arc::new(move |_op: &OperatorHandle, _keys: KeySet, args: Vec<Value>| {
			let ret = f(A::from_values(args)?)?;
			Ok(ret.into_values())
		});
		Self {
			label: label.into(),
			repr: Repr::Native {
				typed: Arc::new(typed),
				boxed,
				num_arguments: A::LEN,
				num_returns: R::LEN,
			},
		}
	}

	/// Wraps a stack-convention callable.
	pub fn boxed<F>(label: impl Into<Arc<str>>, f: F) -> Self
	where
		F: Fn(&OperatorHandle, KeySet, Vec<Value>) -> Result<Vec<Value>, KernelError> + Send + Sync + 'static,
	{
		Self {
			label: label.into(),
			repr: Repr::Boxed(Arc::new(f)),
		}
	}

	/// Wraps a callable owned by a foreign runtime. The runtime lock is held
	/// for exactly the duration of the call and any failure the callable
	/// reports is converted into a [`KernelError`].
	///
	/// The lock is re-entrant: a foreign kernel may redispatch into another
	/// kernel on the same runtime from its own thread. The callable only gets
	/// shared access, so runtime state it mutates needs interior mutability.
	pub fn foreign<Rt, F, E>(label: impl Into<Arc<str>>, runtime: Arc<ReentrantMutex<Rt>>, f: F) -> Self
	where
		Rt: Send + 'static,
		F: Fn(&Rt, &OperatorHandle, Vec<Value>) -> Result<Vec<Value>, E> + Send + Sync + 'static,
		E: fmt::Display,
	{
		let label: Arc<str> = label.into();
		let name = Arc::clone(&label);
		Self::boxed(label, move |op, _keys, args| {
			let result = {
				let guard = runtime.lock();
				f(&guard, op, args)
			};
			result.map_err(|err| KernelError::new(format!("{name}: {err}")))
		})
	}

	/// A marker that makes dispatch continue with the next lower-priority key.
	pub fn fallthrough() -> Self {
		Self {
			label: Arc::from("fallthrough"),
			repr: Repr::Fallthrough,
		}
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
		self.label = label.into();
		self
	}

	pub fn calling_convention(&self) -> CallingConvention {
		match self.repr {
			Repr::Native { .. } => CallingConvention::Native,
			Repr::Boxed(_) => CallingConvention::Boxed,
			Repr::Fallthrough => CallingConvention::Fallthrough,
		}
	}

	pub fn is_fallthrough(&self) -> bool {
		matches!(self.repr, Repr::Fallthrough)
	}

	/// Declared `(arguments, returns)` counts; only native kernels know them.
	pub fn arity(&self) -> Option<(usize, usize)> {
		match self.repr {
			Repr::Native {
				num_arguments,
				num_returns,
				..
			} => Some((num_arguments, num_returns)),
			_ => None,
		}
	}

	/// Invokes through the stack convention.
	pub(crate) fn call_boxed(&self, op: &OperatorHandle, keys: KeySet, args: Vec<Value>) -> Result<Vec<Value>, KernelError> {
		match &self.repr {
			Repr::Native { boxed, .. } | Repr::Boxed(boxed) => boxed(op, keys, args),
			Repr::Fallthrough => Err(KernelError::new("a fallthrough kernel cannot be invoked")),
		}
	}

	/// Invokes with typed arguments. Native kernels whose types match are
	/// called directly; everything else goes through the boxed adapter.
	pub(crate) fn call_typed<A: Values, R: Values>(&self, op: &OperatorHandle, keys: KeySet, args: A) -> Result<R, KernelError> {
		if let Repr::Native { typed, .. } = &self.repr {
			if let Some(TypedFn(f)) = typed.downcast_ref::<TypedFn<A, R>>() {
				return f(args);
			}
		}
		let ret = self.call_boxed(op, keys, args.into_values())?;
		R::from_values(ret)
	}
}

impl fmt::Debug for Kernel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Kernel")
			.field("label", &self.label)
			.field("convention", &self.calling_convention())
			.finish()
	}
}

#[cfg(test)]
mod tests;
