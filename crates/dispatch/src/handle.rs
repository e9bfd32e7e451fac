//! Operator handles and the call path.

use std::fmt;
use std::sync::Arc;

use switchyard_schema::{FunctionSchema, OperatorName};

use crate::check::InvariantReport;
use crate::dispatcher::{Dispatcher, Inner};
use crate::entry::OperatorEntry;
use crate::error::DispatchError;
use crate::kernel::Kernel;
use crate::key::DispatchKey;
use crate::keyset::KeySet;
use crate::table::ComputedTableView;
use crate::value::{Stack, Value, Values};

/// A stable reference to one operator. Cheap to clone; stays valid for as
/// long as the dispatcher it came from, even if every registration of the
/// operator is retracted.
#[derive(Clone)]
pub struct OperatorHandle {
	entry: Arc<OperatorEntry>,
	inner: Arc<Inner>,
}

impl OperatorHandle {
	pub(crate) fn new(entry: Arc<OperatorEntry>, inner: Arc<Inner>) -> Self {
		Self { entry, inner }
	}

	pub fn operator_name(&self) -> &OperatorName {
		self.entry.name()
	}

	pub fn schema(&self) -> Option<FunctionSchema> {
		self.entry.schema()
	}

	pub fn has_schema(&self) -> bool {
		self.entry.has_schema()
	}

	/// The dispatcher this operator is registered with.
	pub fn dispatcher(&self) -> Dispatcher {
		Dispatcher::from_inner(Arc::clone(&self.inner))
	}

	/// Resolves the kernel for `active` under the calling thread's local
	/// key state.
	#[inline]
	pub fn lookup(&self, active: KeySet) -> Result<Kernel, DispatchError> {
		self.entry.lookup(&self.inner, active)
	}

	/// Pops the schema's arguments off `stack`, dispatches on the keys they
	/// carry and pushes the results. The stack is left untouched when no
	/// kernel can be resolved.
	pub fn call_boxed(&self, stack: &mut Stack) -> Result<(), DispatchError> {
		let start = self.argument_start(stack)?;
		let active = stack[start..].iter().fold(KeySet::empty(), |acc, v| acc | v.key_set());
		self.invoke(active, start, stack)
	}

	/// Like [`Self::call_boxed`] with an explicit active key set.
	pub fn call_boxed_with_keys(&self, active: KeySet, stack: &mut Stack) -> Result<(), DispatchError> {
		let start = self.argument_start(stack)?;
		self.invoke(active, start, stack)
	}

	/// Typed entry point. Native kernels with matching types are called
	/// without boxing.
	pub fn call<A: Values, R: Values>(&self, active: KeySet, args: A) -> Result<R, DispatchError> {
		let kernel = self.lookup(active)?;
		kernel.call_typed(self, active, args).map_err(|source| DispatchError::KernelInvocation {
			name: self.operator_name().clone(),
			source,
		})
	}

	/// Index of the first argument on `stack`.
	fn argument_start(&self, stack: &Stack) -> Result<usize, DispatchError> {
		let schema = self.schema().ok_or_else(|| DispatchError::NoSchema {
			name: self.operator_name().clone(),
		})?;
		let needed = schema.num_arguments();
		stack.len().checked_sub(needed).ok_or_else(|| DispatchError::StackUnderflow {
			name: self.operator_name().clone(),
			needed,
			available: stack.len(),
		})
	}

	fn invoke(&self, active: KeySet, start: usize, stack: &mut Stack) -> Result<(), DispatchError> {
		let kernel = self.lookup(active)?;
		let args = stack.split_off(start);
		let name = self.operator_name();
		let returns = kernel.call_boxed(self, active, args).map_err(|source| DispatchError::KernelInvocation {
			name: name.clone(),
			source,
		})?;

		let expected = self.schema().map_or(returns.len(), |s| s.num_returns());
		if returns.len() != expected {
			return Err(DispatchError::KernelInvocation {
				name: name.clone(),
				source: crate::KernelError::new(format!(
					"kernel `{}` returned {} values, schema declares {expected}",
					kernel.label(),
					returns.len()
				)),
			});
		}
		stack.extend(returns);
		Ok(())
	}

	pub fn computed_table(&self) -> ComputedTableView {
		self.entry.computed_view(&self.inner)
	}

	pub fn dump_state(&self) -> String {
		self.entry.dump_state()
	}

	pub fn dump_computed_table(&self) -> String {
		self.entry.dump_computed_table(&self.inner)
	}

	pub fn has_kernel_for_key(&self, key: DispatchKey) -> bool {
		self.entry.has_kernel_for_key(key)
	}

	pub fn has_computed_kernel_for_key(&self, key: DispatchKey) -> bool {
		self.entry.has_computed_kernel_for_key(&self.inner, key)
	}

	/// Keys with a direct registration, aliases included.
	pub fn registered_keys(&self) -> Vec<DispatchKey> {
		self.entry.registered_keys()
	}

	pub fn check_invariants(&self) -> InvariantReport {
		let _epoch = self.inner.epoch.write();
		InvariantReport {
			violations: self.entry.check_invariants(&self.inner),
		}
	}
}

impl PartialEq for OperatorHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.entry, &other.entry)
	}
}

impl Eq for OperatorHandle {}

impl fmt::Debug for OperatorHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OperatorHandle")
			.field("name", self.operator_name())
			.field("has_schema", &self.has_schema())
			.finish()
	}
}
