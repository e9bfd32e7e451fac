use switchyard_schema::{OperatorName, SchemaParseError};

use crate::key::DispatchKey;
use crate::keyset::KeySet;
use crate::library::SourceLocation;

/// Error produced by a kernel body. Boxed kernels wrapping a foreign
/// runtime translate that runtime's failures into this type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct KernelError {
	pub message: String,
}

impl KernelError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Dispatcher failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
	#[error("schema conflict for {name}: existing `{existing}`, incoming `{incoming}`")]
	SchemaConflict { name: OperatorName, existing: String, incoming: String },

	#[error("duplicate registration for {target} at {}: slot already held by `{existing}`", slot_name(.key))]
	DuplicateRegistration {
		target: String,
		key: Option<DispatchKey>,
		existing: String,
	},

	#[error("no applicable dispatch key for {name}: active set {active} is empty after thread-local include/exclude")]
	NoApplicableKey { name: OperatorName, active: KeySet },

	#[error("no kernel for {name} at dispatch key {key}")]
	MissingKernel { name: OperatorName, key: DispatchKey },

	#[error("kernel for {name} failed: {source}")]
	KernelInvocation {
		name: OperatorName,
		#[source]
		source: KernelError,
	},

	#[error("registration session for namespace {namespace:?} is closed")]
	SessionClosed { namespace: String },

	#[error("operator {0} does not exist")]
	UnknownOperator(OperatorName),

	#[error("unknown dispatch key {0:?}")]
	UnknownDispatchKey(String),

	#[error("{key} is not a runtime dispatch key")]
	NotAConcreteKey { key: DispatchKey },

	#[error(transparent)]
	Schema(#[from] SchemaParseError),

	#[error("namespace {namespace:?} is already defined by a session opened at {existing}")]
	NamespaceConflict { namespace: String, existing: SourceLocation },

	#[error("namespace {namespace:?} has no live definition session")]
	UnknownNamespace { namespace: String },

	#[error("{name} does not belong to namespace {namespace:?}")]
	NamespaceMismatch { name: OperatorName, namespace: String },

	#[error("{operation} is not allowed in a {kind} session for namespace {namespace:?}")]
	InvalidSessionCall {
		operation: &'static str,
		kind: crate::library::LibraryKind,
		namespace: String,
	},

	#[error("session is fixed to {session} but the call names {requested}")]
	KeyMismatch { session: DispatchKey, requested: DispatchKey },

	#[error("{name} has no schema, so its boxed arity is unknown")]
	NoSchema { name: OperatorName },

	#[error("stack underflow calling {name}: needs {needed} arguments, stack holds {available}")]
	StackUnderflow { name: OperatorName, needed: usize, available: usize },

	#[error("signature mismatch for {name}: {detail}")]
	SignatureMismatch { name: OperatorName, detail: String },
}

fn slot_name(key: &Option<DispatchKey>) -> String {
	match key {
		Some(key) => key.to_string(),
		None => "catch-all".to_string(),
	}
}
