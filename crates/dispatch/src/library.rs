//! Registration sessions.
//!
//! # Role
//!
//! A [`Library`] is one registration context: it defines schemas
//! ([`LibraryKind::Def`], [`LibraryKind::Fragment`]), implements kernels, and
//! registers fallbacks ([`LibraryKind::Impl`] on the wildcard namespace `_`).
//! It owns a token for everything it adds; closing or dropping it retracts
//! all of them.
//!
//! # Invariants
//!
//! - At most one live `DEF` session per namespace.
//! - A `FRAGMENT` session needs a live `DEF` session for its namespace.
//! - Closing retracts every owned registration under the dispatcher's
//!   exclusive epoch, so no invariant check observes a half-closed session.
//! - Every call on a closed session fails with
//!   [`DispatchError::SessionClosed`].

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchyard_schema::{AliasAnalysisKind, FunctionSchema, OperatorName, parse_name, parse_schema};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::handle::OperatorHandle;
use crate::kernel::Kernel;
use crate::key::DispatchKey;
use crate::registration::RegistrationToken;

/// Namespace that holds process fallbacks rather than operators.
pub const WILDCARD_NAMESPACE: &str = "_";

#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	Serialize,
	Deserialize,
	strum_macros::Display,
	strum_macros::EnumString,
	strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LibraryKind {
	/// Owns a namespace and defines its operators.
	Def,
	/// Only registers kernels, for operators defined anywhere.
	Impl,
	/// Adds definitions to a namespace owned by a live `DEF` session.
	Fragment,
}

/// A source position used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
	pub file: &'static str,
	pub line: u32,
}

impl SourceLocation {
	/// The location of the outermost `#[track_caller]` frame.
	#[track_caller]
	pub fn caller() -> Self {
		let loc = Location::caller();
		Self {
			file: loc.file(),
			line: loc.line(),
		}
	}

	pub(crate) fn registered_at(self) -> Arc<str> {
		Arc::from(format!("registered at {self}"))
	}
}

impl fmt::Display for SourceLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.file, self.line)
	}
}

/// One registration session.
pub struct Library {
	dispatcher: Dispatcher,
	kind: LibraryKind,
	namespace: String,
	key: Option<DispatchKey>,
	location: SourceLocation,
	/// `None` once closed.
	tokens: Option<Vec<RegistrationToken>>,
}

impl Library {
	/// Opens a session on `dispatcher`. `key` fixes the dispatch key for
	/// every kernel and fallback the session registers.
	#[track_caller]
	pub fn new(dispatcher: &Dispatcher, kind: LibraryKind, namespace: &str, key: Option<DispatchKey>) -> Result<Self, DispatchError> {
		Self::open(dispatcher, kind, namespace, key, SourceLocation::caller())
	}

	pub fn open(dispatcher: &Dispatcher, kind: LibraryKind, namespace: &str, key: Option<DispatchKey>, location: SourceLocation) -> Result<Self, DispatchError> {
		if key == Some(DispatchKey::Undefined) {
			return Err(DispatchError::NotAConcreteKey {
				key: DispatchKey::Undefined,
			});
		}

		let mut tokens = Vec::new();
		match kind {
			LibraryKind::Def if namespace == WILDCARD_NAMESPACE => {
				return Err(DispatchError::InvalidSessionCall {
					operation: "claiming a namespace",
					kind,
					namespace: namespace.to_string(),
				});
			}
			LibraryKind::Def => tokens.push(dispatcher.inner.claim_namespace(namespace, location)?),
			LibraryKind::Fragment if !dispatcher.is_namespace_claimed(namespace) => {
				return Err(DispatchError::UnknownNamespace {
					namespace: namespace.to_string(),
				});
			}
			LibraryKind::Fragment | LibraryKind::Impl => {}
		}

		tracing::debug!(registry = %dispatcher.config().label, %kind, namespace, key = ?key, %location, "opened library");
		Ok(Self {
			dispatcher: dispatcher.clone(),
			kind,
			namespace: namespace.to_string(),
			key,
			location,
			tokens: Some(tokens),
		})
	}

	pub fn kind(&self) -> LibraryKind {
		self.kind
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn dispatch_key(&self) -> Option<DispatchKey> {
		self.key
	}

	pub fn location(&self) -> SourceLocation {
		self.location
	}

	pub fn is_closed(&self) -> bool {
		self.tokens.is_none()
	}

	/// Live registrations owned by this session, the namespace claim included.
	pub fn num_registrations(&self) -> usize {
		self.tokens.as_ref().map_or(0, |t| t.iter().filter(|t| !t.is_released()).count())
	}

	fn tokens_mut(&mut self) -> Result<&mut Vec<RegistrationToken>, DispatchError> {
		let namespace = &self.namespace;
		self.tokens.as_mut().ok_or_else(|| DispatchError::SessionClosed {
			namespace: namespace.clone(),
		})
	}

	fn ensure_open(&self) -> Result<(), DispatchError> {
		match self.tokens {
			Some(_) => Ok(()),
			None => Err(DispatchError::SessionClosed {
				namespace: self.namespace.clone(),
			}),
		}
	}

	fn qualify(&self, name: &OperatorName) -> Result<OperatorName, DispatchError> {
		let qualified = name.qualified(&self.namespace);
		if self.namespace == WILDCARD_NAMESPACE || qualified.namespace() != Some(self.namespace.as_str()) {
			return Err(DispatchError::NamespaceMismatch {
				name: name.clone(),
				namespace: self.namespace.clone(),
			});
		}
		Ok(qualified)
	}

	fn resolve_key(&self, requested: Option<DispatchKey>) -> Result<Option<DispatchKey>, DispatchError> {
		match (self.key, requested) {
			(Some(session), Some(requested)) if session != requested => Err(DispatchError::KeyMismatch { session, requested }),
			(session, requested) => Ok(requested.or(session)),
		}
	}

	/// Parses and defines `schema` with the default alias analysis.
	#[track_caller]
	pub fn define(&mut self, schema: &str) -> Result<OperatorHandle, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.ensure_open()?;
		self.define_parsed(parse_schema(schema)?, debug)
	}

	#[track_caller]
	pub fn define_with_alias(&mut self, schema: &str, alias_analysis: AliasAnalysisKind) -> Result<OperatorHandle, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.ensure_open()?;
		self.define_parsed(parse_schema(schema)?.with_alias_analysis(alias_analysis), debug)
	}

	#[track_caller]
	pub fn define_schema(&mut self, schema: FunctionSchema) -> Result<OperatorHandle, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.define_parsed(schema, debug)
	}

	fn define_parsed(&mut self, schema: FunctionSchema, debug: Arc<str>) -> Result<OperatorHandle, DispatchError> {
		self.ensure_open()?;
		if self.kind == LibraryKind::Impl {
			return Err(DispatchError::InvalidSessionCall {
				operation: "define",
				kind: self.kind,
				namespace: self.namespace.clone(),
			});
		}
		let schema = FunctionSchema {
			name: self.qualify(&schema.name)?,
			..schema
		};
		let definition = self.dispatcher.define_schema_with_debug(schema, debug)?;
		self.tokens_mut()?.push(definition.token);
		Ok(definition.handle)
	}

	/// Defines `schema` and registers `kernel` for it at the session key, or
	/// at `CompositeImplicitAutograd` when the session has none. Nothing is
	/// kept if either step fails.
	#[track_caller]
	pub fn define_with_kernel(&mut self, schema: &str, kernel: Kernel) -> Result<OperatorHandle, DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.ensure_open()?;
		let handle = self.define_parsed(parse_schema(schema)?, Arc::clone(&debug))?;
		let key = self.key.unwrap_or(DispatchKey::CompositeImplicitAutograd);
		let registered = self.dispatcher.register_kernel_with_debug(handle.operator_name(), Some(key), kernel, debug);
		match registered {
			Ok(token) => {
				self.tokens_mut()?.push(token);
				Ok(handle)
			}
			Err(err) => {
				if let Some(mut definition) = self.tokens_mut()?.pop() {
					definition.release();
				}
				Err(err)
			}
		}
	}

	/// Registers `kernel` for `name` at `key`, or at the session key when
	/// `key` is `None`. With neither, the kernel becomes the operator's
	/// catch-all.
	#[track_caller]
	pub fn implement(&mut self, name: &str, key: Option<DispatchKey>, kernel: Kernel) -> Result<(), DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.ensure_open()?;
		let name = self.qualify(&parse_name(name)?)?;
		let key = self.resolve_key(key)?;
		let token = self.dispatcher.register_kernel_with_debug(&name, key, kernel, debug)?;
		self.tokens_mut()?.push(token);
		Ok(())
	}

	/// Registers a process fallback at the session key, or the global
	/// catch-all fallback when the session has no key.
	#[track_caller]
	pub fn fallback(&mut self, kernel: Kernel) -> Result<(), DispatchError> {
		let debug = SourceLocation::caller().registered_at();
		self.ensure_open()?;
		if self.kind != LibraryKind::Impl || self.namespace != WILDCARD_NAMESPACE {
			return Err(DispatchError::InvalidSessionCall {
				operation: "fallback",
				kind: self.kind,
				namespace: self.namespace.clone(),
			});
		}
		let token = self.dispatcher.register_fallback_with_debug(self.key, kernel, debug)?;
		self.tokens_mut()?.push(token);
		Ok(())
	}

	/// Makes the session key fall through to the next key for every operator.
	#[track_caller]
	pub fn fallback_fallthrough(&mut self) -> Result<(), DispatchError> {
		self.fallback(Kernel::fallthrough())
	}

	/// Retracts everything this session registered. Idempotent.
	pub fn close(&mut self) {
		let Some(mut tokens) = self.tokens.take() else {
			return;
		};
		let inner = &self.dispatcher.inner;
		{
			let _epoch = inner.epoch.write();
			for token in tokens.iter_mut().rev() {
				token.release_locked(inner);
			}
		}
		tracing::debug!(
			registry = %inner.config.label,
			kind = %self.kind,
			namespace = %self.namespace,
			registrations = tokens.len(),
			"closed library"
		);
	}
}

impl Drop for Library {
	fn drop(&mut self) {
		self.close();
	}
}

impl fmt::Debug for Library {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Library")
			.field("kind", &self.kind)
			.field("namespace", &self.namespace)
			.field("key", &self.key)
			.field("location", &self.location)
			.field("closed", &self.is_closed())
			.finish()
	}
}

#[cfg(test)]
mod tests;
