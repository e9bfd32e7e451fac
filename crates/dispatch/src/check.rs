//! Invariant reports.
//!
//! [`crate::Dispatcher::check_invariants`] recomputes every operator's table
//! from its live registrations and compares it with what lookups would serve.
//! Violations are returned as values rather than panics so callers decide
//! how loud to be.

use std::fmt;

use switchyard_schema::OperatorName;

use crate::key::DispatchKey;
use crate::registration::RegistrationId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
	/// A served slot still names a kernel whose registration was retracted.
	RetractedKernel { key: DispatchKey, id: RegistrationId, label: String },
	/// A served slot disagrees with a fresh resolution.
	SlotMismatch {
		key: DispatchKey,
		expected: Option<RegistrationId>,
		found: Option<RegistrationId>,
	},
	/// An alias kernel is registered but the precedence table does not rank it.
	UnrankedAlias { alias: DispatchKey },
	/// A registered alias leaves one of its runtime keys unresolved.
	UnresolvedAlias { alias: DispatchKey, key: DispatchKey },
	/// Several alias kernels cover `key` and at least one is unranked.
	AmbiguousAlias { key: DispatchKey, aliases: Vec<DispatchKey> },
	/// A native kernel's arity disagrees with the operator schema.
	ArityMismatch {
		key: Option<DispatchKey>,
		label: String,
		kernel: (usize, usize),
		schema: (usize, usize),
	},
}

impl fmt::Display for ViolationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::RetractedKernel { key, id, label } => write!(f, "{key} serves retracted kernel `{label}` ({id})"),
			Self::SlotMismatch { key, expected, found } => {
				write!(f, "{key} serves {} but resolves to {}", fmt_id(*found), fmt_id(*expected))
			}
			Self::UnrankedAlias { alias } => write!(f, "alias {alias} has a kernel but no precedence rank"),
			Self::UnresolvedAlias { alias, key } => write!(f, "alias {alias} leaves {key} unresolved"),
			Self::AmbiguousAlias { key, aliases } => write!(f, "{key} is claimed by unordered aliases {aliases:?}"),
			Self::ArityMismatch { key, label, kernel, schema } => {
				let slot = key.map_or_else(|| "catch-all".to_string(), |k| k.to_string());
				write!(
					f,
					"{slot} kernel `{label}` has arity {}/{} but the schema declares {}/{}",
					kernel.0, kernel.1, schema.0, schema.1
				)
			}
		}
	}
}

fn fmt_id(id: Option<RegistrationId>) -> String {
	id.map_or_else(|| "nothing".to_string(), |id| id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
	/// `None` for process-level violations.
	pub operator: Option<OperatorName>,
	pub kind: ViolationKind,
}

impl fmt::Display for Violation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.operator {
			Some(op) => write!(f, "{op}: {}", self.kind),
			None => write!(f, "{}", self.kind),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvariantReport {
	pub violations: Vec<Violation>,
}

impl InvariantReport {
	pub fn is_ok(&self) -> bool {
		self.violations.is_empty()
	}
}

impl fmt::Display for InvariantReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_ok() {
			return f.write_str("ok");
		}
		for v in &self.violations {
			writeln!(f, "{v}")?;
		}
		Ok(())
	}
}
