use std::fmt;

use serde::{Deserialize, Serialize};

use crate::OperatorName;

/// How the surrounding system reasons about aliasing between an operator's
/// inputs and outputs. Dispatch resolution never consults it; it is recorded
/// so that conflicting redefinitions can be rejected.
#[derive(
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	Hash,
	Serialize,
	Deserialize,
	strum_macros::EnumString,
	strum_macros::Display,
	strum_macros::IntoStaticStr,
)]
pub enum AliasAnalysisKind {
	#[strum(serialize = "CONSERVATIVE")]
	#[serde(rename = "CONSERVATIVE")]
	Conservative,
	/// Aliasing is described by annotations in the schema itself.
	#[default]
	#[strum(to_string = "FROM_SCHEMA", serialize = "")]
	#[serde(rename = "FROM_SCHEMA")]
	FromSchema,
	#[strum(serialize = "PURE_FUNCTION")]
	#[serde(rename = "PURE_FUNCTION")]
	PureFunction,
}

/// A single formal argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Argument {
	/// Empty for unnamed return values.
	pub name: String,
	/// The type exactly as written, e.g. `Tensor(a!)` or `int[2]`.
	pub ty: String,
	pub default: Option<String>,
	pub kwarg_only: bool,
}

impl Argument {
	pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			ty: ty.into(),
			default: None,
			kwarg_only: false,
		}
	}
}

impl fmt::Display for Argument {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.ty)?;
		if !self.name.is_empty() {
			write!(f, " {}", self.name)?;
		}
		if let Some(default) = &self.default {
			write!(f, "={default}")?;
		}
		Ok(())
	}
}

/// A parsed operator signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionSchema {
	pub name: OperatorName,
	pub arguments: Vec<Argument>,
	pub returns: Vec<Argument>,
	pub alias_analysis: AliasAnalysisKind,
}

impl FunctionSchema {
	pub fn new(name: OperatorName, arguments: Vec<Argument>, returns: Vec<Argument>) -> Self {
		Self {
			name,
			arguments,
			returns,
			alias_analysis: AliasAnalysisKind::default(),
		}
	}

	pub fn with_alias_analysis(mut self, kind: AliasAnalysisKind) -> Self {
		self.alias_analysis = kind;
		self
	}

	/// Returns a copy whose name is qualified with `namespace`.
	pub fn qualified(&self, namespace: &str) -> Self {
		Self {
			name: self.name.qualified(namespace),
			..self.clone()
		}
	}

	pub fn num_arguments(&self) -> usize {
		self.arguments.len()
	}

	pub fn num_returns(&self) -> usize {
		self.returns.len()
	}
}

impl fmt::Display for FunctionSchema {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}(", self.name)?;
		let mut saw_kwarg_only = false;
		for (i, arg) in self.arguments.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			if arg.kwarg_only && !saw_kwarg_only {
				f.write_str("*, ")?;
				saw_kwarg_only = true;
			}
			write!(f, "{arg}")?;
		}
		f.write_str(") -> ")?;
		match self.returns.as_slice() {
			[single] if single.name.is_empty() => write!(f, "{single}"),
			returns => {
				f.write_str("(")?;
				for (i, ret) in returns.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{ret}")?;
				}
				f.write_str(")")
			}
		}
	}
}
