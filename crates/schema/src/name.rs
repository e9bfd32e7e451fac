use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SchemaParseError;

/// Identity of an operator: its (possibly namespace-qualified) name plus an
/// overload name, which is empty for the default overload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorName {
	pub name: String,
	pub overload_name: String,
}

impl OperatorName {
	pub fn new(name: impl Into<String>, overload_name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			overload_name: overload_name.into(),
		}
	}

	/// Returns the namespace prefix (`aten` for `aten::add`), if qualified.
	pub fn namespace(&self) -> Option<&str> {
		self.name.split_once("::").map(|(ns, _)| ns)
	}

	/// Returns the name without its namespace prefix.
	pub fn base_name(&self) -> &str {
		self.name.split_once("::").map_or(self.name.as_str(), |(_, base)| base)
	}

	/// Returns a copy qualified with `namespace` unless already qualified.
	pub fn qualified(&self, namespace: &str) -> Self {
		if self.namespace().is_some() {
			return self.clone();
		}
		Self {
			name: format!("{namespace}::{}", self.name),
			overload_name: self.overload_name.clone(),
		}
	}
}

impl fmt::Display for OperatorName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.overload_name.is_empty() {
			f.write_str(&self.name)
		} else {
			write!(f, "{}.{}", self.name, self.overload_name)
		}
	}
}

impl std::str::FromStr for OperatorName {
	type Err = SchemaParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_name(s)
	}
}

/// Parses `ns::name[.overload]` into an [`OperatorName`].
pub fn parse_name(input: &str) -> Result<OperatorName, SchemaParseError> {
	let input = input.trim();
	if input.is_empty() {
		return Err(SchemaParseError::EmptyName { input: input.to_string() });
	}

	let (name, overload) = match input.rsplit_once('.') {
		Some((name, overload)) => (name, overload),
		None => (input, ""),
	};

	validate_name(name)?;
	if !overload.is_empty() && !overload.chars().all(is_ident_char) {
		return Err(SchemaParseError::InvalidName {
			name: input.to_string(),
			reason: "overload name must be an identifier",
		});
	}
	if input.ends_with('.') {
		return Err(SchemaParseError::InvalidName {
			name: input.to_string(),
			reason: "trailing '.' without an overload name",
		});
	}

	Ok(OperatorName::new(name, overload))
}

fn validate_name(name: &str) -> Result<(), SchemaParseError> {
	let mut parts = name.split("::");
	let (first, second, rest) = (parts.next(), parts.next(), parts.next());
	if rest.is_some() {
		return Err(SchemaParseError::InvalidName {
			name: name.to_string(),
			reason: "at most one namespace separator is allowed",
		});
	}
	for part in [first, second].into_iter().flatten() {
		if part.is_empty() {
			return Err(SchemaParseError::EmptyName { input: name.to_string() });
		}
		if !part.chars().all(is_ident_char) {
			return Err(SchemaParseError::InvalidName {
				name: name.to_string(),
				reason: "names may only contain alphanumerics and '_'",
			});
		}
	}
	Ok(())
}

fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}
