//! Dispatcher configuration.
//!
//! Loaded from TOML or built in code. The only behavioral knob is the alias
//! precedence table: when several alias kernels cover the same runtime key,
//! the alias listed first wins.
//!
//! ```toml
//! label = "inference"
//! alias_precedence = ["Dense", "CompositeExplicitAutograd", "CompositeImplicitAutograd", "Autograd"]
//! ```

use serde::{Deserialize, Serialize};

use crate::key::DispatchKey;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("invalid dispatcher config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("alias precedence does not rank {0}")]
	MissingAlias(DispatchKey),
	#[error("alias precedence lists {0} more than once")]
	DuplicateAlias(DispatchKey),
	#[error("alias precedence lists {0}, which is not an alias key")]
	NotAnAlias(DispatchKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
	/// Name carried in log records; distinguishes dispatchers in one process.
	pub label: String,
	/// Alias keys, most preferred first. Must rank every alias exactly once.
	pub alias_precedence: Vec<DispatchKey>,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			label: "dispatcher".to_string(),
			alias_precedence: vec![
				DispatchKey::Dense,
				DispatchKey::CompositeExplicitAutograd,
				DispatchKey::CompositeImplicitAutograd,
				DispatchKey::Autograd,
			],
		}
	}
}

impl DispatcherConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = label.into();
		self
	}

	pub fn with_alias_precedence(mut self, precedence: impl IntoIterator<Item = DispatchKey>) -> Self {
		self.alias_precedence = precedence.into_iter().collect();
		self
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		for (pos, &key) in self.alias_precedence.iter().enumerate() {
			if !key.is_alias() {
				return Err(ConfigError::NotAnAlias(key));
			}
			if self.alias_precedence[..pos].contains(&key) {
				return Err(ConfigError::DuplicateAlias(key));
			}
		}
		match DispatchKey::ALIASES.into_iter().find(|a| !self.alias_precedence.contains(a)) {
			Some(missing) => Err(ConfigError::MissingAlias(missing)),
			None => Ok(()),
		}
	}

	/// Position of `alias` in the precedence table; lower wins.
	pub fn precedence_rank(&self, alias: DispatchKey) -> Option<usize> {
		self.alias_precedence.iter().position(|k| *k == alias)
	}
}
