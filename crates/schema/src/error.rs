/// Failures produced while parsing an operator name or schema string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaParseError {
	#[error("empty operator name in {input:?}")]
	EmptyName { input: String },

	#[error("invalid operator name {name:?}: {reason}")]
	InvalidName { name: String, reason: &'static str },

	#[error("expected '(' after operator name in {input:?}")]
	MissingArguments { input: String },

	#[error("unbalanced brackets in {input:?}")]
	Unbalanced { input: String },

	#[error("expected '->' followed by a return type in {input:?}")]
	MissingReturns { input: String },

	#[error("malformed argument {arg:?} in {input:?}")]
	MalformedArgument { arg: String, input: String },

	#[error("duplicate argument name {name:?} in {input:?}")]
	DuplicateArgument { name: String, input: String },
}
