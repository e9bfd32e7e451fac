use crate::{Argument, FunctionSchema, SchemaParseError, parse_name};

/// Parses a schema string into a [`FunctionSchema`] with the default alias
/// analysis kind.
pub fn parse_schema(input: &str) -> Result<FunctionSchema, SchemaParseError> {
	let trimmed = input.trim();
	let open = trimmed
		.find('(')
		.ok_or_else(|| SchemaParseError::MissingArguments { input: input.to_string() })?;
	let name = parse_name(&trimmed[..open])?;

	let close = matching_paren(trimmed, open).ok_or_else(|| SchemaParseError::Unbalanced { input: input.to_string() })?;
	let arguments = parse_arguments(&trimmed[open + 1..close], input)?;

	let rest = trimmed[close + 1..].trim_start();
	let returns_src = rest
		.strip_prefix("->")
		.map(str::trim)
		.filter(|r| !r.is_empty())
		.ok_or_else(|| SchemaParseError::MissingReturns { input: input.to_string() })?;
	let returns = parse_returns(returns_src, input)?;

	Ok(FunctionSchema::new(name, arguments, returns))
}

fn parse_arguments(src: &str, input: &str) -> Result<Vec<Argument>, SchemaParseError> {
	let mut arguments: Vec<Argument> = Vec::new();
	let mut kwarg_only = false;
	for piece in split_top_level(src, input)? {
		if piece == "*" {
			kwarg_only = true;
			continue;
		}
		let mut arg = parse_argument(piece, true, input)?;
		arg.kwarg_only = kwarg_only;
		if arguments.iter().any(|a| a.name == arg.name) {
			return Err(SchemaParseError::DuplicateArgument {
				name: arg.name,
				input: input.to_string(),
			});
		}
		arguments.push(arg);
	}
	Ok(arguments)
}

fn parse_returns(src: &str, input: &str) -> Result<Vec<Argument>, SchemaParseError> {
	if src.starts_with('(') {
		let close = matching_paren(src, 0).ok_or_else(|| SchemaParseError::Unbalanced { input: input.to_string() })?;
		if !src[close + 1..].trim().is_empty() {
			return Err(SchemaParseError::MalformedArgument {
				arg: src.to_string(),
				input: input.to_string(),
			});
		}
		return split_top_level(&src[1..close], input)?
			.into_iter()
			.map(|piece| parse_argument(piece, false, input))
			.collect();
	}
	Ok(vec![parse_argument(src, false, input)?])
}

/// Parses `type [name][=default]`. Return values may omit the name.
fn parse_argument(piece: &str, require_name: bool, input: &str) -> Result<Argument, SchemaParseError> {
	let malformed = || SchemaParseError::MalformedArgument {
		arg: piece.to_string(),
		input: input.to_string(),
	};

	let (decl, default) = match piece.split_once('=') {
		Some((decl, default)) => (decl.trim(), Some(default.trim().to_string())),
		None => (piece.trim(), None),
	};
	if default.as_deref() == Some("") {
		return Err(malformed());
	}

	let (ty, name) = match decl.rsplit_once(char::is_whitespace) {
		Some((ty, name)) if depth_at_end(ty) == 0 => (ty.trim(), name.trim()),
		_ => (decl, ""),
	};
	if ty.is_empty() || (require_name && name.is_empty()) {
		return Err(malformed());
	}
	if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
		return Err(malformed());
	}

	Ok(Argument {
		name: name.to_string(),
		ty: ty.to_string(),
		default,
		kwarg_only: false,
	})
}

/// Splits on commas that are not nested inside `()` or `[]`.
fn split_top_level<'a>(src: &'a str, input: &str) -> Result<Vec<&'a str>, SchemaParseError> {
	let mut pieces = Vec::new();
	let mut depth = 0i32;
	let mut start = 0;
	for (i, c) in src.char_indices() {
		match c {
			'(' | '[' => depth += 1,
			')' | ']' => {
				depth -= 1;
				if depth < 0 {
					return Err(SchemaParseError::Unbalanced { input: input.to_string() });
				}
			}
			',' if depth == 0 => {
				pieces.push(src[start..i].trim());
				start = i + 1;
			}
			_ => {}
		}
	}
	if depth != 0 {
		return Err(SchemaParseError::Unbalanced { input: input.to_string() });
	}
	let tail = src[start..].trim();
	if !tail.is_empty() {
		pieces.push(tail);
	} else if !pieces.is_empty() {
		return Err(SchemaParseError::MalformedArgument {
			arg: String::new(),
			input: input.to_string(),
		});
	}
	Ok(pieces)
}

fn matching_paren(src: &str, open: usize) -> Option<usize> {
	let mut depth = 0usize;
	for (i, c) in src[open..].char_indices() {
		match c {
			'(' => depth += 1,
			')' => {
				depth -= 1;
				if depth == 0 {
					return Some(open + i);
				}
			}
			_ => {}
		}
	}
	None
}

fn depth_at_end(s: &str) -> i32 {
	s.chars().fold(0, |depth, c| match c {
		'(' | '[' => depth + 1,
		')' | ']' => depth - 1,
		_ => depth,
	})
}
