use pretty_assertions::assert_eq;

use super::*;

#[test]
fn parses_name_and_overload() {
	let name = parse_name("aten::add.out").unwrap();
	assert_eq!(name.name, "aten::add");
	assert_eq!(name.overload_name, "out");
	assert_eq!(name.namespace(), Some("aten"));
	assert_eq!(name.base_name(), "add");
	assert_eq!(name.to_string(), "aten::add.out");

	let bare = parse_name("foo").unwrap();
	assert_eq!(bare.overload_name, "");
	assert_eq!(bare.namespace(), None);
	assert_eq!(bare.qualified("test").to_string(), "test::foo");
	assert_eq!(name.qualified("other"), name, "qualified names keep their namespace");
}

#[test]
fn rejects_malformed_names() {
	assert!(matches!(parse_name(""), Err(SchemaParseError::EmptyName { .. })));
	assert!(matches!(parse_name("a::b::c"), Err(SchemaParseError::InvalidName { .. })));
	assert!(matches!(parse_name("foo."), Err(SchemaParseError::InvalidName { .. })));
	assert!(matches!(parse_name("foo-bar"), Err(SchemaParseError::InvalidName { .. })));
	assert!(matches!(parse_name("::foo"), Err(SchemaParseError::EmptyName { .. })));
}

#[test]
fn parses_single_return_schema() {
	let schema = parse_schema("foo(Tensor a) -> Tensor").unwrap();
	assert_eq!(schema.name, OperatorName::new("foo", ""));
	assert_eq!(schema.num_arguments(), 1);
	assert_eq!(schema.num_returns(), 1);
	assert_eq!(schema.arguments[0], Argument::new("a", "Tensor"));
	assert_eq!(schema.returns[0], Argument::new("", "Tensor"));
	assert_eq!(schema.alias_analysis, AliasAnalysisKind::FromSchema);
}

#[test]
fn parses_nested_types_defaults_and_kwarg_only() {
	let schema = parse_schema("test::bar.out(Tensor(a!) self, int[2] size=[1, 2], *, bool flag=False) -> (Tensor(a!) out, Tensor)").unwrap();
	assert_eq!(schema.name.to_string(), "test::bar.out");
	assert_eq!(schema.num_arguments(), 3);
	assert_eq!(schema.arguments[0].ty, "Tensor(a!)");
	assert_eq!(schema.arguments[1].default.as_deref(), Some("[1, 2]"));
	assert!(!schema.arguments[1].kwarg_only);
	assert!(schema.arguments[2].kwarg_only);
	assert_eq!(schema.num_returns(), 2);
	assert_eq!(schema.returns[0].name, "out");
	assert_eq!(
		schema.to_string(),
		"test::bar.out(Tensor(a!) self, int[2] size=[1, 2], *, bool flag=False) -> (Tensor(a!) out, Tensor)"
	);
}

#[test]
fn parses_empty_returns() {
	let schema = parse_schema("sink(Tensor a, Tensor b) -> ()").unwrap();
	assert_eq!(schema.num_arguments(), 2);
	assert_eq!(schema.num_returns(), 0);
	assert_eq!(schema.to_string(), "sink(Tensor a, Tensor b) -> ()");
}

#[test]
fn rejects_malformed_schemas() {
	assert!(matches!(parse_schema("foo"), Err(SchemaParseError::MissingArguments { .. })));
	assert!(matches!(parse_schema("foo(Tensor a"), Err(SchemaParseError::Unbalanced { .. })));
	assert!(matches!(parse_schema("foo(Tensor a)"), Err(SchemaParseError::MissingReturns { .. })));
	assert!(matches!(parse_schema("foo(Tensor) -> Tensor"), Err(SchemaParseError::MalformedArgument { .. })));
	assert!(matches!(parse_schema("foo(Tensor a, Tensor a) -> Tensor"), Err(SchemaParseError::DuplicateArgument { .. })));
	assert!(matches!(parse_schema("foo(Tensor a,) -> Tensor"), Err(SchemaParseError::MalformedArgument { .. })));
}

#[test]
fn alias_analysis_kind_parses_original_spellings() {
	assert_eq!("CONSERVATIVE".parse::<AliasAnalysisKind>().unwrap(), AliasAnalysisKind::Conservative);
	assert_eq!("FROM_SCHEMA".parse::<AliasAnalysisKind>().unwrap(), AliasAnalysisKind::FromSchema);
	assert_eq!("".parse::<AliasAnalysisKind>().unwrap(), AliasAnalysisKind::FromSchema);
	assert_eq!("PURE_FUNCTION".parse::<AliasAnalysisKind>().unwrap(), AliasAnalysisKind::PureFunction);
	assert!("pure".parse::<AliasAnalysisKind>().is_err());
	assert_eq!(AliasAnalysisKind::PureFunction.to_string(), "PURE_FUNCTION");
	assert_eq!(AliasAnalysisKind::FromSchema.to_string(), "FROM_SCHEMA");
}

#[test]
fn schemas_differing_in_alias_analysis_are_unequal() {
	let a = parse_schema("foo(Tensor a) -> Tensor").unwrap();
	let b = a.clone().with_alias_analysis(AliasAnalysisKind::PureFunction);
	assert_ne!(a, b);
}
