//! Dynamically-typed values for the boxed calling convention.
//!
//! The dispatcher does not own a tensor type. Anything that participates in
//! key computation travels as an [`Object`]: an opaque payload tagged with
//! the dispatch keys it carries.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::KernelError;
use crate::keyset::KeySet;

/// Ordered stack of values; arguments are pushed first-to-last and the
/// dispatcher pops exactly as many as the schema declares.
pub type Stack = Vec<Value>;

#[derive(Clone, Default)]
pub enum Value {
	#[default]
	None,
	Bool(bool),
	Int(i64),
	Double(f64),
	Str(Arc<str>),
	List(Vec<Value>),
	Object(Object),
}

impl Value {
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::None => "None",
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::Double(_) => "float",
			Value::Str(_) => "str",
			Value::List(_) => "list",
			Value::Object(_) => "object",
		}
	}

	/// Dispatch keys carried by this value, including list elements.
	pub fn key_set(&self) -> KeySet {
		match self {
			Value::Object(obj) => obj.keys,
			Value::List(items) => items.iter().fold(KeySet::empty(), |acc, v| acc | v.key_set()),
			_ => KeySet::empty(),
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::None => f.write_str("None"),
			Value::Bool(v) => write!(f, "{v:?}"),
			Value::Int(v) => write!(f, "{v:?}"),
			Value::Double(v) => write!(f, "{v:?}"),
			Value::Str(v) => write!(f, "{v:?}"),
			Value::List(v) => f.debug_list().entries(v).finish(),
			Value::Object(obj) => write!(f, "{obj:?}"),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::None, Value::None) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Double(a), Value::Double(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::List(a), Value::List(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

/// Opaque payload tagged with dispatch keys.
#[derive(Clone)]
pub struct Object {
	pub keys: KeySet,
	payload: Arc<dyn Any + Send + Sync>,
}

impl Object {
	pub fn new<T: Any + Send + Sync>(keys: KeySet, payload: T) -> Self {
		Self {
			keys,
			payload: Arc::new(payload),
		}
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.payload.downcast_ref::<T>()
	}

	/// Identity comparison; two objects are equal only if they share a payload.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.payload, &other.payload)
	}
}

impl fmt::Debug for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Object").field("keys", &self.keys).finish_non_exhaustive()
	}
}

/// Conversion between a Rust type and a single [`Value`].
pub trait IValue: Sized + Send + 'static {
	fn into_value(self) -> Value;
	fn from_value(value: Value) -> Result<Self, KernelError>;
}

fn type_error(expected: &str, got: &Value) -> KernelError {
	KernelError::new(format!("expected {expected}, got {}", got.type_name()))
}

macro_rules! scalar_ivalue {
	($($ty:ty => $variant:ident, $expected:literal;)*) => {
		$(
			impl IValue for $ty {
				fn into_value(self) -> Value {
					Value::$variant(self)
				}

				fn from_value(value: Value) -> Result<Self, KernelError> {
					match value {
						Value::$variant(v) => Ok(v),
						other => Err(type_error($expected, &other)),
					}
				}
			}
		)*
	};
}

scalar_ivalue! {
	bool => Bool, "bool";
	i64 => Int, "int";
	f64 => Double, "float";
	Object => Object, "object";
}

impl IValue for Value {
	fn into_value(self) -> Value {
		self
	}

	fn from_value(value: Value) -> Result<Self, KernelError> {
		Ok(value)
	}
}

impl IValue for String {
	fn into_value(self) -> Value {
		Value::Str(self.into())
	}

	fn from_value(value: Value) -> Result<Self, KernelError> {
		match value {
			Value::Str(s) => Ok(s.to_string()),
			other => Err(type_error("str", &other)),
		}
	}
}

impl<T: IValue> IValue for Option<T> {
	fn into_value(self) -> Value {
		self.map_or(Value::None, IValue::into_value)
	}

	fn from_value(value: Value) -> Result<Self, KernelError> {
		match value {
			Value::None => Ok(None),
			other => T::from_value(other).map(Some),
		}
	}
}

impl<T: IValue> IValue for Vec<T> {
	fn into_value(self) -> Value {
		Value::List(self.into_iter().map(IValue::into_value).collect())
	}

	fn from_value(value: Value) -> Result<Self, KernelError> {
		match value {
			Value::List(items) => items.into_iter().map(T::from_value).collect(),
			other => Err(type_error("list", &other)),
		}
	}
}

/// A fixed-arity group of values: a kernel's argument list or return list.
pub trait Values: Sized + Send + 'static {
	const LEN: usize;

	fn into_values(self) -> Vec<Value>;

	/// Consumes exactly [`Self::LEN`] values.
	fn from_values(values: Vec<Value>) -> Result<Self, KernelError>;
}

macro_rules! tuple_values {
	($len:literal; $($name:ident),*) => {
		impl<$($name: IValue),*> Values for ($($name,)*) {
			const LEN: usize = $len;

			fn into_values(self) -> Vec<Value> {
				#[allow(non_snake_case)]
				let ($($name,)*) = self;
				vec![$($name.into_value()),*]
			}

			#[allow(unused_mut, unused_variables)]
			fn from_values(values: Vec<Value>) -> Result<Self, KernelError> {
				if values.len() != $len {
					return Err(KernelError::new(format!("expected {} values, got {}", $len, values.len())));
				}
				let mut iter = values.into_iter();
				Ok(($(
					$name::from_value(iter.next().unwrap_or_default())?,
				)*))
			}
		}
	};
}

tuple_values!(0;);
tuple_values!(1; A);
tuple_values!(2; A, B);
tuple_values!(3; A, B, C);
tuple_values!(4; A, B, C, D);
tuple_values!(5; A, B, C, D, E);

#[cfg(test)]
mod tests;
