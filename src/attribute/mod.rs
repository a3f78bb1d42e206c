//! Scalar attribute types and their coercion rules.
//!
//! `make` never fails: every raw input is coerced into some value of the
//! attribute's type, falling back to the declared default.

pub mod uid;

use crate::value::Value;
pub use uid::{SequenceUidGenerator, UidGenerator, UuidGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Attr,
    String,
    Number,
    Boolean,
    Uid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    kind: AttributeKind,
    default: Value,
    nullable: bool,
}

impl Attribute {
    fn new(kind: AttributeKind, default: Value) -> Self {
        Self {
            kind,
            default,
            nullable: false,
        }
    }

    /// Untyped passthrough attribute.
    pub fn attr(default: impl Into<Value>) -> Self {
        Self::new(AttributeKind::Attr, default.into())
    }

    pub fn string(default: impl Into<Value>) -> Self {
        Self::new(AttributeKind::String, default.into())
    }

    pub fn number(default: impl Into<Value>) -> Self {
        Self::new(AttributeKind::Number, default.into())
    }

    pub fn boolean(default: impl Into<Value>) -> Self {
        Self::new(AttributeKind::Boolean, default.into())
    }

    pub fn uid() -> Self {
        Self::new(AttributeKind::Uid, Value::Null)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_uid(&self) -> bool {
        self.kind == AttributeKind::Uid
    }

    /// Coerces `raw` into this attribute's type. `None` means the field was
    /// absent from the input.
    pub fn make(&self, raw: Option<&Value>, uids: &dyn UidGenerator) -> Value {
        match self.kind {
            AttributeKind::Attr => match raw {
                Some(value) => value.clone(),
                None => self.default.clone(),
            },
            AttributeKind::String => self.make_string(raw),
            AttributeKind::Number => self.make_number(raw),
            AttributeKind::Boolean => self.make_boolean(raw),
            AttributeKind::Uid => match raw {
                Some(value) if !value.is_null() => value.clone(),
                _ => Value::Text(uids.generate().into()),
            },
        }
    }

    fn make_string(&self, raw: Option<&Value>) -> Value {
        match raw {
            None => self.default.clone(),
            Some(Value::Text(v)) => Value::Text(v.clone()),
            Some(Value::Null) if self.nullable => Value::Null,
            Some(other) => Value::Text(other.to_key_string().into()),
        }
    }

    fn make_number(&self, raw: Option<&Value>) -> Value {
        match raw {
            None => self.default.clone(),
            Some(Value::Integer(v)) => Value::Integer(*v),
            Some(Value::Float(v)) => Value::Float(*v),
            Some(Value::Text(v)) => parse_number(v).unwrap_or(Value::Integer(0)),
            Some(Value::Boolean(v)) => Value::Integer(i64::from(*v)),
            Some(Value::Null) if self.nullable => Value::Null,
            Some(_) => Value::Integer(0),
        }
    }

    fn make_boolean(&self, raw: Option<&Value>) -> Value {
        match raw {
            None => self.default.clone(),
            Some(Value::Boolean(v)) => Value::Boolean(*v),
            Some(Value::Text(v)) => {
                if v.is_empty() {
                    return Value::Boolean(false);
                }
                match leading_integer(v) {
                    Some(n) => Value::Boolean(n != 0),
                    None => Value::Boolean(true),
                }
            }
            Some(Value::Integer(v)) => Value::Boolean(*v != 0),
            Some(Value::Float(v)) => Value::Boolean(*v != 0.0 && !v.is_nan()),
            Some(Value::Null) if self.nullable => Value::Null,
            Some(_) => Value::Boolean(false),
        }
    }
}

/// Parses the longest numeric prefix of `s`, skipping leading whitespace.
fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                let next = bytes.get(end + 1).copied();
                let after_sign = match next {
                    Some(b'+') | Some(b'-') => bytes.get(end + 2).copied(),
                    other => other,
                };
                if !matches!(after_sign, Some(b'0'..=b'9')) {
                    break;
                }
                seen_exp = true;
                if matches!(next, Some(b'+') | Some(b'-')) {
                    end += 1;
                }
            }
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }

    let literal = &trimmed[..end];
    if !seen_dot && !seen_exp {
        if let Ok(i) = literal.parse::<i64>() {
            return Some(Value::Integer(i));
        }
    }
    literal.parse::<f64>().ok().map(Value::Float)
}

fn leading_integer(s: &str) -> Option<i64> {
    match parse_number(s)? {
        Value::Integer(i) => Some(i),
        Value::Float(f) => Some(f.trunc() as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Attribute, SequenceUidGenerator};
    use crate::value::Value;

    fn uids() -> SequenceUidGenerator {
        SequenceUidGenerator::new(["uid1", "uid2"])
    }

    #[test]
    fn attr_passes_values_through_and_defaults_when_absent() {
        let attr = Attribute::attr(Value::Null);
        let g = uids();
        assert_eq!(attr.make(None, &g), Value::Null);
        assert_eq!(attr.make(Some(&Value::from(vec![1, 2])), &g), Value::from(vec![1, 2]));
    }

    #[test]
    fn string_coerces_non_null_input() {
        let g = uids();
        let s = Attribute::string("");
        assert_eq!(s.make(None, &g), Value::from(""));
        assert_eq!(s.make(Some(&Value::Integer(12)), &g), Value::from("12"));
        assert_eq!(s.make(Some(&Value::Boolean(true)), &g), Value::from("true"));
        assert_eq!(s.make(Some(&Value::Null), &g), Value::from("null"));

        let nullable = Attribute::string("").nullable();
        assert_eq!(nullable.make(Some(&Value::Null), &g), Value::Null);
    }

    #[test]
    fn number_parses_strings_and_booleans() {
        let g = uids();
        let n = Attribute::number(0);
        assert_eq!(n.make(Some(&Value::from("42")), &g), Value::Integer(42));
        assert_eq!(n.make(Some(&Value::from("3.5kg")), &g), Value::Float(3.5));
        assert_eq!(n.make(Some(&Value::from("abc")), &g), Value::Integer(0));
        assert_eq!(n.make(Some(&Value::Boolean(true)), &g), Value::Integer(1));
        assert_eq!(n.make(Some(&Value::Null), &g), Value::Integer(0));
        assert_eq!(
            Attribute::number(0).nullable().make(Some(&Value::Null), &g),
            Value::Null
        );
        assert_eq!(n.make(Some(&Value::from("1e3")), &g), Value::Float(1000.0));
    }

    #[test]
    fn boolean_uses_truthiness() {
        let g = uids();
        let b = Attribute::boolean(false);
        assert_eq!(b.make(Some(&Value::from("")), &g), Value::Boolean(false));
        assert_eq!(b.make(Some(&Value::from("0")), &g), Value::Boolean(false));
        assert_eq!(b.make(Some(&Value::from("1")), &g), Value::Boolean(true));
        assert_eq!(b.make(Some(&Value::from("yes")), &g), Value::Boolean(true));
        assert_eq!(b.make(Some(&Value::Integer(0)), &g), Value::Boolean(false));
        assert_eq!(b.make(Some(&Value::Integer(7)), &g), Value::Boolean(true));
        assert_eq!(b.make(Some(&Value::Null), &g), Value::Boolean(false));
        assert_eq!(b.make(None, &g), Value::Boolean(false));
    }

    #[test]
    fn uid_generates_only_when_missing() {
        let g = uids();
        let uid = Attribute::uid();
        assert_eq!(uid.make(Some(&Value::from("given")), &g), Value::from("given"));
        assert_eq!(uid.make(None, &g), Value::from("uid1"));
        assert_eq!(uid.make(Some(&Value::Null), &g), Value::from("uid2"));
    }
}
