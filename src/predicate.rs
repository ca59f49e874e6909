//! Compiled `when` expressions.
//!
//! The expression language is a small, side-effect free subset of JavaScript expressions:
//!
//! - literals: numbers, single or double quoted strings, `true`, `false`, `null` and `undefined`,
//! - paths: `data.a.b`, `data["a"]`, `items[0]`, `event.x` (a bare identifier starts at `data`),
//!   with `.length` on lists and text. `data` and `event` are the only roots; `self` and `this` are rejected,
//! - operators: `!`, unary `-`, `<`, `<=`, `>`, `>=`, `==`, `!=`, `===`, `!==`, `&&`, `||` and parentheses.
//!
//! Results are judged by JavaScript truthiness.

use crate::{
	dom::DomNode,
	error::Error,
	value::{Key, Value},
};
use core::fmt::{self, Debug, Formatter};

#[derive(Debug, Clone, PartialEq)]
enum Literal {
	Null,
	Bool(bool),
	Number(f64),
	Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
	Data,
	Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
	Or,
	And,
	LooseEq,
	LooseNe,
	StrictEq,
	StrictNe,
	Lt,
	Le,
	Gt,
	Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
	Literal(Literal),
	Path(Root, Vec<Key>),
	Not(Box<Expr>),
	Neg(Box<Expr>),
	Binary(Box<Expr>, Op, Box<Expr>),
}

/// A compiled `when` expression.
#[derive(Clone, PartialEq)]
pub struct Predicate {
	source: String,
	expr: Expr,
}

impl Debug for Predicate {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Predicate").field(&self.source).finish()
	}
}

impl Predicate {
	/// Compiles `source`.
	///
	/// # Errors
	///
	/// [`Error::Predicate`] with the byte offset of the first unexpected token.
	pub fn compile(source: &str) -> Result<Self, Error> {
		let tokens = tokenize(source)?;
		let mut parser = Parser {
			source,
			tokens: &tokens,
			position: 0,
		};
		let expr = parser.or()?;
		if let Some((offset, token)) = parser.peek() {
			return Err(parser.error(*offset, format!("unexpected {:?}", token)));
		}
		Ok(Self {
			source: source.to_owned(),
			expr,
		})
	}

	#[must_use]
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Evaluates against `data`, with `event` (if given) reachable as `event`.
	#[must_use]
	pub fn evaluate<N: DomNode>(&self, data: &Value<N>, event: Option<&Value<N>>) -> bool {
		evaluate(&self.expr, data, event).is_truthy()
	}
}

fn evaluate<N: DomNode>(expr: &Expr, data: &Value<N>, event: Option<&Value<N>>) -> Value<N> {
	match expr {
		Expr::Literal(Literal::Null) => Value::Null,
		Expr::Literal(Literal::Bool(b)) => Value::Bool(*b),
		Expr::Literal(Literal::Number(n)) => Value::Number(*n),
		Expr::Literal(Literal::Text(text)) => Value::Text(text.clone()),
		Expr::Path(root, path) => {
			let start = match root {
				Root::Data => data.clone(),
				Root::Event => event.cloned().unwrap_or(Value::Null),
			};
			path.iter().fold(current(start), |value, key| current(member(&value, key)))
		}
		Expr::Not(operand) => Value::Bool(!evaluate(operand, data, event).is_truthy()),
		Expr::Neg(operand) => Value::Number(-to_number(&evaluate(operand, data, event))),
		Expr::Binary(left, Op::Or, right) => {
			let left = evaluate(left, data, event);
			if left.is_truthy() {
				left
			} else {
				evaluate(right, data, event)
			}
		}
		Expr::Binary(left, Op::And, right) => {
			let left = evaluate(left, data, event);
			if left.is_truthy() {
				evaluate(right, data, event)
			} else {
				left
			}
		}
		Expr::Binary(left, op, right) => {
			let left = evaluate(left, data, event);
			let right = evaluate(right, data, event);
			Value::Bool(compare(&left, *op, &right))
		}
	}
}

/// The current value of a reactive, or the value itself.
fn current<N: DomNode>(value: Value<N>) -> Value<N> {
	match value {
		Value::Reactive(reactive) => reactive.get(),
		value => value,
	}
}

fn member<N: DomNode>(value: &Value<N>, key: &Key) -> Value<N> {
	let name = key.to_name();
	if let Some(child) = value.get(&name) {
		return child.clone();
	}
	match (value, name.as_str()) {
		(Value::List(items), "length") => Value::Number(items.len() as f64),
		(Value::Text(text), "length") => Value::Number(text.encode_utf16().count() as f64),
		_ => Value::Null,
	}
}

fn to_number<N: DomNode>(value: &Value<N>) -> f64 {
	match value {
		Value::Null => 0.0,
		Value::Bool(b) => f64::from(u8::from(*b)),
		Value::Number(n) => *n,
		Value::Text(text) => {
			let text = text.trim();
			if text.is_empty() {
				0.0
			} else {
				text.parse().unwrap_or(f64::NAN)
			}
		}
		_ => f64::NAN,
	}
}

#[allow(clippy::float_cmp)]
fn loose_eq<N: DomNode>(left: &Value<N>, right: &Value<N>) -> bool {
	match (left, right) {
		(Value::Null, Value::Null) => true,
		(Value::Null, _) | (_, Value::Null) => false,
		(Value::Number(_) | Value::Bool(_) | Value::Text(_), Value::Number(_) | Value::Bool(_))
		| (Value::Number(_) | Value::Bool(_), Value::Text(_)) => to_number(left) == to_number(right),
		_ => left == right,
	}
}

fn compare<N: DomNode>(left: &Value<N>, op: Op, right: &Value<N>) -> bool {
	match op {
		Op::StrictEq => left == right,
		Op::StrictNe => left != right,
		Op::LooseEq => loose_eq(left, right),
		Op::LooseNe => !loose_eq(left, right),
		Op::Lt | Op::Le | Op::Gt | Op::Ge => {
			let ordering = match (left, right) {
				(Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
				_ => to_number(left).partial_cmp(&to_number(right)),
			};
			ordering.map_or(false, |ordering| match op {
				Op::Lt => ordering.is_lt(),
				Op::Le => ordering.is_le(),
				Op::Gt => ordering.is_gt(),
				_ => ordering.is_ge(),
			})
		}
		Op::Or | Op::And => unreachable!("short-circuiting operators are evaluated separately"),
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Number(f64),
	Text(String),
	Ident(String),
	Punct(&'static str),
}

const PUNCTUATION: &[&str] = &["===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "-", "(", ")", "[", "]", "."];

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, Error> {
	let error = |offset: usize, message: &str| Error::Predicate {
		expression: source.to_owned(),
		offset,
		message: message.to_owned(),
	};

	let mut tokens = Vec::new();
	let mut chars = source.char_indices().peekable();
	while let Some(&(offset, c)) = chars.peek() {
		if c.is_whitespace() {
			chars.next();
		} else if c.is_ascii_digit() {
			let mut end = offset;
			while let Some(&(i, c)) = chars.peek() {
				if c.is_ascii_digit() || c == '.' {
					end = i + 1;
					chars.next();
				} else {
					break;
				}
			}
			let number = source[offset..end].parse().map_err(|_| error(offset, "malformed number"))?;
			tokens.push((offset, Token::Number(number)));
		} else if c == '"' || c == '\'' {
			chars.next();
			let mut text = String::new();
			let mut closed = false;
			while let Some((_, next)) = chars.next() {
				match next {
					'\\' => match chars.next() {
						Some((_, 'n')) => text.push('\n'),
						Some((_, 't')) => text.push('\t'),
						Some((_, escaped)) => text.push(escaped),
						None => break,
					},
					quote if quote == c => {
						closed = true;
						break;
					}
					other => text.push(other),
				}
			}
			if !closed {
				return Err(error(offset, "unterminated string"));
			}
			tokens.push((offset, Token::Text(text)));
		} else if c.is_alphabetic() || c == '_' || c == '$' {
			let mut end = offset;
			while let Some(&(i, c)) = chars.peek() {
				if c.is_alphanumeric() || c == '_' || c == '$' {
					end = i + c.len_utf8();
					chars.next();
				} else {
					break;
				}
			}
			tokens.push((offset, Token::Ident(source[offset..end].to_owned())));
		} else {
			let punct = PUNCTUATION
				.iter()
				.find(|p| source[offset..].starts_with(**p))
				.ok_or_else(|| error(offset, "unexpected character"))?;
			for _ in 0..punct.len() {
				chars.next();
			}
			tokens.push((offset, Token::Punct(punct)));
		}
	}
	Ok(tokens)
}

struct Parser<'a> {
	source: &'a str,
	tokens: &'a [(usize, Token)],
	position: usize,
}

impl<'a> Parser<'a> {
	fn error(&self, offset: usize, message: String) -> Error {
		Error::Predicate {
			expression: self.source.to_owned(),
			offset,
			message,
		}
	}

	fn peek(&self) -> Option<&'a (usize, Token)> {
		self.tokens.get(self.position)
	}

	fn eat(&mut self, punct: &str) -> bool {
		match self.peek() {
			Some((_, Token::Punct(p))) if *p == punct => {
				self.position += 1;
				true
			}
			_ => false,
		}
	}

	fn expect(&mut self, punct: &str) -> Result<(), Error> {
		if self.eat(punct) {
			Ok(())
		} else {
			let offset = self.peek().map_or(self.source.len(), |(offset, _)| *offset);
			Err(self.error(offset, format!("expected `{}`", punct)))
		}
	}

	fn binary(&mut self, operators: &[(&str, Op)], next: fn(&mut Self) -> Result<Expr, Error>) -> Result<Expr, Error> {
		let mut left = next(self)?;
		'outer: loop {
			for (punct, op) in operators {
				if self.eat(punct) {
					let right = next(self)?;
					left = Expr::Binary(Box::new(left), *op, Box::new(right));
					continue 'outer;
				}
			}
			return Ok(left);
		}
	}

	fn or(&mut self) -> Result<Expr, Error> {
		self.binary(&[("||", Op::Or)], Self::and)
	}

	fn and(&mut self) -> Result<Expr, Error> {
		self.binary(&[("&&", Op::And)], Self::equality)
	}

	fn equality(&mut self) -> Result<Expr, Error> {
		self.binary(
			&[("===", Op::StrictEq), ("!==", Op::StrictNe), ("==", Op::LooseEq), ("!=", Op::LooseNe)],
			Self::relational,
		)
	}

	fn relational(&mut self) -> Result<Expr, Error> {
		self.binary(&[("<=", Op::Le), (">=", Op::Ge), ("<", Op::Lt), (">", Op::Gt)], Self::unary)
	}

	fn unary(&mut self) -> Result<Expr, Error> {
		if self.eat("!") {
			Ok(Expr::Not(Box::new(self.unary()?)))
		} else if self.eat("-") {
			Ok(Expr::Neg(Box::new(self.unary()?)))
		} else {
			self.primary()
		}
	}

	fn primary(&mut self) -> Result<Expr, Error> {
		let (offset, token) = match self.peek() {
			Some(next) => next,
			None => return Err(self.error(self.source.len(), "unexpected end of expression".to_owned())),
		};
		self.position += 1;
		match token {
			Token::Number(n) => Ok(Expr::Literal(Literal::Number(*n))),
			Token::Text(text) => Ok(Expr::Literal(Literal::Text(text.clone()))),
			Token::Punct("(") => {
				let inner = self.or()?;
				self.expect(")")?;
				Ok(inner)
			}
			Token::Ident(ident) => match ident.as_str() {
				"true" => Ok(Expr::Literal(Literal::Bool(true))),
				"false" => Ok(Expr::Literal(Literal::Bool(false))),
				"null" | "undefined" => Ok(Expr::Literal(Literal::Null)),
				"data" => self.path(Root::Data, Vec::new()),
				"event" => self.path(Root::Event, Vec::new()),
				"self" | "this" => Err(self.error(*offset, format!("`{}` is not available, use `data` or `event`", ident))),
				field => self.path(Root::Data, vec![Key::Name(field.to_owned())]),
			},
			Token::Punct(_) => Err(self.error(*offset, format!("unexpected {:?}", token))),
		}
	}

	fn path(&mut self, root: Root, mut keys: Vec<Key>) -> Result<Expr, Error> {
		loop {
			if self.eat(".") {
				match self.peek() {
					Some((_, Token::Ident(name))) => {
						self.position += 1;
						keys.push(Key::Name(name.clone()));
					}
					next => {
						let offset = next.map_or(self.source.len(), |(offset, _)| *offset);
						return Err(self.error(offset, "expected a property name".to_owned()));
					}
				}
			} else if self.eat("[") {
				let key = match self.peek() {
					#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
					Some((_, Token::Number(n))) if n.fract() == 0.0 && *n >= 0.0 => Key::Index(*n as usize),
					Some((_, Token::Text(name))) => Key::Name(name.clone()),
					next => {
						let offset = next.map_or(self.source.len(), |(offset, _)| *offset);
						return Err(self.error(offset, "expected an index or a quoted name".to_owned()));
					}
				};
				self.position += 1;
				self.expect("]")?;
				keys.push(key);
			} else {
				return Ok(Expr::Path(root, keys));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{cells::cell, mem::Node};
	use serde_json::json;

	fn check(source: &str, data: serde_json::Value) -> bool {
		Predicate::compile(source).unwrap().evaluate::<Node>(&data.into(), None)
	}

	#[test]
	fn paths_and_truthiness() {
		assert!(check("data.visible", json!({"visible": true})));
		assert!(!check("visible", json!({"visible": 0})));
		assert!(check("data.items[1].name", json!({"items": [{}, {"name": "x"}]})));
		assert!(!check("data.missing.deeper", json!({})));
		assert!(check("data.items.length > 1", json!({"items": [1, 2]})));
		assert!(!check("event", json!({})));
	}

	#[test]
	fn operators() {
		assert!(check("data.n >= 2 && data.n < 3", json!({"n": 2})));
		assert!(check("!data.a || data.b === 'x'", json!({"a": 1, "b": "x"})));
		assert!(check("data.n == '2'", json!({"n": 2})));
		assert!(!check("data.n === '2'", json!({"n": 2})));
		assert!(check("data.x == undefined", json!({})));
		assert!(check("-data.n < 0 && (data.s != \"a\")", json!({"n": 1, "s": "b"})));
		assert!(!check("'abc' > 'b'", json!({})));
	}

	#[test]
	fn reactive_members() {
		let c = cell(Value::<Node>::from(json!({"on": true})));
		let data = Value::dict([("state", Value::Reactive(c.clone()))]);
		let predicate = Predicate::compile("data.state.on").unwrap();
		assert!(predicate.evaluate(&data, None));
		c.set(json!({"on": false}).into());
		assert!(!predicate.evaluate(&data, None));
	}

	#[test]
	fn errors_carry_offsets() {
		match Predicate::compile("data.x &&") {
			Err(Error::Predicate { offset, .. }) => assert_eq!(offset, 9),
			other => panic!("{:?}", other),
		}
		match Predicate::compile("data.x # 1") {
			Err(Error::Predicate { offset, .. }) => assert_eq!(offset, 7),
			other => panic!("{:?}", other),
		}
		assert!(Predicate::compile("(data.x").is_err());
		match Predicate::compile("data.x && self.y") {
			Err(Error::Predicate { offset, .. }) => assert_eq!(offset, 10),
			other => panic!("{:?}", other),
		}
		assert!(Predicate::compile("this").is_err());
		assert!(Predicate::compile("data.self").is_ok());
	}
}
