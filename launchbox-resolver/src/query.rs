//! A small query language over [`serde_json::Value`], used for input
//! matchers and for embedded `^...^` references in templates.
//!
//! Supported syntax: an optional leading `$`, `.name` member access,
//! `[*]` wildcards, and `[?(...)]` filters. Filter clauses have the form
//! `@.path == 'literal'`, `@.path != 'literal'`, or `@.path in ['a', 'b']`,
//! joined with `&&`. Evaluation always yields a list; an unparseable
//! expression degrades to an empty result with a warning rather than
//! failing resolution.

use serde_json::Value;
use tracing::warn;

#[derive(thiserror::Error, Debug)]
#[error("at byte {at}: {msg}")]
pub struct ParseError {
	at: usize,
	msg: String,
}

#[derive(Clone, Debug)]
pub struct Query {
	segments: Vec<Segment>,
}

#[derive(Clone, Debug)]
enum Segment {
	Key(String),
	Wildcard,
	Filter(Filter),
}

/// A conjunction of comparison clauses applied to one candidate value.
#[derive(Clone, Debug)]
pub struct Filter {
	clauses: Vec<Clause>,
}

#[derive(Clone, Debug)]
struct Clause {
	/// Property path after `@.`.
	path: Vec<String>,
	op: Op,
	operands: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
	Eq,
	Ne,
	In,
}

impl Query {
	pub fn parse(text: &str) -> Result<Query, ParseError> {
		let mut parser = Parser::new(text);
		parser.eat('$');
		let mut segments = Vec::new();
		loop {
			match parser.peek() {
				None => break,
				Some('.') => {
					parser.bump();
					segments.push(Segment::Key(parser.ident()?));
				}
				Some('[') => {
					parser.bump();
					parser.skip_ws();
					match parser.peek() {
						Some('*') => {
							parser.bump();
							segments.push(Segment::Wildcard);
						}
						Some('?') => {
							parser.bump();
							parser.expect('(')?;
							segments.push(Segment::Filter(parser.filter()?));
							parser.expect(')')?;
						}
						Some('\'') | Some('"') => {
							segments.push(Segment::Key(parser.quoted()?));
						}
						_ => return Err(parser.error("expected '*', '?(' or a quoted key")),
					}
					parser.skip_ws();
					parser.expect(']')?;
				}
				Some(other) => {
					return Err(parser.error(format!("unexpected character '{other}'")));
				}
			}
		}
		Ok(Query { segments })
	}

	pub fn evaluate<'v>(&self, root: &'v Value) -> Vec<&'v Value> {
		let mut current = vec![root];
		for segment in &self.segments {
			let mut next = Vec::new();
			for value in current {
				match segment {
					Segment::Key(key) => {
						if let Some(found) = member(value, key) {
							next.push(found);
						}
					}
					Segment::Wildcard => match value {
						Value::Array(items) => next.extend(items.iter()),
						Value::Object(map) => next.extend(map.values()),
						_ => {}
					},
					Segment::Filter(filter) => match value {
						Value::Array(items) => {
							next.extend(items.iter().filter(|item| filter.matches(item)));
						}
						other => {
							if filter.matches(other) {
								next.push(other);
							}
						}
					},
				}
			}
			current = next;
		}
		current
	}
}

fn member<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
	match value {
		Value::Object(map) => map.get(key),
		Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
		_ => None,
	}
}

impl Filter {
	/// Parses a bare filter body, e.g. `@.quality == 'usable'`.
	pub fn parse(text: &str) -> Result<Filter, ParseError> {
		let mut parser = Parser::new(text);
		let filter = parser.filter()?;
		parser.skip_ws();
		if parser.peek().is_some() {
			return Err(parser.error("trailing input after filter"));
		}
		Ok(filter)
	}

	pub fn matches(&self, value: &Value) -> bool {
		self.clauses.iter().all(|clause| clause.matches(value))
	}
}

impl Clause {
	fn matches(&self, value: &Value) -> bool {
		let mut current = value;
		for key in &self.path {
			match member(current, key) {
				Some(next) => current = next,
				// A missing property fails the clause, `!=` included.
				None => return false,
			}
		}
		match self.op {
			Op::Eq => self.operands.iter().any(|o| scalar_eq(current, o)),
			Op::Ne => self.operands.iter().all(|o| !scalar_eq(current, o)),
			Op::In => self.operands.iter().any(|o| scalar_eq(current, o)),
		}
	}
}

fn scalar_eq(value: &Value, literal: &str) -> bool {
	match value {
		Value::String(s) => s == literal,
		Value::Number(n) => n.to_string() == literal,
		Value::Bool(b) => b.to_string() == literal,
		_ => false,
	}
}

/// Evaluates `text` against `root`, treating a parse failure as no match.
pub fn evaluate<'v>(root: &'v Value, text: &str) -> Vec<&'v Value> {
	match Query::parse(text) {
		Ok(query) => query.evaluate(root),
		Err(err) => {
			warn!(query = text, %err, "unparseable query treated as no match");
			Vec::new()
		}
	}
}

/// Applies a bare filter body to one value, treating a parse failure as
/// no match.
pub fn filter_matches(value: &Value, filter_text: &str) -> bool {
	match Filter::parse(filter_text) {
		Ok(filter) => filter.matches(value),
		Err(err) => {
			warn!(matcher = filter_text, %err, "unparseable matcher treated as no match");
			false
		}
	}
}

struct Parser<'a> {
	text: &'a str,
	pos: usize,
}

impl<'a> Parser<'a> {
	fn new(text: &'a str) -> Self {
		Parser { text, pos: 0 }
	}

	fn peek(&self) -> Option<char> {
		self.text[self.pos..].chars().next()
	}

	fn bump(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.pos += ch.len_utf8();
		Some(ch)
	}

	fn eat(&mut self, expected: char) -> bool {
		if self.peek() == Some(expected) {
			self.bump();
			true
		} else {
			false
		}
	}

	fn expect(&mut self, expected: char) -> Result<(), ParseError> {
		if self.eat(expected) {
			Ok(())
		} else {
			Err(self.error(format!("expected '{expected}'")))
		}
	}

	fn eat_str(&mut self, expected: &str) -> bool {
		if self.text[self.pos..].starts_with(expected) {
			self.pos += expected.len();
			true
		} else {
			false
		}
	}

	fn skip_ws(&mut self) {
		while self.peek().is_some_and(|c| c.is_whitespace()) {
			self.bump();
		}
	}

	fn ident(&mut self) -> Result<String, ParseError> {
		let start = self.pos;
		while self
			.peek()
			.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
		{
			self.bump();
		}
		if self.pos == start {
			return Err(self.error("expected a name"));
		}
		Ok(self.text[start..self.pos].to_owned())
	}

	fn quoted(&mut self) -> Result<String, ParseError> {
		let quote = match self.peek() {
			Some(q @ ('\'' | '"')) => q,
			_ => return Err(self.error("expected a quoted string")),
		};
		self.bump();
		let start = self.pos;
		while let Some(ch) = self.peek() {
			if ch == quote {
				let content = self.text[start..self.pos].to_owned();
				self.bump();
				return Ok(content);
			}
			self.bump();
		}
		Err(self.error("unterminated string"))
	}

	/// A quoted string, or a bare token such as a number or boolean.
	fn literal(&mut self) -> Result<String, ParseError> {
		if matches!(self.peek(), Some('\'' | '"')) {
			return self.quoted();
		}
		let start = self.pos;
		while self
			.peek()
			.is_some_and(|c| !c.is_whitespace() && !matches!(c, ',' | ']' | ')' | '&'))
		{
			self.bump();
		}
		if self.pos == start {
			return Err(self.error("expected a literal"));
		}
		Ok(self.text[start..self.pos].to_owned())
	}

	fn filter(&mut self) -> Result<Filter, ParseError> {
		let mut clauses = Vec::new();
		loop {
			clauses.push(self.clause()?);
			self.skip_ws();
			if !self.eat_str("&&") {
				break;
			}
		}
		Ok(Filter { clauses })
	}

	fn clause(&mut self) -> Result<Clause, ParseError> {
		self.skip_ws();
		self.expect('@')?;
		self.expect('.')?;
		let mut path = vec![self.ident()?];
		while self.eat('.') {
			path.push(self.ident()?);
		}
		self.skip_ws();
		let op = if self.eat_str("==") {
			Op::Eq
		} else if self.eat_str("!=") {
			Op::Ne
		} else if self.eat_str("in") {
			Op::In
		} else {
			return Err(self.error("expected '==', '!=' or 'in'"));
		};
		self.skip_ws();
		let operands = if op == Op::In {
			self.expect('[')?;
			let mut items = Vec::new();
			loop {
				self.skip_ws();
				items.push(self.literal()?);
				self.skip_ws();
				if !self.eat(',') {
					break;
				}
			}
			self.expect(']')?;
			items
		} else {
			vec![self.literal()?]
		};
		Ok(Clause { path, op, operands })
	}

	fn error(&self, msg: impl Into<String>) -> ParseError {
		ParseError {
			at: self.pos,
			msg: msg.into(),
		}
	}
}
