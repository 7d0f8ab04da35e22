//! Literal data parser
//!
//! SQL tools report result rows as text such as `[(1, 'a'), (2, None)]`.
//! This module parses that notation into JSON values without evaluating
//! anything: only numbers, quoted strings, `True`/`False`/`None`, lists,
//! tuples and dicts are accepted, and anything else is an error.
//!
//! Tuples become JSON arrays. Dict keys that are not strings are rendered
//! with their JSON text.

use serde_json::{Map, Number, Value};

/// Nesting limit, so hostile input cannot exhaust the stack
const MAX_DEPTH: usize = 64;

/// Why a literal failed to parse
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("nesting too deep")]
    TooDeep,

    #[error("trailing input at offset {0}")]
    TrailingInput(usize),
}

/// Parse a complete literal; surrounding whitespace is allowed
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser {
        chars: text.char_indices().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    match parser.peek() {
        None => Ok(value),
        Some(_) => Err(LiteralError::TrailingInput(parser.offset())),
    }
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(o, _)| *o).unwrap_or_else(|| {
            self.chars
                .last()
                .map(|(o, c)| o + c.len_utf8())
                .unwrap_or(0)
        })
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(found) => LiteralError::UnexpectedChar {
                found,
                offset: self.offset(),
            },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), LiteralError> {
        self.skip_whitespace();
        if self.peek() == Some(wanted) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_whitespace();
        match self.peek() {
            Some('[') => self.sequence('[', ']').map(|(items, _)| Value::Array(items)),
            Some('(') => self.tuple(),
            Some('{') => self.dict(),
            Some('\'') | Some('"') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            _ => Err(self.unexpected()),
        }
    }

    fn enter(&mut self) -> Result<(), LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            Err(LiteralError::TooDeep)
        } else {
            Ok(())
        }
    }

    /// Comma-separated items between delimiters; also reports whether a
    /// trailing comma was present
    fn sequence(&mut self, open: char, close: char) -> Result<(Vec<Value>, bool), LiteralError> {
        self.enter()?;
        self.expect(open)?;
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                break;
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => trailing_comma = true,
                Some(c) if c == close => {
                    trailing_comma = false;
                    break;
                }
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
        self.depth -= 1;
        Ok((items, trailing_comma))
    }

    fn tuple(&mut self) -> Result<Value, LiteralError> {
        let (mut items, trailing_comma) = self.sequence('(', ')')?;
        // `(x)` is a parenthesized value, `(x,)` a one-element tuple
        if items.len() == 1 && !trailing_comma {
            return Ok(items.remove(0));
        }
        Ok(Value::Array(items))
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        self.enter()?;
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                break;
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => {}
                Some('}') => break,
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
        self.depth -= 1;
        Ok(Value::Object(map))
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().map(|(_, c)| c).collect();
        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            _ => {
                self.pos = start;
                Err(self.unexpected())
            }
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| {
            c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '+' || c == '-'
        }) {
            // A sign is only part of the number right after an exponent marker
            if matches!(self.peek(), Some('+') | Some('-'))
                && !matches!(self.chars.get(self.pos - 1), Some((_, 'e')) | Some((_, 'E')))
            {
                break;
            }
            self.pos += 1;
        }

        let raw: String = self.chars[start..self.pos].iter().map(|(_, c)| c).collect();
        let text = raw.replace('_', "");

        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        if let Ok(u) = text.parse::<u64>() {
            return Ok(Value::Number(u.into()));
        }
        let is_float_syntax = text
            .trim_start_matches(['+', '-'])
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
        if is_float_syntax {
            if let Ok(f) = text.parse::<f64>() {
                if let Some(n) = Number::from_f64(f) {
                    return Ok(Value::Number(n));
                }
            }
        }
        Err(LiteralError::InvalidNumber(raw))
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
            if c == quote {
                return Ok(out);
            }
            if c == '\n' {
                self.pos -= 1;
                return Err(self.unexpected());
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escape_offset = self.offset();
            let escaped = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
            match escaped {
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'x' => out.push(self.hex_escape(2, escape_offset)?),
                'u' => out.push(self.hex_escape(4, escape_offset)?),
                'U' => out.push(self.hex_escape(8, escape_offset)?),
                '\n' => {}
                _ => return Err(LiteralError::InvalidEscape(escape_offset)),
            }
        }
    }

    fn hex_escape(&mut self, len: usize, offset: usize) -> Result<char, LiteralError> {
        let mut code = 0u32;
        for _ in 0..len {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or(LiteralError::InvalidEscape(offset))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_of_tuples() {
        let value = parse_literal("[(1, 'a'), (2, 'b')]").unwrap();
        assert_eq!(value, json!([[1, "a"], [2, "b"]]));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse_literal("42").unwrap(), json!(42));
        assert_eq!(parse_literal("-7").unwrap(), json!(-7));
        assert_eq!(parse_literal("2.5").unwrap(), json!(2.5));
        assert_eq!(parse_literal("1e3").unwrap(), json!(1000.0));
        assert_eq!(parse_literal("1_000").unwrap(), json!(1000));
        assert_eq!(parse_literal("True").unwrap(), json!(true));
        assert_eq!(parse_literal("False").unwrap(), json!(false));
        assert_eq!(parse_literal("None").unwrap(), json!(null));
        assert_eq!(parse_literal("  'x'  ").unwrap(), json!("x"));
    }

    #[test]
    fn test_negative_numbers_in_rows() {
        let value = parse_literal("[(-1, -2.5e-3)]").unwrap();
        assert_eq!(value, json!([[-1, -0.0025]]));
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(parse_literal(r#""it's""#).unwrap(), json!("it's"));
        assert_eq!(parse_literal(r"'it\'s'").unwrap(), json!("it's"));
        assert_eq!(parse_literal(r"'a\nb\\c'").unwrap(), json!("a\nb\\c"));
        assert_eq!(parse_literal(r"'\xe9é'").unwrap(), json!("éé"));
        assert_eq!(parse_literal("'naïve'").unwrap(), json!("naïve"));
    }

    #[test]
    fn test_tuples() {
        assert_eq!(parse_literal("()").unwrap(), json!([]));
        assert_eq!(parse_literal("(1,)").unwrap(), json!([1]));
        assert_eq!(parse_literal("(1)").unwrap(), json!(1));
        assert_eq!(parse_literal("[(1,), (2,)]").unwrap(), json!([[1], [2]]));
    }

    #[test]
    fn test_dicts() {
        let value = parse_literal("[{'name': 'Alice', 'age': 30}, {1: None}]").unwrap();
        assert_eq!(value, json!([{"name": "Alice", "age": 30}, {"1": null}]));
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(parse_literal("[1, 2,]").unwrap(), json!([1, 2]));
        assert_eq!(parse_literal("{'a': 1,}").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_rejects_code() {
        assert!(parse_literal("__import__('os').system('ls')").is_err());
        assert!(parse_literal("[Decimal('1.5')]").is_err());
        assert!(parse_literal("[datetime.date(2024, 1, 1)]").is_err());
        assert!(parse_literal("[1] + [2]").is_err());
        assert!(parse_literal("[x for x in y]").is_err());
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse_literal("[1, 2"), Err(LiteralError::UnexpectedEnd));
        assert_eq!(parse_literal("'open"), Err(LiteralError::UnexpectedEnd));
        assert!(matches!(
            parse_literal("[1 2]"),
            Err(LiteralError::UnexpectedChar { found: '2', .. })
        ));
        assert!(matches!(parse_literal("[1] x"), Err(LiteralError::TrailingInput(4))));
        assert!(matches!(parse_literal("12abc"), Err(LiteralError::InvalidNumber(_))));
        assert!(matches!(parse_literal(r"'\q'"), Err(LiteralError::InvalidEscape(_))));
        assert_eq!(parse_literal(""), Err(LiteralError::UnexpectedEnd));
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let deep = format!("{}{}", "[".repeat(200), "]".repeat(200));
        assert_eq!(parse_literal(&deep), Err(LiteralError::TooDeep));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(parse_literal("[inf]").is_err());
        assert!(parse_literal("[1e999]").is_err());
    }
}
