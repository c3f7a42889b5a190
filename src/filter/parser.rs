use serde_json::Value as JsonValue;
use thiserror::Error;

use super::condition::RawFilterCondition;

/// Reads `field operator value [AND ...]` clauses into raw conditions.
/// Operator tokens are passed through unchecked; the compiler decides
/// whether they are legal.
pub struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

#[derive(Debug, Error)]
#[error("Parse error at position {pos}: {message}")]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub fn parse(mut self) -> Result<Vec<RawFilterCondition>, ParseError> {
        let mut conditions = Vec::new();

        self.skip_whitespace();
        if self.at_end() {
            return Ok(conditions);
        }

        loop {
            conditions.push(self.parse_clause()?);
            self.skip_whitespace();
            if self.match_keyword("OR") {
                return Err(self.error("OR is not supported, clauses can only be joined with AND"));
            }
            if !self.match_keyword("AND") {
                break;
            }
        }

        self.skip_whitespace();
        if !self.at_end() {
            return Err(self.error("Unexpected input after condition"));
        }
        Ok(conditions)
    }

    fn parse_clause(&mut self) -> Result<RawFilterCondition, ParseError> {
        let field = self.parse_identifier()?;
        let operator = self.parse_operator()?;
        let value = self.parse_value()?;
        Ok(RawFilterCondition::new(field, operator, value))
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        while !self.at_end() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(self.error("Expected field name"));
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_operator(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();

        const SYMBOLS: [(&str, &str); 5] = [
            (">=", "gte"),
            ("<=", "lte"),
            ("=", "equals"),
            (">", "gt"),
            ("<", "lt"),
        ];
        for (symbol, token) in SYMBOLS {
            if self.match_str(symbol) {
                return Ok(token.to_string());
            }
        }

        let start = self.pos;
        while !self.at_end() && self.current_char().is_ascii_alphabetic() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("Expected operator"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_value(&mut self) -> Result<JsonValue, ParseError> {
        self.skip_whitespace();

        if self.match_char('[') {
            return self.parse_list();
        }
        self.parse_scalar()
    }

    fn parse_list(&mut self) -> Result<JsonValue, ParseError> {
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.match_char(']') {
            return Ok(JsonValue::Array(items));
        }

        loop {
            self.skip_whitespace();
            items.push(self.parse_scalar()?);
            self.skip_whitespace();
            if self.match_char(']') {
                return Ok(JsonValue::Array(items));
            }
            if !self.match_char(',') {
                return Err(self.error("Expected ',' or ']'"));
            }
        }
    }

    fn parse_scalar(&mut self) -> Result<JsonValue, ParseError> {
        if self.match_char('"') {
            return self.parse_string();
        }
        if self.match_keyword("true") {
            return Ok(JsonValue::Bool(true));
        }
        if self.match_keyword("false") {
            return Ok(JsonValue::Bool(false));
        }
        if self.match_keyword("null") {
            return Ok(JsonValue::Null);
        }
        self.parse_number_or_date()
    }

    fn parse_string(&mut self) -> Result<JsonValue, ParseError> {
        let mut s = String::new();
        loop {
            if self.at_end() {
                return Err(self.error("Unterminated string"));
            }
            let c = self.current_char();
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(JsonValue::String(s)),
                '\\' => {
                    if self.at_end() {
                        return Err(self.error("Unterminated string"));
                    }
                    let escaped = self.current_char();
                    self.pos += escaped.len_utf8();
                    s.push(escaped);
                }
                _ => s.push(c),
            }
        }
    }

    /// Bare tokens are numbers when they parse as one, otherwise they are
    /// kept as strings for date coercion (`2024-01-01`, `2024-01-01T10:00:00Z`).
    fn parse_number_or_date(&mut self) -> Result<JsonValue, ParseError> {
        let start = self.pos;
        let first = self.current_char();
        if !(first.is_ascii_digit() || first == '-') {
            return Err(self.error("Expected value"));
        }

        while !self.at_end() {
            let c = self.current_char();
            if c.is_whitespace() || c == ',' || c == ']' {
                break;
            }
            self.pos += c.len_utf8();
        }

        let text = &self.input[start..self.pos];

        if let Ok(i) = text.parse::<i64>() {
            return Ok(JsonValue::from(i));
        }
        if let Ok(f) = text.parse::<f64>() {
            return serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .ok_or_else(|| self.error("Invalid number"));
        }
        if text.starts_with(|c: char| c.is_ascii_digit()) && text.contains('-') {
            return Ok(JsonValue::String(text.to_string()));
        }

        Err(self.error("Expected number or date"))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.at_end() && self.current_char().is_whitespace() {
            self.pos += self.current_char().len_utf8();
        }
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn match_char(&mut self, c: char) -> bool {
        if !self.at_end() && self.current_char() == c {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn match_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, kw: &str) -> bool {
        let remaining = &self.input[self.pos..];
        let Some(head) = remaining.get(..kw.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(kw) {
            return false;
        }
        let after = remaining[kw.len()..].chars().next();
        if after.map_or(true, |c| !c.is_alphanumeric() && c != '_') {
            self.pos += kw.len();
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            pos: self.pos,
        }
    }
}

pub fn parse(input: &str) -> Result<Vec<RawFilterCondition>, ParseError> {
    Parser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbol_operator() {
        let conds = parse("score >= 50").unwrap();
        assert_eq!(conds, vec![RawFilterCondition::new("score", "gte", json!(50))]);
    }

    #[test]
    fn test_word_operator_and_list() {
        let conds = parse(r#"name in ["Alice Smith", "Bob Lee"]"#).unwrap();
        assert_eq!(
            conds,
            vec![RawFilterCondition::new("name", "in", json!(["Alice Smith", "Bob Lee"]))]
        );
    }

    #[test]
    fn test_and_chain() {
        let text = concat!(
            "isPriority = true and createdAt after 2024-01-01T10:00:00Z ",
            "AND score between [5, 10.5]",
        );
        let conds = parse(text).unwrap();
        assert_eq!(
            conds,
            vec![
                RawFilterCondition::new("isPriority", "equals", json!(true)),
                RawFilterCondition::new("createdAt", "after", json!("2024-01-01T10:00:00Z")),
                RawFilterCondition::new("score", "between", json!([5, 10.5])),
            ]
        );
    }

    #[test]
    fn test_operator_token_passed_through() {
        let conds = parse(r#"score contains "5""#).unwrap();
        assert_eq!(conds[0].operator, "contains");
    }

    #[test]
    fn test_string_escapes() {
        let conds = parse(r#"email equals "a\"b\\c""#).unwrap();
        assert_eq!(conds[0].value, json!(r#"a"b\c"#));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_or_rejected() {
        let err = parse("score > 1 OR score < 0").unwrap_err();
        assert!(err.message.contains("OR is not supported"));
    }

    #[test]
    fn test_errors() {
        assert!(parse("score >=").is_err());
        assert!(parse(r#"email = "open"#).is_err());
        assert!(parse("email = bare").is_err());
        assert!(parse("(score > 1)").is_err());
        assert!(parse("score > 1 trailing").is_err());
        assert!(parse("name in [\"a\" \"b\"]").is_err());
    }
}
