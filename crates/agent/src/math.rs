//! Arithmetic over `+ - * / ( )` and decimal literals.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | number | '(' expr ')'
//! ```

use neubot_core::errors::ToolError;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn malformed(detail: impl Into<String>) -> ToolError {
    ToolError::MalformedExpression { detail: detail.into() }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ToolError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expression.chars().collect();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        let token = match ch {
            ' ' => {
                index += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::Open,
            ')' => Token::Close,
            '0'..='9' | '.' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                    index += 1;
                }
                let literal: String = chars[start..index].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| malformed(format!("invalid number `{literal}`")))?;
                tokens.push(Token::Number(value));
                continue;
            }
            other => return Err(malformed(format!("unexpected character `{other}`"))),
        };
        tokens.push(token);
        index += 1;
    }

    Ok(tokens)
}

/// Nesting allowed for parentheses and unary signs combined.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.position += 1;
        token
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.position += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut value = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.position += 1;
            let rhs = self.factor()?;
            value = if op == Token::Star {
                value * rhs
            } else {
                if rhs == 0.0 {
                    return Err(malformed("division by zero"));
                }
                value / rhs
            };
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, ToolError> {
        if self.depth >= MAX_DEPTH {
            return Err(malformed("expression is nested too deeply"));
        }
        self.depth += 1;
        let value = self.primary();
        self.depth -= 1;
        value
    }

    fn primary(&mut self) -> Result<f64, ToolError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Plus) => self.factor(),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::Open) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Token::Close) => Ok(value),
                    _ => Err(malformed("missing closing parenthesis")),
                }
            }
            Some(token) => Err(malformed(format!("unexpected {token:?}"))),
            None => Err(malformed("expression ended early")),
        }
    }
}

pub fn evaluate(expression: &str) -> Result<f64, ToolError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(malformed("empty expression"));
    }

    let mut parser = Parser { tokens, position: 0, depth: 0 };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(malformed(format!("unexpected trailing {token:?}")));
    }
    if !value.is_finite() {
        return Err(malformed("result is not a finite number"));
    }
    Ok(value)
}

/// Integral values print without a fractional part; others keep up to ten
/// decimals with trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let fixed = format!("{value:.10}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use neubot_core::errors::ToolError;

    use super::{evaluate, format_number};

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("5 + 3").expect("eval"), 8.0);
        assert_eq!(evaluate("2 + 3 * 4").expect("eval"), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").expect("eval"), 20.0);
        assert_eq!(evaluate("-4 / 2 - -1").expect("eval"), -1.0);
        assert_eq!(evaluate("10 - 4 - 3").expect("eval"), 3.0);
    }

    #[test]
    fn malformed_input_is_reported() {
        for bad in ["5 +", "(1 + 2", "1 2", "4 / 0", "1..2 + 1", ""] {
            assert!(
                matches!(evaluate(bad), Err(ToolError::MalformedExpression { .. })),
                "`{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let shallow = format!("{}5 + 3{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&shallow).expect("eval"), 8.0);

        let deep = format!("{}5 + 3", "(".repeat(20_000));
        assert!(matches!(evaluate(&deep), Err(ToolError::MalformedExpression { .. })));

        let signs = format!("{}1", "-".repeat(20_000));
        assert!(matches!(evaluate(&signs), Err(ToolError::MalformedExpression { .. })));
    }

    #[test]
    fn numbers_render_compactly() {
        assert_eq!(format_number(8.0), "8");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333333333");
    }
}
