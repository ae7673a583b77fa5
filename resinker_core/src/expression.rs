//! Restricted derived-expression language.
//!
//! Derived fields compute values from the partially built payload. The
//! grammar is deliberately tiny: `+ - * /` arithmetic over numeric payload
//! fields, numeric literals, parentheses, and a single aggregate form
//! `sum(item['a'] * item['b'] for item in some_array)`. Anything outside
//! this grammar is a parse error, surfaced at validation time.

use serde_json::Value;
use thiserror::Error;

/// Errors from parsing or evaluating a derived expression.
#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected {found:?} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unsupported syntax: {0}")]
    Unsupported(String),

    #[error("expression references unknown field {0:?}")]
    UnknownField(String),

    #[error("field {0:?} is not numeric")]
    NotNumeric(String),

    #[error("field {0:?} is not an array")]
    NotAnArray(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div => lhs / rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    /// Dotted path into the current payload scope
    Field(String),
    /// `item['name']` inside an aggregate body
    ItemField(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `sum(<body> for item in <array_field>)`
    Sum {
        body: Box<Expr>,
        array_field: String,
    },
}

/// A parsed derived expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parses an expression, rejecting anything outside the restricted
    /// grammar.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expression(false)?;
        if let Some(token) = parser.peek() {
            return Err(ExpressionError::UnexpectedToken {
                found: token.text(),
                offset: token.offset(),
            });
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Evaluates against the current payload scope. Referencing a field
    /// that is absent from the scope is an error, never a default.
    pub fn evaluate(&self, scope: &serde_json::Map<String, Value>) -> Result<f64, ExpressionError> {
        eval(&self.root, scope, None)
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn eval(
    expr: &Expr,
    scope: &serde_json::Map<String, Value>,
    item: Option<&serde_json::Map<String, Value>>,
) -> Result<f64, ExpressionError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Field(path) => {
            let value = lookup(scope, path).ok_or_else(|| ExpressionError::UnknownField(path.clone()))?;
            value
                .as_f64()
                .ok_or_else(|| ExpressionError::NotNumeric(path.clone()))
        }
        Expr::ItemField(name) => {
            // Parser only produces ItemField under Sum, where item is set.
            let item = item.ok_or_else(|| ExpressionError::Unsupported("item outside aggregate".into()))?;
            let value = item
                .get(name)
                .ok_or_else(|| ExpressionError::UnknownField(format!("item['{name}']")))?;
            value
                .as_f64()
                .ok_or_else(|| ExpressionError::NotNumeric(format!("item['{name}']")))
        }
        Expr::Binary { op, lhs, rhs } => {
            Ok(op.apply(eval(lhs, scope, item)?, eval(rhs, scope, item)?))
        }
        Expr::Sum { body, array_field } => {
            let value = lookup(scope, array_field)
                .ok_or_else(|| ExpressionError::UnknownField(array_field.clone()))?;
            let Value::Array(elements) = value else {
                return Err(ExpressionError::NotAnArray(array_field.clone()));
            };
            let mut total = 0.0;
            for element in elements {
                let Value::Object(element) = element else {
                    return Err(ExpressionError::NotNumeric(format!("{array_field}[..]")));
                };
                total += eval(body, scope, Some(element))?;
            }
            Ok(total)
        }
    }
}

fn lookup<'a>(scope: &'a serde_json::Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    for part in path.split('.') {
        current = match current {
            None => scope.get(part),
            Some(Value::Object(map)) => map.get(part),
            _ => None,
        };
        current?;
    }
    current
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64, usize),
    Ident(String, usize),
    Str(String, usize),
    Symbol(char, usize),
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Number(n, _) => n.to_string(),
            Token::Ident(s, _) | Token::Str(s, _) => s.clone(),
            Token::Symbol(c, _) => c.to_string(),
        }
    }

    fn offset(&self) -> usize {
        match self {
            Token::Number(_, o) | Token::Ident(_, o) | Token::Str(_, o) | Token::Symbol(_, o) => *o,
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == '.') {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            let number = text.parse::<f64>().map_err(|_| ExpressionError::UnexpectedToken {
                found: text.clone(),
                offset: start,
            })?;
            tokens.push(Token::Number(number, start));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == '_' || bytes[i] == '.')
            {
                i += 1;
            }
            tokens.push(Token::Ident(bytes[start..i].iter().collect(), start));
        } else if c == '\'' || c == '"' {
            let quote = c;
            let start = i;
            i += 1;
            let content_start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            if i >= bytes.len() {
                return Err(ExpressionError::UnexpectedToken {
                    found: quote.to_string(),
                    offset: start,
                });
            }
            tokens.push(Token::Str(bytes[content_start..i].iter().collect(), start));
            i += 1;
        } else if matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '[' | ']') {
            tokens.push(Token::Symbol(c, i));
            i += 1;
        } else {
            return Err(ExpressionError::UnexpectedToken {
                found: c.to_string(),
                offset: i,
            });
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_symbol(&mut self, symbol: char) -> Result<(), ExpressionError> {
        match self.next() {
            Some(Token::Symbol(c, _)) if c == symbol => Ok(()),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.text(),
                offset: token.offset(),
            }),
            None => Err(ExpressionError::UnexpectedToken {
                found: "end of input".to_string(),
                offset: usize::MAX,
            }),
        }
    }

    fn expression(&mut self, in_aggregate: bool) -> Result<Expr, ExpressionError> {
        let mut lhs = self.term(in_aggregate)?;
        while let Some(Token::Symbol(op @ ('+' | '-'), _)) = self.peek() {
            let op = if *op == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            let rhs = self.term(in_aggregate)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self, in_aggregate: bool) -> Result<Expr, ExpressionError> {
        let mut lhs = self.factor(in_aggregate)?;
        while let Some(Token::Symbol(op @ ('*' | '/'), _)) = self.peek() {
            let op = if *op == '*' { BinOp::Mul } else { BinOp::Div };
            self.pos += 1;
            let rhs = self.factor(in_aggregate)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self, in_aggregate: bool) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n, _)) => Ok(Expr::Number(n)),
            Some(Token::Symbol('(', _)) => {
                let inner = self.expression(in_aggregate)?;
                self.eat_symbol(')')?;
                Ok(inner)
            }
            Some(Token::Ident(name, offset)) => match name.as_str() {
                "sum" => {
                    if in_aggregate {
                        return Err(ExpressionError::Unsupported("nested aggregates".into()));
                    }
                    self.aggregate()
                }
                "item" => {
                    if !in_aggregate {
                        return Err(ExpressionError::Unsupported(
                            "item[..] outside an aggregate".into(),
                        ));
                    }
                    self.eat_symbol('[')?;
                    let field = match self.next() {
                        Some(Token::Str(field, _)) => field,
                        Some(token) => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: token.text(),
                                offset: token.offset(),
                            })
                        }
                        None => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: "end of input".to_string(),
                                offset: usize::MAX,
                            })
                        }
                    };
                    self.eat_symbol(']')?;
                    Ok(Expr::ItemField(field))
                }
                "for" | "in" => Err(ExpressionError::UnexpectedToken {
                    found: name,
                    offset,
                }),
                _ => {
                    if in_aggregate {
                        return Err(ExpressionError::Unsupported(format!(
                            "reference to {name:?} inside an aggregate body"
                        )));
                    }
                    Ok(Expr::Field(name))
                }
            },
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.text(),
                offset: token.offset(),
            }),
            None => Err(ExpressionError::UnexpectedToken {
                found: "end of input".to_string(),
                offset: usize::MAX,
            }),
        }
    }

    /// Parses `( <body> for item in <ident> )` after the `sum` keyword.
    fn aggregate(&mut self) -> Result<Expr, ExpressionError> {
        self.eat_symbol('(')?;
        let body = self.expression(true)?;
        self.expect_keyword("for")?;
        self.expect_keyword("item")?;
        self.expect_keyword("in")?;
        let array_field = match self.next() {
            Some(Token::Ident(name, _)) => name,
            Some(token) => {
                return Err(ExpressionError::UnexpectedToken {
                    found: token.text(),
                    offset: token.offset(),
                })
            }
            None => {
                return Err(ExpressionError::UnexpectedToken {
                    found: "end of input".to_string(),
                    offset: usize::MAX,
                })
            }
        };
        self.eat_symbol(')')?;
        Ok(Expr::Sum {
            body: Box::new(body),
            array_field,
        })
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ExpressionError> {
        match self.next() {
            Some(Token::Ident(name, _)) if name == keyword => Ok(()),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.text(),
                offset: token.offset(),
            }),
            None => Err(ExpressionError::UnexpectedToken {
                found: "end of input".to_string(),
                offset: usize::MAX,
            }),
        }
    }
}
