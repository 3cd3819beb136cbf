//! key / condition / unless 表达式
//!
//! 支持的语法：
//!
//! ```text
//! #p0 #a0          按位置引用参数
//! #id              按参数名引用
//! #result          方法返回值，只在调用之后可用
//! 'text' "text" 42 true false null
//! == != ! && || ( )
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lattice_core::bean::BeanObject;
use lattice_core::metadata::MethodMetadata;
use parking_lot::RwLock;

use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Reference(String),
    Int(i64),
    Str(String),
    Ident(String),
    EqEq,
    NotEq,
    Bang,
    AndAnd,
    OrOr,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '#' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i == start {
                    return Err("expected a name after '#'".to_string());
                }
                tokens.push(Token::Reference(chars[start..i].iter().collect()));
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                i = start;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i == chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            '=' | '!' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let token = match (c, next) {
                    ('=', Some('=')) => Token::EqEq,
                    ('!', Some('=')) => Token::NotEq,
                    ('&', Some('&')) => Token::AndAnd,
                    ('|', Some('|')) => Token::OrOr,
                    ('!', _) => Token::Bang,
                    _ => return Err(format!("unexpected '{}' at {}", c, i)),
                };
                i += if token == Token::Bang { 1 } else { 2 };
                tokens.push(token);
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<i64>().map_err(|e| format!("invalid number '{}': {}", text, e))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected '{}' at {}", other, i)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// 按位置引用的参数
    Argument(usize),
    /// 按名称引用的参数
    Parameter(String),
    Result,
    Not(Box<Node>),
    Eq(Box<Node>, Box<Node>),
    Ne(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    fn references_result(&self) -> bool {
        match self {
            Node::Result => true,
            Node::Not(inner) => inner.references_result(),
            Node::Eq(a, b) | Node::Ne(a, b) | Node::And(a, b) | Node::Or(a, b) => {
                a.references_result() || b.references_result()
            }
            _ => false,
        }
    }
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
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            left = Node::Or(Box::new(left), Box::new(self.parse_and()?));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            left = Node::And(Box::new(left), Box::new(self.parse_equality()?));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node, String> {
        let left = self.parse_unary()?;
        if self.eat(&Token::EqEq) {
            return Ok(Node::Eq(Box::new(left), Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::NotEq) {
            return Ok(Node::Ne(Box::new(left), Box::new(self.parse_unary()?)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, String> {
        if self.eat(&Token::Bang) {
            return Ok(Node::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err("expected ')'".to_string());
                }
                Ok(inner)
            }
            Some(Token::Int(value)) => Ok(Node::Int(value)),
            Some(Token::Str(value)) => Ok(Node::Str(value)),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Node::Bool(true)),
                "false" => Ok(Node::Bool(false)),
                "null" => Ok(Node::Null),
                other => Err(format!("unknown identifier '{}'", other)),
            },
            Some(Token::Reference(name)) => Ok(reference(&name)),
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn reference(name: &str) -> Node {
    if name == "result" {
        return Node::Result;
    }
    let positional = name
        .strip_prefix('p')
        .or_else(|| name.strip_prefix('a'))
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse::<usize>().ok());
    match positional {
        Some(index) => Node::Argument(index),
        None => Node::Parameter(name.to_string()),
    }
}

/// 解析好的表达式
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> CacheResult<Self> {
        let tokens = tokenize(source).map_err(|e| CacheError::expression(source, e))?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or().map_err(|e| CacheError::expression(source, e))?;
        if parser.pos < parser.tokens.len() {
            return Err(CacheError::expression(source, "unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 是否引用了 `#result`
    pub fn references_result(&self) -> bool {
        self.root.references_result()
    }

    pub fn evaluate(&self, context: &EvaluationContext<'_>) -> CacheResult<Value> {
        self.eval(&self.root, context)
    }

    fn eval(&self, node: &Node, context: &EvaluationContext<'_>) -> CacheResult<Value> {
        Ok(match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::Int(*i),
            Node::Str(s) => Value::Str(s.clone()),
            Node::Argument(index) => context.argument(*index),
            Node::Parameter(name) => {
                let index = context
                    .method
                    .parameters
                    .iter()
                    .position(|p| &p.name == name)
                    .ok_or_else(|| CacheError::expression(&self.source, format!("unknown parameter '#{}'", name)))?;
                context.argument(index)
            }
            Node::Result => match context.result {
                InvocationResult::Pending => {
                    return Err(CacheError::expression(
                        &self.source,
                        "#result is not available before the method is invoked",
                    ))
                }
                InvocationResult::Returned(Some(value)) => Value::Returned(Arc::clone(value)),
                InvocationResult::Returned(None) => Value::Null,
            },
            Node::Not(inner) => Value::Bool(!self.truthy(inner, context)?),
            Node::Eq(a, b) => Value::Bool(self.eval(a, context)?.loose_eq(&self.eval(b, context)?)),
            Node::Ne(a, b) => Value::Bool(!self.eval(a, context)?.loose_eq(&self.eval(b, context)?)),
            Node::And(a, b) => Value::Bool(self.truthy(a, context)? && self.truthy(b, context)?),
            Node::Or(a, b) => Value::Bool(self.truthy(a, context)? || self.truthy(b, context)?),
        })
    }

    fn truthy(&self, node: &Node, context: &EvaluationContext<'_>) -> CacheResult<bool> {
        let value = self.eval(node, context)?;
        value
            .as_bool()
            .ok_or_else(|| CacheError::expression(&self.source, format!("{:?} is not a boolean", value)))
    }
}

/// 方法调用的结果状态
#[derive(Clone, Copy)]
pub enum InvocationResult<'a> {
    /// 方法还没有调用
    Pending,
    Returned(Option<&'a BeanObject>),
}

/// 表达式求值的上下文
pub struct EvaluationContext<'a> {
    pub method: &'a MethodMetadata,
    pub args: &'a [Option<BeanObject>],
    pub result: InvocationResult<'a>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(method: &'a MethodMetadata, args: &'a [Option<BeanObject>]) -> Self {
        Self {
            method,
            args,
            result: InvocationResult::Pending,
        }
    }

    pub fn with_result(mut self, result: Option<&'a BeanObject>) -> Self {
        self.result = InvocationResult::Returned(result);
        self
    }

    fn argument(&self, index: usize) -> Value {
        match self.args.get(index) {
            Some(Some(value)) => Value::Argument(index, Arc::clone(value)),
            _ => Value::Null,
        }
    }
}

/// 求值结果
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// 参数对象，保留位置以便报告类型
    Argument(usize, BeanObject),
    /// 返回值对象
    Returned(BeanObject),
}

impl Value {
    /// 对象值转换成可比较的标量，无法转换时原样返回
    pub fn scalar(&self) -> Value {
        let object = match self {
            Value::Argument(_, object) | Value::Returned(object) => object,
            other => return other.clone(),
        };
        if let Some(b) = object.downcast_ref::<bool>() {
            return Value::Bool(*b);
        }
        if let Some(s) = object.downcast_ref::<String>() {
            return Value::Str(s.clone());
        }
        if let Some(s) = object.downcast_ref::<&'static str>() {
            return Value::Str(s.to_string());
        }
        match integer(&**object) {
            Some(i) => Value::Int(i),
            None => self.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.scalar() {
            Value::Bool(b) => Some(b),
            Value::Null => Some(false),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 标量按值比较，无法转换的对象按引用比较
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.scalar(), other.scalar()) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Argument(_, a) | Value::Returned(a),
                Value::Argument(_, b) | Value::Returned(b),
            ) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

fn integer(object: &(dyn std::any::Any + Send + Sync)) -> Option<i64> {
    macro_rules! try_int {
        ($($t:ty),*) => {
            $(
                if let Some(v) = object.downcast_ref::<$t>() {
                    return i64::try_from(*v).ok();
                }
            )*
        };
    }
    try_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
    None
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Argument(index, _) => write!(f, "<argument {}>", index),
            Value::Returned(_) => write!(f, "<result>"),
        }
    }
}

/// 表达式求值器，解析结果按表达式文本缓存
#[derive(Default)]
pub struct ExpressionEvaluator {
    parsed: RwLock<HashMap<String, Arc<Expression>>>,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, source: &str) -> CacheResult<Arc<Expression>> {
        if let Some(expression) = self.parsed.read().get(source) {
            return Ok(Arc::clone(expression));
        }
        let expression = Arc::new(Expression::parse(source)?);
        let mut parsed = self.parsed.write();
        Ok(Arc::clone(parsed.entry(source.to_string()).or_insert(expression)))
    }

    pub fn evaluate(&self, source: &str, context: &EvaluationContext<'_>) -> CacheResult<Value> {
        self.parse(source)?.evaluate(context)
    }

    /// 条件表达式，null 视为 false
    pub fn condition(&self, source: &str, context: &EvaluationContext<'_>) -> CacheResult<bool> {
        let value = self.evaluate(source, context)?;
        value
            .as_bool()
            .ok_or_else(|| CacheError::expression(source, format!("{:?} is not a boolean", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::metadata::ParameterMetadata;

    fn method() -> MethodMetadata {
        MethodMetadata::new("find")
            .with_parameter(ParameterMetadata::new("id", "u32"))
            .with_parameter(ParameterMetadata::new("name", "String"))
    }

    fn args() -> Vec<Option<BeanObject>> {
        vec![Some(Arc::new(5u32)), Some(Arc::new("bob".to_string()))]
    }

    #[test]
    fn test_references_and_equality() {
        let evaluator = ExpressionEvaluator::new();
        let method = method();
        let args = args();
        let context = EvaluationContext::new(&method, &args);

        assert!(evaluator.condition("#p0 == 5", &context).unwrap());
        assert!(evaluator.condition("#a1 == 'bob'", &context).unwrap());
        assert!(evaluator.condition("#name != \"alice\"", &context).unwrap());
        assert!(evaluator.condition("#id == 5 && !(#name == 'x')", &context).unwrap());
        assert!(evaluator.condition("#p7 == null", &context).unwrap());
        assert!(!evaluator.condition("#p0 == '5'", &context).unwrap());
        assert!(evaluator.condition("false || #p0 == #id", &context).unwrap());
    }

    #[test]
    fn test_result_only_after_invocation() {
        let evaluator = ExpressionEvaluator::new();
        let method = method();
        let args = args();

        let before = EvaluationContext::new(&method, &args);
        assert!(matches!(
            evaluator.condition("#result == null", &before),
            Err(CacheError::Expression { .. })
        ));

        let result: BeanObject = Arc::new(-1i32);
        let after = EvaluationContext::new(&method, &args).with_result(Some(&result));
        assert!(evaluator.condition("#result == -1", &after).unwrap());

        let empty = EvaluationContext::new(&method, &args).with_result(None);
        assert!(evaluator.condition("#result == null", &empty).unwrap());
        assert!(!evaluator.condition("#result", &empty).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["#", "'open", "#p0 ==", "(#p0", "#p0 = 1", "maybe", "#p0 #p1"] {
            assert!(
                matches!(Expression::parse(bad), Err(CacheError::Expression { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }

        let evaluator = ExpressionEvaluator::new();
        let method = method();
        let args = args();
        let context = EvaluationContext::new(&method, &args);
        assert!(evaluator.condition("#missing == 1", &context).is_err());
        assert!(evaluator.condition("#p1", &context).is_err());
    }

    #[test]
    fn test_parsed_expressions_are_cached() {
        let evaluator = ExpressionEvaluator::new();
        let first = evaluator.parse("#result != null").unwrap();
        let second = evaluator.parse("#result != null").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.references_result());
        assert!(!evaluator.parse("#p0").unwrap().references_result());
    }
}
