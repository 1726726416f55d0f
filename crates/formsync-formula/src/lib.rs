//! formsync Formula - computed field expressions
//!
//! Formulas are parsed ahead of time into a small typed AST and
//! interpreted against a read-only binding table:
//! - Tokenizer
//! - Recursive-descent parser (arithmetic, comparison, logic, ternary)
//! - Interpreter with a fixed set of numeric builtins
//!
//! The interpreter sees nothing but the bindings it is handed.

pub mod token;
pub mod ast;
pub mod parser;
pub mod eval;

pub use ast::*;
pub use eval::*;
pub use parser::{parse, ParseError};
pub use token::{Span, Token, TokenKind};
