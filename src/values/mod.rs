// パス: src/values/mod.rs
// 役割: 変換途中の値（Value）とその基本構築子を定義する
// 意図: 文の巻き上げ・遅延コピー・inout の箱などを一つの閉じた列挙で表し、最後に read で確定させる
// 関連ファイル: src/values/literal.rs, src/values/read.rs, src/values/ops.rs, src/reified.rs
//! 値代数
//!
//! - `Value` は変換の各段で生成され、関数的に組み合わされ、`read` で JavaScript 式に確定する。
//! - `Direct` は副作用なく何度でも読み直せる式（識別子・`this`・純粋なメンバー参照）。
//! - `Statements` は末尾の `return` を値とみなす文列。途中に `return` を含むものは巻き上げできない。
//! - 操作の本体は `literal`（純粋性と定数畳み込み）、`read`（確定と巻き上げ）、`ops`（演算）に分かれる。

mod literal;
mod ops;
mod read;

use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::functions::Args;
use crate::js::{Expr, Stmt};
use crate::scope::ScopeId;
use crate::types::{FunctionType, Type};

pub use literal::{expression_literal_value, is_pure, literal, simplify, LiteralValue};
pub use ops::{
    binary, call, call_expression, call_member, conditional, copy, field, logical, member,
    set, unary, update,
};
pub(crate) use read::prepend_statements;
pub use read::{
    array, ignore, ignore_expression, read, reuse, reuse_expr, transform, transform_all,
    transform_statements,
};

/// 呼び出しの種別（通常呼び出し・getter・setter）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Call,
    Get,
    Set,
}

/// その場で展開されるラムダ本体。引数は `Args` から必要な分だけ取り出す。
pub type CallableBody = Rc<dyn Fn(&mut Context, ScopeId, &Args) -> CResult<Value>>;

#[derive(Clone)]
pub enum Value {
    /// 評価が必要な式
    Expression(Expr),
    /// 再読み込みしても副作用のない式
    Direct(Expr),
    Callable {
        body: CallableBody,
        ty: FunctionType,
    },
    Function {
        name: String,
        parent: Option<Box<Value>>,
        ty: Type,
        substitutions: Vec<Value>,
    },
    Tuple(Vec<Value>),
    /// inout 用の参照。中身は `Direct` か `Subscript`
    Boxed {
        contents: Box<Value>,
        ty: Type,
    },
    Subscript {
        getter: Box<Value>,
        setter: Box<Value>,
        args: Vec<Value>,
        ty: Type,
    },
    /// 値型のコピーを読み出し時まで遅らせたもの
    Copied {
        value: Box<Value>,
        ty: Type,
    },
    Type(Type),
    Conformance {
        ty: Box<Value>,
        protocol: String,
    },
    Statements(Vec<Stmt>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Expression(e) => f.debug_tuple("Expression").field(e).finish(),
            Value::Direct(e) => f.debug_tuple("Direct").field(e).finish(),
            Value::Callable { ty, .. } => write!(f, "Callable({})", ty.clone().into_type()),
            Value::Function {
                name,
                parent,
                substitutions,
                ..
            } => f
                .debug_struct("Function")
                .field("name", name)
                .field("parent", parent)
                .field("substitutions", substitutions)
                .finish(),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Value::Boxed { contents, ty } => write!(f, "Boxed({:?}: {})", contents, ty),
            Value::Subscript { args, ty, .. } => write!(f, "Subscript({:?}: {})", args, ty),
            Value::Copied { value, ty } => write!(f, "Copied({:?}: {})", value, ty),
            Value::Type(ty) => write!(f, "Type({})", ty),
            Value::Conformance { ty, protocol } => {
                write!(f, "Conformance({:?}: {})", ty, protocol)
            }
            Value::Statements(stmts) => f.debug_tuple("Statements").field(stmts).finish(),
        }
    }
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Expression(_) => "expression",
            Value::Direct(_) => "direct",
            Value::Callable { .. } => "callable",
            Value::Function { .. } => "function",
            Value::Tuple(_) => "tuple",
            Value::Boxed { .. } => "boxed",
            Value::Subscript { .. } => "subscript",
            Value::Copied { .. } => "copied",
            Value::Type(_) => "type",
            Value::Conformance { .. } => "conformance",
            Value::Statements(_) => "statements",
        }
    }

    pub fn ident(name: impl Into<String>) -> Value {
        Value::Direct(Expr::Ident(name.into()))
    }

    pub fn undefined() -> Value {
        Value::Direct(Expr::undefined())
    }

    pub fn unit() -> Value {
        Value::Tuple(Vec::new())
    }

    pub fn num(value: f64) -> Value {
        Value::Direct(Expr::Num(value))
    }

    pub fn boolean(value: bool) -> Value {
        Value::Direct(Expr::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Value {
        Value::Direct(Expr::Str(value.into()))
    }

    pub fn null() -> Value {
        Value::Direct(Expr::Null)
    }

    pub fn type_value(ty: Type) -> Value {
        Value::Type(ty)
    }

    pub fn conformance(ty: Value, protocol: impl Into<String>) -> Value {
        Value::Conformance {
            ty: Box::new(ty),
            protocol: protocol.into(),
        }
    }

    pub fn boxed(contents: Value, ty: Type) -> Value {
        Value::Boxed {
            contents: Box::new(contents),
            ty,
        }
    }

    pub fn copied(value: Value, ty: Type) -> Value {
        Value::Copied {
            value: Box::new(value),
            ty,
        }
    }

    pub fn subscript(getter: Value, setter: Value, args: Vec<Value>, ty: Type) -> Value {
        Value::Subscript {
            getter: Box::new(getter),
            setter: Box::new(setter),
            args,
            ty,
        }
    }

    /// 自由関数への参照。
    pub fn function(name: impl Into<String>, ty: Type) -> Value {
        Value::Function {
            name: name.into(),
            parent: None,
            ty,
            substitutions: Vec::new(),
        }
    }

    /// 型（またはプロトコル）に属する関数への参照。
    pub fn member_function(parent: Value, name: impl Into<String>, ty: Type) -> Value {
        Value::Function {
            name: name.into(),
            parent: Some(Box::new(parent)),
            ty,
            substitutions: Vec::new(),
        }
    }

    pub fn callable(
        ty: FunctionType,
        body: impl Fn(&mut Context, ScopeId, &Args) -> CResult<Value> + 'static,
    ) -> Value {
        Value::Callable {
            body: Rc::new(body),
            ty,
        }
    }

    /// 直接値の式（それ以外は None）。
    pub fn as_direct(&self) -> Option<&Expr> {
        match self {
            Value::Direct(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_direct_undefined(&self) -> bool {
        matches!(self, Value::Direct(e) if e.is_undefined())
    }
}

/// 式を値に包む。副作用のない単純な形は `Direct` に分類し直す。
pub fn expr(e: Expr) -> Value {
    match &e {
        Expr::Ident(_) | Expr::This => Value::Direct(e),
        Expr::Member {
            object,
            property,
            computed,
        } if is_pure(object) && (!*computed || is_pure(property)) => Value::Direct(e),
        _ => Value::Expression(simplify(e)),
    }
}

/// 文列を値に包む。単独の `return x` は式に畳む。
pub fn statements(mut stmts: Vec<Stmt>) -> Value {
    if stmts.len() == 1 {
        if let Stmt::Return(Some(_)) = &stmts[0] {
            if let Some(Stmt::Return(Some(e))) = stmts.pop() {
                return expr(e);
            }
        }
    }
    Value::Statements(stmts)
}

/// 途中に（関数境界を越えない）`return` を含むか。
pub fn has_nested_return(stmts: &[Stmt]) -> bool {
    fn visit(stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Return(_) => true,
            Stmt::If {
                consequent,
                alternate,
                ..
            } => consequent.iter().any(visit) || alternate.as_deref().map(visit).unwrap_or(false),
            Stmt::Block(body)
            | Stmt::While { body, .. }
            | Stmt::DoWhile { body, .. }
            | Stmt::For { body, .. }
            | Stmt::ForOf { body, .. }
            | Stmt::ForIn { body, .. } => body.iter().any(visit),
            Stmt::Switch { cases, .. } => cases.iter().any(|c| c.body.iter().any(visit)),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                block.iter().any(visit)
                    || handler
                        .as_ref()
                        .map(|(_, body)| body.iter().any(visit))
                        .unwrap_or(false)
                    || finalizer
                        .as_ref()
                        .map(|body| body.iter().any(visit))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
    let body = match stmts.last() {
        Some(Stmt::Return(_)) => &stmts[..stmts.len() - 1],
        _ => stmts,
    };
    body.iter().any(visit)
}

/// 文列を「前置き」と「末尾の値」に分ける（末尾が `return` でなければ値は None）。
pub fn split_statements(stmts: &[Stmt]) -> (Vec<Stmt>, Option<Expr>) {
    match stmts.split_last() {
        Some((Stmt::Return(Some(e)), head)) => (head.to_vec(), Some(e.clone())),
        Some((Stmt::Return(None), head)) => (head.to_vec(), Some(Expr::undefined())),
        _ => (stmts.to_vec(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 識別子と純粋なメンバー参照は Direct になる
    fn expr_classifies_direct() {
        assert!(matches!(expr(Expr::ident("a")), Value::Direct(_)));
        assert!(matches!(
            expr(Expr::member(Expr::ident("a"), "b")),
            Value::Direct(_)
        ));
        assert!(matches!(
            expr(Expr::call(Expr::ident("f"), vec![])),
            Value::Expression(_)
        ));
    }

    #[test]
    /// 単独の return は式に畳まれる
    fn single_return_collapses() {
        let value = statements(vec![Stmt::ret(Expr::ident("x"))]);
        assert!(matches!(value, Value::Direct(Expr::Ident(ref n)) if n == "x"));
        let multi = statements(vec![
            Stmt::expr(Expr::call(Expr::ident("f"), vec![])),
            Stmt::ret(Expr::ident("x")),
        ]);
        assert!(matches!(multi, Value::Statements(_)));
    }

    #[test]
    /// 末尾以外の return を検出する
    fn detects_nested_return() {
        let tail_only = vec![Stmt::expr(Expr::ident("a")), Stmt::ret(Expr::num(1.0))];
        assert!(!has_nested_return(&tail_only));
        let nested = vec![
            Stmt::if_else(Expr::ident("c"), vec![Stmt::ret(Expr::num(1.0))], None),
            Stmt::ret(Expr::num(2.0)),
        ];
        assert!(has_nested_return(&nested));
    }
}
