// パス: src/values/read.rs
// 役割: 値を JavaScript 式へ確定する read と、文の巻き上げを伴う transform 系の操作
// 意図: 多段の値を評価順を崩さずに式の位置へ埋め込む
// 関連ファイル: src/values/mod.rs, src/values/ops.rs, src/functions.rs, src/reified.rs
//! 確定（read）と巻き上げ（transform）
//!
//! - `transform` は `Statements` の前置き部分を外へ出し、末尾の式だけをコールバックへ渡す。
//! - `transform_all` は複数の値を左から右の評価順のまま一つの式にまとめる。
//!   後続の要素に前置きがある場合、先行する非リテラルの要素は定数へ退避する。
//! - `reuse_expr` は一度だけ評価したい式を一時変数に束縛し、（代入式, 一時変数）の組を返す。

use crate::context::Context;
use crate::errors::CResult;
use crate::functions::functionize;
use crate::js::{Expr, PropKey, PropValue, Stmt, VarKind};
use crate::reified::{copy_value, type_reference};
use crate::scope::ScopeId;

use super::literal::{expression_literal_value, is_pure, simplify};
use super::ops::{call, function_reference};
use super::{expr, has_nested_return, split_statements, CallKind, Value};

/// 値を JavaScript の式に確定する。
pub fn read(ctx: &mut Context, scope: ScopeId, value: Value) -> CResult<Expr> {
    match value {
        Value::Expression(e) | Value::Direct(e) => Ok(e),
        Value::Copied { value, ty } => {
            let copied = copy_value(ctx, scope, *value, &ty)?;
            read(ctx, scope, copied)
        }
        value @ Value::Function { .. } => function_reference(ctx, scope, value),
        Value::Tuple(mut items) => match items.len() {
            0 => Ok(Expr::undefined()),
            1 => read(ctx, scope, items.remove(0)),
            _ => {
                let literal = array(ctx, scope, items)?;
                read(ctx, scope, literal)
            }
        },
        Value::Callable { body, ty } => {
            let (params, stmts) = functionize(ctx, scope, "closure", Some(ty.arity()), &|c, s, a| {
                body(c, s, a)
            })?;
            Ok(Expr::Function {
                name: None,
                params,
                body: stmts,
            })
        }
        Value::Statements(stmts) => Ok(read_statements(stmts)),
        Value::Subscript { getter, args, .. } => {
            let current = call(ctx, scope, *getter, args, CallKind::Get)?;
            read(ctx, scope, current)
        }
        Value::Boxed { contents, .. } => read(ctx, scope, *contents),
        value @ (Value::Type(_) | Value::Conformance { .. }) => type_reference(ctx, scope, &value),
    }
}

/// 文列を式にする。式文だけなら連接式、そうでなければ即時実行関数。
fn read_statements(stmts: Vec<Stmt>) -> Expr {
    if !has_nested_return(&stmts) {
        let (head, tail) = split_statements(&stmts);
        if head.iter().all(|s| matches!(s, Stmt::Expr(_))) {
            let mut items: Vec<Expr> = head
                .into_iter()
                .filter_map(|s| match s {
                    Stmt::Expr(e) => Some(e),
                    _ => None,
                })
                .collect();
            items.push(tail.unwrap_or_else(Expr::undefined));
            return simplify(Expr::Sequence(items));
        }
    }
    Expr::call(Expr::function(Vec::new(), stmts), Vec::new())
}

/// 場所を表す値（箱・添字・タプル・遅延コピー）を中身の値まで剥がす。
fn unwrap_place(ctx: &mut Context, scope: ScopeId, mut value: Value) -> CResult<Value> {
    loop {
        value = match value {
            Value::Tuple(items) if items.len() > 1 => array(ctx, scope, items)?,
            Value::Tuple(mut items) if items.len() == 1 => items.remove(0),
            Value::Subscript { getter, args, .. } => {
                call(ctx, scope, *getter, args, CallKind::Get)?
            }
            Value::Boxed { contents, .. } => *contents,
            Value::Copied { value, ty } => copy_value(ctx, scope, *value, &ty)?,
            other => return Ok(other),
        };
    }
}

/// 前置きの文を結果の値の前に付ける。
pub(crate) fn prepend_statements(
    ctx: &mut Context,
    scope: ScopeId,
    mut head: Vec<Stmt>,
    result: Value,
) -> CResult<Value> {
    if head.is_empty() {
        return Ok(result);
    }
    match result {
        Value::Statements(rest) => {
            head.extend(rest);
            Ok(Value::Statements(head))
        }
        value if value.is_direct_undefined() => Ok(Value::Statements(head)),
        value => {
            let tail = read(ctx, scope, value)?;
            head.push(Stmt::ret(simplify(tail)));
            Ok(Value::Statements(head))
        }
    }
}

/// 値の末尾の式をコールバックで変換し、前置きの文を保ったまま値を組み直す。
pub fn transform(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    f: &mut dyn FnMut(&mut Context, ScopeId, Expr) -> CResult<Value>,
) -> CResult<Value> {
    match unwrap_place(ctx, scope, value)? {
        Value::Statements(stmts) if !has_nested_return(&stmts) => {
            let (head, tail) = split_statements(&stmts);
            let tail = simplify(tail.unwrap_or_else(Expr::undefined));
            let result = f(ctx, scope, tail)?;
            prepend_statements(ctx, scope, head, result)
        }
        other => {
            let e = read(ctx, scope, other)?;
            f(ctx, scope, simplify(e))
        }
    }
}

/// 文の位置で値を使う。前置きの文に、末尾の式から作った文を続ける。
pub fn transform_statements(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    f: &mut dyn FnMut(&mut Context, ScopeId, Expr) -> CResult<Vec<Stmt>>,
) -> CResult<Vec<Stmt>> {
    match unwrap_place(ctx, scope, value)? {
        Value::Statements(stmts) if !has_nested_return(&stmts) => {
            let (mut head, tail) = split_statements(&stmts);
            let tail = simplify(tail.unwrap_or_else(Expr::undefined));
            head.extend(f(ctx, scope, tail)?);
            Ok(head)
        }
        other => {
            let e = read(ctx, scope, other)?;
            f(ctx, scope, simplify(e))
        }
    }
}

/// 複数の値を評価順を保って式の列にし、コールバックで一つの値にまとめる。
pub fn transform_all(
    ctx: &mut Context,
    scope: ScopeId,
    values: Vec<Value>,
    f: &mut dyn FnMut(&mut Context, ScopeId, Vec<Expr>) -> CResult<Value>,
) -> CResult<Value> {
    let mut prefix: Vec<Stmt> = Vec::new();
    let mut exprs: Vec<Expr> = Vec::with_capacity(values.len());
    for value in values.into_iter().rev() {
        let (mut head, e) = match unwrap_place(ctx, scope, value)? {
            Value::Statements(stmts) if !has_nested_return(&stmts) => {
                let (head, tail) = split_statements(&stmts);
                (head, simplify(tail.unwrap_or_else(Expr::undefined)))
            }
            other => (Vec::new(), read(ctx, scope, other)?),
        };
        let stable = expression_literal_value(&e).is_some() || matches!(e, Expr::This);
        let e = if !prefix.is_empty() && !stable {
            let name = ctx.reserve_unique(scope, "element")?;
            head.push(Stmt::var(VarKind::Const, name.clone(), Some(e)));
            Expr::Ident(name)
        } else {
            e
        };
        head.extend(prefix);
        prefix = head;
        exprs.push(e);
    }
    exprs.reverse();
    let result = f(ctx, scope, exprs)?;
    prepend_statements(ctx, scope, prefix, result)
}

/// 配列リテラル。要素の前置きは要素の順に実行される。
pub fn array(ctx: &mut Context, scope: ScopeId, values: Vec<Value>) -> CResult<Value> {
    transform_all(ctx, scope, values, &mut |_, _, items| Ok(expr(Expr::Array(items))))
}

/// 結果を捨てる式を、副作用の残る文だけにする。
pub fn ignore_expression(e: Expr) -> Vec<Stmt> {
    match e {
        Expr::Ident(_)
        | Expr::This
        | Expr::Num(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Function { .. } => Vec::new(),
        Expr::Sequence(items) | Expr::Array(items) => {
            items.into_iter().flat_map(ignore_expression).collect()
        }
        Expr::Template { exprs, .. } => exprs.into_iter().flat_map(ignore_expression).collect(),
        Expr::Binary { left, right, op } if !matches!(op, "in" | "instanceof") => {
            let mut out = ignore_expression(*left);
            out.extend(ignore_expression(*right));
            out
        }
        Expr::Unary { op, arg } if matches!(op, "!" | "+" | "-" | "~" | "typeof" | "void") => {
            ignore_expression(*arg)
        }
        Expr::Object(props) => props
            .into_iter()
            .flat_map(|p| {
                let mut out = match p.key {
                    PropKey::Computed(k) => ignore_expression(k),
                    _ => Vec::new(),
                };
                if let PropValue::Value(v) = p.value {
                    out.extend(ignore_expression(v));
                }
                out
            })
            .collect(),
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let cons = ignore_expression(*consequent);
            let alt = ignore_expression(*alternate);
            match (cons.is_empty(), alt.is_empty()) {
                (true, true) => ignore_expression(*test),
                (false, true) => vec![Stmt::if_else(*test, cons, None)],
                (true, false) => vec![Stmt::if_else(simplify(Expr::unary("!", *test)), alt, None)],
                (false, false) => vec![Stmt::if_else(*test, cons, Some(alt))],
            }
        }
        Expr::Assign { op: "=", target, value } if target == value => Vec::new(),
        other => vec![Stmt::Expr(other)],
    }
}

/// 値を評価して結果を捨てる文列。
pub fn ignore(ctx: &mut Context, scope: ScopeId, value: Value) -> CResult<Vec<Stmt>> {
    transform_statements(ctx, scope, value, &mut |_, _, e| Ok(ignore_expression(e)))
}

/// 一度だけ評価したい式を（最初に使う式, 以降に使う式）の組にする。
pub fn reuse_expr(
    ctx: &mut Context,
    scope: ScopeId,
    e: Expr,
    prefix: &str,
) -> CResult<(Expr, Expr)> {
    if is_pure(&e) {
        return Ok((e.clone(), e));
    }
    match e {
        Expr::Member {
            object,
            property,
            computed,
        } => {
            let (object_first, object_after) = if matches!(*object, Expr::Ident(_) | Expr::This) {
                (*object.clone(), *object)
            } else {
                reuse_expr(ctx, scope, *object, prefix)?
            };
            let (property_first, property_after) = if !computed || is_pure(&property) {
                (*property.clone(), *property)
            } else {
                reuse_expr(ctx, scope, *property, "index")?
            };
            Ok((
                Expr::Member {
                    object: Box::new(object_first),
                    property: Box::new(property_first),
                    computed,
                },
                Expr::Member {
                    object: Box::new(object_after),
                    property: Box::new(property_after),
                    computed,
                },
            ))
        }
        other => {
            let temp = ctx.declare_temporary(scope, prefix)?;
            Ok((
                Expr::assign("=", Expr::ident(temp.clone()), other),
                Expr::ident(temp),
            ))
        }
    }
}

/// 値版の `reuse_expr`。直接値なら同じ値の組を返す。
pub fn reuse(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    prefix: &str,
) -> CResult<(Value, Value)> {
    if let Value::Direct(_) = value {
        return Ok((value.clone(), value));
    }
    let mut after = None;
    let first = transform(ctx, scope, value, &mut |ctx, scope, e| {
        let (first, second) = reuse_expr(ctx, scope, e, prefix)?;
        after = Some(second);
        Ok(expr(first))
    })?;
    let after = after.map(expr).unwrap_or_else(Value::undefined);
    Ok((first, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::printer::print_expr;

    #[test]
    /// 2 要素以上のタプルは配列リテラルになる
    fn tuple_reads_as_array() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let e = read(
            &mut ctx,
            root,
            Value::Tuple(vec![Value::num(1.0), Value::ident("a")]),
        )
        .expect("read");
        assert_eq!(print_expr(&e), "[1, a]");
        let unit = read(&mut ctx, root, Value::unit()).expect("read");
        assert!(unit.is_undefined());
    }

    #[test]
    /// 前置きのある要素より前の要素は定数に退避される
    fn array_preserves_evaluation_order() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let first = expr(Expr::call(Expr::ident("f"), vec![]));
        let second = Value::Statements(vec![
            Stmt::expr(Expr::call(Expr::ident("g"), vec![])),
            Stmt::ret(Expr::ident("x")),
        ]);
        let value = array(&mut ctx, root, vec![first, second]).expect("array");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            crate::js::printer::print_stmts(&stmts),
            "const element = f();\ng();\nreturn [element, x];\n"
        );
    }

    #[test]
    /// 捨てる式からは純粋な部分が消える
    fn ignore_drops_pure_parts() {
        let e = Expr::binary(
            "+",
            Expr::ident("a"),
            Expr::call(Expr::ident("f"), vec![]),
        );
        assert_eq!(
            ignore_expression(e),
            vec![Stmt::expr(Expr::call(Expr::ident("f"), vec![]))]
        );
        let same = Expr::assign("=", Expr::ident("x"), Expr::ident("x"));
        assert!(ignore_expression(same).is_empty());
    }

    #[test]
    /// 非純粋な式は一時変数に束縛される
    fn reuse_binds_temporary() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let (first, after) = reuse_expr(
            &mut ctx,
            root,
            Expr::call(Expr::ident("f"), vec![]),
            "value",
        )
        .expect("reuse");
        assert_eq!(print_expr(&first), "value = f()");
        assert_eq!(print_expr(&after), "value");
        let (a, b) = reuse_expr(&mut ctx, root, Expr::ident("x"), "value").expect("reuse");
        assert_eq!(a, b);
    }

    #[test]
    /// 式文だけの文列は連接式として読める
    fn statements_read_as_sequence() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let value = Value::Statements(vec![
            Stmt::expr(Expr::call(Expr::ident("f"), vec![])),
            Stmt::ret(Expr::ident("x")),
        ]);
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "f(), x");
    }
}
