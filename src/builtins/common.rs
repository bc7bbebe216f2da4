// パス: src/builtins/common.rs
// 役割: 組み込み型の実装が共有する小さな部品（引数の取り出し・再利用・失敗関数・未実装の代替）
// 意図: 各組み込み型のファイルを「関数表の列挙」に集中させる
// 関連ファイル: src/builtins/mod.rs, src/functions.rs, src/values/ops.rs
//! 組み込み共通部品
//!
//! - `method` / `property` は仮引数名の候補を添えた関数項目を作る。
//! - `reuse_args` は一度だけ評価すべき引数を一時変数へ退避し、前置きの文を返す。
//! - 失敗関数（境界外・強制アンラップ・桁あふれ）は初回の使用時にルートへ出力される。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::functions::{noinline, Args, FunctionBuilder, FunctionEntry};
use crate::js::{Expr, Stmt};
use crate::scope::{mangle_name, ScopeId};
use crate::types::Type;
use crate::values::{
    binary, call, call_expression, expr, field, prepend_statements, set, transform_statements,
    CallKind, Value,
};

/// 組み込み関数の本体。引数は平坦な列で受け取る。
pub type Body = dyn Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value>;

/// 引数を固定長の配列に並べ替える。足りない位置は `undefined`。
pub fn split<const N: usize>(values: Vec<Value>) -> [Value; N] {
    let mut iter = values.into_iter();
    std::array::from_fn(|_| iter.next().unwrap_or_else(Value::undefined))
}

/// 渡された個数までを名前付きで取り出す。足りない分は `split` が `undefined` で埋める。
fn named_args(ctx: &mut Context, args: &Args, names: &[&str]) -> CResult<Vec<Value>> {
    let count = args.len().map_or(names.len(), |n| n.min(names.len()));
    names[..count]
        .iter()
        .enumerate()
        .map(|(i, name)| args.named(ctx, i, Some(name)))
        .collect()
}

/// 名前付き引数を受け取る組み立て器。
pub fn builder(
    names: &'static [&'static str],
    f: impl Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value> + 'static,
) -> FunctionBuilder {
    Rc::new(move |ctx, scope, args, _| {
        let values = named_args(ctx, args, names)?;
        f(ctx, scope, values)
    })
}

/// 通常のメソッド・演算子。
pub fn method(
    names: &'static [&'static str],
    f: impl Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value> + 'static,
) -> FunctionEntry {
    FunctionEntry::Plain(builder(names, f))
}

/// 読み取り専用のプロパティ。
pub fn property(
    names: &'static [&'static str],
    f: impl Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value> + 'static,
) -> FunctionEntry {
    FunctionEntry::Property {
        get: builder(names, f),
        set: None,
    }
}

/// 定数を返す静的メンバー（`zero`・`min`・`max` など）。
pub fn constant(value: Value) -> FunctionEntry {
    method(&[], move |_, _, _| Ok(value.clone()))
}

/// `lhs op rhs` をそのまま JavaScript の演算子にする。
pub fn binary_builtin(op: &'static str) -> FunctionEntry {
    method(&["lhs", "rhs"], move |ctx, scope, args| {
        let [lhs, rhs] = split(args);
        binary(ctx, scope, op, lhs, rhs)
    })
}

/// 演算結果に検査（範囲チェック・切り詰め）を挟む二項演算。
pub fn checked_binary(
    op: &'static str,
    check: Rc<dyn Fn(&mut Context, ScopeId, Value) -> CResult<Value>>,
) -> FunctionEntry {
    method(&["lhs", "rhs"], move |ctx, scope, args| {
        let [lhs, rhs] = split(args);
        let result = binary(ctx, scope, op, lhs, rhs)?;
        check(ctx, scope, result)
    })
}

/// `target op= value` をそのまま複合代入にする。
pub fn update_builtin(op: &'static str) -> FunctionEntry {
    method(&["target", "value"], move |ctx, scope, args| {
        let [target, value] = split(args);
        set(ctx, scope, target, value, op)
    })
}

/// `self.length`
pub fn read_length_field() -> FunctionEntry {
    property(&["self"], |ctx, scope, args| {
        let [target] = split(args);
        field(ctx, scope, target, "length")
    })
}

/// `self.length === 0`
pub fn is_empty_from_length() -> FunctionEntry {
    property(&["self"], |ctx, scope, args| {
        let [target] = split(args);
        let length = field(ctx, scope, target, "length")?;
        binary(ctx, scope, "===", length, Value::num(0.0))
    })
}

pub fn start_index_of_zero() -> FunctionEntry {
    property(&["self"], |_, _, _| Ok(Value::num(0.0)))
}

/// 一度だけ評価すべき引数を一時変数へ退避する。
///
/// 戻り値は（前置きの文, 以後何度でも読める値）。直接値とリテラルはそのまま使う。
pub fn reuse_args(
    ctx: &mut Context,
    scope: ScopeId,
    values: Vec<Value>,
    names: &[&str],
) -> CResult<(Vec<Stmt>, Vec<Value>)> {
    let mut prefix = Vec::new();
    let mut out = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        let stable = match &value {
            Value::Direct(_) | Value::Type(_) | Value::Conformance { .. } => true,
            Value::Expression(e) => crate::values::expression_literal_value(e).is_some(),
            Value::Tuple(items) => items.is_empty(),
            _ => false,
        };
        if stable {
            out.push(value);
            continue;
        }
        let name = names.get(i).copied().unwrap_or("value");
        let temp = ctx.declare_temporary(scope, name)?;
        let target = temp.clone();
        prefix.extend(transform_statements(ctx, scope, value, &mut |_, _, e| {
            Ok(vec![Stmt::expr(Expr::assign(
                "=",
                Expr::ident(target.clone()),
                e,
            ))])
        })?);
        out.push(Value::ident(temp));
    }
    Ok((prefix, out))
}

/// `reuse_args` の前置きを結果の値の前に付ける。
pub fn finish(
    ctx: &mut Context,
    scope: ScopeId,
    prefix: Vec<Stmt>,
    result: Value,
) -> CResult<Value> {
    prepend_statements(ctx, scope, prefix, result)
}

/// 型（または適合）のメンバー関数を呼ぶ。
pub fn call_method(
    ctx: &mut Context,
    scope: ScopeId,
    parent: &Value,
    name: &str,
    args: Vec<Value>,
) -> CResult<Value> {
    crate::values::call_member(ctx, scope, parent.clone(), name, args)
}

/// 型（または適合）のプロパティを読む。添字は `args` の後ろに続く。
pub fn get_property(
    ctx: &mut Context,
    scope: ScopeId,
    parent: &Value,
    name: &str,
    args: Vec<Value>,
) -> CResult<Value> {
    let getter = Value::member_function(parent.clone(), name, Type::void());
    call(ctx, scope, getter, args, CallKind::Get)
}

/// 未実装の組み込み。スタブ関数の呼び出しを出力し、名前を警告として記録する。
pub fn return_todo(ctx: &mut Context, scope: ScopeId, name: &str) -> CResult<Value> {
    log::warn!("missing builtin: {}", name);
    let stub = format!("todo_missing_builtin${}", mangle_name(name));
    call_expression(ctx, scope, Expr::ident(stub), Vec::new())
}

pub fn todo_entry() -> FunctionEntry {
    FunctionEntry::Plain(Rc::new(|ctx, scope, _, name| return_todo(ctx, scope, name)))
}

/// 実行時に必ず例外を投げる補助関数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    ArrayBounds,
    StringBounds,
    ForceUnwrap,
    NumericRange,
    NotImplemented,
}

impl Trap {
    pub const ALL: [Trap; 5] = [
        Trap::ArrayBounds,
        Trap::StringBounds,
        Trap::ForceUnwrap,
        Trap::NumericRange,
        Trap::NotImplemented,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Trap::ArrayBounds => "Swift.(swift-to-js).arrayBoundsFailed()",
            Trap::StringBounds => "Swift.(swift-to-js).stringBoundsFailed()",
            Trap::ForceUnwrap => "Swift.(swift-to-js).forceUnwrapFailed()",
            Trap::NumericRange => "Swift.(swift-to-js).numericRangeFailed()",
            Trap::NotImplemented => "Swift.(swift-to-js).notImplemented()",
        }
    }

    fn error(self) -> (&'static str, &'static str) {
        match self {
            Trap::ArrayBounds => ("RangeError", "Array index out of range"),
            Trap::StringBounds => ("RangeError", "String index out of range"),
            Trap::ForceUnwrap => (
                "TypeError",
                "Unexpectedly found nil while unwrapping an Optional value",
            ),
            Trap::NumericRange => ("RangeError", "Not enough bits to represent the given value"),
            Trap::NotImplemented => ("Error", "Not implemented!"),
        }
    }

    /// 補助関数の本体 `throw new E(message)`。
    pub fn throw_statement(self) -> Stmt {
        let (ctor, message) = self.error();
        Expr::throw_new(ctor, message)
    }

    /// 本体（`throw new E(message)`）を組み立てる。
    pub fn builder(self) -> FunctionBuilder {
        Rc::new(move |_, _, _, _| Ok(Value::Statements(vec![self.throw_statement()])))
    }

    pub fn entry(self) -> FunctionEntry {
        FunctionEntry::Global {
            key: self.key().to_string(),
            arity: Some(0),
            builder: self.builder(),
        }
    }
}

/// 失敗関数の呼び出し式。
pub fn trap(ctx: &mut Context, scope: ScopeId, kind: Trap) -> CResult<Value> {
    let call = noinline(kind.key(), Some(0), kind.builder());
    call(ctx, scope, &Args::Values(&[]), kind.key())
}

/// `collection[check ? index : trap()]` の形の境界チェック付き添字。
///
/// 読み出しは `length > index`、書き込みは末尾への追加を許して `length >= index`。
pub fn bounds_checked_index(
    ctx: &mut Context,
    scope: ScopeId,
    collection: Value,
    index: Value,
    write: bool,
    kind: Trap,
) -> CResult<Value> {
    let (prefix, reused) = reuse_args(ctx, scope, vec![collection, index], &["array", "index"])?;
    let [collection, index] = split(reused);
    let length = field(ctx, scope, collection.clone(), "length")?;
    let upper = binary(
        ctx,
        scope,
        if write { ">=" } else { ">" },
        length,
        index.clone(),
    )?;
    let lower = binary(ctx, scope, ">=", index.clone(), Value::num(0.0))?;
    let test = crate::values::logical(ctx, scope, "&&", upper, lower)?;
    let failed = trap(ctx, scope, kind)?;
    let checked = crate::values::conditional(ctx, scope, test, index, failed)?;
    let element = crate::values::member(ctx, scope, collection, checked)?;
    finish(ctx, scope, prefix, element)
}

/// inout の箱を外して書き込み先そのものにする。
pub fn unbox(value: Value) -> Value {
    match value {
        Value::Boxed { contents, .. } => *contents,
        other => other,
    }
}

/// `target.name(args...)`
pub fn invoke(
    ctx: &mut Context,
    scope: ScopeId,
    target: Value,
    name: &str,
    args: Vec<Value>,
) -> CResult<Value> {
    let callee = field(ctx, scope, target, name)?;
    call(ctx, scope, callee, args, CallKind::Call)
}

/// 呼び出し式の値を文として評価し、結果を捨てる。
pub fn discard(ctx: &mut Context, scope: ScopeId, value: Value) -> CResult<Vec<Stmt>> {
    crate::values::ignore(ctx, scope, value)
}

/// `Object.prototype.hasOwnProperty.call(object, key)`
pub fn has_own_property(
    ctx: &mut Context,
    scope: ScopeId,
    object: Value,
    key: Value,
) -> CResult<Value> {
    let callee = Expr::member(
        Expr::member(Expr::ident("Object"), "hasOwnProperty"),
        "call",
    );
    call_expression(ctx, scope, callee, vec![object, key])
}

/// 型の表現が JavaScript の `===` でそのまま比較できるか。
pub fn directly_comparable(representations: crate::reified::PossibleRepresentation) -> bool {
    use crate::reified::PossibleRepresentation as R;
    representations.is_subset_of(R::UNDEFINED | R::BOOLEAN | R::NUMBER | R::STRING | R::NULL)
        && representations != R::NONE
}

/// 値をそのまま返す式を値に包む。
pub fn pass(e: Expr) -> Value {
    expr(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::printer::{print_expr, print_stmts};
    use crate::values::read;

    #[test]
    /// 読み出しは長さより小さい添字だけを通す
    fn read_bounds_check_shape() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let value = bounds_checked_index(
            &mut ctx,
            root,
            Value::ident("a"),
            Value::ident("i"),
            false,
            Trap::ArrayBounds,
        )
        .expect("index");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(
            print_expr(&e),
            "a[a.length > i && i >= 0 ? i : $$arrayBoundsFailed()]"
        );
        let helpers = ctx.emit_scope(root, vec![]);
        assert_eq!(
            print_stmts(&helpers),
            "function $$arrayBoundsFailed() {\n  throw new RangeError(\"Array index out of range\");\n}\n"
        );
    }

    #[test]
    /// 副作用のある引数は一時変数へ一度だけ退避される
    fn reuse_args_assigns_temporaries() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let (prefix, values) = reuse_args(
            &mut ctx,
            root,
            vec![
                expr(Expr::call(Expr::ident("f"), vec![])),
                Value::ident("x"),
                Value::num(3.0),
            ],
            &["lhs", "rhs", "count"],
        )
        .expect("reuse");
        assert_eq!(print_stmts(&prefix), "lhs = f();\n");
        assert!(matches!(&values[0], Value::Direct(Expr::Ident(n)) if n == "lhs"));
        assert!(matches!(&values[2], Value::Direct(Expr::Num(n)) if *n == 3.0));
    }

    #[test]
    /// 未実装の組み込みはスタブの呼び出しになる
    fn missing_builtin_calls_stub() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let value = return_todo(&mut ctx, root, "Array.shuffle()").expect("todo");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "todo_missing_builtin$Array$shuffle()");
    }
}
