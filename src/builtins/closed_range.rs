// パス: src/builtins/closed_range.rs
// 役割: ClosedRange<Bound> の型構築子
// 意図: 閉区間を二要素の配列 `[lowerBound, upperBound]` で表し、反復は `<=` の for 文に展開する
// 関連ファイル: src/builtins/integers.rs, src/builtins/indexing_iterator.rs
//! 閉区間
//!
//! `a...b` はコンパイル時には二要素のタプル値のまま運ばれるので、
//! 境界の読み出しは多くの場合そのまま `a` と `b` になる。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::js::{Expr, Stmt, VarKind};
use crate::reified::{
    build_conformances, constructor, reify_type, FunctionMap, PossibleRepresentation, ReifiedType,
    TypeConstructor,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    array, binary, call, ignore, is_pure, logical, member, read, reuse, statements, CallKind,
    Value,
};

use super::common::{finish, method, property, reuse_args, split};
use super::indexing_iterator::make_indexing_iterator;

fn bound(ctx: &mut Context, scope: ScopeId, range: Value, upper: bool) -> CResult<Value> {
    member(ctx, scope, range, Value::num(if upper { 1.0 } else { 0.0 }))
}

/// 範囲を一度だけ評価できる形にする。タプルのままの範囲は各境界を一度ずつしか読まない。
fn reuse_range(ctx: &mut Context, scope: ScopeId, range: Value) -> CResult<(Vec<Stmt>, Value)> {
    if matches!(&range, Value::Tuple(items) if items.len() == 2) {
        return Ok((Vec::new(), range));
    }
    let (prefix, args) = reuse_args(ctx, scope, vec![range], &["range"])?;
    let [range] = split(args);
    Ok((prefix, range))
}

/// `for (let i = lower; i <= upper; i++) body(i)` を組み立てる。
pub(crate) fn iterate(
    ctx: &mut Context,
    scope: ScopeId,
    range: Value,
    body: &mut dyn FnMut(&mut Context, ScopeId, Value) -> CResult<Vec<Stmt>>,
) -> CResult<Vec<Stmt>> {
    let (mut stmts, range) = reuse_range(ctx, scope, range)?;
    let lower = bound(ctx, scope, range.clone(), false)?;
    let lower = read(ctx, scope, lower)?;
    let upper = bound(ctx, scope, range, true)?;
    let upper = read(ctx, scope, upper)?;
    let end = if is_pure(&upper) {
        upper
    } else {
        let end = ctx.reserve_unique(scope, "end")?;
        stmts.push(Stmt::var(VarKind::Const, end.clone(), Some(upper)));
        Expr::ident(end)
    };
    let i = ctx.reserve_unique(scope, "i")?;
    let body = body(ctx, scope, Value::ident(i.clone()))?;
    stmts.push(Stmt::For {
        init: Some(Box::new(Stmt::var(VarKind::Let, i.clone(), Some(lower)))),
        test: Some(Expr::binary("<=", Expr::ident(i.clone()), end)),
        update: Some(Expr::update("++", false, Expr::ident(i))),
        body,
    });
    Ok(stmts)
}

fn closed_range_type(
    ctx: &mut Context,
    scope: ScopeId,
    bound_type: Type,
) -> CResult<Rc<ReifiedType>> {
    let self_type = Type::generic(Type::name("ClosedRange"), vec![bound_type.clone()]);
    let reified_bound = reify_type(ctx, scope, &bound_type)?;

    let mut functions = FunctionMap::new();
    functions.insert(
        "init(uncheckedBounds:)".into(),
        method(&["bounds"], |_, _, args| {
            let [bounds] = split(args);
            Ok(bounds)
        }),
    );
    for (key, upper) in [("lowerBound", false), ("upperBound", true)] {
        functions.insert(
            key.into(),
            property(&["range"], move |ctx, scope, args| {
                let [range] = split(args);
                bound(ctx, scope, range, upper)
            }),
        );
    }
    functions.insert(
        "contains(_:)".into(),
        method(&["range", "element"], |ctx, scope, args| {
            let [range, element] = split(args);
            let (mut prefix, range) = reuse_range(ctx, scope, range)?;
            let (more, args) = reuse_args(ctx, scope, vec![element], &["element"])?;
            prefix.extend(more);
            let [element] = split(args);
            let lower = bound(ctx, scope, range.clone(), false)?;
            let upper = bound(ctx, scope, range, true)?;
            let above = binary(ctx, scope, "<=", lower, element.clone())?;
            let below = binary(ctx, scope, "<=", element, upper)?;
            let result = logical(ctx, scope, "&&", above, below)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "isEmpty".into(),
        property(&["range"], |_, _, _| Ok(Value::boolean(false))),
    );
    functions.insert(
        "count".into(),
        property(&["range"], |ctx, scope, args| {
            let [range] = split(args);
            let (prefix, range) = reuse_range(ctx, scope, range)?;
            let lower = bound(ctx, scope, range.clone(), false)?;
            let upper = bound(ctx, scope, range, true)?;
            let span = binary(ctx, scope, "-", upper, lower)?;
            let result = binary(ctx, scope, "+", span, Value::num(1.0))?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "startIndex".into(),
        property(&["range"], |ctx, scope, args| {
            let [range] = split(args);
            bound(ctx, scope, range, false)
        }),
    );
    functions.insert(
        "endIndex".into(),
        property(&["range"], |ctx, scope, args| {
            let [range] = split(args);
            let upper = bound(ctx, scope, range, true)?;
            binary(ctx, scope, "+", upper, Value::num(1.0))
        }),
    );
    functions.insert(
        "subscript(_:)".into(),
        property(&["range", "position"], |_, _, args| {
            let [_, position] = split(args);
            Ok(position)
        }),
    );
    functions.insert(
        "index(after:)".into(),
        method(&["range", "i"], |ctx, scope, args| {
            let [_, i] = split(args);
            binary(ctx, scope, "+", i, Value::num(1.0))
        }),
    );
    functions.insert(
        "distance(from:to:)".into(),
        method(&["range", "start", "end"], |ctx, scope, args| {
            let [_, start, end] = split(args);
            binary(ctx, scope, "-", end, start)
        }),
    );
    functions.insert(
        "makeIterator()".into(),
        method(&["range"], |ctx, scope, args| {
            let [range] = split(args);
            let (first, after) = reuse(ctx, scope, range, "range")?;
            let start = bound(ctx, scope, after, false)?;
            make_indexing_iterator(ctx, scope, first, start)
        }),
    );
    functions.insert(
        "map(_:)".into(),
        method(&["range", "transform"], |ctx, scope, args| {
            let [range, transform] = split(args);
            let mapped = ctx.reserve_unique(scope, "mapped")?;
            let mut stmts = vec![Stmt::var(
                VarKind::Const,
                mapped.clone(),
                Some(Expr::Array(Vec::new())),
            )];
            let target = mapped.clone();
            stmts.extend(iterate(ctx, scope, range, &mut |ctx, scope, i| {
                let item = call(ctx, scope, transform.clone(), vec![i], CallKind::Call)?;
                let push = member(ctx, scope, Value::ident(target.clone()), Value::string("push"))?;
                let pushed = call(ctx, scope, push, vec![item], CallKind::Call)?;
                ignore(ctx, scope, pushed)
            })?);
            stmts.push(Stmt::ret(Expr::ident(mapped)));
            Ok(statements(stmts))
        }),
    );
    functions.insert(
        "forEach(_:)".into(),
        method(&["range", "body"], |ctx, scope, args| {
            let [range, body] = split(args);
            let stmts = iterate(ctx, scope, range, &mut |ctx, scope, i| {
                let result = call(ctx, scope, body.clone(), vec![i], CallKind::Call)?;
                ignore(ctx, scope, result)
            })?;
            Ok(statements(stmts))
        }),
    );

    let mut sequence = FunctionMap::new();
    sequence.insert(
        "reduce(_:_:)".into(),
        method(&["range", "initialResult", "nextPartialResult"], |ctx, scope, args| {
            let [range, initial, next] = split(args);
            let result = ctx.reserve_unique(scope, "result")?;
            let initial = read(ctx, scope, initial)?;
            let mut stmts = vec![Stmt::var(VarKind::Let, result.clone(), Some(initial))];
            let target = result.clone();
            stmts.extend(iterate(ctx, scope, range, &mut |ctx, scope, i| {
                let current = Value::ident(target.clone());
                let updated =
                    call(ctx, scope, next.clone(), vec![current.clone(), i], CallKind::Call)?;
                let written = crate::values::set(ctx, scope, current, updated, "=")?;
                ignore(ctx, scope, written)
            })?);
            stmts.push(Stmt::ret(Expr::ident(result)));
            Ok(statements(stmts))
        }),
    );
    let mut equatable = FunctionMap::new();
    equatable.insert(
        "==".into(),
        method(&["lhs", "rhs"], |ctx, scope, args| {
            let [lhs, rhs] = split(args);
            let (mut prefix, lhs) = reuse_range(ctx, scope, lhs)?;
            let (more, rhs) = reuse_range(ctx, scope, rhs)?;
            prefix.extend(more);
            let mut parts = Vec::new();
            for upper in [false, true] {
                let left = bound(ctx, scope, lhs.clone(), upper)?;
                let right = bound(ctx, scope, rhs.clone(), upper)?;
                parts.push(binary(ctx, scope, "===", left, right)?);
            }
            let [lower, upper] = split(parts);
            let result = logical(ctx, scope, "&&", lower, upper)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    let mut explicit = vec![("Sequence", sequence), ("Collection", FunctionMap::new())];
    if reified_bound.conforms_to("Equatable") {
        explicit.push(("Equatable", equatable));
    }
    let conformances = build_conformances(ctx, &Value::Type(self_type.clone()), explicit);

    let iterator = Type::generic(Type::name("IndexingIterator"), vec![self_type.clone()]);
    let element = bound_type.clone();
    let reified = ReifiedType::new(self_type.stringify(), PossibleRepresentation::ARRAY)
        .with_functions(functions)
        .with_conformances(conformances)
        .with_default(|ctx, scope, _| array(ctx, scope, vec![Value::num(0.0), Value::num(0.0)]))
        .with_inner_type(
            "Bound",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &element)),
        )
        .with_inner_type(
            "Index",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &bound_type)),
        )
        .with_inner_type(
            "Iterator",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &iterator)),
        );
    Ok(Rc::new(reified))
}

/// `ClosedRange<Bound>` の型構築子。
pub fn closed_range_constructor() -> Rc<dyn TypeConstructor> {
    constructor(|ctx, scope, args| {
        let bound = args.first().cloned().unwrap_or_else(|| Type::name("Int"));
        closed_range_type(ctx, scope, bound)
    })
}

/// `lower...upper` の値。
pub fn closed_range(lower: Value, upper: Value) -> Value {
    Value::Tuple(vec![lower, upper])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::call_method;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};

    fn int_range() -> Value {
        Value::Type(Type::generic(Type::name("ClosedRange"), vec![Type::name("Int")]))
    }

    #[test]
    /// reduce は <= の for 文に展開される
    fn reduce_expands_to_loop() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let range = closed_range(Value::num(1.0), Value::ident("n"));
        let value = call_method(
            &mut ctx,
            root,
            &int_range(),
            "reduce(_:_:)",
            vec![range, Value::num(0.0), Value::ident("f")],
        )
        .expect("reduce");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            print_stmts(&stmts),
            "let result = 0;\nfor (let i = 1; i <= n; i++) {\n  result = f(result, i);\n}\nreturn result;\n"
        );
    }

    #[test]
    /// contains は両端を含む
    fn contains_is_inclusive() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let range = closed_range(Value::num(1.0), Value::num(5.0));
        let value = call_method(
            &mut ctx,
            root,
            &int_range(),
            "contains(_:)",
            vec![range, Value::ident("x")],
        )
        .expect("contains");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "1 <= x && x <= 5");
    }
}
