// パス: src/builtins/array.rs
// 役割: Array<Element> の型構築子（添字・変更系メソッド・比較・ハッシュ・コピー）
// 意図: Swift の配列を JavaScript の配列に写し、値の意味論はコピー時の slice / map で保つ
// 関連ファイル: src/builtins/mod.rs, src/builtins/globals.rs, src/builtins/indexing_iterator.rs
//! 配列
//!
//! - 読み出しの添字は `length > i && i >= 0`、書き込みは `length >= i && i >= 0` で検査する。
//! - 要素の型がコピーを要するなら `map` で要素ごとに複製し、そうでなければ `slice` で浅く複製する。
//! - 等値比較は長さを比べてから要素ごとに `!=` を調べ、最初の不一致で抜ける。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::functions::{functionize, Args, FunctionEntry};
use crate::js::{Expr, Stmt, VarKind};
use crate::reified::{
    build_conformances, constructor, expression_skips_copy, reify_type, Dispatch, FunctionMap,
    PossibleRepresentation, ReifiedType, TypeConstructor,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    binary, call_expression, conditional, copy, expr, field, ignore, member, read, reuse, set,
    statements, transform_statements, Value,
};

use super::common::{
    bounds_checked_index, builder, call_method, finish, get_property, invoke, is_empty_from_length,
    method, property, read_length_field, reuse_args, split, start_index_of_zero, trap, unbox, Trap,
};
use super::globals::{array_insert_at, array_remove_at};
use super::indexing_iterator::make_indexing_iterator;
use super::optional::{empty_optional, wrap_in_optional};

/// `shift()` / `pop()` の結果が undefined なら境界外。
fn take_end(ctx: &mut Context, scope: ScopeId, array: Value, js: &str) -> CResult<Value> {
    let taken = invoke(ctx, scope, unbox(array), js, Vec::new())?;
    let (first, after) = reuse(ctx, scope, taken, "element")?;
    let test = binary(ctx, scope, "!==", first, Value::undefined())?;
    let failed = trap(ctx, scope, Trap::ArrayBounds)?;
    conditional(ctx, scope, test, after, failed)
}

/// 長さを比べてから要素ごとの `!=` で最初の不一致を探す。
fn compare_arrays(
    ctx: &mut Context,
    scope: ScopeId,
    element: &Type,
    args: Vec<Value>,
    equal: bool,
) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
    let [lhs, rhs] = split(args);
    let result = ctx.reserve_unique(scope, if equal { "equal" } else { "unequal" })?;
    let i = ctx.reserve_unique(scope, "i")?;
    stmts.push(Stmt::var(VarKind::Let, result.clone(), None));
    let lhs_field = field(ctx, scope, lhs.clone(), "length")?;
    let lhs_length = read(ctx, scope, lhs_field)?;
    let rhs_field = field(ctx, scope, rhs.clone(), "length")?;
    let rhs_length = read(ctx, scope, rhs_field)?;

    let left = member(ctx, scope, lhs.clone(), Value::ident(i.clone()))?;
    let right = member(ctx, scope, rhs, Value::ident(i.clone()))?;
    let unequal = call_method(ctx, scope, &Value::Type(element.clone()), "!=", vec![left, right])?;
    let mut body = transform_statements(ctx, scope, unequal, &mut |_, _, e| {
        Ok(vec![Stmt::if_else(e, vec![Stmt::Break], None)])
    })?;
    body.push(Stmt::expr(Expr::update("++", false, Expr::ident(i.clone()))));
    let walked = Expr::binary(
        if equal { "===" } else { "!==" },
        Expr::ident(i.clone()),
        lhs_length.clone(),
    );
    let alternate = vec![
        Stmt::var(VarKind::Let, i.clone(), Some(Expr::num(0.0))),
        Stmt::While {
            test: Expr::binary("<", Expr::ident(i.clone()), lhs_length.clone()),
            body,
        },
        Stmt::expr(Expr::assign("=", Expr::ident(result.clone()), walked)),
    ];
    stmts.push(Stmt::if_else(
        Expr::binary("!==", lhs_length, rhs_length),
        vec![Stmt::expr(Expr::assign(
            "=",
            Expr::ident(result.clone()),
            Expr::Bool(!equal),
        ))],
        Some(alternate),
    ));
    stmts.push(Stmt::ret(Expr::ident(result)));
    Ok(statements(stmts))
}

/// 要素のハッシュを `Hasher` に順に混ぜる。
fn hash_elements(
    ctx: &mut Context,
    scope: ScopeId,
    element: &Type,
    array: Value,
    hasher: Value,
) -> CResult<Vec<Stmt>> {
    let i = ctx.reserve_unique(scope, "i")?;
    let array_expr = read(ctx, scope, array.clone())?;
    let item = member(ctx, scope, array, Value::ident(i.clone()))?;
    let hash = get_property(ctx, scope, &Value::Type(element.clone()), "hashValue", vec![item])?;
    let hasher_type = Value::Type(Type::name("Hasher"));
    let combined = call_method(ctx, scope, &hasher_type, "combine(_:)", vec![hasher, hash])?;
    let body = ignore(ctx, scope, combined)?;
    Ok(vec![Stmt::For {
        init: Some(Box::new(Stmt::var(VarKind::Let, i.clone(), Some(Expr::num(0.0))))),
        test: Some(Expr::binary(
            "<",
            Expr::ident(i.clone()),
            Expr::member(array_expr, "length"),
        )),
        update: Some(Expr::update("++", false, Expr::ident(i))),
        body,
    }])
}

/// `const array = []; for (...) array.push(value); return array;`
fn repeating(
    ctx: &mut Context,
    scope: ScopeId,
    element: &Type,
    args: Vec<Value>,
) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(ctx, scope, args, &["repeating", "count"])?;
    let [value, count] = split(args);
    let result = ctx.reserve_unique(scope, "array")?;
    let i = ctx.reserve_unique(scope, "i")?;
    stmts.push(Stmt::var(VarKind::Const, result.clone(), Some(Expr::Array(Vec::new()))));
    let count = read(ctx, scope, count)?;
    let copied = copy(value, element.clone());
    let pushed = invoke(ctx, scope, Value::ident(result.clone()), "push", vec![copied])?;
    let body = ignore(ctx, scope, pushed)?;
    stmts.push(Stmt::For {
        init: Some(Box::new(Stmt::var(VarKind::Let, i.clone(), Some(Expr::num(0.0))))),
        test: Some(Expr::binary("<", Expr::ident(i.clone()), count)),
        update: Some(Expr::update("++", false, Expr::ident(i))),
        body,
    });
    stmts.push(Stmt::ret(Expr::ident(result)));
    Ok(statements(stmts))
}

/// 要素のコピーを関数式にまとめ、`array.map(...)` で適用する。
fn copy_elements(ctx: &mut Context, scope: ScopeId, array: Expr, element: &Type) -> CResult<Value> {
    let element = element.clone();
    let (params, body) = functionize(ctx, scope, "copy", Some(1), &|ctx, scope, args: &Args| {
        let value = args.named(ctx, 0, Some("value"))?;
        crate::reified::copy_value(ctx, scope, value, &element)
    })?;
    let converter = Expr::function(params, body);
    Ok(expr(Expr::call(Expr::member(array, "map"), vec![converter])))
}

fn array_type(ctx: &mut Context, scope: ScopeId, element: Type) -> CResult<Rc<ReifiedType>> {
    let inner = reify_type(ctx, scope, &element)?;
    let self_type = Type::array(element.clone());
    let name = self_type.stringify();

    let mut functions = FunctionMap::new();
    functions.insert("init()".into(), method(&[], |_, _, _| Ok(expr(Expr::Array(Vec::new())))));
    functions.insert(
        "init(_:)".into(),
        method(&["iterable"], |ctx, scope, args| {
            let [iterable] = split(args);
            call_expression(ctx, scope, Expr::member(Expr::ident("Array"), "from"), vec![iterable])
        }),
    );
    let ty = element.clone();
    functions.insert(
        "init(repeating:count:)".into(),
        method(&["repeating", "count"], move |ctx, scope, args| repeating(ctx, scope, &ty, args)),
    );
    let ty = element.clone();
    functions.insert(
        "subscript(_:)".into(),
        FunctionEntry::Property {
            get: builder(&["array", "index"], |ctx, scope, args| {
                let [array, index] = split(args);
                bounds_checked_index(ctx, scope, array, index, false, Trap::ArrayBounds)
            }),
            set: Some(builder(&["array", "index", "value"], move |ctx, scope, args| {
                let [array, index, value] = split(args);
                let place =
                    bounds_checked_index(ctx, scope, unbox(array), index, true, Trap::ArrayBounds)?;
                set(ctx, scope, place, copy(value, ty.clone()), "=")
            })),
        },
    );
    let ty = element.clone();
    functions.insert(
        "append(_:)".into(),
        method(&["array", "newElement"], move |ctx, scope, args| {
            let [array, value] = split(args);
            invoke(ctx, scope, unbox(array), "push", vec![copy(value, ty.clone())])
        }),
    );
    functions.insert(
        "append(contentsOf:)".into(),
        method(&["array", "newElements"], |ctx, scope, args| {
            let [array, items] = split(args);
            let target = unbox(array);
            let (prefix, args) = reuse_args(ctx, scope, vec![target], &["array"])?;
            let [target] = split(args);
            let joined = invoke(ctx, scope, target.clone(), "concat", vec![items])?;
            let written = set(ctx, scope, target, joined, "=")?;
            finish(ctx, scope, prefix, written)
        }),
    );
    let ty = element.clone();
    functions.insert(
        "insert(_:at:)".into(),
        method(&["array", "newElement", "i"], move |ctx, scope, args| {
            let [array, value, index] = split(args);
            array_insert_at(ctx, scope, unbox(array), copy(value, ty.clone()), index)
        }),
    );
    functions.insert(
        "remove(at:)".into(),
        method(&["array", "i"], |ctx, scope, args| {
            let [array, index] = split(args);
            array_remove_at(ctx, scope, unbox(array), index)
        }),
    );
    functions.insert(
        "removeFirst()".into(),
        method(&["array"], |ctx, scope, args| {
            let [array] = split(args);
            take_end(ctx, scope, array, "shift")
        }),
    );
    functions.insert(
        "removeLast()".into(),
        method(&["array"], |ctx, scope, args| {
            let [array] = split(args);
            take_end(ctx, scope, array, "pop")
        }),
    );
    let ty = element.clone();
    functions.insert(
        "popLast()".into(),
        method(&["array"], move |ctx, scope, args| {
            let [array] = split(args);
            let taken = invoke(ctx, scope, unbox(array), "pop", Vec::new())?;
            let (first, after) = reuse(ctx, scope, taken, "element")?;
            let test = binary(ctx, scope, "!==", first, Value::undefined())?;
            let some = wrap_in_optional(ctx, scope, after, &ty)?;
            let none = empty_optional(ctx, scope, &ty)?;
            conditional(ctx, scope, test, some, none)
        }),
    );
    functions.insert(
        "removeAll(keepingCapacity:)".into(),
        method(&["array"], |ctx, scope, args| {
            let [array] = split(args);
            let length = field(ctx, scope, unbox(array), "length")?;
            set(ctx, scope, length, Value::num(0.0), "=")
        }),
    );
    functions.insert(
        "reserveCapacity(_:)".into(),
        method(&["array", "capacity"], |_, _, _| Ok(statements(Vec::new()))),
    );
    functions.insert(
        "index(after:)".into(),
        method(&["array", "index"], |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["array", "index"])?;
            let [array, index] = split(args);
            let length = field(ctx, scope, array, "length")?;
            let test = binary(ctx, scope, ">", length, index.clone())?;
            let next = binary(ctx, scope, "+", index, Value::num(1.0))?;
            let failed = trap(ctx, scope, Trap::ArrayBounds)?;
            let result = conditional(ctx, scope, test, next, failed)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "index(before:)".into(),
        method(&["array", "index"], |ctx, scope, args| {
            let [_, index] = split(args);
            let (prefix, args) = reuse_args(ctx, scope, vec![index], &["index"])?;
            let [index] = split(args);
            let test = binary(ctx, scope, ">", index.clone(), Value::num(0.0))?;
            let previous = binary(ctx, scope, "-", index, Value::num(1.0))?;
            let failed = trap(ctx, scope, Trap::ArrayBounds)?;
            let result = conditional(ctx, scope, test, previous, failed)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "index(_:offsetBy:)".into(),
        method(&["array", "index", "distance"], |ctx, scope, args| {
            let [_, index, distance] = split(args);
            binary(ctx, scope, "+", index, distance)
        }),
    );
    functions.insert(
        "distance(from:to:)".into(),
        method(&["array", "start", "end"], |ctx, scope, args| {
            let [_, start, end] = split(args);
            binary(ctx, scope, "-", end, start)
        }),
    );
    functions.insert(
        "joined(separator:)".into(),
        method(&["array", "separator"], |ctx, scope, args| {
            let [array, separator] = split(args);
            invoke(ctx, scope, array, "join", vec![separator])
        }),
    );
    functions.insert(
        "joined()".into(),
        method(&["array"], |ctx, scope, args| {
            let [array] = split(args);
            invoke(ctx, scope, array, "join", vec![Value::string("")])
        }),
    );
    for (key, js) in [("map(_:)", "map"), ("filter(_:)", "filter"), ("forEach(_:)", "forEach")] {
        functions.insert(
            key.into(),
            method(&["array", "transform"], move |ctx, scope, args| {
                let [array, transform] = split(args);
                invoke(ctx, scope, array, js, vec![transform])
            }),
        );
    }
    functions.insert(
        "reduce(_:_:)".into(),
        method(&["array", "initialResult", "nextPartialResult"], |ctx, scope, args| {
            let [array, initial, next] = split(args);
            invoke(ctx, scope, array, "reduce", vec![next, initial])
        }),
    );
    let ty = element.clone();
    functions.insert(
        "contains(_:)".into(),
        method(&["array", "element"], move |ctx, scope, args| {
            let [array, item] = split(args);
            let reified = reify_type(ctx, scope, &ty)?;
            if super::common::directly_comparable(reified.representations) {
                let found = invoke(ctx, scope, array, "indexOf", vec![item])?;
                return binary(ctx, scope, "!==", found, Value::num(-1.0));
            }
            let (prefix, args) = reuse_args(ctx, scope, vec![item], &["element"])?;
            let [item] = split(args);
            let candidate = ctx.reserve_unique(scope, "candidate")?;
            let parent = Value::Type(ty.clone());
            let fscope = ctx.new_scope("contains", scope);
            let equal = call_method(
                ctx,
                fscope,
                &parent,
                "==",
                vec![Value::ident(candidate.clone()), item],
            )?;
            let body =
                transform_statements(ctx, fscope, equal, &mut |_, _, e| Ok(vec![Stmt::ret(e)]))?;
            let body = ctx.emit_scope(fscope, body);
            let predicate = Expr::function(vec![candidate], body);
            let found = invoke(ctx, scope, array, "some", vec![expr(predicate)])?;
            finish(ctx, scope, prefix, found)
        }),
    );
    functions.insert("+".into(), method(&["lhs", "rhs"], |ctx, scope, args| {
        let [lhs, rhs] = split(args);
        invoke(ctx, scope, lhs, "concat", vec![rhs])
    }));
    functions.insert(
        "+=".into(),
        method(&["lhs", "rhs"], |ctx, scope, args| {
            let [lhs, rhs] = split(args);
            let target = unbox(lhs);
            let (prefix, args) = reuse_args(ctx, scope, vec![target], &["array"])?;
            let [target] = split(args);
            let joined = invoke(ctx, scope, target.clone(), "concat", vec![rhs])?;
            let written = set(ctx, scope, target, joined, "=")?;
            finish(ctx, scope, prefix, written)
        }),
    );
    functions.insert("count".into(), read_length_field());
    functions.insert("capacity".into(), read_length_field());
    functions.insert("isEmpty".into(), is_empty_from_length());
    functions.insert("startIndex".into(), start_index_of_zero());
    functions.insert("endIndex".into(), read_length_field());
    for last in [false, true] {
        let ty = element.clone();
        functions.insert(
            if last { "last" } else { "first" }.into(),
            property(&["array"], move |ctx, scope, args| {
                let (prefix, args) = reuse_args(ctx, scope, args, &["array"])?;
                let [array] = split(args);
                let length = field(ctx, scope, array.clone(), "length")?;
                let index = if last {
                    binary(ctx, scope, "-", length.clone(), Value::num(1.0))?
                } else {
                    Value::num(0.0)
                };
                let item = member(ctx, scope, array, index)?;
                let some = wrap_in_optional(ctx, scope, item, &ty)?;
                let none = empty_optional(ctx, scope, &ty)?;
                let result = conditional(ctx, scope, length, some, none)?;
                finish(ctx, scope, prefix, result)
            }),
        );
    }
    let iterator = Type::generic(Type::name("IndexingIterator"), vec![self_type.clone()]);
    functions.insert(
        "makeIterator()".into(),
        method(&["array"], |ctx, scope, args| {
            let [array] = split(args);
            make_indexing_iterator(ctx, scope, array, Value::num(0.0))
        }),
    );

    let mut literal = FunctionMap::new();
    literal.insert(
        "init(arrayLiteral:)".into(),
        method(&["elements"], |_, _, args| {
            let [elements] = split(args);
            Ok(elements)
        }),
    );
    let mut equatable = FunctionMap::new();
    for equal in [true, false] {
        let ty = element.clone();
        equatable.insert(
            if equal { "==" } else { "!=" }.into(),
            method(&["lhs", "rhs"], move |ctx, scope, args| {
                compare_arrays(ctx, scope, &ty, args, equal)
            }),
        );
    }
    let mut hashable = FunctionMap::new();
    let ty = element.clone();
    hashable.insert(
        "hashValue".into(),
        property(&["array"], move |ctx, scope, args| {
            let (mut stmts, args) = reuse_args(ctx, scope, args, &["array"])?;
            let [array] = split(args);
            let hash = ctx.reserve_unique(scope, "hash")?;
            stmts.push(Stmt::var(
                VarKind::Const,
                hash.clone(),
                Some(Expr::Array(vec![Expr::num(0.0)])),
            ));
            stmts.extend(hash_elements(ctx, scope, &ty, array, Value::ident(hash.clone()))?);
            stmts.push(Stmt::ret(Expr::binary(
                "|",
                Expr::index(Expr::ident(hash), Expr::num(0.0)),
                Expr::num(0.0),
            )));
            Ok(statements(stmts))
        }),
    );
    let ty = element.clone();
    hashable.insert(
        "hash(into:)".into(),
        method(&["array", "hasher"], move |ctx, scope, args| {
            let (mut stmts, args) = reuse_args(ctx, scope, args, &["array", "hasher"])?;
            let [array, hasher] = split(args);
            stmts.extend(hash_elements(ctx, scope, &ty, array, unbox(hasher))?);
            Ok(statements(stmts))
        }),
    );

    let self_value = Value::Type(self_type);
    let mut explicit = vec![
        ("ExpressibleByArrayLiteral", literal),
        ("BidirectionalCollection", FunctionMap::new()),
    ];
    if inner.conforms_to("Equatable") || !matches!(inner.dispatch, Dispatch::Static) {
        explicit.push(("Equatable", equatable));
    }
    if inner.conforms_to("Hashable") || !matches!(inner.dispatch, Dispatch::Static) {
        explicit.push(("Hashable", hashable));
    }
    let conformances = build_conformances(ctx, &self_value, explicit);

    let element_copy = inner.copy.is_some() && matches!(inner.dispatch, Dispatch::Static);
    let copied_element = element.clone();
    let element_ctor = element.clone();
    let index_ctor: Rc<dyn TypeConstructor> =
        constructor(|ctx, scope, _| reify_type(ctx, scope, &Type::name("Int")));
    let reified = ReifiedType::new(name, PossibleRepresentation::ARRAY)
        .with_functions(functions)
        .with_conformances(conformances)
        .with_default(|_, _, _| Ok(expr(Expr::Array(Vec::new()))))
        .with_copy(move |ctx, scope, value| {
            let e = read(ctx, scope, value)?;
            if expression_skips_copy(&e) {
                return Ok(expr(e));
            }
            if element_copy {
                return copy_elements(ctx, scope, e, &copied_element);
            }
            Ok(expr(Expr::call(Expr::member(e, "slice"), Vec::new())))
        })
        .with_inner_type(
            "Element",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &element_ctor)),
        )
        .with_inner_type("Index", index_ctor)
        .with_inner_type(
            "Iterator",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &iterator)),
        );
    Ok(Rc::new(reified))
}

/// `Array<Element>` の型構築子。
pub fn array_constructor() -> Rc<dyn TypeConstructor> {
    constructor(|ctx, scope, args| {
        let element = args.first().cloned().unwrap_or_else(Type::void);
        array_type(ctx, scope, element)
    })
}

/// 添字の読み出しを `Subscript` の場所として作る（代入・inout の対象）。
pub fn array_subscript(array: Value, index: Value, element: Type) -> Value {
    let parent = Value::Type(Type::array(element.clone()));
    let getter = Value::member_function(parent.clone(), "subscript(_:)", Type::void());
    let setter = Value::member_function(parent, "subscript(_:)", Type::void());
    Value::subscript(getter, setter, vec![array, index], element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};

    fn int_array() -> Value {
        Value::Type(Type::array(Type::name("Int")))
    }

    fn show(ctx: &mut Context, value: Value) -> String {
        let root = ctx.root();
        let e = read(ctx, root, value).expect("read");
        print_expr(&e)
    }

    #[test]
    /// 単純な要素の配列は slice で複製する
    fn copy_uses_slice() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let copied = crate::reified::copy_value(
            &mut ctx,
            root,
            Value::ident("a"),
            &Type::array(Type::name("Int")),
        )
        .expect("copy");
        assert_eq!(show(&mut ctx, copied), "a.slice()");
    }

    #[test]
    /// 配列の配列は要素ごとに複製する
    fn nested_copy_maps_elements() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let copied = crate::reified::copy_value(
            &mut ctx,
            root,
            Value::ident("a"),
            &Type::array(Type::array(Type::name("Int"))),
        )
        .expect("copy");
        let text = show(&mut ctx, copied);
        assert!(text.starts_with("a.map(function"));
        assert!(text.contains("return value.slice();"));
    }

    #[test]
    /// 添字への書き込みは末尾の次まで許す
    fn subscript_set_allows_append_position() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let place = array_subscript(Value::ident("a"), Value::ident("i"), Type::name("Int"));
        let written = set(&mut ctx, root, place, Value::num(5.0), "=").expect("set");
        let stmts = match written {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            print_stmts(&stmts),
            "a[a.length >= i && i >= 0 ? i : $$arrayBoundsFailed()] = 5;\n"
        );
    }

    #[test]
    /// 空の配列からの removeLast は境界外の失敗になる
    fn remove_last_checks_for_undefined() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int_array(),
            "removeLast()",
            vec![Value::boxed(Value::ident("a"), Type::array(Type::name("Int")))],
        )
        .expect("removeLast");
        assert_eq!(
            show(&mut ctx, value),
            "(element = a.pop()) !== undefined ? element : $$arrayBoundsFailed()"
        );
    }

    #[test]
    /// 等値比較は長さの比較と要素ごとのループになる
    fn equality_loops_over_elements() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int_array(),
            "==",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("==");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        let text = print_stmts(&stmts);
        assert!(text.contains("if (a.length !== b.length) {"));
        assert!(text.contains("if (a[i] !== b[i]) {"));
        assert!(text.contains("equal = i === a.length;"));
    }

    #[test]
    /// first は空配列で none になる
    fn first_is_optional() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = get_property(&mut ctx, root, &int_array(), "first", vec![Value::ident("a")])
            .expect("first");
        assert_eq!(show(&mut ctx, value), "a.length ? a[0] : null");
    }
}
