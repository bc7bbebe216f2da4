// パス: src/builtins/string.rs
// 役割: String / Substring / Character / DefaultStringInterpolation と文字列ビューの関数表
// 意図: 文字列は JavaScript の string、添字は UTF-16 の位置（Int）としてそのまま扱う
// 関連ファイル: src/builtins/mod.rs, src/builtins/common.rs, src/builtins/optional.rs
//! 文字列
//!
//! - 変更系のメソッドは `self` を inout の箱で受け取り、`substring` で組み直した値を書き戻す。
//! - 添字の読み出しは `$$stringBoundsFailed()` による境界チェック付き。
//! - 文字列補間は `+=` の連鎖になる。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::js::{Expr, Property, Stmt, VarKind};
use crate::reified::{
    build_conformances, constructor, fixed, reify_type, FunctionMap, PossibleRepresentation,
    ReifiedType, TypeConstructor,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    binary, call_expression, conditional, expr, expression_literal_value, field, member, read,
    reuse, set, statements, LiteralValue, Value,
};

use super::common::{
    binary_builtin, bounds_checked_index, finish, invoke, method, property, read_length_field,
    return_todo, reuse_args, split, start_index_of_zero, trap, unbox, Trap,
};
use super::optional::{empty_optional, wrap_in_optional};

fn character() -> Type {
    Type::name("Character")
}

/// 決まった型をそのまま具象化する構築子。
fn named_type_constructor(ty: Type) -> Rc<dyn TypeConstructor> {
    constructor(move |ctx, scope, _| reify_type(ctx, scope, &ty))
}

fn identity(names: &'static [&'static str]) -> crate::functions::FunctionEntry {
    method(names, |_, _, args| {
        let [value] = split(args);
        Ok(value)
    })
}

/// `s.substring(start)` / `s.substring(start, end)`
fn substring(
    ctx: &mut Context,
    scope: ScopeId,
    text: Value,
    start: Value,
    end: Option<Value>,
) -> CResult<Value> {
    let mut args = vec![start];
    args.extend(end);
    invoke(ctx, scope, text, "substring", args)
}

/// `s.length - n`
fn length_minus(ctx: &mut Context, scope: ScopeId, text: Value, n: Value) -> CResult<Value> {
    let length = field(ctx, scope, text, "length")?;
    binary(ctx, scope, "-", length, n)
}

/// `s.substring(0, s.length - count)`
fn drop_last(ctx: &mut Context, scope: ScopeId, text: Value, count: Value) -> CResult<Value> {
    let (prefix, args) = reuse_args(ctx, scope, vec![text, count], &["string", "count"])?;
    let [text, count] = split(args);
    let end = length_minus(ctx, scope, text.clone(), count)?;
    let result = substring(ctx, scope, text, Value::num(0.0), Some(end))?;
    finish(ctx, scope, prefix, result)
}

/// `s = next` の後に `result` を返す文列。
fn write_back(
    ctx: &mut Context,
    scope: ScopeId,
    mut prefix: Vec<Stmt>,
    target: Value,
    next: Value,
    result: Option<Value>,
) -> CResult<Value> {
    let written = set(ctx, scope, target, next, "=")?;
    prefix.extend(crate::values::ignore(ctx, scope, written)?);
    match result {
        Some(result) => finish(ctx, scope, prefix, result),
        None => Ok(statements(prefix)),
    }
}

/// 取り出した文字を定数に束縛してから `self` を書き換え、その文字を返す。
fn remove_returning(
    ctx: &mut Context,
    scope: ScopeId,
    prefix: Vec<Stmt>,
    target: Value,
    removed: Value,
    next: Value,
) -> CResult<Value> {
    let mut stmts = prefix;
    let bound = crate::functions::bind_constant(ctx, scope, "removed", removed, &mut stmts)?;
    write_back(ctx, scope, stmts, target, next, Some(bound))
}

/// 先頭・末尾の文字を Optional<Character> で返す。
fn end_character(ctx: &mut Context, scope: ScopeId, text: Value, last: bool) -> CResult<Value> {
    let (prefix, args) = reuse_args(ctx, scope, vec![text], &["string"])?;
    let [text] = split(args);
    let length = field(ctx, scope, text.clone(), "length")?;
    let index = if last {
        length_minus(ctx, scope, text.clone(), Value::num(1.0))?
    } else {
        Value::num(0.0)
    };
    let item = member(ctx, scope, text, index)?;
    let some = wrap_in_optional(ctx, scope, item, &character())?;
    let none = empty_optional(ctx, scope, &character())?;
    let result = conditional(ctx, scope, length, some, none)?;
    finish(ctx, scope, prefix, result)
}

/// djb2 系の文字列ハッシュ。
fn string_hash(ctx: &mut Context, scope: ScopeId, text: Value) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(ctx, scope, vec![text], &["string"])?;
    let [text] = split(args);
    let text = read(ctx, scope, text)?;
    let hash = ctx.reserve_unique(scope, "hash")?;
    let i = ctx.reserve_unique(scope, "i")?;
    stmts.push(Stmt::var(VarKind::Let, hash.clone(), Some(Expr::num(0.0))));
    let mixed = Expr::binary(
        "-",
        Expr::binary(
            "+",
            Expr::binary("<<", Expr::ident(hash.clone()), Expr::num(5.0)),
            Expr::call(Expr::member(text.clone(), "charCodeAt"), vec![Expr::ident(i.clone())]),
        ),
        Expr::ident(hash.clone()),
    );
    stmts.push(Stmt::For {
        init: Some(Box::new(Stmt::var(VarKind::Let, i.clone(), Some(Expr::num(0.0))))),
        test: Some(Expr::binary(
            "<",
            Expr::ident(i.clone()),
            Expr::member(text, "length"),
        )),
        update: Some(Expr::update("++", false, Expr::ident(i))),
        body: vec![Stmt::expr(Expr::assign("=", Expr::ident(hash.clone()), mixed))],
    });
    stmts.push(Stmt::ret(Expr::binary("|", Expr::ident(hash), Expr::num(0.0))));
    Ok(statements(stmts))
}

fn is_literal(value: &Value, expected: &LiteralValue) -> bool {
    match value {
        Value::Direct(e) | Value::Expression(e) => {
            expression_literal_value(e).as_ref() == Some(expected)
        }
        _ => false,
    }
}

fn split_string(ctx: &mut Context, scope: ScopeId, args: Vec<Value>) -> CResult<Value> {
    let [text, separator, max_splits, omitting] = split(args);
    let unlimited = max_splits.is_direct_undefined()
        || is_literal(&max_splits, &LiteralValue::Num(i32::MAX as f64))
        || is_literal(&max_splits, &LiteralValue::Num(9007199254740991.0));
    if !unlimited {
        return return_todo(
            ctx,
            scope,
            "String.split(separator:maxSplits:omittingEmptySubsequences:)",
        );
    }
    let parts = invoke(ctx, scope, text, "split", vec![separator])?;
    if is_literal(&omitting, &LiteralValue::Bool(false)) {
        return Ok(parts);
    }
    invoke(ctx, scope, parts, "filter", vec![Value::ident("Boolean")])
}

/// String と Substring が共有する関数表。
fn string_functions() -> FunctionMap {
    let mut functions = FunctionMap::new();
    functions.insert("init()".into(), method(&[], |_, _, _| Ok(Value::string(""))));
    functions.insert(
        "init(_:)".into(),
        method(&["value"], |ctx, scope, args| {
            let [value] = split(args);
            if let Value::Direct(Expr::Str(_)) | Value::Expression(Expr::Str(_)) = &value {
                return Ok(value);
            }
            call_expression(ctx, scope, Expr::ident("String"), vec![value])
        }),
    );
    functions.insert(
        "init(describing:)".into(),
        method(&["value"], |ctx, scope, args| {
            let [value] = split(args);
            call_expression(ctx, scope, Expr::ident("String"), vec![value])
        }),
    );
    for key in [
        "init(_builtinStringLiteral:utf8CodeUnitCount:isASCII:)",
        "init(_builtinUnicodeScalarLiteral:)",
        "init(_builtinExtendedGraphemeClusterLiteral:utf8CodeUnitCount:isASCII:)",
        "init(stringLiteral:)",
        "init(unicodeScalarLiteral:)",
        "init(extendedGraphemeClusterLiteral:)",
        "init(stringInterpolation:)",
    ] {
        functions.insert(key.into(), identity(&["value"]));
    }
    functions.insert(
        "init(repeating:count:)".into(),
        method(&["repeating", "count"], |ctx, scope, args| {
            let [text, count] = split(args);
            invoke(ctx, scope, text, "repeat", vec![count])
        }),
    );
    functions.insert("+".into(), binary_builtin("+"));
    for key in ["+=", "write(_:)", "append(_:)", "append(contentsOf:)"] {
        functions.insert(
            key.into(),
            method(&["target", "value"], |ctx, scope, args| {
                let [target, value] = split(args);
                set(ctx, scope, unbox(target), value, "+=")
            }),
        );
    }
    functions.insert(
        "insert(_:at:)".into(),
        method(&["string", "character", "index"], |ctx, scope, args| {
            let [target, character, index] = split(args);
            let (prefix, args) = reuse_args(
                ctx,
                scope,
                vec![unbox(target), character, index],
                &["string", "character", "index"],
            )?;
            let [target, character, index] = split(args);
            let head = substring(ctx, scope, target.clone(), Value::num(0.0), Some(index.clone()))?;
            let tail = substring(ctx, scope, target.clone(), index, None)?;
            let joined = binary(ctx, scope, "+", head, character)?;
            let next = binary(ctx, scope, "+", joined, tail)?;
            write_back(ctx, scope, prefix, target, next, None)
        }),
    );
    functions.insert(
        "remove(at:)".into(),
        method(&["string", "index"], |ctx, scope, args| {
            let [target, index] = split(args);
            let (prefix, args) =
                reuse_args(ctx, scope, vec![unbox(target), index], &["string", "index"])?;
            let [target, index] = split(args);
            let removed = bounds_checked_index(
                ctx,
                scope,
                target.clone(),
                index.clone(),
                false,
                Trap::StringBounds,
            )?;
            let head = substring(ctx, scope, target.clone(), Value::num(0.0), Some(index.clone()))?;
            let after = binary(ctx, scope, "+", index, Value::num(1.0))?;
            let tail = substring(ctx, scope, target.clone(), after, None)?;
            let next = binary(ctx, scope, "+", head, tail)?;
            remove_returning(ctx, scope, prefix, target, removed, next)
        }),
    );
    functions.insert(
        "removeAll(keepingCapacity:)".into(),
        method(&["string"], |ctx, scope, args| {
            let [target] = split(args);
            set(ctx, scope, unbox(target), Value::string(""), "=")
        }),
    );
    functions.insert(
        "removeFirst()".into(),
        method(&["string"], |ctx, scope, args| {
            let [target] = split(args);
            let (prefix, args) = reuse_args(ctx, scope, vec![unbox(target)], &["string"])?;
            let [target] = split(args);
            let removed = bounds_checked_index(
                ctx,
                scope,
                target.clone(),
                Value::num(0.0),
                false,
                Trap::StringBounds,
            )?;
            let next = substring(ctx, scope, target.clone(), Value::num(1.0), None)?;
            remove_returning(ctx, scope, prefix, target, removed, next)
        }),
    );
    functions.insert(
        "removeFirst(_:)".into(),
        method(&["string", "count"], |ctx, scope, args| {
            let [target, count] = split(args);
            let (prefix, args) =
                reuse_args(ctx, scope, vec![unbox(target), count], &["string", "count"])?;
            let [target, count] = split(args);
            let next = substring(ctx, scope, target.clone(), count, None)?;
            write_back(ctx, scope, prefix, target, next, None)
        }),
    );
    functions.insert(
        "removeLast()".into(),
        method(&["string"], |ctx, scope, args| {
            let [target] = split(args);
            let (prefix, args) = reuse_args(ctx, scope, vec![unbox(target)], &["string"])?;
            let [target] = split(args);
            let index = length_minus(ctx, scope, target.clone(), Value::num(1.0))?;
            let removed = bounds_checked_index(
                ctx,
                scope,
                target.clone(),
                index.clone(),
                false,
                Trap::StringBounds,
            )?;
            let next = substring(ctx, scope, target.clone(), Value::num(0.0), Some(index))?;
            remove_returning(ctx, scope, prefix, target, removed, next)
        }),
    );
    functions.insert(
        "removeLast(_:)".into(),
        method(&["string", "count"], |ctx, scope, args| {
            let [target, count] = split(args);
            let (prefix, args) =
                reuse_args(ctx, scope, vec![unbox(target), count], &["string", "count"])?;
            let [target, count] = split(args);
            let end = length_minus(ctx, scope, target.clone(), count)?;
            let next = substring(ctx, scope, target.clone(), Value::num(0.0), Some(end))?;
            write_back(ctx, scope, prefix, target, next, None)
        }),
    );
    functions.insert(
        "popLast()".into(),
        method(&["string"], |ctx, scope, args| {
            let [target] = split(args);
            let (mut stmts, args) = reuse_args(ctx, scope, vec![unbox(target)], &["string"])?;
            let [target] = split(args);
            let last = ctx.reserve_unique(scope, "last")?;
            let none = empty_optional(ctx, scope, &character())?;
            let none = read(ctx, scope, none)?;
            stmts.push(Stmt::var(VarKind::Let, last.clone(), Some(none)));
            let index = length_minus(ctx, scope, target.clone(), Value::num(1.0))?;
            let item = member(ctx, scope, target.clone(), index.clone())?;
            let some = wrap_in_optional(ctx, scope, item, &character())?;
            let assign = set(ctx, scope, Value::ident(last.clone()), some, "=")?;
            let mut body = crate::values::ignore(ctx, scope, assign)?;
            let next = substring(ctx, scope, target.clone(), Value::num(0.0), Some(index))?;
            let written = set(ctx, scope, target.clone(), next, "=")?;
            body.extend(crate::values::ignore(ctx, scope, written)?);
            let length = field(ctx, scope, target, "length")?;
            let test = binary(ctx, scope, "!==", length, Value::num(0.0))?;
            let test = read(ctx, scope, test)?;
            stmts.push(Stmt::if_else(test, body, None));
            stmts.push(Stmt::ret(Expr::ident(last)));
            Ok(statements(stmts))
        }),
    );
    functions.insert(
        "dropFirst()".into(),
        method(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            substring(ctx, scope, text, Value::num(1.0), None)
        }),
    );
    functions.insert(
        "dropFirst(_:)".into(),
        method(&["string", "count"], |ctx, scope, args| {
            let [text, count] = split(args);
            substring(ctx, scope, text, count, None)
        }),
    );
    functions.insert(
        "dropLast()".into(),
        method(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            drop_last(ctx, scope, text, Value::num(1.0))
        }),
    );
    functions.insert(
        "dropLast(_:)".into(),
        method(&["string", "count"], |ctx, scope, args| {
            let [text, count] = split(args);
            drop_last(ctx, scope, text, count)
        }),
    );
    functions.insert(
        "hasPrefix(_:)".into(),
        method(&["string", "prefix"], |ctx, scope, args| {
            let [text, prefix] = split(args);
            invoke(ctx, scope, text, "startsWith", vec![prefix])
        }),
    );
    functions.insert(
        "hasSuffix(_:)".into(),
        method(&["string", "suffix"], |ctx, scope, args| {
            let [text, suffix] = split(args);
            invoke(ctx, scope, text, "endsWith", vec![suffix])
        }),
    );
    functions.insert(
        "contains(_:)".into(),
        method(&["string", "element"], |ctx, scope, args| {
            let [text, element] = split(args);
            let found = invoke(ctx, scope, text, "indexOf", vec![element])?;
            binary(ctx, scope, "!==", found, Value::num(-1.0))
        }),
    );
    functions.insert(
        "subscript(_:)".into(),
        property(&["string", "index"], |ctx, scope, args| {
            let [text, index] = split(args);
            bounds_checked_index(ctx, scope, text, index, false, Trap::StringBounds)
        }),
    );
    functions.insert(
        "firstIndex(of:)".into(),
        method(&["string", "element"], |ctx, scope, args| {
            let [text, element] = split(args);
            let found = invoke(ctx, scope, text, "indexOf", vec![element])?;
            let (first, after) = reuse(ctx, scope, found, "index")?;
            let test = binary(ctx, scope, "!==", first, Value::num(-1.0))?;
            let int = Type::name("Int");
            let some = wrap_in_optional(ctx, scope, after, &int)?;
            let none = empty_optional(ctx, scope, &int)?;
            conditional(ctx, scope, test, some, none)
        }),
    );
    functions.insert(
        "index(after:)".into(),
        method(&["string", "index"], |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["string", "index"])?;
            let [text, index] = split(args);
            let length = field(ctx, scope, text, "length")?;
            let test = binary(ctx, scope, ">", length, index.clone())?;
            let next = binary(ctx, scope, "+", index, Value::num(1.0))?;
            let failed = trap(ctx, scope, Trap::StringBounds)?;
            let result = conditional(ctx, scope, test, next, failed)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "index(before:)".into(),
        method(&["string", "index"], |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["string", "index"])?;
            let [_, index] = split(args);
            let test = binary(ctx, scope, ">", index.clone(), Value::num(0.0))?;
            let previous = binary(ctx, scope, "-", index, Value::num(1.0))?;
            let failed = trap(ctx, scope, Trap::StringBounds)?;
            let result = conditional(ctx, scope, test, previous, failed)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    for (key, op) in [("formIndex(after:)", "+="), ("formIndex(before:)", "-=")] {
        functions.insert(
            key.into(),
            method(&["string", "index"], move |ctx, scope, args| {
                let [_, index] = split(args);
                set(ctx, scope, unbox(index), Value::num(1.0), op)
            }),
        );
    }
    functions.insert(
        "index(_:offsetBy:)".into(),
        method(&["string", "index", "distance"], |ctx, scope, args| {
            let [_, index, distance] = split(args);
            binary(ctx, scope, "+", index, distance)
        }),
    );
    functions.insert(
        "index(_:offsetBy:limitedBy:)".into(),
        method(&["string", "index", "distance", "limit"], |ctx, scope, args| {
            let [_, index, distance, limit] = split(args);
            let (prefix, args) =
                reuse_args(ctx, scope, vec![distance, limit], &["distance", "limit"])?;
            let [distance, limit] = split(args);
            let moved = binary(ctx, scope, "+", index, distance.clone())?;
            let (first, after) = reuse(ctx, scope, moved, "result")?;
            let forward = binary(ctx, scope, ">", distance, Value::num(0.0))?;
            let past_end = binary(ctx, scope, ">", first.clone(), limit.clone())?;
            let before_start = binary(ctx, scope, "<", first, limit)?;
            let overshoot = conditional(ctx, scope, forward, past_end, before_start)?;
            let int = Type::name("Int");
            let none = empty_optional(ctx, scope, &int)?;
            let some = wrap_in_optional(ctx, scope, after, &int)?;
            let result = conditional(ctx, scope, overshoot, none, some)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "distance(from:to:)".into(),
        method(&["string", "start", "end"], |ctx, scope, args| {
            let [_, start, end] = split(args);
            binary(ctx, scope, "-", end, start)
        }),
    );
    functions.insert(
        "suffix(from:)".into(),
        method(&["string", "start"], |ctx, scope, args| {
            let [text, start] = split(args);
            substring(ctx, scope, text, start, None)
        }),
    );
    for key in ["prefix(upTo:)", "prefix(_:)"] {
        functions.insert(
            key.into(),
            method(&["string", "end"], |ctx, scope, args| {
                let [text, end] = split(args);
                substring(ctx, scope, text, Value::num(0.0), Some(end))
            }),
        );
    }
    functions.insert(
        "split(separator:maxSplits:omittingEmptySubsequences:)".into(),
        method(
            &["string", "separator", "maxSplits", "omittingEmptySubsequences"],
            split_string,
        ),
    );
    for (key, js) in [("lowercased()", "toLowerCase"), ("uppercased()", "toUpperCase")] {
        functions.insert(
            key.into(),
            method(&["string"], move |ctx, scope, args| {
                let [text] = split(args);
                invoke(ctx, scope, text, js, Vec::new())
            }),
        );
    }
    functions.insert(
        "reserveCapacity(_:)".into(),
        method(&["string", "capacity"], |_, _, _| Ok(statements(Vec::new()))),
    );
    functions.insert(
        "unicodeScalars".into(),
        property(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            call_expression(ctx, scope, Expr::member(Expr::ident("Array"), "from"), vec![text])
        }),
    );
    functions.insert(
        "utf16".into(),
        property(&["string"], |_, _, args| {
            let [text] = split(args);
            Ok(text)
        }),
    );
    functions.insert(
        "utf8".into(),
        property(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            let encoder = Expr::new_expr(Expr::ident("TextEncoder"), vec![Expr::str_lit("utf-8")]);
            call_expression(ctx, scope, Expr::member(encoder, "encode"), vec![text])
        }),
    );
    functions.insert("count".into(), read_length_field());
    functions.insert("isEmpty".into(), super::common::is_empty_from_length());
    functions.insert("startIndex".into(), start_index_of_zero());
    functions.insert("endIndex".into(), read_length_field());
    functions.insert(
        "first".into(),
        property(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            end_character(ctx, scope, text, false)
        }),
    );
    functions.insert(
        "last".into(),
        property(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            end_character(ctx, scope, text, true)
        }),
    );
    functions.insert(
        "makeIterator()".into(),
        method(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            let text = read(ctx, scope, text)?;
            Ok(expr(Expr::Object(vec![
                Property::field("elements", text),
                Property::field("position", Expr::num(0.0)),
            ])))
        }),
    );
    functions.insert(
        "description".into(),
        property(&["string"], |_, _, args| {
            let [text] = split(args);
            Ok(text)
        }),
    );
    functions.insert(
        "debugDescription".into(),
        property(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            call_expression(ctx, scope, Expr::member(Expr::ident("JSON"), "stringify"), vec![text])
        }),
    );
    functions.insert(
        "hashValue".into(),
        property(&["string"], |ctx, scope, args| {
            let [text] = split(args);
            string_hash(ctx, scope, text)
        }),
    );
    functions
}

fn comparison_map() -> FunctionMap {
    let mut map = FunctionMap::new();
    map.insert("==".into(), binary_builtin("==="));
    map.insert("!=".into(), binary_builtin("!=="));
    map
}

fn ordering_map() -> FunctionMap {
    let mut map = FunctionMap::new();
    for op in ["<", ">", "<=", ">="] {
        map.insert(op.into(), binary_builtin(op));
    }
    map
}

/// 要素の位置を数えるだけの配列・文字列ビュー。
fn view_type(
    name: &str,
    representations: PossibleRepresentation,
    default: Expr,
    code_units: bool,
) -> ReifiedType {
    let mut functions = FunctionMap::new();
    functions.insert("count".into(), read_length_field());
    functions.insert("startIndex".into(), start_index_of_zero());
    functions.insert("endIndex".into(), read_length_field());
    functions.insert(
        "subscript(_:)".into(),
        property(&["view", "index"], move |ctx, scope, args| {
            let [view, index] = split(args);
            if code_units {
                return invoke(ctx, scope, view, "charCodeAt", vec![index]);
            }
            bounds_checked_index(ctx, scope, view, index, false, Trap::StringBounds)
        }),
    );
    ReifiedType::primitive(name, representations, expr(default)).with_functions(functions)
}

pub fn string_type(ctx: &Context, name: &str) -> ReifiedType {
    let explicit = vec![
        ("Equatable", comparison_map()),
        ("Comparable", ordering_map()),
        ("Hashable", FunctionMap::new()),
        ("ExpressibleByStringLiteral", FunctionMap::new()),
        ("LosslessStringConvertible", FunctionMap::new()),
        ("BidirectionalCollection", FunctionMap::new()),
    ];
    let conformances = build_conformances(ctx, &Value::Type(Type::name(name)), explicit);
    ReifiedType::primitive(name, PossibleRepresentation::STRING, Value::string(""))
        .with_functions(string_functions())
        .with_conformances(conformances)
        .with_inner_type("Element", named_type_constructor(character()))
        .with_inner_type("Index", named_type_constructor(Type::name("Int")))
        .with_inner_type("SubSequence", named_type_constructor(Type::name("Substring")))
        .with_inner_type(
            "UnicodeScalarView",
            fixed(view_type(
                "UnicodeScalarView",
                PossibleRepresentation::ARRAY,
                Expr::Array(Vec::new()),
                false,
            )),
        )
        .with_inner_type(
            "UTF16View",
            fixed(view_type("UTF16View", PossibleRepresentation::STRING, Expr::str_lit(""), true)),
        )
        .with_inner_type(
            "UTF8View",
            fixed(view_type(
                "UTF8View",
                PossibleRepresentation::OBJECT,
                Expr::Array(Vec::new()),
                false,
            )),
        )
}

pub fn character_type(ctx: &Context) -> ReifiedType {
    let mut functions = FunctionMap::new();
    for key in [
        "init(_:)",
        "init(_builtinUnicodeScalarLiteral:)",
        "init(_builtinExtendedGraphemeClusterLiteral:utf8CodeUnitCount:isASCII:)",
        "init(unicodeScalarLiteral:)",
        "init(extendedGraphemeClusterLiteral:)",
    ] {
        functions.insert(key.into(), identity(&["character"]));
    }
    functions.insert(
        "description".into(),
        property(&["character"], |_, _, args| {
            let [c] = split(args);
            Ok(c)
        }),
    );
    let explicit = vec![
        ("Equatable", comparison_map()),
        ("Comparable", ordering_map()),
        ("ExpressibleByExtendedGraphemeClusterLiteral", FunctionMap::new()),
        ("CustomStringConvertible", FunctionMap::new()),
    ];
    let conformances = build_conformances(ctx, &Value::Type(character()), explicit);
    ReifiedType::primitive("Character", PossibleRepresentation::STRING, Value::string(""))
        .with_functions(functions)
        .with_conformances(conformances)
}

/// 文字列補間の途中経過。中身は連結中の文字列そのもの。
pub fn default_string_interpolation_type() -> ReifiedType {
    let mut functions = FunctionMap::new();
    functions.insert(
        "init(literalCapacity:interpolationCount:)".into(),
        method(&[], |_, _, _| Ok(Value::string(""))),
    );
    functions.insert(
        "appendLiteral(_:)".into(),
        method(&["interpolation", "literal"], |ctx, scope, args| {
            let [interpolation, literal] = split(args);
            if is_literal(&literal, &LiteralValue::Str(String::new())) {
                return Ok(statements(Vec::new()));
            }
            set(ctx, scope, unbox(interpolation), literal, "+=")
        }),
    );
    functions.insert(
        "appendInterpolation(_:)".into(),
        method(&["interpolation", "value"], |ctx, scope, args| {
            let [interpolation, value] = split(args);
            set(ctx, scope, unbox(interpolation), value, "+=")
        }),
    );
    ReifiedType::primitive(
        "DefaultStringInterpolation",
        PossibleRepresentation::STRING,
        Value::string(""),
    )
    .with_functions(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::{call_method, get_property};
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};

    fn string() -> Value {
        Value::Type(Type::name("String"))
    }

    fn show(ctx: &mut Context, value: Value) -> String {
        let root = ctx.root();
        let e = read(ctx, root, value).expect("read");
        print_expr(&e)
    }

    #[test]
    /// 添字の読み出しは両端を検査する
    fn subscript_is_bounds_checked() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = get_property(
            &mut ctx,
            root,
            &string(),
            "subscript(_:)",
            vec![Value::ident("s"), Value::ident("i")],
        )
        .expect("subscript");
        assert_eq!(
            show(&mut ctx, value),
            "s[s.length > i && i >= 0 ? i : $$stringBoundsFailed()]"
        );
    }

    #[test]
    /// contains は indexOf の結果を -1 と比べる
    fn contains_uses_index_of() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &string(),
            "contains(_:)",
            vec![Value::ident("s"), Value::string("a")],
        )
        .expect("contains");
        assert_eq!(show(&mut ctx, value), "s.indexOf(\"a\") !== -1");
    }

    #[test]
    /// insert は substring で組み直して書き戻す
    fn insert_rebuilds_string() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let target = Value::boxed(Value::ident("s"), Type::name("String"));
        let value = call_method(
            &mut ctx,
            root,
            &string(),
            "insert(_:at:)",
            vec![target, Value::string("x"), Value::ident("i")],
        )
        .expect("insert");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            print_stmts(&stmts),
            "s = s.substring(0, i) + \"x\" + s.substring(i);\n"
        );
    }

    #[test]
    /// 空文字列のリテラルを足す補間は何も出力しない
    fn empty_literal_interpolation_is_skipped() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = Value::Type(Type::name("DefaultStringInterpolation"));
        let target = Value::boxed(Value::ident("t"), Type::name("DefaultStringInterpolation"));
        let value = call_method(
            &mut ctx,
            root,
            &parent,
            "appendLiteral(_:)",
            vec![target.clone(), Value::string("")],
        )
        .expect("append");
        assert!(matches!(value, Value::Statements(ref s) if s.is_empty()));
        let value = call_method(
            &mut ctx,
            root,
            &parent,
            "appendInterpolation(_:)",
            vec![target, Value::ident("n")],
        )
        .expect("append");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(print_stmts(&stmts), "t += n;\n");
    }

    #[test]
    /// split は既定で空の部分列を取り除く
    fn split_omits_empty_by_default() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &string(),
            "split(separator:maxSplits:omittingEmptySubsequences:)",
            vec![
                Value::ident("s"),
                Value::string(","),
                Value::num(2147483647.0),
                Value::boolean(true),
            ],
        )
        .expect("split");
        assert_eq!(show(&mut ctx, value), "s.split(\",\").filter(Boolean)");
    }

    #[test]
    /// String は双方向コレクションとハッシュ可能に適合する
    fn string_conformances() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let reified =
            crate::reified::reify_type(&mut ctx, root, &Type::name("String")).expect("reify");
        assert!(reified.conforms_to("BidirectionalCollection"));
        assert!(reified.conforms_to("Collection"));
        assert!(reified.conforms_to("Hashable"));
    }
}
