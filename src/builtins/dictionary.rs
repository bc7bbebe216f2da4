// パス: src/builtins/dictionary.rs
// 役割: Dictionary<Key, Value> の型構築子
// 意図: 文字列・数値・真偽値のキーを持つ辞書を JavaScript のプレーンオブジェクトに写す
// 関連ファイル: src/builtins/mod.rs, src/builtins/optional.rs, src/builtins/array.rs
//! 辞書
//!
//! キーはオブジェクトのプロパティ名になるので、`keys` で取り出すときだけ元の型に戻す。
//! 添字への nil の代入はキーの削除になる。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::js::{Expr, Stmt, VarKind};
use crate::reified::{
    build_conformances, constructor, copy_value, expression_skips_copy, reify_type, Dispatch,
    FunctionMap, PossibleRepresentation, ReifiedType, TypeConstructor,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    call_expression, conditional, copy, expr, expression_literal_value, field, ignore, member,
    read, set, statements, unary, Value,
};

use super::common::{
    builder, call_method, finish, has_own_property, method, property, reuse_args, split, unbox,
};
use super::optional::{
    empty_optional, encoding, optional_is_some, unwrap_optional, wrap_in_optional, Encoding,
};

/// プロパティ名からキーの値へ戻す方法。
#[derive(Clone, Copy, Debug, PartialEq)]
enum KeyKind {
    String,
    Number,
    Boolean,
}

impl KeyKind {
    fn of(representations: PossibleRepresentation) -> Option<KeyKind> {
        if representations == PossibleRepresentation::STRING {
            Some(KeyKind::String)
        } else if representations == PossibleRepresentation::NUMBER {
            Some(KeyKind::Number)
        } else if representations == PossibleRepresentation::BOOLEAN {
            Some(KeyKind::Boolean)
        } else {
            None
        }
    }

    /// `Object.keys(dict)` に必要なら変換の `map` を付ける。
    fn keys(self, dict: Expr) -> Expr {
        let names = Expr::call_path(&["Object", "keys"], vec![dict]);
        match self {
            KeyKind::String => names,
            KeyKind::Number => Expr::call(Expr::member(names, "map"), vec![Expr::ident("Number")]),
            KeyKind::Boolean => {
                let converter = Expr::function(
                    vec!["key".into()],
                    vec![Stmt::ret(Expr::binary(
                        "===",
                        Expr::ident("key"),
                        Expr::str_lit("true"),
                    ))],
                );
                Expr::call(Expr::member(names, "map"), vec![converter])
            }
        }
    }
}

/// `Object.keys(dict).length`
fn key_count(ctx: &mut Context, scope: ScopeId, dict: Value) -> CResult<Value> {
    let keys = Expr::member(Expr::ident("Object"), "keys");
    let names = call_expression(ctx, scope, keys, vec![dict])?;
    field(ctx, scope, names, "length")
}

/// 添字への代入。none ならキーを消し、some なら中身を書き込む。
fn store(
    ctx: &mut Context,
    scope: ScopeId,
    value_type: &Type,
    args: Vec<Value>,
) -> CResult<Value> {
    let [dict, index, value] = split(args);
    let (mut stmts, args) = reuse_args(ctx, scope, vec![unbox(dict), index], &["dict", "index"])?;
    let [dict, index] = split(args);
    let place = member(ctx, scope, dict, index)?;
    let encoding = encoding(ctx, scope, value_type)?;
    let e = read(ctx, scope, value)?;
    let literal_none = match (&encoding, &e) {
        (Encoding::Null, Expr::Null) => true,
        (Encoding::Array, Expr::Array(items)) => items.is_empty(),
        _ => false,
    };
    if literal_none {
        let removed = unary(ctx, scope, "delete", place)?;
        stmts.extend(ignore(ctx, scope, removed)?);
        return Ok(statements(stmts));
    }
    if matches!(encoding, Encoding::Null) && expression_literal_value(&e).is_some() {
        let written = set(ctx, scope, place, expr(e), "=")?;
        stmts.extend(ignore(ctx, scope, written)?);
        return Ok(statements(stmts));
    }
    let (prefix, args) = reuse_args(ctx, scope, vec![expr(e)], &["value"])?;
    stmts.extend(prefix);
    let [value] = split(args);
    let test = optional_is_some(ctx, scope, value.clone(), value_type)?;
    let test = read(ctx, scope, test)?;
    let unwrapped = unwrap_optional(ctx, scope, value, value_type)?;
    let written = set(ctx, scope, place.clone(), copy(unwrapped, value_type.clone()), "=")?;
    let written = ignore(ctx, scope, written)?;
    let removed = unary(ctx, scope, "delete", place)?;
    let removed = ignore(ctx, scope, removed)?;
    stmts.push(Stmt::if_else(test, written, Some(removed)));
    Ok(statements(stmts))
}

/// 片方にしかないキー、または値が `!=` のキーがあれば `equal = false` で抜ける。
fn compare_dictionaries(
    ctx: &mut Context,
    scope: ScopeId,
    value_type: &Type,
    args: Vec<Value>,
    equal: bool,
) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
    let [lhs, rhs] = split(args);
    let result = ctx.reserve_unique(scope, "equal")?;
    let key = ctx.reserve_unique(scope, "key")?;
    let key_value = Value::ident(key.clone());
    stmts.push(Stmt::var(VarKind::Let, result.clone(), Some(Expr::Bool(true))));
    let mismatch = vec![
        Stmt::expr(Expr::assign("=", Expr::ident(result.clone()), Expr::Bool(false))),
        Stmt::Break,
    ];

    let present = has_own_property(ctx, scope, rhs.clone(), key_value.clone())?;
    let has_key = read(ctx, scope, present)?;
    let left = member(ctx, scope, lhs.clone(), key_value.clone())?;
    let right = member(ctx, scope, rhs.clone(), key_value.clone())?;
    let parent = Value::Type(value_type.clone());
    let differs = call_method(ctx, scope, &parent, "!=", vec![left, right])?;
    let differs = read(ctx, scope, differs)?;
    let lhs_expr = read(ctx, scope, lhs.clone())?;
    stmts.push(Stmt::ForIn {
        kind: VarKind::Const,
        name: key.clone(),
        object: lhs_expr,
        body: vec![Stmt::if_else(
            Expr::logical("||", Expr::unary("!", has_key), differs),
            mismatch.clone(),
            None,
        )],
    });

    let present = has_own_property(ctx, scope, lhs, key_value)?;
    let has_key = read(ctx, scope, present)?;
    let rhs_expr = read(ctx, scope, rhs)?;
    stmts.push(Stmt::if_else(
        Expr::ident(result.clone()),
        vec![Stmt::ForIn {
            kind: VarKind::Const,
            name: key,
            object: rhs_expr,
            body: vec![Stmt::if_else(Expr::unary("!", has_key), mismatch, None)],
        }],
        None,
    ));
    let answer = Expr::ident(result);
    stmts.push(Stmt::ret(if equal {
        answer
    } else {
        Expr::unary("!", answer)
    }));
    Ok(statements(stmts))
}

/// 値の型が複製を要する辞書のコピー。キーごとに値を複製する。
fn copy_entries(
    ctx: &mut Context,
    scope: ScopeId,
    dict: Expr,
    value_type: &Type,
) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(ctx, scope, vec![expr(dict)], &["dict"])?;
    let [dict] = split(args);
    let copied = ctx.reserve_unique(scope, "copied")?;
    let key = ctx.reserve_unique(scope, "key")?;
    stmts.push(Stmt::var(VarKind::Const, copied.clone(), Some(Expr::Object(Vec::new()))));
    let item = member(ctx, scope, dict.clone(), Value::ident(key.clone()))?;
    let item = copy_value(ctx, scope, item, value_type)?;
    let target = Value::ident(copied.clone());
    let place = member(ctx, scope, target, Value::ident(key.clone()))?;
    let written = set(ctx, scope, place, item, "=")?;
    let body = ignore(ctx, scope, written)?;
    let object = read(ctx, scope, dict)?;
    stmts.push(Stmt::ForIn {
        kind: VarKind::Const,
        name: key,
        object,
        body,
    });
    stmts.push(Stmt::ret(Expr::ident(copied)));
    Ok(statements(stmts))
}

fn dictionary_type(
    ctx: &mut Context,
    scope: ScopeId,
    key_type: Type,
    value_type: Type,
) -> CResult<Rc<ReifiedType>> {
    let self_type = Type::dictionary(key_type.clone(), value_type.clone());
    let reified_key = reify_type(ctx, scope, &key_type)?;
    let reified_value = reify_type(ctx, scope, &value_type)?;
    if matches!(reified_key.dispatch, Dispatch::Runtime(_))
        || matches!(reified_value.dispatch, Dispatch::Runtime(_))
    {
        return Err(CompileError::new(
            "BLT003",
            format!("Runtime types are not supported in {}", self_type.stringify()),
        ));
    }
    let key_kind = KeyKind::of(reified_key.representations).ok_or_else(|| {
        CompileError::new(
            "BLT004",
            format!("No dictionary implementation for keys of type {}", key_type.stringify()),
        )
    })?;

    let mut functions = FunctionMap::new();
    functions.insert("init()".into(), method(&[], |_, _, _| Ok(expr(Expr::Object(Vec::new())))));
    let ty = value_type.clone();
    let stored = value_type.clone();
    functions.insert(
        "subscript(_:)".into(),
        crate::functions::FunctionEntry::Property {
            get: builder(&["dict", "index"], move |ctx, scope, args| {
                let (prefix, args) = reuse_args(ctx, scope, args, &["dict", "index"])?;
                let [dict, index] = split(args);
                let present = has_own_property(ctx, scope, dict.clone(), index.clone())?;
                let item = member(ctx, scope, dict, index)?;
                let some = wrap_in_optional(ctx, scope, copy(item, ty.clone()), &ty)?;
                let none = empty_optional(ctx, scope, &ty)?;
                let result = conditional(ctx, scope, present, some, none)?;
                finish(ctx, scope, prefix, result)
            }),
            set: Some(builder(&["dict", "index", "value"], move |ctx, scope, args| {
                store(ctx, scope, &stored, args)
            })),
        },
    );
    let ty = value_type.clone();
    let stored = value_type.clone();
    functions.insert(
        "subscript(_:default:)".into(),
        crate::functions::FunctionEntry::Property {
            get: builder(&["dict", "index", "defaultValue"], move |ctx, scope, args| {
                let (prefix, args) =
                    reuse_args(ctx, scope, args, &["dict", "index", "defaultValue"])?;
                let [dict, index, fallback] = split(args);
                let present = has_own_property(ctx, scope, dict.clone(), index.clone())?;
                let item = member(ctx, scope, dict, index)?;
                let result = conditional(ctx, scope, present, copy(item, ty.clone()), fallback)?;
                finish(ctx, scope, prefix, result)
            }),
            set: Some(builder(
                &["dict", "index", "defaultValue", "value"],
                move |ctx, scope, args| {
                    let [dict, index, _, value] = split(args);
                    let place = member(ctx, scope, unbox(dict), index)?;
                    set(ctx, scope, place, copy(value, stored.clone()), "=")
                },
            )),
        },
    );
    functions.insert(
        "count".into(),
        property(&["dict"], |ctx, scope, args| {
            let [dict] = split(args);
            key_count(ctx, scope, dict)
        }),
    );
    functions.insert(
        "isEmpty".into(),
        property(&["dict"], |ctx, scope, args| {
            let [dict] = split(args);
            let count = key_count(ctx, scope, dict)?;
            crate::values::binary(ctx, scope, "===", count, Value::num(0.0))
        }),
    );
    functions.insert(
        "keys".into(),
        property(&["dict"], move |ctx, scope, args| {
            let [dict] = split(args);
            let dict = read(ctx, scope, dict)?;
            Ok(expr(key_kind.keys(dict)))
        }),
    );
    functions.insert(
        "values".into(),
        property(&["dict"], |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["dict"])?;
            let [dict] = split(args);
            let dict = read(ctx, scope, dict)?;
            let getter = Expr::function(
                vec!["key".into()],
                vec![Stmt::ret(Expr::index(dict.clone(), Expr::ident("key")))],
            );
            let names = Expr::call_path(&["Object", "keys"], vec![dict]);
            finish(ctx, scope, prefix, expr(Expr::call(Expr::member(names, "map"), vec![getter])))
        }),
    );
    let ty = value_type.clone();
    functions.insert(
        "removeValue(forKey:)".into(),
        method(&["dict", "key"], move |ctx, scope, args| {
            let [dict, key] = split(args);
            let (mut stmts, args) =
                reuse_args(ctx, scope, vec![unbox(dict), key], &["dict", "key"])?;
            let [dict, key] = split(args);
            let present = has_own_property(ctx, scope, dict.clone(), key.clone())?;
            let item = member(ctx, scope, dict, key)?;
            let some = wrap_in_optional(ctx, scope, item.clone(), &ty)?;
            let none = empty_optional(ctx, scope, &ty)?;
            let previous = conditional(ctx, scope, present, some, none)?;
            let removed = ctx.reserve_unique(scope, "removed")?;
            let previous = read(ctx, scope, previous)?;
            stmts.push(Stmt::var(VarKind::Const, removed.clone(), Some(previous)));
            let deleted = unary(ctx, scope, "delete", item)?;
            stmts.extend(ignore(ctx, scope, deleted)?);
            stmts.push(Stmt::ret(Expr::ident(removed)));
            Ok(statements(stmts))
        }),
    );
    let ty = value_type.clone();
    functions.insert(
        "updateValue(_:forKey:)".into(),
        method(&["dict", "value", "key"], move |ctx, scope, args| {
            let [dict, value, key] = split(args);
            let (mut stmts, args) =
                reuse_args(ctx, scope, vec![unbox(dict), key], &["dict", "key"])?;
            let [dict, key] = split(args);
            let present = has_own_property(ctx, scope, dict.clone(), key.clone())?;
            let item = member(ctx, scope, dict, key)?;
            let some = wrap_in_optional(ctx, scope, item.clone(), &ty)?;
            let none = empty_optional(ctx, scope, &ty)?;
            let previous = conditional(ctx, scope, present, some, none)?;
            let old = ctx.reserve_unique(scope, "old")?;
            let previous = read(ctx, scope, previous)?;
            stmts.push(Stmt::var(VarKind::Const, old.clone(), Some(previous)));
            let written = set(ctx, scope, item, copy(value, ty.clone()), "=")?;
            stmts.extend(ignore(ctx, scope, written)?);
            stmts.push(Stmt::ret(Expr::ident(old)));
            Ok(statements(stmts))
        }),
    );
    functions.insert(
        "removeAll()".into(),
        method(&["dict"], |ctx, scope, args| {
            let [dict] = split(args);
            set(ctx, scope, unbox(dict), expr(Expr::Object(Vec::new())), "=")
        }),
    );

    let mut literal = FunctionMap::new();
    literal.insert(
        "init(dictionaryLiteral:)".into(),
        method(&["elements"], |ctx, scope, args| {
            let [elements] = split(args);
            call_expression(
                ctx,
                scope,
                Expr::member(Expr::ident("Object"), "fromEntries"),
                vec![elements],
            )
        }),
    );
    let mut equatable = FunctionMap::new();
    for equal in [true, false] {
        let ty = value_type.clone();
        equatable.insert(
            if equal { "==" } else { "!=" }.into(),
            method(&["lhs", "rhs"], move |ctx, scope, args| {
                compare_dictionaries(ctx, scope, &ty, args, equal)
            }),
        );
    }
    let mut explicit = vec![("ExpressibleByDictionaryLiteral", literal)];
    if reified_value.conforms_to("Equatable") {
        explicit.push(("Equatable", equatable));
    }
    let conformances = build_conformances(ctx, &Value::Type(self_type.clone()), explicit);

    let value_copies = reified_value.copy.is_some();
    let copied_type = value_type.clone();
    let keys_type = Type::array(key_type.clone());
    let values_type = Type::array(value_type.clone());
    let key_ctor = key_type.clone();
    let value_ctor = value_type.clone();
    let reified = ReifiedType::new(self_type.stringify(), PossibleRepresentation::OBJECT)
        .with_functions(functions)
        .with_conformances(conformances)
        .with_default(|_, _, _| Ok(expr(Expr::Object(Vec::new()))))
        .with_copy(move |ctx, scope, value| {
            let e = read(ctx, scope, value)?;
            if expression_skips_copy(&e) {
                return Ok(expr(e));
            }
            if value_copies {
                return copy_entries(ctx, scope, e, &copied_type);
            }
            Ok(expr(Expr::call_path(
                &["Object", "assign"],
                vec![Expr::Object(Vec::new()), e],
            )))
        })
        .with_inner_type("Key", constructor(move |ctx, scope, _| reify_type(ctx, scope, &key_ctor)))
        .with_inner_type(
            "Value",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &value_ctor)),
        )
        .with_inner_type(
            "Keys",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &keys_type)),
        )
        .with_inner_type(
            "Values",
            constructor(move |ctx, scope, _| reify_type(ctx, scope, &values_type)),
        );
    Ok(Rc::new(reified))
}

/// `Dictionary<Key, Value>` の型構築子。
pub fn dictionary_constructor() -> Rc<dyn TypeConstructor> {
    constructor(|ctx, scope, args| match args {
        [key, value, ..] => dictionary_type(ctx, scope, key.clone(), value.clone()),
        _ => Err(CompileError::new(
            "BLT005",
            format!("Dictionary expects two type arguments, got {}", args.len()),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::get_property;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};
    use crate::values::CallKind;

    fn string_to_int() -> Type {
        Type::dictionary(Type::name("String"), Type::name("Int"))
    }

    fn subscript_set(ctx: &mut Context, value: Value) -> String {
        let root = ctx.root();
        let setter = Value::member_function(
            Value::Type(string_to_int()),
            "subscript(_:)",
            Type::void(),
        );
        let args = vec![Value::ident("d"), Value::ident("k"), value];
        let written = crate::values::call(ctx, root, setter, args, CallKind::Set).expect("set");
        match written {
            Value::Statements(stmts) => print_stmts(&stmts),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    /// nil の代入はキーの削除になる
    fn assigning_nil_deletes_key() {
        let mut ctx = new_context_with_builtins();
        assert_eq!(subscript_set(&mut ctx, Value::null()), "delete d[k];\n");
    }

    #[test]
    /// リテラルの代入はそのまま書き込む
    fn assigning_literal_writes_directly() {
        let mut ctx = new_context_with_builtins();
        assert_eq!(subscript_set(&mut ctx, Value::num(1.0)), "d[k] = 1;\n");
    }

    #[test]
    /// 実行時の Optional は some のときだけ書き込む
    fn assigning_optional_checks_presence() {
        let mut ctx = new_context_with_builtins();
        let text = subscript_set(&mut ctx, Value::ident("v"));
        assert_eq!(
            text,
            "if (v !== null) {\n  d[k] = v;\n} else {\n  delete d[k];\n}\n"
        );
    }

    #[test]
    /// 数値キーの keys は Number で戻す
    fn numeric_keys_are_converted() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = Value::Type(Type::dictionary(Type::name("Int"), Type::name("String")));
        let keys = get_property(&mut ctx, root, &parent, "keys", vec![Value::ident("d")])
            .expect("keys");
        let e = read(&mut ctx, root, keys).expect("read");
        assert_eq!(print_expr(&e), "Object.keys(d).map(Number)");
    }

    #[test]
    /// 単純な値の辞書は Object.assign で複製する
    fn copies_with_object_assign() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let copied = copy_value(&mut ctx, root, Value::ident("d"), &string_to_int()).expect("copy");
        let e = read(&mut ctx, root, copied).expect("read");
        assert_eq!(print_expr(&e), "Object.assign({}, d)");
    }

    #[test]
    /// 配列をキーにした辞書は作れない
    fn rejects_array_keys() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let ty = Type::dictionary(Type::array(Type::name("Int")), Type::name("Int"));
        let err = match reify_type(&mut ctx, root, &ty) {
            Ok(_) => panic!("array keys should be rejected"),
            Err(err) => err,
        };
        assert_eq!(err.code(), "BLT004");
    }
}
