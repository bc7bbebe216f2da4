// パス: src/builtins/protocols.rs
// 役割: 標準ライブラリのプロトコル定義（要件・関数名・既定実装）を登録する
// 意図: 型が明示しなかった関数を、同じ型の別の関数から導けるようにする
// 関連ファイル: src/reified.rs, src/builtins/mod.rs, src/builtins/optional.rs
//! 組み込みプロトコル
//!
//! 既定実装は適合する型（Self）を受け取ってから関数項目になる。
//! Self の関数は `call_method` / `get_property` で呼ぶので、具象型なら展開、実行時の型なら witness table の呼び出しになる。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::functions::FunctionEntry;
use crate::js::{Expr, Stmt, VarKind};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{binary, conditional, read, set, statements, unary, Value};

use super::common::{
    call_method, finish, get_property, method, property, reuse_args, split,
};
use super::optional::{empty_optional, wrap_in_optional};

/// Self 型を受け取って既定実装を作る関数。
pub type ProtocolDefault = Rc<dyn Fn(&Value) -> FunctionEntry>;

/// プロトコルの定義。`functions` の `None` は型が必ず実装する要件。
pub struct ProtocolDefinition {
    pub name: String,
    pub requirements: Vec<String>,
    pub functions: Vec<(String, Option<ProtocolDefault>)>,
}

type DefaultBody = dyn Fn(&mut Context, ScopeId, &Value, Vec<Value>) -> CResult<Value>;

fn adapted(
    names: &'static [&'static str],
    f: impl Fn(&mut Context, ScopeId, &Value, Vec<Value>) -> CResult<Value> + 'static,
) -> Option<ProtocolDefault> {
    let f: Rc<DefaultBody> = Rc::new(f);
    Some(Rc::new(move |self_type: &Value| {
        let f = f.clone();
        let self_type = self_type.clone();
        method(names, move |ctx, scope, args| f(ctx, scope, &self_type, args))
    }))
}

fn adapted_property(
    names: &'static [&'static str],
    f: impl Fn(&mut Context, ScopeId, &Value, Vec<Value>) -> CResult<Value> + 'static,
) -> Option<ProtocolDefault> {
    let f: Rc<DefaultBody> = Rc::new(f);
    Some(Rc::new(move |self_type: &Value| {
        let f = f.clone();
        let self_type = self_type.clone();
        property(names, move |ctx, scope, args| f(ctx, scope, &self_type, args))
    }))
}

/// `lhs op= rhs` を Self の `op` で書き戻す。
fn update_method(base: &'static str) -> Option<ProtocolDefault> {
    adapted(&["lhs", "rhs"], move |ctx, scope, self_type, args| {
        let (prefix, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
        let [lhs, rhs] = split(args);
        let result = call_method(ctx, scope, self_type, base, vec![lhs.clone(), rhs])?;
        let written = set(ctx, scope, lhs, result, "=")?;
        finish(ctx, scope, prefix, written)
    })
}

fn element_type(self_type: &Value) -> Type {
    match self_type {
        Value::Type(ty) => Type::Namespaced {
            namespace: Box::new(ty.clone()),
            ty: Box::new(Type::name("Element")),
        },
        _ => Type::name("Element"),
    }
}

/// `let name = init;` を宣言して識別子を返す。
fn local(
    ctx: &mut Context,
    scope: ScopeId,
    prefix: &str,
    init: Value,
    out: &mut Vec<Stmt>,
) -> CResult<Value> {
    let name = ctx.reserve_unique(scope, prefix)?;
    let init = read(ctx, scope, init)?;
    out.push(Stmt::var(VarKind::Let, name.clone(), Some(init)));
    Ok(Value::ident(name))
}

fn assign(ctx: &mut Context, scope: ScopeId, target: Value, value: Value) -> CResult<Vec<Stmt>> {
    let written = set(ctx, scope, target, value, "=")?;
    crate::values::ignore(ctx, scope, written)
}

/// `current` を `distance` 回 `index(after:)` で進める。
fn offset_index(
    ctx: &mut Context,
    scope: ScopeId,
    self_type: &Value,
    args: Vec<Value>,
    limited: bool,
) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(
        ctx,
        scope,
        args,
        &["collection", "index", "distance", "limit"],
    )?;
    let [collection, index, distance, limit] = split(args);
    let current = local(ctx, scope, "current", index, &mut stmts)?;
    let i = ctx.reserve_unique(scope, "i")?;
    let counter = Value::ident(i.clone());
    let mut test = binary(ctx, scope, "<", counter.clone(), distance)?;
    if limited {
        let not_limit = binary(ctx, scope, "!==", current.clone(), limit)?;
        test = crate::values::logical(ctx, scope, "&&", test, not_limit)?;
    }
    let next = call_method(
        ctx,
        scope,
        self_type,
        "index(after:)",
        vec![collection, current.clone()],
    )?;
    let body = assign(ctx, scope, current.clone(), next)?;
    stmts.push(Stmt::For {
        init: Some(Box::new(Stmt::var(VarKind::Let, i.clone(), Some(Expr::num(0.0))))),
        test: Some(read(ctx, scope, test)?),
        update: Some(Expr::update("++", false, Expr::ident(i))),
        body,
    });
    stmts.push(Stmt::ret(read(ctx, scope, current)?));
    Ok(statements(stmts))
}

fn distance_between(
    ctx: &mut Context,
    scope: ScopeId,
    self_type: &Value,
    args: Vec<Value>,
) -> CResult<Value> {
    let (mut stmts, args) = reuse_args(ctx, scope, args, &["collection", "start", "end"])?;
    let [collection, start, end] = split(args);
    let current = local(ctx, scope, "current", start, &mut stmts)?;
    let count = local(ctx, scope, "count", Value::num(0.0), &mut stmts)?;
    // インデックスはすべて数値なので `!==` で比較する
    let test = binary(ctx, scope, "!==", current.clone(), end)?;
    let incremented = binary(ctx, scope, "+", count.clone(), Value::num(1.0))?;
    let mut body = assign(ctx, scope, count.clone(), incremented)?;
    let next = call_method(
        ctx,
        scope,
        self_type,
        "index(after:)",
        vec![collection, current.clone()],
    )?;
    body.extend(assign(ctx, scope, current, next)?);
    stmts.push(Stmt::While {
        test: read(ctx, scope, test)?,
        body,
    });
    stmts.push(Stmt::ret(read(ctx, scope, count)?));
    Ok(statements(stmts))
}

fn form_index(name: &'static str) -> Option<ProtocolDefault> {
    adapted(&["collection", "index"], move |ctx, scope, self_type, args| {
        let (prefix, args) = reuse_args(ctx, scope, args, &["collection", "index"])?;
        let [collection, index] = split(args);
        let next = call_method(ctx, scope, self_type, name, vec![collection, index.clone()])?;
        let written = set(ctx, scope, index, next, "=")?;
        finish(ctx, scope, prefix, written)
    })
}

/// 既定のプロトコルをコンテキストに登録する。
pub fn add_default_protocols(ctx: &mut Context) {
    let mut add = |name: &str,
                   functions: Vec<(&str, Option<ProtocolDefault>)>,
                   requirements: &[&str]| {
        let definition = ProtocolDefinition {
            name: name.to_string(),
            requirements: requirements.iter().map(|r| r.to_string()).collect(),
            functions: functions
                .into_iter()
                .map(|(key, default)| (key.to_string(), default))
                .collect(),
        };
        ctx.protocols.insert(name.to_string(), Rc::new(definition));
    };

    add("Object", vec![], &[]);
    add(
        "Equatable",
        vec![
            ("==", None),
            (
                "!=",
                adapted(&["lhs", "rhs"], |ctx, scope, self_type, args| {
                    let equal = call_method(ctx, scope, self_type, "==", args)?;
                    unary(ctx, scope, "!", equal)
                }),
            ),
            (
                "~=",
                adapted(&["lhs", "rhs"], |ctx, scope, self_type, args| {
                    call_method(ctx, scope, self_type, "==", args)
                }),
            ),
        ],
        &[],
    );
    add(
        "Comparable",
        vec![
            ("<", None),
            (
                ">",
                adapted(&["lhs", "rhs"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
                    let [lhs, rhs] = split(args);
                    let result = call_method(ctx, scope, self_type, "<", vec![rhs, lhs])?;
                    finish(ctx, scope, prefix, result)
                }),
            ),
            (
                "<=",
                adapted(&["lhs", "rhs"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
                    let [lhs, rhs] = split(args);
                    let less = call_method(ctx, scope, self_type, "<", vec![rhs, lhs])?;
                    let result = unary(ctx, scope, "!", less)?;
                    finish(ctx, scope, prefix, result)
                }),
            ),
            (
                ">=",
                adapted(&["lhs", "rhs"], |ctx, scope, self_type, args| {
                    let less = call_method(ctx, scope, self_type, "<", args)?;
                    unary(ctx, scope, "!", less)
                }),
            ),
            (
                "...",
                adapted(&["minimum", "maximum"], |_, _, _, args| Ok(Value::Tuple(args))),
            ),
        ],
        &["Equatable"],
    );
    for (protocol, init) in [
        ("ExpressibleByNilLiteral", "init(nilLiteral:)"),
        ("ExpressibleByBooleanLiteral", "init(booleanLiteral:)"),
        ("ExpressibleByIntegerLiteral", "init(integerLiteral:)"),
        ("ExpressibleByFloatLiteral", "init(floatLiteral:)"),
        ("ExpressibleByUnicodeScalarLiteral", "init(unicodeScalarLiteral:)"),
        (
            "ExpressibleByExtendedGraphemeClusterLiteral",
            "init(extendedGraphemeClusterLiteral:)",
        ),
        ("ExpressibleByStringLiteral", "init(stringLiteral:)"),
        ("ExpressibleByArrayLiteral", "init(arrayLiteral:)"),
        ("ExpressibleByDictionaryLiteral", "init(dictionaryLiteral:)"),
    ] {
        add(protocol, vec![(init, None)], &[]);
    }
    add(
        "AdditiveArithmetic",
        vec![
            ("zero", None),
            ("+", None),
            ("+=", update_method("+")),
            ("-", None),
            ("-=", update_method("-")),
        ],
        &["Equatable", "ExpressibleByIntegerLiteral"],
    );
    add(
        "Numeric",
        vec![
            ("init(exactly:)", None),
            ("*", None),
            ("*=", update_method("*")),
        ],
        &["Equatable", "ExpressibleByIntegerLiteral", "AdditiveArithmetic"],
    );
    add(
        "SignedNumeric",
        vec![
            ("-", None),
            (
                "negate()",
                adapted(&["self"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["self"])?;
                    let [target] = split(args);
                    let negated = call_method(
                        ctx,
                        scope,
                        self_type,
                        "-",
                        vec![Value::num(0.0), target.clone()],
                    )?;
                    let written = set(ctx, scope, target, negated, "=")?;
                    finish(ctx, scope, prefix, written)
                }),
            ),
        ],
        &["Numeric"],
    );
    let mut integer_functions: Vec<(&str, Option<ProtocolDefault>)> = vec![
        ("init(exactly:)", None),
        ("init(truncatingIfNeeded:)", None),
        ("init(clamping:)", None),
        ("quotientAndRemainder(dividingBy:)", None),
        ("signum()", None),
        ("isSigned", None),
        ("~", None),
    ];
    for (op, update) in [
        ("/", "/="),
        ("%", "%="),
        ("+", "+="),
        ("-", "-="),
        ("*", "*="),
        ("&", "&="),
        ("|", "|="),
        ("^", "^="),
        (">>", ">>="),
        ("<<", "<<="),
    ] {
        integer_functions.push((op, None));
        integer_functions.push((update, update_method(op)));
    }
    add(
        "BinaryInteger",
        integer_functions,
        &["CustomStringConvertible", "Hashable", "Numeric", "Strideable"],
    );
    add(
        "SignedInteger",
        vec![("max", None), ("min", None), ("&+", None), ("&-", None)],
        &["BinaryInteger", "SignedNumeric"],
    );
    add(
        "UnsignedInteger",
        vec![("max", None), ("min", None), ("magnitude", None)],
        &["BinaryInteger", "SignedNumeric"],
    );
    let mut fixed_width: Vec<(&str, Option<ProtocolDefault>)> = vec![
        ("max", None),
        ("min", None),
        ("init(_:radix:)", None),
        (
            "init(bigEndian:)",
            adapted(&["value"], |ctx, scope, self_type, args| {
                get_property(ctx, scope, self_type, "byteSwapped", args)
            }),
        ),
        (
            "init(littleEndian:)",
            adapted(&["value"], |_, _, _, args| {
                let [value] = split(args);
                Ok(value)
            }),
        ),
        ("bigEndian", None),
        ("byteSwapped", None),
        ("leadingZeroBitCount", None),
        ("littleEndian", None),
        ("nonzeroBitCount", None),
        ("bitWidth", None),
        ("addingReportingOverflow(_:)", None),
        ("subtractingReportingOverflow(_:)", None),
        ("multipliedReportingOverflow(by:)", None),
        ("dividedReportingOverflow(by:)", None),
        ("remainderReportingOverflow(dividingBy:)", None),
    ];
    for (op, update) in [
        ("&*", "&*="),
        ("&+", "&+="),
        ("&-", "&-="),
        ("&<<", "&<<="),
        ("&>>", "&>>="),
    ] {
        fixed_width.push((op, None));
        fixed_width.push((update, update_method(op)));
    }
    add(
        "FixedWidthInteger",
        fixed_width,
        &["BinaryInteger", "LosslessStringConvertible"],
    );
    add(
        "FloatingPoint",
        vec![
            ("init(_:)", None),
            ("squareRoot()", None),
            ("+", None),
            ("-", None),
            ("*", None),
            ("/", None),
            ("/=", update_method("/")),
            ("==", None),
        ],
        &["Hashable", "SignedNumeric", "Strideable"],
    );
    add(
        "BinaryFloatingPoint",
        vec![("init(_:)", None), ("init(exactly:)", None)],
        &["ExpressibleByFloatLiteral", "FloatingPoint"],
    );
    add("IteratorProtocol", vec![("next()", None)], &[]);
    add(
        "Sequence",
        vec![("makeIterator()", None), ("reduce", None)],
        &[],
    );
    add(
        "Collection",
        vec![
            ("subscript(_:)", None),
            ("startIndex", None),
            ("endIndex", None),
            ("index(after:)", None),
            (
                "index(_:offsetBy:)",
                adapted(&["collection", "index", "distance"], |ctx, scope, self_type, args| {
                    offset_index(ctx, scope, self_type, args, false)
                }),
            ),
            (
                "index(_:offsetBy:limitedBy:)",
                adapted(
                    &["collection", "index", "distance", "limit"],
                    |ctx, scope, self_type, args| offset_index(ctx, scope, self_type, args, true),
                ),
            ),
            (
                "distance(from:to:)",
                adapted(&["collection", "start", "end"], |ctx, scope, self_type, args| {
                    distance_between(ctx, scope, self_type, args)
                }),
            ),
            (
                "count",
                adapted_property(&["collection"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["collection"])?;
                    let [collection] = split(args);
                    let start = get_property(
                        ctx,
                        scope,
                        self_type,
                        "startIndex",
                        vec![collection.clone()],
                    )?;
                    let end =
                        get_property(ctx, scope, self_type, "endIndex", vec![collection.clone()])?;
                    let result = call_method(
                        ctx,
                        scope,
                        self_type,
                        "distance(from:to:)",
                        vec![collection, start, end],
                    )?;
                    finish(ctx, scope, prefix, result)
                }),
            ),
            ("formIndex(after:)", form_index("index(after:)")),
            (
                "isEmpty",
                adapted_property(&["collection"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["collection"])?;
                    let [collection] = split(args);
                    let start = get_property(
                        ctx,
                        scope,
                        self_type,
                        "startIndex",
                        vec![collection.clone()],
                    )?;
                    let end = get_property(ctx, scope, self_type, "endIndex", vec![collection])?;
                    let result = binary(ctx, scope, "===", end, start)?;
                    finish(ctx, scope, prefix, result)
                }),
            ),
            (
                "first",
                adapted_property(&["collection"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["collection"])?;
                    let [collection] = split(args);
                    let element = element_type(self_type);
                    let empty =
                        get_property(ctx, scope, self_type, "isEmpty", vec![collection.clone()])?;
                    let start = get_property(
                        ctx,
                        scope,
                        self_type,
                        "startIndex",
                        vec![collection.clone()],
                    )?;
                    let item = get_property(
                        ctx,
                        scope,
                        self_type,
                        "subscript(_:)",
                        vec![collection, start],
                    )?;
                    let none = empty_optional(ctx, scope, &element)?;
                    let some = wrap_in_optional(ctx, scope, item, &element)?;
                    let result = conditional(ctx, scope, empty, none, some)?;
                    finish(ctx, scope, prefix, result)
                }),
            ),
            ("makeIterator()", None),
        ],
        &["Sequence"],
    );
    add(
        "BidirectionalCollection",
        vec![
            ("index(before:)", None),
            ("formIndex(before:)", form_index("index(before:)")),
        ],
        &["Collection"],
    );
    add(
        "Strideable",
        vec![
            ("+", None),
            ("+=", update_method("+")),
            ("-", None),
            ("-=", update_method("-")),
            ("==", None),
            ("...", None),
            (
                "distance(to:)",
                adapted(&["self", "other"], |ctx, scope, self_type, args| {
                    let (prefix, args) = reuse_args(ctx, scope, args, &["self", "other"])?;
                    let [this, other] = split(args);
                    let result = call_method(ctx, scope, self_type, "-", vec![other, this])?;
                    finish(ctx, scope, prefix, result)
                }),
            ),
            (
                "advanced(by:)",
                adapted(&["self", "n"], |ctx, scope, self_type, args| {
                    call_method(ctx, scope, self_type, "+", args)
                }),
            ),
        ],
        &["Comparable"],
    );
    add(
        "Hashable",
        vec![
            ("hashValue", None),
            (
                "hash(into:)",
                adapted(&["self", "hasher"], |ctx, scope, self_type, args| {
                    let [target, hasher] = split(args);
                    let hash = get_property(ctx, scope, self_type, "hashValue", vec![target])?;
                    let hasher_type = Value::Type(Type::name("Hasher"));
                    call_method(ctx, scope, &hasher_type, "combine(_:)", vec![hasher, hash])
                }),
            ),
        ],
        &["Equatable"],
    );
    add(
        "CustomStringConvertible",
        vec![("description", None)],
        &[],
    );
    add(
        "LosslessStringConvertible",
        vec![("init(_:)", None)],
        &["CustomStringConvertible"],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::printer::print_expr;
    use crate::reified::{
        build_conformances, fixed, FunctionMap, PossibleRepresentation, ReifiedType,
    };
    use crate::values::CallKind;

    fn context_with_number() -> Context {
        let mut ctx = Context::new();
        add_default_protocols(&mut ctx);
        let self_type = Value::Type(Type::name("Num"));
        let mut comparable = FunctionMap::new();
        comparable.insert(
            "<".into(),
            method(&["lhs", "rhs"], |ctx, scope, args| {
                let [lhs, rhs] = split(args);
                binary(ctx, scope, "<", lhs, rhs)
            }),
        );
        let conformances = build_conformances(&ctx, &self_type, vec![("Comparable", comparable)]);
        let reified = ReifiedType::primitive("Num", PossibleRepresentation::NUMBER, Value::num(0.0))
            .with_conformances(conformances);
        ctx.types.insert("Num".into(), fixed(reified));
        ctx
    }

    #[test]
    /// 要件のプロトコルが基底から順に並ぶ
    fn conformances_follow_requirements() {
        let ctx = context_with_number();
        let self_type = Value::Type(Type::name("Num"));
        let order: Vec<String> =
            build_conformances(&ctx, &self_type, vec![("Strideable", FunctionMap::new())])
                .into_iter()
                .map(|(name, _)| name)
                .collect();
        assert_eq!(order, vec!["Equatable", "Comparable", "Strideable"]);
    }

    #[test]
    /// 既定の distance(from:to:) は index(after:) で進めながら数える
    fn distance_counts_successors() {
        let mut ctx = context_with_number();
        let self_type = Value::Type(Type::name("Steps"));
        let mut collection = FunctionMap::new();
        collection.insert(
            "index(after:)".into(),
            method(&["collection", "index"], |ctx, scope, args| {
                let [_, index] = split(args);
                binary(ctx, scope, "+", index, Value::num(1.0))
            }),
        );
        let conformances = build_conformances(&ctx, &self_type, vec![("Collection", collection)]);
        let reified = ReifiedType::primitive("Steps", PossibleRepresentation::NUMBER, Value::num(0.0))
            .with_conformances(conformances);
        ctx.types.insert("Steps".into(), fixed(reified));
        let root = ctx.root();
        let args = vec![Value::ident("c"), Value::ident("s"), Value::ident("e")];
        let value = call_method(&mut ctx, root, &self_type, "distance(from:to:)", args)
            .expect("distance");
        let text = match value {
            Value::Statements(stmts) => crate::js::printer::print_stmts(&stmts),
            other => panic!("unexpected {:?}", other),
        };
        assert!(text.contains("while (current !== e) {"), "{}", text);
        assert!(text.contains("count = count + 1;"), "{}", text);
        assert!(text.contains("current = current + 1;"), "{}", text);
        assert!(text.ends_with("return count;\n"), "{}", text);
    }

    #[test]
    /// `>` は `<` の引数を入れ替えて導かれる
    fn greater_than_from_less_than() {
        let mut ctx = context_with_number();
        let root = ctx.root();
        let parent = Value::Type(Type::name("Num"));
        let value = call_method(
            &mut ctx,
            root,
            &parent,
            ">",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("call");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "b < a");
        let value = call_method(
            &mut ctx,
            root,
            &parent,
            ">=",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("call");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "!(a < b)");
    }

    #[test]
    /// 要件だけの関数は既定実装を持たない
    fn requirements_have_no_default() {
        let ctx = context_with_number();
        let equatable = ctx.protocols.get("Equatable").expect("Equatable");
        let equal = equatable
            .functions
            .iter()
            .find(|(name, _)| name == "==")
            .expect("==");
        assert!(equal.1.is_none());
        let entry = FunctionEntry::Plain(Rc::new(|_, _, _, _| Ok(Value::unit())));
        assert!(entry.builder(CallKind::Call, "==").is_ok());
    }
}
