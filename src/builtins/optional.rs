// パス: src/builtins/optional.rs
// 役割: Optional の表現（null との合併か、0/1 要素の配列か）と、その生成・判定・取り出し
// 意図: 包む型が null を取りうる場合（入れ子の Optional など）でも none と some(nil) を区別する
// 関連ファイル: src/builtins/mod.rs, src/builtins/protocols.rs, src/builtins/globals.rs
//! Optional
//!
//! | 包む型           | none   | some(v) |
//! |------------------|--------|---------|
//! | null を取らない  | `null` | `v`     |
//! | null を取りうる  | `[]`   | `[v]`   |
//! | 実行時の型 `T`   | `T.$rep & 128` で上のどちらかを選ぶ |

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::js::Expr;
use crate::reified::{
    build_conformances, constructor, expression_skips_copy, reify_type, Dispatch, FunctionMap,
    PossibleRepresentation, ReifiedType, TypeConstructor, REP_KEY,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    array, binary, conditional, expr, logical, member, read, reuse, Value,
};

use super::common::{
    call_method, directly_comparable, finish, method, reuse_args, split, todo_entry,
};

/// Optional の実行時表現。
#[derive(Clone, Debug)]
pub enum Encoding {
    Null,
    Array,
    Runtime(Expr),
}

/// 包む型から表現を選ぶ。
pub fn encoding(ctx: &mut Context, scope: ScopeId, wrapped: &Type) -> CResult<Encoding> {
    let reified = reify_type(ctx, scope, wrapped)?;
    Ok(match &reified.dispatch {
        Dispatch::Runtime(table) => Encoding::Runtime(table.clone()),
        _ if reified
            .representations
            .intersects(PossibleRepresentation::NULL) =>
        {
            Encoding::Array
        }
        _ => Encoding::Null,
    })
}

/// `T.$rep & 128`
fn runtime_uses_array(table: &Expr) -> Value {
    expr(Expr::binary(
        "&",
        Expr::member(table.clone(), REP_KEY),
        Expr::num(PossibleRepresentation::NULL.0 as f64),
    ))
}

fn select(
    ctx: &mut Context,
    scope: ScopeId,
    encoding: &Encoding,
    null: Value,
    nested: Value,
) -> CResult<Value> {
    match encoding {
        Encoding::Null => Ok(null),
        Encoding::Array => Ok(nested),
        Encoding::Runtime(table) => {
            let test = runtime_uses_array(table);
            conditional(ctx, scope, test, nested, null)
        }
    }
}

pub fn empty_optional(ctx: &mut Context, scope: ScopeId, wrapped: &Type) -> CResult<Value> {
    let encoding = encoding(ctx, scope, wrapped)?;
    select(
        ctx,
        scope,
        &encoding,
        Value::null(),
        expr(Expr::Array(Vec::new())),
    )
}

pub fn wrap_in_optional(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    wrapped: &Type,
) -> CResult<Value> {
    match encoding(ctx, scope, wrapped)? {
        Encoding::Null => Ok(value),
        Encoding::Array => array(ctx, scope, vec![value]),
        encoding @ Encoding::Runtime(_) => {
            let (prefix, values) = reuse_args(ctx, scope, vec![value], &["value"])?;
            let [value] = split(values);
            let nested = array(ctx, scope, vec![value.clone()])?;
            let result = select(ctx, scope, &encoding, value, nested)?;
            finish(ctx, scope, prefix, result)
        }
    }
}

pub fn unwrap_optional(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    wrapped: &Type,
) -> CResult<Value> {
    match encoding(ctx, scope, wrapped)? {
        Encoding::Null => Ok(value),
        Encoding::Array => member(ctx, scope, value, Value::num(0.0)),
        encoding @ Encoding::Runtime(_) => {
            let (prefix, values) = reuse_args(ctx, scope, vec![value], &["value"])?;
            let [value] = split(values);
            let nested = member(ctx, scope, value.clone(), Value::num(0.0))?;
            let result = select(ctx, scope, &encoding, value, nested)?;
            finish(ctx, scope, prefix, result)
        }
    }
}

fn presence(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    wrapped: &Type,
    none: bool,
) -> CResult<Value> {
    let op = if none { "===" } else { "!==" };
    let encoding = encoding(ctx, scope, wrapped)?;
    let (prefix, values) = match encoding {
        Encoding::Runtime(_) => reuse_args(ctx, scope, vec![value], &["value"])?,
        _ => (Vec::new(), vec![value]),
    };
    let [value] = split(values);
    let null = match encoding {
        Encoding::Array => Value::undefined(),
        _ => binary(ctx, scope, op, value.clone(), Value::null())?,
    };
    let nested = match encoding {
        Encoding::Null => Value::undefined(),
        _ => {
            let length = crate::values::field(ctx, scope, value, "length")?;
            binary(ctx, scope, op, length, Value::num(0.0))?
        }
    };
    let result = select(ctx, scope, &encoding, null, nested)?;
    finish(ctx, scope, prefix, result)
}

pub fn optional_is_none(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    wrapped: &Type,
) -> CResult<Value> {
    presence(ctx, scope, value, wrapped, true)
}

pub fn optional_is_some(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    wrapped: &Type,
) -> CResult<Value> {
    presence(ctx, scope, value, wrapped, false)
}

/// `lhs == rhs`（`equal` が false なら `!=`）。
fn compare(
    ctx: &mut Context,
    scope: ScopeId,
    wrapped: &Type,
    args: Vec<Value>,
    equal: bool,
) -> CResult<Value> {
    let inner = reify_type(ctx, scope, wrapped)?;
    let same_encoding = matches!(encoding(ctx, scope, wrapped)?, Encoding::Null);
    if same_encoding && directly_comparable(inner.representations) {
        let [lhs, rhs] = split(args);
        return binary(ctx, scope, if equal { "===" } else { "!==" }, lhs, rhs);
    }
    let (prefix, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
    let [lhs, rhs] = split(args);
    let lhs_none = optional_is_none(ctx, scope, lhs.clone(), wrapped)?;
    let rhs_none = optional_is_none(ctx, scope, rhs.clone(), wrapped)?;
    let rhs_some = optional_is_some(ctx, scope, rhs.clone(), wrapped)?;
    let left = unwrap_optional(ctx, scope, lhs, wrapped)?;
    let right = unwrap_optional(ctx, scope, rhs, wrapped)?;
    let parent = Value::Type(wrapped.clone());
    let result = if equal {
        let inner_equal = call_method(ctx, scope, &parent, "==", vec![left, right])?;
        let both = logical(ctx, scope, "&&", rhs_some, inner_equal)?;
        conditional(ctx, scope, lhs_none, rhs_none, both)?
    } else {
        let inner_unequal = call_method(ctx, scope, &parent, "!=", vec![left, right])?;
        let either = logical(ctx, scope, "||", rhs_none, inner_unequal)?;
        conditional(ctx, scope, lhs_none, rhs_some, either)?
    };
    finish(ctx, scope, prefix, result)
}

fn optional_type(ctx: &mut Context, scope: ScopeId, wrapped: Type) -> CResult<Rc<ReifiedType>> {
    let inner = reify_type(ctx, scope, &wrapped)?;
    let encoding = encoding(ctx, scope, &wrapped)?;
    let representations = match &encoding {
        Encoding::Null => inner.representations | PossibleRepresentation::NULL,
        Encoding::Array => PossibleRepresentation::ARRAY,
        Encoding::Runtime(_) => PossibleRepresentation::ALL,
    };
    let name = Type::optional(wrapped.clone()).stringify();
    let self_type = Value::Type(Type::optional(wrapped.clone()));

    let mut functions = FunctionMap::new();
    let ty = wrapped.clone();
    functions.insert(
        "none".into(),
        method(&[], move |ctx, scope, _| empty_optional(ctx, scope, &ty)),
    );
    let ty = wrapped.clone();
    functions.insert(
        "some".into(),
        method(&["wrapped"], move |ctx, scope, args| {
            let [value] = split(args);
            wrap_in_optional(ctx, scope, value, &ty)
        }),
    );
    functions.insert("flatMap".into(), todo_entry());
    functions.insert("map".into(), todo_entry());

    let mut nil_literal = FunctionMap::new();
    let ty = wrapped.clone();
    nil_literal.insert(
        "init(nilLiteral:)".into(),
        method(&[], move |ctx, scope, _| empty_optional(ctx, scope, &ty)),
    );
    let mut equatable = FunctionMap::new();
    let ty = wrapped.clone();
    equatable.insert(
        "==".into(),
        method(&["lhs", "rhs"], move |ctx, scope, args| {
            compare(ctx, scope, &ty, args, true)
        }),
    );
    let ty = wrapped.clone();
    equatable.insert(
        "!=".into(),
        method(&["lhs", "rhs"], move |ctx, scope, args| {
            compare(ctx, scope, &ty, args, false)
        }),
    );
    let conformances = build_conformances(
        ctx,
        &self_type,
        vec![
            ("ExpressibleByNilLiteral", nil_literal),
            ("Equatable", equatable),
        ],
    );

    let ty = wrapped.clone();
    let mut reified = ReifiedType::new(name, representations)
        .with_functions(functions)
        .with_conformances(conformances)
        .with_default(move |ctx, scope, _| empty_optional(ctx, scope, &ty));
    let inner_copy = inner.copy.clone();
    let array_encoded = !matches!(encoding, Encoding::Null);
    if inner_copy.is_some() || array_encoded {
        let ty = wrapped;
        reified = reified.with_copy(move |ctx, scope, value| {
            let e = read(ctx, scope, value)?;
            if expression_skips_copy(&e) {
                return Ok(expr(e));
            }
            let copier = match &inner_copy {
                Some(copier) => copier.clone(),
                // 中身のコピーが不要なら配列の表現だけを複製する
                None => return Ok(expr(Expr::call(Expr::member(e, "slice"), Vec::new()))),
            };
            let (first, after) = reuse(ctx, scope, expr(e), "copyValue")?;
            let none = optional_is_none(ctx, scope, first, &ty)?;
            let empty = empty_optional(ctx, scope, &ty)?;
            let unwrapped = unwrap_optional(ctx, scope, after, &ty)?;
            let copied = copier(ctx, scope, unwrapped)?;
            let some = wrap_in_optional(ctx, scope, copied, &ty)?;
            conditional(ctx, scope, none, empty, some)
        });
    }
    Ok(Rc::new(reified))
}

/// `Optional<Wrapped>` の型構築子。
pub fn optional_constructor() -> Rc<dyn TypeConstructor> {
    constructor(|ctx, scope, args| {
        let wrapped = args.first().cloned().unwrap_or_else(Type::void);
        optional_type(ctx, scope, wrapped)
    })
}

/// `_OptionalNilComparisonType`（`x == nil` の右辺）。
pub fn nil_comparison_type() -> ReifiedType {
    let mut functions = FunctionMap::new();
    functions.insert(
        "init(nilLiteral:)".into(),
        method(&[], |_, _, _| Ok(Value::null())),
    );
    ReifiedType::primitive(
        "_OptionalNilComparisonType",
        PossibleRepresentation::NULL,
        Value::null(),
    )
    .with_functions(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::print_expr;

    fn show(ctx: &mut Context, value: Value) -> String {
        let root = ctx.root();
        let e = read(ctx, root, value).expect("read");
        print_expr(&e)
    }

    #[test]
    /// null を取らない型は null との合併で表す
    fn simple_optional_uses_null() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let int = Type::name("Int");
        let none = empty_optional(&mut ctx, root, &int).expect("none");
        assert_eq!(show(&mut ctx, none), "null");
        let some = wrap_in_optional(&mut ctx, root, Value::ident("x"), &int).expect("some");
        assert_eq!(show(&mut ctx, some), "x");
        let test = optional_is_some(&mut ctx, root, Value::ident("x"), &int).expect("test");
        assert_eq!(show(&mut ctx, test), "x !== null");
    }

    #[test]
    /// 入れ子の Optional は配列で表す
    fn nested_optional_uses_array() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let inner = Type::optional(Type::name("Int"));
        let none = empty_optional(&mut ctx, root, &inner).expect("none");
        assert_eq!(show(&mut ctx, none), "[]");
        let some = wrap_in_optional(&mut ctx, root, Value::null(), &inner).expect("some");
        assert_eq!(show(&mut ctx, some), "[null]");
        let test = optional_is_none(&mut ctx, root, Value::ident("x"), &inner).expect("test");
        assert_eq!(show(&mut ctx, test), "x.length === 0");
        let value = unwrap_optional(&mut ctx, root, Value::ident("x"), &inner).expect("unwrap");
        assert_eq!(show(&mut ctx, value), "x[0]");
    }

    #[test]
    /// 実行時の型は witness table の表現ビットで表現を選ぶ
    fn runtime_optional_checks_rep() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        ctx.map_value(root, "T", Value::ident("T"));
        let t = Type::name("T");
        let none = empty_optional(&mut ctx, root, &t).expect("none");
        assert_eq!(show(&mut ctx, none), "T.$rep & 128 ? [] : null");
    }

    #[test]
    /// 直接比較できる型の Optional は === で比べる
    fn optional_equality_is_strict() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = Value::Type(Type::optional(Type::name("Int")));
        let value = call_method(
            &mut ctx,
            root,
            &parent,
            "==",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("==");
        assert_eq!(show(&mut ctx, value), "a === b");
    }
}
