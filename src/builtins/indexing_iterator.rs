// パス: src/builtins/indexing_iterator.rs
// 役割: IndexingIterator<Elements> の型構築子
// 意図: コレクションと現在位置の組 `{ elements, position }` で反復子を表す
// 関連ファイル: src/builtins/array.rs, src/builtins/closed_range.rs, src/builtins/optional.rs
//! 添字による反復子
//!
//! `next()` は `position === endIndex` で none を返し、そうでなければ
//! 要素を読んでから `position` を進める。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::js::{Expr, Property};
use crate::reified::{
    build_conformances, constructor, FunctionMap, PossibleRepresentation, ReifiedType,
    TypeConstructor,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    binary, call_expression, conditional, expr, field, member, read, reuse, transform_all, Value,
};

use super::common::{get_property, method, split, unbox};
use super::optional::{empty_optional, wrap_in_optional};

/// `{ elements: elements, position: position }`
pub fn make_indexing_iterator(
    ctx: &mut Context,
    scope: ScopeId,
    elements: Value,
    position: Value,
) -> CResult<Value> {
    transform_all(ctx, scope, vec![elements, position], &mut |_, _, mut exprs| {
        let position = exprs.pop().unwrap_or_else(Expr::undefined);
        let elements = exprs.pop().unwrap_or_else(Expr::undefined);
        Ok(expr(Expr::Object(vec![
            Property::field("elements", elements),
            Property::field("position", position),
        ])))
    })
}

/// コレクションの要素型。配列と範囲は型引数から直接求める。
fn element_of(elements: &Type) -> Type {
    match elements {
        Type::Array(inner) => (**inner).clone(),
        Type::Generic { base, arguments }
            if matches!(base.as_ref(), Type::Name(n) if n == "ClosedRange") =>
        {
            arguments.first().cloned().unwrap_or_else(Type::void)
        }
        other => Type::Namespaced {
            namespace: Box::new(other.clone()),
            ty: Box::new(Type::name("Element")),
        },
    }
}

/// `next()` の本体。
fn advance(
    ctx: &mut Context,
    scope: ScopeId,
    elements_type: &Type,
    iterator: Value,
) -> CResult<Value> {
    let (first, iterator) = reuse(ctx, scope, unbox(iterator), "iterator")?;
    let parent = Value::Type(elements_type.clone());
    let element = element_of(elements_type);
    let position = field(ctx, scope, first, "position")?;
    let collection = field(ctx, scope, iterator.clone(), "elements")?;
    let end = get_property(ctx, scope, &parent, "endIndex", vec![collection])?;
    let done = binary(ctx, scope, "===", position, end)?;

    // 位置を読んでから進める（`position++`）
    let collection = field(ctx, scope, iterator.clone(), "elements")?;
    let index = field(ctx, scope, iterator, "position")?;
    let index = read(ctx, scope, index)?;
    let index = expr(Expr::update("++", false, index));
    let item = match elements_type {
        // 配列は endIndex との比較で範囲内が保証されるので添字を直接読む
        Type::Array(_) => member(ctx, scope, collection, index)?,
        _ => get_property(ctx, scope, &parent, "subscript(_:)", vec![collection, index])?,
    };
    let none = empty_optional(ctx, scope, &element)?;
    let some = wrap_in_optional(ctx, scope, item, &element)?;
    conditional(ctx, scope, done, none, some)
}

fn indexing_iterator_type(ctx: &mut Context, elements_type: Type) -> CResult<Rc<ReifiedType>> {
    let self_type = Type::generic(Type::name("IndexingIterator"), vec![elements_type.clone()]);
    let mut functions = FunctionMap::new();
    let start_type = elements_type.clone();
    functions.insert(
        "init(_elements:)".into(),
        method(&["elements"], move |ctx, scope, args| {
            let [elements] = split(args);
            let (first, after) = reuse(ctx, scope, elements, "elements")?;
            let parent = Value::Type(start_type.clone());
            let start = get_property(ctx, scope, &parent, "startIndex", vec![after])?;
            make_indexing_iterator(ctx, scope, first, start)
        }),
    );
    functions.insert(
        "init(_elements:_position:)".into(),
        method(&["elements", "position"], |ctx, scope, args| {
            let [elements, position] = split(args);
            make_indexing_iterator(ctx, scope, elements, position)
        }),
    );
    let mut iterator = FunctionMap::new();
    let next_type = elements_type.clone();
    iterator.insert(
        "next()".into(),
        method(&["iterator"], move |ctx, scope, args| {
            let [it] = split(args);
            advance(ctx, scope, &next_type, it)
        }),
    );
    let conformances = build_conformances(
        ctx,
        &Value::Type(self_type.clone()),
        vec![("IteratorProtocol", iterator)],
    );
    let element = element_of(&elements_type);
    let reified = ReifiedType::new(self_type.stringify(), PossibleRepresentation::OBJECT)
        .with_functions(functions)
        .with_conformances(conformances)
        .with_copy(|ctx, scope, value| {
            call_expression(
                ctx,
                scope,
                Expr::member(Expr::ident("Object"), "assign"),
                vec![expr(Expr::Object(Vec::new())), value],
            )
        })
        .with_inner_type(
            "Element",
            constructor(move |ctx, scope, _| crate::reified::reify_type(ctx, scope, &element)),
        );
    Ok(Rc::new(reified))
}

/// `IndexingIterator<Elements>` の型構築子。
pub fn indexing_iterator_constructor() -> Rc<dyn TypeConstructor> {
    constructor(|ctx, _scope, args| {
        let elements = args.first().cloned().unwrap_or_else(Type::void);
        indexing_iterator_type(ctx, elements)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::call_method;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::print_expr;

    fn iterator_of(elements: Type) -> Value {
        Value::Type(Type::generic(Type::name("IndexingIterator"), vec![elements]))
    }

    #[test]
    /// 配列の反復子は endIndex と比べてから添字を直接読む
    fn array_iterator_next() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = iterator_of(Type::array(Type::name("Int")));
        let boxed = Value::boxed(Value::ident("it"), Type::void());
        let next = call_method(&mut ctx, root, &parent, "next()", vec![boxed]).expect("next");
        let e = read(&mut ctx, root, next).expect("read");
        assert_eq!(
            print_expr(&e),
            "it.position === it.elements.length ? null : it.elements[it.position++]"
        );
    }

    #[test]
    /// 初期位置はコレクションの startIndex
    fn init_starts_at_start_index() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = iterator_of(Type::array(Type::name("Int")));
        let value =
            call_method(&mut ctx, root, &parent, "init(_elements:)", vec![Value::ident("a")])
                .expect("init");
        let e = read(&mut ctx, root, value).expect("read");
        let text = print_expr(&e);
        assert!(text.contains("elements: a,"));
        assert!(text.contains("position: 0"));
    }
}
