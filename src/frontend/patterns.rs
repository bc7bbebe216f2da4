// パス: src/frontend/patterns.rs
// 役割: Swift のパターン（let/var 束縛・タプル・enum 要素・Optional）を判定式と前置き文に分解する
// 意図: if/guard/switch/束縛宣言が同じ分解結果を使って条件連鎖を組み立てられるようにする
// 関連ファイル: src/frontend/mod.rs, src/frontend/exprs.rs, src/builtins/optional.rs
//! パターン
//!
//! 一つのパターンは `PatternOutput { prefix, test, next }` の連鎖になる。
//! `next` は `test` が真になった後でしか評価できない部分（enum の中身や Optional の中身）。
//!
//! 束縛は二通りに出力する。
//! - 巻き上げあり（if・guard・switch・`pattern` 項）: スコープ先頭に `let x;` を置き、前置きでは代入する。
//! - 巻き上げなし（`pattern_binding_decl`）: その場で `const x = ...;` を宣言する。

use crate::ast::declaration::parse_declaration;
use crate::ast::Term;
use crate::builtins::optional::{optional_is_some, unwrap_optional};
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::bind_constant;
use crate::js::{Expr, Stmt};
use crate::reified::{reify_type, store_value, PossibleRepresentation};
use crate::scope::{DeclarationFlags, ScopeId};
use crate::types::Type;
use crate::values::{
    binary, copy, expr, logical, member, read, reuse, set, statements, transform, Value,
};

use super::exprs::translate_value;

/// パターンの分解結果。
pub(crate) struct PatternOutput {
    pub prefix: Vec<Stmt>,
    pub test: Value,
    pub next: Option<Box<PatternOutput>>,
}

impl PatternOutput {
    /// 常に成り立つ空のパターン。
    pub fn empty() -> Self {
        Self {
            prefix: Vec::new(),
            test: Value::boolean(true),
            next: None,
        }
    }

    fn with_test(test: Value) -> Self {
        Self {
            prefix: Vec::new(),
            test,
            next: None,
        }
    }
}

pub(crate) fn is_true_expression(e: &Expr) -> bool {
    matches!(e, Expr::Bool(true))
}

/// 隣り合う同じ種類の変数宣言を一つにまとめる。
pub(crate) fn merge_declarations(body: Vec<Stmt>) -> Vec<Stmt> {
    let mut out: Vec<Stmt> = Vec::with_capacity(body.len());
    for stmt in body {
        if let (
            Some(Stmt::Var {
                kind: previous,
                decls: existing,
            }),
            Stmt::Var { kind, decls },
        ) = (out.last_mut(), &stmt)
        {
            if previous == kind {
                existing.extend(decls.iter().cloned());
                continue;
            }
        }
        out.push(stmt);
    }
    out
}

fn merge_next(
    ctx: &mut Context,
    scope: ScopeId,
    first: Option<Box<PatternOutput>>,
    second: Option<Box<PatternOutput>>,
) -> CResult<Option<Box<PatternOutput>>> {
    Ok(match (first, second) {
        (Some(a), Some(b)) => Some(Box::new(merge_patterns(ctx, scope, *a, *b)?)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    })
}

/// 二つのパターンを `&&` で連結する。
pub(crate) fn merge_patterns(
    ctx: &mut Context,
    scope: ScopeId,
    first: PatternOutput,
    second: PatternOutput,
) -> CResult<PatternOutput> {
    let mut prefix = first.prefix;
    prefix.extend(second.prefix);
    let prefix = merge_declarations(prefix);
    let next = merge_next(ctx, scope, first.next, second.next)?;
    let first_test = read(ctx, scope, first.test)?;
    if is_true_expression(&first_test) {
        return Ok(PatternOutput {
            prefix,
            test: second.test,
            next,
        });
    }
    let second_test = read(ctx, scope, second.test)?;
    if is_true_expression(&second_test) {
        return Ok(PatternOutput {
            prefix,
            test: expr(first_test),
            next,
        });
    }
    let test = logical(ctx, scope, "&&", expr(first_test), expr(second_test))?;
    Ok(PatternOutput { prefix, test, next })
}

/// 値をそのまま判定とするパターンにする。末尾の `return` だけが値。
pub(crate) fn convert_to_pattern(value: Value) -> PatternOutput {
    match value {
        Value::Copied { value, ty } => {
            let inner = convert_to_pattern(*value);
            PatternOutput {
                prefix: inner.prefix,
                test: copy(inner.test, ty),
                next: None,
            }
        }
        Value::Statements(mut stmts) => {
            let returning = stmts.iter().position(|s| matches!(s, Stmt::Return(_)));
            match returning {
                Some(i) if i + 1 == stmts.len() => {
                    let tail = match stmts.pop() {
                        Some(Stmt::Return(Some(e))) => expr(e),
                        _ => Value::undefined(),
                    };
                    PatternOutput {
                        prefix: stmts,
                        test: tail,
                        next: None,
                    }
                }
                None => PatternOutput {
                    prefix: stmts,
                    test: Value::undefined(),
                    next: None,
                },
                Some(_) => PatternOutput::with_test(Value::Statements(stmts)),
            }
        }
        other => PatternOutput::with_test(other),
    }
}

/// パターン連鎖を一つの真偽値にする（`pattern` 項用）。
pub(crate) fn value_for_pattern(
    ctx: &mut Context,
    scope: ScopeId,
    pattern: PatternOutput,
) -> CResult<Value> {
    let test = match pattern.next {
        Some(next) => {
            let rest = value_for_pattern(ctx, scope, *next)?;
            logical(ctx, scope, "&&", pattern.test, rest)?
        }
        None => pattern.test,
    };
    if pattern.prefix.is_empty() {
        return Ok(test);
    }
    let mut stmts = pattern.prefix;
    let tail = read(ctx, scope, test)?;
    stmts.push(Stmt::ret(tail));
    Ok(statements(stmts))
}

/// 平坦化したパターン。`suffix` は判定が真の分岐の先頭で実行する。
pub(crate) struct FlatPattern {
    pub prefix: Vec<Stmt>,
    pub test: Expr,
    pub suffix: Vec<Stmt>,
}

/// 最初の自明でない判定までの前置きを外へ出し、残りは判定式の中に畳み込む。
pub(crate) fn flatten_pattern(
    ctx: &mut Context,
    scope: ScopeId,
    pattern: PatternOutput,
) -> CResult<FlatPattern> {
    let mut prefix = Vec::new();
    let mut test = Value::boolean(true);
    let mut current = Some(Box::new(pattern));
    while let Some(pattern) = current.take() {
        prefix.extend(pattern.prefix);
        let current_test = read(ctx, scope, pattern.test)?;
        current = pattern.next;
        if !is_true_expression(&current_test) {
            test = expr(current_test);
            break;
        }
    }
    let mut suffix = Vec::new();
    while let Some(pattern) = current.take() {
        suffix.extend(pattern.prefix);
        let current_test = read(ctx, scope, pattern.test)?;
        current = pattern.next;
        if !is_true_expression(&current_test) {
            let mut body = std::mem::take(&mut suffix);
            body.push(Stmt::ret(current_test));
            test = logical(ctx, scope, "&&", test, statements(body))?;
        }
    }
    Ok(FlatPattern {
        prefix,
        test: read(ctx, scope, test)?,
        suffix,
    })
}

/// `Barcode.upc` のような判別子フラグから case 名を取り出す。
fn discriminant_for_pattern(term: &Term) -> CResult<String> {
    use crate::ast::Property;
    let from_flags = term.properties.iter().find_map(|(key, value)| match value {
        Property::Flag(true) => key.split_once('.').map(|(_, case)| case.to_string()),
        _ => None,
    });
    let found = from_flags.or_else(|| {
        term.args
            .iter()
            .find_map(|a| a.split_once('.').map(|(_, case)| case.to_string()))
    });
    if let Some(found) = found {
        return Ok(found);
    }
    match term.string("element") {
        Some(decl) => Ok(parse_declaration(decl)?.member.unwrap_or_default()),
        None => Err(CompileError::new(
            "TRM020",
            "Expected to have a discriminant property",
        )),
    }
}

fn unwrap_copies(value: &Value) -> &Value {
    match value {
        Value::Copied { value, .. } => unwrap_copies(value),
        other => other,
    }
}

/// 名前の束縛。既存の変数なら格納し、そうでなければ宣言する。
fn bind_name(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    value: Value,
    flags: DeclarationFlags,
    hoist: bool,
) -> CResult<PatternOutput> {
    let name = term
        .args
        .first()
        .ok_or_else(|| CompileError::new("TRM021", "pattern_named without a name"))?
        .clone();
    let ty = term.ty()?;
    if ctx.has_variable(scope, &name) {
        let target = ctx.lookup(scope, &name);
        let stored = store_value(ctx, scope, target, value, &ty)?;
        return Ok(PatternOutput {
            prefix: crate::values::ignore(ctx, scope, stored)?,
            test: Value::boolean(true),
            next: None,
        });
    }
    let pattern = convert_to_pattern(copy(value, ty));
    let mut prefix = pattern.prefix;
    if ctx.scope(scope).mapping.contains_key(&name) {
        let target = ctx.lookup(scope, &name);
        let assigned = set(ctx, scope, target, pattern.test, "=")?;
        prefix.extend(crate::values::ignore(ctx, scope, assigned)?);
    } else if hoist {
        let declared = ctx.add_variable(scope, &name, None, flags)?;
        let ident = match ctx.lookup(scope, &name) {
            Value::Direct(Expr::Ident(ident)) => ident,
            _ => crate::scope::mangle_name(&name),
        };
        if let Some(stmt) = declared.into_iter().next() {
            ctx.set_declaration(scope, &ident, stmt);
        }
        let assigned = set(ctx, scope, Value::ident(ident), pattern.test, "=")?;
        prefix.extend(crate::values::ignore(ctx, scope, assigned)?);
    } else {
        prefix.extend(ctx.add_variable(scope, &name, Some(pattern.test), flags)?);
    }
    Ok(PatternOutput {
        prefix,
        test: Value::boolean(true),
        next: None,
    })
}

fn expect_single_child(term: &Term) -> CResult<&Term> {
    term.expect_children(1, 1)?;
    term.child(0)
}

/// パターン項を分解する。
pub(crate) fn translate_pattern(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    value: Value,
    flags: DeclarationFlags,
    hoist: bool,
) -> CResult<PatternOutput> {
    match term.name.as_str() {
        "pattern_optional_some" => {
            let child = expect_single_child(term)?;
            let wrapped = match term.ty() {
                Ok(Type::Optional(inner)) => *inner,
                _ => child.ty()?,
            };
            let (first, after) = reuse(ctx, scope, value, "optional")?;
            let test = optional_is_some(ctx, scope, first, &wrapped)?;
            let inner = unwrap_optional(ctx, scope, after, &wrapped)?;
            let next = translate_pattern(ctx, scope, child, inner, flags, hoist)?;
            Ok(PatternOutput {
                prefix: Vec::new(),
                test,
                next: Some(Box::new(next)),
            })
        }
        "case_label_item" | "pattern_paren" => {
            let child = term.child(0)?;
            translate_pattern(ctx, scope, child, value, flags, hoist)
        }
        "pattern_let" => {
            let child = expect_single_child(term)?;
            let value = match term.ty() {
                Ok(ty) => copy(value, ty),
                Err(_) => value,
            };
            translate_pattern(ctx, scope, child, value, flags | DeclarationFlags::CONST, hoist)
        }
        "pattern_var" => {
            let child = expect_single_child(term)?;
            let value = match term.ty() {
                Ok(ty) => copy(value, ty),
                Err(_) => value,
            };
            let flags = flags.without(DeclarationFlags::CONST);
            translate_pattern(ctx, scope, child, value, flags, hoist)
        }
        "pattern_expr" => {
            let child = expect_single_child(term)?;
            let test = translate_value(ctx, scope, child, &mut None)?;
            Ok(PatternOutput::with_test(test))
        }
        "pattern_typed" => translate_pattern(ctx, scope, term.child(0)?, value, flags, hoist),
        "pattern_named" => bind_name(ctx, scope, term, value, flags, hoist),
        "pattern_tuple" => {
            let ty = term.ty()?;
            if !matches!(ty, Type::Tuple(_)) {
                return Err(CompileError::new(
                    "TRM022",
                    format!("Expected a tuple, got a {}", ty.stringify()),
                ));
            }
            if let Value::Tuple(items) = unwrap_copies(&value) {
                let items = items.clone();
                let mut merged = PatternOutput::empty();
                for (i, child) in term.children.iter().enumerate() {
                    let item = items.get(i).cloned().ok_or_else(|| {
                        CompileError::new("TRM023", format!("Tuple has no element {}", i))
                    })?;
                    let child_pattern = translate_pattern(ctx, scope, child, item, flags, hoist)?;
                    merged = merge_patterns(ctx, scope, merged, child_pattern)?;
                }
                return Ok(merged);
            }
            let mut prefix = Vec::new();
            let source = match value {
                direct @ Value::Direct(_) => direct,
                other => bind_constant(ctx, scope, "tuple", other, &mut prefix)?,
            };
            let mut merged = PatternOutput {
                prefix,
                test: Value::boolean(true),
                next: None,
            };
            for (i, child) in term.children.iter().enumerate() {
                let element = member(ctx, scope, source.clone(), Value::num(i as f64))?;
                let child_pattern = translate_pattern(ctx, scope, child, element, flags, hoist)?;
                merged = merge_patterns(ctx, scope, merged, child_pattern)?;
            }
            Ok(merged)
        }
        "pattern_enum_element" => translate_enum_element(ctx, scope, term, value, flags, hoist),
        "pattern_any" => Ok(PatternOutput::empty()),
        other => Err(CompileError::new(
            "TRM024",
            format!("Unknown pattern type {}", other),
        )),
    }
}

fn translate_enum_element(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    value: Value,
    flags: DeclarationFlags,
    hoist: bool,
) -> CResult<PatternOutput> {
    let ty = term.ty()?;
    let reified = reify_type(ctx, scope, &ty)?;
    if reified.cases.is_empty() {
        return Err(CompileError::new(
            "TRM025",
            format!("Expected {} to be an enum, but it didn't have any cases", ty),
        ));
    }
    let discriminant = discriminant_for_pattern(term)?;
    let index = reified
        .cases
        .iter()
        .position(|c| c.name == discriminant)
        .ok_or_else(|| {
            CompileError::new(
                "TRM026",
                format!(
                    "Could not find the {} case in {}, only found {}",
                    discriminant,
                    ty,
                    reified
                        .cases
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
        })?;
    let direct = reified.representations != PossibleRepresentation::ARRAY;
    let (first, after) = reuse(ctx, scope, value, "enum")?;
    let tag = if direct {
        first
    } else {
        member(ctx, scope, first, Value::num(0.0))?
    };
    let test = binary(ctx, scope, "===", tag, Value::num(index as f64))?;
    term.expect_children(0, 1)?;
    let child = match term.children.first() {
        Some(child) => child,
        None => return Ok(PatternOutput::with_test(test)),
    };
    let field_count = reified.cases[index].field_types.len();
    let next = match field_count {
        0 => {
            return Err(CompileError::new(
                "TRM027",
                "Tried to use a pattern on an enum case that has no fields",
            ))
        }
        1 => {
            let payload = member(ctx, scope, after, Value::num(1.0))?;
            let inner = if child.name == "pattern_paren" {
                child.child(0)?
            } else {
                child
            };
            translate_pattern(ctx, scope, inner, payload, flags, hoist)?
        }
        _ if child.name == "pattern_tuple" => {
            let mut merged = PatternOutput::empty();
            for (i, element) in child.children.iter().enumerate() {
                let payload = member(ctx, scope, after.clone(), Value::num((i + 1) as f64))?;
                let child_pattern = translate_pattern(ctx, scope, element, payload, flags, hoist)?;
                merged = merge_patterns(ctx, scope, merged, child_pattern)?;
            }
            merged
        }
        _ => {
            let rest = transform(ctx, scope, after, &mut |_, _, e| {
                Ok(expr(Expr::call(Expr::member(e, "slice"), vec![Expr::num(1.0)])))
            })?;
            translate_pattern(ctx, scope, child, rest, flags, hoist)?
        }
    };
    Ok(PatternOutput {
        prefix: Vec::new(),
        test,
        next: Some(Box::new(next)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::print_stmts;
    use crate::js::VarKind;

    #[test]
    /// 同じ種類の宣言だけがまとめられる
    fn merges_adjacent_declarations() {
        let merged = merge_declarations(vec![
            Stmt::var(VarKind::Const, "a", Some(Expr::num(1.0))),
            Stmt::var(VarKind::Const, "b", Some(Expr::num(2.0))),
            Stmt::var(VarKind::Let, "c", None),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(print_stmts(&merged), "const a = 1, b = 2;\nlet c;\n");
    }

    #[test]
    /// 末尾の return だけが判定値になる
    fn converts_statements_with_trailing_return() {
        let value = Value::Statements(vec![
            Stmt::expr(Expr::call(Expr::ident("f"), Vec::new())),
            Stmt::ret(Expr::ident("x")),
        ]);
        let pattern = convert_to_pattern(value);
        assert_eq!(pattern.prefix.len(), 1);
        match pattern.test {
            Value::Direct(Expr::Ident(name)) => assert_eq!(name, "x"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    /// 巻き上げありの束縛は `let x;` を先頭に置いて代入する
    fn hoisted_binding_assigns() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let mut named = Term::new("pattern_named");
        named.args.push("x".into());
        named
            .properties
            .insert("type".into(), crate::ast::Property::Text("Int".into()));
        let out = translate_pattern(
            &mut ctx,
            root,
            &named,
            Value::ident("y"),
            DeclarationFlags::CONST,
            true,
        )
        .expect("pattern");
        assert_eq!(print_stmts(&out.prefix), "x = y;\n");
        let hoisted = ctx.emit_scope(root, Vec::new());
        assert_eq!(print_stmts(&hoisted), "let x;\n");
    }

    #[test]
    /// 巻き上げなしの束縛はその場で const 宣言になる
    fn inline_binding_declares() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let mut named = Term::new("pattern_named");
        named.args.push("x".into());
        named
            .properties
            .insert("type".into(), crate::ast::Property::Text("Int".into()));
        let out = translate_pattern(
            &mut ctx,
            root,
            &named,
            Value::num(3.0),
            DeclarationFlags::CONST,
            false,
        )
        .expect("pattern");
        assert_eq!(print_stmts(&out.prefix), "const x = 3;\n");
    }
}
