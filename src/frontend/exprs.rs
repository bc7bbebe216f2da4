// パス: src/frontend/exprs.rs
// 役割: 式の項（declref・呼び出し・メンバー参照・リテラル・Optional・クロージャ）を値に変換する
// 意図: 型付き AST の情報（type= と decl=）だけを頼りに、関数表と型表へ解決した値を組み立てる
// 関連ファイル: src/frontend/mod.rs, src/frontend/patterns.rs, src/frontend/callables.rs, src/values/ops.rs
//! 式
//!
//! `translate_value` は項を一つの `Value` にする。文として使うかどうかは呼び出し側が決める。
//! Optional 連鎖（`a?.b`）は `optional_evaluation_expr` が受け口（Binder）を用意し、
//! 内側の `bind_optional_expr` が判定を登録して中身を返す。

use std::rc::Rc;

use crate::ast::declaration::{parse_declaration, Declaration};
use crate::ast::Term;
use crate::builtins::common::{trap, Trap};
use crate::builtins::optional::{
    empty_optional, optional_is_some, unwrap_optional, wrap_in_optional,
};
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::FunctionEntry;
use crate::js::{Expr, PropKey, PropValue, Property, Stmt};
use crate::reified::{reify_type, store_value, struct_field};
use crate::scope::{DeclarationFlags, ScopeId};
use crate::types::{parse_type, FunctionType, Type};
use crate::values::{
    array, call, conditional, copy, expr, logical, member, read, reuse, set, statements,
    transform_all, CallKind, Value,
};

use super::callables::{apply_parameter_mappings, body_value, strip_unlabeled, Parameter};
use super::patterns::{translate_pattern, value_for_pattern};

/// Optional 連鎖の受け口。値と中身の型を受け取り、判定を記録して中身を返す。
pub(crate) type Binder<'a> =
    Option<&'a mut dyn FnMut(&mut Context, ScopeId, Value, &Type) -> CResult<Value>>;

/// 修飾子とメタ型を外したインスタンスの型。
pub(crate) fn instance_type(ty: &Type) -> Type {
    match ty.unmodified() {
        Type::Metatype { base, .. } => instance_type(base),
        other => other.clone(),
    }
}

fn unknown_term(term: &Term) -> CompileError {
    CompileError::new("TRM001", format!("Handler for {} not implemented yet", term.name))
}

/// 置換の型を読む。
fn substitution_types(decl: &Declaration) -> CResult<Vec<Type>> {
    decl.substitutions
        .iter()
        .map(|s| Ok(parse_type(&s.to)?))
        .collect()
}

/// ジェネリック関数に渡す型引数（制約があれば適合）を、シグネチャの宣言順に作る。
fn generic_arguments(decl: &Declaration) -> CResult<Vec<Value>> {
    let mut names: Vec<(String, Vec<String>)> = Vec::new();
    for entry in &decl.signature {
        let slot = match names.iter().position(|(n, _)| n == &entry.name) {
            Some(i) => i,
            None => {
                names.push((entry.name.clone(), Vec::new()));
                names.len() - 1
            }
        };
        if let Some(protocol) = &entry.protocol {
            names[slot].1.push(protocol.clone());
        }
    }
    let mut out = Vec::with_capacity(names.len());
    for (name, protocols) in names {
        let substitution = decl
            .substitutions
            .iter()
            .find(|s| s.from == name)
            .ok_or_else(|| {
                CompileError::new("TRM002", format!("No substitution for generic {}", name))
            })?;
        let ty = Value::Type(parse_type(&substitution.to)?);
        out.push(if protocols.is_empty() {
            ty
        } else {
            Value::conformance(ty, protocols.join(" & "))
        });
    }
    Ok(out)
}

fn with_substitutions(value: Value, extra: Vec<Value>) -> Value {
    match value {
        Value::Function {
            name,
            parent,
            ty,
            mut substitutions,
        } => {
            substitutions.extend(extra);
            Value::Function {
                name,
                parent,
                ty,
                substitutions,
            }
        }
        other => other,
    }
}

/// 親の型を決める。プロトコルなら Self の置換を添える。
fn member_parent(
    ctx: &Context,
    decl: &Declaration,
    type_name: &str,
    instance: Option<Type>,
) -> CResult<(Value, Vec<Value>)> {
    if ctx.protocols.contains_key(type_name) {
        let mut substitutions = substitution_types(decl)?
            .into_iter()
            .map(Value::Type)
            .collect::<Vec<_>>();
        if substitutions.is_empty() {
            if let Some(instance) = instance {
                substitutions.push(Value::Type(instance));
            }
        }
        return Ok((Value::Type(Type::name(type_name)), substitutions));
    }
    if let Some(instance) = instance {
        return Ok((Value::Type(instance), Vec::new()));
    }
    let arguments = substitution_types(decl)?;
    let base = parse_type(type_name)?;
    let ty = if arguments.is_empty() {
        base
    } else {
        Type::generic(base, arguments)
    };
    Ok((Value::Type(ty), Vec::new()))
}

/// `decl=` の参照先を値にする。
fn extract_reference(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Value> {
    let decl = parse_declaration(term.expect_string("decl")?)?;
    if let Some(local) = &decl.local {
        return Ok(ctx.lookup(scope, local));
    }
    let name = decl.member.clone().unwrap_or_default();
    let ty = term.ty().unwrap_or_else(|_| Type::void());
    if let Some(type_name) = &decl.ty {
        let (parent, substitutions) = member_parent(ctx, &decl, type_name, None)?;
        let function = Value::member_function(parent, name, ty);
        return Ok(with_substitutions(function, substitutions));
    }
    let found = if ctx.functions.contains_key(&name) {
        Some(name.clone())
    } else {
        let stripped = strip_unlabeled(&name);
        ctx.functions
            .contains_key(stripped)
            .then(|| stripped.to_string())
    };
    match found {
        Some(key) => {
            let function = Value::function(key, ty);
            Ok(with_substitutions(function, generic_arguments(&decl)?))
        }
        None => Ok(ctx.lookup(scope, &name)),
    }
}

/// 型の関数表でメンバーの種類（getter か通常の関数か）を調べる。
fn member_kind(ctx: &mut Context, scope: ScopeId, parent: &Value, name: &str) -> CResult<CallKind> {
    let reified = match parent {
        Value::Type(ty) => reify_type(ctx, scope, ty)?,
        _ => return Ok(CallKind::Call),
    };
    Ok(match reified.function(name) {
        Some(FunctionEntry::Property { .. }) => CallKind::Get,
        _ => CallKind::Call,
    })
}

fn function_parent(function: &Value) -> Option<&Value> {
    match function {
        Value::Function {
            parent: Some(parent),
            ..
        } => Some(parent),
        _ => None,
    }
}

/// `dot_syntax_call_expr` と `constructor_ref_call_expr`。
fn translate_member_call(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    term.expect_children(2, 2)?;
    let reference = term.child(0)?;
    let target_term = term.child(1)?;
    let target = translate_value(ctx, scope, target_term, bind)?;
    let target_type = target_term.ty().ok();
    let function = match (reference.string("decl"), target_type.as_ref()) {
        (Some(text), Some(target_type)) => {
            let decl = parse_declaration(text)?;
            match (&decl.ty, &decl.member) {
                (Some(type_name), Some(name)) => {
                    let instance = instance_type(target_type);
                    let (parent, substitutions) =
                        member_parent(ctx, &decl, type_name, Some(instance))?;
                    let ty = reference.ty().unwrap_or_else(|_| Type::void());
                    with_substitutions(
                        Value::member_function(parent, name.clone(), ty),
                        substitutions,
                    )
                }
                _ => translate_value(ctx, scope, reference, bind)?,
            }
        }
        _ => translate_value(ctx, scope, reference, bind)?,
    };
    if let Value::Type(_) = target {
        // 静的メンバー。関数でない結果（case・定数）はその場で取り出す
        let applied_is_function = reference
            .ty()
            .ok()
            .and_then(|t| t.as_function().map(|f| f.ret.as_function().is_some()))
            .unwrap_or(true);
        if applied_is_function {
            return Ok(function);
        }
        let kind = match (function_parent(&function), &function) {
            (Some(parent), Value::Function { name, .. }) => {
                let parent = parent.clone();
                member_kind(ctx, scope, &parent, name)?
            }
            _ => CallKind::Call,
        };
        return call(ctx, scope, function, Vec::new(), kind);
    }
    let ty = term
        .function_type()
        .unwrap_or_else(|_| FunctionType::new(Vec::new(), Type::void()));
    Ok(Value::callable(ty, move |ctx, scope, args| {
        let mut all = vec![target.clone()];
        all.extend(args.all(ctx)?);
        call(ctx, scope, function.clone(), all, CallKind::Call)
    }))
}

/// 呼び出しの引数項を値の列にする。
pub(crate) fn translate_args(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Vec<Value>> {
    match term.name.as_str() {
        "tuple_expr" => term
            .children
            .iter()
            .map(|child| translate_value(ctx, scope, child, bind))
            .collect(),
        "paren_expr" => Ok(vec![translate_value(ctx, scope, term.child(0)?, bind)?]),
        _ => {
            let value = translate_value(ctx, scope, term, bind)?;
            let many = matches!(term.ty(), Ok(Type::Tuple(items)) if items.len() != 1);
            match value {
                Value::Tuple(items) if many => Ok(items),
                other => Ok(vec![other]),
            }
        }
    }
}

/// `field=1` または `field #1`。
fn tuple_field_index(term: &Term) -> CResult<usize> {
    let text = term.string("field").map(str::to_string).or_else(|| {
        term.properties
            .keys()
            .find_map(|key| key.strip_prefix('#').map(str::to_string))
    });
    text.and_then(|t| t.trim_start_matches('#').parse().ok())
        .ok_or_else(|| CompileError::new("TRM012", "Invalid tuple field index"))
}

fn number_literal(term: &Term) -> CResult<Value> {
    let text = term.expect_string("value")?;
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(&hex.replace('_', ""), 16).map(|n| n as f64).ok()
    } else {
        text.replace('_', "").parse::<f64>().ok()
    };
    let value = parsed.ok_or_else(|| {
        CompileError::new("TRM003", format!("Invalid number literal {}", text))
    })?;
    Ok(Value::num(if term.has_flag("negative") { -value } else { value }))
}

fn magic_identifier(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Value> {
    let location = term.location();
    match term.expect_string("kind")? {
        "#file" | "#filePath" | "#fileID" => Ok(Value::string(ctx.file_name.clone())),
        "#line" => Ok(Value::num(location.map(|l| l.line as f64).unwrap_or(0.0))),
        "#column" => Ok(Value::num(location.map(|l| l.column as f64).unwrap_or(0.0))),
        "#function" => Ok(Value::string(ctx.scope_name(scope).to_string())),
        other => Err(CompileError::new(
            "TRM004",
            format!("Unknown magic identifier {}", other),
        )),
    }
}

/// 補間文字列。文字列片はテンプレートの固定部、それ以外は埋め込み式になる。
fn interpolated_string(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    if let Some(tap) = term.find_child("tap_expr") {
        return translate_value(ctx, scope, tap, bind);
    }
    let mut quasis = vec![String::new()];
    let mut values = Vec::new();
    for child in &term.children {
        if child.name == "string_literal_expr" {
            if let Some(last) = quasis.last_mut() {
                last.push_str(child.expect_string("value")?);
            }
            continue;
        }
        values.push(translate_value(ctx, scope, child, bind)?);
        quasis.push(String::new());
    }
    if values.is_empty() {
        return Ok(Value::string(quasis.concat()));
    }
    transform_all(ctx, scope, values, &mut |_, _, exprs| {
        Ok(expr(Expr::Template {
            quasis: quasis.clone(),
            exprs,
        }))
    })
}

/// Swift 5 の補間（`$interpolation` を組み立てる tap_expr）。
fn tap_expression(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    let initial = translate_value(ctx, scope, term.child(0)?, bind)?;
    let name = term
        .string("var")
        .and_then(|text| parse_declaration(text).ok())
        .and_then(|d| d.local.or(d.member))
        .unwrap_or_else(|| "$interpolation".to_string());
    let mut stmts = ctx.add_variable(scope, &name, Some(initial), DeclarationFlags::NONE)?;
    let body = term.child_named("brace_stmt")?;
    stmts.extend(super::translate_statements(ctx, scope, &body.children)?);
    let current = ctx.lookup(scope, &name);
    let result = read(ctx, scope, current)?;
    stmts.push(Stmt::ret(result));
    Ok(statements(stmts))
}

fn array_literal(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    let element = match term.ty()? {
        Type::Array(inner) => Some(*inner),
        _ => None,
    };
    let mut values = Vec::with_capacity(term.children.len());
    for child in &term.children {
        let value = translate_value(ctx, scope, child, bind)?;
        values.push(match &element {
            Some(ty) => copy(value, ty.clone()),
            None => value,
        });
    }
    array(ctx, scope, values)
}

fn dictionary_literal(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    let value_type = match term.ty()? {
        Type::Dictionary { value, .. } => Some(*value),
        _ => None,
    };
    let mut values = Vec::new();
    for pair in &term.children {
        if pair.name != "tuple_expr" || pair.children.len() != 2 {
            return Err(CompileError::new(
                "TRM005",
                format!("Expected a key/value tuple in dictionary literal, got {}", pair.name),
            ));
        }
        values.push(translate_value(ctx, scope, pair.child(0)?, bind)?);
        let value = translate_value(ctx, scope, pair.child(1)?, bind)?;
        values.push(match &value_type {
            Some(ty) => copy(value, ty.clone()),
            None => value,
        });
    }
    transform_all(ctx, scope, values, &mut |_, _, exprs| {
        let mut props = Vec::with_capacity(exprs.len() / 2);
        let mut iter = exprs.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let key = match key {
                Expr::Str(name) => PropKey::Str(name),
                other => PropKey::Computed(other),
            };
            props.push(Property {
                key,
                value: PropValue::Value(value),
            });
        }
        Ok(expr(Expr::Object(props)))
    })
}

/// 既定引数（-1）と可変長引数（-2）を含む引数の並べ替え。
fn tuple_shuffle(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    let source = term.child(0)?;
    let items = match translate_value(ctx, scope, source, bind)? {
        Value::Tuple(items) if source.name == "tuple_expr" => items,
        other => vec![other],
    };
    let parse_list = |key: &str| -> CResult<Vec<i64>> {
        term.list(key)
            .iter()
            .map(|s| {
                s.trim().parse::<i64>().map_err(|_| {
                    CompileError::new("TRM006", format!("Invalid {} entry {}", key, s))
                })
            })
            .collect()
    };
    let elements = parse_list("elements")?;
    let variadic = parse_list("variadic_sources")?;
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        out.push(match element {
            -1 => Value::undefined(),
            -2 => {
                let sources = variadic
                    .iter()
                    .map(|&i| items.get(i as usize).cloned().unwrap_or_else(Value::undefined))
                    .collect();
                array(ctx, scope, sources)?
            }
            i => items.get(i as usize).cloned().ok_or_else(|| {
                CompileError::new("TRM007", format!("Tuple shuffle index {} out of range", i))
            })?,
        });
    }
    Ok(Value::Tuple(out))
}

fn closure_parameters(term: &Term) -> CResult<Vec<Parameter>> {
    let mut params = Vec::new();
    for list in term.children_named("parameter_list") {
        for param in list.children_named("parameter") {
            let name = param.args.first().cloned().unwrap_or_else(|| "_".to_string());
            let ty = match param.string("type") {
                Some(text) => parse_type(text)?,
                None => Type::void(),
            };
            let inout = param.has_flag("inout") || ty.has_modifier("inout");
            params.push(Parameter { name, ty, inout });
        }
    }
    Ok(params)
}

/// クロージャ。呼び出されるたびにインラインスコープへ展開し、値として読まれたら関数になる。
fn closure(term: &Term) -> CResult<Value> {
    let ty = term
        .function_type()
        .unwrap_or_else(|_| FunctionType::new(Vec::new(), Type::void()));
    let params = Rc::new(closure_parameters(term)?);
    let body = term
        .children
        .iter()
        .rev()
        .find(|c| c.name != "parameter_list")
        .cloned()
        .ok_or_else(|| CompileError::new("TRM008", "Closure without a body"))?;
    let body = Rc::new(body);
    Ok(Value::callable(ty, move |ctx, scope, args| {
        let inner = ctx.new_inline_scope("closure", scope);
        let prefix = apply_parameter_mappings(ctx, inner, &params, args, 0)?;
        if body.name == "brace_stmt" {
            return body_value(ctx, inner, prefix, &body);
        }
        let value = translate_value(ctx, inner, &body, &mut None)?;
        let mut stmts = prefix;
        let tail = read(ctx, inner, value)?;
        stmts.push(Stmt::ret(tail));
        Ok(statements(ctx.emit_scope(inner, stmts)))
    }))
}

fn optional_wrapped(term: &Term) -> CResult<Type> {
    match term.ty()? {
        Type::Optional(inner) => Ok(*inner),
        other => Err(CompileError::new(
            "TRM009",
            format!("Expected an optional type on {}, got {}", term.name, other),
        )),
    }
}

/// `try?`：例外を空の Optional にする。
fn optional_try(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    let wrapped = optional_wrapped(term)?;
    let temp = ctx.declare_temporary(scope, "$try")?;
    let inner = translate_value(ctx, scope, term.child(0)?, bind)?;
    let inner_type = term.child(0)?.ty().unwrap_or_else(|_| wrapped.clone());
    let value = if matches!(inner_type, Type::Optional(_)) {
        inner
    } else {
        wrap_in_optional(ctx, scope, inner, &wrapped)?
    };
    let assigned = set(ctx, scope, Value::ident(temp.clone()), value, "=")?;
    let block = crate::values::ignore(ctx, scope, assigned)?;
    let empty = empty_optional(ctx, scope, &wrapped)?;
    let cleared = set(ctx, scope, Value::ident(temp.clone()), empty, "=")?;
    let handler = crate::values::ignore(ctx, scope, cleared)?;
    Ok(statements(vec![
        Stmt::Try {
            block,
            handler: Some(("e".to_string(), handler)),
            finalizer: None,
        },
        Stmt::ret(Expr::ident(temp)),
    ]))
}

/// `a?.b` の全体。内側の `bind_optional_expr` の判定をすべて満たしたときだけ評価する。
fn optional_evaluation(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
) -> CResult<Value> {
    let wrapped = optional_wrapped(term)?;
    let mut tests: Vec<Value> = Vec::new();
    let inner = {
        let mut record = |ctx: &mut Context, scope: ScopeId, value: Value, ty: &Type| {
            let (first, after) = reuse(ctx, scope, value, "optional")?;
            tests.push(optional_is_some(ctx, scope, first, ty)?);
            unwrap_optional(ctx, scope, after, ty)
        };
        let mut binder: Binder = Some(&mut record);
        translate_value(ctx, scope, term.child(0)?, &mut binder)?
    };
    let mut combined: Option<Value> = None;
    for test in tests {
        combined = Some(match combined {
            Some(previous) => logical(ctx, scope, "&&", previous, test)?,
            None => test,
        });
    }
    let test = match combined {
        Some(test) => test,
        None => return Ok(inner),
    };
    let empty = empty_optional(ctx, scope, &wrapped)?;
    conditional(ctx, scope, test, inner, empty)
}

fn assign(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    term.expect_children(2, 2)?;
    let dest_term = term.child(0)?;
    let source_term = term.child(1)?;
    if dest_term.name == "discard_assignment_expr" {
        return translate_value(ctx, scope, source_term, bind);
    }
    let dest = translate_value(ctx, scope, dest_term, bind)?;
    let source = translate_value(ctx, scope, source_term, bind)?;
    let ty = source_term
        .ty()
        .or_else(|_| dest_term.ty().map(|t| t.unmodified().clone()))?;
    let source = copy(source, ty.clone());
    match dest {
        dest @ (Value::Direct(_) | Value::Boxed { .. }) => {
            store_value(ctx, scope, dest, source, &ty)
        }
        other => set(ctx, scope, other, source, "="),
    }
}

fn member_reference(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    let decl = parse_declaration(term.expect_string("decl")?)?;
    let name = decl
        .local
        .clone()
        .or_else(|| decl.member.clone())
        .ok_or_else(|| CompileError::new("TRM010", "member_ref_expr without a member"))?;
    let child = term.child(0)?;
    let base_type = instance_type(&child.ty()?);
    let target = translate_value(ctx, scope, child, bind)?;
    if let Value::Type(ty) = &target {
        let parent = Value::Type(instance_type(ty));
        let kind = member_kind(ctx, scope, &parent, &name)?;
        let ty = term.ty().unwrap_or_else(|_| Type::void());
        let function = Value::member_function(parent, name, ty);
        return call(ctx, scope, function, Vec::new(), kind);
    }
    let reified = reify_type(ctx, scope, &base_type)?;
    if reified.field(&name).is_some() {
        return struct_field(ctx, scope, &reified, target, &name);
    }
    let parent = Value::Type(base_type.clone());
    let entry = reified.function(&name).ok_or_else(|| {
        CompileError::new(
            "TRM011",
            format!("{} does not have a member named {}", reified.name, name),
        )
    })?;
    let kind = match entry {
        FunctionEntry::Property { .. } => CallKind::Get,
        _ => CallKind::Call,
    };
    let function = Value::member_function(parent, name, term.ty().unwrap_or_else(|_| Type::void()));
    call(ctx, scope, function, vec![target], kind)
}

fn subscript(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    term.expect_children(2, 2)?;
    let decl = parse_declaration(term.expect_string("decl")?)?;
    let name = decl.member.unwrap_or_else(|| "subscript(_:)".to_string());
    let base_term = term.child(0)?;
    let base_type = instance_type(&base_term.ty()?);
    let base = translate_value(ctx, scope, base_term, bind)?;
    let mut args = vec![base];
    args.extend(translate_args(ctx, scope, term.child(1)?, bind)?);
    let element = term.ty()?.unmodified().clone();
    let parent = Value::Type(base_type);
    let getter = Value::member_function(parent.clone(), name.clone(), element.clone());
    let setter = Value::member_function(parent, name, element.clone());
    Ok(Value::subscript(getter, setter, args, element))
}

/// 式の項を値にする。
pub(crate) fn translate_value(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    bind: &mut Binder,
) -> CResult<Value> {
    match term.name.as_str() {
        "member_ref_expr" => member_reference(ctx, scope, term, bind),
        "tuple_element_expr" => {
            let child = term.child(0)?;
            let index = tuple_field_index(term)?;
            let single = matches!(child.ty(), Ok(Type::Tuple(items)) if items.len() == 1);
            let value = translate_value(ctx, scope, child, bind)?;
            if single {
                return Ok(value);
            }
            member(ctx, scope, value, Value::num(index as f64))
        }
        "declref_expr" => {
            term.expect_children(0, 0)?;
            extract_reference(ctx, scope, term)
        }
        "subscript_expr" => subscript(ctx, scope, term, bind),
        "prefix_unary_expr" | "postfix_unary_expr" | "call_expr" | "binary_expr" => {
            term.expect_children(2, 2)?;
            let target = translate_value(ctx, scope, term.child(0)?, bind)?;
            let args = translate_args(ctx, scope, term.child(1)?, bind)?;
            call(ctx, scope, target, args, CallKind::Call)
        }
        "tuple_expr" => {
            let values = term
                .children
                .iter()
                .map(|child| translate_value(ctx, scope, child, bind))
                .collect::<CResult<Vec<_>>>()?;
            Ok(Value::Tuple(values))
        }
        "type_expr" => Ok(Value::Type(instance_type(&term.ty()?))),
        "boolean_literal_expr" => Ok(Value::boolean(term.expect_string("value")? == "true")),
        "integer_literal_expr" | "float_literal_expr" => number_literal(term),
        "string_literal_expr" => Ok(Value::string(term.expect_string("value")?)),
        "magic_identifier_literal_expr" => magic_identifier(ctx, scope, term),
        "interpolated_string_literal_expr" => interpolated_string(ctx, scope, term, bind),
        "tap_expr" => tap_expression(ctx, scope, term, bind),
        "array_expr" => array_literal(ctx, scope, term, bind),
        "dictionary_expr" => dictionary_literal(ctx, scope, term, bind),
        "nil_literal_expr" => {
            let wrapped = optional_wrapped(term)?;
            empty_optional(ctx, scope, &wrapped)
        }
        "paren_expr"
        | "load_expr"
        | "function_conversion_expr"
        | "try_expr"
        | "force_try_expr"
        | "dot_self_expr"
        | "coerce_expr"
        | "derived_to_base_expr"
        | "covariant_return_conversion_expr"
        | "identity_expr"
        | "normal_conformance" => translate_value(ctx, scope, term.child(0)?, bind),
        "erasure_expr" => {
            let last = term
                .children
                .last()
                .ok_or_else(|| CompileError::new("TRM013", "erasure_expr without a child"))?;
            translate_value(ctx, scope, last, bind)
        }
        "if_expr" | "ternary_expr" => {
            term.expect_children(3, 3)?;
            let test = translate_value(ctx, scope, term.child(0)?, bind)?;
            let consequent = translate_value(ctx, scope, term.child(1)?, bind)?;
            let alternate = translate_value(ctx, scope, term.child(2)?, bind)?;
            conditional(ctx, scope, test, consequent, alternate)
        }
        "inject_into_optional" => {
            let child = term.child(0)?;
            let value = translate_value(ctx, scope, child, bind)?;
            let wrapped = child.ty()?;
            wrap_in_optional(ctx, scope, copy(value, wrapped.clone()), &wrapped)
        }
        "dot_syntax_call_expr" | "constructor_ref_call_expr" => {
            translate_member_call(ctx, scope, term, bind)
        }
        "assign_expr" => assign(ctx, scope, term, bind),
        "discard_assignment_expr" => Ok(Value::undefined()),
        "inout_expr" => {
            let value = translate_value(ctx, scope, term.child(0)?, bind)?;
            Ok(Value::boxed(value, instance_type(&term.ty()?)))
        }
        "pattern" => {
            term.expect_children(2, 2)?;
            let value = translate_value(ctx, scope, term.child(1)?, bind)?;
            let pattern = translate_pattern(
                ctx,
                scope,
                term.child(0)?,
                value,
                DeclarationFlags::CONST,
                true,
            )?;
            value_for_pattern(ctx, scope, pattern)
        }
        "closure_expr" | "autoclosure_expr" => closure(term),
        "tuple_shuffle_expr" | "argument_shuffle_expr" => tuple_shuffle(ctx, scope, term, bind),
        "force_value_expr" => {
            let wrapped = term.ty()?;
            let value = translate_value(ctx, scope, term.child(0)?, bind)?;
            let (first, after) = reuse(ctx, scope, value, "optional")?;
            let test = optional_is_some(ctx, scope, first, &wrapped)?;
            let unwrapped = unwrap_optional(ctx, scope, after, &wrapped)?;
            let failed = trap(ctx, scope, Trap::ForceUnwrap)?;
            conditional(ctx, scope, test, unwrapped, failed)
        }
        "optional_try_expr" => optional_try(ctx, scope, term, bind),
        "optional_evaluation_expr" => optional_evaluation(ctx, scope, term),
        "bind_optional_expr" => {
            let value = translate_value(ctx, scope, term.child(0)?, bind)?;
            let wrapped = term.ty()?;
            match bind.as_mut() {
                Some(record) => record(ctx, scope, value, &wrapped),
                None => Err(CompileError::new(
                    "TRM014",
                    "Found a bind_optional_expr outside of an optional_evaluation_expr",
                )),
            }
        }
        "make_temporarily_escapable_expr" => {
            term.expect_children(3, 3)?;
            let closure = translate_value(ctx, scope, term.child(0)?, bind)?;
            let inner = ctx.new_inline_scope("escapable", scope);
            ctx.map_value(inner, "$opaque", closure);
            let value = translate_value(ctx, inner, term.child(2)?, bind)?;
            let tail = read(ctx, inner, value)?;
            Ok(statements(ctx.emit_scope(inner, vec![Stmt::ret(tail)])))
        }
        "opaque_value_expr" => ctx
            .mapped_value(scope, "$opaque")
            .ok_or_else(|| CompileError::new("TRM015", "opaque_value_expr without a binding")),
        _ => Err(unknown_term(term)),
    }
}

/// 式の値を文として評価する（結果は捨てる）。
pub(crate) fn translate_expression_statement(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
) -> CResult<Vec<Stmt>> {
    let value = translate_value(ctx, scope, term, &mut None)?;
    crate::values::ignore(ctx, scope, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_ast;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::print_expr;

    fn show(source: &str) -> String {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let term = parse_ast(source).expect("parse");
        let value = translate_value(&mut ctx, root, &term, &mut None).expect("translate");
        let e = read(&mut ctx, root, value).expect("read");
        print_expr(&e)
    }

    #[test]
    /// 整数リテラルと負のフラグ
    fn integer_literals() {
        assert_eq!(show("(integer_literal_expr type='Int' value=42)"), "42");
        assert_eq!(show("(integer_literal_expr type='Int' negative value=2)"), "-2");
    }

    #[test]
    /// 文字列片と式からテンプレートを作る
    fn interpolation_builds_template() {
        let out = show(
            r#"(interpolated_string_literal_expr type='String'
  (string_literal_expr type='String' value="n = ")
  (declref_expr type='Int' decl=main.(file).f(n:).n@main.swift:1:8))"#,
        );
        assert_eq!(out, "`n = ${n}`");
    }

    #[test]
    /// nil リテラルは包む型の空表現になる
    fn nil_literal() {
        assert_eq!(show("(nil_literal_expr type='Int?')"), "null");
        assert_eq!(show("(nil_literal_expr type='Int??')"), "[]");
    }

    #[test]
    /// 組み込み演算子の呼び出しは JavaScript の演算になる
    fn builtin_binary_operator() {
        let out = show(
            r#"(binary_expr type='Bool'
  (dot_syntax_call_expr type='(Int, Int) -> Bool'
    (declref_expr type='(Int.Type) -> (Int, Int) -> Bool' decl=Swift.(file).Int extension.==)
    (type_expr type='Int.Type'))
  (tuple_expr type='(Int, Int)'
    (declref_expr type='Int' decl=main.(file).f(a:b:).a@main.swift:1:8)
    (declref_expr type='Int' decl=main.(file).f(a:b:).b@main.swift:1:16)))"#,
        );
        assert_eq!(out, "a === b");
    }

    #[test]
    /// 強制アンラップは空なら失敗関数を呼ぶ
    fn force_unwrap_traps() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let term = parse_ast(
            "(force_value_expr type='Int' (declref_expr type='Int?' decl=main.(file).f(x:).x@main.swift:1:8))",
        )
        .expect("parse");
        let value = translate_value(&mut ctx, root, &term, &mut None).expect("translate");
        let e = read(&mut ctx, root, value).expect("read");
        let text = print_expr(&e);
        assert!(text.starts_with("x !== null ? x : "), "{}", text);
        assert!(ctx.helper(Trap::ForceUnwrap.key()).is_some());
    }

    #[test]
    /// 未知の項はエラー
    fn unknown_terms_are_errors() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let term = parse_ast("(mystery_expr type='Int')").expect("parse");
        let err = translate_value(&mut ctx, root, &term, &mut None).expect_err("unknown");
        assert_eq!(err.code(), "TRM001");
    }
}
