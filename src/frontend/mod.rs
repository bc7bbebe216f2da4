// パス: src/frontend/mod.rs
// 役割: AST ダンプの Term 木を JavaScript の Program に翻訳する入口と文の翻訳
// 意図: 名前付き型と関数を先に登録し、その後で本体を文ごとに値の代数へ流し込む
// 関連ファイル: src/frontend/exprs.rs, src/frontend/patterns.rs, src/frontend/decls.rs, src/frontend/callables.rs
//! AST 翻訳器
//!
//! 翻訳は二段階で進む。
//! 1. 登録: `protocol_decl`・`struct_decl`・`enum_decl`・`class_decl`（と extension）を型表へ、
//!    最上位の `func_decl` を関数表へ載せる。本体はまだ翻訳しない。
//! 2. 本体: 残りの文を順に翻訳する。関数本体は呼び出された時点で展開（または出力）される。

mod callables;
mod decls;
mod exprs;
mod patterns;

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::Term;
use crate::builtins::closed_range;
use crate::builtins::optional::empty_optional;
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::{emit_function, inline_or_emit, noinline, FunctionBuilder, FunctionEntry};
use crate::js::{Expr, Program, Stmt, VarKind};
use crate::reified::reify_type;
use crate::scope::{DeclarationFlags, ScopeId};
use crate::types::Type;
use crate::values::{copy, expr, ignore_expression, is_pure, read, unary, Value};

use callables::{body_of, function_builder, function_shape, strip_unlabeled};
use decls::{class_statement, register_nominal, register_protocol, Nominal, NominalKind};
use exprs::{translate_expression_statement, translate_value};
use patterns::{convert_to_pattern, flatten_pattern, merge_declarations, translate_pattern};

/// 宣言の修飾から変数の宣言フラグを決める。
fn flags_for_declaration(term: &Term) -> DeclarationFlags {
    let mut flags = DeclarationFlags::NONE;
    if term.has_flag("let") {
        flags = flags | DeclarationFlags::CONST;
    }
    if matches!(term.string("access"), Some("public") | Some("open")) {
        flags = flags | DeclarationFlags::EXPORT;
    }
    flags
}

fn is_public(term: &Term) -> bool {
    flags_for_declaration(term).contains(DeclarationFlags::EXPORT)
}

/// 関数宣言を関数表に登録する。外部公開の関数は出力すべき組み立て器を返す。
fn register_function(
    ctx: &mut Context,
    term: &Term,
    top_level: bool,
) -> CResult<Option<(String, Option<usize>, FunctionBuilder)>> {
    let body = match body_of(term) {
        Some(body) => Rc::new(body.clone()),
        None => {
            log::debug!("function {:?} without a body", term.args.first());
            return Ok(None);
        }
    };
    let shape = Rc::new(function_shape(term, false)?);
    let name = shape.name.clone();
    let arity = Some(shape.arity());
    let builder = function_builder(shape, body);
    let entry_builder = if top_level {
        noinline(name.clone(), arity, builder.clone())
    } else {
        inline_or_emit(name.clone(), arity, builder.clone())
    };
    let stripped = strip_unlabeled(&name).to_string();
    if stripped != name {
        ctx.functions
            .insert(stripped, FunctionEntry::Plain(entry_builder.clone()));
    }
    ctx.functions.insert(name.clone(), FunctionEntry::Plain(entry_builder));
    log::debug!("registered function {}", name);
    Ok(if top_level && is_public(term) {
        Some((name, arity, builder))
    } else {
        None
    })
}

/// 最上位の宣言を登録する。戻り値は出力順に並んだ名前付き型。
fn register_declarations(ctx: &mut Context, terms: &[Term]) -> CResult<Vec<Rc<Nominal>>> {
    for term in terms.iter().filter(|t| t.name == "protocol_decl") {
        register_protocol(ctx, term)?;
    }
    let mut order: Vec<Rc<Nominal>> = Vec::new();
    let mut by_name: BTreeMap<String, Rc<Nominal>> = BTreeMap::new();
    for term in terms {
        let kind = match NominalKind::of(&term.name) {
            Some(kind) => kind,
            None => continue,
        };
        let name = term.args.first().cloned().ok_or_else(|| {
            CompileError::new("TRM050", format!("{} without a name", term.name))
        })?;
        let nominal = Nominal::new(kind, name.clone(), Rc::new(term.clone()));
        by_name.insert(name, nominal.clone());
        order.push(nominal);
    }
    for term in terms.iter().filter(|t| t.name == "extension_decl") {
        let extended = term.args.first().map(String::as_str).unwrap_or("");
        match by_name.get(extended) {
            Some(nominal) => nominal.terms.borrow_mut().push(Rc::new(term.clone())),
            None => log::warn!("extension of {} is not translated", extended),
        }
    }
    for nominal in &order {
        register_nominal(ctx, nominal.clone())?;
    }
    Ok(order)
}

/// 子スコープで翻訳し、そのスコープの巻き上げ文を先頭に付ける。
fn translate_in_new_scope(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    name: &str,
) -> CResult<Vec<Stmt>> {
    let child = ctx.new_scope(name, scope);
    let body = translate_statement(ctx, child, term, None)?;
    Ok(merge_declarations(ctx.emit_scope(child, body)))
}

fn block_of(stmts: Vec<Stmt>) -> Stmt {
    match <[Stmt; 1]>::try_from(stmts) {
        Ok([stmt @ Stmt::If { .. }]) => stmt,
        Ok([other]) => Stmt::Block(vec![other]),
        Err(stmts) => Stmt::Block(stmts),
    }
}

fn translate_if(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    term.expect_children(2, 3)?;
    let test_term = term.child(0)?;
    let pattern = if test_term.name == "pattern" {
        let value = translate_value(ctx, scope, test_term.child(1)?, &mut None)?;
        translate_pattern(
            ctx,
            scope,
            test_term.child(0)?,
            value,
            DeclarationFlags::NONE,
            false,
        )?
    } else {
        convert_to_pattern(translate_value(ctx, scope, test_term, &mut None)?)
    };
    let flat = flatten_pattern(ctx, scope, pattern)?;
    let mut consequent = flat.suffix;
    consequent.extend(translate_in_new_scope(ctx, scope, term.child(1)?, "consequent")?);
    let mut out = flat.prefix;
    if patterns::is_true_expression(&flat.test) {
        out.extend(consequent);
        return Ok(out);
    }
    let alternate = match term.children.get(2) {
        Some(alternate) => Some(Box::new(block_of(translate_in_new_scope(
            ctx, scope, alternate, "alternate",
        )?))),
        None => None,
    };
    out.push(Stmt::If {
        test: flat.test,
        consequent,
        alternate,
    });
    Ok(out)
}

/// `guard` の条件。束縛は外側のスコープに残る。
fn translate_guard(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    term.expect_children(2, 2)?;
    let test_term = term.child(0)?;
    let pattern = if test_term.name == "pattern" {
        let value = translate_value(ctx, scope, test_term.child(1)?, &mut None)?;
        translate_pattern(ctx, scope, test_term.child(0)?, value, DeclarationFlags::NONE, true)?
    } else {
        convert_to_pattern(translate_value(ctx, scope, test_term, &mut None)?)
    };
    let flat = flatten_pattern(ctx, scope, pattern)?;
    let mut out = flat.prefix;
    let test = unary(ctx, scope, "!", expr(flat.test))?;
    let test = read(ctx, scope, test)?;
    out.push(Stmt::If {
        test,
        consequent: translate_in_new_scope(ctx, scope, term.child(1)?, "alternate")?,
        alternate: None,
    });
    out.extend(flat.suffix);
    Ok(out)
}

/// 反復対象の子（パターンと本体以外で最初に型を持つ項）。
fn sequence_term(term: &Term) -> CResult<&Term> {
    term.children
        .iter()
        .skip(1)
        .find(|c| !c.name.starts_with("pattern") && c.name != "brace_stmt" && c.ty().is_ok())
        .ok_or_else(|| CompileError::new("TRM051", "for each statement without a sequence"))
}

fn translate_for_each(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    let pattern = term.child(0)?;
    let name = match pattern.name.as_str() {
        "pattern_named" => pattern.args.first().cloned(),
        "pattern_any" => Some("_".to_string()),
        _ => None,
    }
    .ok_or_else(|| {
        CompileError::new(
            "TRM052",
            format!(
                "Only named patterns are supported in for each iteration, got a {}",
                pattern.name
            ),
        )
    })?;
    let target = sequence_term(term)?;
    let target_type = target.ty()?;
    let body_term = body_of(term)
        .ok_or_else(|| CompileError::new("TRM051", "for each statement without a body"))?;
    let element_type = pattern.ty().unwrap_or_else(|_| Type::void());
    let sequence = translate_value(ctx, scope, target, &mut None)?;
    match target_type.unmodified() {
        Type::Array(_) => {
            let iter = read(ctx, scope, sequence)?;
            let child = ctx.new_scope("body", scope);
            let ident = bind_loop_variable(ctx, child, &name)?;
            let body = translate_statement(ctx, child, body_term, None)?;
            let body = ctx.emit_scope(child, body);
            Ok(vec![Stmt::ForOf {
                kind: VarKind::Const,
                name: ident,
                iter,
                body,
            }])
        }
        Type::Generic { base, .. }
            if matches!(base.as_ref(), Type::Name(n) if n == "ClosedRange") =>
        {
            closed_range::iterate(ctx, scope, sequence, &mut |ctx, scope, i| {
                let child = ctx.new_scope("body", scope);
                ctx.map_value(child, name.clone(), i);
                let body = translate_statement(ctx, child, body_term, None)?;
                Ok(ctx.emit_scope(child, body))
            })
        }
        other => Err(CompileError::new(
            "TRM053",
            format!(
                "Only arrays and closed ranges are supported in for each iterations, got a {} of {}",
                other.stringify(),
                element_type.stringify()
            ),
        )),
    }
}

/// ループ変数を宣言済みとして対応付ける（宣言は for 文が行う）。
fn bind_loop_variable(ctx: &mut Context, scope: ScopeId, name: &str) -> CResult<String> {
    let prefix = if name == "_" { "element" } else { name };
    let ident = ctx.reserve_unique(scope, &crate::scope::mangle_name(prefix))?;
    ctx.map_value(scope, name, Value::ident(ident.clone()));
    Ok(ident)
}

/// ループや入れ子の switch の外にある `break` を含むか。
fn has_switch_break(terms: &[Term]) -> bool {
    terms.iter().any(|t| match t.name.as_str() {
        "break_stmt" => true,
        "while_stmt" | "repeat_while_stmt" | "for_each_stmt" | "switch_stmt" | "closure_expr"
        | "func_decl" => false,
        _ => has_switch_break(&t.children),
    })
}

fn translate_switch(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    let discriminant_term = term.child(0)?;
    let discriminant = translate_value(ctx, scope, discriminant_term, &mut None)?;
    let discriminant = read(ctx, scope, discriminant)?;
    let matched = ctx.reserve_unique(scope, "$match")?;
    let declaration = Stmt::var(VarKind::Const, matched.clone(), Some(discriminant));
    let mut needs_exit = false;
    let mut cases: Option<Stmt> = None;
    for case_term in term.children[1..].iter().rev() {
        if case_term.name != "case_stmt" {
            return Err(CompileError::new(
                "TRM054",
                format!(
                    "Expected a case_stmt as child of a switch statement, got {}",
                    case_term.name
                ),
            ));
        }
        let (body_term, labels) = case_term
            .children
            .split_last()
            .ok_or_else(|| CompileError::new("TRM054", "case_stmt without a body"))?;
        let child = ctx.new_scope("case", scope);
        let mut merged_prefix = Vec::new();
        let mut merged_test: Option<Expr> = None;
        let mut merged_suffix = Vec::new();
        for label in labels {
            let pattern = translate_pattern(
                ctx,
                child,
                label,
                Value::ident(matched.clone()),
                DeclarationFlags::NONE,
                true,
            )?;
            let flat = flatten_pattern(ctx, child, pattern)?;
            merged_prefix.extend(flat.prefix);
            merged_test = Some(match merged_test {
                None => flat.test,
                Some(previous) if patterns::is_true_expression(&previous) => previous,
                Some(previous) => Expr::logical("||", previous, flat.test),
            });
            merged_suffix.extend(flat.suffix);
        }
        let mut body_terms: Vec<Term> = if body_term.name == "brace_stmt" {
            body_term.children.clone()
        } else {
            vec![body_term.clone()]
        };
        if body_terms.last().map(|t| t.name == "break_stmt").unwrap_or(false) {
            body_terms.pop();
        }
        needs_exit |= has_switch_break(&body_terms);
        let mut body = merged_suffix;
        body.extend(translate_statements(ctx, child, &body_terms)?);
        let body = merge_declarations(ctx.emit_scope(child, body));
        let test = merged_test.unwrap_or(Expr::Bool(false));
        let next = if cases.is_none() && patterns::is_true_expression(&test) {
            let mut block = merged_prefix;
            block.extend(body);
            Stmt::Block(block)
        } else {
            let pending = Stmt::If {
                test,
                consequent: body,
                alternate: cases.take().map(Box::new),
            };
            if merged_prefix.is_empty() {
                pending
            } else {
                merged_prefix.push(pending);
                Stmt::Block(merged_prefix)
            }
        };
        cases = Some(next);
    }
    let mut out = vec![declaration];
    match cases {
        // case 本体の break が switch を抜けるよう、一度だけ回るループで囲む
        Some(chain) if needs_exit => out.push(Stmt::DoWhile {
            body: vec![chain],
            test: Expr::Bool(false),
        }),
        Some(chain) => out.push(chain),
        None => {}
    }
    Ok(out)
}

/// `catch let error` の束縛名。
fn catch_name(pattern: &Term) -> String {
    match pattern.name.as_str() {
        "pattern_named" => pattern.args.first().cloned().unwrap_or_else(|| "error".into()),
        _ => pattern
            .children
            .first()
            .map(catch_name)
            .unwrap_or_else(|| "error".into()),
    }
}

fn translate_do_catch(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    term.expect_children(2, usize::MAX)?;
    let body_term = term.child(0)?;
    let mut body = translate_in_new_scope(ctx, scope, body_term, "body")?;
    for catch_term in &term.children[1..] {
        let (pattern, catch_body) = match catch_term.children.as_slice() {
            [pattern, .., catch_body] => (Some(pattern), catch_body),
            [catch_body] => (None, catch_body),
            [] => {
                return Err(CompileError::new("TRM055", "catch clause without a body"));
            }
        };
        let name = pattern.map(catch_name).unwrap_or_else(|| "error".into());
        let child = ctx.new_scope("catch", scope);
        let ident = bind_loop_variable(ctx, child, &name)?;
        let handler = translate_statement(ctx, child, catch_body, None)?;
        let handler = ctx.emit_scope(child, handler);
        body = vec![Stmt::Try {
            block: body,
            handler: Some((ident, handler)),
            finalizer: None,
        }];
    }
    Ok(body)
}

fn translate_return(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    term.expect_children(0, 1)?;
    let value_term = match term.children.first() {
        Some(value_term) => value_term,
        None if term.has_flag("implicit") => {
            let self_value = ctx.lookup(scope, "self");
            let e = read(ctx, scope, self_value)?;
            return Ok(vec![Stmt::ret(e)]);
        }
        None => return Ok(vec![Stmt::Return(None)]),
    };
    let value = translate_value(ctx, scope, value_term, &mut None)?;
    if let Value::Statements(stmts) = value {
        return Ok(stmts);
    }
    let e = read(ctx, scope, value)?;
    if let Expr::Ident(name) = &e {
        if ctx.scope(scope).declarations.iter().any(|(declared, _)| declared == name) {
            return Ok(vec![Stmt::ret(e)]);
        }
    }
    let ty = value_term.ty().unwrap_or_else(|_| Type::void());
    let copied = copy(expr(e), ty);
    let e = read(ctx, scope, copied)?;
    Ok(vec![Stmt::ret(e)])
}

/// 束縛宣言。`let (a, b) = ...` の各組を順に分解する。
fn translate_pattern_binding(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    next: Option<&Term>,
) -> CResult<Vec<Stmt>> {
    let flags = match next {
        Some(next) if next.name == "var_decl" => flags_for_declaration(next),
        _ => DeclarationFlags::NONE,
    };
    let mut out = Vec::new();
    let mut iter = term.children.iter().peekable();
    while let Some(pattern_term) = iter.next() {
        let init = match iter.peek() {
            Some(next) if !next.name.starts_with("pattern") => iter.next(),
            _ => None,
        };
        let init = match init {
            Some(init) => init,
            None => continue,
        };
        let value = translate_value(ctx, scope, init, &mut None)?;
        let pattern = translate_pattern(ctx, scope, pattern_term, value, flags, false)?;
        if pattern.next.is_some() {
            return Err(CompileError::new(
                "TRM056",
                "Chained patterns are not supported on binding declarations",
            ));
        }
        out.extend(pattern.prefix);
        let test = read(ctx, scope, pattern.test)?;
        if !is_pure(&test) {
            out.extend(ignore_expression(test));
        }
    }
    Ok(out)
}

fn translate_var_decl(ctx: &mut Context, scope: ScopeId, term: &Term) -> CResult<Vec<Stmt>> {
    let name = term
        .args
        .first()
        .ok_or_else(|| CompileError::new("TRM057", "var_decl without a name"))?;
    if ctx.has_variable(scope, name) || ctx.scope(scope).mapping.contains_key(name) {
        return Ok(Vec::new());
    }
    if term
        .children
        .iter()
        .any(|c| c.name == "brace_stmt" || (c.name == "accessor_decl" && !c.has_flag("implicit")))
    {
        return Err(CompileError::new(
            "TRM058",
            format!("Computed variable {} outside of a type is not supported", name),
        ));
    }
    let ty = term.ty()?;
    let initial = match crate::reified::default_instantiate(ctx, scope, &ty, &mut |_| None) {
        Ok(value) => Some(value),
        Err(err) => {
            log::debug!("{} starts undefined: {}", name, err);
            None
        }
    };
    ctx.add_variable(scope, name, initial, flags_for_declaration(term))
}

/// 一つの文を翻訳する。`next` は束縛宣言の直後の var_decl を読むために渡す。
fn translate_statement(
    ctx: &mut Context,
    scope: ScopeId,
    term: &Term,
    next: Option<&Term>,
) -> CResult<Vec<Stmt>> {
    match term.name.as_str() {
        "brace_stmt" | "top_level_code_decl" | "do_stmt" | "source_file" => {
            translate_sequence(ctx, scope, &term.children, next)
        }
        "return_stmt" => translate_return(ctx, scope, term),
        "fail_stmt" => {
            let self_type = match ctx.mapped_value(scope, "$failable") {
                Some(Value::Type(ty)) => Some(ty),
                _ => None,
            };
            let empty = match self_type {
                Some(ty) => empty_optional(ctx, scope, &ty)?,
                None => Value::null(),
            };
            let e = read(ctx, scope, empty)?;
            Ok(vec![Stmt::ret(e)])
        }
        "var_decl" => translate_var_decl(ctx, scope, term),
        "pattern_binding_decl" => translate_pattern_binding(ctx, scope, term, next),
        "if_stmt" => translate_if(ctx, scope, term),
        "guard_stmt" => translate_guard(ctx, scope, term),
        "while_stmt" => {
            term.expect_children(2, 2)?;
            let test = translate_value(ctx, scope, term.child(0)?, &mut None)?;
            let test = read(ctx, scope, test)?;
            let body = translate_in_new_scope(ctx, scope, term.child(1)?, "body")?;
            Ok(vec![Stmt::While { test, body }])
        }
        "repeat_while_stmt" => {
            term.expect_children(2, 2)?;
            let body = translate_in_new_scope(ctx, scope, term.child(0)?, "body")?;
            let test = translate_value(ctx, scope, term.child(1)?, &mut None)?;
            let test = read(ctx, scope, test)?;
            Ok(vec![Stmt::DoWhile { body, test }])
        }
        "for_each_stmt" => translate_for_each(ctx, scope, term),
        "switch_stmt" => translate_switch(ctx, scope, term),
        "throw_stmt" => {
            term.expect_children(1, 1)?;
            let value = translate_value(ctx, scope, term.child(0)?, &mut None)?;
            Ok(vec![Stmt::Throw(read(ctx, scope, value)?)])
        }
        "do_catch_stmt" => translate_do_catch(ctx, scope, term),
        "break_stmt" => Ok(vec![Stmt::Break]),
        "continue_stmt" => Ok(vec![Stmt::Continue]),
        "fallthrough_stmt" => Err(CompileError::new(
            "TRM059",
            "fallthrough is not supported",
        )),
        "func_decl" => {
            register_function(ctx, term, false)?;
            Ok(Vec::new())
        }
        "struct_decl" | "enum_decl" | "class_decl" => Err(CompileError::new(
            "TRM050",
            format!("{} is only supported at the top level", term.name),
        )),
        "protocol_decl" | "extension_decl" | "typealias_decl" | "import_decl"
        | "accessor_decl" | "enum_case_decl" | "enum_element_decl" | "precedence_group_decl"
        | "infix_operator_decl" => Ok(Vec::new()),
        _ => translate_expression_statement(ctx, scope, term),
    }
}

/// 文の列を翻訳する。`defer` 以降の文は try/finally の本体になる。
pub(crate) fn translate_statements(
    ctx: &mut Context,
    scope: ScopeId,
    terms: &[Term],
) -> CResult<Vec<Stmt>> {
    translate_sequence(ctx, scope, terms, None)
}

/// `trailing` は列の後ろに続く項（最上位の `var_decl` は top_level_code_decl の外に並ぶ）。
fn translate_sequence(
    ctx: &mut Context,
    scope: ScopeId,
    terms: &[Term],
    trailing: Option<&Term>,
) -> CResult<Vec<Stmt>> {
    let mut out = Vec::new();
    for (i, term) in terms.iter().enumerate() {
        if term.name == "defer_stmt" {
            let deferred = term
                .children
                .iter()
                .find(|c| c.name == "func_decl")
                .and_then(body_of)
                .ok_or_else(|| CompileError::new("TRM060", "defer statement without a body"))?;
            let finalizer = translate_in_new_scope(ctx, scope, deferred, "deferred")?;
            let block = translate_sequence(ctx, scope, &terms[i + 1..], trailing)?;
            out.push(Stmt::Try {
                block,
                handler: None,
                finalizer: Some(finalizer),
            });
            return Ok(out);
        }
        let next = terms.get(i + 1).or(trailing);
        out.extend(translate_statement(ctx, scope, term, next)?);
    }
    Ok(out)
}

/// ソースファイルの Term を Program に翻訳する。
pub fn compile_term_to_program(ctx: &mut Context, root: &Term) -> CResult<Program> {
    let terms: Vec<Term> = if root.name == "source_file" {
        root.children.clone()
    } else {
        vec![root.clone()]
    };
    let scope = ctx.root();
    let nominals = register_declarations(ctx, &terms)?;
    let mut exported = Vec::new();
    for term in terms.iter().filter(|t| t.name == "func_decl") {
        if let Some(export) = register_function(ctx, term, true)? {
            exported.push(export);
        }
    }

    let mut body = Vec::new();
    for nominal in &nominals {
        reify_type(ctx, scope, &Type::name(nominal.name.clone()))?;
        if nominal.kind == NominalKind::Class {
            body.push(class_statement(ctx, nominal)?);
        }
    }
    for (name, arity, builder) in exported {
        emit_function(ctx, &name, arity, builder, true)?;
    }
    let remaining: Vec<Term> = terms
        .into_iter()
        .filter(|t| {
            t.name != "func_decl"
                && t.name != "protocol_decl"
                && t.name != "extension_decl"
                && NominalKind::of(&t.name).is_none()
        })
        .collect();
    body.extend(translate_statements(ctx, scope, &remaining)?);
    log::debug!("translated {} top-level statements", body.len());
    let body = merge_declarations(ctx.emit_scope(scope, body));
    Ok(Program { body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_ast;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_program, PrinterOptions};

    fn compile(source: &str) -> String {
        let mut ctx = new_context_with_builtins();
        let term = parse_ast(source).expect("parse");
        let program = compile_term_to_program(&mut ctx, &term).expect("compile");
        print_program(&program, &PrinterOptions::default())
    }

    #[test]
    /// 公開関数は export 付きの関数宣言になる
    fn public_function_is_exported() {
        let out = compile(
            r#"(source_file
  (func_decl "answer()" interface type='() -> Int' access=public
    (parameter_list)
    (brace_stmt
      (return_stmt
        (integer_literal_expr type='Int' value=42)))))"#,
        );
        assert!(out.contains("export function answer()"), "{}", out);
        assert!(out.contains("return 42;"), "{}", out);
    }

    #[test]
    /// 最上位の let は const 宣言になる
    fn top_level_let_binding() {
        let out = compile(
            r#"(source_file
  (top_level_code_decl
    (brace_stmt
      (pattern_binding_decl
        (pattern_named type='Int' 'x')
        (integer_literal_expr type='Int' value=3))
      (var_decl "x" type='Int' interface type='Int' let storage_kind=stored))))"#,
        );
        assert!(out.contains("const x = 3;"), "{}", out);
    }

    #[test]
    /// switch 本体の break は do-while で抜ける
    fn switch_break_detection() {
        let body = parse_ast(
            r#"(brace_stmt
  (if_stmt (boolean_literal_expr type='Bool' value=true)
    (brace_stmt (break_stmt))))"#,
        )
        .expect("parse");
        assert!(has_switch_break(&body.children));
        let looped = parse_ast(
            r#"(brace_stmt
  (while_stmt (boolean_literal_expr type='Bool' value=true)
    (brace_stmt (break_stmt))))"#,
        )
        .expect("parse");
        assert!(!has_switch_break(&looped.children));
    }

    #[test]
    /// 未対応の文はエラー
    fn fallthrough_is_rejected() {
        let mut ctx = new_context_with_builtins();
        let term = parse_ast("(source_file (top_level_code_decl (brace_stmt (fallthrough_stmt))))")
            .expect("parse");
        let err = compile_term_to_program(&mut ctx, &term).expect_err("fallthrough");
        assert_eq!(err.code(), "TRM059");
    }
}
