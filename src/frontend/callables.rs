// パス: src/frontend/callables.rs
// 役割: func_decl・closure_expr・constructor_decl の仮引数と本体を関数ビルダーに変換する
// 意図: 自由関数・メソッド・イニシャライザ・クロージャが同じ引数の写像規則を共有する
// 関連ファイル: src/frontend/mod.rs, src/frontend/decls.rs, src/functions.rs
//! 関数の形と引数の写像
//!
//! 引数列の並び:
//! - 自由関数: `[ジェネリック引数..., 仮引数...]`
//! - インスタンスメソッド: `[self, 仮引数..., ジェネリック引数...]`
//! - 静的メソッド・イニシャライザ: `[仮引数..., ジェネリック引数...]`

use std::rc::Rc;

use crate::ast::Term;
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::{bind_constant, Args, FunctionBuilder};
use crate::js::{Expr, Stmt};
use crate::reified::type_requires_box;
use crate::scope::ScopeId;
use crate::types::{parse_type, Type};
use crate::values::{expr, expression_literal_value, read, statements, Value};

use super::translate_statements;

/// 仮引数一つ。
#[derive(Clone, Debug)]
pub(crate) struct Parameter {
    pub name: String,
    pub ty: Type,
    pub inout: bool,
}

/// 関数宣言から読み取った呼び出し規約。
#[derive(Clone, Debug)]
pub(crate) struct FunctionShape {
    pub name: String,
    pub params: Vec<Parameter>,
    pub generics: Vec<String>,
    pub has_self: bool,
    pub member: bool,
}

impl FunctionShape {
    /// 平坦な引数の個数。
    pub fn arity(&self) -> usize {
        self.params.len() + self.generics.len() + usize::from(self.has_self)
    }
}

/// `increment(number:)` のような宣言名。
pub(crate) fn name_for_function_term(term: &Term) -> CResult<String> {
    term.args.first().cloned().ok_or_else(|| {
        CompileError::new("TRM030", format!("{} does not have a name", term.name))
    })
}

/// 末尾の `(_:)` を外した名前（ラベルなしの参照に合わせる）。
pub(crate) fn strip_unlabeled(name: &str) -> &str {
    let mut rest = name;
    while let Some(stripped) = rest.strip_suffix("(_:)") {
        rest = stripped;
    }
    rest
}

/// `<T, U : P where T : Q>` から型引数名を宣言順に取り出す。
pub(crate) fn generic_names(text: &str) -> Vec<String> {
    let inner = text.trim().trim_start_matches('<').trim_end_matches('>');
    let params = match inner.split_once(" where ") {
        Some((params, _)) => params,
        None => inner,
    };
    let mut out: Vec<String> = Vec::new();
    for param in params.split(',') {
        let name = param.split(':').next().unwrap_or("").trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn parameter(term: &Term) -> CResult<Parameter> {
    let name = term.args.first().cloned().unwrap_or_else(|| "_".to_string());
    let ty = match term.string("type").or_else(|| term.string("interface type")) {
        Some(text) => parse_type(text)?,
        None => Type::void(),
    };
    let inout = term.has_flag("inout") || ty.has_modifier("inout");
    Ok(Parameter { name, ty, inout })
}

/// `parameter` と `parameter_list` の子を、一覧ごとにまとめる。
fn parameter_lists(term: &Term) -> CResult<Vec<Vec<Parameter>>> {
    let mut lists = Vec::new();
    let mut loose = Vec::new();
    for child in &term.children {
        match child.name.as_str() {
            "parameter" => loose.push(parameter(child)?),
            "parameter_list" => lists.push(
                child
                    .children_named("parameter")
                    .map(parameter)
                    .collect::<CResult<Vec<_>>>()?,
            ),
            _ => {}
        }
    }
    if !loose.is_empty() {
        lists.push(loose);
    }
    Ok(lists)
}

fn is_self_list(list: &[Parameter]) -> bool {
    matches!(list, [only] if only.name == "self")
}

/// 関数・メソッド・イニシャライザの形を読む。
pub(crate) fn function_shape(term: &Term, member: bool) -> CResult<FunctionShape> {
    let name = name_for_function_term(term)?;
    let mut lists = parameter_lists(term)?;
    let mut self_type = None;
    if lists.first().map(|l| is_self_list(l)).unwrap_or(false) {
        let list = lists.remove(0);
        self_type = list.into_iter().next().map(|p| p.ty);
    }
    let constructor = term.name == "constructor_decl";
    let is_static = term.has_flag("static")
        || term.has_flag("type")
        || matches!(self_type.as_ref().map(Type::unmodified), Some(Type::Metatype { .. }));
    let generics = term.args.get(1).map(|s| generic_names(s)).unwrap_or_default();
    Ok(FunctionShape {
        name,
        params: lists.into_iter().flatten().collect(),
        generics,
        has_self: member && !constructor && !is_static,
        member,
    })
}

/// 仮引数をスコープに対応付ける。返り値は引数の退避に必要な前置きの文。
pub(crate) fn apply_parameter_mappings(
    ctx: &mut Context,
    scope: ScopeId,
    params: &[Parameter],
    args: &Args,
    offset: usize,
) -> CResult<Vec<Stmt>> {
    let mut prefix = Vec::new();
    for (i, param) in params.iter().enumerate() {
        let value = args.named(ctx, offset + i, Some(&param.name))?;
        let mapped = if param.inout {
            let ty = param.ty.unmodified().clone();
            match value {
                boxed @ Value::Boxed { .. } => boxed,
                other if type_requires_box(ctx, scope, &ty)? => {
                    let place = read(ctx, scope, other)?;
                    Value::boxed(expr(Expr::index(place, Expr::num(0.0))), ty)
                }
                other => Value::boxed(other, ty),
            }
        } else {
            match value {
                value @ (Value::Type(_) | Value::Conformance { .. } | Value::Callable { .. }) => {
                    value
                }
                value @ Value::Direct(Expr::Ident(_) | Expr::This) => value,
                Value::Direct(e) if expression_literal_value(&e).is_some() => Value::Direct(e),
                other => bind_constant(ctx, scope, &param.name, other, &mut prefix)?,
            }
        };
        ctx.map_value(scope, param.name.clone(), mapped);
    }
    Ok(prefix)
}

/// 本体の文列を値にする。
pub(crate) fn body_value(
    ctx: &mut Context,
    scope: ScopeId,
    prefix: Vec<Stmt>,
    body: &Term,
) -> CResult<Value> {
    let mut stmts = prefix;
    stmts.extend(translate_statements(ctx, scope, &body.children)?);
    Ok(statements(ctx.emit_scope(scope, stmts)))
}

/// 宣言の形と本体から関数ビルダーを作る。呼び出しごとに新しいインラインスコープで展開する。
pub(crate) fn function_builder(shape: Rc<FunctionShape>, body: Rc<Term>) -> FunctionBuilder {
    Rc::new(move |ctx, scope, args, name| {
        let inner = ctx.new_inline_scope(name, scope);
        let mut prefix = Vec::new();
        let mut offset = 0;
        if shape.has_self {
            let target = args.named(ctx, 0, Some("self"))?;
            let target = match target {
                value @ (Value::Direct(_) | Value::Boxed { .. } | Value::Type(_)) => value,
                other => bind_constant(ctx, inner, "self", other, &mut prefix)?,
            };
            ctx.map_value(inner, "self", target);
            offset = 1;
        }
        let generic_offset = if shape.member {
            offset + shape.params.len()
        } else {
            let start = offset;
            offset += shape.generics.len();
            start
        };
        for (i, generic) in shape.generics.iter().enumerate() {
            let value = args.named(ctx, generic_offset + i, Some(generic))?;
            ctx.map_value(inner, generic.clone(), value);
        }
        prefix.extend(apply_parameter_mappings(ctx, inner, &shape.params, args, offset)?);
        body_value(ctx, inner, prefix, &body)
    })
}

/// 本体を持つ子（brace_stmt）。
pub(crate) fn body_of(term: &Term) -> Option<&Term> {
    term.children.iter().rev().find(|c| c.name == "brace_stmt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_ast;

    #[test]
    /// 型引数名は where 節を除いて重複なく取り出す
    fn generic_names_from_signature() {
        assert_eq!(generic_names("<T where T : Numeric>"), vec!["T".to_string()]);
        assert_eq!(
            generic_names("<Key : Hashable, Value>"),
            vec!["Key".to_string(), "Value".to_string()]
        );
    }

    #[test]
    /// ラベルなしの括弧だけが外れる
    fn strips_unlabeled_suffix() {
        assert_eq!(strip_unlabeled("describe(_:)"), "describe");
        assert_eq!(strip_unlabeled("increment(number:)"), "increment(number:)");
    }

    #[test]
    /// self だけの仮引数リストはメソッドの self として扱う
    fn method_shape_drops_self_list() {
        let term = parse_ast(
            r#"(func_decl "moveBy(x:)" interface type='(inout Point) -> (Int) -> ()' mutating
  (parameter_list (parameter "self" type='inout Point'))
  (parameter_list (parameter "x" apiName=x type='Int'))
  (brace_stmt))"#,
        )
        .expect("parse");
        let shape = function_shape(&term, true).expect("shape");
        assert!(shape.has_self);
        assert_eq!(shape.params.len(), 1);
        assert_eq!(shape.arity(), 2);

        let term = parse_ast(
            r#"(func_decl "make()" type
  (parameter_list (parameter "self" type='Point.Type'))
  (parameter_list)
  (brace_stmt))"#,
        )
        .expect("parse");
        let shape = function_shape(&term, true).expect("shape");
        assert!(!shape.has_self);
        assert_eq!(shape.arity(), 0);
    }

    #[test]
    /// inout 仮引数は型の修飾子からも判定する
    fn inout_parameters() {
        let term = parse_ast(
            r#"(func_decl "bump(_:)"
  (parameter_list (parameter "value" type='inout Int'))
  (brace_stmt))"#,
        )
        .expect("parse");
        let shape = function_shape(&term, false).expect("shape");
        assert!(shape.params[0].inout);
        assert_eq!(shape.params[0].ty.unmodified(), &Type::name("Int"));
    }
}
