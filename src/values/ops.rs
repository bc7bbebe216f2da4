// パス: src/values/ops.rs
// 役割: 値同士の演算（呼び出し・メンバー参照・二項/論理/単項演算・代入・更新）
// 意図: 各演算が前置きの文を評価順どおりに巻き上げ、結果を値として返す
// 関連ファイル: src/values/read.rs, src/functions.rs, src/reified.rs
//! 値の演算
//!
//! - `call` は関数参照を関数表（自由関数）または親の型の表（メンバー・プロトコル）で解決する。
//! - inout 引数は箱を要する型なら一要素配列で渡し、呼び出し後に書き戻す。
//! - `set` と `update` は代入先の種類（箱・直接・添字）ごとに書き込み方を変える。

use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::{emit_function, flat_arity, Args, FunctionEntry};
use crate::js::{Expr, Stmt, VarKind};
use crate::reified::{type_from_value, type_requires_box, Dispatch};
use crate::scope::{mangle_name, ScopeId};
use crate::types::Type;

use super::literal::expression_literal_value;
use super::read::{ignore, prepend_statements, read, reuse, reuse_expr, transform, transform_all};
use super::{expr, statements, CallKind, Value};

enum Resolved {
    Entry {
        entry: FunctionEntry,
        prepend: bool,
        key: String,
    },
    Runtime(Expr),
}

fn resolve(
    ctx: &mut Context,
    scope: ScopeId,
    name: &str,
    parent: Option<&Value>,
) -> CResult<Resolved> {
    match parent {
        None => match ctx.functions.get(name) {
            Some(entry) => Ok(Resolved::Entry {
                entry: entry.clone(),
                prepend: true,
                key: name.to_string(),
            }),
            None => Err(CompileError::new(
                "VAL010",
                format!("Could not find function to call for {}", name),
            )),
        },
        Some(parent @ (Value::Type(_) | Value::Conformance { .. })) => {
            let reified = type_from_value(ctx, scope, parent)?;
            if let Dispatch::Runtime(object) = &reified.dispatch {
                return Ok(Resolved::Runtime(object.clone()));
            }
            let entry = reified.function(name).ok_or_else(|| {
                CompileError::new(
                    "VAL011",
                    format!("{} does not have a {} function", reified.name, name),
                )
            })?;
            Ok(Resolved::Entry {
                entry,
                prepend: matches!(reified.dispatch, Dispatch::Protocol(_)),
                key: format!("{}.{}", reified.name, name),
            })
        }
        Some(other) => {
            let object = read(ctx, scope, other.clone())?;
            Ok(Resolved::Runtime(object))
        }
    }
}

/// 関数参照を値として読む（関数として出力し、その識別子を返す）。
pub(crate) fn function_reference(ctx: &mut Context, scope: ScopeId, value: Value) -> CResult<Expr> {
    let (name, parent, ty, substitutions) = match value {
        Value::Function {
            name,
            parent,
            ty,
            substitutions,
        } => (name, parent, ty, substitutions),
        other => {
            return Err(CompileError::new(
                "VAL012",
                format!("Could not find function to read for {}", other.kind()),
            ))
        }
    };
    match resolve(ctx, scope, &name, parent.as_deref())? {
        Resolved::Runtime(object) => Ok(Expr::member(object, mangle_name(&name))),
        Resolved::Entry {
            entry,
            prepend,
            key,
        } => {
            let extra = if prepend { substitutions.len() } else { 0 };
            let ident = match entry {
                FunctionEntry::Global {
                    key, arity, builder, ..
                } => emit_function(ctx, &key, arity, builder, false)?,
                other => {
                    let builder = other.builder(CallKind::Call, &name)?;
                    let arity = flat_arity(&ty, parent.is_some()).map(|n| n + extra);
                    emit_function(ctx, &key, arity, builder, false)?
                }
            };
            if prepend && !substitutions.is_empty() {
                let mut bound = vec![Expr::Null];
                for sub in substitutions {
                    bound.push(read(ctx, scope, sub)?);
                }
                Ok(Expr::call(
                    Expr::member(Expr::ident(ident), "bind"),
                    bound,
                ))
            } else {
                Ok(Expr::ident(ident))
            }
        }
    }
}

/// 値を呼び出す。
pub fn call(
    ctx: &mut Context,
    scope: ScopeId,
    target: Value,
    args: Vec<Value>,
    kind: CallKind,
) -> CResult<Value> {
    match target {
        Value::Function {
            name,
            parent,
            substitutions,
            ..
        } => match resolve(ctx, scope, &name, parent.as_deref())? {
            Resolved::Entry { entry, prepend, .. } => {
                let builder = entry.builder(kind, &name)?;
                // 自由関数・プロトコルは置換が先頭、具象型のメンバーは末尾
                let all = if prepend {
                    substitutions.into_iter().chain(args).collect::<Vec<_>>()
                } else {
                    args.into_iter().chain(substitutions).collect()
                };
                builder(ctx, scope, &Args::Values(&all), &name)
            }
            Resolved::Runtime(object) => {
                // 引数なしの項目は witness table のプロパティ
                let callee = Expr::member(object, mangle_name(&name));
                if args.is_empty() {
                    return Ok(expr(callee));
                }
                call_expression(ctx, scope, callee, args)
            }
        },
        Value::Callable { body, .. } => body(ctx, scope, &Args::Values(&args)),
        other => {
            let mut all = vec![other];
            all.extend(args);
            transform_all(ctx, scope, all, &mut |_, _, mut exprs| {
                let callee = exprs.remove(0);
                Ok(expr(Expr::call(callee, exprs)))
            })
        }
    }
}

/// 型（またはプロトコル）のメンバー関数を呼ぶ。
pub fn call_member(
    ctx: &mut Context,
    scope: ScopeId,
    parent: Value,
    name: &str,
    args: Vec<Value>,
) -> CResult<Value> {
    let target = Value::member_function(parent, name, Type::void());
    call(ctx, scope, target, args, CallKind::Call)
}

/// 実際の JavaScript 関数を呼ぶ式。inout 引数は箱で渡して書き戻す。
pub fn call_expression(
    ctx: &mut Context,
    scope: ScopeId,
    callee: Expr,
    args: Vec<Value>,
) -> CResult<Value> {
    let mut before: Vec<Stmt> = Vec::new();
    let mut after: Vec<Stmt> = Vec::new();
    let mut passed = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Boxed { contents, ty } => {
                if !type_requires_box(ctx, scope, &ty)? {
                    passed.push(*contents);
                    continue;
                }
                if let Value::Direct(Expr::Member {
                    object,
                    property,
                    computed: true,
                }) = contents.as_ref()
                {
                    if matches!(object.as_ref(), Expr::Ident(_))
                        && matches!(property.as_ref(), Expr::Num(n) if *n == 0.0)
                    {
                        passed.push(Value::Direct(*object.clone()));
                        continue;
                    }
                }
                let name = ctx.reserve_unique(scope, "inout")?;
                let current = read(ctx, scope, (*contents).clone())?;
                before.push(Stmt::var(
                    VarKind::Const,
                    name.clone(),
                    Some(Expr::Array(vec![current])),
                ));
                let written = set(
                    ctx,
                    scope,
                    *contents,
                    Value::Direct(Expr::index(Expr::ident(name.clone()), Expr::Num(0.0))),
                    "=",
                )?;
                after.extend(ignore(ctx, scope, written)?);
                passed.push(Value::ident(name));
            }
            other => passed.push(other),
        }
    }
    let call_value = transform_all(ctx, scope, passed, &mut |_, _, exprs| {
        Ok(expr(Expr::call(callee.clone(), exprs)))
    })?;
    if before.is_empty() && after.is_empty() {
        return Ok(call_value);
    }
    let mut stmts = before;
    let result = crate::functions::bind_constant(ctx, scope, "result", call_value, &mut stmts)?;
    stmts.extend(after);
    stmts.push(Stmt::ret(read(ctx, scope, result)?));
    Ok(Value::Statements(stmts))
}

/// `object[property]`（識別子として書けるキーなら `object.property`）。
pub fn member(ctx: &mut Context, scope: ScopeId, object: Value, property: Value) -> CResult<Value> {
    if let (Value::Tuple(items), Value::Direct(Expr::Num(n))) = (&object, &property) {
        if let Some(item) = items.get(*n as usize) {
            return Ok(item.clone());
        }
    }
    transform_all(ctx, scope, vec![object, property], &mut |_, _, mut exprs| {
        let property = exprs.pop().unwrap_or_else(Expr::undefined);
        let object = exprs.pop().unwrap_or_else(Expr::undefined);
        Ok(expr(match property {
            Expr::Str(name) if crate::js::printer::is_valid_identifier(&name) => {
                Expr::member(object, name)
            }
            other => Expr::index(object, other),
        }))
    })
}

/// 名前でフィールドを参照する。
pub fn field(ctx: &mut Context, scope: ScopeId, object: Value, name: &str) -> CResult<Value> {
    member(ctx, scope, object, Value::string(name))
}

pub fn binary(
    ctx: &mut Context,
    scope: ScopeId,
    op: &'static str,
    left: Value,
    right: Value,
) -> CResult<Value> {
    transform_all(ctx, scope, vec![left, right], &mut |_, _, mut exprs| {
        let right = exprs.pop().unwrap_or_else(Expr::undefined);
        let left = exprs.pop().unwrap_or_else(Expr::undefined);
        Ok(expr(Expr::binary(op, left, right)))
    })
}

/// 短絡評価を保つため、右辺は巻き上げずに式として読む。
pub fn logical(
    ctx: &mut Context,
    scope: ScopeId,
    op: &'static str,
    left: Value,
    right: Value,
) -> CResult<Value> {
    let mut right = Some(right);
    transform(ctx, scope, left, &mut |ctx, scope, l| {
        let r = read(ctx, scope, right.take().unwrap_or_else(Value::undefined))?;
        Ok(expr(Expr::logical(op, l, r)))
    })
}

pub fn unary(ctx: &mut Context, scope: ScopeId, op: &'static str, value: Value) -> CResult<Value> {
    transform(ctx, scope, value, &mut |_, _, e| Ok(expr(Expr::unary(op, e))))
}

pub fn conditional(
    ctx: &mut Context,
    scope: ScopeId,
    test: Value,
    consequent: Value,
    alternate: Value,
) -> CResult<Value> {
    let mut branches = Some((consequent, alternate));
    transform(ctx, scope, test, &mut |ctx, scope, t| {
        let (c, a) = branches
            .take()
            .unwrap_or_else(|| (Value::undefined(), Value::undefined()));
        if let Some(v) = expression_literal_value(&t) {
            return Ok(if v.truthy() { c } else { a });
        }
        let c = read(ctx, scope, c)?;
        let a = read(ctx, scope, a)?;
        Ok(expr(Expr::conditional(t, c, a)))
    })
}

/// 遅延コピー。実際の複製は読み出し時に型の `copy` で行う。
pub fn copy(value: Value, ty: Type) -> Value {
    Value::copied(value, ty)
}

fn base_operator(op: &str) -> Option<&'static str> {
    Some(match op {
        "+=" => "+",
        "-=" => "-",
        "*=" => "*",
        "/=" => "/",
        "%=" => "%",
        "<<=" => "<<",
        ">>=" => ">>",
        ">>>=" => ">>>",
        "&=" => "&",
        "|=" => "|",
        "^=" => "^",
        _ => return None,
    })
}

/// 代入。`op` は `=` か複合代入演算子。
pub fn set(
    ctx: &mut Context,
    scope: ScopeId,
    dest: Value,
    source: Value,
    op: &'static str,
) -> CResult<Value> {
    match dest {
        Value::Boxed { contents, .. } => set(ctx, scope, *contents, source, op),
        Value::Direct(Expr::This) => Err(CompileError::new(
            "VAL020",
            "Cannot assign to this",
        )),
        Value::Direct(target)
        | Value::Expression(target @ (Expr::Ident(_) | Expr::Member { .. })) => {
            let result = transform(ctx, scope, source, &mut |_, _, s| {
                let one = matches!(s, Expr::Num(n) if n == 1.0);
                Ok(Value::Expression(match op {
                    "+=" if one => Expr::update("++", true, target.clone()),
                    "-=" if one => Expr::update("--", true, target.clone()),
                    _ => Expr::assign(op, target.clone(), s),
                }))
            })?;
            Ok(statements(ignore(ctx, scope, result)?))
        }
        Value::Subscript {
            getter,
            setter,
            args,
            ty,
        } => {
            if let Some(base) = base_operator(op) {
                let mut source = Some(source);
                let place = Value::Subscript {
                    getter,
                    setter,
                    args,
                    ty,
                };
                return update(ctx, scope, place, &mut |ctx, scope, current| {
                    let rhs = source.take().unwrap_or_else(Value::undefined);
                    binary(ctx, scope, base, current, rhs)
                });
            }
            let mut all = args;
            all.push(source);
            let result = call(ctx, scope, *setter, all, CallKind::Set)?;
            Ok(statements(ignore(ctx, scope, result)?))
        }
        other => Err(CompileError::new(
            "VAL021",
            format!("Unable to set a {} value", other.kind()),
        )),
    }
}

/// 読み出し・変換・書き戻し。場所の部分式はそれぞれ一度だけ評価される。
pub fn update(
    ctx: &mut Context,
    scope: ScopeId,
    dest: Value,
    updater: &mut dyn FnMut(&mut Context, ScopeId, Value) -> CResult<Value>,
) -> CResult<Value> {
    match dest {
        Value::Boxed { contents, .. } => update(ctx, scope, *contents, updater),
        Value::Direct(target)
        | Value::Expression(target @ (Expr::Ident(_) | Expr::Member { .. })) => {
            let mut stmts = Vec::new();
            let target = match target {
                Expr::Member {
                    object,
                    property,
                    computed,
                } => {
                    let object = if matches!(*object, Expr::Ident(_) | Expr::This) {
                        *object
                    } else {
                        let (first, after) = reuse_expr(ctx, scope, *object, "object")?;
                        if first != after {
                            stmts.push(Stmt::expr(first));
                        }
                        after
                    };
                    let property = if !computed || expression_literal_value(&property).is_some() {
                        *property
                    } else {
                        let (first, after) = reuse_expr(ctx, scope, *property, "property")?;
                        if first != after {
                            stmts.push(Stmt::expr(first));
                        }
                        after
                    };
                    Expr::Member {
                        object: Box::new(object),
                        property: Box::new(property),
                        computed,
                    }
                }
                other => other,
            };
            let next = updater(ctx, scope, Value::Direct(target.clone()))?;
            let assigned = set(ctx, scope, Value::Direct(target), next, "=")?;
            let assigned = ignore(ctx, scope, assigned)?;
            stmts.extend(assigned);
            prepend_statements(ctx, scope, stmts, Value::undefined())
        }
        Value::Subscript {
            getter,
            setter,
            args,
            ..
        } => {
            let mut stmts = Vec::new();
            let mut reused = Vec::with_capacity(args.len() + 1);
            for arg in args {
                let (first, after) = reuse(ctx, scope, arg, "index")?;
                if !matches!(first, Value::Direct(_)) {
                    stmts.extend(ignore(ctx, scope, first)?);
                }
                reused.push(after);
            }
            let current = call(ctx, scope, (*getter).clone(), reused.clone(), CallKind::Get)?;
            let next = updater(ctx, scope, current)?;
            reused.push(next);
            let written = call(ctx, scope, *setter, reused, CallKind::Set)?;
            stmts.extend(ignore(ctx, scope, written)?);
            prepend_statements(ctx, scope, stmts, Value::undefined())
        }
        other => Err(CompileError::new(
            "VAL022",
            format!("Unable to update a {} value", other.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::printer::{print_expr, print_stmts};

    fn stmts_of(value: Value) -> Vec<Stmt> {
        match value {
            Value::Statements(stmts) => stmts,
            other => panic!("expected statements, got {:?}", other),
        }
    }

    #[test]
    /// `+= 1` は前置インクリメントになる
    fn compound_one_becomes_increment() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let v = set(&mut ctx, root, Value::ident("x"), Value::num(1.0), "+=").expect("set");
        assert_eq!(print_stmts(&stmts_of(v)), "++x;\n");
        let v = set(&mut ctx, root, Value::ident("x"), Value::num(2.0), "-=").expect("set");
        assert_eq!(print_stmts(&stmts_of(v)), "x -= 2;\n");
    }

    #[test]
    /// this への代入はエラー
    fn assigning_this_fails() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let err = set(&mut ctx, root, Value::Direct(Expr::This), Value::num(1.0), "=")
            .expect_err("this");
        assert_eq!(err.code(), "VAL020");
    }

    #[test]
    /// 二項演算は前置きを巻き上げ、左辺を先に評価する
    fn binary_hoists_in_order() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let left = expr(Expr::call(Expr::ident("f"), vec![]));
        let right = Value::Statements(vec![
            Stmt::expr(Expr::call(Expr::ident("g"), vec![])),
            Stmt::ret(Expr::ident("y")),
        ]);
        let v = binary(&mut ctx, root, "+", left, right).expect("binary");
        assert_eq!(
            print_stmts(&stmts_of(v)),
            "const element = f();\ng();\nreturn element + y;\n"
        );
    }

    #[test]
    /// 論理演算の右辺は巻き上げない
    fn logical_keeps_short_circuit() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let right = Value::Statements(vec![
            Stmt::expr(Expr::call(Expr::ident("g"), vec![])),
            Stmt::ret(Expr::ident("y")),
        ]);
        let v = logical(&mut ctx, root, "&&", Value::ident("x"), right).expect("logical");
        let e = read(&mut ctx, root, v).expect("read");
        assert_eq!(print_expr(&e), "x && (g(), y)");
    }

    #[test]
    /// 非純粋なオブジェクトのメンバー更新は一時変数を介す
    fn update_reuses_impure_object() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let place = Value::Direct(Expr::member(Expr::call(Expr::ident("f"), vec![]), "x"));
        let v = update(&mut ctx, root, place, &mut |ctx, scope, current| {
            binary(ctx, scope, "*", current, Value::num(2.0))
        })
        .expect("update");
        assert_eq!(
            print_stmts(&stmts_of(v)),
            "object = f();\nobject.x = object.x * 2;\n"
        );
    }

    #[test]
    /// リテラル条件の三項演算は分岐を選ぶ
    fn conditional_folds_literal() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let v = conditional(
            &mut ctx,
            root,
            Value::boolean(false),
            Value::ident("a"),
            Value::ident("b"),
        )
        .expect("conditional");
        assert!(matches!(v, Value::Direct(Expr::Ident(ref n)) if n == "b"));
    }

    #[test]
    /// タプルの要素参照は要素の値をそのまま返す
    fn member_of_tuple_literal() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let tuple = Value::Tuple(vec![Value::ident("a"), Value::ident("b")]);
        let v = member(&mut ctx, root, tuple, Value::num(1.0)).expect("member");
        assert!(matches!(v, Value::Direct(Expr::Ident(ref n)) if n == "b"));
    }
}
