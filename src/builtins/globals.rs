// パス: src/builtins/globals.rs
// 役割: 自由関数（print・precondition・??・swap など）と配列の挿入・削除の補助関数
// 意図: 型に属さない標準ライブラリ関数を関数表に登録し、置換（型引数）を先頭で受け取る
// 関連ファイル: src/builtins/mod.rs, src/builtins/array.rs, src/builtins/common.rs
//! 自由関数
//!
//! ジェネリックな関数は `[T, ...]` の順で引数を受け取る。
//! 失敗関数と配列の補助関数はルートに一度だけ出力される関数宣言になる。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::{noinline, Args, FunctionBuilder, FunctionEntry};
use crate::js::{Expr, Stmt, VarKind};
use crate::scope::ScopeId;
use crate::values::{
    binary, call, call_expression, conditional, field, ignore, logical, read, set, statements,
    unary, CallKind, Value,
};

use super::common::{
    builder, call_method, finish, invoke, method, reuse_args, split, trap, unbox, Trap,
};
use super::optional::{optional_is_some, unwrap_optional};

const ARRAY_INSERT_AT: &str = "Swift.(swift-to-js).arrayInsertAt()";
const ARRAY_REMOVE_AT: &str = "Swift.(swift-to-js).arrayRemoveAt()";

fn insert_builder() -> FunctionBuilder {
    builder(&["array", "newElement", "i"], |ctx, scope, args| {
        let [array, element, index] = split(args);
        let length = field(ctx, scope, array.clone(), "length")?;
        let past_end = binary(ctx, scope, ">", index.clone(), length)?;
        let negative = binary(ctx, scope, "<", index.clone(), Value::num(0.0))?;
        let test = logical(ctx, scope, "||", past_end, negative)?;
        let test = read(ctx, scope, test)?;
        let failed = trap(ctx, scope, Trap::ArrayBounds)?;
        let failed = ignore(ctx, scope, failed)?;
        let spliced = invoke(ctx, scope, array, "splice", vec![index, Value::num(0.0), element])?;
        let spliced = ignore(ctx, scope, spliced)?;
        Ok(statements(vec![Stmt::if_else(test, failed, Some(spliced))]))
    })
}

fn remove_builder() -> FunctionBuilder {
    builder(&["array", "i"], |ctx, scope, args| {
        let [array, index] = split(args);
        let length = field(ctx, scope, array.clone(), "length")?;
        let past_end = binary(ctx, scope, ">=", index.clone(), length)?;
        let negative = binary(ctx, scope, "<", index.clone(), Value::num(0.0))?;
        let test = logical(ctx, scope, "||", past_end, negative)?;
        let test = read(ctx, scope, test)?;
        let failed = trap(ctx, scope, Trap::ArrayBounds)?;
        let mut stmts = vec![Stmt::if_else(test, ignore(ctx, scope, failed)?, None)];
        let removed = invoke(ctx, scope, array, "splice", vec![index, Value::num(1.0)])?;
        let first = crate::values::member(ctx, scope, removed, Value::num(0.0))?;
        stmts.push(Stmt::ret(read(ctx, scope, first)?));
        Ok(statements(stmts))
    })
}

/// `$$arrayInsertAt(array, element, i)`
pub fn array_insert_at(
    ctx: &mut Context,
    scope: ScopeId,
    array: Value,
    element: Value,
    index: Value,
) -> CResult<Value> {
    let call = noinline(ARRAY_INSERT_AT, Some(3), insert_builder());
    call(ctx, scope, &Args::Values(&[array, element, index]), ARRAY_INSERT_AT)
}

/// `$$arrayRemoveAt(array, i)`。取り除いた要素を返す。
pub fn array_remove_at(
    ctx: &mut Context,
    scope: ScopeId,
    array: Value,
    index: Value,
) -> CResult<Value> {
    let call = noinline(ARRAY_REMOVE_AT, Some(2), remove_builder());
    call(ctx, scope, &Args::Values(&[array, index]), ARRAY_REMOVE_AT)
}

/// 自動クロージャなら呼び出し、そうでなければ値のまま。
fn force(ctx: &mut Context, scope: ScopeId, value: Value) -> CResult<Value> {
    match value {
        callable @ (Value::Callable { .. } | Value::Function { .. }) => {
            call(ctx, scope, callable, Vec::new(), CallKind::Call)
        }
        other => Ok(other),
    }
}

/// 自動クロージャのメッセージを読む。省略時は既定の文言。
fn message(ctx: &mut Context, scope: ScopeId, value: Value, fallback: &str) -> CResult<Expr> {
    if value.is_direct_undefined() {
        return Ok(Expr::str_lit(fallback));
    }
    let message = force(ctx, scope, value)?;
    read(ctx, scope, message)
}

fn throw_error(message: Expr) -> Stmt {
    Stmt::Throw(Expr::new_expr(Expr::ident("Error"), vec![message]))
}

fn fatal(fallback: &'static str) -> FunctionEntry {
    method(&["message", "file", "line"], move |ctx, scope, args| {
        let [text, _, _] = split(args);
        let text = message(ctx, scope, text, fallback)?;
        Ok(statements(vec![throw_error(text)]))
    })
}

fn unavailable() -> FunctionEntry {
    FunctionEntry::plain(|_, _, _, name| {
        Err(CompileError::new(
            "BLT001",
            format!("{} is not available", name),
        ))
    })
}

fn is_string_literal(value: &Value, text: &str) -> bool {
    matches!(value, Value::Direct(Expr::Str(s)) | Value::Expression(Expr::Str(s)) if s == text)
}

fn print(ctx: &mut Context, scope: ScopeId, args: Vec<Value>) -> CResult<Value> {
    let [items, separator, terminator] = split(args);
    let log = Expr::member(Expr::ident("console"), "log");
    let plain_separator = separator.is_direct_undefined() || is_string_literal(&separator, " ");
    if !terminator.is_direct_undefined() && !is_string_literal(&terminator, "\n") {
        log::debug!("print terminator is ignored");
    }
    let items = read(ctx, scope, items)?;
    match items {
        Expr::Array(elements) if plain_separator => {
            Ok(crate::values::expr(Expr::call(log, elements)))
        }
        other => {
            let separator = if separator.is_direct_undefined() {
                Value::string(" ")
            } else {
                separator
            };
            let joined = invoke(ctx, scope, crate::values::expr(other), "join", vec![separator])?;
            call_expression(ctx, scope, log, vec![joined])
        }
    }
}

/// 自由関数を関数表に登録する。
pub fn add_global_functions(ctx: &mut Context) {
    for kind in Trap::ALL {
        ctx.functions.insert(kind.key().to_string(), kind.entry());
    }
    ctx.functions.insert(
        ARRAY_INSERT_AT.to_string(),
        FunctionEntry::Global {
            key: ARRAY_INSERT_AT.to_string(),
            arity: Some(3),
            builder: insert_builder(),
        },
    );
    ctx.functions.insert(
        ARRAY_REMOVE_AT.to_string(),
        FunctionEntry::Global {
            key: ARRAY_REMOVE_AT.to_string(),
            arity: Some(2),
            builder: remove_builder(),
        },
    );

    let mut add = |name: &str, entry: FunctionEntry| {
        ctx.functions.insert(name.to_string(), entry);
    };
    add(
        "print(_:separator:terminator:)",
        method(&["items", "separator", "terminator"], print),
    );
    add(
        "precondition(_:_:file:line:)",
        method(&["condition", "message", "file", "line"], |ctx, scope, args| {
            let [condition, text, _, _] = split(args);
            let condition = force(ctx, scope, condition)?;
            let failed = unary(ctx, scope, "!", condition)?;
            let failed = read(ctx, scope, failed)?;
            let text = message(ctx, scope, text, "Precondition failed")?;
            Ok(statements(vec![Stmt::if_else(failed, vec![throw_error(text)], None)]))
        }),
    );
    add("preconditionFailure(_:file:line:)", fatal("Precondition failed"));
    add("fatalError(_:file:line:)", fatal("Fatal error"));
    add(
        "??",
        method(&["T", "lhs", "rhs"], |ctx, scope, args| {
            let [ty, lhs, rhs] = split(args);
            let wrapped = match ty {
                Value::Type(ty) => ty,
                other => {
                    return Err(CompileError::new(
                        "BLT002",
                        format!("Expected a type, got a {}", other.kind()),
                    ))
                }
            };
            let (prefix, values) = reuse_args(ctx, scope, vec![lhs], &["lhs"])?;
            let [lhs] = split(values);
            let some = optional_is_some(ctx, scope, lhs.clone(), &wrapped)?;
            let unwrapped = unwrap_optional(ctx, scope, lhs, &wrapped)?;
            let fallback = force(ctx, scope, rhs)?;
            let result = conditional(ctx, scope, some, unwrapped, fallback)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    add(
        "~=",
        method(&["T", "pattern", "value"], |ctx, scope, args| {
            let [ty, pattern, value] = split(args);
            let equatable = Value::conformance(ty, "Equatable");
            call_method(ctx, scope, &equatable, "~=", vec![pattern, value])
        }),
    );
    add(
        "swap(_:_:)",
        method(&["T", "a", "b"], |ctx, scope, args| {
            let [_, a, b] = split(args);
            let (a, b) = (unbox(a), unbox(b));
            let temp = ctx.reserve_unique(scope, "temp")?;
            let current = read(ctx, scope, a.clone())?;
            let mut stmts = vec![Stmt::var(VarKind::Const, temp.clone(), Some(current))];
            let first = set(ctx, scope, a, b.clone(), "=")?;
            stmts.extend(ignore(ctx, scope, first)?);
            let second = set(ctx, scope, b, Value::ident(temp), "=")?;
            stmts.extend(ignore(ctx, scope, second)?);
            Ok(statements(stmts))
        }),
    );
    add(
        "isKnownUniquelyReferenced(_:)",
        method(&[], |_, _, _| Ok(Value::boolean(false))),
    );
    add(
        "withExtendedLifetime(_:_:)",
        FunctionEntry::Plain(Rc::new(|ctx, scope, args, _| {
            let mut values = args.all(ctx)?;
            let body = values.pop().unwrap_or_else(Value::undefined);
            let preserve = values.pop().unwrap_or_else(Value::undefined);
            call(ctx, scope, body, vec![preserve], CallKind::Call)
        })),
    );
    for name in [
        "withUnsafePointer(to:_:)",
        "withUnsafeMutablePointer(to:_:)",
        "withUnsafeBytes(of:_:)",
        "withUnsafeMutableBytes(of:_:)",
        "unsafeDowncast(_:to:)",
        "unsafeBitCast(_:to:)",
        "withVaList(_:_:)",
        "getVaList(_:)",
    ] {
        add(name, unavailable());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};

    fn call_global(ctx: &mut Context, name: &str, args: Vec<Value>) -> CResult<Value> {
        let root = ctx.root();
        let target = Value::function(name, Type::void());
        call(ctx, root, target, args, CallKind::Call)
    }

    #[test]
    /// ?? は左辺を一度だけ評価する
    fn nil_coalescing_reuses_lhs() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_global(
            &mut ctx,
            "??",
            vec![
                Value::Type(Type::name("Int")),
                crate::values::expr(Expr::call(Expr::ident("f"), vec![])),
                Value::num(0.0),
            ],
        )
        .expect("??");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(print_stmts(&stmts), "lhs = f();\nreturn lhs !== null ? lhs : 0;\n");
        assert!(ctx.has_declaration(root, "lhs"));
    }

    #[test]
    /// 要素の挿入は補助関数の呼び出しになり、補助関数はルートに出力される
    fn insert_emits_helper() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = array_insert_at(
            &mut ctx,
            root,
            Value::ident("a"),
            Value::num(1.0),
            Value::ident("i"),
        )
        .expect("insert");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "$$arrayInsertAt(a, 1, i)");
        let helpers = print_stmts(&ctx.emit_scope(root, vec![]));
        assert!(helpers.contains("function $$arrayInsertAt(array, newElement, i)"));
        assert!(helpers.contains("array.splice(i, 0, newElement);"));
        assert!(helpers.contains("function $$arrayBoundsFailed()"));
    }

    #[test]
    /// 安全でないポインタ操作はエラーになる
    fn unsafe_functions_are_rejected() {
        let mut ctx = new_context_with_builtins();
        let err = call_global(&mut ctx, "unsafeBitCast(_:to:)", vec![]).err().expect("error");
        assert_eq!(err.code(), "BLT001");
    }

    #[test]
    /// fatalError は Error を投げる
    fn fatal_error_throws() {
        let mut ctx = new_context_with_builtins();
        let value = call_global(&mut ctx, "fatalError(_:file:line:)", vec![Value::string("boom")])
            .expect("fatal");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(print_stmts(&stmts), "throw new Error(\"boom\");\n");
    }
}
