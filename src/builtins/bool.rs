// パス: src/builtins/bool.rs
// 役割: Bool と Hasher の組み込み型
// 意図: 論理演算の短絡評価（右辺は autoclosure）と Hasher の状態更新を JavaScript の演算に写す
// 関連ファイル: src/builtins/mod.rs, src/builtins/protocols.rs
//! Bool / Hasher

use crate::context::Context;
use crate::errors::CResult;
use crate::js::Expr;
use crate::reified::{build_conformances, FunctionMap, PossibleRepresentation, ReifiedType};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    binary, call, call_expression, conditional, expr, logical, member, set, unary, CallKind,
    Value,
};

use super::common::{binary_builtin, finish, method, property, reuse_args, split};

fn short_circuit(op: &'static str) -> crate::functions::FunctionEntry {
    method(&["lhs", "rhs"], move |ctx, scope, args| {
        let [lhs, rhs] = split(args);
        let rhs = call(ctx, scope, rhs, Vec::new(), CallKind::Call)?;
        logical(ctx, scope, op, lhs, rhs)
    })
}

/// `Bool(string)`: `"True"` / `"False"` 以外は nil。
fn parse_bool(ctx: &mut Context, scope: ScopeId, args: Vec<Value>) -> CResult<Value> {
    let (prefix, args) = reuse_args(ctx, scope, args, &["string"])?;
    let [string] = split(args);
    let is_true = binary(ctx, scope, "===", string.clone(), Value::string("True"))?;
    let not_false = binary(ctx, scope, "!==", string, Value::string("False"))?;
    let otherwise = logical(ctx, scope, "&&", not_false, Value::null())?;
    let result = logical(ctx, scope, "||", is_true, otherwise)?;
    finish(ctx, scope, prefix, result)
}

pub fn bool_type(ctx: &Context) -> ReifiedType {
    let mut functions = FunctionMap::new();
    functions.insert(
        "init(_builtinBooleanLiteral:)".into(),
        method(&["value"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    functions.insert("init(_:)".into(), method(&["string"], parse_bool));
    functions.insert("&&".into(), short_circuit("&&"));
    functions.insert("||".into(), short_circuit("||"));
    functions.insert(
        "!".into(),
        method(&["value"], |ctx, scope, args| {
            let [value] = split(args);
            unary(ctx, scope, "!", value)
        }),
    );
    functions.insert(
        "random()".into(),
        method(&[], |ctx, scope, _| {
            let random = call_expression(
                ctx,
                scope,
                Expr::member(Expr::ident("Math"), "random"),
                Vec::new(),
            )?;
            binary(ctx, scope, "<", random, Value::num(0.5))
        }),
    );
    functions.insert(
        "description".into(),
        property(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            conditional(ctx, scope, value, Value::string("True"), Value::string("False"))
        }),
    );

    let mut equatable = FunctionMap::new();
    equatable.insert("==".into(), binary_builtin("==="));
    equatable.insert("!=".into(), binary_builtin("!=="));
    let mut literal = FunctionMap::new();
    literal.insert(
        "init(booleanLiteral:)".into(),
        method(&["value"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    let mut description = FunctionMap::new();
    if let Some(entry) = functions.get("description") {
        description.insert("description".into(), entry.clone());
    }
    let conformances = build_conformances(
        ctx,
        &Value::Type(Type::name("Bool")),
        vec![
            ("Equatable", equatable),
            ("ExpressibleByBooleanLiteral", literal),
            ("CustomStringConvertible", description),
        ],
    );
    ReifiedType::primitive("Bool", PossibleRepresentation::BOOLEAN, Value::boolean(false))
        .with_functions(functions)
        .with_conformances(conformances)
}

/// Hasher は一要素配列 `[state]`。
pub fn hasher_type() -> ReifiedType {
    let mut functions = FunctionMap::new();
    functions.insert(
        "combine(_:)".into(),
        method(&["hasher", "value"], |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["hasher", "value"])?;
            let [hasher, value] = split(args);
            let state = member(ctx, scope, hasher, Value::num(0.0))?;
            let shifted = binary(ctx, scope, "<<", state.clone(), Value::num(5.0))?;
            let added = binary(ctx, scope, "+", shifted, value)?;
            let next = binary(ctx, scope, "-", added, state.clone())?;
            let written = set(ctx, scope, state, next, "=")?;
            finish(ctx, scope, prefix, written)
        }),
    );
    functions.insert(
        "finalize()".into(),
        method(&["hasher"], |ctx, scope, args| {
            let [hasher] = split(args);
            let state = member(ctx, scope, hasher, Value::num(0.0))?;
            binary(ctx, scope, "|", state, Value::num(0.0))
        }),
    );
    ReifiedType::new("Hasher", PossibleRepresentation::ARRAY)
        .with_default(|_, _, _| Ok(expr(Expr::Array(vec![Expr::num(0.0)]))))
        .with_copy(|ctx, scope, value| {
            let e = crate::values::read(ctx, scope, value)?;
            Ok(expr(Expr::call(Expr::member(e, "slice"), Vec::new())))
        })
        .with_functions(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::{call_method, get_property};
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};
    use crate::values::read;

    #[test]
    /// description は True / False になる
    fn description_uses_capitalized_words() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = Value::Type(Type::name("Bool"));
        let value = get_property(&mut ctx, root, &parent, "description", vec![Value::ident("b")])
            .expect("description");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "b ? \"True\" : \"False\"");
    }

    #[test]
    /// 文字列からの変換は True / False 以外で null
    fn parses_from_string() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = Value::Type(Type::name("Bool"));
        let value = call_method(&mut ctx, root, &parent, "init(_:)", vec![Value::ident("s")])
            .expect("init");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "s === \"True\" || s !== \"False\" && null");
    }

    #[test]
    /// Hasher の combine は状態を一度だけ読み書きする
    fn hasher_combine_updates_state() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let parent = Value::Type(Type::name("Hasher"));
        let value = call_method(
            &mut ctx,
            root,
            &parent,
            "combine(_:)",
            vec![Value::ident("h"), Value::num(7.0)],
        )
        .expect("combine");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(print_stmts(&stmts), "h[0] = (h[0] << 5) + 7 - h[0];\n");
    }
}
