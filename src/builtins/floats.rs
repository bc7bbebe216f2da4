// パス: src/builtins/floats.rs
// 役割: Double / Float の関数表
// 意図: IEEE 754 の演算は JavaScript の number にそのまま任せる
// 関連ファイル: src/builtins/mod.rs, src/builtins/integers.rs
//! 浮動小数点数型

use crate::context::Context;
use crate::errors::CResult;
use crate::js::{Expr, Stmt, VarKind};
use crate::reified::{build_conformances, FunctionMap, PossibleRepresentation, ReifiedType};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    binary, call_expression, conditional, expression_literal_value, read, statements,
    transform_statements, unary, LiteralValue, Value,
};

use super::common::{binary_builtin, method, property, split, update_builtin};

/// `Number(text)` が NaN なら null。リテラルは畳み込む。
fn parse_number(ctx: &mut Context, scope: ScopeId, text: Value) -> CResult<Value> {
    if let Value::Direct(e) | Value::Expression(e) = &text {
        if let Some(LiteralValue::Str(s)) = expression_literal_value(e) {
            return Ok(match s.trim().parse::<f64>() {
                Ok(n) if !s.trim().is_empty() => Value::num(n),
                _ => Value::null(),
            });
        }
    }
    let name = ctx.reserve_unique(scope, "number")?;
    let declared = name.clone();
    let parsed = call_expression(ctx, scope, Expr::ident("Number"), vec![text])?;
    let mut stmts = transform_statements(ctx, scope, parsed, &mut |_, _, e| {
        Ok(vec![Stmt::var(VarKind::Const, declared.clone(), Some(e))])
    })?;
    let number = Value::ident(name);
    let nan = binary(ctx, scope, "!==", number.clone(), number.clone())?;
    let result = conditional(ctx, scope, nan, Value::null(), number)?;
    stmts.push(Stmt::ret(read(ctx, scope, result)?));
    Ok(statements(stmts))
}

pub fn build_floating_type(ctx: &Context, name: &str) -> ReifiedType {
    let mut functions = FunctionMap::new();
    for key in [
        "init(_builtinIntegerLiteral:)",
        "init(_builtinFloatLiteral:)",
        "init(integerLiteral:)",
        "init(floatLiteral:)",
    ] {
        functions.insert(
            key.into(),
            method(&["value"], |_, _, args| {
                let [value] = split(args);
                Ok(value)
            }),
        );
    }
    functions.insert(
        "init(_:)".into(),
        method(&["value", "T"], |ctx, scope, args| {
            let [value, source] = split(args);
            let string_source = matches!(
                &source,
                Value::Type(Type::Name(n)) if n == "String" || n == "Substring"
            );
            let string_literal =
                matches!(&value, Value::Direct(Expr::Str(_)) | Value::Expression(Expr::Str(_)));
            let from_string = string_source || string_literal;
            if from_string {
                return parse_number(ctx, scope, value);
            }
            Ok(value)
        }),
    );
    functions.insert(
        "init(exactly:)".into(),
        method(&["value"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    for op in ["+", "*", "/", "%", "<", ">", "<=", ">="] {
        functions.insert(op.into(), binary_builtin(op));
    }
    functions.insert(
        "-".into(),
        method(&["lhs", "rhs"], |ctx, scope, args| {
            if args.len() == 1 {
                let [value] = split(args);
                return unary(ctx, scope, "-", value);
            }
            let [lhs, rhs] = split(args);
            binary(ctx, scope, "-", lhs, rhs)
        }),
    );
    functions.insert("==".into(), binary_builtin("==="));
    functions.insert("!=".into(), binary_builtin("!=="));
    for op in ["+=", "-=", "*=", "/="] {
        functions.insert(op.into(), update_builtin(op));
    }
    functions.insert(
        "...".into(),
        method(&["start", "end"], |_, _, args| Ok(Value::Tuple(args))),
    );
    functions.insert("zero".into(), super::common::constant(Value::num(0.0)));
    functions.insert(
        "hashValue".into(),
        property(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            binary(ctx, scope, "|", value, Value::num(0.0))
        }),
    );
    functions.insert(
        "squareRoot()".into(),
        method(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            call_expression(ctx, scope, Expr::member(Expr::ident("Math"), "sqrt"), vec![value])
        }),
    );
    functions.insert(
        "rounded()".into(),
        method(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            call_expression(ctx, scope, Expr::member(Expr::ident("Math"), "round"), vec![value])
        }),
    );
    functions.insert(
        "description".into(),
        property(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            call_expression(ctx, scope, Expr::ident("String"), vec![value])
        }),
    );
    functions.insert(
        "distance(to:)".into(),
        method(&["self", "other"], |ctx, scope, args| {
            let [this, other] = split(args);
            binary(ctx, scope, "-", other, this)
        }),
    );
    functions.insert(
        "advanced(by:)".into(),
        method(&["self", "n"], |ctx, scope, args| {
            let [this, n] = split(args);
            binary(ctx, scope, "+", this, n)
        }),
    );

    let explicit = vec![
        ("Equatable", FunctionMap::new()),
        ("Comparable", FunctionMap::new()),
        ("Hashable", FunctionMap::new()),
        ("ExpressibleByIntegerLiteral", FunctionMap::new()),
        ("SignedNumeric", FunctionMap::new()),
        ("FloatingPoint", FunctionMap::new()),
        ("BinaryFloatingPoint", FunctionMap::new()),
        ("Strideable", FunctionMap::new()),
        ("CustomStringConvertible", FunctionMap::new()),
        ("LosslessStringConvertible", FunctionMap::new()),
    ];
    let conformances = build_conformances(ctx, &Value::Type(Type::name(name)), explicit);
    ReifiedType::primitive(name, PossibleRepresentation::NUMBER, Value::num(0.0))
        .with_functions(functions)
        .with_conformances(conformances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::call_method;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};

    #[test]
    /// squareRoot は Math.sqrt を呼ぶ
    fn square_root_calls_math() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let double = Value::Type(Type::name("Double"));
        let value = call_method(&mut ctx, root, &double, "squareRoot()", vec![Value::ident("x")])
            .expect("sqrt");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(print_expr(&e), "Math.sqrt(x)");
    }

    #[test]
    /// 数値でない文字列は null になる
    fn parses_strings() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let double = Value::Type(Type::name("Double"));
        let args = vec![Value::string("abc"), Value::Type(Type::name("String"))];
        let literal = call_method(&mut ctx, root, &double, "init(_:)", args).expect("init");
        let e = read(&mut ctx, root, literal).expect("read");
        assert_eq!(print_expr(&e), "null");
        let args = vec![Value::ident("s"), Value::Type(Type::name("String"))];
        let runtime = call_method(&mut ctx, root, &double, "init(_:)", args).expect("init");
        let stmts = match runtime {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            print_stmts(&stmts),
            "const number = Number(s);\nreturn number !== number ? null : number;\n"
        );
    }
}
