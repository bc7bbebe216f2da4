// パス: src/builtins/integers.rs
// 役割: 整数型の族（Int・UInt・幅付き整数）の関数表を組み立てる
// 意図: 桁あふれの検査・切り詰め・ビット演算を JavaScript の数値演算に写す
// 関連ファイル: src/builtins/mod.rs, src/builtins/common.rs, src/builtins/protocols.rs
//! 整数型
//!
//! すべて JavaScript の number で表す。`checked` な型の `+ - *` は結果が範囲外なら
//! `$$numericRangeFailed()` を呼ぶ。オペランドの静的な範囲から安全と分かる場合と、
//! 範囲内のリテラルになった場合は検査を省く。`&+` などの演算は `wrap` で切り詰める。

use std::rc::Rc;

use crate::context::Context;
use crate::errors::CResult;
use crate::js::{Expr, Stmt, VarKind};
use crate::reified::{
    build_conformances, reify_type, FunctionMap, PossibleRepresentation, ReifiedType,
};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{
    binary, call_expression, conditional, expr, expression_literal_value, ignore, logical, read,
    set, statements, transform_statements, unary, LiteralValue, Value,
};

use super::common::{
    binary_builtin, finish, method, property, reuse_args, split, trap, update_builtin, Trap,
};

/// 結果を型の幅に切り詰める関数（`x | 0` など）。
pub type Wrap = Rc<dyn Fn(&mut Context, ScopeId, Value) -> CResult<Value>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// 値が数値リテラルならその値。
pub fn literal_number(value: &Value) -> Option<f64> {
    let e = match value {
        Value::Direct(e) | Value::Expression(e) => e,
        _ => return None,
    };
    match expression_literal_value(e) {
        Some(LiteralValue::Num(n)) => Some(n),
        _ => None,
    }
}

/// 型値から静的な範囲を求める（`min` / `max` がリテラルになる整数型だけ）。
pub fn range_for_type(ctx: &mut Context, scope: ScopeId, ty: &Value) -> Option<NumericRange> {
    let ty = match ty {
        Value::Type(ty) => ty.clone(),
        Value::Conformance { ty, .. } => match ty.as_ref() {
            Value::Type(ty) => ty.clone(),
            _ => return None,
        },
        _ => return None,
    };
    let reified = reify_type(ctx, scope, &ty).ok()?;
    let mut bound = |name: &str| -> Option<f64> {
        let entry = reified.function(name)?;
        let builder = entry.builder(crate::values::CallKind::Call, name).ok()?;
        let value = builder(ctx, scope, &crate::functions::Args::Values(&[]), name).ok()?;
        literal_number(&value)
    };
    let min = bound("min")?;
    let max = bound("max")?;
    Some(NumericRange { min, max })
}

/// 値が `dest` に収まらなければ失敗関数を呼ぶ式にする。
///
/// `source` は値が取りうる範囲。`dest` に含まれるなら検査しない。
pub fn integer_range_check(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    source: Option<NumericRange>,
    dest: NumericRange,
) -> CResult<Value> {
    let (greater, less) = match source {
        Some(source) => (source.max > dest.max, source.min < dest.min),
        None => (true, true),
    };
    if !greater && !less {
        return Ok(value);
    }
    if let Some(n) = literal_number(&value) {
        if dest.contains(n) {
            return Ok(value);
        }
    }
    let (prefix, values) = reuse_args(ctx, scope, vec![value], &["integer"])?;
    let [integer] = split(values);
    let check = match (greater, less) {
        (true, true) => {
            let low = binary(ctx, scope, "<", integer.clone(), Value::num(dest.min))?;
            let high = binary(ctx, scope, ">", integer.clone(), Value::num(dest.max))?;
            logical(ctx, scope, "||", low, high)?
        }
        (true, false) => binary(ctx, scope, ">", integer.clone(), Value::num(dest.max))?,
        _ => binary(ctx, scope, "<", integer.clone(), Value::num(dest.min))?,
    };
    let failed = trap(ctx, scope, Trap::NumericRange)?;
    let result = conditional(ctx, scope, check, failed, integer)?;
    finish(ctx, scope, prefix, result)
}

/// 一度だけ評価される `let name = value;` を作り、名前を返す。
fn declare_local(
    ctx: &mut Context,
    scope: ScopeId,
    prefix: &str,
    value: Value,
    out: &mut Vec<Stmt>,
) -> CResult<String> {
    let name = ctx.reserve_unique(scope, prefix)?;
    let declared = name.clone();
    out.extend(transform_statements(ctx, scope, value, &mut |_, _, e| {
        Ok(vec![Stmt::var(VarKind::Let, declared.clone(), Some(e))])
    })?);
    Ok(name)
}

/// `parseInt(text, radix)` の結果が NaN なら null。
fn parse_integer(ctx: &mut Context, scope: ScopeId, text: Value, radix: Value) -> CResult<Value> {
    if let (Some(LiteralValue::Str(s)), Some(r)) = (
        match &text {
            Value::Direct(e) | Value::Expression(e) => expression_literal_value(e),
            _ => None,
        },
        literal_number(&radix),
    ) {
        if r == 10.0 {
            return Ok(match s.trim().parse::<i64>() {
                Ok(n) => Value::num(n as f64),
                Err(_) => Value::null(),
            });
        }
    }
    let mut stmts = Vec::new();
    let parsed = call_expression(ctx, scope, Expr::ident("parseInt"), vec![text, radix])?;
    let name = declare_local(ctx, scope, "integer", parsed, &mut stmts)?;
    let integer = Value::ident(name);
    let nan = binary(ctx, scope, "!==", integer.clone(), integer.clone())?;
    let result = conditional(ctx, scope, nan, Value::null(), integer)?;
    stmts.push(Stmt::ret(read(ctx, scope, result)?));
    Ok(statements(stmts))
}

/// 実行時の 1 のビット数: `while (current) { ++count; current &= current - 1; }`
fn nonzero_bit_count(ctx: &mut Context, scope: ScopeId, value: Value) -> CResult<Value> {
    if let Some(n) = literal_number(&value) {
        return Ok(Value::num((n as i64 as i32 as u32).count_ones() as f64));
    }
    let mut stmts = Vec::new();
    let current = Value::ident(declare_local(ctx, scope, "current", value, &mut stmts)?);
    let count = Value::ident(declare_local(ctx, scope, "count", Value::num(0.0), &mut stmts)?);
    let mut body = Vec::new();
    let increment = set(ctx, scope, count.clone(), Value::num(1.0), "+=")?;
    body.extend(ignore(ctx, scope, increment)?);
    let lowered = binary(ctx, scope, "-", current.clone(), Value::num(1.0))?;
    let cleared = set(ctx, scope, current.clone(), lowered, "&=")?;
    body.extend(ignore(ctx, scope, cleared)?);
    stmts.push(Stmt::While {
        test: read(ctx, scope, current)?,
        body,
    });
    stmts.push(Stmt::ret(read(ctx, scope, count)?));
    Ok(statements(stmts))
}

fn leading_zeros_literal(value: i64, bit_width: u32) -> f64 {
    let mut shift = bit_width as i64;
    loop {
        shift -= 1;
        if shift < 0 || (value >> shift) != 0 {
            break;
        }
    }
    (bit_width as i64 - 1 - shift) as f64
}

/// 実行時の先頭 0 ビット数: `while (value >> --shift === 0 && shift >= 0) {}`
fn leading_zero_bit_count(
    ctx: &mut Context,
    scope: ScopeId,
    value: Value,
    bit_width: u32,
) -> CResult<Value> {
    if let Some(n) = literal_number(&value) {
        return Ok(Value::num(leading_zeros_literal(n as i64, bit_width)));
    }
    let (mut stmts, values) = reuse_args(ctx, scope, vec![value], &["value"])?;
    let [value] = split(values);
    let shift = declare_local(
        ctx,
        scope,
        "shift",
        Value::num(bit_width as f64),
        &mut stmts,
    )?;
    let decremented = expr(Expr::update("--", true, Expr::ident(shift.clone())));
    let shifted = binary(ctx, scope, ">>", value, decremented)?;
    let zero = binary(ctx, scope, "===", shifted, Value::num(0.0))?;
    let in_range = binary(ctx, scope, ">=", Value::ident(shift.clone()), Value::num(0.0))?;
    let test = logical(ctx, scope, "&&", zero, in_range)?;
    stmts.push(Stmt::While {
        test: read(ctx, scope, test)?,
        body: Vec::new(),
    });
    let result = binary(
        ctx,
        scope,
        "-",
        Value::num(bit_width as f64 - 1.0),
        Value::ident(shift),
    )?;
    stmts.push(Stmt::ret(read(ctx, scope, result)?));
    Ok(statements(stmts))
}

/// バイト順の反転。8 ビット以下はそのまま。
fn byte_swapped(ctx: &mut Context, scope: ScopeId, value: Value, bit_width: u32) -> CResult<Value> {
    if bit_width <= 8 {
        return Ok(value);
    }
    let (prefix, values) = reuse_args(ctx, scope, vec![value], &["value"])?;
    let [value] = split(values);
    let mut result: Option<Value> = None;
    let width = bit_width as i64;
    let mut i = 0i64;
    while i < width {
        let shift = width - 8 - i * 2;
        let shifted = if shift > 0 {
            binary(ctx, scope, ">>", value.clone(), Value::num(shift as f64))?
        } else {
            binary(ctx, scope, "<<", value.clone(), Value::num(-shift as f64))?
        };
        // 最上位バイトへ送る位置ではマスクが符号ビットを壊すので付けない
        let part = if shift != -24 {
            binary(ctx, scope, "&", shifted, Value::num(((0xFFi64) << i) as f64))?
        } else {
            shifted
        };
        result = Some(match result {
            Some(previous) => binary(ctx, scope, "|", previous, part)?,
            None => part,
        });
        i += 8;
    }
    finish(ctx, scope, prefix, result.unwrap_or_else(|| Value::num(0.0)))
}

/// `[truncated, truncated !== full]`
fn reporting_overflow(
    ctx: &mut Context,
    scope: ScopeId,
    full: Value,
    wrap: &Wrap,
) -> CResult<Value> {
    let (mut prefix, values) = reuse_args(ctx, scope, vec![full], &["full"])?;
    let [full] = split(values);
    let truncated = wrap(ctx, scope, full.clone())?;
    let (more, values) = reuse_args(ctx, scope, vec![truncated], &["truncated"])?;
    prefix.extend(more);
    let [truncated] = split(values);
    let overflow = binary(ctx, scope, "!==", truncated.clone(), full)?;
    finish(ctx, scope, prefix, Value::Tuple(vec![truncated, overflow]))
}

fn truncating_divide(ctx: &mut Context, scope: ScopeId, lhs: Value, rhs: Value) -> CResult<Value> {
    let quotient = binary(ctx, scope, "/", lhs, rhs)?;
    binary(ctx, scope, "|", quotient, Value::num(0.0))
}

/// 整数型の関数表を組み立てる。
///
/// `checked` なら `+ - *` の結果を `[min, max]` で検査する。
/// `wrap` は `&+` などの切り詰めと型変換に使う。
pub fn build_integer_type(
    ctx: &Context,
    name: &str,
    min: f64,
    max: f64,
    bit_width: u32,
    checked: bool,
    wrap: Wrap,
) -> ReifiedType {
    let range = NumericRange { min, max };
    let wider = |low: f64, high: f64| {
        if checked {
            NumericRange {
                min: min - low,
                max: max + high,
            }
        } else {
            range
        }
    };
    let wider_high = wider(0.0, 1.0);
    let wider_low = wider(1.0, 0.0);
    let wider_both = wider(1.0, 1.0);
    let signed = min < 0.0;
    // 符号付きでは負の被演算子で反対側にも溢れる
    let sum_range = if signed { wider_both } else { wider_high };
    let difference_range = if signed { wider_both } else { wider_low };
    // -min は max を一つ超える。符号なしの否定は 0 未満になる
    let negation_range = if signed { wider_high } else { wider_low };
    let self_type = Value::Type(Type::name(name));

    let checked_op = move |op: &'static str, source: NumericRange| {
        method(&["lhs", "rhs"], move |ctx, scope, args| {
            let [lhs, rhs] = split(args);
            let result = binary(ctx, scope, op, lhs, rhs)?;
            integer_range_check(ctx, scope, result, Some(source), range)
        })
    };
    let wrapping_op = |op: &'static str| {
        let wrap = wrap.clone();
        method(&["lhs", "rhs"], move |ctx, scope, args| {
            let [lhs, rhs] = split(args);
            let result = binary(ctx, scope, op, lhs, rhs)?;
            wrap(ctx, scope, result)
        })
    };

    let mut functions = FunctionMap::new();
    functions.insert(
        "init(_builtinIntegerLiteral:)".into(),
        method(&["value"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    functions.insert(
        "init(integerLiteral:)".into(),
        method(&["value"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    functions.insert("+".into(), checked_op("+", sum_range));
    functions.insert(
        "-".into(),
        method(&["lhs", "rhs"], move |ctx, scope, args| {
            // 単項の `-` は引数が一つだけ
            if args.len() == 1 {
                let [value] = split(args);
                let negated = unary(ctx, scope, "-", value)?;
                return integer_range_check(ctx, scope, negated, Some(negation_range), range);
            }
            let [lhs, rhs] = split(args);
            let result = binary(ctx, scope, "-", lhs, rhs)?;
            integer_range_check(ctx, scope, result, Some(difference_range), range)
        }),
    );
    functions.insert("*".into(), checked_op("*", wider_both));
    functions.insert(
        "/".into(),
        method(&["lhs", "rhs"], |ctx, scope, args| {
            let [lhs, rhs] = split(args);
            truncating_divide(ctx, scope, lhs, rhs)
        }),
    );
    for (op, js) in [
        ("%", "%"),
        ("<", "<"),
        (">", ">"),
        ("<=", "<="),
        (">=", ">="),
        ("&", "&"),
        ("|", "|"),
        ("^", "^"),
        (">>", ">>"),
        ("<<", "<<"),
        ("==", "==="),
        ("!=", "!=="),
    ] {
        functions.insert(op.into(), binary_builtin(js));
    }
    functions.insert("+=".into(), update_builtin("+="));
    functions.insert("-=".into(), update_builtin("-="));
    functions.insert("*=".into(), update_builtin("*="));
    {
        let wrap = wrap.clone();
        functions.insert(
            "~".into(),
            method(&["self"], move |ctx, scope, args| {
                let [value] = split(args);
                let inverted = unary(ctx, scope, "~", value)?;
                wrap(ctx, scope, inverted)
            }),
        );
    }
    functions.insert(
        "...".into(),
        method(&["start", "end"], |_, _, args| Ok(Value::Tuple(args))),
    );
    functions.insert(
        "hashValue".into(),
        property(&["self"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    functions.insert("min".into(), super::common::constant(Value::num(min)));
    functions.insert("max".into(), super::common::constant(Value::num(max)));
    functions.insert(
        "zero".into(),
        super::common::constant(Value::num(0.0)),
    );
    functions.insert(
        "bitWidth".into(),
        super::common::constant(Value::num(bit_width as f64)),
    );
    functions.insert(
        "isSigned".into(),
        super::common::constant(Value::boolean(signed)),
    );
    functions.insert(
        "description".into(),
        property(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            call_expression(ctx, scope, Expr::ident("String"), vec![value])
        }),
    );

    // BinaryInteger
    functions.insert(
        "quotientAndRemainder(dividingBy:)".into(),
        method(&["lhs", "rhs"], |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
            let [lhs, rhs] = split(args);
            let quotient = truncating_divide(ctx, scope, lhs.clone(), rhs.clone())?;
            let remainder = binary(ctx, scope, "%", lhs, rhs)?;
            finish(ctx, scope, prefix, Value::Tuple(vec![quotient, remainder]))
        }),
    );
    functions.insert(
        "signum()".into(),
        method(&["self"], move |ctx, scope, args| {
            let (prefix, args) = reuse_args(ctx, scope, args, &["self"])?;
            let [value] = split(args);
            let inner = if signed {
                let negative = binary(ctx, scope, "<", value.clone(), Value::num(0.0))?;
                conditional(ctx, scope, negative, Value::num(-1.0), value.clone())?
            } else {
                value.clone()
            };
            let positive = binary(ctx, scope, ">", value, Value::num(0.0))?;
            let result = conditional(ctx, scope, positive, Value::num(1.0), inner)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "init(truncatingIfNeeded:)".into(),
        {
            let wrap = wrap.clone();
            method(&["source"], move |ctx, scope, args| {
                let [value] = split(args);
                wrap(ctx, scope, value)
            })
        },
    );
    functions.insert(
        "init(clamping:)".into(),
        method(&["value", "T"], move |ctx, scope, args| {
            let [value, source] = split(args);
            let source = range_for_type(ctx, scope, &source);
            let (greater, less) = match source {
                Some(source) => (source.max > range.max, source.min < range.min),
                None => (true, true),
            };
            if !greater && !less {
                return Ok(value);
            }
            let (prefix, values) = reuse_args(ctx, scope, vec![value], &["value"])?;
            let [value] = split(values);
            let mut result = value.clone();
            if less {
                let below = binary(ctx, scope, "<", value.clone(), Value::num(range.min))?;
                result = conditional(ctx, scope, below, Value::num(range.min), result)?;
            }
            if greater {
                let above = binary(ctx, scope, ">", value, Value::num(range.max))?;
                result = conditional(ctx, scope, above, Value::num(range.max), result)?;
            }
            finish(ctx, scope, prefix, result)
        }),
    );
    functions.insert(
        "init(exactly:)".into(),
        method(&["value", "T"], move |ctx, scope, args| {
            let [value, source] = split(args);
            let source = range_for_type(ctx, scope, &source);
            let (greater, less) = match source {
                Some(source) => (source.max > range.max, source.min < range.min),
                None => (true, true),
            };
            if !greater && !less {
                return Ok(value);
            }
            if let Some(n) = literal_number(&value) {
                return Ok(if range.contains(n) && n.fract() == 0.0 {
                    value
                } else {
                    Value::null()
                });
            }
            let (prefix, values) = reuse_args(ctx, scope, vec![value], &["value"])?;
            let [value] = split(values);
            let check = match (greater, less) {
                (true, true) => {
                    let high = binary(ctx, scope, ">", value.clone(), Value::num(range.max))?;
                    let low = binary(ctx, scope, "<", value.clone(), Value::num(range.min))?;
                    logical(ctx, scope, "||", high, low)?
                }
                (true, false) => binary(ctx, scope, ">", value.clone(), Value::num(range.max))?,
                _ => binary(ctx, scope, "<", value.clone(), Value::num(range.min))?,
            };
            let result = conditional(ctx, scope, check, Value::null(), value)?;
            finish(ctx, scope, prefix, result)
        }),
    );
    // `init(_:)` は文字列からの変換と、他の数値型からの範囲検査付き変換を兼ねる
    {
        let wrap = wrap.clone();
        functions.insert(
            "init(_:)".into(),
            method(&["value", "T"], move |ctx, scope, args| {
                let [value, source] = split(args);
                let string_source = matches!(
                    &source,
                    Value::Type(Type::Name(n)) if n == "String" || n == "Substring"
                );
                if string_source
                    || matches!(
                        &value,
                        Value::Direct(Expr::Str(_)) | Value::Expression(Expr::Str(_))
                    )
                {
                    return parse_integer(ctx, scope, value, Value::num(10.0));
                }
                let source_range = range_for_type(ctx, scope, &source);
                let checked = integer_range_check(ctx, scope, value, source_range, range)?;
                if source_range.is_some() {
                    return Ok(checked);
                }
                // 浮動小数点数からは 0 方向へ切り捨てる
                wrap(ctx, scope, checked)
            }),
        );
    }

    // FixedWidthInteger
    functions.insert(
        "init(_:radix:)".into(),
        method(&["text", "radix"], |ctx, scope, args| {
            let [text, radix] = split(args);
            parse_integer(ctx, scope, text, radix)
        }),
    );
    functions.insert(
        "littleEndian".into(),
        property(&["self"], |_, _, args| {
            let [value] = split(args);
            Ok(value)
        }),
    );
    for key in ["bigEndian", "byteSwapped"] {
        functions.insert(
            key.into(),
            property(&["self"], move |ctx, scope, args| {
                let [value] = split(args);
                byte_swapped(ctx, scope, value, bit_width)
            }),
        );
    }
    functions.insert("&+".into(), wrapping_op("+"));
    functions.insert("&-".into(), wrapping_op("-"));
    functions.insert("&*".into(), wrapping_op("*"));
    functions.insert("&<<".into(), wrapping_op("<<"));
    functions.insert("&>>".into(), wrapping_op(">>"));
    for (key, op) in [
        ("addingReportingOverflow(_:)", "+"),
        ("subtractingReportingOverflow(_:)", "-"),
        ("multipliedReportingOverflow(by:)", "*"),
        ("remainderReportingOverflow(dividingBy:)", "%"),
    ] {
        let wrap = wrap.clone();
        functions.insert(
            key.into(),
            method(&["lhs", "rhs"], move |ctx, scope, args| {
                let [lhs, rhs] = split(args);
                let full = binary(ctx, scope, op, lhs, rhs)?;
                reporting_overflow(ctx, scope, full, &wrap)
            }),
        );
    }
    {
        let wrap = wrap.clone();
        functions.insert(
            "dividedReportingOverflow(by:)".into(),
            method(&["lhs", "rhs"], move |ctx, scope, args| {
                let [lhs, rhs] = split(args);
                let full = truncating_divide(ctx, scope, lhs, rhs)?;
                reporting_overflow(ctx, scope, full, &wrap)
            }),
        );
    }
    functions.insert(
        "nonzeroBitCount".into(),
        property(&["self"], |ctx, scope, args| {
            let [value] = split(args);
            nonzero_bit_count(ctx, scope, value)
        }),
    );
    functions.insert(
        "leadingZeroBitCount".into(),
        property(&["self"], move |ctx, scope, args| {
            let [value] = split(args);
            leading_zero_bit_count(ctx, scope, value, bit_width)
        }),
    );
    functions.insert(
        "multipliedFullWidth(by:)".into(),
        method(&["lhs", "rhs"], move |ctx, scope, args| {
            let magnitude = if signed { bit_width - 1 } else { bit_width };
            if bit_width <= 16 {
                let [lhs, rhs] = split(args);
                let product = binary(ctx, scope, "*", lhs, rhs)?;
                let (prefix, values) = reuse_args(ctx, scope, vec![product], &["multiplied"])?;
                let [product] = split(values);
                let high = binary(ctx, scope, ">>", product.clone(), Value::num(magnitude as f64))?;
                let mask = ((1u32 << magnitude) - 1) as f64;
                let low = binary(ctx, scope, "&", product, Value::num(mask))?;
                return finish(ctx, scope, prefix, Value::Tuple(vec![high, low]));
            }
            let (prefix, args) = reuse_args(ctx, scope, args, &["lhs", "rhs"])?;
            let [lhs, rhs] = split(args);
            let product = binary(ctx, scope, "*", lhs.clone(), rhs.clone())?;
            let scaled = binary(ctx, scope, "/", product, Value::num(4294967296.0))?;
            let high = binary(ctx, scope, "|", scaled, Value::num(0.0))?;
            let low = match (literal_number(&lhs), literal_number(&rhs)) {
                (Some(l), Some(r)) => {
                    Value::num((l as i64 as i32).wrapping_mul(r as i64 as i32) as f64)
                }
                _ => call_expression(
                    ctx,
                    scope,
                    Expr::member(Expr::ident("Math"), "imul"),
                    vec![lhs, rhs],
                )?,
            };
            finish(ctx, scope, prefix, Value::Tuple(vec![high, low]))
        }),
    );
    functions.insert(
        "dividingFullWidth(_:)".into(),
        method(&["self", "dividend"], |ctx, scope, _| {
            trap(ctx, scope, Trap::NotImplemented)
        }),
    );
    if !signed {
        functions.insert(
            "magnitude".into(),
            property(&["self"], |_, _, args| {
                let [value] = split(args);
                Ok(value)
            }),
        );
    }

    let integer_protocol = if signed {
        "SignedInteger"
    } else {
        "UnsignedInteger"
    };
    let mut explicit = vec![
        ("Equatable", FunctionMap::new()),
        ("Comparable", FunctionMap::new()),
        ("Hashable", FunctionMap::new()),
        ("ExpressibleByIntegerLiteral", FunctionMap::new()),
        ("AdditiveArithmetic", FunctionMap::new()),
        ("Numeric", FunctionMap::new()),
        ("BinaryInteger", FunctionMap::new()),
        (integer_protocol, FunctionMap::new()),
        ("FixedWidthInteger", FunctionMap::new()),
        ("Strideable", FunctionMap::new()),
        ("CustomStringConvertible", FunctionMap::new()),
        ("LosslessStringConvertible", FunctionMap::new()),
    ];
    if signed {
        explicit.push(("SignedNumeric", FunctionMap::new()));
    }
    let conformances = build_conformances(ctx, &self_type, explicit);
    ReifiedType::primitive(name, PossibleRepresentation::NUMBER, Value::num(0.0))
        .with_functions(functions)
        .with_conformances(conformances)
}

/// `x | 0`（32 ビット符号付き）
pub fn wrap_int32() -> Wrap {
    Rc::new(|ctx, scope, value| binary(ctx, scope, "|", value, Value::num(0.0)))
}

/// `x >>> 0`（32 ビット符号なし）
pub fn wrap_uint32() -> Wrap {
    Rc::new(|ctx, scope, value| binary(ctx, scope, ">>>", value, Value::num(0.0)))
}

/// `(x << s) >> s`（32 ビット未満の符号付き）
pub fn wrap_signed(bit_width: u32) -> Wrap {
    let shift = (32 - bit_width) as f64;
    Rc::new(move |ctx, scope, value| {
        let up = binary(ctx, scope, "<<", value, Value::num(shift))?;
        binary(ctx, scope, ">>", up, Value::num(shift))
    })
}

/// `x & mask`（32 ビット未満の符号なし）
pub fn wrap_unsigned(bit_width: u32) -> Wrap {
    let mask = ((1u64 << bit_width) - 1) as f64;
    Rc::new(move |ctx, scope, value| binary(ctx, scope, "&", value, Value::num(mask)))
}

/// 64 ビット整数は倍精度の範囲で 0 方向へ丸めるだけにする。
pub fn wrap_int64() -> Wrap {
    Rc::new(|ctx, scope, value| {
        call_expression(
            ctx,
            scope,
            Expr::member(Expr::ident("Math"), "trunc"),
            vec![value],
        )
    })
}

/// 組み込みの整数型を名前・範囲・幅・切り詰め関数とともに列挙する。
pub fn integer_types(ctx: &Context) -> Vec<ReifiedType> {
    const SAFE: f64 = 9007199254740991.0;
    vec![
        build_integer_type(ctx, "Int", -2147483648.0, 2147483647.0, 32, true, wrap_int32()),
        build_integer_type(ctx, "Int32", -2147483648.0, 2147483647.0, 32, true, wrap_int32()),
        build_integer_type(ctx, "Int16", -32768.0, 32767.0, 16, true, wrap_signed(16)),
        build_integer_type(ctx, "Int8", -128.0, 127.0, 8, true, wrap_signed(8)),
        build_integer_type(ctx, "Int64", -SAFE, SAFE, 64, true, wrap_int64()),
        build_integer_type(ctx, "UInt", 0.0, 4294967295.0, 32, true, wrap_uint32()),
        build_integer_type(ctx, "UInt32", 0.0, 4294967295.0, 32, true, wrap_uint32()),
        build_integer_type(ctx, "UInt16", 0.0, 65535.0, 16, true, wrap_unsigned(16)),
        build_integer_type(ctx, "UInt8", 0.0, 255.0, 8, true, wrap_unsigned(8)),
        build_integer_type(ctx, "UInt64", 0.0, SAFE, 64, true, wrap_int64()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::common::{call_method, get_property};
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::{print_expr, print_stmts};

    fn int() -> Value {
        Value::Type(Type::name("Int"))
    }

    fn read_expr(ctx: &mut Context, value: Value) -> String {
        let root = ctx.root();
        let e = read(ctx, root, value).expect("read");
        print_expr(&e)
    }

    #[test]
    /// 検査付きの加算は上下どちらに外れても失敗関数を呼ぶ
    fn checked_addition_traps() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int(),
            "+",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("+");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            print_stmts(&stmts),
            "integer = a + b;\nreturn integer < -2147483648 || integer > 2147483647 ? $$numericRangeFailed() : integer;\n"
        );
    }

    #[test]
    /// 範囲内のリテラルになる演算は検査しない
    fn literal_results_skip_check() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(&mut ctx, root, &int(), "+", vec![Value::num(1.0), Value::num(2.0)])
            .expect("+");
        assert_eq!(read_expr(&mut ctx, value), "3");
    }

    #[test]
    /// 折り返し加算は `| 0` で切り詰める
    fn wrapping_addition_truncates() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int(),
            "&+",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("&+");
        assert_eq!(read_expr(&mut ctx, value), "a + b | 0");
    }

    #[test]
    /// 除算は 0 方向への切り捨て
    fn division_truncates() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int(),
            "/",
            vec![Value::ident("a"), Value::ident("b")],
        )
        .expect("/");
        assert_eq!(read_expr(&mut ctx, value), "a / b | 0");
    }

    #[test]
    /// リテラルのビット数は畳み込まれる
    fn bit_counts_fold_literals() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let count = get_property(&mut ctx, root, &int(), "nonzeroBitCount", vec![Value::num(7.0)])
            .expect("count");
        assert_eq!(read_expr(&mut ctx, count), "3");
        let zeros =
            get_property(&mut ctx, root, &int(), "leadingZeroBitCount", vec![Value::num(1.0)])
                .expect("zeros");
        assert_eq!(read_expr(&mut ctx, zeros), "31");
    }

    #[test]
    /// 範囲の狭い型からの変換は検査しない
    fn widening_conversion_is_unchecked() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int(),
            "init(_:)",
            vec![Value::ident("x"), Value::Type(Type::name("Int8"))],
        )
        .expect("init");
        assert_eq!(read_expr(&mut ctx, value), "x");
        let narrowing = call_method(
            &mut ctx,
            root,
            &Value::Type(Type::name("Int8")),
            "init(_:)",
            vec![Value::ident("x"), int()],
        )
        .expect("init");
        assert_eq!(
            read_expr(&mut ctx, narrowing),
            "x < -128 || x > 127 ? $$numericRangeFailed() : x"
        );
    }

    #[test]
    /// 文字列リテラルからの変換は畳み込まれる
    fn parses_literal_strings() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = call_method(
            &mut ctx,
            root,
            &int(),
            "init(_:)",
            vec![Value::string("42"), Value::Type(Type::name("String"))],
        )
        .expect("init");
        assert_eq!(read_expr(&mut ctx, value), "42");
        let bad = call_method(
            &mut ctx,
            root,
            &int(),
            "init(_:)",
            vec![Value::string("x"), Value::Type(Type::name("String"))],
        )
        .expect("init");
        assert_eq!(read_expr(&mut ctx, bad), "null");
    }

    #[test]
    /// 16 ビットのバイト反転
    fn byte_swap_of_16_bits() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let value = get_property(
            &mut ctx,
            root,
            &Value::Type(Type::name("UInt16")),
            "byteSwapped",
            vec![Value::ident("v")],
        )
        .expect("swap");
        assert_eq!(read_expr(&mut ctx, value), "v >> 8 & 255 | v << 8 & 65280");
    }

    #[test]
    /// 符号付き整数は SignedNumeric に適合する
    fn signed_conformances() {
        let ctx = new_context_with_builtins();
        let int = build_integer_type(&ctx, "Int", -1.0, 1.0, 32, true, wrap_int32());
        assert!(int.conforms_to("SignedNumeric"));
        assert!(int.conforms_to("FixedWidthInteger"));
        let uint = build_integer_type(&ctx, "UInt", 0.0, 1.0, 32, true, wrap_uint32());
        assert!(!uint.conforms_to("SignedInteger"));
        assert!(uint.conforms_to("UnsignedInteger"));
    }
}
