// パス: src/sil/stdlib.rs
// 役割: SIL 経路で使う標準ライブラリの型レイアウト・外部関数・`builtin` 命令の表
// 意図: SIL ファイルに本体を持たない標準ライブラリの部品を、AST 経路と同じ数値表現で補う
// 関連ファイル: src/sil/codegen.rs, src/sil/optimizer.rs, src/builtins/common.rs
//! SIL 用の標準ライブラリ
//!
//! - `layout` は `Int`（`_value` 一つの構造体）や `Optional`（`none`/`some`）の形を返す。
//! - `external` は本体のない関数宣言（リテラル初期化子や `Int` の演算子）の実装を返す。
//! - `lower_builtin` は `builtin "sadd_with_overflow_Int64"` のような命令を式に落とす。
//!
//! `Builtin.Int64` と `Builtin.Word` は AST 経路の `Int` と同じく 32 ビット整数として扱う。

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{FieldLayout, TypeLayout};
use crate::builtins::common::{trap, Trap};
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::js::{Expr, Stmt, VarKind};
use crate::values::read;

const NEWTYPES: &[(&str, &str)] = &[
    ("Int", "Int64"),
    ("Int8", "Int8"),
    ("Int16", "Int16"),
    ("Int32", "Int32"),
    ("Int64", "Int64"),
    ("UInt", "Int64"),
    ("UInt8", "Int8"),
    ("UInt16", "Int16"),
    ("UInt32", "Int32"),
    ("UInt64", "Int64"),
    ("Bool", "Int1"),
    ("Double", "FPIEEE64"),
    ("Float", "FPIEEE32"),
];

static LAYOUTS: Lazy<HashMap<&'static str, TypeLayout>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, TypeLayout> = NEWTYPES
        .iter()
        .map(|(name, raw)| {
            let fields = vec![FieldLayout {
                name: "_value".into(),
                ty: format!("Builtin.{}", raw),
            }];
            (*name, TypeLayout::Struct { fields })
        })
        .collect();
    let optional = TypeLayout::Enum {
        cases: vec!["none".into(), "some".into()],
    };
    table.insert("Optional", optional.clone());
    table.insert("ImplicitlyUnwrappedOptional", optional);
    let range = TypeLayout::Struct {
        fields: vec![
            FieldLayout {
                name: "lowerBound".into(),
                ty: "Bound".into(),
            },
            FieldLayout {
                name: "upperBound".into(),
                ty: "Bound".into(),
            },
        ],
    };
    table.insert("Range", range.clone());
    table.insert("ClosedRange", range);
    table
});

/// 組み込み型のレイアウト。
pub fn layout(base: &str) -> Option<&'static TypeLayout> {
    LAYOUTS.get(base)
}

/// 本体のない関数宣言の実装。`this` はメタタイプなので仮引数に含めない。
pub struct External {
    pub params: &'static [&'static str],
    pub body: fn(&mut Context) -> CResult<Vec<Stmt>>,
}

fn identity(_: &mut Context) -> CResult<Vec<Stmt>> {
    Ok(vec![Stmt::ret(Expr::ident("value"))])
}

fn string_literal(_: &mut Context) -> CResult<Vec<Stmt>> {
    Ok(vec![Stmt::ret(Expr::ident("start"))])
}

fn lhs_rhs(op: &'static str) -> Expr {
    Expr::binary(op, Expr::ident("lhs"), Expr::ident("rhs"))
}

/// `Int` の検査付き算術。結果が 32 ビットに収まらなければ失敗関数を呼ぶ。
fn checked(ctx: &mut Context, full: Expr) -> CResult<Vec<Stmt>> {
    let fail = trap_call(ctx, Trap::NumericRange)?;
    let result = Expr::ident("result");
    Ok(vec![
        Stmt::var(VarKind::Const, "result", Some(full)),
        Stmt::if_else(
            Expr::binary("!==", result.clone(), truncate(result.clone(), 32, true)),
            vec![Stmt::expr(fail)],
            None,
        ),
        Stmt::ret(result),
    ])
}

static EXTERNALS: Lazy<HashMap<&'static str, External>> = Lazy::new(|| {
    const UNARY: &[&str] = &["value"];
    const BINARY: &[&str] = &["lhs", "rhs"];
    let mut table: HashMap<&'static str, External> = HashMap::new();
    for symbol in [
        "$sSi22_builtinIntegerLiteralSiBI_tcfC",
        "$sSb22_builtinBooleanLiteralSbBi1__tcfC",
        "$sSd20_builtinFloatLiteralSdBf64__tcfC",
        "$sSd20_builtinFloatLiteralSdBf80__tcfC",
        "$sSf20_builtinFloatLiteralSfBf80__tcfC",
    ] {
        table.insert(symbol, External { params: UNARY, body: identity });
    }
    table.insert(
        "$sSS21_builtinStringLiteral17utf8CodeUnitCount7isASCIISSBp_BwBi1_tcfC",
        External {
            params: &["start", "count", "ascii"],
            body: string_literal,
        },
    );
    table.insert(
        "$sSi1poiyS2i_SitFZ",
        External {
            params: BINARY,
            body: |ctx| checked(ctx, lhs_rhs("+")),
        },
    );
    table.insert(
        "$sSi1soiyS2i_SitFZ",
        External {
            params: BINARY,
            body: |ctx| checked(ctx, lhs_rhs("-")),
        },
    );
    table.insert(
        "$sSi1moiyS2i_SitFZ",
        External {
            params: BINARY,
            body: |ctx| checked(ctx, lhs_rhs("*")),
        },
    );
    let comparisons: [(&'static str, fn(&mut Context) -> CResult<Vec<Stmt>>); 10] = [
        ("$sSi2eeoiySbSi_SitFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("==="))])),
        ("$sSi2neoiySbSi_SitFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("!=="))])),
        ("$sSi1loiySbSi_SitFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("<"))])),
        ("$sSi1goiySbSi_SitFZ", |_| Ok(vec![Stmt::ret(lhs_rhs(">"))])),
        ("$sSi2leoiySbSi_SitFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("<="))])),
        ("$sSi2geoiySbSi_SitFZ", |_| Ok(vec![Stmt::ret(lhs_rhs(">="))])),
        ("$sSS2eeoiySbSS_SStFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("==="))])),
        ("$sSS1poiyS2S_SStFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("+"))])),
        ("$sSd1poiyS2d_SdtFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("+"))])),
        ("$sSd1moiyS2d_SdtFZ", |_| Ok(vec![Stmt::ret(lhs_rhs("*"))])),
    ];
    for (symbol, body) in comparisons {
        table.insert(symbol, External { params: BINARY, body });
    }
    table
});

/// 外部関数の実装を探す。
pub fn external(symbol: &str) -> Option<&'static External> {
    EXTERNALS.get(symbol)
}

/// `cond_fail` のメッセージから失敗関数を選ぶ。メッセージがなければ桁あふれ扱い。
pub fn trap_for_message(message: Option<&str>) -> Trap {
    match message {
        Some(m) if m.starts_with("Index out of range") => Trap::ArrayBounds,
        Some(m) if m.contains("nil while unwrapping") => Trap::ForceUnwrap,
        _ => Trap::NumericRange,
    }
}

/// 失敗関数をルートに出力し、その呼び出し式を返す。
pub fn trap_call(ctx: &mut Context, kind: Trap) -> CResult<Expr> {
    let root = ctx.root();
    let value = trap(ctx, root, kind)?;
    read(ctx, root, value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Width {
    Bool,
    Bits(u32),
    Float,
}

fn width(ty: &str) -> Width {
    match ty {
        "Int1" => Width::Bool,
        "Int8" => Width::Bits(8),
        "Int16" => Width::Bits(16),
        t if t.starts_with("FPIEEE") => Width::Float,
        _ => Width::Bits(32),
    }
}

fn is_type_token(part: &str) -> bool {
    part == "Word"
        || part == "RawPointer"
        || part == "IntLiteral"
        || part.starts_with("FPIEEE")
        || part
            .strip_prefix("Int")
            .map(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

/// `sadd_with_overflow_Int64` を演算名と型の列に分ける。
fn split_name(name: &str) -> (String, Vec<&str>) {
    let parts: Vec<&str> = name.split('_').collect();
    let mut cut = parts.len();
    while cut > 1 && is_type_token(parts[cut - 1]) {
        cut -= 1;
    }
    (parts[..cut].join("_"), parts[cut..].to_vec())
}

fn int(value: i64) -> Expr {
    Expr::num(value as f64)
}

/// 幅 `bits` への切り詰め。
fn truncate(e: Expr, bits: u32, signed: bool) -> Expr {
    match (bits, signed) {
        (32, true) => Expr::binary("|", e, int(0)),
        (32, false) => Expr::binary(">>>", e, int(0)),
        (n, true) => {
            let shift = int(i64::from(32 - n));
            Expr::binary(">>", Expr::binary("<<", e, shift.clone()), shift)
        }
        (n, false) => Expr::binary("&", e, int((1i64 << n) - 1)),
    }
}

fn signed_max(bits: u32) -> Expr {
    int((1i64 << (bits - 1)) - 1)
}

fn bits_of(w: Width) -> u32 {
    match w {
        Width::Bits(n) => n,
        Width::Bool => 1,
        Width::Float => 32,
    }
}

/// `[結果, 桁あふれ]` を返す補助関数を一度だけ出力する。
fn overflow_helper(
    ctx: &mut Context,
    name: &str,
    params: &[&str],
    full: Expr,
    result: Expr,
) -> CResult<String> {
    let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    ctx.emit_helper(&format!("Builtin.{}", name), move |_, ident| {
        let body = vec![
            Stmt::var(VarKind::Const, "full", Some(full)),
            Stmt::var(VarKind::Const, "result", Some(result)),
            Stmt::ret(Expr::Array(vec![
                Expr::ident("result"),
                Expr::binary("!==", Expr::ident("result"), Expr::ident("full")),
            ])),
        ];
        Ok(Stmt::Function {
            name: ident.to_string(),
            params,
            body,
        })
    })
}

fn arg(args: &[Expr], index: usize, name: &str) -> CResult<Expr> {
    args.get(index).cloned().ok_or_else(|| {
        CompileError::new(
            "SSA010",
            format!("builtin {} expects at least {} operands", name, index + 1),
        )
    })
}

/// `builtin "name"(args)` を式に落とす。知らない名前なら `None`。
pub fn lower_builtin(ctx: &mut Context, name: &str, args: Vec<Expr>) -> CResult<Option<Expr>> {
    let (op, types) = split_name(name);
    let w = types.first().map(|t| width(t)).unwrap_or(Width::Bits(32));
    let to = types.last().map(|t| width(t)).unwrap_or(w);
    let a = || arg(&args, 0, name);
    let b = || arg(&args, 1, name);
    let lhs = || Expr::ident("lhs");
    let rhs = || Expr::ident("rhs");
    let value = || Expr::ident("value");
    let lowered = match op.as_str() {
        "sadd_with_overflow" | "ssub_with_overflow" | "smul_with_overflow"
        | "uadd_with_overflow" | "usub_with_overflow" | "umul_with_overflow" => {
            let signed = op.starts_with('s');
            let bits = bits_of(w);
            let sym = match &op[1..4] {
                "add" => "+",
                "sub" => "-",
                _ => "*",
            };
            let full = Expr::binary(sym, lhs(), rhs());
            let result = if sym == "*" && bits == 32 {
                let product = Expr::call_path(&["Math", "imul"], vec![lhs(), rhs()]);
                if signed {
                    product
                } else {
                    truncate(product, 32, false)
                }
            } else {
                truncate(full.clone(), bits, signed)
            };
            let helper = overflow_helper(ctx, name, &["lhs", "rhs"], full, result)?;
            Expr::call(Expr::ident(helper), vec![a()?, b()?])
        }
        "add" | "sub" | "mul" => {
            let bits = bits_of(w);
            if op == "mul" && bits == 32 {
                Expr::call_path(&["Math", "imul"], vec![a()?, b()?])
            } else {
                let sym = if op == "add" { "+" } else if op == "sub" { "-" } else { "*" };
                truncate(Expr::binary(sym, a()?, b()?), bits, true)
            }
        }
        "sdiv" | "exact_sdiv" | "udiv" | "exact_udiv" => {
            Expr::binary("|", Expr::binary("/", a()?, b()?), int(0))
        }
        "srem" | "urem" => Expr::binary("%", a()?, b()?),
        "and" | "or" if w == Width::Bool => {
            Expr::logical(if op == "and" { "&&" } else { "||" }, a()?, b()?)
        }
        "xor" if w == Width::Bool => Expr::binary("!==", a()?, b()?),
        "and" => Expr::binary("&", a()?, b()?),
        "or" => Expr::binary("|", a()?, b()?),
        "xor" => Expr::binary("^", a()?, b()?),
        "shl" => truncate(Expr::binary("<<", a()?, b()?), bits_of(w), true),
        "ashr" => Expr::binary(">>", a()?, b()?),
        "lshr" => {
            if bits_of(w) == 32 {
                Expr::binary(">>>", a()?, b()?)
            } else {
                Expr::binary(">>", a()?, b()?)
            }
        }
        "cmp_eq" => Expr::binary("===", a()?, b()?),
        "cmp_ne" => Expr::binary("!==", a()?, b()?),
        "cmp_slt" => Expr::binary("<", a()?, b()?),
        "cmp_sle" => Expr::binary("<=", a()?, b()?),
        "cmp_sgt" => Expr::binary(">", a()?, b()?),
        "cmp_sge" => Expr::binary(">=", a()?, b()?),
        "cmp_ult" | "cmp_ule" | "cmp_ugt" | "cmp_uge" => {
            let sym = match &op[5..] {
                "lt" => "<",
                "le" => "<=",
                "gt" => ">",
                _ => ">=",
            };
            let bits = bits_of(w);
            Expr::binary(sym, truncate(a()?, bits, false), truncate(b()?, bits, false))
        }
        "zext" | "sext" | "zextOrBitCast" | "sextOrBitCast" if w == Width::Bool => {
            Expr::conditional(a()?, int(1), int(0))
        }
        "trunc" | "truncOrBitCast" if to == Width::Bool => {
            Expr::binary("!==", Expr::binary("&", a()?, int(1)), int(0))
        }
        "trunc" | "truncOrBitCast" if bits_of(to) < bits_of(w) => {
            truncate(a()?, bits_of(to), true)
        }
        "zext" | "sext" | "zextOrBitCast" | "sextOrBitCast" | "trunc" | "truncOrBitCast"
        | "bitcast" | "int_expect" | "assumeNonNegative" | "sitofp" | "uitofp" | "fpext"
        | "fptrunc" => a()?,
        "s_to_s_checked_trunc" | "u_to_s_checked_trunc" | "s_to_u_checked_trunc"
        | "u_to_u_checked_trunc" => {
            let signed_target = op.starts_with("s_to_s") || op.starts_with("u_to_s");
            let result = truncate(value(), bits_of(to), signed_target);
            let helper = overflow_helper(ctx, name, &["value"], value(), result)?;
            Expr::call(Expr::ident(helper), vec![a()?])
        }
        "s_to_u_checked_conversion" => Expr::Array(vec![
            a()?,
            Expr::binary("<", a()?, int(0)),
        ]),
        "u_to_s_checked_conversion" => Expr::Array(vec![
            a()?,
            Expr::binary(">", truncate(a()?, bits_of(w), false), signed_max(bits_of(w))),
        ]),
        "fadd" => Expr::binary("+", a()?, b()?),
        "fsub" => Expr::binary("-", a()?, b()?),
        "fmul" => Expr::binary("*", a()?, b()?),
        "fdiv" => Expr::binary("/", a()?, b()?),
        "frem" => Expr::binary("%", a()?, b()?),
        "fneg" => Expr::unary("-", a()?),
        "fcmp_oeq" | "fcmp_ueq" => Expr::binary("===", a()?, b()?),
        "fcmp_one" | "fcmp_une" => Expr::binary("!==", a()?, b()?),
        "fcmp_olt" | "fcmp_ult" => Expr::binary("<", a()?, b()?),
        "fcmp_ole" | "fcmp_ule" => Expr::binary("<=", a()?, b()?),
        "fcmp_ogt" | "fcmp_ugt" => Expr::binary(">", a()?, b()?),
        "fcmp_oge" | "fcmp_uge" => Expr::binary(">=", a()?, b()?),
        "fptosi" | "fptoui" => Expr::binary("|", a()?, int(0)),
        "int_sqrt" | "sqrt" => Expr::call_path(&["Math", "sqrt"], vec![a()?]),
        "int_trap" | "trap" => trap_call(ctx, Trap::NumericRange)?,
        "condfail" | "condfail_message" => {
            let fail = trap_call(ctx, Trap::NumericRange)?;
            Expr::conditional(a()?, fail, Expr::undefined())
        }
        _ => return Ok(None),
    };
    Ok(Some(lowered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::printer::print_expr;

    fn lower(ctx: &mut Context, name: &str, args: &[&str]) -> String {
        let args = args.iter().map(|a| Expr::ident(*a)).collect();
        let e = lower_builtin(ctx, name, args)
            .expect("lower")
            .expect("known builtin");
        print_expr(&e)
    }

    #[test]
    /// 組み込み名は演算と型に分かれる
    fn splits_builtin_names() {
        assert_eq!(
            split_name("sadd_with_overflow_Int64"),
            ("sadd_with_overflow".to_string(), vec!["Int64"])
        );
        assert_eq!(
            split_name("s_to_u_checked_trunc_Int64_Int8"),
            ("s_to_u_checked_trunc".to_string(), vec!["Int64", "Int8"])
        );
        assert_eq!(split_name("int_trap"), ("int_trap".to_string(), vec![]));
    }

    #[test]
    /// 桁あふれ付き加算は補助関数の呼び出しになり、同じ名前では再出力しない
    fn overflow_builtins_emit_helpers_once() {
        let mut ctx = Context::new();
        let first = lower(&mut ctx, "sadd_with_overflow_Int64", &["_a", "_b", "_c"]);
        let second = lower(&mut ctx, "sadd_with_overflow_Int64", &["_x", "_y", "_c"]);
        assert!(first.ends_with("(_a, _b)"));
        assert!(second.ends_with("(_x, _y)"));
        assert!(ctx.helper("Builtin.sadd_with_overflow_Int64").is_some());
    }

    #[test]
    /// 比較・ビット演算・真偽値演算の写し方
    fn simple_builtins() {
        let mut ctx = Context::new();
        assert_eq!(lower(&mut ctx, "cmp_slt_Int64", &["a", "b"]), "a < b");
        assert_eq!(lower(&mut ctx, "xor_Int1", &["a", "b"]), "a !== b");
        assert_eq!(lower(&mut ctx, "mul_Int32", &["a", "b"]), "Math.imul(a, b)");
        assert_eq!(lower(&mut ctx, "int_expect_Int1", &["a", "b"]), "a");
        assert_eq!(lower(&mut ctx, "add_Int8", &["a", "b"]), "a + b << 24 >> 24");
    }

    #[test]
    /// 知らない組み込みは None
    fn unknown_builtin_is_none() {
        let mut ctx = Context::new();
        let lowered = lower_builtin(&mut ctx, "frobnicate_Int64", vec![]).expect("lower");
        assert!(lowered.is_none());
    }

    #[test]
    /// 標準ライブラリのレイアウトと外部関数
    fn tables() {
        assert!(matches!(layout("Int"), Some(TypeLayout::Struct { fields }) if fields.len() == 1));
        assert!(
            matches!(layout("Optional"), Some(TypeLayout::Enum { cases }) if cases[1] == "some")
        );
        assert!(external("$sSi22_builtinIntegerLiteralSiBI_tcfC").is_some());
        assert!(external("$sSi1poiyS2i_SitFZ").is_some());
        assert!(external("$s4main3fooyyF").is_none());
        assert_eq!(trap_for_message(Some("Index out of range")), Trap::ArrayBounds);
        assert_eq!(trap_for_message(None), Trap::NumericRange);
    }
}
