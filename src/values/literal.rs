// パス: src/values/literal.rs
// 役割: 式の純粋性判定・定数評価・局所的な簡約を行う
// 意図: 生成コードから自明な分岐や冗長な `| 0` を取り除き、巻き上げの判断材料を提供する
// 関連ファイル: src/values/mod.rs, src/values/read.rs
//! 純粋性と定数畳み込み。

use crate::js::{Expr, PropKey, PropValue, Property};

/// 定数評価の結果。
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<LiteralValue>),
    Object(Vec<(String, LiteralValue)>),
}

impl LiteralValue {
    pub fn truthy(&self) -> bool {
        match self {
            LiteralValue::Undefined | LiteralValue::Null => false,
            LiteralValue::Bool(b) => *b,
            LiteralValue::Num(n) => *n != 0.0 && !n.is_nan(),
            LiteralValue::Str(s) => !s.is_empty(),
            LiteralValue::Array(_) | LiteralValue::Object(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            LiteralValue::Undefined => f64::NAN,
            LiteralValue::Null => 0.0,
            LiteralValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            LiteralValue::Num(n) => *n,
            LiteralValue::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            LiteralValue::Array(_) | LiteralValue::Object(_) => f64::NAN,
        }
    }

    fn is_primitive(&self) -> bool {
        !matches!(self, LiteralValue::Array(_) | LiteralValue::Object(_))
    }

    fn type_of(&self) -> &'static str {
        match self {
            LiteralValue::Undefined => "undefined",
            LiteralValue::Bool(_) => "boolean",
            LiteralValue::Num(_) => "number",
            LiteralValue::Str(_) => "string",
            LiteralValue::Null | LiteralValue::Array(_) | LiteralValue::Object(_) => "object",
        }
    }

    fn to_js_string(&self) -> Option<String> {
        Some(match self {
            LiteralValue::Undefined => "undefined".into(),
            LiteralValue::Null => "null".into(),
            LiteralValue::Bool(b) => b.to_string(),
            LiteralValue::Num(n) => crate::js::printer::format_number(*n),
            LiteralValue::Str(s) => s.clone(),
            _ => return None,
        })
    }
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4294967296.0);
    m as u32 as i32
}

fn strict_equals(a: &LiteralValue, b: &LiteralValue) -> Option<bool> {
    if !a.is_primitive() || !b.is_primitive() {
        return None;
    }
    Some(match (a, b) {
        (LiteralValue::Num(x), LiteralValue::Num(y)) => x == y,
        _ => a == b,
    })
}

fn loose_equals(a: &LiteralValue, b: &LiteralValue) -> Option<bool> {
    use LiteralValue::*;
    match (a, b) {
        (Undefined | Null, Undefined | Null) => Some(true),
        (Undefined | Null, _) | (_, Undefined | Null) => Some(false),
        _ if a.type_of() == b.type_of() => strict_equals(a, b),
        _ if a.is_primitive() && b.is_primitive() => Some(a.to_number() == b.to_number()),
        _ => None,
    }
}

fn binary_literal(op: &str, a: &LiteralValue, b: &LiteralValue) -> Option<LiteralValue> {
    use LiteralValue::*;
    let num = |f: f64| Some(Num(f));
    let lhs = to_int32(a.to_number());
    let shift = to_int32(b.to_number()) as u32 & 31;
    match op {
        "+" => match (a, b) {
            (Str(_), _) | (_, Str(_)) => {
                Some(Str(format!("{}{}", a.to_js_string()?, b.to_js_string()?)))
            }
            _ if a.is_primitive() && b.is_primitive() => num(a.to_number() + b.to_number()),
            _ => None,
        },
        "-" => num(a.to_number() - b.to_number()),
        "*" => num(a.to_number() * b.to_number()),
        "/" => num(a.to_number() / b.to_number()),
        "%" => num(a.to_number() % b.to_number()),
        "**" => num(a.to_number().powf(b.to_number())),
        "|" => num((to_int32(a.to_number()) | to_int32(b.to_number())) as f64),
        "&" => num((to_int32(a.to_number()) & to_int32(b.to_number())) as f64),
        "^" => num((to_int32(a.to_number()) ^ to_int32(b.to_number())) as f64),
        "<<" => num(lhs.wrapping_shl(shift) as f64),
        ">>" => num((lhs >> shift) as f64),
        ">>>" => num(((lhs as u32) >> shift) as f64),
        "===" => strict_equals(a, b).map(Bool),
        "!==" => strict_equals(a, b).map(|r| Bool(!r)),
        "==" => loose_equals(a, b).map(Bool),
        "!=" => loose_equals(a, b).map(|r| Bool(!r)),
        "<" | ">" | "<=" | ">=" => {
            if let (Str(x), Str(y)) = (a, b) {
                return Some(Bool(match op {
                    "<" => x < y,
                    ">" => x > y,
                    "<=" => x <= y,
                    _ => x >= y,
                }));
            }
            if !a.is_primitive() || !b.is_primitive() {
                return None;
            }
            let (x, y) = (a.to_number(), b.to_number());
            Some(Bool(match op {
                "<" => x < y,
                ">" => x > y,
                "<=" => x <= y,
                _ => x >= y,
            }))
        }
        _ => None,
    }
}

/// 式を定数として評価できればその値を返す。
pub fn expression_literal_value(expr: &Expr) -> Option<LiteralValue> {
    match expr {
        Expr::Num(n) => Some(LiteralValue::Num(*n)),
        Expr::Str(s) => Some(LiteralValue::Str(s.clone())),
        Expr::Bool(b) => Some(LiteralValue::Bool(*b)),
        Expr::Null => Some(LiteralValue::Null),
        Expr::Ident(name) => match name.as_str() {
            "undefined" => Some(LiteralValue::Undefined),
            "NaN" => Some(LiteralValue::Num(f64::NAN)),
            "Infinity" => Some(LiteralValue::Num(f64::INFINITY)),
            _ => None,
        },
        Expr::Unary { op, arg } => {
            let value = expression_literal_value(arg)?;
            match *op {
                "!" => Some(LiteralValue::Bool(!value.truthy())),
                "-" => Some(LiteralValue::Num(-value.to_number())),
                "+" => Some(LiteralValue::Num(value.to_number())),
                "~" => Some(LiteralValue::Num(!to_int32(value.to_number()) as f64)),
                "typeof" => Some(LiteralValue::Str(value.type_of().into())),
                "void" => Some(LiteralValue::Undefined),
                _ => None,
            }
        }
        Expr::Binary { op, left, right } => {
            let l = expression_literal_value(left)?;
            let r = expression_literal_value(right)?;
            binary_literal(op, &l, &r)
        }
        Expr::Logical { op, left, right } => {
            let l = expression_literal_value(left)?;
            let r = expression_literal_value(right)?;
            match *op {
                "&&" => Some(if l.truthy() { r } else { l }),
                "||" => Some(if l.truthy() { l } else { r }),
                "??" => Some(match l {
                    LiteralValue::Undefined | LiteralValue::Null => r,
                    other => other,
                }),
                _ => None,
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if expression_literal_value(test)?.truthy() {
                expression_literal_value(consequent)
            } else {
                expression_literal_value(alternate)
            }
        }
        Expr::Sequence(items) => {
            let mut last = None;
            for item in items {
                last = Some(expression_literal_value(item)?);
            }
            last
        }
        Expr::Array(items) => items
            .iter()
            .map(expression_literal_value)
            .collect::<Option<Vec<_>>>()
            .map(LiteralValue::Array),
        Expr::Object(props) => {
            let mut out = Vec::new();
            for prop in props {
                let key = match &prop.key {
                    PropKey::Ident(k) | PropKey::Str(k) => k.clone(),
                    PropKey::Computed(e) => expression_literal_value(e)?.to_js_string()?,
                };
                let value = match &prop.value {
                    PropValue::Value(e) => expression_literal_value(e)?,
                    PropValue::Method { .. } => return None,
                };
                out.push((key, value));
            }
            Some(LiteralValue::Object(out))
        }
        _ => None,
    }
}

/// 定数を式に戻す。
pub fn literal(value: &LiteralValue) -> Expr {
    match value {
        LiteralValue::Undefined => Expr::undefined(),
        LiteralValue::Null => Expr::Null,
        LiteralValue::Bool(b) => Expr::Bool(*b),
        LiteralValue::Num(n) => {
            if n.is_nan() {
                Expr::ident("NaN")
            } else if n.is_infinite() {
                if *n > 0.0 {
                    Expr::ident("Infinity")
                } else {
                    Expr::unary("-", Expr::ident("Infinity"))
                }
            } else if *n < 0.0 || (*n == 0.0 && n.is_sign_negative()) {
                Expr::unary("-", Expr::Num(-n))
            } else {
                Expr::Num(*n)
            }
        }
        LiteralValue::Str(s) => Expr::Str(s.clone()),
        LiteralValue::Array(items) => Expr::Array(items.iter().map(literal).collect()),
        LiteralValue::Object(props) => Expr::Object(
            props
                .iter()
                .map(|(k, v)| Property {
                    key: if crate::js::printer::is_valid_identifier(k) {
                        PropKey::Ident(k.clone())
                    } else {
                        PropKey::Str(k.clone())
                    },
                    value: PropValue::Value(literal(v)),
                })
                .collect(),
        ),
    }
}

/// 評価しても観測可能な副作用がない式か。
pub fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Ident(_) | Expr::This => {
            true
        }
        Expr::Member {
            object,
            property,
            computed,
        } => {
            is_pure(object)
                && !matches!(
                    object.as_ref(),
                    Expr::Ident(_) | Expr::Member { .. } | Expr::This
                )
                && (!*computed || is_pure(property))
        }
        Expr::Array(items) => items.iter().all(is_pure),
        Expr::Object(props) => props.iter().all(|p| {
            let key_pure = match &p.key {
                PropKey::Computed(e) => is_pure(e),
                _ => true,
            };
            let value_pure = match &p.value {
                PropValue::Value(e) => is_pure(e),
                PropValue::Method { .. } => true,
            };
            key_pure && value_pure
        }),
        Expr::Unary { op, arg } => *op != "delete" && is_pure(arg),
        Expr::Template { exprs, .. } => exprs.iter().all(is_pure),
        Expr::Function { .. } => true,
        _ => false,
    }
}

fn is_comparison(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Binary { op, .. }
            if matches!(*op, "==" | "===" | "!=" | "!==" | "<" | ">" | "<=" | ">=")
    )
}

fn returns_int32(expr: &Expr) -> bool {
    match expr {
        Expr::Unary { op, .. } => *op == "~",
        Expr::Binary { op, .. } => matches!(*op, ">>" | "<<" | "|" | "&" | "^"),
        _ => false,
    }
}

fn negated_comparison(op: &str) -> Option<&'static str> {
    Some(match op {
        "==" => "!=",
        "!=" => "==",
        "===" => "!==",
        "!==" => "===",
        _ => return None,
    })
}

/// 式の最上位を局所的に簡約する。
pub fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => match expression_literal_value(&test) {
            Some(v) => {
                if v.truthy() {
                    *consequent
                } else {
                    *alternate
                }
            }
            None => Expr::Conditional {
                test,
                consequent,
                alternate,
            },
        },
        Expr::Logical { op, left, right } => {
            if let Some(l) = expression_literal_value(&left) {
                match op {
                    "&&" => return if l.truthy() { *right } else { *left },
                    "||" => return if l.truthy() { *left } else { *right },
                    _ => {}
                }
            }
            if op == "&&" && matches!(right.as_ref(), Expr::Bool(true)) && is_comparison(&left) {
                return *left;
            }
            Expr::Logical { op, left, right }
        }
        Expr::Binary { op, left, right } => {
            let folded = Expr::Binary { op, left, right };
            if let Some(v) = expression_literal_value(&folded) {
                return literal(&v);
            }
            match folded {
                Expr::Binary { op, left, right }
                    if op == "|"
                        && matches!(right.as_ref(), Expr::Num(n) if *n == 0.0)
                        && returns_int32(&left) =>
                {
                    *left
                }
                other => other,
            }
        }
        Expr::Unary { op, arg } => {
            if let Some(v) = expression_literal_value(&Expr::Unary {
                op,
                arg: arg.clone(),
            }) {
                if op != "typeof" {
                    return literal(&v);
                }
            }
            if op == "!" {
                match *arg {
                    Expr::Logical {
                        op: "||",
                        left,
                        right,
                    } => {
                        return Expr::logical(
                            "&&",
                            simplify(Expr::unary("!", *left)),
                            simplify(Expr::unary("!", *right)),
                        )
                    }
                    Expr::Logical {
                        op: "&&",
                        left,
                        right,
                    } => {
                        return Expr::logical(
                            "||",
                            simplify(Expr::unary("!", *left)),
                            simplify(Expr::unary("!", *right)),
                        )
                    }
                    Expr::Binary { op: inner, left, right }
                        if negated_comparison(inner).is_some() =>
                    {
                        let negated = negated_comparison(inner).unwrap_or(inner);
                        return Expr::Binary {
                            op: negated,
                            left,
                            right,
                        };
                    }
                    other => return Expr::unary("!", other),
                }
            }
            Expr::Unary { op, arg }
        }
        Expr::Member {
            object,
            property,
            computed,
        } => {
            if let (Expr::Object(_), true) = (object.as_ref(), is_pure(&object)) {
                let key = match (property.as_ref(), computed) {
                    (Expr::Ident(name), false) => Some(name.clone()),
                    (other, true) => {
                        expression_literal_value(other).and_then(|v| v.to_js_string())
                    }
                    _ => None,
                };
                if let (Some(key), Expr::Object(props)) = (key, object.as_ref()) {
                    for prop in props.iter().rev() {
                        let matches = match &prop.key {
                            PropKey::Ident(k) | PropKey::Str(k) => *k == key,
                            PropKey::Computed(_) => false,
                        };
                        if matches {
                            if let PropValue::Value(v) = &prop.value {
                                return v.clone();
                            }
                        }
                    }
                }
            }
            Expr::Member {
                object,
                property,
                computed,
            }
        }
        Expr::Sequence(items) => {
            let mut flat = Vec::new();
            for item in items {
                match item {
                    Expr::Sequence(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            let last = flat.len().saturating_sub(1);
            let mut kept: Vec<Expr> = flat
                .into_iter()
                .enumerate()
                .filter(|(i, e)| *i == last || !is_pure(e))
                .map(|(_, e)| e)
                .collect();
            if kept.len() == 1 {
                kept.pop().unwrap_or_else(Expr::undefined)
            } else {
                Expr::Sequence(kept)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// リテラル条件の三項演算子は片側に畳まれる
    fn folds_literal_conditional() {
        let e = Expr::conditional(Expr::Bool(true), Expr::ident("a"), Expr::ident("b"));
        assert_eq!(simplify(e), Expr::ident("a"));
    }

    #[test]
    /// 算術とビット演算は 32 ビットの意味で畳まれる
    fn folds_arithmetic() {
        let e = Expr::binary("+", Expr::Num(1.0), Expr::Num(2.0));
        assert_eq!(simplify(e), Expr::Num(3.0));
        let wrapped = Expr::binary("|", Expr::Num(4294967295.0), Expr::Num(0.0));
        assert_eq!(simplify(wrapped), Expr::unary("-", Expr::Num(1.0)));
        let shifted = Expr::binary("<<", Expr::Num(1.0), Expr::Num(31.0));
        assert_eq!(simplify(shifted), Expr::unary("-", Expr::Num(2147483648.0)));
    }

    #[test]
    /// 32 ビット整数を返す演算の `| 0` は取り除かれる
    fn drops_redundant_int32_coercion() {
        let inner = Expr::binary("&", Expr::ident("a"), Expr::ident("b"));
        let e = Expr::binary("|", inner.clone(), Expr::Num(0.0));
        assert_eq!(simplify(e), inner);
        let kept = Expr::binary(
            "|",
            Expr::binary("+", Expr::ident("a"), Expr::ident("b")),
            Expr::Num(0.0),
        );
        assert!(matches!(simplify(kept), Expr::Binary { op: "|", .. }));
    }

    #[test]
    /// 否定はド・モルガンと比較の反転で押し込まれる
    fn pushes_negation() {
        let e = Expr::unary(
            "!",
            Expr::binary("===", Expr::ident("a"), Expr::ident("b")),
        );
        assert_eq!(
            simplify(e),
            Expr::binary("!==", Expr::ident("a"), Expr::ident("b"))
        );
        let or = Expr::unary(
            "!",
            Expr::logical("||", Expr::ident("a"), Expr::ident("b")),
        );
        assert_eq!(
            simplify(or),
            Expr::logical(
                "&&",
                Expr::unary("!", Expr::ident("a")),
                Expr::unary("!", Expr::ident("b"))
            )
        );
    }

    #[test]
    /// 論理演算の片側がリテラルなら分岐を選ぶ
    fn simplifies_logical() {
        let e = Expr::logical("&&", Expr::Bool(false), Expr::ident("x"));
        assert_eq!(simplify(e), Expr::Bool(false));
        let cmp = Expr::binary("<", Expr::ident("a"), Expr::ident("b"));
        let e = Expr::logical("&&", cmp.clone(), Expr::Bool(true));
        assert_eq!(simplify(e), cmp);
    }

    #[test]
    /// 連接式の純粋な途中要素は捨てられる
    fn simplifies_sequence() {
        let e = Expr::Sequence(vec![
            Expr::ident("a"),
            Expr::call(Expr::ident("f"), vec![]),
            Expr::Sequence(vec![Expr::Num(1.0), Expr::ident("b")]),
        ]);
        assert_eq!(
            simplify(e),
            Expr::Sequence(vec![Expr::call(Expr::ident("f"), vec![]), Expr::ident("b")])
        );
    }

    #[test]
    /// 識別子のメンバー参照は純粋とみなさない
    fn member_purity() {
        assert!(!is_pure(&Expr::member(Expr::ident("a"), "b")));
        assert!(is_pure(&Expr::index(
            Expr::Array(vec![Expr::Num(1.0)]),
            Expr::Num(0.0)
        )));
        assert!(!is_pure(&Expr::call(Expr::ident("f"), vec![])));
    }

    #[test]
    /// 定数評価は比較と文字列連結を扱う
    fn evaluates_constants() {
        let e = Expr::binary("+", Expr::str_lit("a"), Expr::Num(1.0));
        assert_eq!(
            expression_literal_value(&e),
            Some(LiteralValue::Str("a1".into()))
        );
        let e = Expr::binary("===", Expr::Num(1.0), Expr::str_lit("1"));
        assert_eq!(expression_literal_value(&e), Some(LiteralValue::Bool(false)));
        let e = Expr::binary("==", Expr::Null, Expr::undefined());
        assert_eq!(expression_literal_value(&e), Some(LiteralValue::Bool(true)));
    }
}
