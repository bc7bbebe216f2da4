// パス: src/types/parser.rs
// 役割: 型シグネチャ文字列を字句解析し `Type` へ変換する再帰下降パーサ
// 意図: AST ダンプの `type=` や宣言参照のシグネチャを構造化して扱う
// 関連ファイル: src/types/mod.rs, src/types/precomputed.rs, src/errors.rs
//! 型パーサ
//!
//! 受理する形:
//! - 名前 `Int`、名前空間 `Swift.Int`、ジェネリック `Array<Int>`、合成 `P & Q`
//! - `[T]`、`[K : V]`、`T?`、`T!`、可変長 `T...`（配列として扱う）
//! - タプル `(lhs: Int, _: Bool)`（ラベルは捨てる）
//! - 関数 `(Int) throws -> Bool`、ジェネリック関数 `<T : Equatable> (T) -> T`
//! - 属性 `@escaping` / `@convention(thin)`、修飾子 `inout` / `__owned` / `@lvalue`
//! - メタ型 `T.Type` / `P.Protocol`

use super::{precomputed, FunctionType, Type};
use crate::errors::ParseError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum TokKind {
    Ident,
    Sym,
    Eof,
}

#[derive(Clone, Debug)]
struct Tok {
    kind: TokKind,
    value: String,
    pos: usize,
}

/// 空白を挟んでも括弧を引数として取る属性。
const ARGUMENT_ATTRIBUTES: &[&str] = &["convention", "differentiable", "available"];

const SYMBOLS: &[&str] = &[
    "->", "...", "==", "(", ")", "[", "]", "<", ">", ",", ":", "?", "!", ".", "&", "@", "=", "*",
];

const MODIFIERS: &[&str] = &["inout", "__owned", "__shared", "owned", "__inout"];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn lex(text: &str) -> Result<Vec<Tok>, ParseError> {
    let mut out = Vec::new();
    let mut i = 0;
    'outer: while i < text.len() {
        let rest = &text[i..];
        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }
        if is_ident_char(c) {
            let len: usize = rest
                .chars()
                .take_while(|c| is_ident_char(*c))
                .map(char::len_utf8)
                .sum();
            out.push(Tok {
                kind: TokKind::Ident,
                value: rest[..len].to_string(),
                pos: i,
            });
            i += len;
            continue;
        }
        for sym in SYMBOLS {
            if rest.starts_with(sym) {
                out.push(Tok {
                    kind: TokKind::Sym,
                    value: (*sym).to_string(),
                    pos: i,
                });
                i += sym.len();
                continue 'outer;
            }
        }
        return Err(ParseError::new(
            "TYP001",
            format!("型に使えない文字 '{}' があります: {}", c, text),
            Some(i),
        ));
    }
    out.push(Tok {
        kind: TokKind::Eof,
        value: String::new(),
        pos: text.len(),
    });
    Ok(out)
}

struct TypeParser<'a> {
    text: &'a str,
    ts: Vec<Tok>,
    i: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> &Tok {
        &self.ts[self.i.min(self.ts.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        &self.ts[(self.i + offset).min(self.ts.len() - 1)]
    }

    fn pop_any(&mut self) -> Tok {
        let t = self.peek().clone();
        if t.kind != TokKind::Eof {
            self.i += 1;
        }
        t
    }

    fn is_sym(&self, sym: &str) -> bool {
        let t = self.peek();
        t.kind == TokKind::Sym && t.value == sym
    }

    fn is_word(&self, word: &str) -> bool {
        let t = self.peek();
        t.kind == TokKind::Ident && t.value == word
    }

    fn accept_sym(&mut self, sym: &str) -> bool {
        if self.is_sym(sym) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn accept_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        let t = self.peek();
        let found = if t.kind == TokKind::Eof {
            "入力の終わり".to_string()
        } else {
            format!("'{}'", t.value)
        };
        let code = if t.kind == TokKind::Eof {
            "TYP002"
        } else {
            "TYP003"
        };
        ParseError::new(
            code,
            format!("{}（{} を検出）: {}", msg.into(), found, self.text),
            Some(t.pos),
        )
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ParseError> {
        if self.accept_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("'{}' を期待しました", sym)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        if self.peek().kind == TokKind::Ident {
            Ok(self.pop_any().value)
        } else {
            Err(self.error("識別子を期待しました"))
        }
    }

    /// 括弧の対応を取りながら `)` まで読み飛ばす（属性引数用）。
    fn skip_balanced_parens(&mut self) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            let t = self.pop_any();
            match (t.kind, t.value.as_str()) {
                (TokKind::Eof, _) => return Err(self.error("')' を期待しました")),
                (TokKind::Sym, "(") => depth += 1,
                (TokKind::Sym, ")") => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mut attributes = Vec::new();
        let mut modifiers: Vec<String> = Vec::new();
        loop {
            if self.accept_sym("@") {
                let name_end = {
                    let t = self.peek();
                    t.pos + t.value.len()
                };
                let name = self.expect_ident()?;
                if name == "lvalue" {
                    modifiers.push("@lvalue".into());
                } else {
                    // `@escaping (Int) -> Int` の括弧は引数型の並び。属性引数は名前に続けて書かれる
                    let arguments = self.is_sym("(")
                        && (self.peek().pos == name_end
                            || ARGUMENT_ATTRIBUTES.contains(&name.as_str()));
                    if arguments {
                        self.accept_sym("(");
                        self.skip_balanced_parens()?;
                    }
                    attributes.push(name);
                }
                continue;
            }
            let t = self.peek();
            if t.kind == TokKind::Ident
                && MODIFIERS.contains(&t.value.as_str())
                && self.peek_at(1).kind != TokKind::Eof
                && !(self.peek_at(1).kind == TokKind::Sym
                    && matches!(self.peek_at(1).value.as_str(), "." | "<" | ":" | "," | ")"))
            {
                modifiers.push(self.pop_any().value);
                continue;
            }
            break;
        }
        let generic_params = if self.is_sym("<") {
            Some(self.parse_generic_list()?)
        } else {
            None
        };
        let mut ty = self.parse_postfix()?;
        let throws = self.accept_word("throws");
        let rethrows = !throws && self.accept_word("rethrows");
        if self.accept_sym("->") {
            let ret = self.parse_type()?;
            let arguments = match ty {
                Type::Tuple(items) => items,
                other => vec![other],
            };
            ty = Type::Function(FunctionType {
                arguments,
                ret: Box::new(ret),
                throws,
                rethrows,
                attributes,
            });
        } else if throws || rethrows {
            return Err(self.error("'->' を期待しました"));
        }
        if let Some(params) = generic_params {
            ty = Type::generic(ty, params);
        }
        for modifier in modifiers.into_iter().rev() {
            ty = Type::Modified {
                modifier,
                ty: Box::new(ty),
            };
        }
        Ok(ty)
    }

    /// `<A, B : P where A : Q>` を読み、制約付き引数の並びにする。
    fn parse_generic_list(&mut self) -> Result<Vec<Type>, ParseError> {
        self.expect_sym("<")?;
        let mut items = Vec::new();
        if !self.is_sym(">") {
            loop {
                let mut item = self.parse_type()?;
                if self.accept_sym(":") {
                    let constraint = self.parse_type()?;
                    item = Type::Constrained {
                        ty: Box::new(item),
                        constraint: Box::new(constraint),
                    };
                }
                items.push(item);
                if !self.accept_sym(",") {
                    break;
                }
            }
        }
        if self.accept_word("where") {
            loop {
                let subject = self.parse_type()?;
                if self.accept_sym(":") {
                    let constraint = self.parse_type()?;
                    for item in items.iter_mut() {
                        if *item == subject {
                            *item = Type::Constrained {
                                ty: Box::new(item.clone()),
                                constraint: Box::new(constraint.clone()),
                            };
                        }
                    }
                } else if self.accept_sym("==") {
                    self.parse_type()?;
                } else {
                    return Err(self.error("':' か '==' を期待しました"));
                }
                if !self.accept_sym(",") {
                    break;
                }
            }
        }
        self.expect_sym(">")?;
        Ok(items)
    }

    fn parse_postfix(&mut self) -> Result<Type, ParseError> {
        let mut ty = self.parse_primary()?;
        loop {
            if self.accept_sym("?") || self.accept_sym("!") {
                ty = Type::optional(ty);
            } else if self.is_sym(".") && self.peek_at(1).kind == TokKind::Ident {
                self.pop_any();
                let name = self.expect_ident()?;
                ty = match name.as_str() {
                    "Type" => Type::Metatype {
                        base: Box::new(ty),
                        as_protocol: false,
                    },
                    "Protocol" => Type::Metatype {
                        base: Box::new(ty),
                        as_protocol: true,
                    },
                    _ => {
                        let mut inner = Type::Name(name);
                        if self.is_sym("<") {
                            inner = Type::generic(inner, self.parse_generic_list()?);
                        }
                        Type::Namespaced {
                            namespace: Box::new(ty),
                            ty: Box::new(inner),
                        }
                    }
                };
            } else if self.accept_sym("...") {
                ty = Type::array(ty);
            } else if self.accept_sym("&") {
                let rhs = self.parse_primary()?;
                ty = Type::Name(format!("{} & {}", ty.stringify(), rhs.stringify()));
            } else {
                break;
            }
        }
        Ok(ty)
    }

    fn parse_primary(&mut self) -> Result<Type, ParseError> {
        if self.accept_sym("(") {
            let mut items = Vec::new();
            if !self.is_sym(")") {
                loop {
                    // ラベル `name:` / `_:` は読み捨てる
                    if self.peek().kind == TokKind::Ident
                        && self.peek_at(1).kind == TokKind::Sym
                        && self.peek_at(1).value == ":"
                    {
                        self.pop_any();
                        self.pop_any();
                    }
                    items.push(self.parse_type()?);
                    if !self.accept_sym(",") {
                        break;
                    }
                }
            }
            self.expect_sym(")")?;
            return Ok(Type::Tuple(items));
        }
        if self.accept_sym("[") {
            let first = self.parse_type()?;
            if self.accept_sym(":") {
                let value = self.parse_type()?;
                self.expect_sym("]")?;
                return Ok(Type::dictionary(first, value));
            }
            self.expect_sym("]")?;
            return Ok(Type::array(first));
        }
        if self.peek().kind == TokKind::Ident {
            let name = self.pop_any().value;
            let base = Type::Name(name);
            if self.is_sym("<") {
                let args = self.parse_generic_list()?;
                return Ok(Type::generic(base, args));
            }
            return Ok(base);
        }
        Err(self.error("型を期待しました"))
    }
}

/// 事前計算表を経由せずに解析する。
pub(super) fn parse_uncached(text: &str) -> Result<Type, ParseError> {
    let ts = lex(text)?;
    let mut p = TypeParser { text, ts, i: 0 };
    let ty = p.parse_type()?;
    if p.peek().kind != TokKind::Eof {
        return Err(p.error("型の後に余分な入力があります"));
    }
    Ok(ty)
}

/// 型シグネチャを解析する。失敗時は `type: <text>` をログに残す。
pub fn parse_type(text: &str) -> Result<Type, ParseError> {
    if let Some(ty) = precomputed::lookup(text) {
        return Ok(ty.clone());
    }
    parse_uncached(text).map_err(|e| {
        log::error!("type: {}", text);
        e
    })
}

/// 関数型シグネチャを解析する。関数以外が得られたらエラー。
pub fn parse_function_type(text: &str) -> Result<FunctionType, ParseError> {
    match parse_type(text)? {
        Type::Function(f) => Ok(f),
        other => {
            log::error!("function type: {}", text);
            Err(ParseError::new(
                "TYP010",
                format!("Expected a function, got a {} from {}", other.kind(), text),
                None,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(text: &str) -> String {
        parse_uncached(text).expect("parse").stringify()
    }

    #[test]
    /// 基本形は正規形テキストへ戻せる
    fn stringify_round_trips() {
        assert_eq!(round("Int"), "Int");
        assert_eq!(round("[Int]"), "[Int]");
        assert_eq!(round("[String : Int]"), "[String: Int]");
        assert_eq!(round("Int??"), "Int??");
        assert_eq!(round("(Int, Bool)"), "(Int, Bool)");
        assert_eq!(round("()"), "()");
        assert_eq!(round("Array<Int>"), "Array<Int>");
        assert_eq!(round("Swift.Int"), "Swift.Int");
        assert_eq!(round("Int.Type"), "Int.Type");
    }

    #[test]
    /// ラベル付き引数と throws を持つ関数型
    fn function_with_labels() {
        let f = parse_function_type("(lhs: Int, _: inout Int) throws -> Bool").expect("fn");
        assert_eq!(f.arguments.len(), 2);
        assert!(f.throws);
        assert!(f.arguments[1].has_modifier("inout"));
        assert_eq!(*f.ret, Type::name("Bool"));
    }

    #[test]
    /// カリー化されたメソッド型は右結合
    fn curried_method_type() {
        let f = parse_function_type("(Point.Type) -> (Int, Int) -> Point").expect("fn");
        assert_eq!(f.arguments.len(), 1);
        let inner = f.ret.as_function().expect("inner");
        assert_eq!(inner.arguments.len(), 2);
    }

    #[test]
    /// ジェネリック関数の制約は引数側へ付く
    fn generic_function_constraints() {
        let ty = parse_uncached("<T where T : Equatable> (T, T) -> Bool").expect("parse");
        match &ty {
            Type::Generic { base, arguments } => {
                assert!(matches!(base.as_ref(), Type::Function(_)));
                assert!(matches!(arguments[0], Type::Constrained { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ty.as_function().is_some());
    }

    #[test]
    /// 属性と修飾子
    fn attributes_and_modifiers() {
        let ty = parse_uncached("@escaping @convention(thin) (Int) -> ()").expect("parse");
        let f = ty.as_function().expect("fn");
        assert_eq!(f.attributes, vec!["escaping".to_string(), "convention".to_string()]);
        let lv = parse_uncached("@lvalue Int").expect("parse");
        assert!(lv.has_modifier("@lvalue"));
        assert_eq!(lv.unmodified(), &Type::name("Int"));
    }

    #[test]
    /// 空白の後の括弧は属性引数ではなく関数の引数型
    fn escaping_attribute_before_parameter_list() {
        let ty = parse_uncached("@escaping (Int) -> Int").expect("parse");
        let f = ty.as_function().expect("fn");
        assert_eq!(f.attributes, vec!["escaping".to_string()]);
        assert_eq!(f.arguments, vec![Type::name("Int")]);
        assert_eq!(f.ret.as_ref(), &Type::name("Int"));
        let spaced = parse_uncached("@convention (thin) (Int) -> ()").expect("parse");
        assert_eq!(spaced.as_function().expect("fn").arity(), 1);
    }

    #[test]
    /// 関数以外を関数として解析するとエラー
    fn non_function_is_rejected() {
        let err = parse_function_type("[Int]").expect_err("must fail");
        assert_eq!(err.0.code, "TYP010");
        assert!(err.0.msg.contains("Expected a function, got a array from [Int]"));
    }

    #[test]
    /// 不正な入力はエラーコード付きで失敗する
    fn malformed_inputs() {
        assert!(parse_type("(Int").is_err());
        assert!(parse_type("Int ->").is_err());
        assert!(parse_type("Int %").is_err());
        assert!(parse_type("Int Bool").is_err());
    }
}
