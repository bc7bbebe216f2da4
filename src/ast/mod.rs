// パス: src/ast/mod.rs
// 役割: Swift の AST ダンプ（S 式）を `Term` 木へ変換する
// 意図: `swiftc -dump-ast` の出力と同じ木の JSON 形を一つのデータ型で受け取る
// 関連ファイル: src/ast/declaration.rs, src/frontend/mod.rs, src/types/parser.rs
//! AST ダンプ
//!
//! 受理する形: `(name "arg" flag key=value key='quoted' key="text" range=[a - b] list=[a, b] (child) ...)`
//! - 裸の語は真のフラグとして `properties` に入る。
//! - `inherits: A, B` のようにコロンで終わるキーは後続の語を一覧として読む。
//! - `decl=` の値に続く `extension.X` と `[with ...]` は値の一部として連結する。

pub mod declaration;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CResult, CompileError, ParseError};
use crate::types::{parse_type, FunctionType, Type};

/// 項のプロパティ値。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Property {
    Flag(bool),
    Text(String),
    Range { from: String, to: String },
    List(Vec<String>),
}

/// AST ダンプの一節点。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub children: Vec<Term>,
}

/// `range=[file:line:col - ...]` の始点。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Term {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// 文字列プロパティ。
    pub fn string(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(Property::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.properties.get(key), Some(Property::Flag(true)))
    }

    /// 文字列プロパティを必須として読む。
    pub fn expect_string(&self, key: &str) -> CResult<&str> {
        match self.properties.get(key) {
            Some(Property::Text(s)) => Ok(s.as_str()),
            Some(other) => Err(CompileError::new(
                "AST010",
                format!("Value for {} on {} is of the wrong type: {:?}", key, self.name, other),
            )),
            None => Err(CompileError::new(
                "AST011",
                format!(
                    "Could not find {} in {}. Keys are {}",
                    key,
                    self.name,
                    self.properties.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            )),
        }
    }

    /// 一覧プロパティ。単一の文字列は一要素の一覧として扱う。
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.properties.get(key) {
            Some(Property::List(items)) => items.clone(),
            Some(Property::Text(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// `type=` を解析する。
    pub fn ty(&self) -> CResult<Type> {
        Ok(parse_type(self.expect_string("type")?)?)
    }

    /// `type=` を関数型として解析する。ジェネリック関数は本体の関数型を返す。
    pub fn function_type(&self) -> CResult<FunctionType> {
        let ty = self.ty()?;
        match ty.as_function() {
            Some(f) => Ok(f.clone()),
            None => Err(CompileError::new(
                "AST012",
                format!("Expected a function, got {}", ty.stringify()),
            )),
        }
    }

    /// i 番目の子。
    pub fn child(&self, index: usize) -> CResult<&Term> {
        self.children.get(index).ok_or_else(|| {
            CompileError::new(
                "AST013",
                format!(
                    "Expected at least {} children on {}, got {}",
                    index + 1,
                    self.name,
                    self.children.len()
                ),
            )
        })
    }

    /// 子の数が範囲内であることを確かめる。
    pub fn expect_children(&self, min: usize, max: usize) -> CResult<()> {
        let n = self.children.len();
        if n < min || n > max {
            return Err(CompileError::new(
                "AST014",
                format!(
                    "Expected between {} and {} children on {}, got {}",
                    min, max, self.name, n
                ),
            ));
        }
        Ok(())
    }

    pub fn find_child(&self, name: &str) -> Option<&Term> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 名前の一致する子を必須として探す。
    pub fn child_named(&self, name: &str) -> CResult<&Term> {
        self.find_child(name).ok_or_else(|| {
            CompileError::new(
                "AST015",
                format!(
                    "Could not find {} term: {}",
                    name,
                    self.children
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// `range=` の始点を `file:line:col` として読む。
    pub fn location(&self) -> Option<SourceLocation> {
        let from = match self.properties.get("range") {
            Some(Property::Range { from, .. }) => from,
            _ => return None,
        };
        let mut parts = from.rsplitn(3, ':');
        let column = parts.next()?.trim().parse().ok()?;
        let line = parts.next()?.trim().parse().ok()?;
        let file = parts.next().unwrap_or("").to_string();
        Some(SourceLocation { file, line, column })
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// 改行をまたがずに空白を読み飛ばした先を返す（位置は動かさない）。
    fn after_inline_ws(&self) -> usize {
        let mut p = self.pos;
        for c in self.text[self.pos..].chars() {
            if c == ' ' || c == '\t' {
                p += 1;
            } else {
                break;
            }
        }
        p
    }

    fn error(&self, code: &'static str, msg: impl Into<String>) -> ParseError {
        let before = &self.text[..self.pos];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let col = before[line_start..].chars().count() + 1;
        let snippet = self.text[line_start..].lines().next().unwrap_or("");
        ParseError::at_with_snippet(code, msg, Some(self.pos), Some(line), Some(col), snippet)
    }

    fn term(&mut self) -> Result<Term, ParseError> {
        if self.bump() != Some('(') {
            return Err(self.error("AST001", "'(' が必要です"));
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("AST002", "項の名前がありません"));
        }
        let mut term = Term::new(&self.text[start..self.pos]);
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error("AST004", format!("項 {} が閉じていません", term.name))),
                Some(')') => {
                    self.bump();
                    return Ok(term);
                }
                Some('(') => term.children.push(self.term()?),
                Some('"') => {
                    let arg = self.double_quoted()?;
                    term.args.push(arg);
                }
                Some(_) => self.attribute(&mut term)?,
            }
        }
    }

    fn double_quoted(&mut self) -> Result<String, ParseError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("AST005", "文字列が閉じていません")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("AST005", "文字列が閉じていません")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn single_quoted(&mut self) -> Result<String, ParseError> {
        self.bump();
        let start = self.pos;
        match self.rest().find('\'') {
            Some(len) => {
                self.pos += len + 1;
                Ok(self.text[start..start + len].to_string())
            }
            None => Err(self.error("AST005", "引用符が閉じていません")),
        }
    }

    /// 括弧の釣り合いを見ながら裸の語を読む。
    fn bare(&mut self, stop_at_eq: bool) -> String {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if depth == 0 && (c.is_whitespace() || c == ')') {
                break;
            }
            if depth == 0 && stop_at_eq && c == '=' {
                break;
            }
            match c {
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                '\'' => {
                    if let Some(len) = self.text[self.pos + 1..].find('\'') {
                        self.pos += len + 2;
                        continue;
                    }
                }
                _ => {}
            }
            self.bump();
        }
        self.text[start..self.pos].to_string()
    }

    /// `[` から対応する `]` までの中身を読む。
    fn bracketed(&mut self) -> Result<String, ParseError> {
        self.bump();
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return Err(self.error("AST006", "']' が必要です")),
                Some(']') if depth == 0 => {
                    let inner = self.text[start..self.pos].to_string();
                    self.bump();
                    return Ok(inner);
                }
                Some(c) => {
                    match c {
                        '[' | '(' => depth += 1,
                        ']' | ')' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    self.bump();
                }
            }
        }
    }

    fn attribute(&mut self, term: &mut Term) -> Result<(), ParseError> {
        let mut key = self.bare(true);
        if key.is_empty() {
            return Err(self.error("AST003", "属性を読めません"));
        }
        if key == "interface" {
            let p = self.after_inline_ws();
            if self.text[p..].starts_with("type=") {
                self.pos = p + "type".len();
                key = "interface type".into();
            }
        }
        if self.peek() == Some('=') {
            self.bump();
            let value = self.value()?;
            term.properties.insert(key, value);
            return Ok(());
        }
        if let Some(name) = key.strip_suffix(':') {
            let mut items = Vec::new();
            loop {
                self.pos = self.after_inline_ws();
                if matches!(self.peek(), None | Some(')') | Some('(') | Some('\n')) {
                    break;
                }
                let word = self.bare(false);
                let more = word.ends_with(',');
                let word = word.trim_end_matches(',').to_string();
                if !word.is_empty() {
                    items.push(word);
                }
                if !more {
                    break;
                }
            }
            let value = if items.len() == 1 {
                Property::Text(items.remove(0))
            } else {
                Property::List(items)
            };
            term.properties.insert(name.to_string(), value);
            return Ok(());
        }
        // 単独の 'x' はパターン名などの引数
        if key.len() >= 2 && key.starts_with('\'') && key.ends_with('\'') {
            term.args.push(key[1..key.len() - 1].to_string());
            return Ok(());
        }
        term.properties.insert(key, Property::Flag(true));
        Ok(())
    }

    fn value(&mut self) -> Result<Property, ParseError> {
        match self.peek() {
            Some('\'') => Ok(Property::Text(self.single_quoted()?)),
            Some('"') => Ok(Property::Text(self.double_quoted()?)),
            Some('[') => {
                let inner = self.bracketed()?;
                if let Some((from, to)) = split_range(&inner) {
                    return Ok(Property::Range { from, to });
                }
                Ok(Property::List(split_list(&inner)))
            }
            _ => {
                let mut text = self.bare(false);
                loop {
                    let p = self.after_inline_ws();
                    let tail = &self.text[p..];
                    if tail.starts_with("extension.") {
                        self.pos = p;
                        let ext = self.bare(false);
                        text.push(' ');
                        text.push_str(&ext);
                    } else if tail.starts_with("[with ") {
                        self.pos = p;
                        let with = self.bracketed()?;
                        text.push_str(" [");
                        text.push_str(&with);
                        text.push(']');
                    } else {
                        break;
                    }
                }
                Ok(Property::Text(text))
            }
        }
    }
}

fn split_range(inner: &str) -> Option<(String, String)> {
    let (from, to) = inner.split_once(" - ")?;
    Some((from.trim().to_string(), to.trim().to_string()))
}

fn split_list(inner: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out.retain(|s| !s.is_empty());
    out
}

/// AST ダンプを解析する。失敗時は `ast: <error>` をログに残す。
pub fn parse_ast(text: &str) -> Result<Term, ParseError> {
    let mut cursor = Cursor { text, pos: 0 };
    let result = (|| {
        cursor.skip_ws();
        let term = cursor.term()?;
        cursor.skip_ws();
        if cursor.peek().is_some() {
            return Err(cursor.error("AST007", "項の後に余分な入力があります"));
        }
        Ok(term)
    })();
    result.map_err(|e| {
        log::error!("ast: {}", e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 引数・フラグ・引用値・範囲・子を読む
    fn parses_basic_term() {
        let term = parse_ast(
            r#"(func_decl range=[main.swift:1:8 - line:3:1] "increment(number:)" interface type='(Int) -> Int' access=public
  (parameter_list
    (parameter "number" apiName=number type='Int'))
  (brace_stmt implicit))"#,
        )
        .expect("parse");
        assert_eq!(term.name, "func_decl");
        assert_eq!(term.args, vec!["increment(number:)".to_string()]);
        assert_eq!(term.string("interface type"), Some("(Int) -> Int"));
        assert_eq!(term.string("access"), Some("public"));
        assert_eq!(term.children.len(), 2);
        assert!(term.children[1].has_flag("implicit"));
        let loc = term.location().expect("location");
        assert_eq!(loc, SourceLocation { file: "main.swift".into(), line: 1, column: 8 });
        let param = &term.children[0].children[0];
        assert_eq!(param.ty().expect("type"), Type::name("Int"));
    }

    #[test]
    /// decl の値は extension と置換表まで含めて一つの文字列になる
    fn decl_values_keep_extensions_and_substitutions() {
        let term = parse_ast(
            "(declref_expr type='(Int, Int) -> Int' decl=Swift.(file).Int extension.+ function_ref=single)",
        )
        .expect("parse");
        assert_eq!(term.string("decl"), Some("Swift.(file).Int extension.+"));
        assert_eq!(term.string("function_ref"), Some("single"));

        let term = parse_ast(
            "(declref_expr decl=Swift.(file).Array.append [with (substitution_map generic_signature=<Element> (substitution Element -> Int))] implicit)",
        )
        .expect("parse");
        assert_eq!(
            term.string("decl"),
            Some("Swift.(file).Array.append [with (substitution_map generic_signature=<Element> (substitution Element -> Int))]")
        );
        assert!(term.has_flag("implicit"));
    }

    #[test]
    /// 一覧値とコロン形式のキー
    fn lists_and_colon_keys() {
        let term = parse_ast(
            "(struct_decl \"Point\" inherits: Equatable, Hashable\n (tuple_shuffle_expr elements=[0, 1, -2] variadic_sources=[]))",
        )
        .expect("parse");
        assert_eq!(
            term.property("inherits"),
            Some(&Property::List(vec!["Equatable".into(), "Hashable".into()]))
        );
        let shuffle = &term.children[0];
        assert_eq!(shuffle.list("elements"), vec!["0", "1", "-2"]);
        assert!(shuffle.list("variadic_sources").is_empty());
    }

    #[test]
    /// 二重引用の値はエスケープを解く
    fn string_values_unescape() {
        let term = parse_ast(r#"(string_literal_expr type='String' encoding=utf8 value="a\"b\n")"#)
            .expect("parse");
        assert_eq!(term.string("value"), Some("a\"b\n"));
    }

    #[test]
    /// 列挙パターンの判別子は裸のフラグとして残る
    fn enum_element_flags() {
        let term = parse_ast("(pattern_enum_element type='Barcode' Barcode.upc (pattern_paren))")
            .expect("parse");
        assert!(term.has_flag("Barcode.upc"));
    }

    #[test]
    /// 単独の単引用符の語は引数になる
    fn quoted_pattern_names_are_args() {
        let term = parse_ast("(pattern_named type='Int' 'x')").expect("parse");
        assert_eq!(term.args, vec!["x".to_string()]);
        assert_eq!(term.string("type"), Some("Int"));
    }

    #[test]
    /// JSON 形とも相互に変換できる
    fn json_form_matches() {
        let term =
            parse_ast("(integer_literal_expr type='Int' value=1 range=[a.swift:2:3 - line:2:3])")
                .expect("parse");
        let json = serde_json::to_string(&term).expect("json");
        let back: Term = serde_json::from_str(&json).expect("from json");
        assert_eq!(back, term);
    }

    #[test]
    /// 閉じていない項や余分な入力はエラー
    fn malformed_dumps() {
        let err = parse_ast("(source_file\n  (func_decl \"f\"").expect_err("unclosed");
        assert_eq!(err.0.code, "AST004");
        assert_eq!(err.0.line, Some(2));
        assert_eq!(parse_ast("(a) b").expect_err("trailing").0.code, "AST007");
        assert_eq!(parse_ast("a").expect_err("no paren").0.code, "AST001");
    }
}
