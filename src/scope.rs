// パス: src/scope.rs
// 役割: レキシカルスコープのアリーナ要素・宣言フラグ・名前マングリングを定義する
// 意図: Swift の完全修飾名を JavaScript 識別子へ決定的に写像する
// 関連ファイル: src/context.rs, src/values/read.rs, src/frontend/mod.rs
//! スコープとマングリング
//!
//! - スコープは `Context` が `Vec<Scope>` として保持し、`ScopeId` で参照する。
//! - `declarations` は宣言済みの名前（巻き上げ文があれば `Some`）、
//!   `mapping` はこのスコープだけで有効な名前 → 値の対応。
//! - `mangle_name` は全域・決定的。記号は置換表で、表にない記号は `$<文字コード>$` になる。

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{BitAnd, BitOr};

use crate::js::Stmt;
use crate::values::Value;

/// スコープアリーナの添字。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub name: String,
    /// 宣言順を保持する（出力順がそのまま決まる）
    pub declarations: Vec<(String, Option<Stmt>)>,
    pub mapping: BTreeMap<String, Value>,
    /// インライン展開先で使われた一時名（一意名の探索だけに効く）
    pub reserved: BTreeSet<String>,
    /// このスコープで宣言された Swift の変数名
    pub variables: BTreeSet<String>,
    pub parent: Option<ScopeId>,
    /// 呼び出し元の文列へ展開されるスコープか
    pub inline: bool,
}

impl Scope {
    pub fn new(name: impl Into<String>, parent: Option<ScopeId>, inline: bool) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
            mapping: BTreeMap::new(),
            reserved: BTreeSet::new(),
            variables: BTreeSet::new(),
            parent,
            inline,
        }
    }

    pub fn has_declaration(&self, name: &str) -> bool {
        self.declarations.iter().any(|(n, _)| n == name)
    }

    /// 宣言または予約で名前が使われているか。
    pub fn uses_name(&self, name: &str) -> bool {
        self.has_declaration(name) || self.reserved.contains(name)
    }
}

/// 変数宣言の性質。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeclarationFlags(u8);

impl DeclarationFlags {
    pub const NONE: DeclarationFlags = DeclarationFlags(0);
    pub const CONST: DeclarationFlags = DeclarationFlags(1);
    pub const EXPORT: DeclarationFlags = DeclarationFlags(2);
    pub const BOXED: DeclarationFlags = DeclarationFlags(4);

    pub fn contains(self, other: DeclarationFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: DeclarationFlags) -> DeclarationFlags {
        DeclarationFlags(self.0 & !other.0)
    }
}

impl BitOr for DeclarationFlags {
    type Output = DeclarationFlags;
    fn bitor(self, rhs: Self) -> Self {
        DeclarationFlags(self.0 | rhs.0)
    }
}

impl BitAnd for DeclarationFlags {
    type Output = DeclarationFlags;
    fn bitand(self, rhs: Self) -> Self {
        DeclarationFlags(self.0 & rhs.0)
    }
}

const MODULE_PREFIXES: &[&str] = &["Swift.(file).", "Swift.(swift-to-js)."];

fn mangle_symbol(symbol: char) -> String {
    let mapped = match symbol {
        ':' => "$",
        '.' => "$",
        '_' => "_",
        '(' => "$",
        ')' => "",
        '[' => "$open$",
        ']' => "$close$",
        '$' => "$dollar$",
        ' ' => "$space$",
        '+' => "$plus$",
        '-' => "$minus$",
        '*' => "$multiply$",
        '/' => "$divide$",
        '%' => "$mod$",
        '<' => "$less$",
        '>' => "$greater$",
        '=' => "$equal$",
        '&' => "$and$",
        '|' => "$or$",
        '^' => "$xor$",
        '!' => "$not$",
        '?' => "$question$",
        ',' => "$comma$",
        '~' => "$tilde$",
        other => return format!("${}$", other as u32),
    };
    mapped.to_string()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Swift の名前を JavaScript の識別子へ写像する。
pub fn mangle_name(name: &str) -> String {
    // 1 段目: 語頭の `_:` を取り除く
    let mut first = String::with_capacity(name.len());
    let mut prev: Option<char> = None;
    let mut chars = name.char_indices();
    while let Some((i, c)) = chars.next() {
        let at_boundary = !prev.map(is_word_char).unwrap_or(false);
        if c == '_' && at_boundary && name[i..].starts_with("_:") {
            chars.next();
            prev = Some(':');
            continue;
        }
        first.push(c);
        prev = Some(c);
    }
    // 2 段目: モジュール接頭辞・`()`・非単語文字
    let mut out = String::with_capacity(first.len() * 2);
    let mut i = 0;
    'outer: while i < first.len() {
        let rest = &first[i..];
        for prefix in MODULE_PREFIXES {
            let body = &prefix[..prefix.len() - 1];
            if rest.starts_with(body) && rest.len() > body.len() {
                out.push_str("$$");
                let skip = rest[body.len()..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(0);
                i += body.len() + skip;
                continue 'outer;
            }
        }
        if rest.starts_with("()") {
            i += 2;
            continue;
        }
        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };
        if is_word_char(c) {
            out.push(c);
        } else {
            out.push_str(&mangle_symbol(c));
        }
        i += c.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 関数名のラベルは `$` 区切りになる
    fn mangles_labels() {
        assert_eq!(mangle_name("add(lhs:rhs:)"), "add$lhs$rhs$");
        assert_eq!(mangle_name("negate(_:)"), "negate");
        assert_eq!(mangle_name("append(contentsOf:)"), "append$contentsOf$");
        assert_eq!(mangle_name("count"), "count");
    }

    #[test]
    /// 演算子は名前付きの置換になる
    fn mangles_operators() {
        assert_eq!(mangle_name("=="), "$equal$$equal$");
        assert_eq!(mangle_name("+"), "$plus$");
        assert_eq!(mangle_name("~="), "$tilde$$equal$");
        assert_eq!(mangle_name("..."), "$$$");
    }

    #[test]
    /// モジュール接頭辞は `$$` に縮む
    fn mangles_module_prefix() {
        assert_eq!(
            mangle_name("Swift.(swift-to-js).arrayBoundsFailed()"),
            "$$arrayBoundsFailed"
        );
        assert_eq!(mangle_name("Swift.(file).Int.+"), "$$Int$$plus$");
    }

    #[test]
    /// 型名由来の識別子
    fn mangles_type_names() {
        assert_eq!(mangle_name(":Int.Equatable"), "$Int$Equatable");
        assert_eq!(mangle_name(":[String].Equatable"), "$$open$String$close$$Equatable");
        assert_eq!(mangle_name(":Double?.Equatable"), "$Double$question$$Equatable");
        assert_eq!(mangle_name("a b,c"), "a$space$b$comma$c");
    }

    #[test]
    /// 表にない記号は文字コードになる
    fn mangles_unknown_symbols() {
        assert_eq!(mangle_name("a#b"), "a$35$b");
        assert_eq!(mangle_name("τ"), "$964$");
    }

    #[test]
    /// 宣言フラグの合成と除去
    fn declaration_flags() {
        let flags = DeclarationFlags::CONST | DeclarationFlags::EXPORT;
        assert!(flags.contains(DeclarationFlags::EXPORT));
        assert!(!flags.without(DeclarationFlags::CONST).contains(DeclarationFlags::CONST));
    }
}
