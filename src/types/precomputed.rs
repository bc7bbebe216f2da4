// パス: src/types/precomputed.rs
// 役割: 頻出する型シグネチャを一度だけ解析して共有する表
// 意図: 組み込み型の定義で繰り返し現れるシグネチャの再解析を避ける
// 関連ファイル: src/types/parser.rs, src/builtins/protocols.rs
//! 事前計算済みシグネチャ表（`once_cell::sync::Lazy`）。

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::parser::parse_uncached;
use super::Type;

const FREQUENT: &[&str] = &[
    "()",
    "Bool",
    "Int",
    "String",
    "Self",
    "(Self) -> Bool",
    "(Self) -> Self",
    "(Self) -> Int",
    "(Self) -> String",
    "(Self) -> ()",
    "(Self, Self) -> Bool",
    "(Self, Self) -> Self",
    "(Self, Self) -> (Self, Self)",
    "(Self, Self) -> (partialValue: Self, overflow: Bool)",
    "(Self, Int) -> Self",
    "(Self, Self.Stride) -> Self",
    "(Self, Self) -> Self.Stride",
    "(inout Self) -> ()",
    "(inout Self, Self) -> ()",
    "(inout Self, Int) -> ()",
    "(inout Self.Index) -> ()",
    "(Self.Index) -> Self.Index",
    "(Self.Index, Int) -> Self.Index",
    "(Self.Index, Self.Index) -> Int",
    "(inout Hasher) -> ()",
    "(Int) -> Self",
    "(Bool) -> Self",
    "(String) -> Self",
    "(String) -> Self?",
    "(Self.Type) -> Self",
    "() -> Self",
    "() -> Bool",
    "() -> Int",
    "(Int, Int) -> Int",
    "(Int, Int) -> Bool",
    "(Bool, Bool) -> Bool",
    "(String, String) -> String",
    "(Any...) -> ()",
];

static TABLE: Lazy<HashMap<&'static str, Type>> = Lazy::new(|| {
    FREQUENT
        .iter()
        .filter_map(|text| parse_uncached(text).ok().map(|ty| (*text, ty)))
        .collect()
});

/// 事前計算済みなら共有の型を返す。
pub fn lookup(text: &str) -> Option<&'static Type> {
    TABLE.get(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 表のすべての項目が解析できる
    fn every_entry_parses() {
        for text in FREQUENT {
            assert!(lookup(text).is_some(), "{} が表にない", text);
        }
    }

    #[test]
    /// 表から返る型は通常の解析結果と一致する
    fn shared_matches_fresh_parse() {
        let shared = lookup("(Self, Self) -> Bool").expect("entry");
        let fresh = parse_uncached("(Self, Self) -> Bool").expect("parse");
        assert_eq!(shared, &fresh);
    }
}
