// パス: src/builtins/mod.rs
// 役割: 組み込み型・組み込みプロトコル・大域関数の登録
// 意図: 翻訳を始める前に標準ライブラリ相当の表を Context に揃える
// 関連ファイル: src/context.rs, src/builtins/protocols.rs, src/builtins/globals.rs
//! 組み込み（Swift 標準ライブラリの意味論）
//!
//! プロトコルを先に登録する。型の適合表は登録済みのプロトコル定義から既定実装を取り込むため。

pub mod array;
pub mod bool;
pub mod closed_range;
pub mod common;
pub mod dictionary;
pub mod floats;
pub mod globals;
pub mod indexing_iterator;
pub mod integers;
pub mod optional;
pub mod protocols;
pub mod string;

use crate::context::Context;
use crate::reified::fixed;

/// 組み込みをすべて登録した Context を作る。
pub fn new_context_with_builtins() -> Context {
    let mut ctx = Context::new();
    add_builtins(&mut ctx);
    ctx
}

/// 既存の Context に組み込みを登録する。
pub fn add_builtins(ctx: &mut Context) {
    protocols::add_default_protocols(ctx);

    let mut fixed_types = vec![
        bool::bool_type(ctx),
        bool::hasher_type(),
        floats::build_floating_type(ctx, "Double"),
        floats::build_floating_type(ctx, "Float"),
        string::string_type(ctx, "String"),
        string::string_type(ctx, "Substring"),
        string::character_type(ctx),
        string::default_string_interpolation_type(),
        optional::nil_comparison_type(),
    ];
    fixed_types.extend(integers::integer_types(ctx));
    for reified in fixed_types {
        let name = reified.name.clone();
        ctx.types.insert(name, fixed(reified));
    }

    ctx.types.insert("Optional".into(), optional::optional_constructor());
    ctx.types.insert("Array".into(), array::array_constructor());
    ctx.types.insert("Dictionary".into(), dictionary::dictionary_constructor());
    ctx.types.insert(
        "IndexingIterator".into(),
        indexing_iterator::indexing_iterator_constructor(),
    );
    ctx.types.insert("ClosedRange".into(), closed_range::closed_range_constructor());

    globals::add_global_functions(ctx);
    log::debug!(
        "registered {} builtin types, {} protocols, {} functions",
        ctx.types.len(),
        ctx.protocols.len(),
        ctx.functions.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reified::reify_type;
    use crate::types::Type;

    #[test]
    /// 主要な組み込み型はすべて解決できる
    fn resolves_builtin_types() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        for ty in [
            Type::name("Int"),
            Type::name("UInt8"),
            Type::name("Double"),
            Type::name("Bool"),
            Type::name("String"),
            Type::name("Character"),
            Type::optional(Type::name("Int")),
            Type::array(Type::name("String")),
            Type::dictionary(Type::name("String"), Type::name("Int")),
            Type::generic(Type::name("ClosedRange"), vec![Type::name("Int")]),
        ] {
            assert!(reify_type(&mut ctx, root, &ty).is_ok(), "{}", ty.stringify());
        }
    }

    #[test]
    /// 配列は要素の Equatable 適合を引き継ぐ
    fn array_conformances_follow_element() {
        let mut ctx = new_context_with_builtins();
        let root = ctx.root();
        let ints = reify_type(&mut ctx, root, &Type::array(Type::name("Int"))).expect("[Int]");
        assert!(ints.conforms_to("Equatable"));
        assert!(ints.conforms_to("Collection"));
        assert!(ints.conforms_to("Sequence"));
    }
}
