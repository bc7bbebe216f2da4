// パス: src/types/mod.rs
// 役割: Swift 型シグネチャの構造表現と文字列化を提供する
// 意図: 型テキストを一度解析した木として具象化エンジンへ渡す
// 関連ファイル: src/types/parser.rs, src/types/precomputed.rs, src/reified.rs
//! 型表現
//!
//! - `Type` は不変で循環を持たない木。`stringify` で正規形テキストへ戻せる。
//! - タプルのラベルは保持しない（`(lhs: Int, rhs: Int)` は `(Int, Int)`）。
//! - 解析は `parse_type` / `parse_function_type`。頻出シグネチャは事前計算表を共有する。

mod parser;
pub mod precomputed;

pub use parser::{parse_function_type, parse_type};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Name(String),
    Optional(Box<Type>),
    /// 要素数 0 は Void
    Tuple(Vec<Type>),
    Array(Box<Type>),
    Dictionary {
        key: Box<Type>,
        value: Box<Type>,
    },
    Generic {
        base: Box<Type>,
        arguments: Vec<Type>,
    },
    Function(FunctionType),
    Metatype {
        base: Box<Type>,
        /// `.Protocol` なら true、`.Type` なら false
        as_protocol: bool,
    },
    Modified {
        modifier: String,
        ty: Box<Type>,
    },
    Namespaced {
        namespace: Box<Type>,
        ty: Box<Type>,
    },
    Constrained {
        ty: Box<Type>,
        constraint: Box<Type>,
    },
}

/// 関数型。引数はタプル要素の並びとして持つ。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub arguments: Vec<Type>,
    pub ret: Box<Type>,
    pub throws: bool,
    pub rethrows: bool,
    pub attributes: Vec<String>,
}

impl Type {
    pub fn name(name: impl Into<String>) -> Type {
        Type::Name(name.into())
    }

    pub fn void() -> Type {
        Type::Tuple(Vec::new())
    }

    pub fn optional(inner: Type) -> Type {
        Type::Optional(Box::new(inner))
    }

    pub fn array(inner: Type) -> Type {
        Type::Array(Box::new(inner))
    }

    pub fn dictionary(key: Type, value: Type) -> Type {
        Type::Dictionary {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn generic(base: Type, arguments: Vec<Type>) -> Type {
        Type::Generic {
            base: Box::new(base),
            arguments,
        }
    }

    /// 種別名（エラーメッセージ用）。
    pub fn kind(&self) -> &'static str {
        match self {
            Type::Name(_) => "name",
            Type::Optional(_) => "optional",
            Type::Tuple(_) => "tuple",
            Type::Array(_) => "array",
            Type::Dictionary { .. } => "dictionary",
            Type::Generic { .. } => "generic",
            Type::Function(_) => "function",
            Type::Metatype { .. } => "metatype",
            Type::Modified { .. } => "modified",
            Type::Namespaced { .. } => "namespaced",
            Type::Constrained { .. } => "constrained",
        }
    }

    /// 修飾子（`inout` など）を持つか。
    pub fn has_modifier(&self, modifier: &str) -> bool {
        match self {
            Type::Modified { modifier: m, ty } => m == modifier || ty.has_modifier(modifier),
            _ => false,
        }
    }

    /// 修飾子と制約を外した本体の型。
    pub fn unmodified(&self) -> &Type {
        match self {
            Type::Modified { ty, .. } | Type::Constrained { ty, .. } => ty.unmodified(),
            other => other,
        }
    }

    /// Optional の入れ子の深さ。
    pub fn optional_depth(&self) -> usize {
        match self {
            Type::Optional(inner) => 1 + inner.optional_depth(),
            _ => 0,
        }
    }

    /// 関数型として見る（ジェネリック関数の場合は本体の関数型）。
    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            Type::Generic { base, .. } => base.as_function(),
            Type::Modified { ty, .. } => ty.as_function(),
            _ => None,
        }
    }

    /// 正規形テキスト。
    pub fn stringify(&self) -> String {
        self.stringify_with(&|_: &Type| None)
    }

    /// 置換関数を通して文字列化する（ジェネリック引数の差し替え用）。
    pub fn stringify_with(&self, replacer: &dyn Fn(&Type) -> Option<Type>) -> String {
        let replaced = replacer(self);
        let ty = replaced.as_ref().unwrap_or(self);
        let join = |items: &[Type]| {
            items
                .iter()
                .map(|t| t.stringify_with(replacer))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match ty {
            Type::Optional(inner) => format!("{}?", inner.stringify_with(replacer)),
            Type::Generic { base, arguments } => {
                if let Type::Function(_) = base.as_ref() {
                    format!("<{}> {}", join(arguments), base.stringify_with(replacer))
                } else {
                    format!("{}<{}>", base.stringify_with(replacer), join(arguments))
                }
            }
            Type::Function(f) => {
                let mut out = format!("({})", join(&f.arguments));
                if f.throws {
                    out.push_str(" throws");
                }
                if f.rethrows {
                    out.push_str(" rethrows");
                }
                out.push_str(" -> ");
                out.push_str(&f.ret.stringify_with(replacer));
                out
            }
            Type::Tuple(items) => format!("({})", join(items)),
            Type::Array(inner) => format!("[{}]", inner.stringify_with(replacer)),
            Type::Dictionary { key, value } => format!(
                "[{}: {}]",
                key.stringify_with(replacer),
                value.stringify_with(replacer)
            ),
            Type::Metatype { base, as_protocol } => format!(
                "{}.{}",
                base.stringify_with(replacer),
                if *as_protocol { "Protocol" } else { "Type" }
            ),
            Type::Modified { modifier, ty } => {
                format!("{} {}", modifier, ty.stringify_with(replacer))
            }
            Type::Namespaced { namespace, ty } => format!(
                "{}.{}",
                namespace.stringify_with(replacer),
                ty.stringify_with(replacer)
            ),
            Type::Name(name) => name.clone(),
            Type::Constrained { ty, constraint } => {
                let inner = ty.stringify_with(replacer);
                format!(
                    "{} where {} : {}",
                    inner,
                    inner,
                    constraint.stringify_with(replacer)
                )
            }
        }
    }
}

impl FunctionType {
    pub fn new(arguments: Vec<Type>, ret: Type) -> Self {
        Self {
            arguments,
            ret: Box::new(ret),
            throws: false,
            rethrows: false,
            attributes: Vec::new(),
        }
    }

    /// 引数の個数。
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    pub fn into_type(self) -> Type {
        Type::Function(self)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stringify())
    }
}
