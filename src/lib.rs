// パス: src/lib.rs
// 役割: クレートのルート。各モジュールを束ね、主要な入口を再エクスポートする
// 意図: Swift の AST ダンプ / SIL から JavaScript への変換を、段階ごとに差し替えやすい形で公開する
// 関連ファイル: src/driver.rs, src/frontend/mod.rs, src/sil/mod.rs, src/errors.rs
//! swift-to-js（Rust）ルートモジュール
//!
//! 目的:
//! - Swift コンパイラの中間出力（型検査済み AST ダンプ、または SIL）を JavaScript に変換する。
//! - 変換結果は構文木（`js::Program`）として得られ、整形・実行（`interp`）の両方に使える。
//!
//! 段階:
//! - `types` 型文字列の構文解析
//! - `values` / `reified` 値の代数と型の具象化（複製・格納・既定値）
//! - `context` / `scope` スコープの木と名前の衝突回避
//! - `builtins` 標準ライブラリ相当の型とプロトコル
//! - `ast` + `frontend` AST ダンプの翻訳、`sil` SIL の翻訳
//! - `js` 出力の構文木とプリンタ、`interp` その場で実行するインタプリタ
//!
//! 方針:
//! - コメント/ドキュメントは日本語、識別子は英語。
//! - 変換の失敗は `CompileError`、ドライバの失敗は `DriverError` で返す。

pub mod ast;
pub mod builtins;
pub mod context;
pub mod driver;
pub mod errors;
pub mod frontend;
pub mod functions;
pub mod interp;
pub mod js;
pub mod reified;
pub mod scope;
pub mod sil;
pub mod types;
pub mod values;

// 便利な再エクスポート（エラーとドライバの入口のみ）
pub use crate::driver::{compile_file, compile_source, CompileOptions, DriverError, InputKind};
pub use crate::errors::*;
