// パス: src/driver.rs
// 役割: 入力の種類判定・変換・整形・出力ファイルへの書き出しをまとめる入口
// 意図: CLI とライブラリ利用者が同じ経路で SIL / AST ダンプ / JSON を JavaScript に変換できるようにする
// 関連ファイル: src/bin/swift-to-js.rs, src/sil/mod.rs, src/frontend/mod.rs, src/js/printer.rs
//! 変換ドライバ
//!
//! - 入力の種類は明示されなければ拡張子（`.sil` / `.ast` / `.json`）、次に内容から推定する。
//! - `emit_helpers = false` のときはトラップ補助関数の宣言を出力から外す（実行環境側が用意する前提）。
//! - 出力ファイルは同じディレクトリの一時ファイルに書いてから置き換える。

use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;

use crate::ast::{parse_ast, Term};
use crate::builtins::common::Trap;
use crate::builtins::new_context_with_builtins;
use crate::errors::{CompileError, EvalError, ParseError};
use crate::frontend::compile_term_to_program;
use crate::interp::Interpreter;
use crate::js::printer::{print_program, PrinterOptions};
use crate::js::{Program, Stmt};

/// 入力の形式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum InputKind {
    /// SIL テキスト
    Sil,
    /// `swiftc -dump-ast` の S 式
    AstDump,
    /// AST ダンプと同じ木の JSON
    AstJson,
}

impl InputKind {
    /// 拡張子から推定する。
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "sil" => Some(InputKind::Sil),
            "ast" => Some(InputKind::AstDump),
            "json" => Some(InputKind::AstJson),
            _ => None,
        }
    }

    /// 内容の先頭から推定する。
    pub fn sniff(source: &str) -> Self {
        let head = source.trim_start();
        if head.starts_with('{') {
            InputKind::AstJson
        } else if head.starts_with("sil_stage")
            || source.contains("\nsil ")
            || head.starts_with("sil ")
        {
            InputKind::Sil
        } else {
            InputKind::AstDump
        }
    }
}

/// 変換の設定。
#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub input: Option<InputKind>,
    pub emit_helpers: bool,
    pub print: PrinterOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            input: None,
            emit_helpers: true,
            print: PrinterOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("出力ファイルの置き換えに失敗しました: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("{0}")]
    Eval(#[from] EvalError),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// ソース文字列を構文木のままの JavaScript プログラムに変換する。
pub fn compile_program(source: &str, options: &CompileOptions) -> DriverResult<Program> {
    let kind = options.input.unwrap_or_else(|| InputKind::sniff(source));
    log::debug!("driver: compiling {:?} input ({} bytes)", kind, source.len());
    let program = match kind {
        InputKind::Sil => crate::sil::compile(source)?,
        InputKind::AstDump => {
            let term = parse_ast(source).map_err(|e| {
                log::error!("AST dump parse failed: {}", e);
                e
            })?;
            compile_term(&term)?
        }
        InputKind::AstJson => {
            let term: Term = serde_json::from_str(source)?;
            compile_term(&term)?
        }
    };
    Ok(if options.emit_helpers {
        program
    } else {
        strip_trap_helpers(program)
    })
}

fn compile_term(term: &Term) -> Result<Program, CompileError> {
    let mut ctx = new_context_with_builtins();
    compile_term_to_program(&mut ctx, term)
}

/// 本体が `throw new E(message)` だけのトラップ補助関数を取り除く。
fn strip_trap_helpers(program: Program) -> Program {
    let traps: Vec<Stmt> = Trap::ALL.iter().map(|t| t.throw_statement()).collect();
    let body = program
        .body
        .into_iter()
        .filter(|stmt| match stmt {
            Stmt::Function { body, .. } => !(body.len() == 1 && traps.contains(&body[0])),
            _ => true,
        })
        .collect();
    Program { body }
}

/// ソース文字列を JavaScript のテキストに変換する。
pub fn compile_source(source: &str, options: &CompileOptions) -> DriverResult<String> {
    let program = compile_program(source, options)?;
    Ok(print_program(&program, &options.print))
}

/// ファイルを読み、拡張子から入力の種類を決めて変換する。
pub fn compile_file(path: &Path, options: &CompileOptions) -> DriverResult<String> {
    let source = std::fs::read_to_string(path)?;
    let options = CompileOptions {
        input: options.input.or_else(|| InputKind::from_path(path)),
        ..options.clone()
    };
    compile_source(&source, &options)
}

/// 出力を一時ファイル経由で書き出す（途中で失敗しても既存の出力を壊さない）。
pub fn write_output(path: &Path, text: &str) -> DriverResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    let mut file = tempfile::NamedTempFile::new_in(&dir)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    file.persist(path)?;
    log::debug!("driver: wrote {}", path.display());
    Ok(())
}

/// 変換結果をインタプリタで実行し、`console.log` の出力行を返す。
pub fn run_program(program: &Program) -> DriverResult<Vec<String>> {
    let mut interp = Interpreter::new();
    interp.run_program(program)?;
    Ok(interp.take_output())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INCREMENT_SIL: &str = r#"sil_stage canonical

import Builtin
import Swift

// increment(number:)
sil @$s4main9increment6numberS2i_tF : $@convention(thin) (Int) -> Int {
bb0(%0 : $Int):
  %1 = integer_literal $Builtin.Int64, 1
  %2 = struct_extract %0 : $Int, #Int._value
  %3 = integer_literal $Builtin.Int1, -1
  %4 = builtin "sadd_with_overflow_Int64"(%2 : $Builtin.Int64, %1 : $Builtin.Int64, %3 : $Builtin.Int1) : $(Builtin.Int64, Builtin.Int1)
  %5 = tuple_extract %4 : $(Builtin.Int64, Builtin.Int1), 0
  %6 = tuple_extract %4 : $(Builtin.Int64, Builtin.Int1), 1
  cond_fail %6 : $Builtin.Int1
  %7 = struct $Int (%5 : $Builtin.Int64)
  return %7 : $Int
}
"#;

    #[test]
    /// 拡張子と内容から入力の種類を推定する
    fn infers_input_kind() {
        assert_eq!(InputKind::from_path(Path::new("a/b.sil")), Some(InputKind::Sil));
        assert_eq!(InputKind::from_path(Path::new("x.json")), Some(InputKind::AstJson));
        assert_eq!(InputKind::from_path(Path::new("x.txt")), None);
        assert_eq!(InputKind::sniff(INCREMENT_SIL), InputKind::Sil);
        assert_eq!(InputKind::sniff("(source_file)"), InputKind::AstDump);
        assert_eq!(InputKind::sniff(" {\"name\": \"source_file\"}"), InputKind::AstJson);
    }

    #[test]
    /// ファイルを変換し、一時ファイル経由で書き出す
    fn compiles_file_and_writes_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("increment.sil");
        std::fs::write(&input, INCREMENT_SIL).expect("write input");
        let js = compile_file(&input, &CompileOptions::default()).expect("compile");
        assert!(js.contains("function $s4main9increment6numberS2i_tF(_0) {"), "{}", js);
        assert!(js.contains("export const increment = $s4main9increment6numberS2i_tF;"), "{}", js);

        let output = dir.path().join("out").join("increment.js");
        write_output(&output, &js).expect("write output");
        assert_eq!(std::fs::read_to_string(&output).expect("read back"), js);
    }

    #[test]
    /// emit_helpers を切るとトラップ補助関数が出力されない
    fn strips_trap_helpers() {
        let options = CompileOptions {
            input: Some(InputKind::Sil),
            emit_helpers: false,
            ..CompileOptions::default()
        };
        let js = compile_source(INCREMENT_SIL, &options).expect("compile");
        assert!(!js.contains("throw new RangeError"));
        let full = compile_source(INCREMENT_SIL, &CompileOptions::default()).expect("compile");
        assert!(full.contains("throw new RangeError"));
    }

    #[test]
    /// 存在しないファイルは Io エラー
    fn missing_file_is_io_error() {
        let err = compile_file(Path::new("/nonexistent/input.sil"), &CompileOptions::default())
            .expect_err("missing");
        assert!(matches!(err, DriverError::Io(_)));
    }

    #[test]
    /// 壊れた JSON は Json エラー
    fn malformed_json_is_json_error() {
        let options = CompileOptions {
            input: Some(InputKind::AstJson),
            ..CompileOptions::default()
        };
        let err = compile_source("{\"name\": ", &options).expect_err("json");
        assert!(matches!(err, DriverError::Json(_)));
    }
}
