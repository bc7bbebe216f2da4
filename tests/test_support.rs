// パス: tests/test_support.rs
// 役割: 統合テスト共通の補助関数（変換・実行・公開関数の呼び出し）を提供する
// 意図: 変換してインタプリタで走らせる定型手順を一元化しテストを簡潔に保つ
// 関連ファイル: tests/sil_pipeline.rs, tests/ast_pipeline.rs, tests/interp_programs.rs
#![allow(dead_code)]
use swifttojs::driver::{compile_program, CompileOptions, InputKind};
use swifttojs::errors::EvalError;
use swifttojs::interp::{Interpreter, JsValue};
use swifttojs::js::printer::{print_program, PrinterOptions};
use swifttojs::js::Program;

pub fn compile_as(kind: InputKind, source: &str) -> Program {
    let options = CompileOptions {
        input: Some(kind),
        ..CompileOptions::default()
    };
    compile_program(source, &options).expect("compile")
}

pub fn compile_sil(source: &str) -> Program {
    compile_as(InputKind::Sil, source)
}

pub fn compile_ast(source: &str) -> Program {
    compile_as(InputKind::AstDump, source)
}

pub fn js(program: &Program) -> String {
    print_program(program, &PrinterOptions::default())
}

/// 変換結果を実行し、最上位の文まで評価し終えたインタプリタを返すフィクスチャ。
pub struct Loaded {
    pub interp: Interpreter,
    pub text: String,
}

impl Loaded {
    pub fn new(program: &Program) -> Self {
        let text = js(program);
        let mut interp = Interpreter::new();
        interp
            .run_program(program)
            .unwrap_or_else(|e| panic!("run program: {}\n{}", e, text));
        Self { interp, text }
    }

    /// 接頭辞で公開名を探す（引数ラベルの付いた名前にも一致させる）。
    pub fn export(&self, prefix: &str) -> String {
        self.interp
            .export_names()
            .find(|name| *name == prefix || name.starts_with(&format!("{}$", prefix)))
            .map(str::to_string)
            .unwrap_or_else(|| panic!("no export {} in\n{}", prefix, self.text))
    }

    pub fn call(&mut self, prefix: &str, args: Vec<JsValue>) -> Result<JsValue, EvalError> {
        let name = self.export(prefix);
        self.interp.call_export(&name, args)
    }

    pub fn call_number(&mut self, prefix: &str, args: &[f64]) -> f64 {
        let args = args.iter().map(|n| JsValue::from(*n)).collect();
        self.call(prefix, args)
            .expect("call")
            .as_number()
            .expect("number result")
    }
}

/// 捕まらなかった例外のメッセージに `needle` が含まれることを確かめる。
pub fn assert_uncaught(result: Result<JsValue, EvalError>, needle: &str) {
    let err = result.expect_err("expected a thrown error");
    assert_eq!(err.code(), "EVAL001");
    assert!(err.0.msg.contains(needle), "{}", err.0.msg);
}
