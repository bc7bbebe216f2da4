// パス: tests/ast_pipeline.rs
// 役割: AST ダンプ（S 式と JSON）を変換し、出力を実行して振る舞いを確かめる
// 意図: 公開関数の書き出し・検査付き整数演算・分岐が AST 経路でも保たれることを保証する
// 関連ファイル: src/frontend/mod.rs, src/builtins/integers.rs, src/driver.rs, tests/test_support.rs
#[path = "test_support.rs"]
mod support;

use support::{assert_uncaught, compile_as, compile_ast, js, Loaded};
use swifttojs::ast::parse_ast;
use swifttojs::driver::InputKind;
use swifttojs::interp::JsValue;
use swifttojs::{compile_source, CompileOptions};

const ANSWER: &str = r#"(source_file
  (func_decl "answer()" interface type='() -> Int' access=public
    (parameter_list)
    (brace_stmt
      (return_stmt
        (integer_literal_expr type='Int' value=42)))))"#;

const INCREMENT: &str = r#"(source_file
  (func_decl "increment(number:)" interface type='(Int) -> Int' access=public
    (parameter_list
      (parameter "number" apiName=number type='Int'))
    (brace_stmt
      (return_stmt
        (binary_expr type='Int'
          (dot_syntax_call_expr implicit type='(Int, Int) -> Int'
            (declref_expr type='(Int.Type) -> (Int, Int) -> Int' decl=Swift.(file).Int extension.+)
            (type_expr implicit type='Int.Type'))
          (tuple_expr implicit type='(Int, Int)'
            (declref_expr type='Int' decl=main.(file).increment(number:).number@main.swift:1:16)
            (integer_literal_expr type='Int' value=1)))))))"#;

const CLAMP: &str = r#"(source_file
  (func_decl "clampLow(_:)" interface type='(Int) -> Int' access=public
    (parameter_list
      (parameter "value" type='Int'))
    (brace_stmt
      (if_stmt
        (binary_expr type='Bool'
          (dot_syntax_call_expr implicit type='(Int, Int) -> Bool'
            (declref_expr type='(Int.Type) -> (Int, Int) -> Bool' decl=Swift.(file).Int extension.<)
            (type_expr implicit type='Int.Type'))
          (tuple_expr implicit type='(Int, Int)'
            (declref_expr type='Int' decl=main.(file).clampLow(_:).value@main.swift:1:22)
            (integer_literal_expr type='Int' value=0)))
        (brace_stmt
          (return_stmt
            (integer_literal_expr type='Int' value=0)))
        (brace_stmt
          (return_stmt
            (declref_expr type='Int' decl=main.(file).clampLow(_:).value@main.swift:1:22)))))))"#;

#[test]
/// 公開関数は書き出され、呼び出すと値を返す
fn public_function_runs() {
    let program = compile_ast(ANSWER);
    let mut loaded = Loaded::new(&program);
    assert!(loaded.text.contains("export function answer()"), "{}", loaded.text);
    assert_eq!(loaded.call_number("answer", &[]), 42.0);
}

#[test]
/// Int の + は範囲検査付きで、溢れると RangeError を投げる
fn checked_addition_traps_on_overflow() {
    let mut loaded = Loaded::new(&compile_ast(INCREMENT));
    assert_eq!(loaded.call_number("increment", &[41.0]), 42.0);
    assert_eq!(loaded.call_number("increment", &[-1.0]), 0.0);
    let overflow = loaded.call("increment", vec![JsValue::from(2_147_483_647.0)]);
    assert_uncaught(overflow, "RangeError");
}

#[test]
/// if / else の両方の枝が翻訳される
fn if_else_branches() {
    let mut loaded = Loaded::new(&compile_ast(CLAMP));
    assert_eq!(loaded.call_number("clampLow", &[-5.0]), 0.0);
    assert_eq!(loaded.call_number("clampLow", &[9.0]), 9.0);
}

#[test]
/// JSON 形式の木は S 式と同じ出力になる
fn json_input_matches_dump() {
    let term = parse_ast(INCREMENT).expect("parse");
    let json = serde_json::to_string(&term).expect("serialize");
    let from_json = js(&compile_as(InputKind::AstJson, &json));
    let from_dump = js(&compile_ast(INCREMENT));
    assert_eq!(from_json, from_dump);
}

#[test]
/// 入力の種類は内容から推定される
fn input_kind_is_sniffed() {
    let text = compile_source(ANSWER, &CompileOptions::default()).expect("compile");
    assert!(text.contains("return 42;"), "{}", text);
}

#[test]
/// 補助関数を省くと RangeError の宣言が出力に残らない
fn helpers_can_be_omitted() {
    let options = CompileOptions {
        input: Some(InputKind::AstDump),
        emit_helpers: false,
        ..CompileOptions::default()
    };
    let text = compile_source(INCREMENT, &options).expect("compile");
    assert!(!text.contains("throw new RangeError"), "{}", text);
    assert!(text.contains("export function increment"), "{}", text);
}

#[test]
/// 閉じていない括弧は構文エラー
fn unbalanced_dump_is_parse_error() {
    let options = CompileOptions {
        input: Some(InputKind::AstDump),
        ..CompileOptions::default()
    };
    let err = compile_source("(source_file (func_decl", &options).expect_err("parse");
    assert!(matches!(err, swifttojs::DriverError::Parse(_)), "{}", err);
}

/// `name(_:_:)` として `lhs <op> rhs` を返す公開関数のダンプ。
fn binary_function(name: &str, ty: &str, op: &str) -> String {
    let param = |param: &str, column: usize| {
        format!(
            "(declref_expr type='{ty}' decl=main.(file).{name}(_:_:).{param}@main.swift:1:{column})"
        )
    };
    format!(
        r#"(source_file
  (func_decl "{name}(_:_:)" interface type='({ty}, {ty}) -> {ty}' access=public
    (parameter_list
      (parameter "lhs" type='{ty}')
      (parameter "rhs" type='{ty}'))
    (brace_stmt
      (return_stmt
        (binary_expr type='{ty}'
          (dot_syntax_call_expr implicit type='({ty}, {ty}) -> {ty}'
            (declref_expr type='({ty}.Type) -> ({ty}, {ty}) -> {ty}' decl=Swift.(file).{ty} extension.{op})
            (type_expr implicit type='{ty}.Type'))
          (tuple_expr implicit type='({ty}, {ty})'
            {lhs}
            {rhs}))))))"#,
        lhs = param("lhs", 16),
        rhs = param("rhs", 28),
    )
}

#[test]
/// 負の被演算子で下限を割る加算も RangeError になる
fn checked_addition_traps_below_minimum() {
    let mut loaded = Loaded::new(&compile_ast(&binary_function("add", "Int", "+")));
    assert_eq!(loaded.call_number("add", &[-5.0, 3.0]), -2.0);
    let underflow = loaded.call("add", vec![JsValue::from(-2_147_483_648.0), JsValue::from(-1)]);
    assert_uncaught(underflow, "RangeError");
    let overflow = loaded.call("add", vec![JsValue::from(2_147_483_647.0), JsValue::from(1)]);
    assert_uncaught(overflow, "RangeError");
}

#[test]
/// 負の数を引いて上限を超える減算も RangeError になる
fn checked_subtraction_traps_above_maximum() {
    let mut loaded = Loaded::new(&compile_ast(&binary_function("sub", "Int", "-")));
    assert_eq!(loaded.call_number("sub", &[3.0, 5.0]), -2.0);
    let overflow = loaded.call("sub", vec![JsValue::from(2_147_483_647.0), JsValue::from(-1)]);
    assert_uncaught(overflow, "RangeError");
    let underflow = loaded.call("sub", vec![JsValue::from(-2_147_483_648.0), JsValue::from(1)]);
    assert_uncaught(underflow, "RangeError");
}

#[test]
/// 符号なしの減算は 0 を下回ると RangeError になる
fn unsigned_subtraction_traps_below_zero() {
    let mut loaded = Loaded::new(&compile_ast(&binary_function("sub", "UInt", "-")));
    assert_eq!(loaded.call_number("sub", &[5.0, 3.0]), 2.0);
    let underflow = loaded.call("sub", vec![JsValue::from(0), JsValue::from(1)]);
    assert_uncaught(underflow, "RangeError");
}

#[test]
/// Int8 の &+ は 8 ビットで折り返す
fn narrow_wrapping_addition_wraps() {
    let mut loaded = Loaded::new(&compile_ast(&binary_function("wrap", "Int8", "&+")));
    assert_eq!(loaded.call_number("wrap", &[127.0, 1.0]), -128.0);
    assert_eq!(loaded.call_number("wrap", &[-128.0, -1.0]), 127.0);
    assert_eq!(loaded.call_number("wrap", &[20.0, 22.0]), 42.0);
}
