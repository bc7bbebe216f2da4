// パス: tests/sil_pipeline.rs
// 役割: SIL テキストを変換し、出力をインタプリタで実行して振る舞いを確かめる
// 意図: 検査付き算術・ループ・列挙・32 ビットの折り返しが実行時に正しく現れることを保証する
// 関連ファイル: src/sil/codegen.rs, src/sil/stdlib.rs, src/interp/mod.rs, tests/test_support.rs
#[path = "test_support.rs"]
mod support;

use support::{assert_uncaught, compile_sil, Loaded};
use swifttojs::interp::JsValue;

const INCREMENT: &str = r#"sil_stage canonical

import Builtin
import Swift

// increment(number:)
sil @$s4main9increment6numberS2i_tF : $@convention(thin) (Int) -> Int {
bb0(%0 : $Int):
  %2 = integer_literal $Builtin.Int64, 1
  %3 = struct_extract %0 : $Int, #Int._value
  %4 = integer_literal $Builtin.Int1, -1
  %5 = builtin "sadd_with_overflow_Int64"(%3 : $Builtin.Int64, %2 : $Builtin.Int64, %4 : $Builtin.Int1) : $(Builtin.Int64, Builtin.Int1)
  %6 = tuple_extract %5 : $(Builtin.Int64, Builtin.Int1), 0
  %7 = tuple_extract %5 : $(Builtin.Int64, Builtin.Int1), 1
  cond_fail %7 : $Builtin.Int1, "arithmetic overflow"
  %9 = struct $Int (%6 : $Builtin.Int64)
  return %9 : $Int
}
"#;

const FACTORIAL: &str = r#"sil_stage canonical

import Builtin
import Swift

// factorial(n:)
sil @$s4main9factorial1nS2i_tF : $@convention(thin) (Int) -> Int {
bb0(%0 : $Int):
  %1 = struct_extract %0 : $Int, #Int._value
  %2 = integer_literal $Builtin.Int64, 1
  br bb1(%2 : $Builtin.Int64, %2 : $Builtin.Int64)
bb1(%4 : $Builtin.Int64, %5 : $Builtin.Int64):
  %6 = builtin "cmp_sle_Int64"(%5 : $Builtin.Int64, %1 : $Builtin.Int64) : $Builtin.Int1
  cond_br %6, bb2, bb3
bb2:
  %8 = builtin "mul_Int64"(%4 : $Builtin.Int64, %5 : $Builtin.Int64) : $Builtin.Int64
  %9 = integer_literal $Builtin.Int64, 1
  %10 = builtin "add_Int64"(%5 : $Builtin.Int64, %9 : $Builtin.Int64) : $Builtin.Int64
  br bb1(%8 : $Builtin.Int64, %10 : $Builtin.Int64)
bb3:
  %12 = struct $Int (%4 : $Builtin.Int64)
  return %12 : $Int
}
"#;

const SHAPES: &str = r#"enum Shape {
  case circle(Int), square
}

// area(of:)
sil @$s4main4area2ofSiAA5ShapeO_tF : $@convention(thin) (Shape) -> Int {
bb0(%0 : $Shape):
  switch_enum %0 : $Shape, case #Shape.circle!enumelt: bb1, case #Shape.square!enumelt: bb2
bb1(%2 : $Int):
  return %2 : $Int
bb2:
  %4 = integer_literal $Builtin.Int64, 4
  %5 = struct $Int (%4 : $Builtin.Int64)
  return %5 : $Int
}
"#;

#[test]
/// increment は 1 を足し、最大値では範囲外の失敗関数を呼ぶ
fn increment_adds_one_and_traps_on_overflow() {
    let mut loaded = Loaded::new(&compile_sil(INCREMENT));
    assert_eq!(loaded.call_number("increment", &[-2.0]), -1.0);
    assert_eq!(loaded.call_number("increment", &[41.0]), 42.0);
    let overflow = loaded.call("increment", vec![JsValue::from(2_147_483_647.0)]);
    assert_uncaught(overflow, "RangeError");
}

#[test]
/// factorial は 32 ビットで折り返す積になる
fn factorial_wraps_at_32_bits() {
    let mut loaded = Loaded::new(&compile_sil(FACTORIAL));
    assert!(loaded.text.contains("Math.imul"), "{}", loaded.text);
    assert_eq!(loaded.call_number("factorial", &[0.0]), 1.0);
    assert_eq!(loaded.call_number("factorial", &[5.0]), 120.0);
    assert_eq!(loaded.call_number("factorial", &[16.0]), 2_004_189_184.0);
}

#[test]
/// 列挙はケース番号付きの配列として受け渡される
fn enum_payloads_are_read_from_tagged_arrays() {
    let mut loaded = Loaded::new(&compile_sil(SHAPES));
    let circle = loaded
        .interp
        .new_array(vec![JsValue::from(0), JsValue::from(7)]);
    let square = loaded.interp.new_array(vec![JsValue::from(1)]);
    let area = loaded.call("area", vec![circle]).expect("circle");
    assert_eq!(area.as_number(), Some(7.0));
    let area = loaded.call("area", vec![square]).expect("square");
    assert_eq!(area.as_number(), Some(4.0));
}

#[test]
/// 未知の命令は変換エラーになる
fn unknown_instruction_is_rejected() {
    let src = "sil @f : $@convention(thin) () -> () {\nbb0:\n  %0 = frobnicate %1 : $Int\n  return %0 : $()\n}\n";
    let options = swifttojs::CompileOptions {
        input: Some(swifttojs::InputKind::Sil),
        ..swifttojs::CompileOptions::default()
    };
    let err = swifttojs::compile_source(src, &options).expect_err("unknown instruction");
    assert!(matches!(
        err,
        swifttojs::DriverError::Parse(_) | swifttojs::DriverError::Compile(_)
    ));
}
