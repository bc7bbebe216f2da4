// パス: tests/runtime_semantics.rs
// 役割: 組み込み型の意味論を関数として出力し、インタプリタで実行して結果を確かめる
// 意図: 生成文字列の比較では見えない実行時の振る舞い（Optional の入れ子・辞書・値コピー・評価回数）を保証する
// 関連ファイル: src/builtins/optional.rs, src/builtins/dictionary.rs, src/builtins/integers.rs, src/values/ops.rs, src/reified.rs
#[path = "test_support.rs"]
mod support;

use support::{assert_uncaught, Loaded};
use swifttojs::ast::parse_ast;
use swifttojs::builtins::array::array_subscript;
use swifttojs::builtins::common::{call_method, split};
use swifttojs::builtins::new_context_with_builtins;
use swifttojs::builtins::optional::{
    empty_optional, optional_is_none, optional_is_some, unwrap_optional, wrap_in_optional,
};
use swifttojs::context::Context;
use swifttojs::errors::CResult;
use swifttojs::frontend::compile_term_to_program;
use swifttojs::functions::{emit_function, wrapped};
use swifttojs::interp::JsValue;
use swifttojs::js::{Expr, Program, Stmt, VarKind};
use swifttojs::reified::copy_value;
use swifttojs::scope::ScopeId;
use swifttojs::types::Type;
use swifttojs::values::{self, CallKind, Value};

/// `arity` 個の引数を取る公開関数 `name` として組み立て器の結果を出力する。
fn export(
    ctx: &mut Context,
    name: &str,
    arity: usize,
    body: impl Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value> + 'static,
) {
    emit_function(ctx, name, Some(arity), wrapped(arity, body), true).expect("emit");
}

/// ルートに溜まった宣言を `prelude` と合わせて実行する。
fn load(ctx: &mut Context, prelude: Vec<Stmt>) -> Loaded {
    let body = ctx.emit_scope(ScopeId::ROOT, prelude);
    Loaded::new(&Program { body })
}

fn int() -> Type {
    Type::name("Int")
}

fn string_to_int() -> Type {
    Type::dictionary(Type::name("String"), int())
}

fn text(value: &JsValue) -> &str {
    value.as_str().expect("string result")
}

#[test]
/// Bool? の some(true)・some(false)・nil を区別して説明する
fn optional_bool_is_described() {
    let mut ctx = new_context_with_builtins();
    export(&mut ctx, "describe", 1, |ctx, scope, args| {
        let bool_type = Type::name("Bool");
        let [value] = split(args);
        let some = optional_is_some(ctx, scope, value.clone(), &bool_type)?;
        let unwrapped = unwrap_optional(ctx, scope, value, &bool_type)?;
        let label = values::conditional(
            ctx,
            scope,
            unwrapped,
            Value::string("True"),
            Value::string("False"),
        )?;
        values::conditional(ctx, scope, some, label, Value::string("None"))
    });
    let mut loaded = load(&mut ctx, Vec::new());
    let yes = loaded.call("describe", vec![JsValue::from(true)]).expect("true");
    assert_eq!(text(&yes), "True");
    let no = loaded.call("describe", vec![JsValue::from(false)]).expect("false");
    assert_eq!(text(&no), "False");
    let none = loaded.call("describe", vec![JsValue::Null]).expect("nil");
    assert_eq!(text(&none), "None");
}

#[test]
/// Int?? は none と some(nil) と some(some(x)) を取り違えない
fn nested_optional_keeps_each_level() {
    let mut ctx = new_context_with_builtins();
    let inner = Type::optional(int());
    let wrap_type = inner.clone();
    export(&mut ctx, "nest", 1, move |ctx, scope, args| {
        let [value] = split(args);
        let once = wrap_in_optional(ctx, scope, value, &int())?;
        wrap_in_optional(ctx, scope, once, &wrap_type)
    });
    let nil_type = inner.clone();
    export(&mut ctx, "someNil", 0, move |ctx, scope, _| {
        let nil = empty_optional(ctx, scope, &int())?;
        wrap_in_optional(ctx, scope, nil, &nil_type)
    });
    let none_type = inner.clone();
    export(&mut ctx, "none", 0, move |ctx, scope, _| empty_optional(ctx, scope, &none_type));
    let depth_type = inner.clone();
    export(&mut ctx, "depth", 1, move |ctx, scope, args| {
        let [value] = split(args);
        let outer_none = optional_is_none(ctx, scope, value.clone(), &depth_type)?;
        let once = unwrap_optional(ctx, scope, value, &depth_type)?;
        let inner_none = optional_is_none(ctx, scope, once, &int())?;
        let inner_depth =
            values::conditional(ctx, scope, inner_none, Value::num(1.0), Value::num(2.0))?;
        values::conditional(ctx, scope, outer_none, Value::num(0.0), inner_depth)
    });
    let unwrap_type = inner;
    export(&mut ctx, "flatten", 1, move |ctx, scope, args| {
        let [value] = split(args);
        let once = unwrap_optional(ctx, scope, value, &unwrap_type)?;
        unwrap_optional(ctx, scope, once, &int())
    });
    let mut loaded = load(&mut ctx, Vec::new());

    let five = loaded.call("nest", vec![JsValue::from(5)]).expect("nest");
    let some_nil = loaded.call("someNil", Vec::new()).expect("someNil");
    let none = loaded.call("none", Vec::new()).expect("none");

    let depth = |loaded: &mut Loaded, value: &JsValue| {
        loaded
            .call("depth", vec![value.clone()])
            .expect("depth")
            .as_number()
            .expect("number")
    };
    assert_eq!(depth(&mut loaded, &five), 2.0);
    assert_eq!(depth(&mut loaded, &some_nil), 1.0);
    assert_eq!(depth(&mut loaded, &none), 0.0);

    let flattened = loaded.call("flatten", vec![five]).expect("flatten");
    assert_eq!(flattened.as_number(), Some(5.0));
    let flattened_nil = loaded.call("flatten", vec![some_nil]).expect("flatten");
    assert!(flattened_nil.is_nullish(), "{:?}", flattened_nil.to_js_string());
}

#[test]
/// 辞書の添字に nil を入れるとキーが消え、値を入れると読み戻せる
fn dictionary_subscript_assignment() {
    let mut ctx = new_context_with_builtins();
    export(&mut ctx, "store", 3, |ctx, scope, args| {
        let setter = Value::member_function(
            Value::Type(string_to_int()),
            "subscript(_:)",
            Type::void(),
        );
        values::call(ctx, scope, setter, args, CallKind::Set)
    });
    export(&mut ctx, "lookup", 2, |ctx, scope, args| {
        let getter = Value::member_function(
            Value::Type(string_to_int()),
            "subscript(_:)",
            Type::void(),
        );
        values::call(ctx, scope, getter, args, CallKind::Get)
    });
    let mut loaded = load(&mut ctx, Vec::new());
    let dict = loaded.interp.new_object(vec![("a", JsValue::from(1))]);

    loaded
        .call("store", vec![dict.clone(), JsValue::from("b"), JsValue::from(2)])
        .expect("store b");
    let b = loaded.call("lookup", vec![dict.clone(), JsValue::from("b")]).expect("lookup b");
    assert_eq!(b.as_number(), Some(2.0));

    loaded
        .call("store", vec![dict.clone(), JsValue::from("a"), JsValue::Null])
        .expect("store nil");
    let has_own = loaded.interp.property(&dict, "hasOwnProperty").expect("hasOwnProperty");
    let present = loaded
        .interp
        .call_value(&has_own, dict.clone(), vec![JsValue::from("a")])
        .expect("call");
    assert_eq!(present.as_bool(), Some(false));
    let a = loaded.call("lookup", vec![dict, JsValue::from("a")]).expect("lookup a");
    assert!(a.is_nullish(), "{}", a.to_js_string());
}

#[test]
/// 構造体の配列のコピーを書き換えても元の要素は変わらない
fn struct_array_copy_is_deep() {
    let mut ctx = new_context_with_builtins();
    let declarations = parse_ast(
        r#"(source_file
  (struct_decl "Point" interface type='Point.Type' access=internal
    (var_decl "x" type='Int' interface type='Int' access=internal storage_kind=stored)
    (var_decl "y" type='Int' interface type='Int' access=internal storage_kind=stored)))"#,
    )
    .expect("parse");
    let registered = compile_term_to_program(&mut ctx, &declarations).expect("register");
    export(&mut ctx, "mutateCopy", 1, |ctx, scope, args| {
        let [points] = split(args);
        let copied = copy_value(ctx, scope, points, &Type::array(Type::name("Point")))?;
        let copied = values::read(ctx, scope, copied)?;
        let name = ctx.reserve_unique(scope, "copy")?;
        let first_x = Expr::member(Expr::index(Expr::ident(name.clone()), Expr::num(0.0)), "x");
        Ok(Value::Statements(vec![
            Stmt::var(VarKind::Const, name.clone(), Some(copied)),
            Stmt::expr(Expr::assign("=", first_x, Expr::num(99.0))),
            Stmt::ret(Expr::ident(name)),
        ]))
    });
    let mut loaded = load(&mut ctx, registered.body);
    let point = |loaded: &Loaded, x: i32, y: i32| {
        loaded
            .interp
            .new_object(vec![("x", JsValue::from(x)), ("y", JsValue::from(y))])
    };
    let first = point(&loaded, 1, 2);
    let second = point(&loaded, 3, 4);
    let points = loaded.interp.new_array(vec![first.clone(), second]);

    let copy = loaded.call("mutateCopy", vec![points.clone()]).expect("mutateCopy");
    let copied = copy.array_items().expect("array");
    assert_eq!(copied.len(), 2);
    let copied_x = loaded.interp.property(&copied[0], "x").expect("x");
    assert_eq!(copied_x.as_number(), Some(99.0));
    let original_x = loaded.interp.property(&first, "x").expect("x");
    assert_eq!(original_x.as_number(), Some(1.0));
    let original = points.array_items().expect("array");
    let kept_x = loaded.interp.property(&original[0], "x").expect("x");
    assert_eq!(kept_x.as_number(), Some(1.0));
}

#[test]
/// 32 ビット整数の否定は -2147483648 だけが溢れる
fn negation_traps_only_at_minimum() {
    let mut ctx = new_context_with_builtins();
    export(&mut ctx, "negate", 1, |ctx, scope, args| {
        call_method(ctx, scope, &Value::Type(int()), "-", args)
    });
    let mut loaded = load(&mut ctx, Vec::new());
    assert_eq!(loaded.call_number("negate", &[5.0]), -5.0);
    assert_eq!(loaded.call_number("negate", &[-2_147_483_647.0]), 2_147_483_647.0);
    let overflow = loaded.call("negate", vec![JsValue::from(-2_147_483_648.0)]);
    assert_uncaught(overflow, "RangeError");
}

#[test]
/// 複合代入の添字先は配列と添字をそれぞれ一度だけ評価する
fn compound_subscript_evaluates_operands_once() {
    let mut ctx = new_context_with_builtins();
    export(&mut ctx, "bump", 0, |ctx, scope, _| {
        let target = values::expr(Expr::call(Expr::ident("pick"), Vec::new()));
        let index = values::expr(Expr::call(Expr::ident("at"), Vec::new()));
        let place = array_subscript(target, index, int());
        values::set(ctx, scope, place, Value::num(10.0), "+=")
    });
    let traced = |label: &str, result: Expr| -> Vec<Stmt> {
        vec![
            Stmt::expr(Expr::call(
                Expr::member(Expr::ident("trace"), "push"),
                vec![Expr::str_lit(label)],
            )),
            Stmt::ret(result),
        ]
    };
    let prelude = vec![
        Stmt::var(VarKind::Let, "trace", Some(Expr::Array(Vec::new()))),
        Stmt::var(
            VarKind::Let,
            "data",
            Some(Expr::Array(vec![Expr::num(1.0), Expr::num(2.0), Expr::num(3.0)])),
        ),
        Stmt::Function {
            name: "pick".into(),
            params: Vec::new(),
            body: traced("array", Expr::ident("data")),
        },
        Stmt::Function {
            name: "at".into(),
            params: Vec::new(),
            body: traced("index", Expr::num(1.0)),
        },
    ];
    let mut loaded = load(&mut ctx, prelude);
    loaded.call("bump", Vec::new()).expect("bump");

    let data = loaded.interp.global("data").expect("data");
    let numbers: Vec<f64> = data
        .array_items()
        .expect("array")
        .iter()
        .map(|v| v.as_number().expect("number"))
        .collect();
    assert_eq!(numbers, vec![1.0, 12.0, 3.0]);
    let trace = loaded.interp.global("trace").expect("trace");
    let labels: Vec<String> = trace
        .array_items()
        .expect("array")
        .iter()
        .map(|v| v.as_str().expect("label").to_string())
        .collect();
    assert_eq!(labels, vec!["array".to_string(), "index".to_string()]);
}

#[test]
/// 同じ適合を二度読んでも witness table の宣言は一つで、同じ表を指す
fn conformance_table_is_shared() {
    let mut ctx = new_context_with_builtins();
    let table = || Value::conformance(Value::type_value(Type::name("Int")), "Equatable");
    export(&mut ctx, "first", 0, move |_, _, _| Ok(table()));
    export(&mut ctx, "second", 0, move |_, _, _| Ok(table()));
    let mut loaded = load(&mut ctx, Vec::new());
    assert_eq!(loaded.text.matches("$rep").count(), 1, "{}", loaded.text);

    let first = loaded.call("first", Vec::new()).expect("first");
    let second = loaded.call("second", Vec::new()).expect("second");
    match (first.as_object(), second.as_object()) {
        (Some(a), Some(b)) => assert!(std::rc::Rc::ptr_eq(a, b)),
        _ => panic!("witness tables should be objects"),
    }
}
