// パス: tests/interp_programs.rs
// 役割: 変換器が出力する形の JavaScript をインタプリタで実行し、言語機能の意味を確かめる
// 意図: クラス・クロージャ・反復・例外といった出力で使う構文が期待どおり動くことを保証する
// 関連ファイル: src/interp/exec.rs, src/interp/host.rs, src/js/mod.rs
use swifttojs::interp::{Interpreter, JsValue};
use swifttojs::js::{ClassMember, Expr, MethodKind, Program, Stmt, VarKind};

fn run(body: Vec<Stmt>) -> Interpreter {
    let mut interp = Interpreter::new();
    interp.run_program(&Program { body }).expect("run");
    interp
}

fn log(arg: Expr) -> Stmt {
    Stmt::expr(Expr::call_path(&["console", "log"], vec![arg]))
}

fn this_field(name: &str) -> Expr {
    Expr::member(Expr::This, name)
}

#[test]
/// クラスのコンストラクタ・getter・静的メソッドが働く
fn class_with_getter_and_static() {
    let rect = Stmt::Class {
        name: "Rect".into(),
        members: vec![
            ClassMember {
                kind: MethodKind::Constructor,
                name: "constructor".into(),
                params: vec!["w".into(), "h".into()],
                body: vec![
                    Stmt::expr(Expr::assign("=", this_field("w"), Expr::ident("w"))),
                    Stmt::expr(Expr::assign("=", this_field("h"), Expr::ident("h"))),
                ],
                is_static: false,
            },
            ClassMember {
                kind: MethodKind::Get,
                name: "area".into(),
                params: vec![],
                body: vec![Stmt::ret(Expr::binary("*", this_field("w"), this_field("h")))],
                is_static: false,
            },
            ClassMember {
                kind: MethodKind::Method,
                name: "square".into(),
                params: vec!["n".into()],
                body: vec![Stmt::ret(Expr::new_expr(
                    Expr::ident("Rect"),
                    vec![Expr::ident("n"), Expr::ident("n")],
                ))],
                is_static: true,
            },
        ],
    };
    let interp = run(vec![
        rect,
        Stmt::var(
            VarKind::Const,
            "r",
            Some(Expr::call(Expr::member(Expr::ident("Rect"), "square"), vec![Expr::num(3.0)])),
        ),
        log(Expr::member(Expr::ident("r"), "area")),
        log(Expr::binary("instanceof", Expr::ident("r"), Expr::ident("Rect"))),
    ]);
    assert_eq!(interp.output(), &["9".to_string(), "true".to_string()]);
}

#[test]
/// クロージャは外側の変数を共有して書き換える
fn closures_share_captured_state() {
    let counter = Stmt::Function {
        name: "counter".into(),
        params: vec![],
        body: vec![
            Stmt::var(VarKind::Let, "n", Some(Expr::num(0.0))),
            Stmt::ret(Expr::function(
                vec![],
                vec![Stmt::ret(Expr::update("++", true, Expr::ident("n")))],
            )),
        ],
    };
    let interp = run(vec![
        counter,
        Stmt::var(
            VarKind::Const,
            "next",
            Some(Expr::call(Expr::ident("counter"), vec![])),
        ),
        Stmt::expr(Expr::call(Expr::ident("next"), vec![])),
        Stmt::expr(Expr::call(Expr::ident("next"), vec![])),
        log(Expr::call(Expr::ident("next"), vec![])),
    ]);
    assert_eq!(interp.output(), &["3".to_string()]);
}

#[test]
/// for-of で配列を走査し、continue と break が効く
fn for_of_with_continue_and_break() {
    let items = Expr::Array(vec![
        Expr::num(1.0),
        Expr::num(2.0),
        Expr::num(3.0),
        Expr::num(4.0),
        Expr::num(5.0),
    ]);
    let interp = run(vec![
        Stmt::var(VarKind::Let, "sum", Some(Expr::num(0.0))),
        Stmt::ForOf {
            kind: VarKind::Const,
            name: "x".into(),
            iter: items,
            body: vec![
                Stmt::if_else(
                    Expr::binary("===", Expr::ident("x"), Expr::num(2.0)),
                    vec![Stmt::Continue],
                    None,
                ),
                Stmt::if_else(
                    Expr::binary(">", Expr::ident("x"), Expr::num(4.0)),
                    vec![Stmt::Break],
                    None,
                ),
                Stmt::expr(Expr::assign("+=", Expr::ident("sum"), Expr::ident("x"))),
            ],
        },
        log(Expr::ident("sum")),
    ]);
    assert_eq!(interp.output(), &["8".to_string()]);
}

#[test]
/// finally は return を越えても実行される
fn finally_runs_after_return() {
    let body = vec![
        Stmt::var(VarKind::Let, "trace", Some(Expr::str_lit(""))),
        Stmt::Function {
            name: "f".into(),
            params: vec![],
            body: vec![Stmt::Try {
                block: vec![Stmt::ret(Expr::num(1.0))],
                handler: None,
                finalizer: Some(vec![Stmt::expr(Expr::assign(
                    "+=",
                    Expr::ident("trace"),
                    Expr::str_lit("finally"),
                ))]),
            }],
        },
        log(Expr::binary(
            "+",
            Expr::call(Expr::ident("f"), vec![]),
            Expr::ident("trace"),
        )),
    ];
    let interp = run(body);
    assert_eq!(interp.output(), &["1finally".to_string()]);
}

#[test]
/// 公開された関数は外から呼べ、未知の名前は EVAL007
fn exported_functions_are_callable() {
    let double = Stmt::Export(Box::new(Stmt::Function {
        name: "double".into(),
        params: vec!["x".into()],
        body: vec![Stmt::ret(Expr::binary("*", Expr::ident("x"), Expr::num(2.0)))],
    }));
    let mut interp = run(vec![double]);
    let result = interp
        .call_export("double", vec![JsValue::from(21)])
        .expect("call");
    assert_eq!(result.as_number(), Some(42.0));
    let err = interp.call_export("triple", vec![]).expect_err("missing");
    assert_eq!(err.code(), "EVAL007");
}

#[test]
/// 再帰が深すぎると EVAL006
fn runaway_recursion_is_fatal() {
    let forever = Stmt::Function {
        name: "forever".into(),
        params: vec![],
        body: vec![Stmt::ret(Expr::call(Expr::ident("forever"), vec![]))],
    };
    let program = Program {
        body: vec![forever, Stmt::expr(Expr::call(Expr::ident("forever"), vec![]))],
    };
    // 評価器の再帰はネイティブのスタックを使うので、深さの上限まで届く大きさを確保する
    let code = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || {
            let mut interp = Interpreter::new();
            let err = interp.run_program(&program).expect_err("depth");
            err.code().to_string()
        })
        .expect("spawn")
        .join()
        .expect("join");
    assert_eq!(code, "EVAL006");
}
