// パス: src/interp/mod.rs
// 役割: 出力した JavaScript の構文木を直接評価する小さなインタプリタ
// 意図: 外部の JavaScript 実行環境なしに、変換結果の振る舞い（失敗関数・値の複製・整数の折り返し）を検証する
// 関連ファイル: src/interp/exec.rs, src/interp/host.rs, src/interp/value.rs, src/js/mod.rs
//! JavaScript サブセットのインタプリタ
//!
//! 目的:
//! - テストと CLI の `--run` で、変換結果をその場で実行する。
//!
//! 仕様要点:
//! - 関数宣言と `var` は巻き上げる。`let`/`const` はブロックごとのフレームに置く。
//! - `throw` された値は `try/catch` で捕まえられる。捕まらなければ `EVAL001`。
//! - 内部の異常（未定義の変数・関数でない値の呼び出しなど）は捕捉できない `EvalError` になる。
//! - `console.log` の出力は `output` に行単位で溜める。

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::errors::EvalError;
use crate::js::Program;

pub mod env;
mod exec;
mod host;
pub mod value;

use env::Env;
pub use value::JsValue;
use value::{JsObject, ObjRef, ObjectKind};

/// 評価の中断理由。
pub(crate) enum Fault {
    /// `throw` による例外（`catch` で捕まえられる）
    Throw(JsValue),
    Fatal(EvalError),
}

impl From<EvalError> for Fault {
    fn from(e: EvalError) -> Self {
        Fault::Fatal(e)
    }
}

pub(crate) type Step<T> = Result<T, Fault>;

pub(crate) fn fatal<T>(code: &'static str, msg: impl Into<String>) -> Step<T> {
    Err(Fault::Fatal(EvalError::new(code, msg, None)))
}

/// 組み込みの原型オブジェクト。
pub(crate) struct Prototypes {
    pub object: ObjRef,
    pub function: ObjRef,
    pub array: ObjRef,
    pub string: ObjRef,
    pub number: ObjRef,
    pub boolean: ObjRef,
    pub error: ObjRef,
}

/// 呼び出しの入れ子の上限。
const MAX_DEPTH: usize = 128;

pub struct Interpreter {
    globals: Env,
    protos: Prototypes,
    exports: BTreeMap<String, JsValue>,
    output: Vec<String>,
    depth: usize,
    seed: u64,
}

impl Interpreter {
    pub fn new() -> Self {
        let object = Rc::new(RefCell::new(JsObject::new(ObjectKind::Ordinary, None)));
        let derived = |kind: ObjectKind| {
            Rc::new(RefCell::new(JsObject::new(kind, Some(Rc::clone(&object)))))
        };
        let protos = Prototypes {
            function: derived(ObjectKind::Ordinary),
            array: derived(ObjectKind::Array(Vec::new())),
            string: derived(ObjectKind::Ordinary),
            number: derived(ObjectKind::Ordinary),
            boolean: derived(ObjectKind::Ordinary),
            error: derived(ObjectKind::Ordinary),
            object,
        };
        let mut interp = Self {
            globals: Env::new(),
            protos,
            exports: BTreeMap::new(),
            output: Vec::new(),
            depth: 0,
            seed: 0x2545_f491_4f6c_dd1d,
        };
        host::install(&mut interp);
        interp
    }

    /// プログラムを先頭から実行する。`export` された名前は `call_export` で呼べる。
    pub fn run_program(&mut self, program: &Program) -> Result<(), EvalError> {
        let env = self.globals.clone();
        self.run_body(&program.body, &env).map_err(uncaught)?;
        log::debug!("interp: {} exports", self.exports.len());
        Ok(())
    }

    /// 公開された関数（なければ同名の大域束縛）を呼ぶ。
    pub fn call_export(&mut self, name: &str, args: Vec<JsValue>) -> Result<JsValue, EvalError> {
        let callee = self
            .exports
            .get(name)
            .cloned()
            .or_else(|| self.globals.get(name))
            .ok_or_else(|| EvalError::new("EVAL007", format!("no export named {}", name), None))?;
        self.call(callee, JsValue::Undefined, args).map_err(uncaught)
    }

    /// 任意の関数値を呼ぶ。
    pub fn call_value(
        &mut self,
        callee: &JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    ) -> Result<JsValue, EvalError> {
        self.call(callee.clone(), this, args).map_err(uncaught)
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    pub fn global(&self, name: &str) -> Option<JsValue> {
        self.globals.get(name)
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// 配列値を作る（引数の受け渡し用）。
    pub fn new_array(&self, items: Vec<JsValue>) -> JsValue {
        JsValue::object(JsObject::new(
            ObjectKind::Array(items),
            Some(Rc::clone(&self.protos.array)),
        ))
    }

    /// `{ key: value, ... }` を作る。
    pub fn new_object(&self, fields: Vec<(&str, JsValue)>) -> JsValue {
        let mut object = JsObject::new(ObjectKind::Ordinary, Some(Rc::clone(&self.protos.object)));
        for (key, value) in fields {
            object.set_own(key, value);
        }
        JsValue::object(object)
    }

    /// プロパティの読み出し（getter と原型を含む）。
    pub fn property(&mut self, object: &JsValue, key: &str) -> Result<JsValue, EvalError> {
        self.get(object, key).map_err(uncaught)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn uncaught(fault: Fault) -> EvalError {
    match fault {
        Fault::Throw(value) => {
            EvalError::new("EVAL001", format!("uncaught {}", value.to_js_string()), None)
        }
        Fault::Fatal(e) => e,
    }
}
