// パス: src/interp/env.rs
// 役割: インタプリタの変数環境（ブロック・関数ごとのフレームの連鎖）
// 意図: クロージャが外側のフレームを共有参照で捕捉し、代入が宣言元のフレームへ届くようにする
// 関連ファイル: src/interp/mod.rs, src/interp/exec.rs
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::JsValue;

#[derive(Clone)]
pub struct Env {
    inner: Rc<EnvFrame>,
}

struct EnvFrame {
    bindings: RefCell<HashMap<String, JsValue>>,
    parent: Option<Rc<EnvFrame>>,
}

impl EnvFrame {
    fn child(parent: Rc<EnvFrame>) -> Self {
        Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        }
    }
}

fn lookup_binding(frame: &Rc<EnvFrame>, key: &str) -> Option<JsValue> {
    if let Some(value) = {
        let bindings = frame.bindings.borrow();
        bindings.get(key).cloned()
    } {
        return Some(value);
    }
    frame
        .parent
        .as_ref()
        .and_then(|parent| lookup_binding(parent, key))
}

fn assign_binding(frame: &Rc<EnvFrame>, key: &str, value: JsValue) -> Result<(), JsValue> {
    {
        let mut bindings = frame.bindings.borrow_mut();
        if let Some(slot) = bindings.get_mut(key) {
            *slot = value;
            return Ok(());
        }
    }
    match &frame.parent {
        Some(parent) => assign_binding(parent, key, value),
        None => Err(value),
    }
}

impl Env {
    /// 空の環境を生成する。
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EnvFrame {
                bindings: RefCell::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            inner: Rc::new(EnvFrame::child(Rc::clone(&self.inner))),
        }
    }

    /// このフレームに束縛を作る（既存なら上書き）。
    pub fn declare(&self, key: impl Into<String>, val: JsValue) {
        self.inner.bindings.borrow_mut().insert(key.into(), val);
    }

    pub fn get(&self, key: &str) -> Option<JsValue> {
        lookup_binding(&self.inner, key)
    }

    /// 宣言元のフレームへ代入する。どこにも宣言がなければ最外のフレームに作る。
    pub fn assign(&self, key: &str, val: JsValue) {
        if let Err(val) = assign_binding(&self.inner, key, val) {
            let mut root = Rc::clone(&self.inner);
            while let Some(parent) = root.parent.clone() {
                root = parent;
            }
            root.bindings.borrow_mut().insert(key.to_string(), val);
        }
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.inner.bindings.borrow().contains_key(key)
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 子フレームからの代入は宣言元のフレームに届く
    fn assignment_reaches_declaring_frame() {
        let root = Env::new();
        root.declare("x", JsValue::from(1));
        let child = root.child();
        child.declare("y", JsValue::from(2));
        child.assign("x", JsValue::from(3));
        assert_eq!(root.get("x").and_then(|v| v.as_number()), Some(3.0));
        assert!(root.get("y").is_none());
        assert!(child.has_own("y"));
    }

    #[test]
    /// 宣言のない代入は最外のフレームに作られる
    fn undeclared_assignment_goes_to_root() {
        let root = Env::new();
        let child = root.child().child();
        child.assign("z", JsValue::from(true));
        assert!(root.has_own("z"));
    }
}
