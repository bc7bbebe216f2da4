// パス: src/interp/value.rs
// 役割: インタプリタの値表現（プリミティブ・オブジェクト・関数）と型変換
// 意図: 出力された JavaScript を評価するのに必要な範囲だけ、ECMAScript の値と変換規則を再現する
// 関連ファイル: src/interp/mod.rs, src/interp/exec.rs, src/interp/host.rs
//! インタプリタの値
//!
//! - オブジェクトは `Rc<RefCell<JsObject>>` で共有し、参照の同一性で比較する。
//! - プロパティは挿入順を保つ。整数キーは `keys` で昇順に先頭へ並ぶ。
//! - 文字列の長さや添字は UTF-16 単位で数える。

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::env::Env;
use super::{Interpreter, Step};
use crate::js::printer::format_number;
use crate::js::Stmt;

pub type ObjRef = Rc<RefCell<JsObject>>;

/// ホスト関数。`this` と引数を受け取る。
pub type NativeFn = fn(&mut Interpreter, JsValue, Vec<JsValue>) -> Step<JsValue>;

#[derive(Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjRef),
}

/// 関数式・関数宣言から作られる関数。
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub env: Env,
}

pub enum ObjectKind {
    Ordinary,
    Array(Vec<JsValue>),
    Function(Rc<Closure>),
    Native { name: &'static str, func: NativeFn },
    Bound {
        target: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
}

/// プロパティの中身。アクセサはクラスの get/set から作られる。
#[derive(Clone)]
pub enum Slot {
    Data(JsValue),
    Accessor {
        get: Option<JsValue>,
        set: Option<JsValue>,
    },
}

pub struct JsObject {
    pub kind: ObjectKind,
    pub props: Vec<(String, Slot)>,
    pub proto: Option<ObjRef>,
}

impl JsObject {
    pub fn new(kind: ObjectKind, proto: Option<ObjRef>) -> Self {
        Self {
            kind,
            props: Vec::new(),
            proto,
        }
    }

    pub fn own(&self, key: &str) -> Option<&Slot> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    pub fn has_own(&self, key: &str) -> bool {
        if let ObjectKind::Array(items) = &self.kind {
            if key == "length" {
                return true;
            }
            if let Some(i) = array_index(key) {
                return i < items.len();
            }
        }
        self.own(key).is_some()
    }

    /// データプロパティを書く。既存のスロットは置き換える。
    pub fn set_own(&mut self, key: &str, value: JsValue) {
        self.define(key, Slot::Data(value));
    }

    pub fn define(&mut self, key: &str, slot: Slot) {
        match self.props.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = slot,
            None => self.props.push((key.to_string(), slot)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if let ObjectKind::Array(items) = &mut self.kind {
            if let Some(i) = array_index(key) {
                if i < items.len() {
                    items[i] = JsValue::Undefined;
                }
                return true;
            }
        }
        let before = self.props.len();
        self.props.retain(|(k, _)| k != key);
        before != self.props.len()
    }

    /// 列挙順のキー。配列は添字、続いて整数キー昇順、最後に文字列キーを挿入順で。
    pub fn keys(&self) -> Vec<String> {
        let mut out: Vec<String> = match &self.kind {
            ObjectKind::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        let mut integers: Vec<(usize, &String)> = self
            .props
            .iter()
            .filter_map(|(k, _)| array_index(k).map(|i| (i, k)))
            .collect();
        integers.sort_by_key(|(i, _)| *i);
        out.extend(integers.into_iter().map(|(_, k)| k.clone()));
        out.extend(
            self.props
                .iter()
                .filter(|(k, _)| array_index(k).is_none())
                .map(|(k, _)| k.clone()),
        );
        out
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Function(_) | ObjectKind::Native { .. } | ObjectKind::Bound { .. }
        )
    }
}

/// `"12"` のような正規の配列添字。
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if key.bytes().all(|b| b.is_ascii_digit()) {
        key.parse().ok()
    } else {
        None
    }
}

impl JsValue {
    pub fn string(text: impl AsRef<str>) -> JsValue {
        JsValue::String(Rc::from(text.as_ref()))
    }

    pub fn object(object: JsObject) -> JsValue {
        JsValue::Object(Rc::new(RefCell::new(object)))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            JsValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    /// 配列なら要素の複製。
    pub fn array_items(&self) -> Option<Vec<JsValue>> {
        let object = self.as_object()?;
        let object = object.borrow();
        match &object.kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// 自身か原型のデータプロパティ（アクセサは読まない）。
    pub fn data_property(&self, key: &str) -> Option<JsValue> {
        let mut current = Some(Rc::clone(self.as_object()?));
        while let Some(object) = current {
            let borrowed = object.borrow();
            if let ObjectKind::Array(items) = &borrowed.kind {
                if let Some(i) = array_index(key) {
                    return items.get(i).cloned();
                }
            }
            if let Some(Slot::Data(v)) = borrowed.own(key) {
                return Some(v.clone());
            }
            current = borrowed.proto.clone();
        }
        None
    }

    pub fn is_callable(&self) -> bool {
        self.as_object()
            .map(|o| o.borrow().is_callable())
            .unwrap_or(false)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Object(o) if o.borrow().is_callable() => "function",
            JsValue::Object(_) => "object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(b) => *b,
            JsValue::Number(n) => !(n.is_nan() || *n == 0.0),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Bool(b) => f64::from(u8::from(*b)),
            JsValue::Number(n) => *n,
            JsValue::String(s) => string_to_number(s),
            JsValue::Object(_) => match self.array_items() {
                Some(items) if items.is_empty() => 0.0,
                Some(items) if items.len() == 1 => items[0].to_number(),
                _ => f64::NAN,
            },
        }
    }

    pub fn to_int32(&self) -> i32 {
        to_int32(self.to_number())
    }

    pub fn to_uint32(&self) -> u32 {
        to_int32(self.to_number()) as u32
    }

    /// `String(value)` 相当。
    pub fn to_js_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".into(),
            JsValue::Null => "null".into(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Number(n) => format_number(*n),
            JsValue::String(s) => s.to_string(),
            JsValue::Object(o) => {
                if matches!(o.borrow().kind, ObjectKind::Ordinary) {
                    return self.describe_ordinary();
                }
                let borrowed = o.borrow();
                match &borrowed.kind {
                    ObjectKind::Array(items) => items
                        .iter()
                        .map(|v| {
                            if v.is_nullish() {
                                String::new()
                            } else {
                                v.to_js_string()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    ObjectKind::Function(c) => {
                        format!("function {}() {{ [code] }}", c.name.as_deref().unwrap_or(""))
                    }
                    ObjectKind::Native { name, .. } => {
                        format!("function {}() {{ [native code] }}", name)
                    }
                    ObjectKind::Bound { .. } | ObjectKind::Ordinary => {
                        "function () { [native code] }".into()
                    }
                }
            }
        }
    }

    /// エラーオブジェクトは `Name: message`、それ以外は `[object Object]`。
    fn describe_ordinary(&self) -> String {
        match (self.data_property("name"), self.data_property("message")) {
            (Some(name), Some(message)) => {
                let message = message.to_js_string();
                if message.is_empty() {
                    name.to_js_string()
                } else {
                    format!("{}: {}", name.to_js_string(), message)
                }
            }
            _ => "[object Object]".into(),
        }
    }

    /// プロパティキーとしての文字列。
    pub fn to_key(&self) -> String {
        self.to_js_string()
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::String(s) => write!(f, "{:?}", s),
            JsValue::Object(_) if self.array_items().is_some() => {
                f.debug_list().entries(self.array_items().unwrap_or_default()).finish()
            }
            other => write!(f, "{}", other.to_js_string()),
        }
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Number(f64::from(n))
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Bool(b)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::string(s)
    }
}

/// ECMAScript の ToInt32。
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let modulo = n.trunc().rem_euclid(4_294_967_296.0);
    if modulo >= 2_147_483_648.0 {
        (modulo - 4_294_967_296.0) as i32
    } else {
        modulo as i32
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            t.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// `===`
pub fn strict_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
        (JsValue::Bool(x), JsValue::Bool(y)) => x == y,
        (JsValue::Number(x), JsValue::Number(y)) => x == y,
        (JsValue::String(x), JsValue::String(y)) => x == y,
        (JsValue::Object(x), JsValue::Object(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `==`（数値と文字列・真偽値の変換、null と undefined の同一視のみ）
pub fn loose_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() && y.is_nullish() => true,
        (x, y) if x.is_nullish() || y.is_nullish() => false,
        (JsValue::Object(_), JsValue::Object(_)) => strict_equals(a, b),
        (JsValue::String(x), JsValue::String(y)) => x == y,
        (JsValue::Object(_), other) | (other, JsValue::Object(_)) => {
            let primitive = if matches!(a, JsValue::Object(_)) { a } else { b };
            primitive.to_js_string() == other.to_js_string()
        }
        _ => a.to_number() == b.to_number(),
    }
}

/// UTF-16 の符号単位列。
pub fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

pub fn from_utf16(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// ToInt32 は 2^32 を法として折り返す
    fn int32_conversion() {
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(4_294_967_297.0), 1);
    }

    #[test]
    /// 等価比較の規則
    fn equality_rules() {
        assert!(strict_equals(&JsValue::from(1), &JsValue::from(1.0)));
        assert!(!strict_equals(&JsValue::Null, &JsValue::Undefined));
        assert!(loose_equals(&JsValue::Null, &JsValue::Undefined));
        assert!(loose_equals(&JsValue::from("1"), &JsValue::from(1)));
        assert!(!loose_equals(&JsValue::Null, &JsValue::from(0)));
    }

    #[test]
    /// 文字列化は数値の整数表記と配列の join に従う
    fn string_conversion() {
        assert_eq!(JsValue::from(3.0).to_js_string(), "3");
        assert_eq!(JsValue::from(0.5).to_js_string(), "0.5");
        let array = JsValue::object(JsObject::new(
            ObjectKind::Array(vec![JsValue::from(1), JsValue::Null, JsValue::from("a")]),
            None,
        ));
        assert_eq!(array.to_js_string(), "1,,a");
        assert_eq!(JsValue::from("12").to_number(), 12.0);
        assert!(JsValue::from("x").to_number().is_nan());
    }

    #[test]
    /// 整数キーは列挙で先頭に昇順で並ぶ
    fn key_order() {
        let mut object = JsObject::new(ObjectKind::Ordinary, None);
        object.set_own("b", JsValue::from(1));
        object.set_own("2", JsValue::from(2));
        object.set_own("a", JsValue::from(3));
        object.set_own("1", JsValue::from(4));
        assert_eq!(object.keys(), vec!["1", "2", "b", "a"]);
        assert!(object.remove("b"));
        assert_eq!(object.keys(), vec!["1", "2", "a"]);
    }
}
