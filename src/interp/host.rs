// パス: src/interp/host.rs
// 役割: インタプリタの大域オブジェクトと組み込みメソッド（Math・Object・Array・String・JSON・console など）
// 意図: 変換器の出力と実行時ヘルパーが呼ぶ組み込みだけを、ホスト関数として用意する
// 関連ファイル: src/interp/mod.rs, src/interp/exec.rs, src/interp/value.rs
//! 組み込みのホスト関数
//!
//! - すべて `NativeFn`（`this` と引数列を受け取る）として登録する。
//! - 型の合わない `this` で呼ばれた場合は `TypeError` を投げる。

use std::rc::Rc;

use super::value::{
    from_utf16, strict_equals, utf16, JsObject, JsValue, NativeFn, ObjRef, ObjectKind,
};
use super::{Fault, Interpreter, Step};
use crate::js::printer::format_number;

type Methods<'a> = &'a [(&'static str, NativeFn)];

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::Undefined)
}

fn native(interp: &Interpreter, name: &'static str, func: NativeFn) -> JsObject {
    JsObject::new(
        ObjectKind::Native { name, func },
        Some(Rc::clone(&interp.protos.function)),
    )
}

fn define_methods(interp: &Interpreter, target: &mut JsObject, methods: Methods<'_>) {
    for &(name, func) in methods {
        target.set_own(name, JsValue::object(native(interp, name, func)));
    }
}

fn namespace(interp: &Interpreter, methods: Methods<'_>) -> JsObject {
    let mut object = JsObject::new(ObjectKind::Ordinary, Some(Rc::clone(&interp.protos.object)));
    define_methods(interp, &mut object, methods);
    object
}

/// `TypeError` を投げる。
fn type_error<T>(interp: &mut Interpreter, message: impl Into<String>) -> Step<T> {
    let error = error_object(interp, "TypeError", message.into());
    Err(Fault::Throw(error))
}

fn error_object(interp: &Interpreter, name: &str, message: String) -> JsValue {
    let mut object = JsObject::new(ObjectKind::Ordinary, Some(Rc::clone(&interp.protos.error)));
    object.set_own("name", JsValue::string(name));
    object.set_own("message", JsValue::string(message));
    JsValue::object(object)
}

/// 大域の束縛と原型のメソッドを登録する。
pub(crate) fn install(interp: &mut Interpreter) {
    let globals = interp.globals.clone();
    globals.declare("undefined", JsValue::Undefined);
    globals.declare("NaN", JsValue::Number(f64::NAN));
    globals.declare("Infinity", JsValue::Number(f64::INFINITY));

    let mut math = namespace(
        interp,
        &[
            ("sqrt", math_sqrt),
            ("imul", math_imul),
            ("random", math_random),
            ("floor", math_floor),
            ("ceil", math_ceil),
            ("round", math_round),
            ("trunc", math_trunc),
            ("abs", math_abs),
            ("min", math_min),
            ("max", math_max),
            ("pow", math_pow),
        ],
    );
    math.set_own("PI", JsValue::Number(std::f64::consts::PI));
    globals.declare("Math", JsValue::object(math));

    let mut object = native(interp, "Object", object_ctor);
    define_methods(
        interp,
        &mut object,
        &[
            ("keys", object_keys),
            ("assign", object_assign),
            ("create", object_create),
            ("fromEntries", object_from_entries),
        ],
    );
    object.set_own("prototype", JsValue::Object(Rc::clone(&interp.protos.object)));
    globals.declare("Object", JsValue::object(object));

    let mut array = native(interp, "Array", array_ctor);
    define_methods(interp, &mut array, &[("from", array_from), ("isArray", array_is_array)]);
    array.set_own("prototype", JsValue::Object(Rc::clone(&interp.protos.array)));
    globals.declare("Array", JsValue::object(array));

    let mut string = native(interp, "String", string_ctor);
    define_methods(
        interp,
        &mut string,
        &[
            ("fromCharCode", string_from_char_code),
            ("fromCodePoint", string_from_code_point),
        ],
    );
    string.set_own("prototype", JsValue::Object(Rc::clone(&interp.protos.string)));
    globals.declare("String", JsValue::object(string));

    let mut number = native(interp, "Number", number_ctor);
    number.set_own("prototype", JsValue::Object(Rc::clone(&interp.protos.number)));
    globals.declare("Number", JsValue::object(number));
    let mut boolean = native(interp, "Boolean", boolean_ctor);
    boolean.set_own("prototype", JsValue::Object(Rc::clone(&interp.protos.boolean)));
    globals.declare("Boolean", JsValue::object(boolean));

    for (name, func) in [
        ("parseInt", parse_int as NativeFn),
        ("parseFloat", parse_float),
        ("isNaN", is_nan),
    ] {
        globals.declare(name, JsValue::object(native(interp, name, func)));
    }

    globals.declare("console", JsValue::object(namespace(interp, &[("log", console_log)])));
    globals.declare("JSON", JsValue::object(namespace(interp, &[("stringify", json_stringify)])));

    install_errors(interp);
    install_text_encoder(interp);

    {
        let mut proto = interp.protos.object.borrow_mut();
        define_methods(
            interp,
            &mut proto,
            &[
                ("hasOwnProperty", object_has_own_property),
                ("toString", object_to_string),
            ],
        );
    }
    {
        let mut proto = interp.protos.function.borrow_mut();
        define_methods(
            interp,
            &mut proto,
            &[
                ("call", function_call),
                ("apply", function_apply),
                ("bind", function_bind),
            ],
        );
    }
    {
        let mut proto = interp.protos.array.borrow_mut();
        define_methods(
            interp,
            &mut proto,
            &[
                ("push", array_push),
                ("pop", array_pop),
                ("shift", array_shift),
                ("unshift", array_unshift),
                ("splice", array_splice),
                ("slice", array_slice),
                ("concat", array_concat),
                ("map", array_map),
                ("filter", array_filter),
                ("forEach", array_for_each),
                ("join", array_join),
                ("indexOf", array_index_of),
                ("includes", array_includes),
                ("reverse", array_reverse),
                ("some", array_some),
                ("every", array_every),
                ("reduce", array_reduce),
                ("find", array_find),
                ("findIndex", array_find_index),
                ("fill", array_fill),
                ("sort", array_sort),
                ("toString", array_to_string),
            ],
        );
    }
    {
        let mut proto = interp.protos.string.borrow_mut();
        define_methods(
            interp,
            &mut proto,
            &[
                ("charCodeAt", string_char_code_at),
                ("codePointAt", string_code_point_at),
                ("charAt", string_char_at),
                ("substring", string_substring),
                ("substr", string_substr),
                ("slice", string_slice),
                ("indexOf", string_index_of),
                ("lastIndexOf", string_last_index_of),
                ("includes", string_includes),
                ("startsWith", string_starts_with),
                ("endsWith", string_ends_with),
                ("toLowerCase", string_to_lower_case),
                ("toUpperCase", string_to_upper_case),
                ("split", string_split),
                ("concat", string_concat),
                ("trim", string_trim),
                ("repeat", string_repeat),
                ("toString", string_to_string),
            ],
        );
    }
    {
        let mut proto = interp.protos.number.borrow_mut();
        define_methods(
            interp,
            &mut proto,
            &[("toString", number_to_string), ("toFixed", number_to_fixed)],
        );
    }
}

fn install_errors(interp: &mut Interpreter) {
    {
        let mut proto = interp.protos.error.borrow_mut();
        proto.set_own("name", JsValue::string("Error"));
        proto.set_own("message", JsValue::string(""));
        define_methods(interp, &mut proto, &[("toString", error_to_string)]);
    }
    let constructors: [(&'static str, NativeFn); 3] = [
        ("Error", error_ctor),
        ("TypeError", type_error_ctor),
        ("RangeError", range_error_ctor),
    ];
    for (name, func) in constructors {
        let prototype = if name == "Error" {
            Rc::clone(&interp.protos.error)
        } else {
            let mut proto =
                JsObject::new(ObjectKind::Ordinary, Some(Rc::clone(&interp.protos.error)));
            proto.set_own("name", JsValue::string(name));
            Rc::new(std::cell::RefCell::new(proto))
        };
        let ctor = JsValue::object(native(interp, name, func));
        if let Some(c) = ctor.as_object() {
            c.borrow_mut().set_own("prototype", JsValue::Object(Rc::clone(&prototype)));
        }
        prototype.borrow_mut().set_own("constructor", ctor.clone());
        interp.globals.declare(name, ctor);
    }
}

fn install_text_encoder(interp: &mut Interpreter) {
    let prototype = namespace(interp, &[("encode", text_encoder_encode)]);
    let prototype = JsValue::object(prototype);
    let mut ctor = native(interp, "TextEncoder", text_encoder_ctor);
    ctor.set_own("prototype", prototype.clone());
    let ctor = JsValue::object(ctor);
    if let Some(p) = prototype.as_object() {
        p.borrow_mut().set_own("constructor", ctor.clone());
    }
    interp.globals.declare("TextEncoder", ctor);
}

fn number_arg(args: &[JsValue], i: usize) -> f64 {
    arg(args, i).to_number()
}

/// 負の値は末尾からの位置として扱い、`[0, len]` に収める。
fn relative_index(value: &JsValue, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

// ---- Math ----

fn math_sqrt(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(number_arg(&args, 0).sqrt()))
}

fn math_imul(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let product = arg(&args, 0).to_int32().wrapping_mul(arg(&args, 1).to_int32());
    Ok(JsValue::Number(f64::from(product)))
}

/// xorshift64 による擬似乱数。
fn math_random(interp: &mut Interpreter, _: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    let mut x = interp.seed;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    interp.seed = x;
    Ok(JsValue::Number((x >> 11) as f64 / (1u64 << 53) as f64))
}

fn math_floor(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(number_arg(&args, 0).floor()))
}

fn math_ceil(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(number_arg(&args, 0).ceil()))
}

fn math_round(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number((number_arg(&args, 0) + 0.5).floor()))
}

fn math_trunc(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(number_arg(&args, 0).trunc()))
}

fn math_abs(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(number_arg(&args, 0).abs()))
}

fn math_min(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let result = args.iter().map(JsValue::to_number).fold(f64::INFINITY, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            acc.min(n)
        }
    });
    Ok(JsValue::Number(result))
}

fn math_max(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let result = args.iter().map(JsValue::to_number).fold(f64::NEG_INFINITY, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            acc.max(n)
        }
    });
    Ok(JsValue::Number(result))
}

fn math_pow(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(number_arg(&args, 0).powf(number_arg(&args, 1))))
}

// ---- Object ----

fn object_ctor(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    match arg(&args, 0) {
        value @ JsValue::Object(_) => Ok(value),
        _ => Ok(interp.new_object(Vec::new())),
    }
}

fn object_keys(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let keys = match arg(&args, 0) {
        JsValue::Object(o) => o.borrow().keys(),
        JsValue::String(s) => (0..utf16(&s).len()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    };
    Ok(interp.new_array(keys.into_iter().map(JsValue::string).collect()))
}

fn object_assign(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let target = arg(&args, 0);
    for source in args.iter().skip(1) {
        let keys = match source {
            JsValue::Object(o) => o.borrow().keys(),
            _ => continue,
        };
        for key in keys {
            let value = interp.get(source, &key)?;
            interp.put(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn object_create(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let proto = match arg(&args, 0) {
        JsValue::Object(o) => Some(o),
        JsValue::Null => None,
        other => {
            return type_error(
                interp,
                format!("Object prototype may only be an Object or null: {}", other.to_js_string()),
            )
        }
    };
    Ok(JsValue::object(JsObject::new(ObjectKind::Ordinary, proto)))
}

fn object_from_entries(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let object = interp.new_object(Vec::new());
    let entries = arg(&args, 0).array_items().unwrap_or_default();
    for entry in entries {
        let key = interp.get(&entry, "0")?.to_key();
        let value = interp.get(&entry, "1")?;
        interp.put(&object, &key, value)?;
    }
    Ok(object)
}

fn object_has_own_property(
    _: &mut Interpreter,
    this: JsValue,
    args: Vec<JsValue>,
) -> Step<JsValue> {
    let key = arg(&args, 0).to_key();
    Ok(JsValue::Bool(match &this {
        JsValue::Object(o) => o.borrow().has_own(&key),
        JsValue::String(s) => {
            key == "length" || key.parse::<usize>().is_ok_and(|i| i < utf16(s).len())
        }
        _ => false,
    }))
}

fn object_to_string(_: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::string(match this {
        JsValue::Undefined => "[object Undefined]",
        JsValue::Null => "[object Null]",
        _ if this.array_items().is_some() => "[object Array]",
        _ => "[object Object]",
    }))
}

// ---- Function.prototype ----

fn function_call(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut args = args.into_iter();
    let receiver = args.next().unwrap_or(JsValue::Undefined);
    interp.call(this, receiver, args.collect())
}

fn function_apply(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let list = arg(&args, 1).array_items().unwrap_or_default();
    interp.call(this, arg(&args, 0), list)
}

fn function_bind(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    if !this.is_callable() {
        return type_error(interp, "Bind must be called on a function");
    }
    let mut args = args.into_iter();
    let bound_this = args.next().unwrap_or(JsValue::Undefined);
    Ok(JsValue::object(JsObject::new(
        ObjectKind::Bound {
            target: this,
            this: bound_this,
            args: args.collect(),
        },
        Some(Rc::clone(&interp.protos.function)),
    )))
}

// ---- Array ----

fn array_ctor(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    match args.as_slice() {
        [JsValue::Number(n)] => {
            if *n < 0.0 || n.fract() != 0.0 {
                let error = error_object(interp, "RangeError", "Invalid array length".into());
                return Err(Fault::Throw(error));
            }
            Ok(interp.new_array(vec![JsValue::Undefined; *n as usize]))
        }
        _ => Ok(interp.new_array(args)),
    }
}

fn array_from(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let source = arg(&args, 0);
    let items = match &source {
        JsValue::String(s) => s.chars().map(|c| JsValue::string(c.to_string())).collect(),
        JsValue::Object(_) => match source.array_items() {
            Some(items) => items,
            None => {
                let len = interp.get(&source, "length")?.to_number();
                let len = if len.is_finite() && len > 0.0 { len as usize } else { 0 };
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(interp.get(&source, &i.to_string())?);
                }
                items
            }
        },
        _ => Vec::new(),
    };
    let mapper = arg(&args, 1);
    if mapper.is_callable() {
        let mut mapped = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            mapped.push(interp.call(
                mapper.clone(),
                JsValue::Undefined,
                vec![item, JsValue::from(i as f64)],
            )?);
        }
        return Ok(interp.new_array(mapped));
    }
    Ok(interp.new_array(items))
}

fn array_is_array(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Bool(arg(&args, 0).array_items().is_some()))
}

/// `this` が配列ならその参照を返す。
fn this_array(interp: &mut Interpreter, this: &JsValue) -> Step<ObjRef> {
    if let JsValue::Object(o) = this {
        if matches!(o.borrow().kind, ObjectKind::Array(_)) {
            return Ok(Rc::clone(o));
        }
    }
    type_error(interp, format!("{} is not an array", this.to_js_string()))
}

/// 配列の要素列を直接書き換える。
fn with_items<R>(array: &ObjRef, f: impl FnOnce(&mut Vec<JsValue>) -> R) -> R {
    let mut object = array.borrow_mut();
    match &mut object.kind {
        ObjectKind::Array(items) => f(items),
        _ => f(&mut Vec::new()),
    }
}

fn items_of(array: &ObjRef) -> Vec<JsValue> {
    with_items(array, |items| items.clone())
}

fn array_push(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let len = with_items(&array, |items| {
        items.extend(args);
        items.len()
    });
    Ok(JsValue::Number(len as f64))
}

fn array_pop(interp: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    Ok(with_items(&array, |items| items.pop()).unwrap_or(JsValue::Undefined))
}

fn array_shift(interp: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let first = with_items(&array, |items| {
        if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        }
    });
    Ok(first.unwrap_or(JsValue::Undefined))
}

fn array_unshift(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let len = with_items(&array, |items| {
        items.splice(0..0, args);
        items.len()
    });
    Ok(JsValue::Number(len as f64))
}

fn array_splice(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let len = with_items(&array, |items| items.len());
    let start = relative_index(&arg(&args, 0), len, 0);
    let delete = if args.len() < 2 {
        len - start
    } else {
        let n = number_arg(&args, 1);
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        n.max(0.0).min((len - start) as f64) as usize
    };
    let inserted: Vec<JsValue> = args.into_iter().skip(2).collect();
    let removed: Vec<JsValue> =
        with_items(&array, |items| items.splice(start..start + delete, inserted).collect());
    Ok(interp.new_array(removed))
}

fn array_slice(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let items = items_of(&array);
    let start = relative_index(&arg(&args, 0), items.len(), 0);
    let end = relative_index(&arg(&args, 1), items.len(), items.len());
    let slice = if start < end {
        items[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(interp.new_array(slice))
}

fn array_concat(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let mut items = items_of(&array);
    for value in args {
        match value.array_items() {
            Some(more) => items.extend(more),
            None => items.push(value),
        }
    }
    Ok(interp.new_array(items))
}

/// 各要素に `(item, index, array)` でコールバックを呼ぶ。`stop` が真を返したら打ち切る。
fn each_callback(
    interp: &mut Interpreter,
    this: &JsValue,
    args: &[JsValue],
    mut visit: impl FnMut(usize, JsValue, JsValue) -> bool,
) -> Step<()> {
    let array = this_array(interp, this)?;
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return type_error(interp, format!("{} is not a function", callback.to_js_string()));
    }
    let receiver = arg(args, 1);
    let mut i = 0;
    loop {
        let Some(item) = with_items(&array, |items| items.get(i).cloned()) else {
            break;
        };
        let result = interp.call(
            callback.clone(),
            receiver.clone(),
            vec![item.clone(), JsValue::from(i as f64), this.clone()],
        )?;
        if visit(i, item, result) {
            break;
        }
        i += 1;
    }
    Ok(())
}

fn array_map(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut out = Vec::new();
    each_callback(interp, &this, &args, |_, _, result| {
        out.push(result);
        false
    })?;
    Ok(interp.new_array(out))
}

fn array_filter(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut out = Vec::new();
    each_callback(interp, &this, &args, |_, item, result| {
        if result.truthy() {
            out.push(item);
        }
        false
    })?;
    Ok(interp.new_array(out))
}

fn array_for_each(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    each_callback(interp, &this, &args, |_, _, _| false)?;
    Ok(JsValue::Undefined)
}

fn array_some(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut found = false;
    each_callback(interp, &this, &args, |_, _, result| {
        found = result.truthy();
        found
    })?;
    Ok(JsValue::Bool(found))
}

fn array_every(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut all = true;
    each_callback(interp, &this, &args, |_, _, result| {
        all = result.truthy();
        !all
    })?;
    Ok(JsValue::Bool(all))
}

fn array_find(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut found = JsValue::Undefined;
    each_callback(interp, &this, &args, |_, item, result| {
        if result.truthy() {
            found = item;
            return true;
        }
        false
    })?;
    Ok(found)
}

fn array_find_index(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut found = -1.0;
    each_callback(interp, &this, &args, |i, _, result| {
        if result.truthy() {
            found = i as f64;
            return true;
        }
        false
    })?;
    Ok(JsValue::Number(found))
}

fn array_reduce(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let callback = arg(&args, 0);
    let items = items_of(&array);
    let mut iter = items.into_iter().enumerate();
    let mut acc = if args.len() > 1 {
        arg(&args, 1)
    } else {
        match iter.next() {
            Some((_, first)) => first,
            None => return type_error(interp, "Reduce of empty array with no initial value"),
        }
    };
    for (i, item) in iter {
        acc = interp.call(
            callback.clone(),
            JsValue::Undefined,
            vec![acc, item, JsValue::from(i as f64), this.clone()],
        )?;
    }
    Ok(acc)
}

fn join_items(items: &[JsValue], separator: &str) -> String {
    items
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
        .collect::<Vec<_>>()
        .join(separator)
}

fn array_join(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let separator = match arg(&args, 0) {
        JsValue::Undefined => ",".to_string(),
        other => other.to_js_string(),
    };
    Ok(JsValue::string(join_items(&items_of(&array), &separator)))
}

fn array_to_string(interp: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    Ok(JsValue::string(join_items(&items_of(&array), ",")))
}

fn array_index_of(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let needle = arg(&args, 0);
    let items = items_of(&array);
    let start = relative_index(&arg(&args, 1), items.len(), 0);
    let found = items
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, v)| strict_equals(v, &needle))
        .map(|(i, _)| i as f64)
        .unwrap_or(-1.0);
    Ok(JsValue::Number(found))
}

fn array_includes(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let needle = arg(&args, 0);
    let nan = needle.as_number().is_some_and(f64::is_nan);
    Ok(JsValue::Bool(items_of(&array).iter().any(|v| {
        strict_equals(v, &needle) || (nan && v.as_number().is_some_and(f64::is_nan))
    })))
}

fn array_reverse(interp: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    with_items(&array, |items| items.reverse());
    Ok(this)
}

fn array_fill(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let value = arg(&args, 0);
    with_items(&array, |items| {
        let len = items.len();
        let start = relative_index(&arg(&args, 1), len, 0);
        let end = relative_index(&arg(&args, 2), len, len);
        for slot in items.iter_mut().take(end).skip(start) {
            *slot = value.clone();
        }
    });
    Ok(this)
}

/// 安定な挿入ソート。比較関数が例外を投げれば途中で止まる。
fn array_sort(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let array = this_array(interp, &this)?;
    let compare = arg(&args, 0);
    let mut items = items_of(&array);
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            let (a, b) = (&items[j - 1], &items[j]);
            let greater = if compare.is_callable() {
                interp
                    .call(compare.clone(), JsValue::Undefined, vec![a.clone(), b.clone()])?
                    .to_number()
                    > 0.0
            } else if a.is_undefined() || b.is_undefined() {
                a.is_undefined() && !b.is_undefined()
            } else {
                utf16(&a.to_js_string()) > utf16(&b.to_js_string())
            };
            if !greater {
                break;
            }
            items.swap(j - 1, j);
            j -= 1;
        }
    }
    with_items(&array, |slot| *slot = items);
    Ok(this)
}

// ---- String ----

fn string_ctor(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(match args.first() {
        Some(v) => JsValue::string(v.to_js_string()),
        None => JsValue::string(""),
    })
}

fn string_from_char_code(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units: Vec<u16> = args.iter().map(|v| v.to_uint32() as u16).collect();
    Ok(JsValue::string(from_utf16(&units)))
}

fn string_from_code_point(
    interp: &mut Interpreter,
    _: JsValue,
    args: Vec<JsValue>,
) -> Step<JsValue> {
    let mut out = String::new();
    for value in &args {
        let n = value.to_number();
        match (n.fract() == 0.0).then(|| char::from_u32(n as u32)).flatten() {
            Some(c) if n >= 0.0 => out.push(c),
            _ => {
                let message = format!("Invalid code point {}", format_number(n));
                let error = error_object(interp, "RangeError", message);
                return Err(Fault::Throw(error));
            }
        }
    }
    Ok(JsValue::string(out))
}

fn this_string(this: &JsValue) -> String {
    this.to_js_string()
}

fn string_char_code_at(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let i = number_arg(&args, 0);
    let i = if i.is_nan() { 0.0 } else { i.trunc() };
    Ok(JsValue::Number(if i < 0.0 {
        f64::NAN
    } else {
        units.get(i as usize).map(|u| f64::from(*u)).unwrap_or(f64::NAN)
    }))
}

fn string_code_point_at(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let i = number_arg(&args, 0);
    let i = if i.is_nan() { 0 } else { i.max(0.0) as usize };
    let Some(&first) = units.get(i) else {
        return Ok(JsValue::Undefined);
    };
    let point = match units.get(i + 1) {
        Some(&second)
            if (0xd800..0xdc00).contains(&first) && (0xdc00..0xe000).contains(&second) =>
        {
            0x10000 + ((u32::from(first) - 0xd800) << 10) + (u32::from(second) - 0xdc00)
        }
        _ => u32::from(first),
    };
    Ok(JsValue::Number(f64::from(point)))
}

fn string_char_at(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let i = number_arg(&args, 0);
    let i = if i.is_nan() { 0.0 } else { i.trunc() };
    Ok(JsValue::string(if i < 0.0 {
        String::new()
    } else {
        units
            .get(i as usize)
            .map(|u| from_utf16(&[*u]))
            .unwrap_or_default()
    }))
}

/// `substring` の添字は負を 0 に丸め、逆順なら入れ替える。
fn clamp_index(value: &JsValue, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        0
    } else {
        n.max(0.0).min(len as f64) as usize
    }
}

fn string_substring(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let a = clamp_index(&arg(&args, 0), units.len(), 0);
    let b = clamp_index(&arg(&args, 1), units.len(), units.len());
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(JsValue::string(from_utf16(&units[start..end])))
}

fn string_substr(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let start = relative_index(&arg(&args, 0), units.len(), 0);
    let count = clamp_index(&arg(&args, 1), units.len() - start, units.len() - start);
    Ok(JsValue::string(from_utf16(&units[start..start + count])))
}

fn string_slice(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let start = relative_index(&arg(&args, 0), units.len(), 0);
    let end = relative_index(&arg(&args, 1), units.len(), units.len());
    Ok(JsValue::string(if start < end {
        from_utf16(&units[start..end])
    } else {
        String::new()
    }))
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..haystack.len())
        .take_while(|i| i + needle.len() <= haystack.len())
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn string_index_of(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let needle = utf16(&arg(&args, 0).to_js_string());
    let from = clamp_index(&arg(&args, 1), units.len(), 0);
    Ok(JsValue::Number(
        find_units(&units, &needle, from).map(|i| i as f64).unwrap_or(-1.0),
    ))
}

fn string_last_index_of(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let units = utf16(&this_string(&this));
    let needle = utf16(&arg(&args, 0).to_js_string());
    let found = (0..=units.len())
        .rev()
        .filter(|i| i + needle.len() <= units.len())
        .find(|&i| units[i..i + needle.len()] == *needle);
    Ok(JsValue::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
}

fn string_includes(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let needle = arg(&args, 0).to_js_string();
    Ok(JsValue::Bool(this_string(&this).contains(needle.as_str())))
}

fn string_starts_with(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let needle = arg(&args, 0).to_js_string();
    Ok(JsValue::Bool(this_string(&this).starts_with(needle.as_str())))
}

fn string_ends_with(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let needle = arg(&args, 0).to_js_string();
    Ok(JsValue::Bool(this_string(&this).ends_with(needle.as_str())))
}

fn string_to_lower_case(_: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::string(this_string(&this).to_lowercase()))
}

fn string_to_upper_case(_: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::string(this_string(&this).to_uppercase()))
}

fn string_split(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let text = this_string(&this);
    let parts: Vec<JsValue> = match arg(&args, 0) {
        JsValue::Undefined => vec![JsValue::string(text)],
        separator => {
            let separator = separator.to_js_string();
            if separator.is_empty() {
                utf16(&text)
                    .iter()
                    .map(|u| JsValue::string(from_utf16(&[*u])))
                    .collect()
            } else {
                text.split(separator.as_str()).map(JsValue::string).collect()
            }
        }
    };
    Ok(interp.new_array(parts))
}

fn string_concat(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let mut text = this_string(&this);
    for value in &args {
        text.push_str(&value.to_js_string());
    }
    Ok(JsValue::string(text))
}

fn string_trim(_: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::string(this_string(&this).trim()))
}

fn string_repeat(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let count = number_arg(&args, 0);
    let count = if count.is_nan() { 0.0 } else { count.trunc() };
    if count < 0.0 || count.is_infinite() {
        let message = format!("Invalid count value: {}", format_number(count));
        let error = error_object(interp, "RangeError", message);
        return Err(Fault::Throw(error));
    }
    Ok(JsValue::string(this_string(&this).repeat(count as usize)))
}

fn string_to_string(_: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::string(this_string(&this)))
}

// ---- Number / Boolean ----

fn number_ctor(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Number(args.first().map(JsValue::to_number).unwrap_or(0.0)))
}

fn boolean_ctor(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Bool(args.first().is_some_and(JsValue::truthy)))
}

fn number_to_string(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let n = this.to_number();
    let radix = match arg(&args, 0) {
        JsValue::Undefined => 10,
        r => r.to_number() as u32,
    };
    if !(2..=36).contains(&radix) {
        let message = "toString() radix must be between 2 and 36".to_string();
        let error = error_object(interp, "RangeError", message);
        return Err(Fault::Throw(error));
    }
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return Ok(JsValue::string(format_number(n)));
    }
    let mut magnitude = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude /= u64::from(radix);
        if magnitude == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(JsValue::string(digits.iter().rev().collect::<String>()))
}

fn number_to_fixed(_: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let n = this.to_number();
    let digits = number_arg(&args, 0);
    let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
    if !n.is_finite() {
        return Ok(JsValue::string(format_number(n)));
    }
    Ok(JsValue::string(format!("{:.*}", digits, n)))
}

fn parse_int(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let text = arg(&args, 0).to_js_string();
    let text = text.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut radix = match arg(&args, 1) {
        JsValue::Undefined => 10,
        r => r.to_int32() as u32,
    };
    let mut text = text;
    if radix == 0 || radix == 16 {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            text = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return Ok(JsValue::Number(f64::NAN));
    }
    let digits: Vec<u32> = text.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(JsValue::Number(f64::NAN));
    }
    let value = digits
        .iter()
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(*d));
    Ok(JsValue::Number(if negative { -value } else { value }))
}

fn parse_float(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let text = arg(&args, 0).to_js_string();
    let text = text.trim_start();
    if let Some(rest) = text.strip_prefix('-').or_else(|| text.strip_prefix('+')).or(Some(text)) {
        if rest.starts_with("Infinity") {
            let sign = if text.starts_with('-') { -1.0 } else { 1.0 };
            return Ok(JsValue::Number(sign * f64::INFINITY));
        }
    }
    let numeric = text
        .find(|c: char| !(c.is_ascii_digit() || "+-.eE".contains(c)))
        .unwrap_or(text.len());
    let value = (1..=numeric)
        .rev()
        .find_map(|end| text[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN);
    Ok(JsValue::Number(value))
}

fn is_nan(_: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(JsValue::Bool(number_arg(&args, 0).is_nan()))
}

// ---- console / JSON ----

fn console_log(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let line = args
        .iter()
        .map(JsValue::to_js_string)
        .collect::<Vec<_>>()
        .join(" ");
    log::debug!("console.log: {}", line);
    interp.output.push(line);
    Ok(JsValue::Undefined)
}

/// JSON の文字列化。関数と undefined は `None`（配列の中では `null`）。
fn stringify(interp: &mut Interpreter, value: &JsValue, depth: usize) -> Step<Option<String>> {
    if depth > 64 {
        return type_error(interp, "Converting circular structure to JSON");
    }
    Ok(match value {
        JsValue::Undefined => None,
        JsValue::Null => Some("null".into()),
        JsValue::Bool(b) => Some(b.to_string()),
        JsValue::Number(n) if n.is_finite() => Some(format_number(*n)),
        JsValue::Number(_) => Some("null".into()),
        JsValue::String(s) => Some(serde_json::Value::String(s.to_string()).to_string()),
        JsValue::Object(_) if value.is_callable() => None,
        JsValue::Object(o) => {
            if let Some(items) = value.array_items() {
                let mut parts = Vec::with_capacity(items.len());
                for item in &items {
                    let part = stringify(interp, item, depth + 1)?;
                    parts.push(part.unwrap_or_else(|| "null".into()));
                }
                return Ok(Some(format!("[{}]", parts.join(","))));
            }
            let keys = o.borrow().keys();
            let mut parts = Vec::with_capacity(keys.len());
            for key in keys {
                let field = interp.get(value, &key)?;
                if let Some(text) = stringify(interp, &field, depth + 1)? {
                    parts.push(format!(
                        "{}:{}",
                        serde_json::Value::String(key).to_string(),
                        text
                    ));
                }
            }
            Some(format!("{{{}}}", parts.join(",")))
        }
    })
}

fn json_stringify(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    Ok(match stringify(interp, &arg(&args, 0), 0)? {
        Some(text) => JsValue::string(text),
        None => JsValue::Undefined,
    })
}

// ---- Error ----

/// `this` の原型連鎖に `Error.prototype` があれば構築呼び出しとみなす。
fn is_error_instance(interp: &Interpreter, this: &JsValue) -> bool {
    let mut current = this.as_object().and_then(|o| o.borrow().proto.clone());
    while let Some(object) = current {
        if Rc::ptr_eq(&object, &interp.protos.error) {
            return true;
        }
        current = object.borrow().proto.clone();
    }
    false
}

fn make_error(
    interp: &mut Interpreter,
    this: JsValue,
    args: Vec<JsValue>,
    name: &str,
) -> Step<JsValue> {
    let target = if is_error_instance(interp, &this) {
        this
    } else {
        error_object(interp, name, String::new())
    };
    if let (Some(object), message) = (target.as_object(), arg(&args, 0)) {
        if !message.is_undefined() {
            object
                .borrow_mut()
                .set_own("message", JsValue::string(message.to_js_string()));
        }
    }
    Ok(target)
}

fn error_ctor(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    make_error(interp, this, args, "Error")
}

fn type_error_ctor(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    make_error(interp, this, args, "TypeError")
}

fn range_error_ctor(interp: &mut Interpreter, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    make_error(interp, this, args, "RangeError")
}

fn error_to_string(interp: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    let name = interp.get(&this, "name")?.to_js_string();
    let message = interp.get(&this, "message")?.to_js_string();
    Ok(JsValue::string(if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    }))
}

// ---- TextEncoder ----

fn text_encoder_ctor(_: &mut Interpreter, this: JsValue, _: Vec<JsValue>) -> Step<JsValue> {
    Ok(this)
}

fn text_encoder_encode(interp: &mut Interpreter, _: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
    let text = match arg(&args, 0) {
        JsValue::Undefined => String::new(),
        other => other.to_js_string(),
    };
    let bytes = text.bytes().map(|b| JsValue::Number(f64::from(b))).collect();
    Ok(interp.new_array(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::{Expr, Program, Stmt, VarKind};

    fn eval(interp: &mut Interpreter, e: Expr) -> JsValue {
        let program = Program {
            body: vec![Stmt::var(VarKind::Var, "result", Some(e))],
        };
        interp.run_program(&program).expect("run");
        interp.global("result").expect("result")
    }

    fn method(object: Expr, name: &str, args: Vec<Expr>) -> Expr {
        Expr::call(Expr::member(object, name), args)
    }

    #[test]
    /// Math.imul は 32 ビットで折り返す
    fn imul_wraps() {
        let mut interp = Interpreter::new();
        let v = eval(
            &mut interp,
            Expr::call_path(&["Math", "imul"], vec![Expr::num(65536.0), Expr::num(65536.0)]),
        );
        assert_eq!(v.as_number(), Some(0.0));
    }

    #[test]
    /// 配列メソッドはコールバックを順に呼ぶ
    fn array_methods() {
        let mut interp = Interpreter::new();
        let doubled = method(
            Expr::Array(vec![Expr::num(1.0), Expr::num(2.0), Expr::num(3.0)]),
            "map",
            vec![Expr::function(
                vec!["x".into()],
                vec![Stmt::ret(Expr::binary("*", Expr::ident("x"), Expr::num(2.0)))],
            )],
        );
        let joined = eval(&mut interp, method(doubled, "join", vec![Expr::str_lit("-")]));
        assert_eq!(joined.as_str(), Some("2-4-6"));
        let sorted = eval(
            &mut interp,
            method(
                Expr::Array(vec![Expr::str_lit("b"), Expr::str_lit("c"), Expr::str_lit("a")]),
                "sort",
                vec![],
            ),
        );
        assert_eq!(sorted.to_js_string(), "a,b,c");
    }

    #[test]
    /// 文字列の添字は UTF-16 単位
    fn string_methods_use_utf16_units() {
        let mut interp = Interpreter::new();
        let code = eval(
            &mut interp,
            method(Expr::str_lit("a😀"), "charCodeAt", vec![Expr::num(1.0)]),
        );
        assert_eq!(code.as_number(), Some(f64::from(0xd83d_u16)));
        let point = eval(
            &mut interp,
            method(Expr::str_lit("a😀"), "codePointAt", vec![Expr::num(1.0)]),
        );
        assert_eq!(point.as_number(), Some(f64::from(0x1f600_u32)));
        let sub = eval(
            &mut interp,
            method(Expr::str_lit("hello"), "substring", vec![Expr::num(4.0), Expr::num(1.0)]),
        );
        assert_eq!(sub.as_str(), Some("ell"));
    }

    #[test]
    /// JSON.stringify はキーの挿入順を保ち、文字列をエスケープする
    fn json_stringify_orders_keys() {
        let mut interp = Interpreter::new();
        let object = Expr::Object(vec![
            crate::js::Property::field("b", Expr::num(1.0)),
            crate::js::Property::field("a", Expr::str_lit("x\"y")),
            crate::js::Property::field("u", Expr::undefined()),
        ]);
        let text = eval(&mut interp, Expr::call_path(&["JSON", "stringify"], vec![object]));
        assert_eq!(text.as_str(), Some(r#"{"b":1,"a":"x\"y"}"#));
    }

    #[test]
    /// console.log は出力バッファに行を積む
    fn console_log_buffers_lines() {
        let mut interp = Interpreter::new();
        eval(
            &mut interp,
            Expr::call_path(&["console", "log"], vec![Expr::str_lit("n ="), Expr::num(3.0)]),
        );
        assert_eq!(interp.take_output(), vec!["n = 3".to_string()]);
    }

    #[test]
    /// new TextEncoder().encode は UTF-8 のバイト列を返す
    fn text_encoder_encodes_utf8() {
        let mut interp = Interpreter::new();
        let encoder = Expr::new_expr(Expr::ident("TextEncoder"), vec![Expr::str_lit("utf-8")]);
        let bytes = eval(&mut interp, method(encoder, "encode", vec![Expr::str_lit("é")]));
        let bytes: Vec<f64> = bytes
            .array_items()
            .expect("array")
            .iter()
            .filter_map(JsValue::as_number)
            .collect();
        assert_eq!(bytes, vec![195.0, 169.0]);
    }
}
