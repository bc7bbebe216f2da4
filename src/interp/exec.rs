// パス: src/interp/exec.rs
// 役割: 文と式の評価、プロパティの読み書き、関数の呼び出しと構築
// 意図: 構文木を直接たどる素朴な評価器として、変換器の出力が使う構文だけを正しく扱う
// 関連ファイル: src/interp/mod.rs, src/interp/value.rs, src/interp/host.rs
use std::rc::Rc;

use super::env::Env;
use super::value::{
    array_index, from_utf16, loose_equals, strict_equals, utf16, Closure, JsObject, JsValue,
    NativeFn, ObjectKind, Slot,
};
use super::{fatal, Fault, Interpreter, Step, MAX_DEPTH};
use crate::js::printer::print_expr;
use crate::js::{
    ClassMember, Expr, MethodKind, PropKey, PropValue, Property, Stmt, SwitchCase, VarKind,
};

/// 文の実行結果。
pub(crate) enum Flow {
    Normal,
    Return(JsValue),
    Break,
    Continue,
}

/// 代入先。
enum Place {
    Var(String),
    Prop(JsValue, String),
}

/// 関数本体から `var` 宣言の名前を集める（入れ子の関数には入らない）。
fn collect_vars(body: &[Stmt], out: &mut Vec<String>) {
    for stmt in body {
        match stmt {
            Stmt::Var {
                kind: VarKind::Var,
                decls,
            } => out.extend(decls.iter().map(|(n, _)| n.clone())),
            Stmt::If {
                consequent,
                alternate,
                ..
            } => {
                collect_vars(consequent, out);
                if let Some(alt) = alternate {
                    collect_vars(std::slice::from_ref(alt.as_ref()), out);
                }
            }
            Stmt::Block(b) | Stmt::While { body: b, .. } | Stmt::DoWhile { body: b, .. } => {
                collect_vars(b, out)
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_vars(std::slice::from_ref(init.as_ref()), out);
                }
                collect_vars(body, out);
            }
            Stmt::ForOf { kind, name, body, .. } | Stmt::ForIn { kind, name, body, .. } => {
                if *kind == VarKind::Var {
                    out.push(name.clone());
                }
                collect_vars(body, out);
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    collect_vars(&case.body, out);
                }
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                collect_vars(block, out);
                if let Some((_, h)) = handler {
                    collect_vars(h, out);
                }
                if let Some(f) = finalizer {
                    collect_vars(f, out);
                }
            }
            Stmt::Export(inner) => collect_vars(std::slice::from_ref(inner.as_ref()), out),
            _ => {}
        }
    }
}

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or(JsValue::Undefined)
}

impl Interpreter {
    /// 関数本体・プログラム本体を実行する（`var` と関数宣言を先に束縛する）。
    pub(crate) fn run_body(&mut self, body: &[Stmt], env: &Env) -> Step<Flow> {
        let mut vars = Vec::new();
        collect_vars(body, &mut vars);
        for name in vars {
            if !env.has_own(&name) {
                env.declare(name, JsValue::Undefined);
            }
        }
        self.exec_statements(body, env)
    }

    fn hoist_functions(&mut self, body: &[Stmt], env: &Env) {
        for stmt in body {
            let decl = match stmt {
                Stmt::Export(inner) => inner.as_ref(),
                other => other,
            };
            if let Stmt::Function { name, params, body } = decl {
                let f = self.make_closure(Some(name.clone()), params, body, env);
                env.declare(name.clone(), f);
            }
        }
    }

    fn exec_statements(&mut self, body: &[Stmt], env: &Env) -> Step<Flow> {
        self.hoist_functions(body, env);
        for stmt in body {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Step<Flow> {
        self.exec_statements(body, &env.child())
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Step<Flow> {
        match stmt {
            Stmt::Expr(e) => {
                self.eval(e, env)?;
            }
            Stmt::Var { kind, decls } => {
                for (name, init) in decls {
                    match (kind, init) {
                        (VarKind::Var, None) => {}
                        (VarKind::Var, Some(e)) => {
                            let v = self.eval(e, env)?;
                            env.assign(name, v);
                        }
                        (_, init) => {
                            let v = match init {
                                Some(e) => self.eval(e, env)?,
                                None => JsValue::Undefined,
                            };
                            env.declare(name.clone(), v);
                        }
                    }
                }
            }
            Stmt::Function { .. } => {}
            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(e, env)?,
                    None => JsValue::Undefined,
                };
                return Ok(Flow::Return(v));
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    return self.exec_block(consequent, env);
                } else if let Some(alt) = alternate {
                    return self.exec(alt, &env.child());
                }
            }
            Stmt::Block(body) => return self.exec_block(body, env),
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::DoWhile { body, test } => loop {
                match self.exec_block(body, env)? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal | Flow::Continue => {}
                }
                if !self.eval(test, env)?.truthy() {
                    break;
                }
            },
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_env = env.child();
                if let Some(init) = init {
                    self.exec(init, &loop_env)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &loop_env)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_block(body, &loop_env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &loop_env)?;
                    }
                }
            }
            Stmt::ForOf {
                kind,
                name,
                iter,
                body,
            } => {
                let iterable = self.eval(iter, env)?;
                let mut index = 0usize;
                loop {
                    let Some(item) = self.iteration_item(&iterable, index)? else {
                        break;
                    };
                    index += 1;
                    match self.loop_iteration(*kind, name, item, body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::ForIn {
                kind,
                name,
                object,
                body,
            } => {
                let object = self.eval(object, env)?;
                let keys = match &object {
                    JsValue::Object(o) => o.borrow().keys(),
                    _ => Vec::new(),
                };
                for key in keys {
                    match self.loop_iteration(*kind, name, JsValue::string(key), body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => return self.exec_switch(discriminant, cases, env),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Throw(e) => {
                let v = self.eval(e, env)?;
                return Err(Fault::Throw(v));
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block, env);
                if let Some((param, body)) = handler {
                    if let Err(Fault::Throw(thrown)) = result {
                        let catch_env = env.child();
                        catch_env.declare(param.clone(), thrown);
                        result = self.exec_statements(body, &catch_env);
                    }
                }
                if let Some(finalizer) = finalizer {
                    match self.exec_block(finalizer, env)? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
                return result;
            }
            Stmt::Class { name, members } => {
                let class = self.make_class(name, members, env)?;
                env.declare(name.clone(), class);
            }
            Stmt::Export(inner) => {
                let flow = self.exec(inner, env)?;
                let names: Vec<String> = match inner.as_ref() {
                    Stmt::Function { name, .. } | Stmt::Class { name, .. } => vec![name.clone()],
                    Stmt::Var { decls, .. } => decls.iter().map(|(n, _)| n.clone()).collect(),
                    _ => Vec::new(),
                };
                for name in names {
                    if let Some(v) = env.get(&name) {
                        self.exports.insert(name, v);
                    }
                }
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn loop_iteration(
        &mut self,
        kind: VarKind,
        name: &str,
        item: JsValue,
        body: &[Stmt],
        env: &Env,
    ) -> Step<Flow> {
        let iteration = env.child();
        if kind == VarKind::Var {
            env.assign(name, item);
        } else {
            iteration.declare(name, item);
        }
        self.exec_statements(body, &iteration)
    }

    /// `for-of` の `index` 番目の要素。配列は毎回長さを読み直す。
    fn iteration_item(&mut self, iterable: &JsValue, index: usize) -> Step<Option<JsValue>> {
        match iterable {
            JsValue::String(s) => Ok(s.chars().nth(index).map(|c| JsValue::string(c.to_string()))),
            JsValue::Object(o) => match &o.borrow().kind {
                ObjectKind::Array(items) => Ok(items.get(index).cloned()),
                _ => fatal("EVAL008", "for-of over a non-iterable object"),
            },
            other => fatal(
                "EVAL008",
                format!("{} is not iterable", other.to_js_string()),
            ),
        }
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], env: &Env) -> Step<Flow> {
        let value = self.eval(discriminant, env)?;
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if strict_equals(&value, &self.eval(test, env)?) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        let case_env = env.child();
        for case in &cases[start..] {
            match self.exec_statements(&case.body, &case_env)? {
                Flow::Normal => {}
                Flow::Break => return Ok(Flow::Normal),
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn make_closure(
        &self,
        name: Option<String>,
        params: &[String],
        body: &[Stmt],
        env: &Env,
    ) -> JsValue {
        let closure = Closure {
            name,
            params: params.to_vec(),
            body: Rc::new(body.to_vec()),
            env: env.clone(),
        };
        JsValue::object(JsObject::new(
            ObjectKind::Function(Rc::new(closure)),
            Some(Rc::clone(&self.protos.function)),
        ))
    }

    fn make_class(&mut self, name: &str, members: &[ClassMember], env: &Env) -> Step<JsValue> {
        let class = match members.iter().find(|m| m.kind == MethodKind::Constructor) {
            Some(ctor) => self.make_closure(Some(name.to_string()), &ctor.params, &ctor.body, env),
            None => self.make_closure(Some(name.to_string()), &[], &[], env),
        };
        let prototype = self.new_object(Vec::new());
        for member in members.iter().filter(|m| m.kind != MethodKind::Constructor) {
            let holder = if member.is_static { &class } else { &prototype };
            let f = self.make_closure(Some(member.name.clone()), &member.params, &member.body, env);
            let Some(object) = holder.as_object() else {
                continue;
            };
            let mut object = object.borrow_mut();
            let existing = object.own(&member.name).cloned();
            let slot = match (member.kind, existing) {
                (MethodKind::Get, Some(Slot::Accessor { set, .. })) => Slot::Accessor {
                    get: Some(f),
                    set,
                },
                (MethodKind::Get, _) => Slot::Accessor {
                    get: Some(f),
                    set: None,
                },
                (MethodKind::Set, Some(Slot::Accessor { get, .. })) => Slot::Accessor {
                    get,
                    set: Some(f),
                },
                (MethodKind::Set, _) => Slot::Accessor {
                    get: None,
                    set: Some(f),
                },
                _ => Slot::Data(f),
            };
            object.define(&member.name, slot);
        }
        if let Some(p) = prototype.as_object() {
            p.borrow_mut().set_own("constructor", class.clone());
        }
        if let Some(c) = class.as_object() {
            c.borrow_mut().set_own("prototype", prototype);
        }
        Ok(class)
    }

    pub(crate) fn eval(&mut self, e: &Expr, env: &Env) -> Step<JsValue> {
        Ok(match e {
            Expr::Ident(name) => match env.get(name) {
                Some(v) => v,
                None if name == "undefined" => JsValue::Undefined,
                None => return fatal("EVAL002", format!("{} is not defined", name)),
            },
            Expr::This => env.get("this").unwrap_or(JsValue::Undefined),
            Expr::Num(n) => JsValue::Number(*n),
            Expr::Str(s) => JsValue::string(s),
            Expr::Bool(b) => JsValue::Bool(*b),
            Expr::Null => JsValue::Null,
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                self.new_array(values)
            }
            Expr::Object(props) => self.eval_object(props, env)?,
            Expr::Member {
                object,
                property,
                computed,
            } => {
                let target = self.eval(object, env)?;
                let key = self.member_key(property, *computed, env)?;
                self.get(&target, &key)?
            }
            Expr::Call { callee, args } => {
                let (this, f) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        computed,
                    } => {
                        let target = self.eval(object, env)?;
                        let key = self.member_key(property, *computed, env)?;
                        let f = self.get(&target, &key)?;
                        (target, f)
                    }
                    other => (JsValue::Undefined, self.eval(other, env)?),
                };
                let args = self.eval_args(args, env)?;
                if !f.is_callable() {
                    return fatal("EVAL003", format!("{} is not a function", print_expr(callee)));
                }
                self.call(f, this, args)?
            }
            Expr::New { callee, args } => {
                let f = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                if !f.is_callable() {
                    return fatal("EVAL009", format!("{} is not a constructor", print_expr(callee)));
                }
                self.construct(f, args)?
            }
            Expr::Unary { op, arg } => self.eval_unary(op, arg, env)?,
            Expr::Update { op, prefix, arg } => {
                let place = self.place(arg, env)?;
                let old = self.read_place(&place, env)?.to_number();
                let new = if *op == "++" { old + 1.0 } else { old - 1.0 };
                self.write_place(&place, JsValue::Number(new), env)?;
                JsValue::Number(if *prefix { new } else { old })
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                self.binary(op, &l, &r)?
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left, env)?;
                let short = match *op {
                    "&&" => !l.truthy(),
                    "||" => l.truthy(),
                    _ => !l.is_nullish(),
                };
                if short {
                    l
                } else {
                    self.eval(right, env)?
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.place(target, env)?;
                let v = if *op == "=" {
                    self.eval(value, env)?
                } else {
                    let old = self.read_place(&place, env)?;
                    let r = self.eval(value, env)?;
                    self.binary(op.trim_end_matches('='), &old, &r)?
                };
                self.write_place(&place, v.clone(), env)?;
                v
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)?
                } else {
                    self.eval(alternate, env)?
                }
            }
            Expr::Sequence(items) => {
                let mut last = JsValue::Undefined;
                for item in items {
                    last = self.eval(item, env)?;
                }
                last
            }
            Expr::Function { name, params, body } => {
                let scope = env.child();
                let f = self.make_closure(name.clone(), params, body, &scope);
                if let Some(name) = name {
                    scope.declare(name.clone(), f.clone());
                }
                f
            }
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = exprs.get(i) {
                        out.push_str(&self.eval(e, env)?.to_js_string());
                    }
                }
                JsValue::string(out)
            }
        })
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Step<Vec<JsValue>> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.eval(a, env)?);
        }
        Ok(out)
    }

    fn eval_object(&mut self, props: &[Property], env: &Env) -> Step<JsValue> {
        let object = self.new_object(Vec::new());
        for prop in props {
            let key = match &prop.key {
                PropKey::Ident(k) | PropKey::Str(k) => k.clone(),
                PropKey::Computed(e) => self.eval(e, env)?.to_key(),
            };
            let value = match &prop.value {
                PropValue::Value(e) => self.eval(e, env)?,
                PropValue::Method { params, body } => {
                    self.make_closure(Some(key.clone()), params, body, env)
                }
            };
            if let Some(o) = object.as_object() {
                o.borrow_mut().set_own(&key, value);
            }
        }
        Ok(object)
    }

    fn member_key(&mut self, property: &Expr, computed: bool, env: &Env) -> Step<String> {
        match (computed, property) {
            (false, Expr::Ident(name)) => Ok(name.clone()),
            (_, e) => Ok(self.eval(e, env)?.to_key()),
        }
    }

    fn eval_unary(&mut self, op: &str, arg: &Expr, env: &Env) -> Step<JsValue> {
        match op {
            "delete" => {
                if let Expr::Member {
                    object,
                    property,
                    computed,
                } = arg
                {
                    let target = self.eval(object, env)?;
                    let key = self.member_key(property, *computed, env)?;
                    if let JsValue::Object(o) = &target {
                        o.borrow_mut().remove(&key);
                    }
                }
                Ok(JsValue::Bool(true))
            }
            "typeof" => {
                if let Expr::Ident(name) = arg {
                    if env.get(name).is_none() {
                        return Ok(JsValue::string("undefined"));
                    }
                }
                Ok(JsValue::string(self.eval(arg, env)?.type_of()))
            }
            _ => {
                let v = self.eval(arg, env)?;
                Ok(match op {
                    "!" => JsValue::Bool(!v.truthy()),
                    "-" => JsValue::Number(-v.to_number()),
                    "+" => JsValue::Number(v.to_number()),
                    "~" => JsValue::Number(f64::from(!v.to_int32())),
                    "void" => JsValue::Undefined,
                    other => {
                        return fatal("EVAL008", format!("unsupported unary operator {}", other))
                    }
                })
            }
        }
    }

    pub(crate) fn binary(&mut self, op: &str, l: &JsValue, r: &JsValue) -> Step<JsValue> {
        let num = |f: fn(f64, f64) -> f64| JsValue::Number(f(l.to_number(), r.to_number()));
        Ok(match op {
            "+" => {
                let stringy = |v: &JsValue| matches!(v, JsValue::String(_) | JsValue::Object(_));
                if stringy(l) || stringy(r) {
                    JsValue::string(format!("{}{}", l.to_js_string(), r.to_js_string()))
                } else {
                    num(|a, b| a + b)
                }
            }
            "-" => num(|a, b| a - b),
            "*" => num(|a, b| a * b),
            "/" => num(|a, b| a / b),
            "%" => num(|a, b| a % b),
            "**" => num(f64::powf),
            "===" => JsValue::Bool(strict_equals(l, r)),
            "!==" => JsValue::Bool(!strict_equals(l, r)),
            "==" => JsValue::Bool(loose_equals(l, r)),
            "!=" => JsValue::Bool(!loose_equals(l, r)),
            "<" | ">" | "<=" | ">=" => {
                let ordering = match (l, r) {
                    (JsValue::String(a), JsValue::String(b)) => Some(utf16(a).cmp(&utf16(b))),
                    _ => l.to_number().partial_cmp(&r.to_number()),
                };
                JsValue::Bool(match ordering {
                    None => false,
                    Some(o) => match op {
                        "<" => o.is_lt(),
                        ">" => o.is_gt(),
                        "<=" => o.is_le(),
                        _ => o.is_ge(),
                    },
                })
            }
            "&" => JsValue::Number(f64::from(l.to_int32() & r.to_int32())),
            "|" => JsValue::Number(f64::from(l.to_int32() | r.to_int32())),
            "^" => JsValue::Number(f64::from(l.to_int32() ^ r.to_int32())),
            "<<" => JsValue::Number(f64::from(l.to_int32().wrapping_shl(r.to_uint32() & 31))),
            ">>" => JsValue::Number(f64::from(l.to_int32() >> (r.to_uint32() & 31))),
            ">>>" => JsValue::Number(f64::from(l.to_uint32() >> (r.to_uint32() & 31))),
            "in" => {
                let key = l.to_key();
                JsValue::Bool(self.has_property(r, &key)?)
            }
            "instanceof" => {
                let prototype = self.get(r, "prototype")?;
                let mut current = l.as_object().and_then(|o| o.borrow().proto.clone());
                let mut found = false;
                while let Some(object) = current {
                    if let JsValue::Object(p) = &prototype {
                        if Rc::ptr_eq(p, &object) {
                            found = true;
                            break;
                        }
                    }
                    current = object.borrow().proto.clone();
                }
                JsValue::Bool(found)
            }
            other => return fatal("EVAL008", format!("unsupported binary operator {}", other)),
        })
    }

    fn has_property(&mut self, object: &JsValue, key: &str) -> Step<bool> {
        let JsValue::Object(o) = object else {
            return fatal("EVAL004", format!("cannot use 'in' to search for {}", key));
        };
        let mut current = Some(Rc::clone(o));
        while let Some(obj) = current {
            if obj.borrow().has_own(key) {
                return Ok(true);
            }
            current = obj.borrow().proto.clone();
        }
        Ok(false)
    }

    fn place(&mut self, target: &Expr, env: &Env) -> Step<Place> {
        match target {
            Expr::Ident(name) => Ok(Place::Var(name.clone())),
            Expr::Member {
                object,
                property,
                computed,
            } => {
                let object = self.eval(object, env)?;
                let key = self.member_key(property, *computed, env)?;
                Ok(Place::Prop(object, key))
            }
            other => fatal(
                "EVAL005",
                format!("invalid assignment target {}", print_expr(other)),
            ),
        }
    }

    fn read_place(&mut self, place: &Place, env: &Env) -> Step<JsValue> {
        match place {
            Place::Var(name) => env
                .get(name)
                .map(Ok)
                .unwrap_or_else(|| fatal("EVAL002", format!("{} is not defined", name))),
            Place::Prop(object, key) => self.get(object, key),
        }
    }

    fn write_place(&mut self, place: &Place, value: JsValue, env: &Env) -> Step<()> {
        match place {
            Place::Var(name) => {
                env.assign(name, value);
                Ok(())
            }
            Place::Prop(object, key) => self.put(object, key, value),
        }
    }

    /// プロパティの読み出し。プリミティブは対応する原型から探す。
    pub(crate) fn get(&mut self, target: &JsValue, key: &str) -> Step<JsValue> {
        let start = match target {
            JsValue::Undefined | JsValue::Null => {
                return fatal(
                    "EVAL004",
                    format!("cannot read property '{}' of {}", key, target.to_js_string()),
                )
            }
            JsValue::String(s) => {
                if key == "length" {
                    return Ok(JsValue::Number(utf16(s).len() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(utf16(s)
                        .get(i)
                        .map(|u| JsValue::string(from_utf16(&[*u])))
                        .unwrap_or(JsValue::Undefined));
                }
                Rc::clone(&self.protos.string)
            }
            JsValue::Number(_) => Rc::clone(&self.protos.number),
            JsValue::Bool(_) => Rc::clone(&self.protos.boolean),
            JsValue::Object(o) => {
                let lazy_prototype = {
                    let object = o.borrow();
                    match &object.kind {
                        ObjectKind::Array(items) => {
                            if key == "length" {
                                return Ok(JsValue::Number(items.len() as f64));
                            }
                            if let Some(i) = array_index(key) {
                                return Ok(items.get(i).cloned().unwrap_or(JsValue::Undefined));
                            }
                            false
                        }
                        ObjectKind::Function(_) | ObjectKind::Native { .. } => {
                            key == "prototype" && object.own(key).is_none()
                        }
                        _ => false,
                    }
                };
                if lazy_prototype {
                    let prototype = self.new_object(vec![("constructor", target.clone())]);
                    o.borrow_mut().set_own("prototype", prototype.clone());
                    return Ok(prototype);
                }
                Rc::clone(o)
            }
        };
        let mut current = Some(start);
        while let Some(object) = current {
            let slot = object.borrow().own(key).cloned();
            match slot {
                Some(Slot::Data(v)) => return Ok(v),
                Some(Slot::Accessor { get: Some(getter), .. }) => {
                    return self.call(getter, target.clone(), Vec::new())
                }
                Some(Slot::Accessor { get: None, .. }) => return Ok(JsValue::Undefined),
                None => {}
            }
            current = object.borrow().proto.clone();
        }
        Ok(JsValue::Undefined)
    }

    /// プロパティの書き込み。配列の `length` と添字は要素列を直接伸縮する。
    pub(crate) fn put(&mut self, target: &JsValue, key: &str, value: JsValue) -> Step<()> {
        let o = match target {
            JsValue::Object(o) => Rc::clone(o),
            JsValue::Undefined | JsValue::Null => {
                return fatal(
                    "EVAL004",
                    format!("cannot set property '{}' of {}", key, target.to_js_string()),
                )
            }
            _ => return Ok(()),
        };
        {
            let mut object = o.borrow_mut();
            if let ObjectKind::Array(items) = &mut object.kind {
                if key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 {
                        let error = JsValue::string("RangeError: Invalid array length");
                        return Err(Fault::Throw(error));
                    }
                    items.resize(len as usize, JsValue::Undefined);
                    return Ok(());
                }
                if let Some(i) = array_index(key) {
                    if i >= items.len() {
                        items.resize(i + 1, JsValue::Undefined);
                    }
                    items[i] = value;
                    return Ok(());
                }
            }
        }
        let mut current = Some(Rc::clone(&o));
        while let Some(object) = current {
            let slot = object.borrow().own(key).cloned();
            if let Some(Slot::Accessor { set, .. }) = slot {
                if let Some(setter) = set {
                    self.call(setter, target.clone(), vec![value])?;
                }
                return Ok(());
            }
            if slot.is_some() {
                break;
            }
            current = object.borrow().proto.clone();
        }
        o.borrow_mut().set_own(key, value);
        Ok(())
    }

    /// 関数の呼び出し。
    pub(crate) fn call(&mut self, f: JsValue, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
        if self.depth >= MAX_DEPTH {
            return fatal("EVAL006", "maximum call stack size exceeded");
        }
        self.depth += 1;
        let result = self.call_inner(f, this, args);
        self.depth -= 1;
        result
    }

    fn call_inner(&mut self, f: JsValue, this: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
        enum Callee {
            Closure(Rc<Closure>),
            Native(NativeFn),
            Bound(JsValue, JsValue, Vec<JsValue>),
        }
        let callee = match &f {
            JsValue::Object(o) => match &o.borrow().kind {
                ObjectKind::Function(c) => Callee::Closure(Rc::clone(c)),
                ObjectKind::Native { func, .. } => Callee::Native(*func),
                ObjectKind::Bound { target, this, args } => {
                    Callee::Bound(target.clone(), this.clone(), args.clone())
                }
                _ => return fatal("EVAL003", "object is not a function"),
            },
            other => {
                return fatal(
                    "EVAL003",
                    format!("{} is not a function", other.to_js_string()),
                )
            }
        };
        match callee {
            Callee::Native(func) => func(self, this, args),
            Callee::Bound(target, bound_this, mut bound_args) => {
                bound_args.extend(args);
                self.call(target, bound_this, bound_args)
            }
            Callee::Closure(closure) => {
                let env = closure.env.child();
                env.declare("this", this);
                for (i, param) in closure.params.iter().enumerate() {
                    env.declare(param.clone(), arg(&args, i));
                }
                match self.run_body(&closure.body, &env)? {
                    Flow::Return(v) => Ok(v),
                    _ => Ok(JsValue::Undefined),
                }
            }
        }
    }

    /// `new f(args)`
    pub(crate) fn construct(&mut self, f: JsValue, args: Vec<JsValue>) -> Step<JsValue> {
        let prototype = match self.get(&f, "prototype")? {
            JsValue::Object(p) => p,
            _ => Rc::clone(&self.protos.object),
        };
        let this = JsValue::object(JsObject::new(ObjectKind::Ordinary, Some(prototype)));
        let result = self.call(f, this.clone(), args)?;
        Ok(match result {
            JsValue::Object(_) => result,
            _ => this,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::Program;

    fn run(body: Vec<Stmt>) -> Interpreter {
        let mut interp = Interpreter::new();
        interp.run_program(&Program { body }).expect("run");
        interp
    }

    fn append_log(text: &str) -> Stmt {
        Stmt::expr(Expr::assign("+=", Expr::ident("log"), Expr::str_lit(text)))
    }

    #[test]
    /// switch はケースから下へ落ち、break で抜ける
    fn switch_falls_through() {
        let body = vec![
            Stmt::var(VarKind::Let, "log", Some(Expr::str_lit(""))),
            Stmt::Switch {
                discriminant: Expr::num(1.0),
                cases: vec![
                    SwitchCase {
                        test: Some(Expr::num(0.0)),
                        body: vec![append_log("a")],
                    },
                    SwitchCase {
                        test: Some(Expr::num(1.0)),
                        body: vec![append_log("b")],
                    },
                    SwitchCase {
                        test: Some(Expr::num(2.0)),
                        body: vec![
                            append_log("c"),
                            Stmt::Break,
                        ],
                    },
                    SwitchCase {
                        test: None,
                        body: vec![append_log("d")],
                    },
                ],
            },
        ];
        let interp = run(body);
        assert_eq!(interp.global("log").expect("log").as_str(), Some("bc"));
    }

    #[test]
    /// 投げた値は catch で受け取れる
    fn try_catch_receives_thrown_value() {
        let body = vec![
            Stmt::var(VarKind::Let, "caught", None),
            Stmt::Try {
                block: vec![Expr::throw_new("RangeError", "boom")],
                handler: Some((
                    "e".into(),
                    vec![Stmt::expr(Expr::assign(
                        "=",
                        Expr::ident("caught"),
                        Expr::member(Expr::ident("e"), "message"),
                    ))],
                )),
                finalizer: None,
            },
        ];
        let interp = run(body);
        assert_eq!(interp.global("caught").expect("caught").as_str(), Some("boom"));
    }

    #[test]
    /// 捕まらない例外は EVAL001
    fn uncaught_throw_is_error() {
        let mut interp = Interpreter::new();
        let program = Program {
            body: vec![Expr::throw_new("TypeError", "bad")],
        };
        let err = interp.run_program(&program).expect_err("throw");
        assert_eq!(err.code(), "EVAL001");
        assert!(err.0.msg.contains("TypeError: bad"));
    }

    #[test]
    /// 未定義の変数は捕捉できないエラー
    fn undefined_variable_is_fatal() {
        let mut interp = Interpreter::new();
        let program = Program {
            body: vec![Stmt::expr(Expr::call(Expr::ident("nope"), vec![]))],
        };
        let err = interp.run_program(&program).expect_err("undefined");
        assert_eq!(err.code(), "EVAL002");
    }

    #[test]
    /// 配列の添字書き込みは末尾を伸ばし、delete はオブジェクトのキーを消す
    fn array_and_object_mutation() {
        let body = vec![
            Stmt::var(VarKind::Const, "a", Some(Expr::Array(vec![Expr::num(1.0)]))),
            Stmt::expr(Expr::assign(
                "=",
                Expr::index(Expr::ident("a"), Expr::num(1.0)),
                Expr::num(2.0),
            )),
            Stmt::var(
                VarKind::Const,
                "o",
                Some(Expr::Object(vec![Property::field("k", Expr::num(1.0))])),
            ),
            Stmt::expr(Expr::unary("delete", Expr::member(Expr::ident("o"), "k"))),
        ];
        let mut interp = run(body);
        let a = interp.global("a").expect("a");
        assert_eq!(a.array_items().map(|v| v.len()), Some(2));
        let o = interp.global("o").expect("o");
        assert!(interp.property(&o, "k").expect("k").is_undefined());
    }
}
