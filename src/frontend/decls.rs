// パス: src/frontend/decls.rs
// 役割: struct / enum / class / protocol 宣言を型構築子とプロトコル定義として登録する
// 意図: 本体の翻訳より先に名前付き型を型表へ載せ、copy・既定値・メンバー関数を宣言から組み立てる
// 関連ファイル: src/frontend/mod.rs, src/frontend/callables.rs, src/reified.rs, src/builtins/protocols.rs
//! 名前付き型の宣言
//!
//! - struct: 格納プロパティをキーに持つオブジェクト。格納プロパティが一つならその値そのもの。
//! - enum: 中身を持たない case だけなら case の番号（数値）、そうでなければ `[番号, 中身...]` の配列。
//! - class: JavaScript のクラス。参照の意味論なので copy を持たず、計算プロパティはクラスの getter。
//!
//! 型の表は最初に具象化されたときに宣言から組み立て、以後は同じ表を返す。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ast::Term;
use crate::builtins::common::{call_method, constant, method, split};
use crate::builtins::optional::{empty_optional, wrap_in_optional};
use crate::builtins::protocols::ProtocolDefinition;
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::{
    functionize, inline_or_emit, emit_function, wrapped, Args, FunctionBuilder, FunctionEntry,
};
use crate::js::{ClassMember, Expr, MethodKind, Property, Stmt, VarKind};
use crate::reified::{
    build_conformances, constructor, copy_value, default_instantiate, expression_skips_copy,
    reify_type, EnumCase, Field, FunctionMap, GetterFn, PossibleRepresentation, ReifiedType,
};
use crate::scope::{mangle_name, ScopeId};
use crate::types::{parse_type, Type};
use crate::values::{
    array, binary, conditional, copy, expr, field, logical, member, read, reuse, statements, Value,
};

use super::callables::{
    apply_parameter_mappings, body_of, function_builder, function_shape, FunctionShape,
};
use super::exprs::translate_value;
use super::translate_statements;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NominalKind {
    Struct,
    Enum,
    Class,
}

impl NominalKind {
    pub fn of(term_name: &str) -> Option<Self> {
        match term_name {
            "struct_decl" => Some(NominalKind::Struct),
            "enum_decl" => Some(NominalKind::Enum),
            "class_decl" => Some(NominalKind::Class),
            _ => None,
        }
    }
}

/// 宣言と extension の項、組み立て済みの表。
pub(crate) struct Nominal {
    pub kind: NominalKind,
    pub name: String,
    pub terms: RefCell<Vec<Rc<Term>>>,
    cache: RefCell<Option<Rc<ReifiedType>>>,
    building: Cell<bool>,
}

impl Nominal {
    pub fn new(kind: NominalKind, name: String, decl: Rc<Term>) -> Rc<Self> {
        Rc::new(Self {
            kind,
            name,
            terms: RefCell::new(vec![decl]),
            cache: RefCell::new(None),
            building: Cell::new(false),
        })
    }

    fn self_type(&self) -> Type {
        Type::name(self.name.clone())
    }

    /// 宣言の型引数（`inherits:`）。
    fn inherits(&self) -> Vec<String> {
        let mut out = Vec::new();
        for term in self.terms.borrow().iter() {
            for item in term.list("inherits") {
                for part in item.split(',') {
                    let part = part.trim();
                    if !part.is_empty() && !out.iter().any(|p| p == part) {
                        out.push(part.to_string());
                    }
                }
            }
        }
        out
    }

    fn is_public(&self) -> bool {
        self.terms
            .borrow()
            .first()
            .and_then(|t| t.string("access").map(|a| a == "public" || a == "open"))
            .unwrap_or(false)
    }
}

/// 型の表を返す。初回は宣言から組み立てる。
fn reify_nominal(ctx: &mut Context, nominal: &Rc<Nominal>) -> CResult<Rc<ReifiedType>> {
    if let Some(cached) = nominal.cache.borrow().clone() {
        return Ok(cached);
    }
    if nominal.building.replace(true) {
        return Err(CompileError::new(
            "TRM040",
            format!("{} refers to itself while its layout is being built", nominal.name),
        ));
    }
    log::debug!("building layout for {}", nominal.name);
    let result = match nominal.kind {
        NominalKind::Struct => build_struct(ctx, nominal),
        NominalKind::Enum => build_enum(ctx, nominal),
        NominalKind::Class => build_class(ctx, nominal),
    };
    nominal.building.set(false);
    let reified = Rc::new(result?);
    *nominal.cache.borrow_mut() = Some(reified.clone());
    Ok(reified)
}

/// 名前付き型を型表に登録する。
pub(crate) fn register_nominal(ctx: &mut Context, nominal: Rc<Nominal>) -> CResult<()> {
    if nominal.kind == NominalKind::Class {
        let root = ctx.root();
        ctx.declare(root, &mangle_name(&nominal.name), None)?;
    }
    let name = nominal.name.clone();
    ctx.types.insert(
        name,
        constructor(move |ctx, _, _| reify_nominal(ctx, &nominal)),
    );
    Ok(())
}

/// プロトコル宣言を登録する。要件の関数名だけを持ち、既定実装は持たない。
pub(crate) fn register_protocol(ctx: &mut Context, term: &Term) -> CResult<()> {
    let name = term
        .args
        .first()
        .cloned()
        .ok_or_else(|| CompileError::new("TRM041", "protocol_decl without a name"))?;
    let requirements = term
        .list("inherits")
        .iter()
        .flat_map(|item| item.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && p != "AnyObject" && p != "class")
        .collect();
    let mut functions = Vec::new();
    for child in &term.children {
        match child.name.as_str() {
            "func_decl" | "var_decl" => {
                if let Some(member) = child.args.first() {
                    functions.push((member.clone(), None));
                }
            }
            _ => {}
        }
    }
    log::debug!("protocol {} with {} requirements", name, functions.len());
    ctx.protocols.insert(
        name.clone(),
        Rc::new(ProtocolDefinition {
            name,
            requirements,
            functions,
        }),
    );
    Ok(())
}

#[derive(Clone)]
struct StoredField {
    name: String,
    ty: Type,
    initializer: Option<Rc<Term>>,
}

struct ComputedProperty {
    name: String,
    ty: Type,
    body: Rc<Term>,
    is_static: bool,
}

struct CaseInfo {
    name: String,
    full_name: String,
    field_types: Vec<Type>,
    raw: Option<Rc<Term>>,
}

#[derive(Default)]
struct Members {
    stored: Vec<StoredField>,
    static_stored: Vec<StoredField>,
    computed: Vec<ComputedProperty>,
    methods: Vec<Rc<Term>>,
    constructors: Vec<Rc<Term>>,
    cases: Vec<CaseInfo>,
}

/// パターンが束縛する名前。
fn pattern_name(term: &Term) -> Option<String> {
    match term.name.as_str() {
        "pattern_named" => term.args.first().cloned(),
        "pattern_typed" | "pattern_let" | "pattern_var" | "pattern_paren" => {
            term.children.first().and_then(pattern_name)
        }
        _ => None,
    }
}

fn is_getter(term: &Term) -> bool {
    (term.name == "accessor_decl" || term.name == "func_decl")
        && !term.has_flag("implicit")
        && (term.property("get_for").is_some()
            || term.property("getter_for").is_some()
            || term.has_flag("getter")
            || term.has_flag("get"))
}

/// 計算プロパティの getter 本体。
fn getter_body(var: &Term) -> Option<&Term> {
    if let Some(body) = var.find_child("brace_stmt") {
        return Some(body);
    }
    var.children.iter().find(|c| is_getter(c)).and_then(body_of)
}

fn var_type(term: &Term) -> CResult<Type> {
    match term.string("type").or_else(|| term.string("interface type")) {
        Some(text) => Ok(parse_type(text)?),
        None => Err(CompileError::new(
            "TRM042",
            format!("var_decl {:?} without a type", term.args.first()),
        )),
    }
}

fn element_name(raw: &str) -> String {
    raw.split('(').next().unwrap_or(raw).to_string()
}

fn case_info(term: &Term) -> CResult<CaseInfo> {
    let raw_name = term
        .args
        .first()
        .ok_or_else(|| CompileError::new("TRM043", "enum_element_decl without a name"))?;
    let field_types = match term.string("interface type") {
        Some(text) => {
            let ty = parse_type(text)?;
            match ty.as_function().and_then(|f| f.ret.as_function()) {
                Some(payload) => payload.arguments.iter().map(|t| t.unmodified().clone()).collect(),
                None => Vec::new(),
            }
        }
        None => Vec::new(),
    };
    let raw = term
        .children
        .iter()
        .find(|c| c.name.ends_with("_literal_expr"))
        .map(|c| Rc::new(c.clone()));
    Ok(CaseInfo {
        name: element_name(raw_name),
        full_name: raw_name.clone(),
        field_types,
        raw,
    })
}

fn collect_members(nominal: &Nominal) -> CResult<Members> {
    let mut members = Members::default();
    let mut initializers: Vec<(String, Rc<Term>)> = Vec::new();
    let terms = nominal.terms.borrow().clone();
    for decl in &terms {
        for child in &decl.children {
            match child.name.as_str() {
                "pattern_binding_decl" => {
                    let mut iter = child.children.iter().peekable();
                    while let Some(pattern) = iter.next() {
                        let init = match iter.peek() {
                            Some(next) if !next.name.starts_with("pattern") => iter.next(),
                            _ => None,
                        };
                        if let (Some(name), Some(init)) = (pattern_name(pattern), init) {
                            initializers.push((name, Rc::new(init.clone())));
                        }
                    }
                }
                "var_decl" => {
                    let name = child
                        .args
                        .first()
                        .cloned()
                        .ok_or_else(|| CompileError::new("TRM042", "var_decl without a name"))?;
                    let ty = var_type(child)?;
                    let is_static = child.has_flag("static") || child.has_flag("type");
                    let computed_impl = child
                        .string("readImpl")
                        .map(|r| r != "stored")
                        .unwrap_or(false);
                    match getter_body(child) {
                        Some(body) => members.computed.push(ComputedProperty {
                            name,
                            ty,
                            body: Rc::new(body.clone()),
                            is_static,
                        }),
                        None if computed_impl => {
                            return Err(CompileError::new(
                                "TRM044",
                                format!("Could not find the getter for {}", name),
                            ))
                        }
                        None => {
                            let field = StoredField {
                                name,
                                ty,
                                initializer: None,
                            };
                            if is_static {
                                members.static_stored.push(field);
                            } else {
                                members.stored.push(field);
                            }
                        }
                    }
                }
                "func_decl" => members.methods.push(Rc::new(child.clone())),
                "constructor_decl" => members.constructors.push(Rc::new(child.clone())),
                "enum_case_decl" | "enum_element_decl" => {
                    let elements: Vec<&Term> = if child.name == "enum_case_decl" {
                        child.children_named("enum_element_decl").collect()
                    } else {
                        vec![child]
                    };
                    for element in elements {
                        let info = case_info(element)?;
                        if !members.cases.iter().any(|c| c.name == info.name) {
                            members.cases.push(info);
                        }
                    }
                }
                "destructor_decl" => {
                    if body_of(child).map(|b| !b.children.is_empty()).unwrap_or(false) {
                        log::warn!("deinit of {} is not translated", nominal.name);
                    }
                }
                "struct_decl" | "enum_decl" | "class_decl" => {
                    log::warn!("nested type in {} is not supported", nominal.name);
                }
                _ => {}
            }
        }
    }
    for (name, init) in initializers {
        for field in members.stored.iter_mut().chain(members.static_stored.iter_mut()) {
            if field.name == name {
                field.initializer = Some(init.clone());
            }
        }
    }
    Ok(members)
}

/// 関数宣言のキー（出力される関数名の元）。
fn member_key(type_name: &str, member: &str) -> String {
    format!("{}.{}", type_name, member)
}

/// メソッドを関数表に加える。
fn add_methods(functions: &mut FunctionMap, type_name: &str, members: &Members) -> CResult<()> {
    for method_term in &members.methods {
        let body = match body_of(method_term) {
            Some(body) => Rc::new(body.clone()),
            None => continue,
        };
        let shape = Rc::new(function_shape(method_term, true)?);
        let arity = Some(shape.arity());
        let key = member_key(type_name, &shape.name);
        let name = shape.name.clone();
        functions.insert(
            name,
            FunctionEntry::Plain(inline_or_emit(key, arity, function_builder(shape, body))),
        );
    }
    Ok(())
}

fn getter_builder(type_name: &str, property: &ComputedProperty) -> FunctionBuilder {
    let shape = Rc::new(FunctionShape {
        name: property.name.clone(),
        params: Vec::new(),
        generics: Vec::new(),
        has_self: !property.is_static,
        member: true,
    });
    let arity = Some(shape.arity());
    let key = member_key(type_name, &property.name);
    inline_or_emit(key, arity, function_builder(shape, property.body.clone()))
}

/// 計算プロパティ（インスタンスはフィールド、静的は関数表の getter）。
fn add_computed(
    fields: &mut Vec<Field>,
    functions: &mut FunctionMap,
    type_name: &str,
    members: &Members,
) {
    for property in &members.computed {
        let builder = getter_builder(type_name, property);
        if property.is_static {
            functions.insert(
                property.name.clone(),
                FunctionEntry::Property {
                    get: builder,
                    set: None,
                },
            );
            continue;
        }
        let name = property.name.clone();
        let getter: GetterFn = Rc::new(move |ctx, scope, target| {
            builder(ctx, scope, &Args::Values(&[target]), &name)
        });
        fields.push(Field::computed(property.name.clone(), property.ty.clone(), getter));
    }
}

/// 静的な格納プロパティは最初の参照でルートの `let` として出力される。
fn add_static_stored(functions: &mut FunctionMap, type_name: &str, members: &Members) {
    for field_info in &members.static_stored {
        let stored = field_info.clone();
        let key = member_key(type_name, &field_info.name);
        functions.insert(
            field_info.name.clone(),
            FunctionEntry::Property {
                get: Rc::new(move |ctx, _, _, _| {
                    let stored = stored.clone();
                    let ident = ctx.emit_helper(&key, move |ctx, ident| {
                        let root = ctx.root();
                        let value = field_value(ctx, root, &stored, &mut |_| None)?;
                        let e = read(ctx, root, value)?;
                        Ok(Stmt::var(VarKind::Let, ident, Some(e)))
                    })?;
                    Ok(Value::ident(ident))
                }),
                set: None,
            },
        );
    }
}

/// 格納プロパティの値を決める: 引数 → 初期化子 → 型の既定値。
fn field_value(
    ctx: &mut Context,
    scope: ScopeId,
    field: &StoredField,
    consume: &mut dyn FnMut(&str) -> Option<Expr>,
) -> CResult<Value> {
    if let Some(e) = consume(&field.name) {
        return Ok(expr(e));
    }
    if let Some(init) = &field.initializer {
        let value = translate_value(ctx, scope, init, &mut None)?;
        return Ok(copy(value, field.ty.clone()));
    }
    default_instantiate(ctx, scope, &field.ty, &mut |_| None)
}

fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `...; return ident` の形なら前置きの文と識別子に分ける。
fn returned_ident(value: Value) -> Result<(Vec<Stmt>, String), Value> {
    match value {
        Value::Statements(mut stmts) => match stmts.pop() {
            Some(Stmt::Return(Some(Expr::Ident(ident)))) => Ok((stmts, ident)),
            last => {
                stmts.extend(last);
                Err(Value::Statements(stmts))
            }
        },
        other => Err(other),
    }
}

/// イニシャライザの関数項目。
fn constructor_entry(
    nominal: &Rc<Nominal>,
    term: &Rc<Term>,
) -> CResult<(String, FunctionEntry)> {
    let shape = Rc::new(function_shape(term, true)?);
    let failable = term
        .string("interface type")
        .or_else(|| term.string("type"))
        .and_then(|text| parse_type(text).ok())
        .and_then(|ty| {
            let f = ty.as_function()?.clone();
            let ret = match f.ret.as_function() {
                Some(inner) => inner.ret.clone(),
                None => f.ret,
            };
            Some(matches!(*ret, Type::Optional(_)))
        })
        .unwrap_or(false);
    let body = body_of(term).map(|b| Rc::new(b.clone()));
    let self_type = nominal.self_type();
    let type_name = nominal.name.clone();
    let name = shape.name.clone();
    let arity = Some(shape.arity());
    let builder: FunctionBuilder = Rc::new(move |ctx, scope, args, display| {
        let inner = ctx.new_inline_scope(display, scope);
        let mut prefix = apply_parameter_mappings(ctx, inner, &shape.params, args, 0)?;
        let body = match &body {
            Some(body) => body.clone(),
            None => {
                // 暗黙のメンバーごとのイニシャライザ
                let mut provided = Vec::new();
                for param in &shape.params {
                    let value = ctx.lookup(inner, &param.name);
                    let value = copy(value, param.ty.unmodified().clone());
                    provided.push((param.name.clone(), read(ctx, inner, value)?));
                }
                let mut consume = |name: &str| {
                    provided
                        .iter()
                        .position(|(n, _)| n == name)
                        .map(|i| provided.remove(i).1)
                };
                let value = default_instantiate(ctx, inner, &self_type, &mut consume)?;
                let tail = read(ctx, inner, value)?;
                prefix.push(Stmt::ret(tail));
                return Ok(statements(ctx.emit_scope(inner, prefix)));
            }
        };
        // 先頭の `self.x = ...` は既定値の組み立てに取り込む
        let mut assigned: Vec<(String, Expr)> = Vec::new();
        let mut consumed = 0;
        for stmt in &body.children {
            let (dest, source) = match (stmt.name.as_str(), stmt.children.as_slice()) {
                ("assign_expr", [dest, source]) if dest.name == "member_ref_expr" => (dest, source),
                _ => break,
            };
            let is_self = dest
                .children
                .first()
                .and_then(|c| c.string("decl"))
                .map(|d| d.contains(".self@"))
                .unwrap_or(false);
            let field_name = dest
                .string("decl")
                .and_then(|d| crate::ast::declaration::parse_declaration(d).ok())
                .and_then(|d| d.local.or(d.member));
            let field_name = match (is_self, field_name) {
                (true, Some(name)) => name,
                _ => break,
            };
            let value = translate_value(ctx, inner, source, &mut None)?;
            let ty = source.ty().unwrap_or_else(|_| Type::void());
            let value = copy(value, ty);
            let e = match value {
                Value::Statements(_) => break,
                other => read(ctx, inner, other)?,
            };
            assigned.push((field_name, e));
            consumed += 1;
        }
        let mut consume = |name: &str| {
            assigned
                .iter()
                .position(|(n, _)| n == name)
                .map(|i| assigned.remove(i).1)
        };
        let initial = default_instantiate(ctx, inner, &self_type, &mut consume)?;
        let self_value = match returned_ident(initial) {
            Ok((head, ident)) => {
                prefix.extend(head);
                Value::ident(ident)
            }
            Err(other) => {
                // 値型の self は本体で書き換えられる
                let ident = ctx.reserve_unique(inner, &camel_case(&type_name))?;
                let e = read(ctx, inner, other)?;
                prefix.push(Stmt::var(VarKind::Let, ident.clone(), Some(e)));
                Value::ident(ident)
            }
        };
        // 取り込まれなかった代入は構築後に行う
        for (field_name, e) in assigned.drain(..) {
            prefix.push(Stmt::expr(Expr::assign(
                "=",
                Expr::member(read(ctx, inner, self_value.clone())?, field_name),
                e,
            )));
        }
        ctx.map_value(inner, "self", self_value.clone());
        if failable {
            ctx.map_value(inner, "$failable", Value::Type(self_type.clone()));
        }
        prefix.extend(translate_statements(ctx, inner, &body.children[consumed..])?);
        let result = if failable {
            wrap_in_optional(ctx, inner, self_value, &self_type)?
        } else {
            self_value
        };
        let tail = read(ctx, inner, result)?;
        prefix.push(Stmt::ret(tail));
        Ok(statements(ctx.emit_scope(inner, prefix)))
    });
    let key = member_key(&nominal.name, &name);
    Ok((name, FunctionEntry::Plain(inline_or_emit(key, arity, builder))))
}

fn add_constructors(
    functions: &mut FunctionMap,
    nominal: &Rc<Nominal>,
    members: &Members,
) -> CResult<()> {
    for term in &members.constructors {
        let (name, entry) = constructor_entry(nominal, term)?;
        functions.insert(name, entry);
    }
    Ok(())
}

fn conformances_for(
    ctx: &Context,
    nominal: &Nominal,
    extra: &[&str],
) -> Vec<(String, crate::reified::ProtocolConformance)> {
    let mut names = nominal.inherits();
    for name in extra {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    let explicit = names
        .iter()
        .filter(|n| ctx.protocols.contains_key(n.as_str()))
        .map(|n| (n.as_str(), FunctionMap::new()))
        .collect();
    build_conformances(ctx, &Value::Type(nominal.self_type()), explicit)
}

/// フィールドごとの `==` を `&&` で結ぶ。
fn memberwise_equals(fields: Rc<Vec<StoredField>>) -> FunctionEntry {
    method(&["lhs", "rhs"], move |ctx, scope, args| {
        let [lhs, rhs] = split(args);
        if fields.len() == 1 {
            let parent = Value::Type(fields[0].ty.clone());
            return call_method(ctx, scope, &parent, "==", vec![lhs, rhs]);
        }
        let (lhs_first, lhs_after) = reuse(ctx, scope, lhs, "lhs")?;
        let (rhs_first, rhs_after) = reuse(ctx, scope, rhs, "rhs")?;
        let mut result: Option<Value> = None;
        for (i, field_info) in fields.iter().enumerate() {
            let (l, r) = if i == 0 {
                (lhs_first.clone(), rhs_first.clone())
            } else {
                (lhs_after.clone(), rhs_after.clone())
            };
            let l = field(ctx, scope, l, &field_info.name)?;
            let r = field(ctx, scope, r, &field_info.name)?;
            let parent = Value::Type(field_info.ty.clone());
            let equal = call_method(ctx, scope, &parent, "==", vec![l, r])?;
            result = Some(match result {
                Some(previous) => logical(ctx, scope, "&&", previous, equal)?,
                None => equal,
            });
        }
        Ok(result.unwrap_or_else(|| Value::boolean(true)))
    })
}

fn build_struct(ctx: &mut Context, nominal: &Rc<Nominal>) -> CResult<ReifiedType> {
    let members = collect_members(nominal)?;
    let root = ctx.root();
    let stored = Rc::new(members.stored.clone());
    let representations = match stored.as_slice() {
        [only] => reify_type(ctx, root, &only.ty)?.representations,
        _ => PossibleRepresentation::OBJECT,
    };
    let mut functions = FunctionMap::new();
    add_methods(&mut functions, &nominal.name, &members)?;
    add_constructors(&mut functions, nominal, &members)?;
    add_static_stored(&mut functions, &nominal.name, &members);
    let mut fields: Vec<Field> = stored
        .iter()
        .map(|f| Field::stored(f.name.clone(), f.ty.clone()))
        .collect();
    add_computed(&mut fields, &mut functions, &nominal.name, &members);
    if nominal.inherits().iter().any(|p| p == "Equatable") && !functions.contains_key("==") {
        functions.insert("==".into(), memberwise_equals(stored.clone()));
    }
    let conformances = conformances_for(ctx, nominal, &[]);

    let defaults = stored.clone();
    let copies = stored.clone();
    let reified = ReifiedType::new(nominal.name.clone(), representations)
        .with_functions(functions)
        .with_fields(fields)
        .with_conformances(conformances)
        .with_default(move |ctx, scope, consume| {
            if let [only] = defaults.as_slice() {
                return field_value(ctx, scope, only, consume);
            }
            let mut values = Vec::with_capacity(defaults.len());
            for field_info in defaults.iter() {
                values.push(field_value(ctx, scope, field_info, consume)?);
            }
            let names: Vec<String> = defaults.iter().map(|f| f.name.clone()).collect();
            crate::values::transform_all(ctx, scope, values, &mut |_, _, exprs| {
                Ok(expr(Expr::Object(
                    names
                        .iter()
                        .zip(exprs)
                        .map(|(name, e)| Property::field(name.clone(), e))
                        .collect(),
                )))
            })
        })
        .with_copy(move |ctx, scope, value| {
            if let [only] = copies.as_slice() {
                return copy_value(ctx, scope, value, &only.ty);
            }
            let e = read(ctx, scope, value)?;
            if expression_skips_copy(&e) {
                return Ok(expr(e));
            }
            let (first, after) = reuse(ctx, scope, expr(e), "copySource")?;
            let mut values = Vec::with_capacity(copies.len());
            for (i, field_info) in copies.iter().enumerate() {
                let source = if i == 0 { first.clone() } else { after.clone() };
                let item = field(ctx, scope, source, &field_info.name)?;
                values.push(copy(item, field_info.ty.clone()));
            }
            let names: Vec<String> = copies.iter().map(|f| f.name.clone()).collect();
            crate::values::transform_all(ctx, scope, values, &mut |_, _, exprs| {
                Ok(expr(Expr::Object(
                    names
                        .iter()
                        .zip(exprs)
                        .map(|(name, e)| Property::field(name.clone(), e))
                        .collect(),
                )))
            })
        });
    Ok(reified)
}

/// 生の値（rawValue）の型。`inherits:` の先頭が型表にある非プロトコルの型なら生の値を持つ。
fn raw_type(ctx: &Context, nominal: &Nominal) -> Option<Type> {
    let first = nominal.inherits().into_iter().next()?;
    if ctx.protocols.contains_key(&first) || !ctx.types.contains_key(&first) {
        return None;
    }
    Some(Type::name(first))
}

/// case の生の値。明示がなければ整数は直前から数え上げ、文字列は case 名。
fn raw_values(
    ctx: &mut Context,
    raw: &Type,
    cases: &[CaseInfo],
) -> CResult<Vec<Expr>> {
    let root = ctx.root();
    let is_string = matches!(raw, Type::Name(n) if n == "String" || n == "Character");
    let mut out = Vec::with_capacity(cases.len());
    let mut next = 0.0;
    for case in cases {
        let e = match &case.raw {
            Some(term) => {
                let value = translate_value(ctx, root, term, &mut None)?;
                read(ctx, root, value)?
            }
            None if is_string => Expr::str_lit(case.name.clone()),
            None => Expr::num(next),
        };
        if let Expr::Num(n) = e {
            next = n + 1.0;
        }
        out.push(e);
    }
    Ok(out)
}

fn build_enum(ctx: &mut Context, nominal: &Rc<Nominal>) -> CResult<ReifiedType> {
    let members = collect_members(nominal)?;
    if !members.constructors.is_empty() {
        log::warn!("initializers of enum {} are not translated", nominal.name);
    }
    let self_type = nominal.self_type();
    let has_payload = members.cases.iter().any(|c| !c.field_types.is_empty());
    let representations = if has_payload {
        PossibleRepresentation::ARRAY
    } else {
        PossibleRepresentation::NUMBER
    };
    let mut functions = FunctionMap::new();
    for (index, case) in members.cases.iter().enumerate() {
        let entry = if case.field_types.is_empty() {
            if has_payload {
                constant(expr(Expr::Array(vec![Expr::num(index as f64)])))
            } else {
                constant(Value::num(index as f64))
            }
        } else {
            let field_types = case.field_types.clone();
            FunctionEntry::Plain(wrapped(field_types.len(), move |ctx, scope, values| {
                let mut items = vec![Value::num(index as f64)];
                for (value, ty) in values.into_iter().zip(field_types.iter()) {
                    items.push(copy(value, ty.clone()));
                }
                array(ctx, scope, items)
            }))
        };
        if case.full_name != case.name {
            functions.insert(case.full_name.clone(), entry.clone());
        }
        functions.insert(case.name.clone(), entry);
    }
    add_methods(&mut functions, &nominal.name, &members)?;
    add_static_stored(&mut functions, &nominal.name, &members);

    let mut fields = Vec::new();
    let tag: GetterFn = if has_payload {
        Rc::new(|ctx, scope, target| member(ctx, scope, target, Value::num(0.0)))
    } else {
        Rc::new(|_, _, target| Ok(target))
    };
    fields.push(Field::computed("hashValue", Type::name("Int"), tag.clone()));

    let raw = raw_type(ctx, nominal);
    if let (Some(raw), false) = (&raw, has_payload) {
        let values = raw_values(ctx, raw, &members.cases)?;
        let identity = values
            .iter()
            .enumerate()
            .all(|(i, e)| matches!(e, Expr::Num(n) if *n == i as f64));
        let table = Rc::new(values);
        let lookup = table.clone();
        let getter: GetterFn = Rc::new(move |ctx, scope, target| {
            if identity {
                return Ok(target);
            }
            let index = read(ctx, scope, target)?;
            Ok(expr(Expr::index(Expr::Array((*lookup).clone()), index)))
        });
        fields.push(Field::computed("rawValue", raw.clone(), getter));
        let enum_type = self_type.clone();
        functions.insert(
            "init(rawValue:)".into(),
            FunctionEntry::Plain(wrapped(1, move |ctx, scope, values| {
                let [raw_value] = split(values);
                let (first, after) = reuse(ctx, scope, raw_value, "rawValue")?;
                let mut result = empty_optional(ctx, scope, &enum_type)?;
                for (i, e) in table.iter().enumerate().rev() {
                    let subject = if i == 0 { first.clone() } else { after.clone() };
                    let test = binary(ctx, scope, "===", subject, expr(e.clone()))?;
                    let case = wrap_in_optional(ctx, scope, Value::num(i as f64), &enum_type)?;
                    result = conditional(ctx, scope, test, case, result)?;
                }
                Ok(result)
            })),
        );
    }
    add_computed(&mut fields, &mut functions, &nominal.name, &members);

    let mut extra: Vec<&str> = Vec::new();
    if !has_payload {
        extra.push("Equatable");
        extra.push("Hashable");
        if !functions.contains_key("==") {
            functions.insert(
                "==".into(),
                method(&["lhs", "rhs"], |ctx, scope, args| {
                    let [lhs, rhs] = split(args);
                    binary(ctx, scope, "===", lhs, rhs)
                }),
            );
        }
    }
    let conformances = conformances_for(ctx, nominal, &extra);

    let cases: Vec<EnumCase> = members
        .cases
        .iter()
        .map(|c| EnumCase {
            name: c.name.clone(),
            field_types: c.field_types.clone(),
        })
        .collect();
    let mut reified = ReifiedType::new(nominal.name.clone(), representations)
        .with_functions(functions)
        .with_fields(fields)
        .with_conformances(conformances)
        .with_cases(cases.clone());
    if let Some(first) = members.cases.first() {
        if first.field_types.is_empty() {
            let initial = if has_payload {
                expr(Expr::Array(vec![Expr::num(0.0)]))
            } else {
                Value::num(0.0)
            };
            reified = reified.with_default(move |_, _, _| Ok(initial.clone()));
        }
    }
    if has_payload {
        let copy_name = nominal.name.clone();
        reified = reified.with_copy(move |ctx, scope, value| {
            copy_enum(ctx, scope, &copy_name, &cases, value)
        });
    }
    Ok(reified)
}

/// 中身を持つ enum のコピー。中身に copy を要する case があれば case ごとの分岐関数を出力する。
fn copy_enum(
    ctx: &mut Context,
    scope: ScopeId,
    name: &str,
    cases: &[EnumCase],
    value: Value,
) -> CResult<Value> {
    let e = read(ctx, scope, value)?;
    if expression_skips_copy(&e) {
        return Ok(expr(e));
    }
    let mut needs_copy = Vec::with_capacity(cases.len());
    for case in cases {
        let mut any = false;
        for ty in &case.field_types {
            any |= reify_type(ctx, scope, ty)?.copy.is_some();
        }
        needs_copy.push(any);
    }
    if !needs_copy.iter().any(|n| *n) {
        return Ok(expr(Expr::call(Expr::member(e, "slice"), Vec::new())));
    }
    let cases = cases.to_vec();
    let builder: FunctionBuilder = Rc::new(move |ctx, scope, args, _| {
        let source = args.named(ctx, 0, Some("source"))?;
        let mut result = expr(Expr::call(
            Expr::member(read(ctx, scope, source.clone())?, "slice"),
            Vec::new(),
        ));
        for (index, case) in cases.iter().enumerate() {
            if !needs_copy[index] {
                continue;
            }
            let tag = member(ctx, scope, source.clone(), Value::num(0.0))?;
            let test = binary(ctx, scope, "===", tag, Value::num(index as f64))?;
            let mut items = vec![Value::num(index as f64)];
            for (i, ty) in case.field_types.iter().enumerate() {
                let item = member(ctx, scope, source.clone(), Value::num((i + 1) as f64))?;
                items.push(copy(item, ty.clone()));
            }
            let copied = array(ctx, scope, items)?;
            result = conditional(ctx, scope, test, copied, result)?;
        }
        Ok(result)
    });
    let ident = emit_function(ctx, &member_key(name, "copy"), Some(1), builder, false)?;
    Ok(expr(Expr::call(Expr::ident(ident), vec![e])))
}

fn build_class(ctx: &mut Context, nominal: &Rc<Nominal>) -> CResult<ReifiedType> {
    let members = collect_members(nominal)?;
    let class_ident = mangle_name(&nominal.name);
    let stored = Rc::new(members.stored.clone());
    let mut functions = FunctionMap::new();
    add_methods(&mut functions, &nominal.name, &members)?;
    add_constructors(&mut functions, nominal, &members)?;
    add_static_stored(&mut functions, &nominal.name, &members);
    let mut fields: Vec<Field> = Vec::new();
    for field_info in stored.iter() {
        let name = field_info.name.clone();
        let getter: GetterFn = Rc::new(move |ctx, scope, target| field(ctx, scope, target, &name));
        fields.push(Field::computed(field_info.name.clone(), field_info.ty.clone(), getter));
    }
    for property in members.computed.iter().filter(|p| !p.is_static) {
        let name = property.name.clone();
        let getter: GetterFn = Rc::new(move |ctx, scope, target| field(ctx, scope, target, &name));
        fields.push(Field::computed(property.name.clone(), property.ty.clone(), getter));
    }
    for property in members.computed.iter().filter(|p| p.is_static) {
        functions.insert(
            property.name.clone(),
            FunctionEntry::Property {
                get: getter_builder(&nominal.name, property),
                set: None,
            },
        );
    }
    let conformances = conformances_for(ctx, nominal, &[]);
    let instance_name = camel_case(&nominal.name);
    let reified = ReifiedType::new(nominal.name.clone(), PossibleRepresentation::OBJECT)
        .with_functions(functions)
        .with_fields(fields)
        .with_conformances(conformances)
        .with_default(move |ctx, scope, consume| {
            let ident = ctx.reserve_unique(scope, &instance_name)?;
            let mut stmts = vec![Stmt::var(
                VarKind::Const,
                ident.clone(),
                Some(Expr::new_expr(Expr::ident(class_ident.clone()), Vec::new())),
            )];
            for field_info in stored.iter() {
                let value = field_value(ctx, scope, field_info, consume)?;
                let target = Expr::member(Expr::ident(ident.clone()), field_info.name.clone());
                let assigned = crate::values::set(ctx, scope, Value::Direct(target), value, "=")?;
                stmts.extend(crate::values::ignore(ctx, scope, assigned)?);
            }
            stmts.push(Stmt::ret(Expr::ident(ident)));
            Ok(Value::Statements(stmts))
        });
    Ok(reified)
}

/// クラス宣言の文。計算プロパティは `this` を self とする getter になる。
pub(crate) fn class_statement(ctx: &mut Context, nominal: &Rc<Nominal>) -> CResult<Stmt> {
    let members = collect_members(nominal)?;
    let mut class_members = Vec::new();
    for property in members.computed.iter().filter(|p| !p.is_static) {
        let body = property.body.clone();
        let display = member_key(&nominal.name, &property.name);
        let root = ctx.root();
        let (params, stmts) = functionize(ctx, root, &display, Some(0), &|ctx, scope, _| {
            ctx.map_value(scope, "self", Value::Direct(Expr::This));
            let stmts = translate_statements(ctx, scope, &body.children)?;
            Ok(statements(stmts))
        })?;
        class_members.push(ClassMember {
            kind: MethodKind::Get,
            name: property.name.clone(),
            params,
            body: stmts,
            is_static: false,
        });
    }
    let decl = Stmt::Class {
        name: mangle_name(&nominal.name),
        members: class_members,
    };
    Ok(if nominal.is_public() {
        Stmt::Export(Box::new(decl))
    } else {
        decl
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_ast;
    use crate::builtins::new_context_with_builtins;
    use crate::js::printer::print_expr;

    fn register(ctx: &mut Context, source: &str) {
        let term = Rc::new(parse_ast(source).expect("parse"));
        let kind = NominalKind::of(&term.name).expect("nominal");
        let name = term.args[0].clone();
        register_nominal(ctx, Nominal::new(kind, name, term)).expect("register");
    }

    const POINT: &str = r#"(struct_decl "Point" interface type='Point.Type' access=internal inherits: Equatable
  (var_decl "x" type='Int' interface type='Int' access=internal storage_kind=stored)
  (var_decl "y" type='Int' interface type='Int' access=internal storage_kind=stored))"#;

    #[test]
    /// 構造体のコピーはフィールドごとのオブジェクトリテラル
    fn struct_copy_is_field_by_field() {
        let mut ctx = new_context_with_builtins();
        register(&mut ctx, POINT);
        let root = ctx.root();
        let copied = copy_value(&mut ctx, root, Value::ident("origin"), &Type::name("Point"))
            .expect("copy");
        let e = read(&mut ctx, root, copied).expect("read");
        let printed = print_expr(&e);
        assert!(printed.contains("x: origin.x"), "{}", printed);
        assert!(printed.contains("y: origin.y"), "{}", printed);
    }

    #[test]
    /// Equatable の構造体には == が合成される
    fn struct_equality_is_synthesized() {
        let mut ctx = new_context_with_builtins();
        register(&mut ctx, POINT);
        let root = ctx.root();
        let parent = Value::Type(Type::name("Point"));
        let operands = vec![Value::ident("a"), Value::ident("b")];
        let equal = call_method(&mut ctx, root, &parent, "==", operands).expect("==");
        let e = read(&mut ctx, root, equal).expect("read");
        assert_eq!(print_expr(&e), "a.x === b.x && a.y === b.y");
    }

    #[test]
    /// 中身のない enum は番号、生の値は表から引く
    fn raw_enum_values() {
        let mut ctx = new_context_with_builtins();
        register(
            &mut ctx,
            r#"(enum_decl "Planet" interface type='Planet.Type' access=internal inherits: Int
  (enum_case_decl
    (enum_element_decl "mercury" interface type='(Planet.Type) -> Planet' access=internal
      (integer_literal_expr type='Int' value=1))
    (enum_element_decl "venus" interface type='(Planet.Type) -> Planet' access=internal)))"#,
        );
        let root = ctx.root();
        let reified = reify_type(&mut ctx, root, &Type::name("Planet")).expect("reify");
        assert_eq!(reified.representations, PossibleRepresentation::NUMBER);
        assert_eq!(reified.cases.len(), 2);
        let raw =
            crate::reified::struct_field(&mut ctx, root, &reified, Value::ident("p"), "rawValue")
                .expect("rawValue");
        let e = read(&mut ctx, root, raw).expect("read");
        assert_eq!(print_expr(&e), "[1, 2][p]");
    }

    #[test]
    /// 中身を持つ enum の case は配列を作り、コピーは slice
    fn payload_enum_cases() {
        let mut ctx = new_context_with_builtins();
        register(
            &mut ctx,
            r#"(enum_decl "Barcode" interface type='Barcode.Type' access=internal
  (enum_case_decl
    (enum_element_decl "upc" interface type='(Barcode.Type) -> (Int, Int) -> Barcode' access=internal)
    (enum_element_decl "none" interface type='(Barcode.Type) -> Barcode' access=internal)))"#,
        );
        let root = ctx.root();
        let parent = Value::Type(Type::name("Barcode"));
        let payload = vec![Value::num(1.0), Value::num(2.0)];
        let made = call_method(&mut ctx, root, &parent, "upc", payload).expect("upc");
        let e = read(&mut ctx, root, made).expect("read");
        assert_eq!(print_expr(&e), "[0, 1, 2]");
        let copied = copy_value(&mut ctx, root, Value::ident("code"), &Type::name("Barcode"))
            .expect("copy");
        let e = read(&mut ctx, root, copied).expect("read");
        assert_eq!(print_expr(&e), "code.slice()");
    }
}
