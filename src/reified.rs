// パス: src/reified.rs
// 役割: Swift の型を実行時表現（ReifiedType）へ具象化し、コピー・格納・既定値・witness table を提供する
// 意図: 値型のコピー意味論と、プロトコル経由の呼び出しの解決を型ごとの表に集約する
// 関連ファイル: src/types/mod.rs, src/values/ops.rs, src/builtins/protocols.rs, src/frontend/decls.rs
//! 型の具象化
//!
//! - `reify_type` は名前付き型を `Context::types` の構築子、プロトコル表、スコープの対応付けの順に探す。
//! - 関数の探索順は「型自身 → 適合で明示された実装 → プロトコルの既定実装（派生側から）→ 代替（`+=` は `+` から、`~=` は `==` から）」。
//! - 実行時の型（ジェネリック引数）は witness table のメンバー呼び出しに落ちる。
//! - witness table は (型, プロトコル) ごとにルートへ一度だけ出力される。

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::rc::Rc;

use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::functions::{emit_function, functionize, Args, FunctionBuilder, FunctionEntry};
use crate::js::{Expr, PropKey, PropValue, Property, Stmt, VarKind};
use crate::scope::{mangle_name, ScopeId};
use crate::types::Type;
use crate::values::{
    array, call_expression, expr, field, read, reuse, set, update, CallKind, Value,
};

/// 実行時に取りうる JavaScript の表現の集合。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PossibleRepresentation(pub u16);

impl PossibleRepresentation {
    pub const NONE: Self = Self(0);
    pub const UNDEFINED: Self = Self(1 << 0);
    pub const BOOLEAN: Self = Self(1 << 1);
    pub const NUMBER: Self = Self(1 << 2);
    pub const STRING: Self = Self(1 << 3);
    pub const FUNCTION: Self = Self(1 << 4);
    pub const OBJECT: Self = Self(1 << 5);
    pub const SYMBOL: Self = Self(1 << 6);
    pub const NULL: Self = Self(1 << 7);
    pub const ARRAY: Self = Self(1 << 8);
    pub const ALL: Self = Self(0x1ff);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_subset_of(self, other: Self) -> bool {
        other.contains(self)
    }
}

impl BitOr for PossibleRepresentation {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for PossibleRepresentation {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for PossibleRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 9] = [
            "Undefined", "Boolean", "Number", "String", "Function", "Object", "Symbol", "Null",
            "Array",
        ];
        let parts: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, n)| *n)
            .collect();
        if parts.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

/// witness table が持つ表現ビット集合のキー。
pub const REP_KEY: &str = "$rep";

/// 参照で渡せる表現。これ以外を含む型の inout は一要素配列の箱を使う。
const UNBOXED: PossibleRepresentation = PossibleRepresentation(
    PossibleRepresentation::FUNCTION.0
        | PossibleRepresentation::OBJECT.0
        | PossibleRepresentation::SYMBOL.0
        | PossibleRepresentation::ARRAY.0,
);

pub type FunctionMap = BTreeMap<String, FunctionEntry>;
/// 既定値の生成。コンストラクタ引数から埋まったフィールドの式を受け取れる。
pub type DefaultValueFn =
    Rc<dyn Fn(&mut Context, ScopeId, &mut dyn FnMut(&str) -> Option<Expr>) -> CResult<Value>>;
/// コピー。戻り値は `Copied` であってはならない。
pub type CopyFn = Rc<dyn Fn(&mut Context, ScopeId, Value) -> CResult<Value>>;
pub type StoreFn = Rc<dyn Fn(&mut Context, ScopeId, Value, Value) -> CResult<Value>>;
pub type GetterFn = Rc<dyn Fn(&mut Context, ScopeId, Value) -> CResult<Value>>;

/// プロトコルへの適合。`functions` は型が明示した実装、`defaults` はプロトコルの既定実装。
#[derive(Clone, Default)]
pub struct ProtocolConformance {
    pub functions: FunctionMap,
    pub defaults: FunctionMap,
    pub requirements: Vec<String>,
}

pub struct Field {
    pub name: String,
    pub ty: Type,
    pub stored: bool,
    pub getter: Option<GetterFn>,
}

impl Field {
    pub fn stored(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            stored: true,
            getter: None,
        }
    }

    pub fn computed(name: impl Into<String>, ty: Type, getter: GetterFn) -> Self {
        Self {
            name: name.into(),
            ty,
            stored: false,
            getter: Some(getter),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnumCase {
    pub name: String,
    pub field_types: Vec<Type>,
}

/// 関数呼び出しの解決方法。
#[derive(Clone, Debug)]
pub enum Dispatch {
    /// 具象型。関数表から直接展開する
    Static,
    /// プロトコル。先頭引数の Self 型に転送する
    Protocol(String),
    /// 実行時の witness table（ジェネリック引数）
    Runtime(Expr),
}

/// 型構築子。名前付き型と型引数から `ReifiedType` を作る。
pub trait TypeConstructor {
    fn reify(&self, ctx: &mut Context, scope: ScopeId, args: &[Type]) -> CResult<Rc<ReifiedType>>;
}

impl<F> TypeConstructor for F
where
    F: Fn(&mut Context, ScopeId, &[Type]) -> CResult<Rc<ReifiedType>>,
{
    fn reify(&self, ctx: &mut Context, scope: ScopeId, args: &[Type]) -> CResult<Rc<ReifiedType>> {
        self(ctx, scope, args)
    }
}

/// クロージャから型構築子を作る。
pub fn constructor(
    f: impl Fn(&mut Context, ScopeId, &[Type]) -> CResult<Rc<ReifiedType>> + 'static,
) -> Rc<dyn TypeConstructor> {
    Rc::new(f)
}

/// 型引数を取らない、常に同じ表を返す構築子。
pub fn fixed(reified: ReifiedType) -> Rc<dyn TypeConstructor> {
    let shared = Rc::new(reified);
    constructor(move |_, _, _| Ok(shared.clone()))
}

#[derive(Clone)]
pub struct ReifiedType {
    pub name: String,
    pub representations: PossibleRepresentation,
    pub functions: FunctionMap,
    /// 要件の位相順（基底プロトコルが先）
    pub conformances: Vec<(String, ProtocolConformance)>,
    pub default_value: Option<DefaultValueFn>,
    pub copy: Option<CopyFn>,
    pub store: Option<StoreFn>,
    pub inner_types: BTreeMap<String, Rc<dyn TypeConstructor>>,
    pub cases: Vec<EnumCase>,
    pub fields: Rc<Vec<Field>>,
    pub dispatch: Dispatch,
}

impl fmt::Debug for ReifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReifiedType")
            .field("name", &self.name)
            .field("representations", &self.representations)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field(
                "conformances",
                &self.conformances.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl ReifiedType {
    pub fn new(name: impl Into<String>, representations: PossibleRepresentation) -> Self {
        Self {
            name: name.into(),
            representations,
            functions: FunctionMap::new(),
            conformances: Vec::new(),
            default_value: None,
            copy: None,
            store: None,
            inner_types: BTreeMap::new(),
            cases: Vec::new(),
            fields: Rc::new(Vec::new()),
            dispatch: Dispatch::Static,
        }
    }

    /// 既定値が定数の単純な型。
    pub fn primitive(
        name: impl Into<String>,
        representations: PossibleRepresentation,
        default: Value,
    ) -> Self {
        Self::new(name, representations).with_default(move |_, _, _| Ok(default.clone()))
    }

    /// プロトコルそのもの（Self 型への転送）。
    pub fn protocol(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut reified = Self::new(name.clone(), PossibleRepresentation::ALL);
        reified.dispatch = Dispatch::Protocol(name);
        reified
    }

    /// 実行時に witness table として渡される型。
    pub fn runtime(name: impl Into<String>, table: Expr) -> Self {
        let mut reified = Self::new(name, PossibleRepresentation::ALL);
        reified.dispatch = Dispatch::Runtime(table);
        reified
    }

    pub fn with_functions(mut self, functions: FunctionMap) -> Self {
        self.functions.extend(functions);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, entry: FunctionEntry) -> Self {
        self.functions.insert(name.into(), entry);
        self
    }

    pub fn with_default(
        mut self,
        f: impl Fn(&mut Context, ScopeId, &mut dyn FnMut(&str) -> Option<Expr>) -> CResult<Value>
            + 'static,
    ) -> Self {
        self.default_value = Some(Rc::new(f));
        self
    }

    pub fn with_copy(
        mut self,
        f: impl Fn(&mut Context, ScopeId, Value) -> CResult<Value> + 'static,
    ) -> Self {
        self.copy = Some(Rc::new(f));
        self
    }

    pub fn with_store(
        mut self,
        f: impl Fn(&mut Context, ScopeId, Value, Value) -> CResult<Value> + 'static,
    ) -> Self {
        self.store = Some(Rc::new(f));
        self
    }

    pub fn with_conformances(mut self, conformances: Vec<(String, ProtocolConformance)>) -> Self {
        self.conformances = conformances;
        self
    }

    pub fn with_inner_type(
        mut self,
        name: impl Into<String>,
        ctor: Rc<dyn TypeConstructor>,
    ) -> Self {
        self.inner_types.insert(name.into(), ctor);
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Rc::new(fields);
        self
    }

    pub fn with_cases(mut self, cases: Vec<EnumCase>) -> Self {
        self.cases = cases;
        self
    }

    pub fn conforms_to(&self, protocol: &str) -> bool {
        self.conformances.iter().any(|(name, _)| name == protocol)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 名前で関数を探す。
    pub fn function(&self, name: &str) -> Option<FunctionEntry> {
        match &self.dispatch {
            Dispatch::Protocol(protocol) => {
                return Some(protocol_entry(protocol.clone(), name.to_string()))
            }
            Dispatch::Runtime(table) => {
                return self
                    .alternate(name)
                    .or_else(|| Some(runtime_entry(table.clone(), name.to_string())))
            }
            Dispatch::Static => {}
        }
        self.functions
            .get(name)
            .cloned()
            .or_else(|| {
                self.conformances
                    .iter()
                    .rev()
                    .find_map(|(_, c)| c.functions.get(name).cloned())
            })
            .or_else(|| {
                self.conformances
                    .iter()
                    .rev()
                    .find_map(|(_, c)| c.defaults.get(name).cloned())
            })
            .or_else(|| self.alternate(name))
    }

    /// 複合代入は基本演算子から、`~=` は `==` から導く。
    fn alternate(&self, name: &str) -> Option<FunctionEntry> {
        if name == "~=" {
            return self.function("==");
        }
        let base = compound_base(name)?;
        let entry = self.function(base)?;
        let base = base.to_string();
        Some(FunctionEntry::Plain(Rc::new(move |ctx, scope, args, _| {
            let builder = entry.builder(CallKind::Call, &base)?;
            let target = args.get(ctx, 0)?;
            let mut rhs = Some(args.get(ctx, 1)?);
            update(ctx, scope, target, &mut |ctx, scope, current| {
                let rhs = rhs.take().unwrap_or_else(Value::undefined);
                builder(ctx, scope, &Args::Values(&[current, rhs]), &base)
            })
        })))
    }
}

/// `+=` → `+`、`&<<=` → `&<<` のように複合代入演算子の基本演算子を返す。
pub fn compound_base(name: &str) -> Option<&str> {
    let base = name.strip_suffix('=')?;
    let single = |s: &str| s.len() == 1 && "%^&|*+/-".contains(s);
    let ok = base == "<<"
        || base == ">>"
        || single(base)
        || base
            .strip_prefix('&')
            .map(|rest| single(rest) || rest == "<<" || rest == ">>")
            .unwrap_or(false);
    if ok {
        Some(base)
    } else {
        None
    }
}

fn protocol_entry(protocol: String, name: String) -> FunctionEntry {
    FunctionEntry::Dispatch(Rc::new(move |kind| {
        let protocol = protocol.clone();
        let name = name.clone();
        let builder: FunctionBuilder = Rc::new(move |ctx, scope, args, display| {
            let self_type = args.named(ctx, 0, Some("Self"))?;
            let reified = type_from_value(ctx, scope, &self_type)?;
            let entry = reified.function(&name).ok_or_else(|| {
                CompileError::new(
                    "RFY005",
                    format!("Could not find {} on {} for {}", name, reified.name, protocol),
                )
            })?;
            let builder = entry.builder(kind, display)?;
            builder(ctx, scope, &args.shifted(1), display)
        });
        builder
    }))
}

fn runtime_entry(table: Expr, name: String) -> FunctionEntry {
    FunctionEntry::Dispatch(Rc::new(move |_| {
        let table = table.clone();
        let name = name.clone();
        let builder: FunctionBuilder = Rc::new(move |ctx, scope, args, _| {
            let values = args.all(ctx)?;
            let callee = Expr::member(table.clone(), mangle_name(&name));
            if values.is_empty() {
                Ok(expr(callee))
            } else {
                call_expression(ctx, scope, callee, values)
            }
        });
        builder
    }))
}

/// 型の適合表を作る。要件のプロトコルも含め、基底が先になる位相順に並べる。
///
/// `self_type` はプロトコルの既定実装に渡す Self 型。
pub fn build_conformances(
    ctx: &Context,
    self_type: &Value,
    explicit: Vec<(&str, FunctionMap)>,
) -> Vec<(String, ProtocolConformance)> {
    fn visit(ctx: &Context, name: &str, seen: &mut BTreeSet<String>, order: &mut Vec<String>) {
        if !seen.insert(name.to_string()) {
            return;
        }
        if let Some(definition) = ctx.protocols.get(name) {
            for requirement in &definition.requirements {
                visit(ctx, requirement, seen, order);
            }
        }
        order.push(name.to_string());
    }
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    for (name, _) in &explicit {
        visit(ctx, name, &mut seen, &mut order);
    }
    let mut explicit: BTreeMap<&str, FunctionMap> = explicit.into_iter().collect();
    order
        .into_iter()
        .map(|name| {
            let mut conformance = ProtocolConformance {
                functions: explicit.remove(name.as_str()).unwrap_or_default(),
                ..ProtocolConformance::default()
            };
            match ctx.protocols.get(&name) {
                Some(definition) => {
                    conformance.requirements = definition.requirements.clone();
                    for (key, default) in &definition.functions {
                        if let Some(default) = default {
                            conformance.defaults.insert(key.clone(), default(self_type));
                        }
                    }
                }
                None => log::debug!("conformance to unregistered protocol {}", name),
            }
            (name, conformance)
        })
        .collect()
}

/// 型を具象化する。
pub fn reify_type(ctx: &mut Context, scope: ScopeId, ty: &Type) -> CResult<Rc<ReifiedType>> {
    reify_with_args(ctx, scope, ty, &[])
}

fn named_constructor(ctx: &Context, name: &str) -> CResult<Rc<dyn TypeConstructor>> {
    ctx.types.get(name).cloned().ok_or_else(|| {
        CompileError::new("RFY001", format!("Cannot resolve type named {}", name))
    })
}

fn reify_with_args(
    ctx: &mut Context,
    scope: ScopeId,
    ty: &Type,
    args: &[Type],
) -> CResult<Rc<ReifiedType>> {
    match ty {
        Type::Name(name) => {
            if let Some(ctor) = ctx.types.get(name).cloned() {
                return ctor.reify(ctx, scope, args);
            }
            if ctx.protocols.contains_key(name) {
                return Ok(Rc::new(ReifiedType::protocol(name.clone())));
            }
            match ctx.mapped_value(scope, name) {
                Some(value) => type_from_value(ctx, scope, &value),
                None => Err(CompileError::new(
                    "RFY001",
                    format!("Cannot resolve type named {}", name),
                )),
            }
        }
        Type::Optional(inner) => {
            named_constructor(ctx, "Optional")?.reify(ctx, scope, &[(**inner).clone()])
        }
        Type::Array(inner) => {
            named_constructor(ctx, "Array")?.reify(ctx, scope, &[(**inner).clone()])
        }
        Type::Dictionary { key, value } => named_constructor(ctx, "Dictionary")?.reify(
            ctx,
            scope,
            &[(**key).clone(), (**value).clone()],
        ),
        Type::Generic { base, arguments } => {
            let mut all = args.to_vec();
            all.extend(arguments.iter().cloned());
            reify_with_args(ctx, scope, base, &all)
        }
        Type::Tuple(types) => match types.len() {
            0 => Ok(Rc::new(ReifiedType::primitive(
                "Void",
                PossibleRepresentation::UNDEFINED,
                Value::undefined(),
            ))),
            1 => reify_type(ctx, scope, &types[0]),
            _ => tuple_type(ctx, scope, ty, types),
        },
        Type::Function(_) => Ok(Rc::new(ReifiedType::new(
            ty.stringify(),
            PossibleRepresentation::FUNCTION,
        ))),
        Type::Metatype { .. } => Ok(Rc::new(ReifiedType::primitive(
            ty.stringify(),
            PossibleRepresentation::OBJECT,
            Value::undefined(),
        ))),
        Type::Modified { ty, .. } | Type::Constrained { ty, .. } => {
            reify_with_args(ctx, scope, ty, args)
        }
        Type::Namespaced { namespace, ty } => {
            let outer = match reify_type(ctx, scope, namespace) {
                Ok(outer) => outer,
                // モジュール名（`Swift.Int` など）は型として解決できないので中身だけを見る
                Err(_) => return reify_with_args(ctx, scope, ty, args),
            };
            if let Type::Name(name) = ty.as_ref() {
                if let Some(ctor) = outer.inner_types.get(name).cloned() {
                    return ctor.reify(ctx, scope, args);
                }
            }
            reify_with_args(ctx, scope, ty, args)
        }
    }
}

fn tuple_type(
    ctx: &mut Context,
    scope: ScopeId,
    ty: &Type,
    types: &[Type],
) -> CResult<Rc<ReifiedType>> {
    let elements = types
        .iter()
        .map(|t| reify_type(ctx, scope, t))
        .collect::<CResult<Vec<_>>>()?;
    let defaults = elements.clone();
    let display = ty.stringify();
    let mut reified = ReifiedType::new(display.clone(), PossibleRepresentation::ARRAY)
        .with_default(move |ctx, scope, _| {
            let mut values = Vec::with_capacity(defaults.len());
            for (i, element) in defaults.iter().enumerate() {
                let default = element.default_value.clone().ok_or_else(|| {
                    CompileError::new(
                        "RFY002",
                        format!(
                            "Tuple field {} of type {} is not default instantiable",
                            i, display
                        ),
                    )
                })?;
                values.push(default(ctx, scope, &mut |_| None)?);
            }
            array(ctx, scope, values)
        });
    let needs_copy = elements.iter().any(|e| e.copy.is_some());
    reified.copy = Some(Rc::new(move |ctx, scope, value| {
        if let Value::Tuple(items) = value {
            let mut out = Vec::with_capacity(items.len());
            for (item, element) in items.into_iter().zip(elements.iter()) {
                out.push(match &element.copy {
                    Some(copy) => copy(ctx, scope, item)?,
                    None => item,
                });
            }
            return Ok(Value::Tuple(out));
        }
        let e = read(ctx, scope, value)?;
        if expression_skips_copy(&e) {
            return Ok(expr(e));
        }
        if !needs_copy {
            return Ok(expr(Expr::call(Expr::member(e, "slice"), Vec::new())));
        }
        let (first, after) = reuse(ctx, scope, expr(e), "copySource")?;
        let mut items = Vec::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            let source = if i == 0 { first.clone() } else { after.clone() };
            let item = crate::values::member(ctx, scope, source, Value::num(i as f64))?;
            items.push(match &element.copy {
                Some(copy) => copy(ctx, scope, item)?,
                None => item,
            });
        }
        array(ctx, scope, items)
    }));
    Ok(Rc::new(reified))
}

/// 値として渡された型（型値・適合・実行時の witness table）を具象化する。
pub fn type_from_value(
    ctx: &mut Context,
    scope: ScopeId,
    value: &Value,
) -> CResult<Rc<ReifiedType>> {
    match value {
        Value::Type(ty) => reify_type(ctx, scope, ty),
        Value::Conformance { ty, .. } => type_from_value(ctx, scope, ty),
        other => {
            let table = read(ctx, scope, other.clone())?;
            let name = crate::js::printer::print_expr(&table);
            Ok(Rc::new(ReifiedType::runtime(name, table)))
        }
    }
}

/// inout で一要素配列の箱を必要とする型か。
pub fn type_requires_box(ctx: &mut Context, scope: ScopeId, ty: &Type) -> CResult<bool> {
    let reified = reify_type(ctx, scope, ty)?;
    Ok(!reified.representations.is_subset_of(UNBOXED))
}

/// 新しいオブジェクトを生む式（リテラル・呼び出し・`new`）はコピー不要。
pub fn expression_skips_copy(e: &Expr) -> bool {
    match e {
        Expr::Object(_) | Expr::Array(_) | Expr::Call { .. } | Expr::New { .. } => true,
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Template { .. } => true,
        Expr::Conditional {
            consequent,
            alternate,
            ..
        } => expression_skips_copy(consequent) && expression_skips_copy(alternate),
        other => other.is_undefined(),
    }
}

/// 型の `copy` を適用する（持たない型はそのまま）。
pub fn copy_value(ctx: &mut Context, scope: ScopeId, value: Value, ty: &Type) -> CResult<Value> {
    let reified = reify_type(ctx, scope, ty)?;
    match reified.copy.clone() {
        Some(copy) => copy(ctx, scope, value),
        None => Ok(value),
    }
}

/// 代入先に値を格納する。型に `store` があればそれを使う。
pub fn store_value(
    ctx: &mut Context,
    scope: ScopeId,
    dest: Value,
    source: Value,
    ty: &Type,
) -> CResult<Value> {
    match dest {
        Value::Boxed { contents, .. } => store_value(ctx, scope, *contents, source, ty),
        Value::Direct(place) => {
            let reified = reify_type(ctx, scope, ty)?;
            match reified.store.clone() {
                Some(store) => store(ctx, scope, Value::Direct(place), source),
                None => set(ctx, scope, Value::Direct(place), source, "="),
            }
        }
        Value::Subscript { .. } => set(ctx, scope, dest, source, "="),
        other => Err(CompileError::new(
            "RFY003",
            format!("Unable to store to a {} value", other.kind()),
        )),
    }
}

/// 型の既定値を作る。
pub fn default_instantiate(
    ctx: &mut Context,
    scope: ScopeId,
    ty: &Type,
    consume: &mut dyn FnMut(&str) -> Option<Expr>,
) -> CResult<Value> {
    let reified = reify_type(ctx, scope, ty)?;
    match reified.default_value.clone() {
        Some(default) => default(ctx, scope, consume),
        None => Err(CompileError::new(
            "RFY002",
            format!("Cannot default instantiate {}", ty),
        )),
    }
}

/// 構造体のフィールドを読む（単一フィールドの構造体は自身がそのフィールド）。
pub fn struct_field(
    ctx: &mut Context,
    scope: ScopeId,
    reified: &ReifiedType,
    target: Value,
    name: &str,
) -> CResult<Value> {
    let found = reified.field(name).ok_or_else(|| {
        CompileError::new(
            "RFY006",
            format!("{} does not have a field named {}", reified.name, name),
        )
    })?;
    if let Some(getter) = found.getter.clone() {
        return getter(ctx, scope, target);
    }
    let stored = reified.fields.iter().filter(|f| f.stored).count();
    if stored == 1 {
        return Ok(target);
    }
    field(ctx, scope, target, name)
}

/// 型または適合の参照式（witness table）を返す。
pub fn type_reference(ctx: &mut Context, scope: ScopeId, value: &Value) -> CResult<Expr> {
    let (ty, protocol) = match value {
        Value::Type(ty) => (ty, None),
        Value::Conformance { ty, protocol } => match ty.as_ref() {
            Value::Type(inner) => (inner, Some(protocol.as_str())),
            other => return read(ctx, scope, other.clone()),
        },
        other => return read(ctx, scope, other.clone()),
    };
    let mut base = ty;
    while let Type::Metatype { base: inner, .. } = base {
        base = inner;
    }
    if let Type::Name(name) = base {
        if !ctx.types.contains_key(name) {
            if let Some(mapped) = ctx.mapped_value(scope, name) {
                return read(ctx, scope, mapped);
            }
        }
    }
    let base = base.clone();
    witness_table(ctx, scope, &base, protocol)
}

/// プロトコル（`A & B` の合成も可）とその要件が持つ関数名。代替で導ける演算子は除く。
fn protocol_keys(ctx: &Context, protocol: &str) -> Vec<String> {
    let mut keys = BTreeSet::new();
    let mut pending: Vec<String> = protocol.split('&').map(|p| p.trim().to_string()).collect();
    let mut seen = BTreeSet::new();
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(definition) = ctx.protocols.get(&name) {
            for (key, _) in &definition.functions {
                if compound_base(key).is_none() && key != "~=" {
                    keys.insert(key.clone());
                }
            }
            pending.extend(definition.requirements.iter().cloned());
        }
    }
    keys.into_iter().collect()
}

fn witness_table(
    ctx: &mut Context,
    scope: ScopeId,
    ty: &Type,
    protocol: Option<&str>,
) -> CResult<Expr> {
    // ジェネリック引数を `_` に置き換えた正規名で表を共有する
    let substitution_names = RefCell::new(Vec::<String>::new());
    let stringified = ty.stringify_with(&|inner| match inner {
        Type::Name(name)
            if !ctx.types.contains_key(name) && ctx.mapped_value(scope, name).is_some() =>
        {
            let mut names = substitution_names.borrow_mut();
            if !names.contains(name) {
                names.push(name.clone());
            }
            Some(Type::name("_"))
        }
        _ => None,
    });
    let names = substitution_names.into_inner();
    let key = format!(":{}.{}", stringified, protocol.unwrap_or("Type"));
    let protocol = protocol.map(str::to_string);
    let ty = ty.clone();
    let param_names = names.clone();
    let ident = ctx.emit_helper(&key, move |ctx, ident| {
        if param_names.is_empty() {
            let object = table_object(ctx, ScopeId::ROOT, &ty, &stringified, protocol.as_deref())?;
            return Ok(Stmt::var(VarKind::Const, ident, Some(object)));
        }
        let table_scope = ctx.new_scope(stringified.clone(), ScopeId::ROOT);
        let mut params = Vec::with_capacity(param_names.len());
        for name in &param_names {
            let param = ctx.reserve_unique(table_scope, &mangle_name(name))?;
            ctx.map_value(table_scope, name.clone(), Value::ident(param.clone()));
            params.push(param);
        }
        let object = table_object(ctx, table_scope, &ty, &stringified, protocol.as_deref())?;
        let body = ctx.emit_scope(table_scope, vec![Stmt::ret(object)]);
        Ok(Stmt::Function {
            name: ident.to_string(),
            params,
            body,
        })
    })?;
    if names.is_empty() {
        return Ok(Expr::ident(ident));
    }
    let mut args = Vec::with_capacity(names.len());
    for name in &names {
        let mapped = ctx.lookup(scope, name);
        args.push(read(ctx, scope, mapped)?);
    }
    Ok(Expr::call(Expr::ident(ident), args))
}

fn table_object(
    ctx: &mut Context,
    scope: ScopeId,
    ty: &Type,
    stringified: &str,
    protocol: Option<&str>,
) -> CResult<Expr> {
    let reified = reify_type(ctx, scope, ty)?;
    // `$rep` は実行時に Optional の表現を選ぶのに使う
    let mut properties = vec![Property {
        key: PropKey::Ident(REP_KEY.into()),
        value: PropValue::Value(Expr::Num(reified.representations.0 as f64)),
    }];
    let protocol = match protocol {
        None => return Ok(Expr::Object(properties)),
        Some(protocol) => protocol,
    };
    for key in protocol_keys(ctx, protocol) {
        let entry = match reified.function(&key) {
            Some(entry) => entry,
            None => {
                log::debug!("{} has no {} for {}", stringified, key, protocol);
                continue;
            }
        };
        let prop_key = PropKey::Ident(mangle_name(&key));
        let display = format!("{}.{}", stringified, key);
        let (kind, builder) = match entry {
            FunctionEntry::Global {
                key: global_key,
                arity,
                builder,
            } => {
                let ident = emit_function(ctx, &global_key, arity, builder, false)?;
                properties.push(Property {
                    key: prop_key,
                    value: PropValue::Value(Expr::ident(ident)),
                });
                continue;
            }
            FunctionEntry::Property { get, .. } => (CallKind::Get, get),
            other => (CallKind::Call, other.builder(CallKind::Call, &key)?),
        };
        log::debug!("witness {} ({:?})", display, kind);
        let (params, body) = functionize(ctx, scope, &display, None, &|ctx, scope, args| {
            builder(ctx, scope, args, &display)
        })?;
        let value = if params.is_empty() {
            PropValue::Value(match body.as_slice() {
                [] => Expr::undefined(),
                [Stmt::Return(Some(e))] => e.clone(),
                _ => Expr::call(Expr::function(Vec::new(), body), Vec::new()),
            })
        } else {
            PropValue::Method { params, body }
        };
        properties.push(Property {
            key: prop_key,
            value,
        });
    }
    Ok(Expr::Object(properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::wrapped_entry;
    use crate::js::printer::print_stmts;
    use crate::values::binary;

    fn number_type(name: &str) -> ReifiedType {
        ReifiedType::primitive(name, PossibleRepresentation::NUMBER, Value::num(0.0))
            .with_function(
                "+",
                wrapped_entry(2, |ctx, scope, args| {
                    let mut args = args.into_iter();
                    let l = args.next().unwrap_or_else(Value::undefined);
                    let r = args.next().unwrap_or_else(Value::undefined);
                    binary(ctx, scope, "+", l, r)
                }),
            )
    }

    fn context() -> Context {
        let mut ctx = Context::new();
        ctx.types.insert("Num".into(), fixed(number_type("Num")));
        ctx.types.insert(
            "Obj".into(),
            fixed(ReifiedType::new("Obj", PossibleRepresentation::OBJECT)),
        );
        ctx
    }

    #[test]
    /// 複合代入演算子の基本演算子
    fn compound_operators() {
        assert_eq!(compound_base("+="), Some("+"));
        assert_eq!(compound_base("&+="), Some("&+"));
        assert_eq!(compound_base("<<="), Some("<<"));
        assert_eq!(compound_base("=="), None);
        assert_eq!(compound_base("<="), None);
        assert_eq!(compound_base("!="), None);
    }

    #[test]
    /// 数値は箱が必要でオブジェクトは不要
    fn boxing_depends_on_representation() {
        let mut ctx = context();
        let root = ctx.root();
        assert!(type_requires_box(&mut ctx, root, &Type::name("Num")).expect("num"));
        assert!(!type_requires_box(&mut ctx, root, &Type::name("Obj")).expect("obj"));
        let tuple = Type::Tuple(vec![Type::name("Num"), Type::name("Num")]);
        assert!(!type_requires_box(&mut ctx, root, &tuple).expect("tuple"));
    }

    #[test]
    /// 未知の型名はエラー
    fn unknown_type_fails() {
        let mut ctx = context();
        let root = ctx.root();
        let err = reify_type(&mut ctx, root, &Type::name("Missing")).expect_err("missing");
        assert_eq!(err.code(), "RFY001");
    }

    #[test]
    /// `+=` は `+` から読み出し・書き戻しとして導かれる
    fn derives_compound_assignment() {
        let mut ctx = context();
        let root = ctx.root();
        let reified = reify_type(&mut ctx, root, &Type::name("Num")).expect("num");
        let entry = reified.function("+=").expect("+=");
        let builder = entry.builder(CallKind::Call, "+=").expect("builder");
        let args = [Value::ident("x"), Value::num(2.0)];
        let value = builder(&mut ctx, root, &Args::Values(&args), "+=").expect("call");
        let stmts = match value {
            Value::Statements(stmts) => stmts,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(print_stmts(&stmts), "x = x + 2;\n");
    }

    #[test]
    /// 実行時の型はメンバー呼び出しになる
    fn runtime_types_call_table_members() {
        let mut ctx = context();
        let root = ctx.root();
        ctx.map_value(root, "T", Value::ident("T"));
        let reified = reify_type(&mut ctx, root, &Type::name("T")).expect("T");
        let entry = reified.function("==").expect("==");
        let builder = entry.builder(CallKind::Call, "==").expect("builder");
        let args = [Value::ident("a"), Value::ident("b")];
        let value = builder(&mut ctx, root, &Args::Values(&args), "==").expect("call");
        let e = read(&mut ctx, root, value).expect("read");
        assert_eq!(crate::js::printer::print_expr(&e), "T.$equal$$equal$(a, b)");
    }

    #[test]
    /// 二要素タプルのコピーは要素にコピーが要らなければ slice になる
    fn tuple_copy_slices() {
        let mut ctx = context();
        let root = ctx.root();
        let tuple = Type::Tuple(vec![Type::name("Num"), Type::name("Num")]);
        let copied = copy_value(&mut ctx, root, Value::ident("pair"), &tuple).expect("copy");
        let e = read(&mut ctx, root, copied).expect("read");
        assert_eq!(crate::js::printer::print_expr(&e), "pair.slice()");
    }
}
