// パス: src/sil/codegen.rs
// 役割: 最適化済みの SIL モジュールを JavaScript の構文木へ変換する
// 意図: 基本ブロックの分岐を `state` 変数と switch の反復で表し、単一参照のブロックはその場に展開する
// 関連ファイル: src/sil/mod.rs, src/sil/optimizer.rs, src/sil/stdlib.rs, src/js/mod.rs
//! SIL コード生成
//!
//! 値の表現:
//! - ローカル `%N` は `_N`、分岐の並列代入に使う一時変数は `$N`。
//! - アドレスは `{ref, field}` の箱で、読み出しは `ref[field]`。
//! - 列挙値は `[ケース番号, ペイロード]` の配列、複数フィールドの構造体はオブジェクト。
//! - メソッド規約の関数は `self` を `this` で受け取り、呼び出し側は `f.call(self, ...)` とする。
//!
//! 入口以外のブロックが残る関数（またはループで入口へ戻る関数）は
//! `for (;;) { switch (state) { ... } }` の分岐表になる。直後のケースへの分岐は省く。

use std::collections::{BTreeSet, HashSet};

use super::stdlib::{self, lower_builtin, trap_for_message};
use super::{
    base_type_name, BasicBlock, Convention, Declaration, Function, Instruction, Local, Module,
    Rvalue, Target, TypeLayout,
};
use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::js::printer::is_valid_identifier;
use crate::js::{Expr, Program, Property, Stmt, SwitchCase, VarKind};
use crate::scope::mangle_name;

/// モジュール全体をプログラムに変換する。補助関数はプログラムの先頭に並ぶ。
pub fn compile_module(module: &Module) -> CResult<Program> {
    let mut gen = ModuleGen::new(module);
    let body = gen.module_body()?;
    let root = gen.ctx.root();
    let body = gen.ctx.emit_scope(root, body);
    Ok(Program { body })
}

fn local_name(name: &str) -> String {
    format!("_{}", name)
}

fn local(name: &str) -> Expr {
    Expr::ident(local_name(name))
}

/// シンボルを識別子に写す。`$s4main...` の形はそのまま使える。
fn js_name(symbol: &str) -> String {
    if is_valid_identifier(symbol) {
        symbol.to_string()
    } else {
        mangle_name(symbol)
    }
}

fn property(object: Expr, key: &str) -> Expr {
    if is_valid_identifier(key) {
        Expr::member(object, key)
    } else {
        Expr::index(object, Expr::str_lit(key))
    }
}

fn make_box(reference: Expr, field: Expr) -> Expr {
    Expr::Object(vec![
        Property::field("ref", reference),
        Property::field("field", field),
    ])
}

fn unbox(address: Expr) -> Expr {
    Expr::index(
        Expr::member(address.clone(), "ref"),
        Expr::member(address, "field"),
    )
}

fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::expr(Expr::assign("=", target, value))
}

/// 式が識別子 `name` を読むか（並列代入の衝突判定用）。
fn mentions(e: &Expr, name: &str) -> bool {
    match e {
        Expr::Ident(n) => n == name,
        Expr::Member {
            object, property, ..
        } => mentions(object, name) || mentions(property, name),
        _ => false,
    }
}

/// `else if` の連鎖になるよう、単独の if を else 側に直接ぶら下げる。
fn chain(test: Expr, consequent: Vec<Stmt>, alternate: Option<Vec<Stmt>>) -> Stmt {
    let alternate = alternate.map(|mut body| {
        if body.len() == 1 && matches!(body[0], Stmt::If { .. }) {
            Box::new(body.remove(0))
        } else {
            Box::new(Stmt::Block(body))
        }
    });
    Stmt::If {
        test,
        consequent,
        alternate,
    }
}

/// 一つの関数の出力中の状態。
struct FnState<'f> {
    function: &'f Function,
    params: HashSet<String>,
    variables: Vec<String>,
    declared: HashSet<String>,
    temps: usize,
    dispatch: bool,
    current: usize,
}

impl<'f> FnState<'f> {
    fn declare(&mut self, name: &str) {
        if !self.params.contains(name) && self.declared.insert(name.to_string()) {
            self.variables.push(name.to_string());
        }
    }

    fn temp(&mut self) -> String {
        let name = format!("${}", self.temps);
        self.temps += 1;
        self.declare(&name);
        name
    }

    fn block(&self, name: &str) -> CResult<&'f BasicBlock> {
        self.function.block(name).ok_or_else(|| {
            CompileError::new(
                "SSA002",
                format!("unknown block {} in {}", name, self.function.name),
            )
        })
    }
}

struct ModuleGen<'m> {
    module: &'m Module,
    ctx: Context,
    defined: HashSet<&'m str>,
    /// 標準ライブラリから補った関数と、vtable を持たないクラスのコンストラクタ
    externals: Vec<Stmt>,
    emitted: HashSet<String>,
    classes: BTreeSet<String>,
    exports: HashSet<String>,
}

impl<'m> ModuleGen<'m> {
    fn new(module: &'m Module) -> Self {
        let defined = module
            .functions()
            .filter(|f| !f.is_declaration())
            .map(|f| f.name.as_str())
            .collect();
        Self {
            module,
            ctx: Context::new(),
            defined,
            externals: Vec::new(),
            emitted: HashSet::new(),
            classes: BTreeSet::new(),
            exports: HashSet::new(),
        }
    }

    fn module_body(&mut self) -> CResult<Vec<Stmt>> {
        let module = self.module;
        for (name, layout) in &module.types {
            if matches!(layout, TypeLayout::Class { .. }) {
                self.classes.insert(name.clone());
            }
        }
        for decl in &module.declarations {
            if let Declaration::VTable(table) = decl {
                self.classes.insert(base_type_name(&table.class).to_string());
            }
        }
        let mut body: Vec<Stmt> = self
            .classes
            .iter()
            .map(|name| Stmt::Function {
                name: name.clone(),
                params: Vec::new(),
                body: Vec::new(),
            })
            .collect();
        let mut tail = Vec::new();
        for decl in &module.declarations {
            match decl {
                Declaration::Global(global) => {
                    body.push(Stmt::var(
                        VarKind::Const,
                        js_name(&global.name),
                        Some(Expr::Array(Vec::new())),
                    ));
                }
                Declaration::Function(function) if !function.is_declaration() => {
                    log::debug!("sil function: {}", function.name);
                    body.push(self.function(function)?);
                    if let Some(name) = &function.beautiful_name {
                        if self.exports.insert(name.clone()) {
                            body.push(Stmt::Export(Box::new(Stmt::var(
                                VarKind::Const,
                                name.clone(),
                                Some(Expr::ident(js_name(&function.name))),
                            ))));
                        } else {
                            log::warn!("duplicate export {} for {}", name, function.name);
                        }
                    }
                }
                Declaration::Function(_) => {}
                Declaration::VTable(table) => {
                    let class = base_type_name(&table.class).to_string();
                    for entry in &table.entries {
                        let implementation = self.function_ref(&entry.function)?;
                        let prototype = Expr::member(Expr::ident(class.clone()), "prototype");
                        tail.push(assign(property(prototype, &entry.method), implementation));
                    }
                }
            }
        }
        if self.defined.contains("main") {
            tail.push(Stmt::expr(Expr::call(Expr::ident("main"), Vec::new())));
        }
        let mut out = std::mem::take(&mut self.externals);
        out.extend(body);
        out.extend(tail);
        Ok(out)
    }

    fn function(&mut self, function: &Function) -> CResult<Stmt> {
        let entry = function.blocks.first().ok_or_else(|| {
            CompileError::new("SSA002", format!("function {} has no blocks", function.name))
        })?;
        let mut params: Vec<String> = entry.arguments.iter().map(|a| local_name(&a.name)).collect();
        let mut prologue = Vec::new();
        let bound: HashSet<String> = params.iter().cloned().collect();
        if function.convention.passes_self() {
            if let Some(this) = params.pop() {
                prologue.push(Stmt::var(VarKind::Let, this, Some(Expr::This)));
            }
        }
        let loops_to_entry = function
            .blocks
            .iter()
            .chain(function.inlined.values())
            .filter_map(BasicBlock::terminator)
            .any(|t| t.targets().iter().any(|target| target.block == entry.name));
        let mut st = FnState {
            function,
            params: bound,
            variables: Vec::new(),
            declared: HashSet::new(),
            temps: 0,
            dispatch: function.blocks.len() > 1 || loops_to_entry,
            current: 0,
        };
        let body = if st.dispatch {
            let mut cases = Vec::with_capacity(function.blocks.len());
            for (index, block) in function.blocks.iter().enumerate() {
                st.current = index;
                cases.push(SwitchCase {
                    test: Some(Expr::num(index as f64)),
                    body: self.block(&mut st, block, true)?,
                });
            }
            vec![Stmt::For {
                init: None,
                test: None,
                update: None,
                body: vec![Stmt::Switch {
                    discriminant: Expr::ident("state"),
                    cases,
                }],
            }]
        } else {
            self.block(&mut st, entry, true)?
        };
        let mut decls: Vec<(String, Option<Expr>)> = Vec::new();
        if st.dispatch {
            decls.push(("state".to_string(), Some(Expr::num(0.0))));
        }
        decls.extend(st.variables.into_iter().map(|v| (v, None)));
        if !decls.is_empty() {
            prologue.push(Stmt::Var {
                kind: VarKind::Let,
                decls,
            });
        }
        prologue.extend(body);
        Ok(Stmt::Function {
            name: js_name(&function.name),
            params,
            body: prologue,
        })
    }

    fn block(&mut self, st: &mut FnState, block: &BasicBlock, tail: bool) -> CResult<Vec<Stmt>> {
        let mut out = Vec::new();
        let count = block.instructions.len();
        for (i, inst) in block.instructions.iter().enumerate() {
            self.instruction(st, inst, tail && i + 1 == count, &mut out)?;
        }
        Ok(out)
    }

    fn instruction(
        &mut self,
        st: &mut FnState,
        inst: &Instruction,
        tail: bool,
        out: &mut Vec<Stmt>,
    ) -> CResult<()> {
        match inst {
            Instruction::Assign { dest, value } => {
                let e = self.rvalue(st, value)?;
                if st.dispatch {
                    st.declare(&local_name(dest));
                    out.push(assign(local(dest), e));
                } else {
                    out.push(Stmt::var(VarKind::Const, local_name(dest), Some(e)));
                }
            }
            Instruction::Return(Rvalue::Tuple(items)) if items.is_empty() => {
                out.push(Stmt::Return(None));
            }
            Instruction::Return(value) => {
                let e = self.rvalue(st, value)?;
                out.push(Stmt::ret(e));
            }
            Instruction::Throw(value) => {
                let e = self.rvalue(st, value)?;
                out.push(Stmt::Throw(e));
            }
            Instruction::Branch { target, args } => {
                let sources = args.iter().map(|a| local(a)).collect();
                out.extend(self.jump(st, target, sources, tail)?);
            }
            Instruction::CondBranch {
                cond,
                on_true,
                true_args,
                on_false,
                false_args,
            } => {
                let consequent =
                    self.jump(st, on_true, true_args.iter().map(|a| local(a)).collect(), tail)?;
                let alternate =
                    self.jump(st, on_false, false_args.iter().map(|a| local(a)).collect(), tail)?;
                if consequent.is_empty() {
                    out.push(chain(Expr::unary("!", local(cond)), alternate, None));
                } else if alternate.is_empty() {
                    out.push(chain(local(cond), consequent, None));
                } else {
                    out.push(chain(local(cond), consequent, Some(alternate)));
                }
            }
            Instruction::CondFail { cond, message } => {
                let fail = stdlib::trap_call(&mut self.ctx, trap_for_message(message.as_deref()))?;
                out.push(Stmt::if_else(local(cond), vec![Stmt::expr(fail)], None));
            }
            Instruction::Store {
                src,
                dest,
                ty,
                initializes,
            } => {
                self.store(st, unbox(local(dest)), local(src), ty, *initializes, out);
            }
            Instruction::CopyAddr {
                src,
                dest,
                ty,
                initializes,
            } => {
                self.store(st, unbox(local(dest)), unbox(local(src)), ty, *initializes, out);
            }
            Instruction::InjectEnumAddr { dest, ty, case } => {
                let index = self.case_index(ty, case)?;
                out.push(assign(
                    Expr::index(unbox(local(dest)), Expr::num(0.0)),
                    Expr::num(index as f64),
                ));
            }
            Instruction::AllocGlobal(symbol) => {
                let ty = self.module.declarations.iter().find_map(|d| match d {
                    Declaration::Global(g) if &g.name == symbol => Some(g.ty.as_str()),
                    _ => None,
                });
                if let Some(initial) = ty.and_then(|t| self.alloc_value(t)) {
                    out.push(assign(
                        Expr::index(Expr::ident(js_name(symbol)), Expr::num(0.0)),
                        initial,
                    ));
                }
            }
            Instruction::SwitchEnum {
                operand,
                ty,
                addr,
                cases,
            } => {
                let value = if *addr { unbox(local(operand)) } else { local(operand) };
                let payload = |v: &Expr| {
                    if *addr {
                        Vec::new()
                    } else {
                        vec![Expr::index(v.clone(), Expr::num(1.0))]
                    }
                };
                let mut alternate = None;
                if let Some((_, target)) = cases.iter().find(|(case, _)| case.is_none()) {
                    alternate = Some(self.jump(st, target, Vec::new(), tail)?);
                }
                let named: Vec<&(Option<String>, Target)> =
                    cases.iter().filter(|(case, _)| case.is_some()).collect();
                for (i, (case, target)) in named.iter().enumerate().rev() {
                    let body = self.jump(st, target, payload(&value), tail)?;
                    let Some(case) = case else { continue };
                    if alternate.is_none() && i + 1 == named.len() {
                        alternate = Some(body);
                        continue;
                    }
                    let index = self.case_index(ty, case)?;
                    let test = Expr::binary(
                        "===",
                        Expr::index(value.clone(), Expr::num(0.0)),
                        Expr::num(index as f64),
                    );
                    alternate = Some(vec![chain(test, body, alternate)]);
                }
                out.extend(alternate.unwrap_or_default());
            }
            Instruction::TryApply {
                callee,
                args,
                convention,
                normal,
                error,
            } => {
                let call = self.apply(callee, args, convention);
                let normal_block = st.block(&normal.block)?;
                let attempt = match normal_block.arguments.first() {
                    Some(result) => {
                        let name = local_name(&result.name);
                        st.declare(&name);
                        assign(Expr::ident(name), call)
                    }
                    None => Stmt::expr(call),
                };
                let handler = self.jump(st, error, vec![Expr::ident("$error")], false)?;
                out.push(Stmt::Try {
                    block: vec![attempt],
                    handler: Some(("$error".to_string(), handler)),
                    finalizer: None,
                });
                out.extend(self.jump(st, normal, Vec::new(), tail)?);
            }
            Instruction::Unreachable => out.push(Stmt::Return(None)),
        }
        Ok(())
    }

    /// 分岐先へ移る文。引数を並列代入し、展開済みのブロックはその場に出力する。
    fn jump(
        &mut self,
        st: &mut FnState,
        target: &Target,
        sources: Vec<Expr>,
        tail: bool,
    ) -> CResult<Vec<Stmt>> {
        let block = st.block(&target.block)?;
        let mut out = self.move_args(st, &block.arguments, sources);
        if target.inline {
            out.extend(self.block(st, block, tail)?);
            return Ok(out);
        }
        let index = st
            .function
            .blocks
            .iter()
            .position(|b| b.name == target.block)
            .ok_or_else(|| {
                CompileError::new("SSA002", format!("block {} is not dispatchable", target.block))
            })?;
        if !st.dispatch {
            return Err(CompileError::new(
                "SSA002",
                format!("jump to {} outside a dispatch loop", target.block),
            ));
        }
        if !(tail && index == st.current + 1) {
            out.push(assign(Expr::ident("state"), Expr::num(index as f64)));
            out.push(Stmt::Continue);
        }
        Ok(out)
    }

    fn move_args(&mut self, st: &mut FnState, params: &[Local], sources: Vec<Expr>) -> Vec<Stmt> {
        let pairs: Vec<(String, Expr)> = params
            .iter()
            .zip(sources)
            .map(|(p, s)| (local_name(&p.name), s))
            .filter(|(p, s)| !matches!(s, Expr::Ident(n) if n == p))
            .collect();
        for (name, _) in &pairs {
            st.declare(name);
        }
        let conflict = pairs.iter().enumerate().any(|(i, (_, s))| {
            pairs
                .iter()
                .enumerate()
                .any(|(j, (p, _))| i != j && mentions(s, p))
        });
        if !conflict {
            return pairs
                .into_iter()
                .map(|(p, s)| assign(Expr::ident(p), s))
                .collect();
        }
        let mut out = Vec::with_capacity(pairs.len() * 2);
        let mut moves = Vec::with_capacity(pairs.len());
        for (p, s) in pairs {
            let temp = st.temp();
            out.push(assign(Expr::ident(temp.clone()), s));
            moves.push(assign(Expr::ident(p), Expr::ident(temp)));
        }
        out.extend(moves);
        out
    }

    /// 格納。初期化でない複数フィールドの構造体は既存のオブジェクトへフィールドごとに書く。
    fn store(
        &mut self,
        st: &mut FnState,
        target: Expr,
        src: Expr,
        ty: &str,
        initializes: bool,
        out: &mut Vec<Stmt>,
    ) {
        match self.module.layout(ty) {
            Some(TypeLayout::Struct { fields }) if fields.len() == 1 => {
                let field_ty = fields[0].ty.clone();
                self.store(st, target, src, &field_ty, initializes, out)
            }
            Some(TypeLayout::Struct { fields }) if !initializes => {
                for field in fields.clone() {
                    self.store(
                        st,
                        Expr::member(target.clone(), field.name.clone()),
                        Expr::member(src.clone(), field.name.clone()),
                        &field.ty,
                        false,
                        out,
                    );
                }
            }
            _ => {
                let value = self.copy(st, src, ty);
                out.push(assign(target, value));
            }
        }
    }

    /// 値型の複製。構造体はフィールドごと、列挙は配列の複製。
    fn copy(&mut self, st: &mut FnState, e: Expr, ty: &str) -> Expr {
        match self.module.layout(ty) {
            Some(TypeLayout::Struct { fields }) if fields.len() == 1 => {
                let field_ty = fields[0].ty.clone();
                self.copy(st, e, &field_ty)
            }
            Some(TypeLayout::Struct { fields }) => {
                let fields = fields.clone();
                let (prefix, base) = match e {
                    Expr::Ident(_) => (None, e),
                    other => {
                        let temp = st.temp();
                        (
                            Some(Expr::assign("=", Expr::ident(temp.clone()), other)),
                            Expr::ident(temp),
                        )
                    }
                };
                let props = fields
                    .iter()
                    .map(|f| {
                        let source = Expr::member(base.clone(), f.name.clone());
                        let value = self.copy(st, source, &f.ty);
                        Property::field(f.name.clone(), value)
                    })
                    .collect();
                match prefix {
                    Some(first) => Expr::Sequence(vec![first, Expr::Object(props)]),
                    None => Expr::Object(props),
                }
            }
            Some(TypeLayout::Enum { .. }) => Expr::call(Expr::member(e, "slice"), Vec::new()),
            _ => e,
        }
    }

    /// 確保直後の値。アドレス計算でたどる構造体と列挙だけ骨組みを作る。
    fn alloc_value(&self, ty: &str) -> Option<Expr> {
        match self.module.layout(ty)? {
            TypeLayout::Struct { fields } if fields.len() == 1 => self.alloc_value(&fields[0].ty),
            TypeLayout::Struct { fields } => Some(Expr::Object(
                fields
                    .iter()
                    .filter_map(|f| {
                        self.alloc_value(&f.ty)
                            .map(|v| Property::field(f.name.clone(), v))
                    })
                    .collect(),
            )),
            TypeLayout::Enum { .. } => Some(Expr::Array(Vec::new())),
            _ => None,
        }
    }

    fn case_index(&self, ty: &str, case: &str) -> CResult<usize> {
        match self.module.layout(ty) {
            Some(TypeLayout::Enum { cases }) => {
                cases.iter().position(|c| c == case).ok_or_else(|| {
                    CompileError::new("SSA003", format!("unknown case {} of {}", case, ty))
                })
            }
            _ => Err(CompileError::new(
                "SSA001",
                format!("no enum layout for {}", ty),
            )),
        }
    }

    fn apply(&self, callee: &str, args: &[String], convention: &Convention) -> Expr {
        let callee = local(callee);
        let mut args: Vec<Expr> = args.iter().map(|a| local(a)).collect();
        if convention.passes_self() {
            if let Some(this) = args.pop() {
                args.insert(0, this);
                return Expr::call(Expr::member(callee, "call"), args);
            }
        }
        Expr::call(callee, args)
    }

    /// 関数シンボルの参照。本体がなければ標準ライブラリから補い、それもなければ代替名にする。
    fn function_ref(&mut self, symbol: &str) -> CResult<Expr> {
        let name = js_name(symbol);
        if self.defined.contains(symbol) {
            return Ok(Expr::ident(name));
        }
        if let Some(external) = stdlib::external(symbol) {
            if self.emitted.insert(symbol.to_string()) {
                let body = (external.body)(&mut self.ctx)?;
                self.externals.push(Stmt::Function {
                    name: name.clone(),
                    params: external.params.iter().map(|p| p.to_string()).collect(),
                    body,
                });
            }
            return Ok(Expr::ident(name));
        }
        if self.emitted.insert(symbol.to_string()) {
            log::warn!("missing builtin: {}", symbol);
        }
        Ok(Expr::ident(format!("todo_missing_builtin${}", mangle_name(symbol))))
    }

    fn class_ref(&mut self, ty: &str) -> Expr {
        let name = base_type_name(ty).to_string();
        if self.classes.insert(name.clone()) {
            self.externals.push(Stmt::Function {
                name: name.clone(),
                params: Vec::new(),
                body: Vec::new(),
            });
        }
        Expr::ident(name)
    }

    fn rvalue(&mut self, st: &mut FnState, value: &Rvalue) -> CResult<Expr> {
        Ok(match value {
            Rvalue::IntegerLiteral { ty, value } => {
                if ty.ends_with("Int1") {
                    Expr::Bool(*value != 0)
                } else {
                    Expr::num(*value as f64)
                }
            }
            Rvalue::FloatLiteral(v) => Expr::num(*v),
            Rvalue::StringLiteral(s) => Expr::str_lit(s.clone()),
            Rvalue::Enum { ty, case, payload } => {
                let mut items = vec![Expr::num(self.case_index(ty, case)? as f64)];
                if let Some(p) = payload {
                    items.push(local(p));
                }
                Expr::Array(items)
            }
            Rvalue::Struct { ty, fields } => {
                let layout = match self.module.layout(ty) {
                    Some(TypeLayout::Struct { fields }) => fields.clone(),
                    _ => {
                        return Err(CompileError::new(
                            "SSA001",
                            format!("no struct layout for {}", ty),
                        ))
                    }
                };
                if layout.len() != fields.len() {
                    return Err(CompileError::new(
                        "SSA004",
                        format!(
                            "struct {} has {} stored fields but {} operands",
                            ty,
                            layout.len(),
                            fields.len()
                        ),
                    ));
                }
                Expr::Object(
                    layout
                        .iter()
                        .zip(fields)
                        .map(|(f, v)| Property::field(f.name.clone(), local(v)))
                        .collect(),
                )
            }
            Rvalue::Tuple(items) if items.is_empty() => Expr::undefined(),
            Rvalue::Tuple(items) => Expr::Array(items.iter().map(|i| local(i)).collect()),
            Rvalue::StructExtract { operand, ty, field } => {
                let field_ty = self.field_type(ty, field);
                let e = Expr::member(local(operand), field.clone());
                match field_ty {
                    Some(t) => self.copy(st, e, &t),
                    None => e,
                }
            }
            Rvalue::StructField { operand, ty, index } => {
                let field = match self.module.layout(ty) {
                    Some(TypeLayout::Struct { fields }) => fields.get(*index).cloned(),
                    _ => None,
                };
                let field = field.ok_or_else(|| {
                    CompileError::new("SSA004", format!("no field {} in {}", index, ty))
                })?;
                self.copy(st, Expr::member(local(operand), field.name), &field.ty)
            }
            Rvalue::TupleExtract { operand, index } => {
                Expr::index(local(operand), Expr::num(*index as f64))
            }
            Rvalue::Builtin { name, args } => {
                let operands: Vec<Expr> = args.iter().map(|a| local(a)).collect();
                match lower_builtin(&mut self.ctx, name, operands.clone())? {
                    Some(e) => e,
                    None => {
                        log::warn!("missing builtin: Builtin.{}", name);
                        let stub = format!("todo_missing_builtin$Builtin_{}", mangle_name(name));
                        Expr::call(Expr::ident(stub), operands)
                    }
                }
            }
            Rvalue::FunctionRef(symbol) => self.function_ref(symbol)?,
            Rvalue::Apply {
                callee,
                args,
                convention,
            } => self.apply(callee, args, convention),
            Rvalue::PartialApply {
                callee,
                args,
                arity,
            } => {
                let params: Vec<String> = (0..*arity).map(|i| format!("$arg{}", i)).collect();
                let mut call_args: Vec<Expr> =
                    params.iter().map(|p| Expr::ident(p.clone())).collect();
                call_args.extend(args.iter().map(|a| local(a)));
                Expr::function(params, vec![Stmt::ret(Expr::call(local(callee), call_args))])
            }
            Rvalue::AllocStack { ty } | Rvalue::AllocBox { ty } => {
                let initial = self.alloc_value(ty).into_iter().collect();
                make_box(Expr::Array(initial), Expr::num(0.0))
            }
            Rvalue::AllocRef { ty } => Expr::new_expr(self.class_ref(ty), Vec::new()),
            Rvalue::ProjectBox(operand) => local(operand),
            Rvalue::GlobalAddr(symbol) => make_box(Expr::ident(js_name(symbol)), Expr::num(0.0)),
            Rvalue::StructElementAddr { operand, field, .. } => {
                make_box(unbox(local(operand)), Expr::str_lit(field.clone()))
            }
            Rvalue::TupleElementAddr { operand, index } => {
                make_box(unbox(local(operand)), Expr::num(*index as f64))
            }
            Rvalue::RefElementAddr { operand, field } => {
                make_box(local(operand), Expr::str_lit(field.clone()))
            }
            Rvalue::Load { operand, ty } => {
                let e = unbox(local(operand));
                self.copy(st, e, ty)
            }
            Rvalue::UncheckedEnumData(operand) => Expr::index(local(operand), Expr::num(1.0)),
            Rvalue::EnumDataAddr(operand) => make_box(unbox(local(operand)), Expr::num(1.0)),
            Rvalue::SelectEnum {
                operand,
                ty,
                addr,
                cases,
            } => {
                let value = if *addr { unbox(local(operand)) } else { local(operand) };
                let mut result = cases
                    .iter()
                    .find(|(case, _)| case.is_none())
                    .map(|(_, v)| local(v));
                let named: Vec<&(Option<String>, String)> =
                    cases.iter().filter(|(case, _)| case.is_some()).collect();
                for (case, v) in named.iter().rev() {
                    let Some(case) = case else { continue };
                    result = Some(match result {
                        None => local(v),
                        Some(rest) => {
                            let index = self.case_index(ty, case)?;
                            let test = Expr::binary(
                                "===",
                                Expr::index(value.clone(), Expr::num(0.0)),
                                Expr::num(index as f64),
                            );
                            Expr::conditional(test, local(v), rest)
                        }
                    });
                }
                result.unwrap_or_else(Expr::undefined)
            }
            Rvalue::IndexAddr { base, index } => {
                let b = local(base);
                make_box(
                    Expr::member(b.clone(), "ref"),
                    Expr::binary("+", Expr::member(b, "field"), local(index)),
                )
            }
            Rvalue::Metatype => Expr::undefined(),
            Rvalue::ClassMethod { operand, method } => property(local(operand), method),
            Rvalue::Forward(operand) => local(operand),
        })
    }

    fn field_type(&self, ty: &str, field: &str) -> Option<String> {
        match self.module.layout(ty)? {
            TypeLayout::Struct { fields } | TypeLayout::Class { fields, .. } => fields
                .iter()
                .find(|f| f.name == field)
                .map(|f| f.ty.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::printer::{print_program, PrinterOptions};
    use crate::sil::{optimize, parse_sil};

    fn compile(source: &str) -> String {
        let mut module = parse_sil(source).expect("parse");
        optimize(&mut module);
        let program = compile_module(&module).expect("compile");
        print_program(&program, &PrinterOptions::default())
    }

    const INCREMENT: &str = r#"// increment(number:)
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

    #[test]
    /// 単一ブロックの関数は直線のコードになり、公開名で再公開される
    fn straight_line_function() {
        let text = compile(INCREMENT);
        assert!(text.contains("function $s4main9increment6numberS2i_tF(_0) {"));
        assert!(text.contains("export const increment = $s4main9increment6numberS2i_tF;"));
        assert!(text.contains("return _6;"));
        assert!(!text.contains("switch (state)"));
        assert!(text.contains("throw new RangeError"));
    }

    const COUNTDOWN: &str = r#"// countdown(from:)
sil @$s4main9countdown4fromS2i_tF : $@convention(thin) (Int) -> Int {
bb0(%0 : $Int):
  %1 = struct_extract %0 : $Int, #Int._value
  br bb1(%1 : $Builtin.Int64)
bb1(%3 : $Builtin.Int64):
  %4 = integer_literal $Builtin.Int64, 0
  %5 = builtin "cmp_sgt_Int64"(%3 : $Builtin.Int64, %4 : $Builtin.Int64) : $Builtin.Int1
  cond_br %5, bb2, bb3
bb2:
  %7 = integer_literal $Builtin.Int64, 1
  %8 = builtin "sub_Int64"(%3 : $Builtin.Int64, %7 : $Builtin.Int64) : $Builtin.Int64
  br bb1(%8 : $Builtin.Int64)
bb3:
  %10 = struct $Int (%3 : $Builtin.Int64)
  return %10 : $Int
}
"#;

    #[test]
    /// ループは state による分岐表になり、ブロック引数は分岐元で代入される
    fn loops_use_dispatch_table() {
        let text = compile(COUNTDOWN);
        assert!(text.contains("let state = 0"));
        assert!(text.contains("switch (state)"));
        assert!(text.contains("_3 = _0;"));
        assert!(text.contains("_3 = _8;"));
        assert!(text.contains("state = 1;"));
    }

    #[test]
    /// 列挙の構築と switch_enum はケース番号で表される
    fn enums_are_tagged_arrays() {
        let src = r#"enum Shape {
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
        let text = compile(src);
        assert!(text.contains("if (_0[0] === 0) {"));
        assert!(text.contains("_2 = _0[1];"));
        assert!(text.contains("return _2;"));
    }

    #[test]
    /// 知らない列挙型の構築はエラー
    fn unknown_enum_layout_is_error() {
        let src = "sil @f : $@convention(thin) () -> Mystery {\nbb0:\n  %0 = enum $Mystery, #Mystery.a!enumelt\n  return %0 : $Mystery\n}\n";
        let mut module = parse_sil(src).expect("parse");
        optimize(&mut module);
        let err = compile_module(&module).expect_err("layout");
        assert_eq!(err.code(), "SSA001");
    }
}
