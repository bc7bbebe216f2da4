// パス: src/context.rs
// 役割: 変換全体で共有する状態（スコープアリーナ・型表・関数表・プロトコル表・補助関数）を保持する
// 意図: 大域的な可変状態を持たず、`&mut Context` を明示的に受け渡して変換を進める
// 関連ファイル: src/scope.rs, src/functions.rs, src/reified.rs, src/builtins/mod.rs
//! 変換コンテキスト
//!
//! - スコープは `Vec<Scope>` のアリーナ。ルートは `ScopeId::ROOT` で親を持たない唯一のスコープ。
//! - 補助関数（境界チェック失敗・witness table など）はルートスコープの宣言として一度だけ出力される。
//! - 名前の宣言は各スコープで一度だけ。探索は親方向に辿る。

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::builtins::protocols::ProtocolDefinition;
use crate::errors::{CResult, CompileError};
use crate::functions::FunctionEntry;
use crate::js::printer::is_valid_identifier;
use crate::js::{Stmt, VarKind};
use crate::reified::TypeConstructor;
use crate::scope::{mangle_name, DeclarationFlags, Scope, ScopeId};
use crate::values::{transform_statements, Value};

pub struct Context {
    scopes: Vec<Scope>,
    /// 名前付き型の構築子（組み込みと宣言済みの struct/enum/class）
    pub types: BTreeMap<String, Rc<dyn TypeConstructor>>,
    /// 自由関数（Swift の名前 → 関数）
    pub functions: BTreeMap<String, FunctionEntry>,
    pub protocols: BTreeMap<String, Rc<ProtocolDefinition>>,
    /// 出力済み補助関数（キー → 識別子）
    helpers: BTreeMap<String, String>,
    /// 展開中のインライン関数（再帰検出用）
    inline_stack: Vec<String>,
    /// `#file` に使うファイル名
    pub file_name: String,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new("global", None, false)],
            types: BTreeMap::new(),
            functions: BTreeMap::new(),
            protocols: BTreeMap::new(),
            helpers: BTreeMap::new(),
            inline_stack: Vec::new(),
            file_name: String::from("main.swift"),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::ROOT
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    /// 新しい子スコープ（JavaScript のブロックや関数に対応する）。
    pub fn new_scope(&mut self, name: impl Into<String>, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope::new(name, Some(parent), false));
        ScopeId(self.scopes.len() - 1)
    }

    /// 呼び出し元の文列へ展開されるスコープ。宣言した名前は親にも予約される。
    pub fn new_inline_scope(&mut self, name: impl Into<String>, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope::new(name, Some(parent), true));
        ScopeId(self.scopes.len() - 1)
    }

    /// 直近の関数スコープ名（`#function` 用）。
    pub fn scope_name(&self, id: ScopeId) -> &str {
        &self.scope(id).name
    }

    fn chain(&self, id: ScopeId) -> impl Iterator<Item = &Scope> + '_ {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let current = next?;
            let scope = &self.scopes[current.0];
            next = scope.parent;
            Some(scope)
        })
    }

    /// 親方向のどこかで名前が使われているか。
    pub fn has_name_in_scope(&self, id: ScopeId, name: &str) -> bool {
        self.chain(id)
            .any(|s| s.uses_name(name) || s.mapping.contains_key(name))
    }

    pub fn has_declaration(&self, id: ScopeId, name: &str) -> bool {
        self.scope(id).has_declaration(name)
    }

    /// このスコープで Swift の変数として宣言済みか。
    pub fn has_variable(&self, id: ScopeId, name: &str) -> bool {
        self.scope(id).variables.contains(name)
    }

    /// `prefix`, `prefix0`, `prefix1`, … の順で未使用の名前を探す。
    pub fn unique_name(&self, id: ScopeId, prefix: &str) -> String {
        let base = if is_valid_identifier(prefix) {
            prefix.to_string()
        } else {
            mangle_name(prefix)
        };
        if !self.has_name_in_scope(id, &base) {
            return base;
        }
        let mut i = 0usize;
        loop {
            let candidate = format!("{}{}", base, i);
            if !self.has_name_in_scope(id, &candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    /// 名前を宣言する（巻き上げ文は任意）。同じスコープでの二重宣言はエラー。
    pub fn declare(&mut self, id: ScopeId, name: &str, stmt: Option<Stmt>) -> CResult<()> {
        if self.scope(id).has_declaration(name) {
            return Err(CompileError::new(
                "SCP001",
                format!("Declaration of {} already exists", name),
            ));
        }
        self.scope_mut(id).declarations.push((name.to_string(), stmt));
        let mut current = id;
        while self.scope(current).inline {
            match self.scope(current).parent {
                Some(parent) => {
                    self.scope_mut(parent).reserved.insert(name.to_string());
                    current = parent;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// 宣言済みの巻き上げ文を差し替える（未宣言なら追加する）。
    pub fn set_declaration(&mut self, id: ScopeId, name: &str, stmt: Stmt) {
        let scope = self.scope_mut(id);
        match scope.declarations.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = Some(stmt),
            None => scope.declarations.push((name.to_string(), Some(stmt))),
        }
    }

    /// 一時変数を宣言する（`let name;` を巻き上げる）。
    pub fn declare_temporary(&mut self, id: ScopeId, prefix: &str) -> CResult<String> {
        let name = self.unique_name(id, prefix);
        self.declare(id, &name, Some(Stmt::var(VarKind::Let, name.clone(), None)))?;
        Ok(name)
    }

    /// 巻き上げ文なしで一意な名前を確保する（引数名・定数の一時変数）。
    pub fn reserve_unique(&mut self, id: ScopeId, prefix: &str) -> CResult<String> {
        let name = self.unique_name(id, prefix);
        self.declare(id, &name, None)?;
        Ok(name)
    }

    /// このスコープだけで有効な名前の対応を登録する。
    pub fn map_value(&mut self, id: ScopeId, name: impl Into<String>, value: Value) {
        self.scope_mut(id).mapping.insert(name.into(), value);
    }

    /// 親方向に辿って対応付けられた値を探す。
    pub fn mapped_value(&self, id: ScopeId, name: &str) -> Option<Value> {
        self.chain(id).find_map(|s| s.mapping.get(name).cloned())
    }

    /// 名前を値に解決する。対応がなければマングルした識別子。
    pub fn lookup(&self, id: ScopeId, name: &str) -> Value {
        self.mapped_value(id, name)
            .unwrap_or_else(|| Value::ident(mangle_name(name)))
    }

    /// 変数を宣言し、宣言文を返す。
    pub fn add_variable(
        &mut self,
        id: ScopeId,
        name: &str,
        init: Option<Value>,
        flags: DeclarationFlags,
    ) -> CResult<Vec<Stmt>> {
        if self.scope(id).variables.contains(name) {
            return Err(CompileError::new(
                "SCP001",
                format!("Declaration of {} already exists", name),
            ));
        }
        let mangled = mangle_name(name);
        let ident = if self.scope(id).uses_name(&mangled) {
            self.unique_name(id, &mangled)
        } else {
            mangled
        };
        self.declare(id, &ident, None)?;
        self.scope_mut(id).variables.insert(name.to_string());
        self.map_value(id, name, Value::ident(ident.clone()));
        let kind = if flags.contains(DeclarationFlags::CONST) {
            VarKind::Const
        } else {
            VarKind::Let
        };
        let export = flags.contains(DeclarationFlags::EXPORT);
        let wrap = move |stmt: Stmt| {
            if export {
                Stmt::Export(Box::new(stmt))
            } else {
                stmt
            }
        };
        match init {
            None => Ok(vec![wrap(Stmt::var(VarKind::Let, ident, None))]),
            Some(value) => transform_statements(self, id, value, &mut |_, _, e| {
                Ok(vec![wrap(Stmt::var(kind, ident.clone(), Some(e)))])
            }),
        }
    }

    /// スコープの巻き上げ文を本体の前に付けて返す。一度出力した文は再出力しない。
    pub fn emit_scope(&mut self, id: ScopeId, body: Vec<Stmt>) -> Vec<Stmt> {
        let mut out: Vec<Stmt> = self
            .scope_mut(id)
            .declarations
            .iter_mut()
            .filter_map(|(_, stmt)| stmt.take())
            .collect();
        out.extend(body);
        out
    }

    /// 出力済みの補助関数の識別子。
    pub fn helper(&self, key: &str) -> Option<&str> {
        self.helpers.get(key).map(String::as_str)
    }

    /// 補助宣言をルートに一度だけ出力し、その識別子を返す。
    ///
    /// 本体を組み立てる前に識別子を登録するので、再帰的な参照は同じ識別子に解決される。
    pub fn emit_helper(
        &mut self,
        key: &str,
        build: impl FnOnce(&mut Context, &str) -> CResult<Stmt>,
    ) -> CResult<String> {
        if let Some(existing) = self.helpers.get(key) {
            return Ok(existing.clone());
        }
        let ident = self.unique_name(ScopeId::ROOT, key);
        self.declare(ScopeId::ROOT, &ident, None)?;
        self.helpers.insert(key.to_string(), ident.clone());
        log::debug!("helper: {} -> {}", key, ident);
        let stmt = build(self, &ident)?;
        self.set_declaration(ScopeId::ROOT, &ident, stmt);
        Ok(ident)
    }

    /// インライン展開中の関数キーを積む。すでに展開中なら false。
    pub fn enter_inline(&mut self, key: &str) -> bool {
        if self.inline_stack.iter().any(|k| k == key) {
            return false;
        }
        self.inline_stack.push(key.to_string());
        true
    }

    pub fn leave_inline(&mut self, key: &str) {
        if let Some(pos) = self.inline_stack.iter().rposition(|k| k == key) {
            self.inline_stack.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::Expr;

    #[test]
    /// 一意名は prefix, prefix0, prefix1 の順に探す
    fn unique_names_take_numeric_suffixes() {
        let mut ctx = Context::new();
        let root = ctx.root();
        assert_eq!(ctx.reserve_unique(root, "temp").expect("temp"), "temp");
        assert_eq!(ctx.reserve_unique(root, "temp").expect("temp0"), "temp0");
        let child = ctx.new_scope("child", root);
        assert_eq!(ctx.unique_name(child, "temp"), "temp1");
    }

    #[test]
    /// 同じスコープでの二重宣言はエラー
    fn duplicate_declaration_fails() {
        let mut ctx = Context::new();
        let root = ctx.root();
        ctx.add_variable(root, "x", None, DeclarationFlags::NONE)
            .expect("first");
        let err = ctx
            .add_variable(root, "x", None, DeclarationFlags::NONE)
            .expect_err("second");
        assert_eq!(err.code(), "SCP001");
        assert!(err.to_string().contains("Declaration of x already exists"));
    }

    #[test]
    /// 対応付けは子スコープから見えるが親からは見えない
    fn mapping_is_scoped() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let child = ctx.new_scope("child", root);
        ctx.map_value(child, "self", Value::Direct(Expr::This));
        assert!(matches!(ctx.lookup(child, "self"), Value::Direct(Expr::This)));
        assert!(
            matches!(ctx.lookup(root, "self"), Value::Direct(Expr::Ident(ref n)) if n == "self")
        );
    }

    #[test]
    /// インラインスコープの宣言は親で予約される
    fn inline_scope_reserves_in_parent() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let func = ctx.new_scope("f", root);
        let inline = ctx.new_inline_scope("g", func);
        ctx.reserve_unique(inline, "value").expect("reserve");
        assert_eq!(ctx.unique_name(func, "value"), "value0");
    }

    #[test]
    /// 補助関数は一度だけ出力される
    fn helpers_emit_once() {
        let mut ctx = Context::new();
        let mut calls = 0;
        for _ in 0..2 {
            ctx.emit_helper("Swift.(swift-to-js).arrayBoundsFailed()", |_, name| {
                calls += 1;
                Ok(Stmt::Function {
                    name: name.to_string(),
                    params: vec![],
                    body: vec![],
                })
            })
            .expect("emit");
        }
        assert_eq!(calls, 1);
        let out = ctx.emit_scope(ScopeId::ROOT, vec![]);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Stmt::Function { name, .. } if name == "$$arrayBoundsFailed"));
    }
}
