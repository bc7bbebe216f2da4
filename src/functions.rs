// パス: src/functions.rs
// 役割: 関数ビルダー・引数の取り出し口・関数化（JavaScript 関数への確定）を提供する
// 意図: 組み込み関数とユーザー関数を同じ呼び出し規約（平坦な引数列）で扱う
// 関連ファイル: src/values/ops.rs, src/reified.rs, src/builtins/common.rs, src/frontend/decls.rs
//! 関数と呼び出し規約
//!
//! - 引数は平坦な列。インスタンスメンバーは `[self, ...]`、静的メンバー・演算子・イニシャライザは `[...]`。
//! - ジェネリックな自由関数は置換（型・witness table）を先頭に、具象型のメンバーは末尾に受け取る。
//! - `Args::Values` は呼び出し位置の値、`Args::Parameters` は関数化中の仮引数で、名前は要求時に決まる。

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Context;
use crate::errors::{CResult, CompileError};
use crate::js::{Expr, Stmt, VarKind};
use crate::scope::ScopeId;
use crate::types::Type;
use crate::values::{self, CallKind, Value};

/// 関数本体の組み立て器。最後の引数は関数名（スコープ名とエラー表示に使う）。
pub type FunctionBuilder = Rc<dyn Fn(&mut Context, ScopeId, &Args, &str) -> CResult<Value>>;

#[derive(Clone)]
pub enum FunctionEntry {
    Plain(FunctionBuilder),
    Property {
        get: FunctionBuilder,
        set: Option<FunctionBuilder>,
    },
    /// 呼び出し種別ごとに組み立て器を返す（プロトコル・実行時ディスパッチ用）
    Dispatch(Rc<dyn Fn(CallKind) -> FunctionBuilder>),
    /// ルートの関数宣言として一度だけ出力し、識別子で呼ぶ関数
    Global {
        key: String,
        arity: Option<usize>,
        builder: FunctionBuilder,
    },
}

impl FunctionEntry {
    pub fn plain(
        f: impl Fn(&mut Context, ScopeId, &Args, &str) -> CResult<Value> + 'static,
    ) -> Self {
        FunctionEntry::Plain(Rc::new(f))
    }

    pub fn getter(
        f: impl Fn(&mut Context, ScopeId, &Args, &str) -> CResult<Value> + 'static,
    ) -> Self {
        FunctionEntry::Property {
            get: Rc::new(f),
            set: None,
        }
    }

    /// 呼び出し種別に合う組み立て器。種別が食い違えばエラー。
    pub fn builder(&self, kind: CallKind, name: &str) -> CResult<FunctionBuilder> {
        match (self, kind) {
            (FunctionEntry::Plain(b), CallKind::Call) => Ok(b.clone()),
            (FunctionEntry::Property { get, .. }, CallKind::Get) => Ok(get.clone()),
            (FunctionEntry::Property { set: Some(set), .. }, CallKind::Set) => Ok(set.clone()),
            (FunctionEntry::Dispatch(f), kind) => Ok(f(kind)),
            (
                FunctionEntry::Global {
                    key,
                    arity,
                    builder,
                },
                CallKind::Call,
            ) => Ok(noinline(key.clone(), *arity, builder.clone())),
            (FunctionEntry::Plain(_) | FunctionEntry::Global { .. }, _) => Err(CompileError::new(
                "VAL001",
                format!("Called a {:?} operation on a function {}", kind, name),
            )),
            (FunctionEntry::Property { .. }, _) => Err(CompileError::new(
                "VAL002",
                format!("Called a {:?} operation on a property {}", kind, name),
            )),
        }
    }
}

/// 関数化中の仮引数名。要求された順に一意な名前を割り当てる。
pub struct ParamNames {
    scope: ScopeId,
    names: RefCell<Vec<Option<String>>>,
    arity: Option<usize>,
}

impl ParamNames {
    pub fn new(scope: ScopeId, arity: Option<usize>) -> Self {
        Self {
            scope,
            names: RefCell::new(Vec::new()),
            arity,
        }
    }

    fn get(&self, ctx: &mut Context, index: usize, hint: Option<&str>) -> CResult<Value> {
        if let Some(Some(name)) = self.names.borrow().get(index) {
            return Ok(Value::ident(name.clone()));
        }
        let prefix = hint
            .map(str::to_string)
            .unwrap_or_else(|| format!("${}", index));
        let name = ctx.reserve_unique(self.scope, &prefix)?;
        let mut names = self.names.borrow_mut();
        if names.len() <= index {
            names.resize(index + 1, None);
        }
        names[index] = Some(name.clone());
        Ok(Value::ident(name))
    }

    /// 要求されなかった位置にも名前を付けて仮引数列を確定する。
    fn finish(&self, ctx: &mut Context) -> CResult<Vec<String>> {
        let count = self.arity.unwrap_or(0).max(self.names.borrow().len());
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            if let Value::Direct(Expr::Ident(name)) = self.get(ctx, i, None)? {
                out.push(name);
            }
        }
        Ok(out)
    }
}

/// 引数の取り出し口。
#[derive(Clone, Copy)]
pub enum Args<'a> {
    Values(&'a [Value]),
    Parameters {
        names: &'a ParamNames,
        offset: usize,
    },
}

impl<'a> Args<'a> {
    pub fn get(&self, ctx: &mut Context, index: usize) -> CResult<Value> {
        self.named(ctx, index, None)
    }

    /// 仮引数なら `hint` を名前の候補に使う。
    pub fn named(&self, ctx: &mut Context, index: usize, hint: Option<&str>) -> CResult<Value> {
        match self {
            Args::Values(values) => values.get(index).cloned().ok_or_else(|| {
                CompileError::new(
                    "VAL003",
                    format!(
                        "Asked for argument {}, but only {} arguments provided",
                        index + 1,
                        values.len()
                    ),
                )
            }),
            Args::Parameters { names, offset } => names.get(ctx, index + offset, hint),
        }
    }

    /// 引数の個数（仮引数で個数が未定なら None）。
    pub fn len(&self) -> Option<usize> {
        match self {
            Args::Values(values) => Some(values.len()),
            Args::Parameters { names, offset } => {
                names.arity.map(|n| n.saturating_sub(*offset))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// 先頭 `n` 個を読み飛ばした取り出し口。
    pub fn shifted(&self, n: usize) -> Args<'a> {
        match *self {
            Args::Values(values) => Args::Values(values.get(n..).unwrap_or(&[])),
            Args::Parameters { names, offset } => Args::Parameters {
                names,
                offset: offset + n,
            },
        }
    }

    /// 先頭から `count` 個を値として取り出す。
    pub fn take(&self, ctx: &mut Context, count: usize) -> CResult<Vec<Value>> {
        (0..count).map(|i| self.get(ctx, i)).collect()
    }

    /// 個数が分かる範囲の全引数。
    pub fn all(&self, ctx: &mut Context) -> CResult<Vec<Value>> {
        let count = self.len().unwrap_or(0);
        self.take(ctx, count)
    }
}

/// 固定個数の引数を受け取る組み立て器を作る。
pub fn wrapped(
    arity: usize,
    f: impl Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value> + 'static,
) -> FunctionBuilder {
    Rc::new(move |ctx, scope, args, _name| {
        let values = args.take(ctx, arity)?;
        f(ctx, scope, values)
    })
}

/// 固定個数の引数を受け取る通常の関数項目。
pub fn wrapped_entry(
    arity: usize,
    f: impl Fn(&mut Context, ScopeId, Vec<Value>) -> CResult<Value> + 'static,
) -> FunctionEntry {
    FunctionEntry::Plain(wrapped(arity, f))
}

/// `self` だけを受け取る getter 項目。
pub fn getter_entry(
    f: impl Fn(&mut Context, ScopeId, Value) -> CResult<Value> + 'static,
) -> FunctionEntry {
    FunctionEntry::Property {
        get: Rc::new(move |ctx, scope, args, _| {
            let target = args.get(ctx, 0)?;
            f(ctx, scope, target)
        }),
        set: None,
    }
}

/// メンバー関数の型から平坦な引数の個数を求める。
///
/// `(T.Type) -> (A, B) -> R` は静的メンバーで 2 個、`(T) -> (A) -> R` はインスタンスメンバーで 2 個。
pub fn flat_arity(ty: &Type, member: bool) -> Option<usize> {
    let f = ty.as_function()?;
    if !member {
        return Some(f.arity());
    }
    match (f.arguments.as_slice(), f.ret.as_function()) {
        ([Type::Metatype { .. }], Some(inner)) => Some(inner.arity()),
        ([_], Some(inner)) => Some(1 + inner.arity()),
        _ => Some(f.arity()),
    }
}

/// 組み立て器を新しい関数スコープで実行し、仮引数列と本体を返す。
pub fn functionize(
    ctx: &mut Context,
    parent: ScopeId,
    name: &str,
    arity: Option<usize>,
    body: &dyn Fn(&mut Context, ScopeId, &Args) -> CResult<Value>,
) -> CResult<(Vec<String>, Vec<Stmt>)> {
    let scope = ctx.new_scope(name, parent);
    let params = ParamNames::new(scope, arity);
    let value = body(
        ctx,
        scope,
        &Args::Parameters {
            names: &params,
            offset: 0,
        },
    )?;
    let stmts = match value {
        // 途中の return を含む本体はそのまま関数本体になる
        Value::Statements(stmts) if values::has_nested_return(&stmts) => stmts,
        value => values::transform_statements(ctx, scope, value, &mut |_, _, e| {
            Ok(if e.is_undefined() {
                Vec::new()
            } else {
                vec![Stmt::ret(e)]
            })
        })?,
    };
    let names = params.finish(ctx)?;
    let stmts = ctx.emit_scope(scope, stmts);
    Ok((names, stmts))
}

/// 組み立て器をルートの関数宣言として一度だけ出力し、その識別子を返す。
pub fn emit_function(
    ctx: &mut Context,
    key: &str,
    arity: Option<usize>,
    builder: FunctionBuilder,
    export: bool,
) -> CResult<String> {
    let display = key.to_string();
    ctx.emit_helper(key, move |ctx, ident| {
        let (params, body) = functionize(ctx, ScopeId::ROOT, &display, arity, &|ctx, scope, args| {
            builder(ctx, scope, args, &display)
        })?;
        let decl = Stmt::Function {
            name: ident.to_string(),
            params,
            body,
        };
        Ok(if export {
            Stmt::Export(Box::new(decl))
        } else {
            decl
        })
    })
}

/// 関数を出力済みの識別子で呼ぶ組み立て器を作る（インライン展開しない関数）。
pub fn noinline(
    key: impl Into<String>,
    arity: Option<usize>,
    builder: FunctionBuilder,
) -> FunctionBuilder {
    let key = key.into();
    Rc::new(move |ctx, scope, args, _name| {
        let ident = emit_function(ctx, &key, arity, builder.clone(), false)?;
        let values = match arity {
            Some(n) => args.take(ctx, n)?,
            None => args.all(ctx)?,
        };
        values::call_expression(ctx, scope, Expr::ident(ident), values)
    })
}

/// 再帰しない限りインライン展開し、再帰したら関数として出力する組み立て器。
pub fn inline_or_emit(
    key: impl Into<String>,
    arity: Option<usize>,
    builder: FunctionBuilder,
) -> FunctionBuilder {
    let key = key.into();
    Rc::new(move |ctx, scope, args, name| {
        if ctx.enter_inline(&key) {
            let result = builder(ctx, scope, args, name);
            ctx.leave_inline(&key);
            result
        } else {
            noinline(key.clone(), arity, builder.clone())(ctx, scope, args, name)
        }
    })
}

/// `const name = value;` を宣言して識別子を返す（値の一度きりの評価）。
pub fn bind_constant(
    ctx: &mut Context,
    scope: ScopeId,
    prefix: &str,
    value: Value,
    out: &mut Vec<Stmt>,
) -> CResult<Value> {
    let name = ctx.reserve_unique(scope, prefix)?;
    let stmts = values::transform_statements(ctx, scope, value, &mut |_, _, e| {
        Ok(vec![Stmt::var(VarKind::Const, name.clone(), Some(e))])
    })?;
    out.extend(stmts);
    Ok(Value::ident(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_type;

    #[test]
    /// 静的メンバーとインスタンスメンバーの引数の個数
    fn flat_arity_of_members() {
        let stat = parse_type("(Int.Type) -> (Int, Int) -> Int").expect("type");
        assert_eq!(flat_arity(&stat, true), Some(2));
        let inst = parse_type("(inout Array<Int>) -> (Int) -> ()").expect("type");
        assert_eq!(flat_arity(&inst, true), Some(2));
        let free = parse_type("(Int) -> (Int) -> Int").expect("type");
        assert_eq!(flat_arity(&free, false), Some(1));
    }

    #[test]
    /// 仮引数は要求時の候補名で、未使用の位置は `$i` で埋まる
    fn functionize_names_parameters() {
        let mut ctx = Context::new();
        let root = ctx.root();
        let (params, body) = functionize(&mut ctx, root, "f", Some(3), &|ctx, _, args| {
            let rhs = args.named(ctx, 1, Some("rhs"))?;
            Ok(rhs)
        })
        .expect("functionize");
        assert_eq!(params, vec!["$0".to_string(), "rhs".into(), "$2".into()]);
        assert_eq!(body, vec![Stmt::ret(Expr::ident("rhs"))]);
    }

    #[test]
    /// 呼び出し種別の食い違いはエラー
    fn entry_kind_mismatch() {
        let entry = wrapped_entry(0, |_, _, _| Ok(Value::unit()));
        assert!(entry.builder(CallKind::Call, "f").is_ok());
        let err = entry.builder(CallKind::Get, "f").err().expect("mismatch");
        assert_eq!(err.code(), "VAL001");
    }
}
