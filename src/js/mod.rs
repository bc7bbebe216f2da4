// パス: src/js/mod.rs
// 役割: 出力先 JavaScript の構文木（式・文・プログラム）を定義する
// 意図: 値代数・フロントエンド・インタプリタが共有する最小の ESTree 相当を提供する
// 関連ファイル: src/js/printer.rs, src/values/mod.rs, src/interp/mod.rs
//! JavaScript 構文木
//!
//! - 変換器が生成できる範囲に絞った式と文のみを持つ。
//! - 非 computed なメンバーアクセスの `property` は常に `Expr::Ident`。
//! - 演算子は `&'static str` で保持し、プリンタが優先順位表から括弧を決める。

pub mod printer;

/// JavaScript の式。
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Ident(String),
    This,
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        computed: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: &'static str,
        arg: Box<Expr>,
    },
    Update {
        op: &'static str,
        prefix: bool,
        arg: Box<Expr>,
    },
    Binary {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: &'static str,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Function {
        name: Option<String>,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
}

/// オブジェクトリテラルのキー。
#[derive(Clone, Debug, PartialEq)]
pub enum PropKey {
    Ident(String),
    Str(String),
    Computed(Expr),
}

/// オブジェクトリテラルの値（通常値かメソッド短縮記法）。
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Value(Expr),
    Method { params: Vec<String>, body: Vec<Stmt> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub key: PropKey,
    pub value: PropValue,
}

impl Property {
    /// `name: value`
    pub fn field(name: impl Into<String>, value: Expr) -> Self {
        Self {
            key: PropKey::Ident(name.into()),
            value: PropValue::Value(value),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn keyword(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Get,
    Set,
    Constructor,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassMember {
    pub kind: MethodKind,
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
}

/// JavaScript の文。
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Var {
        kind: VarKind,
        decls: Vec<(String, Option<Expr>)>,
    },
    Function {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Vec<Stmt>,
        /// `Block` か `If`（else if 連鎖）のいずれか
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        test: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForOf {
        kind: VarKind,
        name: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    ForIn {
        kind: VarKind,
        name: String,
        object: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<(String, Vec<Stmt>)>,
        finalizer: Option<Vec<Stmt>>,
    },
    Class {
        name: String,
        members: Vec<ClassMember>,
    },
    Export(Box<Stmt>),
}

/// 出力プログラム全体。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    /// `undefined` は識別子として表現する。
    pub fn undefined() -> Expr {
        Expr::Ident("undefined".into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Expr::Ident(name) if name == "undefined")
    }

    pub fn num(value: f64) -> Expr {
        Expr::Num(value)
    }

    pub fn str_lit(value: impl Into<String>) -> Expr {
        Expr::Str(value.into())
    }

    /// `object.name`
    pub fn member(object: Expr, name: impl Into<String>) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: Box::new(Expr::Ident(name.into())),
            computed: false,
        }
    }

    /// `object[index]`
    pub fn index(object: Expr, index: Expr) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: Box::new(index),
            computed: true,
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// `a.b.c(args)` 形式の呼び出しを組み立てる。
    pub fn call_path(path: &[&str], args: Vec<Expr>) -> Expr {
        let mut iter = path.iter();
        let mut callee = Expr::ident(iter.next().copied().unwrap_or("undefined"));
        for part in iter {
            callee = Expr::member(callee, *part);
        }
        Expr::call(callee, args)
    }

    pub fn new_expr(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::New {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn unary(op: &'static str, arg: Expr) -> Expr {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn binary(op: &'static str, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: &'static str, left: Expr, right: Expr) -> Expr {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn assign(op: &'static str, target: Expr, value: Expr) -> Expr {
        Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn conditional(test: Expr, consequent: Expr, alternate: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        }
    }

    pub fn update(op: &'static str, prefix: bool, arg: Expr) -> Expr {
        Expr::Update {
            op,
            prefix,
            arg: Box::new(arg),
        }
    }

    pub fn function(params: Vec<String>, body: Vec<Stmt>) -> Expr {
        Expr::Function {
            name: None,
            params,
            body,
        }
    }

    /// `new Ctor(message)` を投げる文。
    pub fn throw_new(ctor: &str, message: &str) -> Stmt {
        Stmt::Throw(Expr::new_expr(
            Expr::ident(ctor),
            vec![Expr::str_lit(message)],
        ))
    }
}

impl Stmt {
    pub fn expr(e: Expr) -> Stmt {
        Stmt::Expr(e)
    }

    pub fn var(kind: VarKind, name: impl Into<String>, init: Option<Expr>) -> Stmt {
        Stmt::Var {
            kind,
            decls: vec![(name.into(), init)],
        }
    }

    pub fn ret(e: Expr) -> Stmt {
        Stmt::Return(Some(e))
    }

    pub fn if_else(test: Expr, consequent: Vec<Stmt>, alternate: Option<Vec<Stmt>>) -> Stmt {
        Stmt::If {
            test,
            consequent,
            alternate: alternate.map(|body| Box::new(Stmt::Block(body))),
        }
    }
}
