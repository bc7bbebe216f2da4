// パス: src/js/printer.rs
// 役割: JavaScript 構文木をソース文字列へ整形する
// 意図: 演算子優先順位に基づき必要最小限の括弧で読みやすい出力を得る
// 関連ファイル: src/js/mod.rs, src/driver.rs, src/values/read.rs
//! JavaScript プリンタ
//!
//! - インデント幅は `PrinterOptions` で指定（既定 2）。
//! - 文頭に `{` や `function` が来る式文は括弧で包む。
//! - 文字列リテラルは serde_json のエスケープを流用してダブルクォートで出力する。

use super::{ClassMember, Expr, MethodKind, Program, PropKey, PropValue, Property, Stmt};

/// 出力整形の設定。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrinterOptions {
    pub indent: usize,
}

impl Default for PrinterOptions {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

/// プログラム全体を文字列化する。
pub fn print_program(program: &Program, options: &PrinterOptions) -> String {
    let mut p = Printer::new(options);
    for (i, stmt) in program.body.iter().enumerate() {
        if i > 0 && needs_blank_line(&program.body[i - 1], stmt) {
            p.out.push('\n');
        }
        p.stmt(stmt);
    }
    p.out
}

/// 単一の式を一行（必要なら複数行）の文字列にする。
pub fn print_expr(expr: &Expr) -> String {
    let options = PrinterOptions::default();
    let mut p = Printer::new(&options);
    p.expr(expr, 0);
    p.out
}

/// 文の並びを文字列化する（テストやデバッグ出力用）。
pub fn print_stmts(stmts: &[Stmt]) -> String {
    print_program(
        &Program {
            body: stmts.to_vec(),
        },
        &PrinterOptions::default(),
    )
}

fn needs_blank_line(prev: &Stmt, next: &Stmt) -> bool {
    // ヘルパー関数群と本体の間だけ空行を入れる
    let is_helper = |s: &Stmt| matches!(s, Stmt::Function { .. });
    is_helper(prev) && !is_helper(next)
}

struct Printer {
    out: String,
    level: usize,
    width: usize,
}

const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGN: u8 = 2;
const PREC_CONDITIONAL: u8 = 3;
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 16;
const PREC_CALL: u8 = 18;
const PREC_PRIMARY: u8 = 20;

fn binary_prec(op: &str) -> u8 {
    match op {
        "||" | "??" => 4,
        "&&" => 5,
        "|" => 6,
        "^" => 7,
        "&" => 8,
        "==" | "!=" | "===" | "!==" => 9,
        "<" | ">" | "<=" | ">=" | "in" | "instanceof" => 10,
        "<<" | ">>" | ">>>" => 11,
        "+" | "-" => 12,
        "*" | "/" | "%" => 13,
        "**" => 14,
        _ => 4,
    }
}

fn expr_prec(e: &Expr) -> u8 {
    match e {
        Expr::Sequence(_) => PREC_SEQUENCE,
        Expr::Assign { .. } | Expr::Function { .. } => PREC_ASSIGN,
        Expr::Conditional { .. } => PREC_CONDITIONAL,
        Expr::Logical { op, .. } | Expr::Binary { op, .. } => binary_prec(op),
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Update { prefix: true, .. } => PREC_UNARY,
        Expr::Update { prefix: false, .. } => PREC_POSTFIX,
        Expr::Num(n) if *n < 0.0 || (*n == 0.0 && n.is_sign_negative()) => PREC_UNARY,
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } => PREC_CALL,
        _ => PREC_PRIMARY,
    }
}

/// 式文の先頭が `{` / `function` になるかどうか。
fn starts_ambiguously(e: &Expr) -> bool {
    match e {
        Expr::Object(_) | Expr::Function { .. } => true,
        Expr::Member { object, .. } => starts_ambiguously(object),
        Expr::Call { callee, .. } => {
            expr_prec(callee) >= PREC_CALL && starts_ambiguously(callee)
        }
        Expr::Binary { left, .. } | Expr::Logical { left, .. } => starts_ambiguously(left),
        Expr::Assign { target, .. } => starts_ambiguously(target),
        Expr::Conditional { test, .. } => starts_ambiguously(test),
        Expr::Sequence(items) => items.first().map(starts_ambiguously).unwrap_or(false),
        Expr::Update {
            prefix: false, arg, ..
        } => starts_ambiguously(arg),
        _ => false,
    }
}

/// 数値を JavaScript のリテラル表記にする。
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".into()
        } else {
            "-Infinity".into()
        }
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// 識別子として書けるキーかどうか。
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

impl Printer {
    fn new(options: &PrinterOptions) -> Self {
        Self {
            out: String::new(),
            level: 0,
            width: options.indent,
        }
    }

    fn pad(&mut self) {
        for _ in 0..self.level * self.width {
            self.out.push(' ');
        }
    }

    fn line(&mut self, text: &str) {
        self.pad();
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// `{ ... }` ブロックを出力する（開き括弧は呼び出し側の行に続く）。
    fn block(&mut self, body: &[Stmt]) {
        if body.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.level += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.level -= 1;
        self.pad();
        self.out.push('}');
    }

    fn params(&mut self, params: &[String]) {
        self.out.push('(');
        self.out.push_str(&params.join(", "));
        self.out.push(')');
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => {
                self.pad();
                if starts_ambiguously(e) {
                    self.out.push('(');
                    self.expr(e, 0);
                    self.out.push(')');
                } else {
                    self.expr(e, 0);
                }
                self.out.push_str(";\n");
            }
            Stmt::Var { .. } => {
                self.pad();
                self.var_decl(stmt);
                self.out.push_str(";\n");
            }
            Stmt::Function { name, params, body } => {
                self.pad();
                self.function_decl(name, params, body);
                self.out.push('\n');
            }
            Stmt::Return(value) => {
                self.pad();
                match value {
                    Some(e) => {
                        self.out.push_str("return ");
                        self.expr(e, 0);
                        self.out.push_str(";\n");
                    }
                    None => self.out.push_str("return;\n"),
                }
            }
            Stmt::If { .. } => {
                self.pad();
                self.if_chain(stmt);
                self.out.push('\n');
            }
            Stmt::Block(body) => {
                self.pad();
                self.block(body);
                self.out.push('\n');
            }
            Stmt::While { test, body } => {
                self.pad();
                self.out.push_str("while (");
                self.expr(test, 0);
                self.out.push_str(") ");
                self.block(body);
                self.out.push('\n');
            }
            Stmt::DoWhile { body, test } => {
                self.pad();
                self.out.push_str("do ");
                self.block(body);
                self.out.push_str(" while (");
                self.expr(test, 0);
                self.out.push_str(");\n");
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.pad();
                self.out.push_str("for (");
                match init.as_deref() {
                    Some(s @ Stmt::Var { .. }) => self.var_decl(s),
                    Some(Stmt::Expr(e)) => self.expr(e, 0),
                    _ => {}
                }
                self.out.push(';');
                if let Some(t) = test {
                    self.out.push(' ');
                    self.expr(t, 0);
                }
                self.out.push(';');
                if let Some(u) = update {
                    self.out.push(' ');
                    self.expr(u, 0);
                }
                self.out.push_str(") ");
                self.block(body);
                self.out.push('\n');
            }
            Stmt::ForOf {
                kind,
                name,
                iter,
                body,
            } => {
                self.pad();
                self.out
                    .push_str(&format!("for ({} {} of ", kind.keyword(), name));
                self.expr(iter, PREC_ASSIGN);
                self.out.push_str(") ");
                self.block(body);
                self.out.push('\n');
            }
            Stmt::ForIn {
                kind,
                name,
                object,
                body,
            } => {
                self.pad();
                self.out
                    .push_str(&format!("for ({} {} in ", kind.keyword(), name));
                self.expr(object, 0);
                self.out.push_str(") ");
                self.block(body);
                self.out.push('\n');
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.pad();
                self.out.push_str("switch (");
                self.expr(discriminant, 0);
                self.out.push_str(") {\n");
                self.level += 1;
                for case in cases {
                    self.pad();
                    match &case.test {
                        Some(t) => {
                            self.out.push_str("case ");
                            self.expr(t, 0);
                            self.out.push_str(":\n");
                        }
                        None => self.out.push_str("default:\n"),
                    }
                    self.level += 1;
                    for s in &case.body {
                        self.stmt(s);
                    }
                    self.level -= 1;
                }
                self.level -= 1;
                self.line("}");
            }
            Stmt::Break => self.line("break;"),
            Stmt::Continue => self.line("continue;"),
            Stmt::Throw(e) => {
                self.pad();
                self.out.push_str("throw ");
                self.expr(e, 0);
                self.out.push_str(";\n");
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.pad();
                self.out.push_str("try ");
                self.block(block);
                if let Some((name, body)) = handler {
                    self.out.push_str(&format!(" catch ({}) ", name));
                    self.block(body);
                }
                if let Some(body) = finalizer {
                    self.out.push_str(" finally ");
                    self.block(body);
                }
                self.out.push('\n');
            }
            Stmt::Class { name, members } => {
                self.pad();
                self.class_decl(name, members);
                self.out.push('\n');
            }
            Stmt::Export(inner) => {
                self.pad();
                self.out.push_str("export ");
                // 内側の文はインデント済みの位置から続ける
                let mark = self.out.len();
                self.stmt(inner);
                let rest: String = self.out[mark..].trim_start().to_string();
                self.out.truncate(mark);
                self.out.push_str(&rest);
            }
        }
    }

    fn var_decl(&mut self, stmt: &Stmt) {
        if let Stmt::Var { kind, decls } = stmt {
            self.out.push_str(kind.keyword());
            self.out.push(' ');
            for (i, (name, init)) in decls.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.out.push_str(name);
                if let Some(e) = init {
                    self.out.push_str(" = ");
                    self.expr(e, PREC_ASSIGN);
                }
            }
        }
    }

    fn function_decl(&mut self, name: &str, params: &[String], body: &[Stmt]) {
        self.out.push_str("function ");
        self.out.push_str(name);
        self.params(params);
        self.out.push(' ');
        self.block(body);
    }

    fn if_chain(&mut self, stmt: &Stmt) {
        if let Stmt::If {
            test,
            consequent,
            alternate,
        } = stmt
        {
            self.out.push_str("if (");
            self.expr(test, 0);
            self.out.push_str(") ");
            self.block(consequent);
            match alternate.as_deref() {
                Some(nested @ Stmt::If { .. }) => {
                    self.out.push_str(" else ");
                    self.if_chain(nested);
                }
                Some(Stmt::Block(body)) => {
                    self.out.push_str(" else ");
                    self.block(body);
                }
                Some(other) => {
                    self.out.push_str(" else ");
                    self.block(std::slice::from_ref(other));
                }
                None => {}
            }
        }
    }

    fn class_decl(&mut self, name: &str, members: &[ClassMember]) {
        self.out.push_str("class ");
        self.out.push_str(name);
        if members.is_empty() {
            self.out.push_str(" {}");
            return;
        }
        self.out.push_str(" {\n");
        self.level += 1;
        for m in members {
            self.pad();
            if m.is_static {
                self.out.push_str("static ");
            }
            match m.kind {
                MethodKind::Get => self.out.push_str("get "),
                MethodKind::Set => self.out.push_str("set "),
                MethodKind::Method | MethodKind::Constructor => {}
            }
            if m.kind == MethodKind::Constructor {
                self.out.push_str("constructor");
            } else {
                self.out.push_str(&m.name);
            }
            self.params(&m.params);
            self.out.push(' ');
            self.block(&m.body);
            self.out.push('\n');
        }
        self.level -= 1;
        self.pad();
        self.out.push('}');
    }

    fn property(&mut self, prop: &Property) {
        match &prop.key {
            PropKey::Ident(name) => self.out.push_str(name),
            PropKey::Str(s) => {
                if is_valid_identifier(s) {
                    self.out.push_str(s)
                } else {
                    self.out.push_str(&quote(s))
                }
            }
            PropKey::Computed(e) => {
                self.out.push('[');
                self.expr(e, PREC_ASSIGN);
                self.out.push(']');
            }
        }
        match &prop.value {
            PropValue::Value(v) => {
                self.out.push_str(": ");
                self.expr(v, PREC_ASSIGN);
            }
            PropValue::Method { params, body } => {
                self.params(params);
                self.out.push(' ');
                self.block(body);
            }
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(a, PREC_ASSIGN);
        }
        self.out.push(')');
    }

    fn expr(&mut self, e: &Expr, min: u8) {
        let prec = expr_prec(e);
        if prec < min {
            self.out.push('(');
            self.expr_inner(e);
            self.out.push(')');
        } else {
            self.expr_inner(e);
        }
    }

    fn expr_inner(&mut self, e: &Expr) {
        match e {
            Expr::Ident(name) => self.out.push_str(name),
            Expr::This => self.out.push_str("this"),
            Expr::Num(n) => self.out.push_str(&format_number(*n)),
            Expr::Str(s) => self.out.push_str(&quote(s)),
            Expr::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Expr::Null => self.out.push_str("null"),
            Expr::Array(items) => {
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(item, PREC_ASSIGN);
                }
                self.out.push(']');
            }
            Expr::Object(props) => {
                if props.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                self.out.push_str("{\n");
                self.level += 1;
                for (i, prop) in props.iter().enumerate() {
                    self.pad();
                    self.property(prop);
                    if i + 1 < props.len() {
                        self.out.push(',');
                    }
                    self.out.push('\n');
                }
                self.level -= 1;
                self.pad();
                self.out.push('}');
            }
            Expr::Member {
                object,
                property,
                computed,
            } => {
                if matches!(object.as_ref(), Expr::Num(_)) {
                    self.out.push('(');
                    self.expr_inner(object);
                    self.out.push(')');
                } else {
                    self.expr(object, PREC_CALL);
                }
                if *computed {
                    self.out.push('[');
                    self.expr(property, 0);
                    self.out.push(']');
                } else {
                    self.out.push('.');
                    self.expr_inner(property);
                }
            }
            Expr::Call { callee, args } => {
                self.expr(callee, PREC_CALL);
                self.args(args);
            }
            Expr::New { callee, args } => {
                self.out.push_str("new ");
                if matches!(callee.as_ref(), Expr::Call { .. }) {
                    self.out.push('(');
                    self.expr(callee, 0);
                    self.out.push(')');
                } else {
                    self.expr(callee, PREC_CALL);
                }
                self.args(args);
            }
            Expr::Unary { op, arg } => {
                self.out.push_str(op);
                let mark = self.out.len();
                let word = op.chars().all(|c| c.is_ascii_alphabetic());
                if word {
                    self.out.push(' ');
                }
                self.expr(arg, PREC_UNARY);
                // `- -x` や `+ +x` が `--x` と読まれないように空白を挟む
                if !word {
                    let follows = self.out[mark..].chars().next();
                    let last = op.chars().last();
                    if follows.is_some() && follows == last && matches!(last, Some('-' | '+')) {
                        self.out.insert(mark, ' ');
                    }
                }
            }
            Expr::Update { op, prefix, arg } => {
                if *prefix {
                    self.out.push_str(op);
                    self.expr(arg, PREC_UNARY);
                } else {
                    self.expr(arg, PREC_POSTFIX);
                    self.out.push_str(op);
                }
            }
            Expr::Binary { op, left, right } | Expr::Logical { op, left, right } => {
                let prec = binary_prec(op);
                if *op == "**" {
                    self.expr(left, prec + 1);
                    self.out.push_str(" ** ");
                    self.expr(right, prec);
                } else {
                    self.expr(left, prec);
                    self.out.push(' ');
                    self.out.push_str(op);
                    self.out.push(' ');
                    self.expr(right, prec + 1);
                }
            }
            Expr::Assign { op, target, value } => {
                self.expr(target, PREC_CALL);
                self.out.push(' ');
                self.out.push_str(op);
                self.out.push(' ');
                self.expr(value, PREC_ASSIGN);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, PREC_CONDITIONAL + 1);
                self.out.push_str(" ? ");
                self.expr(consequent, PREC_ASSIGN);
                self.out.push_str(" : ");
                self.expr(alternate, PREC_ASSIGN);
            }
            Expr::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(item, PREC_ASSIGN);
                }
            }
            Expr::Function { name, params, body } => {
                self.out.push_str("function ");
                if let Some(n) = name {
                    self.out.push_str(n);
                }
                self.params(params);
                self.out.push(' ');
                self.block(body);
            }
            Expr::Template { quasis, exprs } => {
                self.out.push('`');
                for (i, q) in quasis.iter().enumerate() {
                    let escaped = q
                        .replace('\\', "\\\\")
                        .replace('`', "\\`")
                        .replace("${", "\\${");
                    self.out.push_str(&escaped);
                    if let Some(e) = exprs.get(i) {
                        self.out.push_str("${");
                        self.expr(e, 0);
                        self.out.push('}');
                    }
                }
                self.out.push('`');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::{Stmt, VarKind};

    #[test]
    /// 二項演算は優先順位に応じて括弧を補う
    fn binary_precedence_parens() {
        let e = Expr::binary(
            "*",
            Expr::binary("+", Expr::ident("a"), Expr::ident("b")),
            Expr::ident("c"),
        );
        assert_eq!(print_expr(&e), "(a + b) * c");
        let e = Expr::binary(
            "-",
            Expr::ident("a"),
            Expr::binary("-", Expr::ident("b"), Expr::ident("c")),
        );
        assert_eq!(print_expr(&e), "a - (b - c)");
    }

    #[test]
    /// 配列境界チェックの条件式は括弧なしで出力される
    fn bounds_check_shape() {
        let i = Expr::ident("index");
        let arr = Expr::ident("array");
        let test = Expr::logical(
            "&&",
            Expr::binary(">", Expr::member(arr.clone(), "length"), i.clone()),
            Expr::binary(">=", i.clone(), Expr::num(0.0)),
        );
        let e = Expr::index(
            arr,
            Expr::conditional(
                test,
                i,
                Expr::call(Expr::ident("$$arrayBoundsFailed"), vec![]),
            ),
        );
        assert_eq!(
            print_expr(&e),
            "array[array.length > index && index >= 0 ? index : $$arrayBoundsFailed()]"
        );
    }

    #[test]
    /// 即時関数は括弧で包まれる
    fn iife_is_wrapped() {
        let f = Expr::function(vec![], vec![Stmt::ret(Expr::num(1.0))]);
        let e = Expr::call(f, vec![]);
        assert_eq!(print_expr(&e), "(function () {\n  return 1;\n})()");
    }

    #[test]
    /// export 付き関数とオブジェクトリテラルの整形
    fn export_function_and_object() {
        let body = vec![Stmt::ret(Expr::Object(vec![Property {
            key: PropKey::Computed(Expr::ident("key")),
            value: PropValue::Value(Expr::ident("value")),
        }]))];
        let program = Program {
            body: vec![Stmt::Export(Box::new(Stmt::Function {
                name: "newSingle$key$value$".into(),
                params: vec!["key".into(), "value".into()],
                body,
            }))],
        };
        let text = print_program(&program, &PrinterOptions::default());
        assert_eq!(
            text,
            "export function newSingle$key$value$(key, value) {\n  return {\n    [key]: value\n  };\n}\n"
        );
    }

    #[test]
    /// 単項マイナスの連続は空白で区切られる
    fn nested_negation_spacing() {
        let e = Expr::unary("-", Expr::unary("-", Expr::ident("x")));
        assert_eq!(print_expr(&e), "- -x");
        let e = Expr::binary("-", Expr::ident("a"), Expr::num(-5.0));
        assert_eq!(print_expr(&e), "a - -5");
    }

    #[test]
    /// for 文と else if 連鎖の出力
    fn for_and_else_if() {
        let for_stmt = Stmt::For {
            init: Some(Box::new(Stmt::var(VarKind::Let, "i", Some(Expr::num(0.0))))),
            test: Some(Expr::binary("<", Expr::ident("i"), Expr::ident("n"))),
            update: Some(Expr::update("++", false, Expr::ident("i"))),
            body: vec![],
        };
        assert_eq!(print_stmts(&[for_stmt]), "for (let i = 0; i < n; i++) {}\n");
        let chain = Stmt::If {
            test: Expr::ident("a"),
            consequent: vec![Stmt::Break],
            alternate: Some(Box::new(Stmt::if_else(
                Expr::ident("b"),
                vec![Stmt::Continue],
                Some(vec![Stmt::Return(None)]),
            ))),
        };
        assert_eq!(
            print_stmts(&[chain]),
            "if (a) {\n  break;\n} else if (b) {\n  continue;\n} else {\n  return;\n}\n"
        );
    }

    #[test]
    /// 数値と文字列リテラルの表記
    fn literal_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(print_expr(&Expr::str_lit("a\"b\n")), "\"a\\\"b\\n\"");
        let t = Expr::Template {
            quasis: vec!["x = ".into(), "".into()],
            exprs: vec![Expr::ident("x")],
        };
        assert_eq!(print_expr(&t), "`x = ${x}`");
    }
}
