// パス: src/sil/mod.rs
// 役割: SIL テキストから JavaScript までのパイプライン（字句・構文・最適化・コード生成）をまとめる
// 意図: 基本ブロック列を持つ SSA 形式の入力を、AST 経路と同じ JavaScript 構文木へ落とす
// 関連ファイル: src/sil/parser.rs, src/sil/optimizer.rs, src/sil/codegen.rs, src/sil/stdlib.rs
//! SIL 経路のデータモデル
//!
//! - `parse_sil` が `Module`（宣言列と型レイアウト表）を作る。
//! - `optimize` がブロック参照を解析し、インライン展開できる辺に印を付ける。
//! - `compile_module` が `state` 変数による分岐表を使って制御フローを組み直す。
//!
//! ローカル `%N` は番号のまま保持し、出力時に `_N` へ写す。

use std::collections::BTreeMap;

pub mod codegen;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod stdlib;

pub use codegen::compile_module;
pub use optimizer::optimize;
pub use parser::parse_sil;

use crate::errors::CResult;
use crate::js::Program;

/// SIL テキストを解析・最適化してプログラムにする。
pub fn compile(source: &str) -> CResult<Program> {
    let mut module = parse_sil(source)?;
    optimize(&mut module);
    compile_module(&module)
}

/// 関数型の `@convention(...)`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Convention {
    Thin,
    Thick,
    Method,
    ObjcMethod,
    Witness,
    C,
}

impl Convention {
    /// 型テキスト中の `@convention(x)` を読む。指定がなければ thick。
    pub fn of_type(text: &str) -> Convention {
        let Some(start) = text.find("@convention(") else {
            return Convention::Thick;
        };
        let rest = &text[start + "@convention(".len()..];
        let name = rest.split(')').next().unwrap_or("");
        match name {
            "thin" => Convention::Thin,
            "method" => Convention::Method,
            "objc_method" => Convention::ObjcMethod,
            "witness_method" => Convention::Witness,
            "c" => Convention::C,
            _ => Convention::Thick,
        }
    }

    /// 最後の引数を `this` として渡す規約か。
    pub fn passes_self(&self) -> bool {
        matches!(self, Convention::Method | Convention::ObjcMethod)
    }
}

/// 分岐先。`inline` は最適化で単一の前方参照と判定された辺。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub block: String,
    pub inline: bool,
}

impl Target {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            inline: false,
        }
    }
}

/// 結果を持つ命令の右辺。
#[derive(Clone, Debug, PartialEq)]
pub enum Rvalue {
    IntegerLiteral { ty: String, value: i128 },
    FloatLiteral(f64),
    StringLiteral(String),
    Enum { ty: String, case: String, payload: Option<String> },
    Struct { ty: String, fields: Vec<String> },
    Tuple(Vec<String>),
    StructExtract { operand: String, ty: String, field: String },
    /// `destructure_struct` が作る位置指定の取り出し
    StructField { operand: String, ty: String, index: usize },
    TupleExtract { operand: String, index: usize },
    Builtin { name: String, args: Vec<String> },
    FunctionRef(String),
    Apply { callee: String, args: Vec<String>, convention: Convention },
    PartialApply { callee: String, args: Vec<String>, arity: usize },
    AllocStack { ty: String },
    AllocBox { ty: String },
    AllocRef { ty: String },
    ProjectBox(String),
    GlobalAddr(String),
    StructElementAddr { operand: String, ty: String, field: String },
    TupleElementAddr { operand: String, index: usize },
    RefElementAddr { operand: String, field: String },
    Load { operand: String, ty: String },
    UncheckedEnumData(String),
    EnumDataAddr(String),
    SelectEnum {
        operand: String,
        ty: String,
        addr: bool,
        cases: Vec<(Option<String>, String)>,
    },
    IndexAddr { base: String, index: String },
    Metatype,
    ClassMethod { operand: String, method: String },
    /// キャストや所有権操作など、値をそのまま受け渡す命令
    Forward(String),
}

impl Rvalue {
    /// 読み出すローカル。
    pub fn operands(&self) -> Vec<&str> {
        match self {
            Rvalue::IntegerLiteral { .. }
            | Rvalue::FloatLiteral(_)
            | Rvalue::StringLiteral(_)
            | Rvalue::FunctionRef(_)
            | Rvalue::AllocStack { .. }
            | Rvalue::AllocBox { .. }
            | Rvalue::AllocRef { .. }
            | Rvalue::GlobalAddr(_)
            | Rvalue::Metatype => Vec::new(),
            Rvalue::Enum { payload, .. } => payload.iter().map(String::as_str).collect(),
            Rvalue::Struct { fields, .. } => fields.iter().map(String::as_str).collect(),
            Rvalue::Tuple(items) => items.iter().map(String::as_str).collect(),
            Rvalue::Builtin { args, .. } => args.iter().map(String::as_str).collect(),
            Rvalue::Apply { callee, args, .. } | Rvalue::PartialApply { callee, args, .. } => {
                std::iter::once(callee.as_str())
                    .chain(args.iter().map(String::as_str))
                    .collect()
            }
            Rvalue::StructExtract { operand, .. }
            | Rvalue::StructField { operand, .. }
            | Rvalue::TupleExtract { operand, .. }
            | Rvalue::StructElementAddr { operand, .. }
            | Rvalue::TupleElementAddr { operand, .. }
            | Rvalue::RefElementAddr { operand, .. }
            | Rvalue::Load { operand, .. }
            | Rvalue::ClassMethod { operand, .. } => vec![operand.as_str()],
            Rvalue::ProjectBox(operand)
            | Rvalue::UncheckedEnumData(operand)
            | Rvalue::EnumDataAddr(operand)
            | Rvalue::Forward(operand) => vec![operand.as_str()],
            Rvalue::SelectEnum { operand, cases, .. } => std::iter::once(operand.as_str())
                .chain(cases.iter().map(|(_, v)| v.as_str()))
                .collect(),
            Rvalue::IndexAddr { base, index } => vec![base.as_str(), index.as_str()],
        }
    }

    /// 副作用を持たず、結果が使われなければ消してよい右辺か。
    pub fn is_pure(&self) -> bool {
        !matches!(
            self,
            Rvalue::Builtin { .. }
                | Rvalue::Apply { .. }
                | Rvalue::AllocStack { .. }
                | Rvalue::AllocBox { .. }
                | Rvalue::AllocRef { .. }
                | Rvalue::Load { .. }
        )
    }

    fn rename(&mut self, from: &str, to: &str) {
        let swap = |s: &mut String| {
            if s == from {
                *s = to.to_string();
            }
        };
        match self {
            Rvalue::Enum { payload, .. } => payload.iter_mut().for_each(swap),
            Rvalue::Struct { fields, .. } => fields.iter_mut().for_each(swap),
            Rvalue::Tuple(items) => items.iter_mut().for_each(swap),
            Rvalue::Builtin { args, .. } => args.iter_mut().for_each(swap),
            Rvalue::Apply { callee, args, .. } | Rvalue::PartialApply { callee, args, .. } => {
                swap(callee);
                args.iter_mut().for_each(swap);
            }
            Rvalue::StructExtract { operand, .. }
            | Rvalue::StructField { operand, .. }
            | Rvalue::TupleExtract { operand, .. }
            | Rvalue::StructElementAddr { operand, .. }
            | Rvalue::TupleElementAddr { operand, .. }
            | Rvalue::RefElementAddr { operand, .. }
            | Rvalue::Load { operand, .. }
            | Rvalue::ClassMethod { operand, .. }
            | Rvalue::ProjectBox(operand)
            | Rvalue::UncheckedEnumData(operand)
            | Rvalue::EnumDataAddr(operand)
            | Rvalue::Forward(operand) => swap(operand),
            Rvalue::SelectEnum { operand, cases, .. } => {
                swap(operand);
                cases.iter_mut().for_each(|(_, v)| swap(v));
            }
            Rvalue::IndexAddr { base, index } => {
                swap(base);
                swap(index);
            }
            _ => {}
        }
    }
}

/// 基本ブロック内の命令。
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Assign { dest: String, value: Rvalue },
    Return(Rvalue),
    Throw(Rvalue),
    Branch { target: Target, args: Vec<String> },
    CondBranch {
        cond: String,
        on_true: Target,
        true_args: Vec<String>,
        on_false: Target,
        false_args: Vec<String>,
    },
    CondFail { cond: String, message: Option<String> },
    /// `ty` は格納先のアドレス型（`*T`）
    Store { src: String, dest: String, ty: String, initializes: bool },
    CopyAddr { src: String, dest: String, ty: String, initializes: bool },
    InjectEnumAddr { dest: String, ty: String, case: String },
    AllocGlobal(String),
    SwitchEnum {
        operand: String,
        ty: String,
        addr: bool,
        cases: Vec<(Option<String>, Target)>,
    },
    TryApply {
        callee: String,
        args: Vec<String>,
        convention: Convention,
        normal: Target,
        error: Target,
    },
    Unreachable,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return(_)
                | Instruction::Throw(_)
                | Instruction::Branch { .. }
                | Instruction::CondBranch { .. }
                | Instruction::SwitchEnum { .. }
                | Instruction::TryApply { .. }
                | Instruction::Unreachable
        )
    }

    /// 終端命令の分岐先。
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Instruction::Branch { target, .. } => vec![target],
            Instruction::CondBranch { on_true, on_false, .. } => vec![on_true, on_false],
            Instruction::SwitchEnum { cases, .. } => cases.iter().map(|(_, t)| t).collect(),
            Instruction::TryApply { normal, error, .. } => vec![normal, error],
            _ => Vec::new(),
        }
    }

    pub fn targets_mut(&mut self) -> Vec<&mut Target> {
        match self {
            Instruction::Branch { target, .. } => vec![target],
            Instruction::CondBranch { on_true, on_false, .. } => vec![on_true, on_false],
            Instruction::SwitchEnum { cases, .. } => cases.iter_mut().map(|(_, t)| t).collect(),
            Instruction::TryApply { normal, error, .. } => vec![normal, error],
            _ => Vec::new(),
        }
    }

    /// 読み出すローカル（分岐引数を含む）。
    pub fn operands(&self) -> Vec<&str> {
        match self {
            Instruction::Assign { value, .. }
            | Instruction::Return(value)
            | Instruction::Throw(value) => value.operands(),
            Instruction::Branch { args, .. } => args.iter().map(String::as_str).collect(),
            Instruction::CondBranch {
                cond,
                true_args,
                false_args,
                ..
            } => std::iter::once(cond.as_str())
                .chain(true_args.iter().map(String::as_str))
                .chain(false_args.iter().map(String::as_str))
                .collect(),
            Instruction::CondFail { cond, .. } => vec![cond.as_str()],
            Instruction::Store { src, dest, .. } | Instruction::CopyAddr { src, dest, .. } => {
                vec![src.as_str(), dest.as_str()]
            }
            Instruction::InjectEnumAddr { dest, .. } => vec![dest.as_str()],
            Instruction::SwitchEnum { operand, .. } => vec![operand.as_str()],
            Instruction::TryApply { callee, args, .. } => std::iter::once(callee.as_str())
                .chain(args.iter().map(String::as_str))
                .collect(),
            Instruction::AllocGlobal(_) | Instruction::Unreachable => Vec::new(),
        }
    }

    /// 読み出しのローカル名を置き換える（コピー伝播用）。
    pub fn rename(&mut self, from: &str, to: &str) {
        let swap = |s: &mut String| {
            if s == from {
                *s = to.to_string();
            }
        };
        match self {
            Instruction::Assign { value, .. }
            | Instruction::Return(value)
            | Instruction::Throw(value) => value.rename(from, to),
            Instruction::Branch { args, .. } => args.iter_mut().for_each(swap),
            Instruction::CondBranch { cond, true_args, false_args, .. } => {
                swap(cond);
                true_args.iter_mut().for_each(swap);
                false_args.iter_mut().for_each(swap);
            }
            Instruction::CondFail { cond, .. } => swap(cond),
            Instruction::Store { src, dest, .. } | Instruction::CopyAddr { src, dest, .. } => {
                swap(src);
                swap(dest);
            }
            Instruction::InjectEnumAddr { dest, .. } => swap(dest),
            Instruction::SwitchEnum { operand, .. } => swap(operand),
            Instruction::TryApply { callee, args, .. } => {
                swap(callee);
                args.iter_mut().for_each(swap);
            }
            Instruction::AllocGlobal(_) | Instruction::Unreachable => {}
        }
    }
}

/// `%N : $T` の形のブロック引数。
#[derive(Clone, Debug, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub name: String,
    pub arguments: Vec<Local>,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    /// 公開関数の Swift 側の名前（直前のコメント行から取る）
    pub beautiful_name: Option<String>,
    pub convention: Convention,
    pub ty: String,
    /// 出力順の基本ブロック。先頭が入口
    pub blocks: Vec<BasicBlock>,
    /// 唯一の参照元へ展開されるブロック
    pub inlined: BTreeMap<String, BasicBlock>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 名前でブロックを探す（展開先も含む）。
    pub fn block(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks
            .iter()
            .find(|b| b.name == name)
            .or_else(|| self.inlined.get(name))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: String,
}

/// `sil_vtable` の一項目。
#[derive(Clone, Debug, PartialEq)]
pub struct VTableEntry {
    pub method: String,
    pub function: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VTable {
    pub class: String,
    pub entries: Vec<VTableEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Declaration {
    Function(Function),
    Global(Global),
    VTable(VTable),
}

/// 格納プロパティ。
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: String,
}

/// SIL ファイル冒頭の Swift 宣言から読み取った型の形。
#[derive(Clone, Debug, PartialEq)]
pub enum TypeLayout {
    Struct { fields: Vec<FieldLayout> },
    Enum { cases: Vec<String> },
    Class { superclass: Option<String>, fields: Vec<FieldLayout> },
    Protocol,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub declarations: Vec<Declaration>,
    pub types: BTreeMap<String, TypeLayout>,
}

impl Module {
    /// 宣言済みの型、なければ組み込みの型レイアウト。
    pub fn layout(&self, ty: &str) -> Option<&TypeLayout> {
        let base = base_type_name(ty);
        self.types.get(base).or_else(|| stdlib::layout(base))
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Function(f) => Some(f),
            _ => None,
        })
    }
}

/// `*Optional<Int>` や `@thin Int.Type` から型の基本名を取る。
pub fn base_type_name(ty: &str) -> &str {
    let mut rest = ty.trim().trim_start_matches('$').trim_start_matches('*');
    loop {
        let trimmed = rest.trim_start();
        if let Some(attr) = trimmed.strip_prefix('@') {
            let end = attr.find(' ').unwrap_or(attr.len());
            rest = &attr[end..];
        } else {
            rest = trimmed;
            break;
        }
    }
    let rest = rest.strip_prefix("Swift.").unwrap_or(rest);
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 型の基本名は属性・ポインタ・汎用引数を外して取る
    fn base_names() {
        assert_eq!(base_type_name("$*Optional<Int>"), "Optional");
        assert_eq!(base_type_name("@thin Int.Type"), "Int");
        assert_eq!(base_type_name("Swift.Bool"), "Bool");
    }

    #[test]
    /// 呼び出し規約は型テキストから読む
    fn conventions_from_type() {
        assert_eq!(
            Convention::of_type("@convention(method) (Int, @inout Point) -> ()"),
            Convention::Method
        );
        assert_eq!(Convention::of_type("@convention(thin) (Int) -> Int"), Convention::Thin);
        assert_eq!(Convention::of_type("@callee_guaranteed () -> ()"), Convention::Thick);
        assert!(Convention::Method.passes_self());
    }
}
