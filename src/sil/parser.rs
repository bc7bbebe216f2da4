// パス: src/sil/parser.rs
// 役割: SIL テキストを宣言・基本ブロック・型付き命令へ構文解析する
// 意図: 命令ごとの文法を明示し、知らない命令は黙って読み飛ばさずにエラーにする
// 関連ファイル: src/sil/lexer.rs, src/sil/mod.rs, src/sil/optimizer.rs
//! SIL 構文解析
//!
//! 行単位の状態機械で、トップレベル・関数本体・vtable・Swift 型宣言を切り替える。
//! 命令行は `Cursor` で先頭から読み、命令名ごとの文法で `Instruction` を作る。
//!
//! - 参照カウントやデバッグ情報の命令は意味を持たないので捨てる。
//! - 公開関数の Swift 名は、直前のコメント行（`// increment(number:)`）から取る。
//! - ファイル冒頭の `struct` / `enum` / `class` / `protocol` 宣言から型レイアウトを作る。

use std::collections::BTreeMap;

use crate::errors::ParseError;

use super::lexer::{member_of_ref, split_top_level, strip_comment, Cursor};
use super::{
    BasicBlock, Convention, Declaration, FieldLayout, Function, Global, Instruction, Local, Module,
    Rvalue, Target, TypeLayout, VTable, VTableEntry,
};

/// 効果を持たないので読み捨てる命令。
const IGNORED: &[&str] = &[
    "debug_value",
    "debug_value_addr",
    "retain_value",
    "release_value",
    "strong_retain",
    "strong_release",
    "unowned_retain",
    "unowned_release",
    "strong_retain_unowned",
    "dealloc_stack",
    "dealloc_stack_ref",
    "dealloc_box",
    "dealloc_ref",
    "end_access",
    "end_borrow",
    "end_lifetime",
    "destroy_value",
    "destroy_addr",
    "fix_lifetime",
    "set_deallocating",
];

/// 値をそのまま受け渡す命令。
const FORWARDING: &[&str] = &[
    "begin_access",
    "begin_borrow",
    "copy_value",
    "move_value",
    "mark_uninitialized",
    "mark_dependence",
    "unchecked_ref_cast",
    "unchecked_addr_cast",
    "unchecked_bitwise_cast",
    "unchecked_trivial_bit_cast",
    "unchecked_ownership_conversion",
    "upcast",
    "pointer_to_address",
    "address_to_pointer",
    "ref_to_raw_pointer",
    "raw_pointer_to_ref",
    "thin_to_thick_function",
    "convert_function",
    "convert_escape_to_noescape",
    "copy_unowned_value",
    "strong_copy_unowned_value",
    "unconditional_checked_cast",
];

/// 宣言を読み飛ばすだけのトップレベル指令。
const SKIPPED_DIRECTIVES: &[&str] = &[
    "sil_stage",
    "import",
    "sil_witness_table",
    "sil_default_witness_table",
    "sil_property",
    "sil_scope",
    "sil_coverage_map",
    "sil_differentiability_witness",
    "sil_moveonlydeinit",
];

/// 型宣言以外で読み飛ばす Swift の宣言キーワード。
const SWIFT_DECLARATIONS: &[&str] = &[
    "func",
    "var",
    "let",
    "init",
    "deinit",
    "subscript",
    "typealias",
    "extension",
    "precedencegroup",
    "operator",
    "infix",
    "prefix",
    "postfix",
    "actor",
];

const MODIFIERS: &[&str] = &[
    "public",
    "internal",
    "private",
    "fileprivate",
    "open",
    "final",
    "indirect",
    "static",
    "class",
    "lazy",
    "weak",
    "unowned",
    "mutating",
    "nonmutating",
    "override",
    "required",
    "convenience",
    "dynamic",
];

enum TypeKind {
    Struct,
    Enum,
    Class,
    Protocol,
}

struct TypeDecl {
    name: String,
    kind: TypeKind,
    superclass: Option<String>,
    fields: Vec<FieldLayout>,
    cases: Vec<String>,
    depth: i32,
}

enum State {
    TopLevel,
    Function {
        function: Function,
        block: Option<BasicBlock>,
    },
    VTable(VTable),
    Type(TypeDecl),
    Skip(i32),
}

struct SilParser {
    module: Module,
    state: State,
    lookback: Option<String>,
}

/// SIL テキスト全体を `Module` へ解析する。
pub fn parse_sil(source: &str) -> Result<Module, ParseError> {
    let mut parser = SilParser {
        module: Module::default(),
        state: State::TopLevel,
        lookback: None,
    };
    let mut offset = 0;
    for (index, raw) in source.lines().enumerate() {
        if let Err(err) = parser.add_line(raw, index + 1, offset) {
            log::error!("sil: {}", err);
            return Err(err);
        }
        offset += raw.len() + 1;
    }
    match parser.state {
        State::TopLevel => {}
        _ => {
            let line = source.lines().count();
            return Err(ParseError::at(
                "SIL020",
                "unexpected end of input inside a declaration",
                Some(source.len()),
                Some(line),
                Some(1),
            ));
        }
    }
    log::debug!(
        "sil: parsed {} declarations, {} types",
        parser.module.declarations.len(),
        parser.module.types.len()
    );
    Ok(parser.module)
}

fn brace_delta(line: &str) -> i32 {
    line.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// 行頭の `@attr` / `@attr(...)` と修飾子を読み飛ばす。`@_hasStorage` の有無を返す。
fn skip_attributes_and_modifiers(c: &mut Cursor) -> Result<bool, ParseError> {
    let mut has_storage = false;
    loop {
        c.skip_ws();
        if c.rest().starts_with('@') {
            c.expect("@")?;
            let name = c.word()?;
            if name == "_hasStorage" {
                has_storage = true;
            }
            if c.rest().starts_with('(') {
                c.balanced('(', ')')?;
            }
            continue;
        }
        match c.peek_word() {
            Some(word) if MODIFIERS.contains(&word) => {
                // `class func` の class は修飾子、`class Foo` の class は宣言
                let after = &c.rest()[word.len()..];
                let next = after.trim_start();
                if word == "class" && !next.starts_with("func") && !next.starts_with("var") {
                    return Ok(has_storage);
                }
                c.word()?;
                if c.rest().starts_with('(') {
                    c.balanced('(', ')')?;
                }
            }
            _ => return Ok(has_storage),
        }
    }
}

/// `// increment(number:)` のようなコメントから公開名を取る。
fn beautiful_name(comment: &str) -> Option<String> {
    let text = comment.trim_start_matches('/').trim();
    let (name, _) = text.split_once('(')?;
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    valid.then(|| name.to_string())
}

/// `#Counter.count!getter` を prototype 上のキーにする。
pub fn method_key(decl: &str) -> String {
    let member = member_of_ref(decl);
    match decl.split_once('!') {
        Some((_, kind)) if !kind.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}${}", member, kind.split('.').next().unwrap_or(kind))
        }
        _ => member.to_string(),
    }
}

/// `@convention(thin) (Int, Int) -> Int` の引数の個数。
pub fn function_arity(ty: &str) -> usize {
    let mut c = Cursor::new(ty, 0, 0);
    loop {
        c.skip_ws();
        if c.rest().starts_with('@') {
            if c.expect("@").is_err() || c.word().is_err() {
                return 0;
            }
            if c.rest().starts_with('(') && c.balanced('(', ')').is_err() {
                return 0;
            }
            continue;
        }
        break;
    }
    match c.balanced('(', ')') {
        Ok(params) => split_top_level(&params[1..params.len() - 1]).len(),
        Err(_) => 0,
    }
}

impl SilParser {
    fn add_line(&mut self, raw: &str, line: usize, offset: usize) -> Result<(), ParseError> {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("//") {
            self.lookback = Some(trimmed.to_string());
            return Ok(());
        }
        let text = strip_comment(raw);
        if text.trim().is_empty() {
            return Ok(());
        }
        let state = std::mem::replace(&mut self.state, State::TopLevel);
        self.state = match state {
            State::TopLevel => self.top_level(text, line, offset)?,
            State::Skip(depth) => {
                let depth = depth + brace_delta(text);
                if depth > 0 {
                    State::Skip(depth)
                } else {
                    State::TopLevel
                }
            }
            State::Type(mut decl) => {
                if decl.depth == 1 {
                    let mut c = Cursor::new(text, line, offset);
                    member_line(&mut decl, &mut c)?;
                }
                decl.depth += brace_delta(text);
                if decl.depth > 0 {
                    State::Type(decl)
                } else {
                    self.finish_type(decl);
                    State::TopLevel
                }
            }
            State::VTable(mut table) => {
                if text.trim() == "}" {
                    self.module.declarations.push(Declaration::VTable(table));
                    State::TopLevel
                } else {
                    let mut c = Cursor::new(text, line, offset);
                    if let Some(entry) = vtable_entry(&mut c)? {
                        table.entries.push(entry);
                    }
                    State::VTable(table)
                }
            }
            State::Function { function, block } => {
                self.function_line(function, block, raw, text, line, offset)?
            }
        };
        self.lookback = None;
        Ok(())
    }

    fn top_level(&mut self, text: &str, line: usize, offset: usize) -> Result<State, ParseError> {
        let mut c = Cursor::new(text, line, offset);
        if text.trim() == "}" {
            return Err(c.error("SIL012", "unbalanced `}`"));
        }
        let directive = match c.peek_word() {
            Some(word) => word,
            None if text.trim_start().starts_with('@') => "",
            None => return Err(c.error("SIL011", "unknown top-level declaration")),
        };
        match directive {
            "sil" => return self.function_header(&mut c),
            "sil_global" => {
                c.word()?;
                loop {
                    c.attributes();
                    if c.rest().trim_start().starts_with('@') {
                        break;
                    }
                    c.word()?;
                }
                let name = c.symbol()?;
                let ty = c.typed()?.to_string();
                self.module
                    .declarations
                    .push(Declaration::Global(Global { name, ty }));
                return Ok(if text.ends_with('{') { State::Skip(1) } else { State::TopLevel });
            }
            "sil_vtable" => {
                c.word()?;
                c.attributes();
                let class = c.word()?.to_string();
                if !c.eat("{") {
                    return Err(c.error("SIL001", "expected `{` after sil_vtable"));
                }
                return Ok(State::VTable(VTable {
                    class,
                    entries: Vec::new(),
                }));
            }
            d if SKIPPED_DIRECTIVES.contains(&d) || d.starts_with("sil_") => {
                log::debug!("sil: skipping `{}` at line {}", d, line);
                return Ok(if brace_delta(text) > 0 {
                    State::Skip(brace_delta(text))
                } else {
                    State::TopLevel
                });
            }
            _ => {}
        }
        skip_attributes_and_modifiers(&mut c)?;
        let keyword = match c.peek_word() {
            Some(word) => word,
            None => return Err(c.error("SIL011", "unknown top-level declaration")),
        };
        let kind = match keyword {
            "struct" => TypeKind::Struct,
            "enum" => TypeKind::Enum,
            "class" => TypeKind::Class,
            "protocol" => TypeKind::Protocol,
            k if SWIFT_DECLARATIONS.contains(&k) => {
                let depth = brace_delta(text);
                return Ok(if depth > 0 { State::Skip(depth) } else { State::TopLevel });
            }
            _ => {
                let message = format!("unknown top-level declaration `{}`", keyword);
                return Err(c.error("SIL011", message));
            }
        };
        c.word()?;
        let name = c.word()?.to_string();
        c.skip_generic_arguments()?;
        let superclass = if c.eat(":") {
            c.word().ok().map(|w| w.to_string())
        } else {
            None
        };
        let decl = TypeDecl {
            name,
            kind,
            superclass,
            fields: Vec::new(),
            cases: Vec::new(),
            depth: brace_delta(text),
        };
        if decl.depth > 0 {
            Ok(State::Type(decl))
        } else {
            self.finish_type(decl);
            Ok(State::TopLevel)
        }
    }

    fn finish_type(&mut self, decl: TypeDecl) {
        let layout = match decl.kind {
            TypeKind::Struct => TypeLayout::Struct {
                fields: decl.fields,
            },
            TypeKind::Enum => TypeLayout::Enum { cases: decl.cases },
            TypeKind::Class => TypeLayout::Class {
                superclass: decl.superclass,
                fields: decl.fields,
            },
            TypeKind::Protocol => TypeLayout::Protocol,
        };
        log::debug!("sil: type {} registered", decl.name);
        self.module.types.insert(decl.name, layout);
    }

    fn function_header(&mut self, c: &mut Cursor) -> Result<State, ParseError> {
        c.word()?;
        let mut linkage: Option<&str> = None;
        loop {
            c.attributes();
            c.skip_ws();
            if c.rest().starts_with('@') {
                break;
            }
            linkage = Some(c.word()?);
        }
        let name = c.symbol()?;
        let ty = c.typed()?.to_string();
        let exported = matches!(linkage, None | Some("public"));
        let beautiful = if exported && name != "main" {
            self.lookback.as_deref().and_then(beautiful_name)
        } else {
            None
        };
        let function = Function {
            name,
            beautiful_name: beautiful,
            convention: Convention::of_type(&ty),
            ty,
            blocks: Vec::new(),
            inlined: BTreeMap::new(),
        };
        if c.eat("{") {
            Ok(State::Function {
                function,
                block: None,
            })
        } else {
            self.module
                .declarations
                .push(Declaration::Function(function));
            Ok(State::TopLevel)
        }
    }

    fn function_line(
        &mut self,
        mut function: Function,
        mut block: Option<BasicBlock>,
        raw: &str,
        text: &str,
        line: usize,
        offset: usize,
    ) -> Result<State, ParseError> {
        let mut c = Cursor::new(text, line, offset);
        if text.trim() == "}" {
            if let Some(done) = block.take() {
                function.blocks.push(done);
            }
            self.module
                .declarations
                .push(Declaration::Function(function));
            return Ok(State::TopLevel);
        }
        if raw.starts_with(' ') || raw.starts_with('\t') {
            let current = match block.as_mut() {
                Some(b) => b,
                None => return Err(c.error("SIL013", "instruction outside of a basic block")),
            };
            current.instructions.extend(parse_instruction(&mut c)?);
            if !c.at_end() {
                return Err(c.error("SIL014", format!("unexpected trailing text `{}`", c.rest())));
            }
            return Ok(State::Function { function, block });
        }
        let header = block_header(&mut c)?;
        if let Some(done) = block.take() {
            function.blocks.push(done);
        }
        if function.blocks.iter().any(|b| b.name == header.name) {
            return Err(c.error("SIL015", format!("duplicate basic block `{}`", header.name)));
        }
        Ok(State::Function {
            function,
            block: Some(header),
        })
    }
}

fn block_header(c: &mut Cursor) -> Result<BasicBlock, ParseError> {
    let name = c.word()?.to_string();
    let mut arguments = Vec::new();
    if c.eat("(") && !c.eat(")") {
        loop {
            let local = c.local()?;
            let ty = c.typed()?.to_string();
            arguments.push(Local { name: local, ty });
            if c.eat(",") {
                continue;
            }
            c.expect(")")?;
            break;
        }
    }
    c.expect(":")?;
    Ok(BasicBlock {
        name,
        arguments,
        instructions: Vec::new(),
    })
}

fn member_line(decl: &mut TypeDecl, c: &mut Cursor) -> Result<(), ParseError> {
    let has_storage = skip_attributes_and_modifiers(c)?;
    let Some(keyword) = c.peek_word() else {
        return Ok(());
    };
    match (keyword, &decl.kind) {
        ("case", TypeKind::Enum) => {
            c.word()?;
            for item in split_top_level(c.rest()) {
                let name = item.split('(').next().unwrap_or(item).trim();
                if !name.is_empty() {
                    decl.cases.push(name.to_string());
                }
            }
            c.skip_rest();
        }
        ("var" | "let", TypeKind::Struct | TypeKind::Class) => {
            c.word()?;
            let rest = c.rest();
            let (name, ty) = match rest.split_once(':') {
                Some((name, ty)) => (name.trim(), ty),
                None => return Err(c.error("SIL016", "stored property without a type")),
            };
            let computed = ty.contains('{');
            let ty = ty.split('{').next().unwrap_or(ty).trim();
            if has_storage || keyword == "let" || !computed {
                decl.fields.push(FieldLayout {
                    name: name.to_string(),
                    ty: ty.to_string(),
                });
            }
            c.skip_rest();
        }
        _ => c.skip_rest(),
    }
    Ok(())
}

fn vtable_entry(c: &mut Cursor) -> Result<Option<VTableEntry>, ParseError> {
    let decl = c.decl_ref()?;
    let text = c.rest();
    let Some(at) = text.rfind(": @") else {
        return Err(c.error("SIL017", "vtable entry without an implementation"));
    };
    let symbol = text[at + 3..]
        .split(|ch: char| ch.is_whitespace())
        .next()
        .unwrap_or("")
        .to_string();
    c.skip_rest();
    if decl.contains("deinit") {
        return Ok(None);
    }
    Ok(Some(VTableEntry {
        method: method_key(decl),
        function: symbol,
    }))
}

/// 分岐先と省略可能な分岐引数。
fn target_with_args(c: &mut Cursor) -> Result<(Target, Vec<String>), ParseError> {
    let block = c.word()?.to_string();
    c.skip_ws();
    let args = if c.rest().starts_with('(') {
        c.operand_list()?
    } else {
        Vec::new()
    };
    Ok((Target::new(block), args))
}

/// 一行の命令を読む。読み捨てる命令は空、`destructure_*` は複数になる。
pub fn parse_instruction(c: &mut Cursor) -> Result<Vec<Instruction>, ParseError> {
    c.skip_ws();
    if c.rest().starts_with('%') {
        let dest = c.local()?;
        c.expect("=")?;
        let op = c.word()?;
        let value = parse_rvalue(op, c)?;
        return Ok(vec![Instruction::Assign { dest, value }]);
    }
    if c.rest().starts_with('(') {
        let mut dests = Vec::new();
        c.expect("(")?;
        loop {
            dests.push(c.local()?);
            if c.eat(",") {
                continue;
            }
            c.expect(")")?;
            break;
        }
        c.expect("=")?;
        let op = c.word()?;
        let operand = c.local()?;
        let ty = c.typed()?.to_string();
        return match op {
            "destructure_tuple" => Ok(dests
                .into_iter()
                .enumerate()
                .map(|(index, dest)| Instruction::Assign {
                    dest,
                    value: Rvalue::TupleExtract {
                        operand: operand.clone(),
                        index,
                    },
                })
                .collect()),
            "destructure_struct" => Ok(dests
                .into_iter()
                .enumerate()
                .map(|(index, dest)| Instruction::Assign {
                    dest,
                    value: Rvalue::StructField {
                        operand: operand.clone(),
                        ty: ty.clone(),
                        index,
                    },
                })
                .collect()),
            other => Err(c.error("SIL010", format!("unknown instruction `{}`", other))),
        };
    }
    let op = c.word()?;
    if IGNORED.contains(&op) {
        c.skip_rest();
        return Ok(Vec::new());
    }
    let instruction = match op {
        "return" => {
            let value = c.local()?;
            c.typed()?;
            Instruction::Return(Rvalue::Forward(value))
        }
        "throw" => {
            let value = c.local()?;
            c.typed()?;
            Instruction::Throw(Rvalue::Forward(value))
        }
        "unreachable" => Instruction::Unreachable,
        "br" => {
            let (target, args) = target_with_args(c)?;
            Instruction::Branch { target, args }
        }
        "cond_br" => {
            let cond = c.local()?;
            c.expect(",")?;
            let (on_true, true_args) = target_with_args(c)?;
            c.expect(",")?;
            let (on_false, false_args) = target_with_args(c)?;
            Instruction::CondBranch {
                cond,
                on_true,
                true_args,
                on_false,
                false_args,
            }
        }
        "cond_fail" => {
            let cond = c.local()?;
            c.typed()?;
            let message = if c.eat(",") { Some(c.string()?) } else { None };
            Instruction::CondFail { cond, message }
        }
        "store" | "assign" => {
            let src = c.local()?;
            c.expect("to")?;
            let attrs = c.attributes();
            let dest = c.local()?;
            let ty = c.typed()?.to_string();
            let initializes = op == "store" && !attrs.contains(&"assign");
            Instruction::Store {
                src,
                dest,
                ty,
                initializes,
            }
        }
        "copy_addr" => {
            c.attributes();
            let src = c.local()?;
            c.expect("to")?;
            let attrs = c.attributes();
            let dest = c.local()?;
            let ty = c.typed()?.to_string();
            Instruction::CopyAddr {
                src,
                dest,
                ty,
                initializes: attrs.iter().any(|a| a.starts_with("init")),
            }
        }
        "inject_enum_addr" => {
            let dest = c.local()?;
            let ty = c.typed()?.to_string();
            c.expect(",")?;
            let case = member_of_ref(c.decl_ref()?).to_string();
            Instruction::InjectEnumAddr { dest, ty, case }
        }
        "alloc_global" => Instruction::AllocGlobal(c.symbol()?),
        "switch_enum" | "switch_enum_addr" => {
            let operand = c.local()?;
            let ty = c.typed()?.to_string();
            let mut cases = Vec::new();
            while c.eat(",") {
                if c.eat("case") {
                    let case = member_of_ref(c.decl_ref()?).to_string();
                    c.expect(":")?;
                    cases.push((Some(case), Target::new(c.word()?)));
                } else if c.eat("default") {
                    cases.push((None, Target::new(c.word()?)));
                } else {
                    return Err(c.error("SIL001", "expected `case` or `default`"));
                }
            }
            Instruction::SwitchEnum {
                operand,
                ty,
                addr: op == "switch_enum_addr",
                cases,
            }
        }
        "try_apply" => {
            c.attributes();
            let callee = c.local()?;
            c.skip_generic_arguments()?;
            let args = c.operand_list()?;
            let ty = c.typed()?;
            c.expect(",")?;
            c.expect("normal")?;
            let normal = Target::new(c.word()?);
            c.expect(",")?;
            c.expect("error")?;
            let error = Target::new(c.word()?);
            Instruction::TryApply {
                callee,
                args,
                convention: Convention::of_type(ty),
                normal,
                error,
            }
        }
        other => return Err(c.error("SIL010", format!("unknown instruction `{}`", other))),
    };
    Ok(vec![instruction])
}

fn strip_address(ty: &str) -> String {
    ty.trim_start_matches('*').to_string()
}

fn parse_rvalue(op: &str, c: &mut Cursor) -> Result<Rvalue, ParseError> {
    if FORWARDING.contains(&op) {
        c.attributes();
        let operand = c.local()?;
        c.skip_rest();
        return Ok(Rvalue::Forward(operand));
    }
    let value = match op {
        "integer_literal" => {
            let ty = c.type_text()?.to_string();
            c.expect(",")?;
            let value = c.integer()?;
            Rvalue::IntegerLiteral { ty, value }
        }
        "float_literal" => {
            let ty = c.type_text()?;
            c.expect(",")?;
            let bits = c.integer()?;
            let value = if ty.contains("FPIEEE32") {
                f64::from(f32::from_bits(bits as u32))
            } else {
                f64::from_bits(bits as u64)
            };
            Rvalue::FloatLiteral(value)
        }
        "string_literal" => {
            c.word()?;
            Rvalue::StringLiteral(c.string()?)
        }
        "enum" => {
            let ty = c.type_text()?.to_string();
            c.expect(",")?;
            let case = member_of_ref(c.decl_ref()?).to_string();
            let payload = if c.eat(",") {
                let local = c.local()?;
                c.typed()?;
                Some(local)
            } else {
                None
            };
            Rvalue::Enum { ty, case, payload }
        }
        "struct" => {
            let ty = c.type_text()?.to_string();
            let fields = c.operand_list()?;
            Rvalue::Struct { ty, fields }
        }
        "tuple" => {
            c.skip_ws();
            if c.eat("$") {
                c.balanced('(', ')')?;
            }
            Rvalue::Tuple(c.operand_list()?)
        }
        "struct_extract" => {
            let operand = c.local()?;
            let ty = c.typed()?.to_string();
            c.expect(",")?;
            let field = member_of_ref(c.decl_ref()?).to_string();
            Rvalue::StructExtract { operand, ty, field }
        }
        "tuple_extract" => {
            let operand = c.local()?;
            c.typed()?;
            c.expect(",")?;
            let index = c.integer()? as usize;
            Rvalue::TupleExtract { operand, index }
        }
        "builtin" => {
            let name = c.string()?;
            c.skip_generic_arguments()?;
            let args = c.operand_list()?;
            c.typed()?;
            Rvalue::Builtin { name, args }
        }
        "function_ref" | "dynamic_function_ref" | "prev_dynamic_function_ref" => {
            let name = c.symbol()?;
            c.typed()?;
            Rvalue::FunctionRef(name)
        }
        "apply" => {
            c.attributes();
            let callee = c.local()?;
            c.skip_generic_arguments()?;
            let args = c.operand_list()?;
            let ty = c.typed()?;
            Rvalue::Apply {
                callee,
                args,
                convention: Convention::of_type(ty),
            }
        }
        "partial_apply" => {
            c.attributes();
            let callee = c.local()?;
            c.skip_generic_arguments()?;
            let args = c.operand_list()?;
            let ty = c.typed()?;
            let arity = function_arity(ty).saturating_sub(args.len());
            Rvalue::PartialApply { callee, args, arity }
        }
        "alloc_stack" => {
            c.attributes();
            let ty = c.type_text()?.to_string();
            c.skip_rest();
            Rvalue::AllocStack { ty }
        }
        "alloc_box" => {
            c.attributes();
            let ty = c.type_text()?;
            let inner = ty
                .trim_start_matches('{')
                .trim_end_matches('}')
                .trim()
                .trim_start_matches("var ")
                .trim_start_matches("let ")
                .trim();
            c.skip_rest();
            Rvalue::AllocBox {
                ty: inner.to_string(),
            }
        }
        "alloc_ref" => {
            c.attributes();
            Rvalue::AllocRef {
                ty: c.type_text()?.to_string(),
            }
        }
        "project_box" => {
            let operand = c.local()?;
            c.skip_rest();
            Rvalue::ProjectBox(operand)
        }
        "global_addr" => {
            let name = c.symbol()?;
            c.skip_rest();
            Rvalue::GlobalAddr(name)
        }
        "struct_element_addr" => {
            let operand = c.local()?;
            let ty = strip_address(c.typed()?);
            c.expect(",")?;
            let field = member_of_ref(c.decl_ref()?).to_string();
            Rvalue::StructElementAddr { operand, ty, field }
        }
        "tuple_element_addr" => {
            let operand = c.local()?;
            c.typed()?;
            c.expect(",")?;
            let index = c.integer()? as usize;
            Rvalue::TupleElementAddr { operand, index }
        }
        "ref_element_addr" => {
            c.attributes();
            let operand = c.local()?;
            c.typed()?;
            c.expect(",")?;
            let field = member_of_ref(c.decl_ref()?).to_string();
            Rvalue::RefElementAddr { operand, field }
        }
        "load" | "load_borrow" => {
            c.attributes();
            let operand = c.local()?;
            let ty = strip_address(c.typed()?);
            Rvalue::Load { operand, ty }
        }
        "unchecked_enum_data" => {
            let operand = c.local()?;
            c.skip_rest();
            Rvalue::UncheckedEnumData(operand)
        }
        "unchecked_take_enum_data_addr" | "init_enum_data_addr" => {
            let operand = c.local()?;
            c.skip_rest();
            Rvalue::EnumDataAddr(operand)
        }
        "select_enum" | "select_enum_addr" => {
            let operand = c.local()?;
            let ty = c.typed()?.to_string();
            let mut cases = Vec::new();
            while c.eat(",") {
                if c.eat("case") {
                    let case = member_of_ref(c.decl_ref()?).to_string();
                    c.expect(":")?;
                    cases.push((Some(case), c.local()?));
                } else if c.eat("default") {
                    cases.push((None, c.local()?));
                } else {
                    return Err(c.error("SIL001", "expected `case` or `default`"));
                }
            }
            c.typed()?;
            Rvalue::SelectEnum {
                operand,
                ty,
                addr: op == "select_enum_addr",
                cases,
            }
        }
        "index_addr" | "index_raw_pointer" => {
            c.attributes();
            let base = c.local()?;
            c.typed()?;
            c.expect(",")?;
            let index = c.local()?;
            c.typed()?;
            Rvalue::IndexAddr { base, index }
        }
        "metatype" => {
            c.type_text()?;
            Rvalue::Metatype
        }
        "class_method" | "objc_method" | "super_method" => {
            c.attributes();
            let operand = c.local()?;
            c.typed()?;
            c.expect(",")?;
            let method = method_key(c.decl_ref()?);
            c.skip_rest();
            Rvalue::ClassMethod { operand, method }
        }
        "witness_method"
        | "open_existential_addr"
        | "init_existential_addr"
        | "alloc_existential_box" => {
            return Err(c.error("SIL018", format!("unsupported instruction `{}`", op)));
        }
        other => return Err(c.error("SIL010", format!("unknown instruction `{}`", other))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INCREMENT: &str = r#"sil_stage canonical

import Builtin
import Swift

struct Point {
  @_hasStorage var x: Int { get set }
  @_hasStorage var y: Int { get set }
  var sum: Int { get }
  init(x: Int, y: Int)
}

enum Shape {
  case circle(Int), square
}

// increment(number:)
sil @$s4main9increment6numberS2i_tF : $@convention(thin) (Int) -> Int {
// %0                                             // users: %3, %1
bb0(%0 : $Int):
  debug_value %0 : $Int, let, name "number", argno 1 // id: %1
  %2 = integer_literal $Builtin.Int64, 1          // user: %5
  %3 = struct_extract %0 : $Int, #Int._value      // user: %5
  %4 = integer_literal $Builtin.Int1, -1          // user: %5
  %5 = builtin "sadd_with_overflow_Int64"(%3 : $Builtin.Int64, %2 : $Builtin.Int64, %4 : $Builtin.Int1) : $(Builtin.Int64, Builtin.Int1) // users: %7, %6
  %6 = tuple_extract %5 : $(Builtin.Int64, Builtin.Int1), 0 // user: %9
  %7 = tuple_extract %5 : $(Builtin.Int64, Builtin.Int1), 1 // user: %8
  cond_fail %7 : $Builtin.Int1, "arithmetic overflow" // id: %8
  %9 = struct $Int (%6 : $Builtin.Int64)          // user: %10
  return %9 : $Int                                // id: %10
} // end sil function '$s4main9increment6numberS2i_tF'
"#;

    #[test]
    /// 関数・ブロック・命令と型レイアウトを読み取る
    fn parses_function_and_types() {
        let module = parse_sil(INCREMENT).expect("parse");
        let f = module.functions().next().expect("function");
        assert_eq!(f.beautiful_name.as_deref(), Some("increment"));
        assert_eq!(f.convention, Convention::Thin);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].arguments[0].ty, "Int");
        // debug_value は捨てられる
        assert_eq!(f.blocks[0].instructions.len(), 9);
        assert!(matches!(
            &f.blocks[0].instructions[3],
            Instruction::Assign { value: Rvalue::Builtin { name, args }, .. }
                if name == "sadd_with_overflow_Int64" && args.len() == 3
        ));
        assert!(matches!(
            &f.blocks[0].instructions[6],
            Instruction::CondFail { message: Some(m), .. } if m == "arithmetic overflow"
        ));
        match module.types.get("Point") {
            Some(TypeLayout::Struct { fields }) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["x", "y"]);
            }
            other => panic!("unexpected layout {:?}", other),
        }
        assert_eq!(
            module.types.get("Shape"),
            Some(&TypeLayout::Enum {
                cases: vec!["circle".into(), "square".into()]
            })
        );
    }

    #[test]
    /// 分岐命令は分岐先と引数を持つ
    fn parses_branches() {
        let src = "sil hidden @f : $@convention(thin) (Builtin.Int1) -> () {\nbb0(%0 : $Builtin.Int1):\n  cond_br %0, bb1, bb2(%0 : $Builtin.Int1)\nbb1:\n  br bb2(%0 : $Builtin.Int1)\nbb2(%1 : $Builtin.Int1):\n  %2 = tuple ()\n  return %2 : $()\n}\n";
        let module = parse_sil(src).expect("parse");
        let f = module.functions().next().expect("function");
        assert_eq!(f.beautiful_name, None);
        assert_eq!(f.blocks.len(), 3);
        match &f.blocks[0].instructions[0] {
            Instruction::CondBranch { on_true, false_args, .. } => {
                assert_eq!(on_true.block, "bb1");
                assert_eq!(false_args, &vec!["0".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    /// struct 命令の型は被演算子リストの手前で終わる
    fn struct_type_stops_before_operands() {
        let src = "sil @f : $@convention(thin) (Builtin.Int64) -> Int {\nbb0(%0 : $Builtin.Int64):\n  %1 = struct $Int (%0 : $Builtin.Int64)\n  %2 = struct $Empty ()\n  return %1 : $Int\n}\n";
        let module = parse_sil(src).expect("parse");
        let f = module.functions().next().expect("function");
        match &f.blocks[0].instructions[0] {
            Instruction::Assign {
                value: Rvalue::Struct { ty, fields },
                ..
            } => {
                assert_eq!(ty, "Int");
                assert_eq!(fields, &vec!["0".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            &f.blocks[0].instructions[1],
            Instruction::Assign { value: Rvalue::Struct { ty, fields }, .. }
                if ty == "Empty" && fields.is_empty()
        ));
    }

    #[test]
    /// 知らない命令は行番号付きのエラーになる
    fn unknown_instruction_is_error() {
        let src = "sil @f : $@convention(thin) () -> () {\nbb0:\n  %0 = frobnicate %1 : $Int\n}\n";
        let err = parse_sil(src).expect_err("unknown");
        assert_eq!(err.0.code, "SIL010");
        assert_eq!(err.0.line, Some(3));
    }

    #[test]
    /// vtable の項目はメソッドキーと実装シンボルになる
    fn parses_vtables() {
        let src = "sil_vtable Counter {\n  #Counter.init!allocator: (Counter.Type) -> () -> Counter : @$s4main7CounterCACycfC\t// Counter.__allocating_init()\n  #Counter.increment: (Counter) -> () -> () : @$s4main7CounterC9incrementyyF\n  #Counter.deinit!deallocator: @$s4main7CounterCfD\n}\n";
        let module = parse_sil(src).expect("parse");
        match &module.declarations[0] {
            Declaration::VTable(table) => {
                assert_eq!(table.class, "Counter");
                assert_eq!(table.entries.len(), 2);
                assert_eq!(table.entries[0].method, "init$allocator");
                assert_eq!(table.entries[1].function, "$s4main7CounterC9incrementyyF");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    /// 部分適用の残り引数は関数型から数える
    fn partial_apply_arity() {
        assert_eq!(function_arity("@convention(thin) (Int, Int) -> Int"), 2);
        assert_eq!(function_arity("@callee_guaranteed () -> ()"), 0);
    }
}
