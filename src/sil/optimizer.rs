// パス: src/sil/optimizer.rs
// 役割: SIL 関数の集約値の転送・コピー伝播・不要命令の除去・ブロックのインライン化と刈り込み
// 意図: コード生成が `state` 分岐表を必要とするブロックを最小にし、残りを参照元へ展開する
// 関連ファイル: src/sil/mod.rs, src/sil/codegen.rs, src/sil/stdlib.rs
//! SIL 最適化
//!
//! 1. `struct` / `tuple` から直後に取り出す値を元のローカルへ転送する。
//!    単一フィールドの構造体（`Int` など）はフィールドそのものとして扱う。
//! 2. 値をそのまま渡す命令を消し、使用側の名前を付け替える。
//! 3. 結果が使われない純粋な命令を不動点まで消す。
//! 4. `return` / `throw` の直前の代入を終端命令へ融合する。
//! 5. 参照元のない入口以外のブロックを不動点まで刈り込み、前方からの参照が
//!    ちょうど一つのブロックをその参照元へインライン化する。入口は刈り込まない。

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{stdlib, Declaration, Function, Instruction, Module, Rvalue, TypeLayout};

/// モジュール内のすべての関数を最適化する。
pub fn optimize(module: &mut Module) {
    let Module {
        declarations,
        types,
    } = module;
    let layouts = Layouts { types };
    for decl in declarations.iter_mut() {
        if let Declaration::Function(function) = decl {
            if !function.is_declaration() {
                optimize_function(function, &layouts);
            }
        }
    }
}

struct Layouts<'a> {
    types: &'a BTreeMap<String, TypeLayout>,
}

impl Layouts<'_> {
    fn fields(&self, ty: &str) -> Option<Vec<&str>> {
        let base = super::base_type_name(ty);
        let layout = self.types.get(base).or_else(|| stdlib::layout(base))?;
        match layout {
            TypeLayout::Struct { fields } => Some(fields.iter().map(|f| f.name.as_str()).collect()),
            _ => None,
        }
    }

    /// 単一フィールドの構造体か。
    fn is_newtype(&self, ty: &str) -> bool {
        self.fields(ty).map(|f| f.len() == 1).unwrap_or(false)
    }
}

fn optimize_function(function: &mut Function, layouts: &Layouts) {
    forward_aggregates(function, layouts);
    propagate_copies(function);
    remove_dead_values(function);
    fuse_exits(function);
    let pruned = prune_dead_blocks(function);
    let inlined = inline_blocks(function);
    log::debug!(
        "sil: {} optimized ({} blocks pruned, {} inlined, {} dispatched)",
        function.name,
        pruned,
        inlined,
        function.blocks.len()
    );
}

fn forward_aggregates(function: &mut Function, layouts: &Layouts) {
    let mut defs: HashMap<String, Rvalue> = HashMap::new();
    for block in &function.blocks {
        for ins in &block.instructions {
            if let Instruction::Assign { dest, value } = ins {
                if matches!(value, Rvalue::Struct { .. } | Rvalue::Tuple(_)) {
                    defs.insert(dest.clone(), value.clone());
                }
            }
        }
    }
    for block in &mut function.blocks {
        for ins in &mut block.instructions {
            let Instruction::Assign { value, .. } = ins else {
                continue;
            };
            let replacement = match &*value {
                Rvalue::Struct { ty, fields } if fields.len() == 1 && layouts.is_newtype(ty) => {
                    Some(fields[0].clone())
                }
                Rvalue::StructExtract { operand, ty, field } => match defs.get(operand) {
                    Some(Rvalue::Struct { ty: sty, fields }) => layouts
                        .fields(sty)
                        .and_then(|names| names.iter().position(|n| n == field))
                        .and_then(|i| fields.get(i).cloned()),
                    _ if layouts.is_newtype(ty) => Some(operand.clone()),
                    _ => None,
                },
                Rvalue::StructField { operand, ty, index } => match defs.get(operand) {
                    Some(Rvalue::Struct { fields, .. }) => fields.get(*index).cloned(),
                    _ if layouts.is_newtype(ty) => Some(operand.clone()),
                    _ => None,
                },
                Rvalue::StructElementAddr { operand, ty, .. } if layouts.is_newtype(ty) => {
                    Some(operand.clone())
                }
                Rvalue::TupleExtract { operand, index } => match defs.get(operand) {
                    Some(Rvalue::Tuple(items)) => items.get(*index).cloned(),
                    _ => None,
                },
                _ => None,
            };
            if let Some(local) = replacement {
                *value = Rvalue::Forward(local);
            }
        }
    }
}

fn propagate_copies(function: &mut Function) {
    let mut forwards: HashMap<String, String> = HashMap::new();
    for block in &function.blocks {
        for ins in &block.instructions {
            if let Instruction::Assign {
                dest,
                value: Rvalue::Forward(src),
            } = ins
            {
                forwards.insert(dest.clone(), src.clone());
            }
        }
    }
    if forwards.is_empty() {
        return;
    }
    let resolve = |name: &str| {
        let mut current = name.to_string();
        let mut steps = 0;
        while let Some(next) = forwards.get(&current) {
            current = next.clone();
            steps += 1;
            if steps > forwards.len() {
                break;
            }
        }
        current
    };
    let resolved: Vec<(String, String)> = forwards
        .keys()
        .map(|dest| (dest.clone(), resolve(dest)))
        .collect();
    for block in &mut function.blocks {
        block.instructions.retain(|ins| {
            !matches!(ins, Instruction::Assign { value: Rvalue::Forward(_), .. })
        });
        for ins in &mut block.instructions {
            for (from, to) in &resolved {
                ins.rename(from, to);
            }
        }
    }
}

fn use_counts(function: &Function) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for block in &function.blocks {
        for ins in &block.instructions {
            for operand in ins.operands() {
                *counts.entry(operand.to_string()).or_insert(0) += 1;
            }
        }
    }
    counts
}

fn remove_dead_values(function: &mut Function) {
    loop {
        let counts = use_counts(function);
        let mut changed = false;
        for block in &mut function.blocks {
            let before = block.instructions.len();
            block.instructions.retain(|ins| match ins {
                Instruction::Assign { dest, value } => {
                    !value.is_pure() || counts.get(dest).copied().unwrap_or(0) > 0
                }
                _ => true,
            });
            changed |= block.instructions.len() != before;
        }
        if !changed {
            return;
        }
    }
}

fn fuse_exits(function: &mut Function) {
    let counts = use_counts(function);
    for block in &mut function.blocks {
        let n = block.instructions.len();
        if n < 2 {
            continue;
        }
        let fusable = match (&block.instructions[n - 2], &block.instructions[n - 1]) {
            (
                Instruction::Assign { dest, .. },
                Instruction::Return(Rvalue::Forward(src))
                | Instruction::Throw(Rvalue::Forward(src)),
            ) => dest == src && counts.get(dest).copied() == Some(1),
            _ => false,
        };
        if !fusable {
            continue;
        }
        if let Instruction::Assign { value, .. } = block.instructions.remove(n - 2) {
            match block.instructions.last_mut() {
                Some(Instruction::Return(exit)) | Some(Instruction::Throw(exit)) => *exit = value,
                _ => {}
            }
        }
    }
}

/// ブロック名 → 参照元ブロックの位置（辺ごとに一つ）。
fn predecessors(function: &Function) -> HashMap<String, Vec<usize>> {
    let mut preds: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, block) in function.blocks.iter().enumerate() {
        if let Some(term) = block.terminator() {
            for target in term.targets() {
                preds.entry(target.block.clone()).or_default().push(i);
            }
        }
    }
    preds
}

/// 入口から到達できないブロックを取り除く。入口は残す。
///
/// 刈り込みで参照元が減ると別のブロックも死ぬので、入口からの到達可能性で
/// 不動点をまとめて求める。
fn prune_dead_blocks(function: &mut Function) -> usize {
    let Some(entry) = function.blocks.first().map(|b| b.name.clone()) else {
        return 0;
    };
    let mut reachable: HashSet<String> = HashSet::new();
    let mut work = vec![entry];
    while let Some(name) = work.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        let successors = function
            .blocks
            .iter()
            .find(|b| b.name == name)
            .and_then(|b| b.terminator())
            .map(|t| t.targets().into_iter().map(|t| t.block.clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        work.extend(successors);
    }
    let before = function.blocks.len();
    function.blocks.retain(|b| reachable.contains(&b.name));
    before - function.blocks.len()
}

/// 前方からの参照がちょうど一つのブロックを展開対象にする。
fn inline_blocks(function: &mut Function) -> usize {
    let preds = predecessors(function);
    let position: HashMap<String, usize> = function
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.clone(), i))
        .collect();
    let inlineable = |name: &str| -> bool {
        match (position.get(name), preds.get(name)) {
            (Some(&at), Some(from)) => at > 0 && from.len() == 1 && from[0] < at,
            _ => false,
        }
    };
    let names: Vec<String> = function
        .blocks
        .iter()
        .map(|b| b.name.clone())
        .filter(|name| inlineable(name))
        .collect();
    for block in &mut function.blocks {
        if let Some(term) = block.instructions.last_mut() {
            for target in term.targets_mut() {
                target.inline = names.contains(&target.block);
            }
        }
    }
    let mut kept = Vec::with_capacity(function.blocks.len());
    for block in function.blocks.drain(..) {
        if names.contains(&block.name) {
            function.inlined.insert(block.name.clone(), block);
        } else {
            kept.push(block);
        }
    }
    function.blocks = kept;
    names.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sil::parse_sil;

    fn optimized(src: &str) -> Function {
        let mut module = parse_sil(src).expect("parse");
        optimize(&mut module);
        let f = module.functions().next().cloned().expect("function");
        f
    }

    #[test]
    /// Int の包み直しは転送され、戻り値へ融合される
    fn forwards_newtype_structs() {
        let f = optimized(
            "sil @id : $@convention(thin) (Int) -> Int {\nbb0(%0 : $Int):\n  %1 = struct_extract %0 : $Int, #Int._value\n  %2 = struct $Int (%1 : $Builtin.Int64)\n  return %2 : $Int\n}\n",
        );
        assert_eq!(
            f.blocks[0].instructions,
            vec![Instruction::Return(Rvalue::Forward("0".into()))]
        );
    }

    #[test]
    /// 前方参照一つのブロックは展開され、ループの先頭は分岐表に残る
    fn inlines_forward_blocks_and_keeps_loop_headers() {
        let f = optimized(
            "sil @loop : $@convention(thin) (Builtin.Int1) -> () {\nbb0(%0 : $Builtin.Int1):\n  br bb1\nbb1:\n  cond_br %0, bb2, bb3\nbb2:\n  br bb1\nbb3:\n  %1 = tuple ()\n  return %1 : $()\n}\n",
        );
        let names: Vec<&str> = f.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["bb0", "bb1"]);
        assert!(f.inlined.contains_key("bb2"));
        assert!(f.inlined.contains_key("bb3"));
        assert!(matches!(
            f.inlined["bb3"].instructions.last(),
            Some(Instruction::Return(Rvalue::Tuple(items))) if items.is_empty()
        ));
    }

    #[test]
    /// 到達しないブロックは閉路ごと刈り込まれ、入口は残る
    fn prunes_unreachable_blocks() {
        let f = optimized(
            "sil @dead : $@convention(thin) () -> () {\nbb0:\n  %0 = tuple ()\n  return %0 : $()\nbb1:\n  br bb2\nbb2:\n  br bb1\n}\n",
        );
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].name, "bb0");
        assert!(f.inlined.is_empty());
    }

    #[test]
    /// 副作用のある命令は結果が使われなくても残る
    fn keeps_effectful_instructions() {
        let f = optimized(
            "sil @eff : $@convention(thin) () -> () {\nbb0:\n  %0 = function_ref @g : $@convention(thin) () -> Int\n  %1 = apply %0() : $@convention(thin) () -> Int\n  %2 = tuple ()\n  return %2 : $()\n}\n",
        );
        assert_eq!(f.blocks[0].instructions.len(), 3);
    }
}
