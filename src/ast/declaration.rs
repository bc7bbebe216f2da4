// パス: src/ast/declaration.rs
// 役割: `decl=` プロパティの宣言参照を分解する
// 意図: 参照先がローカル変数・型のメンバ・大域関数のどれかを翻訳器が判断できるようにする
// 関連ファイル: src/ast/mod.rs, src/frontend/exprs.rs
//! 宣言参照
//!
//! 例:
//! - `main.(file).increment(number:)` → member
//! - `main.(file).increment(number:).number@main.swift:1:31` → local
//! - `Swift.(file).Int extension.+` / `main.(file).Point.init(x:y:)` → type + member
//! - `Swift.(file).Array.append [with (substitution_map generic_signature=<Element> (substitution Element -> Int))]`

use crate::errors::ParseError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericConformance {
    pub name: String,
    pub protocol: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declaration {
    pub ty: Option<String>,
    pub member: Option<String>,
    pub local: Option<String>,
    pub substitutions: Vec<Substitution>,
    pub signature: Vec<GenericConformance>,
}

/// 括弧の外にある区切り文字で分割する。
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                out.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&text[start..]);
    out
}

fn is_name_start(segment: &str) -> bool {
    segment
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_' || c == '$')
        .unwrap_or(false)
}

/// `(substitution A -> B)` を順に集める。
fn parse_substitutions(text: &str) -> Vec<Substitution> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(i) = rest.find("(substitution ") {
        let body = &rest[i + "(substitution ".len()..];
        let mut depth = 0usize;
        let mut end = body.len();
        for (j, c) in body.char_indices() {
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    end = j;
                    break;
                }
                ')' => depth -= 1,
                _ => {}
            }
        }
        let inner = &body[..end];
        if let Some((from, to)) = inner.split_once(" -> ") {
            out.push(Substitution {
                from: from.trim().to_string(),
                to: to.trim().to_string(),
            });
        }
        rest = &body[end..];
    }
    out
}

/// `<T, U : P where T : Q>` の一覧。where 節の制約は既存の名前に追加する。
fn parse_signature(text: &str) -> Vec<GenericConformance> {
    let start = match text.find("generic_signature=<") {
        Some(i) => i + "generic_signature=<".len(),
        None => return Vec::new(),
    };
    let body = &text[start..];
    let mut depth = 0usize;
    let mut end = body.len();
    for (i, c) in body.char_indices() {
        match c {
            '<' => depth += 1,
            '>' if depth == 0 => {
                end = i;
                break;
            }
            '>' => depth -= 1,
            _ => {}
        }
    }
    let body = &body[..end];
    let (params, clauses) = match body.split_once(" where ") {
        Some((p, w)) => (p, Some(w)),
        None => (body, None),
    };
    let mut out: Vec<GenericConformance> = Vec::new();
    for param in split_top_level(params, ',') {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let (name, protocol) = match param.split_once(':') {
            Some((n, p)) => (n.trim(), Some(p.trim().to_string())),
            None => (param, None),
        };
        out.push(GenericConformance {
            name: name.to_string(),
            protocol,
        });
    }
    if let Some(clauses) = clauses {
        for clause in split_top_level(clauses, ',') {
            if let Some((name, protocol)) = clause.split_once(':') {
                out.push(GenericConformance {
                    name: name.trim().to_string(),
                    protocol: Some(protocol.trim().to_string()),
                });
            }
        }
    }
    out
}

fn parse_inner(text: &str) -> Result<Declaration, ParseError> {
    let mut decl = Declaration::default();
    let (path, with) = match text.find(" [with ") {
        Some(i) => (&text[..i], Some(&text[i..])),
        None => (text, None),
    };
    if let Some(with) = with {
        decl.substitutions = parse_substitutions(with);
        decl.signature = parse_signature(with);
    }
    let path = path.trim();
    if path.is_empty() {
        return Err(ParseError::new("AST101", "空の宣言参照です", None));
    }
    let path = match path.find(".(file).") {
        Some(i) => &path[i + ".(file).".len()..],
        None => path,
    };

    if let Some((ty, member)) = path.split_once(" extension.") {
        decl.ty = Some(ty.trim().to_string());
        decl.member = Some(member.to_string());
        return Ok(decl);
    }

    if let Some(at) = path.rfind('@') {
        let segments = split_top_level(&path[..at], '.');
        let local = segments.last().copied().unwrap_or("");
        if local.is_empty() {
            return Err(ParseError::new(
                "AST102",
                format!("ローカル参照の名前がありません: {}", text),
                Some(at),
            ));
        }
        decl.local = Some(local.to_string());
        return Ok(decl);
    }

    // 先頭から名前の区切りを辿り、演算子で始まる残りはそのままメンバとする
    let segments = split_top_level(path, '.');
    let mut names: Vec<&str> = Vec::new();
    let mut offset = 0;
    let mut operator = None;
    for segment in &segments {
        if !is_name_start(segment) {
            operator = Some(&path[offset..]);
            break;
        }
        names.push(segment);
        offset += segment.len() + 1;
    }
    let member = match operator {
        Some(op) => op.to_string(),
        None => match names.pop() {
            Some(last) => last.to_string(),
            None => {
                return Err(ParseError::new(
                    "AST103",
                    format!("宣言参照を分解できません: {}", text),
                    None,
                ))
            }
        },
    };
    if !names.is_empty() {
        decl.ty = Some(names.join("."));
    }
    decl.member = Some(member);
    Ok(decl)
}

/// 宣言参照を解析する。失敗時は `declaration: <text>` をログに残す。
pub fn parse_declaration(text: &str) -> Result<Declaration, ParseError> {
    parse_inner(text).map_err(|e| {
        log::error!("declaration: {}", text);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 大域関数はメンバだけを持つ
    fn free_function() {
        let d = parse_declaration("main.(file).increment(number:)").expect("decl");
        assert_eq!(d.member.as_deref(), Some("increment(number:)"));
        assert_eq!(d.ty, None);
        assert_eq!(d.local, None);
    }

    #[test]
    /// 位置付きの参照はローカル変数
    fn local_variable() {
        let d = parse_declaration("main.(file).increment(number:).number@main.swift:1:31")
            .expect("decl");
        assert_eq!(d.local.as_deref(), Some("number"));
        let d = parse_declaration("main.(file).describe(barcode:).$match@main.swift:2:3")
            .expect("decl");
        assert_eq!(d.local.as_deref(), Some("$match"));
    }

    #[test]
    /// 型のメンバと extension 形式
    fn type_members() {
        let d = parse_declaration("main.(file).Point.init(x:y:)").expect("decl");
        assert_eq!(d.ty.as_deref(), Some("Point"));
        assert_eq!(d.member.as_deref(), Some("init(x:y:)"));

        let d = parse_declaration("Swift.(file).Int extension.+").expect("decl");
        assert_eq!(d.ty.as_deref(), Some("Int"));
        assert_eq!(d.member.as_deref(), Some("+"));

        let d = parse_declaration("Swift.(file).Int.+=").expect("decl");
        assert_eq!(d.ty.as_deref(), Some("Int"));
        assert_eq!(d.member.as_deref(), Some("+="));

        let d = parse_declaration("Swift.(file)....").expect("decl");
        assert_eq!(d.ty, None);
        assert_eq!(d.member.as_deref(), Some("..."));
    }

    #[test]
    /// 置換表と総称シグネチャ
    fn substitutions_and_signature() {
        let d = parse_declaration(
            "Swift.(file).Equatable.== [with (substitution_map generic_signature=<Self where Self : Equatable> (substitution Self -> Point))]",
        )
        .expect("decl");
        assert_eq!(d.ty.as_deref(), Some("Equatable"));
        assert_eq!(d.member.as_deref(), Some("=="));
        assert_eq!(
            d.substitutions,
            vec![Substitution { from: "Self".into(), to: "Point".into() }]
        );
        assert_eq!(
            d.signature,
            vec![
                GenericConformance { name: "Self".into(), protocol: None },
                GenericConformance { name: "Self".into(), protocol: Some("Equatable".into()) },
            ]
        );

        let d = parse_declaration(
            "Swift.(file).Dictionary.subscript(_:) [with (substitution_map generic_signature=<Key, Value where Key : Hashable> (substitution Key -> String) (substitution Value -> (Int, Int)))]",
        )
        .expect("decl");
        assert_eq!(d.substitutions.len(), 2);
        assert_eq!(d.substitutions[1].to, "(Int, Int)");
    }

    #[test]
    /// 空の参照はエラー
    fn empty_is_error() {
        assert_eq!(parse_declaration("  ").expect_err("empty").0.code, "AST101");
    }
}
