// パス: src/sil/lexer.rs
// 役割: SIL の一行を語・ローカル・シンボル・型テキスト・文字列へ切り出すカーソル
// 意図: 正規表現に頼らず、括弧の深さを数えながら型テキストの範囲を決める
// 関連ファイル: src/sil/parser.rs, src/errors.rs
//! 行カーソル
//!
//! - 型テキスト `$...` は括弧 `() <> [] {}` の深さ 0 にある `,`・閉じ括弧・` to `・` {` で終わる。
//! - `->` の `>` は括弧として数えない。
//! - すべての失敗は行番号と桁位置付きの `ParseError`（SIL0xx）になる。

use crate::errors::ParseError;

/// 一行分のカーソル。`offset` は入力全体でのこの行の先頭バイト位置。
pub struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
    offset: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
}

/// `//` 以降の行コメントを取り除く（文字列リテラルの中は除く）。
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            return line[..i].trim_end();
        }
    }
    line.trim_end()
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str, line: usize, offset: usize) -> Self {
        Self {
            text,
            pos: 0,
            line,
            offset,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.text.len()
    }

    /// 現在位置を指すエラー。
    pub fn error(&self, code: &'static str, msg: impl Into<String>) -> ParseError {
        let col = self.text[..self.pos].chars().count() + 1;
        ParseError::at_with_snippet(
            code,
            msg,
            Some(self.offset + self.pos),
            Some(self.line),
            Some(col),
            self.text,
        )
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// 空白の後に `token` があれば読み進める。
    pub fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, token: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error("SIL001", format!("expected `{}`", token)))
        }
    }

    /// 語（英数字・`_`・`$`・`.`）。
    pub fn word(&mut self) -> Result<&'a str, ParseError> {
        self.skip_ws();
        let rest = self.rest();
        let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error("SIL002", "expected a word"));
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    /// 次が語なら読まずに返す。
    pub fn peek_word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    }

    /// `%N`（`%N#1` の結果番号は捨てる）。
    pub fn local(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        if !self.rest().starts_with('%') {
            return Err(self.error("SIL003", "expected a local value"));
        }
        self.pos += 1;
        let name = self.word()?.to_string();
        if self.rest().starts_with('#') {
            self.pos += 1;
            self.word()?;
        }
        Ok(name)
    }

    /// `@symbol`
    pub fn symbol(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        if !self.rest().starts_with('@') {
            return Err(self.error("SIL004", "expected a symbol"));
        }
        self.pos += 1;
        Ok(self.word()?.to_string())
    }

    /// `[attr]` の並びを読み、中身を返す。
    pub fn attributes(&mut self) -> Vec<&'a str> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            let rest = self.rest();
            if !rest.starts_with('[') {
                return out;
            }
            match rest.find(']') {
                Some(end) => {
                    out.push(rest[1..end].trim());
                    self.pos += end + 1;
                }
                None => return out,
            }
        }
    }

    /// 括弧の対応を取りながら `<...>` を読み飛ばす。
    pub fn skip_generic_arguments(&mut self) -> Result<(), ParseError> {
        self.skip_ws();
        if !self.rest().starts_with('<') {
            return Ok(());
        }
        let mut depth = 0usize;
        let text = self.rest();
        let mut prev = ' ';
        for (i, c) in text.char_indices() {
            match c {
                '<' => depth += 1,
                '>' if prev != '-' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += i + 1;
                        return Ok(());
                    }
                }
                _ => {}
            }
            prev = c;
        }
        Err(self.error("SIL005", "unterminated generic arguments"))
    }

    /// `open` から対応する `close` までを読み、括弧を含むテキストを返す。
    pub fn balanced(&mut self, open: char, close: char) -> Result<&'a str, ParseError> {
        self.skip_ws();
        let text = self.rest();
        if !text.starts_with(open) {
            return Err(self.error("SIL001", format!("expected `{}`", open)));
        }
        let mut depth = 0usize;
        for (i, c) in text.char_indices() {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    self.pos += i + 1;
                    return Ok(&text[..i + 1]);
                }
            }
        }
        Err(self.error("SIL005", format!("unterminated `{}`", open)))
    }

    /// `$T` の型テキスト（`$` は含めない）。
    pub fn type_text(&mut self) -> Result<&'a str, ParseError> {
        self.skip_ws();
        // `@owned $T` のような所有権注釈は読み飛ばす
        while self.rest().starts_with('@') {
            let rest = self.rest();
            let end = rest.find(' ').unwrap_or(rest.len());
            self.pos += end;
            self.skip_ws();
        }
        if !self.rest().starts_with('$') {
            return Err(self.error("SIL006", "expected a type"));
        }
        self.pos += 1;
        let text = self.rest();
        let mut depth = 0i32;
        let mut prev = ' ';
        let mut end = text.len();
        for (i, c) in text.char_indices() {
            match c {
                '(' | '<' | '[' | '{' => depth += 1,
                '>' if prev == '-' => {}
                ')' | '>' | ']' | '}' => {
                    if depth == 0 {
                        end = i;
                        break;
                    }
                    depth -= 1;
                }
                ',' if depth == 0 => {
                    end = i;
                    break;
                }
                ' ' if depth == 0 => {
                    let after = &text[i..];
                    // `struct $T (%a : $U)` の被演算子リストは型に含めない
                    let operands = after.starts_with(" (%")
                        || (after.starts_with(" ()")
                            && !after[3..].trim_start().starts_with("->"));
                    if operands || after.starts_with(" to ") || after.trim_end() == " {" {
                        end = i;
                        break;
                    }
                }
                _ => {}
            }
            prev = c;
        }
        self.pos += end;
        let ty = text[..end].trim();
        if ty.is_empty() {
            return Err(self.error("SIL006", "empty type"));
        }
        Ok(ty)
    }

    /// `: $T` を読み、型テキストを返す。
    pub fn typed(&mut self) -> Result<&'a str, ParseError> {
        self.expect(":")?;
        self.type_text()
    }

    /// `"..."` の文字列リテラル（SIL のエスケープを解いたもの）。
    pub fn string(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        if !self.rest().starts_with('"') {
            return Err(self.error("SIL007", "expected a string literal"));
        }
        let text = self.rest();
        let mut out = String::new();
        let mut chars = text.char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\'')) => out.push('\''),
                    Some((_, 'u')) => {
                        let mut code = String::new();
                        for (_, c) in chars.by_ref() {
                            if c == '}' {
                                break;
                            }
                            if c != '{' {
                                code.push(c);
                            }
                        }
                        let ch = u32::from_str_radix(&code, 16).ok().and_then(char::from_u32);
                        match ch {
                            Some(ch) => out.push(ch),
                            None => return Err(self.error("SIL007", "invalid unicode escape")),
                        }
                    }
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                other => out.push(other),
            }
        }
        Err(self.error("SIL007", "unterminated string literal"))
    }

    /// 符号付き整数。
    pub fn integer(&mut self) -> Result<i128, ParseError> {
        self.skip_ws();
        let negative = self.rest().starts_with('-');
        if negative {
            self.pos += 1;
        }
        let rest = self.rest();
        let end = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
        let digits = &rest[..end];
        let parsed = match digits.strip_prefix("0x") {
            Some(hex) => i128::from_str_radix(hex, 16),
            None => digits.parse::<i128>(),
        };
        match parsed {
            Ok(v) => {
                self.pos += end;
                Ok(if negative { -v } else { v })
            }
            Err(_) => Err(self.error("SIL008", format!("invalid integer `{}`", digits))),
        }
    }

    /// `#Type.member!kind` の宣言参照。
    pub fn decl_ref(&mut self) -> Result<&'a str, ParseError> {
        self.skip_ws();
        if !self.rest().starts_with('#') {
            return Err(self.error("SIL009", "expected a declaration reference"));
        }
        self.pos += 1;
        let text = self.rest();
        let end = text
            .find(|c: char| !(is_word_char(c) || c == '!'))
            .unwrap_or(text.len());
        self.pos += end;
        Ok(&text[..end])
    }

    /// `(%a : $A, %b)` のようなローカルの並び。型注釈は読み捨てる。
    pub fn operand_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect("(")?;
        let mut out = Vec::new();
        if self.eat(")") {
            return Ok(out);
        }
        loop {
            out.push(self.local()?);
            self.skip_ws();
            if self.rest().starts_with(':') {
                self.typed()?;
            }
            if self.eat(",") {
                continue;
            }
            self.expect(")")?;
            return Ok(out);
        }
    }

    /// 行末まで読み捨てる。
    pub fn skip_rest(&mut self) {
        self.pos = self.text.len();
    }
}

/// 宣言参照 `Point.x` / `Optional.some!enumelt` から最後のメンバー名を取る。
pub fn member_of_ref(decl: &str) -> &str {
    let base = decl.split('!').next().unwrap_or(decl);
    base.rsplit('.').next().unwrap_or(base)
}

/// 括弧 `() <>` の外にあるカンマで分割する。
pub fn split_top_level(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut prev = ' ';
    for (i, c) in text.char_indices() {
        match c {
            '(' | '<' | '[' => depth += 1,
            '>' if prev == '-' => {}
            ')' | '>' | ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        prev = c;
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 型テキストは深さ 0 のカンマで終わる
    fn type_text_stops_at_top_level_comma() {
        let mut c = Cursor::new("%0 : $(Builtin.Int64, Builtin.Int1), 0", 1, 0);
        assert_eq!(c.local().expect("local"), "0");
        assert_eq!(c.typed().expect("type"), "(Builtin.Int64, Builtin.Int1)");
        assert!(c.eat(","));
        assert_eq!(c.integer().expect("int"), 0);
    }

    #[test]
    /// 関数型の矢印は括弧として数えない
    fn arrows_do_not_close_types() {
        let mut c = Cursor::new("$@convention(thin) (Int) -> Int {", 1, 0);
        assert_eq!(c.type_text().expect("type"), "@convention(thin) (Int) -> Int");
        assert!(c.eat("{"));
    }

    #[test]
    /// 文字列中の // はコメントとして扱わない
    fn comments_outside_strings() {
        assert_eq!(
            strip_comment(r#"%1 = string_literal utf8 "a//b" // user: %2"#),
            r#"%1 = string_literal utf8 "a//b""#
        );
    }

    #[test]
    /// 読めない整数は位置付きのエラーになる
    fn integer_error_has_position() {
        let mut c = Cursor::new("  %2 = integer_literal $Builtin.Int64, zz", 7, 100);
        c.local().expect("local");
        c.expect("=").expect("eq");
        c.word().expect("word");
        c.type_text().expect("type");
        c.expect(",").expect("comma");
        let err = c.integer().expect_err("bad integer");
        assert_eq!(err.0.code, "SIL008");
        assert_eq!(err.0.line, Some(7));
    }

    #[test]
    /// カンマ分割は括弧の中を割らない
    fn splits_outside_parens() {
        assert_eq!(
            split_top_level("Int, (Int, Int) -> Int, Array<(A, B)>"),
            vec!["Int", "(Int, Int) -> Int", "Array<(A, B)>"]
        );
    }
}
