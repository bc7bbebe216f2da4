// パス: src/errors.rs
// 役割: 変換器全体で共有するエラー型と表示形式を定義する
// 意図: 型解析・値代数・変換・インタプリタのエラーを共通フォーマットで扱う
// 関連ファイル: src/types/parser.rs, src/values/mod.rs, src/driver.rs
//! エラー型の定義（共通フォーマット: \[CODE\] メッセージ @line:col / @pos）。
//!
//! - `ParseError`: 型シグネチャ / AST ダンプ / SIL テキストの構文エラー。
//! - `TypeError`: 型の具象化や名前解決の失敗。
//! - `CompileError`: 変換処理全体のエラー（上の二つを包む）。
//! - `EvalError`: 生成した JavaScript を実行する簡易インタプリタのエラー。

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub msg: String,
    pub pos: Option<usize>,      // バイトオフセット（任意）
    pub line: Option<usize>,     // 1-origin（任意）
    pub col: Option<usize>,      // 1-origin（任意）
    pub snippet: Option<String>, // エラー行のスニペット（任意）
}

impl ErrorInfo {
    pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
        Self {
            code,
            msg: msg.into(),
            pos,
            line: None,
            col: None,
            snippet: None,
        }
    }
    pub fn at(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        Self {
            code,
            msg: msg.into(),
            pos,
            line,
            col,
            snippet: None,
        }
    }
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // 1行目: ヘッダ
        match (self.line, self.col, self.pos) {
            (Some(l), Some(c), Some(p)) => write!(
                f,
                "[{}] {} @line={},col={} @pos={}",
                self.code, self.msg, l, c, p
            )?,
            (Some(l), Some(c), None) => {
                write!(f, "[{}] {} @line={},col={}", self.code, self.msg, l, c)?
            }
            (_, _, Some(p)) => write!(f, "[{}] {} @pos={}", self.code, self.msg, p)?,
            _ => write!(f, "[{}] {}", self.code, self.msg)?,
        }
        // 2行目以降: スニペット
        if let (Some(s), Some(c)) = (&self.snippet, self.col) {
            let caret = if c > 1 {
                " ".repeat(c - 1) + "^"
            } else {
                "^".to_string()
            };
            write!(f, "\n{}\n{}", s, caret)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ParseError(pub ErrorInfo);
impl ParseError {
    pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
        Self(ErrorInfo::new(code, msg, pos))
    }
    pub fn at(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        Self(ErrorInfo::at(code, msg, pos, line, col))
    }
    pub fn at_with_snippet(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
        snippet: impl Into<String>,
    ) -> Self {
        Self(ErrorInfo::at(code, msg, pos, line, col).with_snippet(snippet))
    }
}

#[derive(Debug, Clone)]
pub struct TypeError(pub ErrorInfo);
impl TypeError {
    pub fn new(code: &'static str, msg: impl Into<String>) -> Self {
        Self(ErrorInfo::new(code, msg, None))
    }
}

#[derive(Debug, Clone)]
pub struct CompileError(pub ErrorInfo);
impl CompileError {
    pub fn new(code: &'static str, msg: impl Into<String>) -> Self {
        Self(ErrorInfo::new(code, msg, None))
    }
    /// エラーコードを取り出す（テストでの判定用）。
    pub fn code(&self) -> &'static str {
        self.0.code
    }
}

#[derive(Debug, Clone)]
pub struct EvalError(pub ErrorInfo);
impl EvalError {
    pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
        Self(ErrorInfo::new(code, msg, pos))
    }
    pub fn code(&self) -> &'static str {
        self.0.code
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
impl StdError for ParseError {}

impl Display for TypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
impl StdError for TypeError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
impl StdError for CompileError {}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
impl StdError for EvalError {}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError(e.0)
    }
}

impl From<TypeError> for CompileError {
    fn from(e: TypeError) -> Self {
        CompileError(e.0)
    }
}

/// 変換処理で使う結果型。
pub type CResult<T> = Result<T, CompileError>;
