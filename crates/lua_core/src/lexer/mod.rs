//! Token stream over a [`Reader`] (spec §4.C), grounded on
//! `original_source/src/lexer.c` for comment/number scanning and on
//! `examples/iGentAI-ferrous/src/lua_new/lexer.rs`'s `read_string` for
//! quoted-string escapes, which the original drafts left as a TODO (SPEC_FULL
//! §6 notes `parser.c`'s string support but the retrieved `lexer.c` draft
//! never grew quote handling).

mod token;

pub use token::{tk2str, Token, TokenKind, TokenValue};

use crate::error::{LuaError, SourcePos};
use crate::reader::{ChunkSource, Reader, EOF};
use token::keyword_or_ident;

pub struct Lexer<'src> {
    r: Reader<'src>,
    chunk_name: String,
    cur: Token,
}

fn is_alpha(c: i32) -> bool {
    (b'a' as i32..=b'z' as i32).contains(&c) || (b'A' as i32..=b'Z' as i32).contains(&c)
}
fn is_digit(c: i32) -> bool {
    (b'0' as i32..=b'9' as i32).contains(&c)
}
fn is_alnum(c: i32) -> bool {
    is_alpha(c) || is_digit(c) || c == b'_' as i32
}
fn is_space(c: i32) -> bool {
    c == ' ' as i32 || c == '\t' as i32 || c == '\n' as i32 || c == '\r' as i32 || c == 0x0b || c == 0x0c
}

impl<'src> Lexer<'src> {
    pub fn new(source: impl ChunkSource + 'src, chunk_name: impl Into<String>) -> Result<Self, LuaError> {
        let mut lexer = Lexer {
            r: Reader::new(source),
            chunk_name: chunk_name.into(),
            cur: Token {
                kind: TokenKind::Eof,
                value: TokenValue::None,
                line: 1,
                col: 0,
            },
        };
        lexer.read_tk()?;
        Ok(lexer)
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.chunk_name.clone(), self.r.line(), self.r.col())
    }

    fn err(&self, msg: impl std::fmt::Display) -> LuaError {
        LuaError::syntax(&self.pos(), msg)
    }

    fn peek_ch(&mut self) -> i32 {
        self.r.peek_ch()
    }

    fn peek_ch2(&mut self) -> i32 {
        self.r.peek_ch2()
    }

    fn read_ch(&mut self) -> i32 {
        self.r.read_ch()
    }

    fn undo_ch(&mut self, c: i32, line: i32, col: i32) {
        self.r.undo_ch(c, line, col);
    }

    pub fn current(&self) -> &Token {
        &self.cur
    }

    /// Advances and returns the new current token (spec §4.C `read_tk`).
    pub fn read_tk(&mut self) -> Result<&Token, LuaError> {
        self.next_tk()?;
        Ok(&self.cur)
    }

    /// Returns the current (already-lexed) token without advancing.
    pub fn peek_tk(&self) -> &Token {
        &self.cur
    }

    /// Asserts the current kind, advances, and raises otherwise
    /// (spec §4.C `expect_tk`).
    pub fn expect_tk(&mut self, expected: TokenKind) -> Result<Token, LuaError> {
        if self.cur.kind == expected {
            let tok = self.cur.clone();
            self.read_tk()?;
            Ok(tok)
        } else {
            Err(self.err(format!(
                "expected {}, found {}",
                tk2str(expected),
                tk2str(self.cur.kind)
            )))
        }
    }

    fn skip_spaces(&mut self) -> Result<(), LuaError> {
        loop {
            let c = self.peek_ch();
            if c == '-' as i32 && self.peek_ch2() == '-' as i32 {
                self.skip_comment()?;
            } else if is_space(c) {
                self.read_ch();
            } else {
                break;
            }
        }
        Ok(())
    }

    fn skip_comment(&mut self) -> Result<(), LuaError> {
        self.read_ch();
        self.read_ch(); // skip "--"
        if self.peek_ch() == '[' as i32 {
            if let Some(level) = self.try_open_long_bracket()? {
                self.skip_block_comment(level)?;
                return Ok(());
            }
        }
        self.skip_line_comment();
        Ok(())
    }

    /// Tries to consume `[=*[`. On a non-matching `[`, returns `None` and
    /// leaves the reader positioned after the `[`s and `=`s it consumed
    /// (mirroring `lex_open_long_bracket`'s "fall through" behavior, used by
    /// both comments and, were they in scope, long string literals).
    fn try_open_long_bracket(&mut self) -> Result<Option<u32>, LuaError> {
        self.read_ch(); // first '['
        let mut level = 0u32;
        while self.peek_ch() == '=' as i32 {
            level += 1;
            self.read_ch();
        }
        if self.peek_ch() != '[' as i32 {
            return Ok(None);
        }
        self.read_ch(); // second '['
        Ok(Some(level))
    }

    fn skip_block_comment(&mut self, level: u32) -> Result<(), LuaError> {
        let mut n: i64 = -1;
        loop {
            let c = self.read_ch();
            if c == EOF {
                return Err(self.err("unterminated block comment"));
            }
            if n < 0 && c == ']' as i32 {
                n = 0;
            } else if n >= 0 && c == '=' as i32 {
                n += 1;
            } else if n == level as i64 && c == ']' as i32 {
                return Ok(());
            } else if n >= 0 {
                n = -1;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        loop {
            let c = self.read_ch();
            if c == '\n' as i32 || c == EOF {
                break;
            }
        }
    }

    fn next_tk(&mut self) -> Result<(), LuaError> {
        self.skip_spaces()?;
        let line = self.r.line();
        let col = self.r.col();
        let c = self.peek_ch();
        let (kind, value) = if c == EOF {
            (TokenKind::Eof, TokenValue::None)
        } else if is_alpha(c) || c == '_' as i32 {
            self.lex_keyword_or_ident()?
        } else if is_digit(c) || (c == '.' as i32 && is_digit(self.peek_ch2())) {
            self.lex_number()?
        } else if c == '"' as i32 || c == '\'' as i32 {
            self.lex_string()?
        } else {
            self.lex_symbol()?
        };
        self.cur = Token { kind, value, line, col };
        Ok(())
    }

    fn lex_keyword_or_ident(&mut self) -> Result<(TokenKind, TokenValue), LuaError> {
        let mut s = String::new();
        let mut c = self.read_ch();
        while is_alnum(c) {
            s.push(c as u8 as char);
            c = self.read_ch();
        }
        let (line, col) = (self.r.line(), self.r.col());
        self.undo_ch(c, line, col);
        match keyword_or_ident(&s) {
            TokenKind::Ident => Ok((TokenKind::Ident, TokenValue::Text(s))),
            kw => Ok((kw, TokenValue::None)),
        }
    }

    /// Permissive char-class scan, then strict `f64` parse of the whole
    /// span (SPEC_FULL §6, `lexer.c`'s `lex_number`).
    fn lex_number(&mut self) -> Result<(TokenKind, TokenValue), LuaError> {
        let mut s = String::new();
        let mut c = self.read_ch();
        let mut last = c;
        loop {
            let is_exp_sign = matches!(last as u8 as char, 'e' | 'E' | 'p' | 'P')
                && matches!(c as u8 as char, '+' | '-');
            if is_alnum(c) || c == '.' as i32 || is_exp_sign {
                s.push(c as u8 as char);
                last = c;
                c = self.read_ch();
            } else {
                break;
            }
        }
        let (line, col) = (self.r.line(), self.r.col());
        self.undo_ch(c, line, col);
        match s.parse::<f64>() {
            Ok(n) => Ok((TokenKind::Num, TokenValue::Num(n))),
            Err(_) => Err(self.err(format!("malformed number near '{s}'"))),
        }
    }

    fn lex_string(&mut self) -> Result<(TokenKind, TokenValue), LuaError> {
        let quote = self.read_ch();
        let mut s = String::new();
        loop {
            let c = self.read_ch();
            if c == quote {
                break;
            }
            match c {
                EOF => return Err(self.err("unterminated string")),
                c if c == '\\' as i32 => {
                    let esc = self.read_ch();
                    match esc as u8 as char {
                        'a' => s.push('\x07'),
                        'b' => s.push('\x08'),
                        'f' => s.push('\x0c'),
                        'n' => s.push('\n'),
                        'r' => s.push('\r'),
                        't' => s.push('\t'),
                        'v' => s.push('\x0b'),
                        '\\' => s.push('\\'),
                        '"' => s.push('"'),
                        '\'' => s.push('\''),
                        '\n' => s.push('\n'),
                        d if d.is_ascii_digit() => {
                            let mut value = d as u32 - '0' as u32;
                            for _ in 0..2 {
                                let peeked = self.peek_ch();
                                if is_digit(peeked) {
                                    self.read_ch();
                                    value = value * 10 + (peeked as u32 - '0' as u32);
                                } else {
                                    break;
                                }
                            }
                            s.push(value as u8 as char);
                        }
                        other => return Err(self.err(format!("invalid escape sequence '\\{other}'"))),
                    }
                }
                _ => s.push(c as u8 as char),
            }
        }
        Ok((TokenKind::Str, TokenValue::Text(s)))
    }

    fn lex_symbol(&mut self) -> Result<(TokenKind, TokenValue), LuaError> {
        let c = self.read_ch();
        let kind = match c as u8 as char {
            '=' if self.peek_ch() == '=' as i32 => {
                self.read_ch();
                TokenKind::Eq
            }
            '~' if self.peek_ch() == '=' as i32 => {
                self.read_ch();
                TokenKind::Ne
            }
            '<' if self.peek_ch() == '=' as i32 => {
                self.read_ch();
                TokenKind::Le
            }
            '>' if self.peek_ch() == '=' as i32 => {
                self.read_ch();
                TokenKind::Ge
            }
            '.' if self.peek_ch() == '.' as i32 && self.peek_ch2() == '.' as i32 => {
                self.read_ch();
                self.read_ch();
                TokenKind::Ellipsis
            }
            '.' if self.peek_ch() == '.' as i32 => {
                self.read_ch();
                TokenKind::Concat
            }
            _ => TokenKind::Sym(c as u8),
        };
        Ok((kind, TokenValue::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::StrSource;

    fn lex_all(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(StrSource::new(src), "test").unwrap();
        let mut out = vec![lexer.current().kind];
        loop {
            let tok = lexer.read_tk().unwrap();
            let kind = tok.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                break;
            }
        }
        out
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            lex_all("local x"),
            vec![TokenKind::Local, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn multi_char_symbols() {
        assert_eq!(
            lex_all("a <= b"),
            vec![TokenKind::Ident, TokenKind::Le, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn number_literal() {
        let mut lexer = Lexer::new(StrSource::new("3.5e2"), "test").unwrap();
        assert_eq!(lexer.current().kind, TokenKind::Num);
        assert_eq!(lexer.current().value, TokenValue::Num(350.0));
    }

    #[test]
    fn malformed_number_errors() {
        let err = Lexer::new(StrSource::new("3x5"), "test").unwrap_err();
        assert!(err.message.contains("malformed number"));
    }

    #[test]
    fn line_comment_is_skipped() {
        assert_eq!(lex_all("-- hi\nlocal"), vec![TokenKind::Local, TokenKind::Eof]);
    }

    #[test]
    fn block_comment_with_equals_level() {
        assert_eq!(
            lex_all("--[==[ comment ]==]\nlocal"),
            vec![TokenKind::Local, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let err = Lexer::new(StrSource::new("--[[ oops"), "test").unwrap_err();
        assert!(err.message.contains("unterminated block comment"));
    }

    #[test]
    fn string_literal_with_escapes() {
        let mut lexer = Lexer::new(StrSource::new(r#""a\nb""#), "test").unwrap();
        assert_eq!(lexer.current().kind, TokenKind::Str);
        assert_eq!(lexer.current().value, TokenValue::Text("a\nb".to_string()));
    }

    #[test]
    fn expect_tk_error_wording() {
        let mut lexer = Lexer::new(StrSource::new("x"), "test").unwrap();
        let err = lexer.expect_tk(TokenKind::Local).unwrap_err();
        assert!(err.message.contains("expected 'local', found <name>"));
    }
}
