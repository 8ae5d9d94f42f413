//! Character stream with 3-char pushback and line/column tracking (spec
//! §4.A), grounded on `original_source/src/reader.h`/`reader.c`: a
//! caller-supplied pull callback hands back borrowed chunks, translated so
//! `\r\n` and bare `\r` both read as a single `\n`.

/// Sentinel returned by [`Reader::read_ch`] at end of input. Also the one
/// "character" `undo_ch` is able to push back alongside two real chars.
pub const EOF: i32 = -1;

const MAX_PUSHBACK: usize = 3;

/// Pulls the next chunk of source bytes. Returns `None` at end of input,
/// mirroring the `(ptr, len)` callback contract of spec §6 where `len == 0`
/// signals EOF.
pub trait ChunkSource {
    fn next_chunk(&mut self) -> Option<&[u8]>;
}

/// A `ChunkSource` that serves an entire in-memory string in one chunk.
pub struct StrSource<'a> {
    data: &'a [u8],
    served: bool,
}

impl<'a> StrSource<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            data: data.as_bytes(),
            served: false,
        }
    }
}

impl<'a> ChunkSource for StrSource<'a> {
    fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.served {
            None
        } else {
            self.served = true;
            Some(self.data)
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Pos {
    line: i32,
    col: i32,
}

/// Pull-based character reader. `read_ch`/`undo_ch`/`peek_ch`/`peek_ch2` are
/// the only contract the lexer depends on.
pub struct Reader<'src> {
    chunk: &'src [u8],
    idx: usize,
    source: Box<dyn ChunkSource + 'src>,
    exhausted: bool,
    /// Ring of at most `MAX_PUSHBACK` characters pushed back via `undo_ch`,
    /// most-recently-undone last; `read_ch` pops from the back.
    pushback: Vec<(i32, Pos)>,
    pos: Pos,
}

impl<'src> Reader<'src> {
    pub fn new(source: impl ChunkSource + 'src) -> Self {
        Reader {
            chunk: &[],
            idx: 0,
            source: Box::new(source),
            exhausted: false,
            pushback: Vec::with_capacity(MAX_PUSHBACK),
            pos: Pos { line: 1, col: 0 },
        }
    }

    pub fn line(&self) -> i32 {
        self.pos.line
    }

    pub fn col(&self) -> i32 {
        self.pos.col
    }

    fn raw_next(&mut self) -> i32 {
        loop {
            if self.idx < self.chunk.len() {
                let b = self.chunk[self.idx];
                self.idx += 1;
                return b as i32;
            }
            if self.exhausted {
                return EOF;
            }
            match self.source.next_chunk() {
                Some(chunk) if !chunk.is_empty() => {
                    self.chunk = chunk;
                    self.idx = 0;
                }
                _ => {
                    self.exhausted = true;
                    return EOF;
                }
            }
        }
    }

    fn advance_pos(&mut self, ch: i32) {
        if ch == b'\n' as i32 {
            self.pos.line += 1;
            self.pos.col = 0;
        } else if ch != EOF {
            self.pos.col += 1;
        }
    }

    /// Reads the next logical character, translating `\r\n` and bare `\r`
    /// to `\n`.
    pub fn read_ch(&mut self) -> i32 {
        if let Some((ch, pos)) = self.pushback.pop() {
            self.pos = pos;
            self.advance_pos(ch);
            return ch;
        }
        let before = self.pos;
        let raw = self.raw_next();
        let ch = if raw == b'\r' as i32 {
            // Peek for a following \n to collapse CRLF into one \n.
            let save_chunk = self.chunk;
            let save_idx = self.idx;
            let save_exhausted = self.exhausted;
            let next = self.raw_next();
            if next != b'\n' as i32 {
                self.chunk = save_chunk;
                self.idx = save_idx;
                self.exhausted = save_exhausted;
            }
            b'\n' as i32
        } else {
            raw
        };
        self.pos = before;
        self.advance_pos(ch);
        ch
    }

    /// Pushes back up to three characters (spec §4.A), restoring line/col
    /// exactly as they were before the corresponding `read_ch`.
    pub fn undo_ch(&mut self, ch: i32, prior_line: i32, prior_col: i32) {
        debug_assert!(self.pushback.len() < MAX_PUSHBACK, "pushback overflow");
        self.pushback.push((
            ch,
            Pos {
                line: prior_line,
                col: prior_col,
            },
        ));
        self.pos = Pos {
            line: prior_line,
            col: prior_col,
        };
    }

    fn peek_n(&mut self, n: usize) -> i32 {
        let mut saved = Vec::with_capacity(n);
        let mut result = EOF;
        for i in 0..n {
            let before = (self.pos.line, self.pos.col);
            let ch = self.read_ch();
            saved.push((ch, before));
            if i + 1 == n {
                result = ch;
            }
        }
        for (ch, (line, col)) in saved.into_iter().rev() {
            self.undo_ch(ch, line, col);
        }
        result
    }

    pub fn peek_ch(&mut self) -> i32 {
        self.peek_n(1)
    }

    pub fn peek_ch2(&mut self) -> i32 {
        self.peek_n(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(src: &str) -> Vec<i32> {
        let mut r = Reader::new(StrSource::new(src));
        let mut out = Vec::new();
        loop {
            let c = r.read_ch();
            if c == EOF {
                break;
            }
            out.push(c);
        }
        out
    }

    #[test]
    fn crlf_collapses_to_lf() {
        assert_eq!(collect("a\r\nb"), vec!['a' as i32, '\n' as i32, 'b' as i32]);
    }

    #[test]
    fn bare_cr_collapses_to_lf() {
        assert_eq!(collect("a\rb"), vec!['a' as i32, '\n' as i32, 'b' as i32]);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut r = Reader::new(StrSource::new("xy"));
        assert_eq!(r.peek_ch(), 'x' as i32);
        assert_eq!(r.peek_ch2(), 'y' as i32);
        assert_eq!(r.read_ch(), 'x' as i32);
        assert_eq!(r.read_ch(), 'y' as i32);
    }

    #[test]
    fn undo_restores_position() {
        let mut r = Reader::new(StrSource::new("a\nb"));
        let _ = r.read_ch(); // 'a' at line 1
        let before = (r.line(), r.col());
        let nl = r.read_ch(); // '\n', now line 2
        assert_eq!(r.line(), 2);
        r.undo_ch(nl, before.0, before.1);
        assert_eq!((r.line(), r.col()), before);
        assert_eq!(r.read_ch(), '\n' as i32);
        assert_eq!(r.line(), 2);
    }
}
