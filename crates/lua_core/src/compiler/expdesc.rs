//! Expression descriptor (spec §4.E), grounded on the teacher's
//! `compiler::expdesc::ExpDesc` as a tagged sum type, reduced to the
//! variants this scope needs (no tables/upvalues/varargs).

use crate::limits::JMP_NONE;

#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    /// `nil`/`true`/`false`, payload is the primitive tag.
    Prim(u16),
    Num(f64),
    Str(String),
    /// A named local variable, payload is its slot.
    Local(u8),
    /// Result already sits in a fixed slot.
    NonReloc(u8),
    /// pc of an emitted instruction whose destination `A` is still
    /// `NO_SLOT`, awaiting patching.
    Reloc(usize),
    /// pc of a `JMP` belonging to a comparison whose boolean value hasn't
    /// been materialized yet.
    Jmp(usize),
    /// pc of a `CALL` whose return count is still pending adjustment.
    Call(usize),
    /// A name that didn't resolve to a local (spec's "Open Question"
    /// resolution #1: representable, but compiling it is a hard error
    /// since globals are out of scope).
    Global(String),
}

/// Deferred representation of a partially-compiled expression (spec
/// §4.E). Every descriptor carries a true-jump list and a false-jump list:
/// jump lists are "has-jmp" iff either is non-empty.
#[derive(Debug, Clone)]
pub struct ExpDesc {
    pub kind: ExpKind,
    pub true_list: i32,
    pub false_list: i32,
}

impl ExpDesc {
    fn bare(kind: ExpKind) -> Self {
        ExpDesc {
            kind,
            true_list: JMP_NONE,
            false_list: JMP_NONE,
        }
    }

    pub fn new_prim(tag: u16) -> Self {
        Self::bare(ExpKind::Prim(tag))
    }
    pub fn new_num(n: f64) -> Self {
        Self::bare(ExpKind::Num(n))
    }
    pub fn new_str(s: impl Into<String>) -> Self {
        Self::bare(ExpKind::Str(s.into()))
    }
    pub fn new_local(slot: u8) -> Self {
        Self::bare(ExpKind::Local(slot))
    }
    pub fn new_nonreloc(slot: u8) -> Self {
        Self::bare(ExpKind::NonReloc(slot))
    }
    pub fn new_reloc(pc: usize) -> Self {
        Self::bare(ExpKind::Reloc(pc))
    }
    pub fn new_jmp(pc: usize) -> Self {
        Self::bare(ExpKind::Jmp(pc))
    }
    pub fn new_call(pc: usize) -> Self {
        Self::bare(ExpKind::Call(pc))
    }
    pub fn new_global(name: impl Into<String>) -> Self {
        Self::bare(ExpKind::Global(name.into()))
    }

    pub fn has_jmp(&self) -> bool {
        self.true_list != JMP_NONE || self.false_list != JMP_NONE
    }

    /// True for descriptors statically known at compile time with no
    /// outstanding jumps (spec's constant-folding precondition).
    pub fn is_const(&self) -> bool {
        !self.has_jmp() && matches!(self.kind, ExpKind::Prim(_) | ExpKind::Num(_) | ExpKind::Str(_))
    }

    pub fn is_numeral(&self) -> bool {
        !self.has_jmp() && matches!(self.kind, ExpKind::Num(_))
    }

    pub fn as_num(&self) -> Option<f64> {
        match self.kind {
            ExpKind::Num(n) => Some(n),
            _ => None,
        }
    }
}
