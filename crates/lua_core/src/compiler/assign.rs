//! Assignment left-hand sides (spec §4.E "Assignment with multiple LHS"),
//! grounded on the Open Question resolution in `SPEC_FULL.md` §8.1: a
//! global is representable but compiling an actual use of one is a hard
//! error, since table/global machinery is out of scope.

#[derive(Debug, Clone)]
pub enum Assignable {
    Local(u8),
    Global(String),
}
