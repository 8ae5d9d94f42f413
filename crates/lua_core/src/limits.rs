//! Centralized tuning constants, mirroring the teacher's `lua_vm::lua_limits`
//! module: one place for every magic number that bounds compiler or VM
//! behavior.

/// Maximum number of local variables live in one function (spec §3,
/// "local-name array (<= 200)"); the slot allocator errors past this.
pub const MAX_LOCALS: usize = 200;

/// Maximum stack slot index a function body may reserve (spec §4.E,
/// "too many local variables" at 254).
pub const MAX_STACK_SLOTS: u32 = 254;

/// Sentinel slot index for a not-yet-materialized relocatable instruction's
/// destination register (GLOSSARY: "Relocatable instruction").
pub const NO_SLOT: u8 = 0xFF;

/// Sentinel pc marking the end of a jump list (GLOSSARY: "Jump list").
pub const JMP_NONE: i32 = -1;

/// Added/subtracted when encoding/decoding a signed jump offset so the
/// stored 24-bit value is always non-negative (GLOSSARY: "Jump bias").
pub const JMP_BIAS: i32 = 1 << 23;

/// Largest value the biased 24-bit jump offset can hold.
pub const MAX_JMP_OFFSET: i32 = (1 << 24) - 1;

/// Constants-table capacity; compilation fails before a prototype's
/// constant index would reach this (spec §3 invariant).
pub const MAX_CONSTANTS: usize = 1 << 16;

/// Initial capacity of a freshly allocated evaluation stack.
pub const INITIAL_STACK_SIZE: usize = 256;

/// Factor the evaluation stack grows by when it needs more room.
pub const STACK_GROWTH_FACTOR: usize = 2;

/// Initial capacity of the call-frame stack.
pub const INITIAL_FRAME_CAPACITY: usize = 32;

/// Binding power of unary `-`/`not`; higher than every binary operator
/// except `^` (spec §4.E grammar coverage: "... < unary < ^").
pub const UNARY_PRIORITY: u8 = 12;

/// Maximum Lua call nesting depth before we raise a runtime "stack overflow"
/// error instead of overflowing the host's own call stack (our `execute`
/// loop doesn't recurse per Lua call, but native->Lua reentry via host calls
/// does, so this still applies at that boundary).
pub const MAX_CALL_DEPTH: usize = 200;
