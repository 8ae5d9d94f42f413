//! Immutable Lua string (spec §3 "String"), grounded on `value.h`'s `Str`
//! (`ObjHeader` + `len`, content stored after the struct). We use `smol_str`
//! for the backing storage, matching the teacher's string-interning crate
//! of choice, but equality stays by-content per spec §5 ("Strings are
//! currently not interned by the spec; equality is by content").

use smol_str::SmolStr;

#[derive(Debug, Clone, Eq)]
pub struct LuaStr(SmolStr);

impl LuaStr {
    pub fn new(s: impl Into<SmolStr>) -> Self {
        LuaStr(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn concat(a: &LuaStr, b: &LuaStr) -> LuaStr {
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(a.as_str());
        s.push_str(b.as_str());
        LuaStr(SmolStr::from(s))
    }
}

/// `str_eq` in the original: length-then-bytes (GLOSSARY defers to spec §3).
impl PartialEq for LuaStr {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.as_str() == other.0.as_str()
    }
}

impl std::fmt::Display for LuaStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_content() {
        let a = LuaStr::new("abc");
        let b = LuaStr::new("abc");
        let c = LuaStr::new("abd");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn concat_appends_bytes() {
        let a = LuaStr::new("a");
        let b = LuaStr::new("bc");
        assert_eq!(LuaStr::concat(&a, &b).as_str(), "abc");
    }
}
