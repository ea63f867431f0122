//! Name-handling helpers. The actual demangling and edit-distance algorithms
//! are library calls (`cpp_demangle`, `strsim`); this module only has the
//! glue the spec assigns to the core itself: cleaning profile names and
//! finding the LTO common-name prefix.

/// Recognized LTO mangling suffixes, longest-match-first is not required
/// since we take the earliest occurrence regardless of which pattern hit.
const LTO_SUFFIXES: &[&str] = &[".llvm.", ".lto_priv.", ".constprop.", ".part."];

/// Strips a profile function's trailing `"(*…"` disambiguator, used when a
/// producer needs to distinguish multiple records that would otherwise share
/// a name.
pub fn clean_profile_name(name: &str) -> &str {
    match name.find("(*") {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// The longest prefix of `symbol` preceding a recognized LTO mangling
/// suffix, or `None` if no such suffix is present.
pub fn lto_common_name(symbol: &str) -> Option<&str> {
    LTO_SUFFIXES
        .iter()
        .filter_map(|suffix| symbol.find(suffix))
        .min()
        .map(|pos| &symbol[..pos])
}

/// Profile producers sometimes sanitize names (replacing characters the
/// document format can't carry) before emitting them. Restoring those marks
/// is an external, format-specific concern; here it is the identity function
/// since the records this crate consumes already carry plain names.
pub fn restore_sanitized_name(name: &str) -> String {
    name.to_string()
}

/// Best-effort demangle of `name` via `cpp_demangle`. Returns `None` if the
/// name is not a mangled Itanium symbol (e.g. a plain C function, or a name
/// the producer never mangled).
pub fn demangle(name: &str) -> Option<String> {
    cpp_demangle::Symbol::new(name)
        .ok()
        .and_then(|s| s.demangle(&Default::default()).ok())
}

/// The fully-qualified declaration context of a demangled name, i.e.
/// everything before the last top-level `::`. Bracket/paren nesting is
/// tracked so namespace separators inside template arguments or argument
/// lists are not mistaken for the unqualified-name boundary.
pub fn namespace_of(demangled: &str) -> &str {
    let bytes = demangled.as_bytes();
    let mut depth = 0i32;
    let mut last_sep = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'(' => depth += 1,
            b'>' | b')' => depth -= 1,
            b':' if depth == 0 && i + 1 < bytes.len() && bytes[i + 1] == b':' => {
                last_sep = Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    match last_sep {
        Some(pos) => &demangled[..pos],
        None => "",
    }
}

/// Demangles `name` (after restoring sanitization marks) and derives its
/// namespace. Profile producers are not required to emit mangled names (see
/// spec scenario: a profile record already named `ns::bar`), so a demangle
/// failure falls back to treating the restored name itself as already
/// namespace-qualified, rather than collapsing to an empty namespace.
pub fn namespace_of_profile_name(name: &str) -> String {
    let restored = restore_sanitized_name(name);
    match demangle(&restored) {
        Some(d) => namespace_of(&d).to_string(),
        None => namespace_of(&restored).to_string(),
    }
}

/// Demangles `name` (after restoring sanitization marks), falling back to
/// the restored name itself when it isn't a mangled Itanium symbol.
pub fn demangle_profile_name(name: &str) -> String {
    let restored = restore_sanitized_name(name);
    demangle(&restored).unwrap_or(restored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_disambiguator() {
        assert_eq!(clean_profile_name("foo(*3"), "foo");
        assert_eq!(clean_profile_name("foo"), "foo");
    }

    #[test]
    fn finds_lto_common_name() {
        assert_eq!(lto_common_name("foo.llvm.1234"), Some("foo"));
        assert_eq!(lto_common_name("foo.lto_priv.5678"), Some("foo"));
        assert_eq!(lto_common_name("foo"), None);
    }

    #[test]
    fn namespace_excludes_unqualified_name() {
        assert_eq!(namespace_of("ns::sub::bar()"), "ns::sub");
        assert_eq!(namespace_of("bar()"), "");
    }

    #[test]
    fn namespace_ignores_separators_in_templates() {
        assert_eq!(namespace_of("ns::foo<a::b>(int)"), "ns");
    }

    #[test]
    fn namespace_of_profile_name_falls_back_to_raw_name_when_not_mangled() {
        // Producers are not required to mangle profile names; a demangle
        // failure should not collapse an already-namespaced name to "".
        assert_eq!(namespace_of_profile_name("ns::bar"), "ns");
    }

    #[test]
    fn namespace_of_profile_name_demangles_mangled_input() {
        assert_eq!(namespace_of_profile_name("_ZN2ns3barEv"), "ns");
    }

    #[test]
    fn demangle_profile_name_falls_back_when_not_mangled() {
        assert_eq!(demangle_profile_name("ns::bar"), "ns::bar");
    }
}
