#![no_main]

//! Fuzz target for the path and properties parsers
//!
//! Arbitrary text must never panic either parser, and a parsed path must
//! survive a round trip through its display form.

use libfuzzer_sys::fuzz_target;
use modular_injector::{Path, PathRegistry, PropertiesFile};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let path = Path::parse(text);
    assert_eq!(Path::parse(&path.to_string()), path);
    assert!(path.contains(&path));
    if let Some(parent) = path.parent() {
        assert!(parent.contains(&path));
        assert_eq!(parent.depth() + 1, path.depth());
    }

    let registry = PathRegistry::new();
    assert_eq!(registry.make_path(text, None), path);
    assert_eq!(registry.make_path(text, Some(&path)).depth(), path.depth() * 2);

    // Separators and trailing whitespace only survive when escaped
    let properties = PropertiesFile::parse(text);
    if !text.contains('\\') {
        for (key, value) in &properties {
            assert!(!key.contains(|c: char| c == '=' || c == ':' || c.is_whitespace()));
            assert_eq!(value.trim_end(), value);
        }
    }
});
