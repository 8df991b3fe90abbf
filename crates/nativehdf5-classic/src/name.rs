//! netCDF name rules.

/// Whether `name` may name a dimension, variable or attribute.
///
/// The first character is an ASCII letter, digit or underscore, or any
/// non-ASCII character. Later characters may be anything except `/` and
/// control characters. Trailing spaces are not allowed.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphanumeric() || first == '_' || !first.is_ascii()) {
        return false;
    }
    if name.chars().any(|c| c == '/' || c.is_control()) {
        return false;
    }
    !name.ends_with(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts() {
        for name in ["temp", "_x", "3d", "t 2", "größe", "été", "a-b.c"] {
            assert!(is_valid_name(name), "{name}");
        }
    }

    #[test]
    fn rejects() {
        for name in ["", " lead", "-x", "a/b", "tab\tin", "trail ", "\u{7f}x"] {
            assert!(!is_valid_name(name), "{name:?}");
        }
    }
}
