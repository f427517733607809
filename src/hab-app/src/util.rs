// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Normalize a thing-type name to lowercase alphanumeric.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Thing-type part of a thing UID (`"http-json:kitchen"` -> `"http-json"`).
pub fn thing_type_of(uid: &str) -> Option<&str> {
    let (ty, id) = uid.split_once(':')?;
    if ty.is_empty() || id.is_empty() {
        return None;
    }
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("HTTP-JSON"), "httpjson");
        assert_eq!(normalize_name("http_json"), "httpjson");
        assert_eq!(normalize_name("Dummy"), "dummy");
    }

    #[test]
    fn test_thing_type_of() {
        assert_eq!(thing_type_of("http-json:kitchen"), Some("http-json"));
        assert_eq!(thing_type_of("dummy:a:b"), Some("dummy"));
        assert_eq!(thing_type_of("nocolon"), None);
        assert_eq!(thing_type_of(":x"), None);
        assert_eq!(thing_type_of("dummy:"), None);
    }
}
