//! URL slugs used for product permalinks.

/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed to `-`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if out.is_empty() {
        out.push_str("product");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("Pine nuts"), "pine-nuts");
        assert_eq!(slugify("  Heirloom -- Tomatoes (1kg) "), "heirloom-tomatoes-1kg");
    }

    #[test]
    fn falls_back_when_nothing_survives() {
        assert_eq!(slugify("???"), "product");
    }
}
