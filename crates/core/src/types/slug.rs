/// Turn a display name into a URL slug.
///
/// ASCII letters and digits are kept (lowercased); every other run of
/// characters becomes a single `-`. Leading and trailing dashes are dropped.
///
/// ```
/// use pharmacy_core::slugify;
///
/// assert_eq!(slugify("Cold & Flu Relief"), "cold-flu-relief");
/// assert_eq!(slugify("  Vitamin D3 (1000 IU) "), "vitamin-d3-1000-iu");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_separators() {
        assert_eq!(slugify("Pain -- Relief__Extra"), "pain-relief-extra");
    }

    #[test]
    fn test_trims_edges() {
        assert_eq!(slugify("--Allergy--"), "allergy");
    }

    #[test]
    fn test_non_ascii_becomes_separator() {
        assert_eq!(slugify("Crème Brûlée"), "cr-me-br-l-e");
        assert_eq!(slugify("¡!"), "");
    }
}
