use uuid::Uuid;

/// URL slug for a display name, transliterated to ASCII; never empty.
pub fn base_slug(name: &str) -> String {
    let slug = slug::slugify(name);
    if slug.is_empty() { "item".to_string() } else { slug }
}

/// `attempt` 1 is the bare slug, later attempts get a numeric suffix.
pub fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}

/// `PRD-<first 5 alphanumerics of the name>-<4 hex>`.
pub fn generate_sku(name: &str) -> String {
    let mut prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(5)
        .collect::<String>()
        .to_ascii_uppercase();
    if prefix.is_empty() {
        prefix.push_str("ITEM");
    }
    let suffix = Uuid::new_v4().simple().to_string()[..4].to_ascii_uppercase();
    format!("PRD-{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(base_slug("Summer Shoes & Sandals"), "summer-shoes-sandals");
        assert_eq!(base_slug("  Crab -- Mug "), "crab-mug");
        assert_eq!(base_slug("!!!"), "item");
        assert_eq!(base_slug("Café Crème"), "cafe-creme");
    }

    #[test]
    fn candidates_get_suffixes() {
        assert_eq!(slug_candidate("shoes", 1), "shoes");
        assert_eq!(slug_candidate("shoes", 3), "shoes-3");
    }

    #[test]
    fn sku_shape() {
        let sku = generate_sku("Blue t-shirt");
        let parts: Vec<&str> = sku.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PRD");
        assert_eq!(parts[1], "BLUET");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
