/// 根作用域
pub const ROOT_SLUG: &str = "@";

const MAX_DOMAIN_LEN: usize = 253;
const MAX_SLUG_LEN: usize = 63;

/// Checks a domain name before it is used as a storage key.
pub fn validate_domain(domain: &str) -> Result<(), String> {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return Err(format!("domain must be 1..={} characters", MAX_DOMAIN_LEN));
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(format!("malformed domain: {}", domain));
    }
    if !domain
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(format!("domain contains invalid characters: {}", domain));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug == ROOT_SLUG {
        return Ok(());
    }
    if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
        return Err(format!("slug must be \"@\" or 1..={} characters", MAX_SLUG_LEN));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(format!("slug contains invalid characters: {}", slug));
    }
    Ok(())
}
