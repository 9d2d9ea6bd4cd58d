//! Deterministic cache keys.

/// Build a cache key from a URL and its query parameters.
///
/// Parameters are sorted (by name, then value) and form-encoded, so the
/// same set of parameters always yields the same key regardless of order.
/// Without parameters the key is the URL itself.
pub fn cache_key<I, K, V>(url: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();
    if pairs.is_empty() {
        return url.to_string();
    }
    pairs.sort();

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_params_is_url() {
        let empty: [(&str, &str); 0] = [];
        assert_eq!(cache_key("/expenses", empty), "/expenses");
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = cache_key("/expenses", [("month", "2026-10"), ("category", "Food & Dining")]);
        let b = cache_key("/expenses", [("category", "Food & Dining"), ("month", "2026-10")]);
        assert_eq!(a, b);
        assert_eq!(a, "/expenses?category=Food+%26+Dining&month=2026-10");
    }

    #[test]
    fn test_existing_query_is_extended() {
        let key = cache_key("/budgets?active=true", [("period", "weekly")]);
        assert_eq!(key, "/budgets?active=true&period=weekly");
    }
}
