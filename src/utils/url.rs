//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing URLs to prevent issues
//! with trailing slashes when constructing API endpoints.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use causerie::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path,
/// ensuring there are no double slashes in the result.
///
/// # Examples
///
/// ```
/// use causerie::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
