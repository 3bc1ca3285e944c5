// Share links - selection ⇄ `?apparts=` query parameter

use crate::error::LocatorError;
use crate::records::ApartmentRecord;

/// Query parameter carrying the shared reference codes
pub const SHARE_PARAM: &str = "apparts";

/// Origin + path of `page_url`: query string and fragment removed.
pub fn base_url(page_url: &str) -> &str {
    let end = page_url.find(|c: char| c == '?' || c == '#').unwrap_or(page_url.len());
    &page_url[..end]
}

/// Build the share link for `selection`.
///
/// Reference codes are comma-joined and URL-encoded into the `apparts`
/// parameter of the page's base URL. Any existing query is dropped.
pub fn share_link(page_url: &str, selection: &[ApartmentRecord]) -> Result<String, LocatorError> {
    if selection.is_empty() {
        return Err(LocatorError::EmptySelection);
    }

    let references = selection
        .iter()
        .map(|apt| apt.reference.as_str())
        .collect::<Vec<_>>()
        .join(",");

    Ok(format!(
        "{}?{}={}",
        base_url(page_url),
        SHARE_PARAM,
        urlencoding::encode(&references)
    ))
}

/// Read the shared codes from a page URL.
///
/// Returns the decoded, still comma-joined value of `apparts`, or `None`
/// when the parameter is absent or empty.
pub fn shared_codes(page_url: &str) -> Option<String> {
    let (_, rest) = page_url.split_once('?')?;
    let query = rest.split('#').next().unwrap_or("");

    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| form_decode(key) == SHARE_PARAM)
        .map(|(_, value)| form_decode(value))
        .filter(|value| !value.is_empty())
}

/// Decode one `application/x-www-form-urlencoded` component
fn form_decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}
