use crate::error::Result;
use url::Url;

/// Query parameter carrying the 1-based page number
pub const PAGE_NUMBER_PARAM: &str = "pageNumber";

/// Query parameter carrying the page size
pub const PAGE_SIZE_PARAM: &str = "pageSize";

/// Builds the URL of listing page `page_number` from the listing URL.
///
/// Every other query parameter is kept byte for byte, so filter values such
/// as `status=1,2` keep their literal commas.
pub fn build_page_url(listing_url: &str, page_number: u32, page_size: u32) -> Result<String> {
    let mut url = Url::parse(listing_url)?;

    let mut pairs: Vec<String> = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            key != PAGE_NUMBER_PARAM && key != PAGE_SIZE_PARAM
        })
        .map(str::to_string)
        .collect();

    pairs.insert(0, format!("{}={}", PAGE_SIZE_PARAM, page_size));
    pairs.insert(0, format!("{}={}", PAGE_NUMBER_PARAM, page_number));

    url.set_query(Some(&pairs.join("&")));
    Ok(url.to_string())
}

/// Page number a URL points at; a URL without one shows the first page
pub fn page_number_from_url(url: &str) -> Option<u32> {
    let url = Url::parse(url).ok()?;
    let page = url
        .query_pairs()
        .find(|(key, _)| key == PAGE_NUMBER_PARAM)
        .map(|(_, value)| value.parse::<u32>().ok());
    match page {
        Some(parsed) => parsed,
        None => Some(1),
    }
}
