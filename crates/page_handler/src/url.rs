use url::{ParseError, Url};

/// Strip one trailing `/` from the path of `href`, keeping the query and the
/// fragment. Returns `None` when the address is already normalized; the root
/// path `/` is left alone.
///
/// # Errors
/// When `href` is not an absolute URL.
pub fn normalize_trailing_slash(href: &str) -> Result<Option<String>, ParseError> {
    let mut url = Url::parse(href)?;
    let path = url.path();
    if path.len() <= 1 || !path.ends_with('/') {
        return Ok(None);
    }
    let trimmed = path[..path.len() - 1].to_owned();
    url.set_path(&trimmed);
    Ok(Some(url.into()))
}
