use jacquard::IntoStatic;
use jacquard::types::string::AtUri;
use url::Url;

use crate::error::FetchError;

/// Parse an `at://` URI into an owned [`AtUri`].
pub fn parse(input: &str) -> Result<AtUri<'static>, FetchError> {
    AtUri::new(input)
        .map(IntoStatic::into_static)
        .map_err(|_| FetchError::InvalidUri(input.to_string()))
}

/// Repository the URI points into (DID or handle).
pub fn authority(uri: &AtUri<'_>) -> String {
    let authority: &str = uri.authority().as_ref();
    authority.to_string()
}

/// Link to a post in the web app, if the URI names a record.
pub fn web_url(uri: &AtUri<'_>, web_app: &Url) -> Option<Url> {
    let rkey: &str = uri.rkey()?.as_ref();
    let base = web_app.as_str().trim_end_matches('/');
    Url::parse(&format!(
        "{base}/profile/{}/post/{}",
        authority(uri),
        rkey
    ))
    .ok()
}

/// Link to an actor's profile in the web app.
pub fn profile_web_url(web_app: &Url, actor: &str) -> Option<Url> {
    let base = web_app.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/profile/{actor}")).ok()
}
