use url::Url;

use crate::error::ConfigError;

/// Viewer configuration shared by the engine and its front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerConfig {
    /// Base URL of the service that holds the repositories being viewed.
    pub service: Url,
    /// Web app used for outbound links to posts and profiles.
    pub web_app: Url,
    /// Records requested per `listRecords` call.
    pub page_size: u32,
    /// Continuation fires once fewer than this many pixels remain below the viewport.
    pub scroll_threshold_px: u32,
    pub user_agent: String,
}

impl ViewerConfig {
    pub const DEFAULT_SERVICE: &'static str = "https://bsky.social";
    pub const DEFAULT_WEB_APP: &'static str = "https://bsky.app";
    pub const DEFAULT_PAGE_SIZE: u32 = 5;
    pub const DEFAULT_SCROLL_THRESHOLD_PX: u32 = 2000;

    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `SKYVIEW_SERVICE`: service URL (default: https://bsky.social)
    /// - `SKYVIEW_WEB_APP`: web app URL for links (default: https://bsky.app)
    /// - `SKYVIEW_PAGE_SIZE`: records per page (default: 5)
    /// - `SKYVIEW_SCROLL_THRESHOLD`: continuation distance in pixels (default: 2000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ViewerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let service = parse_service(
            &lookup("SKYVIEW_SERVICE").unwrap_or_else(|| Self::DEFAULT_SERVICE.to_string()),
        )?;
        let web_app = parse_service(
            &lookup("SKYVIEW_WEB_APP").unwrap_or_else(|| Self::DEFAULT_WEB_APP.to_string()),
        )?;

        let page_size = parse_number(&lookup, "SKYVIEW_PAGE_SIZE", Self::DEFAULT_PAGE_SIZE)?;
        if page_size == 0 || page_size > 100 {
            return Err(ConfigError::InvalidEnv {
                var: "SKYVIEW_PAGE_SIZE",
                value: page_size.to_string(),
            });
        }
        let scroll_threshold_px = parse_number(
            &lookup,
            "SKYVIEW_SCROLL_THRESHOLD",
            Self::DEFAULT_SCROLL_THRESHOLD_PX,
        )?;

        Ok(Self {
            service,
            web_app,
            page_size,
            scroll_threshold_px,
            ..Self::default()
        })
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            service: Url::parse(Self::DEFAULT_SERVICE).expect("default service url is valid"),
            web_app: Url::parse(Self::DEFAULT_WEB_APP).expect("default web app url is valid"),
            page_size: Self::DEFAULT_PAGE_SIZE,
            scroll_threshold_px: Self::DEFAULT_SCROLL_THRESHOLD_PX,
            user_agent: format!("skyview/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Parse a user-supplied service URL. Only http(s) URLs with a host are accepted.
pub fn parse_service(input: &str) -> Result<Url, ConfigError> {
    let input = input.trim();
    let url = Url::parse(input).map_err(|e| ConfigError::UrlParse {
        url: input.to_string(),
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ConfigError::UrlParse {
            url: input.to_string(),
            message: "expected an http(s) URL with a host".to_string(),
        }),
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        None => Ok(default),
    }
}
