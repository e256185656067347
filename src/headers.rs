use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue};

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "pt-BR,pt;q=0.9,en;q=0.8",
    "es-ES,es;q=0.9,en;q=0.8",
];

/// C2: composes a realistic HTTP request header set, randomizing
/// Accept-Language and conditionally adding a Reddit referer.
pub struct HeaderBuilder;

impl HeaderBuilder {
    pub fn build(url: &str, user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(user_agent).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        let lang = ACCEPT_LANGUAGES.choose(&mut rand::thread_rng()).unwrap();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_str(lang).unwrap(),
        );
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate, br"),
        );
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers.insert(
            "Upgrade-Insecure-Requests",
            HeaderValue::from_static("1"),
        );
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
        headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            HeaderValue::from_static("max-age=0"),
        );

        if url.contains("reddit.com") {
            headers.insert(
                reqwest::header::REFERER,
                HeaderValue::from_static("https://www.reddit.com/"),
            );
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_user_agent_and_accept_language() {
        let headers = HeaderBuilder::build("https://example.com/feed.xml", "MyUA/1.0");
        assert_eq!(headers.get(reqwest::header::USER_AGENT).unwrap(), "MyUA/1.0");
        assert!(headers.get(reqwest::header::ACCEPT_LANGUAGE).is_some());
    }

    #[test]
    fn adds_reddit_referer_only_for_reddit_hosts() {
        let reddit = HeaderBuilder::build("https://www.reddit.com/r/rust/.rss", "UA");
        assert_eq!(
            reddit.get(reqwest::header::REFERER).unwrap(),
            "https://www.reddit.com/"
        );

        let other = HeaderBuilder::build("https://example.com/feed.xml", "UA");
        assert!(other.get(reqwest::header::REFERER).is_none());
    }
}
