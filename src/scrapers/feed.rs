//! RSS feed adapter.
//!
//! Feeds are fetched over plain HTTP and read with a streaming `quick_xml`
//! pass that tolerates namespaced extensions and HTML entities. Titles and
//! descriptions are stripped of markup, publication dates go through the same
//! recency formatting as rendered listings, and summaries share the
//! 150-character cap.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::{Captures, Regex};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::ScrapeError;
use crate::extract::MAX_ITEMS;
use crate::models::ScrapedItem;
use crate::render::http::fetch_text;
use crate::utils::{collapse_whitespace, format_recency, parse_timestamp, strip_tags, truncate_summary};

const GOOGLE_NEWS_SEARCH: &str = "https://news.google.com/rss/search";

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUrl {
    Direct(&'static str),
    /// Google News search feed for a free-text query.
    GoogleNews(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub target: FeedUrl,
    pub limit: usize,
    pub time_filler: &'static str,
}

impl FeedSpec {
    pub const fn url(url: &'static str) -> Self {
        Self {
            target: FeedUrl::Direct(url),
            limit: MAX_ITEMS,
            time_filler: "Just now",
        }
    }

    pub const fn google_news(query: &'static str, limit: usize) -> Self {
        Self {
            target: FeedUrl::GoogleNews(query),
            limit,
            time_filler: "Just now",
        }
    }

    pub const fn with_filler(mut self, filler: &'static str) -> Self {
        self.time_filler = filler;
        self
    }

    pub fn resolve_url(&self) -> String {
        match self.target {
            FeedUrl::Direct(url) => url.to_string(),
            FeedUrl::GoogleNews(query) => format!(
                "{GOOGLE_NEWS_SEARCH}?q={}&hl=en-US&gl=US&ceid=US:en",
                urlencoding::encode(query)
            ),
        }
    }
}

/// Item fields kept from the feed, before cleaning.
#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    PubDate,
    Description,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" => Some(Field::PubDate),
            b"description" => Some(Field::Description),
            _ => None,
        }
    }
}

impl RawItem {
    fn set(&mut self, field: Field, text: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::PubDate => &mut self.pub_date,
            Field::Description => &mut self.description,
        };
        // first occurrence wins
        slot.get_or_insert(text);
    }
}

/// Fetch and parse one feed.
#[instrument(level = "info", skip(client, spec), fields(url = %spec.resolve_url()))]
pub async fn scrape_feed(
    client: &Client,
    source: &str,
    spec: &FeedSpec,
    timeout: Duration,
) -> Result<Vec<ScrapedItem>, ScrapeError> {
    let (_, body) = fetch_text(client, &spec.resolve_url(), timeout).await?;
    parse_feed(&body, source, spec, Utc::now())
}

/// Parse RSS markup into at most `spec.limit` items.
pub fn parse_feed(
    xml: &str,
    source: &str,
    spec: &FeedSpec,
    now: DateTime<Utc>,
) -> Result<Vec<ScrapedItem>, ScrapeError> {
    let raw = read_items(xml)?;
    debug!(items = raw.len(), "Parsed feed");

    Ok(raw
        .into_iter()
        .take(spec.limit)
        .filter_map(|item| {
            let title = clean_text(item.title.as_deref()?);
            let url = item.link.as_deref().map(str::trim).filter(|l| is_web_url(l))?;
            if title.is_empty() {
                return None;
            }
            let time = item
                .pub_date
                .as_deref()
                .and_then(parse_timestamp)
                .map(|ts| format_recency(ts, now))
                .unwrap_or_else(|| spec.time_filler.to_string());
            let summary = item
                .description
                .as_deref()
                .map(|d| truncate_summary(&clean_text(d)))
                .unwrap_or_default();
            Some(ScrapedItem {
                title,
                url: url.to_string(),
                source: source.to_string(),
                time,
                summary,
            })
        })
        .collect())
}

fn is_web_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Stream over the document and collect every un-prefixed `<item>`.
///
/// Only direct `title`, `link`, `pubDate` and `description` children are
/// read; namespaced extensions such as `media:title` or `atom:link` are
/// skipped wherever they appear.
fn read_items(xml: &str) -> Result<Vec<RawItem>, ScrapeError> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut saw_channel = false;
    let mut item: Option<RawItem> = None;
    // element depth below the open <item>
    let mut depth = 0usize;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) => {
                let name = e.name();
                if item.is_some() {
                    depth += 1;
                    if depth == 1 && name.prefix().is_none() {
                        field = Field::from_tag(name.as_ref());
                        text.clear();
                    }
                } else if name.as_ref() == b"item" {
                    item = Some(RawItem::default());
                    depth = 0;
                } else if name.as_ref() == b"channel" {
                    saw_channel = true;
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"channel" => saw_channel = true,
            Event::End(_) if item.is_some() => {
                if depth == 0 {
                    items.extend(item.take());
                    continue;
                }
                if depth == 1 {
                    if let (Some(current), Some(f)) = (item.as_mut(), field.take()) {
                        current.set(f, std::mem::take(&mut text));
                    }
                }
                depth -= 1;
            }
            Event::Text(t) if field.is_some() => text.push_str(&t.decode().map_err(parse_error)?),
            Event::CData(c) if field.is_some() => text.push_str(&c.decode().map_err(parse_error)?),
            Event::GeneralRef(r) if field.is_some() => {
                let name = r.decode().map_err(parse_error)?;
                match resolve_entity(&name) {
                    Some(resolved) => text.push_str(&resolved),
                    None => {
                        text.push('&');
                        text.push_str(&name);
                        text.push(';');
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(ScrapeError::Parse("no <channel> element".into()));
    }
    Ok(items)
}

fn parse_error(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Parse(e.to_string())
}

/// Text for a character reference (`#233`, `#xE9`) or named XML/HTML entity.
fn resolve_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).filter(|c| *c != '\0').map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}

/// Replace entity references left in text, such as those inside CDATA or
/// escaped HTML descriptions. Unknown names stay as written.
fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            resolve_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn clean_text(raw: &str) -> String {
    collapse_whitespace(&decode_entities(&strip_tags(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    const SUBSTACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Lithosgraphein</title>
    <link>https://lithosgraphein.substack.com</link>
    <item>
      <title><![CDATA[High-NA EUV&nbsp;in volume]]></title>
      <link>https://lithosgraphein.substack.com/p/high-na</link>
      <pubDate>Fri, 16 Oct 2026 07:00:00 GMT</pubDate>
      <description><![CDATA[<p>Why the next scanner generation changes <b>everything</b> for logic.</p>]]></description>
    </item>
    <item>
      <title>Undated note</title>
      <link>https://lithosgraphein.substack.com/p/note</link>
    </item>
    <item>
      <title>Broken link</title>
      <link>/relative/only</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_substack_feed() {
        let spec = FeedSpec::url("https://lithosgraphein.substack.com/feed").with_filler("Recent");
        let items = parse_feed(SUBSTACK, "Lithosgraphein", &spec, now()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "High-NA EUV in volume");
        assert_eq!(items[0].time, "5 hours ago");
        assert_eq!(
            items[0].summary,
            "Why the next scanner generation changes everything for logic."
        );
        assert_eq!(items[1].time, "Recent");
        assert_eq!(items[1].summary, "");
    }

    #[test]
    fn test_limit_applies_before_filtering() {
        let mut xml = String::from("<rss><channel>");
        for i in 0..25 {
            xml.push_str(&format!(
                "<item><title>Story {i}</title><link>https://n.test/{i}</link></item>"
            ));
        }
        xml.push_str("</channel></rss>");
        let items = parse_feed(&xml, "Tech News", &FeedSpec::google_news("semiconductor industry", 10), now())
            .unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[9].url, "https://n.test/9");

        let items = parse_feed(&xml, "Hacker News", &FeedSpec::url("https://hnrss.org/frontpage"), now())
            .unwrap();
        assert_eq!(items.len(), MAX_ITEMS);
    }

    #[test]
    fn test_google_news_url() {
        let spec = FeedSpec::google_news("luxury fashion industry", 10);
        assert_eq!(
            spec.resolve_url(),
            "https://news.google.com/rss/search?q=luxury%20fashion%20industry&hl=en-US&gl=US&ceid=US:en"
        );
    }

    #[test]
    fn test_escaped_html_description_is_stripped() {
        let xml = r#"<rss><channel><item>
            <title>Kering names new CEO - Reuters</title>
            <link>https://news.google.com/rss/articles/abc</link>
            <description>&lt;a href="https://x"&gt;Kering names new CEO&lt;/a&gt;&amp;nbsp;&amp;nbsp;&lt;font&gt;Reuters&lt;/font&gt;</description>
        </item></channel></rss>"#;
        let items = parse_feed(xml, "Luxury Fallback", &FeedSpec::google_news("q", 10), now()).unwrap();
        assert_eq!(items[0].summary, "Kering names new CEO Reuters");
    }

    #[test]
    fn test_namespaced_item_fields_are_ignored() {
        let xml = r#"<rss xmlns:media="http://search.yahoo.com/mrss/"><channel><item>
            <title>Real title</title>
            <media:title>Thumbnail caption</media:title>
            <media:content url="https://img.test/1.jpg"><media:title>Nested</media:title></media:content>
            <link>https://news.test/real</link>
            <description>Body copy</description>
        </item></channel></rss>"#;
        let items = parse_feed(xml, "Luxury Fallback", &FeedSpec::url("https://x.test"), now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Real title");
        assert_eq!(items[0].url, "https://news.test/real");
        assert_eq!(items[0].summary, "Body copy");
    }

    #[test]
    fn test_channel_links_between_items() {
        let xml = r#"<rss xmlns:atom="http://www.w3.org/2005/Atom"><channel>
            <item><title>First</title><link>https://hn.test/1</link></item>
            <atom:link href="https://hnrss.org/frontpage" rel="self" type="application/rss+xml"/>
            <item><title>Second</title><link>https://hn.test/2</link></item>
        </channel></rss>"#;
        let items = parse_feed(xml, "Hacker News", &FeedSpec::url("https://hnrss.org/frontpage"), now()).unwrap();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_html_entities_decoded_or_kept() {
        let xml = r#"<rss><channel><item>
            <title>Herm&eacute;s &amp; Chanel &#8211; Caf&#xE9; &notanentity; run</title>
            <link>https://lux.test/hermes</link>
            <description><![CDATA[Prices rise&hellip;]]></description>
        </item></channel></rss>"#;
        let items = parse_feed(xml, "Jing Daily", &FeedSpec::url("https://x.test"), now()).unwrap();
        assert_eq!(items[0].title, "Hermès & Chanel – Café &notanentity; run");
        assert_eq!(items[0].summary, "Prices rise…");
    }

    #[test]
    fn test_mismatched_tags_are_parse_error() {
        let err = parse_feed("<rss><channel><item></channel></rss>", "X", &FeedSpec::url("https://x.test"), now());
        assert!(matches!(err, Err(ScrapeError::Parse(_))));
    }

    #[test]
    fn test_malformed_feed_is_parse_error() {
        let err = parse_feed("<html><body>Not a feed", "X", &FeedSpec::url("https://x.test"), now());
        assert!(matches!(err, Err(ScrapeError::Parse(_))));
    }

    #[test]
    fn test_empty_channel_yields_nothing() {
        let items = parse_feed("<rss><channel><title>t</title></channel></rss>", "X", &FeedSpec::url("https://x.test"), now())
            .unwrap();
        assert!(items.is_empty());
    }
}
