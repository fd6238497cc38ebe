//! RSS feed parsing.
//!
//! Only the item fields that identify an article and date it are read:
//! `link`, `guid` and `pubDate`. Channel metadata is ignored.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use feedwatch_core::Error;

/// One feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub link: String,
    pub guid: Option<String>,
    /// Publication time; the unix epoch when the feed's date is missing or
    /// unreadable.
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// `<guid isPermaLink="false">…</guid>`; the attribute is not needed.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parse RSS XML into feed items, in document order.
///
/// Items without a link are skipped. An unreadable `pubDate` does not fail
/// the parse; the item is dated at the epoch instead.
///
/// # Errors
///
/// Returns `Error::FeedParse` if the document is not an RSS feed.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, Error> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&cleaned).map_err(|e| Error::FeedParse(e.to_string()))?;

    let mut items = Vec::with_capacity(rss.channel.items.len());
    for raw in rss.channel.items {
        let Some(link) = raw.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
            tracing::debug!("skipping feed item without link");
            continue;
        };

        let published_at = match raw.pub_date.as_deref() {
            Some(date) => parse_pub_date(date).unwrap_or_else(|| {
                tracing::warn!(link = %link, pub_date = date, "unreadable pubDate, using epoch");
                DateTime::UNIX_EPOCH
            }),
            None => {
                tracing::warn!(link = %link, "missing pubDate, using epoch");
                DateTime::UNIX_EPOCH
            }
        };

        let guid = raw.guid.map(|g| g.value.trim().to_string()).filter(|g| !g.is_empty());

        items.push(FeedItem { link, guid, published_at });
    }

    Ok(items)
}

/// Parse an RSS `pubDate` (RFC 1123 with numeric zone).
///
/// RFC 3339 dates are accepted too, since some feeds emit them.
pub fn parse_pub_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// HTML entities that are not defined in XML and show up in real feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&laquo;", "&#171;")
        .replace("&raquo;", "&#187;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
}
