//! OPDS (Atom) catalog source.
//!
//! Crawls the catalog breadth-first: pagination (`rel="next"`) stays at the
//! same depth, navigation into sub-catalogs increments it, capped at depth 3
//! and 50 pages total with visited-URL dedup. Entries older than the
//! caller's watermark are dropped at parse time.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Url;
use tracing::{debug, warn};

use sage::domain::ScoutItem;
use sage::error::{Error, Result};

/// Maximum navigation depth below the catalog root.
const MAX_DEPTH: usize = 3;
/// Hard page cap per run, against runaway catalogs.
const MAX_PAGES: usize = 50;

/// A remote catalog of downloadable items.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Items with `added_at > since`, newest catalog order preserved.
    async fn fetch_new_items(&self, since: i64) -> Result<Vec<ScoutItem>>;

    /// Download an item's content, enforcing the size limit.
    async fn download(&self, item: &ScoutItem) -> Result<Vec<u8>>;
}

/// OPDS catalog client.
pub struct OpdsSource {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    max_size_bytes: u64,
}

impl OpdsSource {
    #[must_use]
    pub fn new(base_url: impl Into<String>, max_size_bytes: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            username: None,
            password: None,
            max_size_bytes,
        }
    }

    /// Set basic-auth credentials for the catalog.
    #[must_use]
    pub fn with_basic_auth(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::api(format!(
                "catalog returned {} for {url}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl BookSource for OpdsSource {
    async fn fetch_new_items(&self, since: i64) -> Result<Vec<ScoutItem>> {
        let mut items = Vec::new();
        let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut queue: std::collections::VecDeque<(String, usize)> =
            std::collections::VecDeque::new();
        queue.push_back((self.base_url.clone(), 0));

        let mut pages = 0usize;
        while let Some((url, depth)) = queue.pop_front() {
            if pages >= MAX_PAGES {
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }
            pages += 1;

            let body = match self.fetch_page(&url).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(url, error = %err, "failed to fetch catalog page, skipping");
                    continue;
                }
            };

            let page = match parse_feed_page(&body, &url) {
                Ok(page) => page,
                Err(err) => {
                    warn!(url, error = %err, "failed to parse catalog page, skipping");
                    continue;
                }
            };

            debug!(
                url,
                depth,
                entries = page.items.len(),
                subsections = page.subsections.len(),
                "parsed catalog page"
            );

            items.extend(page.items.into_iter().filter(|item| item.added_at > since));

            // Pagination stays at the same depth.
            if let Some(next) = page.next {
                if !visited.contains(&next) {
                    queue.push_back((next, depth));
                }
            }
            // Sub-catalogs go one level deeper.
            if depth < MAX_DEPTH {
                for sub in page.subsections {
                    if !visited.contains(&sub) {
                        queue.push_back((sub, depth + 1));
                    }
                }
            }
        }

        Ok(items)
    }

    async fn download(&self, item: &ScoutItem) -> Result<Vec<u8>> {
        let mut request = self.client.get(&item.download_url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::api(format!(
                "download returned {} for {}",
                response.status(),
                item.download_url
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_size_bytes {
                return Err(Error::invalid_input(format!(
                    "item {} exceeds max size: {length} > {}",
                    item.id, self.max_size_bytes
                )));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > self.max_size_bytes {
            return Err(Error::invalid_input(format!(
                "item {} exceeds max size: {} > {}",
                item.id,
                bytes.len(),
                self.max_size_bytes
            )));
        }
        Ok(bytes.to_vec())
    }
}

/// One parsed catalog page.
#[derive(Debug, Default)]
pub struct FeedPage {
    pub items: Vec<ScoutItem>,
    pub next: Option<String>,
    pub subsections: Vec<String>,
}

#[derive(Default)]
struct EntryDraft {
    id: String,
    title: String,
    author: String,
    updated: String,
    acquisition: Option<(String, String)>,
}

/// Parse one Atom feed page. Relative hrefs are resolved against
/// `page_url`.
pub fn parse_feed_page(xml: &str, page_url: &str) -> Result<FeedPage> {
    let base = Url::parse(page_url)
        .map_err(|e| Error::invalid_input(format!("bad page url {page_url}: {e}")))?;
    let resolve = |href: &str| -> Option<String> {
        base.join(href).ok().map(|u| u.to_string())
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = FeedPage::default();
    let mut entry: Option<EntryDraft> = None;
    let mut text_target: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"entry" => entry = Some(EntryDraft::default()),
                b"id" if entry.is_some() => text_target = Some("id"),
                b"title" if entry.is_some() => text_target = Some("title"),
                b"name" if entry.is_some() => text_target = Some("author"),
                b"updated" | b"published" if entry.is_some() => text_target = Some("updated"),
                b"link" => handle_link(e, entry.as_mut(), &mut page, &resolve)?,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"link" => {
                handle_link(e, entry.as_mut(), &mut page, &resolve)?;
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(target), Some(draft)) = (text_target, entry.as_mut()) {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::invalid_input(format!("bad XML text: {e}")))?
                        .to_string();
                    match target {
                        "id" => draft.id = text,
                        "title" => draft.title = text,
                        "author" => draft.author = text,
                        "updated" if draft.updated.is_empty() => draft.updated = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                text_target = None;
                if e.name().as_ref() == b"entry" {
                    if let Some(draft) = entry.take() {
                        if let Some(item) = finish_entry(draft) {
                            page.items.push(item);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::invalid_input(format!("XML parsing error: {e}"))),
            _ => {}
        }
    }

    Ok(page)
}

fn handle_link(
    e: &quick_xml::events::BytesStart<'_>,
    entry: Option<&mut EntryDraft>,
    page: &mut FeedPage,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<()> {
    let mut rel = String::new();
    let mut href = String::new();
    let mut link_type = String::new();
    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value).to_string();
        match attr.key.as_ref() {
            b"rel" => rel = value,
            b"href" => href = value,
            b"type" => link_type = value,
            _ => {}
        }
    }
    if href.is_empty() {
        return Ok(());
    }
    let Some(resolved) = resolve(&href) else {
        return Ok(());
    };

    match entry {
        Some(draft) => {
            if rel.contains("acquisition") {
                draft.acquisition = Some((resolved, link_type));
            }
        }
        None => {
            if rel == "next" {
                page.next = Some(resolved);
            } else if rel == "subsection" || link_type.contains("kind=navigation") {
                page.subsections.push(resolved);
            }
        }
    }
    Ok(())
}

fn finish_entry(draft: EntryDraft) -> Option<ScoutItem> {
    let (download_url, mime_type) = draft.acquisition?;
    if draft.id.is_empty() {
        return None;
    }
    let added_at = chrono::DateTime::parse_from_rfc3339(&draft.updated)
        .map(|t| t.timestamp())
        .unwrap_or(0);
    Some(ScoutItem {
        id: draft.id,
        title: draft.title,
        author: draft.author,
        download_url,
        added_at,
        mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Catalog</title>
  <link rel="next" href="/catalog?page=2" type="application/atom+xml"/>
  <link rel="subsection" href="/catalog/fiction" type="application/atom+xml"/>
  <entry>
    <id>urn:book:1</id>
    <title>Moby Dick</title>
    <author><name>Herman Melville</name></author>
    <updated>2024-05-01T12:00:00Z</updated>
    <link rel="http://opds-spec.org/acquisition" href="/books/1.epub" type="application/epub+zip"/>
  </entry>
  <entry>
    <id>urn:book:2</id>
    <title>No Download</title>
    <updated>2024-05-02T12:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_page() {
        let page = parse_feed_page(FEED, "http://catalog.example/catalog").unwrap();

        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.id, "urn:book:1");
        assert_eq!(item.title, "Moby Dick");
        assert_eq!(item.author, "Herman Melville");
        assert_eq!(item.download_url, "http://catalog.example/books/1.epub");
        assert_eq!(item.mime_type, "application/epub+zip");
        assert_eq!(
            item.added_at,
            chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .timestamp()
        );

        assert_eq!(
            page.next.as_deref(),
            Some("http://catalog.example/catalog?page=2")
        );
        assert_eq!(page.subsections, vec!["http://catalog.example/catalog/fiction"]);
    }

    #[tokio::test]
    async fn test_fetch_follows_pagination_and_skips_duplicates() {
        let server = MockServer::start().await;

        let page1 = format!(
            r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <link rel="next" href="{}/page2"/>
  <entry>
    <id>b1</id><title>One</title><updated>2024-05-01T00:00:00Z</updated>
    <link rel="http://opds-spec.org/acquisition" href="/dl/1"/>
  </entry>
</feed>"#,
            server.uri()
        );
        let page2 = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>b2</id><title>Two</title><updated>2024-05-02T00:00:00Z</updated>
    <link rel="http://opds-spec.org/acquisition" href="/dl/2"/>
  </entry>
</feed>"#;

        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page2))
            .expect(1)
            .mount(&server)
            .await;

        let source = OpdsSource::new(format!("{}/catalog", server.uri()), 1024);
        let items = source.fetch_new_items(0).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_watermark_filters_old_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED.replace(
                "http://catalog.example",
                &server.uri(),
            )))
            .mount(&server)
            .await;

        let source = OpdsSource::new(format!("{}/catalog", server.uri()), 1024);
        let far_future = 4_000_000_000i64;
        let items = source.fetch_new_items(far_future).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_download_enforces_max_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dl/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let source = OpdsSource::new(server.uri(), 16);
        let item = ScoutItem {
            id: "big".into(),
            title: "Big".into(),
            author: String::new(),
            download_url: format!("{}/dl/big", server.uri()),
            added_at: 0,
            mime_type: String::new(),
        };
        let err = source.download(&item).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
