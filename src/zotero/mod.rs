//! Zotero local API client
//!
//! Talks to the data server embedded in a running Zotero desktop instance
//! (default port 23119). The `DocumentSource` trait is the seam the indexing
//! pipeline depends on, so tests can substitute an in-memory source.

use crate::config::ZoteroConfig;
use crate::error::{Error, Result};
use crate::models::LibraryKind;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Identifies a library on the local API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRef {
    pub id: String,
    pub kind: LibraryKind,
}

impl LibraryRef {
    pub fn new(id: impl Into<String>, kind: LibraryKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// API path prefix for this library
    pub fn api_prefix(&self) -> String {
        match self.kind {
            LibraryKind::User => format!("users/{}", self.id),
            LibraryKind::Group => format!("groups/{}", self.id),
        }
    }
}

/// A library available on the local API
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub id: String,
    pub kind: LibraryKind,
    pub name: String,
}

/// Creator entry on an item. Zotero uses either first/last name pairs or a
/// single institutional name.
#[derive(Debug, Clone, Deserialize)]
pub struct Creator {
    #[serde(rename = "creatorType")]
    pub creator_type: Option<String>,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    pub name: Option<String>,
}

/// The `data` object of a Zotero item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemData {
    #[serde(rename = "itemType", default)]
    pub item_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "dateModified", default)]
    pub date_modified: Option<String>,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub relations: serde_json::Value,
}

/// A Zotero item as returned by the local API
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub key: String,
    pub version: i64,
    pub data: ItemData,
}

static YEAR_RE: OnceLock<Regex> = OnceLock::new();

impl Item {
    /// Author display names, "First Last" or institutional name
    pub fn authors(&self) -> Vec<String> {
        self.data
            .creators
            .iter()
            .filter(|c| {
                c.creator_type
                    .as_deref()
                    .map(|t| t == "author")
                    .unwrap_or(true)
            })
            .filter_map(|c| {
                if let Some(name) = &c.name {
                    Some(name.clone())
                } else {
                    match (&c.first_name, &c.last_name) {
                        (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
                        (None, Some(last)) => Some(last.clone()),
                        (Some(first), None) => Some(first.clone()),
                        (None, None) => None,
                    }
                }
            })
            .collect()
    }

    /// Publication year parsed from the free-form date field
    pub fn year(&self) -> Option<i32> {
        let re = YEAR_RE.get_or_init(|| Regex::new(r"\b(\d{4})\b").expect("static pattern"));
        self.data
            .date
            .as_deref()
            .and_then(|d| re.captures(d))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// The `owl:sameAs` relation URI, if the item carries one
    pub fn same_as_relation(&self) -> Option<String> {
        match self.data.relations.get("owl:sameAs") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(arr)) => arr
                .first()
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        }
    }

    /// Regular items carry indexable content; attachments, notes and
    /// annotations are children, not documents
    pub fn is_regular_item(&self) -> bool {
        !matches!(
            self.data.item_type.as_str(),
            "attachment" | "note" | "annotation"
        )
    }

    /// PDF attachments are the only children we extract text from
    pub fn is_pdf_attachment(&self) -> bool {
        self.data.item_type == "attachment"
            && self.data.content_type.as_deref() == Some("application/pdf")
    }
}

/// Result of listing a library's items: the items plus the library version
/// reported by the server, used as the next indexing watermark
#[derive(Debug, Clone)]
pub struct ItemListing {
    pub items: Vec<Item>,
    pub library_version: i64,
}

/// Abstraction over the document source the indexer reads from
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Verify the source is reachable
    async fn check_connection(&self) -> Result<()>;

    /// Libraries available on this source
    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>>;

    /// List regular items, optionally only those changed after `since`
    async fn list_items_since(
        &self,
        library: &LibraryRef,
        since: Option<i64>,
    ) -> Result<ItemListing>;

    /// Child items (attachments, notes) of one item
    async fn list_children(&self, library: &LibraryRef, item_key: &str) -> Result<Vec<Item>>;

    /// Raw file bytes of an attachment. `None` when the attachment exists
    /// in the catalog but its file is not available locally.
    async fn fetch_attachment(
        &self,
        library: &LibraryRef,
        attachment_key: &str,
    ) -> Result<Option<Vec<u8>>>;
}

/// Client for the Zotero desktop local data server
pub struct ZoteroLocalApi {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    id: i64,
    data: GroupData,
}

#[derive(Debug, Deserialize)]
struct GroupData {
    #[serde(default)]
    name: String,
}

impl ZoteroLocalApi {
    pub fn new(config: &ZoteroConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(T, reqwest::header::HeaderMap)> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Source(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Source(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let headers = response.headers().clone();
        let body = response.json::<T>().await?;
        Ok((body, headers))
    }
}

fn header_i64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[async_trait]
impl DocumentSource for ZoteroLocalApi {
    async fn check_connection(&self) -> Result<()> {
        let url = self.api_url("users/0/items");
        let query = [("limit", "1".to_string()), ("format", "json".to_string())];
        self.get_json::<Vec<Item>>(&url, &query).await.map_err(|_| {
            Error::Source(format!(
                "Zotero is not reachable at {}. Is the desktop app running with \
                 the local API enabled?",
                self.base_url
            ))
        })?;
        Ok(())
    }

    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>> {
        let mut libraries = vec![LibraryInfo {
            id: "0".to_string(),
            kind: LibraryKind::User,
            name: "My Library".to_string(),
        }];

        // Group listing is best-effort; older Zotero builds omit the endpoint
        let url = self.api_url("users/0/groups");
        match self
            .get_json::<Vec<GroupEntry>>(&url, &[("format", "json".to_string())])
            .await
        {
            Ok((groups, _)) => {
                for group in groups {
                    libraries.push(LibraryInfo {
                        id: group.id.to_string(),
                        kind: LibraryKind::Group,
                        name: group.data.name,
                    });
                }
            }
            Err(e) => warn!("Could not list group libraries: {}", e),
        }

        Ok(libraries)
    }

    #[instrument(skip(self), fields(library = %library.id))]
    async fn list_items_since(
        &self,
        library: &LibraryRef,
        since: Option<i64>,
    ) -> Result<ItemListing> {
        let url = self.api_url(&format!("{}/items/top", library.api_prefix()));
        let mut items = Vec::new();
        let mut start = 0usize;
        let mut library_version = 0i64;

        loop {
            let mut query = vec![
                ("format", "json".to_string()),
                ("limit", self.page_size.to_string()),
                ("start", start.to_string()),
            ];
            if let Some(since) = since {
                query.push(("since", since.to_string()));
            }

            let (page, headers) = self.get_json::<Vec<Item>>(&url, &query).await?;

            if start == 0 {
                library_version = header_i64(&headers, "Last-Modified-Version").unwrap_or(0);
            }
            let total = header_i64(&headers, "Total-Results").unwrap_or(page.len() as i64);

            let page_len = page.len();
            items.extend(page.into_iter().filter(Item::is_regular_item));

            start += page_len;
            if page_len == 0 || start as i64 >= total {
                break;
            }
        }

        debug!(
            "Listed {} item(s), library version {}",
            items.len(),
            library_version
        );

        Ok(ItemListing {
            items,
            library_version,
        })
    }

    async fn list_children(&self, library: &LibraryRef, item_key: &str) -> Result<Vec<Item>> {
        let url = self.api_url(&format!(
            "{}/items/{}/children",
            library.api_prefix(),
            item_key
        ));
        let (children, _) = self
            .get_json::<Vec<Item>>(&url, &[("format", "json".to_string())])
            .await?;
        Ok(children)
    }

    async fn fetch_attachment(
        &self,
        library: &LibraryRef,
        attachment_key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let url = self.api_url(&format!(
            "{}/items/{}/file",
            library.api_prefix(),
            attachment_key
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Source(format!("file request failed: {}", e)))?;

        // Linked attachments without a local file come back 404
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Error::Source(format!(
                "attachment {} returned HTTP {}",
                attachment_key,
                response.status()
            )));
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}
