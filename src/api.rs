//! HTTP access to the split change feeds.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::PollerConfig;
use crate::error::{Error, Result};
use crate::reducer::{fold_segment, fold_splits, segments_in_use};
use crate::segment::{Segment, SegmentChanges};
use crate::split::{Split, SplitChanges};
use crate::store::{ChangeFetcher, FetchedSegments, FetchedSplits};
use crate::util::cursor_from_value;

const SPLIT_CHANGES_PATH: &str = "splitChanges";
const SEGMENT_CHANGES_PATH: &str = "segmentChanges";

/// A [ChangeFetcher] that pages through the remote SDK API over HTTP.
pub struct SplitioBinding {
    api_key: String,
    base_url: Url,
    client: Client,
}

impl SplitioBinding {
    pub fn new(config: &PollerConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("api key must not be empty".to_string()));
        }
        let base_url = Url::parse(config.effective_base_url())
            .map_err(|e| Error::Config(format!("invalid base url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base url {} cannot take a path",
                base_url
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::Request)?;
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    // Each path segment is percent-encoded on its own, so names may contain `/`, `?` or `#`.
    fn endpoint(&self, path: &[&str], since: i64) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("base url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(path);
        url.query_pairs_mut()
            .append_pair("since", &since.to_string());
        Ok(url)
    }

    async fn http_get(&self, path: &[&str], since: i64) -> Result<Value> {
        let url = self.endpoint(path, since)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Error::Request)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Status(status));
        }

        let body = response.bytes().await.map_err(Error::Request)?;
        serde_json::from_slice(&body).map_err(Error::Decode)
    }

    /// Requests pages of `path` starting from the beginning of the feed until a page reports
    /// the same `till` it was requested with. That terminal page carries no changes and is not
    /// returned; the cursor it reports is.
    async fn get_all_changes(&self, path: &[&str]) -> Result<(Vec<Value>, i64)> {
        let mut since = -1;
        let mut pages = Vec::new();
        loop {
            let page = self.http_get(path, since).await?;
            let till = cursor_from_value(page.get("till"))?;
            debug!(
                "fetched {} page since={} till={}",
                path.join("/"),
                since,
                till
            );
            if till == since {
                return Ok((pages, till));
            }
            pages.push(page);
            since = till;
        }
    }

    async fn fetch_segment(&self, name: &str) -> Result<Segment> {
        let (pages, till) = self
            .get_all_changes(&[SEGMENT_CHANGES_PATH, name])
            .await?;
        let pages: Vec<SegmentChanges> = decode_pages(pages).map_err(Error::SegmentDecode)?;
        Ok(fold_segment(name, pages, till))
    }
}

fn decode_pages<T: DeserializeOwned>(pages: Vec<Value>) -> serde_json::Result<Vec<T>> {
    pages.into_iter().map(serde_json::from_value).collect()
}

#[async_trait]
impl ChangeFetcher for SplitioBinding {
    async fn fetch_splits(&self) -> Result<FetchedSplits> {
        let (pages, till) = self.get_all_changes(&[SPLIT_CHANGES_PATH]).await?;
        let pages: Vec<SplitChanges> = decode_pages(pages).map_err(Error::SplitDecode)?;
        Ok(FetchedSplits {
            splits: fold_splits(pages),
            since: till,
        })
    }

    async fn fetch_segments_for_splits(
        &self,
        splits: &HashMap<String, Split>,
    ) -> Result<FetchedSegments> {
        let (names, using_segments_count) = segments_in_use(splits.values());
        let mut segments = HashMap::with_capacity(names.len());
        for name in names {
            let segment = self.fetch_segment(&name).await?;
            segments.insert(name, segment);
        }
        Ok(FetchedSegments {
            segments,
            using_segments_count,
        })
    }
}
