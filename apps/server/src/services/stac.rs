// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STAC catalog client with on-access cache cleanup.
//!
//! Asset discovery keeps only the most recent asset per feature bounding
//! box; downloads run through the [`AssetCache`] with the two cache
//! invariants (TTL and file existence) checked independently on every
//! lookup.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::GenerationError;
use crate::services::asset_cache::{now_epoch, AssetCache};
use crate::services::bounding_box::BoundingBox;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);
const ASSET_TIMEOUT: Duration = Duration::from_secs(30);
const ASSET_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const DTM_MEDIA_TYPE: &str = "application/x.ascii-xyz+zip";
const CITYGML_MEDIA_TYPE: &str = "application/x.gml+zip";

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    assets: BTreeMap<String, Asset>,
    #[serde(default)]
    bbox: Vec<f64>,
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    datetime: String,
}

/// One downloadable asset of a catalog feature.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(rename = "eo:gsd", default)]
    pub gsd: Option<f64>,
}

/// Client for a STAC items endpoint.
#[derive(Debug, Clone)]
pub struct StacClient {
    http: reqwest::Client,
    cache: AssetCache,
    cache_dir: PathBuf,
}

impl StacClient {
    pub fn new(cache: AssetCache, cache_dir: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache,
            cache_dir,
        }
    }

    /// Fetch and extract all DTM assets of the given grid size covering
    /// `bounding_box`.
    pub async fn fetch_dtm_assets(
        &self,
        items_url: &str,
        bounding_box: &BoundingBox,
        grid_size: f64,
    ) -> Result<Vec<PathBuf>, GenerationError> {
        let hrefs = self
            .fetch_latest_assets(items_url, bounding_box, |asset| {
                asset.media_type == DTM_MEDIA_TYPE && asset.gsd == Some(grid_size)
            })
            .await?;
        self.fetch_all(&hrefs).await
    }

    /// Fetch and extract all CityGML assets covering `bounding_box`.
    pub async fn fetch_citygml_assets(
        &self,
        items_url: &str,
        bounding_box: &BoundingBox,
    ) -> Result<Vec<PathBuf>, GenerationError> {
        let hrefs = self
            .fetch_latest_assets(items_url, bounding_box, |asset| {
                asset.media_type == CITYGML_MEDIA_TYPE
            })
            .await?;
        self.fetch_all(&hrefs).await
    }

    async fn fetch_all(&self, hrefs: &[String]) -> Result<Vec<PathBuf>, GenerationError> {
        let mut paths = Vec::with_capacity(hrefs.len());
        for href in hrefs {
            paths.push(self.fetch_and_extract_zip(href).await?);
        }
        Ok(paths)
    }

    /// Discover the matching assets for a bounding box, keeping only the
    /// most recent asset per feature bounding box.
    pub async fn fetch_latest_assets(
        &self,
        items_url: &str,
        bounding_box: &BoundingBox,
        predicate: impl Fn(&Asset) -> bool,
    ) -> Result<Vec<String>, GenerationError> {
        let bbox = bounding_box.wgs84_query_string();
        tracing::debug!(items_url, bbox = %bbox, "fetching STAC items");

        let response = self
            .http
            .get(items_url)
            .query(&[("bbox", bbox.as_str())])
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GenerationError::Upstream(format!(
                "requesting items failed with HTTP error {}",
                response.status().as_u16()
            )));
        }
        let items: ItemCollection = response.json().await?;
        select_latest(items, predicate)
    }

    /// Return the cached extraction of `href`, or download and extract it.
    ///
    /// The cached entry is honored only while its TTL holds and the file
    /// still exists; a stale entry is purged (including the file when it
    /// expired but is still present) before re-downloading.
    pub async fn fetch_and_extract_zip(&self, href: &str) -> Result<PathBuf, GenerationError> {
        let file_id = href.rsplit('/').next().unwrap_or(href).to_string();

        if let Some(entry) = self.cache.get(&file_id).await {
            if entry.expire_at > now_epoch() {
                if entry.file_path.exists() {
                    tracing::debug!(%file_id, "using cached file");
                    return Ok(entry.file_path);
                }
                tracing::debug!(%file_id, "cached file missing on disk");
                self.cache.delete(&file_id).await;
            } else {
                tracing::debug!(%file_id, "removed expired file at cache fetch");
                self.cache.delete(&file_id).await;
                let _ = tokio::fs::remove_file(&entry.file_path).await;
            }
        }

        tracing::debug!(href, "downloading asset");
        let response = self.http.get(href).timeout(ASSET_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::Upstream(format!(
                "requesting assets failed with HTTP error {}",
                response.status().as_u16()
            )));
        }
        let bytes = response.bytes().await?;

        let cache_dir = self.cache_dir.clone();
        let path =
            tokio::task::spawn_blocking(move || extract_first_member(&bytes, &cache_dir)).await??;

        self.cache.add(&file_id, &path, ASSET_TTL).await?;
        tracing::info!(%file_id, "cached new file");
        Ok(path)
    }
}

/// Keep the most recent matching asset per feature bounding box.
fn select_latest(
    items: ItemCollection,
    predicate: impl Fn(&Asset) -> bool,
) -> Result<Vec<String>, GenerationError> {
    let mut latest: BTreeMap<String, (OffsetDateTime, String)> = BTreeMap::new();
    for feature in items.features {
        let matching: Vec<&Asset> = feature.assets.values().filter(|a| predicate(a)).collect();
        if matching.is_empty() {
            continue;
        }
        if matching.len() != 1 {
            tracing::error!(
                count = matching.len(),
                "filtering assets returned more than one result"
            );
            return Err(GenerationError::Upstream(
                "filtering assets returned more than one result".into(),
            ));
        }
        let datetime =
            OffsetDateTime::parse(&feature.properties.datetime, &Rfc3339).map_err(|e| {
                GenerationError::Upstream(format!(
                    "feature datetime '{}' not parseable: {e}",
                    feature.properties.datetime
                ))
            })?;
        let key = format!("{:?}", feature.bbox);
        match latest.get(&key) {
            Some((existing, _)) if *existing >= datetime => {}
            _ => {
                latest.insert(key, (datetime, matching[0].href.clone()));
            }
        }
    }
    Ok(latest.into_values().map(|(_, href)| href).collect())
}

/// Extract the single member of an asset archive into `dir`.
fn extract_first_member(bytes: &[u8], dir: &Path) -> Result<PathBuf, GenerationError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    if archive.is_empty() {
        return Err(GenerationError::Upstream("asset archive is empty".into()));
    }
    let mut member = archive.by_index(0)?;
    let name = member
        .enclosed_name()
        .and_then(|p| p.file_name().map(|n| n.to_os_string()))
        .ok_or_else(|| GenerationError::Upstream("asset archive member has no name".into()))?;
    let path = dir.join(name);
    let mut out = std::fs::File::create(&path)?;
    std::io::copy(&mut member, &mut out)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with_member(name: &str, content: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn extracts_the_first_member() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_with_member("tile_2600_1199.xyz", b"x y z\n1 2 3\n");

        let path = extract_first_member(&bytes, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "tile_2600_1199.xyz");
        assert_eq!(std::fs::read(&path).unwrap(), b"x y z\n1 2 3\n");
    }

    #[test]
    fn rejects_empty_archives() {
        let dir = tempfile::tempdir().unwrap();
        let mut cursor = Cursor::new(Vec::new());
        zip::ZipWriter::new(&mut cursor).finish().unwrap();
        assert!(extract_first_member(&cursor.into_inner(), dir.path()).is_err());
    }

    fn items(features: serde_json::Value) -> ItemCollection {
        serde_json::from_value(serde_json::json!({ "features": features })).unwrap()
    }

    #[test]
    fn keeps_only_the_latest_asset_per_bbox() {
        let collection = items(serde_json::json!([
            {
                "assets": {"data": {"href": "https://x/old.zip", "type": DTM_MEDIA_TYPE, "eo:gsd": 0.5}},
                "bbox": [7.4, 46.9, 7.5, 47.0],
                "properties": {"datetime": "2021-01-01T00:00:00Z"}
            },
            {
                "assets": {"data": {"href": "https://x/new.zip", "type": DTM_MEDIA_TYPE, "eo:gsd": 0.5}},
                "bbox": [7.4, 46.9, 7.5, 47.0],
                "properties": {"datetime": "2023-06-01T00:00:00Z"}
            },
            {
                "assets": {"data": {"href": "https://x/other.zip", "type": DTM_MEDIA_TYPE, "eo:gsd": 0.5}},
                "bbox": [7.5, 46.9, 7.6, 47.0],
                "properties": {"datetime": "2020-01-01T00:00:00Z"}
            }
        ]));

        let hrefs = select_latest(collection, |a| a.media_type == DTM_MEDIA_TYPE).unwrap();
        assert_eq!(hrefs.len(), 2);
        assert!(hrefs.contains(&"https://x/new.zip".to_string()));
        assert!(hrefs.contains(&"https://x/other.zip".to_string()));
    }

    #[test]
    fn predicate_mismatches_are_skipped() {
        let collection = items(serde_json::json!([
            {
                "assets": {"data": {"href": "https://x/gml.zip", "type": CITYGML_MEDIA_TYPE}},
                "bbox": [7.4, 46.9, 7.5, 47.0],
                "properties": {"datetime": "2021-01-01T00:00:00Z"}
            }
        ]));
        let hrefs = select_latest(collection, |a| a.media_type == DTM_MEDIA_TYPE).unwrap();
        assert!(hrefs.is_empty());
    }

    #[test]
    fn ambiguous_asset_filters_are_an_error() {
        let collection = items(serde_json::json!([
            {
                "assets": {
                    "a": {"href": "https://x/a.zip", "type": DTM_MEDIA_TYPE, "eo:gsd": 0.5},
                    "b": {"href": "https://x/b.zip", "type": DTM_MEDIA_TYPE, "eo:gsd": 0.5}
                },
                "bbox": [7.4, 46.9, 7.5, 47.0],
                "properties": {"datetime": "2021-01-01T00:00:00Z"}
            }
        ]));
        let err = select_latest(collection, |a| a.media_type == DTM_MEDIA_TYPE).unwrap_err();
        assert!(matches!(err, GenerationError::Upstream(_)));
    }

    #[test]
    fn unparseable_datetimes_are_an_error() {
        let collection = items(serde_json::json!([
            {
                "assets": {"data": {"href": "https://x/a.zip", "type": DTM_MEDIA_TYPE, "eo:gsd": 0.5}},
                "bbox": [7.4, 46.9, 7.5, 47.0],
                "properties": {"datetime": "yesterday"}
            }
        ]));
        assert!(select_latest(collection, |a| a.media_type == DTM_MEDIA_TYPE).is_err());
    }
}
