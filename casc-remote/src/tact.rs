//! Patch host client: the `versions` and `cdns` tables.
//!
//! The patch hosts serve small BPSV documents over plain HTTP on port
//! 1119. These are the only endpoints that are not content-addressed.

use crate::{Error, Region, Result};
use casc_bpsv::{BpsvDocument, BpsvRow, BpsvSchema};
use casc_formats::keys::ContentKey;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

/// Request timeout for patch host fetches.
const PATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One row of the `versions` table, tagged with its source product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Product the row was fetched for.
    pub product: String,
    /// Region tag.
    pub region: String,
    /// Hash of the build configuration file.
    pub build_config: ContentKey,
    /// Hash of the CDN configuration file.
    pub cdn_config: ContentKey,
    /// Optional key ring hash.
    pub key_ring: Option<ContentKey>,
    /// Build number.
    pub build_id: u32,
    /// Human-readable version name.
    pub versions_name: String,
    /// Hash of the product configuration file.
    pub product_config: Option<ContentKey>,
}

/// One row of the `cdns` table: a regional server descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Product the row was fetched for.
    pub product: String,
    /// Region tag.
    pub name: String,
    /// URL path prefix under each edge host, e.g. `tpr/wow`.
    pub path: String,
    /// Edge hosts, in manifest order.
    pub hosts: Vec<String>,
    /// Full server URLs, where provided.
    pub servers: Vec<String>,
    /// Path for product configuration files.
    pub config_path: String,
}

/// Typed access to a BPSV row.
struct FieldAccessor<'a> {
    row: &'a BpsvRow,
    schema: &'a BpsvSchema,
}

impl<'a> FieldAccessor<'a> {
    fn new(row: &'a BpsvRow, schema: &'a BpsvSchema) -> Self {
        Self { row, schema }
    }

    fn get(&self, field: &str) -> Result<&'a str> {
        self.row
            .get_by_name(field, self.schema)
            .ok_or_else(|| Error::invalid_manifest(format!("missing field: {field}")))
    }

    fn get_optional(&self, field: &str) -> Option<&'a str> {
        self.row
            .get_by_name(field, self.schema)
            .filter(|v| !v.is_empty())
    }

    fn get_key(&self, field: &str) -> Result<ContentKey> {
        Ok(ContentKey::from_hex(self.get(field)?)?)
    }

    fn get_key_optional(&self, field: &str) -> Result<Option<ContentKey>> {
        self.get_optional(field)
            .map(|v| ContentKey::from_hex(v).map_err(Error::from))
            .transpose()
    }

    fn get_u32(&self, field: &str) -> Result<u32> {
        let value = self.get(field)?;
        value
            .parse()
            .map_err(|_| Error::invalid_manifest(format!("invalid integer for {field}: {value}")))
    }

    fn get_list(&self, field: &str) -> Result<Vec<String>> {
        Ok(self
            .get(field)?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }
}

/// Parse a `versions` document into typed entries.
pub fn parse_versions(product: &str, content: &str) -> Result<Vec<VersionEntry>> {
    let doc = BpsvDocument::parse(content)?;
    let schema = doc.schema();
    let mut entries = Vec::with_capacity(doc.rows().len());

    for row in doc.rows() {
        let f = FieldAccessor::new(row, schema);

        entries.push(VersionEntry {
            product: product.to_string(),
            region: f.get("Region")?.to_string(),
            build_config: f.get_key("BuildConfig")?,
            cdn_config: f.get_key("CDNConfig")?,
            key_ring: f.get_key_optional("KeyRing")?,
            build_id: f.get_u32("BuildId")?,
            versions_name: f.get("VersionsName")?.to_string(),
            product_config: f.get_key_optional("ProductConfig")?,
        });
    }

    Ok(entries)
}

/// Parse a `cdns` document into typed entries.
pub fn parse_cdns(product: &str, content: &str) -> Result<Vec<ServerEntry>> {
    let doc = BpsvDocument::parse(content)?;
    let schema = doc.schema();
    let mut entries = Vec::with_capacity(doc.rows().len());

    for row in doc.rows() {
        let f = FieldAccessor::new(row, schema);

        entries.push(ServerEntry {
            product: product.to_string(),
            name: f.get("Name")?.to_string(),
            path: f.get("Path")?.to_string(),
            hosts: f.get_list("Hosts")?,
            servers: f
                .get_optional("Servers")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            config_path: f.get("ConfigPath")?.to_string(),
        });
    }

    Ok(entries)
}

/// HTTP client for the regional patch host.
#[derive(Debug, Clone)]
pub struct PatchClient {
    client: Client,
    region: Region,
    base_url: Option<String>,
}

impl PatchClient {
    /// Create a client for the given region.
    pub fn new(region: Region) -> Result<Self> {
        let client = Client::builder().timeout(PATCH_TIMEOUT).build()?;

        Ok(Self {
            client,
            region,
            base_url: None,
        })
    }

    /// Override the patch host base URL (mirrors, test fixtures).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL for the configured region.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}.patch.battle.net:1119", self.region),
        }
    }

    /// The configured region.
    pub fn region(&self) -> Region {
        self.region
    }

    async fn fetch(&self, product: &str, file: &str) -> Result<String> {
        let url = format!("{}/{product}/{file}", self.base_url());
        debug!("patch host request: {url}");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        trace!("patch host response: {}", response.status());
        Ok(response.text().await?)
    }

    /// Fetch and parse the `versions` table for a product.
    pub async fn get_version_config(&self, product: &str) -> Result<Vec<VersionEntry>> {
        let content = self.fetch(product, "versions").await?;
        parse_versions(product, &content)
    }

    /// Fetch and parse the `cdns` table for a product.
    pub async fn get_server_config(&self, product: &str) -> Result<Vec<ServerEntry>> {
        let content = self.fetch(product, "cdns").await?;
        parse_cdns(product, &content)
    }
}
