//! Pipeline controller: build selection, staged loading, file resolution.

use crate::cdn::{CdnClient, CONFIG_TIMEOUT, INDEX_TIMEOUT};
use crate::ping;
use crate::progress::{CancellationToken, Progress, ProgressFn};
use crate::tact::{PatchClient, ServerEntry, VersionEntry};
use crate::{Error, Region, Result};
use casc_cache::{BuildCache, Category};
use casc_formats::archive_index::{self, ArchiveEntry};
use casc_formats::blte::{BlteBlob, BlteDecoder};
use casc_formats::config::{BuildConfig, CdnConfig};
use casc_formats::encoding::EncodingFile;
use casc_formats::keys::{ArchiveKey, EncodingKey};
use casc_formats::root::{LocaleFlags, RootFile};
use futures::stream::{self, StreamExt};
use futures::future;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Products whose builds are listed by default.
pub const KNOWN_PRODUCTS: &[&str] = &["wow", "wowt", "wow_beta", "wow_classic", "wow_classic_era"];

/// In-flight bound for archive index fetches. Archive counts reach the
/// hundreds; per-host connection limits stall anything unbounded.
const ARCHIVE_CONCURRENCY: usize = 50;

/// Steps reported by a full `load`.
const LOAD_STEPS: usize = 10;

/// Steps reported by a bare `preload`.
const PRELOAD_STEPS: usize = 6;

/// Remote CASC pipeline.
///
/// All maps are populated exactly once during [`load`](Self::load) and
/// read-only afterwards; [`get_file`](Self::get_file) takes `&self` and
/// may be called concurrently.
pub struct CascRemote {
    region: Region,
    user_data_root: PathBuf,
    products: Vec<String>,
    locale: LocaleFlags,
    patch: PatchClient,
    cdn: CdnClient,
    decoder: Arc<dyn BlteDecoder>,
    token: CancellationToken,
    progress_callback: Option<ProgressFn>,

    builds: Vec<VersionEntry>,
    server: Option<ServerEntry>,
    host_prefix: Option<String>,
    build_config: Option<BuildConfig>,
    cdn_config: Option<CdnConfig>,
    cache: Option<BuildCache>,
    archives: HashMap<EncodingKey, ArchiveEntry>,
    encoding: Option<EncodingFile>,
    root: Option<RootFile>,
}

impl CascRemote {
    /// Create a pipeline for `region`, caching under `user_data_root`.
    ///
    /// `decoder` is the external BLTE decoder used for the encoding and
    /// root tables.
    pub fn new(
        region: Region,
        user_data_root: impl Into<PathBuf>,
        decoder: Arc<dyn BlteDecoder>,
    ) -> Result<Self> {
        Ok(Self {
            region,
            user_data_root: user_data_root.into(),
            products: KNOWN_PRODUCTS.iter().map(|p| p.to_string()).collect(),
            locale: LocaleFlags::new().with_en_us(true),
            patch: PatchClient::new(region)?,
            cdn: CdnClient::new()?,
            decoder,
            token: CancellationToken::new(),
            progress_callback: None,
            builds: Vec::new(),
            server: None,
            host_prefix: None,
            build_config: None,
            cdn_config: None,
            cache: None,
            archives: HashMap::new(),
            encoding: None,
            root: None,
        })
    }

    /// Override the product list.
    pub fn with_products(mut self, products: Vec<String>) -> Self {
        self.products = products;
        self
    }

    /// Override the locale filter (defaults to enUS).
    pub fn with_locale(mut self, locale: LocaleFlags) -> Self {
        self.locale = locale;
        self
    }

    /// Register a progress callback.
    pub fn with_progress(mut self, callback: ProgressFn) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Override the patch host base URL (mirrors, test fixtures).
    pub fn with_patch_base_url(mut self, url: impl Into<String>) -> Self {
        self.patch = self.patch.with_base_url(url);
        self
    }

    /// The token cancelling this pipeline's stages.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The configured region.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Builds discovered by [`init`](Self::init), in product-list order.
    pub fn builds(&self) -> &[VersionEntry] {
        &self.builds
    }

    /// Populate the build list from the patch host.
    ///
    /// Products that fail to fetch, or have no row for the configured
    /// region, are dropped with a warning. Failure of every product is a
    /// dead patch host and fatal.
    pub async fn init(&mut self) -> Result<()> {
        info!(
            "fetching version configs for {} products",
            self.products.len()
        );

        let results =
            future::join_all(self.products.iter().map(|p| self.patch.get_version_config(p)))
                .await;

        let mut builds = Vec::new();
        let mut any_reachable = self.products.is_empty();

        for (product, result) in self.products.iter().zip(results) {
            match result {
                Ok(entries) => {
                    any_reachable = true;
                    let region = self.region.as_str();
                    match entries.into_iter().find(|e| e.region == region) {
                        Some(entry) => builds.push(entry),
                        None => warn!("product {product} has no {region} region entry"),
                    }
                }
                Err(e) => warn!("failed to fetch versions for {product}: {e}"),
            }
        }

        if !any_reachable {
            return Err(Error::configuration(
                "patch host unreachable for every product",
            ));
        }

        debug!("{} builds available", builds.len());
        self.builds = builds;
        Ok(())
    }

    /// Run the archive-lookup half of the pipeline for one build: server
    /// config, host resolution, configs, build cache, archive indexes.
    ///
    /// Leaves encoding and root untouched; enough for resolving encoding
    /// keys against the archive set.
    pub async fn preload(&mut self, build_index: usize) -> Result<()> {
        let mut progress = self.progress(PRELOAD_STEPS);
        self.preload_stages(build_index, &mut progress).await
    }

    /// Fully load one build: [`preload`](Self::preload) plus the encoding
    /// and root tables.
    pub async fn load(&mut self, build_index: usize) -> Result<()> {
        let mut progress = self.progress(LOAD_STEPS);
        self.preload_stages(build_index, &mut progress).await?;
        self.load_encoding(&mut progress).await?;
        self.load_root(&mut progress).await?;
        Ok(())
    }

    fn progress(&self, total: usize) -> Progress {
        Progress::new(total, self.token.clone(), self.progress_callback.clone())
    }

    async fn preload_stages(&mut self, build_index: usize, progress: &mut Progress) -> Result<()> {
        let build = self
            .builds
            .get(build_index)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("no build at index {build_index}")))?;
        info!(
            "loading build {} ({}, build {})",
            build.versions_name, build.product, build.build_id
        );

        progress.step("Fetching server configuration").await?;
        let region = self.region.as_str();
        let server = self
            .patch
            .get_server_config(&build.product)
            .await?
            .into_iter()
            .find(|s| s.name == region)
            .ok_or_else(|| {
                Error::configuration(format!("no server descriptor for region {region}"))
            })?;

        progress.step("Locating fastest CDN server").await?;
        let resolved = ping::resolve_host(&server.hosts, &self.token).await?;
        let host_prefix = format!("http://{}/{}/", resolved.host, server.path.trim_matches('/'));
        debug!("using CDN prefix {host_prefix}");

        progress.step("Fetching build configuration").await?;
        let url = format!("{host_prefix}config/{}", build.build_config.prefixed_path());
        let bytes = self.cdn.fetch(&url, Some(CONFIG_TIMEOUT)).await?;
        let build_config = BuildConfig::parse(bytes.as_slice())?;

        progress.step("Fetching CDN configuration").await?;
        let url = format!("{host_prefix}config/{}", build.cdn_config.prefixed_path());
        let bytes = self.cdn.fetch(&url, Some(CONFIG_TIMEOUT)).await?;
        let cdn_config = CdnConfig::parse(bytes.as_slice())?;

        progress.step("Initializing build cache").await?;
        let cache = BuildCache::new(&self.user_data_root, &build.build_config.to_string());
        cache.init().await?;

        progress.step("Loading archives").await?;
        let archives = self.load_archives(&host_prefix, &cdn_config, &cache).await?;
        info!("loaded {} archive index entries", archives.len());

        self.server = Some(server);
        self.host_prefix = Some(host_prefix);
        self.build_config = Some(build_config);
        self.cdn_config = Some(cdn_config);
        self.cache = Some(cache);
        self.archives = archives;
        Ok(())
    }

    /// Fetch and parse every archive index, bounded fan-out, merging in
    /// completion order (archives have disjoint key ranges; the rare
    /// duplicate takes last-writer).
    async fn load_archives(
        &self,
        prefix: &str,
        cdn_config: &CdnConfig,
        cache: &BuildCache,
    ) -> Result<HashMap<EncodingKey, ArchiveEntry>> {
        let archive_keys = cdn_config
            .archives
            .as_deref()
            .ok_or_else(|| Error::configuration("CDN config lists no archives"))?;

        let mut fetches = stream::iter(
            archive_keys
                .iter()
                .map(|&archive| self.fetch_archive_index(prefix, cache, archive)),
        )
        .buffer_unordered(ARCHIVE_CONCURRENCY);

        let mut map = HashMap::new();
        while let Some(entries) = fetches.next().await {
            for (ekey, entry) in entries? {
                map.insert(ekey, entry);
            }
        }

        Ok(map)
    }

    async fn fetch_archive_index(
        &self,
        prefix: &str,
        cache: &BuildCache,
        archive: ArchiveKey,
    ) -> Result<Vec<(EncodingKey, ArchiveEntry)>> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let name = format!("{archive}.index");
        let bytes = match cache.get(&name, Category::Indexes).await? {
            Some(bytes) => bytes,
            None => {
                let url = format!("{prefix}data/{}.index", archive.prefixed_path());
                let bytes = self.cdn.fetch(&url, Some(INDEX_TIMEOUT)).await?;
                if let Err(e) = cache.store(&name, &bytes, Category::Indexes).await {
                    warn!("failed to cache archive index {archive}: {e}");
                }
                bytes
            }
        };

        Ok(archive_index::parse_index(
            &mut Cursor::new(bytes),
            archive,
        )?)
    }

    async fn load_encoding(&mut self, progress: &mut Progress) -> Result<()> {
        let build_config = self.loaded(&self.build_config, "build config")?;
        let (_, ekey) = build_config
            .encoding
            .ok_or_else(|| Error::configuration("build config has no encoding field"))?;

        progress.step("Fetching encoding table").await?;
        let bytes = self.fetch_singleton("encoding", ekey).await?;

        progress.step("Parsing encoding table").await?;
        let decoded = self.decoder.decode(&BlteBlob::new(ekey, bytes))?;
        let encoding = EncodingFile::parse(&mut Cursor::new(decoded))?;
        info!("parsed encoding table: {} entries", encoding.len());

        self.encoding = Some(encoding);
        Ok(())
    }

    async fn load_root(&mut self, progress: &mut Progress) -> Result<()> {
        let build_config = self.loaded(&self.build_config, "build config")?;
        let root_ckey = build_config
            .root
            .ok_or_else(|| Error::configuration("build config has no root field"))?;

        let encoding = self.loaded(&self.encoding, "encoding table")?;
        let root_ekey = *encoding.ekey_for(&root_ckey).ok_or_else(|| {
            Error::build_inconsistency(format!(
                "root table {root_ckey} missing from encoding table"
            ))
        })?;

        progress.step("Fetching root table").await?;
        let bytes = self.fetch_singleton("root", root_ekey).await?;

        progress.step("Parsing root table").await?;
        let decoded = self.decoder.decode(&BlteBlob::new(root_ekey, bytes))?;
        let root = RootFile::parse(&mut Cursor::new(decoded), self.locale)?;
        info!("parsed root table: {} entries", root.len());

        self.root = Some(root);
        Ok(())
    }

    /// Fetch one of the well-known top-level files (`encoding`, `root`)
    /// through the cache.
    async fn fetch_singleton(&self, name: &str, ekey: EncodingKey) -> Result<Vec<u8>> {
        let cache = self.loaded(&self.cache, "build cache")?;

        if let Some(bytes) = cache.get(name, Category::Top).await? {
            return Ok(bytes);
        }

        let prefix = self.loaded(&self.host_prefix, "CDN host")?;
        let url = format!("{prefix}data/{}", ekey.prefixed_path());
        let bytes = self.cdn.fetch(&url, None).await?;

        if let Err(e) = cache.store(name, &bytes, Category::Top).await {
            warn!("failed to cache {name}: {e}");
        }

        Ok(bytes)
    }

    /// Resolve a file data ID to its (still BLTE-framed) payload.
    ///
    /// Reentrant; resolution only reads the frozen maps. Concurrent
    /// misses on the same encoding key may double-fetch, which is benign:
    /// cache writes are atomic and content-addressed.
    pub async fn get_file(&self, file_data_id: u32) -> Result<BlteBlob> {
        let root = self.loaded(&self.root, "root table")?;
        let encoding = self.loaded(&self.encoding, "encoding table")?;
        let cache = self.loaded(&self.cache, "build cache")?;

        let ckey = root
            .get(file_data_id)
            .ok_or(Error::NotFound(file_data_id))?;
        let ekey = *encoding.ekey_for(ckey).ok_or_else(|| {
            Error::build_inconsistency(format!(
                "content key {ckey} missing from encoding table"
            ))
        })?;

        let name = ekey.to_string();
        if let Some(bytes) = cache.get(&name, Category::Data).await? {
            return Ok(BlteBlob::new(ekey, bytes));
        }

        let entry = self.archives.get(&ekey).ok_or_else(|| {
            Error::build_inconsistency(format!(
                "encoding key {ekey} not present in any archive index"
            ))
        })?;

        debug!(
            "fetching file {file_data_id}: {} bytes at offset {} of archive {}",
            entry.size, entry.offset, entry.archive
        );
        let prefix = self.loaded(&self.host_prefix, "CDN host")?;
        let url = format!("{prefix}data/{}", entry.archive.prefixed_path());
        let bytes = self.cdn.fetch_range(&url, entry.offset, entry.size).await?;

        if let Err(e) = cache.store(&name, &bytes, Category::Data).await {
            warn!("failed to cache file payload {ekey}: {e}");
        }

        Ok(BlteBlob::new(ekey, bytes))
    }

    /// The server descriptor selected for this region, once preloaded.
    pub fn server(&self) -> Option<&ServerEntry> {
        self.server.as_ref()
    }

    /// The loaded build configuration, once preloaded.
    pub fn build_config(&self) -> Option<&BuildConfig> {
        self.build_config.as_ref()
    }

    /// The loaded CDN configuration, once preloaded.
    pub fn cdn_config(&self) -> Option<&CdnConfig> {
        self.cdn_config.as_ref()
    }

    /// The URL prefix of the selected edge host, once preloaded.
    pub fn host_prefix(&self) -> Option<&str> {
        self.host_prefix.as_deref()
    }

    /// Archive index location for an encoding key, if indexed.
    pub fn archive_entry(&self, ekey: &EncodingKey) -> Option<&ArchiveEntry> {
        self.archives.get(ekey)
    }

    /// Number of entries in the global archive index.
    pub fn archive_entry_count(&self) -> usize {
        self.archives.len()
    }

    /// Number of entries in the encoding table, once loaded.
    pub fn encoding_entry_count(&self) -> usize {
        self.encoding.as_ref().map_or(0, EncodingFile::len)
    }

    /// Number of entries in the root table, once loaded.
    pub fn root_entry_count(&self) -> usize {
        self.root.as_ref().map_or(0, RootFile::len)
    }

    fn loaded<'a, T>(&self, field: &'a Option<T>, what: &str) -> Result<&'a T> {
        field
            .as_ref()
            .ok_or_else(|| Error::configuration(format!("{what} is not loaded")))
    }
}
