//! End-to-end pipeline tests against a mock patch host and CDN edge.
//!
//! The fixture is a tiny but internally consistent build: one product,
//! one archive, one file. Every stage runs against real wire bytes.

use casc_formats::blte::{BlteBlob, BlteDecoder};
use casc_formats::keys::EncodingKey;
use casc_remote::{CascRemote, Error, ProgressFn, Region};
use md5::{Digest, Md5};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// File data ID of the fixture's only file.
const FID: u32 = 1322105;
/// Its location within the fixture archive.
const OFFSET: u32 = 12345;
const SIZE: u32 = 6789;

/// Fixture key bytes: content/encoding/archive keys are repeated bytes so
/// their hex renderings are easy to spot in mock paths.
const FILE_CK: u8 = 0x11;
const FILE_EK: u8 = 0xaa;
const ROOT_CK: u8 = 0x33;
const ROOT_EK: u8 = 0xbb;
const ENC_CK: u8 = 0x44;
const ENC_EK: u8 = 0xcc;
const BUILD_CONFIG: u8 = 0x55;
const CDN_CONFIG: u8 = 0x66;
const ARCHIVE: u8 = 0x77;

fn hexkey(b: u8) -> String {
    format!("{b:02x}").repeat(16)
}

fn prefixed(b: u8) -> String {
    let two = format!("{b:02x}");
    format!("{two}/{two}/{}", hexkey(b))
}

/// The pipeline hands encoding/root bytes to the BLTE decoder before
/// parsing; the fixture serves them unframed, so decoding is identity.
struct IdentityDecoder;

impl BlteDecoder for IdentityDecoder {
    fn decode(&self, blob: &BlteBlob) -> casc_formats::Result<Vec<u8>> {
        Ok(blob.data.clone())
    }
}

fn versions_body() -> String {
    format!(
        "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|\
         BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16\n\
         ## seqn = 100\n\
         us|{}|{}||60000|11.0.0.60000|",
        hexkey(BUILD_CONFIG),
        hexkey(CDN_CONFIG),
    )
}

fn cdns_body(mock_host: &str) -> String {
    format!(
        "Name!STRING:0|Path!STRING:0|Hosts!STRING:0|Servers!STRING:0|ConfigPath!STRING:0\n\
         ## seqn = 100\n\
         us|tpr/wow|{mock_host}||tpr/configs/data"
    )
}

fn build_config_body() -> String {
    format!(
        "# Build Configuration\n\
         root = {}\n\
         encoding = {} {}\n\
         build-uid = wow\n",
        hexkey(ROOT_CK),
        hexkey(ENC_CK),
        hexkey(ENC_EK),
    )
}

fn cdn_config_body(index_len: usize) -> String {
    format!(
        "archives = {}\narchives-index-size = {index_len}\n",
        hexkey(ARCHIVE)
    )
}

/// Archive index: one 24-byte record plus the 12-byte trailer.
fn archive_index_body() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&[FILE_EK; 16]);
    data.extend_from_slice(&SIZE.to_be_bytes());
    data.extend_from_slice(&OFFSET.to_be_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&[0; 8]);
    data
}

/// Single-page encoding table with the fixture's two entries.
fn encoding_body() -> Vec<u8> {
    const PAGE_SIZE: usize = 1024;

    let mut page = Vec::new();
    for (ck, ek, size) in [
        (FILE_CK, FILE_EK, u64::from(SIZE)),
        (ROOT_CK, ROOT_EK, 512u64),
    ] {
        page.push(1); // key count
        page.extend_from_slice(&size.to_be_bytes()[3..]);
        page.extend_from_slice(&[ck; 16]);
        page.extend_from_slice(&[ek; 16]);
    }
    page.resize(PAGE_SIZE, 0);

    let mut data = Vec::new();
    data.extend_from_slice(b"EN");
    data.push(1); // version
    data.push(16); // ckey hash size
    data.push(16); // ekey hash size
    data.extend_from_slice(&1u16.to_be_bytes()); // ckey page size KiB
    data.extend_from_slice(&1u16.to_be_bytes()); // ekey page size KiB
    data.extend_from_slice(&1u32.to_be_bytes()); // ckey page count
    data.extend_from_slice(&0u32.to_be_bytes()); // ekey page count
    data.push(0); // unk
    data.extend_from_slice(&0u32.to_be_bytes()); // espec block size

    data.extend_from_slice(&[FILE_CK; 16]); // page table: first key
    data.extend_from_slice(Md5::digest(&page).as_slice());
    data.extend_from_slice(&page);
    data
}

/// New-format root table with a single enUS block mapping FID.
fn root_body() -> Vec<u8> {
    const EN_US: u32 = 0x2;
    const NO_NAME_HASH: u32 = 0x10000000;

    let mut data = Vec::new();
    data.extend_from_slice(b"TSFM");
    data.extend_from_slice(&1u32.to_le_bytes()); // total file count
    data.extend_from_slice(&0u32.to_le_bytes()); // named file count

    data.extend_from_slice(&1u32.to_le_bytes()); // num records
    data.extend_from_slice(&NO_NAME_HASH.to_le_bytes()); // content flags
    data.extend_from_slice(&EN_US.to_le_bytes()); // locale flags
    data.extend_from_slice(&(FID as i32).to_le_bytes()); // fid delta
    data.extend_from_slice(&[FILE_CK; 16]);
    data
}

fn payload_body() -> Vec<u8> {
    vec![0xfe; SIZE as usize]
}

/// Mount patch host endpoints.
async fn mount_patch(server: &MockServer, expect: u64) {
    Mock::given(method("GET"))
        .and(path("/wow/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(versions_body()))
        .expect(expect)
        .mount(server)
        .await;

    let host = server.uri().replace("http://", "");
    Mock::given(method("GET"))
        .and(path("/wow/cdns"))
        .respond_with(ResponseTemplate::new(200).set_body_string(cdns_body(&host)))
        .mount(server)
        .await;
}

/// Mount CDN config endpoints.
async fn mount_configs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/config/{}", prefixed(BUILD_CONFIG))))
        .respond_with(ResponseTemplate::new(200).set_body_string(build_config_body()))
        .mount(server)
        .await;

    let index_len = archive_index_body().len();
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/config/{}", prefixed(CDN_CONFIG))))
        .respond_with(ResponseTemplate::new(200).set_body_string(cdn_config_body(index_len)))
        .mount(server)
        .await;
}

/// Mount content-addressed data endpoints. `expect` bounds how many
/// network fetches of each cacheable artifact are tolerated.
async fn mount_data(server: &MockServer, expect: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/data/{}.index", prefixed(ARCHIVE))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_index_body()))
        .expect(expect)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/data/{}", prefixed(ENC_EK))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(encoding_body()))
        .expect(expect)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/data/{}", prefixed(ROOT_EK))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(root_body()))
        .expect(expect)
        .mount(server)
        .await;
}

/// Mount the archive body behind its inclusive range header.
async fn mount_archive_range(server: &MockServer, expect: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/data/{}", prefixed(ARCHIVE))))
        .and(header(
            "range",
            format!("bytes={}-{}", OFFSET, OFFSET + SIZE - 1),
        ))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(payload_body()))
        .expect(expect)
        .mount(server)
        .await;
}

fn client(server: &MockServer, root: &TempDir, region: Region) -> CascRemote {
    CascRemote::new(region, root.path(), Arc::new(IdentityDecoder))
        .unwrap()
        .with_products(vec!["wow".to_string()])
        .with_patch_base_url(server.uri())
}

#[tokio::test]
async fn cold_load_resolves_a_file() {
    let server = MockServer::start().await;
    mount_patch(&server, 1).await;
    mount_configs(&server).await;
    mount_data(&server, 1).await;
    mount_archive_range(&server, 1).await;

    let user_root = TempDir::new().unwrap();

    let steps = Arc::new(AtomicUsize::new(0));
    let steps2 = Arc::clone(&steps);
    let progress: ProgressFn = Arc::new(move |current, total, _label| {
        assert_eq!(total, 10);
        steps2.store(current, Ordering::SeqCst);
    });

    let mut casc = client(&server, &user_root, Region::US).with_progress(progress);

    casc.init().await.unwrap();
    assert_eq!(casc.builds().len(), 1);
    assert_eq!(casc.builds()[0].product, "wow");
    assert_eq!(casc.builds()[0].build_id, 60000);

    casc.load(0).await.unwrap();
    assert_eq!(steps.load(Ordering::SeqCst), 10);

    assert_eq!(casc.archive_entry_count(), 1);
    assert_eq!(casc.encoding_entry_count(), 2);
    assert_eq!(casc.root_entry_count(), 1);

    let blob = casc.get_file(FID).await.unwrap();
    assert_eq!(blob.len(), SIZE as usize);
    assert_eq!(blob.ekey, EncodingKey::new([FILE_EK; 16]));
    assert_eq!(blob.data, payload_body());

    // The blob size matches the archive index entry for its key.
    let entry = casc.archive_entry(&blob.ekey).unwrap();
    assert_eq!(entry.size as usize, blob.len());
    assert_eq!(entry.offset, OFFSET);

    // A second resolution is served from cache; the range mock's
    // expect(1) would trip otherwise.
    let again = casc.get_file(FID).await.unwrap();
    assert_eq!(again.data, blob.data);

    // Unknown file data IDs are NotFound, and benign.
    let missing = casc.get_file(999_999).await.unwrap_err();
    assert!(missing.is_not_found());

    server.verify().await;
}

#[tokio::test]
async fn warm_load_skips_cached_content() {
    let server = MockServer::start().await;
    // Two inits and two loads, but every cacheable artifact is fetched
    // exactly once.
    mount_patch(&server, 2).await;
    mount_configs(&server).await;
    mount_data(&server, 1).await;
    mount_archive_range(&server, 1).await;

    let user_root = TempDir::new().unwrap();

    let mut cold = client(&server, &user_root, Region::US);
    cold.init().await.unwrap();
    cold.load(0).await.unwrap();
    cold.get_file(FID).await.unwrap();
    drop(cold);

    let mut warm = client(&server, &user_root, Region::US);
    warm.init().await.unwrap();
    warm.load(0).await.unwrap();

    let blob = warm.get_file(FID).await.unwrap();
    assert_eq!(blob.len(), SIZE as usize);

    server.verify().await;
}

#[tokio::test]
async fn cache_layout_matches_cdn_artifacts() {
    let server = MockServer::start().await;
    mount_patch(&server, 1).await;
    mount_configs(&server).await;
    mount_data(&server, 1).await;
    mount_archive_range(&server, 1).await;

    let user_root = TempDir::new().unwrap();
    let mut casc = client(&server, &user_root, Region::US);
    casc.init().await.unwrap();
    casc.load(0).await.unwrap();
    casc.get_file(FID).await.unwrap();

    let build_dir = user_root.path().join(hexkey(BUILD_CONFIG));
    assert_eq!(
        std::fs::read(build_dir.join("encoding")).unwrap(),
        encoding_body()
    );
    assert_eq!(std::fs::read(build_dir.join("root")).unwrap(), root_body());
    assert_eq!(
        std::fs::read(build_dir.join(format!("indexes/{}.index", hexkey(ARCHIVE)))).unwrap(),
        archive_index_body()
    );
    assert_eq!(
        std::fs::read(build_dir.join(format!("data/{}", hexkey(FILE_EK)))).unwrap(),
        payload_body()
    );
}

#[tokio::test]
async fn missing_region_is_a_configuration_error() {
    let server = MockServer::start().await;
    mount_patch(&server, 1).await;

    let user_root = TempDir::new().unwrap();
    let mut casc = client(&server, &user_root, Region::EU);

    // The fixture only lists a us row: init succeeds with no builds.
    casc.init().await.unwrap();
    assert!(casc.builds().is_empty());

    let err = casc.load(0).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
}

#[tokio::test]
async fn per_file_fetch_failure_leaves_pipeline_usable() {
    let server = MockServer::start().await;
    mount_patch(&server, 1).await;
    mount_configs(&server).await;
    mount_data(&server, 1).await;

    // First range request 404s; the retry policy does not retry client
    // errors, so the first get_file fails cleanly.
    Mock::given(method("GET"))
        .and(path(format!("/tpr/wow/data/{}", prefixed(ARCHIVE))))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_archive_range(&server, 1).await;

    let user_root = TempDir::new().unwrap();
    let mut casc = client(&server, &user_root, Region::US);
    casc.init().await.unwrap();
    casc.load(0).await.unwrap();

    let err = casc.get_file(FID).await.unwrap_err();
    assert!(matches!(err, Error::ContentNotFound { .. }), "{err:?}");

    // The maps are intact; the same file resolves on the next attempt.
    let blob = casc.get_file(FID).await.unwrap();
    assert_eq!(blob.len(), SIZE as usize);
}

#[tokio::test]
async fn cancellation_aborts_before_the_next_stage() {
    let server = MockServer::start().await;
    mount_patch(&server, 1).await;

    let user_root = TempDir::new().unwrap();
    let mut casc = client(&server, &user_root, Region::US);
    casc.init().await.unwrap();

    casc.cancellation_token().cancel();
    let err = casc.load(0).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn cache_write_failure_is_tolerated() {
    use std::os::unix::fs::PermissionsExt;

    let server = MockServer::start().await;
    mount_patch(&server, 1).await;
    mount_configs(&server).await;
    mount_data(&server, 1).await;
    // Both resolutions re-fetch because neither store lands.
    mount_archive_range(&server, 2).await;

    let user_root = TempDir::new().unwrap();
    let mut casc = client(&server, &user_root, Region::US);
    casc.init().await.unwrap();
    casc.load(0).await.unwrap();

    let data_dir = user_root.path().join(hexkey(BUILD_CONFIG)).join("data");
    let writable = std::fs::metadata(&data_dir).unwrap().permissions();
    std::fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    let first = casc.get_file(FID).await.unwrap();
    assert_eq!(first.data, payload_body());

    let second = casc.get_file(FID).await.unwrap();
    assert_eq!(second.data, payload_body());

    std::fs::set_permissions(&data_dir, writable).unwrap();
    server.verify().await;
}
