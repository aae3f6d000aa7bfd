//! Integration tests against captures of real manifest shapes.

use casc_bpsv::BpsvDocument;

/// A `versions` response as served by the patch hosts.
const VERSIONS: &str = "\
Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16
## seqn = 2241282
us|e0ba45eb1af1166c6bd9ab2d3a9143b3|48c7c7dfe4ba6df9b4e8a1a0d4e45a94||61491|11.0.7.58238|53020d32e1a25648c8e1eafd5771935f
eu|e0ba45eb1af1166c6bd9ab2d3a9143b3|48c7c7dfe4ba6df9b4e8a1a0d4e45a94||61491|11.0.7.58238|53020d32e1a25648c8e1eafd5771935f
kr|e0ba45eb1af1166c6bd9ab2d3a9143b3|48c7c7dfe4ba6df9b4e8a1a0d4e45a94||61491|11.0.7.58238|53020d32e1a25648c8e1eafd5771935f";

/// A `cdns` response. The `Hosts` column is a space-separated list inside
/// one field.
const CDNS: &str = "\
Name!STRING:0|Path!STRING:0|Hosts!STRING:0|Servers!STRING:0|ConfigPath!STRING:0
## seqn = 2241032
us|tpr/wow|blzddist1-a.akamaihd.net level3.blizzard.com|http://blzddist1-a.akamaihd.net/?maxhosts=4|tpr/configs/data
eu|tpr/wow|blzddist1-a.akamaihd.net eu.cdn.blizzard.com||tpr/configs/data";

#[test]
fn parse_versions_manifest() {
    let doc = BpsvDocument::parse(VERSIONS).unwrap();

    assert_eq!(doc.sequence_number(), Some(2241282));
    assert_eq!(doc.rows().len(), 3);

    let schema = doc.schema();
    let us = &doc.rows()[0];
    assert_eq!(us.get_by_name("Region", schema), Some("us"));
    assert_eq!(
        us.get_by_name("BuildConfig", schema),
        Some("e0ba45eb1af1166c6bd9ab2d3a9143b3")
    );
    assert_eq!(us.get_by_name("BuildId", schema), Some("61491"));
    assert_eq!(us.get_by_name("KeyRing", schema), Some(""));
    assert_eq!(us.get_by_name("VersionsName", schema), Some("11.0.7.58238"));
}

#[test]
fn parse_cdns_manifest() {
    let doc = BpsvDocument::parse(CDNS).unwrap();

    assert_eq!(doc.rows().len(), 2);

    let schema = doc.schema();
    let us = &doc.rows()[0];
    assert_eq!(us.get_by_name("Path", schema), Some("tpr/wow"));

    let hosts: Vec<&str> = us
        .get_by_name("Hosts", schema)
        .unwrap()
        .split_whitespace()
        .collect();
    assert_eq!(
        hosts,
        vec!["blzddist1-a.akamaihd.net", "level3.blizzard.com"]
    );
}

#[test]
fn field_order_is_significant() {
    let doc = BpsvDocument::parse(CDNS).unwrap();
    let names: Vec<&str> = doc
        .schema()
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["Name", "Path", "Hosts", "Servers", "ConfigPath"]);
}
