use bag_builder::{compress_dir, make_bag, Bag, BagInfo};
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::PathBuf;

const REFID: &str = "b90862f3baceaae3b7418c78f9d50d52";

fn digitized_object(root: &std::path::Path) -> PathBuf {
    let dir = root.join(REFID);
    fs::create_dir_all(dir.join("master")).unwrap();
    fs::create_dir_all(dir.join("service_edited")).unwrap();
    fs::write(dir.join("master").join(format!("{}_001.tif", REFID)), vec![7u8; 4096]).unwrap();
    fs::write(dir.join("master").join(format!("{}_002.tif", REFID)), vec![9u8; 2048]).unwrap();
    fs::write(
        dir.join("service_edited").join(format!("{}_001.tif", REFID)),
        vec![1u8; 1024],
    )
    .unwrap();
    dir
}

#[test]
fn test_bag_metadata_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = digitized_object(tmp.path());

    let info = BagInfo::new()
        .with_tag("ArchivesSpace-URI", "/repositories/2/archival_objects/1234")
        .with_tag("Start-Date", "1999-01-01")
        .with_tag("End-Date", "2000-12-31")
        .with_tag("Origin", "digitization")
        .with_tags("Rights-ID", ["1", "2"])
        .with_tag("BagIt-Profile-Identifier", "zorya_bagit_profile.json");
    make_bag(&dir, &info).unwrap();

    let bag = Bag::open(&dir).unwrap();
    assert!(bag.is_valid());
    assert_eq!(bag.info().get("Origin"), Some("digitization"));
    assert_eq!(
        bag.info().get("ArchivesSpace-URI"),
        Some("/repositories/2/archival_objects/1234")
    );
    assert_eq!(bag.info().get_all("Rights-ID"), vec!["1", "2"]);
    assert_eq!(bag.info().get("Payload-Oxum"), Some("7168.3"));
}

#[test]
fn test_compressed_bag_contains_every_tag_and_payload_file() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = digitized_object(tmp.path());
    make_bag(&dir, &BagInfo::new().with_tag("Origin", "digitization")).unwrap();

    let compressed = compress_dir(&dir).unwrap();
    assert!(compressed.is_file());
    assert!(!dir.exists());

    let mut archive = tar::Archive::new(GzDecoder::new(File::open(&compressed).unwrap()));
    let entries: BTreeSet<String> = archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();

    for name in [
        "bagit.txt",
        "bag-info.txt",
        "manifest-sha256.txt",
        "tagmanifest-sha512.txt",
        "data/master/b90862f3baceaae3b7418c78f9d50d52_001.tif",
        "data/service_edited/b90862f3baceaae3b7418c78f9d50d52_001.tif",
    ] {
        let expected = format!("{}/{}", REFID, name);
        assert!(entries.contains(&expected), "{} missing from archive", expected);
    }

    let unpacked = tmp.path().join("unpacked");
    tar::Archive::new(GzDecoder::new(File::open(&compressed).unwrap()))
        .unpack(&unpacked)
        .unwrap();
    let bag = Bag::open(unpacked.join(REFID)).unwrap();
    bag.validate().unwrap();
}
