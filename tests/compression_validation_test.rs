//! Cluster compression selection
//!
//! Text goes into compressed clusters using the configured algorithm.
//! Already-compressed media stays in uncompressed clusters, where items
//! can be read in place.

use std::path::PathBuf;
use tempfile::{tempdir, TempDir};
use zim_rs::{Archive, Compression, Creator, CreatorConfig, Hints, StaticItem};

/// Helper: highly repetitive text that compresses well
fn repetitive_text(len: usize) -> String {
    "The quick brown fox jumps over the lazy dog. "
        .repeat(len / 45 + 1)[..len]
        .to_string()
}

/// Helper: bytes that do not compress
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn build(dir: &TempDir, name: &str, compression: Compression, items: &[StaticItem]) -> PathBuf {
    let path = dir.path().join(name);
    let config = CreatorConfig::new().with_compression(compression);
    let mut creator = Creator::create(&path, config).unwrap();
    for item in items {
        creator.add_item(item).unwrap();
    }
    creator.close().unwrap();
    path
}

#[test]
fn test_text_shrinks_under_each_algorithm() {
    let dir = tempdir().unwrap();
    let text = repetitive_text(200_000);
    let items = [StaticItem::new("text.txt", "Text", "text/plain", text.clone())];

    let plain = build(&dir, "none.zim", Compression::None, &items);
    let plain_size = std::fs::metadata(&plain).unwrap().len();
    assert!(plain_size > 200_000);

    for compression in [Compression::Zstd, Compression::Lzma] {
        let path = build(&dir, &format!("{}.zim", compression), compression, &items);
        let size = std::fs::metadata(&path).unwrap().len();
        assert!(
            size < plain_size / 10,
            "{} archive is {} bytes, uncompressed is {}",
            compression,
            size,
            plain_size
        );

        let archive = Archive::open(&path).unwrap();
        assert!(archive.check());
        let item = archive.get_entry_by_path("text.txt").unwrap().get_item(true).unwrap();
        assert_eq!(item.size().unwrap(), text.len() as u64);
        assert_eq!(&item.content().unwrap()[..], text.as_bytes());
        assert_eq!(item.direct_access().unwrap(), None);
    }
}

#[test]
fn test_uncompressed_archive_allows_direct_access() {
    let dir = tempdir().unwrap();
    let text = repetitive_text(5000);
    let path = build(
        &dir,
        "none.zim",
        Compression::None,
        &[StaticItem::new("text.txt", "Text", "text/plain", text.clone())],
    );

    let archive = Archive::open(&path).unwrap();
    let item = archive.get_entry_by_path("text.txt").unwrap().get_item(true).unwrap();
    let offset = item.direct_access().unwrap().unwrap() as usize;

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[offset..offset + text.len()], text.as_bytes());
}

#[test]
fn test_media_stored_uncompressed() {
    let dir = tempdir().unwrap();
    let image = noise(10_000);
    let path = build(
        &dir,
        "media.zim",
        Compression::Zstd,
        &[
            StaticItem::new("logo.png", "Logo", "image/png", image.clone()),
            StaticItem::new("page.html", "Page", "text/html", "<p>page</p>"),
        ],
    );

    let archive = Archive::open(&path).unwrap();
    let logo = archive.get_entry_by_path("logo.png").unwrap().get_item(true).unwrap();
    let offset = logo.direct_access().unwrap().unwrap() as usize;
    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[offset..offset + image.len()], &image[..]);
    assert_eq!(&logo.content().unwrap()[..], &image[..]);

    let page = archive.get_entry_by_path("page.html").unwrap().get_item(true).unwrap();
    assert_eq!(page.direct_access().unwrap(), None);
}

#[test]
fn test_compress_hint_overrides_mimetype() {
    let dir = tempdir().unwrap();
    let text = repetitive_text(3000);
    let path = build(
        &dir,
        "hints.zim",
        Compression::Zstd,
        &[
            StaticItem::new("raw.txt", "Raw", "text/plain", text.clone())
                .with_hints(Hints::default().with_compress(false)),
            StaticItem::new("packed.svg", "Packed", "image/x-custom", text.clone())
                .with_hints(Hints::default().with_compress(true)),
        ],
    );

    let archive = Archive::open(&path).unwrap();
    let raw = archive.get_entry_by_path("raw.txt").unwrap().get_item(true).unwrap();
    assert!(raw.direct_access().unwrap().is_some());
    assert_eq!(&raw.content().unwrap()[..], text.as_bytes());

    let packed = archive.get_entry_by_path("packed.svg").unwrap().get_item(true).unwrap();
    assert_eq!(packed.direct_access().unwrap(), None);
    assert_eq!(&packed.content().unwrap()[..], text.as_bytes());
}

#[test]
fn test_many_items_across_clusters() {
    let dir = tempdir().unwrap();
    let items: Vec<StaticItem> = (0..300)
        .map(|i| {
            StaticItem::new(
                &format!("doc{:03}.txt", i),
                &format!("Doc {}", i),
                "text/plain",
                format!("{} {}", i, repetitive_text(700 + i)),
            )
        })
        .collect();

    for compression in [Compression::None, Compression::Zstd, Compression::Lzma] {
        let path = dir.path().join(format!("many-{}.zim", compression));
        let config = CreatorConfig::new()
            .with_compression(compression)
            .with_cluster_size(16 * 1024);
        let mut creator = Creator::create(&path, config).unwrap();
        for item in &items {
            creator.add_item(item).unwrap();
        }
        creator.close().unwrap();

        let archive = Archive::open(&path).unwrap();
        assert!(archive.header().cluster_count > 2, "{}", compression);
        for i in (0..300).step_by(37) {
            let content = archive
                .get_entry_by_path(&format!("doc{:03}.txt", i))
                .unwrap()
                .get_item(true)
                .unwrap()
                .content()
                .unwrap();
            assert_eq!(
                String::from_utf8(content.to_vec()).unwrap(),
                format!("{} {}", i, repetitive_text(700 + i))
            );
        }
    }
}
