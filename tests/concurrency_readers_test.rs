//! Concurrent readers
//!
//! One `Archive` shared across threads, and many independent handles on the
//! same file, must return the same bytes as a single-threaded reader.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tempfile::{tempdir, TempDir};
use zim_rs::{Archive, Creator, CreatorConfig, Hints, Query, Searcher, StaticItem};

/// Helper: archive with N small articles spread over several clusters
fn create_archive_with_files(dir: &TempDir, file_count: usize) -> PathBuf {
    let path = dir.path().join("concurrent.zim");
    let config = CreatorConfig::new()
        .with_cluster_size(2048)
        .with_workers(4)
        .with_indexing(true, "eng");
    let mut creator = Creator::create(&path, config).unwrap();
    for i in 0..file_count {
        let content = format!("<html><body><p>data{} shared words</p></body></html>", i);
        let item = StaticItem::new(&format!("file{}.html", i), &format!("File {}", i), "text/html", content)
            .with_hints(Hints::front_article());
        creator.add_item(&item).unwrap();
    }
    creator.close().unwrap();
    path
}

fn expected(i: usize) -> String {
    format!("<html><body><p>data{} shared words</p></body></html>", i)
}

#[test]
fn test_shared_archive_across_threads() {
    let dir = tempdir().unwrap();
    let path = create_archive_with_files(&dir, 200);
    let archive = Archive::open(&path).unwrap();
    archive.set_cluster_cache_max_size(4);

    let handles: Vec<_> = (0..16)
        .map(|thread_id| {
            let archive = archive.clone();
            thread::spawn(move || {
                for round in 0..5 {
                    for i in (thread_id + round..200).step_by(7) {
                        let item = archive
                            .get_entry_by_path(&format!("file{}.html", i))
                            .unwrap()
                            .get_item(true)
                            .unwrap();
                        assert_eq!(&item.content().unwrap()[..], expected(i).as_bytes());
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert!(archive.cluster_cache_current_size() <= 4);
}

#[test]
fn test_independent_handles() {
    let dir = tempdir().unwrap();
    let path = Arc::new(create_archive_with_files(&dir, 100));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let path = Arc::clone(&path);
            thread::spawn(move || {
                let archive = Archive::open(path.as_path()).unwrap();
                assert_eq!(archive.entry_count(), 100);
                for i in 0..100 {
                    let entry = archive.get_entry_by_title(&format!("File {}", i)).unwrap();
                    let content = entry.get_item(true).unwrap().content().unwrap();
                    assert_eq!(&content[..], expected(i).as_bytes());
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_concurrent_search() {
    let dir = tempdir().unwrap();
    let path = create_archive_with_files(&dir, 50);
    let archive = Archive::open(&path).unwrap();
    let searcher = Searcher::new(&archive).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let searcher = searcher.clone();
            thread::spawn(move || {
                let search = searcher.search(&Query::new().set_query("shared words")).unwrap();
                assert_eq!(search.estimated_matches(), 50);
                search.paths(0, 50).unwrap()
            })
        })
        .collect();

    let results: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for paths in &results {
        assert_eq!(paths, &results[0]);
    }
}
