#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Write;
use tempfile::NamedTempFile;
use zim_rs::{Archive, SuggestionSearcher};

fuzz_target!(|data: &[u8]| {
    // Anything shorter than the header is rejected before mapping
    if data.len() < 80 {
        return;
    }

    let mut temp_file = match NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if temp_file.write_all(data).is_err() || temp_file.flush().is_err() {
        return;
    }

    // Opening and every read below must fail cleanly, never panic
    let archive = match Archive::open(temp_file.path()) {
        Ok(a) => a,
        Err(_) => return,
    };

    for entry in archive.entries_by_path().take(256) {
        let Ok(entry) = entry else { continue };
        let _ = entry.get_redirect_entry();
        if let Ok(item) = entry.get_item(true) {
            let _ = item.content();
            let _ = item.direct_access();
        }
    }
    for entry in archive.entries_by_title().take(64) {
        let _ = entry;
    }

    let _ = archive.get_entry_by_path("index.html");
    let _ = archive.get_entry_by_path("");
    let _ = archive.get_entry_by_path("A/Main_Page");
    let _ = archive.get_entry_by_title("Main Page");
    let _ = archive.get_entry_by_id(u32::MAX);
    let _ = archive.main_entry();
    let _ = archive.metadata_keys();
    let _ = archive.illustration_infos();
    let _ = archive.article_count();
    let _ = archive.media_count();
    let _ = archive.check();

    if let Ok(suggester) = SuggestionSearcher::new(&archive) {
        if let Ok(search) = suggester.suggest("a") {
            let _ = search.results(0, 10);
        }
    }
});
