//! Generate seed corpus for fuzzing

use std::fs;
use zim_rs::{Compression, Creator, CreatorConfig, Hints, StaticItem};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let corpus_dir = "fuzz/corpus/fuzz_archive_parse";
    fs::create_dir_all(corpus_dir)?;

    println!("Generating seed corpus...");

    // Seed 1: Empty archive
    {
        let path = format!("{}/seed_empty.zim", corpus_dir);
        Creator::create(&path, CreatorConfig::new())?.close()?;
        println!("Generated: {}", path);
    }

    // Seed 2: One item per compression method
    for compression in [Compression::None, Compression::Zstd, Compression::Lzma] {
        let path = format!("{}/seed_single_{}.zim", corpus_dir, compression);
        let mut creator = Creator::create(&path, CreatorConfig::new().with_compression(compression))?;
        creator.add_item(&StaticItem::new("test.txt", "Test", "text/plain", "Hello, World!"))?;
        creator.close()?;
        println!("Generated: {}", path);
    }

    // Seed 3: Redirects, metadata and a main page
    {
        let path = format!("{}/seed_redirects.zim", corpus_dir);
        let mut creator = Creator::create(&path, CreatorConfig::new())?;
        creator.add_item(&StaticItem::new("home", "Home", "text/html", "<p>home</p>"))?;
        creator.add_redirection("start", "Start", "home", Hints::default())?;
        creator.add_metadata("Title", "Seed")?;
        creator.add_illustration(48u32, b"\x89PNG".to_vec())?;
        creator.set_main_path("home")?;
        creator.close()?;
        println!("Generated: {}", path);
    }

    // Seed 4: Indexed articles
    {
        let path = format!("{}/seed_indexed.zim", corpus_dir);
        let mut creator = Creator::create(&path, CreatorConfig::new().with_indexing(true, "eng"))?;
        for i in 0..10 {
            let item = StaticItem::new(
                &format!("article{}", i),
                &format!("Article {}", i),
                "text/html",
                format!("<html><body><p>Article number {} about fuzzing</p></body></html>", i),
            )
            .with_hints(Hints::front_article());
            creator.add_item(&item)?;
        }
        creator.close()?;
        println!("Generated: {}", path);
    }

    println!("\nSeed corpus generated in {}", corpus_dir);
    Ok(())
}
