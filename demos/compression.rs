/// Example comparing cluster compression methods
///
/// Run with: cargo run --example compression
use std::error::Error;
use std::fs;
use zim_rs::{Archive, Compression, Creator, CreatorConfig, StaticItem};

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== zim-rs Compression Example ===\n");

    let medium_text = "Lorem ipsum ".repeat(500);
    let large_text = "The archive stores clusters of small items together. ".repeat(2000);
    let image = vec![0x42u8; 20_000];

    println!("1. Creating archives with different compression methods...\n");
    let methods = [Compression::None, Compression::Lzma, Compression::Zstd];
    for compression in methods {
        let path = format!("example_{}.zim", compression);
        let config = CreatorConfig::new().with_compression(compression);
        let mut creator = Creator::create(&path, config)?;
        creator.add_item(&StaticItem::new("medium.txt", "Medium", "text/plain", medium_text.clone()))?;
        creator.add_item(&StaticItem::new("large.txt", "Large", "text/plain", large_text.clone()))?;
        // Images are never recompressed
        creator.add_item(&StaticItem::new("image.png", "Image", "image/png", image.clone()))?;
        creator.close()?;
        println!("   ✓ Created: {}", path);
    }

    println!("\n2. Comparing compression results:");
    let none_size = fs::metadata("example_none.zim")?.len();
    for compression in methods {
        let path = format!("example_{}.zim", compression);
        let size = fs::metadata(&path)?.len();
        println!(
            "     {:<5} {:>8} bytes ({:.1}% of uncompressed)",
            compression.name(),
            size,
            (size as f64 / none_size as f64) * 100.0
        );
    }

    println!("\n3. Verifying decompression:");
    for compression in methods {
        let archive = Archive::open(format!("example_{}.zim", compression))?;
        let large = archive.get_entry_by_path("large.txt")?.get_item(true)?;
        let image = archive.get_entry_by_path("image.png")?.get_item(true)?;
        println!(
            "     ✓ {}: large.txt {} bytes, image.png stored at offset {:?}",
            compression,
            large.content()?.len(),
            image.direct_access()?
        );
    }

    println!("\n✓ Example complete!");
    Ok(())
}
