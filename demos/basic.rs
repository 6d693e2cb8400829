/// Basic example: write a small archive, then read it back
///
/// Run with: cargo run --example basic
use std::error::Error;
use zim_rs::{Archive, Creator, CreatorConfig, Hints, StaticItem};

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== zim-rs Basic Example ===\n");

    println!("1. Creating archive...");
    create_archive()?;

    println!("\n2. Reading from archive...");
    read_archive()?;

    println!("\n✓ Example complete!");
    Ok(())
}

fn create_archive() -> Result<(), Box<dyn Error>> {
    let mut creator = Creator::create("example_basic.zim", CreatorConfig::new())?;

    creator.add_item(
        &StaticItem::new(
            "index.html",
            "Welcome",
            "text/html",
            "<html><body><h1>Welcome</h1><p>See the <a href=\"notes\">notes</a>.</p></body></html>",
        )
        .with_hints(Hints::front_article()),
    )?;
    creator.add_item(
        &StaticItem::new("notes", "Notes", "text/plain", "Notes for the basic example.")
            .with_hints(Hints::front_article()),
    )?;
    creator.add_redirection("home", "Home", "index.html", Hints::default())?;

    creator.add_metadata("Title", "Basic example")?;
    creator.add_metadata("Language", "eng")?;
    creator.add_metadata("Creator", "zim-rs")?;
    creator.add_metadata("Publisher", "zim-rs")?;
    creator.add_metadata("Description", "A two page archive")?;
    creator.add_metadata("Date", "2024-01-15")?;
    creator.add_metadata("Name", "zim-rs_basic_example")?;
    creator.set_main_path("index.html")?;

    creator.close()?;
    println!("   ✓ Archive created: example_basic.zim");
    Ok(())
}

fn read_archive() -> Result<(), Box<dyn Error>> {
    let archive = Archive::open("example_basic.zim")?;
    println!("   UUID: {}", archive.uuid());
    println!("   Entries: {} ({} articles)", archive.entry_count(), archive.article_count());
    println!("   Checksum valid: {}", archive.check());

    println!("\n   Entries by title:");
    for entry in archive.entries_by_title() {
        let entry = entry?;
        let kind = if entry.is_redirect() { "redirect" } else { "item" };
        println!("     - {} ({}, {})", entry.title(), entry.path(), kind);
    }

    let main = archive.main_entry()?.get_item(true)?;
    println!("\n   Main page {} [{}]:", main.path(), main.mimetype());
    println!("     {}", String::from_utf8_lossy(&main.content()?));

    let home = archive.get_entry_by_path("home")?;
    println!("\n   'home' redirects to: {}", home.get_redirect_entry()?.path());

    println!("\n   Metadata:");
    for key in archive.metadata_keys()? {
        println!("     {} = {}", key, String::from_utf8_lossy(&archive.metadata(&key)?));
    }
    Ok(())
}
