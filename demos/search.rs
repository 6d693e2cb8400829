/// Example of full-text search and title suggestions
///
/// Run with: cargo run --example search
use std::error::Error;
use zim_rs::{Archive, Creator, CreatorConfig, Hints, Query, Searcher, StaticItem, SuggestionSearcher};

const ARTICLES: [(&str, &str, &str); 4] = [
    ("Rust", "Rust", "Rust is a systems programming language focused on safety."),
    ("Rust_(fungus)", "Rust (fungus)", "Rusts are plant pathogens infecting many crops."),
    ("Ruby", "Ruby", "Ruby is a dynamic programming language."),
    ("Iron", "Iron", "Iron oxidizes and forms rust when exposed to water."),
];

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== zim-rs Search Example ===\n");

    let config = CreatorConfig::new().with_indexing(true, "eng");
    let mut creator = Creator::create("example_search.zim", config)?;
    for (path, title, text) in ARTICLES {
        let html = format!("<html><body><h1>{}</h1><p>{}</p></body></html>", title, text);
        creator.add_item(&StaticItem::new(path, title, "text/html", html).with_hints(Hints::front_article()))?;
    }
    creator.close()?;
    println!("✓ Created example_search.zim\n");

    let archive = Archive::open("example_search.zim")?;

    let searcher = Searcher::new(&archive)?;
    for text in ["rust", "programming language", "pathogens crops"] {
        let search = searcher.search(&Query::new().set_query(text))?;
        println!("Search {:?}: {} matches", text, search.estimated_matches());
        for result in search.results(0, 10)? {
            println!("   {:.3}  {:<15} {}", result.score, result.path, result.snippet);
        }
    }

    let suggester = SuggestionSearcher::new(&archive)?;
    for text in ["ru", "rust f"] {
        let suggestions = suggester.suggest(text)?;
        println!("\nSuggest {:?}:", text);
        for result in suggestions.results(0, 5)? {
            println!("   {:<15} {}", result.path, result.snippet);
        }
    }

    println!("\n✓ Example complete!");
    Ok(())
}
