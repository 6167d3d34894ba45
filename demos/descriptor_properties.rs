//! Example demonstrating descriptors built from properties.
//!
//! No network access is needed: the example only shows in which order the
//! targets of each group policy are tried.
//!
//! Run with: `cargo run --example descriptor_properties`

use callover::{Descriptor, DescriptorBuilder, Properties};

const CONFIG: &str = "
# Primary data center first, then the backups in turn
catalog         = group, ordered, primary, backups
catalog.primary = service, http://primary.example.com/catalog, 5000, 1000
catalog.backups = group, roundrobin, b1, b2, b3
catalog.b1      = service, http://b1.example.com/catalog, 8000
catalog.b2      = service, http://b2.example.com/catalog, 8000
catalog.b3      = service, http://b3.example.com/catalog, 8000

# Any of the search nodes will do
search          = group, random, s1, s2
search.s1       = service, https://s1.example.com/search, 2000, 500, 1500
search.s2       = service, https://s2.example.com/search, 2000, 500, 1500
";

fn print_order(name: &str, descriptor: &Descriptor, rounds: usize) {
    println!("=== {} ({} targets) ===", name, descriptor.target_count());
    for round in 1..=rounds {
        let urls: Vec<_> = descriptor.iterate_targets().map(|t| t.url()).collect();
        println!("  round {}: {}", round, urls.join(" -> "));
    }
    println!();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("callover=debug")
        .init();

    let properties: Properties = CONFIG.parse()?;

    let catalog = DescriptorBuilder::build(&properties, "catalog")?;
    print_order("catalog", &catalog, 3);

    let search = DescriptorBuilder::build(&properties, "search")?;
    print_order("search", &search, 3);

    for target in catalog.iterate_targets() {
        println!("{}", target);
    }

    let crc = crc_of(&catalog, "http://b2.example.com/catalog");
    if let Some(target) = crc.and_then(|crc| catalog.target_by_crc(crc)) {
        println!("\nFound by CRC {:08x}: {}", target.crc(), target.url());
    }

    println!("\n=== Invalid configuration ===");
    let broken = Properties::new().with_property("broken", "service, http://a.example.com/");
    match DescriptorBuilder::build(&broken, "broken") {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("{}", e),
    }

    Ok(())
}

fn crc_of(descriptor: &Descriptor, url: &str) -> Option<u32> {
    descriptor
        .iterate_targets()
        .find(|t| t.url() == url)
        .map(|t| t.crc())
}
