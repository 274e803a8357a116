// SPDX-License-Identifier: MIT
//! Basic usage example for the SPDF stream table
//!
//! Fills a table, overflows it, empties it again, then saves and reloads it.
//! Set `RUST_LOG=spdf=debug` to follow every slot change.

use spdf::{reader, writer, StreamRecord, StreamTable, TableConfig, TableError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== SPDF Stream Table - Basic Usage ===\n");

    // Step 1: Create the table
    println!("1. Creating stream table...");
    let config = TableConfig::from_env()?;
    config.validate()?;
    let table = StreamTable::from_config(&config)?;
    println!("   Table {} with {} slots", table.id(), table.capacity());
    println!("   Id strategy: {:?}", config.id_strategy);

    // Step 2: Fill every data slot
    println!("\n2. Adding {} streams...", table.data_capacity());
    for i in 0..table.data_capacity() {
        table.add(StreamRecord::new(i.to_le_bytes().to_vec()))?;
    }
    println!("   Count: {}/{}", table.count(), table.capacity());
    println!("   XRef offset: {}", table.cross_reference_offset());

    // Step 3: One more than fits
    println!("\n3. Adding one stream past capacity...");
    match table.add(StreamRecord::new(0xdead_beef_u32.to_le_bytes().to_vec())) {
        Err(e @ TableError::Full { .. }) => println!("   Rejected as expected: {}", e),
        other => println!("   Unexpected result: {:?}", other),
    }
    println!("\n{}", table.snapshot());

    // Step 4: Save and reload while the table is full
    println!("\n4. Writing to file...");
    let output_path = std::env::temp_dir().join("spdf_basic_usage.spdf");
    let written = writer::save_to_file(&table, &output_path)?;
    println!("   Written {} bytes to: {}", written, output_path.display());

    println!("\n5. Reading from file...");
    let loaded = reader::load_from_file(&output_path)?;
    println!("   Loaded table {} with {} streams", loaded.id(), loaded.data_count());
    println!(
        "   XRef offsets match: {}",
        loaded.cross_reference_offset() == table.cross_reference_offset()
    );

    // Step 6: Remove every data stream
    println!("\n6. Removing all streams...");
    for id in table.ids() {
        table.remove(id.as_str())?;
    }
    println!("   Count: {}/{}", table.count(), table.capacity());

    // Step 7: Removing a record that was never added
    println!("\n7. Removing a stream that was never added...");
    match table.remove_record(&StreamRecord::new(0xdead_beef_u32.to_le_bytes().to_vec())) {
        Err(e) => println!("   Rejected as expected: {}", e),
        Ok(()) => println!("   Unexpectedly removed"),
    }
    println!("\n{}", table.snapshot());

    // Step 8: Statistics
    println!("\n8. Statistics of the loaded table:");
    println!("{}", serde_json::to_string_pretty(&loaded.stats())?);

    std::fs::remove_file(&output_path)?;
    println!("\n=== Example completed successfully ===");

    Ok(())
}
