//! Example: Resolve a scan over a local Hive warehouse (no metastore needed).
//!
//! Builds a small partitioned, bucketed ORC table in a temporary directory,
//! registers it in the in-memory metastore and plans a filtered scan.
//!
//! Run with:
//! ```
//! RUST_LOG=fluree_db_hive=debug cargo run --example plan_local_hive -p fluree-db-hive
//! ```

use std::fs;
use std::sync::Arc;

use fluree_db_hive::io::lister::ORC_INPUT_FORMAT;
use fluree_db_hive::{
    Expression, HiveColumn, HiveTable, HiveTableConfig, LocalDisk, MemoryMetastore,
    RemotePartition, ScanRequest, ScanSettings, StorageDescriptor, TableDescriptor,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let warehouse = tempfile::tempdir()?;
    let location = warehouse
        .path()
        .join("sales/orders")
        .to_str()
        .ok_or("warehouse path is not UTF-8")?
        .to_string();

    let mut metastore = MemoryMetastore::new();
    metastore.add_table(TableDescriptor {
        database: "sales".to_string(),
        table_name: "orders".to_string(),
        columns: vec![
            HiveColumn::new("customer_id", "int"),
            HiveColumn::new("amount", "double"),
        ],
        partition_keys: vec![HiveColumn::new("dt", "string")],
        storage: StorageDescriptor {
            location: location.clone(),
            input_format: ORC_INPUT_FORMAT.to_string(),
            bucket_columns: vec!["customer_id".to_string()],
            num_buckets: 4,
        },
    });

    for dt in ["2024-06-01", "2024-06-02", "2024-06-03"] {
        let dir = format!("{}/dt={}", location, dt);
        fs::create_dir_all(&dir)?;
        for bucket in 0..4 {
            fs::write(format!("{}/{:06}_0_demo", dir, bucket), vec![0u8; 128 * (bucket + 1)])?;
        }
        fs::write(format!("{}/_SUCCESS", dir), b"")?;
        metastore.add_partition(
            "sales",
            "orders",
            RemotePartition {
                values: vec![dt.to_string()],
                storage: StorageDescriptor {
                    location: dir,
                    ..Default::default()
                },
                last_access_time: 1_717_200_000,
            },
        );
    }

    let table = HiveTable::open(
        HiveTableConfig::new("thrift://localhost:9083", "sales", "orders"),
        Arc::new(metastore),
        Arc::new(LocalDisk),
    );
    table.startup()?;

    let descriptor = table.descriptor()?;
    println!("=== Table {} ===", descriptor.identifier());
    println!("Location: {}", descriptor.storage.location);
    println!("Bucketed: {}", table.is_bucket_table()?);

    let request = ScanRequest::new(
        descriptor.identifier(),
        vec!["customer_id".to_string(), "amount".to_string()],
    )
    .with_filter(Expression::and(vec![
        Expression::gt_eq("dt", "2024-06-02"),
        Expression::eq("customer_id", 42i64),
        Expression::gt("amount", 100.0),
    ]))
    .with_concurrency(4)
    .with_query_id("demo");

    let resolution = table.prepare_read(&request, &ScanSettings::default())?;

    println!("\n=== Filter Split ===");
    let show = |expr: &Option<Expression>| expr.as_ref().map_or("-".to_string(), |e| e.to_string());
    println!("Partition: {}", show(&resolution.filter.partition_filter));
    println!("Prewhere:  {}", show(&resolution.filter.prewhere));
    println!("Where:     {}", show(&resolution.filter.where_filter));

    println!("\n=== Resolution ===");
    println!("Partitions selected: {}", resolution.partitions_selected);
    println!("Required bucket: {:?}", resolution.required_bucket);
    println!(
        "Files: {} of {} listed ({} bytes)",
        resolution.files.len(),
        resolution.files_listed,
        resolution.total_bytes()
    );
    for file in &resolution.files {
        println!("  [{}] {} ({} bytes)", file.partition.partition_id, file.file_name(), file.size);
    }

    println!("\n=== Worker Payload ({}) ===", resolution.worker_table_name);
    println!("{}", serde_json::to_string_pretty(&resolution.serialize_files())?);

    Ok(())
}
