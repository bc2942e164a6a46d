//! Work lists used across the scanner tests

#![allow(dead_code)]

use buybox_scanner::models::buybox::WorkItem;

/// `count` distinct, well-formed ASINs with matching SKUs, in order.
pub fn work_items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| WorkItem::new(asin(i), format!("SKU-{i:04}")))
        .collect()
}

/// The ASIN `work_items` assigns to position `index`.
pub fn asin(index: usize) -> String {
    format!("B0{index:08}")
}

/// Real-looking ASINs for end-to-end runs against the simulated client.
pub const DEMO_ASINS: &[&str] = &[
    "B07XJ8C8F5",
    "B08N5WRWNW",
    "B09G9FPHY6",
    "B0BSHF7WHW",
    "B07FZ8S74R",
];
