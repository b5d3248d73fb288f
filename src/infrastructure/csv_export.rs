//! Tabular projection of the snapshot
//!
//! Column order is fixed so spreadsheets built on the export keep working
//! between runs. Multi-valued image columns are joined with `|`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::domain::record::Record;

const LIST_SEPARATOR: &str = "|";

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    price: &'a str,
    link: &'a str,
    main_image: &'a str,
    main_image_local: &'a str,
    other_images: String,
    description: &'a str,
    location: &'a str,
}

impl<'a> From<&'a Record> for CsvRow<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            title: &record.title,
            price: &record.price,
            link: &record.link,
            main_image: &record.main_image_remote,
            main_image_local: record.main_image_local.as_deref().unwrap_or_default(),
            other_images: record.other_images_remote.join(LIST_SEPARATOR),
            description: &record.description,
            location: &record.location,
        }
    }
}

/// Writes records as CSV to any writer, header included
pub fn write_csv<'a, W: std::io::Write>(
    records: impl IntoIterator<Item = &'a Record>,
    writer: W,
) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut rows = 0usize;
    for record in records {
        csv_writer
            .serialize(CsvRow::from(record))
            .context("Failed to serialize CSV row")?;
        rows += 1;
    }
    // serde only emits the header together with the first row
    if rows == 0 {
        csv_writer
            .write_record([
                "title",
                "price",
                "link",
                "main_image",
                "main_image_local",
                "other_images",
                "description",
                "location",
            ])
            .context("Failed to write CSV header")?;
    }
    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(rows)
}

/// Exports records to a CSV file, replacing any previous export
pub fn export_csv<'a>(records: impl IntoIterator<Item = &'a Record>, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory {:?}", parent))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create CSV export {:?}", path))?;
    let rows = write_csv(records, std::io::BufWriter::new(file))?;
    info!("📄 Exported {} records to {:?}", rows, path);
    Ok(rows)
}
