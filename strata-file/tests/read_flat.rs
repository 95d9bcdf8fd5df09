// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! End-to-end reads of flat files built in memory.

use std::sync::Arc;

use strata_core::executor::Executor;
use strata_core::Error;
use strata_encoding::compression::DecompressorRegistry;
use strata_encoding::format::Encoding;
use strata_file::meta::{parse_file_metadata, Repetition};
use strata_file::testing::{
    encode_data_page_v1, encode_dictionary_page, encode_leaf_page, encode_plain, FileBuilder,
    MetadataBuilder, PlainColumn,
};
use strata_file::{FileHandle, RowReader};

fn open_in_memory(bytes: bytes::Bytes, name: &str) -> FileHandle {
    let metadata_bytes = strata_file::footer::metadata_bytes(&bytes, name).unwrap();
    let metadata = parse_file_metadata(&metadata_bytes, name).unwrap();
    FileHandle::open(
        name,
        metadata,
        bytes,
        Executor::cpu_pool(),
        Arc::new(DecompressorRegistry::default()),
    )
    .unwrap()
}

/// A tiny taxi-trip style file: 5 rows with ids, a timestamp column,
/// and doubles.
fn trip_file() -> bytes::Bytes {
    let mut file = FileBuilder::new();

    let vendor = encode_leaf_page(None, None, &PlainColumn::Int32(&[1, 2, 2, 1, 2]));
    let vendor_offset = file.append_chunk(&[vendor.clone()]);

    // Micros since the epoch; row 0 is 2025-01-01T00:18:38Z.
    let pickups = [
        1_735_690_718_000_000i64,
        1_735_691_000_000_000,
        1_735_692_250_500_000,
        1_735_693_100_000_000,
        1_735_694_999_000_000,
    ];
    let pickup = encode_leaf_page(None, None, &PlainColumn::Int64(&pickups));
    let pickup_offset = file.append_chunk(&[pickup.clone()]);

    let distance = encode_leaf_page(None, None, &PlainColumn::Double(&[1.6, 0.9, 3.2, 2.1, 8.4]));
    let distance_offset = file.append_chunk(&[distance.clone()]);

    let payment = encode_leaf_page(None, None, &PlainColumn::Int64(&[1, 1, 2, 2, 1]));
    let payment_offset = file.append_chunk(&[payment.clone()]);

    let tip = encode_leaf_page(None, None, &PlainColumn::Double(&[3.0, 1.5, 0.0, 0.0, 10.2]));
    let tip_offset = file.append_chunk(&[tip.clone()]);

    let total = encode_leaf_page(None, None, &PlainColumn::Double(&[18.0, 9.3, 14.25, 9.7, 52.0]));
    let total_offset = file.append_chunk(&[total.clone()]);

    let surcharge = encode_leaf_page(None, None, &PlainColumn::Float(&[2.5, 2.5, 0.0, 2.5, 0.0]));
    let surcharge_offset = file.append_chunk(&[surcharge.clone()]);

    let metadata = MetadataBuilder::new(5)
        .element("schema", None, None, 7, None)
        .element("VendorID", Some(Repetition::Required), Some(1), 0, None)
        .element(
            "tpep_pickup_datetime",
            Some(Repetition::Required),
            Some(2),
            0,
            Some(10), // TIMESTAMP_MICROS
        )
        .element("trip_distance", Some(Repetition::Required), Some(5), 0, None)
        .element("payment_type", Some(Repetition::Required), Some(2), 0, None)
        .element("tip_amount", Some(Repetition::Required), Some(5), 0, None)
        .element("total_amount", Some(Repetition::Required), Some(5), 0, None)
        .element(
            "congestion_surcharge",
            Some(Repetition::Required),
            Some(4),
            0,
            None,
        )
        .row_group(5, |rg| {
            rg.column(&["VendorID"], 0, 5, vendor_offset, vendor.len() as i64, None);
            rg.column(
                &["tpep_pickup_datetime"],
                0,
                5,
                pickup_offset,
                pickup.len() as i64,
                None,
            );
            rg.column(
                &["trip_distance"],
                0,
                5,
                distance_offset,
                distance.len() as i64,
                None,
            );
            rg.column(
                &["payment_type"],
                0,
                5,
                payment_offset,
                payment.len() as i64,
                None,
            );
            rg.column(&["tip_amount"], 0, 5, tip_offset, tip.len() as i64, None);
            rg.column(&["total_amount"], 0, 5, total_offset, total.len() as i64, None);
            rg.column(
                &["congestion_surcharge"],
                0,
                5,
                surcharge_offset,
                surcharge.len() as i64,
                None,
            );
        })
        .build();
    file.finish(&metadata)
}

fn advance(rows: &mut RowReader) {
    assert!(rows.has_next().unwrap());
    rows.next().unwrap();
}

#[test]
fn test_flat_trip_rows() {
    let file = open_in_memory(trip_file(), "trips.parquet");
    assert_eq!(file.num_rows(), 5);
    let mut rows = file.create_row_reader(None).unwrap();

    advance(&mut rows);
    assert_eq!(rows.get_i32("VendorID").unwrap(), 1);
    assert_eq!(
        rows.get_timestamp("tpep_pickup_datetime")
            .unwrap()
            .unwrap()
            .to_rfc3339(),
        "2025-01-01T00:18:38+00:00"
    );
    assert!((rows.get_f64("trip_distance").unwrap() - 1.6).abs() < 1e-7);
    assert!((rows.get_f64("total_amount").unwrap() - 18.0).abs() < 1e-7);

    advance(&mut rows); // row 1
    advance(&mut rows); // row 2
    advance(&mut rows); // row 3
    assert_eq!(rows.get_i64("payment_type").unwrap(), 2);
    assert!((rows.get_f64("tip_amount").unwrap() - 0.0).abs() < 1e-7);
    assert!((rows.get_f64("total_amount").unwrap() - 9.7).abs() < 1e-7);

    advance(&mut rows); // row 4
    assert!(!rows.has_next().unwrap());
}

#[test]
fn test_flat_type_mismatch_and_unknown_column() {
    let file = open_in_memory(trip_file(), "trips.parquet");
    let mut rows = file.create_row_reader(None).unwrap();
    advance(&mut rows);
    assert!(matches!(
        rows.get_i32("trip_distance"),
        Err(Error::Type { .. })
    ));
    // No silent widening: a 32-bit column through the 64-bit accessor
    // (and float through double) is a type error, not a promotion.
    assert!(matches!(rows.get_i64("VendorID"), Err(Error::Type { .. })));
    assert!(matches!(
        rows.get_f64("congestion_surcharge"),
        Err(Error::Type { .. })
    ));
    assert!((rows.get_f32("congestion_surcharge").unwrap() - 2.5).abs() < 1e-4);
    assert!(matches!(rows.get_i32("no_such"), Err(Error::Schema { .. })));
}

#[test]
fn test_projection_excludes_columns() {
    let file = open_in_memory(trip_file(), "trips.parquet");
    let mut rows = file
        .create_row_reader(Some(&["VendorID", "total_amount"]))
        .unwrap();
    advance(&mut rows);
    assert_eq!(rows.get_i32("VendorID").unwrap(), 1);
    assert!(matches!(
        rows.get_f64("trip_distance"),
        Err(Error::Schema { .. })
    ));
    assert_eq!(rows.num_projected_fields(), 2);
    // Access by projected index follows projection order.
    assert_eq!(rows.get_i32_at(0).unwrap(), 1);
    assert!((rows.get_f64_at(1).unwrap() - 18.0).abs() < 1e-7);
    assert!(matches!(rows.get_i32_at(5), Err(Error::Schema { .. })));
}

#[test]
fn test_optional_column_nulls() {
    let mut file = FileBuilder::new();
    // 4 rows, middle two null.
    let page = encode_leaf_page(
        None,
        Some((&[1, 0, 0, 1], 1)),
        &PlainColumn::Int32(&[10, 40]),
    );
    let offset = file.append_chunk(&[page.clone()]);
    let metadata = MetadataBuilder::new(4)
        .element("schema", None, None, 1, None)
        .element("score", Some(Repetition::Optional), Some(1), 0, None)
        .row_group(4, |rg| {
            rg.column(&["score"], 0, 4, offset, page.len() as i64, None);
        })
        .build();
    let file = open_in_memory(file.finish(&metadata), "nulls.parquet");

    let mut rows = file.create_row_reader(None).unwrap();
    advance(&mut rows);
    assert!(!rows.is_null("score").unwrap());
    assert_eq!(rows.get_i32("score").unwrap(), 10);
    advance(&mut rows);
    assert!(rows.is_null("score").unwrap());
    assert!(matches!(rows.get_i32("score"), Err(Error::NullAccess { .. })));
    advance(&mut rows);
    assert!(rows.is_null("score").unwrap());
    advance(&mut rows);
    assert_eq!(rows.get_i32("score").unwrap(), 40);
}

#[test]
fn test_dictionary_encoded_strings() {
    let mut file = FileBuilder::new();
    let dict_page = encode_dictionary_page(3, &encode_plain(&PlainColumn::Str(&["A", "B", "C"])));
    // Indices A, B, A, C, B with bit width 2, one RLE run each.
    let indices = vec![2u8, 2, 0, 2, 1, 2, 0, 2, 2, 2, 1];
    let data_page = encode_data_page_v1(5, 8, &indices, false);
    let offset = file.append_chunk(&[dict_page.clone(), data_page.clone()]);
    let metadata = MetadataBuilder::new(5)
        .element("schema", None, None, 1, None)
        .element("category", Some(Repetition::Required), Some(6), 0, Some(0))
        .row_group(5, |rg| {
            rg.column_with_encodings(
                &["category"],
                0,
                &[0, 3, 8], // PLAIN, RLE, RLE_DICTIONARY
                5,
                offset,
                (dict_page.len() + data_page.len()) as i64,
                Some(offset),
            );
        })
        .build();
    let file = open_in_memory(file.finish(&metadata), "dict.parquet");

    // The chunk advertises its dictionary encoding.
    assert!(file.metadata().row_groups[0].columns[0]
        .encodings
        .contains(&Encoding::RleDictionary));

    let mut rows = file.create_row_reader(None).unwrap();
    let mut seen = Vec::new();
    while rows.has_next().unwrap() {
        rows.next().unwrap();
        seen.push(rows.get_string("category").unwrap().unwrap());
    }
    assert_eq!(seen, vec!["A", "B", "A", "C", "B"]);
}

#[test]
fn test_crc_corruption_detected() {
    let mut file = FileBuilder::new();
    let payload = encode_plain(&PlainColumn::Int32(&[1, 2, 3]));
    let page = encode_data_page_v1(3, 0, &payload, true);
    let header_len = page.len() - payload.len();
    let offset = file.append_chunk(&[page.clone()]);
    let metadata = MetadataBuilder::new(3)
        .element("schema", None, None, 1, None)
        .element("id", Some(Repetition::Required), Some(1), 0, None)
        .row_group(3, |rg| {
            rg.column(&["id"], 0, 3, offset, page.len() as i64, None);
        })
        .build();
    let clean = file.finish(&metadata);

    // The pristine file reads fine.
    let file = open_in_memory(clean.clone(), "crc.parquet");
    let mut rows = file.create_row_reader(None).unwrap();
    advance(&mut rows);
    assert_eq!(rows.get_i32("id").unwrap(), 1);

    // Flip one byte inside the page's compressed region.
    let corrupted = FileBuilder::corrupt_at(&clean, offset as usize + header_len + 2);
    let file = open_in_memory(corrupted, "crc.parquet");
    let mut rows = file.create_row_reader(None).unwrap();
    let err = rows.has_next().unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }), "got {err}");
    // The reader stays unusable.
    assert!(matches!(rows.has_next(), Err(Error::Corrupt { .. })));
    assert!(matches!(rows.next(), Err(Error::Corrupt { .. })));
}

#[test]
fn test_snappy_compressed_column() {
    let mut file = FileBuilder::new();
    let raw = encode_plain(&PlainColumn::Int64(&[100, 200, 300]));
    let compressed = snap::raw::Encoder::new().compress_vec(&raw).unwrap();
    // Header sizes: uncompressed = raw, compressed = snappy output.
    let page = {
        let mut w = strata_file::testing::ThriftWriter::new();
        w.i32_field(1, 0);
        w.i32_field(2, raw.len() as i32);
        w.i32_field(3, compressed.len() as i32);
        w.struct_field(5, |w| {
            w.i32_field(1, 3);
            w.i32_field(2, 0);
            w.i32_field(3, 3);
            w.i32_field(4, 3);
        });
        w.stop();
        let mut out = w.out;
        out.extend_from_slice(&compressed);
        out
    };
    let offset = file.append_chunk(&[page.clone()]);
    let metadata = MetadataBuilder::new(3)
        .element("schema", None, None, 1, None)
        .element("amount", Some(Repetition::Required), Some(2), 0, None)
        .row_group(3, |rg| {
            rg.column(&["amount"], 1 /* SNAPPY */, 3, offset, page.len() as i64, None);
        })
        .build();
    let file = open_in_memory(file.finish(&metadata), "snappy.parquet");

    let mut rows = file.create_row_reader(None).unwrap();
    let mut seen = Vec::new();
    while rows.has_next().unwrap() {
        rows.next().unwrap();
        seen.push(rows.get_i64("amount").unwrap());
    }
    assert_eq!(seen, vec![100, 200, 300]);
}

#[test]
fn test_multiple_row_groups() {
    let mut file = FileBuilder::new();
    let page1 = encode_leaf_page(None, None, &PlainColumn::Int32(&[1, 2, 3]));
    let offset1 = file.append_chunk(&[page1.clone()]);
    let page2 = encode_leaf_page(None, None, &PlainColumn::Int32(&[4, 5]));
    let offset2 = file.append_chunk(&[page2.clone()]);
    let metadata = MetadataBuilder::new(5)
        .element("schema", None, None, 1, None)
        .element("id", Some(Repetition::Required), Some(1), 0, None)
        .row_group(3, |rg| {
            rg.column(&["id"], 0, 3, offset1, page1.len() as i64, None);
        })
        .row_group(2, |rg| {
            rg.column(&["id"], 0, 2, offset2, page2.len() as i64, None);
        })
        .build();
    let file = open_in_memory(file.finish(&metadata), "groups.parquet");

    let mut rows = file.create_row_reader(None).unwrap();
    let mut seen = Vec::new();
    while rows.has_next().unwrap() {
        rows.next().unwrap();
        seen.push(rows.get_i32("id").unwrap());
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_open_path_memory_maps_the_file() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trips.parquet");
    std::fs::write(&path, trip_file()).unwrap();

    let file = FileHandle::open_path(&path).unwrap();
    assert_eq!(file.num_rows(), 5);
    let mut rows = file.create_row_reader(None).unwrap();
    advance(&mut rows);
    assert_eq!(rows.get_i32("VendorID").unwrap(), 1);
}

#[test]
fn test_close_stops_iteration() {
    let file = open_in_memory(trip_file(), "trips.parquet");
    let mut rows = file.create_row_reader(None).unwrap();
    advance(&mut rows);
    file.close();
    assert!(!rows.has_next().unwrap());
}
