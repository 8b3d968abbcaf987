use std::fs;

use entity_mapper_core::{load_input, MapperError};
use rust_xlsxwriter::Workbook;

#[test]
fn csv_input_keeps_identifier_text_and_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ids.csv");
    fs::write(
        &path,
        "pitchbook_id,bq_id,notes\nA1,007,first\nA2,,\n\nA3,baz\n",
    )
    .expect("write csv");

    let table = load_input(&path).expect("load");

    assert_eq!(table.headers, vec!["pitchbook_id", "bq_id", "notes"]);
    assert_eq!(table.len(), 3);
    assert_eq!(table.rows[0].primary_id.as_deref(), Some("A1"));
    assert_eq!(table.rows[0].secondary_id.as_deref(), Some("007"));
    assert_eq!(table.rows[1].secondary_id, None);
    assert_eq!(table.rows[2].secondary_id.as_deref(), Some("baz"));
}

#[test]
fn tsv_input_uses_tab_delimiter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ids.tsv");
    fs::write(&path, "pb\tbq\nA1\t42\n").expect("write tsv");

    let table = load_input(&path).expect("load");

    assert_eq!(table.rows[0].secondary_id.as_deref(), Some("42"));
}

#[test]
fn single_column_input_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ids.csv");
    fs::write(&path, "pitchbook_id\nA1\nA2\n").expect("write csv");

    let err = load_input(&path).expect_err("one column");

    assert!(matches!(err, MapperError::InputFormat { found: 1, .. }));
}

#[test]
fn unsupported_extension_is_a_read_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ids.json");
    fs::write(&path, "[]").expect("write");

    assert!(matches!(
        load_input(&path),
        Err(MapperError::InputRead { .. })
    ));
}

#[test]
fn xlsx_input_reads_first_sheet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ids.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "pitchbook_id").expect("cell");
    sheet.write_string(0, 1, "bq_id").expect("cell");
    sheet.write_string(1, 0, "A1").expect("cell");
    sheet.write_string(1, 1, "007").expect("cell");
    sheet.write_string(2, 0, "A2").expect("cell");
    sheet.write_number(2, 1, 42.0).expect("cell");
    sheet.write_string(3, 0, "A3").expect("cell");
    workbook.save(&path).expect("save workbook");

    let table = load_input(&path).expect("load");

    assert_eq!(table.len(), 3);
    assert_eq!(table.rows[0].secondary_id.as_deref(), Some("007"));
    assert_eq!(table.rows[1].secondary_id.as_deref(), Some("42"));
    assert_eq!(table.rows[2].primary_id.as_deref(), Some("A3"));
    assert_eq!(table.rows[2].secondary_id, None);
}
