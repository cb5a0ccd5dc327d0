//! The delivery projection: written files carry exactly the
//! documented column lists, row for row, with no working-state
//! columns.

use chrono::NaiveDate;
use omop_etl::CdmTables;
use omop_model::{Measurement, Person, Provenance};
use omop_unload::{unload_cdm, unload_vocabulary};
use omop_vocab::VocabularyStore;

fn person(person_id: i64, subject_id: i64) -> Person {
    Person {
        person_id,
        gender_concept_id: 8532,
        year_of_birth: 2085,
        month_of_birth: None,
        day_of_birth: None,
        birth_datetime: None,
        race_concept_id: 8527,
        ethnicity_concept_id: 0,
        location_id: None,
        provider_id: None,
        care_site_id: None,
        person_source_value: subject_id.to_string(),
        gender_source_value: Some("F".to_string()),
        gender_source_concept_id: 0,
        race_source_value: Some("WHITE".to_string()),
        race_source_concept_id: 0,
        ethnicity_source_value: None,
        ethnicity_source_concept_id: 0,
        provenance: Provenance::new("person.patients", "patients", Some(0), "patients:0"),
    }
}

fn measurement(measurement_id: i64, person_id: i64) -> Measurement {
    let date = NaiveDate::from_ymd_opt(2150, 1, 3).unwrap();
    Measurement {
        measurement_id,
        person_id,
        measurement_concept_id: 3000963,
        measurement_date: date,
        measurement_datetime: date.and_hms_opt(11, 0, 0),
        measurement_type_concept_id: 32856,
        operator_concept_id: None,
        value_as_number: Some(120.0),
        value_as_concept_id: None,
        unit_concept_id: Some(8840),
        range_low: None,
        range_high: None,
        provider_id: None,
        visit_occurrence_id: Some(1),
        visit_detail_id: None,
        measurement_source_value: Some("2345-7".to_string()),
        measurement_source_concept_id: 3000963,
        unit_source_value: Some("mg/dL".to_string()),
        value_source_value: Some("120".to_string()),
        provenance: Provenance::new("meas.labevents", "labevents", Some(0), "labevents:0"),
    }
}

fn read_csv(path: &std::path::Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (headers, rows)
}

#[test]
fn projection_drops_provenance_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut cdm = CdmTables::default();
    cdm.persons.push(person(1, 10));
    cdm.measurements.push(measurement(1, 1));
    cdm.measurements.push(measurement(2, 1));

    let written = unload_cdm(&cdm, dir.path()).unwrap();
    let measurement_file = written.iter().find(|t| t.table == "measurement").unwrap();
    assert_eq!(measurement_file.rows, 2);

    let (headers, rows) = read_csv(&measurement_file.path);
    assert_eq!(headers.first().map(String::as_str), Some("measurement_id"));
    assert!(!headers.iter().any(|h| h.contains("provenance")));
    assert!(!headers.iter().any(|h| h == "trace_id" || h == "unit_id"));
    assert_eq!(rows.len(), 2);

    let value_idx = headers.iter().position(|h| h == "value_as_number").unwrap();
    let unit_idx = headers.iter().position(|h| h == "unit_source_value").unwrap();
    assert_eq!(rows[0][value_idx], "120.0");
    assert_eq!(rows[0][unit_idx], "mg/dL");

    let (person_headers, person_rows) = read_csv(&written[0].path);
    assert_eq!(person_headers[0], "person_id");
    assert_eq!(person_rows.len(), 1);
}

#[test]
fn every_cdm_table_gets_a_file_even_when_empty() {
    let dir = tempfile::tempdir().unwrap();
    let written = unload_cdm(&CdmTables::default(), dir.path()).unwrap();
    assert_eq!(written.len(), 19);
    for table in &written {
        assert!(table.path.exists(), "missing {}", table.path.display());
        assert_eq!(table.rows, 0);
    }
}

#[test]
fn vocabulary_unload_carries_custom_concepts() {
    use omop_model::{Concept, StandardConcept};

    let dir = tempfile::tempdir().unwrap();
    let mut store = VocabularyStore::new();
    store.add_concept(Concept {
        concept_id: 2_100_000_001,
        concept_name: "wbc".to_string(),
        domain_id: "Measurement".to_string(),
        vocabulary_id: "mimiciv_meas_lab_loinc".to_string(),
        concept_class_id: "Lab Test".to_string(),
        standard_concept: Some(StandardConcept::Standard),
        concept_code: "wbc".to_string(),
        valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
        invalid_reason: None,
    });

    let written = unload_vocabulary(&store, dir.path()).unwrap();
    assert_eq!(written.len(), 9);
    let concept_file = written.iter().find(|t| t.table == "concept").unwrap();
    let (headers, rows) = read_csv(&concept_file.path);
    assert_eq!(headers[0], "concept_id");
    assert_eq!(rows[0][0], "2100000001");
    let standard_idx = headers.iter().position(|h| h == "standard_concept").unwrap();
    assert_eq!(rows[0][standard_idx], "S");
}
