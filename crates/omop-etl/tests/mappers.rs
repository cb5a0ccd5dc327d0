//! Mapper-level tests over hand-built staging frames: each scenario
//! publishes the frames a stage reads, runs the stage, and checks the
//! routed CDM rows.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use omop_etl::EtlConfig;
use omop_etl::clean::AdmissionSpan;
use omop_etl::concepts::{OPERATOR_LE, REL_HAS_SPECIMEN, REL_SPECIMEN_OF, TYPE_LAB, VISIT_EMERGENCY, VISIT_INPATIENT};
use omop_etl::mappers::{fact_relationship, measurement, micro, observation, person, visit};
use omop_etl::routing::finalize_domain;
use omop_etl::state::{EtlState, StageAudit};
use omop_model::{Concept, ConceptRelationship, MAPS_TO, MappedFact, Provenance, StandardConcept, TargetDomain};
use omop_vocab::VocabularyStore;
use polars::prelude::{DataFrame, NamedFrom, Series};

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn frame(columns: &[(&str, Vec<&str>)]) -> DataFrame {
    DataFrame::new(
        columns
            .iter()
            .map(|(name, values)| Series::new((*name).into(), values.clone()).into())
            .collect(),
    )
    .unwrap()
}

fn concept(id: i64, code: &str, domain: &str, vocabulary: &str, standard: bool) -> Concept {
    Concept {
        concept_id: id,
        concept_name: format!("{vocabulary} {code}"),
        domain_id: domain.to_string(),
        vocabulary_id: vocabulary.to_string(),
        concept_class_id: "Clinical Observation".to_string(),
        standard_concept: standard.then_some(StandardConcept::Standard),
        concept_code: code.to_string(),
        valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
        invalid_reason: None,
    }
}

fn maps_to(from: i64, to: i64) -> ConceptRelationship {
    ConceptRelationship {
        concept_id_1: from,
        concept_id_2: to,
        relationship_id: MAPS_TO.to_string(),
        valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
        invalid_reason: None,
    }
}

fn audit<'a>(state: &'a EtlState, stage: &str) -> &'a StageAudit {
    state
        .audits
        .iter()
        .find(|a| a.stage == stage)
        .unwrap_or_else(|| panic!("no audit for stage {stage}"))
}

#[test]
fn labevents_resolve_loinc_and_infer_their_admission() {
    let mut state = EtlState::new();
    state.person_keys.insert(10, 1);
    state.visit_keys.insert("10|100".to_string(), 555);
    state.admissions.insert(
        10,
        AdmissionSpan {
            hadm_id: 100,
            admittime: dt("2150-01-01 00:00:00"),
            dischtime: dt("2150-01-10 00:00:00"),
        },
    );

    state.arena.publish(
        "d_labitems",
        frame(&[
            ("itemid", vec!["50931"]),
            ("loinc_code", vec!["2345-7"]),
            ("trace_id", vec!["d_labitems:0"]),
        ]),
    );
    // hadm_id left empty: containment against the admission index must
    // link the event to admission 100.
    state.arena.publish(
        "labevents",
        frame(&[
            ("subject_id", vec!["10"]),
            ("hadm_id", vec![""]),
            ("itemid", vec!["50931"]),
            ("charttime", vec!["2150-01-03 10:00:00"]),
            ("value", vec!["<=0.5"]),
            ("valuenum", vec![""]),
            ("valueuom", vec!["mg/dL"]),
            ("ref_range_lower", vec!["70"]),
            ("ref_range_upper", vec!["100"]),
            ("trace_id", vec!["labevents:0"]),
        ]),
    );

    let mut store = VocabularyStore::new();
    store.add_concept(concept(3000963, "2345-7", "Measurement", "LOINC", true));
    store.add_relationship(maps_to(3000963, 3000963));
    store.add_concept(concept(8840, "mg/dL", "Unit", "UCUM", true));
    store.add_relationship(maps_to(8840, 8840));

    measurement::migrate_units(&mut state, &store).unwrap();
    measurement::migrate_labevents(&mut state, &store).unwrap();
    finalize_domain(&mut state, TargetDomain::Measurement, "measurement");

    assert_eq!(state.cdm.measurements.len(), 1);
    let row = &state.cdm.measurements[0];
    assert_eq!(row.measurement_concept_id, 3000963);
    assert_eq!(row.measurement_source_value.as_deref(), Some("2345-7"));
    assert_eq!(row.visit_occurrence_id, Some(555));
    // "<=0.5" splits into operator and number.
    assert_eq!(row.value_as_number, Some(0.5));
    assert_eq!(row.operator_concept_id, Some(OPERATOR_LE));
    assert_eq!(row.unit_concept_id, Some(8840));
    assert_eq!(row.unit_source_value.as_deref(), Some("mg/dL"));
    assert_eq!(row.range_low, Some(70.0));
    assert_eq!(row.range_high, Some(100.0));
}

#[test]
fn chartevents_repair_values_and_reroute_condition_findings() {
    let mut state = EtlState::new();
    state.person_keys.insert(10, 1);
    state.arena.publish(
        "d_items",
        frame(&[
            ("itemid", vec!["223761", "228305"]),
            ("label", vec!["Temperature Fahrenheit", "Delirium assessment"]),
            ("trace_id", vec!["d_items:0", "d_items:1"]),
        ]),
    );
    // Row 0: free-text "98.6 F" repaired and converted to Celsius.
    // Row 1: implausible temperature, discarded.
    // Row 2: free-text value resolving into the Condition domain.
    state.arena.publish(
        "chartevents",
        frame(&[
            ("subject_id", vec!["10", "10", "10"]),
            ("hadm_id", vec!["100", "100", "100"]),
            ("itemid", vec!["223761", "223761", "228305"]),
            (
                "charttime",
                vec![
                    "2150-01-03 08:00:00",
                    "2150-01-03 09:00:00",
                    "2150-01-03 10:00:00",
                ],
            ),
            ("value", vec!["98.6 F", "500", "Positive"]),
            ("valuenum", vec!["", "500", ""]),
            ("valueuom", vec!["", "", ""]),
            ("trace_id", vec!["chartevents:0", "chartevents:1", "chartevents:2"]),
        ]),
    );

    let mut store = VocabularyStore::new();
    store.add_concept(concept(
        2_100_000_401,
        "Positive",
        "Meas Value",
        "mimiciv_meas_chartevents_value",
        false,
    ));
    store.add_concept(concept(373995, "positive-finding", "Condition", "SNOMED", true));
    store.add_relationship(maps_to(2_100_000_401, 373995));

    let config = EtlConfig::rooted_at(Path::new("unused"));
    measurement::migrate_chartevents(&mut state, &store, &config).unwrap();
    finalize_domain(&mut state, TargetDomain::Measurement, "measurement");
    finalize_domain(&mut state, TargetDomain::Condition, "condition");

    let dropped = audit(&state, "measurement.chartevents");
    assert_eq!(dropped.input_rows, 3);
    assert_eq!(dropped.emitted_rows, 2);

    assert_eq!(state.cdm.measurements.len(), 1);
    let temperature = &state.cdm.measurements[0];
    let celsius = temperature.value_as_number.unwrap();
    assert!((celsius - 37.0).abs() < 0.01);
    assert_eq!(temperature.unit_source_value.as_deref(), Some("F"));

    assert_eq!(state.cdm.condition_occurrences.len(), 1);
    let rerouted = &state.cdm.condition_occurrences[0];
    assert_eq!(rerouted.condition_concept_id, 373995);
    assert_eq!(rerouted.condition_source_value.as_deref(), Some("228305"));
}

#[test]
fn microbiology_fans_out_into_linked_specimen_organism_and_susceptibility() {
    let mut state = EtlState::new();
    state.person_keys.insert(10, 1);

    // One culture: a specimen-only row, a growth row, and one
    // susceptibility row for the grown organism.
    state.arena.publish(
        "microbiologyevents",
        frame(&[
            ("subject_id", vec!["10", "10", "10"]),
            ("hadm_id", vec!["100", "100", "100"]),
            (
                "charttime",
                vec![
                    "2150-01-03 10:00:00",
                    "2150-01-03 10:00:00",
                    "2150-01-03 10:00:00",
                ],
            ),
            ("spec_itemid", vec!["70012", "70012", "70012"]),
            ("spec_type_desc", vec!["BLOOD CULTURE", "BLOOD CULTURE", "BLOOD CULTURE"]),
            ("test_itemid", vec!["", "90201", "90201"]),
            ("org_itemid", vec!["", "80002", "80002"]),
            ("org_name", vec!["", "ESCHERICHIA COLI", "ESCHERICHIA COLI"]),
            ("ab_itemid", vec!["", "", "90007"]),
            ("interpretation", vec!["", "", "S"]),
            ("dilution_text", vec!["", "", "<=0.25"]),
            (
                "trace_id",
                vec![
                    "microbiologyevents:0",
                    "microbiologyevents:1",
                    "microbiologyevents:2",
                ],
            ),
        ]),
    );

    let mut store = VocabularyStore::new();
    store.add_concept(concept(2_100_000_501, "70012", "Specimen", micro::SPECIMEN_VOCABULARY, false));
    store.add_concept(concept(4122286, "blood-specimen", "Specimen", "SNOMED", true));
    store.add_relationship(maps_to(2_100_000_501, 4122286));
    store.add_concept(concept(2_100_000_502, "90201", "Measurement", micro::TEST_VOCABULARY, false));
    store.add_concept(concept(3015000, "blood-culture", "Measurement", "LOINC", true));
    store.add_relationship(maps_to(2_100_000_502, 3015000));
    store.add_concept(concept(2_100_000_503, "80002", "Observation", micro::ORGANISM_VOCABULARY, false));
    store.add_concept(concept(4011683, "e-coli", "Observation", "SNOMED", true));
    store.add_relationship(maps_to(2_100_000_503, 4011683));
    store.add_concept(concept(2_100_000_504, "90007", "Measurement", micro::ANTIBIOTIC_VOCABULARY, false));
    store.add_concept(concept(36304000, "ampicillin-susceptibility", "Measurement", "LOINC", true));
    store.add_relationship(maps_to(2_100_000_504, 36304000));

    micro::migrate(&mut state, &store).unwrap();
    let fanned = audit(&state, "measurement.micro");
    assert_eq!(fanned.input_rows, 3);
    assert_eq!(fanned.emitted_rows, 3);

    finalize_domain(&mut state, TargetDomain::Specimen, "specimen");
    finalize_domain(&mut state, TargetDomain::Measurement, "measurement");
    fact_relationship::migrate(&mut state).unwrap();

    assert_eq!(state.cdm.specimens.len(), 1);
    let specimen = &state.cdm.specimens[0];
    assert_eq!(specimen.specimen_concept_id, 4122286);
    assert_eq!(specimen.specimen_source_value.as_deref(), Some("70012"));

    assert_eq!(state.cdm.measurements.len(), 2);
    let organism = &state.cdm.measurements[0];
    assert_eq!(organism.measurement_concept_id, 3015000);
    assert_eq!(organism.value_as_concept_id, Some(4011683));
    let susceptibility = &state.cdm.measurements[1];
    assert_eq!(susceptibility.measurement_concept_id, 36304000);
    assert_eq!(susceptibility.value_source_value.as_deref(), Some("<=0.25"));

    // organism → specimen and susceptibility → organism, each as a
    // bidirectional pair.
    assert_eq!(state.cdm.fact_relationships.len(), 4);
    let organism_link = &state.cdm.fact_relationships[0];
    assert_eq!(organism_link.fact_id_1, organism.measurement_id);
    assert_eq!(organism_link.fact_id_2, specimen.specimen_id);
    assert_eq!(organism_link.relationship_concept_id, REL_SPECIMEN_OF);
    assert_eq!(state.cdm.fact_relationships[1].relationship_concept_id, REL_HAS_SPECIMEN);
    let susceptibility_link = &state.cdm.fact_relationships[2];
    assert_eq!(susceptibility_link.fact_id_1, susceptibility.measurement_id);
    assert_eq!(susceptibility_link.fact_id_2, organism.measurement_id);
}

#[test]
fn person_race_and_ethnicity_split_on_the_target_vocabulary() {
    let mut state = EtlState::new();
    // Subject 10's later admission records a different value; the
    // first admission's ethnicity must win.
    state.arena.publish(
        "admissions",
        frame(&[
            ("subject_id", vec!["10", "10", "11"]),
            (
                "admittime",
                vec![
                    "2150-01-05 00:00:00",
                    "2150-01-01 00:00:00",
                    "2150-02-01 00:00:00",
                ],
            ),
            ("ethnicity", vec!["BLACK/AFRICAN AMERICAN", "WHITE", "HISPANIC/LATINO"]),
            ("trace_id", vec!["admissions:0", "admissions:1", "admissions:2"]),
        ]),
    );
    state.arena.publish(
        "patients",
        frame(&[
            ("subject_id", vec!["10", "11"]),
            ("gender", vec!["F", "M"]),
            ("anchor_age", vec!["52", "40"]),
            ("anchor_year", vec!["2150", "2149"]),
            ("trace_id", vec!["patients:0", "patients:1"]),
        ]),
    );

    let mut store = VocabularyStore::new();
    store.add_concept(concept(2_100_000_601, "WHITE", "Race", "mimiciv_per_ethnicity", false));
    store.add_concept(concept(8527, "5", "Race", "Race", true));
    store.add_relationship(maps_to(2_100_000_601, 8527));
    store.add_concept(concept(
        2_100_000_602,
        "BLACK/AFRICAN AMERICAN",
        "Race",
        "mimiciv_per_ethnicity",
        false,
    ));
    store.add_concept(concept(8516, "3", "Race", "Race", true));
    store.add_relationship(maps_to(2_100_000_602, 8516));
    store.add_concept(concept(
        2_100_000_603,
        "HISPANIC/LATINO",
        "Ethnicity",
        "mimiciv_per_ethnicity",
        false,
    ));
    store.add_concept(concept(38003563, "Hispanic", "Ethnicity", "Ethnicity", true));
    store.add_relationship(maps_to(2_100_000_603, 38003563));

    person::migrate(&mut state, &store).unwrap();

    assert_eq!(state.cdm.persons.len(), 2);
    let white = &state.cdm.persons[0];
    assert_eq!(white.gender_concept_id, 8532);
    assert_eq!(white.year_of_birth, 2150);
    assert_eq!(white.race_concept_id, 8527);
    assert_eq!(white.race_source_value.as_deref(), Some("WHITE"));
    assert_eq!(white.race_source_concept_id, 2_100_000_601);
    assert_eq!(white.ethnicity_concept_id, 0);

    // A target in the Ethnicity vocabulary fills the ethnicity slot
    // and leaves race untouched.
    let hispanic = &state.cdm.persons[1];
    assert_eq!(hispanic.gender_concept_id, 8507);
    assert_eq!(hispanic.race_concept_id, 0);
    assert!(hispanic.race_source_value.is_none());
    assert_eq!(hispanic.ethnicity_concept_id, 38003563);
    assert_eq!(hispanic.ethnicity_source_value.as_deref(), Some("HISPANIC/LATINO"));
}

#[test]
fn visit_occurrences_order_chain_and_register_composite_keys() {
    let mut state = EtlState::new();
    state.person_keys.insert(10, 1);
    state.arena.publish(
        "admissions",
        frame(&[
            ("subject_id", vec!["10", "10"]),
            ("hadm_id", vec!["101", "100"]),
            ("admittime", vec!["2150-02-01 08:00:00", "2150-01-01 00:00:00"]),
            ("dischtime", vec!["2150-02-03 12:00:00", "2150-01-02 00:00:00"]),
            ("admission_type", vec!["ELECTIVE", "EW EMER."]),
            ("admission_location", vec!["PHYSICIAN REFERRAL", "EMERGENCY ROOM"]),
            ("discharge_location", vec!["HOME", "HOME"]),
            ("edregtime", vec!["", "2149-12-31 20:00:00"]),
            ("edouttime", vec!["", "2150-01-01 00:30:00"]),
            ("trace_id", vec!["admissions:0", "admissions:1"]),
        ]),
    );

    visit::migrate_part1(&mut state).unwrap();
    visit::migrate_part2(&mut state).unwrap();
    visit::migrate_visit_occurrence(&mut state).unwrap();

    // (subject, start) order: the ED registration precedes both
    // admissions, and each later visit chains to its predecessor.
    assert_eq!(state.cdm.visit_occurrences.len(), 3);
    let ed = &state.cdm.visit_occurrences[0];
    assert_eq!(ed.visit_concept_id, VISIT_EMERGENCY);
    assert!(ed.preceding_visit_occurrence_id.is_none());
    let emergency = &state.cdm.visit_occurrences[1];
    assert_eq!(emergency.visit_concept_id, VISIT_EMERGENCY);
    assert_eq!(emergency.visit_source_value, "100");
    assert_eq!(emergency.preceding_visit_occurrence_id, Some(ed.visit_occurrence_id));
    let elective = &state.cdm.visit_occurrences[2];
    assert_eq!(elective.visit_concept_id, VISIT_INPATIENT);
    assert_eq!(
        elective.preceding_visit_occurrence_id,
        Some(emergency.visit_occurrence_id)
    );

    // Composite keys: one per admission plus a per-day date key; the
    // keyless ED visit registers nothing.
    assert_eq!(state.visit_id("10|100"), Some(emergency.visit_occurrence_id));
    assert_eq!(state.visit_id("10|101"), Some(elective.visit_occurrence_id));
    assert_eq!(state.visit_id("10|2150-01-01"), Some(emergency.visit_occurrence_id));
    assert_eq!(state.visit_id("10|2150-02-02"), Some(elective.visit_occurrence_id));
    assert_eq!(state.visit_id("10|2149-12-31"), None);

    // The admission index built by part 1 serves later inference.
    assert_eq!(state.admissions.infer(10, dt("2150-02-02 09:00:00")), Some(101));
}

#[test]
fn observation_period_envelopes_facts_and_prunes_uncovered_persons() {
    let mut state = EtlState::new();
    state.arena.publish(
        "patients",
        frame(&[
            ("subject_id", vec!["10", "11"]),
            ("gender", vec!["F", "M"]),
            ("anchor_age", vec!["52", "40"]),
            ("anchor_year", vec!["2150", "2149"]),
            ("trace_id", vec!["patients:0", "patients:1"]),
        ]),
    );
    // Subject 11 has no admissions and no facts.
    state.arena.publish(
        "admissions",
        frame(&[
            ("subject_id", vec!["10"]),
            ("hadm_id", vec!["100"]),
            ("admittime", vec!["2150-01-01 00:00:00"]),
            ("dischtime", vec!["2150-01-10 00:00:00"]),
            ("admission_type", vec!["URGENT"]),
            ("admission_location", vec!["TRANSFER"]),
            ("discharge_location", vec!["HOME"]),
            ("ethnicity", vec![""]),
            ("edregtime", vec![""]),
            ("edouttime", vec![""]),
            ("trace_id", vec!["admissions:0"]),
        ]),
    );

    let store = VocabularyStore::new();
    person::migrate(&mut state, &store).unwrap();
    visit::migrate_part1(&mut state).unwrap();
    visit::migrate_part2(&mut state).unwrap();
    visit::migrate_visit_occurrence(&mut state).unwrap();

    // A lab result after discharge stretches the envelope past the
    // visit end.
    let mut fact = MappedFact::new(
        10,
        Some(100),
        dt("2150-01-15 09:00:00"),
        TYPE_LAB,
        TargetDomain::Measurement,
        Provenance::new("meas.labevents", "labevents", Some(0), "labevents:0"),
    );
    fact.target_concept_id = 3000963;
    state.facts.push(fact);
    finalize_domain(&mut state, TargetDomain::Measurement, "measurement");

    observation::migrate_period(&mut state).unwrap();
    assert_eq!(state.cdm.observation_periods.len(), 1);
    let period = &state.cdm.observation_periods[0];
    assert_eq!(period.observation_period_start_date, NaiveDate::from_ymd_opt(2150, 1, 1).unwrap());
    assert_eq!(period.observation_period_end_date, NaiveDate::from_ymd_opt(2150, 1, 15).unwrap());

    person::migrate_final(&mut state).unwrap();
    assert_eq!(state.cdm.persons.len(), 1);
    assert_eq!(state.cdm.persons[0].person_source_value, "10");
    assert!(state.person_id(11).is_none());
    let pruned = audit(&state, "person.final");
    assert_eq!(pruned.input_rows, 2);
    assert_eq!(pruned.emitted_rows, 1);
}
