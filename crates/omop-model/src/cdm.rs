//! OMOP CDM entity rows.
//!
//! Field lists follow the CDM v5.3 tables the pipeline populates.
//! Every row carries a [`Provenance`] block which is internal working
//! state: serialization (the unload projection) skips it, so writing a
//! row yields exactly the documented CDM column list.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::provenance::Provenance;

#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub person_id: i64,
    pub gender_concept_id: i64,
    pub year_of_birth: i64,
    pub month_of_birth: Option<i64>,
    pub day_of_birth: Option<i64>,
    pub birth_datetime: Option<NaiveDateTime>,
    pub race_concept_id: i64,
    pub ethnicity_concept_id: i64,
    pub location_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub care_site_id: Option<i64>,
    pub person_source_value: String,
    pub gender_source_value: Option<String>,
    pub gender_source_concept_id: i64,
    pub race_source_value: Option<String>,
    pub race_source_concept_id: i64,
    pub ethnicity_source_value: Option<String>,
    pub ethnicity_source_concept_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub location_id: i64,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub county: Option<String>,
    pub location_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct CareSite {
    pub care_site_id: i64,
    pub care_site_name: Option<String>,
    pub place_of_service_concept_id: i64,
    pub location_id: Option<i64>,
    pub care_site_source_value: Option<String>,
    pub place_of_service_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Death {
    pub person_id: i64,
    pub death_date: NaiveDate,
    pub death_datetime: Option<NaiveDateTime>,
    pub death_type_concept_id: i64,
    pub cause_concept_id: i64,
    pub cause_source_value: Option<String>,
    pub cause_source_concept_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitOccurrence {
    pub visit_occurrence_id: i64,
    pub person_id: i64,
    pub visit_concept_id: i64,
    pub visit_start_date: NaiveDate,
    pub visit_start_datetime: Option<NaiveDateTime>,
    pub visit_end_date: NaiveDate,
    pub visit_end_datetime: Option<NaiveDateTime>,
    pub visit_type_concept_id: i64,
    pub provider_id: Option<i64>,
    pub care_site_id: Option<i64>,
    pub visit_source_value: String,
    pub visit_source_concept_id: i64,
    pub admitting_source_concept_id: i64,
    pub admitting_source_value: Option<String>,
    pub discharge_to_concept_id: i64,
    pub discharge_to_source_value: Option<String>,
    pub preceding_visit_occurrence_id: Option<i64>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitDetail {
    pub visit_detail_id: i64,
    pub person_id: i64,
    pub visit_detail_concept_id: i64,
    pub visit_detail_start_date: NaiveDate,
    pub visit_detail_start_datetime: Option<NaiveDateTime>,
    pub visit_detail_end_date: NaiveDate,
    pub visit_detail_end_datetime: Option<NaiveDateTime>,
    pub visit_detail_type_concept_id: i64,
    pub provider_id: Option<i64>,
    pub care_site_id: Option<i64>,
    pub visit_detail_source_value: String,
    pub visit_detail_source_concept_id: i64,
    pub admitting_source_concept_id: i64,
    pub admitting_source_value: Option<String>,
    pub discharge_to_concept_id: i64,
    pub discharge_to_source_value: Option<String>,
    pub preceding_visit_detail_id: Option<i64>,
    pub visit_detail_parent_id: Option<i64>,
    pub visit_occurrence_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionOccurrence {
    pub condition_occurrence_id: i64,
    pub person_id: i64,
    pub condition_concept_id: i64,
    pub condition_start_date: NaiveDate,
    pub condition_start_datetime: Option<NaiveDateTime>,
    pub condition_end_date: Option<NaiveDate>,
    pub condition_end_datetime: Option<NaiveDateTime>,
    pub condition_type_concept_id: i64,
    pub stop_reason: Option<String>,
    pub provider_id: Option<i64>,
    pub visit_occurrence_id: Option<i64>,
    pub visit_detail_id: Option<i64>,
    pub condition_source_value: Option<String>,
    pub condition_source_concept_id: i64,
    pub condition_status_source_value: Option<String>,
    pub condition_status_concept_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureOccurrence {
    pub procedure_occurrence_id: i64,
    pub person_id: i64,
    pub procedure_concept_id: i64,
    pub procedure_date: NaiveDate,
    pub procedure_datetime: Option<NaiveDateTime>,
    pub procedure_type_concept_id: i64,
    pub modifier_concept_id: i64,
    pub quantity: Option<i64>,
    pub provider_id: Option<i64>,
    pub visit_occurrence_id: Option<i64>,
    pub visit_detail_id: Option<i64>,
    pub procedure_source_value: Option<String>,
    pub procedure_source_concept_id: i64,
    pub modifier_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrugExposure {
    pub drug_exposure_id: i64,
    pub person_id: i64,
    pub drug_concept_id: i64,
    pub drug_exposure_start_date: NaiveDate,
    pub drug_exposure_start_datetime: Option<NaiveDateTime>,
    pub drug_exposure_end_date: NaiveDate,
    pub drug_exposure_end_datetime: Option<NaiveDateTime>,
    pub verbatim_end_date: Option<NaiveDate>,
    pub drug_type_concept_id: i64,
    pub stop_reason: Option<String>,
    pub refills: Option<i64>,
    pub quantity: Option<f64>,
    pub days_supply: Option<i64>,
    pub sig: Option<String>,
    pub route_concept_id: i64,
    pub lot_number: Option<String>,
    pub provider_id: Option<i64>,
    pub visit_occurrence_id: Option<i64>,
    pub visit_detail_id: Option<i64>,
    pub drug_source_value: Option<String>,
    pub drug_source_concept_id: i64,
    pub route_source_value: Option<String>,
    pub dose_unit_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceExposure {
    pub device_exposure_id: i64,
    pub person_id: i64,
    pub device_concept_id: i64,
    pub device_exposure_start_date: NaiveDate,
    pub device_exposure_start_datetime: Option<NaiveDateTime>,
    pub device_exposure_end_date: Option<NaiveDate>,
    pub device_exposure_end_datetime: Option<NaiveDateTime>,
    pub device_type_concept_id: i64,
    pub unique_device_id: Option<String>,
    pub quantity: Option<i64>,
    pub provider_id: Option<i64>,
    pub visit_occurrence_id: Option<i64>,
    pub visit_detail_id: Option<i64>,
    pub device_source_value: Option<String>,
    pub device_source_concept_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub measurement_id: i64,
    pub person_id: i64,
    pub measurement_concept_id: i64,
    pub measurement_date: NaiveDate,
    pub measurement_datetime: Option<NaiveDateTime>,
    pub measurement_type_concept_id: i64,
    pub operator_concept_id: Option<i64>,
    pub value_as_number: Option<f64>,
    pub value_as_concept_id: Option<i64>,
    pub unit_concept_id: Option<i64>,
    pub range_low: Option<f64>,
    pub range_high: Option<f64>,
    pub provider_id: Option<i64>,
    pub visit_occurrence_id: Option<i64>,
    pub visit_detail_id: Option<i64>,
    pub measurement_source_value: Option<String>,
    pub measurement_source_concept_id: i64,
    pub unit_source_value: Option<String>,
    pub value_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub observation_id: i64,
    pub person_id: i64,
    pub observation_concept_id: i64,
    pub observation_date: NaiveDate,
    pub observation_datetime: Option<NaiveDateTime>,
    pub observation_type_concept_id: i64,
    pub value_as_number: Option<f64>,
    pub value_as_string: Option<String>,
    pub value_as_concept_id: Option<i64>,
    pub qualifier_concept_id: Option<i64>,
    pub unit_concept_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub visit_occurrence_id: Option<i64>,
    pub visit_detail_id: Option<i64>,
    pub observation_source_value: Option<String>,
    pub observation_source_concept_id: i64,
    pub unit_source_value: Option<String>,
    pub qualifier_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Specimen {
    pub specimen_id: i64,
    pub person_id: i64,
    pub specimen_concept_id: i64,
    pub specimen_type_concept_id: i64,
    pub specimen_date: NaiveDate,
    pub specimen_datetime: Option<NaiveDateTime>,
    pub quantity: Option<f64>,
    pub unit_concept_id: Option<i64>,
    pub anatomic_site_concept_id: i64,
    pub disease_status_concept_id: i64,
    pub specimen_source_id: Option<String>,
    pub specimen_source_value: Option<String>,
    pub unit_source_value: Option<String>,
    pub anatomic_site_source_value: Option<String>,
    pub disease_status_source_value: Option<String>,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactRelationship {
    pub domain_concept_id_1: i64,
    pub fact_id_1: i64,
    pub domain_concept_id_2: i64,
    pub fact_id_2: i64,
    pub relationship_concept_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservationPeriod {
    pub observation_period_id: i64,
    pub person_id: i64,
    pub observation_period_start_date: NaiveDate,
    pub observation_period_end_date: NaiveDate,
    pub period_type_concept_id: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionEra {
    pub condition_era_id: i64,
    pub person_id: i64,
    pub condition_concept_id: i64,
    pub condition_era_start_date: NaiveDate,
    pub condition_era_end_date: NaiveDate,
    pub condition_occurrence_count: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrugEra {
    pub drug_era_id: i64,
    pub person_id: i64,
    pub drug_concept_id: i64,
    pub drug_era_start_date: NaiveDate,
    pub drug_era_end_date: NaiveDate,
    pub drug_exposure_count: i64,
    pub gap_days: i64,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoseEra {
    pub dose_era_id: i64,
    pub person_id: i64,
    pub drug_concept_id: i64,
    pub unit_concept_id: i64,
    pub dose_value: f64,
    pub dose_era_start_date: NaiveDate,
    pub dose_era_end_date: NaiveDate,
    #[serde(skip_serializing)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdmSource {
    pub cdm_source_name: String,
    pub cdm_source_abbreviation: String,
    pub cdm_holder: Option<String>,
    pub source_description: Option<String>,
    pub source_documentation_reference: Option<String>,
    pub cdm_etl_reference: Option<String>,
    pub source_release_date: Option<NaiveDate>,
    pub cdm_release_date: Option<NaiveDate>,
    pub cdm_version: String,
    pub vocabulary_version: Option<String>,
}
