//! Registry of the source extract tables and their expected columns.
//!
//! The column lists are the contract with the extract producer: a
//! missing column fails the import before any mapping runs.

use omop_model::{EtlError, Result};

#[derive(Debug, Clone, Copy)]
pub struct SourceTable {
    pub name: &'static str,
    /// Default file name inside the extract directory.
    pub file_name: &'static str,
    pub columns: &'static [&'static str],
}

pub const SOURCE_TABLES: &[SourceTable] = &[
    SourceTable {
        name: "patients",
        file_name: "patients.csv",
        columns: &[
            "subject_id",
            "gender",
            "anchor_age",
            "anchor_year",
            "anchor_year_group",
            "dod",
        ],
    },
    SourceTable {
        name: "admissions",
        file_name: "admissions.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "admittime",
            "dischtime",
            "deathtime",
            "admission_type",
            "admission_location",
            "discharge_location",
            "insurance",
            "language",
            "marital_status",
            "ethnicity",
            "edregtime",
            "edouttime",
            "hospital_expire_flag",
        ],
    },
    SourceTable {
        name: "transfers",
        file_name: "transfers.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "transfer_id",
            "eventtype",
            "careunit",
            "intime",
            "outtime",
        ],
    },
    SourceTable {
        name: "services",
        file_name: "services.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "transfertime",
            "prev_service",
            "curr_service",
        ],
    },
    SourceTable {
        name: "diagnoses_icd",
        file_name: "diagnoses_icd.csv",
        columns: &["subject_id", "hadm_id", "seq_num", "icd_code", "icd_version"],
    },
    SourceTable {
        name: "procedures_icd",
        file_name: "procedures_icd.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "seq_num",
            "chartdate",
            "icd_code",
            "icd_version",
        ],
    },
    SourceTable {
        name: "hcpcsevents",
        file_name: "hcpcsevents.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "chartdate",
            "hcpcs_cd",
            "seq_num",
            "short_description",
        ],
    },
    SourceTable {
        name: "drgcodes",
        file_name: "drgcodes.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "drg_type",
            "drg_code",
            "description",
            "drg_severity",
            "drg_mortality",
        ],
    },
    SourceTable {
        name: "prescriptions",
        file_name: "prescriptions.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "pharmacy_id",
            "starttime",
            "stoptime",
            "drug_type",
            "drug",
            "gsn",
            "ndc",
            "prod_strength",
            "form_rx",
            "dose_val_rx",
            "dose_unit_rx",
            "form_val_disp",
            "form_unit_disp",
            "doses_per_24_hrs",
            "route",
        ],
    },
    // Staged only: part of the extract contract, but no mapper reads
    // it; drug exposures come from prescriptions.
    SourceTable {
        name: "pharmacy",
        file_name: "pharmacy.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "pharmacy_id",
            "poe_id",
            "starttime",
            "stoptime",
            "medication",
            "proc_type",
            "status",
            "entertime",
            "verifiedtime",
            "route",
            "frequency",
            "disp_sched",
            "infusion_type",
            "sliding_scale",
            "lockout_interval",
            "basal_rate",
            "one_hr_max",
            "doses_per_24_hrs",
            "duration",
            "duration_interval",
            "expiration_value",
            "expiration_unit",
            "expirationdate",
            "dispensation",
            "fill_quantity",
        ],
    },
    SourceTable {
        name: "labevents",
        file_name: "labevents.csv",
        columns: &[
            "labevent_id",
            "subject_id",
            "hadm_id",
            "specimen_id",
            "itemid",
            "charttime",
            "storetime",
            "value",
            "valuenum",
            "valueuom",
            "ref_range_lower",
            "ref_range_upper",
            "flag",
            "priority",
            "comments",
        ],
    },
    SourceTable {
        name: "d_labitems",
        file_name: "d_labitems.csv",
        columns: &["itemid", "label", "fluid", "category", "loinc_code"],
    },
    SourceTable {
        name: "microbiologyevents",
        file_name: "microbiologyevents.csv",
        columns: &[
            "microevent_id",
            "subject_id",
            "hadm_id",
            "micro_specimen_id",
            "chartdate",
            "charttime",
            "spec_itemid",
            "spec_type_desc",
            "storedate",
            "storetime",
            "test_seq",
            "test_itemid",
            "test_name",
            "org_itemid",
            "org_name",
            "isolate_num",
            "quantity",
            "ab_itemid",
            "ab_name",
            "dilution_text",
            "dilution_comparison",
            "dilution_value",
            "interpretation",
            "comments",
        ],
    },
    SourceTable {
        name: "d_micro",
        file_name: "d_micro.csv",
        columns: &["itemid", "label", "category"],
    },
    SourceTable {
        name: "d_items",
        file_name: "d_items.csv",
        columns: &[
            "itemid",
            "label",
            "abbreviation",
            "linksto",
            "category",
            "unitname",
            "param_type",
            "lownormalvalue",
            "highnormalvalue",
        ],
    },
    SourceTable {
        name: "chartevents",
        file_name: "chartevents.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "stay_id",
            "charttime",
            "storetime",
            "itemid",
            "value",
            "valuenum",
            "valueuom",
            "warning",
        ],
    },
    SourceTable {
        name: "datetimeevents",
        file_name: "datetimeevents.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "stay_id",
            "charttime",
            "storetime",
            "itemid",
            "value",
            "valueuom",
            "warning",
        ],
    },
    SourceTable {
        name: "procedureevents",
        file_name: "procedureevents.csv",
        columns: &[
            "subject_id",
            "hadm_id",
            "stay_id",
            "starttime",
            "endtime",
            "storetime",
            "itemid",
            "value",
            "valueuom",
            "location",
            "locationcategory",
            "orderid",
            "linkorderid",
            "ordercategoryname",
            "ordercategorydescription",
            "patientweight",
            "originalamount",
            "originalrate",
            "cancelreason",
            "statusdescription",
        ],
    },
];

pub fn source_table(name: &str) -> Result<&'static SourceTable> {
    SOURCE_TABLES
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| EtlError::message(format!("unknown source table {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique() {
        let mut names: Vec<&str> = SOURCE_TABLES.iter().map(|t| t.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(source_table("labevents").unwrap().columns.len(), 15);
        assert!(source_table("nope").is_err());
    }

    #[test]
    fn staged_only_pharmacy_stays_in_the_contract() {
        let table = source_table("pharmacy").unwrap();
        assert_eq!(table.file_name, "pharmacy.csv");
        assert!(table.columns.contains(&"medication"));
    }
}
