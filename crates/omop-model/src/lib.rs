pub mod cdm;
pub mod custom;
pub mod error;
pub mod fact;
pub mod ids;
pub mod provenance;
pub mod vocab;

pub use cdm::{
    CareSite, CdmSource, ConditionEra, ConditionOccurrence, Death, DeviceExposure, DoseEra,
    DrugEra, DrugExposure, FactRelationship, Location, Measurement, Observation,
    ObservationPeriod, Person, ProcedureOccurrence, Specimen, VisitDetail, VisitOccurrence,
};
pub use custom::CustomMapping;
pub use error::{EtlError, Result};
pub use fact::{DrugDetail, FactValue, MappedFact, TargetDomain};
pub use ids::KeyGenerator;
pub use provenance::Provenance;
pub use vocab::{
    CONCEPT_ID_NO_MATCH, CUSTOM_CONCEPT_ID_FLOOR, CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR, Concept,
    ConceptAncestor, ConceptClass, ConceptRelationship, ConceptSynonym, DomainRecord,
    DrugStrength, InvalidReason, MAPPED_FROM, MAPS_TO, REFERENCE_CONCEPT_ID_CEILING,
    RelationshipRecord, StandardConcept, Vocabulary,
};
