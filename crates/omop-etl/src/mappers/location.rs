//! Location: the extract is de-identified to a single hospital
//! campus, so the CDM gets one location row every person shares.

use omop_model::{Location, Provenance, Result};

use crate::state::EtlState;

pub const SOURCE_STATE: &str = "MA";

pub fn migrate(state: &mut EtlState) -> Result<()> {
    let location_id = state.keys.next_id("location");
    state.cdm.locations.push(Location {
        location_id,
        address_1: None,
        address_2: None,
        city: None,
        state: Some(SOURCE_STATE.to_string()),
        zip: None,
        county: None,
        location_source_value: Some(SOURCE_STATE.to_string()),
        provenance: Provenance::new("location", "patients", None, "location:0"),
    });
    state.record_audit("location", 1, 1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_single_shared_location() {
        let mut state = EtlState::new();
        migrate(&mut state).unwrap();
        assert_eq!(state.cdm.locations.len(), 1);
        assert_eq!(state.cdm.locations[0].state.as_deref(), Some("MA"));
    }
}
