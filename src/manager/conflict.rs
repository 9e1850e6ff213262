//! Demotion sweep run before every assignment round.

use crate::config;
use crate::elevio::ButtonType;
use crate::print;
use crate::world_view::ledger::RequestLedger;
use crate::world_view::request::RequestState;

/// Drops departed nodes from every hall aware list and demotes contested assignments.
///
/// ## Behavior
/// - Every hall aware list keeps only roster members, in their original order.
/// - An Assigned record with more than one roster member left is demoted to Unassigned.
///   The count is kept, so the demotion is a local correction and not a new life-cycle.
///
/// ## Returns
/// The demoted cells.
pub fn resolve_conflicts(ledger: &mut RequestLedger) -> Vec<(u8, ButtonType)> {
    let mut demoted = Vec::new();

    for floor in 0..config::N_FLOORS {
        for button in [ButtonType::HallUp, ButtonType::HallDown] {
            let filtered: Vec<String> = ledger
                .roster_aware(ledger.hall_record(floor, button))
                .cloned()
                .collect();

            let record = &mut ledger.hall[floor][button.index()];
            record.aware_list = filtered;
            if record.state == RequestState::Assigned && record.aware_list.len() > 1 {
                record.state = RequestState::Unassigned;
                demoted.push((floor as u8, button));
            }
        }
    }

    if !demoted.is_empty() {
        print::info(format!("Demoted contested hall calls: {:?}", demoted));
    }
    demoted
}
