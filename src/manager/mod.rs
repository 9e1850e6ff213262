//! ## Assignment manager
//!
//! One assignment round, run every [`config::ASSIGN_INTERVAL`] by the request-control loop:
//! 1. [`conflict::resolve_conflicts`] cleans the hall table.
//! 2. [`RosterBaseline::tick`] decides between the solver and the isolated-node takeover.
//! 3. [`build_solver_input`] collects the open hall calls and the available elevators, and the
//!    [`json_serial::HallRequestAssigner`] distributes them.
//! 4. [`commit_assignment`] claims the local share.
//! 5. [`unified_orders`] builds the order matrix for the FSM.

pub mod conflict;
pub mod json_serial;

use std::collections::BTreeMap;

use crate::config;
use crate::elevio::ButtonType;
use crate::print;
use crate::world_view::ledger::RequestLedger;
use crate::world_view::request::RequestState;
use crate::world_view::{Dirn, ElevatorBehaviour, OrderMatrix};
use json_serial::{AssignerInput, ElevatorStateJson, HallRequestAssigner};

/// Result of one assignment round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentOutcome {
    /// Matrix to push to the FSM.
    pub orders: OrderMatrix,
    /// Hall cells the local node claimed this round.
    pub committed: Vec<(u8, ButtonType)>,
}

/// Remembers the roster size the fleet normally runs with.
///
/// A size that stays unchanged for [`config::BASELINE_STABLE_TICKS`] rounds becomes the baseline,
/// and a larger stable size raises it. Once the roster has been smaller than the baseline for
/// [`config::BASELINE_DROP_TICKS`] rounds in a row, the local node takes over every open hall call.
#[derive(Debug, Clone, Default)]
pub struct RosterBaseline {
    baseline: Option<usize>,
    last_size: usize,
    stable_ticks: u32,
    reduced_ticks: u32,
}

impl RosterBaseline {
    /// No baseline yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Established baseline, if any.
    pub fn baseline(&self) -> Option<usize> {
        self.baseline
    }

    /// Feeds the roster size of this round.
    ///
    /// ## Returns
    /// `true` if the takeover is active.
    pub fn tick(&mut self, size: usize) -> bool {
        if size == self.last_size {
            self.stable_ticks = self.stable_ticks.saturating_add(1);
        } else {
            self.last_size = size;
            self.stable_ticks = 1;
        }

        if self.stable_ticks >= config::BASELINE_STABLE_TICKS && self.baseline.map_or(true, |b| size > b) {
            print::info(format!("Roster baseline set to {}", size));
            self.baseline = Some(size);
        }

        match self.baseline {
            Some(b) if size < b => self.reduced_ticks = self.reduced_ticks.saturating_add(1),
            _ => self.reduced_ticks = 0,
        }

        if self.reduced_ticks == config::BASELINE_DROP_TICKS {
            print::warn(format!(
                "Roster has been below its baseline of {:?} for {} rounds, taking over open hall calls",
                self.baseline, self.reduced_ticks
            ));
        }
        self.reduced_ticks >= config::BASELINE_DROP_TICKS
    }
}

fn behaviour_str(b: ElevatorBehaviour) -> &'static str {
    match b {
        ElevatorBehaviour::Idle => "idle",
        ElevatorBehaviour::Moving => "moving",
        ElevatorBehaviour::DoorOpen => "doorOpen",
    }
}

fn dirn_str(d: Dirn) -> &'static str {
    match d {
        Dirn::Up => "up",
        Dirn::Down => "down",
        Dirn::Stop => "stop",
    }
}

/// Builds the assigner input from the ledger.
///
/// Hall calls are included while Unassigned with a non-empty aware list. Elevators are included
/// when they report themselves available, are in the roster and have a known floor.
pub fn build_solver_input(ledger: &RequestLedger) -> AssignerInput {
    let hall_requests = ledger
        .hall
        .iter()
        .map(|row| {
            let open = |i: usize| row[i].state == RequestState::Unassigned && !row[i].aware_list.is_empty();
            [open(0), open(1)]
        })
        .collect();

    let mut states = BTreeMap::new();
    for (id, info) in &ledger.elevators {
        if !info.available || !ledger.in_roster(id) {
            continue;
        }
        let Some(floor) = info.current_floor else {
            continue;
        };
        let cab_requests = ledger
            .cabs
            .get(id)
            .map(|cabs| cabs.iter().map(|r| r.state == RequestState::Assigned).collect())
            .unwrap_or_else(|| vec![false; config::N_FLOORS]);

        states.insert(
            id.clone(),
            ElevatorStateJson {
                behaviour: behaviour_str(info.behaviour).to_string(),
                floor: floor as i32,
                direction: dirn_str(info.dirn).to_string(),
                cabRequests: cab_requests,
            },
        );
    }

    AssignerInput { hallRequests: hall_requests, states }
}

/// Claims hall calls for the local node.
///
/// ## Parameters
/// `assigned`: Local slice of the assigner output, if the assigner ran
/// `takeover`: Claim every hall call that is not Completed and has someone aware of it
///
/// ## Behavior
/// A wanted cell is claimed (Assigned, only the local node aware, count unchanged) unless another
/// node holds it, see [`RequestLedger::is_uncontested`]. Cells the local node already owns alone are skipped.
///
/// ## Returns
/// The claimed cells.
pub fn commit_assignment(ledger: &mut RequestLedger, assigned: Option<&OrderMatrix>, takeover: bool) -> Vec<(u8, ButtonType)> {
    let local_id = ledger.local_id().to_string();
    let mut committed = Vec::new();

    for floor in 0..config::N_FLOORS {
        for button in [ButtonType::HallUp, ButtonType::HallDown] {
            let record = ledger.hall_record(floor, button);
            let wanted = if takeover {
                record.state != RequestState::Completed && !record.aware_list.is_empty()
            } else {
                assigned.map_or(false, |m| m[floor][button.index()])
            };
            if !wanted
                || ledger.is_sole_assigned_to_local(floor, button)
                || !ledger.is_uncontested(floor, button)
            {
                continue;
            }

            let record = &mut ledger.hall[floor][button.index()];
            record.state = RequestState::Assigned;
            record.reset_aware(&local_id);
            committed.push((floor as u8, button));
        }
    }
    committed
}

/// Order matrix for the FSM: hall calls the local node owns alone plus its Assigned cab calls.
pub fn unified_orders(ledger: &RequestLedger) -> OrderMatrix {
    let mut orders = OrderMatrix::default();
    for floor in 0..config::N_FLOORS {
        for button in [ButtonType::HallUp, ButtonType::HallDown] {
            orders[floor][button.index()] = ledger.is_sole_assigned_to_local(floor, button);
        }
    }
    for (floor, record) in ledger.local_cabs().iter().enumerate() {
        orders[floor][ButtonType::Cab.index()] = record.state == RequestState::Assigned;
    }
    orders
}

/// Hall cells the local node committed last, i.e. Assigned with the local node at the head.
fn owned_hall_cells(ledger: &RequestLedger) -> OrderMatrix {
    let mut owned = OrderMatrix::default();
    for floor in 0..config::N_FLOORS {
        for button in [ButtonType::HallUp, ButtonType::HallDown] {
            let record = ledger.hall_record(floor, button);
            owned[floor][button.index()] = record.state == RequestState::Assigned
                && record.aware_list.first().map(String::as_str) == Some(ledger.local_id());
        }
    }
    owned
}

/// Runs one assignment round.
///
/// The assigner is skipped when no elevator qualifies, when no hall call is open, or during a takeover.
/// When the assigner is skipped or fails, the hall calls the local node owned before the sweep
/// are claimed again, so the previous assignment stays in effect.
pub async fn run_assignment<A: HallRequestAssigner>(
    ledger: &mut RequestLedger,
    baseline: &mut RosterBaseline,
    assigner: &A,
) -> AssignmentOutcome {
    let owned = owned_hall_cells(ledger);
    conflict::resolve_conflicts(ledger);
    let takeover = baseline.tick(ledger.roster_size());

    let mut local_share = None;
    if !takeover {
        let input = build_solver_input(ledger);
        let any_open = input.hallRequests.iter().any(|row| row[0] || row[1]);
        if !input.states.is_empty() && any_open {
            match assigner.assign(&input).await {
                Ok(output) => local_share = Some(output.get(ledger.local_id()).copied().unwrap_or_default()),
                Err(e) => print::err(format!("Hall request assigner failed: {:#}", e)),
            }
        }
        if local_share.is_none() {
            local_share = Some(owned);
        }
    }

    let committed = commit_assignment(ledger, local_share.as_ref(), takeover);
    for (floor, button) in &committed {
        print::ok(format!("{} assigned {}/{}", ledger.local_id(), floor, button.index()));
    }

    AssignmentOutcome { orders: unified_orders(ledger), committed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PeerUpdate;
    use crate::world_view::request::RequestRecord;
    use crate::world_view::ElevatorInfo;
    use json_serial::AssignerOutput;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rec(state: RequestState, count: u32, aware: &[&str]) -> RequestRecord {
        RequestRecord { state, count, aware_list: aware.iter().map(|a| a.to_string()).collect() }
    }

    fn ledger(id: &str, peers: &[&str]) -> RequestLedger {
        let mut ledger = RequestLedger::new(id, None);
        ledger.connected = true;
        ledger.roster.apply(&PeerUpdate {
            peers: peers.iter().map(|p| p.to_string()).collect(),
            new: None,
            lost: Vec::new(),
        });
        ledger.update_local_info(ElevatorInfo { available: true, current_floor: Some(1), ..Default::default() });
        ledger
    }

    /// Counts calls and hands out a fixed answer.
    #[derive(Default)]
    struct Scripted {
        answer: Option<AssignerOutput>,
        calls: AtomicUsize,
    }

    impl HallRequestAssigner for Scripted {
        fn assign(&self, _input: &AssignerInput) -> impl Future<Output = anyhow::Result<AssignerOutput>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answer.clone().ok_or_else(|| anyhow::anyhow!("solver crashed"));
            std::future::ready(answer)
        }
    }

    #[test]
    fn baseline_needs_a_stable_roster_and_a_sustained_drop() {
        let mut b = RosterBaseline::new();
        for _ in 0..config::BASELINE_STABLE_TICKS - 1 {
            assert!(!b.tick(3));
        }
        assert_eq!(b.baseline(), None);
        assert!(!b.tick(3));
        assert_eq!(b.baseline(), Some(3));

        for _ in 0..config::BASELINE_DROP_TICKS - 1 {
            assert!(!b.tick(1));
        }
        assert!(b.tick(1));
        assert!(b.tick(1));

        // Recovery ends the takeover at once.
        assert!(!b.tick(3));
        assert!(!b.tick(1));
    }

    #[test]
    fn solver_input_only_has_open_calls_and_usable_elevators() {
        let mut l = ledger("a", &["a", "b"]);
        l.hall[0][0] = rec(RequestState::Unassigned, 1, &["a"]);
        l.hall[1][1] = rec(RequestState::Unassigned, 1, &[]);
        l.hall[2][0] = rec(RequestState::Assigned, 1, &["b"]);
        l.hall[3][1] = rec(RequestState::Completed, 1, &["a"]);
        l.cabs.get_mut("a").unwrap()[3] = rec(RequestState::Assigned, 0, &["a"]);
        l.elevators.insert(
            "b".into(),
            ElevatorInfo {
                available: true,
                behaviour: ElevatorBehaviour::DoorOpen,
                dirn: Dirn::Down,
                current_floor: Some(2),
                ..Default::default()
            },
        );
        l.elevators.insert("c".into(), ElevatorInfo { available: true, current_floor: Some(0), ..Default::default() });
        l.elevators.insert("d".into(), ElevatorInfo { available: false, current_floor: Some(0), ..Default::default() });

        let input = build_solver_input(&l);
        assert_eq!(input.hallRequests, vec![[true, false], [false, false], [false, false], [false, false]]);
        assert_eq!(input.states.keys().cloned().collect::<Vec<_>>(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(input.states["a"].cabRequests, vec![false, false, false, true]);
        assert_eq!(input.states["b"].behaviour, "doorOpen");
        assert_eq!(input.states["b"].direction, "down");
        assert_eq!(input.states["b"].cabRequests, vec![false; config::N_FLOORS]);
    }

    #[test]
    fn contested_cells_are_not_committed() {
        let mut l = ledger("a", &["a", "b"]);
        // b heads the list and announced the cell as its own.
        l.hall[1][0] = rec(RequestState::Unassigned, 2, &["b", "a"]);
        let mut msg = l.build_message(None);
        msg.sender_id = "b".into();
        msg.hall_requests[1][0] = rec(RequestState::Assigned, 2, &["b"]);
        l.record_peer_claims(&msg);
        // b heads the list but claims nothing.
        l.hall[2][0] = rec(RequestState::Unassigned, 2, &["b", "a"]);
        // Only a is aware.
        l.hall[3][1] = rec(RequestState::Unassigned, 0, &["a"]);

        let mut wanted = OrderMatrix::default();
        wanted[1][0] = true;
        wanted[2][0] = true;
        wanted[3][1] = true;

        let committed = commit_assignment(&mut l, Some(&wanted), false);
        assert_eq!(committed, vec![(2, ButtonType::HallUp), (3, ButtonType::HallDown)]);
        assert_eq!(l.hall[1][0].state, RequestState::Unassigned);
        assert_eq!(l.hall[2][0], rec(RequestState::Assigned, 2, &["a"]));
    }

    #[test]
    fn unified_orders_merge_owned_hall_and_cab_calls() {
        let mut l = ledger("a", &["a", "b"]);
        l.hall[0][0] = rec(RequestState::Assigned, 1, &["a"]);
        l.hall[1][0] = rec(RequestState::Assigned, 1, &["b"]);
        l.cabs.get_mut("a").unwrap()[2] = rec(RequestState::Assigned, 0, &["a"]);
        l.cabs.get_mut("a").unwrap()[3] = rec(RequestState::Completed, 1, &["a"]);

        let orders = unified_orders(&l);
        let mut expected = OrderMatrix::default();
        expected[0][ButtonType::HallUp.index()] = true;
        expected[2][ButtonType::Cab.index()] = true;
        assert_eq!(orders, expected);
    }

    #[tokio::test]
    async fn solver_failure_still_pushes_owned_orders() {
        let mut l = ledger("a", &["a"]);
        l.hall[0][1] = rec(RequestState::Unassigned, 0, &["a"]);
        l.cabs.get_mut("a").unwrap()[2] = rec(RequestState::Assigned, 0, &["a"]);
        let solver = Scripted::default();

        let out = run_assignment(&mut l, &mut RosterBaseline::new(), &solver).await;
        assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
        assert!(out.committed.is_empty());
        assert!(out.orders[2][ButtonType::Cab.index()]);
        assert_eq!(l.hall[0][1].state, RequestState::Unassigned);
    }

    #[tokio::test]
    async fn solver_failure_keeps_acknowledged_hall_calls() {
        let mut l = ledger("a", &["a", "b"]);
        // a committed 2/Up and b has acknowledged it.
        l.hall[2][0] = rec(RequestState::Assigned, 0, &["a", "b"]);
        // b owns 3/Down.
        l.hall[3][1] = rec(RequestState::Assigned, 0, &["b", "a"]);
        let solver = Scripted::default();

        let out = run_assignment(&mut l, &mut RosterBaseline::new(), &solver).await;
        assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.committed, vec![(2, ButtonType::HallUp)]);
        assert!(out.orders[2][ButtonType::HallUp.index()]);
        assert!(!out.orders[3][ButtonType::HallDown.index()]);
        assert_eq!(l.hall[2][0], rec(RequestState::Assigned, 0, &["a"]));
        assert_eq!(l.hall[3][1].state, RequestState::Unassigned);
    }

    #[tokio::test]
    async fn unavailable_node_keeps_its_hall_calls_while_the_solver_is_skipped() {
        let mut l = ledger("a", &["a", "b"]);
        l.update_local_info(ElevatorInfo { available: false, current_floor: Some(1), ..Default::default() });
        l.hall[0][0] = rec(RequestState::Assigned, 3, &["a", "b"]);
        let solver = Scripted::default();

        let out = run_assignment(&mut l, &mut RosterBaseline::new(), &solver).await;
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
        assert!(out.orders[0][ButtonType::HallUp.index()]);
        assert!(l.is_sole_assigned_to_local(0, ButtonType::HallUp));
    }

    #[tokio::test]
    async fn solver_answer_without_local_share_drops_previous_claims() {
        let mut l = ledger("a", &["a", "b"]);
        l.elevators.insert("b".into(), ElevatorInfo { available: true, current_floor: Some(2), ..Default::default() });
        l.hall[2][0] = rec(RequestState::Assigned, 0, &["a", "b"]);
        let mut answer = AssignerOutput::new();
        answer.insert("b".into(), OrderMatrix::default());
        let solver = Scripted { answer: Some(answer), ..Default::default() };

        let out = run_assignment(&mut l, &mut RosterBaseline::new(), &solver).await;
        assert!(out.committed.is_empty());
        assert!(!out.orders[2][ButtonType::HallUp.index()]);
    }

    #[tokio::test]
    async fn no_available_elevator_skips_the_solver() {
        let mut l = ledger("a", &["a"]);
        l.update_local_info(ElevatorInfo::default());
        l.hall[0][0] = rec(RequestState::Unassigned, 0, &["a"]);
        let solver = Scripted::default();

        run_assignment(&mut l, &mut RosterBaseline::new(), &solver).await;
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn isolated_node_takes_over_after_baseline_drop() {
        let mut l = ledger("a", &["a", "b"]);
        l.elevators.insert("b".into(), ElevatorInfo { available: true, current_floor: Some(3), ..Default::default() });
        // b keeps winning the call while it is around.
        l.hall[2][0] = rec(RequestState::Unassigned, 4, &["b", "a"]);
        l.hall[3][1] = rec(RequestState::Completed, 4, &["b", "a"]);

        let mut answer = AssignerOutput::new();
        answer.insert("a".into(), OrderMatrix::default());
        let mut to_b = OrderMatrix::default();
        to_b[2][ButtonType::HallUp.index()] = true;
        answer.insert("b".into(), to_b);
        let solver = Scripted { answer: Some(answer), ..Default::default() };

        let mut baseline = RosterBaseline::new();
        for _ in 0..config::BASELINE_STABLE_TICKS {
            run_assignment(&mut l, &mut baseline, &solver).await;
        }
        assert_eq!(baseline.baseline(), Some(2));

        // b vanishes from the roster without a departure being declared.
        l.roster.apply(&PeerUpdate { peers: vec!["a".into()], new: None, lost: vec!["b".into()] });
        for _ in 0..config::BASELINE_DROP_TICKS - 1 {
            let out = run_assignment(&mut l, &mut baseline, &solver).await;
            assert!(out.committed.is_empty());
        }
        let out = run_assignment(&mut l, &mut baseline, &solver).await;
        assert_eq!(out.committed, vec![(2, ButtonType::HallUp)]);
        assert!(out.orders[2][ButtonType::HallUp.index()]);
        assert_eq!(l.hall[3][1].state, RequestState::Completed);
    }
}
