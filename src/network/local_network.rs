//! ## Request-control loop
//!
//! This is the "heart" of the node. It owns the [`RequestLedger`] and is the only task that mutates it.
//! Every other part of the program talks to it through channels:
//! - button presses from the pollers and completions from the FSM
//! - peer updates from the heartbeat receiver and messages from the UDP listener
//! - outgoing state broadcasts and order matrices for the FSM
//!
//! Periodic work (state broadcast, assignment round, departure check, ledger print) runs on
//! tokio intervals inside the same `select!`.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};

use super::{apply_peer_update, check_departures, gossip, DepartureTracker, PeerUpdate};
use crate::backup::CabBackup;
use crate::config;
use crate::elevator_logic::lights::LampSync;
use crate::elevio::{ButtonEvent, ButtonType, IoHandle};
use crate::manager::json_serial::HallRequestAssigner;
use crate::manager::{self, RosterBaseline};
use crate::print;
use crate::world_view::ledger::{PressOutcome, RequestLedger};
use crate::world_view::{NetworkMessage, OrderMatrix, SharedElevatorInfo};

// --- MPSC-KANALAR ---
/// Receivers the request-control loop listens on.
pub struct RequestControlChannels {
    /// Button presses from the pollers.
    pub buttons: mpsc::Receiver<ButtonEvent>,
    /// Cleared calls from the FSM.
    pub completed: mpsc::Receiver<ButtonEvent>,
    /// Membership changes from the heartbeat receiver.
    pub peer_updates: mpsc::Receiver<PeerUpdate>,
    /// Messages from the UDP listener.
    pub inbound: mpsc::Receiver<NetworkMessage>,
}

/// State and outputs of the request-control loop.
pub struct RequestControl<A: HallRequestAssigner> {
    ledger: RequestLedger,
    departures: DepartureTracker,
    baseline: RosterBaseline,
    lamps: LampSync,
    io: IoHandle,
    shared: SharedElevatorInfo,
    backup: Option<CabBackup>,
    assigner: A,
    outbound: mpsc::Sender<NetworkMessage>,
    orders: mpsc::Sender<OrderMatrix>,
}

impl<A: HallRequestAssigner> RequestControl<A> {
    /// Creates the loop state.
    ///
    /// ## Parameters
    /// `ledger`: Initial ledger, with the restored cab calls already in it
    /// `io`: Lamp outputs
    /// `shared`: Snapshot published by the FSM
    /// `backup`: Where to persist the local cab calls, `None` to skip persistence
    /// `assigner`: Hall request assigner
    /// `outbound`: Messages for the UDP broadcaster
    /// `orders`: Order matrices for the FSM
    pub fn new(
        ledger: RequestLedger,
        io: IoHandle,
        shared: SharedElevatorInfo,
        backup: Option<CabBackup>,
        assigner: A,
        outbound: mpsc::Sender<NetworkMessage>,
        orders: mpsc::Sender<OrderMatrix>,
    ) -> Self {
        RequestControl {
            ledger,
            departures: DepartureTracker::new(),
            baseline: RosterBaseline::new(),
            lamps: LampSync::default(),
            io,
            shared,
            backup,
            assigner,
            outbound,
            orders,
        }
    }

    /// Read access to the ledger.
    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    fn refresh_local_info(&mut self) {
        self.ledger.update_local_info(self.shared.snapshot());
    }

    fn sync_lamps(&mut self, force: bool) {
        // The FSM has switched every lamp off and keeps them off while the stop is latched.
        if self.shared.snapshot().stop_active {
            self.lamps.forget();
            return;
        }
        let desired = self.ledger.desired_lamps(self.lamps.lit());
        self.lamps.sync(&self.io, &desired, force);
    }

    fn persist_cabs(&self) {
        if let Some(backup) = &self.backup {
            if let Err(e) = backup.save(&self.ledger.local_cabs()) {
                print::err(format!("Could not persist cab calls: {:#}", e));
            }
        }
    }

    fn push_orders(&self, orders: OrderMatrix) {
        match self.orders.try_send(orders) {
            Ok(()) => {}
            // The FSM gets a fresher matrix next round.
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => print::err("FSM order channel is closed".to_string()),
        }
    }

    /// Applies a button press.
    pub fn handle_button(&mut self, ev: ButtonEvent) {
        self.refresh_local_info();
        let info = self.ledger.local_info();
        match self.ledger.on_button_press(ev, &info) {
            Ok(PressOutcome::Dropped) => {
                print::warn(format!("Hall press at floor {} dropped, not connected", ev.floor));
            }
            Ok(PressOutcome::Unchanged) | Ok(PressOutcome::HallUpdated) => {}
            Ok(PressOutcome::HallServedLocally) => {
                self.push_orders(manager::unified_orders(&self.ledger));
            }
            Ok(PressOutcome::CabUpdated) => {
                self.persist_cabs();
                self.push_orders(manager::unified_orders(&self.ledger));
            }
            Err(e) => print::err(format!("Rejected button press: {:#}", e)),
        }
        self.sync_lamps(false);
    }

    /// Applies a completion reported by the FSM.
    pub fn handle_completed(&mut self, ev: ButtonEvent) {
        match self.ledger.on_request_completed(ev) {
            Ok(true) => {
                if ev.button == ButtonType::Cab {
                    self.persist_cabs();
                }
            }
            Ok(false) => {}
            Err(e) => print::err(format!("Rejected completion: {:#}", e)),
        }
        self.sync_lamps(false);
    }

    /// Applies a membership change.
    pub fn handle_peer_update(&mut self, update: &PeerUpdate, now: Instant) {
        apply_peer_update(&mut self.ledger, &mut self.departures, update, now);
    }

    /// Merges a received message.
    pub fn handle_message(&mut self, msg: &NetworkMessage) {
        if let Some(outcome) = gossip::merge_message(&mut self.ledger, msg) {
            if outcome.local_cabs_changed {
                self.persist_cabs();
            }
            self.sync_lamps(false);
        }
    }

    /// Broadcasts the local state, if connected.
    pub fn broadcast(&mut self, debug_log: Option<String>) {
        if !self.ledger.connected {
            return;
        }
        self.refresh_local_info();
        match self.outbound.try_send(self.ledger.build_message(debug_log)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => print::warn("Broadcast queue full, skipping one message".to_string()),
            Err(TrySendError::Closed(_)) => print::err("Broadcast channel is closed".to_string()),
        }
    }

    /// Runs one assignment round and hands the result to the FSM.
    ///
    /// Every commit is announced at once. All lamps are rewritten.
    pub async fn assignment_tick(&mut self) {
        self.refresh_local_info();
        let outcome = manager::run_assignment(&mut self.ledger, &mut self.baseline, &self.assigner).await;

        for (floor, button) in &outcome.committed {
            let note = format!("{} assigned {}/{}", self.ledger.local_id(), floor, button.index());
            self.broadcast(Some(note));
        }
        self.push_orders(outcome.orders);
        self.sync_lamps(true);
    }

    /// Releases departed peers' hall calls and reassigns at once if any left.
    pub async fn liveness_tick(&mut self, now: Instant) {
        if !check_departures(&mut self.ledger, &mut self.departures, now).is_empty() {
            self.assignment_tick().await;
        }
    }

    /// Runs the loop.
    ///
    /// ## Note
    /// This function is permanently blocking, and should be called asynchronously
    pub async fn run(mut self, mut chs: RequestControlChannels) {
        let mut broadcast_tick = tokio::time::interval(config::BROADCAST_INTERVAL);
        let mut assign_tick = tokio::time::interval(config::ASSIGN_INTERVAL);
        let mut liveness_tick = tokio::time::interval(config::LIVENESS_CHECK_INTERVAL);
        let mut print_tick = tokio::time::interval(config::LEDGER_PRINT_INTERVAL);
        assign_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        print_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                Some(ev) = chs.completed.recv() => self.handle_completed(ev),
                Some(ev) = chs.buttons.recv() => self.handle_button(ev),
                Some(update) = chs.peer_updates.recv() => self.handle_peer_update(&update, Instant::now()),
                Some(msg) = chs.inbound.recv() => self.handle_message(&msg),
                _ = broadcast_tick.tick() => self.broadcast(None),
                _ = assign_tick.tick() => self.assignment_tick().await,
                _ = liveness_tick.tick() => self.liveness_tick(Instant::now()).await,
                _ = print_tick.tick() => print::ledger(&self.ledger),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevio::testing::RecordingIo;
    use crate::manager::json_serial::{AssignerInput, AssignerOutput};
    use crate::world_view::request::RequestState;
    use crate::world_view::{ElevatorBehaviour, ElevatorInfo};
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;

    /// Hands every open hall call to elevator "a".
    struct AllToA;

    impl HallRequestAssigner for AllToA {
        fn assign(&self, input: &AssignerInput) -> impl Future<Output = anyhow::Result<AssignerOutput>> + Send {
            let mut orders = OrderMatrix::default();
            for (floor, row) in input.hallRequests.iter().enumerate() {
                orders[floor][0] = row[0];
                orders[floor][1] = row[1];
            }
            let mut out = AssignerOutput::new();
            out.insert("a".to_string(), orders);
            std::future::ready(Ok(out))
        }
    }

    struct Harness {
        control: RequestControl<AllToA>,
        rec: Arc<RecordingIo>,
        shared: SharedElevatorInfo,
        outbound: mpsc::Receiver<NetworkMessage>,
        orders: mpsc::Receiver<OrderMatrix>,
    }

    fn harness(backup: Option<CabBackup>) -> Harness {
        let rec = Arc::new(RecordingIo::default());
        let shared = SharedElevatorInfo::new();
        shared.publish(ElevatorInfo { available: true, behaviour: ElevatorBehaviour::Moving, current_floor: Some(0), ..Default::default() });
        let (out_tx, outbound) = mpsc::channel(16);
        let (orders_tx, orders) = mpsc::channel(1);
        let control = RequestControl::new(
            RequestLedger::new("a", None),
            rec.clone(),
            shared.clone(),
            backup,
            AllToA,
            out_tx,
            orders_tx,
        );
        Harness { control, rec, shared, outbound, orders }
    }

    fn join(h: &mut Harness, peers: &[&str]) {
        let update = PeerUpdate { peers: peers.iter().map(|p| p.to_string()).collect(), new: Some("a".into()), lost: Vec::new() };
        h.control.handle_peer_update(&update, Instant::now());
    }

    #[tokio::test]
    async fn hall_press_is_committed_announced_and_lit() {
        let mut h = harness(None);
        join(&mut h, &["a"]);

        h.control.handle_button(ButtonEvent { floor: 2, button: ButtonType::HallDown });
        assert_eq!(h.control.ledger().hall[2][1].state, RequestState::Unassigned);
        assert_eq!(h.rec.button_lamp(2, ButtonType::HallDown), None);

        h.control.assignment_tick().await;
        let msg = h.outbound.try_recv().unwrap();
        assert_eq!(msg.debug_log.as_deref(), Some("a assigned 2/1"));
        assert_eq!(msg.hall_requests[2][1].state, RequestState::Assigned);

        let orders = h.orders.try_recv().unwrap();
        assert!(orders[2][ButtonType::HallDown.index()]);
        assert_eq!(h.rec.button_lamp(2, ButtonType::HallDown), Some(true));

        h.control.handle_completed(ButtonEvent { floor: 2, button: ButtonType::HallDown });
        assert_eq!(h.control.ledger().hall[2][1].state, RequestState::Completed);
        assert_eq!(h.rec.button_lamp(2, ButtonType::HallDown), Some(false));
    }

    #[tokio::test]
    async fn nothing_is_broadcast_while_disconnected() {
        let mut h = harness(None);
        h.control.handle_button(ButtonEvent { floor: 1, button: ButtonType::HallUp });
        h.control.broadcast(None);
        h.control.assignment_tick().await;
        assert!(h.outbound.try_recv().is_err());
        assert_eq!(h.control.ledger().hall[1][0].state, RequestState::Unassigned);
        assert!(h.control.ledger().hall[1][0].aware_list.is_empty());
    }

    #[tokio::test]
    async fn cab_press_is_persisted_and_pushed() {
        let dir = std::env::temp_dir().join(format!("elevator_mesh_control_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let backup = CabBackup::new(&dir, "a");
        let mut h = harness(Some(backup.clone()));

        h.control.handle_button(ButtonEvent { floor: 3, button: ButtonType::Cab });
        let orders = h.orders.try_recv().unwrap();
        assert!(orders[3][ButtonType::Cab.index()]);
        assert_eq!(h.rec.button_lamp(3, ButtonType::Cab), Some(true));
        assert_eq!(backup.load().unwrap().unwrap()[3].state, RequestState::Assigned);

        h.control.handle_completed(ButtonEvent { floor: 3, button: ButtonType::Cab });
        assert_eq!(backup.load().unwrap().unwrap()[3].state, RequestState::Completed);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn idle_elevator_serves_its_own_floor_at_once() {
        let mut h = harness(None);
        join(&mut h, &["a"]);
        h.shared.publish(ElevatorInfo { available: true, behaviour: ElevatorBehaviour::Idle, current_floor: Some(1), ..Default::default() });

        h.control.handle_button(ButtonEvent { floor: 1, button: ButtonType::HallUp });
        let orders = h.orders.try_recv().unwrap();
        assert!(orders[1][ButtonType::HallUp.index()]);
        assert!(h.control.ledger().is_sole_assigned_to_local(1, ButtonType::HallUp));
    }

    #[tokio::test]
    async fn lamps_stay_dark_while_stop_is_latched() {
        let mut h = harness(None);
        join(&mut h, &["a"]);
        h.control.handle_button(ButtonEvent { floor: 2, button: ButtonType::HallDown });
        h.control.assignment_tick().await;
        assert_eq!(h.rec.button_lamp(2, ButtonType::HallDown), Some(true));

        // The FSM clears every lamp when the stop is pressed.
        let io: IoHandle = h.rec.clone();
        crate::elevator_logic::lights::clear_all_button_lights(&io);
        h.shared.publish(ElevatorInfo { current_floor: Some(0), stop_active: true, ..Default::default() });

        h.control.assignment_tick().await;
        assert_eq!(h.rec.button_lamp(2, ButtonType::HallDown), Some(false));
        assert_eq!(h.control.ledger().hall[2][1].state, RequestState::Assigned);

        h.shared.publish(ElevatorInfo { available: true, current_floor: Some(0), ..Default::default() });
        h.control.assignment_tick().await;
        assert_eq!(h.rec.button_lamp(2, ButtonType::HallDown), Some(true));
    }

    #[tokio::test]
    async fn departed_owner_is_replaced() {
        let mut h = harness(None);
        join(&mut h, &["a", "b"]);

        let mut peer = RequestLedger::new("b", None);
        peer.connected = true;
        peer.hall[0][0].state = RequestState::Assigned;
        peer.hall[0][0].aware_list = vec!["b".into()];
        h.control.handle_message(&peer.build_message(None));
        assert_eq!(h.rec.button_lamp(0, ButtonType::HallUp), Some(true));
        assert!(!h.control.ledger().is_sole_assigned_to_local(0, ButtonType::HallUp));

        let t0 = Instant::now();
        let lost = PeerUpdate { peers: vec!["a".into()], new: None, lost: vec!["b".into()] };
        h.control.handle_peer_update(&lost, t0);
        h.control.liveness_tick(t0 + Duration::from_millis(100)).await;
        assert!(h.orders.try_recv().is_err());

        h.control.liveness_tick(t0 + config::DEPARTURE_GRACE).await;
        let orders = h.orders.try_recv().unwrap();
        assert!(orders[0][ButtonType::HallUp.index()]);
        assert!(h.control.ledger().is_sole_assigned_to_local(0, ButtonType::HallUp));
        assert_eq!(h.control.ledger().hall[0][0].count, 1);
    }
}
