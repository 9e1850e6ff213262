use std::sync::Arc;

use tokio::sync::mpsc;

use elevator_mesh::backup::CabBackup;
use elevator_mesh::config;
use elevator_mesh::elevator_logic::{self, FsmChannels};
use elevator_mesh::elevio::{self, elev::Elevator, ButtonEvent, IoHandle};
use elevator_mesh::init;
use elevator_mesh::manager::json_serial::ExecutableAssigner;
use elevator_mesh::network::local_network::{RequestControl, RequestControlChannels};
use elevator_mesh::network::{peers, udp_broadcast, PeerUpdate};
use elevator_mesh::print;
use elevator_mesh::world_view::ledger::RequestLedger;
use elevator_mesh::world_view::{NetworkMessage, OrderMatrix, SharedElevatorInfo};

#[tokio::main]
async fn main() {
    let node = match init::parse_args() {
        Ok(node) => node,
        Err(e) => {
            print::err(format!("{:#}", e));
            std::process::exit(1);
        }
    };
    print::info(format!("Starting node {} against {}", node.id, node.elev_addr));

    /* START ----------- Restore cab calls and build the ledger ---------------------- */
    let backup = CabBackup::new(&node.backup_dir, &node.id);
    let ledger = RequestLedger::new(&node.id, backup.load_or_empty());
    /* SLUTT ----------- Restore cab calls and build the ledger ---------------------- */

    /* START ----------- Connect to the elevator server ---------------------- */
    let elevator = match Elevator::init(&node.elev_addr, config::N_FLOORS as u8) {
        Ok(elevator) => elevator,
        Err(e) => {
            print::err(format!("Could not reach the elevator server: {:#}", e));
            std::process::exit(1);
        }
    };
    print::ok(format!("Connected to {}", elevator));
    let hw = elevio::poll::spawn_pollers(&elevator);
    let io: IoHandle = Arc::new(elevator);
    let shared = SharedElevatorInfo::new();
    /* SLUTT ----------- Connect to the elevator server ---------------------- */

    /* START ----------- Channels between the tasks ---------------------- */
    // Only the newest order matrix matters
    let (orders_tx, orders_rx) = mpsc::channel::<OrderMatrix>(1);
    let (completed_tx, completed_rx) = mpsc::channel::<ButtonEvent>(32);
    let (peer_update_tx, peer_update_rx) = mpsc::channel::<PeerUpdate>(32);
    let (inbound_tx, inbound_rx) = mpsc::channel::<NetworkMessage>(64);
    let (outbound_tx, outbound_rx) = mpsc::channel::<NetworkMessage>(16);
    /* SLUTT ----------- Channels between the tasks ---------------------- */

    /* START ----------- Critical tasks ---------------------- */
    {
        let io = io.clone();
        let shared = shared.clone();
        let chs = FsmChannels {
            orders: orders_rx,
            floor: hw.floor,
            obstruction: hw.obstruction,
            stop: hw.stop,
            completed: completed_tx,
        };
        let _local_elev_task = tokio::spawn(async move {
            print::info("Starting local elevator".to_string());
            elevator_logic::run_local_elevator(io, shared, chs).await;
        });
    }
    {
        let assigner = ExecutableAssigner::new(node.assigner_path.clone());
        let control = RequestControl::new(ledger, io, shared, Some(backup), assigner, outbound_tx, orders_tx);
        let chs = RequestControlChannels {
            buttons: hw.buttons,
            completed: completed_rx,
            peer_updates: peer_update_rx,
            inbound: inbound_rx,
        };
        let _request_control_task = tokio::spawn(async move {
            print::info("Starting request control".to_string());
            control.run(chs).await;
        });
    }
    /* SLUTT ----------- Critical tasks ---------------------- */

    /* START ----------- Network tasks ---------------------- */
    {
        let id = node.id.clone();
        let _heartbeat_task = tokio::spawn(async move {
            print::info("Starting peer heartbeat".to_string());
            if let Err(e) = peers::heartbeat_tx(id).await {
                print::err(format!("Peer heartbeat stopped: {:#}", e));
            }
        });
    }
    {
        let _peer_task = tokio::spawn(async move {
            print::info("Starting peer receiver".to_string());
            if let Err(e) = peers::peer_rx(peer_update_tx).await {
                print::err(format!("Peer receiver stopped: {:#}", e));
            }
        });
    }
    {
        let _broadcast_task = tokio::spawn(async move {
            print::info("Starting UDP broadcaster".to_string());
            if let Err(e) = udp_broadcast::start_udp_broadcaster(outbound_rx).await {
                print::err(format!("UDP broadcaster stopped: {:#}", e));
            }
        });
    }
    {
        let _listen_task = tokio::spawn(async move {
            print::info("Starting UDP listener".to_string());
            if let Err(e) = udp_broadcast::start_udp_listener(inbound_tx).await {
                print::err(format!("UDP listener stopped: {:#}", e));
            }
        });
    }
    /* SLUTT ----------- Network tasks ---------------------- */

    // Vent med å avslutte programmet
    std::future::pending::<()>().await;
}
