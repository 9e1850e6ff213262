//! ## Printing Module
//!
//! Colored terminal logging. Every level can be switched off at runtime through the
//! `PRINT_*_ON` flags in [`config`], which `init::parse_args` sets from the command line.
//! Also provides a table print of the [`RequestLedger`].
use crate::config;
use crate::world_view::ledger::RequestLedger;
use crate::world_view::request::{RequestRecord, RequestState};
use crate::world_view::{Dirn, ElevatorBehaviour};
use ansi_term::Colour::{self, Blue, Green, Purple, Red, Yellow};
use once_cell::sync::Lazy;
use prettytable::{format, Cell, Row, Table};
use std::sync::Mutex;
use unicode_width::UnicodeWidthStr;

/// Reads a print flag. A poisoned flag still prints.
fn enabled(flag: &Lazy<Mutex<bool>>) -> bool {
    match flag.lock() {
        Ok(on) => *on,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Prints an error message in red to the terminal.
///
/// If `PRINT_ERR_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[ERROR\]:   {}", msg
///
/// ## Example
/// ```
/// use elevator_mesh::print;
///
/// print::err("Something went wrong!".to_string());
/// ```
pub fn err(msg: String) {
    if enabled(&config::PRINT_ERR_ON) {
        println!("{}{}\n", Red.paint("[ERROR]:   "), Red.paint(msg));
    }
}

/// Prints a warning message in yellow to the terminal.
///
/// If `PRINT_WARN_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[WARNING\]: {}", msg
pub fn warn(msg: String) {
    if enabled(&config::PRINT_WARN_ON) {
        println!("{}{}\n", Yellow.paint("[WARNING]: "), Yellow.paint(msg));
    }
}

/// Prints a success message in green to the terminal.
///
/// If `PRINT_OK_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[OK\]:      {}", msg
pub fn ok(msg: String) {
    if enabled(&config::PRINT_OK_ON) {
        println!("{}{}\n", Green.paint("[OK]:      "), Green.paint(msg));
    }
}

/// Prints an informational message in light blue to the terminal.
///
/// If `PRINT_INFO_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[INFO\]:    {}", msg
pub fn info(msg: String) {
    let light_blue = Colour::RGB(102, 178, 255);
    if enabled(&config::PRINT_INFO_ON) {
        println!("{}{}\n", light_blue.paint("[INFO]:    "), light_blue.paint(msg));
    }
}

/// Prints a debug note received from a peer in pink.
///
/// If `PRINT_ELSE_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[PEER\]:    {}", msg
pub fn peer_log(msg: String) {
    let pink = Colour::RGB(255, 51, 255);
    if enabled(&config::PRINT_ELSE_ON) {
        println!("{}{}\n", pink.paint("[PEER]:    "), pink.paint(msg));
    }
}

/// Pads the input text to a fixed display width using spaces.
///
/// Accounts for characters that take more than one column (e.g. Unicode symbols).
fn pad_text(text: &str, width: usize) -> String {
    let visible_width = UnicodeWidthStr::width(text);
    let padding = width.saturating_sub(visible_width);
    format!("{}{}", text, " ".repeat(padding))
}

/// Green "true" or red "false", padded to `width`.
fn colored_bool_label(value: bool, width: usize) -> String {
    let raw_text = if value { "true" } else { "false" };
    let padded = pad_text(raw_text, width);
    if value {
        Green.paint(padded).to_string()
    } else {
        Red.paint(padded).to_string()
    }
}

/// One record as `<state letter><count>[aware,...]`, colored by state.
fn record_cell(record: &RequestRecord) -> String {
    let (letter, colour) = match record.state {
        RequestState::Unassigned => ("U", Yellow),
        RequestState::Assigned => ("A", Green),
        RequestState::Completed => ("C", Colour::RGB(128, 128, 128)),
    };
    colour
        .paint(format!("{}{} [{}]", letter, record.count, record.aware_list.join(",")))
        .to_string()
}

fn status_text(behaviour: ElevatorBehaviour, dirn: Dirn) -> String {
    match (behaviour, dirn) {
        (ElevatorBehaviour::Idle, _) => Green.paint("Idle").to_string(),
        (ElevatorBehaviour::DoorOpen, _) => Yellow.paint("Door open").to_string(),
        (ElevatorBehaviour::Moving, Dirn::Up) => Yellow.paint("⬆️  Moving").to_string(),
        (ElevatorBehaviour::Moving, Dirn::Down) => Yellow.paint("⬇️  Moving").to_string(),
        (ElevatorBehaviour::Moving, Dirn::Stop) => Red.paint("Not moving").to_string(),
    }
}

/// Logs the request ledger as two tables: hall records per floor, and one row per known elevator.
///
/// # Behavior
/// - Returns at once if `config::PRINT_LEDGER_ON` is false.
/// - Elevators outside the roster are shown in grey.
///
/// # Notes
/// Meant for human debugging. The request-control loop calls it every `LEDGER_PRINT_INTERVAL`.
pub fn ledger(ledger: &RequestLedger) {
    if !enabled(&config::PRINT_LEDGER_ON) {
        return;
    }

    println!("{}", Purple.bold().paint(format!("REQUEST LEDGER ({})", ledger.local_id())));
    println!(
        "connected: {}  roster: {}",
        colored_bool_label(ledger.connected, 5),
        ledger.roster.peers.join(", ")
    );

    let mut hall = Table::new();
    hall.set_format(*format::consts::FORMAT_CLEAN);
    hall.add_row(Row::new(vec![
        Cell::new(&Blue.bold().paint("Floor").to_string()),
        Cell::new(&Blue.bold().paint("Up").to_string()),
        Cell::new(&Blue.bold().paint("Down").to_string()),
    ]));
    for (floor, row) in ledger.hall.iter().enumerate().rev() {
        hall.add_row(Row::new(vec![
            Cell::new(&floor.to_string()),
            Cell::new(&record_cell(&row[0])),
            Cell::new(&record_cell(&row[1])),
        ]));
    }
    hall.printstd();

    let mut elevators = Table::new();
    elevators.set_format(*format::consts::FORMAT_CLEAN);
    elevators.add_row(Row::new(vec![
        Cell::new(&Blue.bold().paint("ID").to_string()),
        Cell::new(&Blue.bold().paint("Available").to_string()),
        Cell::new(&Blue.bold().paint("Floor").to_string()),
        Cell::new(&Blue.bold().paint("Status").to_string()),
        Cell::new(&Blue.bold().paint("Cab calls").to_string()),
    ]));
    for (id, info) in &ledger.elevators {
        let id_text = if ledger.in_roster(id) {
            Yellow.bold().paint(id.as_str()).to_string()
        } else {
            Colour::RGB(128, 128, 128).paint(id.as_str()).to_string()
        };
        let floor = info.current_floor.map_or("-".to_string(), |f| f.to_string());
        let cabs = ledger
            .cabs
            .get(id)
            .map(|cabs| {
                cabs.iter()
                    .enumerate()
                    .filter(|(_, r)| r.state == RequestState::Assigned)
                    .map(|(f, _)| f.to_string())
                    .collect::<Vec<String>>()
                    .join(", ")
            })
            .unwrap_or_default();

        elevators.add_row(Row::new(vec![
            Cell::new(&id_text),
            Cell::new(&colored_bool_label(info.available, 5)),
            Cell::new(&floor),
            Cell::new(&status_text(info.behaviour, info.dirn)),
            Cell::new(&cabs),
        ]));
    }
    elevators.printstd();
    print!("\n\n");
}
