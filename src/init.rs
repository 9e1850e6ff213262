//! Startup: command-line parsing into a [`NodeConfig`].

use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context};
use once_cell::sync::Lazy;

use crate::config;

/// Runtime settings of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// ID of this node on the network.
    pub id: String,
    /// `<host>:<port>` of the elevator server.
    pub elev_addr: String,
    /// Hall request assigner executable.
    pub assigner_path: PathBuf,
    /// Directory holding the cab call backup.
    pub backup_dir: PathBuf,
}

/// Which print categories are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintSettings {
    /// `print::err`
    pub err: bool,
    /// `print::warn`
    pub warn: bool,
    /// `print::ok`
    pub ok: bool,
    /// `print::info`
    pub info: bool,
    /// `print::peer_log`
    pub other: bool,
    /// Periodic ledger tables
    pub ledger: bool,
}

impl Default for PrintSettings {
    fn default() -> Self {
        PrintSettings { err: true, warn: true, ok: true, info: true, other: true, ledger: false }
    }
}

impl PrintSettings {
    /// Writes the settings to the `PRINT_*_ON` flags in [`config`].
    pub fn apply(&self) {
        fn set(flag: &Lazy<Mutex<bool>>, on: bool) {
            *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = on;
        }
        set(&config::PRINT_ERR_ON, self.err);
        set(&config::PRINT_WARN_ON, self.warn);
        set(&config::PRINT_OK_ON, self.ok);
        set(&config::PRINT_INFO_ON, self.info);
        set(&config::PRINT_ELSE_ON, self.other);
        set(&config::PRINT_LEDGER_ON, self.ledger);
    }
}

/// Result of parsing the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    /// `help` was given.
    Help,
    /// Start a node.
    Run {
        /// Node settings.
        node: NodeConfig,
        /// Print settings.
        prints: PrintSettings,
    },
}

/// Usage text printed by `help`.
pub const HELP: &str = "\
Available arguments:
  id::<ID>                  ID of this node (required)
  addr::<host:port>         elevator server address (default localhost:15657)
  port::<port>              elevator server on localhost:<port>
  assigner::<path>          hall request assigner executable (default ./hall_request_assigner)
  backup_dir::<path>        directory for the cab call backup (default .)
  print_err::true/false
  print_warn::true/false
  print_ok::true/false
  print_info::true/false
  print_else::true/false
  print_ledger::true/false  print the request ledger every 2 s
  debug                     only error messages are printed
  help                      print this text and exit";

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => bail!("{}:: expects true or false, got {:?}", key, other),
    }
}

/// ### Parses `key::value` arguments (program name excluded)
///
/// Arguments are applied left to right, so `debug print_info::true` prints errors and info.
///
/// ## Errors
/// A missing `id::`, an unknown key, or a value that does not parse.
pub fn parse_args_from<I, S>(args: I) -> anyhow::Result<ParsedArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut id: Option<String> = None;
    let mut elev_addr = config::DEFAULT_ELEV_ADDR.to_string();
    let mut assigner_path = PathBuf::from(config::HALL_REQUEST_ASSIGNER);
    let mut backup_dir = PathBuf::from(".");
    let mut prints = PrintSettings::default();

    for arg in args {
        let arg = arg.as_ref();
        match arg.to_lowercase().as_str() {
            "help" => return Ok(ParsedArgs::Help),
            // Debug modus: Kun error-meldingar
            "debug" => {
                prints = PrintSettings { err: prints.err, warn: false, ok: false, info: false, other: false, ledger: false };
                continue;
            }
            _ => {}
        }

        let (key, value) = arg
            .split_once("::")
            .ok_or_else(|| anyhow!("unrecognized argument {:?}, expected key::value", arg))?;
        let key = key.to_lowercase();

        match key.as_str() {
            "id" if !value.is_empty() => id = Some(value.to_string()),
            "id" => bail!("id:: must not be empty"),
            "addr" => elev_addr = value.to_string(),
            "port" => {
                let port: u16 = value.parse().with_context(|| format!("port::{} is not a port number", value))?;
                elev_addr = format!("localhost:{}", port);
            }
            "assigner" => assigner_path = PathBuf::from(value),
            "backup_dir" => backup_dir = PathBuf::from(value),
            "print_err" => prints.err = parse_bool(&key, value)?,
            "print_warn" => prints.warn = parse_bool(&key, value)?,
            "print_ok" => prints.ok = parse_bool(&key, value)?,
            "print_info" => prints.info = parse_bool(&key, value)?,
            "print_else" => prints.other = parse_bool(&key, value)?,
            "print_ledger" => prints.ledger = parse_bool(&key, value)?,
            _ => bail!("unknown argument key {:?}", key),
        }
    }

    let id = id.ok_or_else(|| anyhow!("missing id::<ID>, run with `help` for usage"))?;
    Ok(ParsedArgs::Run {
        node: NodeConfig { id, elev_addr, assigner_path, backup_dir },
        prints,
    })
}

/// ### Reads arguments from `cargo run`
///
/// Applies the print settings and returns the node configuration.
/// `help` prints [`HELP`] and exits the program.
pub fn parse_args() -> anyhow::Result<NodeConfig> {
    match parse_args_from(env::args().skip(1))? {
        ParsedArgs::Help => {
            println!("{}", HELP);
            std::process::exit(0);
        }
        ParsedArgs::Run { node, prints } => {
            prints.apply();
            Ok(node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> (NodeConfig, PrintSettings) {
        match parse_args_from(args.iter().copied()).unwrap() {
            ParsedArgs::Run { node, prints } => (node, prints),
            ParsedArgs::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn defaults_need_only_an_id() {
        let (node, prints) = run(&["id::elev1"]);
        assert_eq!(node.id, "elev1");
        assert_eq!(node.elev_addr, config::DEFAULT_ELEV_ADDR);
        assert_eq!(node.assigner_path, PathBuf::from(config::HALL_REQUEST_ASSIGNER));
        assert_eq!(node.backup_dir, PathBuf::from("."));
        assert_eq!(prints, PrintSettings::default());
    }

    #[test]
    fn addresses_and_paths_are_read() {
        let (node, _) = run(&["port::15658", "id::2", "assigner::/opt/hra", "backup_dir::/tmp/elev"]);
        assert_eq!(node.elev_addr, "localhost:15658");
        assert_eq!(node.assigner_path, PathBuf::from("/opt/hra"));
        assert_eq!(node.backup_dir, PathBuf::from("/tmp/elev"));

        let (node, _) = run(&["id::2", "addr::10.0.0.5:15657"]);
        assert_eq!(node.elev_addr, "10.0.0.5:15657");
    }

    #[test]
    fn debug_then_overrides_apply_in_order() {
        let (_, prints) = run(&["id::a", "debug", "print_info::true", "print_ledger::TRUE"]);
        assert!(prints.err);
        assert!(!prints.warn && !prints.ok && !prints.other);
        assert!(prints.info);
        assert!(prints.ledger);
    }

    #[test]
    fn help_wins() {
        assert_eq!(parse_args_from(["id::a", "help"]).unwrap(), ParsedArgs::Help);
    }

    #[test]
    fn bad_arguments_are_errors() {
        assert!(parse_args_from(Vec::<String>::new()).is_err());
        assert!(parse_args_from(["id::"]).is_err());
        assert!(parse_args_from(["id::a", "port::nope"]).is_err());
        assert!(parse_args_from(["id::a", "print_ok::maybe"]).is_err());
        assert!(parse_args_from(["id::a", "colour::blue"]).is_err());
        assert!(parse_args_from(["id::a", "backup"]).is_err());
    }
}
