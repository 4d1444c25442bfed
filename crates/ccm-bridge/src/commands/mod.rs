//! Built-in command table.
//!
//! Every cluster manager command is registered under its kind and backed by a
//! [`ProgramCmd`] that runs the configured executable.

mod program;

pub use program::ProgramCmd;

use crate::bridge::protocol::Kind;
use crate::config::BridgeConfig;
use crate::registry::Registry;

pub const CLUSTER_COMMANDS: &[&str] = &[
    "create",
    "add",
    "populate",
    "list",
    "switch",
    "status",
    "remove",
    "clear",
    "liveset",
    "start",
    "stop",
    "flush",
    "compact",
    "stress",
    "updateconf",
    "updatedseconf",
    "updatelog4j",
    "cli",
    "setdir",
    "bulkload",
    "setlog",
    "scrub",
    "verify",
    "invalidatecache",
    "checklogerror",
    "showlastlog",
    "jconsole",
];

pub const NODE_COMMANDS: &[&str] = &[
    "show",
    "remove",
    "showlog",
    "setlog",
    "start",
    "stop",
    "ring",
    "flush",
    "compact",
    "drain",
    "cleanup",
    "repair",
    "scrub",
    "verify",
    "shuffle",
    "sstablesplit",
    "getsstables",
    "decommission",
    "json",
    "updateconf",
    "updatelog4j",
    "stress",
    "cli",
    "cqlsh",
    "status",
    "setdir",
    "bulkload",
    "version",
    "nodetool",
    "dsetool",
    "setworkload",
    "pause",
    "resume",
    "jconsole",
    "versionfrombuild",
    "byteman",
    "showlastlog",
];

/// Cluster commands that operate on a named target.
const TARGETED_CLUSTER_COMMANDS: &[&str] = &["create", "switch", "add", "populate"];

pub fn builtin_registry(config: &BridgeConfig) -> Registry {
    let mut builder = Registry::builder();

    for &name in CLUSTER_COMMANDS {
        let program = config.program.clone();
        let targeted = TARGETED_CLUSTER_COMMANDS.contains(&name);
        builder = builder.register(Kind::Cluster, name, move || {
            let cmd = ProgramCmd::new(program.clone(), Kind::Cluster, name);
            if targeted { cmd.requiring_target() } else { cmd }
        });
    }

    for &name in NODE_COMMANDS {
        let program = config.program.clone();
        builder = builder.register(Kind::Node, name, move || {
            ProgramCmd::new(program.clone(), Kind::Node, name)
        });
    }

    builder.build()
}
