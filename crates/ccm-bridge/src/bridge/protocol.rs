//! Wire protocol types for parent-worker communication.
//!
//! Two channels:
//! - **stdin**: length-prefixed frames, each a YAML sequence of argument strings
//! - **stderr**: single sentinel bytes, `0x00` once at startup and `0x01` after
//!   every completed command

use std::fmt;

use serde::Deserialize;

use crate::error::DecodeError;

/// Out-of-band signal written to the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Sentinel {
    /// Worker finished startup and is waiting for frames.
    Ready = 0x00,
    /// The last command ran to completion.
    Done = 0x01,
}

impl Sentinel {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Ready),
            0x01 => Some(Self::Done),
            _ => None,
        }
    }
}

/// Which namespace a command is resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Cluster,
    Node,
}

impl Kind {
    /// Capitalized name used when building handler keys.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Cluster => "Cluster",
            Self::Node => "Node",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => f.write_str("cluster"),
            Self::Node => f.write_str("node"),
        }
    }
}

/// One entry in the payload sequence. Only strings are arguments; anything
/// YAML resolved to another type is kept so it can be reported.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArgScalar {
    Str(String),
    Other(serde_yaml::Value),
}

/// YAML type name of a non-string entry.
fn yaml_type(value: &serde_yaml::Value) -> &'static str {
    use serde_yaml::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Argument tokens carried by one frame, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    raw_args: Vec<String>,
}

impl Invocation {
    pub fn new(raw_args: Vec<String>) -> Result<Self, DecodeError> {
        if raw_args.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self { raw_args })
    }

    /// Load a frame payload.
    ///
    /// Plain scalars that YAML reads as numbers, booleans or null are
    /// rejected rather than printed back, since the round trip would not
    /// preserve their text (`3.0` would come back as `3`).
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let scalars: Vec<ArgScalar> = serde_yaml::from_slice(payload)?;
        let raw_args = scalars
            .into_iter()
            .enumerate()
            .map(|(index, scalar)| match scalar {
                ArgScalar::Str(s) => Ok(s),
                ArgScalar::Other(value) => Err(DecodeError::NonString {
                    index,
                    found: yaml_type(&value),
                }),
            })
            .collect::<Result<_, _>>()?;
        Self::new(raw_args)
    }

    /// Serialize for the wire. Inverse of [`Invocation::decode`].
    pub fn encode(&self) -> Result<Vec<u8>, serde_yaml::Error> {
        serde_yaml::to_string(&self.raw_args).map(String::into_bytes)
    }

    pub fn raw_args(&self) -> &[String] {
        &self.raw_args
    }
}

/// What to run and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    pub kind: Kind,
    pub command_name: String,
    pub command_args: Vec<String>,
}

impl DispatchTarget {
    /// Classify an invocation.
    ///
    /// A leading token naming a cluster command dispatches on the cluster.
    /// Anything else is taken as a node name followed by a node command, and
    /// the node name becomes the command's first positional argument.
    pub fn from_invocation(
        invocation: Invocation,
        is_cluster_command: impl Fn(&str) -> bool,
    ) -> Result<Self, DecodeError> {
        let mut args = invocation.raw_args.into_iter();
        // Invocation is never empty.
        let first = args.next().unwrap_or_default().to_lowercase();

        if is_cluster_command(&first) {
            return Ok(Self {
                kind: Kind::Cluster,
                command_name: first,
                command_args: args.collect(),
            });
        }

        let Some(command) = args.next() else {
            return Err(DecodeError::MissingNodeCommand { node: first });
        };
        let mut command_args = vec![first];
        command_args.extend(args);
        Ok(Self {
            kind: Kind::Node,
            command_name: command.to_lowercase(),
            command_args,
        })
    }
}
