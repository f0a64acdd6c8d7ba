//! # Storage Keys
//!
//! Structured key builder for task records and payment tickets.
//!
//! Task keys are length-prefixed so that no peer address can forge a
//! prefix of another peer's key space:
//!
//! ```text
//! b'T' | u32 BE len | peer | direction | partition | u32 BE len | id
//! b'P' | u32 BE payment id
//! ```

use super::errors::TransferError;
use serde::{Deserialize, Serialize};
use shared_types::{DownloadTaskId, PaymentId};
use std::fmt;

const TASK_NAMESPACE: u8 = b'T';
const TICKET_NAMESPACE: u8 = b'P';

/// Which side of a transfer a task tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskDirection {
    /// Blocks a peer pushed to this node.
    Upload,
    /// Blocks this node released to a paying peer.
    Download,
}

impl TaskDirection {
    fn tag(self) -> u8 {
        match self {
            TaskDirection::Upload => b'u',
            TaskDirection::Download => b'd',
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'u' => Some(TaskDirection::Upload),
            b'd' => Some(TaskDirection::Download),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskDirection::Upload => "upload",
            TaskDirection::Download => "download",
        }
    }
}

/// Key namespace a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPartition {
    /// In-progress records.
    Doing,
    /// Completed records.
    Done,
}

impl TaskPartition {
    fn tag(self) -> u8 {
        match self {
            TaskPartition::Doing => b'0',
            TaskPartition::Done => b'1',
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'0' => Some(TaskPartition::Doing),
            b'1' => Some(TaskPartition::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPartition::Doing => "doing",
            TaskPartition::Done => "done",
        }
    }

    /// Parse the `taskState` request field (`"0"` doing, `"1"` done).
    pub fn from_task_state(state: &str) -> Result<Self, TransferError> {
        match state {
            "0" => Ok(TaskPartition::Doing),
            "1" => Ok(TaskPartition::Done),
            other => Err(TransferError::parameter(format!(
                "taskState must be \"0\" or \"1\", got {other:?}"
            ))),
        }
    }
}

/// Fully qualified key of one task record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub peer: String,
    pub direction: TaskDirection,
    pub partition: TaskPartition,
    pub id: String,
}

impl TaskKey {
    pub fn new(
        peer: impl Into<String>,
        direction: TaskDirection,
        partition: TaskPartition,
        id: impl Into<String>,
    ) -> Self {
        Self {
            peer: peer.into(),
            direction,
            partition,
            id: id.into(),
        }
    }

    /// Upload tasks are identified by the file hash.
    pub fn upload(peer: &str, file_hash: &str, partition: TaskPartition) -> Self {
        Self::new(peer, TaskDirection::Upload, partition, file_hash)
    }

    /// Download tasks are identified by their random numeric id.
    pub fn download(peer: &str, task_id: DownloadTaskId, partition: TaskPartition) -> Self {
        Self::new(peer, TaskDirection::Download, partition, task_id.to_string())
    }

    /// Same task, other partition.
    pub fn with_partition(&self, partition: TaskPartition) -> Self {
        Self {
            partition,
            ..self.clone()
        }
    }

    /// Scan prefix covering every task of one peer/direction/partition.
    pub fn prefix(peer: &str, direction: TaskDirection, partition: TaskPartition) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + peer.len() + 2);
        out.push(TASK_NAMESPACE);
        push_component(&mut out, peer.as_bytes());
        out.push(direction.tag());
        out.push(partition.tag());
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Self::prefix(&self.peer, self.direction, self.partition);
        push_component(&mut out, self.id.as_bytes());
        out
    }

    /// Parse a key produced by [`TaskKey::encode`].
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&namespace, rest) = bytes.split_first()?;
        if namespace != TASK_NAMESPACE {
            return None;
        }
        let (peer, rest) = take_component(rest)?;
        let (&direction, rest) = rest.split_first()?;
        let (&partition, rest) = rest.split_first()?;
        let (id, rest) = take_component(rest)?;
        if !rest.is_empty() {
            return None;
        }
        Some(Self {
            peer: String::from_utf8(peer.to_vec()).ok()?,
            direction: TaskDirection::from_tag(direction)?,
            partition: TaskPartition::from_tag(partition)?,
            id: String::from_utf8(id.to_vec()).ok()?,
        })
    }
}

/// Renders the legacy `peer_direction_state_id` form. Logs only.
impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.peer,
            self.direction.as_str(),
            self.partition.as_str(),
            self.id
        )
    }
}

/// Key of a payment ticket.
pub fn ticket_key(payment_id: PaymentId) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    out.push(TICKET_NAMESPACE);
    out.extend_from_slice(&payment_id.to_be_bytes());
    out
}

fn push_component(out: &mut Vec<u8>, component: &[u8]) {
    out.extend_from_slice(&(component.len() as u32).to_be_bytes());
    out.extend_from_slice(component);
}

fn take_component(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    if bytes.len() < 4 {
        return None;
    }
    let (len, rest) = bytes.split_at(4);
    let len = u32::from_be_bytes(len.try_into().ok()?) as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}
