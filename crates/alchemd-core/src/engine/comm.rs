//! Collective communication between the workers of a decomposed simulation.
//!
//! Every worker holds a replica of the alchemical state and calls the engine with identical
//! arguments. The engine keeps the replicas in agreement by reducing local contributions and by
//! broadcasting every decision made on the root (rank 0), which is also the only worker that
//! consumes random draws.

use std::sync::{Arc, Barrier, Mutex, PoisonError};

pub trait Communicator: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Sums `value` over all workers; every worker receives the same total.
    fn all_reduce_sum(&self, value: f64) -> f64;

    /// Replaces `values` on every worker with the root's contents.
    fn broadcast_f64s(&self, values: &mut Vec<f64>);

    fn broadcast_flag(&self, flag: bool) -> bool {
        let mut payload = vec![if flag { 1.0 } else { 0.0 }];
        self.broadcast_f64s(&mut payload);
        payload.first().is_some_and(|&v| v != 0.0)
    }

    fn broadcast_index(&self, index: usize) -> usize {
        let mut payload = vec![index as f64];
        self.broadcast_f64s(&mut payload);
        payload.first().map_or(0, |&v| v as usize)
    }

    /// Whether `flag` is set on any worker.
    fn any(&self, flag: bool) -> bool {
        self.all_reduce_sum(if flag { 1.0 } else { 0.0 }) > 0.0
    }
}

/// The single-worker communicator; every collective is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }

    fn broadcast_f64s(&self, _values: &mut Vec<f64>) {}

    fn broadcast_flag(&self, flag: bool) -> bool {
        flag
    }

    fn broadcast_index(&self, index: usize) -> usize {
        index
    }
}

#[derive(Debug)]
struct Mailbox {
    barrier: Barrier,
    contributions: Mutex<Vec<f64>>,
    payload: Mutex<Vec<f64>>,
}

/// One member of an in-process worker group; see [`LocalGroup`].
#[derive(Debug, Clone)]
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        self.mailbox
            .contributions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[self.rank] = value;
        self.mailbox.barrier.wait();
        // Summed in rank order so that every member computes a bit-identical total.
        let total = self
            .mailbox
            .contributions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .sum::<f64>();
        self.mailbox.barrier.wait();
        total
    }

    fn broadcast_f64s(&self, values: &mut Vec<f64>) {
        if self.is_root() {
            *self
                .mailbox
                .payload
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = values.clone();
        }
        self.mailbox.barrier.wait();
        if !self.is_root() {
            values.clone_from(
                &self
                    .mailbox
                    .payload
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
        self.mailbox.barrier.wait();
    }
}

/// A group of communicators that exchange data through shared memory.
///
/// Each member is meant to be moved onto its own thread; every collective blocks until all
/// members have entered it.
#[derive(Debug)]
pub struct LocalGroup {
    members: Vec<LocalCommunicator>,
}

impl LocalGroup {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mailbox = Arc::new(Mailbox {
            barrier: Barrier::new(size),
            contributions: Mutex::new(vec![0.0; size]),
            payload: Mutex::new(Vec::new()),
        });
        let members = (0..size)
            .map(|rank| LocalCommunicator {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect();
        Self { members }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn into_members(self) -> Vec<LocalCommunicator> {
        self.members
    }
}

impl IntoIterator for LocalGroup {
    type Item = LocalCommunicator;
    type IntoIter = std::vec::IntoIter<LocalCommunicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}
