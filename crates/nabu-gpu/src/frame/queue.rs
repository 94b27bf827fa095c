use std::collections::VecDeque;

use crate::device::CommandBufferId;

/// Finished command buffers waiting for the next submit, in submission order.
#[derive(Debug, Default)]
pub struct CommandQueue {
    buffers: VecDeque<CommandBufferId>,
}

impl CommandQueue {
    pub fn push_back(&mut self, buffer: CommandBufferId) {
        self.buffers.push_back(buffer);
    }

    /// Queues `buffer` ahead of everything already queued.
    pub fn push_front(&mut self, buffer: CommandBufferId) {
        self.buffers.push_front(buffer);
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn drain(&mut self) -> Vec<CommandBufferId> {
        self.buffers.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
