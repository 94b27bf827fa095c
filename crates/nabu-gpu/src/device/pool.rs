/// Idle buffers kept for reuse, matched on exact size and usage.
pub(crate) struct BufferPool<B> {
    idle: Vec<(u64, wgpu::BufferUsages, B)>,
}

impl<B> Default for BufferPool<B> {
    fn default() -> Self {
        Self { idle: Vec::new() }
    }
}

impl<B> BufferPool<B> {
    /// An idle buffer of `size` bytes and `usage`, or one built by `create`.
    pub fn take(
        &mut self,
        size: u64,
        usage: wgpu::BufferUsages,
        create: impl FnOnce() -> B,
    ) -> B {
        match self.idle.iter().position(|(s, u, _)| *s == size && *u == usage) {
            Some(pos) => self.idle.swap_remove(pos).2,
            None => create(),
        }
    }

    pub fn put(&mut self, size: u64, usage: wgpu::BufferUsages, buffer: B) {
        self.idle.push((size, usage, buffer));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.idle.len()
    }
}
