use crate::{Error, Result, Task};

/// Fixed-capacity ring buffer of pending tasks.
///
/// Both cursors advance by one slot modulo the capacity. Fullness is decided
/// by `len` alone, never by comparing the cursors.
pub(super) struct TaskQueue {
    slots: Box<[Option<Task>]>,
    read: usize,
    write: usize,
    len: usize,
}

impl TaskQueue {
    pub(super) fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("queue capacity must be positive"));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::AllocationFailed)?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            read: 0,
            write: 0,
            len: 0,
        })
    }

    #[inline]
    pub(super) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(super) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(super) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `task`, handing it back if the queue is full.
    pub(super) fn push(&mut self, task: Task) -> Result<(), Task> {
        if self.len == self.capacity() {
            return Err(task);
        }

        debug_assert!(self.slots[self.write].is_none());
        self.slots[self.write] = Some(task);
        self.write = (self.write + 1) % self.capacity();
        self.len += 1;
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Option<Task> {
        if self.len == 0 {
            return None;
        }

        let task = self.slots[self.read].take();
        debug_assert!(task.is_some());
        self.read = (self.read + 1) % self.capacity();
        self.len -= 1;
        task
    }

    /// Takes back the most recently pushed task.
    pub(super) fn pop_back(&mut self) -> Option<Task> {
        if self.len == 0 {
            return None;
        }

        self.write = (self.write + self.capacity() - 1) % self.capacity();
        let task = self.slots[self.write].take();
        debug_assert!(task.is_some());
        self.len -= 1;
        task
    }

    /// Removes every queued task in FIFO order.
    pub(super) fn drain(&mut self) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(self.len);
        while let Some(task) = self.pop() {
            tasks.push(task);
        }
        tasks
    }
}
