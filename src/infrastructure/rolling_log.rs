use std::collections::VecDeque;

/// Bounded history buffer; the oldest entry is evicted once `capacity` is reached
#[derive(Debug, Clone)]
pub struct RollingLog<T> {
    inner: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RollingLog {
            inner: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.inner.len() == self.capacity {
            self.inner.pop_front();
        }
        self.inner.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.inner.back()
    }

    /// Up to `n` most recent entries, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.inner.iter().skip(self.inner.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }
}
