/// Fixed-capacity circular history of decision-domain values.
///
/// Keeps the most recent `capacity` values; overflow drops the oldest.
/// Owned by the dispatcher on the producer thread, so it needs no locking.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    write_index: usize,
    available: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![T::default(); capacity.max(1)],
            write_index: 0,
            available: 0,
        }
    }

    /// Append values, dropping the oldest on overflow. Only the tail of an
    /// input longer than the capacity is kept.
    pub fn extend(&mut self, values: &[T]) {
        let capacity = self.capacity();
        let values = if values.len() > capacity {
            &values[values.len() - capacity..]
        } else {
            values
        };

        for &value in values {
            self.buffer[self.write_index] = value;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.available = (self.available + values.len()).min(capacity);
    }

    /// Copy the retained values, oldest first, into `out`.
    pub fn snapshot_into(&self, out: &mut Vec<T>) {
        out.clear();
        out.reserve(self.available);
        let capacity = self.capacity();
        let start = (self.write_index + capacity - self.available) % capacity;
        for i in 0..self.available {
            out.push(self.buffer[(start + i) % capacity]);
        }
    }

    pub fn len(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn reset(&mut self) {
        self.write_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}
