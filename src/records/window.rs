//! Growable buffer that can drop entries from the front cheaply.

use std::ops::{Deref, DerefMut};

/// A `Vec` whose leading entries can be discarded in amortized O(1).
///
/// Discarded entries stay in a dead prefix until it outgrows the live
/// part, then the live part is moved down in one pass. The live entries
/// are always one contiguous slice.
#[derive(Clone, Debug)]
pub(crate) struct Window<T> {
    items: Vec<T>,
    head: usize,
}

impl<T> Window<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            head: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn insert(&mut self, index: usize, item: T) {
        self.items.insert(self.head + index, item);
    }

    /// Discard the first `count` live entries.
    pub fn drop_front(&mut self, count: usize) {
        self.head += count.min(self.items.len() - self.head);
        if self.head * 2 >= self.items.len() {
            self.items.drain(..self.head);
            self.head = 0;
        }
    }

    /// Remove the live entries at `indices`, which must be ascending.
    /// Indices past the end are ignored.
    pub fn remove_indices(&mut self, indices: &[usize]) {
        let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
            return;
        };
        if last + 1 == indices.len() {
            self.drop_front(indices.len());
            return;
        }
        let mut next = 0;
        let mut write = self.head + first;
        for read in write..self.items.len() {
            if indices.get(next) == Some(&(read - self.head)) {
                next += 1;
                continue;
            }
            self.items.swap(write, read);
            write += 1;
        }
        self.items.truncate(write);
    }

    pub fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.items.drain(..self.head);
        self.head = 0;
        self.items.retain(f);
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }
}

impl<T> Default for Window<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for Window<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items, head: 0 }
    }
}

impl<T> FromIterator<T> for Window<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Vec::from_iter(iter).into()
    }
}

impl<T> Deref for Window<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items[self.head..]
    }
}

impl<T> DerefMut for Window<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items[self.head..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_front_compacts() {
        let mut window: Window<u32> = (0..10).collect();
        window.drop_front(3);
        assert_eq!(&window[..], &[3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(window.head, 3);

        window.drop_front(2);
        // Dead prefix now outweighs the live part
        assert_eq!(window.head, 0);
        assert_eq!(&window[..], &[5, 6, 7, 8, 9]);

        window.drop_front(100);
        assert!(window.is_empty());
    }

    #[test]
    fn test_insert_and_push_after_drop() {
        let mut window: Window<u32> = (0..10).collect();
        window.drop_front(1);
        window.insert(0, 100);
        window.push(200);
        assert_eq!(window.first(), Some(&100));
        assert_eq!(window.last(), Some(&200));
        assert_eq!(window.len(), 11);
    }

    #[test]
    fn test_remove_indices() {
        let mut window: Window<u32> = (0..8).collect();
        window.drop_front(1);
        window.remove_indices(&[1, 4, 20]);
        assert_eq!(&window[..], &[1, 3, 4, 6, 7]);

        window.remove_indices(&[0, 1]);
        assert_eq!(&window[..], &[4, 6, 7]);

        window.remove_indices(&[]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_retain_sees_live_entries_only() {
        let mut window: Window<u32> = (0..6).collect();
        window.drop_front(1);
        window.retain(|v| v % 2 == 0);
        assert_eq!(&window[..], &[2, 4]);
    }
}
