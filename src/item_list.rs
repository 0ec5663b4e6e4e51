//! The ordered queue of items waiting to be packed.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::Item;
use crate::sorting::ItemSorter;
use crate::types::Dimensional;

/// Items in packing order, front first.
///
/// The list is sorted once on construction; afterwards every operation keeps
/// the order it is given, so re-queued items land exactly where the caller
/// puts them.
#[derive(Clone, Debug, Default)]
pub struct ItemList {
    items: VecDeque<Arc<Item>>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list sorted by `sorter`. The sort is stable.
    pub fn sorted(items: impl IntoIterator<Item = Arc<Item>>, sorter: &dyn ItemSorter) -> Self {
        let mut items: Vec<Arc<Item>> = items.into_iter().collect();
        items.sort_by(|a, b| sorter.compare(a, b));
        Self {
            items: items.into(),
        }
    }

    /// Builds a list that keeps the given order.
    pub fn from_ordered(items: impl IntoIterator<Item = Arc<Item>>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The next item to pack.
    pub fn top(&self) -> Option<&Arc<Item>> {
        self.items.front()
    }

    /// Removes and returns the next item to pack.
    pub fn extract(&mut self) -> Option<Arc<Item>> {
        self.items.pop_front()
    }

    /// The first `n` items, as a new list.
    pub fn top_n(&self, n: usize) -> ItemList {
        Self::from_ordered(self.items.iter().take(n).cloned())
    }

    /// Puts `items` back in front, preserving their order.
    pub fn requeue_front(&mut self, items: Vec<Arc<Item>>) {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    /// Removes the given instances (matched by identity, not by value).
    pub fn remove_items<'a>(&mut self, packed: impl IntoIterator<Item = &'a Arc<Item>>) {
        for item in packed {
            if let Some(index) = self.items.iter().position(|i| Arc::ptr_eq(i, item)) {
                self.items.remove(index);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items.iter()
    }

    pub fn volume(&self) -> u64 {
        self.items.iter().map(|i| i.volume()).sum()
    }

    /// True if any item's constraint depends on coordinates.
    pub fn has_position_constraints(&self) -> bool {
        self.items.iter().any(|i| i.is_position_constrained())
    }

    pub fn into_vec(self) -> Vec<Arc<Item>> {
        self.items.into()
    }
}

impl FromIterator<Arc<Item>> for ItemList {
    fn from_iter<I: IntoIterator<Item = Arc<Item>>>(iter: I) -> Self {
        Self::from_ordered(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rotation;
    use crate::sorting::DefaultItemSorter;

    fn item(description: &str, edge: u32) -> Arc<Item> {
        Arc::new(Item::new(description, (edge, edge, edge), 1, Rotation::BestFit).unwrap())
    }

    #[test]
    fn sorted_puts_largest_first() {
        let list = ItemList::sorted(vec![item("small", 1), item("large", 3), item("mid", 2)], &DefaultItemSorter);
        let order: Vec<_> = list.iter().map(|i| i.description().to_string()).collect();
        assert_eq!(order, ["large", "mid", "small"]);
    }

    #[test]
    fn remove_matches_identity_not_value() {
        let first = item("twin", 1);
        let second = item("twin", 1);
        let mut list = ItemList::from_ordered(vec![Arc::clone(&first), Arc::clone(&second)]);

        list.remove_items([&second]);
        assert_eq!(list.len(), 1);
        assert!(Arc::ptr_eq(list.top().unwrap(), &first));
    }

    #[test]
    fn requeue_front_preserves_order() {
        let a = item("a", 1);
        let b = item("b", 1);
        let c = item("c", 1);
        let mut list = ItemList::from_ordered(vec![Arc::clone(&c)]);
        list.requeue_front(vec![a, b]);

        let order: Vec<_> = list.iter().map(|i| i.description().to_string()).collect();
        assert_eq!(order, ["a", "b", "c"]);
        assert_eq!(list.top_n(2).len(), 2);
    }
}
