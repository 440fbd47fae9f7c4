use crate::graph::DeviceId;

/// Ordered, duplicate-free list of the devices a device is built on.
///
/// Order is significant: MD arrays treat the first `member_devices` entries
/// as active members and the rest as spares, and BTRFS volumes take their
/// path from the first entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentList(Vec<DeviceId>);

impl ParentList {
    /// Builds a list from the given ids, returning the first repeated id on
    /// failure.
    pub fn try_from_ids(ids: impl IntoIterator<Item = DeviceId>) -> Result<Self, DeviceId> {
        let mut list = Self::default();
        for id in ids {
            if !list.append(id) {
                return Err(id);
            }
        }
        Ok(list)
    }

    /// Appends a parent. Returns false, leaving the list untouched, if the
    /// parent is already present.
    pub fn append(&mut self, id: DeviceId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id);
        true
    }

    /// Removes a parent, returning the position it held.
    pub fn remove(&mut self, id: DeviceId) -> Option<usize> {
        let position = self.position(id)?;
        self.0.remove(position);
        Some(position)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.0.contains(&id)
    }

    pub fn position(&self, id: DeviceId) -> Option<usize> {
        self.0.iter().position(|p| *p == id)
    }

    pub fn first(&self) -> Option<DeviceId> {
        self.0.first().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[DeviceId] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use petgraph::stable_graph::NodeIndex;

    use super::*;

    fn id(i: u32) -> DeviceId {
        DeviceId(NodeIndex::new(i as usize), 0)
    }

    #[test]
    fn test_parent_list() {
        let mut list = ParentList::try_from_ids([id(2), id(0), id(1)]).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.first(), Some(id(2)));
        assert_eq!(list.as_slice(), &[id(2), id(0), id(1)]);

        // Duplicates are rejected without touching the list.
        assert!(!list.append(id(0)));
        assert_eq!(list.len(), 3);

        assert!(list.append(id(3)));
        assert_eq!(list.position(id(3)), Some(3));

        assert_eq!(list.remove(id(0)), Some(1));
        assert_eq!(list.remove(id(0)), None);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![id(2), id(1), id(3)]);
        assert!(!list.contains(id(0)));
        assert!(!list.is_empty());

        assert_eq!(ParentList::try_from_ids([id(1), id(1)]), Err(id(1)));
        assert!(ParentList::default().is_empty());
    }
}
