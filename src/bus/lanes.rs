use std::collections::VecDeque;

use super::policy::Priority;

/// Two FIFO lanes; the high lane is always drained first.
#[derive(Debug)]
pub(crate) struct PriorityLanes<T> {
    high: VecDeque<T>,
    normal: VecDeque<T>,
}

impl<T> Default for PriorityLanes<T> {
    fn default() -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
        }
    }
}

impl<T> PriorityLanes<T> {
    pub fn push(&mut self, priority: Priority, item: T) {
        match priority {
            Priority::High => self.high.push_back(item),
            Priority::Normal => self.normal.push_back(item),
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    pub fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_lane_drains_before_normal_and_each_lane_is_fifo() {
        let mut lanes = PriorityLanes::default();
        lanes.push(Priority::Normal, "n1");
        lanes.push(Priority::High, "h1");
        lanes.push(Priority::Normal, "n2");
        lanes.push(Priority::High, "h2");
        assert_eq!(lanes.len(), 4);

        let order: Vec<_> = std::iter::from_fn(|| lanes.pop()).collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
        assert!(lanes.is_empty());
    }
}
