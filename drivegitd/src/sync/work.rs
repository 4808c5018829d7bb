use std::fmt;

use super::paths::SyncPath;

/// Unit of work discovered by the walker and executed by the materializer.
/// Items are independent of each other; the only ordering requirement is
/// that every item is applied before the working tree status is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    FetchFile { path: SyncPath, item_id: String },
    CreateEmptyMarker { path: SyncPath },
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::FetchFile { path, item_id } => write!(f, "fetch {path} (id {item_id})"),
            WorkItem::CreateEmptyMarker { path } => write!(f, "mark-empty {path}"),
        }
    }
}

/// Everything one traversal decided to do.
#[derive(Debug, Default)]
pub struct SyncPlan {
    items: Vec<WorkItem>,
}

impl SyncPlan {
    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fetch_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, WorkItem::FetchFile { .. }))
            .count()
    }

    pub fn marker_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, WorkItem::CreateEmptyMarker { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut plan = SyncPlan::default();
        plan.push(WorkItem::FetchFile {
            path: SyncPath::root("Docs").child("a.txt"),
            item_id: "item-1".into(),
        });
        plan.push(WorkItem::CreateEmptyMarker {
            path: SyncPath::root("Empty"),
        });

        assert!(!plan.is_empty());
        assert_eq!(plan.fetch_count(), 1);
        assert_eq!(plan.marker_count(), 1);
    }

    #[test]
    fn display_names_the_operation() {
        let item = WorkItem::FetchFile {
            path: SyncPath::root("Docs").child("a.txt"),
            item_id: "item-1".into(),
        };
        assert_eq!(item.to_string(), "fetch Docs/a.txt (id item-1)");
    }
}
