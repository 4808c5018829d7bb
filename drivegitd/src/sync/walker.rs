use std::future::Future;
use std::pin::Pin;

use graph_core::{DriveItem, GraphClient, GraphError};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use super::freshness::{self, FRESHNESS_WINDOW};
use super::paths::SyncPath;
use super::work::{SyncPlan, WorkItem};

/// Root folders whose name starts with this prefix are archived and never
/// traversed.
pub const ARCHIVE_PREFIX: &str = "ZZ";

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("failed to list children of folder {folder_id}: {source}")]
    Listing {
        folder_id: String,
        source: GraphError,
    },
    #[error("unparseable modification time on item {item_id}: {source}")]
    Timestamp {
        item_id: String,
        source: time::error::Parse,
    },
}

/// Depth-first traversal of the remote tree, producing the run's
/// [`SyncPlan`]. The freshness threshold is anchored to the `now` the
/// walker was built with; any listing failure aborts the whole walk.
pub struct Walker<'a> {
    client: &'a GraphClient,
    drive_id: &'a str,
    now: OffsetDateTime,
    window: Duration,
}

impl<'a> Walker<'a> {
    pub fn new(client: &'a GraphClient, drive_id: &'a str, now: OffsetDateTime) -> Self {
        Self {
            client,
            drive_id,
            now,
            window: FRESHNESS_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Walks every non-archived folder under the root item. Only folders
    /// are entered at the root level; loose files next to them are not part
    /// of the mirrored tree.
    pub async fn walk_root(&self, root_item_id: &str) -> Result<SyncPlan, WalkError> {
        let children = self.list(root_item_id).await?;
        let mut plan = SyncPlan::default();
        for item in children {
            if item.name.starts_with(ARCHIVE_PREFIX) {
                eprintln!("[drivegitd] skipping archived entry: {}", item.name);
                continue;
            }
            if item.is_folder() {
                self.walk_folder(item.id, SyncPath::root(&item.name), &mut plan)
                    .await?;
            }
        }
        Ok(plan)
    }

    fn walk_folder<'s>(
        &'s self,
        folder_id: String,
        path: SyncPath,
        plan: &'s mut SyncPlan,
    ) -> Pin<Box<dyn Future<Output = Result<(), WalkError>> + Send + 's>> {
        Box::pin(async move {
            let children = self.list(&folder_id).await?;

            // Emptiness is decided by the raw listing alone; a folder whose
            // files were all filtered out as stale is still non-empty.
            if children.is_empty() {
                eprintln!("[drivegitd] empty folder detected: {path}");
                plan.push(WorkItem::CreateEmptyMarker { path });
                return Ok(());
            }

            for item in children {
                if item.is_file() {
                    if self.file_is_fresh(&item)? {
                        let file_path = path.child(&item.name);
                        eprintln!(
                            "[drivegitd] {} ({})",
                            file_path,
                            item.file
                                .as_ref()
                                .and_then(|f| f.mime_type.as_deref())
                                .unwrap_or("unknown mime type")
                        );
                        plan.push(WorkItem::FetchFile {
                            path: file_path,
                            item_id: item.id,
                        });
                    } else {
                        eprintln!(
                            "[drivegitd] skipping stale file: {}/{} (last modified {})",
                            path,
                            item.name,
                            item.last_modified_date_time.as_deref().unwrap_or("unknown")
                        );
                    }
                } else if item.is_folder() {
                    let child_path = path.child(&item.name);
                    self.walk_folder(item.id, child_path, plan).await?;
                }
            }
            Ok(())
        })
    }

    async fn list(&self, folder_id: &str) -> Result<Vec<DriveItem>, WalkError> {
        self.client
            .list_children(self.drive_id, folder_id)
            .await
            .map_err(|source| WalkError::Listing {
                folder_id: folder_id.to_string(),
                source,
            })
    }

    fn file_is_fresh(&self, item: &DriveItem) -> Result<bool, WalkError> {
        match item.last_modified_date_time.as_deref() {
            Some(raw) => {
                let modified =
                    freshness::parse_modified(raw).map_err(|source| WalkError::Timestamp {
                        item_id: item.id.clone(),
                        source,
                    })?;
                Ok(freshness::is_fresh(modified, self.now, self.window))
            }
            // Without a timestamp staleness cannot be proven; sync the file.
            None => Ok(true),
        }
    }
}
